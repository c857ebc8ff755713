//! Error type for the nfdump decoder.
//!
//! Mirrors the shape of a hand-rolled parser error: a closed set of named
//! variants, a `Display` impl written by hand, and a blanket `Error` impl.
//! No `anyhow`/`thiserror` — each variant carries exactly the context a
//! caller needs to explain the failure.

use std::fmt;
use std::io;

/// Errors that can occur while decoding an nfdump v1 file.
#[derive(Debug)]
pub enum NfdumpError {
    /// File header magic did not match `0xA50C`.
    BadMagic { found: u16 },
    /// File header layout version was not `1`.
    UnsupportedVersion { found: u16 },
    /// I/O failure while reading the file header.
    ReadHeader(io::Error),
    /// I/O failure while reading the aggregate stat record.
    ReadStatRecord(io::Error),
    /// I/O failure while reading a block header.
    ReadBlockHeader(io::Error),
    /// I/O failure while reading a block body (premature EOF mid-block).
    ReadBlockBody(io::Error),
    /// A block announced a compression scheme this decoder does not support.
    UnsupportedCompression(UnsupportedCompressionKind),
    /// The LZO1X decompressor rejected a block's payload.
    LzoDecompress(String),
    /// A type-2 (extension map) record had `extSize == 0`, which signals the
    /// unsupported v2 extension-map layout.
    UnsupportedExtMapV2,
    /// An extension id outside `1..=48` appeared in an extension-map record.
    CorruptExtMapID { id: u16, map_id: u16 },
    /// A record header reported `size == 0`.
    CorruptRecordSize,
    /// A flow record referenced a `mapID` with no corresponding extension-map entry.
    UnknownExtMapID { map_id: u16 },
    /// A flow record's extension map named an id this decoder has no width or
    /// field semantics for.
    CorruptExtensionId { id: u16 },
    /// Streaming API only: the input has been fully consumed.
    EndOfStream,
}

/// Which rejected compression scheme (or unknown flag combination) was seen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnsupportedCompressionKind {
    Lz4,
    Bz2,
    Unknown(u32),
}

impl fmt::Display for NfdumpError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NfdumpError::BadMagic { found } => {
                write!(f, "bad file magic: expected 0xA50C, found {found:#06x}")
            }
            NfdumpError::UnsupportedVersion { found } => {
                write!(f, "unsupported layout version: expected 1, found {found}")
            }
            NfdumpError::ReadHeader(e) => write!(f, "failed to read file header: {e}"),
            NfdumpError::ReadStatRecord(e) => write!(f, "failed to read stat record: {e}"),
            NfdumpError::ReadBlockHeader(e) => write!(f, "failed to read block header: {e}"),
            NfdumpError::ReadBlockBody(e) => write!(f, "failed to read block body: {e}"),
            NfdumpError::UnsupportedCompression(kind) => match kind {
                UnsupportedCompressionKind::Lz4 => write!(f, "unsupported compression: LZ4"),
                UnsupportedCompressionKind::Bz2 => write!(f, "unsupported compression: BZ2"),
                UnsupportedCompressionKind::Unknown(flags) => {
                    write!(f, "unsupported compression flags: {flags:#010x}")
                }
            },
            NfdumpError::LzoDecompress(msg) => write!(f, "LZO1X decompression failed: {msg}"),
            NfdumpError::UnsupportedExtMapV2 => {
                write!(f, "extension map v2 (extSize == 0) is not supported")
            }
            NfdumpError::CorruptExtMapID { id, map_id } => {
                write!(f, "extension id {id} in map {map_id} exceeds the maximum of 48")
            }
            NfdumpError::CorruptRecordSize => {
                write!(f, "record header reported size == 0")
            }
            NfdumpError::UnknownExtMapID { map_id } => {
                write!(f, "flow record references undefined extension map {map_id}")
            }
            NfdumpError::CorruptExtensionId { id } => {
                write!(f, "extension id {id} has no known width or semantics")
            }
            NfdumpError::EndOfStream => write!(f, "end of stream"),
        }
    }
}

impl std::error::Error for NfdumpError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            NfdumpError::ReadHeader(e)
            | NfdumpError::ReadStatRecord(e)
            | NfdumpError::ReadBlockHeader(e)
            | NfdumpError::ReadBlockBody(e) => Some(e),
            _ => None,
        }
    }
}

impl NfdumpError {
    /// True for the streaming API's clean end-of-stream marker (not a decode error).
    pub fn is_end_of_stream(&self) -> bool {
        matches!(self, NfdumpError::EndOfStream)
    }
}
