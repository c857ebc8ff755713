//! Block framing and decompression.

use nom_derive::Nom;
use serde::Serialize;

use crate::error::{NfdumpError, UnsupportedCompressionKind};

/// The only block id that carries flow/meta records; everything else is skipped.
pub const FLOW_BLOCK_ID: u16 = 2;

const COMPRESSION_MASK: u32 = 0x19;
const FLAG_LZO1X: u32 = 0x01;
const FLAG_BZ2: u32 = 0x08;
const FLAG_LZ4: u32 = 0x10;

/// Fixed 12-byte block header.
#[derive(Nom, Debug, Clone, Copy, Serialize)]
#[nom(LittleEndian)]
pub struct BlockHeader {
    pub num_records: u32,
    /// Bytes of (possibly compressed) payload that follow this header.
    pub size: u32,
    pub id: u16,
    pub flags: u16,
}

/// Decompresses `body` according to the file header's compression flags.
///
/// Returns a buffer owned independently of `body` in the LZO case, or a copy
/// of `body` in the stored/uncompressed case (keeping the caller's raw block
/// buffer free to be reused for the next block read).
pub fn decompress(file_flags: u32, body: &[u8]) -> Result<Vec<u8>, NfdumpError> {
    if file_flags & COMPRESSION_MASK == 0 {
        return Ok(body.to_vec());
    }
    if file_flags & FLAG_LZO1X != 0 {
        return lzo_decompress(body);
    }
    if file_flags & FLAG_LZ4 != 0 {
        return Err(NfdumpError::UnsupportedCompression(
            UnsupportedCompressionKind::Lz4,
        ));
    }
    if file_flags & FLAG_BZ2 != 0 {
        return Err(NfdumpError::UnsupportedCompression(
            UnsupportedCompressionKind::Bz2,
        ));
    }
    Err(NfdumpError::UnsupportedCompression(
        UnsupportedCompressionKind::Unknown(file_flags),
    ))
}

/// nfdump writes blocks into a fixed-size uncompressed staging buffer before
/// compressing them (`WRITE_BUFFSIZE` upstream); 10 MiB comfortably bounds
/// any block this decoder will see.
const MAX_DECOMPRESSED_BLOCK_SIZE: usize = 10 * 1024 * 1024;

fn lzo_decompress(body: &[u8]) -> Result<Vec<u8>, NfdumpError> {
    minilzo::decompress(body, MAX_DECOMPRESSED_BLOCK_SIZE)
        .map_err(|e| NfdumpError::LzoDecompress(format!("{e:?}")))
}
