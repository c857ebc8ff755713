//! The shared decode engine: block framing, record dispatch, and the two
//! public shapes built on top of it — materializing and streaming.

use std::collections::HashMap;
use std::io::{self, Read};

use nom_derive::Parse;

use crate::block::{self, BlockHeader, FLOW_BLOCK_ID};
use crate::error::{NfdumpError, UnsupportedCompressionKind};
use crate::exporter::{self, ExporterInfo, ExporterStat, SamplerInfo};
use crate::extension_map::{self, ExtensionMap};
use crate::header::{FileHeader, StatRecord};
use crate::meta::Meta;
use crate::record::{self, FlowRecord, RecordHeader};

// magic(2) + version(2) + flags(4) + num_blocks(4) + ident(128).
const FILE_HEADER_LEN: usize = 140;
const STAT_RECORD_LEN: usize = 116;
const BLOCK_HEADER_LEN: usize = 12;

/// Configuration for a [`NfdumpReader`]: small, `Default`-derived, consumed
/// by value through chained setters.
#[derive(Debug, Clone)]
pub struct DecoderOptions {
    /// DoS guard on the number of ids a single extension-map record may list.
    max_ext_list_len: usize,
    /// Whether an unrecognized compression flag combination aborts decoding
    /// (the default) or is logged and the offending block is skipped.
    fatal_on_unsupported_compression: bool,
}

impl Default for DecoderOptions {
    fn default() -> Self {
        Self {
            max_ext_list_len: extension_map::MAX_EXT_LIST_LEN,
            fatal_on_unsupported_compression: true,
        }
    }
}

impl DecoderOptions {
    pub fn builder() -> Self {
        Self::default()
    }

    #[must_use = "builder methods consume self and return a new value; the return value must be used"]
    pub fn with_max_ext_list_len(mut self, max_ext_list_len: usize) -> Self {
        self.max_ext_list_len = max_ext_list_len;
        self
    }

    #[must_use = "builder methods consume self and return a new value; the return value must be used"]
    pub fn with_fatal_unsupported_compression(mut self, fatal: bool) -> Self {
        self.fatal_on_unsupported_compression = fatal;
        self
    }
}

/// Internal cursor through the decompressed record buffer of one block.
enum BlockState {
    /// Ready to read the next block header from the source.
    NeedBlock,
    /// Walking a decompressed block's records.
    InBlock {
        buf: Vec<u8>,
        cursor: usize,
        emitted: u32,
        num_records: u32,
    },
    /// The source is exhausted; every further call is `EndOfStream`.
    Done,
}

/// The shared decode engine. Owns the byte source and all per-file mutable
/// state: a decoder instance is good for exactly one pass over one
/// stream.
pub struct NfdumpReader<R> {
    source: R,
    file_header: FileHeader,
    stats: StatRecord,
    options: DecoderOptions,
    ext_map: ExtensionMap,
    exporters: HashMap<u16, ExporterInfo>,
    samplers: HashMap<u16, SamplerInfo>,
    exporter_stats: HashMap<u32, ExporterStat>,
    meta: Meta,
    /// Set once `materialize()` starts driving the cursor; gates whether
    /// `meta` gets updated. Streaming callers (`records()`) never set this,
    /// so `meta()` stays at its default for them.
    track_meta: bool,
    raw_buf: Vec<u8>,
    state: BlockState,
}

impl<R: Read> NfdumpReader<R> {
    /// Reads the file header and aggregate stat record and returns a decoder
    /// positioned at the first block.
    pub fn new(mut source: R, options: DecoderOptions) -> Result<Self, NfdumpError> {
        let mut header_buf = [0u8; FILE_HEADER_LEN];
        source
            .read_exact(&mut header_buf)
            .map_err(NfdumpError::ReadHeader)?;
        let (_, file_header) = FileHeader::parse(&header_buf).map_err(|_| {
            NfdumpError::ReadHeader(io::Error::new(io::ErrorKind::InvalidData, "malformed file header"))
        })?;
        let file_header = file_header.validate()?;

        let mut stat_buf = [0u8; STAT_RECORD_LEN];
        source
            .read_exact(&mut stat_buf)
            .map_err(NfdumpError::ReadStatRecord)?;
        let (_, stats) = StatRecord::parse(&stat_buf).map_err(|_| {
            NfdumpError::ReadStatRecord(io::Error::new(
                io::ErrorKind::InvalidData,
                "malformed stat record",
            ))
        })?;

        let ext_map = ExtensionMap::with_max_list_len(options.max_ext_list_len);
        Ok(Self {
            source,
            file_header,
            stats,
            options,
            ext_map,
            exporters: HashMap::new(),
            samplers: HashMap::new(),
            exporter_stats: HashMap::new(),
            meta: Meta::new(),
            track_meta: false,
            raw_buf: Vec::new(),
            state: BlockState::NeedBlock,
        })
    }

    pub fn header(&self) -> &FileHeader {
        &self.file_header
    }

    pub fn stats(&self) -> &StatRecord {
        &self.stats
    }

    /// Only accumulated while driven by [`Self::materialize`]; a decoder
    /// driven through [`Self::records`] leaves this at its default, per the
    /// streaming API's contract not to track meta counters for free.
    pub fn meta(&self) -> &Meta {
        &self.meta
    }

    pub fn exporters(&self) -> &HashMap<u16, ExporterInfo> {
        &self.exporters
    }

    pub fn samplers(&self) -> &HashMap<u16, SamplerInfo> {
        &self.samplers
    }

    pub fn exporter_stats(&self) -> &HashMap<u32, ExporterStat> {
        &self.exporter_stats
    }

    /// Reads the next block header, skipping (but still reading) any block
    /// whose id isn't the flow-record block id, and decompresses the first
    /// flow block it finds. Returns `Ok(false)` on clean end-of-stream.
    fn advance_block(&mut self) -> Result<bool, NfdumpError> {
        loop {
            let mut header_buf = [0u8; BLOCK_HEADER_LEN];
            match self.source.read_exact(&mut header_buf) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(false),
                Err(e) => return Err(NfdumpError::ReadBlockHeader(e)),
            }
            let (_, block_header) = BlockHeader::parse(&header_buf).map_err(|_| {
                NfdumpError::ReadBlockHeader(io::Error::new(
                    io::ErrorKind::InvalidData,
                    "malformed block header",
                ))
            })?;
            if self.track_meta {
                self.meta.record_block(block_header.id);
            }

            let size = block_header.size as usize;
            if self.raw_buf.len() < size {
                self.raw_buf.resize(size, 0);
            }
            self.source
                .read_exact(&mut self.raw_buf[..size])
                .map_err(NfdumpError::ReadBlockBody)?;

            if block_header.id != FLOW_BLOCK_ID {
                log::debug!("skipping block with id {}", block_header.id);
                continue;
            }

            let decompressed = match block::decompress(self.file_header.flags, &self.raw_buf[..size]) {
                Ok(buf) => buf,
                Err(NfdumpError::UnsupportedCompression(kind))
                    if !self.options.fatal_on_unsupported_compression =>
                {
                    log::warn!("skipping block with unsupported compression: {kind:?}");
                    continue;
                }
                Err(e) => return Err(e),
            };

            self.state = BlockState::InBlock {
                buf: decompressed,
                cursor: 0,
                emitted: 0,
                num_records: block_header.num_records,
            };
            return Ok(true);
        }
    }

    /// Produces the next flow record, running the extension-map/exporter/
    /// sampler/exporter-stat handlers internally without surfacing them.
    /// Returns `Err(NfdumpError::EndOfStream)` when the source is exhausted;
    /// any other `Err` leaves the decoder's state unspecified for further
    /// calls.
    pub fn next_record(&mut self) -> Result<FlowRecord, NfdumpError> {
        loop {
            match std::mem::replace(&mut self.state, BlockState::Done) {
                BlockState::Done => return Err(NfdumpError::EndOfStream),
                BlockState::NeedBlock => {
                    if !self.advance_block()? {
                        self.state = BlockState::Done;
                        return Err(NfdumpError::EndOfStream);
                    }
                }
                BlockState::InBlock {
                    buf,
                    mut cursor,
                    mut emitted,
                    num_records,
                } => {
                    if cursor + 4 > buf.len() {
                        self.state = BlockState::NeedBlock;
                        continue;
                    }
                    let (_, record_header) = RecordHeader::parse(&buf[cursor..])
                        .map_err(|_| NfdumpError::CorruptRecordSize)?;
                    if record_header.size == 0 {
                        return Err(NfdumpError::CorruptRecordSize);
                    }
                    let size = record_header.size as usize;
                    if size < 4 || cursor + size > buf.len() {
                        return Err(NfdumpError::CorruptRecordSize);
                    }
                    let record_slice = &buf[cursor..cursor + size];
                    if self.track_meta {
                        self.meta.record_type(record_header.rtype);
                    }

                    match record_header.rtype {
                        record::record_type::END_OF_BLOCK => {
                            self.state = BlockState::NeedBlock;
                        }
                        record::record_type::EXTENSION_MAP => {
                            let body = &record_slice[4..];
                            if extension_map::is_ext_map_v2(body)? {
                                return Err(NfdumpError::UnsupportedExtMapV2);
                            }
                            self.ext_map.update_from_record(body)?;
                            cursor += size;
                            self.state = BlockState::InBlock {
                                buf,
                                cursor,
                                emitted,
                                num_records,
                            };
                        }
                        record::record_type::EXPORTER_INFO => {
                            let info = exporter::decode_exporter_info(record_slice)?;
                            self.exporters.insert(info.sysid, info);
                            cursor += size;
                            self.state = BlockState::InBlock {
                                buf,
                                cursor,
                                emitted,
                                num_records,
                            };
                        }
                        record::record_type::EXPORTER_STATS => {
                            let stats = exporter::decode_exporter_stats(record_slice)?;
                            for stat in stats {
                                self.exporter_stats.insert(stat.sysid, stat);
                            }
                            // An exporter-stats record ends the block.
                            self.state = BlockState::NeedBlock;
                        }
                        record::record_type::SAMPLER_INFO => {
                            let info = exporter::decode_sampler_info(record_slice)?;
                            self.samplers.insert(info.exporter_sysid, info);
                            cursor += size;
                            self.state = BlockState::InBlock {
                                buf,
                                cursor,
                                emitted,
                                num_records,
                            };
                        }
                        record::record_type::FLOW_RECORD => {
                            let flow = record::decode_flow_record(record_slice, &self.ext_map)?;
                            if self.track_meta {
                                let ext_ids = self.ext_map.get(flow.map_id).unwrap_or(&[]);
                                self.meta.record_flow(flow.src_ip.is_ipv6(), ext_ids);
                            }
                            cursor += size;
                            emitted += 1;
                            self.state = if emitted >= num_records {
                                BlockState::NeedBlock
                            } else {
                                BlockState::InBlock {
                                    buf,
                                    cursor,
                                    emitted,
                                    num_records,
                                }
                            };
                            return Ok(flow);
                        }
                        other => {
                            log::debug!("skipping unrecognized record type {other}");
                            cursor += size;
                            self.state = BlockState::InBlock {
                                buf,
                                cursor,
                                emitted,
                                num_records,
                            };
                        }
                    }
                }
            }
        }
    }

    /// The standard-library `Iterator` shape over the streaming primitive.
    pub fn records(self) -> NfdumpRecords<R> {
        NfdumpRecords {
            reader: self,
            done: false,
        }
    }

    /// Consumes the decoder, reading every remaining flow record into one
    /// archive.
    pub fn materialize(mut self) -> Result<NfArchive, NfdumpError> {
        self.track_meta = true;
        let mut records = Vec::with_capacity(self.stats.num_flows as usize);
        loop {
            match self.next_record() {
                Ok(flow) => records.push(flow),
                Err(e) if e.is_end_of_stream() => break,
                Err(e) => return Err(e),
            }
        }
        Ok(NfArchive {
            header: self.file_header,
            stats: self.stats,
            records,
            meta: self.meta,
            exporters: self.exporters,
            samplers: self.samplers,
            exporter_stats: self.exporter_stats,
        })
    }
}

/// `Iterator<Item = Result<FlowRecord, NfdumpError>>` over one stream's flow
/// records, stopping (returning `None`) on clean end-of-stream and on the
/// first decode error.
pub struct NfdumpRecords<R> {
    reader: NfdumpReader<R>,
    done: bool,
}

impl<R> NfdumpRecords<R> {
    /// Access to the shared reader state (exporters, samplers) between
    /// `next` calls. `meta()` on the returned reader stays at its default —
    /// the streaming API does not accumulate it; track your own from the
    /// records and maps observed through this iterator if you need it.
    pub fn reader(&self) -> &NfdumpReader<R> {
        &self.reader
    }
}

impl<R: Read> Iterator for NfdumpRecords<R> {
    type Item = Result<FlowRecord, NfdumpError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.reader.next_record() {
            Ok(flow) => Some(Ok(flow)),
            Err(e) if e.is_end_of_stream() => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}

/// The whole-file materialized result.
#[derive(Debug, Clone)]
pub struct NfArchive {
    pub header: FileHeader,
    pub stats: StatRecord,
    pub records: Vec<FlowRecord>,
    pub meta: Meta,
    pub exporters: HashMap<u16, ExporterInfo>,
    pub samplers: HashMap<u16, SamplerInfo>,
    pub exporter_stats: HashMap<u32, ExporterStat>,
}
