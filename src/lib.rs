#![doc = include_str!("../README.md")]

pub mod block;
pub mod decoder;
pub mod error;
pub mod exporter;
pub mod extension_map;
pub mod header;
pub mod meta;
pub mod record;

pub use decoder::{DecoderOptions, NfArchive, NfdumpReader, NfdumpRecords};
pub use error::{NfdumpError, UnsupportedCompressionKind};
pub use exporter::{ExporterInfo, ExporterStat, SamplerInfo};
pub use extension_map::ExtensionMap;
pub use header::{FileHeader, StatRecord};
pub use meta::Meta;
pub use record::FlowRecord;
