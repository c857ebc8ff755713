//! File header and aggregate stat record.

use nom_derive::Nom;
use serde::Serialize;

use crate::error::NfdumpError;

/// Magic value every nfdump v1 file begins with.
pub const MAGIC: u16 = 0xA50C;
/// The only layout version this decoder understands.
pub const LAYOUT_VERSION: u16 = 1;

/// Fixed 140-byte file header.
#[derive(Nom, Debug, Clone, Copy, Serialize)]
#[nom(LittleEndian)]
pub struct FileHeader {
    pub magic: u16,
    pub version: u16,
    /// Compression flags; see [`crate::block::CompressionKind`].
    pub flags: u32,
    pub num_blocks: u32,
    #[nom(Count = "128", Map = "|v: Vec<u8>| { let mut a = [0u8; 128]; a.copy_from_slice(&v); a }")]
    pub ident: [u8; 128],
}

impl FileHeader {
    pub(crate) fn validate(self) -> Result<Self, NfdumpError> {
        if self.magic != MAGIC {
            return Err(NfdumpError::BadMagic { found: self.magic });
        }
        if self.version != LAYOUT_VERSION {
            return Err(NfdumpError::UnsupportedVersion {
                found: self.version,
            });
        }
        Ok(self)
    }
}

/// Aggregate statistics carried right after the file header.
#[derive(Nom, Debug, Clone, Copy, Default, Serialize, PartialEq, Eq)]
#[nom(LittleEndian)]
pub struct StatRecord {
    pub num_flows: u64,
    pub num_bytes: u64,
    pub num_packets: u64,
    pub num_flows_tcp: u64,
    pub num_flows_udp: u64,
    pub num_flows_icmp: u64,
    pub num_flows_other: u64,
    pub num_bytes_tcp: u64,
    pub num_bytes_udp: u64,
    pub num_bytes_icmp: u64,
    pub num_bytes_other: u64,
    pub num_packets_tcp: u32,
    pub num_packets_udp: u32,
    pub num_packets_icmp: u16,
    pub num_packets_other: u16,
    pub first_seen: u32,
    pub last_seen: u32,
    pub msec_first: u16,
    pub msec_last: u16,
    pub sequence_failures: u32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use nom_derive::Parse;

    #[test]
    fn parses_valid_header() {
        let mut bytes = vec![0x0c, 0xa5, 0x01, 0x00, 0x01, 0x00, 0x00, 0x00, 0x02, 0x00, 0x00, 0x00];
        bytes.extend(std::iter::repeat(0u8).take(128));
        let (rest, header) = FileHeader::parse(&bytes).unwrap();
        assert!(rest.is_empty());
        assert_eq!(header.magic, MAGIC);
        assert_eq!(header.version, 1);
        assert_eq!(header.flags, 1);
        assert_eq!(header.num_blocks, 2);
        header.validate().unwrap();
    }

    #[test]
    fn rejects_bad_magic() {
        let mut bytes = vec![0xff, 0xff, 0x01, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00];
        bytes.extend(std::iter::repeat(0u8).take(128));
        let (_, header) = FileHeader::parse(&bytes).unwrap();
        assert!(matches!(header.validate(), Err(NfdumpError::BadMagic { .. })));
    }

    #[test]
    fn rejects_bad_version() {
        let mut bytes = vec![0x0c, 0xa5, 0x02, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00];
        bytes.extend(std::iter::repeat(0u8).take(128));
        let (_, header) = FileHeader::parse(&bytes).unwrap();
        assert!(matches!(
            header.validate(),
            Err(NfdumpError::UnsupportedVersion { .. })
        ));
    }
}
