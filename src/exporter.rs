//! Exporter info, sampler info, and exporter statistics (record types 7, 9, 8).
//!
//! Decoding here follows the byte-cursor style used by prior nfdump-file
//! readers in the Rust ecosystem (offsets read directly off the record
//! slice with `byteorder`) rather than `nom`, since these are small,
//! fixed-shape records with no extension-map indirection.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use byteorder::{ByteOrder, LittleEndian};
use serde::Serialize;

use crate::error::NfdumpError;

const AF_INET: u16 = 2;
const AF_INET6: u16 = 10;

/// Exporter device identity and address.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct ExporterInfo {
    pub version: u32,
    pub sysid: u16,
    pub id: u16,
    pub sa_family: u16,
    pub ip: IpAddr,
}

/// Sampler configuration advertised by an exporter.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct SamplerInfo {
    pub id: i32,
    pub interval: u32,
    pub mode: u16,
    pub exporter_sysid: u16,
}

/// One exporter's sequence-failure / packet / flow counters, as carried in a
/// type-8 exporter-statistics record.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub struct ExporterStat {
    pub sysid: u32,
    pub sequence_failures: u32,
    pub packets: u64,
    pub flows: u64,
}

/// Decodes a type-7 record (`record` includes the 4-byte record header).
///
/// The exporter IP is stored as two 8-byte little-endian words at
/// `record[8..16]` and `record[16..24]`. If the second word is zero the
/// address is IPv4, extracted from `record[12..16]`; otherwise it is IPv6,
/// formed by concatenating `record[16..24]` then `record[8..16]` (a
/// half-swap, not a byte reversal) — this quirk must be preserved bit for
/// bit.
pub fn decode_exporter_info(record: &[u8]) -> Result<ExporterInfo, NfdumpError> {
    if record.len() < 30 {
        return Err(NfdumpError::CorruptRecordSize);
    }
    let version = LittleEndian::read_u32(&record[4..8]);
    let lo = &record[8..16];
    let hi = &record[16..24];
    let hi_is_zero = hi.iter().all(|&b| b == 0);
    let ip = if hi_is_zero {
        IpAddr::V4(Ipv4Addr::new(record[12], record[13], record[14], record[15]))
    } else {
        let mut octets = [0u8; 16];
        octets[..8].copy_from_slice(hi);
        octets[8..].copy_from_slice(lo);
        IpAddr::V6(Ipv6Addr::from(octets))
    };
    let sa_family = LittleEndian::read_u16(&record[24..26]);
    let sysid = LittleEndian::read_u16(&record[26..28]);
    let id = LittleEndian::read_u16(&record[28..30]);
    debug_assert!(sa_family == AF_INET || sa_family == AF_INET6 || sa_family == 0);
    Ok(ExporterInfo {
        version,
        sysid,
        id,
        sa_family,
        ip,
    })
}

/// Decodes a type-9 record (`record` includes the 4-byte record header).
pub fn decode_sampler_info(record: &[u8]) -> Result<SamplerInfo, NfdumpError> {
    if record.len() < 16 {
        return Err(NfdumpError::CorruptRecordSize);
    }
    Ok(SamplerInfo {
        id: LittleEndian::read_i32(&record[4..8]),
        interval: LittleEndian::read_u32(&record[8..12]),
        mode: LittleEndian::read_u16(&record[12..14]),
        exporter_sysid: LittleEndian::read_u16(&record[14..16]),
    })
}

/// Decodes a type-8 record: a u32 count at offset 4, followed by that many
/// 24-byte `ExporterStat` entries starting at offset 8.
pub fn decode_exporter_stats(record: &[u8]) -> Result<Vec<ExporterStat>, NfdumpError> {
    if record.len() < 8 {
        return Err(NfdumpError::CorruptRecordSize);
    }
    let count = LittleEndian::read_u32(&record[4..8]) as usize;
    let mut stats = Vec::with_capacity(count);
    let mut offset = 8usize;
    for _ in 0..count {
        if record.len() < offset + 24 {
            return Err(NfdumpError::CorruptRecordSize);
        }
        stats.push(ExporterStat {
            sysid: LittleEndian::read_u32(&record[offset..offset + 4]),
            sequence_failures: LittleEndian::read_u32(&record[offset + 4..offset + 8]),
            packets: LittleEndian::read_u64(&record[offset + 8..offset + 16]),
            flows: LittleEndian::read_u64(&record[offset + 16..offset + 24]),
        });
        offset += 24;
    }
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn exporter_record(version: u32, lo: u64, hi: u64, sa_family: u16, sysid: u16, id: u16) -> Vec<u8> {
        let mut r = vec![0u8; 30];
        LittleEndian::write_u16(&mut r[0..2], 7);
        LittleEndian::write_u16(&mut r[2..4], 30);
        LittleEndian::write_u32(&mut r[4..8], version);
        LittleEndian::write_u64(&mut r[8..16], lo);
        LittleEndian::write_u64(&mut r[16..24], hi);
        LittleEndian::write_u16(&mut r[24..26], sa_family);
        LittleEndian::write_u16(&mut r[26..28], sysid);
        LittleEndian::write_u16(&mut r[28..30], id);
        r
    }

    #[test]
    fn decodes_ipv4_exporter() {
        let mut record = exporter_record(1, 0, 0, AF_INET, 0x10, 0x20);
        // bytes[12..16] hold the IPv4 address directly.
        record[12] = 192;
        record[13] = 168;
        record[14] = 0;
        record[15] = 1;
        let info = decode_exporter_info(&record).unwrap();
        assert_eq!(info.ip, IpAddr::V4(Ipv4Addr::new(192, 168, 0, 1)));
        assert_eq!(info.sysid, 0x10);
        assert_eq!(info.id, 0x20);
    }

    #[test]
    fn decodes_ipv6_exporter_with_half_swap() {
        let mut record = exporter_record(1, 0, 1, AF_INET6, 1, 2);
        let lo_bytes: [u8; 8] = [0, 1, 2, 3, 4, 5, 6, 7];
        let hi_bytes: [u8; 8] = [8, 9, 10, 11, 12, 13, 14, 15];
        record[8..16].copy_from_slice(&lo_bytes);
        record[16..24].copy_from_slice(&hi_bytes);
        let info = decode_exporter_info(&record).unwrap();
        let expected = {
            let mut octets = [0u8; 16];
            octets[..8].copy_from_slice(&hi_bytes);
            octets[8..].copy_from_slice(&lo_bytes);
            IpAddr::V6(Ipv6Addr::from(octets))
        };
        assert_eq!(info.ip, expected);
    }

    #[test]
    fn decodes_exporter_stats() {
        let mut record = vec![0u8; 8];
        LittleEndian::write_u16(&mut record[0..2], 8);
        LittleEndian::write_u32(&mut record[4..8], 2);
        let mut entry1 = vec![0u8; 24];
        LittleEndian::write_u32(&mut entry1[0..4], 100);
        LittleEndian::write_u32(&mut entry1[4..8], 1);
        LittleEndian::write_u64(&mut entry1[8..16], 1000);
        LittleEndian::write_u64(&mut entry1[16..24], 50);
        let mut entry2 = vec![0u8; 24];
        LittleEndian::write_u32(&mut entry2[0..4], 200);
        record.extend(entry1);
        record.extend(entry2);
        let stats = decode_exporter_stats(&record).unwrap();
        assert_eq!(stats.len(), 2);
        assert_eq!(stats[0].sysid, 100);
        assert_eq!(stats[0].packets, 1000);
        assert_eq!(stats[1].sysid, 200);
    }
}
