//! Compression-scheme rejection and corruption handling at the public API
//! boundary.

use std::io::Cursor;

use nfdump_reader::{DecoderOptions, NfdumpError, NfdumpReader};

const FILE_HEADER_LEN: usize = 140;
const STAT_RECORD_LEN: usize = 116;

fn file_header_bytes(flags: u32, num_blocks: u32) -> Vec<u8> {
    let mut h = Vec::new();
    h.extend_from_slice(&0xA50Cu16.to_le_bytes());
    h.extend_from_slice(&1u16.to_le_bytes());
    h.extend_from_slice(&flags.to_le_bytes());
    h.extend_from_slice(&num_blocks.to_le_bytes());
    h.extend(std::iter::repeat(0u8).take(FILE_HEADER_LEN - 12));
    h
}

fn block_header_bytes(num_records: u32, size: u32, id: u16, flags: u16) -> Vec<u8> {
    let mut b = Vec::new();
    b.extend_from_slice(&num_records.to_le_bytes());
    b.extend_from_slice(&size.to_le_bytes());
    b.extend_from_slice(&id.to_le_bytes());
    b.extend_from_slice(&flags.to_le_bytes());
    b
}

const FLAG_LZ4: u32 = 0x10;
const FLAG_BZ2: u32 = 0x08;

#[test]
fn lz4_flagged_file_is_rejected_with_a_named_error() {
    let mut file = file_header_bytes(FLAG_LZ4, 1);
    file.extend(vec![0u8; STAT_RECORD_LEN]);
    let body = vec![0xffu8; 8];
    file.extend(block_header_bytes(0, body.len() as u32, 2, 0));
    file.extend(body);

    let reader = NfdumpReader::new(Cursor::new(file), DecoderOptions::default()).unwrap();
    let err = reader.materialize().unwrap_err();
    assert!(matches!(
        err,
        NfdumpError::UnsupportedCompression(nfdump_reader::UnsupportedCompressionKind::Lz4)
    ));
}

#[test]
fn bz2_flagged_file_is_rejected_with_a_named_error() {
    let mut file = file_header_bytes(FLAG_BZ2, 1);
    file.extend(vec![0u8; STAT_RECORD_LEN]);
    let body = vec![0xffu8; 8];
    file.extend(block_header_bytes(0, body.len() as u32, 2, 0));
    file.extend(body);

    let reader = NfdumpReader::new(Cursor::new(file), DecoderOptions::default()).unwrap();
    let err = reader.materialize().unwrap_err();
    assert!(matches!(
        err,
        NfdumpError::UnsupportedCompression(nfdump_reader::UnsupportedCompressionKind::Bz2)
    ));
}

#[test]
fn non_fatal_compression_option_skips_the_offending_block_instead_of_erroring() {
    let mut file = file_header_bytes(FLAG_LZ4, 2);
    file.extend(vec![0u8; STAT_RECORD_LEN]);

    let bad_body = vec![0xffu8; 8];
    file.extend(block_header_bytes(0, bad_body.len() as u32, 2, 0));
    file.extend(bad_body);

    // A well-formed second block would still need valid LZ4 framing to be
    // decompressed; since LZ4 is unsupported regardless of fatality, this
    // option only changes whether decoding continues past a bad block, not
    // whether that block's flows are recoverable. With every block flagged
    // LZ4, materializing yields zero records but does not error.
    let good_body = vec![0xaau8; 8];
    file.extend(block_header_bytes(0, good_body.len() as u32, 2, 0));
    file.extend(good_body);

    let options = DecoderOptions::builder().with_fatal_unsupported_compression(false);
    let reader = NfdumpReader::new(Cursor::new(file), options).unwrap();
    let archive = reader.materialize().unwrap();
    assert!(archive.records.is_empty());
}

#[test]
fn zero_sized_flow_record_is_reported_as_corrupt() {
    let mut file = file_header_bytes(0, 1);
    file.extend(vec![0u8; STAT_RECORD_LEN]);
    let body = vec![10u8, 0, 0, 0]; // type = 10 (flow), size = 0
    file.extend(block_header_bytes(1, body.len() as u32, 2, 0));
    file.extend(body);

    let reader = NfdumpReader::new(Cursor::new(file), DecoderOptions::default()).unwrap();
    let err = reader.materialize().unwrap_err();
    assert!(matches!(err, NfdumpError::CorruptRecordSize));
}

#[test]
fn extension_id_above_the_ceiling_is_rejected() {
    let mut file = file_header_bytes(0, 1);
    file.extend(vec![0u8; STAT_RECORD_LEN]);

    let mut ext_body = Vec::new();
    ext_body.extend_from_slice(&1u16.to_le_bytes()); // mapID
    ext_body.extend_from_slice(&1u16.to_le_bytes()); // non-zero extSize
    ext_body.extend_from_slice(&49u16.to_le_bytes()); // out of range

    let mut ext_record = Vec::new();
    ext_record.extend_from_slice(&2u16.to_le_bytes());
    ext_record.extend_from_slice(&((4 + ext_body.len()) as u16).to_le_bytes());
    ext_record.extend(ext_body);

    file.extend(block_header_bytes(0, ext_record.len() as u32, 2, 0));
    file.extend(ext_record);

    let reader = NfdumpReader::new(Cursor::new(file), DecoderOptions::default()).unwrap();
    let err = reader.materialize().unwrap_err();
    assert!(matches!(err, NfdumpError::CorruptExtMapID { id: 49, map_id: 1 }));
}
