use criterion::{Criterion, criterion_group, criterion_main};
use nfdump_reader::{DecoderOptions, NfdumpReader};
use std::hint::black_box;
use std::io::Cursor;

const FILE_HEADER_LEN: usize = 140;
const STAT_RECORD_LEN: usize = 116;

fn flow_record(map_id: u16, src: [u8; 4], dst: [u8; 4]) -> Vec<u8> {
    let mut r = Vec::new();
    r.extend_from_slice(&10u16.to_le_bytes());
    r.extend_from_slice(&0u16.to_le_bytes());
    r.extend_from_slice(&0u16.to_le_bytes());
    r.extend_from_slice(&[0u8; 14]);
    r.extend_from_slice(&map_id.to_le_bytes());
    r.extend_from_slice(&[0u8; 8]);
    r.extend_from_slice(&src);
    r.extend_from_slice(&dst);
    r.extend_from_slice(&1u32.to_le_bytes());
    r.extend_from_slice(&64u32.to_le_bytes());
    let size = r.len() as u16;
    r[2..4].copy_from_slice(&size.to_le_bytes());
    r
}

fn ext_map_record(map_id: u16) -> Vec<u8> {
    let mut body = Vec::new();
    body.extend_from_slice(&map_id.to_le_bytes());
    body.extend_from_slice(&1u16.to_le_bytes());
    let mut r = Vec::new();
    r.extend_from_slice(&2u16.to_le_bytes());
    r.extend_from_slice(&((4 + body.len()) as u16).to_le_bytes());
    r.extend(body);
    r
}

fn sample_file(num_flows: u32) -> Vec<u8> {
    let mut file = Vec::new();
    file.extend_from_slice(&0xA50Cu16.to_le_bytes());
    file.extend_from_slice(&1u16.to_le_bytes());
    file.extend_from_slice(&0u32.to_le_bytes());
    file.extend_from_slice(&1u32.to_le_bytes());
    file.extend(std::iter::repeat(0u8).take(FILE_HEADER_LEN - 12));
    file.extend(vec![0u8; STAT_RECORD_LEN]);

    let mut block = ext_map_record(1);
    for i in 0..num_flows {
        let octet = (i % 255) as u8;
        block.extend(flow_record(1, [10, 0, 0, octet], [10, 0, 1, octet]));
    }
    file.extend_from_slice(&num_flows.to_le_bytes());
    file.extend_from_slice(&(block.len() as u32).to_le_bytes());
    file.extend_from_slice(&2u16.to_le_bytes());
    file.extend_from_slice(&0u16.to_le_bytes());
    file.extend(block);
    file
}

fn criterion_benchmark(c: &mut Criterion) {
    let file = sample_file(10_000);
    c.bench_function("materialize 10k flow records", |b| {
        b.iter(|| {
            let reader =
                NfdumpReader::new(Cursor::new(black_box(file.clone())), DecoderOptions::default())
                    .unwrap();
            let archive = reader.materialize().unwrap();
            black_box(archive.records.len())
        });
    });
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
