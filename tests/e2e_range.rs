//! E2E Test Suite 03: Range extraction and paired-end splitting.
//!
//! - Archive-id ranges against a reordered archive, cross-checked through
//!   the reorder map against the original input.
//! - Original-id ranges, which must come back in input order.
//! - Interleaved 2×150 bp pairs split into two mate files.

use std::io::Cursor;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tempfile::TempDir;

use fqc::archive::ReaderSession;
use fqc::fastq::{FastqReader, ReadRecord};
use fqc::{Config, DecodeOptions, OutputSink, RangeSelector};

fn parse_records(text: &[u8]) -> Vec<ReadRecord> {
    FastqReader::new(Cursor::new(text.to_vec()))
        .collect::<fqc::Result<Vec<_>>>()
        .unwrap()
}

fn short_read_fastq(n_reads: usize, seed: u64) -> Vec<u8> {
    let mut rng = StdRng::seed_from_u64(seed);
    let genome: Vec<u8> = (0..60_000).map(|_| b"ACGT"[rng.gen_range(0..4)]).collect();
    let mut text = Vec::new();
    for i in 0..n_reads {
        let start = rng.gen_range(0..genome.len() - 100);
        text.extend_from_slice(format!("@SIM:1:FCX:1:1:{}:{}\n", i + 1, (i * 7) % 9999 + 1).as_bytes());
        text.extend_from_slice(&genome[start..start + 100]);
        text.extend_from_slice(b"\n+\n");
        let qual: Vec<u8> = (0..100).map(|_| 33 + rng.gen_range(15..=40u8)).collect();
        text.extend_from_slice(&qual);
        text.push(b'\n');
    }
    text
}

/// Interleaved 2×150 bp pairs: mate 2 is the reverse complement of a
/// nearby window, ids carry the `/1` `/2` suffix convention.
fn interleaved_pe_fastq(n_pairs: usize, seed: u64) -> Vec<u8> {
    let mut rng = StdRng::seed_from_u64(seed);
    let genome: Vec<u8> = (0..80_000).map(|_| b"ACGT"[rng.gen_range(0..4)]).collect();
    let mut text = Vec::new();
    for p in 0..n_pairs {
        let start = rng.gen_range(0..genome.len() - 500);
        let r1 = &genome[start..start + 150];
        let r2_src = &genome[start + 200..start + 350];
        let r2: Vec<u8> = r2_src
            .iter()
            .rev()
            .map(|&b| match b {
                b'A' => b'T',
                b'C' => b'G',
                b'G' => b'C',
                _ => b'A',
            })
            .collect();
        for (mate, seq) in [(1, r1.to_vec()), (2, r2)] {
            text.extend_from_slice(format!("@PAIR:{p}/{mate}\n").as_bytes());
            text.extend_from_slice(&seq);
            text.extend_from_slice(b"\n+\n");
            let qual: Vec<u8> = (0..150).map(|_| 33 + rng.gen_range(20..=40u8)).collect();
            text.extend_from_slice(&qual);
            text.push(b'\n');
        }
    }
    text
}

// ─────────────────────────────────────────────────────────────────────────────
// Test 1: archive-id range equals the map-projected slice of a full decode
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn archive_id_range_matches_full_decode_projection() {
    let input = short_read_fastq(3_000, 21);
    let originals = parse_records(&input);
    let dir = TempDir::new().unwrap();
    let target = dir.path().join("r.fqc");

    let config = Config {
        threads: 4,
        block_reads: 500,
        ..Config::default()
    };
    fqc::ops::compress(Cursor::new(input.clone()), &target, "r.fastq", &config).unwrap();

    let mut out = Vec::new();
    fqc::ops::decompress(
        &target,
        OutputSink::Single(&mut out),
        &DecodeOptions {
            range: RangeSelector::ArchiveIds(500, 1_500),
            ..DecodeOptions::default()
        },
    )
    .unwrap();
    let got = parse_records(&out);
    assert_eq!(got.len(), 1_000);

    // Expected: the records stored at archive ids 500..1500, which the
    // reorder map names in terms of original input positions.
    let mut session = ReaderSession::open(&target).unwrap();
    let map = session.reorder_map().unwrap().unwrap().clone();
    let expected: Vec<ReadRecord> = (500u64..1_500)
        .map(|aid| originals[map.reverse(aid) as usize].clone())
        .collect();
    assert_eq!(got, expected);
}

// ─────────────────────────────────────────────────────────────────────────────
// Test 2: original-id range comes back in input order
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn original_id_range_restores_input_order() {
    let input = short_read_fastq(2_000, 22);
    let originals = parse_records(&input);
    let dir = TempDir::new().unwrap();
    let target = dir.path().join("o.fqc");

    let config = Config {
        threads: 2,
        block_reads: 400,
        ..Config::default()
    };
    fqc::ops::compress(Cursor::new(input.clone()), &target, "o.fastq", &config).unwrap();

    let mut out = Vec::new();
    fqc::ops::decompress(
        &target,
        OutputSink::Single(&mut out),
        &DecodeOptions {
            range: RangeSelector::OriginalIds(250, 750),
            ..DecodeOptions::default()
        },
    )
    .unwrap();
    let got = parse_records(&out);
    assert_eq!(got, originals[250..750].to_vec());
}

// ─────────────────────────────────────────────────────────────────────────────
// Test 3: original-id range on an order-preserving archive
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn original_id_range_without_map() {
    let input = short_read_fastq(1_000, 23);
    let originals = parse_records(&input);
    let dir = TempDir::new().unwrap();
    let target = dir.path().join("po.fqc");

    let config = Config {
        threads: 2,
        preserve_order: true,
        block_reads: 300,
        ..Config::default()
    };
    fqc::ops::compress(Cursor::new(input.clone()), &target, "po.fastq", &config).unwrap();

    let mut out = Vec::new();
    fqc::ops::decompress(
        &target,
        OutputSink::Single(&mut out),
        &DecodeOptions {
            range: RangeSelector::OriginalIds(100, 400),
            ..DecodeOptions::default()
        },
    )
    .unwrap();
    assert_eq!(parse_records(&out), originals[100..400].to_vec());
}

// ─────────────────────────────────────────────────────────────────────────────
// Test 4: interleaved pairs split into two mate files
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn split_pe_decode_yields_mate_files_in_pair_order() {
    let input = interleaved_pe_fastq(1_000, 24);
    let originals = parse_records(&input);
    let dir = TempDir::new().unwrap();
    let target = dir.path().join("pe.fqc");

    let config = Config {
        threads: 4,
        paired: true,
        ..Config::default()
    };
    fqc::ops::compress(Cursor::new(input.clone()), &target, "pe.fastq", &config).unwrap();
    let summary = fqc::ops::info(&target).unwrap();
    assert!(summary.paired);

    let (mut out1, mut out2) = (Vec::new(), Vec::new());
    fqc::ops::decompress(
        &target,
        OutputSink::SplitPe(&mut out1, &mut out2),
        &DecodeOptions::default(),
    )
    .unwrap();

    let mates1 = parse_records(&out1);
    let mates2 = parse_records(&out2);
    assert_eq!(mates1.len(), 1_000);
    assert_eq!(mates2.len(), 1_000);
    for p in 0..1_000 {
        assert_eq!(mates1[p], originals[p * 2], "pair {p} mate 1");
        assert_eq!(mates2[p], originals[p * 2 + 1], "pair {p} mate 2");
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Test 5: empty and clamped ranges
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn degenerate_ranges() {
    let input = short_read_fastq(500, 25);
    let dir = TempDir::new().unwrap();
    let target = dir.path().join("d.fqc");
    let config = Config {
        threads: 2,
        preserve_order: true,
        ..Config::default()
    };
    fqc::ops::compress(Cursor::new(input.clone()), &target, "d.fastq", &config).unwrap();

    // Empty range: no output, no error.
    let mut out = Vec::new();
    let stats = fqc::ops::decompress(
        &target,
        OutputSink::Single(&mut out),
        &DecodeOptions {
            range: RangeSelector::ArchiveIds(100, 100),
            ..DecodeOptions::default()
        },
    )
    .unwrap();
    assert_eq!(stats.reads, 0);
    assert!(out.is_empty());

    // End beyond the archive clamps to the read count.
    let mut out = Vec::new();
    let stats = fqc::ops::decompress(
        &target,
        OutputSink::Single(&mut out),
        &DecodeOptions {
            range: RangeSelector::ArchiveIds(400, 10_000),
            ..DecodeOptions::default()
        },
    )
    .unwrap();
    assert_eq!(stats.reads, 100);
}
