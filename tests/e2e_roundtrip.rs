//! E2E Test Suite 01: Whole-archive round trips.
//!
//! Covers the three canonical inputs:
//! - SE short reads, lossless, reordering enabled (the default path)
//! - SE short reads, order-preserving single-block layout
//! - Long reads on the plain-Zstd path
//!
//! Each scenario checks byte-identical FASTQ reconstruction plus the
//! structural invariants of the produced archive (map bijectivity, block
//! boundary placement, compression actually happening).

use std::io::Cursor;
use std::path::Path;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tempfile::TempDir;

use fqc::archive::ReaderSession;
use fqc::{Config, DecodeOptions, LengthMode, OutputSink};

// ─────────────────────────────────────────────────────────────────────────────
// Input generators
// ─────────────────────────────────────────────────────────────────────────────

/// Scenario-1 style input: 100 bp reads sampled from a synthetic genome,
/// Illumina-style ids, qualities with a mild per-position decay.
fn short_read_fastq(n_reads: usize, seed: u64) -> Vec<u8> {
    let mut rng = StdRng::seed_from_u64(seed);
    let genome: Vec<u8> = (0..100_000)
        .map(|_| b"ACGT"[rng.gen_range(0..4)])
        .collect();

    let mut text = Vec::new();
    for _ in 0..n_reads {
        let x = rng.gen_range(1..=10_000u32);
        let y = rng.gen_range(1..=10_000u32);
        let start = rng.gen_range(0..genome.len() - 100);
        let mut seq = genome[start..start + 100].to_vec();
        // ~0.5% sequencing errors, occasional N.
        for b in seq.iter_mut() {
            if rng.gen_range(0..200) == 0 {
                *b = if rng.gen_range(0..10) == 0 {
                    b'N'
                } else {
                    b"ACGT"[rng.gen_range(0..4)]
                };
            }
        }
        let qual: Vec<u8> = (0..100)
            .map(|p| {
                let decay = (p / 12) as i32;
                let jitter = rng.gen_range(-2..=2i32);
                (33 + (38 - decay + jitter).clamp(2, 40)) as u8
            })
            .collect();
        text.extend_from_slice(format!("@SIM:1:FCX:1:1:{x}:{y}\n").as_bytes());
        text.extend_from_slice(&seq);
        text.extend_from_slice(b"\n+\n");
        text.extend_from_slice(&qual);
        text.push(b'\n');
    }
    text
}

/// Scenario-4 style input: long reads around a 10 kb median.
fn long_read_fastq(n_reads: usize, seed: u64) -> Vec<u8> {
    let mut rng = StdRng::seed_from_u64(seed);
    let genome: Vec<u8> = (0..400_000)
        .map(|_| b"ACGT"[rng.gen_range(0..4)])
        .collect();
    let mut text = Vec::new();
    for i in 0..n_reads {
        let len = rng.gen_range(9_000..=12_000usize);
        let start = rng.gen_range(0..genome.len() - len);
        let seq = &genome[start..start + len];
        let qual: Vec<u8> = (0..len).map(|_| 33 + rng.gen_range(10..=40u8)).collect();
        text.extend_from_slice(format!("@long/{i}\n").as_bytes());
        text.extend_from_slice(seq);
        text.extend_from_slice(b"\n+\n");
        text.extend_from_slice(&qual);
        text.push(b'\n');
    }
    text
}

fn compress_bytes(input: &[u8], target: &Path, config: &Config) -> fqc::CompressStats {
    fqc::ops::compress(Cursor::new(input.to_vec()), target, "input.fastq", config)
        .expect("compression failed")
}

fn decompress_all(target: &Path) -> Vec<u8> {
    let mut out = Vec::new();
    fqc::ops::decompress(
        target,
        OutputSink::Single(&mut out),
        &DecodeOptions::default(),
    )
    .expect("decompression failed");
    out
}

// ─────────────────────────────────────────────────────────────────────────────
// Test 1: SE short, lossless, reorder on
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn short_reads_lossless_with_reorder_round_trip() {
    let input = short_read_fastq(10_000, 42);
    let dir = TempDir::new().unwrap();
    let target = dir.path().join("sim.fqc");

    let config = Config {
        threads: 4,
        ..Config::default()
    };
    let stats = compress_bytes(&input, &target, &config);
    assert_eq!(stats.reads, 10_000);
    assert!(
        stats.bytes_out < input.len() as u64,
        "archive ({}) not smaller than input ({})",
        stats.bytes_out,
        input.len()
    );

    // Archive-structure checks: map present and bijective.
    let mut session = ReaderSession::open(&target).unwrap();
    assert!(session.header().has_reorder_map());
    let map = session.reorder_map().unwrap().unwrap();
    assert_eq!(map.len(), 10_000);
    map.verify().unwrap();

    // Byte-identical reconstruction in original order.
    assert_eq!(decompress_all(&target), input);
}

// ─────────────────────────────────────────────────────────────────────────────
// Test 2: SE short, lossless, preserve order
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn short_reads_preserve_order_round_trip() {
    let input = short_read_fastq(10_000, 43);
    let dir = TempDir::new().unwrap();
    let target = dir.path().join("sim_po.fqc");

    let config = Config {
        threads: 4,
        preserve_order: true,
        block_reads: 1_000,
        ..Config::default()
    };
    compress_bytes(&input, &target, &config);

    let mut session = ReaderSession::open(&target).unwrap();
    assert!(!session.header().has_reorder_map());
    assert!(session.header().preserve_order());
    // Block boundaries begin at multiples of the configured block size.
    let entries = session.index().unwrap();
    assert_eq!(entries.len(), 10);
    for (i, e) in entries.iter().enumerate() {
        assert_eq!(e.archive_id_start, i as u64 * 1_000);
        assert_eq!(e.read_count, 1_000);
    }

    assert_eq!(decompress_all(&target), input);
}

// ─────────────────────────────────────────────────────────────────────────────
// Test 3: long reads, Zstd path, auto-detected class
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn long_reads_zstd_path_round_trip() {
    let input = long_read_fastq(300, 44);
    let dir = TempDir::new().unwrap();
    let target = dir.path().join("long.fqc");

    let config = Config {
        threads: 4,
        ..Config::default()
    };
    let stats = compress_bytes(&input, &target, &config);
    assert_eq!(stats.reads, 300);

    let summary = fqc::ops::info(&target).unwrap();
    assert_eq!(summary.length_class, fqc::LengthClass::Long);
    assert!(!summary.has_reorder_map, "long reads must not reorder");

    assert_eq!(decompress_all(&target), input);
}

// ─────────────────────────────────────────────────────────────────────────────
// Test 4: lossy quality modes are deterministic, ids survive exactly
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn illumina8_archive_is_smaller_and_stable() {
    let input = short_read_fastq(3_000, 45);
    let dir = TempDir::new().unwrap();

    let lossless = dir.path().join("ll.fqc");
    let lossy = dir.path().join("i8.fqc");
    let base = Config {
        threads: 2,
        preserve_order: true,
        ..Config::default()
    };
    let s1 = compress_bytes(&input, &lossless, &base);
    let s2 = compress_bytes(
        &input,
        &lossy,
        &Config {
            quality_mode: fqc::QualityMode::Illumina8,
            ..base.clone()
        },
    );
    assert!(
        s2.bytes_out < s1.bytes_out,
        "8-bin qualities should shrink the archive ({} vs {})",
        s2.bytes_out,
        s1.bytes_out
    );

    // Lossy decode: ids and sequences intact, qualities quantized but
    // themselves a fixed point under re-quantization.
    let out = decompress_all(&lossy);
    let orig_lines: Vec<&[u8]> = input.split(|&b| b == b'\n').collect();
    let out_lines: Vec<&[u8]> = out.split(|&b| b == b'\n').collect();
    assert_eq!(orig_lines.len(), out_lines.len());
    for (i, (o, d)) in orig_lines.iter().zip(&out_lines).enumerate() {
        match i % 4 {
            0 | 1 => assert_eq!(o, d, "line {i} differs"),
            3 => {
                for (&a, &b) in o.iter().zip(d.iter()) {
                    let qa = a - 33;
                    let qb = b - 33;
                    // Representatives bucket their own sources.
                    assert_eq!(
                        fqc::codec::quality::illumina8_score(qa),
                        qb,
                        "line {i}: {qa} should quantize to {qb}"
                    );
                }
            }
            _ => {}
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Test 5: length-mode override forces the medium path for short reads
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn length_mode_override_round_trip() {
    let input = short_read_fastq(2_000, 46);
    let dir = TempDir::new().unwrap();
    let target = dir.path().join("forced.fqc");

    let config = Config {
        threads: 2,
        length_mode: LengthMode::Medium,
        ..Config::default()
    };
    compress_bytes(&input, &target, &config);
    let summary = fqc::ops::info(&target).unwrap();
    assert_eq!(summary.length_class, fqc::LengthClass::Medium);
    assert_eq!(decompress_all(&target), input);
}
