//! E2E Test Suite 02: Corruption detection and recovery.
//!
//! Builds a multi-block archive, flips one byte inside block 3's
//! compressed sequence substream, and checks the whole failure surface:
//! verify pinpoints exactly that block, strict decompression refuses, and
//! `skip_corrupted` substitutes placeholders while every other block
//! survives intact.

use std::io::Cursor;
use std::path::Path;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tempfile::TempDir;

use fqc::archive::format::{BlockHeader, FOOTER_SIZE};
use fqc::archive::ReaderSession;
use fqc::xxhash::{Xxh64State, CHECKSUM_SEED};
use fqc::{Config, DecodeOptions, FqcError, OutputSink, VerifyMode};

fn fastq(n_reads: usize, seed: u64) -> Vec<u8> {
    let mut rng = StdRng::seed_from_u64(seed);
    let genome: Vec<u8> = (0..50_000).map(|_| b"ACGT"[rng.gen_range(0..4)]).collect();
    let mut text = Vec::new();
    for _ in 0..n_reads {
        let start = rng.gen_range(0..genome.len() - 100);
        let x = rng.gen_range(1..=10_000u32);
        let y = rng.gen_range(1..=10_000u32);
        text.extend_from_slice(format!("@SIM:1:FCX:1:1:{x}:{y}\n").as_bytes());
        text.extend_from_slice(&genome[start..start + 100]);
        text.extend_from_slice(b"\n+\n");
        let qual: Vec<u8> = (0..100).map(|_| 33 + rng.gen_range(20..=40u8)).collect();
        text.extend_from_slice(&qual);
        text.push(b'\n');
    }
    text
}

/// Flip one byte inside `block_id`'s sequence substream, then repair the
/// global checksum so only the block-level checksum trips.
fn corrupt_block_seq_stream(path: &Path, block_id: usize) {
    let mut bytes = std::fs::read(path).unwrap();

    let entry = {
        let mut session = ReaderSession::open(path).unwrap();
        session.index().unwrap()[block_id]
    };
    let header_at = entry.offset as usize;
    let (header, header_size) = BlockHeader::from_bytes(&bytes[header_at..]).unwrap();
    let seq_at = header_at
        + header_size as usize
        + header.offsets[1] as usize
        + header.sizes[1] as usize / 2;
    bytes[seq_at] ^= 0x20;

    // Re-seal the global checksum: this test targets block-level
    // detection, not the whole-file hash.
    let footer_at = bytes.len() - FOOTER_SIZE as usize;
    let mut hash = Xxh64State::new(CHECKSUM_SEED);
    hash.update(&bytes[..footer_at]);
    let digest = hash.digest();
    bytes[footer_at + 16..footer_at + 24].copy_from_slice(&digest.to_le_bytes());

    std::fs::write(path, &bytes).unwrap();
}

fn build_archive(dir: &Path, input: &[u8]) -> std::path::PathBuf {
    let target = dir.join("multi.fqc");
    let config = Config {
        threads: 4,
        block_reads: 1_000,
        ..Config::default()
    };
    fqc::ops::compress(Cursor::new(input.to_vec()), &target, "in.fastq", &config).unwrap();
    target
}

// ─────────────────────────────────────────────────────────────────────────────
// Test 1: verify (full) reports exactly the corrupted block
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn verify_full_pinpoints_corrupted_block() {
    let input = fastq(10_000, 7);
    let dir = TempDir::new().unwrap();
    let target = build_archive(dir.path(), &input);

    // Pristine archive verifies clean in both modes.
    let clean = fqc::ops::verify(&target, VerifyMode::Full).unwrap();
    assert!(clean.is_ok());
    assert_eq!(clean.total_blocks, 10);

    corrupt_block_seq_stream(&target, 3);

    let quick = fqc::ops::verify(&target, VerifyMode::Quick).unwrap();
    // The global hash was re-sealed, so quick verification passes; only
    // a full decode can see the damage.
    assert!(quick.global_checksum_ok);
    assert!(quick.failed_blocks.is_empty());

    let full = fqc::ops::verify(&target, VerifyMode::Full).unwrap();
    assert!(full.global_checksum_ok);
    assert_eq!(full.failed_blocks, vec![3]);
    assert!(!full.is_ok());
}

// ─────────────────────────────────────────────────────────────────────────────
// Test 2: strict decompression refuses the damaged archive
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn strict_decompress_fails_on_corruption() {
    let input = fastq(5_000, 8);
    let dir = TempDir::new().unwrap();
    let target = build_archive(dir.path(), &input);
    corrupt_block_seq_stream(&target, 2);

    let mut out = Vec::new();
    let err = fqc::ops::decompress(
        &target,
        OutputSink::Single(&mut out),
        &DecodeOptions::default(),
    )
    .unwrap_err();
    assert!(
        matches!(
            err,
            FqcError::ChecksumMismatch { .. } | FqcError::Corrupted { .. }
        ),
        "unexpected error: {err}"
    );
}

// ─────────────────────────────────────────────────────────────────────────────
// Test 3: skip_corrupted substitutes placeholders, keeps the rest
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn skip_corrupted_replaces_block_with_placeholders() {
    let input = fastq(10_000, 9);
    let dir = TempDir::new().unwrap();
    let target = build_archive(dir.path(), &input);

    // Which original ids live in block 3?
    let damaged_originals: Vec<u64> = {
        let mut session = ReaderSession::open(&target).unwrap();
        let entry = session.index().unwrap()[3];
        let map = session.reorder_map().unwrap().unwrap().clone();
        (entry.archive_id_start..entry.archive_id_start + u64::from(entry.read_count))
            .map(|aid| map.reverse(aid))
            .collect()
    };

    corrupt_block_seq_stream(&target, 3);

    let mut out = Vec::new();
    let stats = fqc::ops::decompress(
        &target,
        OutputSink::Single(&mut out),
        &DecodeOptions {
            skip_corrupted: true,
            ..DecodeOptions::default()
        },
    )
    .unwrap();
    assert_eq!(stats.corrupted_blocks, vec![3]);
    assert_eq!(stats.reads, 10_000);

    // Damaged originals became placeholders; everything else matches the
    // input byte for byte.
    let orig_records: Vec<&[u8]> = input.split(|&b| b == b'\n').collect();
    let out_records: Vec<&[u8]> = out.split(|&b| b == b'\n').collect();
    assert_eq!(out_records.len(), orig_records.len());
    let damaged: std::collections::HashSet<u64> = damaged_originals.into_iter().collect();
    for rec in 0..10_000u64 {
        let base = (rec * 4) as usize;
        if damaged.contains(&rec) {
            assert!(
                out_records[base + 1].iter().all(|&b| b == b'N'),
                "read {rec} should be a placeholder"
            );
            assert!(out_records[base + 3].iter().all(|&b| b == b'!'));
        } else {
            assert_eq!(out_records[base], orig_records[base], "id of read {rec}");
            assert_eq!(out_records[base + 1], orig_records[base + 1]);
            assert_eq!(out_records[base + 3], orig_records[base + 3]);
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Test 4: damage without re-sealing trips the global checksum too
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn unsealed_damage_fails_quick_verify() {
    let input = fastq(3_000, 10);
    let dir = TempDir::new().unwrap();
    let target = build_archive(dir.path(), &input);

    let mut bytes = std::fs::read(&target).unwrap();
    let mid = bytes.len() / 3;
    bytes[mid] ^= 0x01;
    std::fs::write(&target, &bytes).unwrap();

    let report = fqc::ops::verify(&target, VerifyMode::Quick).unwrap();
    assert!(!report.global_checksum_ok);
}
