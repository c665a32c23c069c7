//! Top-level operations: compress, decompress, verify, info.
//!
//! These are the four entry points the CLI (or any embedding program)
//! calls. Everything underneath (analyzer, codecs, container, pipeline)
//! is wired together here and nowhere else.

use std::io::{BufRead, Write};
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::analyzer;
use crate::archive::format::{build_flags, GlobalHeader, IndexEntry, ALGO_FAMILY_ZSTD,
                             CHECKSUM_XXH64};
use crate::archive::{ReaderSession, WriterSession};
use crate::block::BlockContext;
use crate::config::{Config, LengthClass, CLASS_SAMPLE_READS};
use crate::display::display_line;
use crate::error::{FqcError, Result};
use crate::fastq::{FastqReader, FastqWriter, ReadRecord};
use crate::pipeline::compress::{run_compress, CompressPlan, RecordSource};
use crate::pipeline::decompress::run_decompress;
use crate::pipeline::StopToken;
use crate::stats::{ArchiveSummary, CompressStats, DecompressStats, VerifyMode, VerifyReport};

// ---------------------------------------------------------------------------
// Range selection
// ---------------------------------------------------------------------------

/// Which reads a decompression run extracts. Ranges are half-open.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum RangeSelector {
    #[default]
    All,
    /// Storage-order ids; emitted in archive order.
    ArchiveIds(u64, u64),
    /// Input-order ids; requires the reorder map (or an order-preserving
    /// archive) and emits in original order.
    OriginalIds(u64, u64),
}

/// Decompression options.
#[derive(Clone, Debug)]
pub struct DecodeOptions {
    pub range: RangeSelector,
    /// Replace failing blocks with placeholders instead of aborting.
    pub skip_corrupted: bool,
    pub threads: usize,
}

impl Default for DecodeOptions {
    fn default() -> Self {
        DecodeOptions {
            range: RangeSelector::All,
            skip_corrupted: false,
            threads: 0,
        }
    }
}

/// Where decompressed records go: one FASTQ stream, or mate-split streams
/// for an interleaved paired-end archive.
pub enum OutputSink<'a> {
    Single(&'a mut dyn Write),
    SplitPe(&'a mut dyn Write, &'a mut dyn Write),
}

// ---------------------------------------------------------------------------
// Compress
// ---------------------------------------------------------------------------

fn now_epoch_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Compress a FASTQ stream into an archive at `target`.
pub fn compress<R: BufRead + Send>(
    input: R,
    target: &Path,
    original_filename: &str,
    config: &Config,
) -> Result<CompressStats> {
    config.validate()?;
    let started = std::time::Instant::now();
    let stop = StopToken::new();
    let mut reader = FastqReader::new(input);

    // Sample the head of the input to fix the length class.
    let mut sample: Vec<ReadRecord> = Vec::with_capacity(CLASS_SAMPLE_READS);
    while sample.len() < CLASS_SAMPLE_READS {
        match reader.next_record()? {
            Some(rec) => sample.push(rec),
            None => break,
        }
    }
    let sample_lens: Vec<usize> = sample.iter().map(|r| r.seq.len()).collect();
    let len_sample = analyzer::sample_lengths(&sample_lens);
    let class = analyzer::resolve_class(config.length_mode, len_sample);
    let median_len = len_sample.median.max(1);
    display_line(
        3,
        &format!(
            "length class {:?} (sampled max {} median {})",
            class, len_sample.max, len_sample.median
        ),
    );

    let reorder = config.reorder_enabled() && class == LengthClass::Short;
    let plan = CompressPlan {
        reads_per_block: config.reads_per_block(class, median_len),
        max_block_bases: config.max_block_bases,
        threads: config.effective_threads(),
        memory_budget: config.memory_budget_bytes(),
        median_len,
    };
    let ctx = BlockContext::new(config, class);

    let make_header = |has_map: bool, total: u64| GlobalHeader {
        flags: build_flags(
            config.paired,
            config.preserve_order,
            config.quality_mode,
            config.id_mode,
            has_map,
            class,
            config.streaming,
        ),
        compression_algo_family: ALGO_FAMILY_ZSTD,
        checksum_type: CHECKSUM_XXH64,
        total_read_count: total,
        original_filename: original_filename.as_bytes().to_vec(),
        timestamp: now_epoch_secs(),
    };

    let mut stats = if reorder {
        // Two-phase path: load everything, permute, then compress the
        // permuted store.
        let mut records = sample;
        while let Some(rec) = reader.next_record()? {
            records.push(rec);
        }
        let total = records.len() as u64;
        let outcome = analyzer::reorder_records(records, config, &stop)?;
        let session = WriterSession::create(target, make_header(true, total))?;
        run_compress(
            RecordSource::Memory(outcome.records),
            session,
            &ctx,
            &plan,
            Some(&outcome.map),
            &stop,
        )?
    } else {
        // Single-pass path: the sampled head chains back in front of the
        // remaining stream; the read count is back-patched at commit.
        let session = WriterSession::create(target, make_header(false, u64::MAX))?;
        let source = sample.into_iter().map(Ok).chain(reader);
        run_compress(
            RecordSource::Stream(Box::new(source)),
            session,
            &ctx,
            &plan,
            None,
            &stop,
        )?
    };
    stats.elapsed_ms = started.elapsed().as_millis() as u64;
    Ok(stats)
}

/// Convenience: compress a FASTQ file by path.
pub fn compress_path(input: &Path, target: &Path, config: &Config) -> Result<CompressStats> {
    let file = std::fs::File::open(input).map_err(|e| {
        FqcError::Io(std::io::Error::new(
            e.kind(),
            format!("cannot open {}: {e}", input.display()),
        ))
    })?;
    let name = input
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    compress(std::io::BufReader::new(file), target, &name, config)
}

// ---------------------------------------------------------------------------
// Decompress
// ---------------------------------------------------------------------------

/// Blocks whose archive-id range intersects `[start, end)`.
fn blocks_overlapping(entries: &[IndexEntry], start: u64, end: u64) -> Vec<IndexEntry> {
    entries
        .iter()
        .filter(|e| {
            let b_start = e.archive_id_start;
            let b_end = b_start + u64::from(e.read_count);
            b_start < end && start < b_end
        })
        .copied()
        .collect()
}

/// Decompress (part of) an archive into FASTQ.
pub fn decompress(
    archive: &Path,
    sink: OutputSink<'_>,
    options: &DecodeOptions,
) -> Result<DecompressStats> {
    let started = std::time::Instant::now();
    let mut session = ReaderSession::open(archive)?;
    let header = session.header().clone();
    let total = header.total_read_count;
    let threads = if options.threads == 0 {
        num_cpus::get()
    } else {
        options.threads
    };
    let stop = StopToken::new();
    let entries: Vec<IndexEntry> = session.index()?.to_vec();

    // Resolve the range into (blocks to decode, archive-id filter,
    // original-order restoration).
    let has_map = header.has_reorder_map();
    let (plan, archive_lo, archive_hi, restore_original): (Vec<IndexEntry>, u64, u64, bool) =
        match options.range {
            RangeSelector::All => (entries.clone(), 0, total, has_map),
            RangeSelector::ArchiveIds(s, e) => {
                let e = e.min(total);
                if s >= e {
                    (Vec::new(), 0, 0, false)
                } else {
                    (blocks_overlapping(&entries, s, e), s, e, false)
                }
            }
            RangeSelector::OriginalIds(s, e) => {
                let e = e.min(total);
                if s >= e {
                    (Vec::new(), 0, 0, false)
                } else if !has_map {
                    // Order-preserving archive: original ids are archive ids.
                    (blocks_overlapping(&entries, s, e), s, e, false)
                } else {
                    // Map the original range onto the scattered archive ids
                    // and decode every block that holds one of them.
                    let map = session
                        .reorder_map()?
                        .ok_or_else(|| FqcError::format("reorder map missing"))?;
                    let mut wanted: Vec<u64> = (s..e).map(|o| map.forward(o)).collect();
                    wanted.sort_unstable();
                    let mut plan = Vec::new();
                    let mut w = 0usize;
                    for entry in &entries {
                        let b_end = entry.archive_id_start + u64::from(entry.read_count);
                        while w < wanted.len() && wanted[w] < entry.archive_id_start {
                            w += 1;
                        }
                        if w < wanted.len() && wanted[w] < b_end {
                            plan.push(*entry);
                        }
                    }
                    (plan, 0, total, true)
                }
            }
        };

    // The original-id filter applied at emission time.
    let (orig_lo, orig_hi) = match options.range {
        RangeSelector::OriginalIds(s, e) => (s, e.min(total)),
        _ => (0, total),
    };

    // Original-order restoration buffers records by original id.
    let mut restore_buf: Vec<Option<ReadRecord>> = Vec::new();
    if restore_original {
        restore_buf.resize((orig_hi - orig_lo) as usize, None);
    }

    // Block ids for error reporting: position of each planned entry in
    // the full index (plan order is index order, so this is monotone).
    let plan_block_ids: Vec<u32> = plan
        .iter()
        .map(|p| {
            entries
                .iter()
                .position(|e| e.archive_id_start == p.archive_id_start)
                .unwrap_or(0) as u32
        })
        .collect();

    // Make sure the map is loaded before the pipeline borrows the session.
    let map = if restore_original {
        session.reorder_map()?.cloned()
    } else {
        None
    };

    let mut stats = DecompressStats::default();
    let mut writer = SinkWriter::new(sink);
    let mut plan_pos = 0usize;

    run_decompress(
        &mut session,
        &plan,
        threads,
        options.skip_corrupted,
        &stop,
        |block| {
            if block.corrupted {
                stats.corrupted_blocks.push(plan_block_ids[plan_pos]);
            }
            plan_pos += 1;
            stats.blocks += 1;
            for (i, rec) in block.records.into_iter().enumerate() {
                let aid = block.entry.archive_id_start + i as u64;
                if !(archive_lo..archive_hi).contains(&aid) {
                    continue;
                }
                let oid = match map.as_ref() {
                    Some(m) => m.reverse(aid),
                    None => aid,
                };
                if !(orig_lo..orig_hi).contains(&oid) {
                    continue;
                }
                if restore_original {
                    restore_buf[(oid - orig_lo) as usize] = Some(rec);
                } else {
                    stats.reads += 1;
                    stats.bases += rec.seq.len() as u64;
                    writer.emit(&rec, aid)?;
                }
            }
            Ok(())
        },
    )?;

    if restore_original {
        for (i, slot) in restore_buf.iter_mut().enumerate() {
            let oid = orig_lo + i as u64;
            let rec = slot.take().ok_or_else(|| {
                FqcError::Internal(format!("original id {oid} never decoded"))
            })?;
            stats.reads += 1;
            stats.bases += rec.seq.len() as u64;
            writer.emit(&rec, oid)?;
        }
    }
    writer.flush()?;
    stats.corrupted_blocks.sort_unstable();
    stats.corrupted_blocks.dedup();
    stats.elapsed_ms = started.elapsed().as_millis() as u64;
    Ok(stats)
}

/// Routes records to one stream, or alternates mates across two.
struct SinkWriter<'a> {
    single: Option<FastqWriter<&'a mut dyn Write>>,
    split: Option<(FastqWriter<&'a mut dyn Write>, FastqWriter<&'a mut dyn Write>)>,
}

impl<'a> SinkWriter<'a> {
    fn new(sink: OutputSink<'a>) -> Self {
        match sink {
            OutputSink::Single(w) => SinkWriter {
                single: Some(FastqWriter::new(w)),
                split: None,
            },
            OutputSink::SplitPe(w1, w2) => SinkWriter {
                single: None,
                split: Some((FastqWriter::new(w1), FastqWriter::new(w2))),
            },
        }
    }

    /// `n` is the read's position in the emitted order; in an interleaved
    /// archive even positions are mate 1.
    fn emit(&mut self, rec: &ReadRecord, n: u64) -> Result<()> {
        if let Some(w) = &mut self.single {
            return w.write_record(rec);
        }
        let (w1, w2) = self.split.as_mut().expect("sink writer has no output");
        if n % 2 == 0 {
            w1.write_record(rec)
        } else {
            w2.write_record(rec)
        }
    }

    fn flush(&mut self) -> Result<()> {
        if let Some(w) = &mut self.single {
            w.flush()?;
        }
        if let Some((w1, w2)) = &mut self.split {
            w1.flush()?;
            w2.flush()?;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Verify
// ---------------------------------------------------------------------------

/// Check archive integrity without producing output.
///
/// `Quick` validates the preamble, footer, index, and global checksum.
/// `Full` additionally decodes every block; all failing blocks are
/// reported, not just the first.
pub fn verify(path: &Path, mode: VerifyMode) -> Result<VerifyReport> {
    let mut session = ReaderSession::open(path)?;
    let global_checksum_ok = match session.verify_global_checksum() {
        Ok(()) => true,
        Err(FqcError::ChecksumMismatch { .. }) => false,
        Err(e) => return Err(e),
    };
    let entries: Vec<IndexEntry> = session.index()?.to_vec();
    let mut report = VerifyReport {
        mode,
        total_blocks: entries.len() as u64,
        global_checksum_ok,
        failed_blocks: Vec::new(),
    };
    if mode == VerifyMode::Quick {
        return Ok(report);
    }

    let stop = StopToken::new();
    let mut pos = 0u32;
    run_decompress(
        &mut session,
        &entries,
        num_cpus::get(),
        true, // collect every failure instead of stopping at the first
        &stop,
        |block| {
            if block.corrupted {
                report.failed_blocks.push(pos);
            }
            pos += 1;
            Ok(())
        },
    )?;
    report.failed_blocks.sort_unstable();
    Ok(report)
}

// ---------------------------------------------------------------------------
// Info
// ---------------------------------------------------------------------------

/// Summarize an archive from its header and index alone.
pub fn info(path: &Path) -> Result<ArchiveSummary> {
    let mut session = ReaderSession::open(path)?;
    let header = session.header().clone();
    let block_count = session.index()?.len() as u64;
    Ok(ArchiveSummary {
        file_len: session.file_len(),
        total_read_count: header.total_read_count,
        block_count,
        length_class: header.length_class()?,
        quality_mode: header.quality_mode()?,
        id_mode: header.id_mode()?,
        paired: header.paired(),
        preserve_order: header.preserve_order(),
        has_reorder_map: header.has_reorder_map(),
        streaming: header.streaming(),
        original_filename: String::from_utf8_lossy(&header.original_filename).into_owned(),
        timestamp: header.timestamp,
    })
}
