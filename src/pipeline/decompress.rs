//! Decompression pipeline: fetch → decode → ordered emission.
//!
//! The reader stage demultiplexes blocks through the index (only the
//! planned subset is ever fetched), workers decode in parallel, and the
//! caller's sink sees blocks in strictly ascending plan order on the
//! calling thread.

use std::collections::BTreeMap;
use std::thread;

use crossbeam_channel::bounded;

use crate::archive::format::{GlobalHeader, IndexEntry};
use crate::archive::ReaderSession;
use crate::block::{decompress_block, placeholder_records};
use crate::error::{FqcError, Result};
use crate::fastq::ReadRecord;

use super::StopToken;

/// One decoded block in plan order.
pub struct DecodedBlock {
    pub entry: IndexEntry,
    pub records: Vec<ReadRecord>,
    /// Set when the block failed and was replaced by placeholders.
    pub corrupted: bool,
}

/// Decode `plan` blocks in parallel, invoking `sink` in plan order on the
/// calling thread.
///
/// With `skip_corrupted`, a failing block becomes placeholder records and
/// is flagged in its [`DecodedBlock`]; otherwise the first failure aborts
/// the run.
pub fn run_decompress(
    session: &mut ReaderSession,
    plan: &[IndexEntry],
    threads: usize,
    skip_corrupted: bool,
    stop: &StopToken,
    mut sink: impl FnMut(DecodedBlock) -> Result<()>,
) -> Result<()> {
    if plan.is_empty() {
        return Ok(());
    }
    let workers = threads.max(1);
    let depth = (workers * 2).max(2);
    let global: GlobalHeader = session.header().clone();

    let (job_tx, job_rx) = bounded::<(usize, IndexEntry, Vec<u8>)>(depth);
    let (done_tx, done_rx) = bounded::<(usize, Result<DecodedBlock>)>(depth + workers);

    let mut sink_err: Option<FqcError> = None;
    let mut fatal: Option<FqcError> = None;

    thread::scope(|scope| {
        // ── Reader: sequential block fetch through the session ──────────
        let reader = {
            let stop = stop.clone();
            scope.spawn(move || -> Result<()> {
                for (pos, entry) in plan.iter().enumerate() {
                    if stop.is_stopped() {
                        break;
                    }
                    // A fetch failure follows the same corruption policy
                    // as a decode failure: an empty job decodes to an
                    // error, which the workers turn into placeholders.
                    let bytes = match session.read_block_bytes(entry) {
                        Ok(b) => b,
                        Err(_) if skip_corrupted => Vec::new(),
                        Err(e) => return Err(e),
                    };
                    if job_tx.send((pos, *entry, bytes)).is_err() {
                        break;
                    }
                }
                Ok(())
            })
        };

        // ── Workers ─────────────────────────────────────────────────────
        for _ in 0..workers {
            let job_rx = job_rx.clone();
            let done_tx = done_tx.clone();
            let global = &global;
            let stop = stop.clone();
            scope.spawn(move || {
                while let Ok((pos, entry, bytes)) = job_rx.recv() {
                    if stop.is_stopped() {
                        break;
                    }
                    let result = match decompress_block(&bytes, &entry, global) {
                        Ok(records) => Ok(DecodedBlock {
                            entry,
                            records,
                            corrupted: false,
                        }),
                        Err(_) if skip_corrupted => Ok(DecodedBlock {
                            entry,
                            records: placeholder_records(&bytes, &entry, global),
                            corrupted: true,
                        }),
                        Err(e) => Err(e),
                    };
                    if done_tx.send((pos, result)).is_err() {
                        break;
                    }
                }
            });
        }
        drop(job_rx);
        drop(done_tx);

        // ── Ordered emission on the calling thread ──────────────────────
        let mut pending: BTreeMap<usize, Result<DecodedBlock>> = BTreeMap::new();
        let mut expected = 0usize;
        while let Ok((pos, result)) = done_rx.recv() {
            if stop.is_stopped() || fatal.is_some() || sink_err.is_some() {
                break;
            }
            pending.insert(pos, result);
            while let Some(entry) = pending.first_entry() {
                if *entry.key() != expected {
                    break;
                }
                match entry.remove() {
                    Ok(block) => {
                        if let Err(e) = sink(block) {
                            sink_err = Some(e);
                            stop.stop();
                            break;
                        }
                    }
                    Err(e) => {
                        fatal = Some(e);
                        stop.stop();
                        break;
                    }
                }
                expected += 1;
            }
        }
        drop(done_rx);

        if let Err(e) = reader.join().expect("reader stage panicked") {
            if fatal.is_none() {
                fatal = Some(e);
            }
        }
    });

    if let Some(e) = fatal {
        return Err(e);
    }
    if let Some(e) = sink_err {
        return Err(e);
    }
    if stop.is_stopped() {
        return Err(FqcError::Cancelled);
    }
    Ok(())
}
