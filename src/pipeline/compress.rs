//! Compression pipeline: batch → compress → ordered write.

use std::collections::BTreeMap;
use std::sync::Mutex;
use std::thread;

use crossbeam_channel::{bounded, Receiver, Sender};

use crate::archive::WriterSession;
use crate::block::{compress_block, BlockContext, CompressedBlock};
use crate::display::display_level;
use crate::error::{FqcError, Result};
use crate::fastq::ReadRecord;
use crate::reorder_map::ReorderMap;
use crate::stats::CompressStats;

use super::{estimate_block_bytes, queue_depth, StopToken};

/// Records flowing into the pipeline: the analyzer's in-memory permuted
/// store, or a single-pass stream.
pub enum RecordSource<'a> {
    Memory(Vec<ReadRecord>),
    Stream(Box<dyn Iterator<Item = Result<ReadRecord>> + Send + 'a>),
}

/// One proto-block, cut by the reader stage.
struct ProtoBlock {
    block_id: u32,
    records: Vec<ReadRecord>,
}

/// Pipeline tunables resolved by the caller.
pub struct CompressPlan {
    pub reads_per_block: u32,
    pub max_block_bases: u64,
    pub threads: usize,
    pub memory_budget: u64,
    pub median_len: usize,
}

/// First error wins; every stage checks the stop token afterwards.
struct ErrorSlot {
    slot: Mutex<Option<FqcError>>,
    stop: StopToken,
}

impl ErrorSlot {
    fn new(stop: StopToken) -> Self {
        ErrorSlot {
            slot: Mutex::new(None),
            stop,
        }
    }

    fn record(&self, err: FqcError) {
        let mut slot = self.slot.lock().unwrap();
        if slot.is_none() {
            *slot = Some(err);
        }
        self.stop.stop();
    }

    fn take(&self) -> Option<FqcError> {
        self.slot.lock().unwrap().take()
    }
}

/// Run the full compression pipeline and commit the archive.
///
/// On any failure (including cancellation) the session is aborted and the
/// temp file removed; the target path is only ever touched by the final
/// atomic rename inside commit.
pub fn run_compress(
    source: RecordSource<'_>,
    mut session: WriterSession,
    ctx: &BlockContext,
    plan: &CompressPlan,
    reorder_map: Option<&ReorderMap>,
    stop: &StopToken,
) -> Result<CompressStats> {
    let workers = plan.threads.max(1);
    let depth = queue_depth(
        workers,
        plan.memory_budget,
        estimate_block_bytes(plan.reads_per_block, plan.median_len),
    );

    let (proto_tx, proto_rx): (Sender<ProtoBlock>, Receiver<ProtoBlock>) = bounded(depth);
    let (done_tx, done_rx): (Sender<CompressedBlock>, Receiver<CompressedBlock>) =
        bounded(depth + workers);

    let errors = ErrorSlot::new(stop.clone());
    let mut stats = CompressStats::default();

    let outcome: Result<()> = thread::scope(|scope| {
        // ── Reader ──────────────────────────────────────────────────────
        let reader_stats = {
            let errors = &errors;
            scope.spawn(move || {
                let mut reads = 0u64;
                let mut bases = 0u64;
                let mut bytes_in = 0u64;
                let mut block_id = 0u32;
                let mut batch: Vec<ReadRecord> = Vec::new();
                let mut batch_bases = 0u64;

                let mut push = |rec: ReadRecord,
                                batch: &mut Vec<ReadRecord>,
                                batch_bases: &mut u64,
                                block_id: &mut u32|
                 -> bool {
                    reads += 1;
                    bases += rec.seq.len() as u64;
                    bytes_in += (rec.id.len() + rec.seq.len() + rec.qual.len() + 6) as u64;
                    *batch_bases += rec.seq.len() as u64;
                    batch.push(rec);
                    if batch.len() >= plan.reads_per_block as usize
                        || *batch_bases >= plan.max_block_bases
                    {
                        let records = std::mem::take(batch);
                        *batch_bases = 0;
                        let id = *block_id;
                        *block_id += 1;
                        if proto_tx
                            .send(ProtoBlock {
                                block_id: id,
                                records,
                            })
                            .is_err()
                        {
                            return false;
                        }
                    }
                    true
                };

                match source {
                    RecordSource::Memory(records) => {
                        for rec in records {
                            if errors.stop.is_stopped() {
                                break;
                            }
                            if !push(rec, &mut batch, &mut batch_bases, &mut block_id) {
                                break;
                            }
                        }
                    }
                    RecordSource::Stream(iter) => {
                        for item in iter {
                            if errors.stop.is_stopped() {
                                break;
                            }
                            match item {
                                Ok(rec) => {
                                    if !push(rec, &mut batch, &mut batch_bases, &mut block_id) {
                                        break;
                                    }
                                }
                                Err(e) => {
                                    errors.record(e);
                                    break;
                                }
                            }
                        }
                    }
                }
                if !batch.is_empty() && !errors.stop.is_stopped() {
                    let _ = proto_tx.send(ProtoBlock {
                        block_id,
                        records: batch,
                    });
                }
                drop(proto_tx);
                (reads, bases, bytes_in)
            })
        };

        // ── Workers ─────────────────────────────────────────────────────
        for _ in 0..workers {
            let proto_rx = proto_rx.clone();
            let done_tx = done_tx.clone();
            let errors = &errors;
            scope.spawn(move || {
                while let Ok(proto) = proto_rx.recv() {
                    if errors.stop.is_stopped() {
                        break;
                    }
                    match compress_block(proto.block_id, &proto.records, ctx) {
                        Ok(block) => {
                            if done_tx.send(block).is_err() {
                                break;
                            }
                        }
                        Err(e) => {
                            errors.record(e);
                            break;
                        }
                    }
                }
            });
        }
        drop(proto_rx);
        drop(done_tx);

        // ── Writer ──────────────────────────────────────────────────────
        // Out-of-order completions wait in a BTreeMap keyed by block id;
        // draining in key order restores strictly ascending emission.
        let mut pending: BTreeMap<u32, CompressedBlock> = BTreeMap::new();
        let mut expected = 0u32;
        while let Ok(block) = done_rx.recv() {
            if errors.stop.is_stopped() {
                break;
            }
            pending.insert(block.header.block_id, block);
            while let Some(entry) = pending.first_entry() {
                if *entry.key() != expected {
                    break;
                }
                let block = entry.remove();
                if let Err(e) = session.write_block(&block.header, &block.payload) {
                    errors.record(e);
                    break;
                }
                for (i, &size) in block.header.sizes.iter().enumerate() {
                    stats.substream_bytes[i] += size;
                }
                display_level(
                    3,
                    &format!(
                        "\rblock {:>6}  {:>12} bytes written",
                        expected,
                        session.bytes_written()
                    ),
                );
                expected += 1;
            }
        }
        // Unblock any worker still waiting to hand over a block.
        drop(done_rx);

        let (reads, bases, bytes_in) = reader_stats.join().expect("reader stage panicked");
        stats.reads = reads;
        stats.bases = bases;
        stats.bytes_in = bytes_in;
        stats.blocks = expected as u64;

        if !pending.is_empty() && !errors.stop.is_stopped() {
            errors.record(FqcError::Internal(format!(
                "writer finished with {} undrained blocks",
                pending.len()
            )));
        }
        Ok(())
    });
    outcome?;

    if let Some(e) = errors.take() {
        session.abort();
        return Err(e);
    }
    if stop.is_stopped() {
        session.abort();
        return Err(FqcError::Cancelled);
    }

    session.set_total_read_count(stats.reads);
    stats.bytes_out = session.commit(reorder_map)?;
    display_level(3, "\n");
    Ok(stats)
}
