//! Block compression: records in, header + payload out.

use crate::archive::format::{BlockHeader, CHECKSUM_XXH64};
use crate::codec::quality::quantize_illumina8;
use crate::codec::{id, quality, sequence, DELTA_VARINT_V1};
use crate::config::QualityMode;
use crate::error::Result;
use crate::fastq::ReadRecord;
use crate::varint::write_delta_u64s;

use super::{logical_checksum, BlockContext};

/// One finished block, ready for the writer stage.
#[derive(Clone, Debug)]
pub struct CompressedBlock {
    pub header: BlockHeader,
    pub payload: Vec<u8>,
}

impl CompressedBlock {
    pub fn read_count(&self) -> u32 {
        self.header.uncompressed_count
    }
}

/// Compress one block of records. The records are already in archive
/// order; `block_id` is assigned by the reader stage.
pub fn compress_block(
    block_id: u32,
    records: &[ReadRecord],
    ctx: &BlockContext,
) -> Result<CompressedBlock> {
    let lengths: Vec<u32> = records.iter().map(|r| r.seq.len() as u32).collect();
    let uniform_read_length = match lengths.first() {
        Some(&first) if lengths.iter().all(|&l| l == first) => first,
        _ => 0,
    };

    // AUX: per-read lengths, omitted entirely for uniform blocks.
    let mut aux_payload = Vec::new();
    if uniform_read_length == 0 && !records.is_empty() {
        let as_u64: Vec<u64> = lengths.iter().map(|&l| u64::from(l)).collect();
        write_delta_u64s(&mut aux_payload, &as_u64);
    }

    // IDS.
    let id_refs: Vec<&[u8]> = records.iter().map(|r| r.id.as_slice()).collect();
    let (codec_ids, ids_payload) =
        id::encode_ids(&id_refs, ctx.id_mode, ctx.id_match_threshold, ctx.zstd_level)?;

    // SEQ.
    let seq_refs: Vec<&[u8]> = records.iter().map(|r| r.seq.as_slice()).collect();
    let (codec_seq, seq_payload) = sequence::encode_seqs(
        &seq_refs,
        ctx.class,
        ctx.overlap_long_reads,
        ctx.zstd_level,
    )?;

    // QUAL. Lossy transforms happen before modeling, and the checksum
    // hashes the transformed bytes, exactly what decoding will produce.
    let qual_refs: Vec<&[u8]> = records.iter().map(|r| r.qual.as_slice()).collect();
    let (codec_qual, qual_payload) = quality::encode_quals(
        &qual_refs,
        ctx.quality_mode,
        ctx.quality_context_order,
        ctx.quality_position_bins,
        ctx.quality_zstd_wrap,
        ctx.zstd_level,
    )?;

    // Checksum over the logical streams the decoder will reconstruct.
    let seqs: Vec<Vec<u8>> = records.iter().map(|r| r.seq.clone()).collect();
    let hashed_ids: Option<Vec<Vec<u8>>> = match ctx.id_mode {
        crate::config::IdMode::Discard => None,
        _ => Some(records.iter().map(|r| r.id.clone()).collect()),
    };
    let hashed_quals: Option<Vec<Vec<u8>>> = match ctx.quality_mode {
        QualityMode::Discard => None,
        QualityMode::Illumina8 => Some(
            records
                .iter()
                .map(|r| quantize_illumina8(&r.qual))
                .collect::<Result<_>>()?,
        ),
        _ => Some(records.iter().map(|r| r.qual.clone()).collect()),
    };
    let block_xxhash64 = logical_checksum(
        hashed_ids.as_deref(),
        &seqs,
        hashed_quals.as_deref(),
        &lengths,
    );

    // Assemble IDS | SEQ | QUAL | AUX.
    let sizes = [
        ids_payload.len() as u64,
        seq_payload.len() as u64,
        qual_payload.len() as u64,
        aux_payload.len() as u64,
    ];
    let mut offsets = [0u64; 4];
    for i in 1..4 {
        offsets[i] = offsets[i - 1] + sizes[i - 1];
    }
    let mut payload =
        Vec::with_capacity((sizes.iter().sum::<u64>()) as usize);
    payload.extend_from_slice(&ids_payload);
    payload.extend_from_slice(&seq_payload);
    payload.extend_from_slice(&qual_payload);
    payload.extend_from_slice(&aux_payload);

    let header = BlockHeader {
        block_id,
        checksum_type: CHECKSUM_XXH64,
        codec_ids,
        codec_seq,
        codec_qual,
        codec_aux: DELTA_VARINT_V1,
        block_xxhash64,
        uncompressed_count: records.len() as u32,
        uniform_read_length,
        compressed_size: payload.len() as u64,
        offsets,
        sizes,
    };
    Ok(CompressedBlock { header, payload })
}
