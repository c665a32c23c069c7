//! Identifier codec.
//!
//! Sequencer ids are highly regular (`SIM:1:FCX:1:1:422:907`), so the
//! preferred mode tokenizes the first id of a block into a pattern
//! (delimiters, static text, and dynamic integer columns) and stores each
//! matching id as one integer per dynamic column, delta-coded. Ids that do
//! not fit the pattern are kept verbatim as exceptions; if too few ids fit
//! (or the pattern has no integer column to exploit) the whole block falls
//! back to exact storage. Everything ends up behind Zstd either way.
//!
//! # Payload framing
//!
//! One mode byte (`0x01` exact, `0x02` tokenize, `0x03` discard), then for
//! the non-discard modes a varint uncompressed size followed by the Zstd
//! payload.

use crate::config::IdMode;
use crate::error::{FqcError, Result};
use crate::varint::{read_varint, write_delta_u64s, write_varint};

use super::{CodecTag, DELTA_ZSTD_V1};

/// Delimiter set splitting an id into tokens.
pub const DELIMITERS: &[u8] = b":_/.|-;,";

const MODE_EXACT: u8 = 0x01;
const MODE_TOKENIZE: u8 = 0x02;
const MODE_DISCARD: u8 = 0x03;

#[inline]
fn is_delimiter(b: u8) -> bool {
    DELIMITERS.contains(&b)
}

// ---------------------------------------------------------------------------
// Tokenization
// ---------------------------------------------------------------------------

/// Structural split of one id: delimiters stand alone, everything between
/// them is a run.
#[derive(Debug, PartialEq, Eq)]
enum Run<'a> {
    Delim(u8),
    Text(&'a [u8]),
}

fn split_runs(id: &[u8]) -> Vec<Run<'_>> {
    let mut runs = Vec::new();
    let mut start = 0;
    for (i, &b) in id.iter().enumerate() {
        if is_delimiter(b) {
            if i > start {
                runs.push(Run::Text(&id[start..i]));
            }
            runs.push(Run::Delim(b));
            start = i + 1;
        }
    }
    if id.len() > start {
        runs.push(Run::Text(&id[start..]));
    }
    runs
}

/// A pure-digit run that round-trips through `u64` formatting: no leading
/// zero (unless it is exactly "0") and within range.
fn parse_plain_int(text: &[u8]) -> Option<u64> {
    if text.is_empty() || !text.iter().all(|b| b.is_ascii_digit()) {
        return None;
    }
    if text.len() > 1 && text[0] == b'0' {
        return None;
    }
    std::str::from_utf8(text).ok()?.parse::<u64>().ok()
}

/// One pattern slot, recorded from the first id of the block.
#[derive(Debug)]
enum PatternToken {
    Static(Vec<u8>),
    /// Dynamic column; starts as an integer column and is relaxed to a
    /// string column if any matching id fails integer parsing.
    Dynamic { int: bool },
    Delimiter(u8),
}

struct Pattern {
    tokens: Vec<PatternToken>,
}

impl Pattern {
    fn detect(first: &[u8]) -> Self {
        let tokens = split_runs(first)
            .into_iter()
            .map(|run| match run {
                Run::Delim(b) => PatternToken::Delimiter(b),
                Run::Text(t) => {
                    if parse_plain_int(t).is_some() {
                        PatternToken::Dynamic { int: true }
                    } else {
                        PatternToken::Static(t.to_vec())
                    }
                }
            })
            .collect();
        Pattern { tokens }
    }

    fn has_int_column(&self) -> bool {
        self.tokens
            .iter()
            .any(|t| matches!(t, PatternToken::Dynamic { int: true }))
    }

    /// Check `id` against the pattern. On a match returns the dynamic
    /// values in token order and relaxes int columns that fail to parse.
    fn try_match<'a>(&mut self, id: &'a [u8]) -> Option<Vec<&'a [u8]>> {
        let runs = split_runs(id);
        if runs.len() != self.tokens.len() {
            return None;
        }
        let mut dynamics = Vec::new();
        for (tok, run) in self.tokens.iter().zip(&runs) {
            match (tok, run) {
                (PatternToken::Delimiter(d), Run::Delim(b)) if d == b => {}
                (PatternToken::Static(s), Run::Text(t)) if s.as_slice() == *t => {}
                (PatternToken::Dynamic { .. }, Run::Text(t)) => dynamics.push(*t),
                _ => return None,
            }
        }
        // Relax int columns whose value does not parse.
        let mut di = 0;
        for tok in &mut self.tokens {
            if let PatternToken::Dynamic { int } = tok {
                if *int && parse_plain_int(dynamics[di]).is_none() {
                    *int = false;
                }
                di += 1;
            }
        }
        Some(dynamics)
    }
}

// ---------------------------------------------------------------------------
// Encode
// ---------------------------------------------------------------------------

fn zstd_frame(out: &mut Vec<u8>, mode: u8, raw: &[u8], level: i32) -> Result<()> {
    out.push(mode);
    write_varint(out, raw.len() as u64);
    let compressed = zstd::bulk::compress(raw, level)?;
    out.extend_from_slice(&compressed);
    Ok(())
}

fn encode_exact(ids: &[&[u8]], level: i32) -> Result<Vec<u8>> {
    let mut raw = Vec::new();
    for id in ids {
        write_varint(&mut raw, id.len() as u64);
        raw.extend_from_slice(id);
    }
    let mut out = Vec::new();
    zstd_frame(&mut out, MODE_EXACT, &raw, level)?;
    Ok(out)
}

fn encode_tokenized(
    ids: &[&[u8]],
    pattern: &Pattern,
    matches: &[Option<Vec<Vec<u8>>>],
    level: i32,
) -> Result<Vec<u8>> {
    let mut raw = Vec::new();
    write_varint(&mut raw, ids.len() as u64);

    // Pattern header.
    write_varint(&mut raw, pattern.tokens.len() as u64);
    for tok in &pattern.tokens {
        match tok {
            PatternToken::Static(s) => {
                raw.push(0);
                write_varint(&mut raw, s.len() as u64);
                raw.extend_from_slice(s);
            }
            PatternToken::Dynamic { int: true } => raw.push(1),
            PatternToken::Dynamic { int: false } => raw.push(2),
            PatternToken::Delimiter(b) => {
                raw.push(3);
                raw.push(*b);
            }
        }
    }

    // Exceptions: ids that did not match, stored verbatim.
    let exceptions: Vec<usize> = matches
        .iter()
        .enumerate()
        .filter(|(_, m)| m.is_none())
        .map(|(i, _)| i)
        .collect();
    write_varint(&mut raw, exceptions.len() as u64);
    for &i in &exceptions {
        write_varint(&mut raw, i as u64);
        write_varint(&mut raw, ids[i].len() as u64);
        raw.extend_from_slice(ids[i]);
    }

    // Column streams over matching ids, in token order.
    let n_dynamic = matches
        .iter()
        .flatten()
        .next()
        .map(|v| v.len())
        .unwrap_or(0);
    let mut col = 0;
    for tok in &pattern.tokens {
        let int = match tok {
            PatternToken::Dynamic { int } => *int,
            _ => continue,
        };
        debug_assert!(col < n_dynamic);
        if int {
            let values: Vec<u64> = matches
                .iter()
                .flatten()
                .map(|vals| {
                    parse_plain_int(&vals[col])
                        .expect("int column contains a non-integer after relaxation")
                })
                .collect();
            write_delta_u64s(&mut raw, &values);
        } else {
            let values: Vec<&[u8]> = matches
                .iter()
                .flatten()
                .map(|vals| vals[col].as_slice())
                .collect();
            write_varint(&mut raw, values.len() as u64);
            for v in values {
                write_varint(&mut raw, v.len() as u64);
                raw.extend_from_slice(v);
            }
        }
        col += 1;
    }

    let mut out = Vec::new();
    zstd_frame(&mut out, MODE_TOKENIZE, &raw, level)?;
    Ok(out)
}

/// Encode one block's ids under `mode`. Returns the codec tag for the
/// block header and the framed payload.
pub fn encode_ids(
    ids: &[&[u8]],
    mode: IdMode,
    match_threshold: f64,
    zstd_level: i32,
) -> Result<(CodecTag, Vec<u8>)> {
    let payload = match mode {
        IdMode::Discard => vec![MODE_DISCARD],
        IdMode::Exact => encode_exact(ids, zstd_level)?,
        IdMode::Tokenize => {
            if ids.is_empty() {
                encode_exact(ids, zstd_level)?
            } else {
                let mut pattern = Pattern::detect(ids[0]);
                // Owned copies of the dynamic values: relaxation may widen
                // columns while later ids are still being matched.
                let matches: Vec<Option<Vec<Vec<u8>>>> = ids
                    .iter()
                    .map(|id| {
                        pattern
                            .try_match(id)
                            .map(|vals| vals.into_iter().map(|v| v.to_vec()).collect())
                    })
                    .collect();
                let matched = matches.iter().filter(|m| m.is_some()).count();
                let ratio = matched as f64 / ids.len() as f64;
                if ratio >= match_threshold && pattern.has_int_column() {
                    encode_tokenized(ids, &pattern, &matches, zstd_level)?
                } else {
                    encode_exact(ids, zstd_level)?
                }
            }
        }
    };
    Ok((DELTA_ZSTD_V1, payload))
}

// ---------------------------------------------------------------------------
// Decode
// ---------------------------------------------------------------------------

/// Decoded ids, or the signal that the archive stored none.
pub enum IdDecodeResult {
    Ids(Vec<Vec<u8>>),
    Discarded,
}

fn read_bytes<'a>(buf: &'a [u8], pos: &mut usize, len: usize) -> Result<&'a [u8]> {
    let end = pos
        .checked_add(len)
        .filter(|&e| e <= buf.len())
        .ok_or_else(|| FqcError::format("truncated id payload"))?;
    let slice = &buf[*pos..end];
    *pos = end;
    Ok(slice)
}

fn decode_exact(raw: &[u8], n_reads: usize) -> Result<Vec<Vec<u8>>> {
    let mut pos = 0;
    let mut ids = Vec::with_capacity(n_reads);
    for _ in 0..n_reads {
        let len = read_varint(raw, &mut pos)? as usize;
        ids.push(read_bytes(raw, &mut pos, len)?.to_vec());
    }
    if pos != raw.len() {
        return Err(FqcError::format("trailing bytes in exact id payload"));
    }
    Ok(ids)
}

fn decode_tokenized(raw: &[u8], n_reads: usize) -> Result<Vec<Vec<u8>>> {
    let mut pos = 0;
    let stored_reads = read_varint(raw, &mut pos)? as usize;
    if stored_reads != n_reads {
        return Err(FqcError::format(format!(
            "id payload read count {stored_reads} does not match block count {n_reads}"
        )));
    }

    // Pattern header.
    let n_tokens = read_varint(raw, &mut pos)? as usize;
    let mut tokens = Vec::with_capacity(n_tokens);
    for _ in 0..n_tokens {
        let kind = *raw
            .get(pos)
            .ok_or_else(|| FqcError::format("truncated id pattern"))?;
        pos += 1;
        tokens.push(match kind {
            0 => {
                let len = read_varint(raw, &mut pos)? as usize;
                PatternToken::Static(read_bytes(raw, &mut pos, len)?.to_vec())
            }
            1 => PatternToken::Dynamic { int: true },
            2 => PatternToken::Dynamic { int: false },
            3 => {
                let d = *raw
                    .get(pos)
                    .ok_or_else(|| FqcError::format("truncated id pattern delimiter"))?;
                pos += 1;
                PatternToken::Delimiter(d)
            }
            other => {
                return Err(FqcError::format(format!(
                    "unknown id pattern token kind {other}"
                )))
            }
        });
    }

    // Exceptions.
    let n_exceptions = read_varint(raw, &mut pos)? as usize;
    if n_exceptions > n_reads {
        return Err(FqcError::format("more id exceptions than reads"));
    }
    let mut exceptions: Vec<(usize, Vec<u8>)> = Vec::with_capacity(n_exceptions);
    for _ in 0..n_exceptions {
        let idx = read_varint(raw, &mut pos)? as usize;
        let len = read_varint(raw, &mut pos)? as usize;
        exceptions.push((idx, read_bytes(raw, &mut pos, len)?.to_vec()));
    }
    let n_matched = n_reads
        .checked_sub(n_exceptions)
        .ok_or_else(|| FqcError::format("more id exceptions than reads"))?;

    // Column streams.
    enum Column {
        Int(Vec<u64>),
        Str(Vec<Vec<u8>>),
    }
    let mut columns = Vec::new();
    for tok in &tokens {
        match tok {
            PatternToken::Dynamic { int: true } => {
                let values = crate::varint::read_delta_u64s(raw, &mut pos)?;
                if values.len() != n_matched {
                    return Err(FqcError::format("id int column length mismatch"));
                }
                columns.push(Column::Int(values));
            }
            PatternToken::Dynamic { int: false } => {
                let n = read_varint(raw, &mut pos)? as usize;
                if n != n_matched {
                    return Err(FqcError::format("id string column length mismatch"));
                }
                let mut values = Vec::with_capacity(n);
                for _ in 0..n {
                    let len = read_varint(raw, &mut pos)? as usize;
                    values.push(read_bytes(raw, &mut pos, len)?.to_vec());
                }
                columns.push(Column::Str(values));
            }
            _ => {}
        }
    }
    if pos != raw.len() {
        return Err(FqcError::format("trailing bytes in tokenized id payload"));
    }

    // Reassemble.
    let mut exc_iter = exceptions.into_iter().peekable();
    let mut ids = Vec::with_capacity(n_reads);
    let mut matched_row = 0usize;
    for i in 0..n_reads {
        if exc_iter.peek().map(|(idx, _)| *idx) == Some(i) {
            ids.push(exc_iter.next().unwrap().1);
            continue;
        }
        let mut id = Vec::new();
        let mut col = 0usize;
        for tok in &tokens {
            match tok {
                PatternToken::Static(s) => id.extend_from_slice(s),
                PatternToken::Delimiter(d) => id.push(*d),
                PatternToken::Dynamic { .. } => {
                    match &columns[col] {
                        Column::Int(values) => {
                            id.extend_from_slice(values[matched_row].to_string().as_bytes())
                        }
                        Column::Str(values) => id.extend_from_slice(&values[matched_row]),
                    }
                    col += 1;
                }
            }
        }
        ids.push(id);
        matched_row += 1;
    }
    Ok(ids)
}

/// Decode one block's id payload.
pub fn decode_ids(payload: &[u8], n_reads: usize) -> Result<IdDecodeResult> {
    let mode = *payload
        .first()
        .ok_or_else(|| FqcError::format("empty id payload"))?;
    if mode == MODE_DISCARD {
        return Ok(IdDecodeResult::Discarded);
    }
    let mut pos = 1;
    let raw_len = read_varint(payload, &mut pos)? as usize;
    let raw = zstd::bulk::decompress(&payload[pos..], raw_len)
        .map_err(|e| FqcError::format(format!("id payload zstd: {e}")))?;
    if raw.len() != raw_len {
        return Err(FqcError::format("id payload size does not match frame"));
    }
    match mode {
        MODE_EXACT => Ok(IdDecodeResult::Ids(decode_exact(&raw, n_reads)?)),
        MODE_TOKENIZE => Ok(IdDecodeResult::Ids(decode_tokenized(&raw, n_reads)?)),
        other => Err(FqcError::format(format!("unknown id mode byte {other:#x}"))),
    }
}

// ---------------------------------------------------------------------------
// Discard-mode synthesis
// ---------------------------------------------------------------------------

/// Prefix for synthesized ids.
pub const SYNTH_PREFIX: &str = "FQC.";

/// Id for read `n` when the archive stored none.
pub fn synthesize_id(n: u64) -> Vec<u8> {
    format!("{SYNTH_PREFIX}{n}").into_bytes()
}

/// Id for mate `mate` (1 or 2) of pair `pair` in an interleaved archive.
pub fn synthesize_paired_id(pair: u64, mate: u8) -> Vec<u8> {
    format!("{SYNTH_PREFIX}{pair}/{mate}").into_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn as_refs(ids: &[Vec<u8>]) -> Vec<&[u8]> {
        ids.iter().map(|v| v.as_slice()).collect()
    }

    fn decoded(payload: &[u8], n: usize) -> Vec<Vec<u8>> {
        match decode_ids(payload, n).unwrap() {
            IdDecodeResult::Ids(ids) => ids,
            IdDecodeResult::Discarded => panic!("unexpected discard"),
        }
    }

    #[test]
    fn split_runs_keeps_delimiters() {
        let runs = split_runs(b"SIM:1:FCX/ab");
        assert_eq!(
            runs,
            vec![
                Run::Text(b"SIM"),
                Run::Delim(b':'),
                Run::Text(b"1"),
                Run::Delim(b':'),
                Run::Text(b"FCX"),
                Run::Delim(b'/'),
                Run::Text(b"ab"),
            ]
        );
    }

    #[test]
    fn plain_int_rejects_leading_zeros() {
        assert_eq!(parse_plain_int(b"0"), Some(0));
        assert_eq!(parse_plain_int(b"42"), Some(42));
        assert_eq!(parse_plain_int(b"042"), None);
        assert_eq!(parse_plain_int(b"18446744073709551616"), None); // u64::MAX + 1
        assert_eq!(parse_plain_int(b""), None);
        assert_eq!(parse_plain_int(b"4a2"), None);
    }

    #[test]
    fn illumina_style_ids_tokenize_round_trip() {
        let ids: Vec<Vec<u8>> = (0..500)
            .map(|i| format!("SIM:1:FCX:1:1:{}:{}", i * 3 + 1, 9000 - i).into_bytes())
            .collect();
        let refs = as_refs(&ids);
        let (tag, payload) = encode_ids(&refs, IdMode::Tokenize, 0.8, 3).unwrap();
        assert_eq!(tag, DELTA_ZSTD_V1);
        assert_eq!(payload[0], MODE_TOKENIZE);
        assert_eq!(decoded(&payload, ids.len()), ids);
    }

    #[test]
    fn irregular_ids_fall_back_to_exact() {
        let ids: Vec<Vec<u8>> = (0..100)
            .map(|i| format!("{:x}-{}", i * 7919, "x".repeat(i % 5)).into_bytes())
            .collect();
        let refs = as_refs(&ids);
        let (_, payload) = encode_ids(&refs, IdMode::Tokenize, 0.8, 3).unwrap();
        // The varying suffix changes the token structure from id to id, so
        // almost nothing matches the first id's pattern.
        assert_eq!(payload[0], MODE_EXACT);
        assert_eq!(decoded(&payload, ids.len()), ids);
    }

    #[test]
    fn minority_outliers_become_exceptions() {
        let mut ids: Vec<Vec<u8>> = (0..95)
            .map(|i| format!("RUN:7:{}:{}", i, i * 2).into_bytes())
            .collect();
        for i in 0..5 {
            ids.push(format!("weird id {i}").into_bytes());
        }
        let refs = as_refs(&ids);
        let (_, payload) = encode_ids(&refs, IdMode::Tokenize, 0.8, 3).unwrap();
        assert_eq!(payload[0], MODE_TOKENIZE);
        assert_eq!(decoded(&payload, ids.len()), ids);
    }

    #[test]
    fn int_column_relaxes_to_string_on_leading_zero() {
        // Same structure throughout, but the last column sometimes carries
        // a leading zero, which u64 formatting would destroy.
        let ids: Vec<Vec<u8>> = (0..50)
            .map(|i| format!("R:1:{:03}", i).into_bytes())
            .collect();
        let refs = as_refs(&ids);
        let (_, payload) = encode_ids(&refs, IdMode::Tokenize, 0.8, 3).unwrap();
        assert_eq!(decoded(&payload, ids.len()), ids);
    }

    #[test]
    fn exact_mode_round_trip_with_empty_and_long_ids() {
        let ids: Vec<Vec<u8>> = vec![
            b"".to_vec(),
            b"plain".to_vec(),
            vec![b'Z'; 5000],
            b"trailing:".to_vec(),
        ];
        let refs = as_refs(&ids);
        let (_, payload) = encode_ids(&refs, IdMode::Exact, 0.8, 3).unwrap();
        assert_eq!(payload[0], MODE_EXACT);
        assert_eq!(decoded(&payload, ids.len()), ids);
    }

    #[test]
    fn discard_mode_and_synthesis() {
        let ids: Vec<Vec<u8>> = vec![b"a".to_vec(), b"b".to_vec()];
        let refs = as_refs(&ids);
        let (_, payload) = encode_ids(&refs, IdMode::Discard, 0.8, 3).unwrap();
        assert_eq!(payload, vec![MODE_DISCARD]);
        assert!(matches!(
            decode_ids(&payload, 2).unwrap(),
            IdDecodeResult::Discarded
        ));
        assert_eq!(synthesize_id(7), b"FQC.7".to_vec());
        assert_eq!(synthesize_paired_id(3, 2), b"FQC.3/2".to_vec());
    }

    #[test]
    fn truncated_payload_is_detected() {
        let ids: Vec<Vec<u8>> = (0..20).map(|i| format!("A:{i}").into_bytes()).collect();
        let refs = as_refs(&ids);
        let (_, payload) = encode_ids(&refs, IdMode::Tokenize, 0.8, 3).unwrap();
        assert!(decode_ids(&payload[..payload.len() - 1], 20).is_err());
    }
}
