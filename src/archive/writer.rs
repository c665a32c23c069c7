//! Archive writer session.
//!
//! All bytes go to `<target>.tmp`; the target path only ever sees a
//! complete archive, installed by an atomic rename at commit. An
//! uncommitted session (dropped, aborted, or killed mid-pipeline)
//! leaves nothing behind but removes its temp file on the way out.
//!
//! The global checksum is streamed over every byte in write order, so
//! commit normally costs no extra I/O. The one exception is a session
//! opened without a known read count (single-pass streaming): its header
//! carries a placeholder that commit back-patches, and the checksum is
//! then recomputed with one sequential scan of the temp file.

use std::fs::{self, File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use crate::display::display_line;
use crate::error::{FqcError, Result};
use crate::reorder_map::ReorderMap;
use crate::xxhash::{Xxh64State, CHECKSUM_SEED};

use super::format::{
    BlockHeader, Footer, GlobalHeader, IndexEntry, index_to_bytes, MAGIC, PREAMBLE_SIZE,
    VERSION_BYTE,
};

/// Byte offset of `total_read_count` inside the file, for the streaming
/// back-patch: preamble, then `header_size u32 ∥ flags u64 ∥ algo u8 ∥
/// checksum u8`.
const TOTAL_READ_COUNT_OFFSET: u64 = PREAMBLE_SIZE + 4 + 8 + 1 + 1;

/// Owns the temp file, the append cursor, and the growing index.
pub struct WriterSession {
    target: PathBuf,
    temp: PathBuf,
    file: Option<File>,
    cursor: u64,
    hash: Xxh64State,
    entries: Vec<IndexEntry>,
    next_archive_id: u64,
    /// Set when the header was written with a placeholder read count.
    deferred_count: bool,
    total_read_count: u64,
    committed: bool,
}

impl WriterSession {
    /// Create `<target>.tmp` and write the preamble and global header.
    ///
    /// `header.total_read_count == u64::MAX` marks the count as not yet
    /// known; commit will back-patch it (see module docs).
    pub fn create(target: &Path, mut header: GlobalHeader) -> Result<Self> {
        let deferred_count = header.total_read_count == u64::MAX;
        if deferred_count {
            header.total_read_count = 0;
        }
        let temp = temp_path(target);
        let mut file = OpenOptions::new()
            .write(true)
            .read(true)
            .create(true)
            .truncate(true)
            .open(&temp)
            .map_err(|e| {
                FqcError::Io(std::io::Error::new(
                    e.kind(),
                    format!("cannot create {}: {e}", temp.display()),
                ))
            })?;

        let mut hash = Xxh64State::new(CHECKSUM_SEED);
        let mut preamble = Vec::with_capacity(PREAMBLE_SIZE as usize);
        preamble.extend_from_slice(&MAGIC);
        preamble.push(VERSION_BYTE);
        let header_bytes = header.to_bytes();
        file.write_all(&preamble)?;
        file.write_all(&header_bytes)?;
        hash.update(&preamble);
        hash.update(&header_bytes);

        Ok(WriterSession {
            target: target.to_path_buf(),
            temp,
            file: Some(file),
            cursor: PREAMBLE_SIZE + header_bytes.len() as u64,
            hash,
            entries: Vec::new(),
            next_archive_id: 0,
            deferred_count,
            total_read_count: header.total_read_count,
            committed: false,
        })
    }

    /// Archive id the next block must start at.
    pub fn next_archive_id(&self) -> u64 {
        self.next_archive_id
    }

    /// Blocks written so far.
    pub fn blocks_written(&self) -> usize {
        self.entries.len()
    }

    /// Bytes written so far.
    pub fn bytes_written(&self) -> u64 {
        self.cursor
    }

    /// Append one block. Blocks must arrive in strictly ascending
    /// `block_id` order with contiguous archive id ranges; the pipeline
    /// writer stage guarantees this, and the session enforces it.
    pub fn write_block(&mut self, header: &BlockHeader, payload: &[u8]) -> Result<()> {
        if header.block_id as usize != self.entries.len() {
            return Err(FqcError::Internal(format!(
                "block {} written out of order (expected {})",
                header.block_id,
                self.entries.len()
            )));
        }
        if header.compressed_size != payload.len() as u64 {
            return Err(FqcError::Internal(format!(
                "block {} header declares {} payload bytes but {} supplied",
                header.block_id,
                header.compressed_size,
                payload.len()
            )));
        }
        let file = self.file_mut()?;
        let header_bytes = header.to_bytes();
        file.write_all(&header_bytes)?;
        file.write_all(payload)?;
        self.hash.update(&header_bytes);
        self.hash.update(payload);

        self.entries.push(IndexEntry {
            offset: self.cursor,
            compressed_size: header_bytes.len() as u64 + payload.len() as u64,
            archive_id_start: self.next_archive_id,
            read_count: header.uncompressed_count,
        });
        self.cursor += header_bytes.len() as u64 + payload.len() as u64;
        self.next_archive_id += u64::from(header.uncompressed_count);
        Ok(())
    }

    /// Record the final read count for a deferred-count session.
    pub fn set_total_read_count(&mut self, n: u64) {
        self.total_read_count = n;
    }

    /// Write the optional reorder map, the index, and the footer, then
    /// atomically install the archive at the target path.
    pub fn commit(mut self, reorder_map: Option<&ReorderMap>) -> Result<u64> {
        if !self.deferred_count && self.next_archive_id != self.total_read_count {
            return Err(FqcError::Internal(format!(
                "committed {} reads but header declares {}",
                self.next_archive_id, self.total_read_count
            )));
        }

        let mut reorder_map_offset = 0u64;
        if let Some(map) = reorder_map {
            let bytes = map.serialize();
            reorder_map_offset = self.cursor;
            let file = self.file_mut()?;
            file.write_all(&bytes)?;
            self.hash.update(&bytes);
            self.cursor += bytes.len() as u64;
        }

        let index_offset = self.cursor;
        let index_bytes = index_to_bytes(&self.entries);
        {
            let file = self.file_mut()?;
            file.write_all(&index_bytes)?;
        }
        self.hash.update(&index_bytes);
        self.cursor += index_bytes.len() as u64;

        if self.deferred_count {
            self.patch_read_count_and_rehash()?;
        }

        let footer = Footer {
            index_offset,
            reorder_map_offset,
            global_checksum: self.hash.digest(),
        };
        let file = self.file_mut()?;
        file.write_all(&footer.to_bytes())?;
        file.sync_all()?;
        drop(self.file.take());

        fs::rename(&self.temp, &self.target)?;
        self.committed = true;
        let total = self.cursor + footer.to_bytes().len() as u64;
        display_line(
            3,
            &format!(
                "committed {} ({} blocks, {} bytes)",
                self.target.display(),
                self.entries.len(),
                total
            ),
        );
        Ok(total)
    }

    /// Drop the session and unlink the temp file.
    pub fn abort(mut self) {
        self.cleanup();
    }

    fn file_mut(&mut self) -> Result<&mut File> {
        self.file
            .as_mut()
            .ok_or_else(|| FqcError::Internal("writer session used after close".into()))
    }

    /// Streaming sessions: fix the header in place, then rebuild the
    /// global checksum with one sequential pass over the temp file.
    fn patch_read_count_and_rehash(&mut self) -> Result<()> {
        let count = self.total_read_count;
        let cursor = self.cursor;
        let file = self.file_mut()?;
        file.seek(SeekFrom::Start(TOTAL_READ_COUNT_OFFSET))?;
        file.write_all(&count.to_le_bytes())?;
        file.seek(SeekFrom::Start(0))?;

        let mut hash = Xxh64State::new(CHECKSUM_SEED);
        let mut remaining = cursor;
        let mut buf = vec![0u8; 1 << 20];
        while remaining > 0 {
            let want = buf.len().min(remaining as usize);
            file.read_exact(&mut buf[..want])?;
            hash.update(&buf[..want]);
            remaining -= want as u64;
        }
        file.seek(SeekFrom::Start(cursor))?;
        self.hash = hash;
        Ok(())
    }

    fn cleanup(&mut self) {
        drop(self.file.take());
        if !self.committed {
            let _ = fs::remove_file(&self.temp);
        }
    }
}

impl Drop for WriterSession {
    fn drop(&mut self) {
        self.cleanup();
    }
}

/// `<target>.tmp`, next to the target so the final rename stays within
/// one filesystem.
pub fn temp_path(target: &Path) -> PathBuf {
    let mut name = target.file_name().unwrap_or_default().to_os_string();
    name.push(".tmp");
    target.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::format::{build_flags, ALGO_FAMILY_ZSTD, CHECKSUM_XXH64};
    use crate::codec::{DELTA_VARINT_V1, DELTA_ZSTD_V1, SCM_ORDER1_V1, ZSTD_PLAIN_V1};
    use crate::config::{IdMode, LengthClass, QualityMode};
    use tempfile::TempDir;

    fn test_header(total: u64) -> GlobalHeader {
        GlobalHeader {
            flags: build_flags(
                false,
                true,
                QualityMode::Lossless,
                IdMode::Exact,
                false,
                LengthClass::Short,
                false,
            ),
            compression_algo_family: ALGO_FAMILY_ZSTD,
            checksum_type: CHECKSUM_XXH64,
            total_read_count: total,
            original_filename: b"t.fastq".to_vec(),
            timestamp: 1_700_000_000,
        }
    }

    fn test_block(block_id: u32, reads: u32, payload: &[u8]) -> BlockHeader {
        BlockHeader {
            block_id,
            checksum_type: CHECKSUM_XXH64,
            codec_ids: DELTA_ZSTD_V1,
            codec_seq: ZSTD_PLAIN_V1,
            codec_qual: SCM_ORDER1_V1,
            codec_aux: DELTA_VARINT_V1,
            block_xxhash64: 7,
            uncompressed_count: reads,
            uniform_read_length: 0,
            compressed_size: payload.len() as u64,
            offsets: [0, 0, 0, 0],
            sizes: [payload.len() as u64, 0, 0, 0],
        }
    }

    #[test]
    fn uncommitted_session_removes_temp() {
        let dir = TempDir::new().unwrap();
        let target = dir.path().join("a.fqc");
        {
            let mut w = WriterSession::create(&target, test_header(1)).unwrap();
            w.write_block(&test_block(0, 1, b"xyz"), b"xyz").unwrap();
            assert!(temp_path(&target).exists());
        }
        assert!(!temp_path(&target).exists());
        assert!(!target.exists());
    }

    #[test]
    fn abort_removes_temp() {
        let dir = TempDir::new().unwrap();
        let target = dir.path().join("a.fqc");
        let w = WriterSession::create(&target, test_header(0)).unwrap();
        w.abort();
        assert!(!temp_path(&target).exists());
    }

    #[test]
    fn commit_is_atomic_rename() {
        let dir = TempDir::new().unwrap();
        let target = dir.path().join("a.fqc");
        let mut w = WriterSession::create(&target, test_header(2)).unwrap();
        w.write_block(&test_block(0, 2, b"data"), b"data").unwrap();
        assert!(!target.exists(), "target must not exist before commit");
        let total = w.commit(None).unwrap();
        assert!(target.exists());
        assert!(!temp_path(&target).exists());
        assert_eq!(fs::metadata(&target).unwrap().len(), total);
    }

    #[test]
    fn out_of_order_block_rejected() {
        let dir = TempDir::new().unwrap();
        let target = dir.path().join("a.fqc");
        let mut w = WriterSession::create(&target, test_header(5)).unwrap();
        let err = w.write_block(&test_block(1, 5, b"p"), b"p").unwrap_err();
        assert!(matches!(err, FqcError::Internal(_)));
    }

    #[test]
    fn commit_rejects_read_count_mismatch() {
        let dir = TempDir::new().unwrap();
        let target = dir.path().join("a.fqc");
        let mut w = WriterSession::create(&target, test_header(10)).unwrap();
        w.write_block(&test_block(0, 3, b"p"), b"p").unwrap();
        assert!(w.commit(None).is_err());
    }

    #[test]
    fn deferred_count_is_patched() {
        let dir = TempDir::new().unwrap();
        let target = dir.path().join("a.fqc");
        let mut w = WriterSession::create(&target, test_header(u64::MAX)).unwrap();
        w.write_block(&test_block(0, 4, b"pppp"), b"pppp").unwrap();
        w.set_total_read_count(4);
        w.commit(None).unwrap();

        let bytes = fs::read(&target).unwrap();
        let at = TOTAL_READ_COUNT_OFFSET as usize;
        let stored = u64::from_le_bytes(bytes[at..at + 8].try_into().unwrap());
        assert_eq!(stored, 4);
    }
}
