//! Archive reader session.
//!
//! Opens the file read-only, validates the preamble and footer, and loads
//! the heavier structures lazily: the block index on first use, the
//! reorder map only when original-order access actually needs it.
//! Decoding requires a seekable source; the footer is the entry point
//! and lives at `SEEK_END − 32`.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use crate::display::display_line;
use crate::error::{FqcError, Result};
use crate::reorder_map::ReorderMap;
use crate::xxhash::{Xxh64State, CHECKSUM_SEED};

use super::format::{
    index_from_bytes, Footer, GlobalHeader, IndexEntry, FOOTER_SIZE, FORMAT_MAJOR,
    FORMAT_MINOR, MAGIC, PREAMBLE_SIZE,
};

/// Read-only session over one archive.
pub struct ReaderSession {
    path: PathBuf,
    file: File,
    file_len: u64,
    header: GlobalHeader,
    footer: Footer,
    /// Offset of the first block.
    blocks_start: u64,
    index: Option<Vec<IndexEntry>>,
    map: Option<ReorderMap>,
}

impl ReaderSession {
    /// Open and validate preamble, global header, and footer.
    pub fn open(path: &Path) -> Result<Self> {
        let mut file = File::open(path).map_err(|e| {
            FqcError::Io(std::io::Error::new(
                e.kind(),
                format!("cannot open {}: {e}", path.display()),
            ))
        })?;
        let file_len = file.metadata()?.len();
        if file_len < PREAMBLE_SIZE + FOOTER_SIZE {
            return Err(FqcError::format_at("file too small to be an fqc archive", 0));
        }

        // Preamble.
        let mut preamble = [0u8; PREAMBLE_SIZE as usize];
        file.read_exact(&mut preamble)?;
        if preamble[..MAGIC.len()] != MAGIC {
            return Err(FqcError::format_at("bad magic (not an fqc archive)", 0));
        }
        let version = preamble[MAGIC.len()];
        let (major, minor) = (version >> 4, version & 0x0F);
        if major != FORMAT_MAJOR {
            return Err(FqcError::format(format!(
                "archive format {major}.{minor} incompatible with this build ({FORMAT_MAJOR}.{FORMAT_MINOR})"
            )));
        }
        if minor > FORMAT_MINOR {
            display_line(
                2,
                &format!(
                    "warning: archive format {major}.{minor} newer than this build \
                     ({FORMAT_MAJOR}.{FORMAT_MINOR}); attempting read"
                ),
            );
        }

        // Global header: size prefix, then the full header.
        let mut size_buf = [0u8; 4];
        file.read_exact(&mut size_buf)?;
        let header_size = u32::from_le_bytes(size_buf);
        if u64::from(header_size) + PREAMBLE_SIZE + FOOTER_SIZE > file_len || header_size < 4 {
            return Err(FqcError::format_at(
                "global header size out of range",
                PREAMBLE_SIZE,
            ));
        }
        let mut header_buf = vec![0u8; header_size as usize];
        header_buf[..4].copy_from_slice(&size_buf);
        file.read_exact(&mut header_buf[4..])?;
        let (header, _) = GlobalHeader::from_bytes(&header_buf)?;
        let blocks_start = PREAMBLE_SIZE + u64::from(header_size);

        // Footer.
        file.seek(SeekFrom::End(-(FOOTER_SIZE as i64)))?;
        let mut footer_buf = [0u8; FOOTER_SIZE as usize];
        file.read_exact(&mut footer_buf)?;
        let footer = Footer::from_bytes(&footer_buf)?;
        if footer.index_offset < blocks_start || footer.index_offset >= file_len - FOOTER_SIZE {
            return Err(FqcError::format("footer index offset out of range"));
        }
        if header.has_reorder_map() != (footer.reorder_map_offset != 0) {
            return Err(FqcError::format(
                "header and footer disagree about the reorder map",
            ));
        }

        Ok(ReaderSession {
            path: path.to_path_buf(),
            file,
            file_len,
            header,
            footer,
            blocks_start,
            index: None,
            map: None,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn header(&self) -> &GlobalHeader {
        &self.header
    }

    pub fn footer(&self) -> &Footer {
        &self.footer
    }

    pub fn file_len(&self) -> u64 {
        self.file_len
    }

    /// Load (or return the cached) block index.
    pub fn index(&mut self) -> Result<&[IndexEntry]> {
        if self.index.is_none() {
            let end = self.file_len - FOOTER_SIZE;
            let len = (end - self.footer.index_offset) as usize;
            let mut buf = vec![0u8; len];
            self.file.seek(SeekFrom::Start(self.footer.index_offset))?;
            self.file.read_exact(&mut buf)?;
            self.index = Some(index_from_bytes(&buf, self.header.total_read_count)?);
        }
        Ok(self.index.as_ref().unwrap())
    }

    /// Load (or return the cached) reorder map; `None` when the archive
    /// stores reads in input order.
    pub fn reorder_map(&mut self) -> Result<Option<&ReorderMap>> {
        if self.footer.reorder_map_offset == 0 {
            return Ok(None);
        }
        if self.map.is_none() {
            let len = (self.footer.index_offset - self.footer.reorder_map_offset) as usize;
            let mut buf = vec![0u8; len];
            self.file
                .seek(SeekFrom::Start(self.footer.reorder_map_offset))?;
            self.file.read_exact(&mut buf)?;
            let map = ReorderMap::deserialize(&buf)?;
            if map.len() != self.header.total_read_count {
                return Err(FqcError::format(format!(
                    "reorder map covers {} reads but header declares {}",
                    map.len(),
                    self.header.total_read_count
                )));
            }
            self.map = Some(map);
        }
        Ok(self.map.as_ref())
    }

    /// Raw bytes of one block (header plus payload).
    pub fn read_block_bytes(&mut self, entry: &IndexEntry) -> Result<Vec<u8>> {
        if entry.offset + entry.compressed_size > self.file_len - FOOTER_SIZE {
            return Err(FqcError::format_at(
                "index entry points past end of data",
                entry.offset,
            ));
        }
        let mut buf = vec![0u8; entry.compressed_size as usize];
        self.file.seek(SeekFrom::Start(entry.offset))?;
        self.file.read_exact(&mut buf)?;
        Ok(buf)
    }

    /// Recompute the global checksum over `[0, footer)` and compare.
    pub fn verify_global_checksum(&mut self) -> Result<()> {
        let end = self.file_len - FOOTER_SIZE;
        self.file.seek(SeekFrom::Start(0))?;
        let mut hash = Xxh64State::new(CHECKSUM_SEED);
        let mut remaining = end;
        let mut buf = vec![0u8; 1 << 20];
        while remaining > 0 {
            let want = buf.len().min(remaining as usize);
            self.file.read_exact(&mut buf[..want])?;
            hash.update(&buf[..want]);
            remaining -= want as u64;
        }
        let actual = hash.digest();
        if actual != self.footer.global_checksum {
            return Err(FqcError::ChecksumMismatch {
                block_id: None,
                expected: self.footer.global_checksum,
                actual,
            });
        }
        Ok(())
    }
}
