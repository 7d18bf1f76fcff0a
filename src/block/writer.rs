//! Block writer.
//!
//! Records are appended in strictly increasing key order. Every
//! `restart_interval`-th record is stored with its full key and recorded in
//! the restart table; the others share a prefix with the previous key.

use super::record::Record;
use super::varint::{encode_key, put_varint, varint_len};
use super::{
    put_u24, BlockType, BLOCK_HEADER_LEN, BLOCK_TRAILER_LEN, MAX_RESTARTS, RESTART_OFFSET_LEN,
};
use crate::config::BlockOptions;
use crate::error::{Error, Result};
use bytes::{BufMut, Bytes};

/// A pending restart table entry.
struct Restart {
    key: Vec<u8>,
    offset: usize,
}

impl Restart {
    fn encoded_len(key: &[u8]) -> usize {
        varint_len(key.len() as u64) + key.len() + RESTART_OFFSET_LEN
    }
}

/// BlockWriter fills one fixed-size block.
///
/// The first `header_offset` bytes of the buffer belong to the caller (the
/// file header for the first block of a table) and are never modified.
/// [`BlockWriter::finish`] consumes the writer, so a finished block cannot
/// be appended to.
pub struct BlockWriter {
    buf: Vec<u8>,
    block_type: BlockType,
    header_offset: usize,
    // Write cursor for the next record.
    next: usize,
    restarts: Vec<Restart>,
    restarts_len: usize,
    last_key: Vec<u8>,
    entries: usize,
    options: BlockOptions,
}

impl BlockWriter {
    /// Create a writer for a block of `block_type`.
    ///
    /// `block` holds the caller's header in its first `header_offset` bytes;
    /// anything after that is overwritten. The buffer is resized to
    /// `options.block_size`.
    pub fn new(
        block_type: BlockType,
        mut block: Vec<u8>,
        header_offset: u32,
        options: BlockOptions,
    ) -> Result<Self> {
        options.validate()?;

        let header_offset = header_offset as usize;
        let block_size = options.block_size as usize;
        if block.len() < header_offset {
            return Err(Error::invalid_argument(format!(
                "buffer of {} bytes is shorter than header offset {}",
                block.len(),
                header_offset
            )));
        }
        if header_offset + BLOCK_HEADER_LEN + BLOCK_TRAILER_LEN > block_size {
            return Err(Error::invalid_argument(format!(
                "header offset {} leaves no room in a {} byte block",
                header_offset, block_size
            )));
        }

        block.truncate(header_offset);
        block.resize(block_size, 0);

        Ok(Self {
            buf: block,
            block_type,
            header_offset,
            next: header_offset + BLOCK_HEADER_LEN,
            restarts: Vec::new(),
            restarts_len: 0,
            last_key: Vec::new(),
            entries: 0,
            options,
        })
    }

    /// The type of records this writer accepts.
    pub fn block_type(&self) -> BlockType {
        self.block_type
    }

    /// Number of records added so far.
    pub fn entries(&self) -> usize {
        self.entries
    }

    /// Check if the block is empty
    pub fn is_empty(&self) -> bool {
        self.entries == 0
    }

    /// Bytes the finished block would occupy, excluding padding.
    pub fn estimated_size(&self) -> usize {
        self.next + self.restarts_len + BLOCK_TRAILER_LEN
    }

    /// Add a record to the block.
    ///
    /// Returns [`Error::BufferTooSmall`] if the record does not fit; the
    /// writer is left unchanged and the caller should finish this block and
    /// retry in a new one.
    pub fn add(&mut self, record: &Record) -> Result<()> {
        if record.block_type() != self.block_type {
            return Err(Error::invalid_argument(format!(
                "{:?} record added to {:?} block",
                record.block_type(),
                self.block_type
            )));
        }

        let key = record.key();
        if key.is_empty() {
            return Err(Error::invalid_argument("Key cannot be empty"));
        }
        if self.entries > 0 && key.as_slice() <= self.last_key.as_slice() {
            return Err(Error::KeyOrder { last: self.last_key.clone(), key });
        }

        let restart = self.entries % self.options.restart_interval == 0
            && self.restarts.len() < MAX_RESTARTS;
        let prev_key: &[u8] = if restart { &[] } else { &self.last_key };

        let mut scratch = Vec::new();
        encode_key(&mut scratch, prev_key, &key, record.val_type());
        record.encode_payload(&mut scratch, self.options.hash_size)?;

        let restart_len = if restart { Restart::encoded_len(&key) } else { 0 };
        let needed =
            self.next + scratch.len() + self.restarts_len + restart_len + BLOCK_TRAILER_LEN;
        if needed > self.buf.len() {
            log::trace!(
                "Block full after {} entries: need {} bytes, have {}",
                self.entries,
                needed,
                self.buf.len()
            );
            return Err(Error::BufferTooSmall { needed, available: self.buf.len() });
        }

        self.buf[self.next..self.next + scratch.len()].copy_from_slice(&scratch);
        if restart {
            self.restarts.push(Restart { key: key.clone(), offset: self.next });
            self.restarts_len += restart_len;
        }
        self.next += scratch.len();
        self.last_key = key;
        self.entries += 1;
        Ok(())
    }

    /// Finish building and return the block data
    ///
    /// Writes the restart table and trailer, then fills in the type byte and
    /// declared length. The returned buffer is `block_size` bytes long with
    /// zero padding after the declared length.
    pub fn finish(mut self) -> Bytes {
        let table_start = self.next;

        let mut table = Vec::with_capacity(self.restarts_len + BLOCK_TRAILER_LEN);
        for restart in &self.restarts {
            put_varint(&mut table, restart.key.len() as u64);
            table.put_slice(&restart.key);
            let mut offset = [0u8; RESTART_OFFSET_LEN];
            put_u24(&mut offset, restart.offset as u32);
            table.put_slice(&offset);
        }
        table.put_u32(table_start as u32);
        table.put_u32(self.restarts.len() as u32);

        let end = table_start + table.len();
        self.buf[table_start..end].copy_from_slice(&table);

        let declared_len = end - self.header_offset;
        self.buf[self.header_offset] = self.block_type.as_u8();
        put_u24(&mut self.buf[self.header_offset + 1..], declared_len as u32);

        log::debug!(
            "Finished {:?} block: {} entries, {} restarts, {} of {} bytes used",
            self.block_type,
            self.entries,
            self.restarts.len(),
            declared_len,
            self.buf.len() - self.header_offset
        );

        Bytes::from(self.buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::{get_u24, get_u32, RefRecord};

    fn options() -> BlockOptions {
        BlockOptions::new().block_size(512)
    }

    fn ref_record(name: &str) -> Record {
        Record::Ref(RefRecord::new(name))
    }

    #[test]
    fn test_block_writer_empty() {
        let writer = BlockWriter::new(BlockType::Ref, Vec::new(), 0, options()).unwrap();
        assert!(writer.is_empty());
        assert_eq!(writer.estimated_size(), BLOCK_HEADER_LEN + BLOCK_TRAILER_LEN);

        let block = writer.finish();
        assert_eq!(block.len(), 512);
        assert_eq!(block[0], b'r');
        assert_eq!(get_u24(&block[1..]) as usize, BLOCK_HEADER_LEN + BLOCK_TRAILER_LEN);
        assert_eq!(get_u32(&block[8..]), 0);
    }

    #[test]
    fn test_block_writer_header_layout() {
        let mut writer = BlockWriter::new(BlockType::Ref, vec![7; 17], 17, options()).unwrap();
        writer.add(&ref_record("refs/heads/master")).unwrap();
        let size = writer.estimated_size();
        let block = writer.finish();

        assert!(block[..17].iter().all(|&b| b == 7));
        assert_eq!(block[17], b'r');
        let declared = get_u24(&block[18..]) as usize;
        assert_eq!(17 + declared, size);
        assert!(block[size..].iter().all(|&b| b == 0));
    }

    #[test]
    fn test_restart_interval() {
        let opts = options().restart_interval(2);
        let mut writer = BlockWriter::new(BlockType::Ref, Vec::new(), 0, opts).unwrap();
        for name in ["refs/heads/a", "refs/heads/b", "refs/heads/c"] {
            writer.add(&ref_record(name)).unwrap();
        }
        assert_eq!(writer.restarts.len(), 2);
        assert_eq!(writer.restarts[1].key, b"refs/heads/c");
    }

    #[test]
    fn test_unsorted_keys_rejected() {
        let mut writer = BlockWriter::new(BlockType::Ref, Vec::new(), 0, options()).unwrap();
        writer.add(&ref_record("refs/heads/b")).unwrap();

        let err = writer.add(&ref_record("refs/heads/a")).unwrap_err();
        assert!(matches!(err, Error::KeyOrder { .. }));
        let err = writer.add(&ref_record("refs/heads/b")).unwrap_err();
        assert!(matches!(err, Error::KeyOrder { .. }));
        assert_eq!(writer.entries(), 1);
    }

    #[test]
    fn test_wrong_record_type_rejected() {
        let mut writer = BlockWriter::new(BlockType::Log, Vec::new(), 0, options()).unwrap();
        let err = writer.add(&ref_record("refs/heads/a")).unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
    }

    #[test]
    fn test_full_block_leaves_writer_unchanged() {
        let opts = BlockOptions::new().block_size(64);
        let mut writer = BlockWriter::new(BlockType::Ref, Vec::new(), 0, opts).unwrap();
        writer.add(&ref_record("refs/heads/a")).unwrap();
        let before = writer.estimated_size();

        let long_name = format!("refs/heads/{}", "x".repeat(64));
        let err = writer.add(&ref_record(&long_name)).unwrap_err();
        assert!(err.is_buffer_too_small());
        assert_eq!(writer.entries(), 1);
        assert_eq!(writer.estimated_size(), before);

        writer.add(&ref_record("refs/heads/b")).unwrap();
        assert_eq!(writer.entries(), 2);
    }

    #[test]
    fn test_header_offset_too_large() {
        let result = BlockWriter::new(BlockType::Ref, vec![0; 510], 510, options());
        assert!(matches!(result, Err(Error::InvalidArgument(_))));

        let result = BlockWriter::new(BlockType::Ref, vec![0; 4], 17, options());
        assert!(matches!(result, Err(Error::InvalidArgument(_))));
    }
}
