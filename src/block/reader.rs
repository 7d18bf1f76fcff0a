//! Block reader.
//!
//! Validates a finished block and exposes its restart table. Readers never
//! modify the block, so any number of iterators can share one reader.

use super::iter::BlockIter;
use super::varint::get_varint;
use super::{
    get_u24, get_u32, BlockType, BLOCK_HEADER_LEN, BLOCK_TRAILER_LEN, RESTART_OFFSET_LEN,
};
use crate::config::validate_hash_size;
use crate::error::{Error, Result};
use bytes::Bytes;

/// Location of one restart entry inside the block.
#[derive(Debug, Clone, Copy)]
struct RestartPoint {
    key_start: usize,
    key_end: usize,
    offset: usize,
}

/// Read the block type and declared length at `header_offset`.
///
/// Returns `None` if the bytes there do not start a block.
pub fn peek_block_header(buf: &[u8], header_offset: usize) -> Option<(BlockType, u32)> {
    let head = buf.get(header_offset..header_offset.checked_add(BLOCK_HEADER_LEN)?)?;
    let block_type = BlockType::from_u8(head[0])?;
    Some((block_type, get_u24(&head[1..])))
}

/// A validated, read-only block.
#[derive(Debug, Clone)]
pub struct BlockReader {
    block: Bytes,
    block_type: BlockType,
    header_offset: usize,
    block_size: usize,
    hash_size: usize,
    // End of the record stream, where the restart table begins.
    records_end: usize,
    restarts: Vec<RestartPoint>,
}

impl BlockReader {
    /// Validate `block` and parse its restart table.
    ///
    /// `block` may be shorter than `block_size` when the file layer did not
    /// read the padding, but it must contain the declared length.
    ///
    /// The block ends in an 8 byte trailer: the absolute offset where the
    /// restart table starts, then the restart count, both u32 big-endian.
    /// Restart entries are variable width (`varint key_len | key | u24
    /// offset`), so the table cannot be located from the count alone.
    pub fn new(block: Bytes, header_offset: u32, block_size: u32, hash_size: usize) -> Result<Self> {
        validate_hash_size(hash_size)?;

        let header_offset = header_offset as usize;
        let block_size = block_size as usize;

        let head = block
            .get(header_offset..header_offset + BLOCK_HEADER_LEN)
            .ok_or_else(|| corrupt(format!("block of {} bytes has no header", block.len())))?;
        let block_type = BlockType::from_u8(head[0])
            .ok_or_else(|| corrupt(format!("unknown block type {:#04x}", head[0])))?;
        let declared_len = get_u24(&head[1..]) as usize;

        let end = header_offset + declared_len;
        if declared_len < BLOCK_HEADER_LEN + BLOCK_TRAILER_LEN {
            return Err(corrupt(format!("declared length {} too small", declared_len)));
        }
        if end > block_size || end > block.len() {
            return Err(corrupt(format!(
                "declared length {} at offset {} exceeds block of {} bytes",
                declared_len,
                header_offset,
                block_size.min(block.len())
            )));
        }

        let restart_count = get_u32(&block[end - 4..]) as usize;
        let table_start = get_u32(&block[end - BLOCK_TRAILER_LEN..]) as usize;
        let records_start = header_offset + BLOCK_HEADER_LEN;
        let table_end = end - BLOCK_TRAILER_LEN;
        if table_start < records_start || table_start > table_end {
            return Err(corrupt(format!("restart table start {} out of bounds", table_start)));
        }

        let restarts = parse_restarts(&block, table_start, table_end, restart_count)?;
        match restarts.first() {
            Some(first) if first.offset != records_start || first.offset >= table_start => {
                return Err(corrupt("first restart does not start the record stream"));
            }
            None if table_start != records_start => {
                return Err(corrupt("records without restart points"));
            }
            _ => {}
        }
        for pair in restarts.windows(2) {
            let (a, b) = (&pair[0], &pair[1]);
            if b.offset <= a.offset || b.offset >= table_start {
                return Err(corrupt(format!("restart offset {} out of order", b.offset)));
            }
            if block[b.key_start..b.key_end] <= block[a.key_start..a.key_end] {
                return Err(corrupt("restart keys out of order"));
            }
        }

        Ok(Self {
            block,
            block_type,
            header_offset,
            block_size,
            hash_size,
            records_end: table_start,
            restarts,
        })
    }

    /// The type of records in this block.
    pub fn block_type(&self) -> BlockType {
        self.block_type
    }

    /// Bytes of file header before the block type byte.
    pub fn header_offset(&self) -> usize {
        self.header_offset
    }

    /// Object id length used to decode records.
    pub fn hash_size(&self) -> usize {
        self.hash_size
    }

    /// Size of the block on disk, including padding.
    pub fn full_block_size(&self) -> usize {
        self.block.len().min(self.block_size)
    }

    /// Get the number of restart points
    pub fn restart_count(&self) -> usize {
        self.restarts.len()
    }

    /// Absolute offset of the record at restart `index`.
    ///
    /// # Panics
    ///
    /// Panics if `index >= restart_count()`.
    pub fn restart_offset(&self, index: usize) -> usize {
        self.restarts[index].offset
    }

    /// Full key of the record at restart `index`.
    ///
    /// # Panics
    ///
    /// Panics if `index >= restart_count()`.
    pub fn restart_key(&self, index: usize) -> &[u8] {
        let restart = &self.restarts[index];
        &self.block[restart.key_start..restart.key_end]
    }

    /// Create an iterator positioned at the first record.
    pub fn start(&self) -> BlockIter<'_> {
        BlockIter::new(self, self.header_offset + BLOCK_HEADER_LEN)
    }

    /// Create an iterator positioned at the first record whose key is
    /// greater than or equal to `key`.
    ///
    /// Binary search picks the last restart whose key is `<= key`, then the
    /// iterator scans forward from there. An empty key positions at the
    /// first record; a key past the end yields an exhausted iterator.
    pub fn seek(&self, key: &[u8]) -> Result<BlockIter<'_>> {
        let idx = self.restarts.partition_point(|r| &self.block[r.key_start..r.key_end] <= key);

        let mut iter = match idx.checked_sub(1) {
            Some(i) => BlockIter::new(self, self.restarts[i].offset),
            None => self.start(),
        };
        iter.seek_within(key)?;
        Ok(iter)
    }

    pub(crate) fn data(&self) -> &[u8] {
        &self.block
    }

    pub(crate) fn records_end(&self) -> usize {
        self.records_end
    }
}

fn parse_restarts(
    block: &[u8],
    table_start: usize,
    table_end: usize,
    count: usize,
) -> Result<Vec<RestartPoint>> {
    let table = &block[..table_end];
    // Each entry takes at least a length byte and an offset.
    let max_entries = (table_end - table_start) / (1 + RESTART_OFFSET_LEN);
    if count > max_entries {
        return Err(corrupt(format!("restart count {} does not fit the table", count)));
    }

    let mut restarts = Vec::with_capacity(count);
    let mut pos = table_start;
    for _ in 0..count {
        let (key_len, n) =
            get_varint(&table[pos..]).map_err(|_| corrupt("malformed restart key length"))?;
        let key_start = pos + n;
        let key_end = usize::try_from(key_len)
            .ok()
            .and_then(|len| key_start.checked_add(len))
            .filter(|&key_end| key_end <= table_end.saturating_sub(RESTART_OFFSET_LEN))
            .ok_or_else(|| corrupt("restart entry runs past table"))?;
        let offset = get_u24(&table[key_end..]) as usize;

        restarts.push(RestartPoint { key_start, key_end, offset });
        pos = key_end + RESTART_OFFSET_LEN;
    }

    if pos != table_end {
        return Err(corrupt(format!("{} trailing bytes after restart table", table_end - pos)));
    }
    Ok(restarts)
}

fn corrupt(msg: impl Into<String>) -> Error {
    let msg = msg.into();
    log::warn!("Rejecting block: {}", msg);
    Error::corrupt_block(msg)
}
