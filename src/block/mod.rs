//! Block codec for reftable-style tables.
//!
//! A table is a sequence of fixed-size blocks. Each block holds records of a
//! single type, sorted by key, with prefix-compressed keys and a restart table
//! that allows binary search without decoding the whole block.
//!
//! ## Block Format
//!
//! ```text
//! [File header: header_offset bytes]   // Only in the first block of a file
//! [Block type: u8]                      // 'r', 'g', 'i' or 'o'
//! [Declared length: u24]                // From the type byte to the end of the trailer
//! [Record 1]
//! ...
//! [Record N]
//! [Restart 1: varint key_len | key | u24 offset]
//! ...
//! [Restart M]
//! [Restart table start: u32]
//! [Num restarts: u32]
//! [Padding: zero bytes up to block_size]
//! ```
//!
//! Each record:
//! ```text
//! [shared_prefix_len: varint]           // Shared with the previous key
//! [suffix_len << 4 | value_type: varint]
//! [suffix: bytes]
//! [payload: bytes]                      // Depends on the block type
//! ```
//!
//! All fixed-width integers are big-endian.

pub mod iter;
pub mod reader;
pub mod record;
pub mod varint;
pub mod writer;

pub use iter::BlockIter;
pub use reader::{peek_block_header, BlockReader};
pub use record::{
    IndexRecord, LogRecord, LogUpdate, LogValue, ObjRecord, Record, RefRecord, RefValue,
};
pub use varint::{common_prefix_len, decode_key, decode_restart_key, encode_key};
pub use writer::BlockWriter;

use crate::error::{Error, Result};

/// Block type tag for reference records.
pub const BLOCK_TYPE_REF: u8 = b'r';

/// Block type tag for reflog records.
pub const BLOCK_TYPE_LOG: u8 = b'g';

/// Block type tag for index records.
pub const BLOCK_TYPE_INDEX: u8 = b'i';

/// Block type tag for object records.
pub const BLOCK_TYPE_OBJ: u8 = b'o';

/// Object id length for SHA-1 repositories.
pub const SHA1_SIZE: usize = 20;

/// Object id length for SHA-256 repositories.
pub const SHA256_SIZE: usize = 32;

/// Maximum number of restart points in one block.
pub const MAX_RESTARTS: usize = (1 << 16) - 1;

/// Largest block size the 24-bit declared length can describe.
pub const MAX_BLOCK_SIZE: u32 = (1 << 24) - 1;

/// Size of the type byte plus the declared length.
pub const BLOCK_HEADER_LEN: usize = 4;

/// Size of the trailer: restart table start plus restart count.
pub const BLOCK_TRAILER_LEN: usize = 8;

/// Width of the offset stored in each restart entry.
pub(crate) const RESTART_OFFSET_LEN: usize = 3;

/// The kind of records a block holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum BlockType {
    /// Reference records.
    Ref = BLOCK_TYPE_REF,
    /// Reflog records.
    Log = BLOCK_TYPE_LOG,
    /// Index records pointing at other blocks.
    Index = BLOCK_TYPE_INDEX,
    /// Object id to ref block records.
    Obj = BLOCK_TYPE_OBJ,
}

impl BlockType {
    /// Convert from the on-disk tag.
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            BLOCK_TYPE_REF => Some(BlockType::Ref),
            BLOCK_TYPE_LOG => Some(BlockType::Log),
            BLOCK_TYPE_INDEX => Some(BlockType::Index),
            BLOCK_TYPE_OBJ => Some(BlockType::Obj),
            _ => None,
        }
    }

    /// The on-disk tag.
    pub fn as_u8(self) -> u8 {
        self as u8
    }
}

impl TryFrom<u8> for BlockType {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self> {
        BlockType::from_u8(value).ok_or(Error::UnknownRecordType(value))
    }
}

/// Returns true if `value` is a recognized block type tag.
pub fn is_block_type(value: u8) -> bool {
    BlockType::from_u8(value).is_some()
}

/// Write a 24-bit big-endian integer into the first 3 bytes of `dest`.
pub fn put_u24(dest: &mut [u8], value: u32) {
    debug_assert!(value <= MAX_BLOCK_SIZE);
    dest[0] = (value >> 16) as u8;
    dest[1] = (value >> 8) as u8;
    dest[2] = value as u8;
}

/// Read a 24-bit big-endian integer from the first 3 bytes of `src`.
pub fn get_u24(src: &[u8]) -> u32 {
    (src[0] as u32) << 16 | (src[1] as u32) << 8 | src[2] as u32
}

/// Read a 32-bit big-endian integer from the first 4 bytes of `src`.
pub(crate) fn get_u32(src: &[u8]) -> u32 {
    u32::from_be_bytes([src[0], src[1], src[2], src[3]])
}
