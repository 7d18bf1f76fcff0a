//! Error types for the reftable block codec.

use thiserror::Error;

/// The result type used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// The error type for block encoding and decoding.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Error {
    /// A varint ran past the end of its buffer or overflowed 64 bits.
    #[error("Malformed varint")]
    MalformedVarint,

    /// A compressed key claims to share more bytes than the previous key has.
    #[error("Invalid key delta: prefix length {prefix_len} exceeds last key length {last_key_len}")]
    InvalidKeyDelta {
        /// The shared prefix length read from the record header.
        prefix_len: usize,
        /// The length of the key the prefix refers to.
        last_key_len: usize,
    },

    /// A block type byte has no matching record variant.
    #[error("Unknown record type: {0:#04x}")]
    UnknownRecordType(u8),

    /// The record does not fit in the space left in the block.
    ///
    /// The writer is unchanged; the caller should finish this block and
    /// start a new one.
    #[error("Buffer too small: need {needed} bytes, {available} available")]
    BufferTooSmall {
        /// Bytes the block would need to hold the record and its restart table.
        needed: usize,
        /// Size of the block.
        available: usize,
    },

    /// The block failed structural validation.
    #[error("Corrupt block: {0}")]
    CorruptBlock(String),

    /// Records were not added in strictly increasing key order.
    #[error("Key order violation: {key:?} does not sort after {last:?}")]
    KeyOrder {
        /// The previously added key.
        last: Vec<u8>,
        /// The rejected key.
        key: Vec<u8>,
    },

    /// An invalid argument was provided.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

impl Error {
    /// Creates a new corrupt block error.
    pub fn corrupt_block(msg: impl Into<String>) -> Self {
        Error::CorruptBlock(msg.into())
    }

    /// Creates a new invalid argument error.
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Error::InvalidArgument(msg.into())
    }

    /// Returns true if the error only means the current block is full.
    pub fn is_buffer_too_small(&self) -> bool {
        matches!(self, Error::BufferTooSmall { .. })
    }
}
