//! # reftable - Block Codec for Sorted Ref Tables
//!
//! This crate implements the block layer of a reftable-style file: the
//! fixed-size, sorted, prefix-compressed blocks that store git references
//! and reflog entries so that a lookup only touches one block.
//!
//! ## Architecture
//!
//! - **Varint & key codec**: variable-length integers and prefix-compressed keys
//! - **Records**: refs, reflog entries, index entries and object entries
//! - **BlockWriter**: packs sorted records into a block with a restart table
//! - **BlockReader**: validates a block and exposes its restart table
//! - **BlockIter**: sequential scan plus binary-search seek
//!
//! Assembling blocks into files, merging tables and all I/O belong to the
//! layers above this crate.
//!
//! ## Example Usage
//!
//! ```rust
//! use reftable::{BlockOptions, BlockReader, BlockType, BlockWriter, Record, RefRecord};
//!
//! # fn main() -> Result<(), reftable::Error> {
//! let options = BlockOptions::default();
//! let mut writer = BlockWriter::new(BlockType::Ref, Vec::new(), 0, options.clone())?;
//! writer.add(&Record::Ref(RefRecord::with_value("refs/heads/main", 1, vec![0xab; 20])))?;
//! writer.add(&Record::Ref(RefRecord::with_value("refs/heads/next", 1, vec![0xcd; 20])))?;
//! let block = writer.finish();
//!
//! let reader = BlockReader::new(block, 0, options.block_size, options.hash_size)?;
//! let mut iter = reader.seek(b"refs/heads/n")?;
//! if let Some(record) = iter.next_record()? {
//!     assert_eq!(record.key(), b"refs/heads/next");
//! }
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

// Module declarations
pub mod block;
pub mod config;
pub mod error;

// Re-exports
pub use block::{
    BlockIter, BlockReader, BlockType, BlockWriter, IndexRecord, LogRecord, LogUpdate, LogValue,
    ObjRecord, Record, RefRecord, RefValue,
};
pub use config::BlockOptions;
pub use error::{Error, Result};
