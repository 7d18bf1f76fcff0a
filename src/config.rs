//! Configuration options for writing and reading blocks.

use crate::block::{MAX_BLOCK_SIZE, SHA1_SIZE, SHA256_SIZE};

/// Default block size (4KB)
pub const DEFAULT_BLOCK_SIZE: u32 = 4096;

/// Default number of records per restart group.
pub const DEFAULT_RESTART_INTERVAL: usize = 16;

/// Options shared by a block writer and the readers of its output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockOptions {
    /// Fixed size of every block in the table (in bytes).
    /// Default: 4KB
    pub block_size: u32,

    /// Number of records between uncompressed restart entries.
    /// Default: 16
    pub restart_interval: usize,

    /// Length of an object id in bytes: 20 for SHA-1, 32 for SHA-256.
    /// Default: 20
    pub hash_size: usize,
}

impl Default for BlockOptions {
    fn default() -> Self {
        Self {
            block_size: DEFAULT_BLOCK_SIZE,
            restart_interval: DEFAULT_RESTART_INTERVAL,
            hash_size: SHA1_SIZE,
        }
    }
}

impl BlockOptions {
    /// Creates a new BlockOptions with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the block size.
    pub fn block_size(mut self, size: u32) -> Self {
        self.block_size = size;
        self
    }

    /// Sets the restart interval.
    pub fn restart_interval(mut self, interval: usize) -> Self {
        self.restart_interval = interval;
        self
    }

    /// Sets the object id length.
    pub fn hash_size(mut self, size: usize) -> Self {
        self.hash_size = size;
        self
    }

    /// Validates the options and returns an error if any are invalid.
    pub fn validate(&self) -> crate::Result<()> {
        if self.block_size == 0 || self.block_size > MAX_BLOCK_SIZE {
            return Err(crate::Error::invalid_argument(format!(
                "block_size must be between 1 and {}",
                MAX_BLOCK_SIZE
            )));
        }
        if self.restart_interval == 0 {
            return Err(crate::Error::invalid_argument("restart_interval must be > 0"));
        }
        validate_hash_size(self.hash_size)
    }
}

pub(crate) fn validate_hash_size(hash_size: usize) -> crate::Result<()> {
    if hash_size != SHA1_SIZE && hash_size != SHA256_SIZE {
        return Err(crate::Error::invalid_argument(format!(
            "hash_size must be {} or {}, got {}",
            SHA1_SIZE, SHA256_SIZE, hash_size
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_options() {
        let opts = BlockOptions::default();
        assert_eq!(opts.block_size, 4096);
        assert_eq!(opts.restart_interval, 16);
        assert_eq!(opts.hash_size, 20);
    }

    #[test]
    fn test_options_builder() {
        let opts = BlockOptions::new().block_size(10240).restart_interval(4).hash_size(32);

        assert_eq!(opts.block_size, 10240);
        assert_eq!(opts.restart_interval, 4);
        assert_eq!(opts.hash_size, 32);
    }

    #[test]
    fn test_options_validation() {
        let mut opts = BlockOptions::default();
        assert!(opts.validate().is_ok());

        opts.block_size = 0;
        assert!(opts.validate().is_err());

        opts.block_size = MAX_BLOCK_SIZE + 1;
        assert!(opts.validate().is_err());

        opts.block_size = MAX_BLOCK_SIZE;
        opts.restart_interval = 0;
        assert!(opts.validate().is_err());

        opts.restart_interval = 1;
        opts.hash_size = 16;
        assert!(opts.validate().is_err());
    }
}
