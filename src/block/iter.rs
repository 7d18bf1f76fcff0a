//! Forward iterator over the records of a block.

use super::reader::BlockReader;
use super::record::Record;
use super::varint::decode_key;
use super::BlockType;
use crate::error::Result;

/// A record decoded at the iterator's position but not yet consumed.
struct Decoded {
    key: Vec<u8>,
    record: Record,
    end: usize,
}

/// Cursor over the records of a [`BlockReader`].
///
/// Each iterator keeps its own offset and last key, so several iterators
/// can walk the same block independently. A failed decode leaves the
/// position unchanged.
#[derive(Debug, Clone)]
pub struct BlockIter<'a> {
    reader: &'a BlockReader,
    offset: usize,
    last_key: Vec<u8>,
    failed: bool,
}

impl<'a> BlockIter<'a> {
    /// Position a fresh iterator at `offset`, which must be a restart offset.
    pub(crate) fn new(reader: &'a BlockReader, offset: usize) -> Self {
        Self { reader, offset, last_key: Vec::new(), failed: false }
    }

    /// The type of records this iterator yields.
    pub fn block_type(&self) -> BlockType {
        self.reader.block_type()
    }

    /// Absolute offset of the next record.
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Key of the most recently returned record.
    pub fn last_key(&self) -> &[u8] {
        &self.last_key
    }

    /// Decode the next record and advance past it.
    ///
    /// Returns `Ok(None)` once the record stream is exhausted.
    pub fn next_record(&mut self) -> Result<Option<Record>> {
        Ok(self.decode_next()?.map(|decoded| self.consume(decoded)))
    }

    /// Skip forward to the first record whose key is `>= key`.
    ///
    /// The iterator must sit on a restart whose key is `<= key`.
    pub(crate) fn seek_within(&mut self, key: &[u8]) -> Result<()> {
        while let Some(decoded) = self.decode_next()? {
            if decoded.key.as_slice() >= key {
                break;
            }
            self.consume(decoded);
        }
        Ok(())
    }

    fn decode_next(&self) -> Result<Option<Decoded>> {
        let records_end = self.reader.records_end();
        if self.offset >= records_end {
            return Ok(None);
        }

        // Never read past the record stream into the restart table.
        let stream = &self.reader.data()[..records_end];
        let (key, value_type, key_len) = decode_key(&stream[self.offset..], &self.last_key)?;

        let payload_start = self.offset + key_len;
        let (record, payload_len) = Record::decode(
            self.reader.block_type(),
            key.clone(),
            value_type,
            &stream[payload_start..],
            self.reader.hash_size(),
        )?;

        Ok(Some(Decoded { key, record, end: payload_start + payload_len }))
    }

    fn consume(&mut self, decoded: Decoded) -> Record {
        self.offset = decoded.end;
        self.last_key = decoded.key;
        decoded.record
    }
}

impl Iterator for BlockIter<'_> {
    type Item = Result<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        match self.next_record() {
            Ok(record) => record.map(Ok),
            Err(e) => {
                self.failed = true;
                Some(Err(e))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::{BlockWriter, RefRecord, SHA1_SIZE};
    use crate::config::BlockOptions;
    use crate::error::Error;
    use bytes::Bytes;

    fn reader_for(names: &[&str]) -> BlockReader {
        let opts = BlockOptions::new().block_size(1024).restart_interval(3);
        let mut writer = BlockWriter::new(BlockType::Ref, Vec::new(), 0, opts).unwrap();
        for name in names {
            writer.add(&Record::Ref(RefRecord::new(*name))).unwrap();
        }
        BlockReader::new(writer.finish(), 0, 1024, SHA1_SIZE).unwrap()
    }

    fn keys(iter: BlockIter<'_>) -> Vec<Vec<u8>> {
        iter.map(|r| r.unwrap().key()).collect()
    }

    #[test]
    fn test_block_iterator() {
        let reader = reader_for(&["apple", "apricot", "banana", "cherry"]);
        let mut iter = reader.start();

        assert_eq!(iter.next_record().unwrap().unwrap().key(), b"apple");
        assert_eq!(iter.next_record().unwrap().unwrap().key(), b"apricot");
        assert_eq!(iter.last_key(), b"apricot");
        assert_eq!(iter.next_record().unwrap().unwrap().key(), b"banana");
        assert_eq!(iter.next_record().unwrap().unwrap().key(), b"cherry");

        // No more entries
        assert!(iter.next_record().unwrap().is_none());
        assert!(iter.next_record().unwrap().is_none());
    }

    #[test]
    fn test_empty_block() {
        let reader = reader_for(&[]);
        assert_eq!(reader.restart_count(), 0);
        assert!(reader.start().next_record().unwrap().is_none());
        assert!(reader.seek(b"anything").unwrap().next_record().unwrap().is_none());
    }

    #[test]
    fn test_seek_between_keys() {
        let names = ["a1", "a3", "a5", "a7", "a9", "b1", "b3"];
        let reader = reader_for(&names);

        assert_eq!(keys(reader.seek(b"a4").unwrap()), [b"a5", b"a7", b"a9", b"b1", b"b3"]);
        // Lands on a restart exactly.
        assert_eq!(reader.restart_key(1), b"a7");
        assert_eq!(keys(reader.seek(b"a7").unwrap())[0], b"a7");
        // Falls between the last key of one group and the next restart.
        assert_eq!(keys(reader.seek(b"a6").unwrap())[0], b"a7");
        assert_eq!(keys(reader.seek(b"0").unwrap()).len(), names.len());
    }

    #[test]
    fn test_independent_iterators() {
        let reader = reader_for(&["a", "b", "c"]);
        let mut first = reader.start();
        let mut second = reader.seek(b"b").unwrap();

        assert_eq!(first.next_record().unwrap().unwrap().key(), b"a");
        let mut copy = second.clone();
        assert_eq!(second.next_record().unwrap().unwrap().key(), b"b");
        assert_eq!(copy.next_record().unwrap().unwrap().key(), b"b");
        assert_eq!(first.next_record().unwrap().unwrap().key(), b"b");
    }

    #[test]
    fn test_corrupt_record_keeps_position() {
        let opts = BlockOptions::new().block_size(256);
        let mut writer = BlockWriter::new(BlockType::Ref, Vec::new(), 0, opts).unwrap();
        writer.add(&Record::Ref(RefRecord::new("refs/heads/a"))).unwrap();
        writer.add(&Record::Ref(RefRecord::new("refs/heads/b"))).unwrap();
        let mut data = writer.finish().to_vec();

        // Second record starts after the 16 byte first record; claim a
        // shared prefix longer than the previous key.
        let second = 4 + 16;
        data[second] = 40;
        let reader = BlockReader::new(Bytes::from(data), 0, 256, SHA1_SIZE).unwrap();

        let mut iter = reader.start();
        iter.next_record().unwrap();
        let offset = iter.offset();
        let err = iter.next_record().unwrap_err();
        assert!(matches!(err, Error::InvalidKeyDelta { prefix_len: 40, last_key_len: 12 }));
        assert_eq!(iter.offset(), offset);

        let results: Vec<_> = reader.start().collect();
        assert_eq!(results.len(), 2);
        assert!(results[1].is_err());
    }
}
