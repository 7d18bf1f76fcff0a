//! Record types stored in blocks.
//!
//! Every block holds a single kind of record, selected by its type byte.
//! A record knows its sort key, the value type that is packed into the key
//! header, and how to encode the payload that follows the key.

use super::varint::{get_varint, put_varint, MAX_VALUE_TYPE};
use super::BlockType;
use crate::error::{Error, Result};
use bytes::BufMut;

/// Length of the separator plus inverted update index at the end of a log key.
const LOG_KEY_SUFFIX_LEN: usize = 9;

/// Value of a reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefValue {
    /// The ref was deleted.
    Deletion,
    /// The ref points at an object.
    Val1(Vec<u8>),
    /// The ref points at an annotated tag and carries the peeled object.
    Val2 {
        /// The object the ref points at.
        value: Vec<u8>,
        /// The object the tag peels to.
        target_value: Vec<u8>,
    },
    /// The ref is a symbolic ref.
    Symref(String),
}

impl RefValue {
    fn value_type(&self) -> u8 {
        match self {
            RefValue::Deletion => 0,
            RefValue::Val1(_) => 1,
            RefValue::Val2 { .. } => 2,
            RefValue::Symref(_) => 3,
        }
    }
}

/// State of a single reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefRecord {
    /// Full name of the ref, e.g. `refs/heads/main`.
    pub ref_name: String,
    /// Logical timestamp of the update that produced this value.
    pub update_index: u64,
    /// What the ref points at.
    pub value: RefValue,
}

impl RefRecord {
    /// Creates a deletion record for `ref_name`.
    pub fn new(ref_name: impl Into<String>) -> Self {
        Self { ref_name: ref_name.into(), update_index: 0, value: RefValue::Deletion }
    }

    /// Creates a record pointing `ref_name` at `oid`.
    pub fn with_value(ref_name: impl Into<String>, update_index: u64, oid: Vec<u8>) -> Self {
        Self { ref_name: ref_name.into(), update_index, value: RefValue::Val1(oid) }
    }

    fn encode_payload(&self, buf: &mut Vec<u8>, hash_size: usize) -> Result<()> {
        put_varint(buf, self.update_index);
        match &self.value {
            RefValue::Deletion => {}
            RefValue::Val1(value) => put_hash(buf, value, hash_size)?,
            RefValue::Val2 { value, target_value } => {
                put_hash(buf, value, hash_size)?;
                put_hash(buf, target_value, hash_size)?;
            }
            RefValue::Symref(target) => put_bytes(buf, target.as_bytes()),
        }
        Ok(())
    }

    fn decode(key: Vec<u8>, value_type: u8, dec: &mut Decoder<'_>) -> Result<Self> {
        let ref_name = into_string(key)?;
        let update_index = dec.varint()?;
        let value = match value_type {
            0 => RefValue::Deletion,
            1 => RefValue::Val1(dec.hash()?),
            2 => RefValue::Val2 { value: dec.hash()?, target_value: dec.hash()? },
            3 => RefValue::Symref(into_string(dec.prefixed_bytes()?)?),
            other => {
                return Err(Error::corrupt_block(format!("unknown ref value type {}", other)))
            }
        };
        Ok(Self { ref_name, update_index, value })
    }
}

/// Details of a reflog entry.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LogUpdate {
    /// Object id before the update.
    pub old: Vec<u8>,
    /// Object id after the update.
    pub new: Vec<u8>,
    /// Committer name.
    pub name: String,
    /// Committer email.
    pub email: String,
    /// Seconds since the epoch.
    pub time: u64,
    /// Timezone offset in minutes.
    pub tz_offset: i16,
    /// Reflog message.
    pub message: String,
}

/// Value of a reflog entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogValue {
    /// The entry was deleted.
    Deletion,
    /// The ref was updated.
    Update(LogUpdate),
}

/// A single reflog entry.
///
/// Entries for the same ref sort newest first because the key stores the
/// update index inverted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogRecord {
    /// Full name of the ref.
    pub ref_name: String,
    /// Logical timestamp of the update.
    pub update_index: u64,
    /// The entry itself.
    pub value: LogValue,
}

impl LogRecord {
    /// Creates an update entry.
    pub fn update(ref_name: impl Into<String>, update_index: u64, update: LogUpdate) -> Self {
        Self { ref_name: ref_name.into(), update_index, value: LogValue::Update(update) }
    }

    fn key(&self) -> Vec<u8> {
        let mut key = Vec::with_capacity(self.ref_name.len() + LOG_KEY_SUFFIX_LEN);
        key.extend_from_slice(self.ref_name.as_bytes());
        key.push(0);
        key.put_u64(u64::MAX - self.update_index);
        key
    }

    fn encode_payload(&self, buf: &mut Vec<u8>, hash_size: usize) -> Result<()> {
        if let LogValue::Update(update) = &self.value {
            put_hash(buf, &update.old, hash_size)?;
            put_hash(buf, &update.new, hash_size)?;
            put_bytes(buf, update.name.as_bytes());
            put_bytes(buf, update.email.as_bytes());
            put_varint(buf, update.time);
            buf.put_i16(update.tz_offset);
            put_bytes(buf, update.message.as_bytes());
        }
        Ok(())
    }

    fn decode(mut key: Vec<u8>, value_type: u8, dec: &mut Decoder<'_>) -> Result<Self> {
        if key.len() < LOG_KEY_SUFFIX_LEN || key[key.len() - LOG_KEY_SUFFIX_LEN] != 0 {
            return Err(Error::corrupt_block("log key lacks update index"));
        }

        let split = key.len() - LOG_KEY_SUFFIX_LEN;
        let mut inverted = [0u8; 8];
        inverted.copy_from_slice(&key[split + 1..]);
        let update_index = u64::MAX - u64::from_be_bytes(inverted);
        key.truncate(split);
        let ref_name = into_string(key)?;

        let value = match value_type {
            0 => LogValue::Deletion,
            1 => LogValue::Update(LogUpdate {
                old: dec.hash()?,
                new: dec.hash()?,
                name: into_string(dec.prefixed_bytes()?)?,
                email: into_string(dec.prefixed_bytes()?)?,
                time: dec.varint()?,
                tz_offset: dec.i16()?,
                message: into_string(dec.prefixed_bytes()?)?,
            }),
            other => {
                return Err(Error::corrupt_block(format!("unknown log value type {}", other)))
            }
        };
        Ok(Self { ref_name, update_index, value })
    }
}

/// Points at the block whose last key is `last_key`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexRecord {
    /// Last key of the indexed block.
    pub last_key: Vec<u8>,
    /// File offset of the indexed block.
    pub offset: u64,
}

/// Maps an abbreviated object id to the ref blocks that mention it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjRecord {
    /// Unique prefix of the object id.
    pub hash_prefix: Vec<u8>,
    /// Strictly increasing offsets of ref blocks.
    pub offsets: Vec<u64>,
}

impl ObjRecord {
    fn value_type(&self) -> u8 {
        match self.offsets.len() {
            n @ 1..=15 => n as u8,
            _ => 0,
        }
    }

    fn encode_payload(&self, buf: &mut Vec<u8>) -> Result<()> {
        if self.value_type() == 0 {
            put_varint(buf, self.offsets.len() as u64);
        }
        let Some((&first, rest)) = self.offsets.split_first() else {
            return Ok(());
        };

        put_varint(buf, first);
        let mut last = first;
        for &offset in rest {
            if offset <= last {
                return Err(Error::invalid_argument("object offsets must be strictly increasing"));
            }
            put_varint(buf, offset - last);
            last = offset;
        }
        Ok(())
    }

    fn decode(key: Vec<u8>, value_type: u8, dec: &mut Decoder<'_>) -> Result<Self> {
        let count = match value_type {
            0 => dec.varint()?,
            n => n as u64,
        };

        let mut offsets = Vec::with_capacity((count as usize).min(dec.remaining()));
        let mut last = 0u64;
        for i in 0..count {
            let delta = dec.varint()?;
            last = if i == 0 {
                delta
            } else {
                last.checked_add(delta)
                    .ok_or_else(|| Error::corrupt_block("object offset overflows"))?
            };
            offsets.push(last);
        }
        Ok(Self { hash_prefix: key, offsets })
    }
}

/// A record of any block type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Record {
    /// Reference state.
    Ref(RefRecord),
    /// Reflog entry.
    Log(LogRecord),
    /// Block index entry.
    Index(IndexRecord),
    /// Object lookup entry.
    Obj(ObjRecord),
}

impl Record {
    /// The full sort key.
    pub fn key(&self) -> Vec<u8> {
        match self {
            Record::Ref(r) => r.ref_name.as_bytes().to_vec(),
            Record::Log(r) => r.key(),
            Record::Index(r) => r.last_key.clone(),
            Record::Obj(r) => r.hash_prefix.clone(),
        }
    }

    /// The block type this record belongs in.
    pub fn block_type(&self) -> BlockType {
        match self {
            Record::Ref(_) => BlockType::Ref,
            Record::Log(_) => BlockType::Log,
            Record::Index(_) => BlockType::Index,
            Record::Obj(_) => BlockType::Obj,
        }
    }

    /// The value type packed into the key header.
    pub fn val_type(&self) -> u8 {
        let value_type = match self {
            Record::Ref(r) => r.value.value_type(),
            Record::Log(r) => match r.value {
                LogValue::Deletion => 0,
                LogValue::Update(_) => 1,
            },
            Record::Index(_) => 0,
            Record::Obj(r) => r.value_type(),
        };
        debug_assert!(value_type <= MAX_VALUE_TYPE);
        value_type
    }

    /// Returns true for tombstones.
    pub fn is_deletion(&self) -> bool {
        match self {
            Record::Ref(r) => r.value == RefValue::Deletion,
            Record::Log(r) => r.value == LogValue::Deletion,
            Record::Index(_) | Record::Obj(_) => false,
        }
    }

    /// Append the type-specific payload that follows the key.
    ///
    /// Object ids must be exactly `hash_size` bytes long.
    pub fn encode_payload(&self, buf: &mut Vec<u8>, hash_size: usize) -> Result<()> {
        match self {
            Record::Ref(r) => r.encode_payload(buf, hash_size),
            Record::Log(r) => r.encode_payload(buf, hash_size),
            Record::Index(r) => {
                put_varint(buf, r.offset);
                Ok(())
            }
            Record::Obj(r) => r.encode_payload(buf),
        }
    }

    /// Decode a record of `block_type` whose key and value type have
    /// already been read. Returns the record and the payload bytes consumed.
    pub fn decode(
        block_type: BlockType,
        key: Vec<u8>,
        value_type: u8,
        payload: &[u8],
        hash_size: usize,
    ) -> Result<(Record, usize)> {
        let mut dec = Decoder { buf: payload, pos: 0, hash_size };
        let record = match block_type {
            BlockType::Ref => Record::Ref(RefRecord::decode(key, value_type, &mut dec)?),
            BlockType::Log => Record::Log(LogRecord::decode(key, value_type, &mut dec)?),
            BlockType::Index => {
                Record::Index(IndexRecord { last_key: key, offset: dec.varint()? })
            }
            BlockType::Obj => Record::Obj(ObjRecord::decode(key, value_type, &mut dec)?),
        };
        Ok((record, dec.pos))
    }
}

impl From<RefRecord> for Record {
    fn from(r: RefRecord) -> Self {
        Record::Ref(r)
    }
}

impl From<LogRecord> for Record {
    fn from(r: LogRecord) -> Self {
        Record::Log(r)
    }
}

impl From<IndexRecord> for Record {
    fn from(r: IndexRecord) -> Self {
        Record::Index(r)
    }
}

impl From<ObjRecord> for Record {
    fn from(r: ObjRecord) -> Self {
        Record::Obj(r)
    }
}

fn put_hash(buf: &mut Vec<u8>, hash: &[u8], hash_size: usize) -> Result<()> {
    if hash.len() != hash_size {
        return Err(Error::invalid_argument(format!(
            "object id is {} bytes, expected {}",
            hash.len(),
            hash_size
        )));
    }
    buf.put_slice(hash);
    Ok(())
}

fn put_bytes(buf: &mut Vec<u8>, bytes: &[u8]) {
    put_varint(buf, bytes.len() as u64);
    buf.put_slice(bytes);
}

fn into_string(bytes: Vec<u8>) -> Result<String> {
    String::from_utf8(bytes).map_err(|e| Error::corrupt_block(format!("invalid UTF-8: {}", e)))
}

/// Bounds-checked cursor over a record payload.
struct Decoder<'a> {
    buf: &'a [u8],
    pos: usize,
    hash_size: usize,
}

impl Decoder<'_> {
    fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    fn varint(&mut self) -> Result<u64> {
        let (value, n) = get_varint(&self.buf[self.pos..])?;
        self.pos += n;
        Ok(value)
    }

    fn bytes(&mut self, len: usize) -> Result<&[u8]> {
        if len > self.remaining() {
            return Err(Error::corrupt_block("record payload runs past record stream"));
        }
        let bytes = &self.buf[self.pos..self.pos + len];
        self.pos += len;
        Ok(bytes)
    }

    fn hash(&mut self) -> Result<Vec<u8>> {
        let hash_size = self.hash_size;
        Ok(self.bytes(hash_size)?.to_vec())
    }

    fn prefixed_bytes(&mut self) -> Result<Vec<u8>> {
        let len = usize::try_from(self.varint()?)
            .map_err(|_| Error::corrupt_block("length overflows"))?;
        Ok(self.bytes(len)?.to_vec())
    }

    fn i16(&mut self) -> Result<i16> {
        let bytes = self.bytes(2)?;
        Ok(i16::from_be_bytes([bytes[0], bytes[1]]))
    }
}
