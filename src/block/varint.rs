//! Variable-length integers and prefix-compressed keys.
//!
//! Integers use the offset varint from git's pack format: 7-bit groups,
//! most significant first, with the high bit marking continuation. Each
//! continuation group is stored minus one, so every value has exactly one
//! encoding.

use crate::error::{Error, Result};
use bytes::BufMut;

/// Maximum encoded length of a u64.
pub const MAX_VARINT_LEN: usize = 10;

/// Number of low bits of the suffix-length field that carry the value type.
const VALUE_TYPE_BITS: u32 = 4;

/// Largest value type that fits beside the suffix length.
pub const MAX_VALUE_TYPE: u8 = (1 << VALUE_TYPE_BITS) - 1;

/// Append `value` to `buf`, returning the number of bytes written.
pub fn put_varint<B: BufMut>(buf: &mut B, value: u64) -> usize {
    let mut tmp = [0u8; MAX_VARINT_LEN];
    let mut pos = MAX_VARINT_LEN - 1;
    tmp[pos] = (value & 0x7f) as u8;

    let mut rest = value >> 7;
    while rest != 0 {
        rest -= 1;
        pos -= 1;
        tmp[pos] = 0x80 | (rest & 0x7f) as u8;
        rest >>= 7;
    }

    buf.put_slice(&tmp[pos..]);
    MAX_VARINT_LEN - pos
}

/// Decode a varint from the front of `buf`, returning the value and the
/// number of bytes read.
pub fn get_varint(buf: &[u8]) -> Result<(u64, usize)> {
    let mut byte = *buf.first().ok_or(Error::MalformedVarint)?;
    let mut value = (byte & 0x7f) as u64;
    let mut pos = 0;

    while byte & 0x80 != 0 {
        pos += 1;
        byte = *buf.get(pos).ok_or(Error::MalformedVarint)?;
        // value + 1 must survive the shift
        if value >= u64::MAX >> 7 {
            return Err(Error::MalformedVarint);
        }
        value = ((value + 1) << 7) | (byte & 0x7f) as u64;
    }

    Ok((value, pos + 1))
}

/// Encoded length of `value`.
pub fn varint_len(value: u64) -> usize {
    let mut len = 1;
    let mut rest = value >> 7;
    while rest != 0 {
        rest -= 1;
        rest >>= 7;
        len += 1;
    }
    len
}

/// Length of the longest common prefix of `a` and `b`.
pub fn common_prefix_len(a: &[u8], b: &[u8]) -> usize {
    a.iter().zip(b).take_while(|(x, y)| x == y).count()
}

/// Append the compressed form of `key` relative to `prev_key`.
///
/// Writes the shared prefix length, the suffix length packed with
/// `value_type`, and the suffix bytes. Returns the number of bytes written.
pub fn encode_key(buf: &mut Vec<u8>, prev_key: &[u8], key: &[u8], value_type: u8) -> usize {
    debug_assert!(value_type <= MAX_VALUE_TYPE);

    let start = buf.len();
    let shared = common_prefix_len(prev_key, key);
    let suffix = &key[shared..];

    put_varint(buf, shared as u64);
    put_varint(buf, (suffix.len() as u64) << VALUE_TYPE_BITS | value_type as u64);
    buf.put_slice(suffix);

    buf.len() - start
}

/// Decode a compressed key from the front of `buf`.
///
/// Returns the full key rebuilt from `last_key`, the value type, and the
/// number of bytes read.
pub fn decode_key(buf: &[u8], last_key: &[u8]) -> Result<(Vec<u8>, u8, usize)> {
    let (prefix_len, mut pos) = get_varint(buf)?;
    let prefix_len = usize::try_from(prefix_len).map_err(|_| Error::MalformedVarint)?;
    if prefix_len > last_key.len() {
        return Err(Error::InvalidKeyDelta { prefix_len, last_key_len: last_key.len() });
    }

    let (suffix_field, n) = get_varint(&buf[pos..])?;
    pos += n;

    let value_type = (suffix_field & MAX_VALUE_TYPE as u64) as u8;
    let suffix_len = usize::try_from(suffix_field >> VALUE_TYPE_BITS)
        .map_err(|_| Error::corrupt_block("key suffix length overflows"))?;

    let end = pos
        .checked_add(suffix_len)
        .filter(|&end| end <= buf.len())
        .ok_or_else(|| Error::corrupt_block("key suffix runs past record stream"))?;

    let mut key = Vec::with_capacity(prefix_len + suffix_len);
    key.extend_from_slice(&last_key[..prefix_len]);
    key.extend_from_slice(&buf[pos..end]);

    Ok((key, value_type, end))
}

/// Decode the full key of the record stored at a restart offset.
///
/// Restart records are never prefix-compressed, so the key is read without
/// a previous key.
pub fn decode_restart_key(block: &[u8], offset: usize) -> Result<Vec<u8>> {
    let buf = block
        .get(offset..)
        .ok_or_else(|| Error::corrupt_block(format!("restart offset {} out of bounds", offset)))?;
    let (key, _, _) = decode_key(buf, &[])?;
    Ok(key)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_varint_roundtrip() {
        let inputs = [0u64, 1, 27, 127, 128, 257, 4096, 1 << 63, u64::MAX];
        for &input in &inputs {
            let mut buf = Vec::new();
            let n = put_varint(&mut buf, input);
            assert_eq!(n, buf.len());
            assert_eq!(n, varint_len(input));
            assert!(n <= MAX_VARINT_LEN);

            let (got, m) = get_varint(&buf).unwrap();
            assert_eq!(got, input);
            assert_eq!(m, n);
        }
    }

    #[test]
    fn test_varint_known_encodings() {
        let mut buf = Vec::new();
        put_varint(&mut buf, 127);
        assert_eq!(buf, [0x7f]);

        buf.clear();
        put_varint(&mut buf, 128);
        assert_eq!(buf, [0x80, 0x00]);

        buf.clear();
        put_varint(&mut buf, 16511);
        assert_eq!(buf, [0xff, 0x7f]);
    }

    #[test]
    fn test_varint_truncated() {
        assert_eq!(get_varint(&[]), Err(Error::MalformedVarint));
        assert_eq!(get_varint(&[0x80]), Err(Error::MalformedVarint));
        assert_eq!(get_varint(&[0xff, 0xff]), Err(Error::MalformedVarint));
    }

    #[test]
    fn test_varint_overflow() {
        let buf = [0xffu8; 11];
        assert_eq!(get_varint(&buf), Err(Error::MalformedVarint));
    }

    #[test]
    fn test_common_prefix() {
        assert_eq!(common_prefix_len(b"abc", b"ab"), 2);
        assert_eq!(common_prefix_len(b"", b"abc"), 0);
        assert_eq!(common_prefix_len(b"abc", b"abd"), 2);
        assert_eq!(common_prefix_len(b"abc", b"pqr"), 0);
    }

    #[test]
    fn test_key_roundtrip() {
        let last_key = b"refs/heads/master";
        let key = b"refs/tags/bla";

        let mut buf = Vec::new();
        let n = encode_key(&mut buf, last_key, key, 6);
        assert_eq!(n, buf.len());

        let (roundtrip, value_type, m) = decode_key(&buf, last_key).unwrap();
        assert_eq!(m, n);
        assert_eq!(roundtrip, key);
        assert_eq!(value_type, 6);
    }

    #[test]
    fn test_key_prefix_longer_than_last_key() {
        let mut buf = Vec::new();
        encode_key(&mut buf, b"refs/heads/master", b"refs/heads/next", 0);

        let err = decode_key(&buf, b"refs").unwrap_err();
        assert_eq!(err, Error::InvalidKeyDelta { prefix_len: 11, last_key_len: 4 });
    }

    #[test]
    fn test_key_suffix_truncated() {
        let mut buf = Vec::new();
        encode_key(&mut buf, b"", b"refs/heads/master", 1);
        buf.truncate(buf.len() - 3);

        assert!(matches!(decode_key(&buf, b""), Err(Error::CorruptBlock(_))));
    }

    #[test]
    fn test_decode_restart_key_rejects_compressed_record() {
        let mut buf = Vec::new();
        encode_key(&mut buf, b"refs/heads/a", b"refs/heads/b", 0);

        assert!(matches!(decode_restart_key(&buf, 0), Err(Error::InvalidKeyDelta { .. })));
        assert!(matches!(decode_restart_key(&buf, 100), Err(Error::CorruptBlock(_))));
    }
}
