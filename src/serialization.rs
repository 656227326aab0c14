//! Low-level CBOR encoding and decoding
//!
//! This module provides manual byte-level encoding and decoding of the
//! CBOR subset used by the ledger's binary schema. Encoders always emit the
//! shortest head and definite lengths so that output is canonical; decoders
//! also accept indefinite lengths and big-number tags produced by other tools.

use crate::error::{Result, TxBuildError};
use num_bigint::{BigInt, Sign};
use num_traits::{One, ToPrimitive};
use std::io::{Cursor, Write};

pub const MAJOR_UNSIGNED: u8 = 0;
pub const MAJOR_NEGATIVE: u8 = 1;
pub const MAJOR_BYTES: u8 = 2;
pub const MAJOR_TEXT: u8 = 3;
pub const MAJOR_ARRAY: u8 = 4;
pub const MAJOR_MAP: u8 = 5;
pub const MAJOR_TAG: u8 = 6;
pub const MAJOR_SIMPLE: u8 = 7;

/// Tag wrapping CBOR-in-CBOR byte strings (inline datums, reference scripts)
pub const TAG_ENCODED_CBOR: u64 = 24;
/// Tag for sets in Conway-era encodings; accepted when decoding
pub const TAG_SET: u64 = 258;
const TAG_POSITIVE_BIGNUM: u64 = 2;
const TAG_NEGATIVE_BIGNUM: u64 = 3;

const SIMPLE_FALSE: u8 = 0xf4;
const SIMPLE_TRUE: u8 = 0xf5;
const SIMPLE_NULL: u8 = 0xf6;
const BREAK: u8 = 0xff;

/// Trait for types that can be serialized at the byte level
pub trait ByteSerialize {
    fn serialize_bytes(&self, writer: &mut Vec<u8>) -> Result<()>;

    fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut bytes = Vec::new();
        self.serialize_bytes(&mut bytes)?;
        Ok(bytes)
    }

    fn byte_size(&self) -> Result<usize> {
        Ok(self.to_bytes()?.len())
    }
}

/// Trait for types that can be deserialized from bytes
pub trait ByteDeserialize: Sized {
    fn deserialize_bytes(cursor: &mut Cursor<&[u8]>) -> Result<Self>;

    /// Decode a value that must span the whole buffer
    fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let mut cursor = Cursor::new(bytes);
        let value = Self::deserialize_bytes(&mut cursor)?;
        let consumed = cursor.position() as usize;
        if consumed != bytes.len() {
            return Err(TxBuildError::DeserializationError(format!(
                "{} trailing bytes after item",
                bytes.len() - consumed
            )));
        }
        Ok(value)
    }
}

/// Encode a major type and argument using the shortest form
pub fn encode_head(major: u8, value: u64, writer: &mut Vec<u8>) -> Result<()> {
    let m = major << 5;
    if value < 24 {
        writer.write_all(&[m | value as u8])?;
    } else if value <= 0xff {
        writer.write_all(&[m | 24, value as u8])?;
    } else if value <= 0xffff {
        writer.write_all(&[m | 25])?;
        writer.write_all(&(value as u16).to_be_bytes())?;
    } else if value <= 0xffff_ffff {
        writer.write_all(&[m | 26])?;
        writer.write_all(&(value as u32).to_be_bytes())?;
    } else {
        writer.write_all(&[m | 27])?;
        writer.write_all(&value.to_be_bytes())?;
    }
    Ok(())
}

/// Size in bytes of a head carrying `value`
pub fn head_size(value: u64) -> usize {
    if value < 24 {
        1
    } else if value <= 0xff {
        2
    } else if value <= 0xffff {
        3
    } else if value <= 0xffff_ffff {
        5
    } else {
        9
    }
}

pub fn encode_uint(value: u64, writer: &mut Vec<u8>) -> Result<()> {
    encode_head(MAJOR_UNSIGNED, value, writer)
}

pub fn encode_int(value: i64, writer: &mut Vec<u8>) -> Result<()> {
    if value >= 0 {
        encode_head(MAJOR_UNSIGNED, value as u64, writer)
    } else {
        encode_head(MAJOR_NEGATIVE, (-1 - value) as u64, writer)
    }
}

/// Encode an arbitrary-precision integer, falling back to bignum tags
pub fn encode_bigint(value: &BigInt, writer: &mut Vec<u8>) -> Result<()> {
    if value.sign() != Sign::Minus {
        match value.to_u64() {
            Some(v) => encode_uint(v, writer),
            None => {
                encode_tag(TAG_POSITIVE_BIGNUM, writer)?;
                encode_bytes(&value.magnitude().to_bytes_be(), writer)
            }
        }
    } else {
        let n = -value - BigInt::one();
        match n.to_u64() {
            Some(v) => encode_head(MAJOR_NEGATIVE, v, writer),
            None => {
                encode_tag(TAG_NEGATIVE_BIGNUM, writer)?;
                encode_bytes(&n.magnitude().to_bytes_be(), writer)
            }
        }
    }
}

pub fn encode_bytes(data: &[u8], writer: &mut Vec<u8>) -> Result<()> {
    encode_head(MAJOR_BYTES, data.len() as u64, writer)?;
    writer.write_all(data)?;
    Ok(())
}

pub fn encode_text(text: &str, writer: &mut Vec<u8>) -> Result<()> {
    encode_head(MAJOR_TEXT, text.len() as u64, writer)?;
    writer.write_all(text.as_bytes())?;
    Ok(())
}

pub fn encode_array_len(len: usize, writer: &mut Vec<u8>) -> Result<()> {
    encode_head(MAJOR_ARRAY, len as u64, writer)
}

pub fn encode_map_len(len: usize, writer: &mut Vec<u8>) -> Result<()> {
    encode_head(MAJOR_MAP, len as u64, writer)
}

pub fn encode_tag(tag: u64, writer: &mut Vec<u8>) -> Result<()> {
    encode_head(MAJOR_TAG, tag, writer)
}

pub fn encode_bool(value: bool, writer: &mut Vec<u8>) -> Result<()> {
    writer.write_all(&[if value { SIMPLE_TRUE } else { SIMPLE_FALSE }])?;
    Ok(())
}

pub fn encode_null(writer: &mut Vec<u8>) -> Result<()> {
    writer.write_all(&[SIMPLE_NULL])?;
    Ok(())
}

/// Start an indefinite-length array; close it with [`encode_break`]
pub fn encode_indefinite_array(writer: &mut Vec<u8>) -> Result<()> {
    writer.write_all(&[(MAJOR_ARRAY << 5) | 31])?;
    Ok(())
}

pub fn encode_break(writer: &mut Vec<u8>) -> Result<()> {
    writer.write_all(&[BREAK])?;
    Ok(())
}

/// Append an already-encoded CBOR item
pub fn encode_raw(item: &[u8], writer: &mut Vec<u8>) -> Result<()> {
    writer.write_all(item)?;
    Ok(())
}

/// Take `len` bytes from the cursor
pub fn take<'a>(cursor: &mut Cursor<&'a [u8]>, len: usize) -> Result<&'a [u8]> {
    let position = cursor.position() as usize;
    let data: &'a [u8] = *cursor.get_ref();
    let end = position.checked_add(len).ok_or_else(|| {
        TxBuildError::DeserializationError("length overflow".to_string())
    })?;
    if end > data.len() {
        return Err(TxBuildError::BufferTooSmall {
            needed: end,
            available: data.len(),
        });
    }
    cursor.set_position(end as u64);
    Ok(&data[position..end])
}

/// Bytes left after the cursor
pub fn remaining(cursor: &Cursor<&[u8]>) -> usize {
    cursor.get_ref().len().saturating_sub(cursor.position() as usize)
}

pub fn peek_byte(cursor: &Cursor<&[u8]>) -> Result<u8> {
    let position = cursor.position() as usize;
    let data = cursor.get_ref();
    data.get(position).copied().ok_or(TxBuildError::BufferTooSmall {
        needed: position + 1,
        available: data.len(),
    })
}

pub fn peek_major(cursor: &Cursor<&[u8]>) -> Result<u8> {
    Ok(peek_byte(cursor)? >> 5)
}

/// Decode a head. Returns `None` as the argument for indefinite lengths.
pub fn decode_head(cursor: &mut Cursor<&[u8]>) -> Result<(u8, Option<u64>)> {
    let initial = take(cursor, 1)?[0];
    let major = initial >> 5;
    let info = initial & 0x1f;
    let value = match info {
        0..=23 => Some(info as u64),
        24 => Some(take(cursor, 1)?[0] as u64),
        25 => {
            let mut buf = [0u8; 2];
            buf.copy_from_slice(take(cursor, 2)?);
            Some(u16::from_be_bytes(buf) as u64)
        }
        26 => {
            let mut buf = [0u8; 4];
            buf.copy_from_slice(take(cursor, 4)?);
            Some(u32::from_be_bytes(buf) as u64)
        }
        27 => {
            let mut buf = [0u8; 8];
            buf.copy_from_slice(take(cursor, 8)?);
            Some(u64::from_be_bytes(buf))
        }
        31 if matches!(major, MAJOR_BYTES | MAJOR_TEXT | MAJOR_ARRAY | MAJOR_MAP | MAJOR_SIMPLE) => {
            None
        }
        _ => {
            return Err(TxBuildError::DeserializationError(format!(
                "invalid additional info {} for major type {}",
                info, major
            )))
        }
    };
    Ok((major, value))
}

fn expect_definite(major: u8, expected: u8, value: Option<u64>) -> Result<u64> {
    if major != expected {
        return Err(TxBuildError::DeserializationError(format!(
            "expected major type {}, found {}",
            expected, major
        )));
    }
    value.ok_or_else(|| {
        TxBuildError::DeserializationError(format!(
            "unexpected indefinite length for major type {}",
            major
        ))
    })
}

pub fn decode_uint(cursor: &mut Cursor<&[u8]>) -> Result<u64> {
    let (major, value) = decode_head(cursor)?;
    expect_definite(major, MAJOR_UNSIGNED, value)
}

pub fn decode_u32(cursor: &mut Cursor<&[u8]>) -> Result<u32> {
    let value = decode_uint(cursor)?;
    u32::try_from(value).map_err(|_| {
        TxBuildError::DeserializationError(format!("{} does not fit in u32", value))
    })
}

/// Decode any CBOR integer, including bignum tags
pub fn decode_int(cursor: &mut Cursor<&[u8]>) -> Result<BigInt> {
    let (major, value) = decode_head(cursor)?;
    match major {
        MAJOR_UNSIGNED => Ok(BigInt::from(expect_definite(major, MAJOR_UNSIGNED, value)?)),
        MAJOR_NEGATIVE => {
            let n = expect_definite(major, MAJOR_NEGATIVE, value)?;
            Ok(-BigInt::from(n) - BigInt::one())
        }
        MAJOR_TAG => {
            let tag = expect_definite(major, MAJOR_TAG, value)?;
            let magnitude = BigInt::from_bytes_be(Sign::Plus, &decode_bytes(cursor)?);
            match tag {
                TAG_POSITIVE_BIGNUM => Ok(magnitude),
                TAG_NEGATIVE_BIGNUM => Ok(-magnitude - BigInt::one()),
                other => Err(TxBuildError::DeserializationError(format!(
                    "unexpected tag {} for integer",
                    other
                ))),
            }
        }
        other => Err(TxBuildError::DeserializationError(format!(
            "expected integer, found major type {}",
            other
        ))),
    }
}

pub fn decode_bytes(cursor: &mut Cursor<&[u8]>) -> Result<Vec<u8>> {
    let (major, value) = decode_head(cursor)?;
    if major != MAJOR_BYTES {
        return Err(TxBuildError::DeserializationError(format!(
            "expected byte string, found major type {}",
            major
        )));
    }
    match value {
        Some(len) => Ok(take(cursor, len as usize)?.to_vec()),
        None => {
            let mut out = Vec::new();
            while !consume_break(cursor)? {
                let (chunk_major, chunk_len) = decode_head(cursor)?;
                let len = expect_definite(chunk_major, MAJOR_BYTES, chunk_len)?;
                out.extend_from_slice(take(cursor, len as usize)?);
            }
            Ok(out)
        }
    }
}

/// Decode a byte string of exactly `N` bytes
pub fn decode_fixed_bytes<const N: usize>(cursor: &mut Cursor<&[u8]>) -> Result<[u8; N]> {
    let bytes = decode_bytes(cursor)?;
    if bytes.len() != N {
        return Err(TxBuildError::DeserializationError(format!(
            "expected {} bytes, found {}",
            N,
            bytes.len()
        )));
    }
    let mut out = [0u8; N];
    out.copy_from_slice(&bytes);
    Ok(out)
}

pub fn decode_text(cursor: &mut Cursor<&[u8]>) -> Result<String> {
    let (major, value) = decode_head(cursor)?;
    if major != MAJOR_TEXT {
        return Err(TxBuildError::DeserializationError(format!(
            "expected text string, found major type {}",
            major
        )));
    }
    let bytes = match value {
        Some(len) => take(cursor, len as usize)?.to_vec(),
        None => {
            let mut out = Vec::new();
            while !consume_break(cursor)? {
                let (chunk_major, chunk_len) = decode_head(cursor)?;
                let len = expect_definite(chunk_major, MAJOR_TEXT, chunk_len)?;
                out.extend_from_slice(take(cursor, len as usize)?);
            }
            out
        }
    };
    String::from_utf8(bytes).map_err(|e| TxBuildError::DeserializationError(e.to_string()))
}

/// Decode an array head; `None` means indefinite length
pub fn decode_array_len(cursor: &mut Cursor<&[u8]>) -> Result<Option<usize>> {
    let (major, value) = decode_head(cursor)?;
    if major != MAJOR_ARRAY {
        return Err(TxBuildError::DeserializationError(format!(
            "expected array, found major type {}",
            major
        )));
    }
    Ok(value.map(|v| v as usize))
}

/// Decode a map head; `None` means indefinite length
pub fn decode_map_len(cursor: &mut Cursor<&[u8]>) -> Result<Option<usize>> {
    let (major, value) = decode_head(cursor)?;
    if major != MAJOR_MAP {
        return Err(TxBuildError::DeserializationError(format!(
            "expected map, found major type {}",
            major
        )));
    }
    Ok(value.map(|v| v as usize))
}

pub fn decode_tag(cursor: &mut Cursor<&[u8]>) -> Result<u64> {
    let (major, value) = decode_head(cursor)?;
    expect_definite(major, MAJOR_TAG, value)
}

pub fn decode_bool(cursor: &mut Cursor<&[u8]>) -> Result<bool> {
    match take(cursor, 1)?[0] {
        SIMPLE_TRUE => Ok(true),
        SIMPLE_FALSE => Ok(false),
        other => Err(TxBuildError::DeserializationError(format!(
            "expected boolean, found 0x{:02x}",
            other
        ))),
    }
}

/// Consume a `null` if one is next
pub fn decode_null(cursor: &mut Cursor<&[u8]>) -> Result<bool> {
    if peek_byte(cursor)? == SIMPLE_NULL {
        cursor.set_position(cursor.position() + 1);
        Ok(true)
    } else {
        Ok(false)
    }
}

/// Consume a break byte if one is next
pub fn consume_break(cursor: &mut Cursor<&[u8]>) -> Result<bool> {
    if peek_byte(cursor)? == BREAK {
        cursor.set_position(cursor.position() + 1);
        Ok(true)
    } else {
        Ok(false)
    }
}

/// Skip over one complete data item.
///
/// Walks nested containers with an explicit stack, so arbitrarily deep input
/// cannot exhaust the call stack.
pub fn skip_item(cursor: &mut Cursor<&[u8]>) -> Result<()> {
    // Items still owed by each open container; `None` runs until a break
    let mut open: Vec<Option<u64>> = Vec::new();
    loop {
        if let Some(Some(owed)) = open.last_mut() {
            *owed -= 1;
        }
        let (major, value) = decode_head(cursor)?;
        match (major, value) {
            (MAJOR_UNSIGNED | MAJOR_NEGATIVE, _) | (MAJOR_SIMPLE, Some(_)) => {}
            (MAJOR_BYTES | MAJOR_TEXT, Some(len)) => {
                take(cursor, len as usize)?;
            }
            (MAJOR_ARRAY, Some(len)) => open.push(Some(len)),
            (MAJOR_MAP, Some(len)) => open.push(Some(len.saturating_mul(2))),
            (MAJOR_BYTES | MAJOR_TEXT | MAJOR_ARRAY | MAJOR_MAP, None) => open.push(None),
            (MAJOR_TAG, _) => open.push(Some(1)),
            (MAJOR_SIMPLE, None) => {
                return Err(TxBuildError::DeserializationError(
                    "unexpected break".to_string(),
                ))
            }
            _ => {
                return Err(TxBuildError::DeserializationError(format!(
                    "unknown major type {}",
                    major
                )))
            }
        }

        loop {
            match open.last().copied() {
                None => return Ok(()),
                Some(Some(0)) => {
                    open.pop();
                }
                Some(None) if consume_break(cursor)? => {
                    open.pop();
                }
                Some(_) => break,
            }
        }
    }
}

/// Return the raw bytes of the next data item and advance past it
pub fn decode_raw_item<'a>(cursor: &mut Cursor<&'a [u8]>) -> Result<&'a [u8]> {
    let start = cursor.position() as usize;
    skip_item(cursor)?;
    let end = cursor.position() as usize;
    let data: &'a [u8] = *cursor.get_ref();
    Ok(&data[start..end])
}

/// Collection helpers shared by the ledger types
pub mod helpers {
    use super::*;

    /// Serialize a slice as a definite-length array
    pub fn serialize_vec<T: ByteSerialize>(items: &[T], writer: &mut Vec<u8>) -> Result<()> {
        encode_array_len(items.len(), writer)?;
        for item in items {
            item.serialize_bytes(writer)?;
        }
        Ok(())
    }

    /// Decode an array of any length form, applying `item` to each element
    pub fn decode_array<T, F>(cursor: &mut Cursor<&[u8]>, mut item: F) -> Result<Vec<T>>
    where
        F: FnMut(&mut Cursor<&[u8]>) -> Result<T>,
    {
        match decode_array_len(cursor)? {
            Some(len) => {
                let mut items = Vec::with_capacity(len.min(remaining(cursor)));
                for _ in 0..len {
                    items.push(item(cursor)?);
                }
                Ok(items)
            }
            None => {
                let mut items = Vec::new();
                while !consume_break(cursor)? {
                    items.push(item(cursor)?);
                }
                Ok(items)
            }
        }
    }

    /// Decode an array that may be wrapped in the set tag
    pub fn decode_set<T, F>(cursor: &mut Cursor<&[u8]>, item: F) -> Result<Vec<T>>
    where
        F: FnMut(&mut Cursor<&[u8]>) -> Result<T>,
    {
        if peek_major(cursor)? == MAJOR_TAG {
            let tag = decode_tag(cursor)?;
            if tag != TAG_SET {
                return Err(TxBuildError::DeserializationError(format!(
                    "unexpected tag {} where a set was expected",
                    tag
                )));
            }
        }
        decode_array(cursor, item)
    }

    /// Decode a map of any length form, applying `entry` to each key/value pair
    pub fn decode_map<F>(cursor: &mut Cursor<&[u8]>, mut entry: F) -> Result<()>
    where
        F: FnMut(&mut Cursor<&[u8]>) -> Result<()>,
    {
        match decode_map_len(cursor)? {
            Some(len) => {
                for _ in 0..len {
                    entry(cursor)?;
                }
            }
            None => {
                while !consume_break(cursor)? {
                    entry(cursor)?;
                }
            }
        }
        Ok(())
    }

    /// Check that an array head announced the expected number of fields
    pub fn expect_array_len(cursor: &mut Cursor<&[u8]>, expected: usize) -> Result<()> {
        match decode_array_len(cursor)? {
            Some(len) if len == expected => Ok(()),
            Some(len) => Err(TxBuildError::DeserializationError(format!(
                "expected array of {} items, found {}",
                expected, len
            ))),
            None => Err(TxBuildError::DeserializationError(
                "expected definite-length array".to_string(),
            )),
        }
    }
}
