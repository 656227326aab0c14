//! Transaction metadata (auxiliary data)

use std::collections::BTreeMap;
use std::io::Cursor;

use crate::error::{Result, TxBuildError};
use crate::hash::{blake2b_256, AuxiliaryDataHash};
use crate::serialization::{
    decode_bytes, decode_int, decode_text, decode_uint, encode_bytes, encode_int, encode_map_len,
    encode_text, encode_uint, helpers, peek_major, ByteDeserialize, ByteSerialize, MAJOR_ARRAY,
    MAJOR_BYTES, MAJOR_MAP, MAJOR_NEGATIVE, MAJOR_TAG, MAJOR_TEXT, MAJOR_UNSIGNED,
};
use num_traits::ToPrimitive;

/// Metadata strings and byte strings are limited to 64 bytes each
pub const MAX_METADATUM_CHUNK: usize = 64;

/// Deepest list/map nesting accepted when decoding metadata
pub const MAX_METADATUM_DEPTH: usize = 128;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Metadatum {
    Int(i64),
    Bytes(Vec<u8>),
    Text(String),
    List(Vec<Metadatum>),
    Map(Vec<(Metadatum, Metadatum)>),
}

impl Metadatum {
    pub fn validate(&self) -> Result<()> {
        match self {
            Metadatum::Int(_) => Ok(()),
            Metadatum::Bytes(bytes) if bytes.len() > MAX_METADATUM_CHUNK => Err(
                TxBuildError::InvalidTransaction(format!(
                    "metadata bytes of {} exceed {} bytes",
                    bytes.len(),
                    MAX_METADATUM_CHUNK
                )),
            ),
            Metadatum::Text(text) if text.len() > MAX_METADATUM_CHUNK => Err(
                TxBuildError::InvalidTransaction(format!(
                    "metadata text of {} exceed {} bytes",
                    text.len(),
                    MAX_METADATUM_CHUNK
                )),
            ),
            Metadatum::Bytes(_) | Metadatum::Text(_) => Ok(()),
            Metadatum::List(items) => items.iter().try_for_each(Metadatum::validate),
            Metadatum::Map(entries) => entries.iter().try_for_each(|(k, v)| {
                k.validate()?;
                v.validate()
            }),
        }
    }
}

impl ByteSerialize for Metadatum {
    fn serialize_bytes(&self, writer: &mut Vec<u8>) -> Result<()> {
        match self {
            Metadatum::Int(value) => encode_int(*value, writer),
            Metadatum::Bytes(bytes) => encode_bytes(bytes, writer),
            Metadatum::Text(text) => encode_text(text, writer),
            Metadatum::List(items) => helpers::serialize_vec(items, writer),
            Metadatum::Map(entries) => {
                encode_map_len(entries.len(), writer)?;
                for (key, value) in entries {
                    key.serialize_bytes(writer)?;
                    value.serialize_bytes(writer)?;
                }
                Ok(())
            }
        }
    }
}

impl ByteDeserialize for Metadatum {
    fn deserialize_bytes(cursor: &mut Cursor<&[u8]>) -> Result<Self> {
        decode_metadatum(cursor, 0)
    }
}

fn decode_metadatum(cursor: &mut Cursor<&[u8]>, depth: usize) -> Result<Metadatum> {
    if depth > MAX_METADATUM_DEPTH {
        return Err(TxBuildError::DeserializationError(format!(
            "metadata nested deeper than {} levels",
            MAX_METADATUM_DEPTH
        )));
    }
    match peek_major(cursor)? {
        MAJOR_UNSIGNED | MAJOR_NEGATIVE | MAJOR_TAG => {
            let value = decode_int(cursor)?;
            value.to_i64().map(Metadatum::Int).ok_or_else(|| {
                TxBuildError::DeserializationError(format!(
                    "metadata integer {} out of range",
                    value
                ))
            })
        }
        MAJOR_BYTES => Ok(Metadatum::Bytes(decode_bytes(cursor)?)),
        MAJOR_TEXT => Ok(Metadatum::Text(decode_text(cursor)?)),
        MAJOR_ARRAY => Ok(Metadatum::List(helpers::decode_array(cursor, |cursor| {
            decode_metadatum(cursor, depth + 1)
        })?)),
        MAJOR_MAP => {
            let mut entries = Vec::new();
            helpers::decode_map(cursor, |cursor| {
                let key = decode_metadatum(cursor, depth + 1)?;
                let value = decode_metadatum(cursor, depth + 1)?;
                entries.push((key, value));
                Ok(())
            })?;
            Ok(Metadatum::Map(entries))
        }
        other => Err(TxBuildError::DeserializationError(format!(
            "unsupported metadatum major type {}",
            other
        ))),
    }
}

/// Label to metadatum, encoded as a plain map
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AuxiliaryData {
    pub metadata: BTreeMap<u64, Metadatum>,
}

impl AuxiliaryData {
    pub fn is_empty(&self) -> bool {
        self.metadata.is_empty()
    }

    pub fn hash(&self) -> Result<AuxiliaryDataHash> {
        Ok(blake2b_256(&self.to_bytes()?))
    }
}

impl ByteSerialize for AuxiliaryData {
    fn serialize_bytes(&self, writer: &mut Vec<u8>) -> Result<()> {
        encode_map_len(self.metadata.len(), writer)?;
        for (label, datum) in &self.metadata {
            encode_uint(*label, writer)?;
            datum.serialize_bytes(writer)?;
        }
        Ok(())
    }
}

impl ByteDeserialize for AuxiliaryData {
    fn deserialize_bytes(cursor: &mut Cursor<&[u8]>) -> Result<Self> {
        let mut metadata = BTreeMap::new();
        helpers::decode_map(cursor, |cursor| {
            let label = decode_uint(cursor)?;
            metadata.insert(label, Metadatum::deserialize_bytes(cursor)?);
            Ok(())
        })?;
        Ok(AuxiliaryData { metadata })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metadata_encoding() {
        let mut aux = AuxiliaryData::default();
        aux.metadata.insert(
            674,
            Metadatum::Map(vec![(
                Metadatum::Text("msg".to_string()),
                Metadatum::List(vec![Metadatum::Text("hi".to_string()), Metadatum::Int(-2)]),
            )]),
        );
        let bytes = aux.to_bytes().unwrap();
        assert_eq!(hex::encode(&bytes), "a11902a2a1636d73678262686921");
        assert_eq!(AuxiliaryData::from_bytes(&bytes).unwrap(), aux);
        assert_eq!(aux.hash().unwrap(), blake2b_256(&bytes));
    }

    #[test]
    fn test_oversized_text_is_rejected() {
        let datum = Metadatum::List(vec![Metadatum::Text("x".repeat(65))]);
        assert!(datum.validate().is_err());
        assert!(Metadatum::Bytes(vec![0; 64]).validate().is_ok());
    }

    #[test]
    fn test_nesting_depth_is_bounded() {
        let mut shallow = vec![0x81; 10];
        shallow.push(0x01);
        let mut datum = Metadatum::from_bytes(&shallow).unwrap();
        for _ in 0..10 {
            datum = match datum {
                Metadatum::List(mut items) => items.remove(0),
                other => panic!("unexpected metadatum {:?}", other),
            };
        }
        assert_eq!(datum, Metadatum::Int(1));

        let mut deep = vec![0x81; 100_000];
        deep.push(0x01);
        assert!(matches!(
            Metadatum::from_bytes(&deep),
            Err(TxBuildError::DeserializationError(_))
        ));
    }
}
