//! Transaction inputs, outputs and addresses

use std::fmt;
use std::io::Cursor;
use std::str::FromStr;

use num_bigint::BigInt;

use crate::error::{Result, TxBuildError};
use crate::hash::{DatumHash, Hash, KeyHash, ScriptHash, TxId};
use crate::script::{PlutusData, Script};
use crate::serialization::{
    decode_array_len, decode_bytes, decode_tag, decode_u32, decode_uint, encode_array_len,
    encode_bytes, encode_map_len, encode_tag, encode_uint, helpers, peek_major, ByteDeserialize,
    ByteSerialize, MAJOR_ARRAY, MAJOR_MAP, TAG_ENCODED_CBOR,
};
use crate::value::Value;

/// Raw binary address. The text (bech32/base58) codec lives outside this crate.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Address(Vec<u8>);

const BYRON_HEADER_TYPE: u8 = 8;

impl Address {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Result<Self> {
        let bytes = bytes.into();
        if bytes.is_empty() {
            return Err(TxBuildError::InvalidOutput("empty address".to_string()));
        }
        Ok(Self(bytes))
    }

    /// Enterprise address (`0x60 | network`) for a payment key hash
    pub fn enterprise(network_id: u8, payment: &KeyHash) -> Self {
        let mut bytes = Vec::with_capacity(29);
        bytes.push(0x60 | (network_id & 0x0f));
        bytes.extend_from_slice(payment.as_bytes());
        Self(bytes)
    }

    /// Base address (`0x00 | network`) with key payment and key stake parts
    pub fn base(network_id: u8, payment: &KeyHash, stake: &KeyHash) -> Self {
        let mut bytes = Vec::with_capacity(57);
        bytes.push(network_id & 0x0f);
        bytes.extend_from_slice(payment.as_bytes());
        bytes.extend_from_slice(stake.as_bytes());
        Self(bytes)
    }

    /// Enterprise address locked by a script (`0x70 | network`)
    pub fn script_enterprise(network_id: u8, script: &ScriptHash) -> Self {
        let mut bytes = Vec::with_capacity(29);
        bytes.push(0x70 | (network_id & 0x0f));
        bytes.extend_from_slice(script.as_bytes());
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn header_type(&self) -> u8 {
        self.0[0] >> 4
    }

    pub fn network_id(&self) -> u8 {
        self.0[0] & 0x0f
    }

    pub fn is_byron(&self) -> bool {
        self.header_type() == BYRON_HEADER_TYPE
    }

    /// Payment credential hash when the payment part is a key
    pub fn payment_key_hash(&self) -> Option<KeyHash> {
        match self.header_type() {
            0 | 2 | 4 | 6 => self.payment_part(),
            _ => None,
        }
    }

    /// Payment credential hash when the payment part is a script
    pub fn payment_script_hash(&self) -> Option<ScriptHash> {
        match self.header_type() {
            1 | 3 | 5 | 7 => self.payment_part(),
            _ => None,
        }
    }

    pub fn is_script_locked(&self) -> bool {
        self.payment_script_hash().is_some()
    }

    fn payment_part(&self) -> Option<Hash<28>> {
        self.0.get(1..29).and_then(|b| Hash::from_slice(b).ok())
    }
}

impl FromStr for Address {
    type Err = TxBuildError;

    fn from_str(s: &str) -> Result<Self> {
        Address::new(hex::decode(s)?)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(&self.0))
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({})", hex::encode(&self.0))
    }
}

impl ByteSerialize for Address {
    fn serialize_bytes(&self, writer: &mut Vec<u8>) -> Result<()> {
        encode_bytes(&self.0, writer)
    }
}

impl ByteDeserialize for Address {
    fn deserialize_bytes(cursor: &mut Cursor<&[u8]>) -> Result<Self> {
        Address::new(decode_bytes(cursor)?)
    }
}

/// Reference to an output of a previous transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TxIn {
    pub tx_id: TxId,
    pub index: u32,
}

impl TxIn {
    pub fn new(tx_id: TxId, index: u32) -> Self {
        Self { tx_id, index }
    }
}

impl fmt::Display for TxIn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.tx_id, self.index)
    }
}

impl ByteSerialize for TxIn {
    fn serialize_bytes(&self, writer: &mut Vec<u8>) -> Result<()> {
        encode_array_len(2, writer)?;
        self.tx_id.serialize_bytes(writer)?;
        encode_uint(self.index as u64, writer)
    }
}

impl ByteDeserialize for TxIn {
    fn deserialize_bytes(cursor: &mut Cursor<&[u8]>) -> Result<Self> {
        helpers::expect_array_len(cursor, 2)?;
        Ok(TxIn {
            tx_id: TxId::deserialize_bytes(cursor)?,
            index: decode_u32(cursor)?,
        })
    }
}

/// Datum attached to an output
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DatumSource {
    /// Only the hash; the datum is supplied by whoever spends the output
    Hash(DatumHash),
    /// Hash in the output, datum bytes added to this transaction's witness set
    HashWithData(PlutusData),
    /// Datum stored in the output itself
    Inline(PlutusData),
}

impl DatumSource {
    pub fn hash(&self) -> DatumHash {
        match self {
            DatumSource::Hash(hash) => *hash,
            DatumSource::HashWithData(data) | DatumSource::Inline(data) => data.hash(),
        }
    }

    pub fn is_inline(&self) -> bool {
        matches!(self, DatumSource::Inline(_))
    }
}

/// Wire shape of an output
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputEncoding {
    /// `[address, value, ?datum_hash]`
    Legacy,
    /// `{0: address, 1: value, ?2: datum_option, ?3: script_ref}`
    PostAlonzo,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxOut {
    pub address: Address,
    pub value: Value,
    pub datum: Option<DatumSource>,
    pub script_ref: Option<Script>,
}

impl TxOut {
    pub fn new(address: Address, value: Value) -> Self {
        Self {
            address,
            value,
            datum: None,
            script_ref: None,
        }
    }

    pub fn with_datum(mut self, datum: DatumSource) -> Self {
        self.datum = Some(datum);
        self
    }

    pub fn with_script_ref(mut self, script: Script) -> Self {
        self.script_ref = Some(script);
        self
    }

    pub fn coin(&self) -> BigInt {
        self.value.coin()
    }

    pub fn encoding(&self) -> OutputEncoding {
        let inline_datum = self.datum.as_ref().map_or(false, DatumSource::is_inline);
        if inline_datum || self.script_ref.is_some() {
            OutputEncoding::PostAlonzo
        } else {
            OutputEncoding::Legacy
        }
    }

    fn serialize_legacy(&self, writer: &mut Vec<u8>) -> Result<()> {
        encode_array_len(if self.datum.is_some() { 3 } else { 2 }, writer)?;
        self.address.serialize_bytes(writer)?;
        self.value.serialize_bytes(writer)?;
        if let Some(datum) = &self.datum {
            datum.hash().serialize_bytes(writer)?;
        }
        Ok(())
    }

    fn serialize_map(&self, writer: &mut Vec<u8>) -> Result<()> {
        let len = 2 + self.datum.is_some() as usize + self.script_ref.is_some() as usize;
        encode_map_len(len, writer)?;
        encode_uint(0, writer)?;
        self.address.serialize_bytes(writer)?;
        encode_uint(1, writer)?;
        self.value.serialize_bytes(writer)?;
        if let Some(datum) = &self.datum {
            encode_uint(2, writer)?;
            encode_array_len(2, writer)?;
            match datum {
                DatumSource::Inline(data) => {
                    encode_uint(1, writer)?;
                    encode_tag(TAG_ENCODED_CBOR, writer)?;
                    encode_bytes(data.as_cbor(), writer)?;
                }
                other => {
                    encode_uint(0, writer)?;
                    other.hash().serialize_bytes(writer)?;
                }
            }
        }
        if let Some(script) = &self.script_ref {
            encode_uint(3, writer)?;
            script.encode_script_ref(writer)?;
        }
        Ok(())
    }

    fn deserialize_legacy(cursor: &mut Cursor<&[u8]>) -> Result<Self> {
        let len = decode_array_len(cursor)?;
        let address = Address::deserialize_bytes(cursor)?;
        let value = Value::deserialize_bytes(cursor)?;
        let datum = match len {
            Some(2) => None,
            Some(3) => Some(DatumSource::Hash(DatumHash::deserialize_bytes(cursor)?)),
            other => {
                return Err(TxBuildError::DeserializationError(format!(
                    "legacy output must have 2 or 3 fields, found {:?}",
                    other
                )))
            }
        };
        Ok(TxOut {
            address,
            value,
            datum,
            script_ref: None,
        })
    }

    fn deserialize_map(cursor: &mut Cursor<&[u8]>) -> Result<Self> {
        let mut address = None;
        let mut value = None;
        let mut datum = None;
        let mut script_ref = None;
        helpers::decode_map(cursor, |cursor| {
            match decode_uint(cursor)? {
                0 => address = Some(Address::deserialize_bytes(cursor)?),
                1 => value = Some(Value::deserialize_bytes(cursor)?),
                2 => datum = Some(decode_datum_option(cursor)?),
                3 => script_ref = Some(Script::decode_script_ref(cursor)?),
                key => {
                    return Err(TxBuildError::DeserializationError(format!(
                        "unknown output field {}",
                        key
                    )))
                }
            }
            Ok(())
        })?;
        Ok(TxOut {
            address: address.ok_or_else(|| {
                TxBuildError::DeserializationError("output without address".to_string())
            })?,
            value: value.ok_or_else(|| {
                TxBuildError::DeserializationError("output without value".to_string())
            })?,
            datum,
            script_ref,
        })
    }
}

fn decode_datum_option(cursor: &mut Cursor<&[u8]>) -> Result<DatumSource> {
    helpers::expect_array_len(cursor, 2)?;
    match decode_uint(cursor)? {
        0 => Ok(DatumSource::Hash(DatumHash::deserialize_bytes(cursor)?)),
        1 => {
            let tag = decode_tag(cursor)?;
            if tag != TAG_ENCODED_CBOR {
                return Err(TxBuildError::DeserializationError(format!(
                    "expected tag 24 for inline datum, found {}",
                    tag
                )));
            }
            Ok(DatumSource::Inline(PlutusData::from_cbor(decode_bytes(cursor)?)?))
        }
        other => Err(TxBuildError::DeserializationError(format!(
            "unknown datum option {}",
            other
        ))),
    }
}

impl ByteSerialize for TxOut {
    fn serialize_bytes(&self, writer: &mut Vec<u8>) -> Result<()> {
        match self.encoding() {
            OutputEncoding::Legacy => self.serialize_legacy(writer),
            OutputEncoding::PostAlonzo => self.serialize_map(writer),
        }
    }
}

impl ByteDeserialize for TxOut {
    fn deserialize_bytes(cursor: &mut Cursor<&[u8]>) -> Result<Self> {
        match peek_major(cursor)? {
            MAJOR_ARRAY => TxOut::deserialize_legacy(cursor),
            MAJOR_MAP => TxOut::deserialize_map(cursor),
            other => Err(TxBuildError::DeserializationError(format!(
                "output must be an array or map, found major type {}",
                other
            ))),
        }
    }
}

/// An unspent output together with the input that references it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Utxo {
    pub input: TxIn,
    pub output: TxOut,
}

impl Utxo {
    pub fn new(input: TxIn, output: TxOut) -> Self {
        Self { input, output }
    }

    pub fn coin(&self) -> BigInt {
        self.output.coin()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::script::PlutusVersion;
    use crate::value::{Asset, AssetName};

    fn key_address() -> Address {
        Address::enterprise(0, &Hash([1u8; 28]))
    }

    #[test]
    fn test_address_credentials() {
        let address = key_address();
        assert_eq!(address.payment_key_hash(), Some(Hash([1u8; 28])));
        assert!(!address.is_script_locked());

        let script = Address::script_enterprise(1, &Hash([2u8; 28]));
        assert_eq!(script.network_id(), 1);
        assert_eq!(script.payment_script_hash(), Some(Hash([2u8; 28])));
        assert!(script.payment_key_hash().is_none());
    }

    #[test]
    fn test_txin_ordering_and_encoding() {
        let a = TxIn::new(Hash([0u8; 32]), 5);
        let b = TxIn::new(Hash([0u8; 32]), 10);
        let c = TxIn::new(Hash([1u8; 32]), 0);
        assert!(a < b && b < c);

        let bytes = a.to_bytes().unwrap();
        assert_eq!(bytes[0], 0x82);
        assert_eq!(bytes.len(), 1 + 34 + 1);
        assert_eq!(TxIn::from_bytes(&bytes).unwrap(), a);
    }

    #[test]
    fn test_encoding_predicate() {
        let data = PlutusData::from_cbor(vec![0x01]).unwrap();
        let plain = TxOut::new(key_address(), Value::from_coin(1_000_000u64));
        assert_eq!(plain.encoding(), OutputEncoding::Legacy);
        assert_eq!(
            plain.clone().with_datum(DatumSource::HashWithData(data.clone())).encoding(),
            OutputEncoding::Legacy
        );
        assert_eq!(
            plain.clone().with_datum(DatumSource::Inline(data)).encoding(),
            OutputEncoding::PostAlonzo
        );
        assert_eq!(
            plain
                .with_script_ref(Script::plutus(PlutusVersion::V2, vec![1, 2, 3]))
                .encoding(),
            OutputEncoding::PostAlonzo
        );
    }

    #[test]
    fn test_legacy_output_decodes_back() {
        let asset = Asset::new(Hash([9u8; 28]), AssetName::new(b"tok".to_vec()).unwrap());
        let output = TxOut::new(
            key_address(),
            Value::from_coin(2_000_000u64).with_asset(asset, 3),
        )
        .with_datum(DatumSource::Hash(Hash([4u8; 32])));
        let bytes = output.to_bytes().unwrap();
        assert_eq!(bytes[0], 0x83);
        assert_eq!(TxOut::from_bytes(&bytes).unwrap(), output);
    }

    #[test]
    fn test_map_output_with_inline_datum_and_script() {
        let output = TxOut::new(key_address(), Value::from_coin(3_000_000u64))
            .with_datum(DatumSource::Inline(PlutusData::from_cbor(vec![0x80]).unwrap()))
            .with_script_ref(Script::plutus(PlutusVersion::V3, vec![7; 40]));
        let bytes = output.to_bytes().unwrap();
        assert_eq!(bytes[0], 0xa4);
        assert_eq!(TxOut::from_bytes(&bytes).unwrap(), output);
    }

    #[test]
    fn test_hash_with_data_serializes_as_hash() {
        let data = PlutusData::from_cbor(vec![0x02]).unwrap();
        let with_data = TxOut::new(key_address(), Value::from_coin(1u64))
            .with_datum(DatumSource::HashWithData(data.clone()));
        let with_hash = TxOut::new(key_address(), Value::from_coin(1u64))
            .with_datum(DatumSource::Hash(data.hash()));
        assert_eq!(with_data.to_bytes().unwrap(), with_hash.to_bytes().unwrap());
    }
}
