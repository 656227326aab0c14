//! Scripts, datums and redeemers
//!
//! Redeemers are keyed by a symbolic [`RedeemerTarget`] while the draft is
//! being built. Positional `(tag, index)` pointers only exist once the final
//! input, policy and withdrawal order is fixed at compile time.

use std::fmt;
use std::io::Cursor;

use serde::{Deserialize, Serialize};

use crate::certificate::RewardAddress;
use crate::error::{Result, TxBuildError};
use crate::hash::{blake2b_224, blake2b_256, DatumHash, ScriptHash};
use crate::output::TxIn;
use crate::serialization::{
    decode_bytes, decode_raw_item, decode_tag, decode_uint, encode_array_len, encode_bytes,
    encode_raw, encode_tag, encode_uint, helpers, skip_item, ByteDeserialize, ByteSerialize,
    TAG_ENCODED_CBOR,
};
use crate::value::PolicyId;

/// Plutus language version
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum PlutusVersion {
    #[serde(rename = "PlutusV1")]
    V1,
    #[serde(rename = "PlutusV2")]
    V2,
    #[serde(rename = "PlutusV3")]
    V3,
}

impl PlutusVersion {
    /// Language id used in cost-model maps (0 for V1)
    pub fn language_id(&self) -> u8 {
        match self {
            PlutusVersion::V1 => 0,
            PlutusVersion::V2 => 1,
            PlutusVersion::V3 => 2,
        }
    }

    /// Tag used in script hashes and reference scripts (1 for V1)
    pub fn script_tag(&self) -> u8 {
        self.language_id() + 1
    }

    fn from_script_tag(tag: u64) -> Result<Self> {
        match tag {
            1 => Ok(PlutusVersion::V1),
            2 => Ok(PlutusVersion::V2),
            3 => Ok(PlutusVersion::V3),
            other => Err(TxBuildError::DeserializationError(format!(
                "unknown script language tag {}",
                other
            ))),
        }
    }
}

const NATIVE_SCRIPT_TAG: u8 = 0;

/// Arbitrary Plutus data, kept as its original CBOR bytes
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PlutusData(Vec<u8>);

impl PlutusData {
    /// Wrap bytes that must hold exactly one CBOR item
    pub fn from_cbor(bytes: impl Into<Vec<u8>>) -> Result<Self> {
        let bytes = bytes.into();
        let mut cursor = Cursor::new(bytes.as_slice());
        skip_item(&mut cursor)?;
        if cursor.position() as usize != bytes.len() {
            return Err(TxBuildError::DeserializationError(
                "plutus data must be a single CBOR item".to_string(),
            ));
        }
        Ok(Self(bytes))
    }

    pub fn as_cbor(&self) -> &[u8] {
        &self.0
    }

    pub fn hash(&self) -> DatumHash {
        blake2b_256(&self.0)
    }
}

impl fmt::Debug for PlutusData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PlutusData({})", hex::encode(&self.0))
    }
}

impl ByteSerialize for PlutusData {
    fn serialize_bytes(&self, writer: &mut Vec<u8>) -> Result<()> {
        encode_raw(&self.0, writer)
    }
}

impl ByteDeserialize for PlutusData {
    fn deserialize_bytes(cursor: &mut Cursor<&[u8]>) -> Result<Self> {
        Ok(Self(decode_raw_item(cursor)?.to_vec()))
    }
}

/// A native (multisig/timelock) script or a Plutus script
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Script {
    /// Raw CBOR of the native script
    Native(Vec<u8>),
    /// Serialized Plutus program bytes
    Plutus { version: PlutusVersion, bytes: Vec<u8> },
}

impl Script {
    pub fn native(cbor: impl Into<Vec<u8>>) -> Result<Self> {
        let cbor = cbor.into();
        let mut cursor = Cursor::new(cbor.as_slice());
        skip_item(&mut cursor)?;
        if cursor.position() as usize != cbor.len() {
            return Err(TxBuildError::DeserializationError(
                "native script must be a single CBOR item".to_string(),
            ));
        }
        Ok(Script::Native(cbor))
    }

    pub fn plutus(version: PlutusVersion, bytes: impl Into<Vec<u8>>) -> Self {
        Script::Plutus {
            version,
            bytes: bytes.into(),
        }
    }

    pub fn hash(&self) -> ScriptHash {
        let (tag, bytes) = match self {
            Script::Native(cbor) => (NATIVE_SCRIPT_TAG, cbor),
            Script::Plutus { version, bytes } => (version.script_tag(), bytes),
        };
        let mut preimage = Vec::with_capacity(bytes.len() + 1);
        preimage.push(tag);
        preimage.extend_from_slice(bytes);
        blake2b_224(&preimage)
    }

    pub fn plutus_version(&self) -> Option<PlutusVersion> {
        match self {
            Script::Native(_) => None,
            Script::Plutus { version, .. } => Some(*version),
        }
    }

    /// Byte length counted by the reference-script fee
    pub fn size(&self) -> usize {
        match self {
            Script::Native(cbor) => cbor.len(),
            Script::Plutus { bytes, .. } => bytes.len(),
        }
    }

    /// Encode as the `[language, script]` pair carried inside reference scripts
    fn encode_tagged(&self, writer: &mut Vec<u8>) -> Result<()> {
        encode_array_len(2, writer)?;
        match self {
            Script::Native(cbor) => {
                encode_uint(NATIVE_SCRIPT_TAG as u64, writer)?;
                encode_raw(cbor, writer)
            }
            Script::Plutus { version, bytes } => {
                encode_uint(version.script_tag() as u64, writer)?;
                encode_bytes(bytes, writer)
            }
        }
    }

    fn decode_tagged(cursor: &mut Cursor<&[u8]>) -> Result<Self> {
        helpers::expect_array_len(cursor, 2)?;
        match decode_uint(cursor)? {
            0 => Ok(Script::Native(decode_raw_item(cursor)?.to_vec())),
            tag => Ok(Script::Plutus {
                version: PlutusVersion::from_script_tag(tag)?,
                bytes: decode_bytes(cursor)?,
            }),
        }
    }

    /// Encode as a reference script: `#6.24(bytes .cbor [language, script])`
    pub fn encode_script_ref(&self, writer: &mut Vec<u8>) -> Result<()> {
        let mut inner = Vec::new();
        self.encode_tagged(&mut inner)?;
        encode_tag(TAG_ENCODED_CBOR, writer)?;
        encode_bytes(&inner, writer)
    }

    pub fn decode_script_ref(cursor: &mut Cursor<&[u8]>) -> Result<Self> {
        let tag = decode_tag(cursor)?;
        if tag != TAG_ENCODED_CBOR {
            return Err(TxBuildError::DeserializationError(format!(
                "expected tag 24 for script reference, found {}",
                tag
            )));
        }
        let inner = decode_bytes(cursor)?;
        let mut inner_cursor = Cursor::new(inner.as_slice());
        Script::decode_tagged(&mut inner_cursor)
    }
}

impl fmt::Debug for Script {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Script::Native(_) => write!(f, "Script::Native({})", self.hash()),
            Script::Plutus { version, bytes } => write!(
                f,
                "Script::Plutus({:?}, {} bytes, {})",
                version,
                bytes.len(),
                self.hash()
            ),
        }
    }
}

/// Memory and CPU-step budget of a script invocation
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct ExUnits {
    pub mem: u64,
    pub steps: u64,
}

impl ExUnits {
    pub fn new(mem: u64, steps: u64) -> Self {
        Self { mem, steps }
    }

    pub fn saturating_add(self, other: ExUnits) -> ExUnits {
        ExUnits {
            mem: self.mem.saturating_add(other.mem),
            steps: self.steps.saturating_add(other.steps),
        }
    }
}

impl ByteSerialize for ExUnits {
    fn serialize_bytes(&self, writer: &mut Vec<u8>) -> Result<()> {
        encode_array_len(2, writer)?;
        encode_uint(self.mem, writer)?;
        encode_uint(self.steps, writer)
    }
}

impl ByteDeserialize for ExUnits {
    fn deserialize_bytes(cursor: &mut Cursor<&[u8]>) -> Result<Self> {
        helpers::expect_array_len(cursor, 2)?;
        Ok(ExUnits {
            mem: decode_uint(cursor)?,
            steps: decode_uint(cursor)?,
        })
    }
}

/// What a redeemer's script is validating
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum RedeemerTag {
    Spend,
    Mint,
    Cert,
    Reward,
}

impl RedeemerTag {
    pub fn code(&self) -> u64 {
        match self {
            RedeemerTag::Spend => 0,
            RedeemerTag::Mint => 1,
            RedeemerTag::Cert => 2,
            RedeemerTag::Reward => 3,
        }
    }

    pub fn from_code(code: u64) -> Result<Self> {
        match code {
            0 => Ok(RedeemerTag::Spend),
            1 => Ok(RedeemerTag::Mint),
            2 => Ok(RedeemerTag::Cert),
            3 => Ok(RedeemerTag::Reward),
            other => Err(TxBuildError::DeserializationError(format!(
                "unknown redeemer tag {}",
                other
            ))),
        }
    }
}

/// Symbolic reference to the item a redeemer unlocks
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum RedeemerTarget {
    Spend(TxIn),
    Mint(PolicyId),
    /// Position in the certificate list, which keeps insertion order
    Cert(usize),
    Reward(RewardAddress),
}

impl RedeemerTarget {
    pub fn tag(&self) -> RedeemerTag {
        match self {
            RedeemerTarget::Spend(_) => RedeemerTag::Spend,
            RedeemerTarget::Mint(_) => RedeemerTag::Mint,
            RedeemerTarget::Cert(_) => RedeemerTag::Cert,
            RedeemerTarget::Reward(_) => RedeemerTag::Reward,
        }
    }
}

impl fmt::Display for RedeemerTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RedeemerTarget::Spend(input) => write!(f, "spend {}", input),
            RedeemerTarget::Mint(policy) => write!(f, "mint {}", policy),
            RedeemerTarget::Cert(index) => write!(f, "certificate #{}", index),
            RedeemerTarget::Reward(address) => write!(f, "withdrawal {}", address),
        }
    }
}

/// Positional redeemer key as it appears on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RedeemerPointer {
    pub tag: RedeemerTag,
    pub index: u32,
}

/// Redeemer data and its execution budget
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Redeemer {
    pub data: PlutusData,
    pub ex_units: ExUnits,
}

/// A redeemer with its resolved pointer, ready to encode
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WireRedeemer {
    pub pointer: RedeemerPointer,
    pub data: PlutusData,
    pub ex_units: ExUnits,
}

impl ByteSerialize for WireRedeemer {
    fn serialize_bytes(&self, writer: &mut Vec<u8>) -> Result<()> {
        encode_array_len(4, writer)?;
        encode_uint(self.pointer.tag.code(), writer)?;
        encode_uint(self.pointer.index as u64, writer)?;
        self.data.serialize_bytes(writer)?;
        self.ex_units.serialize_bytes(writer)
    }
}

impl ByteDeserialize for WireRedeemer {
    fn deserialize_bytes(cursor: &mut Cursor<&[u8]>) -> Result<Self> {
        helpers::expect_array_len(cursor, 4)?;
        let tag = RedeemerTag::from_code(decode_uint(cursor)?)?;
        let index = crate::serialization::decode_u32(cursor)?;
        let data = PlutusData::deserialize_bytes(cursor)?;
        let ex_units = ExUnits::deserialize_bytes(cursor)?;
        Ok(WireRedeemer {
            pointer: RedeemerPointer { tag, index },
            data,
            ex_units,
        })
    }
}

/// Where the script validating an item comes from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptSource {
    /// Script bytes travel in the witness set
    Attached(Script),
    /// Script is read from the reference script of this output
    Reference(TxIn),
}

/// Witness required to spend, mint, certify or withdraw under a script
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptWitness {
    Native(Script),
    Plutus {
        script: ScriptSource,
        redeemer: PlutusData,
        ex_units: ExUnits,
        /// Datum to attach when the spent output only carries its hash
        datum: Option<PlutusData>,
    },
}

impl ScriptWitness {
    pub fn plutus(script: ScriptSource, redeemer: PlutusData, ex_units: ExUnits) -> Self {
        ScriptWitness::Plutus {
            script,
            redeemer,
            ex_units,
            datum: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_script_hash_depends_on_language() {
        let v1 = Script::plutus(PlutusVersion::V1, vec![0x4e, 0x4d, 0x01]);
        let v2 = Script::plutus(PlutusVersion::V2, vec![0x4e, 0x4d, 0x01]);
        assert_ne!(v1.hash(), v2.hash());
        let mut preimage = vec![2u8];
        preimage.extend_from_slice(&[0x4e, 0x4d, 0x01]);
        assert_eq!(v2.hash(), blake2b_224(&preimage));
    }

    #[test]
    fn test_script_ref_encoding_is_tagged_by_language() {
        let script = Script::plutus(PlutusVersion::V2, vec![0xaa, 0xbb]);
        let mut buf = Vec::new();
        script.encode_script_ref(&mut buf).unwrap();
        // tag(24) bytes(5) [2, h'aabb']
        assert_eq!(hex::encode(&buf), "d81845820242aabb");

        let mut cursor = Cursor::new(buf.as_slice());
        assert_eq!(Script::decode_script_ref(&mut cursor).unwrap(), script);
    }

    #[test]
    fn test_native_script_must_be_one_item() {
        assert!(Script::native(vec![0x82, 0x00, 0x41, 0x01]).is_ok());
        assert!(Script::native(vec![0x01, 0x02]).is_err());
    }

    #[test]
    fn test_plutus_data_validation_and_hash() {
        let data = PlutusData::from_cbor(vec![0xd8, 0x79, 0x80]).unwrap();
        assert_eq!(data.hash(), blake2b_256(&[0xd8, 0x79, 0x80]));
        assert!(PlutusData::from_cbor(vec![0x80, 0x80]).is_err());
    }

    #[test]
    fn test_wire_redeemer_encoding() {
        let redeemer = WireRedeemer {
            pointer: RedeemerPointer {
                tag: RedeemerTag::Mint,
                index: 1,
            },
            data: PlutusData::from_cbor(vec![0x00]).unwrap(),
            ex_units: ExUnits::new(10, 20),
        };
        let bytes = redeemer.to_bytes().unwrap();
        assert_eq!(hex::encode(&bytes), "84010100820a14");
        assert_eq!(WireRedeemer::from_bytes(&bytes).unwrap(), redeemer);
    }
}
