//! Ledger hashes
//!
//! Transaction ids, datum hashes and auxiliary-data hashes are blake2b-256;
//! script, key and policy hashes are blake2b-224.

use std::fmt;
use std::io::Cursor;
use std::str::FromStr;

use blake2::digest::consts::{U28, U32};
use blake2::{Blake2b, Digest};

use crate::error::{Result, TxBuildError};
use crate::serialization::{decode_fixed_bytes, encode_bytes, ByteDeserialize, ByteSerialize};

type Blake2b224 = Blake2b<U28>;
type Blake2b256 = Blake2b<U32>;

/// A fixed-length hash digest
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Hash<const N: usize>(pub [u8; N]);

pub type TxId = Hash<32>;
pub type DatumHash = Hash<32>;
pub type ScriptDataHash = Hash<32>;
pub type AuxiliaryDataHash = Hash<32>;
pub type ScriptHash = Hash<28>;
pub type KeyHash = Hash<28>;

impl<const N: usize> Hash<N> {
    pub const fn new(bytes: [u8; N]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; N] {
        &self.0
    }

    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != N {
            return Err(TxBuildError::DeserializationError(format!(
                "expected {} hash bytes, found {}",
                N,
                bytes.len()
            )));
        }
        let mut out = [0u8; N];
        out.copy_from_slice(bytes);
        Ok(Self(out))
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl<const N: usize> FromStr for Hash<N> {
    type Err = TxBuildError;

    fn from_str(s: &str) -> Result<Self> {
        Self::from_slice(&hex::decode(s)?)
    }
}

impl<const N: usize> fmt::Display for Hash<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl<const N: usize> fmt::Debug for Hash<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Hash<{}>({})", N, self.to_hex())
    }
}

impl<const N: usize> ByteSerialize for Hash<N> {
    fn serialize_bytes(&self, writer: &mut Vec<u8>) -> Result<()> {
        encode_bytes(&self.0, writer)
    }
}

impl<const N: usize> ByteDeserialize for Hash<N> {
    fn deserialize_bytes(cursor: &mut Cursor<&[u8]>) -> Result<Self> {
        Ok(Self(decode_fixed_bytes::<N>(cursor)?))
    }
}

pub fn blake2b_256(data: &[u8]) -> Hash<32> {
    let mut hasher = Blake2b256::new();
    hasher.update(data);
    let mut out = [0u8; 32];
    out.copy_from_slice(&hasher.finalize());
    Hash(out)
}

pub fn blake2b_224(data: &[u8]) -> Hash<28> {
    let mut hasher = Blake2b224::new();
    hasher.update(data);
    let mut out = [0u8; 28];
    out.copy_from_slice(&hasher.finalize());
    Hash(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blake2b_256_empty_input() {
        assert_eq!(
            blake2b_256(b"").to_hex(),
            "0e5751c026e543b2e8ab2eb06099daa1d1e5df47778f7787faab45cdf12fe3a8"
        );
    }

    #[test]
    fn test_blake2b_224_length() {
        let hash = blake2b_224(b"script");
        assert_eq!(hash.as_bytes().len(), 28);
        assert_ne!(hash, blake2b_224(b"scripts"));
    }

    #[test]
    fn test_hex_parsing() {
        let hash: Hash<28> = "00".repeat(28).parse().unwrap();
        assert_eq!(hash, Hash([0u8; 28]));
        assert!("00".parse::<Hash<28>>().is_err());
    }

    #[test]
    fn test_cbor_encoding() {
        let hash = Hash([7u8; 28]);
        let bytes = hash.to_bytes().unwrap();
        assert_eq!(bytes[0], 0x58);
        assert_eq!(bytes[1], 28);
        assert_eq!(Hash::<28>::from_bytes(&bytes).unwrap(), hash);
    }
}
