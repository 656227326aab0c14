//! Stake credentials, reward addresses and certificates

use std::cmp::Ordering;
use std::fmt;
use std::io::Cursor;

use crate::error::{Result, TxBuildError};
use crate::hash::{Hash, KeyHash, ScriptHash};
use crate::params::ProtocolParameters;
use crate::serialization::{
    decode_array_len, decode_bytes, decode_uint, encode_array_len, encode_bytes, encode_uint, helpers,
    ByteDeserialize, ByteSerialize,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum StakeCredential {
    Key(KeyHash),
    Script(ScriptHash),
}

impl StakeCredential {
    pub fn hash(&self) -> &Hash<28> {
        match self {
            StakeCredential::Key(hash) | StakeCredential::Script(hash) => hash,
        }
    }

    pub fn key_hash(&self) -> Option<KeyHash> {
        match self {
            StakeCredential::Key(hash) => Some(*hash),
            StakeCredential::Script(_) => None,
        }
    }
}

impl ByteSerialize for StakeCredential {
    fn serialize_bytes(&self, writer: &mut Vec<u8>) -> Result<()> {
        encode_array_len(2, writer)?;
        match self {
            StakeCredential::Key(_) => encode_uint(0, writer)?,
            StakeCredential::Script(_) => encode_uint(1, writer)?,
        }
        self.hash().serialize_bytes(writer)
    }
}

impl ByteDeserialize for StakeCredential {
    fn deserialize_bytes(cursor: &mut Cursor<&[u8]>) -> Result<Self> {
        helpers::expect_array_len(cursor, 2)?;
        let kind = decode_uint(cursor)?;
        let hash = Hash::<28>::deserialize_bytes(cursor)?;
        match kind {
            0 => Ok(StakeCredential::Key(hash)),
            1 => Ok(StakeCredential::Script(hash)),
            other => Err(TxBuildError::DeserializationError(format!(
                "unknown credential kind {}",
                other
            ))),
        }
    }
}

/// Reward account address: a header byte followed by the stake credential.
/// Ordered by raw bytes, the order withdrawal map keys take on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RewardAddress {
    pub network_id: u8,
    pub credential: StakeCredential,
}

const REWARD_KEY_HEADER: u8 = 0xe0;
const REWARD_SCRIPT_HEADER: u8 = 0xf0;

impl RewardAddress {
    pub fn new(network_id: u8, credential: StakeCredential) -> Self {
        Self {
            network_id: network_id & 0x0f,
            credential,
        }
    }

    pub fn to_raw(&self) -> [u8; 29] {
        let header = match self.credential {
            StakeCredential::Key(_) => REWARD_KEY_HEADER,
            StakeCredential::Script(_) => REWARD_SCRIPT_HEADER,
        };
        let mut raw = [0u8; 29];
        raw[0] = header | self.network_id;
        raw[1..].copy_from_slice(self.credential.hash().as_bytes());
        raw
    }

    pub fn from_raw(raw: &[u8]) -> Result<Self> {
        if raw.len() != 29 {
            return Err(TxBuildError::DeserializationError(format!(
                "reward address must be 29 bytes, found {}",
                raw.len()
            )));
        }
        let hash = Hash::from_slice(&raw[1..])?;
        let credential = match raw[0] & 0xf0 {
            REWARD_KEY_HEADER => StakeCredential::Key(hash),
            REWARD_SCRIPT_HEADER => StakeCredential::Script(hash),
            other => {
                return Err(TxBuildError::DeserializationError(format!(
                    "invalid reward address header 0x{:02x}",
                    other
                )))
            }
        };
        Ok(Self::new(raw[0] & 0x0f, credential))
    }
}

impl Ord for RewardAddress {
    fn cmp(&self, other: &Self) -> Ordering {
        self.to_raw().cmp(&other.to_raw())
    }
}

impl PartialOrd for RewardAddress {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for RewardAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.to_raw()))
    }
}

impl ByteSerialize for RewardAddress {
    fn serialize_bytes(&self, writer: &mut Vec<u8>) -> Result<()> {
        encode_bytes(&self.to_raw(), writer)
    }
}

impl ByteDeserialize for RewardAddress {
    fn deserialize_bytes(cursor: &mut Cursor<&[u8]>) -> Result<Self> {
        RewardAddress::from_raw(&decode_bytes(cursor)?)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Certificate {
    StakeRegistration(StakeCredential),
    StakeDeregistration(StakeCredential),
    StakeDelegation {
        credential: StakeCredential,
        pool: KeyHash,
    },
}

impl Certificate {
    pub fn credential(&self) -> &StakeCredential {
        match self {
            Certificate::StakeRegistration(credential)
            | Certificate::StakeDeregistration(credential)
            | Certificate::StakeDelegation { credential, .. } => credential,
        }
    }

    /// Deposit taken from the transaction's balance
    pub fn deposit(&self, params: &ProtocolParameters) -> u64 {
        match self {
            Certificate::StakeRegistration(_) => params.stake_deposit,
            _ => 0,
        }
    }

    /// Deposit returned to the transaction's balance
    pub fn refund(&self, params: &ProtocolParameters) -> u64 {
        match self {
            Certificate::StakeDeregistration(_) => params.stake_deposit,
            _ => 0,
        }
    }

    /// Key hash that must sign for this certificate. Registration needs no witness.
    pub fn required_signer(&self) -> Option<KeyHash> {
        match self {
            Certificate::StakeRegistration(_) => None,
            other => other.credential().key_hash(),
        }
    }

    /// Whether a script witness (and redeemer) validates this certificate
    pub fn needs_script_witness(&self) -> bool {
        !matches!(self, Certificate::StakeRegistration(_))
            && matches!(self.credential(), StakeCredential::Script(_))
    }
}

impl ByteSerialize for Certificate {
    fn serialize_bytes(&self, writer: &mut Vec<u8>) -> Result<()> {
        match self {
            Certificate::StakeRegistration(credential) => {
                encode_array_len(2, writer)?;
                encode_uint(0, writer)?;
                credential.serialize_bytes(writer)
            }
            Certificate::StakeDeregistration(credential) => {
                encode_array_len(2, writer)?;
                encode_uint(1, writer)?;
                credential.serialize_bytes(writer)
            }
            Certificate::StakeDelegation { credential, pool } => {
                encode_array_len(3, writer)?;
                encode_uint(2, writer)?;
                credential.serialize_bytes(writer)?;
                pool.serialize_bytes(writer)
            }
        }
    }
}

impl ByteDeserialize for Certificate {
    fn deserialize_bytes(cursor: &mut Cursor<&[u8]>) -> Result<Self> {
        let len = decode_array_len(cursor)?;
        let kind = decode_uint(cursor)?;
        match (kind, len) {
            (0, Some(2)) => Ok(Certificate::StakeRegistration(
                StakeCredential::deserialize_bytes(cursor)?,
            )),
            (1, Some(2)) => Ok(Certificate::StakeDeregistration(
                StakeCredential::deserialize_bytes(cursor)?,
            )),
            (2, Some(3)) => Ok(Certificate::StakeDelegation {
                credential: StakeCredential::deserialize_bytes(cursor)?,
                pool: KeyHash::deserialize_bytes(cursor)?,
            }),
            (kind, len) => Err(TxBuildError::DeserializationError(format!(
                "unsupported certificate kind {} with {:?} fields",
                kind, len
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reward_address_raw_form() {
        let address = RewardAddress::new(1, StakeCredential::Key(Hash([3u8; 28])));
        let raw = address.to_raw();
        assert_eq!(raw[0], 0xe1);
        assert_eq!(RewardAddress::from_raw(&raw).unwrap(), address);

        let script = RewardAddress::new(0, StakeCredential::Script(Hash([3u8; 28])));
        assert_eq!(script.to_raw()[0], 0xf0);
        assert!(RewardAddress::from_raw(&[0x60; 29]).is_err());
    }

    #[test]
    fn test_deposits_and_refunds() {
        let params = ProtocolParameters::default();
        let credential = StakeCredential::Key(Hash([1u8; 28]));
        let registration = Certificate::StakeRegistration(credential);
        let deregistration = Certificate::StakeDeregistration(credential);
        assert_eq!(registration.deposit(&params), params.stake_deposit);
        assert_eq!(registration.refund(&params), 0);
        assert_eq!(deregistration.refund(&params), params.stake_deposit);
        assert!(registration.required_signer().is_none());
        assert_eq!(deregistration.required_signer(), Some(Hash([1u8; 28])));
    }

    #[test]
    fn test_certificate_encoding() {
        let cert = Certificate::StakeDelegation {
            credential: StakeCredential::Script(Hash([2u8; 28])),
            pool: Hash([5u8; 28]),
        };
        let bytes = cert.to_bytes().unwrap();
        assert_eq!(&bytes[..4], &[0x83, 0x02, 0x82, 0x01]);
        assert_eq!(Certificate::from_bytes(&bytes).unwrap(), cert);
        assert!(cert.needs_script_witness());
    }
}
