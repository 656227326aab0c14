//! Signing and witness assembly
//!
//! Witnesses are merged into serialized transactions without touching the
//! body: the body bytes are copied through as-is, so the transaction id
//! cannot change. Only the witness map is rebuilt, with its other entries
//! kept as raw bytes.

use std::collections::BTreeMap;
use std::io::Cursor;

use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};

use crate::error::{Result, TxBuildError};
use crate::hash::{blake2b_224, KeyHash, TxId};
use crate::serialization::{
    decode_raw_item, decode_uint, encode_array_len, encode_map_len, encode_uint, helpers,
    remaining, skip_item, ByteDeserialize, ByteSerialize,
};
use crate::transaction::{Transaction, VkeyWitness};

const VKEY_WITNESS_KEY: u64 = 0;

/// Sign a transaction id
pub fn sign(tx_id: &TxId, key: &SigningKey) -> VkeyWitness {
    let signature = key.sign(tx_id.as_bytes());
    VkeyWitness {
        vkey: key.verifying_key().to_bytes(),
        signature: signature.to_bytes(),
    }
}

/// Key hash a witness signs for, as it appears in addresses and required signers
pub fn witness_key_hash(witness: &VkeyWitness) -> KeyHash {
    blake2b_224(&witness.vkey)
}

pub fn verify_witness(tx_id: &TxId, witness: &VkeyWitness) -> Result<()> {
    let key = VerifyingKey::from_bytes(&witness.vkey)
        .map_err(|err| TxBuildError::SignatureError(format!("invalid verification key: {}", err)))?;
    let signature = Signature::from_bytes(&witness.signature);
    key.verify(tx_id.as_bytes(), &signature).map_err(|_| {
        TxBuildError::SignatureError(format!(
            "signature by {} does not verify",
            witness_key_hash(witness)
        ))
    })
}

/// Verify every vkey witness of a serialized transaction against its id
pub fn verify_transaction(tx_bytes: &[u8]) -> Result<()> {
    let tx = Transaction::from_bytes(tx_bytes)?;
    let id = tx.id()?;
    for witness in &tx.witness_set.vkeys {
        verify_witness(&id, witness)?;
    }
    Ok(())
}

/// Merge `witnesses` into the witness set of `tx_bytes`.
///
/// Witnesses are keyed by verification key, so assembling the same witness
/// twice or in any order yields the same bytes. If one key carries two
/// different signatures the smaller one is kept.
pub fn assemble(tx_bytes: &[u8], witnesses: &[VkeyWitness]) -> Result<Vec<u8>> {
    let mut cursor = Cursor::new(tx_bytes);
    helpers::expect_array_len(&mut cursor, 4)?;
    let body = decode_raw_item(&mut cursor)?;
    let witness_set = decode_raw_item(&mut cursor)?;
    let tail_start = cursor.position() as usize;
    skip_item(&mut cursor)?;
    skip_item(&mut cursor)?;
    if remaining(&cursor) != 0 {
        return Err(TxBuildError::DeserializationError(format!(
            "{} trailing bytes after transaction",
            remaining(&cursor)
        )));
    }
    let tail = &tx_bytes[tail_start..];

    let merged = merge_witness_set(witness_set, witnesses)?;
    let mut out = Vec::with_capacity(tx_bytes.len() + witnesses.len() * 101);
    encode_array_len(4, &mut out)?;
    out.extend_from_slice(body);
    out.extend_from_slice(&merged);
    out.extend_from_slice(tail);
    Ok(out)
}

fn merge_witness_set(raw: &[u8], witnesses: &[VkeyWitness]) -> Result<Vec<u8>> {
    let mut entries: BTreeMap<u64, Vec<u8>> = BTreeMap::new();
    let mut cursor = Cursor::new(raw);
    helpers::decode_map(&mut cursor, |cursor| {
        let key = decode_uint(cursor)?;
        let value = decode_raw_item(cursor)?.to_vec();
        if entries.insert(key, value).is_some() {
            return Err(TxBuildError::DeserializationError(format!(
                "duplicate witness set key {}",
                key
            )));
        }
        Ok(())
    })?;

    let mut vkeys: BTreeMap<[u8; 32], [u8; 64]> = BTreeMap::new();
    if let Some(existing) = entries.get(&VKEY_WITNESS_KEY) {
        let mut cursor = Cursor::new(existing.as_slice());
        for witness in helpers::decode_set(&mut cursor, VkeyWitness::deserialize_bytes)? {
            insert_witness(&mut vkeys, witness);
        }
    }
    for witness in witnesses {
        insert_witness(&mut vkeys, *witness);
    }

    if !vkeys.is_empty() {
        let mut encoded = Vec::new();
        encode_array_len(vkeys.len(), &mut encoded)?;
        for (vkey, signature) in &vkeys {
            VkeyWitness {
                vkey: *vkey,
                signature: *signature,
            }
            .serialize_bytes(&mut encoded)?;
        }
        entries.insert(VKEY_WITNESS_KEY, encoded);
    }

    let mut out = Vec::with_capacity(raw.len());
    encode_map_len(entries.len(), &mut out)?;
    for (key, value) in &entries {
        encode_uint(*key, &mut out)?;
        out.extend_from_slice(value);
    }
    Ok(out)
}

fn insert_witness(vkeys: &mut BTreeMap<[u8; 32], [u8; 64]>, witness: VkeyWitness) {
    vkeys
        .entry(witness.vkey)
        .and_modify(|signature| {
            if witness.signature < *signature {
                *signature = witness.signature;
            }
        })
        .or_insert(witness.signature);
}
