//! Transaction body, witness set and the compile pass
//!
//! [`compile`] turns a [`TxDraft`] into wire structures: inputs are taken in
//! sorted order, symbolic redeemer targets are resolved to positional
//! pointers, and the script data hash is computed over the final redeemers,
//! datums and language views.

use std::collections::{BTreeMap, BTreeSet};
use std::io::Cursor;

use crate::certificate::{Certificate, RewardAddress};
use crate::config::CostModelEncoding;
use crate::draft::TxDraft;
use crate::error::{Result, TxBuildError};
use crate::hash::{
    blake2b_256, AuxiliaryDataHash, KeyHash, ScriptDataHash, TxId,
};
use crate::metadata::AuxiliaryData;
use crate::output::{TxIn, TxOut};
use crate::params::ProtocolParameters;
use crate::script::{
    PlutusData, PlutusVersion, RedeemerPointer, RedeemerTag, RedeemerTarget, Script,
    WireRedeemer, ExUnits,
};
use crate::serialization::{
    decode_bool, decode_bytes, decode_fixed_bytes, decode_null, decode_raw_item, decode_uint,
    encode_array_len, encode_bool, encode_bytes, encode_indefinite_array, encode_break,
    encode_int, encode_map_len, encode_null, encode_uint, helpers, peek_major, ByteDeserialize,
    ByteSerialize, MAJOR_ARRAY, MAJOR_MAP,
};
use crate::value::{decode_mint, encode_mint, Value};

/// Transaction body, one field per optional map key
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransactionBody {
    pub inputs: Vec<TxIn>,
    pub outputs: Vec<TxOut>,
    pub fee: u64,
    pub ttl: Option<u64>,
    pub certificates: Vec<Certificate>,
    pub withdrawals: BTreeMap<RewardAddress, u64>,
    pub auxiliary_data_hash: Option<AuxiliaryDataHash>,
    pub validity_start: Option<u64>,
    pub mint: Value,
    pub script_data_hash: Option<ScriptDataHash>,
    pub collateral: Vec<TxIn>,
    pub required_signers: Vec<KeyHash>,
    pub network_id: Option<u8>,
    pub collateral_return: Option<TxOut>,
    pub total_collateral: Option<u64>,
    pub reference_inputs: Vec<TxIn>,
}

impl TransactionBody {
    pub fn id(&self) -> Result<TxId> {
        Ok(blake2b_256(&self.to_bytes()?))
    }

    fn field_count(&self) -> usize {
        3 + self.ttl.is_some() as usize
            + !self.certificates.is_empty() as usize
            + !self.withdrawals.is_empty() as usize
            + self.auxiliary_data_hash.is_some() as usize
            + self.validity_start.is_some() as usize
            + !self.mint.is_zero() as usize
            + self.script_data_hash.is_some() as usize
            + !self.collateral.is_empty() as usize
            + !self.required_signers.is_empty() as usize
            + self.network_id.is_some() as usize
            + self.collateral_return.is_some() as usize
            + self.total_collateral.is_some() as usize
            + !self.reference_inputs.is_empty() as usize
    }
}

impl ByteSerialize for TransactionBody {
    fn serialize_bytes(&self, writer: &mut Vec<u8>) -> Result<()> {
        encode_map_len(self.field_count(), writer)?;

        encode_uint(0, writer)?;
        helpers::serialize_vec(&self.inputs, writer)?;
        encode_uint(1, writer)?;
        helpers::serialize_vec(&self.outputs, writer)?;
        encode_uint(2, writer)?;
        encode_uint(self.fee, writer)?;
        if let Some(ttl) = self.ttl {
            encode_uint(3, writer)?;
            encode_uint(ttl, writer)?;
        }
        if !self.certificates.is_empty() {
            encode_uint(4, writer)?;
            helpers::serialize_vec(&self.certificates, writer)?;
        }
        if !self.withdrawals.is_empty() {
            encode_uint(5, writer)?;
            encode_map_len(self.withdrawals.len(), writer)?;
            for (address, amount) in &self.withdrawals {
                address.serialize_bytes(writer)?;
                encode_uint(*amount, writer)?;
            }
        }
        if let Some(hash) = &self.auxiliary_data_hash {
            encode_uint(7, writer)?;
            hash.serialize_bytes(writer)?;
        }
        if let Some(start) = self.validity_start {
            encode_uint(8, writer)?;
            encode_uint(start, writer)?;
        }
        if !self.mint.is_zero() {
            encode_uint(9, writer)?;
            encode_mint(&self.mint, writer)?;
        }
        if let Some(hash) = &self.script_data_hash {
            encode_uint(11, writer)?;
            hash.serialize_bytes(writer)?;
        }
        if !self.collateral.is_empty() {
            encode_uint(13, writer)?;
            helpers::serialize_vec(&self.collateral, writer)?;
        }
        if !self.required_signers.is_empty() {
            encode_uint(14, writer)?;
            helpers::serialize_vec(&self.required_signers, writer)?;
        }
        if let Some(network_id) = self.network_id {
            encode_uint(15, writer)?;
            encode_uint(network_id as u64, writer)?;
        }
        if let Some(output) = &self.collateral_return {
            encode_uint(16, writer)?;
            output.serialize_bytes(writer)?;
        }
        if let Some(total) = self.total_collateral {
            encode_uint(17, writer)?;
            encode_uint(total, writer)?;
        }
        if !self.reference_inputs.is_empty() {
            encode_uint(18, writer)?;
            helpers::serialize_vec(&self.reference_inputs, writer)?;
        }
        Ok(())
    }
}

impl ByteDeserialize for TransactionBody {
    fn deserialize_bytes(cursor: &mut Cursor<&[u8]>) -> Result<Self> {
        let mut body = TransactionBody::default();
        let mut seen = BTreeSet::new();
        helpers::decode_map(cursor, |cursor| {
            let key = decode_uint(cursor)?;
            if !seen.insert(key) {
                return Err(TxBuildError::DeserializationError(format!(
                    "duplicate body field {}",
                    key
                )));
            }
            match key {
                0 => body.inputs = helpers::decode_set(cursor, TxIn::deserialize_bytes)?,
                1 => body.outputs = helpers::decode_array(cursor, TxOut::deserialize_bytes)?,
                2 => body.fee = decode_uint(cursor)?,
                3 => body.ttl = Some(decode_uint(cursor)?),
                4 => {
                    body.certificates =
                        helpers::decode_set(cursor, Certificate::deserialize_bytes)?
                }
                5 => helpers::decode_map(cursor, |cursor| {
                    let address = RewardAddress::deserialize_bytes(cursor)?;
                    body.withdrawals.insert(address, decode_uint(cursor)?);
                    Ok(())
                })?,
                7 => body.auxiliary_data_hash = Some(AuxiliaryDataHash::deserialize_bytes(cursor)?),
                8 => body.validity_start = Some(decode_uint(cursor)?),
                9 => body.mint = decode_mint(cursor)?,
                11 => body.script_data_hash = Some(ScriptDataHash::deserialize_bytes(cursor)?),
                13 => body.collateral = helpers::decode_set(cursor, TxIn::deserialize_bytes)?,
                14 => {
                    body.required_signers =
                        helpers::decode_set(cursor, KeyHash::deserialize_bytes)?
                }
                15 => {
                    let network_id = decode_uint(cursor)?;
                    body.network_id = Some(u8::try_from(network_id).map_err(|_| {
                        TxBuildError::DeserializationError(format!(
                            "network id {} out of range",
                            network_id
                        ))
                    })?)
                }
                16 => body.collateral_return = Some(TxOut::deserialize_bytes(cursor)?),
                17 => body.total_collateral = Some(decode_uint(cursor)?),
                18 => {
                    body.reference_inputs = helpers::decode_set(cursor, TxIn::deserialize_bytes)?
                }
                other => {
                    return Err(TxBuildError::DeserializationError(format!(
                        "unsupported body field {}",
                        other
                    )))
                }
            }
            Ok(())
        })?;
        for required in [0u64, 1, 2] {
            if !seen.contains(&required) {
                return Err(TxBuildError::DeserializationError(format!(
                    "body is missing field {}",
                    required
                )));
            }
        }
        Ok(body)
    }
}

/// Verification key and its ed25519 signature over the transaction id
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VkeyWitness {
    pub vkey: [u8; 32],
    pub signature: [u8; 64],
}

impl ByteSerialize for VkeyWitness {
    fn serialize_bytes(&self, writer: &mut Vec<u8>) -> Result<()> {
        encode_array_len(2, writer)?;
        encode_bytes(&self.vkey, writer)?;
        encode_bytes(&self.signature, writer)
    }
}

impl ByteDeserialize for VkeyWitness {
    fn deserialize_bytes(cursor: &mut Cursor<&[u8]>) -> Result<Self> {
        helpers::expect_array_len(cursor, 2)?;
        Ok(VkeyWitness {
            vkey: decode_fixed_bytes::<32>(cursor)?,
            signature: decode_fixed_bytes::<64>(cursor)?,
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WitnessSet {
    pub vkeys: Vec<VkeyWitness>,
    /// Native and Plutus scripts; split by language on the wire
    pub scripts: Vec<Script>,
    pub plutus_data: Vec<PlutusData>,
    pub redeemers: Vec<WireRedeemer>,
}

impl WitnessSet {
    fn scripts_of(&self, version: Option<PlutusVersion>) -> Vec<&Script> {
        self.scripts
            .iter()
            .filter(|script| script.plutus_version() == version)
            .collect()
    }
}

fn encode_scripts(key: u64, scripts: &[&Script], writer: &mut Vec<u8>) -> Result<()> {
    encode_uint(key, writer)?;
    encode_array_len(scripts.len(), writer)?;
    for script in scripts {
        match script {
            Script::Native(cbor) => crate::serialization::encode_raw(cbor, writer)?,
            Script::Plutus { bytes, .. } => encode_bytes(bytes, writer)?,
        }
    }
    Ok(())
}

impl ByteSerialize for WitnessSet {
    fn serialize_bytes(&self, writer: &mut Vec<u8>) -> Result<()> {
        let native = self.scripts_of(None);
        let v1 = self.scripts_of(Some(PlutusVersion::V1));
        let v2 = self.scripts_of(Some(PlutusVersion::V2));
        let v3 = self.scripts_of(Some(PlutusVersion::V3));
        let len = !self.vkeys.is_empty() as usize
            + !native.is_empty() as usize
            + !v1.is_empty() as usize
            + !self.plutus_data.is_empty() as usize
            + !self.redeemers.is_empty() as usize
            + !v2.is_empty() as usize
            + !v3.is_empty() as usize;
        encode_map_len(len, writer)?;

        if !self.vkeys.is_empty() {
            encode_uint(0, writer)?;
            helpers::serialize_vec(&self.vkeys, writer)?;
        }
        if !native.is_empty() {
            encode_scripts(1, &native, writer)?;
        }
        if !v1.is_empty() {
            encode_scripts(3, &v1, writer)?;
        }
        if !self.plutus_data.is_empty() {
            encode_uint(4, writer)?;
            helpers::serialize_vec(&self.plutus_data, writer)?;
        }
        if !self.redeemers.is_empty() {
            encode_uint(5, writer)?;
            helpers::serialize_vec(&self.redeemers, writer)?;
        }
        if !v2.is_empty() {
            encode_scripts(6, &v2, writer)?;
        }
        if !v3.is_empty() {
            encode_scripts(7, &v3, writer)?;
        }
        Ok(())
    }
}

/// Redeemers arrive either as the legacy array or as the Conway map
/// `{[tag, index] => [data, ex_units]}`
fn decode_redeemers(cursor: &mut Cursor<&[u8]>) -> Result<Vec<WireRedeemer>> {
    match peek_major(cursor)? {
        MAJOR_ARRAY => helpers::decode_array(cursor, WireRedeemer::deserialize_bytes),
        MAJOR_MAP => {
            let mut redeemers = Vec::new();
            helpers::decode_map(cursor, |cursor| {
                helpers::expect_array_len(cursor, 2)?;
                let tag = RedeemerTag::from_code(decode_uint(cursor)?)?;
                let index = crate::serialization::decode_u32(cursor)?;
                helpers::expect_array_len(cursor, 2)?;
                let data = PlutusData::deserialize_bytes(cursor)?;
                let ex_units = ExUnits::deserialize_bytes(cursor)?;
                redeemers.push(WireRedeemer {
                    pointer: RedeemerPointer { tag, index },
                    data,
                    ex_units,
                });
                Ok(())
            })?;
            Ok(redeemers)
        }
        other => Err(TxBuildError::DeserializationError(format!(
            "redeemers must be an array or map, found major type {}",
            other
        ))),
    }
}

impl ByteDeserialize for WitnessSet {
    fn deserialize_bytes(cursor: &mut Cursor<&[u8]>) -> Result<Self> {
        let mut set = WitnessSet::default();
        helpers::decode_map(cursor, |cursor| {
            match decode_uint(cursor)? {
                0 => set.vkeys = helpers::decode_set(cursor, VkeyWitness::deserialize_bytes)?,
                1 => set.scripts.extend(helpers::decode_set(cursor, |cursor| {
                    Ok(Script::Native(decode_raw_item(cursor)?.to_vec()))
                })?),
                4 => set.plutus_data = helpers::decode_set(cursor, PlutusData::deserialize_bytes)?,
                5 => set.redeemers = decode_redeemers(cursor)?,
                key @ (3 | 6 | 7) => {
                    let version = match key {
                        3 => PlutusVersion::V1,
                        6 => PlutusVersion::V2,
                        _ => PlutusVersion::V3,
                    };
                    set.scripts.extend(helpers::decode_set(cursor, |cursor| {
                        Ok(Script::plutus(version, decode_bytes(cursor)?))
                    })?);
                }
                other => {
                    return Err(TxBuildError::DeserializationError(format!(
                        "unsupported witness field {}",
                        other
                    )))
                }
            }
            Ok(())
        })?;
        Ok(set)
    }
}

/// `[body, witness_set, is_valid, auxiliary_data / null]`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transaction {
    pub body: TransactionBody,
    pub witness_set: WitnessSet,
    pub is_valid: bool,
    pub auxiliary_data: Option<AuxiliaryData>,
}

impl Transaction {
    pub fn id(&self) -> Result<TxId> {
        self.body.id()
    }

    /// Size with `count` placeholder vkey witnesses added, for fee estimation
    pub fn size_with_dummy_witnesses(&self, count: usize) -> Result<usize> {
        let mut probe = self.clone();
        probe.witness_set.vkeys = (0..count)
            .map(|i| {
                let mut vkey = [0u8; 32];
                vkey[..8].copy_from_slice(&(i as u64).to_be_bytes());
                VkeyWitness {
                    vkey,
                    signature: [0u8; 64],
                }
            })
            .collect();
        probe.byte_size()
    }
}

impl ByteSerialize for Transaction {
    fn serialize_bytes(&self, writer: &mut Vec<u8>) -> Result<()> {
        encode_array_len(4, writer)?;
        self.body.serialize_bytes(writer)?;
        self.witness_set.serialize_bytes(writer)?;
        encode_bool(self.is_valid, writer)?;
        match &self.auxiliary_data {
            Some(aux) => aux.serialize_bytes(writer),
            None => encode_null(writer),
        }
    }
}

impl ByteDeserialize for Transaction {
    fn deserialize_bytes(cursor: &mut Cursor<&[u8]>) -> Result<Self> {
        helpers::expect_array_len(cursor, 4)?;
        let body = TransactionBody::deserialize_bytes(cursor)?;
        let witness_set = WitnessSet::deserialize_bytes(cursor)?;
        let is_valid = decode_bool(cursor)?;
        let auxiliary_data = if decode_null(cursor)? {
            None
        } else {
            Some(AuxiliaryData::deserialize_bytes(cursor)?)
        };
        Ok(Transaction {
            body,
            witness_set,
            is_valid,
            auxiliary_data,
        })
    }
}

/// A compiled draft and the pointers its redeemers resolved to
#[derive(Debug, Clone)]
pub struct CompiledTransaction {
    pub transaction: Transaction,
    pub pointers: BTreeMap<RedeemerTarget, RedeemerPointer>,
    /// Placeholder witnesses needed for fee estimation
    pub vkey_count: usize,
}

impl CompiledTransaction {
    /// Size the signed transaction is expected to have
    pub fn estimated_size(&self) -> Result<usize> {
        self.transaction.size_with_dummy_witnesses(self.vkey_count)
    }

    pub fn id(&self) -> Result<TxId> {
        self.transaction.id()
    }
}

/// Resolve a symbolic redeemer target to its position in the final order
pub fn resolve_pointer(draft: &TxDraft, target: &RedeemerTarget) -> Result<RedeemerPointer> {
    let missing = || TxBuildError::MissingRedeemerTarget(target.to_string());
    let index = match target {
        RedeemerTarget::Spend(input) => draft
            .inputs
            .keys()
            .position(|candidate| candidate == input)
            .ok_or_else(missing)?,
        RedeemerTarget::Mint(policy) => draft
            .mint
            .by_policy()
            .keys()
            .position(|candidate| candidate == policy)
            .ok_or_else(missing)?,
        RedeemerTarget::Reward(address) => draft
            .withdrawals
            .keys()
            .position(|candidate| candidate == address)
            .ok_or_else(missing)?,
        RedeemerTarget::Cert(index) if *index < draft.certificates.len() => *index,
        RedeemerTarget::Cert(_) => return Err(missing()),
    };
    Ok(RedeemerPointer {
        tag: target.tag(),
        index: u32::try_from(index).map_err(|_| missing())?,
    })
}

fn encode_cost_model_array(costs: &[i64], writer: &mut Vec<u8>) -> Result<()> {
    encode_array_len(costs.len(), writer)?;
    for cost in costs {
        encode_int(*cost, writer)?;
    }
    Ok(())
}

/// Encode the cost models of `versions` as the language-views map
pub fn encode_language_views(
    versions: &BTreeSet<PlutusVersion>,
    params: &ProtocolParameters,
    encoding: CostModelEncoding,
    writer: &mut Vec<u8>,
) -> Result<()> {
    let mut entries: Vec<(Vec<u8>, Vec<u8>)> = Vec::with_capacity(versions.len());
    for version in versions {
        let costs = params.cost_model(*version)?;
        let mut key = Vec::new();
        let mut value = Vec::new();
        match (encoding, version) {
            (CostModelEncoding::ReferenceCodec, PlutusVersion::V1) => {
                encode_bytes(&[version.language_id()], &mut key)?;
                let mut inner = Vec::new();
                encode_indefinite_array(&mut inner)?;
                for cost in costs {
                    encode_int(*cost, &mut inner)?;
                }
                encode_break(&mut inner)?;
                encode_bytes(&inner, &mut value)?;
            }
            _ => {
                encode_uint(version.language_id() as u64, &mut key)?;
                encode_cost_model_array(costs, &mut value)?;
            }
        }
        entries.push((key, value));
    }
    match encoding {
        CostModelEncoding::ReferenceCodec => {
            entries.sort_by(|(a, _), (b, _)| a.len().cmp(&b.len()).then_with(|| a.cmp(b)))
        }
        CostModelEncoding::CombinedCanonical => entries.sort_by(|(a, _), (b, _)| a.cmp(b)),
    }
    encode_map_len(entries.len(), writer)?;
    for (key, value) in entries {
        writer.extend_from_slice(&key);
        writer.extend_from_slice(&value);
    }
    Ok(())
}

/// blake2b-256 over `redeemers || datums || language_views`.
///
/// `None` when the transaction carries neither redeemers nor datums.
pub fn script_data_hash(
    redeemers: &[WireRedeemer],
    datums: &[PlutusData],
    versions: &BTreeSet<PlutusVersion>,
    params: &ProtocolParameters,
    encoding: CostModelEncoding,
) -> Result<Option<ScriptDataHash>> {
    if redeemers.is_empty() && datums.is_empty() {
        return Ok(None);
    }
    let mut preimage = Vec::new();
    if redeemers.is_empty() {
        // empty redeemer map, datums, empty language views
        encode_map_len(0, &mut preimage)?;
        helpers::serialize_vec(datums, &mut preimage)?;
        encode_map_len(0, &mut preimage)?;
    } else {
        helpers::serialize_vec(redeemers, &mut preimage)?;
        if !datums.is_empty() {
            helpers::serialize_vec(datums, &mut preimage)?;
        }
        encode_language_views(versions, params, encoding, &mut preimage)?;
    }
    Ok(Some(blake2b_256(&preimage)))
}

/// Compile a draft into a transaction ready to serialize.
pub fn compile(
    draft: &TxDraft,
    params: &ProtocolParameters,
    encoding: CostModelEncoding,
) -> Result<CompiledTransaction> {
    let mut pointers = BTreeMap::new();
    let mut redeemers = Vec::with_capacity(draft.witnesses.redeemers.len());
    for (target, redeemer) in &draft.witnesses.redeemers {
        let pointer = resolve_pointer(draft, target)?;
        pointers.insert(target.clone(), pointer);
        redeemers.push(WireRedeemer {
            pointer,
            data: redeemer.data.clone(),
            ex_units: redeemer.ex_units,
        });
    }
    redeemers.sort_by_key(|r| r.pointer);

    let datums: Vec<PlutusData> = draft.witnesses.datums.values().cloned().collect();
    let script_data_hash = script_data_hash(
        &redeemers,
        &datums,
        &draft.plutus_versions(),
        params,
        encoding,
    )?;

    let auxiliary_data = if draft.auxiliary_data.is_empty() {
        None
    } else {
        Some(draft.auxiliary_data.clone())
    };
    let auxiliary_data_hash = auxiliary_data.as_ref().map(AuxiliaryData::hash).transpose()?;

    let body = TransactionBody {
        inputs: draft.inputs.keys().copied().collect(),
        outputs: draft.all_outputs().cloned().collect(),
        fee: draft.fee,
        ttl: draft.validity.invalid_hereafter,
        certificates: draft.certificates.clone(),
        withdrawals: draft.withdrawals.clone(),
        auxiliary_data_hash,
        validity_start: draft.validity.invalid_before,
        mint: draft.mint.clone().trimmed(),
        script_data_hash,
        collateral: draft.collateral.inputs.keys().copied().collect(),
        required_signers: draft.required_signers.iter().copied().collect(),
        network_id: draft.network_id,
        collateral_return: draft.collateral.return_output.clone(),
        total_collateral: draft.collateral.total,
        reference_inputs: draft.reference_inputs.keys().copied().collect(),
    };

    let witness_set = WitnessSet {
        vkeys: Vec::new(),
        scripts: draft.witnesses.scripts.values().cloned().collect(),
        plutus_data: datums,
        redeemers,
    };

    Ok(CompiledTransaction {
        transaction: Transaction {
            body,
            witness_set,
            is_valid: true,
            auxiliary_data,
        },
        pointers,
        vkey_count: draft.required_vkey_hashes().len(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::certificate::StakeCredential;
    use crate::hash::Hash;
    use crate::metadata::Metadatum;
    use crate::output::Address;
    use crate::script::Redeemer;
    use crate::value::{Asset, AssetName};

    fn input(id: u8, index: u32) -> TxIn {
        TxIn::new(Hash([id; 32]), index)
    }

    fn coin_output(seed: u8, coin: u64) -> TxOut {
        TxOut::new(Address::enterprise(0, &Hash([seed; 28])), Value::from_coin(coin))
    }

    fn simple_draft() -> TxDraft {
        let mut draft = TxDraft::new();
        draft.inputs.insert(input(2, 0), coin_output(1, 5_000_000));
        draft.inputs.insert(input(1, 3), coin_output(1, 1_000_000));
        draft.outputs.push(coin_output(9, 2_000_000));
        draft.fee = 170_000;
        draft
    }

    #[test]
    fn test_inputs_are_sorted_in_body() {
        let compiled = compile(&simple_draft(), &ProtocolParameters::default(), Default::default())
            .unwrap();
        assert_eq!(compiled.transaction.body.inputs, vec![input(1, 3), input(2, 0)]);
        assert_eq!(compiled.vkey_count, 1);
    }

    #[test]
    fn test_transaction_decodes_back() {
        let mut draft = simple_draft();
        draft.validity.invalid_hereafter = Some(1_000);
        draft.validity.invalid_before = Some(10);
        draft.network_id = Some(1);
        draft.required_signers.insert(Hash([4u8; 28]));
        draft.certificates.push(Certificate::StakeRegistration(StakeCredential::Key(Hash(
            [5u8; 28],
        ))));
        draft
            .auxiliary_data
            .metadata
            .insert(674, Metadatum::Text("hello".to_string()));
        let policy = Hash([6u8; 28]);
        draft.mint.add(Asset::new(policy, AssetName::new(b"t".to_vec()).unwrap()), -3);

        let compiled = compile(&draft, &ProtocolParameters::default(), Default::default()).unwrap();
        let bytes = compiled.transaction.to_bytes().unwrap();
        let decoded = Transaction::from_bytes(&bytes).unwrap();
        assert_eq!(decoded, compiled.transaction);
        assert_eq!(decoded.to_bytes().unwrap(), bytes);
        assert!(decoded.body.auxiliary_data_hash.is_some());
    }

    #[test]
    fn test_id_is_hash_of_body() {
        let compiled = compile(&simple_draft(), &ProtocolParameters::default(), Default::default())
            .unwrap();
        let body_bytes = compiled.transaction.body.to_bytes().unwrap();
        assert_eq!(compiled.id().unwrap(), blake2b_256(&body_bytes));
    }

    #[test]
    fn test_dummy_witnesses_add_fixed_size() {
        let compiled = compile(&simple_draft(), &ProtocolParameters::default(), Default::default())
            .unwrap();
        let bare = compiled.transaction.byte_size().unwrap();
        let one = compiled.transaction.size_with_dummy_witnesses(1).unwrap();
        let two = compiled.transaction.size_with_dummy_witnesses(2).unwrap();
        // one witness also adds the map key and the array head
        assert_eq!(one - bare, crate::fee_calculator::VKEY_WITNESS_SIZE + 2);
        assert_eq!(two - one, crate::fee_calculator::VKEY_WITNESS_SIZE);
    }

    #[test]
    fn test_redeemer_pointers_follow_sorted_order() {
        let mut draft = simple_draft();
        let data = PlutusData::from_cbor(vec![0x00]).unwrap();
        let redeemer = Redeemer {
            data: data.clone(),
            ex_units: ExUnits::new(100, 200),
        };
        // input(2, 0) sorts after input(1, 3)
        draft
            .witnesses
            .redeemers
            .insert(RedeemerTarget::Spend(input(2, 0)), redeemer.clone());
        let policy_a = Hash([1u8; 28]);
        let policy_b = Hash([2u8; 28]);
        draft.mint.add(Asset::new(policy_b, AssetName::empty()), 1);
        draft.mint.add(Asset::new(policy_a, AssetName::empty()), 1);
        draft
            .witnesses
            .redeemers
            .insert(RedeemerTarget::Mint(policy_b), redeemer.clone());

        let params = ProtocolParameters::default().with_cost_model(PlutusVersion::V2, vec![1, 2]);
        let compiled = compile(&draft, &params, Default::default()).unwrap();
        assert_eq!(
            compiled.pointers[&RedeemerTarget::Spend(input(2, 0))],
            RedeemerPointer { tag: RedeemerTag::Spend, index: 1 }
        );
        assert_eq!(
            compiled.pointers[&RedeemerTarget::Mint(policy_b)],
            RedeemerPointer { tag: RedeemerTag::Mint, index: 1 }
        );
        assert!(compiled.transaction.body.script_data_hash.is_some());

        draft
            .witnesses
            .redeemers
            .insert(RedeemerTarget::Spend(input(7, 7)), redeemer);
        assert!(matches!(
            compile(&draft, &params, Default::default()),
            Err(TxBuildError::MissingRedeemerTarget(_))
        ));
    }

    #[test]
    fn test_language_view_encodings_differ_for_v1() {
        let params = ProtocolParameters::default()
            .with_cost_model(PlutusVersion::V1, vec![1, 2])
            .with_cost_model(PlutusVersion::V2, vec![3]);
        let versions: BTreeSet<_> = [PlutusVersion::V1, PlutusVersion::V2].into_iter().collect();

        let mut reference = Vec::new();
        encode_language_views(&versions, &params, CostModelEncoding::ReferenceCodec, &mut reference)
            .unwrap();
        // {1: [3], h'00': h'9f0102ff'}
        assert_eq!(hex::encode(&reference), "a20181034100449f0102ff");

        let mut combined = Vec::new();
        encode_language_views(&versions, &params, CostModelEncoding::CombinedCanonical, &mut combined)
            .unwrap();
        // {0: [1, 2], 1: [3]}
        assert_eq!(hex::encode(&combined), "a200820102018103");
    }

    #[test]
    fn test_datums_without_redeemers_hash_layout() {
        let datum = PlutusData::from_cbor(vec![0x01]).unwrap();
        let hash = script_data_hash(
            &[],
            &[datum],
            &BTreeSet::new(),
            &ProtocolParameters::default(),
            CostModelEncoding::ReferenceCodec,
        )
        .unwrap();
        assert_eq!(hash, Some(blake2b_256(&[0xa0, 0x81, 0x01, 0xa0])));
        assert_eq!(
            script_data_hash(
                &[],
                &[],
                &BTreeSet::new(),
                &ProtocolParameters::default(),
                CostModelEncoding::ReferenceCodec
            )
            .unwrap(),
            None
        );
    }
}
