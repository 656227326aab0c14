//! Mutable transaction draft
//!
//! The orchestrator owns one [`TxDraft`] per build and folds build steps into
//! it. Everything is kept in ordered collections so that compiling the draft
//! is deterministic.

use std::collections::{BTreeMap, BTreeSet};

use num_bigint::BigInt;

use crate::certificate::{Certificate, RewardAddress, StakeCredential};
use crate::error::Result;
use crate::hash::{blake2b_224, DatumHash, KeyHash, ScriptHash};
use crate::metadata::AuxiliaryData;
use crate::output::{TxIn, TxOut};
use crate::params::ProtocolParameters;
use crate::script::{ExUnits, PlutusData, PlutusVersion, Redeemer, RedeemerTarget, Script};
use crate::value::{Asset, Value};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Collateral {
    pub inputs: BTreeMap<TxIn, TxOut>,
    pub return_output: Option<TxOut>,
    pub total: Option<u64>,
}

impl Collateral {
    pub fn is_empty(&self) -> bool {
        self.inputs.is_empty()
    }

    pub fn clear(&mut self) {
        *self = Collateral::default();
    }
}

/// Slot bounds; both ends optional
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ValidityInterval {
    pub invalid_before: Option<u64>,
    pub invalid_hereafter: Option<u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Witnesses {
    /// Scripts carried in the witness set
    pub scripts: BTreeMap<ScriptHash, Script>,
    /// Scripts supplied by the reference script of an input or reference input
    pub referenced_scripts: BTreeMap<ScriptHash, TxIn>,
    pub datums: BTreeMap<DatumHash, PlutusData>,
    pub redeemers: BTreeMap<RedeemerTarget, Redeemer>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TxDraft {
    pub inputs: BTreeMap<TxIn, TxOut>,
    pub reference_inputs: BTreeMap<TxIn, TxOut>,
    pub outputs: Vec<TxOut>,
    pub change_outputs: Vec<TxOut>,
    pub fee: u64,
    pub mint: Value,
    pub withdrawals: BTreeMap<RewardAddress, u64>,
    pub certificates: Vec<Certificate>,
    pub collateral: Collateral,
    pub required_signers: BTreeSet<KeyHash>,
    pub validity: ValidityInterval,
    pub witnesses: Witnesses,
    pub auxiliary_data: AuxiliaryData,
    pub network_id: Option<u8>,
}

impl TxDraft {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn input_total(&self) -> Value {
        let mut total = Value::new();
        for output in self.inputs.values() {
            total.add_all(&output.value);
        }
        total
    }

    /// Explicit outputs only
    pub fn output_total(&self) -> Value {
        let mut total = Value::new();
        for output in &self.outputs {
            total.add_all(&output.value);
        }
        total
    }

    pub fn change_total(&self) -> Value {
        let mut total = Value::new();
        for output in &self.change_outputs {
            total.add_all(&output.value);
        }
        total
    }

    pub fn withdrawal_total(&self) -> BigInt {
        self.withdrawals.values().map(|amount| BigInt::from(*amount)).sum()
    }

    pub fn deposits(&self, params: &ProtocolParameters) -> BigInt {
        self.certificates
            .iter()
            .map(|cert| BigInt::from(cert.deposit(params)))
            .sum()
    }

    pub fn refunds(&self, params: &ProtocolParameters) -> BigInt {
        self.certificates
            .iter()
            .map(|cert| BigInt::from(cert.refund(params)))
            .sum()
    }

    /// `inputs + mint + withdrawals + refunds`
    pub fn consumed(&self, params: &ProtocolParameters) -> Value {
        let mut total = self.input_total();
        total.add_all(&self.mint);
        total.add(Asset::lovelace(), self.withdrawal_total());
        total.add(Asset::lovelace(), self.refunds(params));
        total
    }

    /// `outputs + change + fee + deposits`
    pub fn produced(&self, params: &ProtocolParameters) -> Value {
        let mut total = self.output_total();
        total.add_all(&self.change_total());
        total.add(Asset::lovelace(), self.fee);
        total.add(Asset::lovelace(), self.deposits(params));
        total
    }

    /// What is left for change before fee: `consumed - outputs - deposits`
    pub fn raw_change(&self, params: &ProtocolParameters) -> Value {
        let mut change = self.consumed(params);
        change.subtract_all(&self.output_total());
        change.subtract(Asset::lovelace(), self.deposits(params));
        change.trimmed()
    }

    /// `consumed - produced`; zero for a balanced draft
    pub fn balance_delta(&self, params: &ProtocolParameters) -> Value {
        let mut delta = self.consumed(params);
        delta.subtract_all(&self.produced(params));
        delta.trimmed()
    }

    pub fn is_balanced(&self, params: &ProtocolParameters) -> bool {
        self.balance_delta(params).is_zero()
    }

    pub fn all_outputs(&self) -> impl Iterator<Item = &TxOut> {
        self.outputs.iter().chain(self.change_outputs.iter())
    }

    pub fn has_redeemers(&self) -> bool {
        !self.witnesses.redeemers.is_empty()
    }

    pub fn total_ex_units(&self) -> ExUnits {
        self.witnesses
            .redeemers
            .values()
            .fold(ExUnits::default(), |acc, r| acc.saturating_add(r.ex_units))
    }

    /// Bytes of reference scripts on spent and referenced outputs
    pub fn reference_script_bytes(&self) -> usize {
        self.inputs
            .values()
            .chain(self.reference_inputs.values())
            .filter_map(|output| output.script_ref.as_ref())
            .map(Script::size)
            .sum()
    }

    /// Resolve a script by hash from the witness set or a referenced output
    pub fn find_script(&self, hash: &ScriptHash) -> Option<&Script> {
        if let Some(script) = self.witnesses.scripts.get(hash) {
            return Some(script);
        }
        let input = self.witnesses.referenced_scripts.get(hash)?;
        self.inputs
            .get(input)
            .or_else(|| self.reference_inputs.get(input))
            .and_then(|output| output.script_ref.as_ref())
    }

    /// Plutus languages whose scripts run in this transaction
    pub fn plutus_versions(&self) -> BTreeSet<PlutusVersion> {
        self.witnesses
            .scripts
            .keys()
            .chain(self.witnesses.referenced_scripts.keys())
            .filter_map(|hash| self.find_script(hash))
            .filter_map(Script::plutus_version)
            .collect()
    }

    /// Key hashes that must sign, used to size dummy witnesses for the fee.
    ///
    /// Byron inputs have no 28-byte payment hash; each is counted as one key
    /// under a hash of its address.
    pub fn required_vkey_hashes(&self) -> BTreeSet<KeyHash> {
        let mut hashes = BTreeSet::new();
        for output in self.inputs.values().chain(self.collateral.inputs.values()) {
            if let Some(hash) = output.address.payment_key_hash() {
                hashes.insert(hash);
            } else if output.address.is_byron() {
                hashes.insert(blake2b_224(output.address.as_bytes()));
            }
        }
        hashes.extend(self.required_signers.iter().copied());
        hashes.extend(self.certificates.iter().filter_map(Certificate::required_signer));
        hashes.extend(self.withdrawals.keys().filter_map(|address| {
            match address.credential {
                StakeCredential::Key(hash) => Some(hash),
                StakeCredential::Script(_) => None,
            }
        }));
        hashes
    }

    pub fn snapshot(&self, stage: &'static str) -> DraftSnapshot {
        DraftSnapshot {
            stage,
            draft: self.clone(),
        }
    }

    /// Check that every output is non-negative
    pub fn validate_outputs(&self) -> Result<()> {
        for output in self.all_outputs() {
            output.value.ensure_non_negative()?;
        }
        Ok(())
    }
}

/// Copy of a draft captured when a build fails
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DraftSnapshot {
    /// Finalization stage that was running
    pub stage: &'static str,
    pub draft: TxDraft,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::Hash;
    use crate::output::Address;

    fn utxo(id: u8, coin: u64) -> (TxIn, TxOut) {
        (
            TxIn::new(Hash([id; 32]), 0),
            TxOut::new(Address::enterprise(0, &Hash([id; 28])), Value::from_coin(coin)),
        )
    }

    #[test]
    fn test_balance_with_certificates() {
        let params = ProtocolParameters::default();
        let credential = StakeCredential::Key(Hash([9u8; 28]));
        let mut draft = TxDraft::new();
        let (input, output) = utxo(1, 10_000_000);
        draft.inputs.insert(input, output);
        draft.certificates.push(Certificate::StakeRegistration(credential));
        draft.outputs.push(
            TxOut::new(Address::enterprise(0, &Hash([2u8; 28])), Value::from_coin(3_000_000u64)),
        );
        draft.fee = 200_000;

        assert_eq!(draft.raw_change(&params).coin(), BigInt::from(5_000_000));
        draft.change_outputs.push(TxOut::new(
            Address::enterprise(0, &Hash([1u8; 28])),
            Value::from_coin(4_800_000u64),
        ));
        assert!(draft.is_balanced(&params));
    }

    #[test]
    fn test_required_vkey_hashes() {
        let mut draft = TxDraft::new();
        let (input, output) = utxo(1, 1);
        draft.inputs.insert(input, output);
        draft.required_signers.insert(Hash([1u8; 28]));
        draft.required_signers.insert(Hash([7u8; 28]));
        draft.withdrawals.insert(
            RewardAddress::new(0, StakeCredential::Script(Hash([8u8; 28]))),
            5,
        );
        let hashes = draft.required_vkey_hashes();
        assert_eq!(hashes.len(), 2);
        assert!(hashes.contains(&Hash([7u8; 28])));
    }

    #[test]
    fn test_reference_script_lookup() {
        let script = Script::plutus(PlutusVersion::V2, vec![1u8; 10]);
        let hash = script.hash();
        let (input, output) = utxo(3, 5_000_000);
        let mut draft = TxDraft::new();
        draft
            .reference_inputs
            .insert(input, output.with_script_ref(script.clone()));
        draft.witnesses.referenced_scripts.insert(hash, input);

        assert_eq!(draft.find_script(&hash), Some(&script));
        assert_eq!(draft.reference_script_bytes(), 10);
        assert!(draft.plutus_versions().contains(&PlutusVersion::V2));
    }
}
