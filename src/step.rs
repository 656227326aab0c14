//! Build steps
//!
//! Every user action on a [`crate::builder::TxBuilder`] is recorded as a
//! [`BuildStep`] and folded into the draft exactly once, in order.

use num_bigint::BigInt;
use num_traits::Zero;

use crate::certificate::{Certificate, RewardAddress, StakeCredential};
use crate::draft::TxDraft;
use crate::error::{Result, TxBuildError};
use crate::fee_calculator::FeeCalculator;
use crate::hash::{KeyHash, ScriptHash};
use crate::metadata::Metadatum;
use crate::output::{Address, DatumSource, TxOut, Utxo};
use crate::params::ProtocolParameters;
use crate::script::{PlutusData, Redeemer, RedeemerTarget, Script, ScriptSource, ScriptWitness};
use crate::value::{Asset, AssetName, PolicyId, Value};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildStep {
    /// Spend a UTXO; script-locked outputs need a witness
    SpendInput {
        utxo: Utxo,
        witness: Option<ScriptWitness>,
    },
    AddReferenceInput(Utxo),
    /// Add an output exactly as given
    AddOutput(TxOut),
    /// Add an output whose coin is raised to its minimum deposit
    PayTo {
        address: Address,
        value: Value,
        datum: Option<DatumSource>,
        script_ref: Option<Script>,
    },
    /// Mint (positive) or burn (negative) assets under one policy
    Mint {
        policy: PolicyId,
        assets: Vec<(AssetName, BigInt)>,
        witness: ScriptWitness,
    },
    AddCertificate {
        certificate: Certificate,
        witness: Option<ScriptWitness>,
    },
    Withdraw {
        address: RewardAddress,
        amount: u64,
        witness: Option<ScriptWitness>,
    },
    AttachScript(Script),
    AttachDatum(PlutusData),
    RequireSigner(KeyHash),
    ValidFrom(u64),
    ValidUntil(u64),
    AddMetadata {
        label: u64,
        datum: Metadatum,
    },
    SetNetworkId(u8),
}

impl BuildStep {
    pub fn apply(&self, draft: &mut TxDraft, params: &ProtocolParameters) -> Result<()> {
        match self {
            BuildStep::SpendInput { utxo, witness } => spend_input(draft, utxo, witness.as_ref()),
            BuildStep::AddReferenceInput(utxo) => {
                draft.reference_inputs.insert(utxo.input, utxo.output.clone());
                Ok(())
            }
            BuildStep::AddOutput(output) => {
                attach_output_datum(draft, output);
                draft.outputs.push(output.clone());
                Ok(())
            }
            BuildStep::PayTo {
                address,
                value,
                datum,
                script_ref,
            } => {
                let mut output = TxOut::new(address.clone(), value.clone());
                output.datum = datum.clone();
                output.script_ref = script_ref.clone();
                let deposit = FeeCalculator::new(params).min_deposit(&output)?;
                if output.coin() < BigInt::from(deposit) {
                    output.value.set_coin(deposit);
                }
                attach_output_datum(draft, &output);
                draft.outputs.push(output);
                Ok(())
            }
            BuildStep::Mint {
                policy,
                assets,
                witness,
            } => {
                for (name, amount) in assets {
                    if amount.is_zero() {
                        return Err(TxBuildError::InvalidAsset(format!(
                            "zero mint of {}.{}",
                            policy, name
                        )));
                    }
                    draft.mint.add(Asset::new(*policy, name.clone()), amount.clone());
                }
                draft.mint.trim();
                attach_witness(draft, witness, policy, RedeemerTarget::Mint(*policy))
            }
            BuildStep::AddCertificate {
                certificate,
                witness,
            } => {
                let index = draft.certificates.len();
                draft.certificates.push(certificate.clone());
                match (certificate.needs_script_witness(), witness) {
                    (true, Some(witness)) => attach_witness(
                        draft,
                        witness,
                        certificate.credential().hash(),
                        RedeemerTarget::Cert(index),
                    ),
                    (true, None) => Err(TxBuildError::InvalidTransaction(format!(
                        "certificate #{} is script-controlled and needs a witness",
                        index
                    ))),
                    (false, Some(_)) => Err(TxBuildError::InvalidTransaction(format!(
                        "certificate #{} takes no script witness",
                        index
                    ))),
                    (false, None) => Ok(()),
                }
            }
            BuildStep::Withdraw {
                address,
                amount,
                witness,
            } => {
                if draft.withdrawals.insert(*address, *amount).is_some() {
                    return Err(TxBuildError::InvalidTransaction(format!(
                        "duplicate withdrawal from {}",
                        address
                    )));
                }
                match (&address.credential, witness) {
                    (StakeCredential::Script(hash), Some(witness)) => {
                        attach_witness(draft, witness, hash, RedeemerTarget::Reward(*address))
                    }
                    (StakeCredential::Script(_), None) => Err(TxBuildError::InvalidTransaction(
                        format!("withdrawal from {} needs a script witness", address),
                    )),
                    (StakeCredential::Key(_), Some(_)) => Err(TxBuildError::InvalidTransaction(
                        format!("withdrawal from {} takes no script witness", address),
                    )),
                    (StakeCredential::Key(_), None) => Ok(()),
                }
            }
            BuildStep::AttachScript(script) => {
                draft.witnesses.scripts.insert(script.hash(), script.clone());
                Ok(())
            }
            BuildStep::AttachDatum(datum) => {
                draft.witnesses.datums.insert(datum.hash(), datum.clone());
                Ok(())
            }
            BuildStep::RequireSigner(hash) => {
                draft.required_signers.insert(*hash);
                Ok(())
            }
            BuildStep::ValidFrom(slot) => {
                draft.validity.invalid_before = Some(*slot);
                Ok(())
            }
            BuildStep::ValidUntil(slot) => {
                draft.validity.invalid_hereafter = Some(*slot);
                Ok(())
            }
            BuildStep::AddMetadata { label, datum } => {
                datum.validate()?;
                draft.auxiliary_data.metadata.insert(*label, datum.clone());
                Ok(())
            }
            BuildStep::SetNetworkId(network_id) => {
                draft.network_id = Some(*network_id);
                Ok(())
            }
        }
    }
}

fn spend_input(draft: &mut TxDraft, utxo: &Utxo, witness: Option<&ScriptWitness>) -> Result<()> {
    if draft.inputs.contains_key(&utxo.input) {
        return Err(TxBuildError::InvalidTransaction(format!(
            "input {} is spent twice",
            utxo.input
        )));
    }
    draft.inputs.insert(utxo.input, utxo.output.clone());

    let script_hash = utxo.output.address.payment_script_hash();
    match (script_hash, witness) {
        (Some(hash), Some(witness)) => {
            attach_witness(draft, witness, &hash, RedeemerTarget::Spend(utxo.input))?;
            attach_spent_datum(draft, utxo, witness)
        }
        (Some(_), None) => Err(TxBuildError::InvalidTransaction(format!(
            "input {} is script-locked and needs a witness",
            utxo.input
        ))),
        (None, Some(_)) => Err(TxBuildError::InvalidTransaction(format!(
            "input {} is key-locked and takes no script witness",
            utxo.input
        ))),
        (None, None) => Ok(()),
    }
}

/// A Plutus spend of an output that only carries a datum hash must supply
/// the datum itself
fn attach_spent_datum(draft: &mut TxDraft, utxo: &Utxo, witness: &ScriptWitness) -> Result<()> {
    let ScriptWitness::Plutus { datum, .. } = witness else {
        return Ok(());
    };
    match (&utxo.output.datum, datum) {
        (Some(DatumSource::Hash(expected)), Some(datum)) if datum.hash() != *expected => {
            Err(TxBuildError::InvalidTransaction(format!(
                "datum supplied for {} does not match its hash {}",
                utxo.input, expected
            )))
        }
        (Some(DatumSource::Hash(_)), None) => Err(TxBuildError::InvalidTransaction(format!(
            "input {} carries a datum hash; the datum must be supplied",
            utxo.input
        ))),
        (Some(DatumSource::HashWithData(data)), None) => {
            draft.witnesses.datums.insert(data.hash(), data.clone());
            Ok(())
        }
        _ => Ok(()),
    }
}

fn attach_output_datum(draft: &mut TxDraft, output: &TxOut) {
    if let Some(DatumSource::HashWithData(data)) = &output.datum {
        draft.witnesses.datums.insert(data.hash(), data.clone());
    }
}

/// Record the script, datum and redeemer a witness brings, after checking
/// that the script is the one `expected` names
fn attach_witness(
    draft: &mut TxDraft,
    witness: &ScriptWitness,
    expected: &ScriptHash,
    target: RedeemerTarget,
) -> Result<()> {
    match witness {
        ScriptWitness::Native(script) => {
            if script.plutus_version().is_some() {
                return Err(TxBuildError::InvalidTransaction(format!(
                    "{} has a Plutus script but no redeemer",
                    target
                )));
            }
            check_script_hash(&script.hash(), expected, &target)?;
            draft.witnesses.scripts.insert(*expected, script.clone());
            Ok(())
        }
        ScriptWitness::Plutus {
            script,
            redeemer,
            ex_units,
            datum,
        } => {
            match script {
                ScriptSource::Attached(script) => {
                    if script.plutus_version().is_none() {
                        return Err(TxBuildError::InvalidTransaction(format!(
                            "{} has a native script with a redeemer",
                            target
                        )));
                    }
                    check_script_hash(&script.hash(), expected, &target)?;
                    draft.witnesses.scripts.insert(*expected, script.clone());
                }
                ScriptSource::Reference(input) => {
                    let script = draft
                        .inputs
                        .get(input)
                        .or_else(|| draft.reference_inputs.get(input))
                        .and_then(|output| output.script_ref.as_ref())
                        .ok_or_else(|| TxBuildError::MissingReferenceScript(input.to_string()))?;
                    check_script_hash(&script.hash(), expected, &target)?;
                    draft.witnesses.referenced_scripts.insert(*expected, *input);
                }
            }
            if let Some(datum) = datum {
                draft.witnesses.datums.insert(datum.hash(), datum.clone());
            }
            draft.witnesses.redeemers.insert(
                target,
                Redeemer {
                    data: redeemer.clone(),
                    ex_units: *ex_units,
                },
            );
            Ok(())
        }
    }
}

fn check_script_hash(actual: &ScriptHash, expected: &ScriptHash, target: &RedeemerTarget) -> Result<()> {
    if actual != expected {
        return Err(TxBuildError::InvalidTransaction(format!(
            "script {} does not validate {} (expected {})",
            actual, target, expected
        )));
    }
    Ok(())
}
