//! Coin-selection strategies
//!
//! A strategy takes a materialized draft with its explicit outputs in place
//! and leaves it balanced: inputs chosen, change laid out, fee settled.

use num_traits::Signed;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::change::ChangeBuilder;
use crate::config::BuildContext;
use crate::draft::TxDraft;
use crate::error::{InsufficientBalanceCause, Result, TxBuildError};
use crate::output::Utxo;
use crate::selection::UtxoSelector;
use crate::value::{Asset, Value};

const MAX_SWEEP_ROUNDS: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum CoinSelectionStrategy {
    /// Spend every available UTXO; leftovers go to a single change output
    /// unless the token or size limits force a split
    SpendAllIntoChange,
    /// Select only what the outputs need and split leftover coin from tokens
    #[default]
    MinimalWithSplit,
    /// Spend every available UTXO into the last explicit output
    SendAll,
}

impl CoinSelectionStrategy {
    pub fn apply(&self, draft: &mut TxDraft, context: &BuildContext, pool: &[Utxo]) -> Result<()> {
        let available: Vec<Utxo> = pool
            .iter()
            .filter(|utxo| !draft.inputs.contains_key(&utxo.input))
            .cloned()
            .collect();
        debug!(strategy = ?self, available = available.len(), "applying coin selection");

        match self {
            CoinSelectionStrategy::SpendAllIntoChange => {
                spend_all(draft, &available);
                ensure_covered(draft, context)?;
                ChangeBuilder::new(context, false).balance(draft, &[])?;
            }
            CoinSelectionStrategy::MinimalWithSplit => {
                let mut required = draft.output_total();
                required.add(Asset::lovelace(), draft.deposits(&context.params));
                required.subtract_all(&draft.consumed(&context.params));
                if draft.inputs.is_empty() && !required.coin().is_positive() {
                    // a transaction spends at least one input
                    required.set_coin(1u64);
                }

                let selector = UtxoSelector::new(context);
                let extra = selector
                    .select(&required, &available)
                    .map_err(|err| err.with_cause(InsufficientBalanceCause::Inputs))?;
                for utxo in &extra {
                    draft.inputs.insert(utxo.input, utxo.output.clone());
                }
                let rest: Vec<Utxo> = available
                    .into_iter()
                    .filter(|utxo| !draft.inputs.contains_key(&utxo.input))
                    .collect();
                ChangeBuilder::new(context, true).balance(draft, &rest)?;
            }
            CoinSelectionStrategy::SendAll => {
                spend_all(draft, &available);
                ensure_covered(draft, context)?;
                sweep_into_last_output(draft, context)?;
            }
        }
        Ok(())
    }
}

fn spend_all(draft: &mut TxDraft, available: &[Utxo]) {
    for utxo in available {
        draft.inputs.insert(utxo.input, utxo.output.clone());
    }
}

/// With every UTXO already spent, any negative leftover is a plain shortfall
fn ensure_covered(draft: &TxDraft, context: &BuildContext) -> Result<()> {
    match draft.raw_change(&context.params).first_negative() {
        Some((asset, amount)) => Err(TxBuildError::InsufficientBalance {
            asset,
            missing: -amount,
            cause: InsufficientBalanceCause::Inputs,
        }),
        None => Ok(()),
    }
}

/// Move the whole leftover, less the fee, into the last explicit output
fn sweep_into_last_output(draft: &mut TxDraft, context: &BuildContext) -> Result<()> {
    if draft.outputs.is_empty() {
        return Err(TxBuildError::InvalidTransaction(
            "send-all needs a destination output".to_string(),
        ));
    }
    let fees = context.fees();
    let encoding = context.config.cost_model_encoding;
    draft.change_outputs.clear();
    let leftover = draft.raw_change(&context.params);
    let last = draft.outputs.len() - 1;
    let mut base: Value = draft.outputs[last].value.clone();
    base.add_all(&leftover);

    let mut fee = 0u64;
    for _ in 0..MAX_SWEEP_ROUNDS {
        let mut value = base.clone();
        value.subtract(Asset::lovelace(), fee);
        if value.coin().is_negative() {
            return Err(TxBuildError::InsufficientBalance {
                asset: Asset::lovelace(),
                missing: -value.coin(),
                cause: InsufficientBalanceCause::Fees,
            });
        }
        draft.outputs[last].value = value;
        draft.fee = fee;

        let needed = fees.draft_fee(draft, encoding)?.total;
        if needed <= fee {
            let shortfall = fees.deposit_shortfall(&draft.outputs[last])?;
            if shortfall > 0 {
                return Err(TxBuildError::InsufficientBalance {
                    asset: Asset::lovelace(),
                    missing: shortfall.into(),
                    cause: InsufficientBalanceCause::Fees,
                });
            }
            debug!(fee, swept = %draft.outputs[last].coin(), "swept leftover into last output");
            return Ok(());
        }
        fee = needed;
    }

    Err(TxBuildError::InvalidTransaction(
        "fee did not settle against the swept output".to_string(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BuilderConfig;
    use crate::hash::Hash;
    use crate::output::{Address, TxIn, TxOut};
    use crate::params::ProtocolParameters;
    use crate::value::AssetName;
    use num_bigint::BigInt;

    fn address() -> Address {
        Address::enterprise(0, &Hash([1u8; 28]))
    }

    fn context() -> BuildContext {
        BuildContext::new(ProtocolParameters::default(), BuilderConfig::default(), address())
            .unwrap()
    }

    fn utxo(id: u8, value: Value) -> Utxo {
        Utxo::new(TxIn::new(Hash([id; 32]), 0), TxOut::new(address(), value))
    }

    fn paying(coin: u64) -> TxDraft {
        let mut draft = TxDraft::new();
        draft.outputs.push(TxOut::new(
            Address::enterprise(0, &Hash([9u8; 28])),
            Value::from_coin(coin),
        ));
        draft
    }

    fn pool() -> Vec<Utxo> {
        vec![
            utxo(1, Value::from_coin(10_000_000u64)),
            utxo(2, Value::from_coin(4_000_000u64)),
            utxo(3, Value::from_coin(3_000_000u64)),
        ]
    }

    #[test]
    fn test_minimal_selects_only_what_is_needed() {
        let context = context();
        let mut draft = paying(2_000_000);
        CoinSelectionStrategy::MinimalWithSplit
            .apply(&mut draft, &context, &pool())
            .unwrap();
        assert_eq!(draft.inputs.len(), 1);
        assert!(draft.is_balanced(&context.params));
    }

    #[test]
    fn test_spend_all_into_single_change() {
        let context = context();
        let mut draft = paying(2_000_000);
        CoinSelectionStrategy::SpendAllIntoChange
            .apply(&mut draft, &context, &pool())
            .unwrap();
        assert_eq!(draft.inputs.len(), 3);
        assert_eq!(draft.change_outputs.len(), 1);
        assert!(draft.is_balanced(&context.params));
    }

    #[test]
    fn test_send_all_sweeps_into_last_output() {
        let context = context();
        let mut draft = paying(2_000_000);
        CoinSelectionStrategy::SendAll
            .apply(&mut draft, &context, &pool())
            .unwrap();
        assert!(draft.change_outputs.is_empty());
        assert_eq!(
            draft.outputs[0].coin(),
            BigInt::from(17_000_000u64 - draft.fee)
        );
        assert!(draft.is_balanced(&context.params));
    }

    #[test]
    fn test_send_all_requires_an_output() {
        let context = context();
        let mut draft = TxDraft::new();
        let err = CoinSelectionStrategy::SendAll
            .apply(&mut draft, &context, &pool())
            .unwrap_err();
        assert!(matches!(err, TxBuildError::InvalidTransaction(_)));
    }

    #[test]
    fn test_spend_all_reports_missing_token() {
        let context = context();
        let token = Asset::new(Hash([4u8; 28]), AssetName::new(b"t".to_vec()).unwrap());
        let mut draft = paying(2_000_000);
        draft.outputs[0].value.add(token.clone(), 5);
        let err = CoinSelectionStrategy::SpendAllIntoChange
            .apply(&mut draft, &context, &pool())
            .unwrap_err();
        match err {
            TxBuildError::InsufficientBalance { asset, missing, cause } => {
                assert_eq!(asset, token);
                assert_eq!(missing, BigInt::from(5));
                assert_eq!(cause, InsufficientBalanceCause::Inputs);
            }
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn test_strategy_names_round_trip_through_json() {
        let json = serde_json::to_string(&CoinSelectionStrategy::SendAll).unwrap();
        assert_eq!(json, "\"SendAll\"");
        let parsed: CoinSelectionStrategy = serde_json::from_str("\"SpendAllIntoChange\"").unwrap();
        assert_eq!(parsed, CoinSelectionStrategy::SpendAllIntoChange);
    }
}
