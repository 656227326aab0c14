//! Change balancing
//!
//! Turns whatever the draft consumes beyond its outputs and deposits into
//! change outputs, settles the fee against them and pulls in more inputs
//! when the change cannot stand on its own. Each attempt either balances the
//! draft or names the coin it is short of; the outer loop fetches that coin
//! and tries again, up to the configured bound.

use std::cmp::min;

use num_bigint::BigInt;
use num_traits::{Signed, Zero};
use tracing::debug;

use crate::config::BuildContext;
use crate::draft::TxDraft;
use crate::error::{InsufficientBalanceCause, Result, TxBuildError};
use crate::output::{TxOut, Utxo};
use crate::selection::UtxoSelector;
use crate::value::{to_coin, value_size, Asset, Value};

/// Rounds allowed for the fee to catch up with the change it is taken from
const MAX_FEE_ROUNDS: usize = 8;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeOutcome {
    pub change_outputs: Vec<TxOut>,
    pub fee: u64,
    /// Inputs pulled from the pool while balancing, in selection order
    pub additional_inputs: Vec<Utxo>,
    pub attempts: usize,
}

enum Attempt {
    Balanced { change: Vec<TxOut>, fee: u64 },
    NeedsCoin {
        amount: u64,
        cause: InsufficientBalanceCause,
    },
}

enum Plan {
    Outputs(Vec<TxOut>),
    NeedsCoin {
        amount: u64,
        cause: InsufficientBalanceCause,
    },
}

pub struct ChangeBuilder<'a> {
    context: &'a BuildContext,
    split: bool,
}

impl<'a> ChangeBuilder<'a> {
    /// `split` asks for leftover coin above the split threshold to be kept
    /// apart from token bundles.
    pub fn new(context: &'a BuildContext, split: bool) -> Self {
        Self { context, split }
    }

    /// Balance `draft` in place, spending from `pool` as needed.
    ///
    /// On success the draft holds the change outputs, the fee and every
    /// additional input, and satisfies the balance equation.
    pub fn balance(&self, draft: &mut TxDraft, pool: &[Utxo]) -> Result<ChangeOutcome> {
        let max_attempts = self.context.config.max_balancing_attempts;
        let selector = UtxoSelector::new(self.context);
        let mut additional_inputs = Vec::new();

        for attempt in 1..=max_attempts {
            match self.attempt(draft)? {
                Attempt::Balanced { change, fee } => {
                    debug!(
                        attempt,
                        fee,
                        change_outputs = change.len(),
                        additional_inputs = additional_inputs.len(),
                        "change balanced"
                    );
                    draft.change_outputs = change.clone();
                    draft.fee = fee;
                    return Ok(ChangeOutcome {
                        change_outputs: change,
                        fee,
                        additional_inputs,
                        attempts: attempt,
                    });
                }
                Attempt::NeedsCoin { amount, cause } => {
                    debug!(attempt, amount, %cause, "change needs more coin");
                    let available: Vec<Utxo> = pool
                        .iter()
                        .filter(|utxo| !draft.inputs.contains_key(&utxo.input))
                        .cloned()
                        .collect();
                    let extra = selector
                        .select(&Value::from_coin(amount), &available)
                        .map_err(|err| err.with_cause(cause))?;
                    for utxo in extra {
                        draft.inputs.insert(utxo.input, utxo.output.clone());
                        additional_inputs.push(utxo);
                    }
                }
            }
        }

        Err(TxBuildError::BalancingAttemptsExceeded {
            attempts: max_attempts,
        })
    }

    fn attempt(&self, draft: &TxDraft) -> Result<Attempt> {
        let params = &self.context.params;
        let raw = draft.raw_change(params);
        if let Some((asset, amount)) = raw.first_negative() {
            return Err(TxBuildError::IncorrectInputSupplied {
                asset,
                deficit: -amount,
            });
        }

        let planned = match self.plan_change(&raw, draft.fee)? {
            Plan::Outputs(outputs) => outputs,
            Plan::NeedsCoin { amount, cause } => return Ok(Attempt::NeedsCoin { amount, cause }),
        };

        let fees = self.context.fees();
        let encoding = self.context.config.cost_model_encoding;
        let mut probe = draft.clone();
        probe.change_outputs = planned.clone();
        let mut fee = fees.draft_fee(&probe, encoding)?.total;

        for _ in 0..MAX_FEE_ROUNDS {
            let mut change = planned.clone();
            match self.cover_fee(&mut change, fee) {
                Ok(()) => {}
                Err(TxBuildError::CoverForFees {
                    additional_ada_required,
                }) => {
                    return Ok(Attempt::NeedsCoin {
                        amount: additional_ada_required,
                        cause: InsufficientBalanceCause::Fees,
                    })
                }
                Err(TxBuildError::CoverForDustAda {
                    additional_ada_required,
                    cause,
                }) => {
                    return Ok(Attempt::NeedsCoin {
                        amount: additional_ada_required,
                        cause,
                    })
                }
                Err(other) => return Err(other),
            }

            probe.change_outputs = change;
            probe.fee = fee;
            let needed = fees.draft_fee(&probe, encoding)?.total;
            if needed <= fee {
                return Ok(Attempt::Balanced {
                    change: probe.change_outputs,
                    fee,
                });
            }
            fee = needed;
        }

        Err(TxBuildError::InvalidTransaction(
            "fee did not settle against change".to_string(),
        ))
    }

    /// Lay out the change before the fee is taken from it
    fn plan_change(&self, raw: &Value, attempted_fee: u64) -> Result<Plan> {
        let config = &self.context.config;
        let max_value_size = self.context.params.max_value_size;
        let coin_above_threshold = raw.coin() > BigInt::from(config.split_threshold);

        let needs_split = (self.split && coin_above_threshold)
            || raw.token_count() > config.max_tokens_per_bundle
            || value_size(raw)? > max_value_size as usize;
        if needs_split {
            return self.plan_split(raw, attempted_fee);
        }

        if raw.is_zero() {
            return Ok(Plan::Outputs(Vec::new()));
        }
        let output = TxOut::new(self.context.change_address.clone(), raw.clone());
        let shortfall = self.context.fees().deposit_shortfall(&output)?;
        if shortfall > 0 {
            return Ok(Plan::NeedsCoin {
                amount: shortfall,
                cause: InsufficientBalanceCause::Change,
            });
        }
        Ok(Plan::Outputs(vec![output]))
    }

    /// Token bundles of bounded width, each holding its own deposit, then
    /// the remaining coin on its own or merged into the last bundle
    fn plan_split(&self, raw: &Value, attempted_fee: u64) -> Result<Plan> {
        let max_tokens = self.context.config.max_tokens_per_bundle;
        let max_value_size = self.context.params.max_value_size;
        let fees = self.context.fees();
        let address = &self.context.change_address;

        let tokens: Vec<(Asset, BigInt)> = raw.tokens_only().flatten();
        let mut outputs = Vec::new();
        let mut remaining = raw.coin();
        for chunk in tokens.chunks(max_tokens) {
            let mut value = Value::new();
            for (asset, amount) in chunk {
                value.add(asset.clone(), amount.clone());
            }
            let mut bundle = TxOut::new(address.clone(), value);
            let deposit = fees.min_deposit(&bundle)?;
            bundle.value.set_coin(deposit);

            let size = value_size(&bundle.value)?;
            if size > max_value_size as usize {
                return Err(TxBuildError::ChangeValueTooLarge {
                    value_size: size,
                    max: max_value_size,
                    attempted_fee,
                });
            }
            remaining -= deposit;
            outputs.push(bundle);
        }

        if remaining.is_negative() {
            return Ok(Plan::NeedsCoin {
                amount: to_coin(&-remaining)?,
                cause: InsufficientBalanceCause::ChangeSplit,
            });
        }

        if remaining >= BigInt::from(self.context.bare_coin_deposit) {
            outputs.push(TxOut::new(address.clone(), Value::from_coin(remaining)));
        } else if remaining.is_positive() {
            match outputs.last_mut() {
                Some(last) => last.value.add(Asset::lovelace(), remaining),
                None => {
                    let missing = BigInt::from(self.context.bare_coin_deposit) - remaining;
                    return Ok(Plan::NeedsCoin {
                        amount: to_coin(&missing)?,
                        cause: InsufficientBalanceCause::ChangeSplit,
                    });
                }
            }
        }

        debug!(
            bundles = tokens.len().div_ceil(max_tokens),
            outputs = outputs.len(),
            "split change"
        );
        Ok(Plan::Outputs(outputs))
    }

    /// Debit `fee` from the change: coin-only outputs first, then the spare
    /// coin of token bundles, last output first in both passes
    fn cover_fee(&self, change: &mut Vec<TxOut>, fee: u64) -> Result<()> {
        let mut remaining = BigInt::from(fee);

        for output in change.iter_mut().rev().filter(|o| o.value.is_ada_only()) {
            if remaining.is_zero() {
                break;
            }
            let take = min(output.coin(), remaining.clone());
            output.value.subtract(Asset::lovelace(), take.clone());
            remaining -= take;
        }

        for output in change.iter_mut().rev().filter(|o| o.value.has_native_tokens()) {
            if remaining.is_zero() {
                break;
            }
            let deposit = BigInt::from(self.context.change_deposit(&output.value)?);
            let spare = output.coin() - deposit;
            if spare.is_positive() {
                let take = min(spare, remaining.clone());
                output.value.subtract(Asset::lovelace(), take.clone());
                remaining -= take;
            }
        }

        if remaining.is_positive() {
            return Err(TxBuildError::CoverForFees {
                additional_ada_required: to_coin(&remaining)?,
            });
        }
        self.fold_dust(change)
    }

    /// Remove coin-only outputs left below their deposit and move their coin
    /// to the last remaining output
    fn fold_dust(&self, change: &mut Vec<TxOut>) -> Result<()> {
        let fees = self.context.fees();
        let mut index = change.len();
        while index > 0 {
            index -= 1;
            if fees.is_deposit_safe(&change[index])? {
                continue;
            }
            if change[index].value.has_native_tokens() {
                return Err(TxBuildError::CoverForDustAda {
                    additional_ada_required: fees.deposit_shortfall(&change[index])?,
                    cause: InsufficientBalanceCause::Fees,
                });
            }

            let dust = change.remove(index);
            if dust.coin().is_zero() {
                continue;
            }
            match change.last_mut() {
                Some(sibling) => sibling.value.add(Asset::lovelace(), dust.coin()),
                None => {
                    return Err(TxBuildError::CoverForDustAda {
                        additional_ada_required: fees.deposit_shortfall(&dust)?,
                        cause: InsufficientBalanceCause::Fees,
                    })
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BuilderConfig;
    use crate::hash::Hash;
    use crate::output::{Address, TxIn};
    use crate::params::ProtocolParameters;
    use crate::value::AssetName;

    fn address() -> Address {
        Address::enterprise(0, &Hash([1u8; 28]))
    }

    fn context_with(params: ProtocolParameters, config: BuilderConfig) -> BuildContext {
        BuildContext::new(params, config, address()).unwrap()
    }

    fn context() -> BuildContext {
        context_with(ProtocolParameters::default(), BuilderConfig::default())
    }

    fn utxo(id: u8, value: Value) -> Utxo {
        Utxo::new(TxIn::new(Hash([id; 32]), 0), TxOut::new(address(), value))
    }

    fn token(seed: u8) -> Asset {
        Asset::new(Hash([seed; 28]), AssetName::new(vec![seed]).unwrap())
    }

    fn draft_spending(inputs: &[Utxo], pay: u64) -> TxDraft {
        let mut draft = TxDraft::new();
        for utxo in inputs {
            draft.inputs.insert(utxo.input, utxo.output.clone());
        }
        draft.outputs.push(TxOut::new(
            Address::enterprise(0, &Hash([9u8; 28])),
            Value::from_coin(pay),
        ));
        draft
    }

    #[test]
    fn test_single_change_output_balances() {
        let context = context();
        let mut draft = draft_spending(&[utxo(1, Value::from_coin(5_000_000u64))], 2_000_000);
        let outcome = ChangeBuilder::new(&context, false).balance(&mut draft, &[]).unwrap();

        assert_eq!(outcome.change_outputs.len(), 1);
        assert_eq!(outcome.attempts, 1);
        assert!(draft.is_balanced(&context.params));
        let min_fee = context
            .fees()
            .draft_fee(&draft, context.config.cost_model_encoding)
            .unwrap()
            .total;
        assert!(draft.fee >= min_fee);
        assert!(draft.fee < 200_000);
    }

    #[test]
    fn test_token_overflow_is_split_into_bundles() {
        let context = context();
        let mut value = Value::from_coin(20_000_000u64);
        for seed in 1..=21u8 {
            value.add(token(seed), 1);
        }
        let mut draft = draft_spending(&[utxo(1, value)], 2_000_000);
        let outcome = ChangeBuilder::new(&context, true).balance(&mut draft, &[]).unwrap();

        let bundle_sizes: Vec<usize> = outcome
            .change_outputs
            .iter()
            .filter(|o| o.value.has_native_tokens())
            .map(|o| o.value.token_count())
            .collect();
        assert_eq!(bundle_sizes, vec![20, 1]);
        for output in &outcome.change_outputs {
            assert!(context.fees().is_deposit_safe(output).unwrap());
        }
        assert!(draft.is_balanced(&context.params));
    }

    #[test]
    fn test_dust_change_pulls_more_inputs() {
        let context = context();
        let mut draft = draft_spending(&[utxo(1, Value::from_coin(2_500_000u64))], 2_000_000);
        let pool = vec![utxo(2, Value::from_coin(3_000_000u64))];
        let outcome = ChangeBuilder::new(&context, false).balance(&mut draft, &pool).unwrap();

        assert_eq!(outcome.additional_inputs, pool);
        assert_eq!(draft.inputs.len(), 2);
        assert!(outcome.attempts > 1);
        assert!(draft.is_balanced(&context.params));
    }

    #[test]
    fn test_dust_change_without_pool_fails_with_change_cause() {
        let context = context();
        let mut draft = draft_spending(&[utxo(1, Value::from_coin(2_500_000u64))], 2_000_000);
        let err = ChangeBuilder::new(&context, false).balance(&mut draft, &[]).unwrap_err();
        assert!(matches!(
            err,
            TxBuildError::InsufficientBalance {
                cause: InsufficientBalanceCause::Change,
                ..
            }
        ));
    }

    #[test]
    fn test_outputs_beyond_inputs_are_rejected() {
        let context = context();
        let mut draft = draft_spending(&[utxo(1, Value::from_coin(1_000_000u64))], 2_000_000);
        let err = ChangeBuilder::new(&context, false).balance(&mut draft, &[]).unwrap_err();
        assert!(matches!(
            err,
            TxBuildError::IncorrectInputSupplied { ref deficit, .. } if *deficit == BigInt::from(1_000_000)
        ));
    }

    #[test]
    fn test_attempt_bound() {
        let config = BuilderConfig {
            max_balancing_attempts: 1,
            ..BuilderConfig::default()
        };
        let context = context_with(ProtocolParameters::default(), config);
        let mut draft = draft_spending(&[utxo(1, Value::from_coin(2_500_000u64))], 2_000_000);
        let pool = vec![utxo(2, Value::from_coin(3_000_000u64))];
        let err = ChangeBuilder::new(&context, false).balance(&mut draft, &pool).unwrap_err();
        assert!(matches!(err, TxBuildError::BalancingAttemptsExceeded { attempts: 1 }));
    }

    #[test]
    fn test_oversized_bundle() {
        let params = ProtocolParameters {
            max_value_size: 100,
            ..ProtocolParameters::default()
        };
        let context = context_with(params, BuilderConfig::default());
        let mut value = Value::from_coin(20_000_000u64);
        for seed in 1..=5u8 {
            value.add(token(seed), 1);
        }
        let mut draft = draft_spending(&[utxo(1, value)], 2_000_000);
        let err = ChangeBuilder::new(&context, false).balance(&mut draft, &[]).unwrap_err();
        assert!(matches!(err, TxBuildError::ChangeValueTooLarge { max: 100, .. }));
    }

    #[test]
    fn test_coin_split_keeps_tokens_apart() {
        let context = context();
        let value = Value::from_coin(30_000_000u64).with_asset(token(4), 7);
        let mut draft = draft_spending(&[utxo(1, value)], 2_000_000);
        let outcome = ChangeBuilder::new(&context, true).balance(&mut draft, &[]).unwrap();

        assert_eq!(outcome.change_outputs.len(), 2);
        let bundle = &outcome.change_outputs[0];
        assert_eq!(bundle.value.token_count(), 1);
        assert_eq!(
            bundle.coin(),
            BigInt::from(context.change_deposit(&bundle.value).unwrap())
        );
        assert!(outcome.change_outputs[1].value.is_ada_only());
    }
}
