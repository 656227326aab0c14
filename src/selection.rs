//! UTXO selection
//!
//! Greedy, deterministic selection: tokens first in asset order, then coin.
//! Coin is taken from coin-only UTXOs before UTXOs whose tokens would have to
//! travel to change along with their own deposit.

use std::cmp::Reverse;
use std::collections::BTreeSet;

use num_bigint::BigInt;
use num_traits::Signed;
use tracing::debug;

use crate::config::BuildContext;
use crate::error::{InsufficientBalanceCause, Result, TxBuildError};
use crate::output::{TxIn, Utxo};
use crate::value::{Asset, Value};

pub struct UtxoSelector<'a> {
    context: &'a BuildContext,
}

impl<'a> UtxoSelector<'a> {
    pub fn new(context: &'a BuildContext) -> Self {
        Self { context }
    }

    /// Pick UTXOs from `pool` covering the positive part of `required`.
    ///
    /// Returns only the newly selected UTXOs. On shortfall the error carries
    /// the exact missing quantity with cause `inputs`; callers rewrite the
    /// cause for their own stage.
    pub fn select(&self, required: &Value, pool: &[Utxo]) -> Result<Vec<Utxo>> {
        let required = required.positive_part();
        let (coin_only, multi_asset): (Vec<&Utxo>, Vec<&Utxo>) =
            pool.iter().partition(|utxo| utxo.output.value.is_ada_only());

        let mut selected: Vec<Utxo> = Vec::new();
        for (asset, need) in required.tokens() {
            let extra = self.select_utxos_for_token(asset, need, &selected, &multi_asset)?;
            selected.extend(extra);
        }

        let extra =
            self.select_utxos_for_coin(&required.coin(), &selected, &coin_only, &multi_asset)?;
        selected.extend(extra);

        debug!(
            required = ?required,
            selected = selected.len(),
            pool = pool.len(),
            "selected utxos"
        );
        Ok(selected)
    }

    /// Add UTXOs holding `asset` until `selected` plus the additions hold at
    /// least `need`. Largest holdings first, ties broken by input order.
    pub fn select_utxos_for_token(
        &self,
        asset: &Asset,
        need: &BigInt,
        selected: &[Utxo],
        pool: &[&Utxo],
    ) -> Result<Vec<Utxo>> {
        let mut have: BigInt = selected.iter().map(|u| u.output.value.get(asset)).sum();
        if have >= *need {
            return Ok(Vec::new());
        }

        let taken: BTreeSet<TxIn> = selected.iter().map(|u| u.input).collect();
        let mut candidates: Vec<&Utxo> = pool
            .iter()
            .copied()
            .filter(|u| !taken.contains(&u.input) && u.output.value.get(asset).is_positive())
            .collect();
        candidates.sort_by(|a, b| {
            b.output
                .value
                .get(asset)
                .cmp(&a.output.value.get(asset))
                .then_with(|| a.input.cmp(&b.input))
        });

        let mut added = Vec::new();
        for utxo in candidates {
            have += utxo.output.value.get(asset);
            added.push(utxo.clone());
            if have >= *need {
                return Ok(added);
            }
        }

        Err(TxBuildError::InsufficientBalance {
            asset: asset.clone(),
            missing: need - have,
            cause: InsufficientBalanceCause::Inputs,
        })
    }

    /// Add UTXOs until the coin in `selected` plus the additions reaches
    /// `need`: coin-only UTXOs by coin descending, then multi-asset UTXOs by
    /// the coin they free up beyond the deposit their tokens need.
    pub fn select_utxos_for_coin(
        &self,
        need: &BigInt,
        selected: &[Utxo],
        coin_only: &[&Utxo],
        multi_asset: &[&Utxo],
    ) -> Result<Vec<Utxo>> {
        let mut have: BigInt = selected.iter().map(Utxo::coin).sum();
        if have >= *need {
            return Ok(Vec::new());
        }

        let taken: BTreeSet<TxIn> = selected.iter().map(|u| u.input).collect();
        let mut plain: Vec<&Utxo> = coin_only
            .iter()
            .copied()
            .filter(|u| !taken.contains(&u.input))
            .collect();
        plain.sort_by_key(|u| (Reverse(u.coin()), u.input));

        let mut scored = Vec::new();
        for utxo in multi_asset.iter().copied().filter(|u| !taken.contains(&u.input)) {
            let deposit = self.context.change_deposit(&utxo.output.value)?;
            scored.push((utxo.coin() - BigInt::from(deposit), utxo));
        }
        scored.sort_by(|(a_score, a), (b_score, b)| {
            b_score.cmp(a_score).then_with(|| a.input.cmp(&b.input))
        });

        let mut added = Vec::new();
        for utxo in plain.into_iter().chain(scored.into_iter().map(|(_, u)| u)) {
            have += utxo.coin();
            added.push(utxo.clone());
            if have >= *need {
                return Ok(added);
            }
        }

        Err(TxBuildError::InsufficientBalance {
            asset: Asset::lovelace(),
            missing: need - have,
            cause: InsufficientBalanceCause::Inputs,
        })
    }
}
