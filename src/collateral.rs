//! Collateral selection for transactions that run Plutus scripts

use std::cmp::Reverse;

use num_bigint::BigInt;
use tracing::debug;

use crate::config::BuildContext;
use crate::draft::Collateral;
use crate::error::{InsufficientBalanceCause, Result, TxBuildError};
use crate::output::{TxOut, Utxo};
use crate::value::{to_coin, Asset, Value};

/// Pledge collateral for a transaction paying `fee`.
///
/// Only coin-only UTXOs locked by a key credential qualify. The excess over
/// the required amount goes back to the change address when it can stand as
/// its own output; otherwise the whole pledge is forfeit on failure.
pub fn select_collateral(
    context: &BuildContext,
    fee: u64,
    candidates: &[Utxo],
) -> Result<Collateral> {
    let required = context
        .fees()
        .required_collateral(fee, context.config.collateral_amount);
    let max_inputs = context.params.max_collateral_inputs;

    let mut eligible: Vec<&Utxo> = candidates
        .iter()
        .filter(|utxo| {
            utxo.output.value.is_ada_only() && utxo.output.address.payment_key_hash().is_some()
        })
        .collect();
    eligible.sort_by_key(|utxo| (Reverse(utxo.coin()), utxo.input));

    let needed = BigInt::from(required);
    let mut total = BigInt::from(0u8);
    let mut collateral = Collateral::default();
    for utxo in eligible {
        if total >= needed {
            break;
        }
        total += utxo.coin();
        collateral.inputs.insert(utxo.input, utxo.output.clone());
    }

    if total < needed {
        return Err(TxBuildError::InsufficientBalance {
            asset: Asset::lovelace(),
            missing: needed - total,
            cause: InsufficientBalanceCause::Collateral,
        });
    }
    if collateral.inputs.len() > max_inputs as usize {
        return Err(TxBuildError::MaxCollateralBreach {
            inputs_count: collateral.inputs.len(),
            max: max_inputs,
        });
    }

    let pledged = to_coin(&total)?;
    let excess = pledged - required;
    let return_output = TxOut::new(context.change_address.clone(), Value::from_coin(excess));
    if excess > 0 && context.fees().is_deposit_safe(&return_output)? {
        collateral.return_output = Some(return_output);
        collateral.total = Some(required);
    } else {
        collateral.total = Some(pledged);
    }

    debug!(
        inputs = collateral.inputs.len(),
        required,
        pledged,
        returned = collateral.return_output.is_some(),
        "selected collateral"
    );
    Ok(collateral)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BuilderConfig;
    use crate::hash::Hash;
    use crate::output::{Address, TxIn};
    use crate::params::ProtocolParameters;
    use crate::value::AssetName;

    fn context(params: ProtocolParameters) -> BuildContext {
        BuildContext::new(params, BuilderConfig::default(), Address::enterprise(0, &Hash([1u8; 28])))
            .unwrap()
    }

    fn utxo(id: u8, coin: u64) -> Utxo {
        Utxo::new(
            TxIn::new(Hash([id; 32]), 0),
            TxOut::new(Address::enterprise(0, &Hash([1u8; 28])), Value::from_coin(coin)),
        )
    }

    #[test]
    fn test_largest_first_with_return() {
        let context = context(ProtocolParameters::default());
        let candidates = vec![utxo(1, 2_000_000), utxo(2, 9_000_000), utxo(3, 4_000_000)];
        let collateral = select_collateral(&context, 200_000, &candidates).unwrap();
        assert_eq!(collateral.inputs.len(), 1);
        assert!(collateral.inputs.contains_key(&candidates[1].input));
        assert_eq!(collateral.total, Some(5_000_000));
        assert_eq!(
            collateral.return_output.map(|out| out.coin()),
            Some(BigInt::from(4_000_000))
        );
    }

    #[test]
    fn test_small_excess_is_pledged() {
        let context = context(ProtocolParameters::default());
        let candidates = vec![utxo(1, 5_100_000)];
        let collateral = select_collateral(&context, 200_000, &candidates).unwrap();
        assert!(collateral.return_output.is_none());
        assert_eq!(collateral.total, Some(5_100_000));
    }

    #[test]
    fn test_ineligible_candidates_are_skipped() {
        let context = context(ProtocolParameters::default());
        let token = Asset::new(Hash([5u8; 28]), AssetName::new(b"t".to_vec()).unwrap());
        let mut with_token = utxo(1, 50_000_000);
        with_token.output.value.add(token, 1);
        let script_locked = Utxo::new(
            TxIn::new(Hash([2u8; 32]), 0),
            TxOut::new(
                Address::script_enterprise(0, &Hash([3u8; 28])),
                Value::from_coin(50_000_000u64),
            ),
        );
        let err = select_collateral(&context, 200_000, &[with_token, script_locked]).unwrap_err();
        assert!(matches!(
            err,
            TxBuildError::InsufficientBalance {
                cause: InsufficientBalanceCause::Collateral,
                ..
            }
        ));
    }

    #[test]
    fn test_too_many_inputs() {
        let mut params = ProtocolParameters::default();
        params.max_collateral_inputs = 2;
        let context = context(params);
        let candidates = vec![utxo(1, 2_000_000), utxo(2, 2_000_000), utxo(3, 2_000_000)];
        let err = select_collateral(&context, 200_000, &candidates).unwrap_err();
        assert!(matches!(
            err,
            TxBuildError::MaxCollateralBreach { inputs_count: 3, max: 2 }
        ));
    }
}
