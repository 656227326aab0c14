//! Fee and deposit calculator
//!
//! Linear size fee, tiered reference-script fee and execution-unit fee, plus
//! the per-output minimum deposit. Both the fee and the deposit feed back into
//! the size they are computed from, so each is settled as a fixed point over
//! the width of its own encoded field.

use num_bigint::BigInt;
use num_traits::{ToPrimitive, Zero};

use crate::config::CostModelEncoding;
use crate::draft::TxDraft;
use crate::error::{Result, TxBuildError};
use crate::output::TxOut;
use crate::params::ProtocolParameters;
use crate::script::ExUnits;
use crate::serialization::ByteSerialize;
use crate::transaction::compile;
use crate::value::to_coin;

/// Fixed per-output overhead the ledger adds to the serialized size
pub const OUTPUT_OVERHEAD_BYTES: u64 = 160;

/// Encoded size of one `[vkey, signature]` witness: 1 + (2 + 32) + (2 + 64)
pub const VKEY_WITNESS_SIZE: usize = 101;

/// Upper bound on fixed-point rounds; a CBOR uint head has only five widths.
const MAX_SETTLE_ROUNDS: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FeeEstimate {
    /// `fee_fixed + fee_per_byte * size`
    pub size_fee: u64,
    pub reference_script_fee: u64,
    pub ex_units_fee: u64,
    pub total: u64,
    /// Transaction size the estimate was taken at
    pub size: usize,
}

pub struct FeeCalculator<'a> {
    params: &'a ProtocolParameters,
}

impl<'a> FeeCalculator<'a> {
    pub fn new(params: &'a ProtocolParameters) -> Self {
        Self { params }
    }

    pub fn size_fee(&self, size: usize) -> u64 {
        self.params
            .fee_fixed
            .saturating_add(self.params.fee_per_byte.saturating_mul(size as u64))
    }

    /// Tiered fee for `total_bytes` of reference scripts.
    ///
    /// Each full tier of `range` bytes is charged at the current per-byte
    /// price, which is then scaled by the multiplier. The exact rational sum
    /// is floored once at the end.
    pub fn reference_script_fee(&self, total_bytes: usize) -> Result<u64> {
        let schedule = &self.params.reference_script_fee;
        let range = BigInt::from(schedule.range);
        let mut remaining = BigInt::from(total_bytes);
        // acc and price are kept as exact fractions num/den
        let mut acc_num = BigInt::zero();
        let mut acc_den = BigInt::from(1u8);
        let mut price_num = BigInt::from(schedule.base.numerator);
        let mut price_den = BigInt::from(schedule.base.denominator);

        loop {
            let chunk = if remaining < range {
                remaining.clone()
            } else {
                range.clone()
            };
            // acc += chunk * price
            acc_num = &acc_num * &price_den + &chunk * &price_num * &acc_den;
            acc_den = &acc_den * &price_den;
            if remaining < range {
                break;
            }
            remaining -= &range;
            if remaining.is_zero() {
                break;
            }
            price_num *= schedule.multiplier.numerator;
            price_den *= schedule.multiplier.denominator;
        }

        (acc_num / acc_den).to_u64().ok_or_else(|| {
            TxBuildError::InvalidTransaction("reference script fee overflows".to_string())
        })
    }

    /// `ceil(mem * price_mem + steps * price_steps)`
    pub fn ex_units_fee(&self, units: ExUnits) -> Result<u64> {
        let prices = &self.params.execution_unit_prices;
        let numerator = BigInt::from(units.mem) * prices.mem.numerator * prices.steps.denominator
            + BigInt::from(units.steps) * prices.steps.numerator * prices.mem.denominator;
        let denominator = BigInt::from(prices.mem.denominator) * prices.steps.denominator;
        let mut fee = &numerator / &denominator;
        if !(&numerator % &denominator).is_zero() {
            fee += 1;
        }
        fee.to_u64().ok_or_else(|| {
            TxBuildError::InvalidTransaction("execution unit fee overflows".to_string())
        })
    }

    pub fn estimate(
        &self,
        size: usize,
        reference_script_bytes: usize,
        ex_units: ExUnits,
    ) -> Result<FeeEstimate> {
        let size_fee = self.size_fee(size);
        let reference_script_fee = self.reference_script_fee(reference_script_bytes)?;
        let ex_units_fee = self.ex_units_fee(ex_units)?;
        let total = size_fee
            .checked_add(reference_script_fee)
            .and_then(|t| t.checked_add(ex_units_fee))
            .ok_or_else(|| TxBuildError::InvalidTransaction("fee overflows".to_string()))?;
        Ok(FeeEstimate {
            size_fee,
            reference_script_fee,
            ex_units_fee,
            total,
            size,
        })
    }

    /// Settle the fee of a transaction whose size depends on the fee itself.
    ///
    /// `size_at(fee)` returns the full signed size with `fee` in the fee
    /// field. The fee only grows between rounds, so the loop stops once the
    /// fee covers the size it produces.
    pub fn settle<F>(
        &self,
        mut size_at: F,
        reference_script_bytes: usize,
        ex_units: ExUnits,
    ) -> Result<FeeEstimate>
    where
        F: FnMut(u64) -> Result<usize>,
    {
        let mut fee = 0u64;
        for _ in 0..MAX_SETTLE_ROUNDS {
            let estimate = self.estimate(size_at(fee)?, reference_script_bytes, ex_units)?;
            if estimate.total <= fee {
                return Ok(FeeEstimate { total: fee, ..estimate });
            }
            fee = estimate.total;
        }
        Err(TxBuildError::InvalidTransaction(
            "fee did not settle".to_string(),
        ))
    }

    /// Settled fee of `draft` as it stands, signed by every required key
    pub fn draft_fee(&self, draft: &TxDraft, encoding: CostModelEncoding) -> Result<FeeEstimate> {
        let mut probe = draft.clone();
        let reference_script_bytes = draft.reference_script_bytes();
        let ex_units = draft.total_ex_units();
        self.settle(
            |fee| {
                probe.fee = fee;
                compile(&probe, self.params, encoding)?.estimated_size()
            },
            reference_script_bytes,
            ex_units,
        )
    }

    /// Minimum coin `output` must hold: `(160 + size) * coins_per_utxo_byte`,
    /// where size is measured with that coin amount in place.
    pub fn min_deposit(&self, output: &TxOut) -> Result<u64> {
        let mut probe = output.clone();
        let mut coin = 0u64;
        for _ in 0..MAX_SETTLE_ROUNDS {
            probe.value.set_coin(coin);
            let required = self.deposit_for_size(probe.byte_size()?)?;
            if required <= coin {
                return Ok(coin);
            }
            coin = required;
        }
        Err(TxBuildError::InvalidOutput(
            "minimum deposit did not settle".to_string(),
        ))
    }

    /// Whether `output` covers the deposit for its own serialized size
    pub fn is_deposit_safe(&self, output: &TxOut) -> Result<bool> {
        let required = self.deposit_for_size(output.byte_size()?)?;
        Ok(output.coin() >= BigInt::from(required))
    }

    /// Coin still missing for `output` to be deposit-safe, zero when it is
    pub fn deposit_shortfall(&self, output: &TxOut) -> Result<u64> {
        let required = BigInt::from(self.min_deposit(output)?);
        let coin = output.coin();
        if coin >= required {
            Ok(0)
        } else {
            to_coin(&(required - coin))
        }
    }

    /// Collateral pledge for `fee`: at least `minimum`, and at least
    /// `ceil(fee * collateral_percentage / 100)`
    pub fn required_collateral(&self, fee: u64, minimum: u64) -> u64 {
        let percentage = self.params.collateral_percentage as u128;
        let scaled = (fee as u128 * percentage).div_ceil(100);
        minimum.max(u64::try_from(scaled).unwrap_or(u64::MAX))
    }

    fn deposit_for_size(&self, size: usize) -> Result<u64> {
        (OUTPUT_OVERHEAD_BYTES + size as u64)
            .checked_mul(self.params.coins_per_utxo_byte)
            .ok_or_else(|| TxBuildError::InvalidOutput("deposit overflows".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::Hash;
    use crate::output::Address;
    use crate::value::{Asset, AssetName, Value};

    fn params() -> ProtocolParameters {
        ProtocolParameters::default()
    }

    #[test]
    fn test_size_fee_is_linear() {
        let params = params();
        let fees = FeeCalculator::new(&params);
        assert_eq!(fees.size_fee(0), 155_381);
        assert_eq!(fees.size_fee(284), 155_381 + 44 * 284);
    }

    #[test]
    fn test_reference_script_fee_tiers() {
        let params = params();
        let fees = FeeCalculator::new(&params);
        assert_eq!(fees.reference_script_fee(0).unwrap(), 0);
        assert_eq!(fees.reference_script_fee(1_000).unwrap(), 15_000);
        assert_eq!(fees.reference_script_fee(25_600).unwrap(), 384_000);
        // second tier at 18 per byte
        assert_eq!(fees.reference_script_fee(25_601).unwrap(), 384_018);
        // 100 bytes into the third tier at 21.6 per byte: 384000 + 460800 + 2160
        assert_eq!(fees.reference_script_fee(51_300).unwrap(), 846_960);
    }

    #[test]
    fn test_ex_units_fee_rounds_up() {
        let params = params();
        let fees = FeeCalculator::new(&params);
        assert_eq!(fees.ex_units_fee(ExUnits::default()).unwrap(), 0);
        // 1_000_000 * 0.0577 + 500_000_000 * 0.0000721 = 57_700 + 36_050
        assert_eq!(
            fees.ex_units_fee(ExUnits::new(1_000_000, 500_000_000)).unwrap(),
            93_750
        );
        assert_eq!(fees.ex_units_fee(ExUnits::new(1, 1)).unwrap(), 1);
    }

    #[test]
    fn test_settle_crosses_a_width_boundary() {
        let params = params();
        let fees = FeeCalculator::new(&params);
        // base size 200 plus the width of the fee head
        let estimate = fees
            .settle(|fee| Ok(200 + crate::serialization::head_size(fee)), 0, ExUnits::default())
            .unwrap();
        assert_eq!(estimate.total, 155_381 + 44 * 205);
        assert!(estimate.total >= fees.size_fee(estimate.size));
    }

    #[test]
    fn test_min_deposit_fixed_point() {
        let params = params();
        let fees = FeeCalculator::new(&params);
        let address = Address::enterprise(0, &Hash([1u8; 28]));
        let output = TxOut::new(address.clone(), Value::new());
        let deposit = fees.min_deposit(&output).unwrap();
        assert_eq!(deposit, (160 + 37) * 4_310);

        let mut funded = output.clone();
        funded.value.set_coin(deposit);
        assert!(fees.is_deposit_safe(&funded).unwrap());
        funded.value.set_coin(deposit - 1);
        assert!(!fees.is_deposit_safe(&funded).unwrap());
        assert_eq!(fees.deposit_shortfall(&funded).unwrap(), 1);

        let token = Asset::new(Hash([2u8; 28]), AssetName::new(b"x".to_vec()).unwrap());
        let with_token = TxOut::new(address, Value::new().with_asset(token, 1));
        assert!(fees.min_deposit(&with_token).unwrap() > deposit);
    }

    #[test]
    fn test_draft_fee_counts_signers() {
        let params = params();
        let fees = FeeCalculator::new(&params);
        let address = Address::enterprise(0, &Hash([1u8; 28]));
        let mut draft = TxDraft::new();
        draft.inputs.insert(
            crate::output::TxIn::new(Hash([1u8; 32]), 0),
            TxOut::new(address.clone(), Value::from_coin(5_000_000u64)),
        );
        draft.outputs.push(TxOut::new(address, Value::from_coin(2_000_000u64)));
        let estimate = fees.draft_fee(&draft, CostModelEncoding::default()).unwrap();
        assert_eq!(estimate.total, fees.size_fee(estimate.size));

        draft.required_signers.insert(Hash([2u8; 28]));
        let signed = fees.draft_fee(&draft, CostModelEncoding::default()).unwrap();
        assert!(signed.size > estimate.size + VKEY_WITNESS_SIZE);
        assert!(signed.total > estimate.total);
    }

    #[test]
    fn test_required_collateral() {
        let params = params();
        let fees = FeeCalculator::new(&params);
        assert_eq!(fees.required_collateral(200_000, 5_000_000), 5_000_000);
        assert_eq!(fees.required_collateral(4_000_001, 0), 6_000_002);
        assert_eq!(fees.required_collateral(3, 0), 5);
    }
}
