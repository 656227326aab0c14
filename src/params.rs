//! Protocol parameters
//!
//! The subset of ledger parameters that the fee, deposit and balancing
//! logic depends on. Parameters are plain data: fetch them through a
//! [`crate::provider::ProtocolParametersProvider`] or load them from JSON.

use std::collections::BTreeMap;
use std::fmt;

use num_bigint::BigInt;
use num_traits::Zero;
use serde::{Deserialize, Serialize};

use crate::error::{Result, TxBuildError};
use crate::script::PlutusVersion;

/// Exact non-negative fraction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rational {
    pub numerator: u64,
    pub denominator: u64,
}

impl Rational {
    pub const fn new(numerator: u64, denominator: u64) -> Self {
        Self {
            numerator,
            denominator,
        }
    }

    /// `ceil(amount * self)`
    pub fn mul_ceil(&self, amount: u64) -> BigInt {
        let numerator = BigInt::from(amount) * self.numerator;
        let denominator = BigInt::from(self.denominator);
        let quotient = &numerator / &denominator;
        if (&numerator % &denominator).is_zero() {
            quotient
        } else {
            quotient + 1
        }
    }

    fn validate(&self, name: &str) -> Result<()> {
        if self.denominator == 0 {
            return Err(TxBuildError::ParametersError(format!(
                "{} has a zero denominator",
                name
            )));
        }
        Ok(())
    }
}

impl fmt::Display for Rational {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.numerator, self.denominator)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExUnitPrices {
    pub mem: Rational,
    pub steps: Rational,
}

/// Tiered price of reference scripts, per byte
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferenceScriptFee {
    /// Price per byte of the first tier
    pub base: Rational,
    /// Bytes per tier
    pub range: u32,
    /// Factor applied to the per-byte price at each new tier
    pub multiplier: Rational,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaxExUnits {
    pub mem: u64,
    pub steps: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProtocolParameters {
    pub fee_per_byte: u64,
    pub fee_fixed: u64,
    pub coins_per_utxo_byte: u64,
    pub max_tx_size: u32,
    pub max_value_size: u32,
    pub execution_unit_prices: ExUnitPrices,
    pub reference_script_fee: ReferenceScriptFee,
    pub cost_models: BTreeMap<PlutusVersion, Vec<i64>>,
    pub stake_deposit: u64,
    pub pool_deposit: u64,
    pub max_collateral_inputs: u32,
    pub collateral_percentage: u32,
    pub max_tx_ex_units: MaxExUnits,
}

impl ProtocolParameters {
    /// Mainnet values as of the Conway era. Cost models are left empty.
    pub fn mainnet() -> Self {
        Self {
            fee_per_byte: 44,
            fee_fixed: 155_381,
            coins_per_utxo_byte: 4_310,
            max_tx_size: 16_384,
            max_value_size: 5_000,
            execution_unit_prices: ExUnitPrices {
                mem: Rational::new(577, 10_000),
                steps: Rational::new(721, 10_000_000),
            },
            reference_script_fee: ReferenceScriptFee {
                base: Rational::new(15, 1),
                range: 25_600,
                multiplier: Rational::new(12, 10),
            },
            cost_models: BTreeMap::new(),
            stake_deposit: 2_000_000,
            pool_deposit: 500_000_000,
            max_collateral_inputs: 3,
            collateral_percentage: 150,
            max_tx_ex_units: MaxExUnits {
                mem: 14_000_000,
                steps: 10_000_000_000,
            },
        }
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let params: ProtocolParameters = serde_json::from_str(json)?;
        params.validate()?;
        Ok(params)
    }

    pub fn with_cost_model(mut self, version: PlutusVersion, costs: Vec<i64>) -> Self {
        self.cost_models.insert(version, costs);
        self
    }

    pub fn validate(&self) -> Result<()> {
        self.execution_unit_prices.mem.validate("mem price")?;
        self.execution_unit_prices.steps.validate("steps price")?;
        self.reference_script_fee.base.validate("reference script base fee")?;
        self.reference_script_fee
            .multiplier
            .validate("reference script multiplier")?;
        if self.reference_script_fee.range == 0 {
            return Err(TxBuildError::ParametersError(
                "reference script tier range must be positive".to_string(),
            ));
        }
        if self.max_collateral_inputs == 0 {
            return Err(TxBuildError::ParametersError(
                "max collateral inputs must be positive".to_string(),
            ));
        }
        Ok(())
    }

    pub fn cost_model(&self, version: PlutusVersion) -> Result<&[i64]> {
        self.cost_models
            .get(&version)
            .map(Vec::as_slice)
            .ok_or_else(|| {
                TxBuildError::ParametersError(format!("no cost model for {:?}", version))
            })
    }
}

impl Default for ProtocolParameters {
    fn default() -> Self {
        Self::mainnet()
    }
}
