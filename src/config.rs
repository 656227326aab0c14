//! Builder configuration
//!
//! Knobs that are not ledger parameters: change splitting, the balancing
//! retry bound, collateral sizing and the script-data-hash encoding.

use serde::{Deserialize, Serialize};

use crate::error::{Result, TxBuildError};
use crate::fee_calculator::FeeCalculator;
use crate::output::{Address, TxOut};
use crate::params::ProtocolParameters;
use crate::strategy::CoinSelectionStrategy;
use crate::value::Value;

/// Maximum distinct assets in one change bundle.
pub const DEFAULT_MAX_TOKENS_PER_BUNDLE: usize = 20;

/// Leftover coin above this is split into its own change output.
pub const DEFAULT_SPLIT_THRESHOLD: u64 = 2_000_000;

pub const DEFAULT_MAX_BALANCING_ATTEMPTS: usize = 20;

/// Lower bound on pledged collateral, in lovelace.
pub const DEFAULT_COLLATERAL_AMOUNT: u64 = 5_000_000;

/// How cost models are laid out in the script-data-hash preimage.
///
/// The two layouts can hash differently for the same transaction, so the
/// choice is explicit and never inferred.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum CostModelEncoding {
    /// PlutusV1 keyed by the byte string `0x00` with its costs wrapped as an
    /// indefinite-length array inside a byte string; later languages keyed
    /// by uint with definite arrays. Keys sorted length-first.
    #[default]
    ReferenceCodec,
    /// Every language keyed by its uint id in ascending order, definite arrays.
    CombinedCanonical,
}

/// What to do when the execution-unit evaluator fails
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum EvaluationPolicy {
    /// Fail the build
    #[default]
    Strict,
    /// Log a warning and keep the declared execution units
    KeepDeclared,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BuilderConfig {
    pub max_tokens_per_bundle: usize,
    pub split_threshold: u64,
    pub max_balancing_attempts: usize,
    pub collateral_amount: u64,
    pub cost_model_encoding: CostModelEncoding,
    pub evaluation_policy: EvaluationPolicy,
    pub strategy: CoinSelectionStrategy,
}

impl Default for BuilderConfig {
    fn default() -> Self {
        Self {
            max_tokens_per_bundle: DEFAULT_MAX_TOKENS_PER_BUNDLE,
            split_threshold: DEFAULT_SPLIT_THRESHOLD,
            max_balancing_attempts: DEFAULT_MAX_BALANCING_ATTEMPTS,
            collateral_amount: DEFAULT_COLLATERAL_AMOUNT,
            cost_model_encoding: CostModelEncoding::default(),
            evaluation_policy: EvaluationPolicy::default(),
            strategy: CoinSelectionStrategy::default(),
        }
    }
}

impl BuilderConfig {
    pub fn from_json(json: &str) -> Result<Self> {
        let config: BuilderConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_tokens_per_bundle == 0 {
            return Err(TxBuildError::ConfigError(
                "max_tokens_per_bundle must be positive".to_string(),
            ));
        }
        if self.max_balancing_attempts == 0 {
            return Err(TxBuildError::ConfigError(
                "max_balancing_attempts must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// Everything the selector and change builder read during one build.
///
/// The deposit of a bare-coin output at the change address is computed once
/// here and handed down instead of being recomputed per attempt.
#[derive(Debug, Clone)]
pub struct BuildContext {
    pub params: ProtocolParameters,
    pub config: BuilderConfig,
    pub change_address: Address,
    pub bare_coin_deposit: u64,
}

impl BuildContext {
    pub fn new(
        params: ProtocolParameters,
        config: BuilderConfig,
        change_address: Address,
    ) -> Result<Self> {
        let probe = TxOut::new(change_address.clone(), Value::new());
        let bare_coin_deposit = FeeCalculator::new(&params).min_deposit(&probe)?;
        Ok(Self {
            params,
            config,
            change_address,
            bare_coin_deposit,
        })
    }

    pub fn fees(&self) -> FeeCalculator<'_> {
        FeeCalculator::new(&self.params)
    }

    /// Minimum deposit of a change output carrying `value`'s tokens
    pub fn change_deposit(&self, value: &Value) -> Result<u64> {
        if !value.has_native_tokens() {
            return Ok(self.bare_coin_deposit);
        }
        let probe = TxOut::new(self.change_address.clone(), value.tokens_only());
        self.fees().min_deposit(&probe)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::Hash;

    #[test]
    fn test_defaults() {
        let config = BuilderConfig::default();
        assert_eq!(config.max_tokens_per_bundle, 20);
        assert_eq!(config.split_threshold, 2_000_000);
        assert_eq!(config.max_balancing_attempts, 20);
        assert_eq!(config.cost_model_encoding, CostModelEncoding::ReferenceCodec);
        assert_eq!(config.strategy, CoinSelectionStrategy::MinimalWithSplit);
    }

    #[test]
    fn test_from_json_validates() {
        let config = BuilderConfig::from_json(
            r#"{ "split_threshold": 5000000, "evaluation_policy": "KeepDeclared" }"#,
        )
        .unwrap();
        assert_eq!(config.split_threshold, 5_000_000);
        assert_eq!(config.evaluation_policy, EvaluationPolicy::KeepDeclared);
        assert!(BuilderConfig::from_json(r#"{ "max_balancing_attempts": 0 }"#).is_err());
    }

    #[test]
    fn test_bare_coin_deposit_is_computed_once() {
        let address = Address::enterprise(0, &Hash([1u8; 28]));
        let context =
            BuildContext::new(ProtocolParameters::default(), BuilderConfig::default(), address)
                .unwrap();
        // [h'61..' (29 bytes), 1a xxxxxxxx] = 1 + 31 + 5 = 37 bytes
        assert_eq!(context.bare_coin_deposit, (160 + 37) * 4_310);
        assert_eq!(
            context.change_deposit(&Value::from_coin(50_000_000u64)).unwrap(),
            context.bare_coin_deposit
        );
    }
}
