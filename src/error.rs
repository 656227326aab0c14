//! Error types for TxLoom

use std::fmt;

use num_bigint::BigInt;
use thiserror::Error;

use crate::draft::DraftSnapshot;
use crate::value::Asset;

/// Stage of the build that ran out of value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InsufficientBalanceCause {
    /// Covering the explicitly requested outputs
    Inputs,
    /// Giving a single change output its minimum deposit
    Change,
    /// Giving split change bundles their minimum deposits
    ChangeSplit,
    /// Paying the transaction fee
    Fees,
    /// Pledging collateral for script execution
    Collateral,
}

impl fmt::Display for InsufficientBalanceCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            InsufficientBalanceCause::Inputs => "inputs",
            InsufficientBalanceCause::Change => "change",
            InsufficientBalanceCause::ChangeSplit => "change_split",
            InsufficientBalanceCause::Fees => "fees",
            InsufficientBalanceCause::Collateral => "collateral",
        };
        f.write_str(name)
    }
}

#[derive(Error, Debug)]
pub enum TxBuildError {
    #[error("Insufficient balance of {asset}: missing {missing} (cause: {cause})")]
    InsufficientBalance {
        asset: Asset,
        missing: BigInt,
        cause: InsufficientBalanceCause,
    },

    #[error("Change value of {value_size} bytes exceeds the maximum of {max} (fee at the time: {attempted_fee})")]
    ChangeValueTooLarge {
        value_size: usize,
        max: u32,
        attempted_fee: u64,
    },

    #[error("Collateral needs {inputs_count} inputs but at most {max} are allowed")]
    MaxCollateralBreach { inputs_count: usize, max: u32 },

    #[error("Selected inputs do not cover committed outputs: {asset} short by {deficit}")]
    IncorrectInputSupplied { asset: Asset, deficit: BigInt },

    /// Consumed by the change builder's retry loop.
    #[error("Change outputs cannot cover the fee: {additional_ada_required} more lovelace required")]
    CoverForFees { additional_ada_required: u64 },

    /// Consumed by the change builder's retry loop.
    #[error("Dust left after fee coverage cannot stand alone: {additional_ada_required} more lovelace required (cause: {cause})")]
    CoverForDustAda {
        additional_ada_required: u64,
        cause: InsufficientBalanceCause,
    },

    #[error("Balancing did not converge after {attempts} attempts")]
    BalancingAttemptsExceeded { attempts: usize },

    #[error("Transaction building failed: {cause}")]
    TxBuilding {
        cause: Box<TxBuildError>,
        snapshot: Box<DraftSnapshot>,
    },

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Deserialization error: {0}")]
    DeserializationError(String),

    #[error("Buffer too small: needed {needed} bytes, got {available}")]
    BufferTooSmall { needed: usize, available: usize },

    #[error("Invalid asset: {0}")]
    InvalidAsset(String),

    #[error("Invalid output: {0}")]
    InvalidOutput(String),

    #[error("Invalid transaction: {0}")]
    InvalidTransaction(String),

    #[error("Output {index} holds {actual} lovelace but needs at least {required}")]
    OutputBelowMinimumDeposit {
        index: usize,
        required: u64,
        actual: BigInt,
    },

    #[error("Transaction is {size} bytes, the maximum is {max}")]
    TransactionTooLarge { size: usize, max: u32 },

    #[error("Execution units {mem}/{steps} exceed the transaction budget {max_mem}/{max_steps}")]
    ExUnitsBudgetExceeded {
        mem: u64,
        steps: u64,
        max_mem: u64,
        max_steps: u64,
    },

    #[error("Redeemer target not present in the transaction: {0}")]
    MissingRedeemerTarget(String),

    #[error("Reference script not found at {0}")]
    MissingReferenceScript(String),

    #[error("Balance equation violated, residual: {0}")]
    Unbalanced(String),

    #[error("Script evaluation failed: {0}")]
    EvaluationError(String),

    #[error("Protocol parameters unavailable: {0}")]
    ParametersError(String),

    #[error("Signature error: {0}")]
    SignatureError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl TxBuildError {
    /// Rewrites the cause of an insufficient-balance error; other errors pass through.
    pub fn with_cause(self, cause: InsufficientBalanceCause) -> Self {
        match self {
            TxBuildError::InsufficientBalance { asset, missing, .. } => {
                TxBuildError::InsufficientBalance {
                    asset,
                    missing,
                    cause,
                }
            }
            other => other,
        }
    }

    /// The innermost error, looking through `TxBuilding` wrappers.
    pub fn root_cause(&self) -> &TxBuildError {
        match self {
            TxBuildError::TxBuilding { cause, .. } => cause.root_cause(),
            other => other,
        }
    }

    /// Snapshot of the draft at the time of failure, if the error was wrapped.
    pub fn snapshot(&self) -> Option<&DraftSnapshot> {
        match self {
            TxBuildError::TxBuilding { snapshot, .. } => Some(snapshot),
            _ => None,
        }
    }
}

impl From<std::io::Error> for TxBuildError {
    fn from(err: std::io::Error) -> Self {
        TxBuildError::SerializationError(err.to_string())
    }
}

impl From<hex::FromHexError> for TxBuildError {
    fn from(err: hex::FromHexError) -> Self {
        TxBuildError::DeserializationError(err.to_string())
    }
}

impl From<serde_json::Error> for TxBuildError {
    fn from(err: serde_json::Error) -> Self {
        TxBuildError::ConfigError(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, TxBuildError>;
