//! TxLoom - Multi-Asset UTXO Transaction Builder
//!
//! Builds balanced, canonically encoded transactions for a multi-asset UTXO
//! ledger: coin selection, change splitting, fee and deposit settlement,
//! collateral, redeemer pointers and the script data hash, then witness
//! assembly over the finished bytes.

pub mod error;
pub mod serialization;
pub mod hash;
pub mod value;
pub mod script;
pub mod output;
pub mod certificate;
pub mod metadata;
pub mod params;
pub mod config;
pub mod fee_calculator;
pub mod draft;
pub mod transaction;
pub mod selection;
pub mod collateral;
pub mod change;
pub mod strategy;
pub mod step;
pub mod provider;
pub mod builder;
pub mod signer;

pub use builder::{BuiltTransaction, TxBuilder, WalletContext};
pub use error::{InsufficientBalanceCause, Result, TxBuildError};
pub use fee_calculator::{FeeCalculator, FeeEstimate};
pub use transaction::{CompiledTransaction, Transaction};
pub use value::{Asset, AssetName, Value};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::builder::{BuiltTransaction, TxBuilder, WalletContext};
    pub use crate::certificate::{Certificate, RewardAddress, StakeCredential};
    pub use crate::config::{BuilderConfig, CostModelEncoding, EvaluationPolicy};
    pub use crate::error::{InsufficientBalanceCause, TxBuildError};
    pub use crate::hash::{Hash, KeyHash, ScriptHash, TxId};
    pub use crate::metadata::Metadatum;
    pub use crate::output::{Address, DatumSource, TxIn, TxOut, Utxo};
    pub use crate::params::ProtocolParameters;
    pub use crate::provider::{
        EvaluatedRedeemer, ExUnitsEvaluator, ProtocolParametersProvider, StaticParameters,
    };
    pub use crate::script::{
        ExUnits, PlutusData, PlutusVersion, Script, ScriptSource, ScriptWitness,
    };
    pub use crate::serialization::{ByteDeserialize, ByteSerialize};
    pub use crate::signer::{assemble, sign, verify_transaction};
    pub use crate::strategy::CoinSelectionStrategy;
    pub use crate::value::{Asset, AssetName, PolicyId, Value};
}
