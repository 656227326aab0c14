//! External services the builder waits on
//!
//! Protocol parameters and script evaluation live behind async traits so the
//! rest of the crate stays synchronous.

use async_trait::async_trait;

use crate::error::Result;
use crate::output::Utxo;
use crate::params::ProtocolParameters;
use crate::script::{ExUnits, RedeemerPointer, RedeemerTag};

#[async_trait]
pub trait ProtocolParametersProvider: Send + Sync {
    async fn protocol_parameters(&self) -> Result<ProtocolParameters>;
}

/// A provider that always answers with the same parameters
#[derive(Debug, Clone, Default)]
pub struct StaticParameters {
    params: ProtocolParameters,
}

impl StaticParameters {
    pub fn new(params: ProtocolParameters) -> Result<Self> {
        params.validate()?;
        Ok(Self { params })
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(Self {
            params: ProtocolParameters::from_json(json)?,
        })
    }
}

#[async_trait]
impl ProtocolParametersProvider for StaticParameters {
    async fn protocol_parameters(&self) -> Result<ProtocolParameters> {
        Ok(self.params.clone())
    }
}

/// Execution budget reported for one redeemer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EvaluatedRedeemer {
    pub tag: RedeemerTag,
    pub index: u32,
    pub ex_units: ExUnits,
}

impl EvaluatedRedeemer {
    pub fn pointer(&self) -> RedeemerPointer {
        RedeemerPointer {
            tag: self.tag,
            index: self.index,
        }
    }
}

/// Runs the scripts of a serialized transaction against the UTXOs it spends
/// and references.
#[async_trait]
pub trait ExUnitsEvaluator: Send + Sync {
    async fn evaluate(&self, tx_bytes: &[u8], utxos: &[Utxo]) -> Result<Vec<EvaluatedRedeemer>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_static_parameters() {
        let provider = StaticParameters::from_json(r#"{ "fee_per_byte": 50 }"#).unwrap();
        let params = provider.protocol_parameters().await.unwrap();
        assert_eq!(params.fee_per_byte, 50);
        assert_eq!(params.fee_fixed, ProtocolParameters::default().fee_fixed);
    }

    #[test]
    fn test_evaluated_pointer() {
        let evaluated = EvaluatedRedeemer {
            tag: RedeemerTag::Mint,
            index: 2,
            ex_units: ExUnits::new(1, 2),
        };
        assert_eq!(
            evaluated.pointer(),
            RedeemerPointer {
                tag: RedeemerTag::Mint,
                index: 2
            }
        );
    }
}
