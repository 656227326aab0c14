//! Transaction builder
//!
//! Collects [`BuildStep`]s through a fluent API, folds them into a draft and
//! finalizes the draft into canonical transaction bytes:
//!
//! 1. materialize the steps not yet applied
//! 2. pledge collateral when Plutus scripts run
//! 3. run the coin-selection strategy
//! 4. evaluate execution units and settle the fee again
//! 5. re-check collateral against the final fee
//! 6. verify balance, deposits, sizes and the execution budget
//! 7. serialize
//!
//! Any failure aborts the build; the error carries a snapshot of the draft
//! at the stage that failed.

use std::collections::BTreeMap;

use num_bigint::BigInt;
use num_traits::Signed;
use tracing::{debug, info, warn};

use crate::certificate::{Certificate, RewardAddress};
use crate::collateral::select_collateral;
use crate::config::{BuildContext, BuilderConfig, EvaluationPolicy};
use crate::draft::TxDraft;
use crate::error::{InsufficientBalanceCause, Result, TxBuildError};
use crate::hash::{KeyHash, TxId};
use crate::metadata::Metadatum;
use crate::output::{Address, DatumSource, TxOut, Utxo};
use crate::params::ProtocolParameters;
use crate::provider::{ExUnitsEvaluator, ProtocolParametersProvider};
use crate::script::{PlutusData, RedeemerPointer, RedeemerTarget, Script, ScriptWitness};
use crate::serialization::ByteSerialize;
use crate::step::BuildStep;
use crate::strategy::CoinSelectionStrategy;
use crate::transaction::compile;
use crate::value::{value_size, Asset, AssetName, PolicyId, Value};

/// What the wallet offers to a build
#[derive(Debug, Clone)]
pub struct WalletContext {
    /// UTXOs the strategy may spend
    pub utxos: Vec<Utxo>,
    pub change_address: Address,
    /// UTXOs the wallet allows to be pledged as collateral
    pub collateral: Vec<Utxo>,
}

impl WalletContext {
    pub fn new(utxos: Vec<Utxo>, change_address: Address) -> Self {
        Self {
            utxos,
            change_address,
            collateral: Vec::new(),
        }
    }

    pub fn with_collateral(mut self, collateral: Vec<Utxo>) -> Self {
        self.collateral = collateral;
        self
    }
}

/// A finalized, unsigned transaction
#[derive(Debug, Clone)]
pub struct BuiltTransaction {
    pub id: TxId,
    /// Canonical CBOR of the whole transaction
    pub bytes: Vec<u8>,
    pub fee: u64,
    pub draft: TxDraft,
}

pub struct TxBuilder {
    params: ProtocolParameters,
    config: BuilderConfig,
    steps: Vec<BuildStep>,
    applied: usize,
    draft: TxDraft,
}

impl TxBuilder {
    pub fn new(params: ProtocolParameters) -> Self {
        Self {
            params,
            config: BuilderConfig::default(),
            steps: Vec::new(),
            applied: 0,
            draft: TxDraft::new(),
        }
    }

    /// Start from whatever parameters `provider` currently reports
    pub async fn from_provider(provider: &dyn ProtocolParametersProvider) -> Result<Self> {
        let params = provider.protocol_parameters().await?;
        params.validate()?;
        Ok(Self::new(params))
    }

    pub fn config(mut self, config: BuilderConfig) -> Self {
        self.config = config;
        self
    }

    pub fn strategy(mut self, strategy: CoinSelectionStrategy) -> Self {
        self.config.strategy = strategy;
        self
    }

    /// Spend a key-locked UTXO
    pub fn spend(self, utxo: Utxo) -> Self {
        self.step(BuildStep::SpendInput {
            utxo,
            witness: None,
        })
    }

    pub fn spend_script(self, utxo: Utxo, witness: ScriptWitness) -> Self {
        self.step(BuildStep::SpendInput {
            utxo,
            witness: Some(witness),
        })
    }

    pub fn reference_input(self, utxo: Utxo) -> Self {
        self.step(BuildStep::AddReferenceInput(utxo))
    }

    pub fn add_output(self, output: TxOut) -> Self {
        self.step(BuildStep::AddOutput(output))
    }

    /// Pay `value` to `address`, raising its coin to the minimum deposit
    pub fn pay_to(self, address: Address, value: Value) -> Self {
        self.step(BuildStep::PayTo {
            address,
            value,
            datum: None,
            script_ref: None,
        })
    }

    pub fn pay_to_with_datum(self, address: Address, value: Value, datum: DatumSource) -> Self {
        self.step(BuildStep::PayTo {
            address,
            value,
            datum: Some(datum),
            script_ref: None,
        })
    }

    pub fn pay_to_with_script_ref(self, address: Address, value: Value, script: Script) -> Self {
        self.step(BuildStep::PayTo {
            address,
            value,
            datum: None,
            script_ref: Some(script),
        })
    }

    pub fn mint(
        self,
        policy: PolicyId,
        assets: Vec<(AssetName, BigInt)>,
        witness: ScriptWitness,
    ) -> Self {
        self.step(BuildStep::Mint {
            policy,
            assets,
            witness,
        })
    }

    pub fn certificate(self, certificate: Certificate, witness: Option<ScriptWitness>) -> Self {
        self.step(BuildStep::AddCertificate {
            certificate,
            witness,
        })
    }

    pub fn withdraw(
        self,
        address: RewardAddress,
        amount: u64,
        witness: Option<ScriptWitness>,
    ) -> Self {
        self.step(BuildStep::Withdraw {
            address,
            amount,
            witness,
        })
    }

    pub fn attach_script(self, script: Script) -> Self {
        self.step(BuildStep::AttachScript(script))
    }

    pub fn attach_datum(self, datum: PlutusData) -> Self {
        self.step(BuildStep::AttachDatum(datum))
    }

    pub fn require_signer(self, key_hash: KeyHash) -> Self {
        self.step(BuildStep::RequireSigner(key_hash))
    }

    pub fn valid_from(self, slot: u64) -> Self {
        self.step(BuildStep::ValidFrom(slot))
    }

    pub fn valid_until(self, slot: u64) -> Self {
        self.step(BuildStep::ValidUntil(slot))
    }

    pub fn metadata(self, label: u64, datum: Metadatum) -> Self {
        self.step(BuildStep::AddMetadata { label, datum })
    }

    pub fn network_id(self, network_id: u8) -> Self {
        self.step(BuildStep::SetNetworkId(network_id))
    }

    fn step(mut self, step: BuildStep) -> Self {
        self.steps.push(step);
        self
    }

    /// Append a step to a builder held by reference
    pub fn add_step(&mut self, step: BuildStep) {
        self.steps.push(step);
    }

    pub fn steps(&self) -> &[BuildStep] {
        &self.steps
    }

    pub fn params(&self) -> &ProtocolParameters {
        &self.params
    }

    /// The draft as of the last materialization
    pub fn draft(&self) -> &TxDraft {
        &self.draft
    }

    /// Apply every step added since the last call. Either all new steps
    /// apply or the draft is left as it was.
    pub fn materialize(&mut self) -> Result<&TxDraft> {
        let mut draft = self.draft.clone();
        for step in &self.steps[self.applied..] {
            step.apply(&mut draft, &self.params)?;
        }
        debug!(
            applied = self.steps.len() - self.applied,
            total = self.steps.len(),
            "materialized build steps"
        );
        self.draft = draft;
        self.applied = self.steps.len();
        Ok(&self.draft)
    }

    /// Finalize into canonical, unsigned transaction bytes
    pub async fn build(
        &mut self,
        wallet: &WalletContext,
        evaluator: Option<&dyn ExUnitsEvaluator>,
    ) -> Result<BuiltTransaction> {
        if let Err(err) = self.materialize().map(|_| ()) {
            return Err(wrap(err, &self.draft, "materialize"));
        }

        let context = BuildContext::new(
            self.params.clone(),
            self.config.clone(),
            wallet.change_address.clone(),
        )
        .map_err(|err| wrap(err, &self.draft, "context"))?;

        let mut finalizer = Finalizer {
            context: &context,
            wallet,
            base: self.draft.clone(),
            draft: self.draft.clone(),
            stage: "collateral",
        };
        match finalizer.run(evaluator).await {
            Ok(built) => Ok(built),
            Err(err) => {
                warn!(stage = finalizer.stage, error = %err, "transaction build failed");
                Err(wrap(err, &finalizer.draft, finalizer.stage))
            }
        }
    }
}

fn wrap(err: TxBuildError, draft: &TxDraft, stage: &'static str) -> TxBuildError {
    TxBuildError::TxBuilding {
        cause: Box::new(err),
        snapshot: Box::new(draft.snapshot(stage)),
    }
}

/// State of one finalization. `base` is the materialized draft plus
/// collateral and evaluated budgets; `draft` is `base` after coin selection.
struct Finalizer<'a> {
    context: &'a BuildContext,
    wallet: &'a WalletContext,
    base: TxDraft,
    draft: TxDraft,
    stage: &'static str,
}

impl<'a> Finalizer<'a> {
    async fn run(&mut self, evaluator: Option<&dyn ExUnitsEvaluator>) -> Result<BuiltTransaction> {
        let runs_scripts = self.base.has_redeemers();

        self.stage = "collateral";
        if runs_scripts {
            let estimate = self
                .context
                .fees()
                .draft_fee(&self.base, self.context.config.cost_model_encoding)?;
            self.base.collateral =
                select_collateral(self.context, estimate.total, &self.wallet.collateral)?;
            self.draft = self.base.clone();
        }

        self.stage = "strategy";
        self.rebalance()?;

        if runs_scripts {
            if let Some(evaluator) = evaluator {
                self.stage = "evaluate";
                if self.evaluate(evaluator).await? {
                    self.stage = "fee";
                    self.settle_evaluated_fee()?;
                }
            }

            self.stage = "collateral_check";
            self.recheck_collateral()?;
        }

        self.stage = "verify";
        self.verify()?;

        self.stage = "serialize";
        self.serialize()
    }

    fn rebalance(&mut self) -> Result<()> {
        let mut draft = self.base.clone();
        self.context
            .config
            .strategy
            .apply(&mut draft, self.context, &self.wallet.utxos)?;
        self.draft = draft;
        Ok(())
    }

    /// Replace declared budgets with evaluated ones. Returns whether any
    /// budget changed.
    async fn evaluate(&mut self, evaluator: &dyn ExUnitsEvaluator) -> Result<bool> {
        let encoding = self.context.config.cost_model_encoding;
        let compiled = compile(&self.draft, &self.context.params, encoding)?;
        let tx_bytes = compiled.transaction.to_bytes()?;
        let resolved: Vec<Utxo> = self
            .draft
            .inputs
            .iter()
            .chain(self.draft.reference_inputs.iter())
            .map(|(input, output)| Utxo::new(*input, output.clone()))
            .collect();

        let evaluated = match evaluator.evaluate(&tx_bytes, &resolved).await {
            Ok(evaluated) => evaluated,
            Err(err) => match self.context.config.evaluation_policy {
                EvaluationPolicy::Strict => return Err(err),
                EvaluationPolicy::KeepDeclared => {
                    warn!(error = %err, "evaluation failed, keeping declared execution units");
                    return Ok(false);
                }
            },
        };

        let targets: BTreeMap<RedeemerPointer, RedeemerTarget> = compiled
            .pointers
            .iter()
            .map(|(target, pointer)| (*pointer, target.clone()))
            .collect();
        let mut changed = false;
        for result in evaluated {
            let pointer = result.pointer();
            let target = targets.get(&pointer).ok_or_else(|| {
                TxBuildError::MissingRedeemerTarget(format!("{:?} #{}", pointer.tag, pointer.index))
            })?;
            for draft in [&mut self.base, &mut self.draft] {
                if let Some(redeemer) = draft.witnesses.redeemers.get_mut(target) {
                    if redeemer.ex_units != result.ex_units {
                        redeemer.ex_units = result.ex_units;
                        changed = true;
                    }
                }
            }
        }
        debug!(changed, "evaluated execution units");
        Ok(changed)
    }

    /// Settle the fee for the evaluated budgets by adjusting the last change
    /// output, or rebalance from scratch when that output cannot absorb it
    fn settle_evaluated_fee(&mut self) -> Result<()> {
        let fees = self.context.fees();
        let encoding = self.context.config.cost_model_encoding;
        let old_fee = self.draft.fee;
        let new_fee = fees.draft_fee(&self.draft, encoding)?.total;

        let mut adjusted = self.draft.clone();
        adjusted.fee = new_fee;
        let absorbed = match adjusted.change_outputs.last_mut() {
            Some(last) => {
                let coin = last.coin() + old_fee - new_fee;
                if coin.is_negative() {
                    false
                } else {
                    last.value.set_coin(coin);
                    fees.is_deposit_safe(last)?
                }
            }
            None => false,
        };
        if absorbed && fees.draft_fee(&adjusted, encoding)?.total <= adjusted.fee {
            debug!(old_fee, new_fee, "adjusted last change output for evaluated fee");
            self.draft = adjusted;
            return Ok(());
        }

        debug!(old_fee, new_fee, "rebalancing for evaluated fee");
        self.rebalance()
    }

    fn recheck_collateral(&mut self) -> Result<()> {
        let required = self
            .context
            .fees()
            .required_collateral(self.draft.fee, self.context.config.collateral_amount);
        if self.draft.collateral.total.unwrap_or(0) >= required {
            return Ok(());
        }

        debug!(required, fee = self.draft.fee, "collateral below requirement, reselecting");
        self.base.collateral =
            select_collateral(self.context, self.draft.fee, &self.wallet.collateral)?;
        self.rebalance()?;

        let required = self
            .context
            .fees()
            .required_collateral(self.draft.fee, self.context.config.collateral_amount);
        let pledged = self.draft.collateral.total.unwrap_or(0);
        if pledged < required {
            return Err(TxBuildError::InsufficientBalance {
                asset: Asset::lovelace(),
                missing: BigInt::from(required - pledged),
                cause: InsufficientBalanceCause::Collateral,
            });
        }
        Ok(())
    }

    fn verify(&self) -> Result<()> {
        let params = &self.context.params;
        let fees = self.context.fees();
        let draft = &self.draft;

        if !draft.is_balanced(params) {
            return Err(TxBuildError::Unbalanced(format!(
                "{:?}",
                draft.balance_delta(params)
            )));
        }

        let outputs = draft
            .all_outputs()
            .chain(draft.collateral.return_output.iter());
        for (index, output) in outputs.enumerate() {
            output.value.ensure_non_negative()?;
            if !fees.is_deposit_safe(output)? {
                return Err(TxBuildError::OutputBelowMinimumDeposit {
                    index,
                    required: fees.min_deposit(output)?,
                    actual: output.coin(),
                });
            }
            let size = value_size(&output.value)?;
            if size > params.max_value_size as usize {
                return Err(TxBuildError::InvalidOutput(format!(
                    "output {} has a value of {} bytes, at most {} allowed",
                    index, size, params.max_value_size
                )));
            }
        }

        let units = draft.total_ex_units();
        let budget = &params.max_tx_ex_units;
        if units.mem > budget.mem || units.steps > budget.steps {
            return Err(TxBuildError::ExUnitsBudgetExceeded {
                mem: units.mem,
                steps: units.steps,
                max_mem: budget.mem,
                max_steps: budget.steps,
            });
        }

        let minimum = fees.draft_fee(draft, self.context.config.cost_model_encoding)?;
        if draft.fee < minimum.total {
            return Err(TxBuildError::InvalidTransaction(format!(
                "fee {} is below the minimum {}",
                draft.fee, minimum.total
            )));
        }
        Ok(())
    }

    fn serialize(&self) -> Result<BuiltTransaction> {
        let params = &self.context.params;
        let compiled = compile(&self.draft, params, self.context.config.cost_model_encoding)?;
        let size = compiled.estimated_size()?;
        if size > params.max_tx_size as usize {
            return Err(TxBuildError::TransactionTooLarge {
                size,
                max: params.max_tx_size,
            });
        }

        let bytes = compiled.transaction.to_bytes()?;
        let id = compiled.id()?;
        info!(
            tx_id = %id,
            fee = self.draft.fee,
            inputs = self.draft.inputs.len(),
            outputs = self.draft.outputs.len() + self.draft.change_outputs.len(),
            size = bytes.len(),
            "transaction built"
        );
        Ok(BuiltTransaction {
            id,
            bytes,
            fee: self.draft.fee,
            draft: self.draft.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::Hash;
    use crate::output::TxIn;
    use crate::provider::{EvaluatedRedeemer, StaticParameters};
    use crate::script::{ExUnits, PlutusVersion, RedeemerTag, ScriptSource};
    use crate::transaction::Transaction;
    use crate::serialization::ByteDeserialize;
    use async_trait::async_trait;

    fn key_address(seed: u8) -> Address {
        Address::enterprise(0, &Hash([seed; 28]))
    }

    fn utxo(id: u8, coin: u64) -> Utxo {
        Utxo::new(
            TxIn::new(Hash([id; 32]), 0),
            TxOut::new(key_address(1), Value::from_coin(coin)),
        )
    }

    fn unit_data() -> PlutusData {
        PlutusData::from_cbor(vec![0xd8, 0x79, 0x80]).unwrap()
    }

    fn params() -> ProtocolParameters {
        ProtocolParameters::default()
            .with_cost_model(PlutusVersion::V2, vec![1, 2, 3])
    }

    struct FixedEvaluator(ExUnits);

    #[async_trait]
    impl ExUnitsEvaluator for FixedEvaluator {
        async fn evaluate(
            &self,
            tx_bytes: &[u8],
            _utxos: &[Utxo],
        ) -> Result<Vec<EvaluatedRedeemer>> {
            let tx = Transaction::from_bytes(tx_bytes)?;
            Ok(tx
                .witness_set
                .redeemers
                .iter()
                .map(|r| EvaluatedRedeemer {
                    tag: r.pointer.tag,
                    index: r.pointer.index,
                    ex_units: self.0,
                })
                .collect())
        }
    }

    struct FailingEvaluator;

    #[async_trait]
    impl ExUnitsEvaluator for FailingEvaluator {
        async fn evaluate(&self, _: &[u8], _: &[Utxo]) -> Result<Vec<EvaluatedRedeemer>> {
            Err(TxBuildError::EvaluationError("script failed".to_string()))
        }
    }

    fn plutus_spend() -> (Utxo, ScriptWitness) {
        let script = Script::plutus(PlutusVersion::V2, vec![0x4d, 0x01, 0x00, 0x00]);
        let locked = Utxo::new(
            TxIn::new(Hash([7u8; 32]), 0),
            TxOut::new(
                Address::script_enterprise(0, &script.hash()),
                Value::from_coin(10_000_000u64),
            )
            .with_datum(DatumSource::Inline(unit_data())),
        );
        let witness = ScriptWitness::plutus(
            ScriptSource::Attached(script),
            unit_data(),
            ExUnits::new(500_000, 200_000_000),
        );
        (locked, witness)
    }

    #[test]
    fn test_materialize_applies_each_step_once() {
        let mut builder = TxBuilder::new(params())
            .pay_to(key_address(9), Value::from_coin(2_000_000u64));
        assert_eq!(builder.materialize().unwrap().outputs.len(), 1);

        builder.add_step(BuildStep::ValidUntil(1_000));
        let draft = builder.materialize().unwrap();
        assert_eq!(draft.outputs.len(), 1);
        assert_eq!(draft.validity.invalid_hereafter, Some(1_000));
    }

    #[test]
    fn test_failed_materialize_leaves_draft_untouched() {
        let mut builder = TxBuilder::new(params())
            .pay_to(key_address(9), Value::from_coin(2_000_000u64))
            .spend(utxo(1, 5_000_000))
            .spend(utxo(1, 5_000_000));
        assert!(builder.materialize().is_err());
        assert!(builder.draft().outputs.is_empty());
    }

    #[tokio::test]
    async fn test_simple_payment() {
        let wallet = WalletContext::new(vec![utxo(1, 5_000_000)], key_address(1));
        let mut builder = TxBuilder::new(params())
            .pay_to(key_address(9), Value::from_coin(2_000_000u64));
        let built = builder.build(&wallet, None).await.unwrap();

        let tx = Transaction::from_bytes(&built.bytes).unwrap();
        assert_eq!(tx.id().unwrap(), built.id);
        assert_eq!(tx.body.fee, built.fee);
        assert!(built.draft.is_balanced(builder.params()));
    }

    #[tokio::test]
    async fn test_from_provider() {
        let provider = StaticParameters::new(params()).unwrap();
        let builder = TxBuilder::from_provider(&provider).await.unwrap();
        assert_eq!(builder.params(), &params());
    }

    #[tokio::test]
    async fn test_errors_carry_a_snapshot() {
        let wallet = WalletContext::new(vec![utxo(1, 1_000_000)], key_address(1));
        let mut builder = TxBuilder::new(params())
            .pay_to(key_address(9), Value::from_coin(2_000_000u64));
        let err = builder.build(&wallet, None).await.unwrap_err();

        let snapshot = err.snapshot().unwrap();
        assert_eq!(snapshot.stage, "strategy");
        assert_eq!(snapshot.draft.outputs.len(), 1);
        assert!(matches!(
            err.root_cause(),
            TxBuildError::InsufficientBalance {
                cause: InsufficientBalanceCause::Inputs,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_script_spend_with_evaluation() {
        let (locked, witness) = plutus_spend();
        let wallet = WalletContext::new(vec![utxo(1, 20_000_000)], key_address(1))
            .with_collateral(vec![utxo(2, 8_000_000)]);
        let mut builder = TxBuilder::new(params())
            .spend_script(locked.clone(), witness)
            .pay_to(key_address(9), Value::from_coin(2_000_000u64));
        let evaluated = ExUnits::new(900_000, 300_000_000);
        let built = builder
            .build(&wallet, Some(&FixedEvaluator(evaluated)))
            .await
            .unwrap();

        let redeemer = &built.draft.witnesses.redeemers[&RedeemerTarget::Spend(locked.input)];
        assert_eq!(redeemer.ex_units, evaluated);
        assert!(!built.draft.collateral.is_empty());
        assert!(built.draft.is_balanced(builder.params()));

        let tx = Transaction::from_bytes(&built.bytes).unwrap();
        assert!(tx.body.script_data_hash.is_some());
        assert_eq!(tx.witness_set.redeemers[0].pointer.tag, RedeemerTag::Spend);
        assert_eq!(tx.witness_set.redeemers[0].ex_units, evaluated);
    }

    #[tokio::test]
    async fn test_evaluation_policy() {
        let (locked, witness) = plutus_spend();
        let wallet = WalletContext::new(vec![utxo(1, 20_000_000)], key_address(1))
            .with_collateral(vec![utxo(2, 8_000_000)]);

        let mut strict = TxBuilder::new(params()).spend_script(locked.clone(), witness.clone());
        let err = strict.build(&wallet, Some(&FailingEvaluator)).await.unwrap_err();
        assert!(matches!(err.root_cause(), TxBuildError::EvaluationError(_)));
        assert_eq!(err.snapshot().unwrap().stage, "evaluate");

        let config = BuilderConfig {
            evaluation_policy: EvaluationPolicy::KeepDeclared,
            ..BuilderConfig::default()
        };
        let mut lenient = TxBuilder::new(params())
            .config(config)
            .spend_script(locked.clone(), witness);
        let built = lenient.build(&wallet, Some(&FailingEvaluator)).await.unwrap();
        let redeemer = &built.draft.witnesses.redeemers[&RedeemerTarget::Spend(locked.input)];
        assert_eq!(redeemer.ex_units, ExUnits::new(500_000, 200_000_000));
    }

    #[tokio::test]
    async fn test_missing_collateral() {
        let (locked, witness) = plutus_spend();
        let wallet = WalletContext::new(vec![utxo(1, 20_000_000)], key_address(1));
        let mut builder = TxBuilder::new(params()).spend_script(locked, witness);
        let err = builder.build(&wallet, None).await.unwrap_err();
        assert_eq!(err.snapshot().unwrap().stage, "collateral");
        assert!(matches!(
            err.root_cause(),
            TxBuildError::InsufficientBalance {
                cause: InsufficientBalanceCause::Collateral,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_ex_units_budget() {
        let (locked, witness) = plutus_spend();
        let mut params = params();
        params.max_tx_ex_units.mem = 100_000;
        let wallet = WalletContext::new(vec![utxo(1, 20_000_000)], key_address(1))
            .with_collateral(vec![utxo(2, 8_000_000)]);
        let mut builder = TxBuilder::new(params).spend_script(locked, witness);
        let err = builder.build(&wallet, None).await.unwrap_err();
        assert_eq!(err.snapshot().unwrap().stage, "verify");
        assert!(matches!(
            err.root_cause(),
            TxBuildError::ExUnitsBudgetExceeded { max_mem: 100_000, .. }
        ));
    }

    #[tokio::test]
    async fn test_evaluated_fee_beyond_change_rebalances() {
        let (locked, _) = plutus_spend();
        let script = Script::plutus(PlutusVersion::V2, vec![0x4d, 0x01, 0x00, 0x00]);
        let witness = ScriptWitness::plutus(
            ScriptSource::Attached(script),
            unit_data(),
            ExUnits::new(0, 0),
        );
        let wallet = WalletContext::new(vec![utxo(1, 50_000_000)], key_address(1))
            .with_collateral(vec![utxo(2, 8_000_000)]);
        let mut builder = TxBuilder::new(params())
            .spend_script(locked.clone(), witness)
            .pay_to(key_address(9), Value::from_coin(8_500_000u64));

        let evaluated = ExUnits::new(14_000_000, 10_000_000_000);
        let built = builder
            .build(&wallet, Some(&FixedEvaluator(evaluated)))
            .await
            .unwrap();

        assert!(built.fee > 1_500_000, "fee {}", built.fee);
        assert_eq!(built.draft.inputs.len(), 2);
        assert!(built.draft.inputs.contains_key(&utxo(1, 50_000_000).input));
        let redeemer = &built.draft.witnesses.redeemers[&RedeemerTarget::Spend(locked.input)];
        assert_eq!(redeemer.ex_units, evaluated);
        assert!(built.draft.is_balanced(builder.params()));
        for output in built.draft.all_outputs() {
            assert!(!output.coin().is_negative());
        }
    }
}
