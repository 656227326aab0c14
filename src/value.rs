//! Multi-asset values
//!
//! A [`Value`] maps assets to arbitrary-precision signed amounts. The native
//! coin (lovelace) is the asset with no policy and an empty name. All
//! collections are ordered by [`Asset`], which is the order the canonical
//! encoding requires.

use std::collections::BTreeMap;
use std::fmt;
use std::io::Cursor;

use num_bigint::{BigInt, Sign};
use num_traits::{Signed, ToPrimitive, Zero};

use crate::error::{Result, TxBuildError};
use crate::hash::ScriptHash;
use crate::serialization::{
    decode_bytes, decode_int, encode_array_len, encode_bigint, encode_bytes, encode_map_len,
    encode_uint, helpers, peek_major, ByteDeserialize, ByteSerialize, MAJOR_ARRAY,
    MAJOR_UNSIGNED,
};

/// Minting policies are identified by the hash of their script
pub type PolicyId = ScriptHash;

pub const MAX_ASSET_NAME_LENGTH: usize = 32;

/// Asset name within a policy, 0 to 32 raw bytes
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct AssetName(Vec<u8>);

impl AssetName {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Result<Self> {
        let bytes = bytes.into();
        if bytes.len() > MAX_ASSET_NAME_LENGTH {
            return Err(TxBuildError::InvalidAsset(format!(
                "asset name is {} bytes, at most {} allowed",
                bytes.len(),
                MAX_ASSET_NAME_LENGTH
            )));
        }
        Ok(Self(bytes))
    }

    pub fn empty() -> Self {
        Self(Vec::new())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for AssetName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match std::str::from_utf8(&self.0) {
            Ok(text) if !text.is_empty() => write!(f, "AssetName({:?})", text),
            _ => write!(f, "AssetName(0x{})", hex::encode(&self.0)),
        }
    }
}

impl fmt::Display for AssetName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(&self.0))
    }
}

/// An asset class: the native coin or a `(policy, name)` pair
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct Asset {
    policy_id: Option<PolicyId>,
    name: AssetName,
}

impl Asset {
    pub fn lovelace() -> Self {
        Self {
            policy_id: None,
            name: AssetName::empty(),
        }
    }

    pub fn new(policy_id: PolicyId, name: AssetName) -> Self {
        Self {
            policy_id: Some(policy_id),
            name,
        }
    }

    pub fn is_lovelace(&self) -> bool {
        self.policy_id.is_none()
    }

    pub fn policy_id(&self) -> Option<&PolicyId> {
        self.policy_id.as_ref()
    }

    pub fn name(&self) -> &AssetName {
        &self.name
    }
}

impl fmt::Display for Asset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.policy_id {
            None => f.write_str("lovelace"),
            Some(policy) => write!(f, "{}.{}", policy, self.name),
        }
    }
}

/// Multi-asset quantity with arbitrary-precision signed amounts
#[derive(Clone, Default)]
pub struct Value {
    amounts: BTreeMap<Asset, BigInt>,
}

impl Value {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_coin(coin: impl Into<BigInt>) -> Self {
        let mut value = Self::new();
        value.set(Asset::lovelace(), coin);
        value
    }

    pub fn from_asset(asset: Asset, amount: impl Into<BigInt>) -> Self {
        let mut value = Self::new();
        value.set(asset, amount);
        value
    }

    /// Builder-style variant of [`Value::add`]
    pub fn with_asset(mut self, asset: Asset, amount: impl Into<BigInt>) -> Self {
        self.add(asset, amount);
        self
    }

    pub fn get(&self, asset: &Asset) -> BigInt {
        self.amounts.get(asset).cloned().unwrap_or_default()
    }

    pub fn coin(&self) -> BigInt {
        self.get(&Asset::lovelace())
    }

    /// The coin amount as an on-ledger quantity
    pub fn coin_u64(&self) -> Result<u64> {
        let coin = self.coin();
        coin.to_u64().ok_or_else(|| {
            TxBuildError::InvalidOutput(format!("coin amount {} is not a valid u64", coin))
        })
    }

    pub fn set(&mut self, asset: Asset, amount: impl Into<BigInt>) {
        self.amounts.insert(asset, amount.into());
    }

    pub fn set_coin(&mut self, coin: impl Into<BigInt>) {
        self.set(Asset::lovelace(), coin);
    }

    pub fn add(&mut self, asset: Asset, amount: impl Into<BigInt>) {
        *self.amounts.entry(asset).or_default() += amount.into();
    }

    pub fn subtract(&mut self, asset: Asset, amount: impl Into<BigInt>) {
        *self.amounts.entry(asset).or_default() -= amount.into();
    }

    pub fn remove(&mut self, asset: &Asset) -> Option<BigInt> {
        self.amounts.remove(asset)
    }

    pub fn add_all(&mut self, other: &Value) {
        for (asset, amount) in &other.amounts {
            *self.amounts.entry(asset.clone()).or_default() += amount;
        }
    }

    pub fn subtract_all(&mut self, other: &Value) {
        for (asset, amount) in &other.amounts {
            *self.amounts.entry(asset.clone()).or_default() -= amount;
        }
    }

    /// Drop every entry whose amount is zero
    pub fn trim(&mut self) {
        self.amounts.retain(|_, amount| !amount.is_zero());
    }

    pub fn trimmed(mut self) -> Self {
        self.trim();
        self
    }

    /// Non-zero entries in asset order
    pub fn flatten(&self) -> Vec<(Asset, BigInt)> {
        self.iter()
            .map(|(asset, amount)| (asset.clone(), amount.clone()))
            .collect()
    }

    /// Non-zero entries in asset order
    pub fn iter(&self) -> impl Iterator<Item = (&Asset, &BigInt)> {
        self.amounts.iter().filter(|(_, amount)| !amount.is_zero())
    }

    /// Non-zero native-token entries in asset order
    pub fn tokens(&self) -> impl Iterator<Item = (&Asset, &BigInt)> {
        self.iter().filter(|(asset, _)| !asset.is_lovelace())
    }

    pub fn token_count(&self) -> usize {
        self.tokens().count()
    }

    pub fn is_zero(&self) -> bool {
        self.iter().next().is_none()
    }

    pub fn is_ada_only(&self) -> bool {
        self.tokens().next().is_none()
    }

    pub fn has_native_tokens(&self) -> bool {
        !self.is_ada_only()
    }

    pub fn is_non_negative(&self) -> bool {
        self.amounts.values().all(|amount| !amount.is_negative())
    }

    /// True when there is at least one entry and every non-zero entry is positive
    pub fn is_positive(&self) -> bool {
        !self.is_zero() && self.is_non_negative()
    }

    /// True iff `self` holds at least `other` of every asset `other` mentions
    pub fn can_cover(&self, other: &Value) -> bool {
        other
            .amounts
            .iter()
            .all(|(asset, amount)| self.get(asset) >= *amount)
    }

    /// The first asset with a negative amount, in asset order
    pub fn first_negative(&self) -> Option<(Asset, BigInt)> {
        self.amounts
            .iter()
            .find(|(_, amount)| amount.is_negative())
            .map(|(asset, amount)| (asset.clone(), amount.clone()))
    }

    /// Entries with a positive amount
    pub fn positive_part(&self) -> Value {
        Value {
            amounts: self
                .amounts
                .iter()
                .filter(|(_, amount)| amount.is_positive())
                .map(|(asset, amount)| (asset.clone(), amount.clone()))
                .collect(),
        }
    }

    /// Non-zero token entries grouped by policy
    pub fn by_policy(&self) -> BTreeMap<PolicyId, BTreeMap<AssetName, BigInt>> {
        let mut grouped: BTreeMap<PolicyId, BTreeMap<AssetName, BigInt>> = BTreeMap::new();
        for (asset, amount) in self.tokens() {
            if let Some(policy) = asset.policy_id() {
                grouped
                    .entry(*policy)
                    .or_default()
                    .insert(asset.name().clone(), amount.clone());
            }
        }
        grouped
    }

    /// Only the native-token entries of this value
    pub fn tokens_only(&self) -> Value {
        Value {
            amounts: self
                .tokens()
                .map(|(asset, amount)| (asset.clone(), amount.clone()))
                .collect(),
        }
    }

    /// Fail unless every amount is zero or positive
    pub fn ensure_non_negative(&self) -> Result<()> {
        match self.first_negative() {
            Some((asset, amount)) => Err(TxBuildError::InvalidOutput(format!(
                "negative amount {} of {}",
                amount, asset
            ))),
            None => Ok(()),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.iter().eq(other.iter())
    }
}

impl Eq for Value {}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(self.iter().map(|(asset, amount)| (asset.to_string(), amount.to_string())))
            .finish()
    }
}

impl From<u64> for Value {
    fn from(coin: u64) -> Self {
        Value::from_coin(coin)
    }
}

fn encode_multiasset(value: &Value, writer: &mut Vec<u8>) -> Result<()> {
    let grouped = value.by_policy();
    encode_map_len(grouped.len(), writer)?;
    for (policy, assets) in &grouped {
        encode_bytes(policy.as_bytes(), writer)?;
        encode_map_len(assets.len(), writer)?;
        for (name, amount) in assets {
            encode_bytes(name.as_bytes(), writer)?;
            encode_bigint(amount, writer)?;
        }
    }
    Ok(())
}

fn decode_multiasset(cursor: &mut Cursor<&[u8]>, value: &mut Value) -> Result<()> {
    helpers::decode_map(cursor, |cursor| {
        let policy = PolicyId::deserialize_bytes(cursor)?;
        helpers::decode_map(cursor, |cursor| {
            let name = AssetName::new(decode_bytes(cursor)?)?;
            let amount = decode_int(cursor)?;
            value.add(Asset::new(policy, name), amount);
            Ok(())
        })
    })
}

/// Output value: a bare coin, or `[coin, multiasset]` when tokens are present
impl ByteSerialize for Value {
    fn serialize_bytes(&self, writer: &mut Vec<u8>) -> Result<()> {
        self.ensure_non_negative()?;
        let coin = self.coin_u64()?;
        if self.is_ada_only() {
            return encode_uint(coin, writer);
        }
        encode_array_len(2, writer)?;
        encode_uint(coin, writer)?;
        encode_multiasset(self, writer)
    }
}

impl ByteDeserialize for Value {
    fn deserialize_bytes(cursor: &mut Cursor<&[u8]>) -> Result<Self> {
        match peek_major(cursor)? {
            MAJOR_UNSIGNED => Ok(Value::from_coin(decode_int(cursor)?)),
            MAJOR_ARRAY => {
                helpers::expect_array_len(cursor, 2)?;
                let mut value = Value::from_coin(decode_int(cursor)?);
                decode_multiasset(cursor, &mut value)?;
                Ok(value.trimmed())
            }
            other => Err(TxBuildError::DeserializationError(format!(
                "expected value, found major type {}",
                other
            ))),
        }
    }
}

/// Encode a signed mint map; the native coin cannot be minted
pub fn encode_mint(mint: &Value, writer: &mut Vec<u8>) -> Result<()> {
    if !mint.coin().is_zero() {
        return Err(TxBuildError::InvalidAsset(
            "the native coin cannot be minted".to_string(),
        ));
    }
    encode_multiasset(mint, writer)
}

pub fn decode_mint(cursor: &mut Cursor<&[u8]>) -> Result<Value> {
    let mut mint = Value::new();
    decode_multiasset(cursor, &mut mint)?;
    Ok(mint.trimmed())
}

/// Number of bytes in the value's output encoding
pub fn value_size(value: &Value) -> Result<usize> {
    value.byte_size()
}

/// Sign-aware amount as u64, for quantities already checked non-negative
pub fn to_coin(amount: &BigInt) -> Result<u64> {
    if amount.sign() == Sign::Minus {
        return Err(TxBuildError::InvalidOutput(format!(
            "negative coin amount {}",
            amount
        )));
    }
    amount.to_u64().ok_or_else(|| {
        TxBuildError::InvalidOutput(format!("coin amount {} overflows u64", amount))
    })
}
