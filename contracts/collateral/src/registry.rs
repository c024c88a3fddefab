//! Asset Registry
//!
//! Owned, enumerable set of registered assets. Iteration order is
//! registration order; swapping an asset keeps its slot.

use rtoken_common::constants::collateral::MAX_REGISTERED_ASSETS;
use rtoken_common::{
    check, short_hex, CollateralStatus, EventLog, Fix, Price, RTokenError, RTokenEvent,
    RTokenResult, TargetName, TokenId,
};

use crate::asset::Asset;
use crate::collateral::{Collateral, StatusChange};

/// Either kind of registered asset
#[derive(Debug)]
pub enum RegisteredAsset {
    Asset(Asset),
    Collateral(Collateral),
}

impl From<Asset> for RegisteredAsset {
    fn from(asset: Asset) -> Self {
        RegisteredAsset::Asset(asset)
    }
}

impl From<Collateral> for RegisteredAsset {
    fn from(collateral: Collateral) -> Self {
        RegisteredAsset::Collateral(collateral)
    }
}

impl RegisteredAsset {
    pub fn token(&self) -> TokenId {
        match self {
            RegisteredAsset::Asset(asset) => asset.token(),
            RegisteredAsset::Collateral(coll) => coll.token(),
        }
    }

    pub fn decimals(&self) -> u8 {
        match self {
            RegisteredAsset::Asset(asset) => asset.decimals(),
            RegisteredAsset::Collateral(coll) => coll.decimals(),
        }
    }

    pub fn max_trade_volume(&self) -> Fix {
        match self {
            RegisteredAsset::Asset(asset) => asset.max_trade_volume(),
            RegisteredAsset::Collateral(coll) => coll.max_trade_volume(),
        }
    }

    /// Price range of one whole token
    pub fn price(&self, now: u64) -> Price {
        match self {
            RegisteredAsset::Asset(asset) => asset.price(now),
            RegisteredAsset::Collateral(coll) => coll.price(now),
        }
    }

    pub fn is_collateral(&self) -> bool {
        matches!(self, RegisteredAsset::Collateral(_))
    }

    pub fn as_collateral(&self) -> Option<&Collateral> {
        match self {
            RegisteredAsset::Collateral(coll) => Some(coll),
            RegisteredAsset::Asset(_) => None,
        }
    }

    /// Target name, for collateral only
    pub fn target_name(&self) -> Option<TargetName> {
        self.as_collateral().map(Collateral::target_name)
    }

    fn refresh(&mut self, now: u64) -> Option<StatusChange> {
        match self {
            RegisteredAsset::Asset(asset) => {
                asset.refresh(now);
                None
            }
            RegisteredAsset::Collateral(coll) => coll.refresh(now),
        }
    }
}

/// Registered assets in registration order
#[derive(Debug, Default)]
pub struct AssetRegistry {
    assets: Vec<RegisteredAsset>,
}

impl AssetRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.assets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.assets.is_empty()
    }

    fn position(&self, token: &TokenId) -> Option<usize> {
        self.assets.iter().position(|asset| asset.token() == *token)
    }

    pub fn is_registered(&self, token: &TokenId) -> bool {
        self.position(token).is_some()
    }

    /// Registers a new asset at the end of the iteration order
    pub fn register(
        &mut self,
        asset: impl Into<RegisteredAsset>,
        now: u64,
        events: &mut EventLog,
    ) -> RTokenResult<()> {
        let asset = asset.into();
        let token = asset.token();
        check!(!self.is_registered(&token), RTokenError::AssetAlreadyRegistered { token });
        check!(
            self.assets.len() < MAX_REGISTERED_ASSETS,
            RTokenError::RegistryFull { count: self.assets.len(), max: MAX_REGISTERED_ASSETS }
        );

        log::info!("registered asset {} (collateral: {})", short_hex(&token), asset.is_collateral());
        events.emit(RTokenEvent::AssetRegistered {
            token,
            is_collateral: asset.is_collateral(),
            timestamp: now,
        });
        self.assets.push(asset);
        Ok(())
    }

    /// Replaces the asset registered for the same token, keeping its slot.
    /// A swapped-in collateral starts fresh.
    pub fn swap_registered(
        &mut self,
        asset: impl Into<RegisteredAsset>,
        now: u64,
        events: &mut EventLog,
    ) -> RTokenResult<RegisteredAsset> {
        let asset = asset.into();
        let token = asset.token();
        let index = self.position(&token).ok_or(RTokenError::AssetNotRegistered { token })?;

        log::info!("swapped asset {}", short_hex(&token));
        events.emit(RTokenEvent::AssetUnregistered { token, timestamp: now });
        events.emit(RTokenEvent::AssetRegistered {
            token,
            is_collateral: asset.is_collateral(),
            timestamp: now,
        });
        Ok(std::mem::replace(&mut self.assets[index], asset))
    }

    /// Removes an asset; later assets keep their relative order
    pub fn unregister(
        &mut self,
        token: &TokenId,
        now: u64,
        events: &mut EventLog,
    ) -> RTokenResult<RegisteredAsset> {
        let index = self.position(token).ok_or(RTokenError::AssetNotRegistered { token: *token })?;
        log::info!("unregistered asset {}", short_hex(token));
        events.emit(RTokenEvent::AssetUnregistered { token: *token, timestamp: now });
        Ok(self.assets.remove(index))
    }

    pub fn to_asset(&self, token: &TokenId) -> RTokenResult<&RegisteredAsset> {
        self.assets
            .iter()
            .find(|asset| asset.token() == *token)
            .ok_or(RTokenError::AssetNotRegistered { token: *token })
    }

    pub fn to_collateral(&self, token: &TokenId) -> RTokenResult<&Collateral> {
        self.to_asset(token)?
            .as_collateral()
            .ok_or(RTokenError::NotCollateral { token: *token })
    }

    /// Status of a token; unregistered or non-collateral counts as DISABLED
    pub fn status_of(&self, token: &TokenId) -> CollateralStatus {
        self.to_collateral(token)
            .map(Collateral::status)
            .unwrap_or(CollateralStatus::Disabled)
    }

    /// Registered tokens in registration order
    pub fn erc20s(&self) -> Vec<TokenId> {
        self.assets.iter().map(RegisteredAsset::token).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &RegisteredAsset> {
        self.assets.iter()
    }

    /// Refreshes one asset
    pub fn refresh(&mut self, token: &TokenId, now: u64, events: &mut EventLog) -> RTokenResult<()> {
        let index = self.position(token).ok_or(RTokenError::AssetNotRegistered { token: *token })?;
        if let Some(change) = self.assets[index].refresh(now) {
            emit_change(change, now, events);
        }
        Ok(())
    }

    /// Refreshes every asset in registration order
    pub fn refresh_all(&mut self, now: u64, events: &mut EventLog) {
        for asset in &mut self.assets {
            if let Some(change) = asset.refresh(now) {
                emit_change(change, now, events);
            }
        }
    }
}

fn emit_change(change: StatusChange, now: u64, events: &mut EventLog) {
    events.emit(RTokenEvent::CollateralStatusChanged {
        token: change.token,
        old_status: change.old,
        new_status: change.new,
        timestamp: now,
    });
}
