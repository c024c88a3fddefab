//! Protocol Events for the RToken Engine
//!
//! Events are emitted by every state mutation and can be indexed off-chain
//! for monitoring and analytics.

use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};

use crate::fixed::Fix;
use crate::types::{Address, CollateralStatus, TargetName, TokenId, TradeId, TradeKind};

/// Event types for indexing and filtering
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize,
)]
#[borsh(use_discriminant = true)]
#[repr(u8)]
pub enum EventType {
    // Registry Events (0x01 - 0x1F)
    AssetRegistered = 0x01,
    AssetUnregistered = 0x02,
    CollateralStatusChanged = 0x03,

    // Basket Events (0x20 - 0x3F)
    PrimeBasketSet = 0x20,
    BackupConfigSet = 0x21,
    BasketSet = 0x22,

    // Trading Events (0x40 - 0x5F)
    TradeStarted = 0x40,
    TradeBid = 0x41,
    TradeSettled = 0x42,
    BrokerDisabledSet = 0x43,

    // Supply Events (0x60 - 0x7F)
    Issuance = 0x60,
    Redemption = 0x61,
    Melted = 0x62,
}

/// Main event enum containing all engine events
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub enum RTokenEvent {
    // ============ Registry Events ============

    /// Emitted when an asset or collateral is registered (or swapped in)
    AssetRegistered {
        token: TokenId,
        is_collateral: bool,
        timestamp: u64,
    },

    /// Emitted when an asset is removed from the registry
    AssetUnregistered {
        token: TokenId,
        timestamp: u64,
    },

    /// Emitted when a collateral's refresh changes its status
    CollateralStatusChanged {
        token: TokenId,
        old_status: CollateralStatus,
        new_status: CollateralStatus,
        timestamp: u64,
    },

    // ============ Basket Events ============

    /// Emitted when governance sets the prime basket
    PrimeBasketSet {
        tokens: Vec<TokenId>,
        target_amts: Vec<Fix>,
        timestamp: u64,
    },

    /// Emitted when governance sets a backup configuration
    BackupConfigSet {
        target_name: TargetName,
        max: u32,
        tokens: Vec<TokenId>,
        timestamp: u64,
    },

    /// Emitted on every basket switch attempt; `disabled` when no basket could be set
    BasketSet {
        nonce: u64,
        tokens: Vec<TokenId>,
        ref_amts: Vec<Fix>,
        disabled: bool,
        timestamp: u64,
    },

    // ============ Trading Events ============

    /// Emitted when an auction starts
    TradeStarted {
        trade_id: TradeId,
        kind: TradeKind,
        sell: TokenId,
        buy: TokenId,
        sell_amount: u128,
        min_buy_amount: u128,
        timestamp: u64,
    },

    /// Emitted when a bid is accepted
    TradeBid {
        trade_id: TradeId,
        bidder: Address,
        sell_amount: u128,
        buy_amount: u128,
        timestamp: u64,
    },

    /// Emitted when a trade is settled
    TradeSettled {
        trade_id: TradeId,
        sell: TokenId,
        buy: TokenId,
        sold: u128,
        bought: u128,
        timestamp: u64,
    },

    /// Emitted when the broker is disabled or re-enabled
    BrokerDisabledSet {
        disabled: bool,
        timestamp: u64,
    },

    // ============ Supply Events ============

    /// Emitted when RToken is issued against collateral
    Issuance {
        account: Address,
        amount: u128,
        baskets: Fix,
        timestamp: u64,
    },

    /// Emitted when RToken is redeemed for collateral
    Redemption {
        account: Address,
        amount: u128,
        baskets: Fix,
        timestamp: u64,
    },

    /// Emitted when RToken supply is melted
    Melted {
        amount: u128,
        new_supply: u128,
        timestamp: u64,
    },
}

impl RTokenEvent {
    /// Discriminant used for indexing
    pub fn event_type(&self) -> EventType {
        match self {
            Self::AssetRegistered { .. } => EventType::AssetRegistered,
            Self::AssetUnregistered { .. } => EventType::AssetUnregistered,
            Self::CollateralStatusChanged { .. } => EventType::CollateralStatusChanged,
            Self::PrimeBasketSet { .. } => EventType::PrimeBasketSet,
            Self::BackupConfigSet { .. } => EventType::BackupConfigSet,
            Self::BasketSet { .. } => EventType::BasketSet,
            Self::TradeStarted { .. } => EventType::TradeStarted,
            Self::TradeBid { .. } => EventType::TradeBid,
            Self::TradeSettled { .. } => EventType::TradeSettled,
            Self::BrokerDisabledSet { .. } => EventType::BrokerDisabledSet,
            Self::Issuance { .. } => EventType::Issuance,
            Self::Redemption { .. } => EventType::Redemption,
            Self::Melted { .. } => EventType::Melted,
        }
    }

    /// When the mutation happened
    pub fn timestamp(&self) -> u64 {
        match self {
            Self::AssetRegistered { timestamp, .. }
            | Self::AssetUnregistered { timestamp, .. }
            | Self::CollateralStatusChanged { timestamp, .. }
            | Self::PrimeBasketSet { timestamp, .. }
            | Self::BackupConfigSet { timestamp, .. }
            | Self::BasketSet { timestamp, .. }
            | Self::TradeStarted { timestamp, .. }
            | Self::TradeBid { timestamp, .. }
            | Self::TradeSettled { timestamp, .. }
            | Self::BrokerDisabledSet { timestamp, .. }
            | Self::Issuance { timestamp, .. }
            | Self::Redemption { timestamp, .. }
            | Self::Melted { timestamp, .. } => *timestamp,
        }
    }

    /// Borsh encoding
    pub fn to_bytes(&self) -> Vec<u8> {
        borsh::to_vec(self).unwrap_or_default()
    }

    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        borsh::from_slice(bytes).ok()
    }
}

/// Events emitted by one entry point, in emission order
#[derive(Debug, Clone, Default)]
pub struct EventLog {
    events: Vec<RTokenEvent>,
}

impl EventLog {
    pub fn new() -> Self {
        Self { events: Vec::new() }
    }

    pub fn emit(&mut self, event: RTokenEvent) {
        log::trace!("event {:?}", event.event_type());
        self.events.push(event);
    }

    /// Append every event from another log
    pub fn extend(&mut self, other: EventLog) {
        self.events.extend(other.events);
    }

    pub fn events(&self) -> &[RTokenEvent] {
        &self.events
    }

    pub fn into_events(self) -> Vec<RTokenEvent> {
        self.events
    }

    /// Events of one type, in emission order
    pub fn filter_by_type(&self, event_type: EventType) -> Vec<&RTokenEvent> {
        self.events
            .iter()
            .filter(|e| e.event_type() == event_type)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}
