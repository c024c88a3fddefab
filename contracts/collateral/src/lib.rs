//! RToken Collateral
//!
//! Priced assets, collateral health tracking and the asset registry.
//!
//! ## Components
//!
//! - [`feed`]: external price-feed and exchange-rate capabilities
//! - [`asset`]: plain assets with oracle error, staleness and price decay
//! - [`collateral`]: the SOUND / IFFY / DISABLED state machine
//! - [`registry`]: the enumerable set of registered assets
//!
//! ## Usage
//!
//! ```rust,ignore
//! let feed = ManualFeed::new(Fix::from_int(1), now);
//! let usdc = Collateral::fiat(CollateralConfig::for_token(USDC, "USD"), Box::new(feed.clone()))?;
//! registry.register(usdc, now, &mut events)?;
//!
//! feed.set_price(Fix::percent(90), now);
//! registry.refresh_all(now, &mut events); // USDC is now IFFY
//! ```

pub mod feed;
pub mod asset;
pub mod collateral;
pub mod registry;

pub use feed::{FeedAnswer, FeedError, ManualFeed, ManualRate, PriceFeed, RateSource};
pub use asset::{Asset, AssetConfig, PriceCache};
pub use collateral::{Collateral, CollateralConfig, CollateralKind, CollateralState, StatusChange};
pub use registry::{AssetRegistry, RegisteredAsset};
