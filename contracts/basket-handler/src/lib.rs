//! RToken Basket Handler
//!
//! Basket selection and the canonical BU <-> token conversions every other
//! component uses.
//!
//! ## Key Operations
//!
//! - `set_prime_basket` / `set_backup_config`: governance templates
//! - `refresh_basket`: derive and commit the basket in force
//! - `quote`, `quantity`, `baskets_held_by`, `to_bus`, `from_bus`
//! - `status`, `is_ready`, `fully_collateralized`

pub mod basket;
pub mod handler;

pub use basket::{Basket, BasketEntry};
pub use handler::{BackupConfig, BasketHandler, BasketHandlerConfig, PrimeEntry};
