//! Supermarket Core - Shared types library.
//!
//! Value types shared by the storefront workflow and its tests:
//! - `OR05` / `OrderItem12` style sequential identifiers
//! - Decimal prices with a currency
//! - Product identifiers and the shopper's session identity
//!
//! Nothing here performs I/O; the knowledge-store client lives in
//! `supermarket-storefront`.
//!
//! # Modules
//!
//! - [`types`] - Identifiers, prices, and sessions

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod types;

pub use types::*;
