//! Core types for the supermarket storefront.
//!
//! This module provides type-safe wrappers for common domain concepts.

pub mod id;
pub mod price;
pub mod session;

pub use id::*;
pub use price::{CurrencyCode, Price};
pub use session::{SessionIdentity, UserRole};
