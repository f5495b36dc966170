//! Supermarket Storefront library.
//!
//! Cart management and order placement for a supermarket whose catalog,
//! customers, and orders live in a SPARQL knowledge store.
//!
//! # Architecture
//!
//! - [`cart`] and [`session`] hold the shopper's local state, persisted via [`local_state`]
//! - [`checkout`] turns a cart into an order with one write to the store
//! - [`store`] speaks the SPARQL 1.1 protocol over `reqwest`
//! - [`config`], [`error`], and [`telemetry`] are the ambient plumbing
//!
//! # Example
//!
//! ```rust,ignore
//! let config = StorefrontConfig::from_env()?;
//! let coordinator = OrderCoordinator::from_config(&config)?;
//! let state = LocalState::new(&config.state_dir);
//! let mut cart = CartStore::open(state.clone());
//! let sessions = SessionStore::open(state);
//!
//! match coordinator.checkout(&mut cart, &sessions).await {
//!     Ok(summary) => println!("Order {} placed", summary.order_code()),
//!     Err(e) => println!("{}", e.user_message()),
//! }
//! ```

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod cart;
pub mod checkout;
pub mod config;
pub mod error;
pub mod local_state;
pub mod session;
pub mod store;
pub mod telemetry;

pub use cart::{Cart, CartLine, CartStore, CatalogProduct};
pub use checkout::{CheckoutStage, CommitGuarantee, OrderCoordinator, OrderSummary};
pub use config::{ConfigError, KnowledgeStoreConfig, StorefrontConfig};
pub use error::{CheckoutError, LookupError, ValidationError};
pub use local_state::LocalState;
pub use session::SessionStore;
pub use store::{KnowledgeStore, KnowledgeStoreClient, StoreError};
