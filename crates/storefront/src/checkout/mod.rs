//! Checkout workflow.
//!
//! # Architecture
//!
//! [`OrderCoordinator::place_order`] drives one [`CheckoutAttempt`] through
//! its stages:
//!
//! 1. **Validating**: non-empty cart, logged-in user, customer entity, and
//!    live stock for every cart product ([`StockValidator`])
//! 2. **Allocating**: next order code and order-item ids ([`SequenceAllocator`])
//! 3. **Building**: stock arithmetic and the composite mutation ([`TransactionBuilder`])
//! 4. **Committing**: one conditional update request, then a read-back of the
//!    order ([`TransactionExecutor`])
//!
//! Any failure aborts the remaining stages. Nothing is written before
//! Committing, and the cart is cleared only after the order is found in the
//! store. If stock changed between Validating and Committing, the update
//! writes nothing and the attempt fails with a conflict.

mod customer;
mod executor;
mod sequence;
mod stage;
mod stock;
#[cfg(test)]
pub(crate) mod testing;
mod transaction;

use std::collections::BTreeSet;

use chrono::Utc;
use tracing::{Instrument, info, info_span, warn};
use uuid::Uuid;

use supermarket_core::{OrderNumber, Price, ProductId, SessionIdentity};

pub use customer::CustomerDirectory;
pub use executor::{CommitGuarantee, TransactionExecutor};
pub use sequence::SequenceAllocator;
pub use stage::{CheckoutAttempt, CheckoutStage};
pub use stock::{ProductStockFact, StockLevel, StockSnapshot, StockValidator};
pub use transaction::{
    CompositeMutation, Order, OrderItem, OrderRequest, StockReplacement, TransactionBuilder,
};

use crate::cart::{Cart, CartStore};
use crate::config::StorefrontConfig;
use crate::error::{self, CheckoutError, ValidationError};
use crate::session::SessionStore;
use crate::store::{KnowledgeStore, KnowledgeStoreClient, StoreError, Vocabulary};

/// Result of a successful checkout.
#[derive(Debug, Clone)]
pub struct OrderSummary {
    /// Correlation id of the attempt, also on its logs and Sentry events.
    pub checkout_id: Uuid,
    pub order: Order,
    pub total: Price,
    pub stock_changes: Vec<StockReplacement>,
    pub guarantee: CommitGuarantee,
}

impl OrderSummary {
    /// The new order's code, e.g. `OR05`.
    #[must_use]
    pub const fn order_code(&self) -> OrderNumber {
        self.order.code
    }
}

/// Orchestrates checkouts against a knowledge store.
pub struct OrderCoordinator<S> {
    store: S,
    vocab: Vocabulary,
    customers: CustomerDirectory,
    atomic_updates: bool,
}

impl OrderCoordinator<KnowledgeStoreClient> {
    /// Build a coordinator talking to the configured store over HTTP.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be initialized or the base
    /// IRI is invalid.
    pub fn from_config(config: &StorefrontConfig) -> Result<Self, StoreError> {
        let client = KnowledgeStoreClient::new(&config.store)?;
        let vocab = Vocabulary::new(&config.base_iri)
            .map_err(|e| StoreError::Malformed(e.to_string()))?;
        Ok(Self::new(client, vocab).with_atomic_updates(config.store.atomic_updates))
    }
}

impl<S: KnowledgeStore> OrderCoordinator<S> {
    /// A coordinator assuming all-or-nothing updates.
    #[must_use]
    pub fn new(store: S, vocab: Vocabulary) -> Self {
        Self {
            store,
            vocab,
            customers: CustomerDirectory::new(),
            atomic_updates: true,
        }
    }

    /// Set whether the store applies one update request all-or-nothing.
    #[must_use]
    pub const fn with_atomic_updates(mut self, atomic_updates: bool) -> Self {
        self.atomic_updates = atomic_updates;
        self
    }

    /// The backing store.
    #[must_use]
    pub const fn store(&self) -> &S {
        &self.store
    }

    /// The vocabulary orders are written with.
    #[must_use]
    pub const fn vocabulary(&self) -> &Vocabulary {
        &self.vocab
    }

    /// Turn the cart into a persisted order.
    ///
    /// On success the order, its items, and the stock changes are submitted
    /// in one update request and the cart is cleared. On failure the cart is
    /// left as it was.
    ///
    /// # Errors
    ///
    /// - [`CheckoutError::Validation`] for an empty cart, a missing session,
    ///   or insufficient stock. Nothing is written.
    /// - [`CheckoutError::Lookup`] if the user or a product is not in the store
    /// - [`CheckoutError::Network`] or [`CheckoutError::Store`] if a request
    ///   fails, including [`StoreError::Conflict`] when stock changed during
    ///   the attempt and nothing was written
    /// - [`CheckoutError::Allocation`] if no order number is left
    pub async fn place_order(
        &self,
        cart: &mut CartStore,
        session: Option<&SessionIdentity>,
    ) -> Result<OrderSummary, CheckoutError> {
        let mut attempt = CheckoutAttempt::start();
        let span = info_span!(
            "checkout",
            checkout_id = %attempt.id(),
            username = session.map(|s| s.username.as_str()),
        );

        async {
            sentry::configure_scope(|scope| {
                scope.set_tag("checkout_id", attempt.id());
            });

            let snapshot = cart.snapshot();
            match self.run(&mut attempt, &snapshot, session).await {
                Ok(summary) => {
                    attempt.advance(CheckoutStage::Succeeded);
                    cart.clear();
                    info!(
                        order_code = %summary.order.code,
                        total = %summary.total,
                        guarantee = ?summary.guarantee,
                        "Order placed"
                    );
                    Ok(summary)
                }
                Err(e) => {
                    warn!(stage = %attempt.stage(), "Checkout aborted");
                    attempt.advance(CheckoutStage::Failed);
                    error::report(&e);
                    Err(e)
                }
            }
        }
        .instrument(span)
        .await
    }

    /// [`Self::place_order`] for the user logged in to `sessions`.
    ///
    /// # Errors
    ///
    /// See [`Self::place_order`].
    pub async fn checkout(
        &self,
        cart: &mut CartStore,
        sessions: &SessionStore,
    ) -> Result<OrderSummary, CheckoutError> {
        self.place_order(cart, sessions.current()).await
    }

    async fn run(
        &self,
        attempt: &mut CheckoutAttempt,
        cart: &Cart,
        session: Option<&SessionIdentity>,
    ) -> Result<OrderSummary, CheckoutError> {
        if cart.is_empty() {
            return Err(ValidationError::EmptyCart.into());
        }
        let session = session.ok_or(ValidationError::MissingSession)?;

        attempt.advance(CheckoutStage::Validating);
        error::add_breadcrumb(
            "checkout",
            "Checkout started",
            Some(&[("lines", cart.lines().len().to_string().as_str())]),
        );
        let customer = self
            .customers
            .resolve(&self.store, &self.vocab, &session.username)
            .await?;
        let product_ids: BTreeSet<ProductId> = cart
            .lines()
            .iter()
            .map(|line| line.product_id.clone())
            .collect();
        let stock = StockValidator::new(&self.store, &self.vocab)
            .fetch_stock(&product_ids)
            .await?;

        attempt.advance(CheckoutStage::Allocating);
        let allocator = SequenceAllocator::new(&self.store, &self.vocab);
        let order_code = allocator.next_order_code().await?;
        let item_ids = allocator.next_order_item_ids(cart.lines().len()).await?;

        attempt.advance(CheckoutStage::Building);
        let mutation = TransactionBuilder::new(&self.vocab).build(
            OrderRequest {
                lines: cart.lines(),
                order_code,
                item_ids: &item_ids,
                customer: &customer,
                placed_at: Utc::now(),
            },
            &stock,
        )?;

        attempt.advance(CheckoutStage::Committing);
        let guarantee = TransactionExecutor::new(&self.store, &self.vocab, self.atomic_updates)
            .commit(&mutation)
            .await?;

        let CompositeMutation {
            order,
            stock_changes,
            ..
        } = mutation;
        Ok(OrderSummary {
            checkout_id: attempt.id(),
            total: Price::from_amount(order.total_price),
            order,
            stock_changes,
            guarantee,
        })
    }
}
