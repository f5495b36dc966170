//! Submits the composite mutation.
//!
//! The whole checkout is one conditional update request. A store accepts it
//! even when the condition no longer holds and then writes nothing, so the
//! executor reads the order back after every write. A missing order is a
//! [`StoreError::Conflict`] and the caller keeps the cart.
//!
//! Whether the store applies one request all-or-nothing depends on the store;
//! `KNOWLEDGE_STORE_ATOMIC_UPDATES` records what the deployment guarantees.
//! Without that guarantee the executor also re-reads stock and reports
//! whether every replacement landed.

use std::collections::BTreeSet;

use tracing::{info, instrument, warn};

use supermarket_core::ProductId;

use super::stock::StockValidator;
use super::transaction::{CompositeMutation, Order, StockReplacement};
use crate::error::CheckoutError;
use crate::store::{KnowledgeStore, SelectQuery, StoreError, Triple, Var, Vocabulary};

const CODE: Var = Var("code");

/// What the caller may assume about a committed checkout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitGuarantee {
    /// The store applies one update request all-or-nothing.
    Atomic,
    /// The store may apply part of a request. `verified` is true when a
    /// read-back found every stock replacement in place.
    BestEffort { verified: bool },
    /// The write was accepted but the order could not be read back. It is
    /// most likely in place; resubmitting may duplicate it.
    Unconfirmed,
}

/// Sends the single write request of a checkout.
pub struct TransactionExecutor<'a, S> {
    store: &'a S,
    vocab: &'a Vocabulary,
    atomic_updates: bool,
}

impl<'a, S: KnowledgeStore> TransactionExecutor<'a, S> {
    #[must_use]
    pub const fn new(store: &'a S, vocab: &'a Vocabulary, atomic_updates: bool) -> Self {
        Self {
            store,
            vocab,
            atomic_updates,
        }
    }

    /// Submit `mutation` as one request and confirm the order exists.
    ///
    /// A failed read-back does not fail the commit: the write was accepted,
    /// and reporting failure would invite a duplicate order.
    ///
    /// # Errors
    ///
    /// - A network or store error if the update request fails
    /// - [`StoreError::Conflict`] if the request was accepted but the order is
    ///   not in the store, because stock changed after it was read
    #[instrument(skip_all, fields(order_code = %mutation.order.code))]
    pub async fn commit(
        &self,
        mutation: &CompositeMutation,
    ) -> Result<CommitGuarantee, CheckoutError> {
        self.store.update(&mutation.request).await?;

        match self.order_exists(&mutation.order).await {
            Ok(true) => {}
            Ok(false) => {
                warn!("Stock changed after it was read; nothing was written");
                return Err(StoreError::Conflict(format!(
                    "order {} not written, stock changed after it was read",
                    mutation.order.code
                ))
                .into());
            }
            Err(e) => {
                warn!(error = %e, "Order read-back failed");
                return Ok(CommitGuarantee::Unconfirmed);
            }
        }
        info!(
            items = mutation.order.items.len(),
            products = mutation.stock_changes.len(),
            "Order written"
        );

        if self.atomic_updates {
            return Ok(CommitGuarantee::Atomic);
        }

        let verified = self.verify(&mutation.stock_changes).await;
        if !verified {
            warn!("Stock read-back does not match the committed order");
        }
        Ok(CommitGuarantee::BestEffort { verified })
    }

    async fn order_exists(&self, order: &Order) -> Result<bool, StoreError> {
        let query = SelectQuery::builder("OrderPlaced")
            .var(CODE)
            .pattern(Triple::new(&order.entity, &self.vocab.has_order_id, CODE))
            .build();
        let solutions = self.store.select(&query).await?;
        let code = order.code.code();
        Ok(solutions
            .rows
            .iter()
            .any(|row| row.value(CODE.0).is_ok_and(|stored| stored == code)))
    }

    async fn verify(&self, changes: &[StockReplacement]) -> bool {
        let ids: BTreeSet<ProductId> = changes.iter().map(|c| c.product_id.clone()).collect();
        let snapshot = match StockValidator::new(self.store, self.vocab)
            .fetch_stock(&ids)
            .await
        {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!(error = %e, "Stock read-back failed");
                return false;
            }
        };

        changes.iter().all(|change| {
            let found = snapshot.get(&change.product_id).map(|fact| fact.level);
            if found == Some(change.after) {
                return true;
            }
            warn!(
                product_id = %change.product_id,
                expected = change.after.stock,
                found = ?found,
                "Stock replacement not applied"
            );
            false
        })
    }
}
