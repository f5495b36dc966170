//! Next free order and order-item identifiers.
//!
//! Identifiers are derived by scanning the orders and order items already in
//! the store and taking the numeric maximum plus one. Both the stored codes
//! and the numbers in the entity IRIs count, so an `Order5` entity carrying a
//! non-conforming code still reserves 5.
//!
//! Nothing reserves the result, so two checkouts that allocate concurrently
//! can receive the same identifiers. The composite write does not detect
//! this either: inserting into an existing order entity merges the two
//! orders. The same happens for an entity named like `Order5` that is not
//! typed as an order, since the scan only sees typed entities. Callers that
//! may run concurrently must serialize checkouts themselves.

use tracing::{debug, instrument, warn};

use supermarket_core::{OrderItemNumber, OrderNumber, SequenceIdError};

use crate::error::CheckoutError;
use crate::store::{Iri, KnowledgeStore, SelectQuery, Solutions, Term, Triple, Var, Vocabulary};

const ORDER: Var = Var("order");
const CODE: Var = Var("code");
const ITEM: Var = Var("item");
const ITEM_ID: Var = Var("itemId");

/// Derives identifiers from the identifiers already stored.
pub struct SequenceAllocator<'a, S> {
    store: &'a S,
    vocab: &'a Vocabulary,
}

impl<'a, S: KnowledgeStore> SequenceAllocator<'a, S> {
    #[must_use]
    pub const fn new(store: &'a S, vocab: &'a Vocabulary) -> Self {
        Self { store, vocab }
    }

    /// The order code after the highest stored one, or `OR01` if there is none.
    ///
    /// Stored codes that do not parse are skipped; the entity IRI of such an
    /// order still counts.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails or the sequence is exhausted.
    #[instrument(skip_all)]
    pub async fn next_order_code(&self) -> Result<OrderNumber, CheckoutError> {
        let query = SelectQuery::builder("OrderCodes")
            .var(ORDER)
            .var(CODE)
            .pattern(Triple::new(ORDER, Term::Type, &self.vocab.order))
            .pattern(Triple::new(ORDER, &self.vocab.has_order_id, CODE))
            .build();
        let solutions = self.store.select(&query).await?;

        let by_entity = highest_entity(&solutions, ORDER, |iri| self.vocab.order_number_of(iri));
        let next = match highest(&solutions, CODE, OrderNumber::parse_code).max(by_entity) {
            Some(max) => max.next().map_err(CheckoutError::Allocation)?,
            None => OrderNumber::first(),
        };
        debug!(order_code = %next, "Order code allocated");
        Ok(next)
    }

    /// `count` consecutive order-item ids after the highest stored one.
    ///
    /// Starts at `OrderItem1` if there is none. Stored ids that do not parse
    /// are skipped.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails or the sequence is exhausted.
    #[instrument(skip(self))]
    pub async fn next_order_item_ids(
        &self,
        count: usize,
    ) -> Result<Vec<OrderItemNumber>, CheckoutError> {
        if count == 0 {
            return Ok(Vec::new());
        }

        let query = SelectQuery::builder("OrderItemIds")
            .var(ITEM)
            .var(ITEM_ID)
            .pattern(Triple::new(ITEM, Term::Type, &self.vocab.order_item))
            .pattern(Triple::new(ITEM, &self.vocab.has_order_item_id, ITEM_ID))
            .build();
        let solutions = self.store.select(&query).await?;

        let by_entity =
            highest_entity(&solutions, ITEM, |iri| self.vocab.order_item_number_of(iri));
        let first = match highest(&solutions, ITEM_ID, OrderItemNumber::parse_code).max(by_entity) {
            Some(max) => max.next().map_err(CheckoutError::Allocation)?,
            None => OrderItemNumber::first(),
        };

        let mut next = first;
        let mut ids = Vec::with_capacity(count);
        for i in 0..count {
            ids.push(next);
            if i + 1 < count {
                next = next.next().map_err(CheckoutError::Allocation)?;
            }
        }
        debug!(first = %first, count, "Order item ids allocated");
        Ok(ids)
    }
}

/// Numeric maximum of the identifiers bound to `var`, skipping unparsable ones.
fn highest<T: Ord + Copy>(
    solutions: &Solutions,
    var: Var,
    parse: impl Fn(&str) -> Result<T, SequenceIdError>,
) -> Option<T> {
    solutions
        .rows
        .iter()
        .filter_map(|row| {
            let raw = row.value(var.0).ok()?;
            match parse(raw.trim()) {
                Ok(id) => Some(id),
                Err(e) => {
                    warn!(value = raw, error = %e, "Skipping unparsable stored identifier");
                    None
                }
            }
        })
        .max()
}

/// Numeric maximum of the entity IRIs bound to `var` that follow the naming
/// convention.
fn highest_entity<T: Ord>(
    solutions: &Solutions,
    var: Var,
    number: impl Fn(&Iri) -> Option<T>,
) -> Option<T> {
    solutions
        .rows
        .iter()
        .filter_map(|row| row.iri(var.0).ok())
        .filter_map(|iri| number(&iri))
        .max()
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use crate::checkout::testing::{ScriptedStore, code_rows, row, solutions, typed, uri};

    #[tokio::test]
    async fn test_first_order_code_on_empty_store() {
        let vocab = Vocabulary::default();
        let store = ScriptedStore::new();

        let code = SequenceAllocator::new(&store, &vocab)
            .next_order_code()
            .await
            .unwrap();
        assert_eq!(code.code(), "OR01");
    }

    #[tokio::test]
    async fn test_order_code_uses_numeric_maximum() {
        let vocab = Vocabulary::default();
        let store = ScriptedStore::new().on_select(
            "OrderCodes",
            code_rows("code", &["OR09", "OR10", "OR02", "ORx", "legacy-7"]),
        );

        let code = SequenceAllocator::new(&store, &vocab)
            .next_order_code()
            .await
            .unwrap();
        assert_eq!(code.code(), "OR11");
    }

    #[tokio::test]
    async fn test_entity_number_counts_when_code_is_legacy() {
        let vocab = Vocabulary::default();
        let order5 = vocab.order_entity(OrderNumber::new(5)).unwrap();
        let item9 = vocab.order_item_entity(OrderItemNumber::new(9)).unwrap();
        let store = ScriptedStore::new()
            .on_select(
                "OrderCodes",
                solutions(vec![
                    row(vec![("order", uri(order5.as_str())), ("code", typed("A-0005", "string"))]),
                    row(vec![
                        ("order", uri(vocab.base.join("Order2").unwrap().as_str())),
                        ("code", typed("OR02", "string")),
                    ]),
                ]),
            )
            .on_select(
                "OrderItemIds",
                solutions(vec![row(vec![
                    ("item", uri(item9.as_str())),
                    ("itemId", typed("line-9", "string")),
                ])]),
            );
        let allocator = SequenceAllocator::new(&store, &vocab);

        assert_eq!(allocator.next_order_code().await.unwrap().code(), "OR06");
        assert_eq!(
            allocator.next_order_item_ids(1).await.unwrap(),
            [OrderItemNumber::new(10)]
        );
    }

    #[tokio::test]
    async fn test_order_code_grows_past_two_digits() {
        let vocab = Vocabulary::default();
        let store = ScriptedStore::new().on_select("OrderCodes", code_rows("code", &["OR99"]));

        let code = SequenceAllocator::new(&store, &vocab)
            .next_order_code()
            .await
            .unwrap();
        assert_eq!(code.code(), "OR100");
    }

    #[tokio::test]
    async fn test_item_ids_are_consecutive() {
        let vocab = Vocabulary::default();
        let store = ScriptedStore::new().on_select(
            "OrderItemIds",
            code_rows("itemId", &["OrderItem3", "OrderItem12", "OrderItem7"]),
        );

        let ids = SequenceAllocator::new(&store, &vocab)
            .next_order_item_ids(3)
            .await
            .unwrap();
        let codes: Vec<String> = ids.iter().map(OrderItemNumber::code).collect();
        assert_eq!(codes, ["OrderItem13", "OrderItem14", "OrderItem15"]);
    }

    #[tokio::test]
    async fn test_item_ids_start_at_one() {
        let vocab = Vocabulary::default();
        let store = ScriptedStore::new();

        let ids = SequenceAllocator::new(&store, &vocab)
            .next_order_item_ids(2)
            .await
            .unwrap();
        assert_eq!(ids, [OrderItemNumber::new(1), OrderItemNumber::new(2)]);
    }

    #[tokio::test]
    async fn test_zero_item_ids_skips_query() {
        let vocab = Vocabulary::default();
        let store = ScriptedStore::new();

        let ids = SequenceAllocator::new(&store, &vocab)
            .next_order_item_ids(0)
            .await
            .unwrap();
        assert!(ids.is_empty());
        assert!(store.selects().is_empty());
    }

    #[tokio::test]
    async fn test_exhausted_sequence_is_an_error() {
        let vocab = Vocabulary::default();
        let max = format!("OR{}", u32::MAX);
        let store = ScriptedStore::new().on_select("OrderCodes", code_rows("code", &[max.as_str()]));

        let err = SequenceAllocator::new(&store, &vocab)
            .next_order_code()
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            CheckoutError::Allocation(SequenceIdError::Exhausted(_))
        ));
    }
}
