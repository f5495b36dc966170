//! Live stock reads for the products in a cart.

use std::collections::{BTreeSet, HashMap};

use tracing::{debug, instrument, warn};

use supermarket_core::ProductId;

use crate::error::{CheckoutError, LookupError};
use crate::store::{Iri, KnowledgeStore, Literal, Row, SelectQuery, StoreError, Triple, Var, Vocabulary};

const PRODUCT: Var = Var("product");
const PRODUCT_ID: Var = Var("productId");
const STOCK: Var = Var("stock");
const AVAILABLE: Var = Var("available");

/// Stock count and availability flag of one product.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StockLevel {
    pub stock: i64,
    pub available: bool,
}

impl StockLevel {
    /// The level for a stock count, with availability derived from it.
    #[must_use]
    pub const fn from_stock(stock: i64) -> Self {
        Self {
            stock,
            available: stock > 0,
        }
    }
}

/// Stock facts of one product as read from the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProductStockFact {
    pub product_uri: Iri,
    pub product_id: ProductId,
    pub level: StockLevel,
    stored_stock: Literal,
    stored_available: Literal,
}

impl ProductStockFact {
    /// A fact with canonical stored terms.
    #[must_use]
    pub const fn new(product_uri: Iri, product_id: ProductId, level: StockLevel) -> Self {
        Self {
            product_uri,
            product_id,
            stored_stock: Literal::Integer(level.stock),
            stored_available: Literal::Boolean(level.available),
            level,
        }
    }

    /// The `hasStock` and `isAvailable` terms exactly as stored.
    #[must_use]
    pub const fn stored_terms(&self) -> (&Literal, &Literal) {
        (&self.stored_stock, &self.stored_available)
    }

    fn from_row(row: &Row) -> Result<Self, StoreError> {
        let level = StockLevel {
            stock: row.integer(STOCK.0)?,
            available: row.boolean(AVAILABLE.0)?,
        };
        Ok(Self {
            product_uri: row.iri(PRODUCT.0)?,
            product_id: ProductId::new(row.value(PRODUCT_ID.0)?),
            stored_stock: row.literal(STOCK.0)?,
            stored_available: row.literal(AVAILABLE.0)?,
            level,
        })
    }
}

/// Stock facts keyed by product id.
pub type StockSnapshot = HashMap<ProductId, ProductStockFact>;

/// Reads current stock for a set of products in one query.
pub struct StockValidator<'a, S> {
    store: &'a S,
    vocab: &'a Vocabulary,
}

impl<'a, S: KnowledgeStore> StockValidator<'a, S> {
    #[must_use]
    pub const fn new(store: &'a S, vocab: &'a Vocabulary) -> Self {
        Self { store, vocab }
    }

    /// Query for the stock facts of `product_ids`.
    #[must_use]
    pub fn query(&self, product_ids: &BTreeSet<ProductId>) -> SelectQuery {
        SelectQuery::builder("ProductStock")
            .var(PRODUCT)
            .var(PRODUCT_ID)
            .var(STOCK)
            .var(AVAILABLE)
            .values(
                PRODUCT_ID,
                product_ids
                    .iter()
                    .map(|id| Literal::string(id.as_str()).into()),
            )
            .pattern(Triple::new(PRODUCT, &self.vocab.has_product_id, PRODUCT_ID))
            .pattern(Triple::new(PRODUCT, &self.vocab.has_stock, STOCK))
            .pattern(Triple::new(PRODUCT, &self.vocab.is_available, AVAILABLE))
            .build()
    }

    /// Fetch the stock facts of every product in `product_ids`.
    ///
    /// # Errors
    ///
    /// - [`LookupError::ProductsNotFound`] if any id has no stock facts
    /// - [`LookupError::MalformedFact`] if a product has several stock facts
    ///   or a negative count
    /// - A network or store error if the query fails
    #[instrument(skip_all, fields(products = product_ids.len()))]
    pub async fn fetch_stock(
        &self,
        product_ids: &BTreeSet<ProductId>,
    ) -> Result<StockSnapshot, CheckoutError> {
        if product_ids.is_empty() {
            return Ok(StockSnapshot::new());
        }

        let solutions = self.store.select(&self.query(product_ids)).await?;

        let mut snapshot = StockSnapshot::with_capacity(product_ids.len());
        for row in &solutions.rows {
            let fact = ProductStockFact::from_row(row)
                .map_err(|e| LookupError::MalformedFact(e.to_string()))?;
            if fact.level.stock < 0 {
                return Err(LookupError::MalformedFact(format!(
                    "{} has negative stock {}",
                    fact.product_id, fact.level.stock
                ))
                .into());
            }
            if fact.level.available != (fact.level.stock > 0) {
                warn!(
                    product_id = %fact.product_id,
                    stock = fact.level.stock,
                    available = fact.level.available,
                    "Stored availability disagrees with stock"
                );
            }
            if !product_ids.contains(&fact.product_id) {
                continue;
            }
            let product_id = fact.product_id.clone();
            if snapshot.insert(product_id.clone(), fact).is_some() {
                return Err(LookupError::MalformedFact(format!(
                    "{product_id} has more than one stock fact"
                ))
                .into());
            }
        }

        let missing: Vec<ProductId> = product_ids
            .iter()
            .filter(|id| !snapshot.contains_key(*id))
            .cloned()
            .collect();
        if !missing.is_empty() {
            return Err(LookupError::ProductsNotFound(missing).into());
        }

        debug!(products = snapshot.len(), "Stock fetched");
        Ok(snapshot)
    }
}
