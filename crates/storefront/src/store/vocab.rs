//! Terms of the supermarket ontology used by the checkout workflow.

use supermarket_core::{OrderItemNumber, OrderNumber};

use super::sparql::{Iri, SparqlError};

/// Default namespace of catalog, user, and order entities.
pub const DEFAULT_BASE_IRI: &str = "http://www.semanticweb.org/My_Super/";

/// Class and property IRIs under a configurable base namespace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Vocabulary {
    pub base: Iri,
    pub order: Iri,
    pub order_item: Iri,
    pub normal_user: Iri,
    pub has_order_id: Iri,
    pub has_order_date: Iri,
    pub has_total_price: Iri,
    pub is_finalized: Iri,
    pub has_normal_user: Iri,
    pub has_order_item: Iri,
    pub has_order_item_id: Iri,
    pub has_order_quantity: Iri,
    pub has_order_price: Iri,
    pub has_product: Iri,
    pub has_product_id: Iri,
    pub has_stock: Iri,
    pub is_available: Iri,
    pub has_username: Iri,
}

impl Vocabulary {
    /// Build the vocabulary under `base`.
    ///
    /// # Errors
    ///
    /// Returns an error if `base` is not a valid IRI.
    pub fn new(base: &str) -> Result<Self, SparqlError> {
        let base = Iri::new(base)?;
        let term = |local: &str| base.join(local);
        Ok(Self {
            order: term("Order")?,
            order_item: term("OrderItem")?,
            normal_user: term("NormalUser")?,
            has_order_id: term("hasOrderID")?,
            has_order_date: term("hasOrderDate")?,
            has_total_price: term("hasTotalPrice")?,
            is_finalized: term("isFinalized")?,
            has_normal_user: term("hasNormalUser")?,
            has_order_item: term("hasOrderItem")?,
            has_order_item_id: term("hasOrderItemID")?,
            has_order_quantity: term("hasOrderQuantity")?,
            has_order_price: term("hasOrderPrice")?,
            has_product: term("hasProduct")?,
            has_product_id: term("hasProductID")?,
            has_stock: term("hasStock")?,
            is_available: term("isAvailable")?,
            has_username: term("hasUsername")?,
            base,
        })
    }

    /// Entity IRI of an order, e.g. `{base}Order5` for `OR05`.
    ///
    /// # Errors
    ///
    /// Returns an error if the resulting IRI is invalid.
    pub fn order_entity(&self, number: OrderNumber) -> Result<Iri, SparqlError> {
        self.base.join(&format!("Order{}", number.as_u32()))
    }

    /// Entity IRI of an order item, e.g. `{base}OrderItem12`.
    ///
    /// # Errors
    ///
    /// Returns an error if the resulting IRI is invalid.
    pub fn order_item_entity(&self, number: OrderItemNumber) -> Result<Iri, SparqlError> {
        self.base.join(&number.code())
    }

    /// The number in an order entity IRI named by [`Self::order_entity`].
    #[must_use]
    pub fn order_number_of(&self, entity: &Iri) -> Option<OrderNumber> {
        let digits = self.base.local_name(entity)?.strip_prefix("Order")?;
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        digits.parse().ok().map(OrderNumber::new)
    }

    /// The number in an order-item entity IRI named by [`Self::order_item_entity`].
    #[must_use]
    pub fn order_item_number_of(&self, entity: &Iri) -> Option<OrderItemNumber> {
        OrderItemNumber::parse_code(self.base.local_name(entity)?).ok()
    }
}

impl Default for Vocabulary {
    fn default() -> Self {
        // The default base is a constant known to be a valid IRI.
        #[allow(clippy::expect_used)]
        Self::new(DEFAULT_BASE_IRI).expect("default base IRI is valid")
    }
}
