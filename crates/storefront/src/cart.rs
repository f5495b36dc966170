//! The shopper's cart.
//!
//! Pure in-memory state with a persisted snapshot: every mutation rewrites the
//! `cart` document in [`LocalState`], and [`CartStore::open`] rehydrates it.
//! There are no error conditions; persistence failures are logged.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use supermarket_core::ProductId;

use crate::error::add_breadcrumb;
use crate::local_state::{LocalState, keys};

/// A catalog product as shown to the shopper, the input to [`CartStore::add_item`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogProduct {
    pub product_id: ProductId,
    pub name: String,
    pub price: Decimal,
    pub brand: String,
}

/// One product in the cart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartLine {
    pub product_id: ProductId,
    pub name: String,
    /// Unit price.
    pub price: Decimal,
    pub brand: String,
    /// Always at least 1 for lines held by a [`Cart`].
    pub quantity: u32,
}

impl CartLine {
    /// Unit price times quantity.
    #[must_use]
    pub fn line_total(&self) -> Decimal {
        self.price * Decimal::from(self.quantity)
    }
}

/// Ordered cart lines, unique by product id.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Cart {
    lines: Vec<CartLine>,
}

impl Cart {
    /// Build a cart from raw lines, merging duplicate products and dropping
    /// zero-quantity lines. First-seen order is kept.
    #[must_use]
    pub fn from_lines(raw: impl IntoIterator<Item = CartLine>) -> Self {
        let mut lines: Vec<CartLine> = Vec::new();
        for line in raw {
            if line.quantity == 0 {
                continue;
            }
            match lines.iter_mut().find(|l| l.product_id == line.product_id) {
                Some(existing) => {
                    existing.quantity = existing.quantity.saturating_add(line.quantity);
                }
                None => lines.push(line),
            }
        }
        Self { lines }
    }

    /// Lines in insertion order.
    #[must_use]
    pub fn lines(&self) -> &[CartLine] {
        &self.lines
    }

    /// Whether the cart has no lines.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Sum of line totals.
    #[must_use]
    pub fn total_price(&self) -> Decimal {
        self.lines.iter().map(CartLine::line_total).sum()
    }

    /// Sum of quantities.
    #[must_use]
    pub fn item_count(&self) -> u32 {
        self.lines
            .iter()
            .fold(0u32, |acc, l| acc.saturating_add(l.quantity))
    }

    /// Quantity of a product, 0 if absent.
    #[must_use]
    pub fn quantity_of(&self, product_id: &ProductId) -> u32 {
        self.lines
            .iter()
            .find(|l| &l.product_id == product_id)
            .map_or(0, |l| l.quantity)
    }
}

/// Owner of the shopper's working cart.
#[derive(Debug, Default)]
pub struct CartStore {
    cart: Cart,
    state: Option<LocalState>,
}

impl CartStore {
    /// A cart that is not persisted anywhere.
    #[must_use]
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Rehydrate the cart from `state`, starting empty if there is no usable snapshot.
    #[must_use]
    pub fn open(state: LocalState) -> Self {
        let raw: Vec<CartLine> = state.read(keys::CART).unwrap_or_default();
        let cart = Cart::from_lines(raw);
        debug!(lines = cart.lines().len(), "Cart rehydrated");
        Self {
            cart,
            state: Some(state),
        }
    }

    /// Add one unit of a product, creating its line if needed.
    pub fn add_item(&mut self, product: &CatalogProduct) {
        match self
            .cart
            .lines
            .iter_mut()
            .find(|l| l.product_id == product.product_id)
        {
            Some(line) => line.quantity = line.quantity.saturating_add(1),
            None => self.cart.lines.push(CartLine {
                product_id: product.product_id.clone(),
                name: product.name.clone(),
                price: product.price,
                brand: product.brand.clone(),
                quantity: 1,
            }),
        }
        add_breadcrumb(
            "cart",
            "Added item",
            Some(&[("product_id", product.product_id.as_str())]),
        );
        self.persist();
    }

    /// Remove one unit of a product, dropping its line at zero. Unknown ids are ignored.
    pub fn remove_item(&mut self, product_id: &ProductId) {
        let Some(index) = self
            .cart
            .lines
            .iter()
            .position(|l| &l.product_id == product_id)
        else {
            return;
        };

        match self.cart.lines.get_mut(index) {
            Some(line) if line.quantity > 1 => line.quantity -= 1,
            _ => {
                self.cart.lines.remove(index);
            }
        }
        add_breadcrumb(
            "cart",
            "Removed item",
            Some(&[("product_id", product_id.as_str())]),
        );
        self.persist();
    }

    /// Empty the cart.
    pub fn clear(&mut self) {
        self.cart.lines.clear();
        self.persist();
    }

    /// Lines in insertion order.
    #[must_use]
    pub fn lines(&self) -> &[CartLine] {
        self.cart.lines()
    }

    /// A copy of the current cart.
    #[must_use]
    pub fn snapshot(&self) -> Cart {
        self.cart.clone()
    }

    /// Sum of line totals.
    #[must_use]
    pub fn total_price(&self) -> Decimal {
        self.cart.total_price()
    }

    /// Sum of quantities.
    #[must_use]
    pub fn item_count(&self) -> u32 {
        self.cart.item_count()
    }

    /// Whether the cart has no lines.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.cart.is_empty()
    }

    /// Quantity of a product, 0 if absent.
    #[must_use]
    pub fn quantity_of(&self, product_id: &ProductId) -> u32 {
        self.cart.quantity_of(product_id)
    }

    fn persist(&self) {
        let Some(state) = &self.state else {
            return;
        };
        if let Err(e) = state.write(keys::CART, &self.cart) {
            warn!(error = %e, dir = %state.dir().display(), "Failed to persist cart snapshot");
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn product(id: &str, price: Decimal) -> CatalogProduct {
        CatalogProduct {
            product_id: ProductId::new(id),
            name: format!("Product {id}"),
            price,
            brand: "Acme".to_string(),
        }
    }

    #[test]
    fn test_total_is_sum_of_line_totals() {
        let mut cart = CartStore::in_memory();
        let p1 = product("P1", Decimal::new(250, 2));
        let p2 = product("P2", Decimal::new(1000, 2));
        for _ in 0..3 {
            cart.add_item(&p1);
        }
        cart.add_item(&p2);

        assert_eq!(cart.total_price(), Decimal::new(1750, 2));
        let manual: Decimal = cart
            .lines()
            .iter()
            .map(|l| l.price * Decimal::from(l.quantity))
            .sum();
        assert_eq!(cart.total_price(), manual);
        assert_eq!(cart.item_count(), 4);
    }

    #[test]
    fn test_repeated_add_increments_without_duplicating() {
        let mut cart = CartStore::in_memory();
        let p1 = product("P1", Decimal::ONE);
        cart.add_item(&p1);
        cart.add_item(&p1);

        assert_eq!(cart.lines().len(), 1);
        assert_eq!(cart.quantity_of(&ProductId::new("P1")), 2);
    }

    #[test]
    fn test_add_then_remove_restores_prior_state() {
        let mut cart = CartStore::in_memory();
        cart.add_item(&product("P1", Decimal::ONE));
        let before = cart.snapshot();

        let p2 = product("P2", Decimal::TWO);
        cart.add_item(&p2);
        cart.remove_item(&p2.product_id);
        assert_eq!(cart.snapshot(), before);

        cart.add_item(&product("P1", Decimal::ONE));
        cart.remove_item(&ProductId::new("P1"));
        assert_eq!(cart.snapshot(), before);
    }

    #[test]
    fn test_remove_unknown_is_noop() {
        let mut cart = CartStore::in_memory();
        cart.add_item(&product("P1", Decimal::ONE));
        cart.remove_item(&ProductId::new("nope"));
        assert_eq!(cart.item_count(), 1);
    }

    #[test]
    fn test_clear() {
        let mut cart = CartStore::in_memory();
        cart.add_item(&product("P1", Decimal::ONE));
        cart.clear();
        assert!(cart.is_empty());
        assert_eq!(cart.total_price(), Decimal::ZERO);
    }

    #[test]
    fn test_snapshot_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let mut cart = CartStore::open(LocalState::new(dir.path()));
        let p1 = product("P1", Decimal::new(250, 2));
        cart.add_item(&p1);
        cart.add_item(&p1);
        cart.add_item(&product("P2", Decimal::TEN));

        let reopened = CartStore::open(LocalState::new(dir.path()));
        assert_eq!(reopened.snapshot(), cart.snapshot());
        assert_eq!(reopened.lines()[0].product_id, ProductId::new("P1"));
        assert_eq!(reopened.lines()[0].quantity, 2);
    }

    #[test]
    fn test_open_tolerates_malformed_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("cart.json"), "[{\"productId\": 3").unwrap();

        let cart = CartStore::open(LocalState::new(dir.path()));
        assert!(cart.is_empty());
    }

    #[test]
    fn test_open_sanitizes_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let raw = r#"[
            {"productId":"P1","name":"Milk","price":"1.20","brand":"A","quantity":2},
            {"productId":"P2","name":"Bread","price":"2.00","brand":"B","quantity":0},
            {"productId":"P1","name":"Milk","price":"1.20","brand":"A","quantity":1}
        ]"#;
        std::fs::write(dir.path().join("cart.json"), raw).unwrap();

        let cart = CartStore::open(LocalState::new(dir.path()));
        assert_eq!(cart.lines().len(), 1);
        assert_eq!(cart.quantity_of(&ProductId::new("P1")), 3);
    }

    #[test]
    fn test_snapshot_json_shape() {
        let mut cart = CartStore::in_memory();
        cart.add_item(&product("P1", Decimal::new(250, 2)));
        let json = serde_json::to_value(cart.snapshot()).unwrap();
        assert_eq!(json[0]["productId"], "P1");
        assert_eq!(json[0]["price"], "2.50");
        assert_eq!(json[0]["quantity"], 1);
    }
}
