//! Order assembly and stock arithmetic.
//!
//! [`TransactionBuilder::build`] is pure: it turns a cart snapshot, allocated
//! identifiers, and a stock snapshot into one [`CompositeMutation`], or fails
//! before anything is written.
//!
//! The mutation is a single `DELETE/INSERT/WHERE`. Its condition is every
//! stock fact exactly as read, and its insert template carries both the new
//! stock facts and the whole order graph. If any stock fact changed since it
//! was read, the condition matches nothing and nothing is written, not even
//! the order.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use supermarket_core::{OrderItemNumber, OrderNumber, Price, ProductId};

use super::stock::{StockLevel, StockSnapshot};
use crate::cart::CartLine;
use crate::error::{CheckoutError, LookupError, ValidationError};
use crate::store::sparql::SparqlError;
use crate::store::{Iri, Literal, Term, Triple, UpdateOperation, UpdateRequest, Vocabulary};

/// One line of a placed order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderItem {
    pub entity: Iri,
    pub id: OrderItemNumber,
    pub product_id: ProductId,
    pub product: Iri,
    pub quantity: u32,
    /// Unit price times quantity, rounded to cents.
    pub line_price: Decimal,
}

/// A placed order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Order {
    pub entity: Iri,
    pub code: OrderNumber,
    pub customer: Iri,
    pub order_date: DateTime<Utc>,
    /// Sum of the rounded line prices.
    pub total_price: Decimal,
    pub finalized: bool,
    pub items: Vec<OrderItem>,
}

/// Replacement of one product's stock facts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StockReplacement {
    pub product: Iri,
    pub product_id: ProductId,
    pub ordered: u32,
    pub before: StockLevel,
    pub after: StockLevel,
    expected: (Literal, Literal),
}

/// Everything one checkout writes, rendered as a single update request.
#[derive(Debug, Clone)]
pub struct CompositeMutation {
    pub order: Order,
    pub stock_changes: Vec<StockReplacement>,
    pub request: UpdateRequest,
}

/// Inputs of [`TransactionBuilder::build`].
#[derive(Debug, Clone, Copy)]
pub struct OrderRequest<'a> {
    pub lines: &'a [CartLine],
    pub order_code: OrderNumber,
    pub item_ids: &'a [OrderItemNumber],
    pub customer: &'a Iri,
    pub placed_at: DateTime<Utc>,
}

/// Assembles the composite mutation of a checkout.
pub struct TransactionBuilder<'a> {
    vocab: &'a Vocabulary,
}

impl<'a> TransactionBuilder<'a> {
    #[must_use]
    pub const fn new(vocab: &'a Vocabulary) -> Self {
        Self { vocab }
    }

    /// Build the order, its items, and the stock replacements.
    ///
    /// Lines are checked in cart order and the first failure is returned.
    ///
    /// # Errors
    ///
    /// - [`ValidationError::InvalidQuantity`] for a line with quantity 0
    /// - [`ValidationError::InsufficientStock`] if a line asks for more than
    ///   is in stock
    /// - [`LookupError::ProductsNotFound`] if a line has no stock fact
    pub fn build(
        &self,
        request: OrderRequest<'_>,
        stock: &StockSnapshot,
    ) -> Result<CompositeMutation, CheckoutError> {
        if request.item_ids.len() != request.lines.len() {
            return Err(LookupError::MalformedFact(format!(
                "{} order item ids allocated for {} lines",
                request.item_ids.len(),
                request.lines.len()
            ))
            .into());
        }

        let mut items = Vec::with_capacity(request.lines.len());
        let mut stock_changes = Vec::with_capacity(request.lines.len());
        for (line, id) in request.lines.iter().zip(request.item_ids) {
            if line.quantity == 0 {
                return Err(ValidationError::InvalidQuantity(line.product_id.clone()).into());
            }
            let fact = stock.get(&line.product_id).ok_or_else(|| {
                LookupError::ProductsNotFound(vec![line.product_id.clone()])
            })?;
            let requested = i64::from(line.quantity);
            if requested > fact.level.stock {
                return Err(ValidationError::InsufficientStock {
                    product_id: line.product_id.clone(),
                    requested: line.quantity,
                    available: fact.level.stock,
                }
                .into());
            }

            items.push(OrderItem {
                entity: self.vocab.order_item_entity(*id).map_err(malformed)?,
                id: *id,
                product_id: line.product_id.clone(),
                product: fact.product_uri.clone(),
                quantity: line.quantity,
                line_price: Price::from_amount(line.line_total()).rounded(),
            });

            let (stored_stock, stored_available) = fact.stored_terms();
            stock_changes.push(StockReplacement {
                product: fact.product_uri.clone(),
                product_id: line.product_id.clone(),
                ordered: line.quantity,
                before: fact.level,
                after: StockLevel::from_stock(fact.level.stock - requested),
                expected: (stored_stock.clone(), stored_available.clone()),
            });
        }

        let order = Order {
            entity: self
                .vocab
                .order_entity(request.order_code)
                .map_err(malformed)?,
            code: request.order_code,
            customer: request.customer.clone(),
            order_date: request.placed_at,
            total_price: items.iter().map(|item| item.line_price).sum(),
            finalized: true,
            items,
        };

        let update = self.render(&order, &stock_changes);
        Ok(CompositeMutation {
            order,
            stock_changes,
            request: update,
        })
    }

    /// One conditional replacement of every stock fact that also creates the
    /// order and its items.
    fn render(&self, order: &Order, stock_changes: &[StockReplacement]) -> UpdateRequest {
        let v = self.vocab;
        // Amounts are already rounded in `build`.
        let money = Literal::Double;

        let mut created = vec![
            Triple::new(&order.entity, Term::Type, &v.order),
            Triple::new(&order.entity, &v.has_order_id, Literal::string(order.code.code())),
            Triple::new(&order.entity, &v.has_order_date, Literal::DateTime(order.order_date)),
            Triple::new(&order.entity, &v.has_total_price, money(order.total_price)),
            Triple::new(&order.entity, &v.is_finalized, Literal::Boolean(order.finalized)),
            Triple::new(&order.entity, &v.has_normal_user, &order.customer),
        ];
        for item in &order.items {
            created.extend([
                Triple::new(&order.entity, &v.has_order_item, &item.entity),
                Triple::new(&item.entity, Term::Type, &v.order_item),
                Triple::new(&item.entity, &v.has_order_item_id, Literal::string(item.id.code())),
                Triple::new(
                    &item.entity,
                    &v.has_order_quantity,
                    Literal::Integer(i64::from(item.quantity)),
                ),
                Triple::new(&item.entity, &v.has_order_price, money(item.line_price)),
                Triple::new(&item.entity, &v.has_product, &item.product),
            ]);
        }

        let mut old = Vec::with_capacity(stock_changes.len() * 2);
        for change in stock_changes {
            let (stored_stock, stored_available) = &change.expected;
            old.extend([
                Triple::new(&change.product, &v.has_stock, stored_stock.clone()),
                Triple::new(&change.product, &v.is_available, stored_available.clone()),
            ]);
            created.extend([
                Triple::new(&change.product, &v.has_stock, Literal::Integer(change.after.stock)),
                Triple::new(
                    &change.product,
                    &v.is_available,
                    Literal::Boolean(change.after.available),
                ),
            ]);
        }

        let replace = UpdateOperation::DeleteInsert {
            delete: old.clone(),
            insert: created,
            condition: old,
        };
        UpdateRequest::new("PlaceOrder", &[replace])
    }
}

fn malformed(err: SparqlError) -> CheckoutError {
    LookupError::MalformedFact(err.to_string()).into()
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::checkout::stock::ProductStockFact;

    fn line(id: &str, price: Decimal, quantity: u32) -> CartLine {
        CartLine {
            product_id: ProductId::new(id),
            name: format!("Product {id}"),
            price,
            brand: "Acme".to_string(),
            quantity,
        }
    }

    fn snapshot(vocab: &Vocabulary, levels: &[(&str, i64)]) -> StockSnapshot {
        levels
            .iter()
            .map(|(id, stock)| {
                let fact = ProductStockFact::new(
                    vocab.base.join(id).unwrap(),
                    ProductId::new(*id),
                    StockLevel::from_stock(*stock),
                );
                (ProductId::new(*id), fact)
            })
            .collect::<HashMap<_, _>>()
    }

    fn placed_at() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2024-05-01T10:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    fn build(
        vocab: &Vocabulary,
        lines: &[CartLine],
        stock: &StockSnapshot,
    ) -> Result<CompositeMutation, CheckoutError> {
        let customer = vocab.base.join("maria").unwrap();
        let item_ids: Vec<OrderItemNumber> = (0..lines.len())
            .map(|i| OrderItemNumber::new(u32::try_from(i).unwrap() + 13))
            .collect();
        TransactionBuilder::new(vocab).build(
            OrderRequest {
                lines,
                order_code: OrderNumber::new(5),
                item_ids: &item_ids,
                customer: &customer,
                placed_at: placed_at(),
            },
            stock,
        )
    }

    #[test]
    fn test_order_and_stock_arithmetic() {
        let vocab = Vocabulary::default();
        let lines = [
            line("P1", Decimal::new(250, 2), 3),
            line("P2", Decimal::new(1000, 2), 1),
        ];
        let mutation = build(&vocab, &lines, &snapshot(&vocab, &[("P1", 5), ("P2", 1)])).unwrap();

        let order = &mutation.order;
        assert_eq!(order.code.code(), "OR05");
        assert_eq!(order.entity.as_str(), "http://www.semanticweb.org/My_Super/Order5");
        assert_eq!(order.total_price, Decimal::new(1750, 2));
        assert!(order.finalized);
        assert_eq!(order.items.len(), 2);
        assert_eq!(order.items[0].id.code(), "OrderItem13");
        assert_eq!(order.items[0].line_price, Decimal::new(750, 2));
        assert_eq!(order.items[1].id.code(), "OrderItem14");

        let p1 = &mutation.stock_changes[0];
        assert_eq!(p1.before, StockLevel::from_stock(5));
        assert_eq!(p1.after, StockLevel { stock: 2, available: true });
        let p2 = &mutation.stock_changes[1];
        assert_eq!(p2.after, StockLevel { stock: 0, available: false });
    }

    #[test]
    fn test_rendered_update() {
        let vocab = Vocabulary::default();
        let lines = [line("P1", Decimal::new(250, 2), 3)];
        let mutation = build(&vocab, &lines, &snapshot(&vocab, &[("P1", 5)])).unwrap();
        let text = mutation.request.as_str();
        let base = "http://www.semanticweb.org/My_Super/";

        assert_eq!(mutation.request.operation(), "PlaceOrder");
        assert!(text.contains(&format!("<{base}Order5> a <{base}Order> .")));
        assert!(text.contains(&format!("<{base}Order5> <{base}hasOrderID> \"OR05\"^^xsd:string .")));
        assert!(text.contains(&format!(
            "<{base}Order5> <{base}hasOrderDate> \"2024-05-01T10:00:00.000Z\"^^xsd:dateTime ."
        )));
        assert!(text.contains(&format!("<{base}Order5> <{base}hasTotalPrice> \"7.50\"^^xsd:double .")));
        assert!(text.contains(&format!("<{base}Order5> <{base}hasNormalUser> <{base}maria> .")));
        assert!(text.contains(&format!("<{base}OrderItem13> <{base}hasOrderItemID> \"OrderItem13\"^^xsd:string .")));
        assert!(text.contains(&format!("<{base}OrderItem13> <{base}hasProduct> <{base}P1> .")));

        // One operation: old stock out, order and new stock in, guarded by
        // the stock as read.
        assert!(!text.contains("INSERT DATA"));
        assert_eq!(text.matches("DELETE {").count(), 1);
        let insert = text.find("\nINSERT {").unwrap();
        let condition = text.find("\nWHERE {").unwrap();
        let order_type = text.find(&format!("<{base}Order5> a <{base}Order> .")).unwrap();
        assert!(insert < order_type && order_type < condition);

        let old_stock = format!("<{base}P1> <{base}hasStock> \"5\"^^xsd:integer .");
        assert_eq!(text.matches(&old_stock).count(), 2);
        assert!(text.rfind(&old_stock).unwrap() > condition);
        let new_stock = text
            .find(&format!("<{base}P1> <{base}hasStock> \"2\"^^xsd:integer ."))
            .unwrap();
        assert!(insert < new_stock && new_stock < condition);
        assert!(text.contains(&format!("<{base}P1> <{base}isAvailable> \"true\"^^xsd:boolean .")));
    }

    #[test]
    fn test_total_is_sum_of_rounded_line_prices() {
        let vocab = Vocabulary::default();
        let lines = [
            line("P1", Decimal::new(1125, 3), 1),
            line("P2", Decimal::new(1125, 3), 1),
            line("P3", Decimal::new(3333, 3), 3),
        ];
        let mutation = build(
            &vocab,
            &lines,
            &snapshot(&vocab, &[("P1", 5), ("P2", 5), ("P3", 5)]),
        )
        .unwrap();

        let prices: Vec<Decimal> = mutation.order.items.iter().map(|i| i.line_price).collect();
        assert_eq!(
            prices,
            [Decimal::new(112, 2), Decimal::new(112, 2), Decimal::new(1000, 2)]
        );
        assert_eq!(mutation.order.total_price, Decimal::new(1224, 2));
        assert_eq!(mutation.order.total_price, prices.iter().sum::<Decimal>());

        let base = "http://www.semanticweb.org/My_Super/";
        let text = mutation.request.as_str();
        assert!(text.contains(&format!("<{base}Order5> <{base}hasTotalPrice> \"12.24\"^^xsd:double .")));
        assert!(text.contains(&format!("<{base}OrderItem13> <{base}hasOrderPrice> \"1.12\"^^xsd:double .")));
        assert!(text.contains(&format!("<{base}OrderItem15> <{base}hasOrderPrice> \"10.00\"^^xsd:double .")));
    }

    #[test]
    fn test_exact_stock_is_allowed() {
        let vocab = Vocabulary::default();
        let lines = [line("P3", Decimal::ONE, 2)];
        let mutation = build(&vocab, &lines, &snapshot(&vocab, &[("P3", 2)])).unwrap();
        assert_eq!(
            mutation.stock_changes[0].after,
            StockLevel { stock: 0, available: false }
        );
    }

    #[test]
    fn test_insufficient_stock_fails_fast() {
        let vocab = Vocabulary::default();
        let lines = [
            line("P1", Decimal::ONE, 1),
            line("P3", Decimal::ONE, 5),
            line("P4", Decimal::ONE, 9),
        ];
        let err = build(
            &vocab,
            &lines,
            &snapshot(&vocab, &[("P1", 5), ("P3", 2), ("P4", 0)]),
        )
        .unwrap_err();

        assert!(matches!(
            err,
            CheckoutError::Validation(ValidationError::InsufficientStock {
                ref product_id,
                requested: 5,
                available: 2,
            }) if product_id.as_str() == "P3"
        ));
    }

    #[test]
    fn test_zero_quantity_is_rejected() {
        let vocab = Vocabulary::default();
        let lines = [line("P1", Decimal::ONE, 0)];
        let err = build(&vocab, &lines, &snapshot(&vocab, &[("P1", 5)])).unwrap_err();
        assert!(matches!(
            err,
            CheckoutError::Validation(ValidationError::InvalidQuantity(_))
        ));
    }

    #[test]
    fn test_line_without_stock_fact() {
        let vocab = Vocabulary::default();
        let lines = [line("P8", Decimal::ONE, 1)];
        let err = build(&vocab, &lines, &snapshot(&vocab, &[])).unwrap_err();
        assert!(matches!(
            err,
            CheckoutError::Lookup(LookupError::ProductsNotFound(_))
        ));
    }
}
