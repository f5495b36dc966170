//! Checkout error taxonomy with Sentry integration.
//!
//! Every checkout step fails closed: the first error aborts the remaining
//! steps and is returned to the caller as a [`CheckoutError`]. The cart is
//! never cleared on failure.

use thiserror::Error;

use supermarket_core::{ProductId, SequenceIdError};

use crate::store::StoreError;

/// Error returned by `OrderCoordinator::place_order`.
#[derive(Debug, Error)]
pub enum CheckoutError {
    /// The request was refused before anything was written.
    #[error("Validation failed: {0}")]
    Validation(#[from] ValidationError),

    /// The session user or a cart product is not in the store.
    #[error("Lookup failed: {0}")]
    Lookup(#[from] LookupError),

    /// A request could not be sent or timed out.
    #[error("Network error: {0}")]
    Network(StoreError),

    /// The store answered but refused or failed the request.
    #[error("Store error: {0}")]
    Store(StoreError),

    /// No order or order-item number is left to allocate.
    #[error("Identifier allocation failed: {0}")]
    Allocation(#[from] SequenceIdError),
}

impl From<StoreError> for CheckoutError {
    fn from(err: StoreError) -> Self {
        if err.is_transport() {
            Self::Network(err)
        } else {
            Self::Store(err)
        }
    }
}

/// Checks that fail locally, before any write.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("the cart is empty")]
    EmptyCart,

    #[error("no user is logged in")]
    MissingSession,

    #[error("line for {0} has quantity 0")]
    InvalidQuantity(ProductId),

    #[error("only {available} of {product_id} in stock, {requested} requested")]
    InsufficientStock {
        product_id: ProductId,
        requested: u32,
        available: i64,
    },
}

/// Facts the workflow needs but the store does not have.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LookupError {
    #[error("no customer with username {0:?}")]
    UnknownCustomer(String),

    #[error("products not found: {}", format_ids(.0))]
    ProductsNotFound(Vec<ProductId>),

    #[error("unusable store data: {0}")]
    MalformedFact(String),
}

fn format_ids(ids: &[ProductId]) -> String {
    ids.iter()
        .map(ProductId::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}

impl CheckoutError {
    /// One human-readable notification for the shopper.
    ///
    /// Store internals are not exposed.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::Validation(ValidationError::EmptyCart) => {
                "Your cart is empty. Please add some products before placing an order.".to_string()
            }
            Self::Validation(ValidationError::MissingSession) => {
                "You must be logged in to place an order.".to_string()
            }
            Self::Validation(ValidationError::InvalidQuantity(_)) => {
                "Your cart contains an invalid quantity. Please review it and try again."
                    .to_string()
            }
            Self::Validation(ValidationError::InsufficientStock {
                product_id,
                available,
                ..
            }) => format!(
                "Not enough stock for product {product_id}: only {available} left. Please adjust your cart."
            ),
            Self::Lookup(LookupError::UnknownCustomer(_)) => {
                "Your account could not be found. Please log in again.".to_string()
            }
            Self::Lookup(LookupError::ProductsNotFound(ids)) => format!(
                "Some products are no longer available: {}. Please remove them from your cart.",
                format_ids(ids)
            ),
            Self::Store(StoreError::Conflict(_)) => {
                "Stock changed while your order was being placed. Please review your cart and try again."
                    .to_string()
            }
            Self::Lookup(LookupError::MalformedFact(_)) | Self::Store(_) | Self::Allocation(_) => {
                "An error occurred while placing the order. Please try again.".to_string()
            }
            Self::Network(_) => {
                "The store could not be reached. Please check your connection and try again."
                    .to_string()
            }
        }
    }

    /// Whether the error should be reported to error tracking.
    #[must_use]
    pub const fn is_server_side(&self) -> bool {
        matches!(
            self,
            Self::Store(_)
                | Self::Network(_)
                | Self::Allocation(_)
                | Self::Lookup(LookupError::MalformedFact(_))
        )
    }
}

/// Result type alias for `CheckoutError`.
pub type Result<T> = std::result::Result<T, CheckoutError>;

/// Capture a server-side error to Sentry and log it.
pub fn report(err: &CheckoutError) {
    if err.is_server_side() {
        let event_id = sentry::capture_error(err);
        tracing::error!(error = %err, sentry_event_id = %event_id, "Checkout error");
    } else {
        tracing::warn!(error = %err, "Checkout refused");
    }
}

/// Add a breadcrumb for shopper actions.
///
/// Breadcrumbs appear in Sentry error reports to show the trail of actions
/// leading up to an error.
///
/// # Example
///
/// ```rust,ignore
/// add_breadcrumb("cart", "Added item", Some(&[("product_id", "P1")]));
/// ```
pub fn add_breadcrumb(category: &str, message: &str, data: Option<&[(&str, &str)]>) {
    let mut breadcrumb = sentry::Breadcrumb {
        category: Some(category.to_string()),
        message: Some(message.to_string()),
        level: sentry::Level::Info,
        ..Default::default()
    };

    if let Some(pairs) = data {
        for (key, value) in pairs {
            breadcrumb.data.insert(
                (*key).to_string(),
                serde_json::Value::String((*value).to_string()),
            );
        }
    }

    sentry::add_breadcrumb(breadcrumb);
}
