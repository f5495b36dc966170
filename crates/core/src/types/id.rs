//! Identifier newtypes.
//!
//! Orders and order items are identified by human-readable sequential codes
//! (`OR05`, `OrderItem12`). Use the `define_sequence_id!` macro to create a
//! type-safe wrapper for each code space so they can never be mixed up.

use std::borrow::Borrow;
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors produced when parsing or advancing a sequential identifier.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SequenceIdError {
    /// The code does not start with the expected prefix.
    #[error("code {code:?} does not start with {prefix:?}")]
    WrongPrefix { code: String, prefix: &'static str },

    /// The part after the prefix is not a non-negative integer.
    #[error("code {0:?} has no numeric suffix")]
    InvalidSuffix(String),

    /// The numeric space is used up.
    #[error("sequence {0} is exhausted")]
    Exhausted(&'static str),
}

/// Macro to define a sequential identifier.
///
/// Creates a newtype wrapper around `u32` with:
/// - A fixed textual prefix and a minimum zero-padded width for the numeric suffix
/// - `Serialize`/`Deserialize` with `#[serde(transparent)]`
/// - `Debug`, `Clone`, `Copy`, `PartialEq`, `Eq`, `PartialOrd`, `Ord`, `Hash`
/// - `code()` / `parse_code()` for the textual form, `next()` for the successor
/// - `Display` and `FromStr` using the textual form
///
/// # Example
///
/// ```rust
/// # use supermarket_core::define_sequence_id;
/// define_sequence_id!(InvoiceNumber, "INV", 4);
///
/// let n = InvoiceNumber::new(7);
/// assert_eq!(n.code(), "INV0007");
/// assert_eq!(InvoiceNumber::parse_code("INV0012").unwrap().as_u32(), 12);
/// ```
#[macro_export]
macro_rules! define_sequence_id {
    ($name:ident, $prefix:literal, $width:literal) => {
        #[derive(
            Debug,
            Clone,
            Copy,
            PartialEq,
            Eq,
            PartialOrd,
            Ord,
            Hash,
            ::serde::Serialize,
            ::serde::Deserialize
        )]
        #[serde(transparent)]
        pub struct $name(u32);

        impl $name {
            /// Textual prefix of every code in this sequence.
            pub const PREFIX: &'static str = $prefix;

            /// Minimum width of the zero-padded numeric suffix.
            pub const WIDTH: usize = $width;

            /// Create an identifier from its sequence number.
            #[must_use]
            pub const fn new(number: u32) -> Self {
                Self(number)
            }

            /// The first identifier handed out when the sequence is empty.
            #[must_use]
            pub const fn first() -> Self {
                Self(1)
            }

            /// Get the underlying sequence number.
            #[must_use]
            pub const fn as_u32(&self) -> u32 {
                self.0
            }

            /// The identifier that follows this one.
            ///
            /// # Errors
            ///
            /// Returns `SequenceIdError::Exhausted` when the number would overflow.
            pub const fn next(self) -> ::core::result::Result<Self, $crate::SequenceIdError> {
                match self.0.checked_add(1) {
                    Some(n) => Ok(Self(n)),
                    None => Err($crate::SequenceIdError::Exhausted(stringify!($name))),
                }
            }

            /// Render the human-readable code, e.g. `OR05`.
            #[must_use]
            pub fn code(&self) -> String {
                format!("{}{:0width$}", Self::PREFIX, self.0, width = Self::WIDTH)
            }

            /// Parse a code produced by [`Self::code`].
            ///
            /// Padding is not required, so `OR5` and `OR05` are the same identifier.
            ///
            /// # Errors
            ///
            /// Returns an error if the prefix is wrong or the suffix is not a number.
            pub fn parse_code(code: &str) -> ::core::result::Result<Self, $crate::SequenceIdError> {
                let suffix = code.strip_prefix(Self::PREFIX).ok_or_else(|| {
                    $crate::SequenceIdError::WrongPrefix {
                        code: code.to_string(),
                        prefix: Self::PREFIX,
                    }
                })?;
                if suffix.is_empty() || !suffix.bytes().all(|b| b.is_ascii_digit()) {
                    return Err($crate::SequenceIdError::InvalidSuffix(code.to_string()));
                }
                suffix
                    .parse::<u32>()
                    .map(Self)
                    .map_err(|_| $crate::SequenceIdError::InvalidSuffix(code.to_string()))
            }
        }

        impl ::core::fmt::Display for $name {
            fn fmt(&self, f: &mut ::core::fmt::Formatter<'_>) -> ::core::fmt::Result {
                f.write_str(&self.code())
            }
        }

        impl ::core::str::FromStr for $name {
            type Err = $crate::SequenceIdError;

            fn from_str(s: &str) -> ::core::result::Result<Self, Self::Err> {
                Self::parse_code(s)
            }
        }
    };
}

// Order codes are `OR` plus a two-digit number; order items are `OrderItem` plus
// an unpadded number.
define_sequence_id!(OrderNumber, "OR", 2);
define_sequence_id!(OrderItemNumber, "OrderItem", 0);

/// Catalog product identifier (the store's `hasProductID` value).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProductId(String);

impl ProductId {
    /// Create a product identifier.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ProductId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for ProductId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<&str> for ProductId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl Borrow<str> for ProductId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_order_number_code_is_zero_padded() {
        assert_eq!(OrderNumber::new(5).code(), "OR05");
        assert_eq!(OrderNumber::new(42).code(), "OR42");
        // Width is a minimum, not a cap
        assert_eq!(OrderNumber::new(123).code(), "OR123");
    }

    #[test]
    fn test_order_item_number_code_is_unpadded() {
        assert_eq!(OrderItemNumber::new(7).code(), "OrderItem7");
        assert_eq!(OrderItemNumber::new(12).to_string(), "OrderItem12");
    }

    #[test]
    fn test_parse_code_accepts_padded_and_unpadded() {
        assert_eq!(OrderNumber::parse_code("OR05").unwrap(), OrderNumber::new(5));
        assert_eq!(OrderNumber::parse_code("OR5").unwrap(), OrderNumber::new(5));
        assert_eq!(
            "OrderItem31".parse::<OrderItemNumber>().unwrap(),
            OrderItemNumber::new(31)
        );
    }

    #[test]
    fn test_parse_code_rejects_foreign_codes() {
        assert!(matches!(
            OrderNumber::parse_code("OrderItem3"),
            Err(SequenceIdError::WrongPrefix { .. })
        ));
        assert!(matches!(
            OrderNumber::parse_code("OR"),
            Err(SequenceIdError::InvalidSuffix(_))
        ));
        assert!(matches!(
            OrderNumber::parse_code("OR-1"),
            Err(SequenceIdError::InvalidSuffix(_))
        ));
        assert!(matches!(
            OrderNumber::parse_code("OR99999999999"),
            Err(SequenceIdError::InvalidSuffix(_))
        ));
    }

    #[test]
    fn test_next_is_strictly_increasing() {
        let first = OrderNumber::first();
        let second = first.next().unwrap();
        assert!(second > first);
        assert_eq!(second.code(), "OR02");
    }

    #[test]
    fn test_next_exhausted() {
        let last = OrderItemNumber::new(u32::MAX);
        assert_eq!(
            last.next(),
            Err(SequenceIdError::Exhausted("OrderItemNumber"))
        );
    }

    #[test]
    fn test_product_id_serializes_transparently() {
        let id = ProductId::new("P1");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"P1\"");
        let back: ProductId = serde_json::from_str("\"P1\"").unwrap();
        assert_eq!(back, id);
    }
}
