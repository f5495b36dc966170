//! Knowledge store access over the SPARQL 1.1 protocol.
//!
//! # Architecture
//!
//! - Queries and updates are built with [`sparql`], which escapes every value
//! - [`KnowledgeStore`] is the seam between the checkout workflow and the
//!   transport; [`KnowledgeStoreClient`] implements it with `reqwest`
//! - The store is the source of truth for products, users, and orders. Nothing
//!   is synced locally except the cart and the logged-in user
//!
//! # Protocol
//!
//! | Operation | Transport | Content |
//! |---|---|---|
//! | Read | GET `{url}/repositories/{repo}?query=...` | `application/sparql-results+json` |
//! | Write | POST `{url}/repositories/{repo}/statements` | `application/sparql-update` |

mod client;
pub mod results;
pub mod sparql;
pub mod vocab;

use std::future::Future;

use thiserror::Error;

pub use client::KnowledgeStoreClient;
pub use results::{Row, Solutions};
pub use sparql::{
    Iri, LangTag, Literal, SelectQuery, Term, Triple, UpdateOperation, UpdateRequest, Var,
};
pub use vocab::Vocabulary;

/// Errors that can occur when talking to the knowledge store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Request could not be sent, or timed out.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Store answered with a non-success status.
    #[error("store returned {status}: {body}")]
    Status { status: u16, body: String },

    /// Response body was not valid SPARQL JSON results.
    #[error("JSON parse error: {0}")]
    Parse(#[from] serde_json::Error),

    /// Rate limited by the store.
    #[error("Rate limited, retry after {0} seconds")]
    RateLimited(u64),

    /// Response parsed but did not have the expected shape.
    #[error("Malformed result: {0}")]
    Malformed(String),

    /// An accepted conditional update did not apply because its condition
    /// no longer held.
    #[error("Update not applied: {0}")]
    Conflict(String),
}

impl StoreError {
    /// Whether the request never produced a response (connect failure, timeout).
    #[must_use]
    pub fn is_transport(&self) -> bool {
        match self {
            Self::Http(e) => !e.is_status() && !e.is_decode(),
            _ => false,
        }
    }
}

/// The contract the checkout workflow needs from the backing store.
///
/// Implementations must apply everything in one [`UpdateRequest`] as a single
/// request. Whether the store applies it all-or-nothing is a property of the
/// store, reported through configuration.
pub trait KnowledgeStore: Send + Sync {
    /// Run a SELECT query and return its solutions.
    fn select(
        &self,
        query: &SelectQuery,
    ) -> impl Future<Output = Result<Solutions, StoreError>> + Send;

    /// Submit an update request.
    fn update(&self, request: &UpdateRequest)
    -> impl Future<Output = Result<(), StoreError>> + Send;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_error_display() {
        let err = StoreError::Status {
            status: 400,
            body: "MALFORMED QUERY".to_string(),
        };
        assert_eq!(err.to_string(), "store returned 400: MALFORMED QUERY");
        assert!(!err.is_transport());
    }

    #[test]
    fn test_rate_limited_error() {
        let err = StoreError::RateLimited(60);
        assert_eq!(err.to_string(), "Rate limited, retry after 60 seconds");
        assert!(!err.is_transport());
    }
}
