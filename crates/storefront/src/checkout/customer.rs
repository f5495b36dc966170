//! Session user to customer entity resolution.
//!
//! Caches resolved customers using `moka` (5-minute TTL). Users are created
//! by an external collaborator and never renamed, so a cached mapping only
//! goes stale if the user is deleted.

use std::time::Duration;

use moka::future::Cache;
use tracing::{debug, instrument, warn};

use crate::error::{CheckoutError, LookupError};
use crate::store::{Iri, KnowledgeStore, Literal, SelectQuery, Term, Triple, Var, Vocabulary};

const USER: Var = Var("user");

/// Resolves usernames to `NormalUser` entities.
#[derive(Clone)]
pub struct CustomerDirectory {
    cache: Cache<String, Iri>,
}

impl Default for CustomerDirectory {
    fn default() -> Self {
        Self::new()
    }
}

impl CustomerDirectory {
    #[must_use]
    pub fn new() -> Self {
        let cache = Cache::builder()
            .max_capacity(1000)
            .time_to_live(Duration::from_secs(300)) // 5 minutes
            .build();
        Self { cache }
    }

    /// Query for the `NormalUser` entity with `username`.
    #[must_use]
    pub fn query(vocab: &Vocabulary, username: &str) -> SelectQuery {
        SelectQuery::builder("FindCustomer")
            .var(USER)
            .pattern(Triple::new(USER, Term::Type, &vocab.normal_user))
            .pattern(Triple::new(
                USER,
                &vocab.has_username,
                Literal::string(username),
            ))
            .build()
    }

    /// Resolve `username` to its customer entity.
    ///
    /// # Errors
    ///
    /// Returns [`LookupError::UnknownCustomer`] if no `NormalUser` has that
    /// username, or a network or store error if the query fails.
    #[instrument(skip(self, store, vocab))]
    pub async fn resolve<S: KnowledgeStore>(
        &self,
        store: &S,
        vocab: &Vocabulary,
        username: &str,
    ) -> Result<Iri, CheckoutError> {
        if let Some(customer) = self.cache.get(username).await {
            debug!(customer = %customer, "Customer cache hit");
            return Ok(customer);
        }

        let solutions = store.select(&Self::query(vocab, username)).await?;
        let mut customers = solutions
            .rows
            .iter()
            .map(|row| row.iri(USER.0))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| LookupError::MalformedFact(e.to_string()))?;
        customers.sort();
        customers.dedup();

        let customer = match customers.as_slice() {
            [] => return Err(LookupError::UnknownCustomer(username.to_string()).into()),
            [only] => only.clone(),
            [first, ..] => {
                warn!(matches = customers.len(), "Several customers share a username, using the first");
                first.clone()
            }
        };

        self.cache
            .insert(username.to_string(), customer.clone())
            .await;
        debug!(customer = %customer, "Customer resolved");
        Ok(customer)
    }

    /// Forget every cached customer.
    pub async fn invalidate_all(&self) {
        self.cache.invalidate_all();
        self.cache.run_pending_tasks().await;
    }
}
