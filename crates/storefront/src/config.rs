//! Storefront configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Required
//! - `KNOWLEDGE_STORE_URL` - Base URL of the graph store server (e.g., `http://localhost:7200`)
//!
//! ## Optional
//! - `KNOWLEDGE_STORE_REPOSITORY` - Repository name (default: `Super_Market`)
//! - `KNOWLEDGE_STORE_USERNAME` - HTTP basic auth user
//! - `KNOWLEDGE_STORE_PASSWORD` - HTTP basic auth password
//! - `KNOWLEDGE_STORE_TIMEOUT_SECS` - Per-request transport timeout (default: 30)
//! - `KNOWLEDGE_STORE_ATOMIC_UPDATES` - Whether one update request is applied
//!   all-or-nothing by the store (default: true)
//! - `STOREFRONT_BASE_IRI` - Namespace of catalog and order entities
//!   (default: `http://www.semanticweb.org/My_Super/`)
//! - `STOREFRONT_STATE_DIR` - Directory for the persisted cart and session (default: `.storefront`)
//! - `SENTRY_DSN` - Sentry error tracking DSN, for the host application

use std::path::PathBuf;
use std::time::Duration;

use secrecy::SecretString;
use thiserror::Error;
use url::Url;

use crate::store::vocab::DEFAULT_BASE_IRI;

const DEFAULT_REPOSITORY: &str = "Super_Market";
const DEFAULT_TIMEOUT_SECS: &str = "30";
const DEFAULT_STATE_DIR: &str = ".storefront";

/// Configuration errors that can occur during loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
}

/// Storefront configuration.
#[derive(Debug, Clone)]
pub struct StorefrontConfig {
    /// Knowledge store connection settings
    pub store: KnowledgeStoreConfig,
    /// Namespace of catalog, user, and order entities
    pub base_iri: String,
    /// Directory holding `cart.json` and `loggedInUser.json`
    pub state_dir: PathBuf,
    /// Sentry DSN for error tracking
    pub sentry_dsn: Option<String>,
}

/// Knowledge store connection settings.
///
/// Implements `Debug` manually to redact the password.
#[derive(Clone)]
pub struct KnowledgeStoreConfig {
    /// Base URL of the store server
    pub url: Url,
    /// Repository name
    pub repository: String,
    /// SELECT endpoint (`{url}/repositories/{repository}`)
    pub query_endpoint: Url,
    /// Update endpoint (`{url}/repositories/{repository}/statements`)
    pub update_endpoint: Url,
    /// HTTP basic auth user
    pub username: Option<String>,
    /// HTTP basic auth password
    pub password: Option<SecretString>,
    /// Transport timeout per request
    pub timeout: Duration,
    /// Whether the store applies one update request all-or-nothing
    pub atomic_updates: bool,
}

impl std::fmt::Debug for KnowledgeStoreConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KnowledgeStoreConfig")
            .field("url", &self.url.as_str())
            .field("repository", &self.repository)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "[REDACTED]"))
            .field("timeout", &self.timeout)
            .field("atomic_updates", &self.atomic_updates)
            .finish_non_exhaustive()
    }
}

impl StorefrontConfig {
    /// Load configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv()` to load from `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if required variables are missing or invalid.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from an arbitrary variable source.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if required variables are missing or invalid.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let env = Env(&lookup);

        let base_iri = env.or_default("STOREFRONT_BASE_IRI", DEFAULT_BASE_IRI);
        crate::store::Vocabulary::new(&base_iri).map_err(|e| {
            ConfigError::InvalidEnvVar("STOREFRONT_BASE_IRI".to_string(), e.to_string())
        })?;

        Ok(Self {
            store: KnowledgeStoreConfig::from_lookup(&env)?,
            base_iri,
            state_dir: PathBuf::from(env.or_default("STOREFRONT_STATE_DIR", DEFAULT_STATE_DIR)),
            sentry_dsn: env.optional("SENTRY_DSN"),
        })
    }
}

impl KnowledgeStoreConfig {
    /// Build a configuration for a store URL and repository with default settings.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the URL or repository name is invalid.
    pub fn new(url: &str, repository: &str) -> Result<Self, ConfigError> {
        let url = Url::parse(url).map_err(|e| {
            ConfigError::InvalidEnvVar("KNOWLEDGE_STORE_URL".to_string(), e.to_string())
        })?;
        if url.cannot_be_a_base() {
            return Err(ConfigError::InvalidEnvVar(
                "KNOWLEDGE_STORE_URL".to_string(),
                "must be an http(s) base URL".to_string(),
            ));
        }
        if repository.is_empty()
            || !repository
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
        {
            return Err(ConfigError::InvalidEnvVar(
                "KNOWLEDGE_STORE_REPOSITORY".to_string(),
                format!("{repository:?} is not a valid repository name"),
            ));
        }

        let query_endpoint = endpoint(&url, &["repositories", repository])?;
        let update_endpoint = endpoint(&url, &["repositories", repository, "statements"])?;

        Ok(Self {
            url,
            repository: repository.to_string(),
            query_endpoint,
            update_endpoint,
            username: None,
            password: None,
            timeout: Duration::from_secs(30),
            atomic_updates: true,
        })
    }

    fn from_lookup(env: &Env<'_>) -> Result<Self, ConfigError> {
        let mut config = Self::new(
            &env.required("KNOWLEDGE_STORE_URL")?,
            &env.or_default("KNOWLEDGE_STORE_REPOSITORY", DEFAULT_REPOSITORY),
        )?;

        config.username = env.optional("KNOWLEDGE_STORE_USERNAME");
        config.password = env.optional("KNOWLEDGE_STORE_PASSWORD").map(SecretString::from);

        let timeout_secs = env
            .or_default("KNOWLEDGE_STORE_TIMEOUT_SECS", DEFAULT_TIMEOUT_SECS)
            .parse::<u64>()
            .map_err(|e| {
                ConfigError::InvalidEnvVar("KNOWLEDGE_STORE_TIMEOUT_SECS".to_string(), e.to_string())
            })?;
        config.timeout = Duration::from_secs(timeout_secs);

        config.atomic_updates = parse_bool(
            "KNOWLEDGE_STORE_ATOMIC_UPDATES",
            &env.or_default("KNOWLEDGE_STORE_ATOMIC_UPDATES", "true"),
        )?;

        Ok(config)
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

/// Variable source wrapper.
struct Env<'a>(&'a dyn Fn(&str) -> Option<String>);

impl Env<'_> {
    /// Get a required variable.
    fn required(&self, key: &str) -> Result<String, ConfigError> {
        (self.0)(key).ok_or_else(|| ConfigError::MissingEnvVar(key.to_string()))
    }

    /// Get an optional variable. Empty values count as unset.
    fn optional(&self, key: &str) -> Option<String> {
        (self.0)(key).filter(|v| !v.is_empty())
    }

    /// Get a variable with a default value.
    fn or_default(&self, key: &str, default: &str) -> String {
        self.optional(key).unwrap_or_else(|| default.to_string())
    }
}

/// Append path segments to a base URL.
fn endpoint(base: &Url, segments: &[&str]) -> Result<Url, ConfigError> {
    let mut url = base.clone();
    url.path_segments_mut()
        .map_err(|()| {
            ConfigError::InvalidEnvVar(
                "KNOWLEDGE_STORE_URL".to_string(),
                "must be an http(s) base URL".to_string(),
            )
        })?
        .pop_if_empty()
        .extend(segments);
    Ok(url)
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    match value.to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" => Ok(false),
        other => Err(ConfigError::InvalidEnvVar(
            key.to_string(),
            format!("expected a boolean, got {other:?}"),
        )),
    }
}
