//! HTTP implementation of [`KnowledgeStore`].
//!
//! Uses `reqwest` for the SPARQL 1.1 protocol. Timeouts come from the
//! transport; the workflow does not own any.

use std::sync::Arc;

use reqwest::StatusCode;
use reqwest::header::{ACCEPT, CONTENT_TYPE, RETRY_AFTER};
use secrecy::{ExposeSecret, SecretString};
use tracing::{debug, instrument};
use url::Url;

use super::results::SelectResponse;
use super::{KnowledgeStore, SelectQuery, Solutions, StoreError, UpdateRequest};
use crate::config::KnowledgeStoreConfig;

const SPARQL_RESULTS_JSON: &str = "application/sparql-results+json";
const SPARQL_UPDATE: &str = "application/sparql-update";

/// Client for a SPARQL knowledge store.
///
/// Cheap to clone; clones share one connection pool.
#[derive(Clone)]
pub struct KnowledgeStoreClient {
    inner: Arc<KnowledgeStoreClientInner>,
}

struct KnowledgeStoreClientInner {
    client: reqwest::Client,
    query_endpoint: Url,
    update_endpoint: Url,
    credentials: Option<(String, SecretString)>,
}

impl KnowledgeStoreClient {
    /// Create a new knowledge store client.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be initialized.
    pub fn new(config: &KnowledgeStoreConfig) -> Result<Self, StoreError> {
        let client = reqwest::Client::builder().timeout(config.timeout).build()?;

        let credentials = config.username.clone().map(|user| {
            let password = config
                .password
                .clone()
                .unwrap_or_else(|| SecretString::from(""));
            (user, password)
        });

        Ok(Self {
            inner: Arc::new(KnowledgeStoreClientInner {
                client,
                query_endpoint: config.query_endpoint.clone(),
                update_endpoint: config.update_endpoint.clone(),
                credentials,
            }),
        })
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.inner.credentials {
            Some((user, password)) => request.basic_auth(user, Some(password.expose_secret())),
            None => request,
        }
    }

    /// Send a request and return the body of a successful response.
    async fn send(&self, request: reqwest::RequestBuilder) -> Result<String, StoreError> {
        let response = self.authorize(request).send().await?;

        let status = response.status();

        // Check for rate limiting
        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get(RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.parse::<u64>().ok())
                .unwrap_or(1);
            return Err(StoreError::RateLimited(retry_after));
        }

        // Get response body as text first for better error diagnostics
        let body = response.text().await?;

        if !status.is_success() {
            tracing::error!(
                status = %status,
                body = %body.chars().take(500).collect::<String>(),
                "Knowledge store returned non-success status"
            );
            return Err(StoreError::Status {
                status: status.as_u16(),
                body: body.chars().take(200).collect(),
            });
        }

        Ok(body)
    }
}

impl KnowledgeStore for KnowledgeStoreClient {
    #[instrument(skip(self, query), fields(operation = query.operation()))]
    async fn select(&self, query: &SelectQuery) -> Result<Solutions, StoreError> {
        let mut url = self.inner.query_endpoint.clone();
        url.query_pairs_mut().append_pair("query", query.as_str());

        let request = self
            .inner
            .client
            .get(url)
            .header(ACCEPT, SPARQL_RESULTS_JSON);
        let body = self.send(request).await?;

        let response: SelectResponse = serde_json::from_str(&body).map_err(|e| {
            tracing::error!(
                error = %e,
                body = %body.chars().take(500).collect::<String>(),
                "Failed to parse SPARQL results"
            );
            StoreError::Parse(e)
        })?;

        let solutions = Solutions::from(response);
        debug!(rows = solutions.rows.len(), "Query answered");
        Ok(solutions)
    }

    #[instrument(skip(self, request), fields(operation = request.operation()))]
    async fn update(&self, request: &UpdateRequest) -> Result<(), StoreError> {
        let http_request = self
            .inner
            .client
            .post(self.inner.update_endpoint.clone())
            .header(CONTENT_TYPE, SPARQL_UPDATE)
            .body(request.as_str().to_string());
        self.send(http_request).await?;

        debug!("Update accepted");
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use tokio::task::JoinHandle;

    use super::*;
    use crate::store::sparql::{Literal, UpdateOperation, Var};

    /// Serve one canned HTTP response and hand back the raw request.
    async fn serve_once(status_line: &str, headers: &str, body: &str) -> (String, JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let response = format!(
            "HTTP/1.1 {status_line}\r\n{headers}Content-Length: {}\r\nConnection: close\r\n\r\n{body}",
            body.len()
        );

        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let request = read_request(&mut socket).await;
            socket.write_all(response.as_bytes()).await.unwrap();
            socket.shutdown().await.ok();
            request
        });

        (format!("http://{addr}"), handle)
    }

    async fn read_request(socket: &mut tokio::net::TcpStream) -> String {
        let mut buf = Vec::new();
        let mut chunk = [0u8; 4096];
        loop {
            let n = socket.read(&mut chunk).await.unwrap();
            if n == 0 {
                break;
            }
            buf.extend_from_slice(&chunk[..n]);

            let text = String::from_utf8_lossy(&buf).into_owned();
            if let Some(end) = text.find("\r\n\r\n") {
                let content_length = text[..end]
                    .lines()
                    .find_map(|line| {
                        let (name, value) = line.split_once(':')?;
                        name.eq_ignore_ascii_case("content-length")
                            .then(|| value.trim().parse::<usize>().ok())
                            .flatten()
                    })
                    .unwrap_or(0);
                if buf.len() >= end + 4 + content_length {
                    break;
                }
            }
        }
        String::from_utf8_lossy(&buf).into_owned()
    }

    fn client_for(base: &str) -> KnowledgeStoreClient {
        let config = KnowledgeStoreConfig::new(base, "Super_Market").unwrap();
        KnowledgeStoreClient::new(&config).unwrap()
    }

    fn stock_query() -> SelectQuery {
        SelectQuery::builder("ProductStock")
            .var(Var("stock"))
            .values(Var("productId"), [Literal::string("P1").into()])
            .build()
    }

    #[tokio::test]
    async fn test_select_sends_get_with_query_and_accept() {
        let body = r#"{"head":{"vars":["stock"]},"results":{"bindings":[{"stock":{"type":"literal","value":"4"}}]}}"#;
        let (base, server) = serve_once(
            "200 OK",
            "Content-Type: application/sparql-results+json\r\n",
            body,
        )
        .await;

        let solutions = client_for(&base).select(&stock_query()).await.unwrap();
        assert_eq!(solutions.rows[0].integer("stock").unwrap(), 4);

        let request = server.await.unwrap().to_lowercase();
        assert!(request.starts_with("get /repositories/super_market?query=prefix"));
        assert!(request.contains("accept: application/sparql-results+json"));
    }

    #[tokio::test]
    async fn test_update_posts_sparql_update_body() {
        let (base, server) = serve_once("204 No Content", "", "").await;

        let s = crate::store::Iri::new("http://example.org/s").unwrap();
        let update = UpdateRequest::new(
            "PlaceOrder",
            &[UpdateOperation::InsertData(vec![crate::store::Triple::new(
                &s,
                &s,
                Literal::Integer(1),
            )])],
        );
        client_for(&base).update(&update).await.unwrap();

        let request = server.await.unwrap();
        let lower = request.to_lowercase();
        assert!(lower.starts_with("post /repositories/super_market/statements"));
        assert!(lower.contains("content-type: application/sparql-update"));
        assert!(request.ends_with(update.as_str()));
    }

    #[tokio::test]
    async fn test_update_rejected_is_status_error() {
        let (base, _server) = serve_once("400 Bad Request", "", "MALFORMED QUERY: Lexical error").await;

        let update = UpdateRequest::new("PlaceOrder", &[]);
        let err = client_for(&base).update(&update).await.unwrap_err();
        assert!(matches!(err, StoreError::Status { status: 400, ref body } if body.starts_with("MALFORMED")));
        assert!(!err.is_transport());
    }

    #[tokio::test]
    async fn test_rate_limited() {
        let (base, _server) = serve_once("429 Too Many Requests", "Retry-After: 7\r\n", "").await;

        let err = client_for(&base).select(&stock_query()).await.unwrap_err();
        assert!(matches!(err, StoreError::RateLimited(7)));
    }

    #[tokio::test]
    async fn test_unparsable_results() {
        let (base, _server) = serve_once("200 OK", "", "<html>not json</html>").await;

        let err = client_for(&base).select(&stock_query()).await.unwrap_err();
        assert!(matches!(err, StoreError::Parse(_)));
    }

    #[tokio::test]
    async fn test_unreachable_store_is_transport_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let err = client_for(&format!("http://{addr}"))
            .select(&stock_query())
            .await
            .unwrap_err();
        assert!(err.is_transport());
    }
}
