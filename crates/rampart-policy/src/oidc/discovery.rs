//! OpenID Connect endpoint discovery
//!
//! Fetches `<issuer>/.well-known/openid-configuration` and extracts the token
//! and authorization endpoints. Documents are cached per issuer so a pass
//! with many policies sharing one provider only asks once.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::config::DiscoveryConfig;
use crate::ir::OidcProvider;
use crate::{Error, Result};

/// Resolves an issuer URL to its OAuth2 endpoints
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait IssuerDiscovery: Send + Sync {
    /// Discover the token and authorization endpoints of `issuer`
    async fn discover(&self, issuer: &str) -> Result<OidcProvider>;
}

/// The subset of the discovery document the engine reads
#[derive(Debug, Deserialize)]
struct OpenIdConfiguration {
    token_endpoint: String,
    authorization_endpoint: String,
}

#[derive(Debug, Clone)]
struct CachedProvider {
    provider: OidcProvider,
    fetched_at: Instant,
}

/// [`IssuerDiscovery`] over HTTP(S) with an optional TTL cache
#[derive(Debug)]
pub struct HttpIssuerDiscovery {
    client: reqwest::Client,
    cache: Option<RwLock<HashMap<String, CachedProvider>>>,
    ttl: Duration,
}

impl HttpIssuerDiscovery {
    /// Build a discovery client from configuration
    pub fn new(config: &DiscoveryConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| Error::internal(format!("failed to build discovery client: {}", e)))?;
        Ok(Self::with_client(client, config))
    }

    /// Build a discovery client around an existing HTTP client
    pub fn with_client(client: reqwest::Client, config: &DiscoveryConfig) -> Self {
        Self {
            client,
            cache: config.cache_enabled.then(|| RwLock::new(HashMap::new())),
            ttl: Duration::from_secs(config.cache_ttl_secs),
        }
    }

    /// Drop every cached document
    pub fn clear(&self) {
        if let Some(cache) = &self.cache {
            cache.write().clear();
        }
    }

    fn cached(&self, issuer: &str) -> Option<OidcProvider> {
        let cache = self.cache.as_ref()?.read();
        let entry = cache.get(issuer)?;
        (entry.fetched_at.elapsed() < self.ttl).then(|| entry.provider.clone())
    }

    async fn fetch(&self, issuer: &str) -> Result<OidcProvider> {
        let url = format!(
            "{}/.well-known/openid-configuration",
            issuer.trim_end_matches('/')
        );
        debug!(url = %url, "fetching OIDC discovery document");

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| Error::external(format!("request to {} failed: {}", url, e)))?;

        if !response.status().is_success() {
            return Err(Error::external(format!(
                "unexpected status {} from {}",
                response.status(),
                url
            )));
        }

        let document: OpenIdConfiguration = response
            .json()
            .await
            .map_err(|e| Error::external(format!("invalid discovery document from {}: {}", url, e)))?;

        for (field, value) in [
            ("token_endpoint", &document.token_endpoint),
            ("authorization_endpoint", &document.authorization_endpoint),
        ] {
            if value.is_empty() {
                return Err(Error::external(format!(
                    "invalid discovery document from {}: empty {}",
                    url, field
                )));
            }
        }

        Ok(OidcProvider {
            token_endpoint: document.token_endpoint,
            authorization_endpoint: document.authorization_endpoint,
        })
    }
}

#[async_trait]
impl IssuerDiscovery for HttpIssuerDiscovery {
    async fn discover(&self, issuer: &str) -> Result<OidcProvider> {
        if let Some(provider) = self.cached(issuer) {
            debug!(issuer = %issuer, "OIDC discovery cache hit");
            return Ok(provider);
        }

        let provider = self.fetch(issuer).await.inspect_err(|e| {
            warn!(issuer = %issuer, error = %e, "OIDC discovery failed");
        })?;

        info!(
            issuer = %issuer,
            token_endpoint = %provider.token_endpoint,
            "OIDC endpoints discovered"
        );

        if let Some(cache) = &self.cache {
            cache.write().insert(
                issuer.to_string(),
                CachedProvider {
                    provider: provider.clone(),
                    fetched_at: Instant::now(),
                },
            );
        }
        Ok(provider)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use axum::http::StatusCode;
    use axum::routing::get;
    use axum::{Json, Router};

    /// Serve `router` on an ephemeral port, returning its base URL
    async fn serve(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind");
        let addr = listener.local_addr().expect("local addr");
        tokio::spawn(async move {
            axum::serve(listener, router).await.expect("serve");
        });
        format!("http://{}", addr)
    }

    fn counting_issuer(hits: Arc<AtomicUsize>) -> Router {
        Router::new().route(
            "/.well-known/openid-configuration",
            get(move || {
                let hits = hits.clone();
                async move {
                    hits.fetch_add(1, Ordering::SeqCst);
                    Json(serde_json::json!({
                        "issuer": "https://accounts.example.com",
                        "token_endpoint": "https://oauth2.example.com/token",
                        "authorization_endpoint": "https://accounts.example.com/o/oauth2/v2/auth",
                        "jwks_uri": "https://www.example.com/oauth2/v3/certs"
                    }))
                }
            }),
        )
    }

    #[tokio::test]
    async fn discovers_endpoints_and_trims_trailing_slash() {
        let hits = Arc::new(AtomicUsize::new(0));
        let base = serve(counting_issuer(hits.clone())).await;
        let discovery = HttpIssuerDiscovery::new(&DiscoveryConfig::default()).expect("client");

        let provider = discovery
            .discover(&format!("{}/", base))
            .await
            .expect("discover");
        assert_eq!(provider.token_endpoint, "https://oauth2.example.com/token");
        assert_eq!(
            provider.authorization_endpoint,
            "https://accounts.example.com/o/oauth2/v2/auth"
        );
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn cache_serves_repeat_lookups() {
        let hits = Arc::new(AtomicUsize::new(0));
        let base = serve(counting_issuer(hits.clone())).await;
        let discovery = HttpIssuerDiscovery::new(&DiscoveryConfig::default()).expect("client");

        discovery.discover(&base).await.expect("first");
        discovery.discover(&base).await.expect("second");
        assert_eq!(hits.load(Ordering::SeqCst), 1);

        discovery.clear();
        discovery.discover(&base).await.expect("after clear");
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn disabled_cache_always_fetches() {
        let hits = Arc::new(AtomicUsize::new(0));
        let base = serve(counting_issuer(hits.clone())).await;
        let config = DiscoveryConfig {
            cache_enabled: false,
            ..Default::default()
        };
        let discovery = HttpIssuerDiscovery::new(&config).expect("client");

        discovery.discover(&base).await.expect("first");
        discovery.discover(&base).await.expect("second");
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn error_status_is_external_error() {
        let router = Router::new().route(
            "/.well-known/openid-configuration",
            get(|| async { StatusCode::INTERNAL_SERVER_ERROR }),
        );
        let base = serve(router).await;
        let discovery = HttpIssuerDiscovery::new(&DiscoveryConfig::default()).expect("client");

        let err = discovery.discover(&base).await.expect_err("500");
        assert!(matches!(err, Error::ExternalResolution { .. }));
        assert!(err.to_string().contains("unexpected status 500"));
    }

    #[tokio::test]
    async fn malformed_document_is_external_error() {
        let router = Router::new().route(
            "/.well-known/openid-configuration",
            get(|| async { "not json" }),
        );
        let base = serve(router).await;
        let discovery = HttpIssuerDiscovery::new(&DiscoveryConfig::default()).expect("client");

        let err = discovery.discover(&base).await.expect_err("bad json");
        assert!(err.to_string().contains("invalid discovery document"));
    }

    fn document_issuer(document: serde_json::Value) -> Router {
        Router::new().route(
            "/.well-known/openid-configuration",
            get(move || {
                let document = document.clone();
                async move { Json(document) }
            }),
        )
    }

    #[tokio::test]
    async fn incomplete_documents_are_external_errors() {
        let documents = [
            serde_json::json!({"token_endpoint": "https://oauth2.example.com/token"}),
            serde_json::json!({"authorization_endpoint": "https://accounts.example.com/auth"}),
            serde_json::json!({
                "token_endpoint": "https://oauth2.example.com/token",
                "authorization_endpoint": ""
            }),
            serde_json::json!({}),
        ];

        for document in documents {
            let base = serve(document_issuer(document.clone())).await;
            let discovery =
                HttpIssuerDiscovery::new(&DiscoveryConfig::default()).expect("client");

            let err = discovery.discover(&base).await.expect_err("incomplete document");
            assert!(
                matches!(err, Error::ExternalResolution { .. }),
                "{}: {:?}",
                document,
                err
            );
            assert!(err.to_string().contains("invalid discovery document"));
            assert!(discovery.cached(&base).is_none());
        }
    }

    #[tokio::test]
    async fn failures_are_not_cached() {
        let discovery = HttpIssuerDiscovery::new(&DiscoveryConfig::default()).expect("client");
        // Nothing listens on port 1
        let err = discovery
            .discover("http://127.0.0.1:1")
            .await
            .expect_err("connection refused");
        assert!(err.is_retryable());
        assert!(discovery.cached("http://127.0.0.1:1").is_none());
    }
}
