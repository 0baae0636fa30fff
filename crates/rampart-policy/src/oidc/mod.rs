//! OIDC compiler
//!
//! Resolves the client secret, discovers provider endpoints when they are
//! not given explicitly, and validates the token and redirect URLs the
//! data plane will use.

pub mod discovery;

use std::net::IpAddr;

use url::{Host, Url};

use rampart_common::crd::{OidcPolicy, OidcProviderConfig, SecurityPolicy, OIDC_CLIENT_SECRET_KEY};
use rampart_common::kube_utils::{name_of, namespace_of, short_digest};

use crate::ir::{Oidc, OidcProvider};
use crate::resources::{secret_value, CrossNamespaceFrom, ResourceStore};
use crate::secrets::validate_secret_ref;
use crate::{Error, Result};

pub use discovery::{HttpIssuerDiscovery, IssuerDiscovery};

/// Callback URL used when the policy sets none; same origin as the request
pub const DEFAULT_REDIRECT_URL: &str = "%REQ(x-forwarded-proto)%://%REQ(:authority)%/oauth2/callback";

/// Path component of [`DEFAULT_REDIRECT_URL`]
pub const DEFAULT_REDIRECT_PATH: &str = "/oauth2/callback";

/// Logout path used when the policy sets none
pub const DEFAULT_LOGOUT_PATH: &str = "/logout";

const SCOPE_OPENID: &str = "openid";

/// Scheme placeholder the data plane expands to the request's scheme
const FORWARDED_PROTO_SCHEME: &str = "%REQ(x-forwarded-proto)%";

/// Compile the policy's OIDC settings
pub async fn build_oidc(
    policy: &SecurityPolicy,
    oidc: &OidcPolicy,
    from: &CrossNamespaceFrom,
    store: &dyn ResourceStore,
    discovery: &dyn IssuerDiscovery,
) -> Result<Oidc> {
    let secret = validate_secret_ref(false, from, &oidc.client_secret, store)?;
    let client_secret = match secret_value(&secret, OIDC_CLIENT_SECRET_KEY) {
        Some(value) if !value.is_empty() => value,
        _ => {
            return Err(Error::external(format!(
                "client secret not found in secret {}/{}",
                namespace_of(&secret.metadata),
                name_of(&secret.metadata)
            )))
        }
    };

    let provider = resolve_provider(&oidc.provider, discovery).await?;
    validate_token_endpoint(&provider.token_endpoint)?;

    let (redirect_url, redirect_path) = match &oidc.redirect_url {
        Some(url) => (url.clone(), extract_redirect_path(url)?),
        None => (
            DEFAULT_REDIRECT_URL.to_string(),
            DEFAULT_REDIRECT_PATH.to_string(),
        ),
    };

    let uid = policy.metadata.uid.as_deref().unwrap_or_default();

    Ok(Oidc {
        provider,
        client_id: oidc.client_id.clone(),
        client_secret,
        scopes: append_openid_scope_if_not_exist(&oidc.scopes),
        redirect_url,
        redirect_path,
        logout_path: oidc
            .logout_path
            .clone()
            .unwrap_or_else(|| DEFAULT_LOGOUT_PATH.to_string()),
        cookie_suffix: short_digest(uid),
    })
}

/// Use explicit endpoints when both are set, otherwise ask the issuer
async fn resolve_provider(
    provider: &OidcProviderConfig,
    discovery: &dyn IssuerDiscovery,
) -> Result<OidcProvider> {
    match (&provider.token_endpoint, &provider.authorization_endpoint) {
        (Some(token), Some(authorization)) => Ok(OidcProvider {
            token_endpoint: token.clone(),
            authorization_endpoint: authorization.clone(),
        }),
        _ => discovery
            .discover(&provider.issuer)
            .await
            .map_err(|e| e.context("error fetching endpoints from issuer")),
    }
}

/// Reject token endpoints the data plane cannot use as a cluster address
///
/// The host must be a domain name: IPv4 literals (including IPv4-mapped
/// IPv6) are refused.
pub fn validate_token_endpoint(token_endpoint: &str) -> Result<()> {
    let parsed = match Url::parse(token_endpoint) {
        Ok(url) => url,
        Err(url::ParseError::InvalidPort) => {
            return Err(Error::validation(format!(
                "error parsing token endpoint URL port: invalid port in {}",
                token_endpoint
            )))
        }
        Err(e) => {
            return Err(Error::validation(format!(
                "error parsing token endpoint URL: {}",
                e
            )))
        }
    };

    let ip = match parsed.host() {
        Some(Host::Ipv4(v4)) => Some(IpAddr::V4(v4)),
        Some(Host::Ipv6(v6)) => Some(IpAddr::V6(v6)),
        _ => None,
    };
    if ip.is_some_and(|ip| ip.to_canonical().is_ipv4()) {
        return Err(Error::validation(format!(
            "token endpoint URL must be a domain name: {}",
            token_endpoint
        )));
    }
    Ok(())
}

/// Append `openid` unless the scopes already contain it
pub fn append_openid_scope_if_not_exist(scopes: &[String]) -> Vec<String> {
    let mut scopes = scopes.to_vec();
    if !scopes.iter().any(|s| s == SCOPE_OPENID) {
        scopes.push(SCOPE_OPENID.to_string());
    }
    scopes
}

/// Extract the path of a redirect URL
///
/// The URL must be `<scheme>://<host>/<path>` with scheme `http`, `https` or
/// the forwarded-proto placeholder, a non-empty host, and a path other than
/// `/`. The host may itself be a placeholder, so this is not parsed as a URL.
pub fn extract_redirect_path(redirect_url: &str) -> Result<String> {
    let invalid = || Error::validation(format!("invalid redirect URL {}", redirect_url));

    let scheme_end = redirect_url.find("://").filter(|&i| i > 0).ok_or_else(invalid)?;
    let scheme = &redirect_url[..scheme_end];
    if !matches!(scheme, "http" | "https" | FORWARDED_PROTO_SCHEME) {
        return Err(invalid());
    }

    let rest = &redirect_url[scheme_end + 3..];
    let host_end = rest.find('/').filter(|&i| i > 0).ok_or_else(invalid)?;
    let path = &rest[host_end..];
    if path == "/" {
        return Err(invalid());
    }
    Ok(path.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oidc::discovery::MockIssuerDiscovery;
    use crate::resources::Resources;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
    use rampart_common::crd::{PolicyTargetReference, SecretObjectReference, SecurityPolicySpec};

    // =========================================================================
    // Helpers
    // =========================================================================

    fn policy() -> SecurityPolicy {
        let mut p = SecurityPolicy::new(
            "oidc",
            SecurityPolicySpec {
                target_ref: PolicyTargetReference::gateway("eg"),
                ..Default::default()
            },
        );
        p.metadata = ObjectMeta {
            name: Some("oidc".to_string()),
            namespace: Some("default".to_string()),
            uid: Some("b7d8ea5d-4d5b-4a5e-9c0f-6f5f0d6f4f31".to_string()),
            ..Default::default()
        };
        p
    }

    fn from() -> CrossNamespaceFrom {
        CrossNamespaceFrom {
            group: rampart_common::RAMPART_GROUP.to_string(),
            kind: "SecurityPolicy".to_string(),
            namespace: "default".to_string(),
        }
    }

    fn store() -> Resources {
        Resources::from_yaml(
            r#"
kind: Secret
metadata: {name: client, namespace: default}
data:
  client-secret: c2VjcmV0
---
kind: Secret
metadata: {name: no-key, namespace: default}
data:
  other: c2VjcmV0
"#,
        )
        .expect("parse secrets")
    }

    fn oidc_spec(token: Option<&str>, auth: Option<&str>) -> OidcPolicy {
        OidcPolicy {
            provider: OidcProviderConfig {
                issuer: "https://accounts.example.com".to_string(),
                token_endpoint: token.map(str::to_string),
                authorization_endpoint: auth.map(str::to_string),
            },
            client_id: "client-id".to_string(),
            client_secret: SecretObjectReference::local("client"),
            scopes: vec!["email".to_string()],
            redirect_url: None,
            logout_path: None,
        }
    }

    fn no_discovery() -> MockIssuerDiscovery {
        let mut discovery = MockIssuerDiscovery::new();
        discovery.expect_discover().never();
        discovery
    }

    // =========================================================================
    // build_oidc
    // =========================================================================

    #[tokio::test]
    async fn explicit_endpoints_skip_discovery() {
        let spec = oidc_spec(
            Some("https://oauth2.example.com/token"),
            Some("https://accounts.example.com/auth"),
        );
        let oidc = build_oidc(&policy(), &spec, &from(), &store(), &no_discovery())
            .await
            .expect("build");

        assert_eq!(oidc.provider.token_endpoint, "https://oauth2.example.com/token");
        assert_eq!(oidc.client_secret, b"secret");
        assert_eq!(oidc.scopes, vec!["email", "openid"]);
        assert_eq!(oidc.redirect_url, DEFAULT_REDIRECT_URL);
        assert_eq!(oidc.redirect_path, DEFAULT_REDIRECT_PATH);
        assert_eq!(oidc.logout_path, DEFAULT_LOGOUT_PATH);
        assert_eq!(
            oidc.cookie_suffix,
            short_digest("b7d8ea5d-4d5b-4a5e-9c0f-6f5f0d6f4f31")
        );
        assert_eq!(oidc.cookie_suffix.len(), 8);
    }

    #[tokio::test]
    async fn missing_endpoint_triggers_discovery() {
        let mut discovery = MockIssuerDiscovery::new();
        discovery
            .expect_discover()
            .withf(|issuer| issuer == "https://accounts.example.com")
            .times(1)
            .returning(|_| {
                Ok(OidcProvider {
                    token_endpoint: "https://oauth2.example.com/token".to_string(),
                    authorization_endpoint: "https://accounts.example.com/auth".to_string(),
                })
            });

        let spec = oidc_spec(Some("https://ignored.example.com/token"), None);
        let oidc = build_oidc(&policy(), &spec, &from(), &store(), &discovery)
            .await
            .expect("build");
        assert_eq!(
            oidc.provider.authorization_endpoint,
            "https://accounts.example.com/auth"
        );
        assert_eq!(oidc.provider.token_endpoint, "https://oauth2.example.com/token");
    }

    #[tokio::test]
    async fn discovery_failure_is_wrapped() {
        let mut discovery = MockIssuerDiscovery::new();
        discovery
            .expect_discover()
            .returning(|_| Err(Error::external("connection refused")));

        let err = build_oidc(&policy(), &oidc_spec(None, None), &from(), &store(), &discovery)
            .await
            .expect_err("discovery fails");
        assert_eq!(
            err.to_string(),
            "error fetching endpoints from issuer: connection refused"
        );
    }

    #[tokio::test]
    async fn secret_without_client_secret_key() {
        let mut spec = oidc_spec(None, None);
        spec.client_secret = SecretObjectReference::local("no-key");

        let err = build_oidc(&policy(), &spec, &from(), &store(), &no_discovery())
            .await
            .expect_err("no key");
        assert_eq!(
            err.to_string(),
            "client secret not found in secret default/no-key"
        );
        assert!(matches!(err, Error::ExternalResolution { .. }));
    }

    #[tokio::test]
    async fn ip_token_endpoint_is_rejected() {
        let spec = oidc_spec(
            Some("https://203.0.113.5/token"),
            Some("https://accounts.example.com/auth"),
        );
        let err = build_oidc(&policy(), &spec, &from(), &store(), &no_discovery())
            .await
            .expect_err("ip endpoint");
        assert_eq!(
            err.to_string(),
            "token endpoint URL must be a domain name: https://203.0.113.5/token"
        );
    }

    #[tokio::test]
    async fn explicit_redirect_and_logout() {
        let mut spec = oidc_spec(
            Some("https://oauth2.example.com/token"),
            Some("https://accounts.example.com/auth"),
        );
        spec.redirect_url = Some("https://www.example.com/foo/callback".to_string());
        spec.logout_path = Some("/signout".to_string());

        let oidc = build_oidc(&policy(), &spec, &from(), &store(), &no_discovery())
            .await
            .expect("build");
        assert_eq!(oidc.redirect_url, "https://www.example.com/foo/callback");
        assert_eq!(oidc.redirect_path, "/foo/callback");
        assert_eq!(oidc.logout_path, "/signout");
    }

    // =========================================================================
    // Validators
    // =========================================================================

    #[test]
    fn token_endpoint_validation() {
        assert!(validate_token_endpoint("https://oauth2.example.com/token").is_ok());
        assert!(validate_token_endpoint("https://oauth2.example.com:8443/token").is_ok());
        assert!(validate_token_endpoint("https://[2001:db8::1]/token").is_ok());

        let err = validate_token_endpoint("https://[::ffff:203.0.113.5]/token")
            .expect_err("mapped v4");
        assert!(err.to_string().starts_with("token endpoint URL must be a domain name"));

        let err = validate_token_endpoint("https://oauth2.example.com:abc/token")
            .expect_err("bad port");
        assert!(err.to_string().starts_with("error parsing token endpoint URL port"));

        let err = validate_token_endpoint("not a url").expect_err("unparseable");
        assert!(err.to_string().starts_with("error parsing token endpoint URL:"));
    }

    #[test]
    fn openid_scope_appended_once() {
        assert_eq!(
            append_openid_scope_if_not_exist(&["profile".to_string()]),
            vec!["profile", "openid"]
        );
        assert_eq!(
            append_openid_scope_if_not_exist(&["openid".to_string(), "email".to_string()]),
            vec!["openid", "email"]
        );
        assert_eq!(append_openid_scope_if_not_exist(&[]), vec!["openid"]);
    }

    #[test]
    fn redirect_path_extraction() {
        assert_eq!(
            extract_redirect_path("https://host/cb").expect("valid"),
            "/cb"
        );
        assert_eq!(
            extract_redirect_path("%REQ(x-forwarded-proto)%://%REQ(:authority)%/oauth2/callback")
                .expect("placeholder"),
            "/oauth2/callback"
        );

        for bad in [
            "https://host/",
            "ftp://host/cb",
            "://host/cb",
            "https:///cb",
            "https://host",
            "host/cb",
        ] {
            let err = extract_redirect_path(bad).expect_err(bad);
            assert_eq!(err.to_string(), format!("invalid redirect URL {}", bad));
        }
    }
}
