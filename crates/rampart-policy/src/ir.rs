//! Proxy-facing intermediate representation
//!
//! Only the slice of the IR that security policies touch: the per-route
//! feature slots and the destinations ExtAuth points at. Listener and
//! cluster translation happen elsewhere and populate the rest.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use rampart_common::crd::JwtProvider;

/// IR per gateway, keyed by `namespace/name` (or GatewayClass name when
/// gateways are merged)
pub type XdsIrMap = BTreeMap<String, Xds>;

/// IR for one gateway (or merged gateway class)
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Xds {
    /// HTTP listeners
    #[serde(default)]
    pub http: Vec<HttpListener>,
}

/// HTTP listener; name is `namespace/gateway/listener`
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct HttpListener {
    /// Listener name
    pub name: String,
    /// Routes served on this listener
    #[serde(default)]
    pub routes: Vec<HttpRoute>,
}

impl HttpListener {
    /// The `namespace/gateway` prefix of the listener name
    pub fn gateway_prefix(&self) -> &str {
        match self.name.rfind('/') {
            Some(idx) => &self.name[..idx],
            None => "",
        }
    }
}

/// HTTP route and the security features applied to it
///
/// Names start with `<lowercase kind>/<namespace>/<name>/` of the xRoute
/// the IR route was generated from.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct HttpRoute {
    /// Route name
    pub name: String,
    /// CORS settings
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cors: Option<Cors>,
    /// JWT authentication
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jwt: Option<Jwt>,
    /// OIDC authentication
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub oidc: Option<Oidc>,
    /// Basic authentication
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub basic_auth: Option<BasicAuth>,
    /// External authorization
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ext_auth: Option<ExtAuth>,
}

/// How compiled features are written into an IR route
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MergeMode {
    /// Replace every slot, clearing those the policy leaves unset
    Overwrite,
    /// Only fill slots that are still empty
    FillEmpty,
}

/// The five feature slots a single policy compiles to
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SecurityFeatures {
    /// CORS settings
    pub cors: Option<Cors>,
    /// JWT authentication
    pub jwt: Option<Jwt>,
    /// OIDC authentication
    pub oidc: Option<Oidc>,
    /// Basic authentication
    pub basic_auth: Option<BasicAuth>,
    /// External authorization
    pub ext_auth: Option<ExtAuth>,
}

impl HttpRoute {
    /// Create an IR route with no features
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Write `features` into this route's slots according to `mode`
    pub fn merge_features(&mut self, features: &SecurityFeatures, mode: MergeMode) {
        match mode {
            MergeMode::Overwrite => {
                self.cors = features.cors.clone();
                self.jwt = features.jwt.clone();
                self.oidc = features.oidc.clone();
                self.basic_auth = features.basic_auth.clone();
                self.ext_auth = features.ext_auth.clone();
            }
            MergeMode::FillEmpty => {
                fill(&mut self.cors, &features.cors);
                fill(&mut self.jwt, &features.jwt);
                fill(&mut self.oidc, &features.oidc);
                fill(&mut self.basic_auth, &features.basic_auth);
                fill(&mut self.ext_auth, &features.ext_auth);
            }
        }
    }
}

fn fill<T: Clone>(slot: &mut Option<T>, value: &Option<T>) {
    if slot.is_none() {
        slot.clone_from(value);
    }
}

// =============================================================================
// Feature fragments
// =============================================================================

/// String matcher for CORS origins
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum StringMatch {
    /// Exact string comparison
    Exact(String),
    /// RE2-compatible regular expression
    SafeRegex(String),
}

/// Compiled CORS settings
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Cors {
    /// Origin matchers
    pub allow_origins: Vec<StringMatch>,
    /// Allowed methods
    pub allow_methods: Vec<String>,
    /// Allowed request headers
    pub allow_headers: Vec<String>,
    /// Exposed response headers
    pub expose_headers: Vec<String>,
    /// Preflight cache duration
    pub max_age: Option<String>,
    /// Whether credentials are allowed
    pub allow_credentials: bool,
}

/// Compiled JWT settings
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Jwt {
    /// Providers, passed through unchanged
    pub providers: Vec<JwtProvider>,
}

/// OAuth2 endpoints of an OIDC provider
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct OidcProvider {
    /// Token endpoint
    pub token_endpoint: String,
    /// Authorization endpoint
    pub authorization_endpoint: String,
}

/// Compiled OIDC settings
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Oidc {
    /// Provider endpoints
    pub provider: OidcProvider,
    /// OAuth client id
    pub client_id: String,
    /// OAuth client secret
    pub client_secret: Vec<u8>,
    /// Requested scopes, always including `openid`
    pub scopes: Vec<String>,
    /// Callback URL
    pub redirect_url: String,
    /// Path component of the callback URL
    pub redirect_path: String,
    /// Path that clears the session
    pub logout_path: String,
    /// Suffix making session cookie names unique per policy
    pub cookie_suffix: String,
}

/// Compiled basic authentication settings
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BasicAuth {
    /// htpasswd file contents
    pub users: Vec<u8>,
}

/// Compiled external authorization settings
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ExtAuth {
    /// HTTP authorization service
    pub http: Option<HttpExtAuthService>,
    /// gRPC authorization service
    pub grpc: Option<GrpcExtAuthService>,
    /// Client request headers sent to the authorization service
    pub headers_to_ext_auth: Vec<String>,
}

/// HTTP authorization service
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct HttpExtAuthService {
    /// Where authorization requests go
    pub destination: RouteDestination,
    /// `:authority` of authorization requests
    pub authority: String,
    /// Path prefix for authorization requests
    pub path: String,
    /// Authorization response headers copied upstream
    pub headers_to_backend: Vec<String>,
}

/// gRPC authorization service
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GrpcExtAuthService {
    /// Where authorization requests go
    pub destination: RouteDestination,
    /// `:authority` of authorization requests
    pub authority: String,
}

// =============================================================================
// Destinations
// =============================================================================

/// A named upstream with weighted endpoint groups
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RouteDestination {
    /// Unique destination name
    pub name: String,
    /// Endpoint groups
    pub settings: Vec<DestinationSetting>,
}

/// One weighted group of endpoints
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DestinationSetting {
    /// Relative weight
    pub weight: Option<u32>,
    /// Upstream protocol
    pub protocol: AppProtocol,
    /// Upstream endpoints
    pub endpoints: Vec<DestinationEndpoint>,
    /// Address type shared by all endpoints; unset for ClusterIP routing
    pub address_type: Option<DestinationAddressType>,
}

/// Upstream application protocol
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum AppProtocol {
    /// HTTP/1.1
    #[default]
    Http,
    /// HTTP/2 (cleartext or TLS)
    Http2,
    /// gRPC
    Grpc,
}

/// A host and port to connect to
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DestinationEndpoint {
    /// IP address or hostname
    pub host: String,
    /// Port
    pub port: u32,
}

impl DestinationEndpoint {
    /// Create an endpoint
    pub fn new(host: impl Into<String>, port: u32) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

/// How endpoint hosts should be interpreted
#[derive(Clone, Copy, Debug, Deserialize, Serialize, PartialEq, Eq)]
pub enum DestinationAddressType {
    /// IP addresses
    #[serde(rename = "IP")]
    Ip,
    /// DNS names
    #[serde(rename = "FQDN")]
    Fqdn,
    /// Both; not supported by the data plane
    Mixed,
}
