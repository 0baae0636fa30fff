//! SecurityPolicy CRD
//!
//! A SecurityPolicy attaches CORS, JWT, OIDC, Basic Auth and external
//! authorization settings to exactly one Gateway API route or Gateway.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::types::{BackendObjectReference, Condition, SecretObjectReference};
use crate::kube_utils::{name_of, namespace_of, namespaced_name};
use crate::{GATEWAY_API_GROUP, KIND_GATEWAY};

/// Key in the OIDC client Secret holding the client secret
pub const OIDC_CLIENT_SECRET_KEY: &str = "client-secret";

/// Key in the Basic Auth Secret holding the htpasswd file
pub const BASIC_AUTH_USERS_SECRET_KEY: &str = ".htpasswd";

/// SecurityPolicy defines the authentication and authorization settings for
/// the routes behind a Gateway or a single xRoute.
///
/// Example:
/// ```yaml
/// apiVersion: gateway.rampart.dev/v1alpha1
/// kind: SecurityPolicy
/// metadata:
///   name: backend-auth
///   namespace: default
/// spec:
///   targetRef:
///     group: gateway.networking.k8s.io
///     kind: HTTPRoute
///     name: backend
///   cors:
///     allowOrigins:
///       - "https://*.example.com"
///   basicAuth:
///     users:
///       name: basic-auth-users
/// ```
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "gateway.rampart.dev",
    version = "v1alpha1",
    kind = "SecurityPolicy",
    namespaced,
    status = "SecurityPolicyStatus",
    shortname = "sp",
    printcolumn = r#"{"name":"Target","type":"string","jsonPath":".spec.targetRef.name"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct SecurityPolicySpec {
    /// The Gateway or xRoute this policy applies to
    pub target_ref: PolicyTargetReference,

    /// Cross-Origin Resource Sharing settings
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cors: Option<CorsPolicy>,

    /// JWT authentication settings
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jwt: Option<JwtPolicy>,

    /// OpenID Connect authentication settings
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub oidc: Option<OidcPolicy>,

    /// HTTP Basic Authentication settings
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub basic_auth: Option<BasicAuthPolicy>,

    /// External authorization settings
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ext_auth: Option<ExtAuthPolicy>,
}

/// Reference to the policy target
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PolicyTargetReference {
    /// API group of the target (gateway.networking.k8s.io)
    #[serde(default = "default_target_group")]
    pub group: String,

    /// Kind of the target: Gateway, HTTPRoute, GRPCRoute, TLSRoute, TCPRoute or UDPRoute
    pub kind: String,

    /// Name of the target
    pub name: String,

    /// Namespace of the target; defaults to the policy namespace
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
}

fn default_target_group() -> String {
    GATEWAY_API_GROUP.to_string()
}

impl PolicyTargetReference {
    /// Target a Gateway in the policy namespace
    pub fn gateway(name: impl Into<String>) -> Self {
        Self {
            group: default_target_group(),
            kind: KIND_GATEWAY.to_string(),
            name: name.into(),
            namespace: None,
        }
    }

    /// Target a route of the given kind in the policy namespace
    pub fn route(kind: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            group: default_target_group(),
            kind: kind.into(),
            name: name.into(),
            namespace: None,
        }
    }
}

/// CORS settings
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CorsPolicy {
    /// Allowed origins; `*` acts as a wildcard (e.g. `https://*.example.com`)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub allow_origins: Vec<String>,

    /// Allowed HTTP methods
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub allow_methods: Vec<String>,

    /// Allowed request headers
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub allow_headers: Vec<String>,

    /// Response headers exposed to the browser
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub expose_headers: Vec<String>,

    /// How long preflight results may be cached (e.g. "10m")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_age: Option<String>,

    /// Whether credentials may be sent (default: false)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allow_credentials: Option<bool>,
}

/// JWT authentication settings
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct JwtPolicy {
    /// JWT providers tried in order
    pub providers: Vec<JwtProvider>,
}

/// A JWT issuer and how to verify its tokens
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct JwtProvider {
    /// Unique provider name
    pub name: String,

    /// Expected `iss` claim
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issuer: Option<String>,

    /// Accepted `aud` claims
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub audiences: Vec<String>,

    /// Where to fetch the verification keys
    pub remote_jwks: RemoteJwks,

    /// Claims copied into request headers after verification
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub claim_to_headers: Vec<ClaimToHeader>,
}

/// Remote JSON Web Key Set location
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RemoteJwks {
    /// HTTPS URI of the JWKS document
    pub uri: String,
}

/// Mapping of a JWT claim to a request header
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ClaimToHeader {
    /// Header to set
    pub header: String,
    /// Claim to read
    pub claim: String,
}

/// OpenID Connect settings
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct OidcPolicy {
    /// Identity provider
    pub provider: OidcProviderConfig,

    /// OAuth client id
    #[serde(rename = "clientID")]
    pub client_id: String,

    /// Secret holding the client secret under the `client-secret` key
    pub client_secret: SecretObjectReference,

    /// Requested scopes; `openid` is always added
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub scopes: Vec<String>,

    /// OAuth callback URL (default: same-origin `/oauth2/callback`)
    #[serde(
        default,
        rename = "redirectURL",
        skip_serializing_if = "Option::is_none"
    )]
    pub redirect_url: Option<String>,

    /// Path that clears the session (default: `/logout`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logout_path: Option<String>,
}

/// OIDC identity provider endpoints
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct OidcProviderConfig {
    /// Issuer URL; must serve `.well-known/openid-configuration` when
    /// endpoints are not given explicitly
    pub issuer: String,

    /// Authorization endpoint override
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authorization_endpoint: Option<String>,

    /// Token endpoint override
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_endpoint: Option<String>,
}

/// HTTP Basic Authentication settings
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BasicAuthPolicy {
    /// Secret holding an htpasswd file under the `.htpasswd` key
    pub users: SecretObjectReference,
}

/// External authorization settings; exactly one of `grpc` or `http` is set
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ExtAuthPolicy {
    /// gRPC authorization service (envoy.service.auth.v3.Authorization)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grpc: Option<GrpcExtAuthService>,

    /// HTTP authorization service
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub http: Option<HttpExtAuthService>,

    /// Client request headers forwarded to the authorization service
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub headers_to_ext_auth: Vec<String>,
}

/// gRPC external authorization service
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GrpcExtAuthService {
    /// Service backing the authorization server
    pub backend_ref: BackendObjectReference,
}

/// HTTP external authorization service
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct HttpExtAuthService {
    /// Service backing the authorization server
    pub backend_ref: BackendObjectReference,

    /// Path prefix prepended to the original request path
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,

    /// Authorization response headers copied onto the upstream request
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub headers_to_backend: Vec<String>,
}

/// SecurityPolicy status
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SecurityPolicyStatus {
    /// Accepted / Overridden conditions
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,
}

impl SecurityPolicy {
    /// Namespace of the policy
    pub fn namespace_str(&self) -> &str {
        namespace_of(&self.metadata)
    }

    /// Name of the policy
    pub fn name_str(&self) -> &str {
        name_of(&self.metadata)
    }

    /// `namespace/name` of the policy, for logs and holder tracking
    pub fn key(&self) -> String {
        namespaced_name(self.namespace_str(), self.name_str())
    }

    /// Whether the policy targets a Gateway rather than a route
    pub fn targets_gateway(&self) -> bool {
        self.spec.target_ref.kind == KIND_GATEWAY
    }

    /// Target namespace, defaulting to the policy namespace
    pub fn target_namespace(&self) -> &str {
        self.spec
            .target_ref
            .namespace
            .as_deref()
            .unwrap_or_else(|| self.namespace_str())
    }

    /// Conditions recorded so far
    pub fn conditions(&self) -> &[Condition] {
        self.status
            .as_ref()
            .map(|s| s.conditions.as_slice())
            .unwrap_or_default()
    }

    /// Look up a condition by type
    pub fn condition(&self, type_: &str) -> Option<&Condition> {
        self.conditions().iter().find(|c| c.type_ == type_)
    }
}
