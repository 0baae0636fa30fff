//! Gateway API resources that SecurityPolicies attach to
//!
//! Only the fields the policy engine reads are modelled: identity, parent
//! references, and enough of each spec to round-trip a snapshot.
//! - **Gateway**: class name and listeners
//! - **xRoutes**: HTTPRoute, GRPCRoute, TLSRoute, TCPRoute, UDPRoute
//!
//! [`RouteContext`] wraps any of the route kinds behind one interface.

use std::fmt;
use std::str::FromStr;

use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use serde::{Deserialize, Serialize};

use crate::kube_utils::{name_of, namespace_of};
use crate::{GATEWAY_API_GROUP, KIND_GATEWAY};

// =============================================================================
// API version / kind plumbing
// =============================================================================

/// Types with a compile-time known apiVersion and kind
pub trait GatewayApiResource {
    /// apiVersion (e.g., gateway.networking.k8s.io/v1)
    const API_VERSION: &'static str;
    /// Kind (e.g., HTTPRoute)
    const KIND: &'static str;
}

/// Implement serde defaults for apiVersion/kind from `GatewayApiResource`
macro_rules! impl_api_defaults {
    ($type:ty) => {
        impl $type {
            fn default_api_version() -> String {
                <Self as GatewayApiResource>::API_VERSION.to_string()
            }
            fn default_kind() -> String {
                <Self as GatewayApiResource>::KIND.to_string()
            }

            /// Create the resource with apiVersion and kind filled in
            pub fn new(metadata: ObjectMeta, spec: <$type as HasSpec>::Spec) -> Self {
                Self {
                    api_version: Self::default_api_version(),
                    kind: Self::default_kind(),
                    metadata,
                    spec,
                }
            }
        }
    };
}

/// Associates a resource with its spec type, for the constructor macro
pub trait HasSpec {
    /// The resource's spec type
    type Spec;
}

// =============================================================================
// Shared references
// =============================================================================

/// Reference from a route to its parent Gateway
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ParentReference {
    /// API group (gateway.networking.k8s.io)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,
    /// Resource kind; unset means Gateway
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    /// Parent namespace; unset means the route's namespace
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    /// Parent name
    pub name: String,
    /// Listener section name to bind to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub section_name: Option<String>,
}

impl ParentReference {
    /// Reference a Gateway in the route's own namespace
    pub fn gateway(name: impl Into<String>) -> Self {
        Self {
            group: Some(GATEWAY_API_GROUP.to_string()),
            kind: Some(KIND_GATEWAY.to_string()),
            name: name.into(),
            ..Default::default()
        }
    }

    /// Whether this reference points at a Gateway (kind unset or `Gateway`)
    pub fn is_gateway(&self) -> bool {
        self.kind.as_deref().map_or(true, |k| k == KIND_GATEWAY)
    }
}

/// Backend reference inside a route rule
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BackendRef {
    /// Resource kind (Service)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    /// Backend name
    pub name: String,
    /// Backend namespace
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    /// Backend port
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    /// Relative weight
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weight: Option<u32>,
}

// =============================================================================
// Gateway
// =============================================================================

/// Kubernetes Gateway API Gateway resource
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Gateway {
    /// API version (gateway.networking.k8s.io/v1)
    #[serde(default = "Gateway::default_api_version")]
    pub api_version: String,
    /// Resource kind (Gateway)
    #[serde(default = "Gateway::default_kind")]
    pub kind: String,
    /// Resource metadata
    pub metadata: ObjectMeta,
    /// Gateway specification
    pub spec: GatewaySpec,
}

impl GatewayApiResource for Gateway {
    const API_VERSION: &'static str = "gateway.networking.k8s.io/v1";
    const KIND: &'static str = "Gateway";
}

impl HasSpec for Gateway {
    type Spec = GatewaySpec;
}

impl_api_defaults!(Gateway);

impl Gateway {
    /// Gateway namespace
    pub fn namespace_str(&self) -> &str {
        namespace_of(&self.metadata)
    }

    /// Gateway name
    pub fn name_str(&self) -> &str {
        name_of(&self.metadata)
    }
}

/// Gateway spec
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GatewaySpec {
    /// GatewayClass name
    pub gateway_class_name: String,
    /// Listener configurations
    #[serde(default)]
    pub listeners: Vec<Listener>,
}

/// Gateway listener
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Listener {
    /// Listener name
    pub name: String,
    /// Optional hostname filter
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hostname: Option<String>,
    /// Port number
    pub port: u16,
    /// Protocol (HTTP, HTTPS, TLS, TCP, UDP)
    pub protocol: String,
}

// =============================================================================
// xRoutes
// =============================================================================

macro_rules! route_resource {
    (
        $(#[$doc:meta])* $type:ident, $spec:ident, $kind:literal, $version:literal,
        $version_default:literal, $kind_default:literal
    ) => {
        $(#[$doc])*
        #[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
        #[serde(rename_all = "camelCase")]
        pub struct $type {
            /// API version
            #[serde(default = $version_default)]
            pub api_version: String,
            /// Resource kind
            #[serde(default = $kind_default)]
            pub kind: String,
            /// Resource metadata
            pub metadata: ObjectMeta,
            /// Route specification
            pub spec: $spec,
        }

        impl GatewayApiResource for $type {
            const API_VERSION: &'static str = $version;
            const KIND: &'static str = $kind;
        }

        impl HasSpec for $type {
            type Spec = $spec;
        }

        impl_api_defaults!($type);
    };
}

/// Kubernetes Gateway API HTTPRoute resource
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct HttpRoute {
    /// API version (gateway.networking.k8s.io/v1)
    #[serde(default = "HttpRoute::default_api_version")]
    pub api_version: String,
    /// Resource kind (HTTPRoute)
    #[serde(default = "HttpRoute::default_kind")]
    pub kind: String,
    /// Resource metadata
    pub metadata: ObjectMeta,
    /// HTTPRoute specification
    pub spec: HttpRouteSpec,
}

impl GatewayApiResource for HttpRoute {
    const API_VERSION: &'static str = "gateway.networking.k8s.io/v1";
    const KIND: &'static str = "HTTPRoute";
}

impl HasSpec for HttpRoute {
    type Spec = HttpRouteSpec;
}

impl_api_defaults!(HttpRoute);

/// HTTPRoute spec
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct HttpRouteSpec {
    /// Parent gateway references
    #[serde(default)]
    pub parent_refs: Vec<ParentReference>,
    /// Hostnames to match
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub hostnames: Vec<String>,
    /// Routing rules
    #[serde(default)]
    pub rules: Vec<HttpRouteRule>,
}

/// HTTPRoute rule
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct HttpRouteRule {
    /// Request matches
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub matches: Vec<HttpRouteMatch>,
    /// Backend references
    #[serde(default)]
    pub backend_refs: Vec<BackendRef>,
}

/// HTTP route match
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct HttpRouteMatch {
    /// Path match
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<HttpPathMatch>,
    /// HTTP method match (GET, POST, etc.)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
}

/// HTTP path match
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct HttpPathMatch {
    /// Match type (PathPrefix, Exact, RegularExpression)
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub type_: Option<String>,
    /// Path value
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
}

route_resource!(
    /// Kubernetes Gateway API GRPCRoute resource
    GrpcRoute, GrpcRouteSpec, "GRPCRoute", "gateway.networking.k8s.io/v1",
    "GrpcRoute::default_api_version", "GrpcRoute::default_kind"
);

/// GRPCRoute spec
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GrpcRouteSpec {
    /// Parent gateway references
    #[serde(default)]
    pub parent_refs: Vec<ParentReference>,
    /// Hostnames to match
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub hostnames: Vec<String>,
    /// Routing rules
    #[serde(default)]
    pub rules: Vec<BackendRule>,
}

route_resource!(
    /// Kubernetes Gateway API TLSRoute resource
    TlsRoute, TlsRouteSpec, "TLSRoute", "gateway.networking.k8s.io/v1alpha2",
    "TlsRoute::default_api_version", "TlsRoute::default_kind"
);

/// TLSRoute spec
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TlsRouteSpec {
    /// Parent gateway references
    #[serde(default)]
    pub parent_refs: Vec<ParentReference>,
    /// SNI hostnames to match
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub hostnames: Vec<String>,
    /// Routing rules
    #[serde(default)]
    pub rules: Vec<BackendRule>,
}

route_resource!(
    /// Kubernetes Gateway API TCPRoute resource
    TcpRoute, L4RouteSpec, "TCPRoute", "gateway.networking.k8s.io/v1alpha2",
    "TcpRoute::default_api_version", "TcpRoute::default_kind"
);

route_resource!(
    /// Kubernetes Gateway API UDPRoute resource
    UdpRoute, L4RouteSpec, "UDPRoute", "gateway.networking.k8s.io/v1alpha2",
    "UdpRoute::default_api_version", "UdpRoute::default_kind"
);

/// TCPRoute / UDPRoute spec
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct L4RouteSpec {
    /// Parent gateway references
    #[serde(default)]
    pub parent_refs: Vec<ParentReference>,
    /// Routing rules
    #[serde(default)]
    pub rules: Vec<BackendRule>,
}

/// Rule carrying only backend references (GRPC/TLS/TCP/UDP routes)
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BackendRule {
    /// Backend references
    #[serde(default)]
    pub backend_refs: Vec<BackendRef>,
}

// =============================================================================
// RouteContext
// =============================================================================

/// The route kinds a SecurityPolicy may target
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum RouteKind {
    /// HTTPRoute
    Http,
    /// GRPCRoute
    Grpc,
    /// TLSRoute
    Tls,
    /// TCPRoute
    Tcp,
    /// UDPRoute
    Udp,
}

impl RouteKind {
    /// Kind string as it appears in manifests
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Http => HttpRoute::KIND,
            Self::Grpc => GrpcRoute::KIND,
            Self::Tls => TlsRoute::KIND,
            Self::Tcp => TcpRoute::KIND,
            Self::Udp => UdpRoute::KIND,
        }
    }
}

impl fmt::Display for RouteKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RouteKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "HTTPRoute" => Ok(Self::Http),
            "GRPCRoute" => Ok(Self::Grpc),
            "TLSRoute" => Ok(Self::Tls),
            "TCPRoute" => Ok(Self::Tcp),
            "UDPRoute" => Ok(Self::Udp),
            other => Err(format!("unsupported route kind: {}", other)),
        }
    }
}

/// Any route kind a policy can attach to
#[derive(Clone, Debug, PartialEq)]
pub enum RouteContext {
    /// An HTTPRoute
    Http(HttpRoute),
    /// A GRPCRoute
    Grpc(GrpcRoute),
    /// A TLSRoute
    Tls(TlsRoute),
    /// A TCPRoute
    Tcp(TcpRoute),
    /// A UDPRoute
    Udp(UdpRoute),
}

impl RouteContext {
    /// Kind of the wrapped route
    pub fn kind(&self) -> RouteKind {
        match self {
            Self::Http(_) => RouteKind::Http,
            Self::Grpc(_) => RouteKind::Grpc,
            Self::Tls(_) => RouteKind::Tls,
            Self::Tcp(_) => RouteKind::Tcp,
            Self::Udp(_) => RouteKind::Udp,
        }
    }

    /// Metadata of the wrapped route
    pub fn metadata(&self) -> &ObjectMeta {
        match self {
            Self::Http(r) => &r.metadata,
            Self::Grpc(r) => &r.metadata,
            Self::Tls(r) => &r.metadata,
            Self::Tcp(r) => &r.metadata,
            Self::Udp(r) => &r.metadata,
        }
    }

    /// Route namespace
    pub fn namespace_str(&self) -> &str {
        namespace_of(self.metadata())
    }

    /// Route name
    pub fn name_str(&self) -> &str {
        name_of(self.metadata())
    }

    /// Parent references of the wrapped route
    pub fn parent_refs(&self) -> &[ParentReference] {
        match self {
            Self::Http(r) => &r.spec.parent_refs,
            Self::Grpc(r) => &r.spec.parent_refs,
            Self::Tls(r) => &r.spec.parent_refs,
            Self::Tcp(r) => &r.spec.parent_refs,
            Self::Udp(r) => &r.spec.parent_refs,
        }
    }
}

impl From<HttpRoute> for RouteContext {
    fn from(route: HttpRoute) -> Self {
        Self::Http(route)
    }
}

impl From<GrpcRoute> for RouteContext {
    fn from(route: GrpcRoute) -> Self {
        Self::Grpc(route)
    }
}

impl From<TlsRoute> for RouteContext {
    fn from(route: TlsRoute) -> Self {
        Self::Tls(route)
    }
}

impl From<TcpRoute> for RouteContext {
    fn from(route: TcpRoute) -> Self {
        Self::Tcp(route)
    }
}

impl From<UdpRoute> for RouteContext {
    fn from(route: UdpRoute) -> Self {
        Self::Udp(route)
    }
}
