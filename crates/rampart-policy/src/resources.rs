//! Read-only view of the objects a translation pass may consult
//!
//! [`ResourceStore`] is the seam feature compilers look things up through.
//! [`Resources`] is the in-memory snapshot implementation: a complete,
//! consistent set of objects handed in for a single pass, optionally loaded
//! from multi-document YAML.

use k8s_openapi::api::core::v1::{Secret, Service};
use k8s_openapi::api::discovery::v1::EndpointSlice;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use rampart_common::crd::SecurityPolicy;
use rampart_common::kube_utils::{name_of, namespace_of};
use rampart_common::network::{
    Gateway, GrpcRoute, HttpRoute, RouteContext, TcpRoute, TlsRoute, UdpRoute,
};
use rampart_common::yaml::parse_yaml_documents;
use rampart_common::{KIND_SERVICE, LABEL_SERVICE_NAME};

// =============================================================================
// ReferenceGrant
// =============================================================================

/// Gateway API ReferenceGrant: allows references into its namespace
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ReferenceGrant {
    /// Resource metadata
    pub metadata: ObjectMeta,
    /// Grant specification
    pub spec: ReferenceGrantSpec,
}

/// ReferenceGrant spec
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ReferenceGrantSpec {
    /// Who may refer
    #[serde(default)]
    pub from: Vec<ReferenceGrantFrom>,
    /// What may be referred to
    #[serde(default)]
    pub to: Vec<ReferenceGrantTo>,
}

/// Referrer allowed by a ReferenceGrant
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ReferenceGrantFrom {
    /// Referrer API group
    #[serde(default)]
    pub group: String,
    /// Referrer kind
    pub kind: String,
    /// Referrer namespace
    pub namespace: String,
}

/// Referent allowed by a ReferenceGrant
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ReferenceGrantTo {
    /// Referent API group; empty for core
    #[serde(default)]
    pub group: String,
    /// Referent kind
    pub kind: String,
    /// Specific referent name; unset allows all of the kind
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// The referring side of a cross-namespace reference
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CrossNamespaceFrom {
    /// Referrer API group
    pub group: String,
    /// Referrer kind
    pub kind: String,
    /// Referrer namespace
    pub namespace: String,
}

/// The referenced side of a cross-namespace reference
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CrossNamespaceTo {
    /// Referent API group; empty for core
    pub group: String,
    /// Referent kind
    pub kind: String,
    /// Referent namespace
    pub namespace: String,
    /// Referent name
    pub name: String,
}

impl ReferenceGrant {
    /// Whether this grant allows `from` to reference `to`
    pub fn permits(&self, from: &CrossNamespaceFrom, to: &CrossNamespaceTo) -> bool {
        if namespace_of(&self.metadata) != to.namespace {
            return false;
        }
        let from_ok = self.spec.from.iter().any(|f| {
            f.group == from.group && f.kind == from.kind && f.namespace == from.namespace
        });
        let to_ok = self.spec.to.iter().any(|t| {
            t.group == to.group
                && t.kind == to.kind
                && t.name.as_deref().map_or(true, |n| n == to.name)
        });
        from_ok && to_ok
    }
}

// =============================================================================
// ResourceStore
// =============================================================================

/// Lookups feature compilers need during a pass
#[cfg_attr(test, mockall::automock)]
pub trait ResourceStore: Send + Sync {
    /// Service by namespace and name
    fn get_service(&self, namespace: &str, name: &str) -> Option<Service>;

    /// EndpointSlices belonging to a backend of the given kind
    fn get_endpoint_slices_for_backend(
        &self,
        namespace: &str,
        name: &str,
        kind: &str,
    ) -> Vec<EndpointSlice>;

    /// Secret by namespace and name
    fn get_secret(&self, namespace: &str, name: &str) -> Option<Secret>;

    /// Whether some ReferenceGrant allows the cross-namespace reference
    fn reference_grant_permits(&self, from: &CrossNamespaceFrom, to: &CrossNamespaceTo) -> bool;
}

// =============================================================================
// Resources snapshot
// =============================================================================

/// A consistent snapshot of cluster objects for one translation pass
#[derive(Clone, Debug, Default)]
pub struct Resources {
    /// Gateways
    pub gateways: Vec<Gateway>,
    /// HTTPRoutes
    pub http_routes: Vec<HttpRoute>,
    /// GRPCRoutes
    pub grpc_routes: Vec<GrpcRoute>,
    /// TLSRoutes
    pub tls_routes: Vec<TlsRoute>,
    /// TCPRoutes
    pub tcp_routes: Vec<TcpRoute>,
    /// UDPRoutes
    pub udp_routes: Vec<UdpRoute>,
    /// SecurityPolicies
    pub security_policies: Vec<SecurityPolicy>,
    /// Services
    pub services: Vec<Service>,
    /// EndpointSlices
    pub endpoint_slices: Vec<EndpointSlice>,
    /// Secrets
    pub secrets: Vec<Secret>,
    /// ReferenceGrants
    pub reference_grants: Vec<ReferenceGrant>,
}

impl Resources {
    /// Load a snapshot from multi-document YAML
    ///
    /// Documents are dispatched on `kind`; kinds the engine never reads are
    /// skipped with a debug log.
    pub fn from_yaml(input: &str) -> Result<Self, rampart_common::Error> {
        let mut resources = Self::default();
        for doc in parse_yaml_documents(input)? {
            resources.push_document(doc)?;
        }
        Ok(resources)
    }

    fn push_document(&mut self, doc: Value) -> Result<(), rampart_common::Error> {
        let kind = doc
            .get("kind")
            .and_then(Value::as_str)
            .ok_or_else(|| rampart_common::Error::serialization("document has no kind"))?
            .to_string();

        match kind.as_str() {
            "Gateway" => self.gateways.push(decode(&kind, doc)?),
            "HTTPRoute" => self.http_routes.push(decode(&kind, doc)?),
            "GRPCRoute" => self.grpc_routes.push(decode(&kind, doc)?),
            "TLSRoute" => self.tls_routes.push(decode(&kind, doc)?),
            "TCPRoute" => self.tcp_routes.push(decode(&kind, doc)?),
            "UDPRoute" => self.udp_routes.push(decode(&kind, doc)?),
            "SecurityPolicy" => self.security_policies.push(decode(&kind, doc)?),
            "Service" => self.services.push(decode(&kind, doc)?),
            "EndpointSlice" => self.endpoint_slices.push(decode(&kind, doc)?),
            "Secret" => self.secrets.push(decode(&kind, doc)?),
            "ReferenceGrant" => self.reference_grants.push(decode(&kind, doc)?),
            other => tracing::debug!(kind = other, "skipping unsupported resource kind"),
        }
        Ok(())
    }

    /// Every route in the snapshot, in kind order
    pub fn routes(&self) -> Vec<RouteContext> {
        let mut routes = Vec::with_capacity(
            self.http_routes.len()
                + self.grpc_routes.len()
                + self.tls_routes.len()
                + self.tcp_routes.len()
                + self.udp_routes.len(),
        );
        routes.extend(self.http_routes.iter().cloned().map(RouteContext::from));
        routes.extend(self.grpc_routes.iter().cloned().map(RouteContext::from));
        routes.extend(self.tls_routes.iter().cloned().map(RouteContext::from));
        routes.extend(self.tcp_routes.iter().cloned().map(RouteContext::from));
        routes.extend(self.udp_routes.iter().cloned().map(RouteContext::from));
        routes
    }
}

fn decode<T: serde::de::DeserializeOwned>(
    kind: &str,
    doc: Value,
) -> Result<T, rampart_common::Error> {
    serde_json::from_value(doc)
        .map_err(|e| rampart_common::Error::serialization_for_kind(kind, e.to_string()))
}

fn matches_identity(meta: &ObjectMeta, namespace: &str, name: &str) -> bool {
    namespace_of(meta) == namespace && name_of(meta) == name
}

impl ResourceStore for Resources {
    fn get_service(&self, namespace: &str, name: &str) -> Option<Service> {
        self.services
            .iter()
            .find(|s| matches_identity(&s.metadata, namespace, name))
            .cloned()
    }

    fn get_endpoint_slices_for_backend(
        &self,
        namespace: &str,
        name: &str,
        kind: &str,
    ) -> Vec<EndpointSlice> {
        if kind != KIND_SERVICE {
            return Vec::new();
        }
        self.endpoint_slices
            .iter()
            .filter(|slice| {
                namespace_of(&slice.metadata) == namespace
                    && slice
                        .metadata
                        .labels
                        .as_ref()
                        .and_then(|labels| labels.get(LABEL_SERVICE_NAME))
                        .is_some_and(|svc| svc == name)
            })
            .cloned()
            .collect()
    }

    fn get_secret(&self, namespace: &str, name: &str) -> Option<Secret> {
        self.secrets
            .iter()
            .find(|s| matches_identity(&s.metadata, namespace, name))
            .cloned()
    }

    fn reference_grant_permits(&self, from: &CrossNamespaceFrom, to: &CrossNamespaceTo) -> bool {
        self.reference_grants.iter().any(|g| g.permits(from, to))
    }
}

/// Read a key from a Secret's `data`, falling back to `stringData`
pub fn secret_value(secret: &Secret, key: &str) -> Option<Vec<u8>> {
    if let Some(value) = secret.data.as_ref().and_then(|d| d.get(key)) {
        return Some(value.0.clone());
    }
    secret
        .string_data
        .as_ref()
        .and_then(|d| d.get(key))
        .map(|s| s.as_bytes().to_vec())
}
