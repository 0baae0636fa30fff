//! External authorization compiler
//!
//! Validates the authorization service's backend reference, resolves it to
//! a destination, and emits the HTTP or gRPC variant of the ExtAuth IR.

pub mod destination;

use k8s_openapi::api::core::v1::Service;

use rampart_common::crd::{BackendObjectReference, ExtAuthPolicy, SecurityPolicy};
use rampart_common::kube_utils::namespace_or;
use rampart_common::{KIND_SECURITY_POLICY, KIND_SERVICE};

use crate::ir::{AppProtocol, ExtAuth, GrpcExtAuthService, HttpExtAuthService, RouteDestination};
use crate::resources::{CrossNamespaceFrom, CrossNamespaceTo, ResourceStore};
use crate::{Error, Result};

pub use destination::resolve_destination;

const PROTOCOL_TCP: &str = "TCP";

/// Compile the policy's ExtAuth settings
pub fn build_ext_auth(
    policy: &SecurityPolicy,
    ext_auth: &ExtAuthPolicy,
    from: &CrossNamespaceFrom,
    store: &dyn ResourceStore,
    endpoint_routing_disabled: bool,
) -> Result<ExtAuth> {
    let (backend_ref, protocol) = match (&ext_auth.http, &ext_auth.grpc) {
        (None, None) => return Err(Error::internal("one of grpc or http must be specified")),
        (Some(_), Some(_)) => {
            return Err(Error::internal("only one of grpc or http can be specified"))
        }
        (Some(http), None) => (&http.backend_ref, AppProtocol::Http),
        (None, Some(grpc)) => (&grpc.backend_ref, AppProtocol::Grpc),
    };

    let (service, port) = validate_ext_service_backend_reference(backend_ref, from, store)?;
    let namespace = namespace_or(backend_ref.namespace.as_deref(), &from.namespace);
    let authority = format!("{}.{}:{}", backend_ref.name, namespace, port);

    let setting = resolve_destination(&service, port, protocol, store, endpoint_routing_disabled)?;
    let destination = RouteDestination {
        name: ext_service_destination_name(policy, &backend_ref.name),
        settings: vec![setting],
    };

    let mut ir = ExtAuth {
        headers_to_ext_auth: ext_auth.headers_to_ext_auth.clone(),
        ..Default::default()
    };
    match &ext_auth.http {
        Some(http) => {
            ir.http = Some(HttpExtAuthService {
                destination,
                authority,
                path: http.path.clone().unwrap_or_default(),
                headers_to_backend: http.headers_to_backend.clone(),
            })
        }
        None => ir.grpc = Some(GrpcExtAuthService {
            destination,
            authority,
        }),
    }
    Ok(ir)
}

/// Check that an authorization backend is a reachable Service TCP port
///
/// Returns the Service and the referenced port.
pub fn validate_ext_service_backend_reference(
    backend_ref: &BackendObjectReference,
    from: &CrossNamespaceFrom,
    store: &dyn ResourceStore,
) -> Result<(Service, u16)> {
    if backend_ref.group.as_deref().is_some_and(|g| !g.is_empty()) {
        return Err(Error::validation(
            "group is invalid, only the core API group (specified by omitting the group field or setting it to an empty string) is supported",
        ));
    }
    if backend_ref.kind.as_deref().is_some_and(|k| k != KIND_SERVICE) {
        return Err(Error::validation(
            "kind is invalid, only Service (specified by omitting the kind field or setting it to 'Service') is supported",
        ));
    }
    let port = backend_ref.port.ok_or_else(|| {
        Error::validation("a valid port number corresponding to a port on the Service must be specified")
    })?;

    let namespace = namespace_or(backend_ref.namespace.as_deref(), &from.namespace);
    if namespace != from.namespace {
        let to = CrossNamespaceTo {
            group: String::new(),
            kind: KIND_SERVICE.to_string(),
            namespace: namespace.to_string(),
            name: backend_ref.name.clone(),
        };
        if !store.reference_grant_permits(from, &to) {
            return Err(Error::validation(format!(
                "backend ref to {} {}/{} not permitted by any ReferenceGrant",
                KIND_SERVICE, namespace, backend_ref.name
            )));
        }
    }

    let service = store
        .get_service(namespace, &backend_ref.name)
        .ok_or_else(|| {
            Error::not_found(format!("service {}/{} not found", namespace, backend_ref.name))
        })?;

    let has_tcp_port = service
        .spec
        .as_ref()
        .and_then(|s| s.ports.as_ref())
        .is_some_and(|ports| {
            ports.iter().any(|p| {
                p.port == i32::from(port)
                    && p.protocol.as_deref().unwrap_or(PROTOCOL_TCP) == PROTOCOL_TCP
            })
        });
    if !has_tcp_port {
        return Err(Error::not_found(format!(
            "TCP Port {} not found on service {}/{}",
            port, namespace, backend_ref.name
        )));
    }

    Ok((service, port))
}

/// Destination name for a policy's authorization service
pub fn ext_service_destination_name(policy: &SecurityPolicy, service: &str) -> String {
    format!(
        "{}/{}/{}/{}",
        KIND_SECURITY_POLICY,
        policy.namespace_str(),
        policy.name_str(),
        service
    )
    .to_lowercase()
}
