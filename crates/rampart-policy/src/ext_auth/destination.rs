//! ExtAuth destination resolution
//!
//! Turns a validated Service port into a single weighted destination
//! setting, either one endpoint per ready EndpointSlice address or, with
//! endpoint routing disabled, the Service ClusterIP.

use k8s_openapi::api::core::v1::{Service, ServicePort};
use k8s_openapi::api::discovery::v1::EndpointSlice;

use rampart_common::KIND_SERVICE;

use crate::ir::{AppProtocol, DestinationAddressType, DestinationEndpoint, DestinationSetting};
use crate::resources::ResourceStore;
use crate::{Error, Result};

/// appProtocol value marking a Service port as cleartext HTTP/2
pub const APP_PROTOCOL_H2C: &str = "kubernetes.io/h2c";

const ADDRESS_TYPE_FQDN: &str = "FQDN";
const PROTOCOL_TCP: &str = "TCP";

/// Build the destination setting for `port` on `service`
pub fn resolve_destination(
    service: &Service,
    port: u16,
    protocol: AppProtocol,
    store: &dyn ResourceStore,
    endpoint_routing_disabled: bool,
) -> Result<DestinationSetting> {
    let spec = service.spec.as_ref();
    let service_port = spec
        .and_then(|s| s.ports.as_ref())
        .and_then(|ports| ports.iter().find(|p| p.port == i32::from(port)))
        .cloned()
        .unwrap_or_default();

    let protocol = if service_port.app_protocol.as_deref() == Some(APP_PROTOCOL_H2C) {
        AppProtocol::Http2
    } else {
        protocol
    };

    let (endpoints, address_type) = if endpoint_routing_disabled {
        let cluster_ip = spec
            .and_then(|s| s.cluster_ip.clone())
            .unwrap_or_default();
        (vec![DestinationEndpoint::new(cluster_ip, u32::from(port))], None)
    } else {
        let namespace = service.metadata.namespace.as_deref().unwrap_or_default();
        let name = service.metadata.name.as_deref().unwrap_or_default();
        let slices = store.get_endpoint_slices_for_backend(namespace, name, KIND_SERVICE);
        endpoints_from_slices(&slices, &service_port)
    };

    if address_type == Some(DestinationAddressType::Mixed) {
        return Err(Error::external(
            "mixed endpointslice address type for the same backendRef is not supported",
        ));
    }

    Ok(DestinationSetting {
        weight: Some(1),
        protocol,
        endpoints,
        address_type,
    })
}

/// Collect ready endpoints whose slice port matches the service port
///
/// The address type is that of the slices when they all agree, `Mixed`
/// otherwise, and unset when there are no slices.
pub fn endpoints_from_slices(
    slices: &[EndpointSlice],
    service_port: &ServicePort,
) -> (Vec<DestinationEndpoint>, Option<DestinationAddressType>) {
    let port_name = service_port.name.as_deref().unwrap_or_default();
    let port_protocol = service_port.protocol.as_deref().unwrap_or(PROTOCOL_TCP);

    let mut endpoints = Vec::new();
    let mut address_type = None;

    for slice in slices {
        let slice_type = if slice.address_type == ADDRESS_TYPE_FQDN {
            DestinationAddressType::Fqdn
        } else {
            DestinationAddressType::Ip
        };
        address_type = match address_type {
            None => Some(slice_type),
            Some(existing) if existing == slice_type => Some(existing),
            Some(_) => Some(DestinationAddressType::Mixed),
        };

        let ports = slice.ports.as_deref().unwrap_or_default();
        for endpoint in &slice.endpoints {
            let ready = endpoint
                .conditions
                .as_ref()
                .and_then(|c| c.ready)
                .unwrap_or(true);
            if !ready {
                continue;
            }
            for slice_port in ports {
                let name_matches = slice_port.name.as_deref().unwrap_or_default() == port_name;
                let protocol_matches =
                    slice_port.protocol.as_deref().unwrap_or(PROTOCOL_TCP) == port_protocol;
                let Some(port) = slice_port.port.and_then(|p| u32::try_from(p).ok()) else {
                    continue;
                };
                if !(name_matches && protocol_matches) {
                    continue;
                }
                endpoints.extend(
                    endpoint
                        .addresses
                        .iter()
                        .map(|address| DestinationEndpoint::new(address.clone(), port)),
                );
            }
        }
    }

    (endpoints, address_type)
}
