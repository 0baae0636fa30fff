//! Gateway API resource types
//!
//! Gateways and the xRoute kinds a SecurityPolicy can target.

pub mod gateway_api;

pub use gateway_api::{
    BackendRef, BackendRule, Gateway, GatewayApiResource, GatewaySpec, GrpcRoute, GrpcRouteSpec,
    HasSpec, HttpPathMatch, HttpRoute, HttpRouteMatch, HttpRouteRule, HttpRouteSpec,
    L4RouteSpec, Listener, ParentReference, RouteContext, RouteKind, TcpRoute, TlsRoute,
    TlsRouteSpec, UdpRoute,
};
