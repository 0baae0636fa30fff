//! Common types for Rampart: CRDs, Gateway API resources, errors, and utilities
//!
//! Everything the policy engine consumes from the outside world is modelled here:
//! - [`crd`] - the `SecurityPolicy` custom resource and shared reference types
//! - [`network`] - Gateway API resources (Gateway, HTTPRoute, GRPCRoute, ...)
//! - [`yaml`] - YAML snapshot parsing into `serde_json::Value`
//! - [`env`] - environment access for configuration overrides
//! - [`telemetry`] - tracing subscriber setup

#![deny(missing_docs)]

pub mod crd;
pub mod env;
pub mod error;
pub mod kube_utils;
pub mod network;
pub mod telemetry;
pub mod yaml;

pub use error::Error;

/// Result type alias using our custom Error type
pub type Result<T> = std::result::Result<T, Error>;

/// API group of the Gateway API resources policies attach to
pub const GATEWAY_API_GROUP: &str = "gateway.networking.k8s.io";

/// API group of Rampart's own custom resources
pub const RAMPART_GROUP: &str = "gateway.rampart.dev";

/// Kind name used for Gateway targets
pub const KIND_GATEWAY: &str = "Gateway";

/// Kind name used for Kubernetes Services
pub const KIND_SERVICE: &str = "Service";

/// Kind name used for Kubernetes Secrets
pub const KIND_SECRET: &str = "Secret";

/// Kind name of the SecurityPolicy resource
pub const KIND_SECURITY_POLICY: &str = "SecurityPolicy";

/// Label EndpointSlices carry to point back at their owning Service
pub const LABEL_SERVICE_NAME: &str = "kubernetes.io/service-name";
