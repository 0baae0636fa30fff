//! SecurityPolicy resolution and IR compilation
//!
//! Takes a consistent snapshot of SecurityPolicies, Gateways, xRoutes and the
//! Services/EndpointSlices/Secrets they reference, and compiles the policies
//! into per-route security features on the proxy IR:
//!
//! - [`resolver`] - attach each policy to exactly one route or gateway
//! - [`cors`], [`jwt`], [`oidc`], [`basic_auth`], [`ext_auth`] - feature compilers
//! - [`translator`] - the orchestrator: ordering, merge precedence, status
//!
//! Route-level policies always win over gateway-level ones for the same
//! feature slot; a gateway policy that is shadowed on some routes is marked
//! `Overridden`.

#![deny(missing_docs)]

pub mod basic_auth;
pub mod config;
pub mod cors;
pub mod error;
pub mod ext_auth;
pub mod ir;
pub mod jwt;
pub mod oidc;
pub mod resolver;
pub mod resources;
pub mod secrets;
pub mod status;
pub mod translator;

pub use config::{DiscoveryConfig, TranslatorConfig};
pub use error::Error;
pub use ir::{MergeMode, SecurityFeatures, XdsIrMap};
pub use resources::{ResourceStore, Resources};
pub use translator::Translator;

/// Result type alias using the policy Error type
pub type Result<T> = std::result::Result<T, Error>;
