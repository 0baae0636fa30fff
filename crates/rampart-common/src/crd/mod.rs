//! Custom Resource Definitions for Rampart
//!
//! The SecurityPolicy CRD plus the reference and condition types it shares
//! with the Gateway API.

mod security_policy;
mod types;

pub use security_policy::{
    BasicAuthPolicy, ClaimToHeader, CorsPolicy, ExtAuthPolicy, GrpcExtAuthService,
    HttpExtAuthService, JwtPolicy, JwtProvider, OidcPolicy, OidcProviderConfig,
    PolicyTargetReference, RemoteJwks, SecurityPolicy, SecurityPolicySpec, SecurityPolicyStatus,
    BASIC_AUTH_USERS_SECRET_KEY, OIDC_CLIENT_SECRET_KEY,
};
pub use types::{
    BackendObjectReference, Condition, ConditionStatus, SecretObjectReference,
};
