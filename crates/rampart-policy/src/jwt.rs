//! JWT compiler

use rampart_common::crd::JwtPolicy;

use crate::ir::Jwt;

/// Copy the configured providers into the IR
pub fn build_jwt(jwt: &JwtPolicy) -> Jwt {
    Jwt {
        providers: jwt.providers.clone(),
    }
}
