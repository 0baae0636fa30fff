//! CORS compiler

use rampart_common::crd::CorsPolicy;

use crate::ir::{Cors, StringMatch};

/// Compile CORS settings; origins containing `*` become regex matchers
pub fn build_cors(cors: &CorsPolicy) -> Cors {
    let allow_origins = cors
        .allow_origins
        .iter()
        .map(|origin| {
            if is_wildcard(origin) {
                StringMatch::SafeRegex(wildcard_to_regex(origin))
            } else {
                StringMatch::Exact(origin.clone())
            }
        })
        .collect();

    Cors {
        allow_origins,
        allow_methods: cors.allow_methods.clone(),
        allow_headers: cors.allow_headers.clone(),
        expose_headers: cors.expose_headers.clone(),
        max_age: cors.max_age.clone(),
        allow_credentials: cors.allow_credentials.unwrap_or(false),
    }
}

fn is_wildcard(s: &str) -> bool {
    s.contains('*')
}

/// Convert a `*` glob into an equivalent regex
///
/// Only `.` is escaped; it is the only metacharacter valid in an origin.
pub fn wildcard_to_regex(wildcard: &str) -> String {
    wildcard.replace('.', "\\.").replace('*', ".*")
}
