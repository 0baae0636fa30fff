//! Small helpers for Kubernetes object identity
//!
//! Namespaced-name formatting and deterministic hashing used to derive
//! stable identifiers (IR keys, cookie suffixes) from object metadata.

use aws_lc_rs::digest;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

/// Format a `namespace/name` key, the same shape `types.NamespacedName` prints
pub fn namespaced_name(namespace: &str, name: &str) -> String {
    format!("{}/{}", namespace, name)
}

/// Namespace of an object, or empty when unset
pub fn namespace_of(meta: &ObjectMeta) -> &str {
    meta.namespace.as_deref().unwrap_or_default()
}

/// Name of an object, or empty when unset
pub fn name_of(meta: &ObjectMeta) -> &str {
    meta.name.as_deref().unwrap_or_default()
}

/// Resolve an optional namespace reference against a default
pub fn namespace_or<'a>(namespace: Option<&'a str>, default: &'a str) -> &'a str {
    namespace.unwrap_or(default)
}

/// Compute a short deterministic digest of `input`: the first 4 bytes of its
/// SHA-256 as 8 lowercase hex chars.
///
/// `DefaultHasher` is not stable across toolchains; anything that ends up in
/// proxy config (cookie names) has to be.
pub fn short_digest(input: &str) -> String {
    let hash = digest::digest(&digest::SHA256, input.as_bytes());
    hash.as_ref()[..4]
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect()
}
