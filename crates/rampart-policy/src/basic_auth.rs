//! Basic authentication compiler

use rampart_common::crd::{BasicAuthPolicy, BASIC_AUTH_USERS_SECRET_KEY};
use rampart_common::kube_utils::{name_of, namespace_of};

use crate::ir::BasicAuth;
use crate::resources::{secret_value, CrossNamespaceFrom, ResourceStore};
use crate::secrets::validate_secret_ref;
use crate::{Error, Result};

/// Load the htpasswd file referenced by the policy
pub fn build_basic_auth(
    basic_auth: &BasicAuthPolicy,
    from: &CrossNamespaceFrom,
    store: &dyn ResourceStore,
) -> Result<BasicAuth> {
    let secret = validate_secret_ref(false, from, &basic_auth.users, store)?;

    match secret_value(&secret, BASIC_AUTH_USERS_SECRET_KEY) {
        Some(users) if !users.is_empty() => Ok(BasicAuth { users }),
        _ => Err(Error::external(format!(
            "users secret not found in secret {}/{}",
            namespace_of(&secret.metadata),
            name_of(&secret.metadata)
        ))),
    }
}
