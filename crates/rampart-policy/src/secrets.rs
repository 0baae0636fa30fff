//! Secret reference validation shared by the OIDC and basic auth compilers

use k8s_openapi::api::core::v1::Secret;

use rampart_common::crd::SecretObjectReference;
use rampart_common::kube_utils::namespace_or;
use rampart_common::KIND_SECRET;

use crate::resources::{CrossNamespaceFrom, CrossNamespaceTo, ResourceStore};
use crate::{Error, Result};

/// Check a secret reference's shape and look the Secret up
///
/// The Secret namespace defaults to the referrer's. A reference into another
/// namespace is rejected unless `allow_cross_namespace` is set, in which
/// case a ReferenceGrant must permit it.
pub fn validate_secret_ref(
    allow_cross_namespace: bool,
    from: &CrossNamespaceFrom,
    secret_ref: &SecretObjectReference,
    store: &dyn ResourceStore,
) -> Result<Secret> {
    if secret_ref.group.as_deref().is_some_and(|g| !g.is_empty()) {
        return Err(Error::validation("secret ref group must be unspecified/empty"));
    }
    if secret_ref.kind.as_deref().is_some_and(|k| k != KIND_SECRET) {
        return Err(Error::validation("secret ref kind must be Secret"));
    }

    let namespace = namespace_or(secret_ref.namespace.as_deref(), &from.namespace);
    if namespace != from.namespace {
        if !allow_cross_namespace {
            return Err(Error::validation(format!(
                "secret ref namespace must be unspecified/empty or {}",
                from.namespace
            )));
        }
        let to = CrossNamespaceTo {
            group: String::new(),
            kind: KIND_SECRET.to_string(),
            namespace: namespace.to_string(),
            name: secret_ref.name.clone(),
        };
        if !store.reference_grant_permits(from, &to) {
            return Err(Error::validation(format!(
                "secret ref to {}/{} not permitted by any ReferenceGrant",
                namespace, secret_ref.name
            )));
        }
    }

    store
        .get_secret(namespace, &secret_ref.name)
        .ok_or_else(|| {
            Error::external(format!(
                "secret {}/{} does not exist",
                namespace, secret_ref.name
            ))
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resources::MockResourceStore;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
    use mockall::predicate::eq;
    use rampart_common::RAMPART_GROUP;

    fn from() -> CrossNamespaceFrom {
        CrossNamespaceFrom {
            group: RAMPART_GROUP.to_string(),
            kind: "SecurityPolicy".to_string(),
            namespace: "default".to_string(),
        }
    }

    fn secret(namespace: &str, name: &str) -> Secret {
        Secret {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                namespace: Some(namespace.to_string()),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    #[test]
    fn local_secret_is_found() {
        let mut store = MockResourceStore::new();
        store
            .expect_get_secret()
            .with(eq("default"), eq("users"))
            .returning(|ns, name| Some(secret(ns, name)));

        let found = validate_secret_ref(false, &from(), &SecretObjectReference::local("users"), &store)
            .expect("secret resolves");
        assert_eq!(found.metadata.name.as_deref(), Some("users"));
    }

    #[test]
    fn missing_secret_is_not_found() {
        let mut store = MockResourceStore::new();
        store.expect_get_secret().returning(|_, _| None);

        let err = validate_secret_ref(false, &from(), &SecretObjectReference::local("users"), &store)
            .expect_err("missing");
        assert_eq!(err.to_string(), "secret default/users does not exist");
        assert!(matches!(err, Error::ExternalResolution { .. }));
    }

    #[test]
    fn group_and_kind_are_checked_before_lookup() {
        let store = MockResourceStore::new();

        let mut grouped = SecretObjectReference::local("users");
        grouped.group = Some("example.com".to_string());
        let err = validate_secret_ref(false, &from(), &grouped, &store).expect_err("group");
        assert_eq!(err.to_string(), "secret ref group must be unspecified/empty");

        let mut wrong_kind = SecretObjectReference::local("users");
        wrong_kind.kind = Some("ConfigMap".to_string());
        let err = validate_secret_ref(false, &from(), &wrong_kind, &store).expect_err("kind");
        assert_eq!(err.to_string(), "secret ref kind must be Secret");

        let mut empty_group = SecretObjectReference::local("users");
        empty_group.group = Some(String::new());
        empty_group.kind = Some("Secret".to_string());
        let mut store = MockResourceStore::new();
        store.expect_get_secret().returning(|ns, name| Some(secret(ns, name)));
        assert!(validate_secret_ref(false, &from(), &empty_group, &store).is_ok());
    }

    #[test]
    fn cross_namespace_rejected_when_not_allowed() {
        let store = MockResourceStore::new();
        let mut remote = SecretObjectReference::local("users");
        remote.namespace = Some("auth".to_string());

        let err = validate_secret_ref(false, &from(), &remote, &store).expect_err("cross ns");
        assert_eq!(
            err.to_string(),
            "secret ref namespace must be unspecified/empty or default"
        );
    }

    #[test]
    fn cross_namespace_requires_reference_grant_when_allowed() {
        let mut remote = SecretObjectReference::local("users");
        remote.namespace = Some("auth".to_string());

        let mut denied = MockResourceStore::new();
        denied.expect_reference_grant_permits().returning(|_, _| false);
        let err = validate_secret_ref(true, &from(), &remote, &denied).expect_err("no grant");
        assert_eq!(
            err.to_string(),
            "secret ref to auth/users not permitted by any ReferenceGrant"
        );

        let mut granted = MockResourceStore::new();
        granted.expect_reference_grant_permits().returning(|_, _| true);
        granted
            .expect_get_secret()
            .with(eq("auth"), eq("users"))
            .returning(|ns, name| Some(secret(ns, name)));
        assert!(validate_secret_ref(true, &from(), &remote, &granted).is_ok());
    }
}
