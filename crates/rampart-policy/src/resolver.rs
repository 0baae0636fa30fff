//! Target resolution and single-attachment tracking
//!
//! Each route and each gateway accepts at most one SecurityPolicy per pass;
//! the first policy (in translation order) to claim a target holds it and
//! later claimants are rejected as `Conflicted`. Holder tables live only as
//! long as one pass.

use std::collections::BTreeMap;

use tracing::debug;

use rampart_common::crd::SecurityPolicy;
use rampart_common::kube_utils::namespaced_name;
use rampart_common::network::{Gateway, RouteContext, RouteKind};
use rampart_common::GATEWAY_API_GROUP;

use crate::status::{reason, set_rejected};
use crate::{Error, Result};

/// Identity of a route: kind, namespace, name
pub type RouteKey = (RouteKind, String, String);

struct Held<T> {
    target: T,
    holder: Option<String>,
}

impl<T> Held<T> {
    fn new(target: T) -> Self {
        Self {
            target,
            holder: None,
        }
    }
}

/// Routes of the current pass and the policy attached to each
pub struct RouteTargets {
    routes: BTreeMap<RouteKey, Held<RouteContext>>,
}

impl RouteTargets {
    /// Index routes by kind, namespace and name
    pub fn new(routes: impl IntoIterator<Item = RouteContext>) -> Self {
        let routes = routes
            .into_iter()
            .map(|route| {
                let key = (
                    route.kind(),
                    route.namespace_str().to_string(),
                    route.name_str().to_string(),
                );
                (key, Held::new(route))
            })
            .collect();
        Self { routes }
    }

    /// `namespace/name` of the policy holding a route, if any
    pub fn holder(&self, key: &RouteKey) -> Option<&str> {
        self.routes.get(key).and_then(|h| h.holder.as_deref())
    }
}

/// Gateways of the current pass and the policy attached to each
pub struct GatewayTargets {
    gateways: BTreeMap<String, Held<Gateway>>,
}

impl GatewayTargets {
    /// Index gateways by `namespace/name`
    pub fn new(gateways: impl IntoIterator<Item = Gateway>) -> Self {
        let gateways = gateways
            .into_iter()
            .map(|gw| {
                let key = namespaced_name(gw.namespace_str(), gw.name_str());
                (key, Held::new(gw))
            })
            .collect();
        Self { gateways }
    }

    /// `namespace/name` of the policy holding a gateway, if any
    pub fn holder(&self, key: &str) -> Option<&str> {
        self.gateways.get(key).and_then(|h| h.holder.as_deref())
    }
}

/// The targetRef must be a Gateway API object in the policy's own namespace
fn check_target_ref(policy: &SecurityPolicy) -> Result<()> {
    let target = &policy.spec.target_ref;
    if target.group != GATEWAY_API_GROUP {
        return Err(Error::validation(format!(
            "TargetRef.Group:{}, SecurityPolicy can only target {} resources.",
            target.group, GATEWAY_API_GROUP
        )));
    }
    match &target.namespace {
        Some(target_ns) if target_ns != policy.namespace_str() => Err(Error::validation(format!(
            "Namespace:{} TargetRef.Namespace:{}, SecurityPolicy can only target a resource in the same namespace.",
            policy.namespace_str(),
            target_ns
        ))),
        _ => Ok(()),
    }
}

fn conflicted(kind: &str) -> Error {
    Error::conflict(format!(
        "Unable to target {}, another SecurityPolicy has already attached to it",
        kind
    ))
}

/// Record a failed resolution on the policy's `Accepted` condition
fn reject(policy: &mut SecurityPolicy, err: &Error) {
    let condition_reason = match err {
        Error::Conflict { .. } => reason::CONFLICTED,
        Error::NotFound { .. } => reason::TARGET_NOT_FOUND,
        _ => reason::INVALID,
    };
    set_rejected(policy, condition_reason, err.message());
}

fn claim_route<'a>(
    policy: &SecurityPolicy,
    targets: &'a mut RouteTargets,
) -> Result<&'a RouteContext> {
    check_target_ref(policy)?;

    let target = &policy.spec.target_ref;
    let namespace = policy.namespace_str().to_string();
    let not_found = || {
        Error::not_found(format!(
            "{}/{}/{} not found.",
            target.kind, namespace, target.name
        ))
    };

    let kind = target.kind.parse::<RouteKind>().map_err(|_| not_found())?;
    let held = targets
        .routes
        .get_mut(&(kind, namespace.clone(), target.name.clone()))
        .ok_or_else(not_found)?;

    if let Some(holder) = &held.holder {
        debug!(policy = %policy.key(), holder = %holder, kind = %kind, "route already has a policy");
        return Err(conflicted(kind.as_str()));
    }

    held.holder = Some(policy.key());
    Ok(&held.target)
}

fn claim_gateway<'a>(
    policy: &SecurityPolicy,
    targets: &'a mut GatewayTargets,
) -> Result<&'a Gateway> {
    check_target_ref(policy)?;

    let target = &policy.spec.target_ref;
    let key = namespaced_name(policy.namespace_str(), &target.name);
    let held = targets
        .gateways
        .get_mut(&key)
        .ok_or_else(|| Error::not_found(format!("Gateway:{} not found.", target.name)))?;

    if let Some(holder) = &held.holder {
        debug!(policy = %policy.key(), holder = %holder, gateway = %key, "gateway already has a policy");
        return Err(conflicted(&target.kind));
    }

    held.holder = Some(policy.key());
    Ok(&held.target)
}

/// Resolve a route-targeting policy and claim the route for it
///
/// On failure the policy's `Accepted` condition explains why and `None` is
/// returned.
pub fn resolve_route_target<'a>(
    policy: &mut SecurityPolicy,
    targets: &'a mut RouteTargets,
) -> Option<&'a RouteContext> {
    claim_route(policy, targets)
        .map_err(|err| reject(policy, &err))
        .ok()
}

/// Resolve a gateway-targeting policy and claim the gateway for it
pub fn resolve_gateway_target<'a>(
    policy: &mut SecurityPolicy,
    targets: &'a mut GatewayTargets,
) -> Option<&'a Gateway> {
    claim_gateway(policy, targets)
        .map_err(|err| reject(policy, &err))
        .ok()
}
