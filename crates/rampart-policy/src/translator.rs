//! SecurityPolicy orchestration
//!
//! One pass over a snapshot: sort policies by age, attach route-level
//! policies first and gateway-level policies second, compile each policy's
//! features and write them into the IR. Route-level features overwrite their
//! routes; gateway-level features only fill what routes left empty, and a
//! gateway policy shadowed on some routes is reported as `Overridden`.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use tracing::{debug, info, warn};

use rampart_common::crd::{ConditionStatus, SecurityPolicy};
use rampart_common::kube_utils::{namespace_or, namespaced_name};
use rampart_common::network::{Gateway, RouteContext};
use rampart_common::{KIND_SECURITY_POLICY, RAMPART_GROUP};

use crate::basic_auth::build_basic_auth;
use crate::config::TranslatorConfig;
use crate::cors::build_cors;
use crate::ext_auth::build_ext_auth;
use crate::ir::{MergeMode, SecurityFeatures, XdsIrMap};
use crate::jwt::build_jwt;
use crate::oidc::{build_oidc, HttpIssuerDiscovery, IssuerDiscovery};
use crate::resolver::{resolve_gateway_target, resolve_route_target, GatewayTargets, RouteTargets};
use crate::resources::{CrossNamespaceFrom, ResourceStore, Resources};
use crate::status::{
    error_to_condition_message, reason, set_accepted, set_condition, set_rejected,
    CONDITION_ACCEPTED, CONDITION_OVERRIDDEN,
};
use crate::{Error, Result};

/// Features compiled from one policy, plus whatever failed to compile
///
/// Features that built are applied even when others failed.
#[derive(Debug, Default)]
pub struct FeatureBuild {
    /// Successfully compiled features
    pub features: SecurityFeatures,
    /// Errors from features that failed
    pub errors: Vec<Error>,
}

impl FeatureBuild {
    /// Condition message for the failures, if any
    pub fn error_message(&self) -> Option<String> {
        if self.errors.is_empty() {
            return None;
        }
        let joined = self
            .errors
            .iter()
            .map(|e| e.message())
            .collect::<Vec<_>>()
            .join("\n");
        Some(error_to_condition_message(&joined))
    }

    fn record<T>(&mut self, result: Result<T>) -> Option<T> {
        result.map_err(|e| self.errors.push(e)).ok()
    }
}

/// `<lowercase kind>/<namespace>/<name>/`, the prefix of IR routes
/// generated from an xRoute
pub fn ir_route_prefix(route: &RouteContext) -> String {
    format!(
        "{}/{}/{}/",
        route.kind().as_str().to_lowercase(),
        route.namespace_str(),
        route.name_str()
    )
}

/// Compiles SecurityPolicies into IR route features
pub struct Translator {
    config: TranslatorConfig,
    discovery: Arc<dyn IssuerDiscovery>,
}

impl Translator {
    /// Create a translator with an explicit discovery implementation
    pub fn new(config: TranslatorConfig, discovery: Arc<dyn IssuerDiscovery>) -> Self {
        Self { config, discovery }
    }

    /// Create a translator that discovers OIDC endpoints over HTTP
    pub fn from_config(config: TranslatorConfig) -> Result<Self> {
        let discovery = HttpIssuerDiscovery::new(&config.discovery)?;
        Ok(Self::new(config, Arc::new(discovery)))
    }

    /// Configuration in effect
    pub fn config(&self) -> &TranslatorConfig {
        &self.config
    }

    /// IR key of a gateway
    pub fn ir_key(&self, gateway: &Gateway) -> String {
        if self.config.merge_gateways {
            gateway.spec.gateway_class_name.clone()
        } else {
            namespaced_name(gateway.namespace_str(), gateway.name_str())
        }
    }

    /// Translate every policy in a snapshot
    pub async fn translate(&self, resources: &Resources, xds_ir: &mut XdsIrMap) -> Vec<SecurityPolicy> {
        self.process_security_policies(
            &resources.security_policies,
            &resources.gateways,
            &resources.routes(),
            resources,
            xds_ir,
        )
        .await
    }

    /// Attach, compile and merge `policies`, returning them with status set
    ///
    /// Inputs are left untouched; the returned policies are copies in
    /// processing order (route-level first, then gateway-level).
    pub async fn process_security_policies(
        &self,
        policies: &[SecurityPolicy],
        gateways: &[Gateway],
        routes: &[RouteContext],
        store: &dyn ResourceStore,
        xds_ir: &mut XdsIrMap,
    ) -> Vec<SecurityPolicy> {
        let mut ordered: Vec<&SecurityPolicy> = policies.iter().collect();
        ordered.sort_by_key(|p| p.metadata.creation_timestamp.as_ref().map(|t| t.0));

        let mut route_targets = RouteTargets::new(routes.iter().cloned());
        let mut gateway_targets = GatewayTargets::new(gateways.iter().cloned());
        let mut gateway_routes: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
        let mut processed = Vec::with_capacity(ordered.len());

        for policy in ordered.iter().filter(|p| !p.targets_gateway()) {
            let mut policy = (*policy).clone();
            if let Some(route) = resolve_route_target(&mut policy, &mut route_targets) {
                let route = route.clone();
                record_gateway_parents(&route, &mut gateway_routes);

                let build = self.build_features(&policy, store).await;
                let prefix = ir_route_prefix(&route);
                let mut applied = 0usize;
                for ir_route in xds_ir
                    .values_mut()
                    .flat_map(|xds| xds.http.iter_mut())
                    .flat_map(|listener| listener.routes.iter_mut())
                    .filter(|r| r.name.starts_with(&prefix))
                {
                    ir_route.merge_features(&build.features, MergeMode::Overwrite);
                    applied += 1;
                }
                debug!(policy = %policy.key(), prefix = %prefix, routes = applied, "applied route policy");

                report(&mut policy, &build);
            } else {
                log_rejected(&policy);
            }
            processed.push(policy);
        }

        for policy in ordered.iter().filter(|p| p.targets_gateway()) {
            let mut policy = (*policy).clone();
            let Some(gateway) = resolve_gateway_target(&mut policy, &mut gateway_targets) else {
                log_rejected(&policy);
                processed.push(policy);
                continue;
            };
            let gateway = gateway.clone();

            let build = self.build_features(&policy, store).await;
            self.apply_to_gateway(&policy, &gateway, &build.features, xds_ir);
            report(&mut policy, &build);

            let gateway_key = namespaced_name(gateway.namespace_str(), gateway.name_str());
            if let Some(routes) = gateway_routes.get(&gateway_key) {
                let listed = routes.iter().map(String::as_str).collect::<Vec<_>>().join(" ");
                set_condition(
                    &mut policy,
                    CONDITION_OVERRIDDEN,
                    ConditionStatus::True,
                    reason::OVERRIDDEN,
                    &format!(
                        "This policy is being overridden by other securityPolicies for these routes: [{}]",
                        listed
                    ),
                );
                debug!(policy = %policy.key(), gateway = %gateway_key, routes = routes.len(), "gateway policy overridden on some routes");
            }
            processed.push(policy);
        }

        processed
    }

    /// Fill empty feature slots on every route of the gateway's listeners
    fn apply_to_gateway(
        &self,
        policy: &SecurityPolicy,
        gateway: &Gateway,
        features: &SecurityFeatures,
        xds_ir: &mut XdsIrMap,
    ) {
        let ir_key = self.ir_key(gateway);
        let Some(xds) = xds_ir.get_mut(&ir_key) else {
            warn!(policy = %policy.key(), ir_key = %ir_key, "no IR for attached gateway");
            return;
        };

        let policy_target = namespaced_name(policy.target_namespace(), &policy.spec.target_ref.name);
        let mut applied = 0usize;
        for listener in xds.http.iter_mut() {
            if self.config.merge_gateways && listener.gateway_prefix() != policy_target {
                continue;
            }
            for ir_route in listener.routes.iter_mut() {
                ir_route.merge_features(features, MergeMode::FillEmpty);
                applied += 1;
            }
        }
        debug!(policy = %policy.key(), ir_key = %ir_key, routes = applied, "applied gateway policy");
    }

    /// Compile every feature the policy configures
    pub async fn build_features(
        &self,
        policy: &SecurityPolicy,
        store: &dyn ResourceStore,
    ) -> FeatureBuild {
        let spec = &policy.spec;
        let from = CrossNamespaceFrom {
            group: RAMPART_GROUP.to_string(),
            kind: KIND_SECURITY_POLICY.to_string(),
            namespace: policy.namespace_str().to_string(),
        };
        let mut build = FeatureBuild::default();

        build.features.cors = spec.cors.as_ref().map(build_cors);
        build.features.jwt = spec.jwt.as_ref().map(build_jwt);

        if let Some(oidc) = &spec.oidc {
            let result = build_oidc(policy, oidc, &from, store, self.discovery.as_ref()).await;
            build.features.oidc = build.record(result);
        }
        if let Some(basic_auth) = &spec.basic_auth {
            let result = build_basic_auth(basic_auth, &from, store);
            build.features.basic_auth = build.record(result);
        }
        if let Some(ext_auth) = &spec.ext_auth {
            let result = build_ext_auth(
                policy,
                ext_auth,
                &from,
                store,
                self.config.endpoint_routing_disabled,
            );
            build.features.ext_auth = build.record(result);
        }

        build
    }
}

/// Index the gateways a route is attached to
fn record_gateway_parents(route: &RouteContext, index: &mut BTreeMap<String, BTreeSet<String>>) {
    let route_key = namespaced_name(route.namespace_str(), route.name_str());
    for parent in route.parent_refs().iter().filter(|p| p.is_gateway()) {
        let namespace = namespace_or(parent.namespace.as_deref(), route.namespace_str());
        index
            .entry(namespaced_name(namespace, &parent.name))
            .or_default()
            .insert(route_key.clone());
    }
}

fn report(policy: &mut SecurityPolicy, build: &FeatureBuild) {
    match build.error_message() {
        Some(message) => {
            warn!(policy = %policy.key(), errors = build.errors.len(), message = %message, "security policy invalid");
            set_rejected(policy, reason::INVALID, &message);
        }
        None => {
            info!(policy = %policy.key(), target = %policy.spec.target_ref.name, "security policy accepted");
            set_accepted(policy);
        }
    }
}

fn log_rejected(policy: &SecurityPolicy) {
    if let Some(condition) = policy.condition(CONDITION_ACCEPTED) {
        warn!(
            policy = %policy.key(),
            reason = %condition.reason,
            message = %condition.message,
            "security policy not attached"
        );
    }
}
