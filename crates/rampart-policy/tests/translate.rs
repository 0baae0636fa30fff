//! End-to-end translation of a YAML snapshot
//!
//! Story: a platform team protects every route behind the `eg` gateway with
//! external authorization and CORS, while the team owning `backend` swaps in
//! OIDC login plus basic auth for their route only.

use std::sync::Arc;

use axum::routing::get;
use axum::{Json, Router};

use rampart_common::crd::{ConditionStatus, SecurityPolicy};
use rampart_common::yaml::parse_yaml_document;
use rampart_policy::ir::{AppProtocol, DestinationEndpoint, StringMatch, XdsIrMap};
use rampart_policy::oidc::HttpIssuerDiscovery;
use rampart_policy::{DiscoveryConfig, Resources, Translator, TranslatorConfig};

const SNAPSHOT: &str = r#"
apiVersion: gateway.networking.k8s.io/v1
kind: Gateway
metadata: {name: eg, namespace: default}
spec:
  gatewayClassName: eg
  listeners:
    - {name: http, port: 80, protocol: HTTP}
---
apiVersion: gateway.networking.k8s.io/v1
kind: HTTPRoute
metadata: {name: backend, namespace: default}
spec:
  parentRefs: [{name: eg}]
  rules: [{backendRefs: [{name: backend, port: 3000}]}]
---
apiVersion: gateway.networking.k8s.io/v1
kind: GRPCRoute
metadata: {name: echo, namespace: default}
spec:
  parentRefs: [{name: eg}]
---
apiVersion: v1
kind: Service
metadata: {name: http-backend, namespace: envoy-gateway}
spec:
  clusterIP: 10.96.12.7
  ports:
    - {name: http, port: 80, protocol: TCP}
---
apiVersion: discovery.k8s.io/v1
kind: EndpointSlice
metadata:
  name: http-backend-x1
  namespace: envoy-gateway
  labels: {kubernetes.io/service-name: http-backend}
addressType: IPv4
endpoints: [{addresses: ["10.244.0.9"]}]
ports: [{name: http, port: 80, protocol: TCP}]
---
apiVersion: gateway.networking.k8s.io/v1beta1
kind: ReferenceGrant
metadata: {name: ext-auth, namespace: envoy-gateway}
spec:
  from: [{group: gateway.rampart.dev, kind: SecurityPolicy, namespace: default}]
  to: [{group: "", kind: Service, name: http-backend}]
---
apiVersion: v1
kind: Secret
metadata: {name: client-secret, namespace: default}
data:
  client-secret: Y2xpZW50MXNlY3JldA==
---
apiVersion: v1
kind: Secret
metadata: {name: users, namespace: default}
data:
  .htpasswd: dXNlcjE6e1NIQX10RVNzQm1FL3lOWTNsYjZhMEw2dlZRRVpOcXc9
---
apiVersion: gateway.rampart.dev/v1alpha1
kind: SecurityPolicy
metadata:
  name: gateway-auth
  namespace: default
  uid: 9b1d4f1e-0000-4000-8000-000000000001
  creationTimestamp: "2024-01-01T00:00:00Z"
spec:
  targetRef: {group: gateway.networking.k8s.io, kind: Gateway, name: eg}
  cors:
    allowOrigins: ["https://*.example.com"]
    allowMethods: [GET, POST]
  extAuth:
    headersToExtAuth: [cookie]
    http:
      backendRef: {name: http-backend, namespace: envoy-gateway, port: 80}
      path: /authz
      headersToBackend: [x-user-id]
---
apiVersion: gateway.rampart.dev/v1alpha1
kind: SecurityPolicy
metadata:
  name: backend-login
  namespace: default
  uid: 9b1d4f1e-0000-4000-8000-000000000002
  creationTimestamp: "2024-01-02T00:00:00Z"
spec:
  targetRef: {group: gateway.networking.k8s.io, kind: HTTPRoute, name: backend}
  oidc:
    provider:
      issuer: ISSUER
    clientID: client1
    clientSecret: {name: client-secret}
    scopes: [email]
    redirectURL: "https://www.example.com/bar/oauth2/callback"
  basicAuth:
    users: {name: users}
---
apiVersion: gateway.rampart.dev/v1alpha1
kind: SecurityPolicy
metadata:
  name: backend-late
  namespace: default
  creationTimestamp: "2024-01-03T00:00:00Z"
spec:
  targetRef: {group: gateway.networking.k8s.io, kind: HTTPRoute, name: backend}
  cors:
    allowOrigins: ["https://late.example.com"]
"#;

const IR: &str = r#"
default/eg:
  http:
    - name: default/eg/http
      routes:
        - name: httproute/default/backend/rule/0/match/0/www_example_com
        - name: grpcroute/default/echo/rule/0/match/0/www_example_com
"#;

async fn serve_issuer() -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind");
    let base = format!("http://{}", listener.local_addr().expect("addr"));
    let router = Router::new().route(
        "/.well-known/openid-configuration",
        get(|| async {
            Json(serde_json::json!({
                "token_endpoint": "https://oauth2.example.com/token",
                "authorization_endpoint": "https://accounts.example.com/auth"
            }))
        }),
    );
    tokio::spawn(async move {
        axum::serve(listener, router).await.expect("serve");
    });
    base
}

fn load_ir() -> XdsIrMap {
    serde_json::from_value(parse_yaml_document(IR).expect("ir yaml")).expect("ir")
}

fn find<'a>(policies: &'a [SecurityPolicy], name: &str) -> &'a SecurityPolicy {
    policies
        .iter()
        .find(|p| p.metadata.name.as_deref() == Some(name))
        .expect("policy present")
}

fn translator(config: TranslatorConfig) -> Translator {
    let discovery = HttpIssuerDiscovery::new(&DiscoveryConfig::default()).expect("client");
    Translator::new(config, Arc::new(discovery))
}

#[tokio::test]
async fn snapshot_translates_with_route_precedence() {
    let issuer = serve_issuer().await;
    let resources = Resources::from_yaml(&SNAPSHOT.replace("ISSUER", &issuer)).expect("snapshot");
    let mut xds = load_ir();

    let policies = translator(TranslatorConfig::default())
        .translate(&resources, &mut xds)
        .await;
    assert_eq!(policies.len(), 3);

    let login = find(&policies, "backend-login");
    let accepted = login.condition("Accepted").expect("accepted");
    assert_eq!(accepted.status, ConditionStatus::True, "{}", accepted.message);

    let late = find(&policies, "backend-late");
    assert_eq!(late.condition("Accepted").expect("accepted").reason, "Conflicted");

    let gateway = find(&policies, "gateway-auth");
    assert_eq!(
        gateway.condition("Accepted").expect("accepted").status,
        ConditionStatus::True
    );
    assert_eq!(
        gateway.condition("Overridden").expect("overridden").message,
        "This policy is being overridden by other securityPolicies for these routes: [default/backend]"
    );

    let routes = &xds["default/eg"].http[0].routes;
    let backend = &routes[0];
    let echo = &routes[1];

    let oidc = backend.oidc.as_ref().expect("oidc on backend");
    assert_eq!(oidc.provider.token_endpoint, "https://oauth2.example.com/token");
    assert_eq!(oidc.client_secret, b"client1secret");
    assert_eq!(oidc.scopes, vec!["email", "openid"]);
    assert_eq!(oidc.redirect_path, "/bar/oauth2/callback");
    assert!(backend.basic_auth.is_some());
    // Slots the route policy leaves unset are still filled from the gateway
    assert_eq!(backend.cors, echo.cors);
    assert!(backend.ext_auth.is_some());

    let cors = echo.cors.as_ref().expect("cors on echo");
    assert_eq!(
        cors.allow_origins,
        vec![StringMatch::SafeRegex("https://.*\\.example\\.com".to_string())]
    );
    let http = echo
        .ext_auth
        .as_ref()
        .and_then(|e| e.http.as_ref())
        .expect("http ext auth on echo");
    assert_eq!(http.authority, "http-backend.envoy-gateway:80");
    assert_eq!(http.path, "/authz");
    assert_eq!(
        http.destination.name,
        "securitypolicy/default/gateway-auth/http-backend"
    );
    assert_eq!(
        http.destination.settings[0].endpoints,
        vec![DestinationEndpoint::new("10.244.0.9", 80)]
    );
    assert_eq!(http.destination.settings[0].protocol, AppProtocol::Http);
}

#[tokio::test]
async fn gateway_ext_auth_routes_to_cluster_ip_when_endpoint_routing_disabled() {
    let resources = Resources::from_yaml(&SNAPSHOT.replace("ISSUER", "http://127.0.0.1:1"))
        .expect("snapshot");
    let mut xds = load_ir();

    let config = TranslatorConfig {
        endpoint_routing_disabled: true,
        ..Default::default()
    };
    let policies = translator(config).translate(&resources, &mut xds).await;

    let login = find(&policies, "backend-login");
    let accepted = login.condition("Accepted").expect("accepted");
    assert_eq!(accepted.reason, "Invalid");
    assert!(accepted
        .message
        .starts_with("Error fetching endpoints from issuer: "));

    let routes = &xds["default/eg"].http[0].routes;
    // Basic auth still applies even though OIDC failed
    assert!(routes[0].basic_auth.is_some());
    assert!(routes[0].oidc.is_none());

    let setting = &routes[1]
        .ext_auth
        .as_ref()
        .and_then(|e| e.http.as_ref())
        .expect("http ext auth")
        .destination
        .settings[0];
    assert_eq!(setting.endpoints, vec![DestinationEndpoint::new("10.96.12.7", 80)]);
    assert_eq!(setting.address_type, None);
    assert_eq!(setting.weight, Some(1));
}
