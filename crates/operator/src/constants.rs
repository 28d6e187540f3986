// Copyright 2026 Verrazzano Maintainers
// SPDX-License-Identifier: Apache-2.0

//! Well known names shared by the agent, the controllers and the webhooks

/// Namespace of the Verrazzano system components
pub const VERRAZZANO_SYSTEM_NAMESPACE: &str = "verrazzano-system";
/// Namespace holding multi-cluster resources on the admin cluster
pub const VERRAZZANO_MULTICLUSTER_NAMESPACE: &str = "verrazzano-mc";
/// Namespace never touched by the multi-cluster controllers
pub const KUBE_SYSTEM_NAMESPACE: &str = "kube-system";
/// Namespace of Rancher, holding the additional TLS CA
pub const CATTLE_SYSTEM_NAMESPACE: &str = "cattle-system";

/// Secret holding the admin cluster kubeconfig on a managed cluster
pub const MC_AGENT_SECRET: &str = "verrazzano-cluster-agent";
/// Secret holding the registration data on a managed cluster
pub const MC_REGISTRATION_SECRET: &str = "verrazzano-cluster-registration";
/// Registration secret of a cluster that was never registered
pub const MC_LOCAL_REGISTRATION_SECRET: &str = "verrazzano-local-registration";
/// Admin cluster CA bundle shared with every managed cluster
pub const ADMIN_CA_BUNDLE_SECRET: &str = "verrazzano-local-ca-bundle";

/// Agent secret key holding the managed cluster name
pub const CLUSTER_NAME_DATA: &str = "managed-cluster-name";
/// Agent secret key holding the admin kubeconfig
pub const KUBECONFIG_DATA: &str = "admin-kubeconfig";
/// Key of the managed cluster CA inside the VMC CA secret
pub const CA_CRT_KEY: &str = "cacrt";

/// Registration keys copied from the admin cluster
pub const CA_BUNDLE_KEY: &str = "ca-bundle";
/// Elasticsearch/OpenSearch URL
pub const ES_URL_KEY: &str = "es-url";
/// Elasticsearch/OpenSearch CA bundle
pub const ES_CA_BUNDLE_KEY: &str = "es-ca-bundle";
/// Elasticsearch/OpenSearch user
pub const REGISTRATION_USERNAME_KEY: &str = "username";
/// Elasticsearch/OpenSearch password
pub const REGISTRATION_PASSWORD_KEY: &str = "password";
/// Keycloak URL
pub const KEYCLOAK_URL_KEY: &str = "keycloak-url";
/// Jaeger OpenSearch URL
pub const JAEGER_OS_URL_KEY: &str = "jaeger-os-url";
/// Jaeger OpenSearch user
pub const JAEGER_OS_USERNAME_KEY: &str = "jaeger-os-username";
/// Jaeger OpenSearch password
pub const JAEGER_OS_PASSWORD_KEY: &str = "jaeger-os-password";
/// Jaeger OpenSearch CA
pub const JAEGER_OS_TLS_CA_KEY: &str = "jaeger-os-ca.crt";
/// Jaeger OpenSearch client cert
pub const JAEGER_OS_TLS_CERT_KEY: &str = "jaeger-os-tls.crt";
/// Jaeger OpenSearch client key
pub const JAEGER_OS_TLS_KEY: &str = "jaeger-os-tls.key";
/// Dex URL
pub const DEX_URL_KEY: &str = "dex-url";
/// OIDC provider
pub const OIDC_PROVIDER_KEY: &str = "oidc-provider";

/// Registration keys compared with the admin registration secret
pub const REGISTRATION_KEYS: [&str; 13] = [
    ES_URL_KEY,
    ES_CA_BUNDLE_KEY,
    REGISTRATION_USERNAME_KEY,
    REGISTRATION_PASSWORD_KEY,
    KEYCLOAK_URL_KEY,
    JAEGER_OS_URL_KEY,
    JAEGER_OS_USERNAME_KEY,
    JAEGER_OS_PASSWORD_KEY,
    JAEGER_OS_TLS_CA_KEY,
    JAEGER_OS_TLS_CERT_KEY,
    JAEGER_OS_TLS_KEY,
    DEX_URL_KEY,
    OIDC_PROVIDER_KEY,
];

/// Local TLS secret of the Verrazzano ingress
pub const VERRAZZANO_TLS_SECRET: &str = "verrazzano-tls";
/// CA key of the Verrazzano ingress TLS secret
pub const VERRAZZANO_TLS_CA_KEY: &str = "ca.crt";
/// Private CA configured through Rancher, takes precedence over `verrazzano-tls`
pub const ADDITIONAL_TLS_SECRET: &str = "tls-ca-additional";
/// Key of the additional CA
pub const ADDITIONAL_TLS_CA_KEY: &str = "ca-additional.pem";

/// Marks objects created by the agent
pub const LABEL_VERRAZZANO_MANAGED: &str = "verrazzano-managed";
/// Cluster an agent-copied object belongs to
pub const LABEL_MANAGED_CLUSTER: &str = "verrazzano.io/managed-cluster";
/// Comma separated app configs that reference a copied object
pub const LABEL_MC_APP_CONFIGS: &str = "verrazzano.io/mc-app-configs";
/// Istio sidecar injection
pub const LABEL_ISTIO_INJECTION: &str = "istio-injection";

/// Ingress serving the Verrazzano console and API
pub const VERRAZZANO_INGRESS: &str = "verrazzano-ingress";
/// Ingress of the managed cluster Prometheus
pub const PROMETHEUS_INGRESS: &str = "vmi-system-prometheus";
/// Ingress of the Thanos query store
pub const THANOS_QUERY_STORE_INGRESS: &str = "thanos-query-store";

/// Deployment restarted when the registration secret changes
pub const MONITORING_OPERATOR_DEPLOYMENT: &str = "verrazzano-monitoring-operator";
/// Env var carrying the registration secret version
pub const REGISTRATION_SECRET_VERSION: &str = "REGISTRATION_SECRET_VERSION";
/// Fluentd log collector
pub const FLUENTD_DAEMONSET: &str = "fluentd";
/// ConfigMap with the default Elasticsearch settings of fluentd
pub const FLUENTD_ES_CONFIG: &str = "fluentd-es-config";
/// Default Elasticsearch URL of a cluster that was never registered
pub const DEFAULT_ELASTICSEARCH_URL: &str = "http://verrazzano-authproxy-elasticsearch:8775";
/// Default Elasticsearch secret of a cluster that was never registered
pub const DEFAULT_ELASTICSEARCH_SECRET: &str = "verrazzano-es-internal";
/// Key of the Elasticsearch URL in `fluentd-es-config`
pub const ES_CONFIG_URL_KEY: &str = "es-url";
/// Key of the Elasticsearch secret name in `fluentd-es-config`
pub const ES_CONFIG_SECRET_KEY: &str = "es-secret";
/// Fluentd env vars rewritten by the agent
pub const FLUENTD_CLUSTER_NAME_ENV: &str = "CLUSTER_NAME";
/// Elasticsearch URL used by fluentd
pub const FLUENTD_ES_URL_ENV: &str = "ELASTICSEARCH_URL";
/// Elasticsearch user used by fluentd
pub const FLUENTD_ES_USER_ENV: &str = "ELASTICSEARCH_USER";
/// Elasticsearch password used by fluentd
pub const FLUENTD_ES_PASSWORD_ENV: &str = "ELASTICSEARCH_PASSWORD";
/// Fluentd volume mounting the Elasticsearch secret
pub const FLUENTD_SECRET_VOLUME: &str = "secret-volume";

/// Finalizer of `VerrazzanoProject`
pub const PROJECT_FINALIZER: &str = "project.verrazzano.io";

/// Role binding names created in project namespaces
pub const PROJECT_ADMIN_ROLE: &str = "verrazzano-project-admin";
/// Kubernetes built-in admin role
pub const PROJECT_ADMIN_K8S_ROLE: &str = "admin";
/// Monitor role of a project
pub const PROJECT_MONITOR_ROLE: &str = "verrazzano-project-monitor";
/// Kubernetes built-in view role
pub const PROJECT_MONITOR_K8S_ROLE: &str = "view";
/// ClusterRole bound to managed cluster service accounts
pub const MANAGED_CLUSTER_ROLE: &str = "verrazzano-managed-cluster";

/// Name of the per managed cluster registration secret on the admin cluster
#[must_use]
pub fn registration_secret_name(cluster: &str) -> String {
    format!("verrazzano-cluster-{cluster}-registration")
}

/// Name of the per managed cluster agent secret on the admin cluster
#[must_use]
pub fn agent_secret_name(cluster: &str) -> String {
    format!("verrazzano-cluster-{cluster}-agent")
}

/// Name of the role binding and service account of a managed cluster
#[must_use]
pub fn managed_cluster_binding_name(cluster: &str) -> String {
    format!("verrazzano-cluster-{cluster}")
}
