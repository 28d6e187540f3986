// Copyright 2026 Verrazzano Maintainers
// SPDX-License-Identifier: Apache-2.0

//! v1Alpha1 CRD resources of the `clusters.verrazzano.io` group

use std::collections::BTreeMap;

use k8s_openapi::ByteString;
use k8s_openapi::api::core::v1::NamespaceSpec;
use k8s_openapi::api::networking::v1::NetworkPolicySpec;
use k8s_openapi::api::rbac::v1::Subject;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Cluster name that always refers to the admin cluster itself
pub const LOCAL_CLUSTER_NAME: &str = "local";

fn preserve_unknown_fields(_: &mut schemars::SchemaGenerator) -> schemars::Schema {
    schemars::json_schema!({
        "type": "object",
        "x-kubernetes-preserve-unknown-fields": true
    })
}

/// A single target cluster of a placement
#[derive(Deserialize, Serialize, Clone, Default, Debug, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Cluster {
    /// Name of the managed cluster (or `local`)
    #[schemars(length(min = 1, max = 253))]
    pub name: String,
}

/// Clusters a multi-cluster resource is placed on
#[derive(Deserialize, Serialize, Clone, Default, Debug, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Placement {
    /// Target clusters
    #[serde(default)]
    pub clusters: Vec<Cluster>,
}

impl Placement {
    /// Placement targeting the given cluster names
    pub fn new<I, S>(clusters: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            clusters: clusters
                .into_iter()
                .map(|name| Cluster { name: name.into() })
                .collect(),
        }
    }

    /// Returns true when `cluster` is one of the placement targets
    #[must_use]
    pub fn includes(&self, cluster: &str) -> bool {
        self.clusters.iter().any(|c| c.name == cluster)
    }
}

/// Kind of deployment condition reported by a cluster
#[derive(Deserialize, Serialize, Clone, Copy, Debug, PartialEq, Eq, Hash, JsonSchema)]
pub enum ConditionType {
    /// Resource has been applied on the cluster
    DeployComplete,
    /// Resource is waiting to be applied
    DeployPending,
    /// Applying the resource failed
    DeployFailed,
}

/// A deployment condition, timestamps are RFC3339 strings
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    /// Condition type
    #[serde(rename = "type")]
    pub type_: ConditionType,
    /// `True` or `False`
    pub status: String,
    /// Human readable detail
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// When the condition was recorded
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_transition_time: Option<String>,
}

/// Deployment state of a resource, per cluster or overall
#[derive(Deserialize, Serialize, Clone, Copy, Debug, Default, PartialEq, Eq, Hash, JsonSchema)]
pub enum StateType {
    /// Not every placement has reported success yet
    #[default]
    Pending,
    /// Every placement reported success
    Succeeded,
    /// At least one placement reported a failure
    Failed,
}

/// Deployment state of a resource on one cluster
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ClusterLevelStatus {
    /// Cluster name
    pub name: String,
    /// State on that cluster
    pub state: StateType,
    /// Message of the condition that produced this state
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Last time the cluster reported, RFC3339
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_update_time: Option<String>,
}

/// Status shared by every multi-cluster kind
#[derive(Deserialize, Serialize, Clone, Default, Debug, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct MultiClusterResourceStatus {
    /// Conditions reported by clusters
    #[serde(default)]
    pub conditions: Vec<Condition>,
    /// Effective state computed over all placements
    #[serde(default)]
    pub state: StateType,
    /// Per cluster states
    #[serde(default)]
    pub clusters: Vec<ClusterLevelStatus>,
}

/// Metadata subset embedded in templates
#[derive(Deserialize, Serialize, Clone, Default, Debug, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct EmbeddedObjectMeta {
    /// Object name, defaults to the wrapper's name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Object namespace, defaults to the wrapper's namespace
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    /// Labels applied to the materialised object
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
    /// Annotations applied to the materialised object
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,
}

/// Template of the Secret materialised by a `MultiClusterSecret`
#[derive(Deserialize, Serialize, Clone, Default, Debug, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SecretTemplate {
    /// Secret metadata
    #[serde(default)]
    pub metadata: EmbeddedObjectMeta,
    /// Base64 encoded data
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    #[schemars(with = "BTreeMap<String, String>")]
    pub data: BTreeMap<String, ByteString>,
    /// Plain text data, merged into `data` by the API server
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub string_data: BTreeMap<String, String>,
    /// Secret type
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub type_: Option<String>,
}

/// Spec object for the `MultiClusterSecret` CRD
#[derive(CustomResource, Deserialize, Serialize, Clone, Default, Debug, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
#[kube(
    kind = "MultiClusterSecret",
    group = "clusters.verrazzano.io",
    version = "v1alpha1"
)]
#[kube(status = "MultiClusterResourceStatus", shortname = "mcsecret")]
#[kube(namespaced)]
pub struct MultiClusterSecretSpec {
    /// Secret to create on each placed cluster
    pub template: SecretTemplate,
    /// Target clusters
    pub placement: Placement,
}

/// Template of the ConfigMap materialised by a `MultiClusterConfigMap`
#[derive(Deserialize, Serialize, Clone, Default, Debug, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ConfigMapTemplate {
    /// ConfigMap metadata
    #[serde(default)]
    pub metadata: EmbeddedObjectMeta,
    /// Text data
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub data: BTreeMap<String, String>,
    /// Binary data
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    #[schemars(with = "BTreeMap<String, String>")]
    pub binary_data: BTreeMap<String, ByteString>,
}

/// Spec object for the `MultiClusterConfigMap` CRD
#[derive(CustomResource, Deserialize, Serialize, Clone, Default, Debug, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
#[kube(
    kind = "MultiClusterConfigMap",
    group = "clusters.verrazzano.io",
    version = "v1alpha1"
)]
#[kube(status = "MultiClusterResourceStatus", shortname = "mccm")]
#[kube(namespaced)]
pub struct MultiClusterConfigMapSpec {
    /// ConfigMap to create on each placed cluster
    pub template: ConfigMapTemplate,
    /// Target clusters
    pub placement: Placement,
}

/// Template holding an opaque OAM spec
#[derive(Deserialize, Serialize, Clone, Default, Debug, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct OamTemplate {
    /// Metadata of the OAM object
    #[serde(default)]
    pub metadata: EmbeddedObjectMeta,
    /// OAM spec, copied as is
    #[schemars(schema_with = "preserve_unknown_fields")]
    #[serde(default)]
    pub spec: serde_json::Value,
}

impl OamTemplate {
    /// Component names referenced by an OAM `ApplicationConfiguration` spec
    #[must_use]
    pub fn component_names(&self) -> Vec<String> {
        self.spec
            .get("components")
            .and_then(serde_json::Value::as_array)
            .map(|components| {
                components
                    .iter()
                    .filter_map(|c| c.get("componentName").and_then(serde_json::Value::as_str))
                    .map(ToString::to_string)
                    .collect()
            })
            .unwrap_or_default()
    }
}

/// Spec object for the `MultiClusterComponent` CRD
#[derive(CustomResource, Deserialize, Serialize, Clone, Default, Debug, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
#[kube(
    kind = "MultiClusterComponent",
    group = "clusters.verrazzano.io",
    version = "v1alpha1"
)]
#[kube(status = "MultiClusterResourceStatus", shortname = "mccomp")]
#[kube(namespaced)]
pub struct MultiClusterComponentSpec {
    /// OAM Component to create on each placed cluster
    pub template: OamTemplate,
    /// Target clusters
    pub placement: Placement,
}

/// Spec object for the `MultiClusterApplicationConfiguration` CRD
#[derive(CustomResource, Deserialize, Serialize, Clone, Default, Debug, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
#[kube(
    kind = "MultiClusterApplicationConfiguration",
    group = "clusters.verrazzano.io",
    version = "v1alpha1"
)]
#[kube(status = "MultiClusterResourceStatus", shortname = "mcappconf")]
#[kube(namespaced)]
pub struct MultiClusterApplicationConfigurationSpec {
    /// OAM ApplicationConfiguration to create on each placed cluster
    pub template: OamTemplate,
    /// Target clusters
    pub placement: Placement,
    /// Secrets in the same namespace that are copied along with the application
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub secrets: Vec<String>,
}

/// A namespace owned by a project
#[derive(Deserialize, Serialize, Clone, Default, Debug, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct NamespaceTemplate {
    /// Namespace metadata, `name` is required
    pub metadata: EmbeddedObjectMeta,
    /// Namespace spec
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spec: Option<NamespaceSpec>,
}

/// Network policy created inside a project namespace
#[derive(Deserialize, Serialize, Clone, Default, Debug, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct NetworkPolicyTemplate {
    /// Policy metadata, `name` and `namespace` are required
    pub metadata: EmbeddedObjectMeta,
    /// Policy spec
    #[serde(default)]
    pub spec: NetworkPolicySpec,
}

/// Subjects granted access to the project namespaces
#[derive(Deserialize, Serialize, Clone, Default, Debug, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SecuritySpec {
    /// Subjects bound to the project admin roles
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub project_admin_subjects: Vec<Subject>,
    /// Subjects bound to the project monitor roles
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub project_monitor_subjects: Vec<Subject>,
}

/// Contents of a project
#[derive(Deserialize, Serialize, Clone, Default, Debug, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ProjectTemplate {
    /// Namespaces belonging to the project
    #[serde(default)]
    pub namespaces: Vec<NamespaceTemplate>,
    /// Role bindings subjects
    #[serde(default)]
    pub security: SecuritySpec,
    /// Network policies applied to the project namespaces
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub network_policies: Vec<NetworkPolicyTemplate>,
}

impl ProjectTemplate {
    /// Names of the project namespaces, templates without a name are skipped
    #[must_use]
    pub fn namespace_names(&self) -> Vec<String> {
        self.namespaces
            .iter()
            .filter_map(|ns| ns.metadata.name.clone())
            .collect()
    }
}

/// Spec object for the `VerrazzanoProject` CRD
#[derive(CustomResource, Deserialize, Serialize, Clone, Default, Debug, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
#[kube(
    kind = "VerrazzanoProject",
    group = "clusters.verrazzano.io",
    version = "v1alpha1"
)]
#[kube(status = "MultiClusterResourceStatus", shortname = "vp")]
#[kube(namespaced)]
pub struct VerrazzanoProjectSpec {
    /// Project contents
    pub template: ProjectTemplate,
    /// Target clusters
    pub placement: Placement,
}

/// Spec object for the `VerrazzanoManagedCluster` CRD
#[derive(CustomResource, Deserialize, Serialize, Clone, Default, Debug, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
#[kube(
    kind = "VerrazzanoManagedCluster",
    group = "clusters.verrazzano.io",
    version = "v1alpha1"
)]
#[kube(status = "VerrazzanoManagedClusterStatus", shortname = "vmc")]
#[kube(namespaced)]
pub struct VerrazzanoManagedClusterSpec {
    /// Free form description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Secret holding the managed cluster CA under the `cacrt` key
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ca_secret: Option<String>,
    /// Service account used by the managed cluster agent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_account: Option<String>,
    /// Secret holding the registration manifest
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub managed_cluster_manifest_secret: Option<String>,
}

/// State object for the `VerrazzanoManagedCluster` CRD
#[derive(Deserialize, Serialize, Clone, Default, Debug, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct VerrazzanoManagedClusterStatus {
    /// Last time the managed cluster agent reached the admin cluster, RFC3339
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_agent_connect_time: Option<String>,
    /// Managed cluster API endpoint
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_url: Option<String>,
    /// Prometheus host of the managed cluster
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prometheus_host: Option<String>,
    /// Thanos query store endpoint of the managed cluster
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thanos_query_store: Option<String>,
}
