// Copyright 2026 Verrazzano Maintainers
// SPDX-License-Identifier: Apache-2.0

//! Admission rules of projects and multi-cluster resources

use k8s_openapi::api::core::v1::Secret;
use kube::ResourceExt;
use verrazzano_crd::v1_alpha1::{LOCAL_CLUSTER_NAME, Placement};
use verrazzano_crd::{
    MultiClusterApplicationConfiguration, MultiClusterResource, VerrazzanoManagedCluster,
    VerrazzanoProject,
};

use crate::client::ClusterApi;
use crate::constants::{
    MC_REGISTRATION_SECRET, VERRAZZANO_MULTICLUSTER_NAMESPACE, VERRAZZANO_SYSTEM_NAMESPACE,
};
use crate::{Error, Result};

fn invalid(msg: impl Into<String>) -> Error {
    Error::Validation(msg.into())
}

/// Checks that every target cluster is known.
///
/// Skipped on managed clusters, they only ever receive objects the admin cluster validated.
///
/// # Errors
/// Names the problem with the placement
pub async fn validate_placement(client: &ClusterApi, placement: &Placement) -> Result<()> {
    if client
        .get::<Secret>(Some(VERRAZZANO_SYSTEM_NAMESPACE), MC_REGISTRATION_SECRET)
        .await?
        .is_some()
    {
        return Ok(());
    }

    if placement.clusters.is_empty() {
        return Err(invalid("One or more target clusters must be provided"));
    }

    for cluster in &placement.clusters {
        if cluster.name == LOCAL_CLUSTER_NAME {
            continue;
        }
        let vmc = client
            .get::<VerrazzanoManagedCluster>(Some(VERRAZZANO_MULTICLUSTER_NAMESPACE), &cluster.name)
            .await?;
        if vmc.is_none() {
            return Err(invalid(format!(
                "target cluster {} does not exist in namespace {VERRAZZANO_MULTICLUSTER_NAMESPACE}",
                cluster.name
            )));
        }
    }
    Ok(())
}

/// Checks that the namespaces of `project` are not claimed by another project
///
/// # Errors
/// Names the first namespace already in use
pub async fn validate_namespace_can_be_used(
    client: &ClusterApi,
    project: &VerrazzanoProject,
) -> Result<()> {
    let wanted = project.spec.template.namespace_names();
    let others = client
        .list::<VerrazzanoProject>(Some(VERRAZZANO_MULTICLUSTER_NAMESPACE), None)
        .await?;
    for other in others.iter().filter(|o| o.name_any() != project.name_any()) {
        let used = other.spec.template.namespace_names();
        if let Some(ns) = wanted.iter().find(|ns| used.contains(ns)) {
            return Err(invalid(format!(
                "project namespace {ns} already being used by project {}",
                other.name_any()
            )));
        }
    }
    Ok(())
}

/// Admission rules of a `VerrazzanoProject`
///
/// # Errors
/// Names the first rule the project breaks
pub async fn validate_project(client: &ClusterApi, project: &VerrazzanoProject) -> Result<()> {
    if project.namespace_or_default() != VERRAZZANO_MULTICLUSTER_NAMESPACE {
        return Err(invalid(format!(
            "Namespace for the resource must be {VERRAZZANO_MULTICLUSTER_NAMESPACE:?}"
        )));
    }

    let namespaces = project.spec.template.namespace_names();
    if namespaces.is_empty() {
        return Err(invalid("One or more namespaces must be provided"));
    }

    for policy in &project.spec.template.network_policies {
        let ns = policy.metadata.namespace.clone().unwrap_or_default();
        if !namespaces.contains(&ns) {
            return Err(invalid(format!(
                "namespace {ns} used in NetworkPolicy {} does not exist in project",
                policy.metadata.name.clone().unwrap_or_default()
            )));
        }
    }

    validate_namespace_can_be_used(client, project).await?;
    validate_placement(client, &project.spec.placement).await
}

/// Checks that `namespace` belongs to a project
///
/// # Errors
/// Fails when no project owns the namespace
pub async fn validate_project_namespace(client: &ClusterApi, namespace: &str) -> Result<()> {
    let projects = client
        .list::<VerrazzanoProject>(Some(VERRAZZANO_MULTICLUSTER_NAMESPACE), None)
        .await?;
    if projects
        .iter()
        .any(|p| p.spec.template.namespace_names().iter().any(|n| n == namespace))
    {
        return Ok(());
    }
    Err(invalid(format!(
        "namespace {namespace} is not part of any VerrazzanoProject"
    )))
}

/// Checks that the secrets an app config ships exist next to it
///
/// # Errors
/// Lists every missing secret
pub async fn validate_secrets(
    client: &ClusterApi,
    app: &MultiClusterApplicationConfiguration,
) -> Result<()> {
    let namespace = app.namespace_or_default();
    let mut missing = Vec::new();
    for name in &app.spec.secrets {
        if client.get::<Secret>(Some(&namespace), name).await?.is_none() {
            missing.push(name.as_str());
        }
    }
    if missing.is_empty() {
        return Ok(());
    }
    Err(invalid(format!(
        "secret(s) {} specified in MultiClusterApplicationConfiguration not found in namespace {namespace}",
        missing.join(",")
    )))
}

/// Rules shared by every multi-cluster kind
///
/// # Errors
/// Names the first rule the object breaks
pub async fn validate_multi_cluster<K: MultiClusterResource>(client: &ClusterApi, obj: &K) -> Result<()> {
    validate_placement(client, obj.placement()).await?;
    validate_project_namespace(client, &obj.namespace_or_default()).await
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use verrazzano_crd::v1_alpha1::{
        EmbeddedObjectMeta, MultiClusterApplicationConfigurationSpec, NamespaceTemplate,
        NetworkPolicyTemplate, ProjectTemplate, VerrazzanoManagedClusterSpec, VerrazzanoProjectSpec,
    };

    use super::*;
    use crate::test_support::{fake_cluster, registration_secret, secret};

    fn project(name: &str, namespaces: &[&str], clusters: &[&str]) -> VerrazzanoProject {
        let mut p = VerrazzanoProject::new(
            name,
            VerrazzanoProjectSpec {
                template: ProjectTemplate {
                    namespaces: namespaces
                        .iter()
                        .map(|ns| NamespaceTemplate {
                            metadata: EmbeddedObjectMeta {
                                name: Some((*ns).into()),
                                ..EmbeddedObjectMeta::default()
                            },
                            spec: None,
                        })
                        .collect(),
                    ..ProjectTemplate::default()
                },
                placement: Placement::new(clusters.iter().copied()),
            },
        );
        p.metadata.namespace = Some(VERRAZZANO_MULTICLUSTER_NAMESPACE.into());
        p
    }

    fn vmc(name: &str) -> VerrazzanoManagedCluster {
        let mut vmc = VerrazzanoManagedCluster::new(name, VerrazzanoManagedClusterSpec::default());
        vmc.metadata.namespace = Some(VERRAZZANO_MULTICLUSTER_NAMESPACE.into());
        vmc
    }

    fn app(namespace: &str, secrets: &[&str]) -> MultiClusterApplicationConfiguration {
        let mut a = MultiClusterApplicationConfiguration::new(
            "app",
            MultiClusterApplicationConfigurationSpec {
                placement: Placement::new(["local"]),
                secrets: secrets.iter().map(ToString::to_string).collect(),
                ..MultiClusterApplicationConfigurationSpec::default()
            },
        );
        a.metadata.namespace = Some(namespace.into());
        a
    }

    #[tokio::test]
    async fn project_must_live_in_multicluster_namespace() {
        let (_, api) = fake_cluster();
        let mut p = project("p", &["ns1"], &["local"]);
        assert!(validate_project(&api, &p).await.is_ok());

        p.metadata.namespace = Some("invalid-namespace".into());
        let err = validate_project(&api, &p).await.unwrap_err();
        assert!(err.to_string().contains("resource must be \"verrazzano-mc\""));
    }

    #[tokio::test]
    async fn project_requires_namespaces() {
        let (_, api) = fake_cluster();
        let err = validate_project(&api, &project("p", &[], &["local"]))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "One or more namespaces must be provided");
    }

    #[tokio::test]
    async fn network_policies_stay_within_project() {
        let (_, api) = fake_cluster();
        let mut p = project("p", &["ns2"], &["local"]);
        p.spec.template.network_policies.push(NetworkPolicyTemplate {
            metadata: EmbeddedObjectMeta {
                name: Some("net1".into()),
                namespace: Some("ns1".into()),
                ..EmbeddedObjectMeta::default()
            },
            ..NetworkPolicyTemplate::default()
        });
        let err = validate_project(&api, &p).await.unwrap_err();
        assert_eq!(
            err.to_string(),
            "namespace ns1 used in NetworkPolicy net1 does not exist in project"
        );

        p.spec.template.namespaces.push(NamespaceTemplate {
            metadata: EmbeddedObjectMeta {
                name: Some("ns1".into()),
                ..EmbeddedObjectMeta::default()
            },
            spec: None,
        });
        assert!(validate_project(&api, &p).await.is_ok());
    }

    #[tokio::test]
    async fn namespaces_owned_by_one_project() {
        let (fake, api) = fake_cluster();
        fake.insert(&project("existing-project-1", &["project1", "project2"], &["local"]));
        fake.insert(&project("existing-project-2", &["project3", "project4"], &["local"]));

        let fresh = project("test-project", &["project"], &["local"]);
        assert!(validate_namespace_can_be_used(&api, &fresh).await.is_ok());

        let clash = project("test-project1", &["project2"], &["local"]);
        assert!(validate_namespace_can_be_used(&api, &clash).await.is_err());
        assert!(validate_project(&api, &clash).await.is_err());

        let steals = project("existing-project-1", &["project", "project4"], &["local"]);
        let err = validate_namespace_can_be_used(&api, &steals).await.unwrap_err();
        assert!(err.to_string().contains("existing-project-2"));

        let update = project("existing-project-1", &["project", "project2"], &["local"]);
        assert!(validate_namespace_can_be_used(&api, &update).await.is_ok());
    }

    #[tokio::test]
    async fn placement_needs_known_clusters() {
        let (fake, api) = fake_cluster();
        let err = validate_placement(&api, &Placement::default()).await.unwrap_err();
        assert!(err.to_string().contains("target cluster"));

        let err = validate_placement(&api, &Placement::new(["invalid-cluster-name"]))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("invalid-cluster-name"));

        fake.insert(&vmc("valid-cluster-name"));
        assert!(
            validate_placement(&api, &Placement::new(["valid-cluster-name", "local"]))
                .await
                .is_ok()
        );
    }

    #[tokio::test]
    async fn placement_not_checked_on_managed_cluster() {
        let (fake, api) = fake_cluster();
        fake.insert(&registration_secret(MC_REGISTRATION_SECRET, "managed1"));
        assert!(validate_placement(&api, &Placement::default()).await.is_ok());
        assert!(
            validate_placement(&api, &Placement::new(["invalid-cluster-name"]))
                .await
                .is_ok()
        );
    }

    #[tokio::test]
    async fn app_config_secrets_must_exist() {
        let (fake, api) = fake_cluster();
        let ns = VERRAZZANO_MULTICLUSTER_NAMESPACE;
        assert!(validate_secrets(&api, &app(ns, &[])).await.is_ok());

        let err = validate_secrets(&api, &app(ns, &["secret1"])).await.unwrap_err();
        assert_eq!(
            err.to_string(),
            "secret(s) secret1 specified in MultiClusterApplicationConfiguration not found in namespace verrazzano-mc"
        );
        let err = validate_secrets(&api, &app(ns, &["secret1", "secret2"]))
            .await
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "secret(s) secret1,secret2 specified in MultiClusterApplicationConfiguration not found in namespace verrazzano-mc"
        );

        fake.insert(&secret(ns, "secret1", &[]));
        assert!(validate_secrets(&api, &app(ns, &["secret1"])).await.is_ok());
    }

    #[tokio::test]
    async fn multi_cluster_objects_need_a_project_namespace() {
        let (fake, api) = fake_cluster();
        let a = app("application-ns", &[]);
        let err = validate_multi_cluster(&api, &a).await.unwrap_err();
        assert!(err.to_string().contains("application-ns"));

        fake.insert(&project("p", &["application-ns"], &["local"]));
        assert!(validate_multi_cluster(&api, &a).await.is_ok());
    }
}
