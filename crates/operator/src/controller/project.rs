// Copyright 2026 Verrazzano Maintainers
// SPDX-License-Identifier: Apache-2.0

//! Reconciliation of `VerrazzanoProject` namespaces, role bindings and network policies

use std::collections::{BTreeMap, HashSet};

use k8s_openapi::api::core::v1::Namespace;
use k8s_openapi::api::networking::v1::NetworkPolicy;
use k8s_openapi::api::rbac::v1::{RoleBinding, RoleRef, Subject};
use kube::runtime::controller::Action;
use kube::{Resource, ResourceExt};
use tracing::{debug, error, info, instrument, warn};
use verrazzano_crd::v1_alpha1::{LOCAL_CLUSTER_NAME, NamespaceTemplate};
use verrazzano_crd::{MultiClusterResource, VerrazzanoManagedCluster, VerrazzanoProject};

use super::{ReconcileContext, add_finalizer, remove_finalizer};
use crate::client::{ClusterApi, OperationResult};
use crate::clusters::{self, condition_from_result, random_requeue_delay, set_effective_state_if_changed};
use crate::constants::{
    KUBE_SYSTEM_NAMESPACE, LABEL_ISTIO_INJECTION, LABEL_VERRAZZANO_MANAGED, MANAGED_CLUSTER_ROLE,
    PROJECT_ADMIN_K8S_ROLE, PROJECT_ADMIN_ROLE, PROJECT_FINALIZER, PROJECT_MONITOR_K8S_ROLE,
    PROJECT_MONITOR_ROLE, VERRAZZANO_MULTICLUSTER_NAMESPACE, VERRAZZANO_SYSTEM_NAMESPACE,
    managed_cluster_binding_name,
};
use crate::{Error, Result};

const RBAC_GROUP: &str = "rbac.authorization.k8s.io";

/// Reconciles one project against this cluster.
///
/// # Errors
/// Fails when the finalizer or the status of the project cannot be written
#[instrument(skip(project, ctx), fields(name = %project.name_any()))]
pub async fn reconcile_project(project: &VerrazzanoProject, ctx: &ReconcileContext) -> Result<Action> {
    if project.namespace_or_default() == KUBE_SYSTEM_NAMESPACE {
        info!("projects in kube-system are not reconciled, ignoring");
        return Ok(Action::await_change());
    }

    if project.meta().deletion_timestamp.is_some() {
        if project.finalizers().iter().any(|f| f == PROJECT_FINALIZER) {
            debug!("deleting all network policies of the project");
            delete_network_policies(&ctx.client, project, None).await?;
            delete_role_bindings(&ctx.client, Some(project)).await?;
            remove_finalizer(&ctx.client, project.clone(), PROJECT_FINALIZER).await?;
        }
        return Ok(Action::await_change());
    }

    let project = add_finalizer(&ctx.client, project.clone(), PROJECT_FINALIZER).await?;

    let result = sync_all(&ctx.client, &project)
        .await
        .map(|()| OperationResult::Created);
    if let Err(e) = &result {
        warn!(error = %e, "failed to sync project");
    }

    let condition = condition_from_result(&result, "VerrazzanoProject");
    let cluster_name = clusters::cluster_name(&ctx.client).await;
    clusters::update_status(
        &ctx.client,
        &project,
        condition,
        &cluster_name,
        ctx.agent_channel.as_ref(),
    )
    .await?;

    // the status write above bumped the resource version
    if let Some(mut latest) = ctx
        .client
        .get::<VerrazzanoProject>(project.namespace().as_deref(), &project.name_any())
        .await?
    {
        let placement = latest.placement().clone();
        let old_state = set_effective_state_if_changed(&placement, latest.mc_status_mut());
        if old_state != latest.mc_status_mut().state {
            let status = latest.mc_status_mut().clone();
            ctx.client.patch_status(&latest, &status).await?;
        }
    }

    match result {
        Ok(_) => Ok(Action::await_change()),
        Err(_) => Ok(Action::requeue(random_requeue_delay())),
    }
}

async fn sync_all(client: &ClusterApi, project: &VerrazzanoProject) -> Result<()> {
    create_or_update_namespaces(client, project).await?;
    sync_network_policies(client, project).await
}

async fn create_or_update_namespaces(client: &ClusterApi, project: &VerrazzanoProject) -> Result<()> {
    // only projects in the multi-cluster namespace own namespaces
    if project.namespace_or_default() != VERRAZZANO_MULTICLUSTER_NAMESPACE {
        return Ok(());
    }

    for template in &project.spec.template.namespaces {
        let Some(name) = template.metadata.name.as_deref() else {
            continue;
        };
        debug!(namespace = %name, "create or update project namespace");

        let istio_injection = client
            .get::<Namespace>(None, VERRAZZANO_SYSTEM_NAMESPACE)
            .await?
            .ok_or_else(|| clusters::not_found("namespaces", VERRAZZANO_SYSTEM_NAMESPACE))?
            .labels()
            .get(LABEL_ISTIO_INJECTION)
            .cloned()
            .unwrap_or_else(|| "enabled".to_string());

        let mut namespace = Namespace::default();
        namespace.metadata.name = Some(name.to_string());
        client
            .create_or_update(namespace, |ns| mutate_namespace(template, &istio_injection, ns))
            .await
            .map_err(|e| Error::Message(format!("Failed to create or update namespace {name}: {e}")))?;

        create_or_update_role_bindings(client, name, project).await?;
        delete_role_bindings(client, None).await?;
    }
    Ok(())
}

fn mutate_namespace(template: &NamespaceTemplate, istio_injection: &str, namespace: &mut Namespace) {
    let annotations = &template.metadata.annotations;
    namespace.metadata.annotations = (!annotations.is_empty()).then(|| annotations.clone());
    namespace.spec.clone_from(&template.spec);

    let labels = namespace.metadata.labels.get_or_insert_with(BTreeMap::new);
    labels.insert(LABEL_VERRAZZANO_MANAGED.into(), "true".into());
    labels.insert(LABEL_ISTIO_INJECTION.into(), istio_injection.into());
    labels.extend(template.metadata.labels.clone());
}

fn group_subject(name: String) -> Subject {
    Subject {
        kind: "Group".into(),
        name,
        ..Subject::default()
    }
}

fn role_binding(namespace: &str, name: &str, role: &str, subjects: Vec<Subject>) -> RoleBinding {
    let mut binding = RoleBinding {
        role_ref: RoleRef {
            api_group: RBAC_GROUP.into(),
            kind: "ClusterRole".into(),
            name: role.into(),
        },
        subjects: Some(subjects),
        ..RoleBinding::default()
    };
    binding.metadata.name = Some(name.into());
    binding.metadata.namespace = Some(namespace.into());
    binding
}

/// Binding granting a managed cluster access to a project namespace
#[must_use]
pub fn managed_cluster_role_binding(namespace: &str, cluster: &str) -> RoleBinding {
    let name = managed_cluster_binding_name(cluster);
    let subject = Subject {
        kind: "ServiceAccount".into(),
        name: name.clone(),
        namespace: Some(VERRAZZANO_MULTICLUSTER_NAMESPACE.into()),
        ..Subject::default()
    };
    role_binding(namespace, &name, MANAGED_CLUSTER_ROLE, vec![subject])
}

async fn create_or_update_role_bindings(
    client: &ClusterApi,
    namespace: &str,
    project: &VerrazzanoProject,
) -> Result<()> {
    let security = &project.spec.template.security;
    let project_name = project.name_any();

    let admin_subjects = if security.project_admin_subjects.is_empty() {
        vec![group_subject(format!("verrazzano-project-{project_name}-admins"))]
    } else {
        security.project_admin_subjects.clone()
    };
    let monitor_subjects = if security.project_monitor_subjects.is_empty() {
        vec![group_subject(format!("verrazzano-project-{project_name}-monitors"))]
    } else {
        security.project_monitor_subjects.clone()
    };

    let mut bindings = Vec::new();
    for role in [PROJECT_ADMIN_ROLE, PROJECT_ADMIN_K8S_ROLE] {
        bindings.push(role_binding(namespace, role, role, admin_subjects.clone()));
    }
    for role in [PROJECT_MONITOR_ROLE, PROJECT_MONITOR_K8S_ROLE] {
        bindings.push(role_binding(namespace, role, role, monitor_subjects.clone()));
    }
    bindings.extend(
        project
            .spec
            .placement
            .clusters
            .iter()
            .filter(|c| c.name != LOCAL_CLUSTER_NAME)
            .map(|c| managed_cluster_role_binding(namespace, &c.name)),
    );

    for binding in bindings {
        create_or_update_role_binding(client, binding).await?;
    }
    Ok(())
}

async fn create_or_update_role_binding(client: &ClusterApi, binding: RoleBinding) -> Result<()> {
    let role_ref = binding.role_ref.clone();
    let subjects = binding.subjects.clone();
    let name = binding.name_any();
    client
        .create_or_update(binding, |rb| {
            rb.role_ref = role_ref;
            rb.subjects = subjects;
        })
        .await
        .inspect_err(|e| error!(role_binding = %name, error = %e, "failed to create or update role binding"))?;
    Ok(())
}

/// Deletes the managed cluster role bindings no project placement asks for anymore.
///
/// Bindings of `deleting` itself are all considered orphans.
///
/// # Errors
/// Fails on API errors
pub async fn delete_role_bindings(
    client: &ClusterApi,
    deleting: Option<&VerrazzanoProject>,
) -> Result<()> {
    let projects = client
        .list::<VerrazzanoProject>(Some(VERRAZZANO_MULTICLUSTER_NAMESPACE), None)
        .await?;

    let mut expected = HashSet::new();
    for project in &projects {
        if deleting.is_some_and(|d| d.name_any() == project.name_any()) {
            continue;
        }
        for namespace in project.spec.template.namespace_names() {
            for cluster in &project.spec.placement.clusters {
                expected.insert((namespace.clone(), cluster.name.clone()));
            }
        }
    }

    let managed_clusters = client
        .list::<VerrazzanoManagedCluster>(Some(VERRAZZANO_MULTICLUSTER_NAMESPACE), None)
        .await?;

    for vmc in &managed_clusters {
        let cluster = vmc.name_any();
        let binding = managed_cluster_binding_name(&cluster);
        for project in &projects {
            for namespace in project.spec.template.namespace_names() {
                if expected.contains(&(namespace.clone(), cluster.clone())) {
                    continue;
                }
                if client.delete::<RoleBinding>(Some(&namespace), &binding).await? {
                    debug!(role_binding = %binding, namespace = %namespace, "deleted role binding from project");
                }
            }
        }
    }
    Ok(())
}

async fn sync_network_policies(client: &ClusterApi, project: &VerrazzanoProject) -> Result<()> {
    let mut desired = HashSet::new();
    for template in &project.spec.template.network_policies {
        let namespace = template.metadata.namespace.clone().unwrap_or_default();
        let name = template.metadata.name.clone().unwrap_or_default();
        desired.insert((namespace.clone(), name.clone()));

        let mut policy = NetworkPolicy::default();
        policy.metadata.name = Some(name);
        policy.metadata.namespace = Some(namespace);
        let labels = template.metadata.labels.clone();
        let annotations = template.metadata.annotations.clone();
        let spec = template.spec.clone();
        client
            .create_or_update(policy, |p| {
                p.metadata.labels = (!labels.is_empty()).then_some(labels);
                p.metadata.annotations = (!annotations.is_empty()).then_some(annotations);
                p.spec = Some(spec);
            })
            .await?;
    }
    delete_network_policies(client, project, Some(&desired)).await
}

/// Deletes the network policies of the project namespaces that are not in `keep`
///
/// # Errors
/// Fails when the policies of a project namespace cannot be listed
pub async fn delete_network_policies(
    client: &ClusterApi,
    project: &VerrazzanoProject,
    keep: Option<&HashSet<(String, String)>>,
) -> Result<()> {
    for namespace in project.spec.template.namespace_names() {
        let policies = client.list::<NetworkPolicy>(Some(&namespace), None).await?;
        for policy in policies {
            let key = (policy.namespace().unwrap_or_default(), policy.name_any());
            if keep.is_some_and(|k| k.contains(&key)) {
                continue;
            }
            if let Err(e) = client
                .delete::<NetworkPolicy>(Some(&key.0), &key.1)
                .await
            {
                error!(
                    policy = %key.1,
                    namespace = %key.0,
                    error = %e,
                    "failed to delete network policy during project cleanup"
                );
            }
        }
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use k8s_openapi::api::networking::v1::NetworkPolicySpec;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;
    use k8s_openapi::chrono::Utc;
    use verrazzano_crd::v1_alpha1::{
        EmbeddedObjectMeta, NetworkPolicyTemplate, Placement, ProjectTemplate, SecuritySpec, StateType,
        VerrazzanoManagedClusterSpec, VerrazzanoProjectSpec,
    };

    use super::*;
    use crate::client::fake::{Failure, Verb};
    use crate::constants::MC_REGISTRATION_SECRET;
    use crate::test_support::{fake_cluster, meta, registration_secret};

    fn namespace_template(name: &str) -> NamespaceTemplate {
        NamespaceTemplate {
            metadata: EmbeddedObjectMeta {
                name: Some(name.into()),
                labels: [("label1".to_string(), "test1".to_string())].into(),
                ..EmbeddedObjectMeta::default()
            },
            spec: None,
        }
    }

    fn project(name: &str, namespaces: &[&str], clusters: &[&str]) -> VerrazzanoProject {
        let mut vp = VerrazzanoProject::new(
            name,
            VerrazzanoProjectSpec {
                template: ProjectTemplate {
                    namespaces: namespaces.iter().map(|n| namespace_template(n)).collect(),
                    ..ProjectTemplate::default()
                },
                placement: Placement::new(clusters.iter().copied()),
            },
        );
        vp.metadata.namespace = Some(VERRAZZANO_MULTICLUSTER_NAMESPACE.into());
        vp
    }

    fn seed(fake: &crate::client::fake::FakeClusterClient) {
        fake.insert(&registration_secret(MC_REGISTRATION_SECRET, "cluster1"));
        let mut system = Namespace {
            metadata: meta(None, VERRAZZANO_SYSTEM_NAMESPACE),
            ..Namespace::default()
        };
        system
            .labels_mut()
            .insert(LABEL_ISTIO_INJECTION.into(), "disabled".into());
        fake.insert(&system);
    }

    fn vmc(name: &str) -> VerrazzanoManagedCluster {
        let mut vmc = VerrazzanoManagedCluster::new(name, VerrazzanoManagedClusterSpec::default());
        vmc.metadata.namespace = Some(VERRAZZANO_MULTICLUSTER_NAMESPACE.into());
        vmc
    }

    fn context(client: ClusterApi) -> ReconcileContext {
        ReconcileContext {
            client,
            agent_channel: None,
        }
    }

    #[tokio::test]
    async fn creates_namespaces_and_role_bindings() {
        let (fake, api) = fake_cluster();
        seed(&fake);
        fake.insert(&project("proj1", &["ns1"], &["cluster1", "local"]));
        let vp: VerrazzanoProject = fake.fetch(Some(VERRAZZANO_MULTICLUSTER_NAMESPACE), "proj1").unwrap();

        let action = reconcile_project(&vp, &context(api)).await.unwrap();
        assert_eq!(action, Action::await_change());

        let ns: Namespace = fake.fetch(None, "ns1").unwrap();
        let labels = ns.metadata.labels.unwrap();
        assert_eq!(labels[LABEL_VERRAZZANO_MANAGED], "true");
        assert_eq!(labels[LABEL_ISTIO_INJECTION], "disabled");
        assert_eq!(labels["label1"], "test1");

        let admin: RoleBinding = fake.fetch(Some("ns1"), PROJECT_ADMIN_ROLE).unwrap();
        assert_eq!(admin.role_ref.name, PROJECT_ADMIN_ROLE);
        assert_eq!(admin.subjects.unwrap()[0].name, "verrazzano-project-proj1-admins");
        let view: RoleBinding = fake.fetch(Some("ns1"), PROJECT_MONITOR_K8S_ROLE).unwrap();
        assert_eq!(view.subjects.unwrap()[0].name, "verrazzano-project-proj1-monitors");

        let cluster: RoleBinding = fake.fetch(Some("ns1"), "verrazzano-cluster-cluster1").unwrap();
        assert_eq!(cluster.role_ref.name, MANAGED_CLUSTER_ROLE);
        let subject = &cluster.subjects.unwrap()[0];
        assert_eq!(subject.kind, "ServiceAccount");
        assert_eq!(subject.namespace.as_deref(), Some(VERRAZZANO_MULTICLUSTER_NAMESPACE));
        assert!(fake.fetch::<RoleBinding>(Some("ns1"), "verrazzano-cluster-local").is_none());

        let stored: VerrazzanoProject = fake.fetch(Some(VERRAZZANO_MULTICLUSTER_NAMESPACE), "proj1").unwrap();
        assert_eq!(stored.metadata.finalizers.unwrap(), vec![PROJECT_FINALIZER]);
        let status = stored.status.unwrap();
        assert_eq!(status.conditions[0].message.as_deref(), Some("VerrazzanoProject created"));
        // the admin cluster has not reported yet
        assert_eq!(status.state, StateType::Pending);
    }

    #[tokio::test]
    async fn explicit_subjects_replace_defaults() {
        let (fake, api) = fake_cluster();
        seed(&fake);
        let mut vp = project("proj1", &["ns1"], &["cluster1"]);
        vp.spec.template.security = SecuritySpec {
            project_admin_subjects: vec![Subject {
                kind: "User".into(),
                name: "alice".into(),
                ..Subject::default()
            }],
            ..SecuritySpec::default()
        };
        fake.insert(&vp);
        let vp: VerrazzanoProject = fake.fetch(Some(VERRAZZANO_MULTICLUSTER_NAMESPACE), "proj1").unwrap();

        reconcile_project(&vp, &context(api)).await.unwrap();

        let admin: RoleBinding = fake.fetch(Some("ns1"), PROJECT_ADMIN_K8S_ROLE).unwrap();
        assert_eq!(admin.subjects.unwrap()[0].name, "alice");
    }

    #[tokio::test]
    async fn projects_outside_multicluster_namespace_do_not_create_namespaces() {
        let (fake, api) = fake_cluster();
        seed(&fake);
        let mut vp = project("proj1", &["ns1"], &["cluster1"]);
        vp.metadata.namespace = Some("other".into());
        fake.insert(&vp);
        let vp: VerrazzanoProject = fake.fetch(Some("other"), "proj1").unwrap();

        reconcile_project(&vp, &context(api)).await.unwrap();
        assert!(fake.fetch::<Namespace>(None, "ns1").is_none());
    }

    #[tokio::test]
    async fn network_policies_synced_and_extras_removed() {
        let (fake, api) = fake_cluster();
        seed(&fake);
        let mut vp = project("proj1", &["ns1"], &["cluster1"]);
        vp.spec.template.network_policies = vec![NetworkPolicyTemplate {
            metadata: EmbeddedObjectMeta {
                name: Some("allow-all".into()),
                namespace: Some("ns1".into()),
                ..EmbeddedObjectMeta::default()
            },
            spec: NetworkPolicySpec::default(),
        }];
        fake.insert(&vp);
        fake.insert(&NetworkPolicy {
            metadata: meta(Some("ns1"), "stale"),
            ..NetworkPolicy::default()
        });
        let vp: VerrazzanoProject = fake.fetch(Some(VERRAZZANO_MULTICLUSTER_NAMESPACE), "proj1").unwrap();

        reconcile_project(&vp, &context(api)).await.unwrap();

        assert!(fake.fetch::<NetworkPolicy>(Some("ns1"), "allow-all").is_some());
        assert!(fake.fetch::<NetworkPolicy>(Some("ns1"), "stale").is_none());
    }

    #[tokio::test]
    async fn sync_failure_is_recorded_and_requeued() {
        let (fake, api) = fake_cluster();
        seed(&fake);
        fake.insert(&project("proj1", &["ns1"], &["cluster1"]));
        fake.fail(Verb::Create, "Namespace", Failure::Internal, 1);
        let vp: VerrazzanoProject = fake.fetch(Some(VERRAZZANO_MULTICLUSTER_NAMESPACE), "proj1").unwrap();

        let action = reconcile_project(&vp, &context(api)).await.unwrap();
        assert_ne!(action, Action::await_change());

        let stored: VerrazzanoProject = fake.fetch(Some(VERRAZZANO_MULTICLUSTER_NAMESPACE), "proj1").unwrap();
        let message = stored.status.unwrap().conditions[0].message.clone().unwrap();
        assert!(message.starts_with("Failed to create or update namespace ns1"));
    }

    #[tokio::test]
    async fn deletion_cleans_up_bindings_policies_and_finalizer() {
        let (fake, api) = fake_cluster();
        seed(&fake);
        fake.insert(&vmc("cluster1"));
        let mut vp = project("proj1", &["ns1"], &["cluster1"]);
        vp.metadata.finalizers = Some(vec![PROJECT_FINALIZER.into()]);
        vp.metadata.deletion_timestamp = Some(Time(Utc::now()));
        fake.insert(&vp);
        fake.insert(&managed_cluster_role_binding("ns1", "cluster1"));
        fake.insert(&NetworkPolicy {
            metadata: meta(Some("ns1"), "policy"),
            ..NetworkPolicy::default()
        });
        let vp: VerrazzanoProject = fake.fetch(Some(VERRAZZANO_MULTICLUSTER_NAMESPACE), "proj1").unwrap();

        reconcile_project(&vp, &context(api)).await.unwrap();

        assert!(fake.fetch::<RoleBinding>(Some("ns1"), "verrazzano-cluster-cluster1").is_none());
        assert!(fake.fetch::<NetworkPolicy>(Some("ns1"), "policy").is_none());
        let stored: VerrazzanoProject = fake.fetch(Some(VERRAZZANO_MULTICLUSTER_NAMESPACE), "proj1").unwrap();
        assert!(stored.metadata.finalizers.unwrap_or_default().is_empty());
    }

    #[tokio::test]
    async fn bindings_kept_for_clusters_still_placed() {
        let (fake, api) = fake_cluster();
        fake.insert(&vmc("cluster1"));
        fake.insert(&vmc("cluster2"));
        fake.insert(&project("proj1", &["ns1"], &["cluster1"]));
        fake.insert(&managed_cluster_role_binding("ns1", "cluster1"));
        fake.insert(&managed_cluster_role_binding("ns1", "cluster2"));

        delete_role_bindings(&api, None).await.unwrap();

        assert!(fake.fetch::<RoleBinding>(Some("ns1"), "verrazzano-cluster-cluster1").is_some());
        assert!(fake.fetch::<RoleBinding>(Some("ns1"), "verrazzano-cluster-cluster2").is_none());
    }
}
