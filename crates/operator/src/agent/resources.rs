// Copyright 2026 Verrazzano Maintainers
// SPDX-License-Identifier: Apache-2.0

//! Mirroring of projects and multi-cluster resources from the admin cluster.
//!
//! The admin cluster is the source of truth: objects placed on this cluster are created or
//! updated locally, local objects it no longer places here are deleted.

use std::collections::{BTreeMap, BTreeSet, HashSet};

use k8s_openapi::api::core::v1::Secret;
use kube::api::{DynamicObject, ObjectMeta};
use kube::{Resource, ResourceExt};
use serde_json::json;
use tracing::{debug, error, info};
use verrazzano_crd::{
    MultiClusterApplicationConfiguration, MultiClusterComponent, MultiClusterResource,
    VerrazzanoProject,
};

use super::Syncer;
use crate::client::{ClusterApi, OperationResult};
use crate::clusters;
use crate::constants::{
    LABEL_MANAGED_CLUSTER, LABEL_MC_APP_CONFIGS, LABEL_VERRAZZANO_MANAGED,
    VERRAZZANO_MULTICLUSTER_NAMESPACE,
};
use crate::controller::multicluster::oam_component_resource;
use crate::Result;

/// Appends `value` to a comma separated list unless already present
#[must_use]
pub fn append_to_comma_list(list: &str, value: &str) -> String {
    if list.is_empty() {
        return value.to_string();
    }
    if list.split(',').any(|v| v == value) {
        return list.to_string();
    }
    format!("{list},{value}")
}

fn split_comma_list(list: &str) -> BTreeSet<String> {
    list.split(',')
        .filter(|v| !v.is_empty())
        .map(ToString::to_string)
        .collect()
}

fn with_managed_label(labels: &BTreeMap<String, String>) -> BTreeMap<String, String> {
    let mut labels = labels.clone();
    labels.insert(LABEL_VERRAZZANO_MANAGED.to_string(), "true".to_string());
    labels
}

/// Lists `K` on the admin cluster, an unknown kind or missing permission reads as empty
async fn list_admin<K: MultiClusterResource>(admin: &ClusterApi, namespace: &str) -> Result<Vec<K>> {
    match admin.list::<K>(Some(namespace), None).await {
        Ok(items) => Ok(items),
        Err(e) if e.is_not_found() || e.is_forbidden() => {
            debug!(kind = %K::KIND, namespace, error = %e, "admin list unavailable, treating as empty");
            Ok(Vec::new())
        }
        Err(e) => Err(e),
    }
}

async fn mirror<K: MultiClusterResource>(local: &ClusterApi, source: &K) -> Result<OperationResult> {
    let mut obj = K::build(&source.name_any(), source.mc_spec().clone());
    obj.meta_mut().namespace = source.namespace();
    let spec = source.mc_spec().clone();
    let labels = with_managed_label(source.labels());
    local
        .create_or_update(obj, move |o: &mut K| {
            *o.mc_spec_mut() = spec;
            *o.labels_mut() = labels;
        })
        .await
}

impl Syncer {
    fn placed_here<K: MultiClusterResource>(&self, obj: &K) -> bool {
        obj.placement().includes(&self.managed_cluster_name)
    }

    async fn mirror_placed<K: MultiClusterResource>(&self, items: Vec<K>) -> Vec<K> {
        let placed: Vec<K> = items.into_iter().filter(|o| self.placed_here(o)).collect();
        for obj in &placed {
            match mirror(&self.local, obj).await {
                Ok(OperationResult::Unchanged) => {}
                Ok(result) => info!(
                    kind = %K::KIND,
                    namespace = obj.namespace().as_deref(),
                    name = %obj.name_any(),
                    %result,
                    "mirrored from admin cluster"
                ),
                Err(e) => error!(
                    kind = %K::KIND,
                    namespace = obj.namespace().as_deref(),
                    name = %obj.name_any(),
                    error = %e,
                    "failed to mirror from admin cluster"
                ),
            }
        }
        placed
    }

    async fn delete_orphans<K: MultiClusterResource>(&self, namespace: &str, placed: &[K]) {
        let local = match self.local.list::<K>(Some(namespace), None).await {
            Ok(items) => items,
            Err(e) => {
                error!(kind = %K::KIND, namespace, error = %e, "failed to list local objects");
                return;
            }
        };
        let keep: HashSet<String> = placed.iter().map(ResourceExt::name_any).collect();
        for obj in local.iter().filter(|o| !keep.contains(&o.name_any())) {
            let name = obj.name_any();
            match self.local.delete::<K>(Some(namespace), &name).await {
                Ok(_) => info!(kind = %K::KIND, namespace, name = %name, "deleted orphaned object"),
                Err(e) => error!(kind = %K::KIND, namespace, name = %name, error = %e, "failed to delete orphaned object"),
            }
        }
    }

    /// Mirrors the `K` objects of `namespace` placed here, removes local ones that are not.
    /// Returns the admin objects placed on this cluster.
    ///
    /// # Errors
    /// Fails when the admin cluster cannot be listed
    pub async fn sync_mc_objects<K: MultiClusterResource>(
        &self,
        admin: &ClusterApi,
        namespace: &str,
    ) -> Result<Vec<K>> {
        let items = list_admin::<K>(admin, namespace).await?;
        let placed = self.mirror_placed(items).await;
        self.delete_orphans(namespace, &placed).await;
        Ok(placed)
    }

    /// Mirrors the projects placed here and records their namespaces
    ///
    /// # Errors
    /// Fails when the admin cluster cannot be listed
    pub async fn sync_verrazzano_projects(&mut self, admin: &ClusterApi) -> Result<()> {
        let placed = self
            .sync_mc_objects::<VerrazzanoProject>(admin, VERRAZZANO_MULTICLUSTER_NAMESPACE)
            .await?;
        let mut namespaces = Vec::new();
        for name in placed.iter().flat_map(|p| p.spec.template.namespace_names()) {
            if !namespaces.contains(&name) {
                namespaces.push(name);
            }
        }
        if namespaces != self.project_namespaces {
            debug!(?namespaces, "project namespaces changed");
        }
        self.project_namespaces = namespaces;
        Ok(())
    }

    /// Mirrors the app configs of `namespace` placed here along with their OAM components
    ///
    /// # Errors
    /// Fails when the admin cluster cannot be listed
    pub async fn sync_mc_app_configs(&self, admin: &ClusterApi, namespace: &str) -> Result<()> {
        let items = list_admin::<MultiClusterApplicationConfiguration>(admin, namespace).await?;
        let placed: Vec<_> = items.into_iter().filter(|o| self.placed_here(o)).collect();
        for app in &placed {
            if let Err(e) = self.sync_component_list(admin, app).await {
                error!(
                    namespace,
                    app_config = %app.name_any(),
                    error = %e,
                    "failed to sync OAM components"
                );
            }
        }
        let placed = self.mirror_placed(placed).await;
        self.delete_orphans(namespace, &placed).await;

        if let Err(e) = self.delete_orphaned_components(namespace).await {
            error!(namespace, error = %e, "failed to delete orphaned OAM components");
        }
        Ok(())
    }

    /// Copies the OAM components an app config references from the admin cluster
    ///
    /// # Errors
    /// Fails on the first component that exists neither on the admin cluster nor as a
    /// local `MultiClusterComponent`
    pub async fn sync_component_list(
        &self,
        admin: &ClusterApi,
        app: &MultiClusterApplicationConfiguration,
    ) -> Result<()> {
        let ar = oam_component_resource();
        let namespace = app.namespace_or_default();
        let app_name = app.name_any();

        for name in app.spec.template.component_names() {
            let Some(source) = admin.get_dynamic(&ar, Some(&namespace), &name).await? else {
                if self
                    .local
                    .get::<MultiClusterComponent>(Some(&namespace), &name)
                    .await?
                    .is_some()
                {
                    continue;
                }
                return Err(clusters::not_found("components.core.oam.dev", &name));
            };

            let cluster = self.managed_cluster_name.clone();
            let app_name = app_name.clone();
            let target = DynamicObject::new(&name, &ar).within(&namespace);
            let result = self
                .local
                .create_or_update_dynamic(&ar, target, move |c| {
                    let labels = c.metadata.labels.get_or_insert_with(|| {
                        source.metadata.labels.clone().unwrap_or_default()
                    });
                    let apps = labels.get(LABEL_MC_APP_CONFIGS).cloned().unwrap_or_default();
                    labels.insert(
                        LABEL_MC_APP_CONFIGS.to_string(),
                        append_to_comma_list(&apps, &app_name),
                    );
                    labels.insert(LABEL_MANAGED_CLUSTER.to_string(), cluster);
                    labels.insert(LABEL_VERRAZZANO_MANAGED.to_string(), "true".to_string());
                    c.metadata.annotations = source.metadata.annotations.clone();
                    if !c.data.is_object() {
                        c.data = json!({});
                    }
                    c.data["spec"] = source.data.get("spec").cloned().unwrap_or_else(|| json!({}));
                })
                .await?;
            if result != OperationResult::Unchanged {
                info!(namespace = %namespace, component = %name, %result, "synced OAM component");
            }
        }
        Ok(())
    }

    /// Deletes components copied for this cluster that no local app config references
    ///
    /// # Errors
    /// Fails when the local cluster cannot be listed
    pub async fn delete_orphaned_components(&self, namespace: &str) -> Result<()> {
        let ar = oam_component_resource();
        let selector = format!("{LABEL_MANAGED_CLUSTER}={}", self.managed_cluster_name);
        let components = self
            .local
            .list_dynamic(&ar, Some(namespace), Some(&selector))
            .await?;
        let apps = self
            .local
            .list::<MultiClusterApplicationConfiguration>(Some(namespace), None)
            .await?;

        for component in components {
            let name = component.name_any();
            if self
                .local
                .get::<MultiClusterComponent>(Some(namespace), &name)
                .await?
                .is_some()
            {
                continue;
            }

            let referencing: Vec<String> = apps
                .iter()
                .filter(|a| a.spec.template.component_names().contains(&name))
                .map(ResourceExt::name_any)
                .collect();
            if referencing.is_empty() {
                match self.local.delete_dynamic(&ar, Some(namespace), &name).await {
                    Ok(_) => info!(namespace, component = %name, "deleted orphaned OAM component"),
                    Err(e) => error!(namespace, component = %name, error = %e, "failed to delete OAM component"),
                }
                continue;
            }

            let labelled = split_comma_list(
                component
                    .labels()
                    .get(LABEL_MC_APP_CONFIGS)
                    .map(String::as_str)
                    .unwrap_or_default(),
            );
            let wanted: BTreeSet<String> = referencing.iter().cloned().collect();
            if labelled == wanted {
                continue;
            }
            let joined = referencing.join(",");
            let target = DynamicObject::new(&name, &ar).within(namespace);
            self.local
                .create_or_update_dynamic(&ar, target, move |c| {
                    c.labels_mut().insert(LABEL_MC_APP_CONFIGS.to_string(), joined);
                })
                .await?;
        }
        Ok(())
    }

    /// Copies the Secrets that placed app configs list in `spec.secrets`
    ///
    /// # Errors
    /// Fails when the admin cluster cannot be listed
    pub async fn sync_secret_objects(&self, admin: &ClusterApi, namespace: &str) -> Result<()> {
        let apps = list_admin::<MultiClusterApplicationConfiguration>(admin, namespace).await?;
        let mut shared: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for app in apps.iter().filter(|a| self.placed_here(*a)) {
            for secret in &app.spec.secrets {
                let users = shared.entry(secret.clone()).or_default();
                if !users.contains(&app.name_any()) {
                    users.push(app.name_any());
                }
            }
        }

        for (name, users) in &shared {
            if let Err(e) = self.mirror_secret(admin, namespace, name, users).await {
                error!(namespace, secret = %name, error = %e, "failed to sync secret");
            }
        }

        let selector = format!("{LABEL_MANAGED_CLUSTER}={}", self.managed_cluster_name);
        let local = match self.local.list::<Secret>(Some(namespace), Some(&selector)).await {
            Ok(items) => items,
            Err(e) => {
                error!(namespace, error = %e, "failed to list local secrets");
                return Ok(());
            }
        };
        for secret in local.iter().filter(|s| !shared.contains_key(&s.name_any())) {
            let name = secret.name_any();
            match self.local.delete::<Secret>(Some(namespace), &name).await {
                Ok(_) => info!(namespace, secret = %name, "deleted orphaned secret"),
                Err(e) => error!(namespace, secret = %name, error = %e, "failed to delete orphaned secret"),
            }
        }
        Ok(())
    }

    async fn mirror_secret(
        &self,
        admin: &ClusterApi,
        namespace: &str,
        name: &str,
        users: &[String],
    ) -> Result<()> {
        let source = admin
            .get::<Secret>(Some(namespace), name)
            .await?
            .ok_or_else(|| clusters::not_found("secrets", name))?;

        let mut labels = source.labels().clone();
        labels.insert(LABEL_MC_APP_CONFIGS.to_string(), users.join(","));
        labels.insert(LABEL_MANAGED_CLUSTER.to_string(), self.managed_cluster_name.clone());
        labels.insert(LABEL_VERRAZZANO_MANAGED.to_string(), "true".to_string());

        let target = Secret {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                namespace: Some(namespace.to_string()),
                ..ObjectMeta::default()
            },
            ..Secret::default()
        };
        let result = self
            .local
            .create_or_update(target, move |s: &mut Secret| {
                s.data = source.data;
                s.type_ = source.type_;
                *s.labels_mut() = labels;
            })
            .await?;
        if result != OperationResult::Unchanged {
            info!(namespace, secret = name, %result, "synced secret");
        }
        Ok(())
    }
}
