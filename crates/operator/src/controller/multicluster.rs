// Copyright 2026 Verrazzano Maintainers
// SPDX-License-Identifier: Apache-2.0

//! Reconciliation of the multi-cluster wrappers into their underlying resources

use std::collections::BTreeMap;

use kube::api::{ApiResource, DynamicObject, GroupVersionKind};
use kube::runtime::controller::Action;
use kube::{Resource, ResourceExt};
use serde_json::{Map, Value};
use tracing::{debug, info, instrument, warn};
use verrazzano_crd::v1_alpha1::EmbeddedObjectMeta;
use verrazzano_crd::{
    MultiClusterApplicationConfiguration, MultiClusterComponent, MultiClusterConfigMap,
    MultiClusterResource, MultiClusterSecret,
};

use super::{ReconcileContext, add_finalizer, remove_finalizer};
use crate::client::{ClusterApi, OperationResult, api_resource};
use crate::clusters::{
    self, condition_from_result, is_placed_in_this_cluster, random_requeue_delay,
    set_effective_state_if_changed,
};
use crate::constants::{KUBE_SYSTEM_NAMESPACE, LABEL_VERRAZZANO_MANAGED};
use crate::Result;

/// OAM `Component` resource
#[must_use]
pub fn oam_component_resource() -> ApiResource {
    ApiResource::from_gvk(&GroupVersionKind::gvk("core.oam.dev", "v1alpha2", "Component"))
}

/// OAM `ApplicationConfiguration` resource
#[must_use]
pub fn oam_application_configuration_resource() -> ApiResource {
    ApiResource::from_gvk(&GroupVersionKind::gvk(
        "core.oam.dev",
        "v1alpha2",
        "ApplicationConfiguration",
    ))
}

/// A multi-cluster wrapper materialised as a plain resource on each placed cluster
pub trait Materialized: MultiClusterResource {
    /// Finalizer guarding the deletion of the underlying resource
    const FINALIZER: &'static str;

    /// Resource created from the template
    fn underlying_resource() -> ApiResource;

    /// Metadata of the template
    fn template_metadata(&self) -> &EmbeddedObjectMeta;

    /// Top level fields written on the underlying resource, `None` removes the field
    ///
    /// # Errors
    /// Fails when the template cannot be represented as JSON
    fn payload(&self) -> Result<Vec<(&'static str, Option<Value>)>>;
}

fn non_empty<T: serde::Serialize>(value: &BTreeMap<String, T>) -> Result<Option<Value>> {
    if value.is_empty() {
        return Ok(None);
    }
    Ok(Some(serde_json::to_value(value)?))
}

impl Materialized for MultiClusterSecret {
    const FINALIZER: &'static str = "multiclustersecret.verrazzano.io";

    fn underlying_resource() -> ApiResource {
        api_resource::<k8s_openapi::api::core::v1::Secret>()
    }

    fn template_metadata(&self) -> &EmbeddedObjectMeta {
        &self.spec.template.metadata
    }

    fn payload(&self) -> Result<Vec<(&'static str, Option<Value>)>> {
        let template = &self.spec.template;
        Ok(vec![
            ("type", template.type_.clone().map(Value::String)),
            ("data", non_empty(&template.data)?),
            ("stringData", non_empty(&template.string_data)?),
        ])
    }
}

impl Materialized for MultiClusterConfigMap {
    const FINALIZER: &'static str = "multiclusterconfigmap.verrazzano.io";

    fn underlying_resource() -> ApiResource {
        api_resource::<k8s_openapi::api::core::v1::ConfigMap>()
    }

    fn template_metadata(&self) -> &EmbeddedObjectMeta {
        &self.spec.template.metadata
    }

    fn payload(&self) -> Result<Vec<(&'static str, Option<Value>)>> {
        let template = &self.spec.template;
        Ok(vec![
            ("data", non_empty(&template.data)?),
            ("binaryData", non_empty(&template.binary_data)?),
        ])
    }
}

impl Materialized for MultiClusterComponent {
    const FINALIZER: &'static str = "multiclustercomponent.verrazzano.io";

    fn underlying_resource() -> ApiResource {
        oam_component_resource()
    }

    fn template_metadata(&self) -> &EmbeddedObjectMeta {
        &self.spec.template.metadata
    }

    fn payload(&self) -> Result<Vec<(&'static str, Option<Value>)>> {
        Ok(vec![("spec", Some(self.spec.template.spec.clone()))])
    }
}

impl Materialized for MultiClusterApplicationConfiguration {
    const FINALIZER: &'static str = "multiclusterapplicationconfiguration.verrazzano.io";

    fn underlying_resource() -> ApiResource {
        oam_application_configuration_resource()
    }

    fn template_metadata(&self) -> &EmbeddedObjectMeta {
        &self.spec.template.metadata
    }

    fn payload(&self) -> Result<Vec<(&'static str, Option<Value>)>> {
        Ok(vec![("spec", Some(self.spec.template.spec.clone()))])
    }
}

/// Reconciles one multi-cluster wrapper against this cluster.
///
/// Failures to apply the underlying resource are recorded in the status and requeued
/// with a jittered delay. Only failures to update the wrapper itself are returned.
///
/// # Errors
/// Fails when the finalizer or the status of the wrapper cannot be written
#[instrument(skip(resource, ctx), fields(kind = %K::KIND, name = %resource.name_any()))]
pub async fn reconcile_resource<K: Materialized>(
    resource: &K,
    ctx: &ReconcileContext,
) -> Result<Action> {
    let namespace = resource.namespace_or_default();
    if namespace == KUBE_SYSTEM_NAMESPACE {
        info!("multi-cluster resources in kube-system are not reconciled, ignoring");
        return Ok(Action::await_change());
    }

    if resource.meta().deletion_timestamp.is_some() {
        if resource.finalizers().iter().any(|f| f == K::FINALIZER) {
            delete_associated_resource(&ctx.client, resource).await?;
        }
        return Ok(Action::await_change());
    }

    let mut current = resource.clone();
    let placement = current.placement().clone();
    let old_state = set_effective_state_if_changed(&placement, current.mc_status_mut());

    if !is_placed_in_this_cluster(&ctx.client, &placement).await {
        let state = current.mc_status_mut().state;
        if old_state != state {
            let status = current.mc_status_mut().clone();
            current = ctx.client.patch_status(&current, &status).await?;
        }
        debug!("resource is not placed in this cluster, removing the underlying resource");
        delete_associated_resource(&ctx.client, &current).await?;
        return Ok(Action::await_change());
    }

    let current = add_finalizer(&ctx.client, current, K::FINALIZER).await?;

    let result = create_or_update_underlying(&ctx.client, &current).await;
    if let Err(e) = &result {
        warn!(error = %e, "failed to apply the underlying resource");
    }

    let condition = condition_from_result(&result, K::KIND.kind());
    let cluster_name = clusters::cluster_name(&ctx.client).await;
    clusters::update_status(
        &ctx.client,
        &current,
        condition,
        &cluster_name,
        ctx.agent_channel.as_ref(),
    )
    .await?;

    match result {
        Ok(op) => {
            debug!(result = %op, "underlying resource reconciled");
            Ok(Action::await_change())
        }
        Err(_) => Ok(Action::requeue(random_requeue_delay())),
    }
}

/// Writes the template of `resource` into its underlying resource
///
/// # Errors
/// Fails on API errors
pub async fn create_or_update_underlying<K: Materialized>(
    client: &ClusterApi,
    resource: &K,
) -> Result<OperationResult> {
    let ar = K::underlying_resource();
    let template = resource.template_metadata();
    let payload = resource.payload()?;

    let mut labels = template.labels.clone();
    labels.insert(LABEL_VERRAZZANO_MANAGED.into(), "true".into());
    let annotations = (!template.annotations.is_empty()).then(|| template.annotations.clone());

    let mut desired = DynamicObject::new(&resource.name_any(), &ar).within(&resource.namespace_or_default());
    desired.data = Value::Object(Map::new());

    client
        .create_or_update_dynamic(&ar, desired, |obj| {
            obj.metadata.labels = Some(labels);
            obj.metadata.annotations = annotations;
            if !obj.data.is_object() {
                obj.data = Value::Object(Map::new());
            }
            if let Value::Object(fields) = &mut obj.data {
                for (key, value) in payload {
                    match value {
                        Some(v) => {
                            fields.insert(key.to_string(), v);
                        }
                        None => {
                            fields.remove(key);
                        }
                    }
                }
            }
        })
        .await
}

/// Deletes the underlying resource of `resource`, then drops its finalizer
///
/// # Errors
/// Fails on API errors other than not found
pub async fn delete_associated_resource<K: Materialized>(client: &ClusterApi, resource: &K) -> Result<()> {
    let ar = K::underlying_resource();
    let namespace = resource.namespace_or_default();
    if client
        .delete_dynamic(&ar, Some(&namespace), &resource.name_any())
        .await?
    {
        info!(kind = %ar.kind, name = %resource.name_any(), "deleted underlying resource");
    }
    remove_finalizer(client, resource.clone(), K::FINALIZER).await?;
    Ok(())
}
