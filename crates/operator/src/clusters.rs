// Copyright 2026 Verrazzano Maintainers
// SPDX-License-Identifier: Apache-2.0

//! Multi-cluster status bookkeeping shared by the local controllers and the agent

use std::time::Duration;

use k8s_openapi::ByteString;
use k8s_openapi::api::core::v1::Secret;
use k8s_openapi::chrono::{SecondsFormat, Utc};
use kube::ResourceExt;
use rand::Rng;
use tokio::sync::mpsc;
use tracing::{debug, warn};
use verrazzano_crd::v1_alpha1::{
    ClusterLevelStatus, Condition, ConditionType, MultiClusterResourceStatus, Placement, StateType,
};
use verrazzano_crd::{MultiClusterKind, MultiClusterResource};

use crate::client::{ClusterApi, OperationResult};
use crate::constants::{
    CLUSTER_NAME_DATA, MC_LOCAL_REGISTRATION_SECRET, MC_REGISTRATION_SECRET,
    VERRAZZANO_SYSTEM_NAMESPACE,
};
use crate::{Error, Result};

/// Identity of a multi-cluster object, resolved again on the admin cluster
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MultiClusterRef {
    /// Kind of the object
    pub kind: MultiClusterKind,
    /// Namespace of the object
    pub namespace: String,
    /// Name of the object
    pub name: String,
}

/// Status change of a local multi-cluster object, forwarded to the admin cluster by the agent
#[derive(Clone, Debug)]
pub struct StatusUpdateMessage {
    /// Condition reported by this cluster
    pub new_condition: Condition,
    /// State of the object on this cluster
    pub new_cluster_status: ClusterLevelStatus,
    /// Object the update belongs to
    pub resource: MultiClusterRef,
}

/// Current time as RFC3339 with second precision
#[must_use]
pub fn now_rfc3339() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// True when `new_cluster_status` or `new_condition` are not yet part of `status`
#[must_use]
pub fn status_needs_update(
    status: &MultiClusterResourceStatus,
    new_condition: &Condition,
    new_cluster_status: &ClusterLevelStatus,
) -> bool {
    let cluster_found = status
        .clusters
        .iter()
        .any(|c| c.name == new_cluster_status.name && c.state == new_cluster_status.state);
    if !cluster_found {
        return true;
    }

    !status.conditions.iter().any(|c| {
        c.type_ == new_condition.type_
            && c.status == new_condition.status
            && c.message == new_condition.message
    })
}

/// Condition describing the outcome of applying the underlying resource
#[must_use]
pub fn condition_from_result(
    result: &Result<OperationResult>,
    message_prefix: &str,
) -> Condition {
    let (type_, message) = match result {
        Ok(op) => (ConditionType::DeployComplete, format!("{message_prefix} {op}")),
        Err(e) => (ConditionType::DeployFailed, e.to_string()),
    };
    Condition {
        type_,
        status: "True".into(),
        message: Some(message),
        last_transition_time: Some(now_rfc3339()),
    }
}

/// Per cluster state matching a condition
#[must_use]
pub fn cluster_level_status(condition: &Condition, cluster_name: &str) -> ClusterLevelStatus {
    let state = match condition.type_ {
        ConditionType::DeployComplete => StateType::Succeeded,
        ConditionType::DeployFailed => StateType::Failed,
        ConditionType::DeployPending => StateType::Pending,
    };
    ClusterLevelStatus {
        name: cluster_name.to_string(),
        state,
        message: condition.message.clone(),
        last_update_time: condition.last_transition_time.clone(),
    }
}

/// Overall state over the placed clusters
#[must_use]
pub fn compute_effective_state(
    status: &MultiClusterResourceStatus,
    placement: &Placement,
) -> StateType {
    let mut succeeded = 0;
    let mut pending = 0;
    let mut failed = 0;

    for cluster in &placement.clusters {
        for cluster_status in status.clusters.iter().filter(|s| s.name == cluster.name) {
            match cluster_status.state {
                StateType::Pending => pending += 1,
                StateType::Succeeded => succeeded += 1,
                StateType::Failed => failed += 1,
            }
        }
    }

    if failed > 0 {
        return StateType::Failed;
    }
    if pending > 0 {
        return StateType::Pending;
    }
    // placement on the admin cluster is implied, hence ">="
    if succeeded >= placement.clusters.len() {
        return StateType::Succeeded;
    }
    StateType::Pending
}

/// Adds the cluster status, or replaces the one with the same cluster name
pub fn set_cluster_level_status(
    status: &mut MultiClusterResourceStatus,
    new_cluster_status: ClusterLevelStatus,
) {
    match status
        .clusters
        .iter_mut()
        .rfind(|c| c.name == new_cluster_status.name)
    {
        Some(existing) => {
            *existing = new_cluster_status;
            existing.last_update_time = Some(now_rfc3339());
        }
        None => status.clusters.push(new_cluster_status),
    }
}

/// Adds the condition, or updates the first one of the same type
pub fn add_or_update_condition(status: &mut MultiClusterResourceStatus, condition: Condition) {
    for existing in &mut status.conditions {
        if existing.type_ == condition.type_
            && existing.status == condition.status
            && existing.message == condition.message
        {
            return;
        }
        if existing.type_ == condition.type_ {
            existing.message = condition.message;
            existing.status = condition.status;
            existing.last_transition_time = condition.last_transition_time;
            return;
        }
    }
    status.conditions.push(condition);
}

/// Recomputes the effective state, returns the state held before
pub fn set_effective_state_if_changed(
    placement: &Placement,
    status: &mut MultiClusterResourceStatus,
) -> StateType {
    let previous = status.state;
    status.state = compute_effective_state(status, placement);
    previous
}

/// Name of this cluster, empty when no registration secret can be read
pub async fn cluster_name(client: &ClusterApi) -> String {
    match cluster_secret(client).await {
        Ok(Some(secret)) => secret_value(&secret, CLUSTER_NAME_DATA).unwrap_or_default(),
        Ok(None) => String::new(),
        Err(e) => {
            debug!(error = %e, "unable to read the cluster registration secret");
            String::new()
        }
    }
}

/// True when `placement` targets this cluster
pub async fn is_placed_in_this_cluster(client: &ClusterApi, placement: &Placement) -> bool {
    let name = cluster_name(client).await;
    !name.is_empty() && placement.includes(&name)
}

// The registration secret is created when the cluster gets registered, the local one at install.
async fn cluster_secret(client: &ClusterApi) -> Result<Option<Secret>> {
    if let Some(secret) = client
        .get::<Secret>(Some(VERRAZZANO_SYSTEM_NAMESPACE), MC_REGISTRATION_SECRET)
        .await?
    {
        return Ok(Some(secret));
    }
    client
        .get::<Secret>(Some(VERRAZZANO_SYSTEM_NAMESPACE), MC_LOCAL_REGISTRATION_SECRET)
        .await
}

/// UTF-8 value of a secret key
#[must_use]
pub fn secret_value(secret: &Secret, key: &str) -> Option<String> {
    secret
        .data
        .as_ref()
        .and_then(|d| d.get(key))
        .map(|v| String::from_utf8_lossy(&v.0).into_owned())
}

/// Raw value of a secret key
#[must_use]
pub fn secret_bytes(secret: &Secret, key: &str) -> Option<ByteString> {
    secret.data.as_ref().and_then(|d| d.get(key)).cloned()
}

/// Jittered requeue delay between 2 and 8 seconds
#[must_use]
pub fn random_requeue_delay() -> Duration {
    random_requeue_delay_in_range(2, 8)
}

/// Jittered requeue delay in `[low, high)` seconds
#[must_use]
pub fn random_requeue_delay_in_range(low: u64, high: u64) -> Duration {
    if high <= low {
        return Duration::from_secs(low);
    }
    Duration::from_secs(rand::rng().random_range(low..high))
}

/// Records `new_condition` reported by `cluster_name` on `resource`.
///
/// When the status changes it is written through `client` and the change is queued on
/// `agent_channel` for the agent to forward to the admin cluster.
///
/// # Errors
/// Fails when the status cannot be written
pub async fn update_status<K: MultiClusterResource>(
    client: &ClusterApi,
    resource: &K,
    new_condition: Condition,
    cluster_name: &str,
    agent_channel: Option<&mpsc::Sender<StatusUpdateMessage>>,
) -> Result<()> {
    let new_cluster_status = cluster_level_status(&new_condition, cluster_name);
    let current = resource.mc_status().cloned().unwrap_or_default();
    if !status_needs_update(&current, &new_condition, &new_cluster_status) {
        return Ok(());
    }

    let mut updated = resource.clone();
    let placement = updated.placement().clone();
    let status = updated.mc_status_mut();
    add_or_update_condition(status, new_condition.clone());
    set_cluster_level_status(status, new_cluster_status.clone());
    status.state = compute_effective_state(status, &placement);
    let status = status.clone();
    client.patch_status(&updated, &status).await?;

    if let Some(tx) = agent_channel {
        let msg = StatusUpdateMessage {
            new_condition,
            new_cluster_status,
            resource: MultiClusterRef {
                kind: K::KIND,
                namespace: resource.namespace_or_default(),
                name: resource.name_any(),
            },
        };
        if let Err(e) = tx.try_send(msg) {
            warn!(
                kind = %K::KIND,
                name = %resource.name_any(),
                error = %e,
                "agent status channel unavailable, dropping status update"
            );
        }
    }
    Ok(())
}

/// Builds an error for a missing object, matching the API server wording
#[must_use]
pub fn not_found(plural: &str, name: &str) -> Error {
    Error::NotFound(format!("{plural} \"{name}\""))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use verrazzano_crd::MultiClusterSecret;
    use verrazzano_crd::v1_alpha1::MultiClusterSecretSpec;

    use super::*;
    use crate::test_support::{fake_cluster, registration_secret};

    fn cluster_status(name: &str, state: StateType) -> ClusterLevelStatus {
        ClusterLevelStatus {
            name: name.into(),
            state,
            message: None,
            last_update_time: None,
        }
    }

    fn condition(type_: ConditionType, message: &str) -> Condition {
        Condition {
            type_,
            status: "True".into(),
            message: Some(message.into()),
            last_transition_time: None,
        }
    }

    #[test]
    fn needs_update_unless_cluster_and_condition_present() {
        let mut status = MultiClusterResourceStatus::default();
        let cond = condition(ConditionType::DeployComplete, "created");
        let cluster = cluster_status("managed1", StateType::Succeeded);
        assert!(status_needs_update(&status, &cond, &cluster));

        status.clusters.push(cluster.clone());
        assert!(status_needs_update(&status, &cond, &cluster));

        status.conditions.push(cond.clone());
        assert!(!status_needs_update(&status, &cond, &cluster));

        let other = condition(ConditionType::DeployComplete, "updated");
        assert!(status_needs_update(&status, &other, &cluster));
    }

    #[test]
    fn condition_reflects_operation_outcome() {
        let ok = condition_from_result(&Ok(OperationResult::Created), "MultiClusterSecret");
        assert_eq!(ok.type_, ConditionType::DeployComplete);
        assert_eq!(ok.message.as_deref(), Some("MultiClusterSecret created"));
        assert_eq!(ok.status, "True");

        let failed = condition_from_result(&Err(Error::Message("boom".into())), "ignored");
        assert_eq!(failed.type_, ConditionType::DeployFailed);
        assert_eq!(failed.message.as_deref(), Some("boom"));
        assert_eq!(
            cluster_level_status(&failed, "managed1").state,
            StateType::Failed
        );
        assert_eq!(
            cluster_level_status(&condition(ConditionType::DeployPending, ""), "c").state,
            StateType::Pending
        );
    }

    #[test]
    fn effective_state_prefers_failed_then_pending() {
        let placement = Placement::new(["c1", "c2"]);
        let mut status = MultiClusterResourceStatus {
            clusters: vec![cluster_status("c1", StateType::Succeeded)],
            ..MultiClusterResourceStatus::default()
        };
        assert_eq!(compute_effective_state(&status, &placement), StateType::Pending);

        status.clusters.push(cluster_status("c2", StateType::Succeeded));
        assert_eq!(compute_effective_state(&status, &placement), StateType::Succeeded);

        // statuses of clusters outside the placement are ignored
        status.clusters.push(cluster_status("c3", StateType::Failed));
        assert_eq!(compute_effective_state(&status, &placement), StateType::Succeeded);

        status.clusters[1].state = StateType::Pending;
        assert_eq!(compute_effective_state(&status, &placement), StateType::Pending);

        status.clusters[0].state = StateType::Failed;
        assert_eq!(compute_effective_state(&status, &placement), StateType::Failed);
    }

    #[test]
    fn empty_placement_is_succeeded() {
        assert_eq!(
            compute_effective_state(&MultiClusterResourceStatus::default(), &Placement::default()),
            StateType::Succeeded
        );
    }

    #[test]
    fn cluster_level_status_replaced_by_name() {
        let mut status = MultiClusterResourceStatus::default();
        set_cluster_level_status(&mut status, cluster_status("c1", StateType::Pending));
        set_cluster_level_status(&mut status, cluster_status("c2", StateType::Failed));
        set_cluster_level_status(&mut status, cluster_status("c1", StateType::Succeeded));

        assert_eq!(status.clusters.len(), 2);
        assert_eq!(status.clusters[0].state, StateType::Succeeded);
        assert!(status.clusters[0].last_update_time.is_some());
    }

    #[test]
    fn conditions_updated_by_type() {
        let mut status = MultiClusterResourceStatus::default();
        add_or_update_condition(&mut status, condition(ConditionType::DeployComplete, "created"));
        add_or_update_condition(&mut status, condition(ConditionType::DeployComplete, "created"));
        assert_eq!(status.conditions.len(), 1);

        add_or_update_condition(&mut status, condition(ConditionType::DeployComplete, "updated"));
        assert_eq!(status.conditions.len(), 1);
        assert_eq!(status.conditions[0].message.as_deref(), Some("updated"));

        add_or_update_condition(&mut status, condition(ConditionType::DeployFailed, "boom"));
        assert_eq!(status.conditions.len(), 2);
    }

    #[test]
    fn effective_state_change_returns_previous() {
        let mut status = MultiClusterResourceStatus {
            clusters: vec![cluster_status("c1", StateType::Succeeded)],
            ..MultiClusterResourceStatus::default()
        };
        let previous = set_effective_state_if_changed(&Placement::new(["c1"]), &mut status);
        assert_eq!(previous, StateType::Pending);
        assert_eq!(status.state, StateType::Succeeded);
    }

    #[test]
    fn requeue_delay_stays_in_range() {
        for _ in 0..50 {
            let delay = random_requeue_delay();
            assert!(delay >= Duration::from_secs(2) && delay < Duration::from_secs(8));
        }
        assert_eq!(random_requeue_delay_in_range(5, 5), Duration::from_secs(5));
    }

    #[tokio::test]
    async fn cluster_name_falls_back_to_local_registration() {
        let (fake, api) = fake_cluster();
        assert_eq!(cluster_name(&api).await, "");

        fake.insert(&registration_secret(MC_LOCAL_REGISTRATION_SECRET, "local"));
        assert_eq!(cluster_name(&api).await, "local");

        fake.insert(&registration_secret(MC_REGISTRATION_SECRET, "managed1"));
        assert_eq!(cluster_name(&api).await, "managed1");
        assert!(is_placed_in_this_cluster(&api, &Placement::new(["managed1"])).await);
        assert!(!is_placed_in_this_cluster(&api, &Placement::new(["local"])).await);
    }

    #[tokio::test]
    async fn update_status_persists_and_notifies_agent() {
        let (fake, api) = fake_cluster();
        let mut secret = MultiClusterSecret::new(
            "mysecret",
            MultiClusterSecretSpec {
                placement: Placement::new(["managed1"]),
                ..MultiClusterSecretSpec::default()
            },
        );
        secret.metadata.namespace = Some("ns1".into());
        fake.insert(&secret);
        let secret: MultiClusterSecret = fake.fetch(Some("ns1"), "mysecret").unwrap();

        let (tx, mut rx) = mpsc::channel(4);
        let cond = condition_from_result(&Ok(OperationResult::Created), "MultiClusterSecret");
        update_status(&api, &secret, cond.clone(), "managed1", Some(&tx))
            .await
            .unwrap();

        let stored: MultiClusterSecret = fake.fetch(Some("ns1"), "mysecret").unwrap();
        let status = stored.status.unwrap();
        assert_eq!(status.state, StateType::Succeeded);
        assert_eq!(status.conditions.len(), 1);

        let msg = rx.try_recv().unwrap();
        assert_eq!(msg.resource.name, "mysecret");
        assert_eq!(msg.resource.kind, MultiClusterKind::Secret);
        assert_eq!(msg.new_cluster_status.state, StateType::Succeeded);

        // unchanged status is neither written nor queued
        let stored: MultiClusterSecret = fake.fetch(Some("ns1"), "mysecret").unwrap();
        update_status(&api, &stored, cond, "managed1", Some(&tx))
            .await
            .unwrap();
        assert!(rx.try_recv().is_err());
    }
}
