// Copyright 2026 Verrazzano Maintainers
// SPDX-License-Identifier: Apache-2.0

//! Workarounds for MySQL operator bugs, all repaired by recycling the operator pod

use std::time::Duration;

use k8s_openapi::api::core::v1::{Event, ObjectReference, Pod};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, Time};
use k8s_openapi::chrono::{DateTime, Utc};
use kube::ResourceExt;
use kube::api::ApiResource;
use kube::core::GroupVersionKind;
use tokio::sync::watch;
use tracing::{debug, info, instrument, warn};

use crate::client::ClusterApi;
use crate::{Error, Result, State};

const MYSQL_NAMESPACE: &str = "keycloak";
const MYSQL_RELEASE: &str = "mysql";
const MYSQLD_SELECTOR: &str = "component=mysqld";
const MYSQL_ROUTER_SELECTOR: &str = "component=mysqlrouter";
const MYSQL_OPERATOR_NAMESPACE: &str = "mysql-operator";
const MYSQL_OPERATOR_SELECTOR: &str = "name=mysql-operator";
const CRASH_LOOP_BACK_OFF: &str = "CrashLoopBackOff";
const OPERATOR_ALERT: &str = "mysql-operator";

fn innodb_cluster_resource() -> ApiResource {
    ApiResource::from_gvk(&GroupVersionKind::gvk("mysql.oracle.com", "v2", "InnoDBCluster"))
}

/// Start of each pending repair, `None` while the condition is not observed
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RepairTimers {
    /// mysqld pods waiting on readiness gates
    pub readiness_gates: Option<DateTime<Utc>>,
    /// InnoDBCluster carrying a deletion timestamp
    pub innodb_cluster_deleting: Option<DateTime<Utc>>,
    /// mysqld pods carrying a deletion timestamp
    pub pods_terminating: Option<DateTime<Utc>>,
}

/// Recycles the MySQL operator when MySQL resources stay stuck
pub struct MysqlRepair {
    client: ClusterApi,
    repair_timeout: Duration,
    timers: RepairTimers,
}

fn pod_waiting_for_readiness_gates(pod: &Pod) -> Result<bool> {
    let conditions = pod
        .status
        .as_ref()
        .and_then(|s| s.conditions.as_ref())
        .filter(|c| !c.is_empty())
        .ok_or_else(|| {
            Error::Message(format!(
                "Failed checking MySQL readiness gates, no status conditions found for pod {}/{}",
                pod.namespace().unwrap_or_default(),
                pod.name_any()
            ))
        })?;
    let gates = pod
        .spec
        .as_ref()
        .and_then(|s| s.readiness_gates.as_ref())
        .map(Vec::as_slice)
        .unwrap_or_default();

    Ok(!gates.iter().all(|gate| {
        conditions
            .iter()
            .any(|c| c.type_ == gate.condition_type && c.status == "True")
    }))
}

fn object_reference(kind: &str, meta: &ObjectMeta) -> ObjectReference {
    ObjectReference {
        kind: Some(kind.to_string()),
        namespace: meta.namespace.clone(),
        name: meta.name.clone(),
        uid: meta.uid.clone(),
        resource_version: meta.resource_version.clone(),
        ..ObjectReference::default()
    }
}

fn crash_looping(pod: &Pod) -> bool {
    pod.status
        .as_ref()
        .and_then(|s| s.container_statuses.as_ref())
        .is_some_and(|statuses| {
            statuses.iter().any(|c| {
                c.state
                    .as_ref()
                    .and_then(|s| s.waiting.as_ref())
                    .and_then(|w| w.reason.as_deref())
                    == Some(CRASH_LOOP_BACK_OFF)
            })
        })
}

impl MysqlRepair {
    /// Creates a checker with no pending repair
    #[must_use]
    pub fn new(client: ClusterApi, repair_timeout: Duration) -> Self {
        Self {
            client,
            repair_timeout,
            timers: RepairTimers::default(),
        }
    }

    /// Pending repairs
    #[must_use]
    pub fn timers(&self) -> RepairTimers {
        self.timers
    }

    fn expired(&self, start: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        (now - start)
            .to_std()
            .is_ok_and(|elapsed| elapsed > self.repair_timeout)
    }

    /// Records a `Warning` event named after `alert`, replacing the previous one
    async fn record_event(
        &self,
        involved: Option<ObjectReference>,
        alert: &str,
        reason: &str,
        message: &str,
    ) {
        let event = Event {
            metadata: ObjectMeta {
                name: Some(format!("verrazzano-{alert}")),
                namespace: Some(MYSQL_NAMESPACE.to_string()),
                ..ObjectMeta::default()
            },
            ..Event::default()
        };
        let result = self
            .client
            .create_or_update(event, |e| {
                e.involved_object = involved.unwrap_or_default();
                e.type_ = Some("Warning".to_string());
                e.reason = Some(reason.to_string());
                e.message = Some(message.to_string());
                e.last_timestamp = Some(Time(Utc::now()));
            })
            .await;
        if let Err(e) = result {
            warn!(error = %e, alert, reason, "failed to record event");
        }
    }

    async fn mysqld_pods(&self) -> Result<Vec<Pod>> {
        self.client
            .list::<Pod>(Some(MYSQL_NAMESPACE), Some(MYSQLD_SELECTOR))
            .await
    }

    /// Recycles the operator once mysqld pods waited on their readiness gates for too long
    ///
    /// # Errors
    /// Fails when a mysqld pod has no conditions or the operator cannot be recycled
    #[instrument(skip_all)]
    pub async fn repair_pods_waiting_readiness_gates(&mut self, now: DateTime<Utc>) -> Result<()> {
        let mut waiting = false;
        for pod in self.mysqld_pods().await? {
            if pod_waiting_for_readiness_gates(&pod)? {
                waiting = true;
                break;
            }
        }
        if !waiting {
            self.timers.readiness_gates = None;
            return Ok(());
        }

        let timer = self.timers.readiness_gates;
        match timer {
            None => {
                debug!("MySQL pods waiting for readiness gates, starting timer");
                self.timers.readiness_gates = Some(now);
                Ok(())
            }
            Some(start) if self.expired(start, now) => {
                self.restart_mysql_operator("MySQL pods waiting for readiness gates")
                    .await
            }
            Some(_) => Ok(()),
        }
    }

    /// Recycles the operator once the InnoDBCluster stayed in deletion for too long
    ///
    /// # Errors
    /// Fails while the cluster is still being deleted within the timeout
    #[instrument(skip_all)]
    pub async fn repair_innodb_cluster_stuck_deleting(&mut self, now: DateTime<Utc>) -> Result<()> {
        let Some(cluster) = self
            .client
            .get_dynamic(
                &innodb_cluster_resource(),
                Some(MYSQL_NAMESPACE),
                MYSQL_RELEASE,
            )
            .await?
        else {
            return Ok(());
        };
        if cluster.metadata.deletion_timestamp.is_none() {
            self.timers.innodb_cluster_deleting = None;
            return Ok(());
        }

        let still_deleting = || {
            Error::Message(format!(
                "Waiting for InnoDBCluster {MYSQL_NAMESPACE}/{MYSQL_RELEASE} to be deleted"
            ))
        };
        let timer = self.timers.innodb_cluster_deleting;
        match timer {
            None => {
                info!(
                    "Starting check to ensure the InnoDBCluster {MYSQL_NAMESPACE}/{MYSQL_RELEASE} is not stuck deleting"
                );
                self.timers.innodb_cluster_deleting = Some(now);
                Err(still_deleting())
            }
            Some(start) if self.expired(start, now) => {
                let reason = "InnoDBCluster stuck deleting";
                self.record_event(
                    Some(object_reference("InnoDBCluster", &cluster.metadata)),
                    "innodbcluster",
                    "ICStuckDeleting",
                    reason,
                )
                .await;
                self.restart_mysql_operator(reason).await
            }
            Some(_) => Err(still_deleting()),
        }
    }

    /// Recycles the operator once mysqld pods stayed terminating for too long
    ///
    /// # Errors
    /// Fails when the operator cannot be recycled
    #[instrument(skip_all)]
    pub async fn repair_pods_stuck_terminating(&mut self, now: DateTime<Utc>) -> Result<()> {
        let terminating = self
            .mysqld_pods()
            .await?
            .into_iter()
            .find(|pod| pod.metadata.deletion_timestamp.is_some());
        let Some(pod) = terminating else {
            self.timers.pods_terminating = None;
            return Ok(());
        };

        let timer = self.timers.pods_terminating;
        match timer {
            None => {
                info!("Waiting for MySQL pods to terminate in namespace {MYSQL_NAMESPACE}");
                self.timers.pods_terminating = Some(now);
                Ok(())
            }
            Some(start) if self.expired(start, now) => {
                warn!(
                    pod = %pod.name_any(),
                    timeout = ?self.repair_timeout,
                    "pod stuck deleting"
                );
                self.record_event(
                    Some(object_reference("Pod", &pod.metadata)),
                    "pod-stuck",
                    "PodStuckDeleting",
                    &format!("Pod stuck deleting for a minimum of {:?}", self.repair_timeout),
                )
                .await;
                self.restart_mysql_operator("MySQL pods stuck terminating")
                    .await
            }
            Some(_) => Ok(()),
        }
    }

    /// Deletes MySQL router pods stuck in `CrashLoopBackOff`
    ///
    /// # Errors
    /// Fails on API errors
    #[instrument(skip_all)]
    pub async fn repair_router_pods_crash_loop(&self) -> Result<()> {
        let pods = self
            .client
            .list::<Pod>(Some(MYSQL_NAMESPACE), Some(MYSQL_ROUTER_SELECTOR))
            .await?;
        for pod in pods.iter().filter(|p| crash_looping(p)) {
            info!(
                pod = %pod.name_any(),
                "Terminating pod because it is stuck in {CRASH_LOOP_BACK_OFF}"
            );
            self.record_event(
                Some(object_reference("Pod", &pod.metadata)),
                "mysql-router",
                CRASH_LOOP_BACK_OFF,
                &format!(
                    "Terminating pod {MYSQL_NAMESPACE}/{} because it is stuck in {CRASH_LOOP_BACK_OFF}",
                    pod.name_any()
                ),
            )
            .await;
            self.client
                .delete::<Pod>(Some(MYSQL_NAMESPACE), &pod.name_any())
                .await?;
        }
        Ok(())
    }

    async fn operator_pod(&self) -> Result<Pod> {
        let pods = self
            .client
            .list::<Pod>(Some(MYSQL_OPERATOR_NAMESPACE), Some(MYSQL_OPERATOR_SELECTOR))
            .await?;
        match <[Pod; 1]>::try_from(pods) {
            Ok([pod]) => Ok(pod),
            Err(pods) => Err(Error::Message(format!(
                "expected one pod matching selector {MYSQL_OPERATOR_SELECTOR}, found {}",
                pods.len()
            ))),
        }
    }

    async fn restart_mysql_operator(&mut self, reason: &str) -> Result<()> {
        info!(reason, "Restarting the mysql-operator");
        self.record_event(
            None,
            OPERATOR_ALERT,
            "RestartMySQLOperator",
            &format!("Restarting the mysql-operator to repair: {reason}"),
        )
        .await;

        let pod = match self.operator_pod().await {
            Ok(pod) => pod,
            Err(e) => {
                let message = format!("Failed restarting the mysql-operator to repair stuck resources: {e}");
                self.record_event(None, OPERATOR_ALERT, "PodNotFound", &message).await;
                return Err(Error::Message(message));
            }
        };
        if let Err(e) = self
            .client
            .delete::<Pod>(Some(MYSQL_OPERATOR_NAMESPACE), &pod.name_any())
            .await
        {
            self.record_event(
                Some(object_reference("Pod", &pod.metadata)),
                OPERATOR_ALERT,
                "PodNotDeleted",
                &format!("Failed to delete the mysql-operator pod: {e}"),
            )
            .await;
            return Err(e);
        }
        self.timers = RepairTimers::default();
        Ok(())
    }

    /// Runs every check once
    pub async fn check_once(&mut self, now: DateTime<Utc>) {
        if let Err(e) = self.repair_pods_waiting_readiness_gates(now).await {
            warn!(error = %e, "readiness gate check failed");
        }
        if let Err(e) = self.repair_pods_stuck_terminating(now).await {
            warn!(error = %e, "terminating pods check failed");
        }
        if let Err(e) = self.repair_router_pods_crash_loop().await {
            warn!(error = %e, "router pods check failed");
        }
        if let Err(e) = self.repair_innodb_cluster_stuck_deleting(now).await {
            debug!(error = %e, "InnoDBCluster check did not complete");
        }
    }

    /// Runs the checks forever, only while `leader` holds true
    #[instrument(skip_all, fields(task = "mysql-repair"))]
    pub async fn run(mut self, state: State, leader: watch::Receiver<bool>, interval: Duration) {
        info!("starting MySQL repair loop");
        loop {
            let is_leader = *leader.borrow();
            state.set_leader(is_leader).await;
            if is_leader {
                self.check_once(Utc::now()).await;
                state.touch().await;
            }
            tokio::time::sleep(interval).await;
        }
    }
}
