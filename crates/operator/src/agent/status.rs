// Copyright 2026 Verrazzano Maintainers
// SPDX-License-Identifier: Apache-2.0

use tracing::{debug, error};
use verrazzano_crd::v1_alpha1::{ClusterLevelStatus, Condition};
use verrazzano_crd::{
    MultiClusterApplicationConfiguration, MultiClusterComponent, MultiClusterConfigMap,
    MultiClusterKind, MultiClusterResource, MultiClusterSecret, VerrazzanoProject,
};

use super::Syncer;
use crate::client::ClusterApi;
use crate::clusters::{self, MultiClusterRef, StatusUpdateMessage, set_cluster_level_status};
use crate::{Error, Result};

const RETRY_COUNT: usize = 3;

impl Syncer {
    /// Pushes at most one batch of queued status updates to the admin cluster
    pub async fn process_status_updates(&mut self) {
        for _ in 0..self.status_batch_size {
            let Ok(msg) = self.status_rx.try_recv() else {
                break;
            };
            if let Err(e) = self.perform_admin_status_update(&msg).await {
                error!(
                    namespace = %msg.resource.namespace,
                    name = %msg.resource.name,
                    cluster = %msg.new_cluster_status.name,
                    retries = RETRY_COUNT,
                    error = %e,
                    "failed to update status on admin cluster"
                );
            }
        }
    }

    /// Drops every queued status update
    pub fn discard_status_messages(&mut self) {
        let mut discarded = 0;
        while self.status_rx.try_recv().is_ok() {
            discarded += 1;
        }
        if discarded > 0 {
            debug!(discarded, "discarded status updates");
        }
    }

    async fn perform_admin_status_update(&self, msg: &StatusUpdateMessage) -> Result<()> {
        let Some(admin) = &self.admin else {
            return Err(Error::Message("not connected to the admin cluster".into()));
        };
        let cond = &msg.new_condition;
        let cluster = &msg.new_cluster_status;
        let target = &msg.resource;

        let mut tries = 0;
        loop {
            let result = match target.kind {
                MultiClusterKind::Secret => {
                    update_admin_status::<MultiClusterSecret>(admin, target, cond, cluster).await
                }
                MultiClusterKind::ConfigMap => {
                    update_admin_status::<MultiClusterConfigMap>(admin, target, cond, cluster).await
                }
                MultiClusterKind::Component => {
                    update_admin_status::<MultiClusterComponent>(admin, target, cond, cluster).await
                }
                MultiClusterKind::ApplicationConfiguration => {
                    update_admin_status::<MultiClusterApplicationConfiguration>(
                        admin, target, cond, cluster,
                    )
                    .await
                }
                MultiClusterKind::Project => {
                    update_admin_status::<VerrazzanoProject>(admin, target, cond, cluster).await
                }
            };
            tries += 1;
            match result {
                Err(e) if e.is_conflict() && tries < RETRY_COUNT => {
                    debug!(name = %target.name, tries, "status update conflicted, retrying");
                    tokio::time::sleep(self.retry_delay).await;
                }
                other => return other,
            }
        }
    }
}

async fn update_admin_status<K: MultiClusterResource>(
    admin: &ClusterApi,
    target: &MultiClusterRef,
    condition: &Condition,
    cluster_status: &ClusterLevelStatus,
) -> Result<()> {
    let mut fetched = admin
        .get::<K>(Some(&target.namespace), &target.name)
        .await?
        .ok_or_else(|| clusters::not_found(K::KIND.kind(), &target.name))?;
    let status = fetched.mc_status_mut();
    status.conditions.push(condition.clone());
    set_cluster_level_status(status, cluster_status.clone());
    let status = status.clone();
    admin.patch_status(&fetched, &status).await?;
    Ok(())
}
