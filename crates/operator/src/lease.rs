// Copyright 2026 Verrazzano Maintainers
// SPDX-License-Identifier: Apache-2.0

//! Leader election over a `coordination.k8s.io` lease.
//! <https://kubernetes.io/docs/concepts/architecture/leases/>

use std::time::Duration;

use kube::Client;
use kube_leader_election::{LeaseLock, LeaseLockParams};
use tokio::{sync::watch, time::sleep};
use tracing::{error, info, instrument};

const LEASE_TTL: Duration = Duration::from_secs(15);
const RENEW_INTERVAL: Duration = Duration::from_secs(5);

/// Identity of a lease contender
#[derive(Clone, Debug)]
pub struct LeaseParams {
    /// Lease object name, one per run mode
    pub lease_name: String,
    /// Identity of this replica
    pub holder_id: String,
}

/// Contends for the lease in the client's default namespace forever,
/// publishing every change of leadership on `leader_tx`
#[instrument(skip(client, leader_tx), fields(lease = %params.lease_name))]
pub async fn run_leader_election(client: Client, params: LeaseParams, leader_tx: watch::Sender<bool>) {
    let namespace = client.default_namespace().to_string();
    let leadership = LeaseLock::new(
        client,
        &namespace,
        LeaseLockParams {
            holder_id: params.holder_id,
            lease_name: params.lease_name,
            lease_ttl: LEASE_TTL,
        },
    );

    loop {
        match leadership.try_acquire_or_renew().await {
            Ok(ll) => {
                let changed = leader_tx.send_if_modified(|leader| {
                    let was = *leader;
                    *leader = ll.acquired_lease;
                    was != ll.acquired_lease
                });
                if changed {
                    info!(leader = ll.acquired_lease, "lease ownership changed");
                }
            }
            Err(err) => error!(error = %err, "failed to acquire lease lock"),
        }

        sleep(RENEW_INTERVAL).await;
    }
}
