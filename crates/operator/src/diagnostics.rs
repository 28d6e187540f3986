// Copyright 2026 Verrazzano Maintainers
// SPDX-License-Identifier: Apache-2.0

use std::sync::Arc;

use k8s_openapi::chrono::{DateTime, Utc};
use kube::{
    Client,
    runtime::events::{Recorder, Reporter},
};
use serde::Serialize;
use tokio::sync::RwLock;

/// Diagnostics to be exposed by the web server
#[derive(Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Diagnostics {
    /// Last successful reconcile or sync
    pub last_event: DateTime<Utc>,
    /// Name of this cluster as last seen by the agent
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cluster_name: Option<String>,
    /// Whether the agent holds a valid connection to the admin cluster
    pub agent_connected: bool,
    /// Whether this replica currently holds the lease
    pub leader: bool,
    /// Kubernetes event reporter
    #[serde(skip)]
    pub reporter: Reporter,
}

impl Default for Diagnostics {
    fn default() -> Self {
        Self {
            last_event: Utc::now(),
            cluster_name: None,
            agent_connected: false,
            leader: false,
            reporter: "verrazzano".into(),
        }
    }
}

impl Diagnostics {
    /// Creates a new recorder wrapper around self
    #[must_use]
    pub fn recorder(&self, client: Client) -> Recorder {
        Recorder::new(client, self.reporter.clone())
    }
}

/// Holds the state of the whole application
#[derive(Clone, Default)]
pub struct State {
    /// Atomic lock for diagnostics
    pub diagnostics: Arc<RwLock<Diagnostics>>,
}

impl State {
    /// Getter for diagnostics with read lock
    pub async fn diagnostics(&self) -> Diagnostics {
        self.diagnostics.read().await.clone()
    }

    /// Records a successful unit of work
    pub async fn touch(&self) {
        self.diagnostics.write().await.last_event = Utc::now();
    }

    /// Records the lease state
    pub async fn set_leader(&self, leader: bool) {
        self.diagnostics.write().await.leader = leader;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn diagnostics_serialize_without_reporter() {
        let state = State::default();
        state.set_leader(true).await;
        state.diagnostics.write().await.cluster_name = Some("managed1".into());

        let json = serde_json::to_value(state.diagnostics().await).unwrap_or_default();
        assert_eq!(json["leader"], true);
        assert_eq!(json["clusterName"], "managed1");
        assert_eq!(json["agentConnected"], false);
        assert!(json.get("reporter").is_none());
    }
}
