// Copyright 2026 Verrazzano Maintainers
// SPDX-License-Identifier: Apache-2.0

//! Multi-cluster agent running on every managed cluster.
//!
//! The agent reads the `verrazzano-cluster-agent` secret to learn its cluster name and
//! how to reach the admin cluster. It then keeps projects, multi-cluster resources and
//! registration secrets of the admin cluster mirrored locally, and pushes the status of
//! the local multi-cluster controllers back to the admin cluster.

mod registration;
mod resources;
mod status;
mod workloads;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Secret;
use k8s_openapi::api::networking::v1::Ingress;
use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::{Client, Config, ResourceExt};
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, instrument};
use verrazzano_crd::{
    MultiClusterComponent, MultiClusterConfigMap, MultiClusterSecret, VerrazzanoManagedCluster,
};

use crate::client::ClusterApi;
use crate::clusters::{self, StatusUpdateMessage, now_rfc3339};
use crate::config::AgentArgs;
use crate::constants::{
    CLUSTER_NAME_DATA, KUBECONFIG_DATA, MC_AGENT_SECRET, MONITORING_OPERATOR_DEPLOYMENT,
    PROMETHEUS_INGRESS, THANOS_QUERY_STORE_INGRESS, VERRAZZANO_INGRESS,
    VERRAZZANO_MULTICLUSTER_NAMESPACE, VERRAZZANO_SYSTEM_NAMESPACE,
};
use crate::diagnostics::State;
use crate::{Error, Result};

pub use workloads::{get_env_value, update_env_value};

const MC_APP_CONFIG_CRD: &str = "multiclusterapplicationconfigurations.clusters.verrazzano.io";

/// Builds a client for the admin cluster out of the kubeconfig held by the agent secret
#[async_trait]
pub trait AdminClientFactory: Send + Sync {
    /// Connects to the admin cluster
    async fn connect(&self, kubeconfig: &[u8]) -> Result<ClusterApi>;
}

/// [`AdminClientFactory`] backed by `kube`
#[derive(Clone, Copy, Debug, Default)]
pub struct KubeconfigClientFactory;

#[async_trait]
impl AdminClientFactory for KubeconfigClientFactory {
    async fn connect(&self, kubeconfig: &[u8]) -> Result<ClusterApi> {
        let yaml = std::str::from_utf8(kubeconfig)
            .map_err(|e| Error::InvalidAgentSecret(format!("kubeconfig is not valid UTF-8: {e}")))?;
        let kubeconfig = Kubeconfig::from_yaml(yaml)?;
        let config = Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default()).await?;
        Ok(ClusterApi::from_kube(Client::try_from(config)?))
    }
}

/// Checks that the agent secret carries the cluster name and the admin kubeconfig
///
/// # Errors
/// Names the first missing key
pub fn validate_agent_secret(secret: &Secret) -> Result<()> {
    for field in [CLUSTER_NAME_DATA, KUBECONFIG_DATA] {
        if !secret.data.as_ref().is_some_and(|d| d.contains_key(field)) {
            return Err(Error::InvalidAgentSecret(format!(
                "the secret named {} in namespace {} is missing the required field {field}",
                secret.name_any(),
                secret.namespace().unwrap_or_default()
            )));
        }
    }
    Ok(())
}

/// State carried between two iterations of the agent
pub struct Syncer {
    local: ClusterApi,
    admin: Option<ClusterApi>,
    admin_factory: Arc<dyn AdminClientFactory>,
    managed_cluster_name: String,
    project_namespaces: Vec<String>,
    agent_secret_found: bool,
    agent_secret_valid: bool,
    secret_resource_version: String,
    status_rx: mpsc::Receiver<StatusUpdateMessage>,
    status_batch_size: usize,
    retry_delay: Duration,
}

impl Syncer {
    /// Creates an agent that has not yet connected to the admin cluster
    pub fn new(
        local: ClusterApi,
        admin_factory: Arc<dyn AdminClientFactory>,
        status_rx: mpsc::Receiver<StatusUpdateMessage>,
        args: &AgentArgs,
    ) -> Self {
        Self {
            local,
            admin: None,
            admin_factory,
            managed_cluster_name: String::new(),
            project_namespaces: Vec::new(),
            agent_secret_found: false,
            agent_secret_valid: false,
            secret_resource_version: String::new(),
            status_rx,
            status_batch_size: args.status_batch_size,
            retry_delay: args.status_retry_delay(),
        }
    }

    /// Name of this cluster, empty until the agent secret was read
    #[must_use]
    pub fn managed_cluster_name(&self) -> &str {
        &self.managed_cluster_name
    }

    /// Namespaces of the projects placed on this cluster
    #[must_use]
    pub fn project_namespaces(&self) -> &[String] {
        &self.project_namespaces
    }

    /// True once a valid agent secret has been found
    #[must_use]
    pub fn agent_ready_to_sync(&self) -> bool {
        self.agent_secret_found && self.agent_secret_valid
    }

    /// Runs the agent loop forever, syncing only while `leader` holds true
    #[instrument(skip_all, fields(agent = "multi-cluster"))]
    pub async fn run(mut self, state: State, leader: watch::Receiver<bool>, poll_interval: Duration) {
        info!("starting multi-cluster agent");
        loop {
            let is_leader = *leader.borrow();
            state.set_leader(is_leader).await;
            if is_leader {
                self.sync_once().await;
                let mut diagnostics = state.diagnostics.write().await;
                diagnostics.agent_connected = self.agent_ready_to_sync() && self.admin.is_some();
                diagnostics.cluster_name = (!self.managed_cluster_name.is_empty())
                    .then(|| self.managed_cluster_name.clone());
                diagnostics.last_event = k8s_openapi::chrono::Utc::now();
            } else {
                debug!("not holding the lease, skipping sync");
                self.discard_status_messages();
            }
            tokio::time::sleep(poll_interval).await;
        }
    }

    /// One iteration of the agent loop
    pub async fn sync_once(&mut self) {
        if let Err(e) = self.process_agent_thread().await {
            error!(error = %e, "failed processing multi-cluster resources");
        }
        self.update_deployment(MONITORING_OPERATOR_DEPLOYMENT).await;
        self.configure_logging().await;
        if !self.agent_ready_to_sync() {
            self.discard_status_messages();
        }
    }

    /// Reads the agent secret, reconnects to the admin cluster when it changed and syncs
    ///
    /// # Errors
    /// Fails when the agent secret is invalid or the admin cluster cannot be reached
    pub async fn process_agent_thread(&mut self) -> Result<()> {
        let Some(secret) = self
            .local
            .get::<Secret>(Some(VERRAZZANO_SYSTEM_NAMESPACE), MC_AGENT_SECRET)
            .await?
        else {
            if self.agent_secret_found {
                debug!(secret = MC_AGENT_SECRET, "the agent secret was deleted");
                self.agent_secret_found = false;
                self.agent_secret_valid = false;
            }
            return Ok(());
        };

        if let Err(e) = validate_agent_secret(&secret) {
            self.agent_secret_valid = false;
            return Err(e);
        }
        self.agent_secret_found = true;
        self.agent_secret_valid = true;

        let cluster_name = clusters::secret_value(&secret, CLUSTER_NAME_DATA).unwrap_or_default();
        if cluster_name != self.managed_cluster_name {
            debug!(from = %self.managed_cluster_name, to = %cluster_name, "cluster name changed");
            self.managed_cluster_name = cluster_name;
        }

        let resource_version = secret.resource_version().unwrap_or_default();
        if resource_version != self.secret_resource_version || self.admin.is_none() {
            let kubeconfig = secret
                .data
                .as_ref()
                .and_then(|d| d.get(KUBECONFIG_DATA))
                .map(|v| v.0.as_slice())
                .unwrap_or_default();
            let admin = self.admin_factory.connect(kubeconfig).await.map_err(|e| {
                Error::Message(format!(
                    "Failed to get the client for cluster {:?}: {e}",
                    self.managed_cluster_name
                ))
            })?;
            info!(cluster = %self.managed_cluster_name, "connected to the admin cluster");
            self.admin = Some(admin);
            self.secret_resource_version = resource_version;
        }

        let Some(admin) = self.admin.clone() else {
            return Ok(());
        };

        if let Err(e) = self.sync_cluster_cas(&admin).await {
            error!(error = %e, "failed to sync cluster CAs from the admin cluster");
        }
        if let Err(e) = self.sync_agent_secret_from_admin_cluster(&admin).await {
            error!(error = %e, "failed to sync the agent secret from the admin cluster");
        }
        if let Err(e) = self.update_vmc_status(&admin).await {
            error!(error = %e, "failed to update VMC status on admin cluster");
        }

        self.sync_multi_cluster_resources(&admin).await;
        Ok(())
    }

    async fn ingress_host(&self, name: &str) -> Result<String> {
        let ingress = self
            .local
            .get::<Ingress>(Some(VERRAZZANO_SYSTEM_NAMESPACE), name)
            .await
            .map_err(|e| {
                Error::Message(format!(
                    "unable to fetch ingress {VERRAZZANO_SYSTEM_NAMESPACE}/{name}, {e}"
                ))
            })?;
        Ok(ingress
            .and_then(|i| i.spec)
            .and_then(|s| s.rules)
            .and_then(|rules| rules.into_iter().next())
            .and_then(|rule| rule.host)
            .unwrap_or_default())
    }

    /// Reports this cluster's agent connection and endpoints on its VMC on the admin cluster
    ///
    /// # Errors
    /// Fails when the VMC cannot be read or written
    pub async fn update_vmc_status(&self, admin: &ClusterApi) -> Result<()> {
        let vmc = admin
            .get::<VerrazzanoManagedCluster>(
                Some(VERRAZZANO_MULTICLUSTER_NAMESPACE),
                &self.managed_cluster_name,
            )
            .await?
            .ok_or_else(|| {
                clusters::not_found("verrazzanomanagedclusters.clusters.verrazzano.io", &self.managed_cluster_name)
            })?;

        let mut status = vmc.status.clone().unwrap_or_default();
        status.last_agent_connect_time = Some(now_rfc3339());

        let api_host = self.ingress_host(VERRAZZANO_INGRESS).await?;
        status.api_url = Some(if api_host.is_empty() {
            String::new()
        } else {
            format!("https://{api_host}")
        });

        let prometheus_host = self.ingress_host(PROMETHEUS_INGRESS).await?;
        if !prometheus_host.is_empty() {
            status.prometheus_host = Some(prometheus_host);
        }

        status.thanos_query_store = Some(self.ingress_host(THANOS_QUERY_STORE_INGRESS).await?);

        admin.patch_status(&vmc, &status).await?;
        Ok(())
    }

    /// Mirrors projects and the multi-cluster resources of their namespaces
    pub async fn sync_multi_cluster_resources(&mut self, admin: &ClusterApi) {
        match self
            .local
            .get::<CustomResourceDefinition>(None, MC_APP_CONFIG_CRD)
            .await
        {
            Ok(Some(_)) => {}
            Ok(None) => {
                debug!(crd = MC_APP_CONFIG_CRD, "CRD not found, skip syncing multi-cluster resources");
                return;
            }
            Err(e) => error!(crd = MC_APP_CONFIG_CRD, error = %e, "failed retrieving CRD"),
        }

        if let Err(e) = self.sync_verrazzano_projects(admin).await {
            error!(error = %e, "failed syncing VerrazzanoProject objects");
        }

        for namespace in self.project_namespaces.clone() {
            if let Err(e) = self.sync_secret_objects(admin, &namespace).await {
                error!(namespace = %namespace, error = %e, "failed to sync Secret objects");
            }
            if let Err(e) = self.sync_mc_objects::<MultiClusterSecret>(admin, &namespace).await {
                error!(namespace = %namespace, error = %e, "failed to sync MultiClusterSecret objects");
            }
            if let Err(e) = self.sync_mc_objects::<MultiClusterConfigMap>(admin, &namespace).await {
                error!(namespace = %namespace, error = %e, "failed to sync MultiClusterConfigMap objects");
            }
            if let Err(e) = self.sync_mc_objects::<MultiClusterComponent>(admin, &namespace).await {
                error!(namespace = %namespace, error = %e, "failed to sync MultiClusterComponent objects");
            }
            if let Err(e) = self.sync_mc_app_configs(admin, &namespace).await {
                error!(
                    namespace = %namespace,
                    error = %e,
                    "failed to sync MultiClusterApplicationConfiguration objects"
                );
            }

            self.process_status_updates().await;
        }
    }
}
