// Copyright 2026 Verrazzano Maintainers
// SPDX-License-Identifier: Apache-2.0

//! Registration data and CA certificates exchanged with the admin cluster

use std::collections::BTreeMap;

use k8s_openapi::ByteString;
use k8s_openapi::api::core::v1::Secret;
use kube::ResourceExt;
use tracing::{debug, info};
use verrazzano_crd::VerrazzanoManagedCluster;

use super::Syncer;
use crate::client::{ClusterApi, OperationResult};
use crate::clusters::{self, secret_bytes};
use crate::constants::{
    ADDITIONAL_TLS_CA_KEY, ADDITIONAL_TLS_SECRET, ADMIN_CA_BUNDLE_SECRET, CA_BUNDLE_KEY, CA_CRT_KEY,
    CATTLE_SYSTEM_NAMESPACE, CLUSTER_NAME_DATA, KUBECONFIG_DATA, MC_AGENT_SECRET, MC_REGISTRATION_SECRET, REGISTRATION_KEYS,
    VERRAZZANO_MULTICLUSTER_NAMESPACE, VERRAZZANO_SYSTEM_NAMESPACE, VERRAZZANO_TLS_CA_KEY,
    VERRAZZANO_TLS_SECRET, agent_secret_name, registration_secret_name,
};
use crate::Result;

async fn required_secret(client: &ClusterApi, namespace: &str, name: &str) -> Result<Secret> {
    client
        .get::<Secret>(Some(namespace), name)
        .await?
        .ok_or_else(|| clusters::not_found("secrets", name))
}

fn keys_differ<'a>(
    current: &BTreeMap<String, ByteString>,
    desired: &BTreeMap<String, ByteString>,
    keys: impl IntoIterator<Item = &'a str>,
) -> bool {
    keys.into_iter().any(|k| current.get(k) != desired.get(k))
}

impl Syncer {
    /// Refreshes the registration secret and exchanges CA certificates with the admin cluster
    ///
    /// # Errors
    /// Fails when either side cannot be read or written
    pub async fn sync_cluster_cas(&self, admin: &ClusterApi) -> Result<()> {
        let registration = self.sync_registration_from_admin_cluster(admin).await?;
        if registration != OperationResult::Unchanged {
            info!(secret = MC_REGISTRATION_SECRET, result = %registration, "synced registration from admin cluster");
        }
        let ca = self.sync_local_cluster_ca(admin).await?;
        if ca != OperationResult::Unchanged {
            info!(cluster = %self.managed_cluster_name, result = %ca, "synced managed cluster CA to admin cluster");
        }
        Ok(())
    }

    /// Copies this cluster's registration secret and the admin CA bundle from the admin cluster
    ///
    /// # Errors
    /// Fails when the admin secrets are missing or the local secret cannot be written
    pub async fn sync_registration_from_admin_cluster(
        &self,
        admin: &ClusterApi,
    ) -> Result<OperationResult> {
        let admin_registration = required_secret(
            admin,
            VERRAZZANO_MULTICLUSTER_NAMESPACE,
            &registration_secret_name(&self.managed_cluster_name),
        )
        .await?;
        let ca_bundle =
            required_secret(admin, VERRAZZANO_MULTICLUSTER_NAMESPACE, ADMIN_CA_BUNDLE_SECRET).await?;

        let mut desired = admin_registration.data.unwrap_or_default();
        match secret_bytes(&ca_bundle, CA_BUNDLE_KEY) {
            Some(bundle) => desired.insert(CA_BUNDLE_KEY.to_string(), bundle),
            None => desired.remove(CA_BUNDLE_KEY),
        };

        let local = self
            .local
            .get::<Secret>(Some(VERRAZZANO_SYSTEM_NAMESPACE), MC_REGISTRATION_SECRET)
            .await?;
        let compared = REGISTRATION_KEYS.into_iter().chain([CA_BUNDLE_KEY]);
        match local {
            Some(mut local) => {
                let current = local.data.clone().unwrap_or_default();
                if !keys_differ(&current, &desired, compared) {
                    return Ok(OperationResult::Unchanged);
                }
                local.data = Some(desired);
                self.local.replace(&local).await?;
                Ok(OperationResult::Updated)
            }
            None => {
                let secret = Secret {
                    metadata: kube::api::ObjectMeta {
                        name: Some(MC_REGISTRATION_SECRET.to_string()),
                        namespace: Some(VERRAZZANO_SYSTEM_NAMESPACE.to_string()),
                        ..kube::api::ObjectMeta::default()
                    },
                    data: Some(desired),
                    ..Secret::default()
                };
                self.local.create(&secret).await?;
                Ok(OperationResult::Created)
            }
        }
    }

    async fn local_ca(&self) -> Result<Option<ByteString>> {
        let additional = self
            .local
            .get::<Secret>(Some(CATTLE_SYSTEM_NAMESPACE), ADDITIONAL_TLS_SECRET)
            .await?
            .and_then(|s| secret_bytes(&s, ADDITIONAL_TLS_CA_KEY));
        if additional.is_some() {
            return Ok(additional);
        }
        Ok(self
            .local
            .get::<Secret>(Some(VERRAZZANO_SYSTEM_NAMESPACE), VERRAZZANO_TLS_SECRET)
            .await?
            .and_then(|s| secret_bytes(&s, VERRAZZANO_TLS_CA_KEY)))
    }

    /// Publishes this cluster's CA in the secret its VMC points at on the admin cluster
    ///
    /// # Errors
    /// Fails when the VMC or its CA secret are missing, or the admin secret cannot be written
    pub async fn sync_local_cluster_ca(&self, admin: &ClusterApi) -> Result<OperationResult> {
        let vmc = admin
            .get::<VerrazzanoManagedCluster>(
                Some(VERRAZZANO_MULTICLUSTER_NAMESPACE),
                &self.managed_cluster_name,
            )
            .await?
            .ok_or_else(|| {
                clusters::not_found(
                    "verrazzanomanagedclusters.clusters.verrazzano.io",
                    &self.managed_cluster_name,
                )
            })?;
        let Some(ca_secret) = vmc.spec.ca_secret.clone().filter(|s| !s.is_empty()) else {
            debug!(vmc = %vmc.name_any(), "no CA secret configured on the VMC");
            return Ok(OperationResult::Unchanged);
        };

        let Some(local_ca) = self.local_ca().await? else {
            debug!("no local CA found");
            return Ok(OperationResult::Unchanged);
        };

        let mut admin_secret =
            required_secret(admin, VERRAZZANO_MULTICLUSTER_NAMESPACE, &ca_secret).await?;
        if secret_bytes(&admin_secret, CA_CRT_KEY).as_ref() == Some(&local_ca) {
            return Ok(OperationResult::Unchanged);
        }
        admin_secret
            .data
            .get_or_insert_with(BTreeMap::new)
            .insert(CA_CRT_KEY.to_string(), local_ca);
        admin.replace(&admin_secret).await?;
        Ok(OperationResult::Updated)
    }

    /// Picks up a rotated admin kubeconfig or cluster name published on the admin cluster
    ///
    /// # Errors
    /// Fails when the admin copy is missing or the local secret cannot be written
    pub async fn sync_agent_secret_from_admin_cluster(
        &self,
        admin: &ClusterApi,
    ) -> Result<OperationResult> {
        let admin_agent = required_secret(
            admin,
            VERRAZZANO_MULTICLUSTER_NAMESPACE,
            &agent_secret_name(&self.managed_cluster_name),
        )
        .await?;
        let desired = admin_agent.data.unwrap_or_default();
        let mut local =
            required_secret(&self.local, VERRAZZANO_SYSTEM_NAMESPACE, MC_AGENT_SECRET).await?;
        let current = local.data.clone().unwrap_or_default();
        let compared = [KUBECONFIG_DATA, CLUSTER_NAME_DATA];
        if !keys_differ(&current, &desired, compared) {
            return Ok(OperationResult::Unchanged);
        }
        let data = local.data.get_or_insert_with(BTreeMap::new);
        for key in compared {
            match desired.get(key) {
                Some(value) => data.insert(key.to_string(), value.clone()),
                None => data.remove(key),
            };
        }
        self.local.replace(&local).await?;
        info!(secret = MC_AGENT_SECRET, "updated admin kubeconfig from admin cluster");
        Ok(OperationResult::Updated)
    }
}
