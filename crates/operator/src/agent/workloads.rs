// Copyright 2026 Verrazzano Maintainers
// SPDX-License-Identifier: Apache-2.0

//! Local workloads the agent keeps in line with the registration secret

use k8s_openapi::api::apps::v1::{DaemonSet, Deployment};
use k8s_openapi::api::core::v1::{
    ConfigMap, EnvVar, EnvVarSource, PodSpec, Secret, SecretKeySelector, SecretVolumeSource, Volume,
};
use kube::ResourceExt;
use tracing::{debug, error, info};
use verrazzano_crd::v1_alpha1::LOCAL_CLUSTER_NAME;

use super::Syncer;
use crate::clusters::secret_value;
use crate::constants::{
    CLUSTER_NAME_DATA, DEFAULT_ELASTICSEARCH_SECRET, DEFAULT_ELASTICSEARCH_URL, ES_CONFIG_SECRET_KEY,
    ES_CONFIG_URL_KEY, ES_URL_KEY, FLUENTD_CLUSTER_NAME_ENV, FLUENTD_DAEMONSET, FLUENTD_ES_CONFIG,
    FLUENTD_ES_PASSWORD_ENV, FLUENTD_ES_URL_ENV, FLUENTD_ES_USER_ENV, FLUENTD_SECRET_VOLUME,
    MC_REGISTRATION_SECRET, REGISTRATION_PASSWORD_KEY, REGISTRATION_SECRET_VERSION,
    REGISTRATION_USERNAME_KEY, VERRAZZANO_SYSTEM_NAMESPACE,
};

/// Value of the env var `name`, empty when unset
#[must_use]
pub fn get_env_value(envs: &[EnvVar], name: &str) -> String {
    envs.iter()
        .find(|e| e.name == name)
        .and_then(|e| e.value.clone())
        .unwrap_or_default()
}

/// Sets the env var `name` to `value`, appending it when missing
pub fn update_env_value(envs: &mut Vec<EnvVar>, name: &str, value: &str) {
    match envs.iter_mut().find(|e| e.name == name) {
        Some(env) => {
            env.value = Some(value.to_string());
            env.value_from = None;
        }
        None => envs.push(EnvVar {
            name: name.to_string(),
            value: Some(value.to_string()),
            value_from: None,
        }),
    }
}

fn secret_key_ref(secret: &str, key: &str) -> EnvVarSource {
    EnvVarSource {
        secret_key_ref: Some(SecretKeySelector {
            key: key.to_string(),
            name: secret.to_string(),
            optional: Some(true),
        }),
        ..EnvVarSource::default()
    }
}

/// Where fluentd should ship logs to
#[derive(Debug, PartialEq, Eq)]
struct LoggingTarget {
    cluster_name: String,
    url: String,
    secret: String,
}

/// Replacement for one of the fluentd env vars pointing at the log store, `None` for any other var
fn fluentd_env(name: &str, target: &LoggingTarget) -> Option<EnvVar> {
    let (value, value_from) = match name {
        FLUENTD_CLUSTER_NAME_ENV => (Some(target.cluster_name.clone()), None),
        FLUENTD_ES_URL_ENV => (Some(target.url.clone()), None),
        FLUENTD_ES_USER_ENV => (None, Some(secret_key_ref(&target.secret, REGISTRATION_USERNAME_KEY))),
        FLUENTD_ES_PASSWORD_ENV => (None, Some(secret_key_ref(&target.secret, REGISTRATION_PASSWORD_KEY))),
        _ => return None,
    };
    Some(EnvVar {
        name: name.to_string(),
        value,
        value_from,
    })
}

fn rewrite_fluentd(pod: &mut PodSpec, target: &LoggingTarget) {
    if let Some(container) = pod.containers.iter_mut().find(|c| c.name == FLUENTD_DAEMONSET) {
        for env in container.env.iter_mut().flatten() {
            if let Some(replacement) = fluentd_env(&env.name, target) {
                *env = replacement;
            }
        }
    }

    for volume in pod.volumes.iter_mut().flatten() {
        if volume.name == FLUENTD_SECRET_VOLUME {
            *volume = Volume {
                name: FLUENTD_SECRET_VOLUME.to_string(),
                secret: Some(SecretVolumeSource {
                    secret_name: Some(target.secret.clone()),
                    ..SecretVolumeSource::default()
                }),
                ..Volume::default()
            };
        }
    }
}

impl Syncer {
    /// Stamps the registration secret version on a deployment so it restarts when it changes
    pub async fn update_deployment(&self, name: &str) {
        let deployment = match self
            .local
            .get::<Deployment>(Some(VERRAZZANO_SYSTEM_NAMESPACE), name)
            .await
        {
            Ok(Some(d)) => d,
            Ok(None) => return,
            Err(e) => {
                error!(deployment = name, error = %e, "failed to fetch deployment");
                return;
            }
        };

        let version = match self
            .local
            .get::<Secret>(Some(VERRAZZANO_SYSTEM_NAMESPACE), MC_REGISTRATION_SECRET)
            .await
        {
            Ok(secret) => secret.and_then(|s| s.resource_version()).unwrap_or_default(),
            Err(e) => {
                error!(secret = MC_REGISTRATION_SECRET, error = %e, "failed to fetch the registration secret");
                return;
            }
        };

        let mut updated = deployment;
        let Some(container) = updated
            .spec
            .as_mut()
            .and_then(|s| s.template.spec.as_mut())
            .and_then(|p| p.containers.first_mut())
        else {
            return;
        };
        let envs = container.env.get_or_insert_with(Vec::new);
        if get_env_value(envs, REGISTRATION_SECRET_VERSION) == version {
            return;
        }
        update_env_value(envs, REGISTRATION_SECRET_VERSION, &version);

        match self.local.replace(&updated).await {
            Ok(_) => info!(deployment = name, version = %version, "updated registration secret version"),
            Err(e) => error!(deployment = name, error = %e, "failed to update deployment"),
        }
    }

    async fn logging_target(&self) -> crate::Result<LoggingTarget> {
        let registration = self
            .local
            .get::<Secret>(Some(VERRAZZANO_SYSTEM_NAMESPACE), MC_REGISTRATION_SECRET)
            .await?
            .filter(|s| s.data.as_ref().is_some_and(|d| !d.is_empty()));

        if let Some(secret) = registration {
            return Ok(LoggingTarget {
                cluster_name: secret_value(&secret, CLUSTER_NAME_DATA).unwrap_or_default(),
                url: secret_value(&secret, ES_URL_KEY).unwrap_or_default(),
                secret: MC_REGISTRATION_SECRET.to_string(),
            });
        }

        let defaults = self
            .local
            .get::<ConfigMap>(Some(VERRAZZANO_SYSTEM_NAMESPACE), FLUENTD_ES_CONFIG)
            .await?
            .and_then(|cm| cm.data)
            .unwrap_or_default();
        let setting = |key: &str, fallback: &str| {
            defaults
                .get(key)
                .filter(|v| !v.is_empty())
                .cloned()
                .unwrap_or_else(|| fallback.to_string())
        };
        Ok(LoggingTarget {
            cluster_name: LOCAL_CLUSTER_NAME.to_string(),
            url: setting(ES_CONFIG_URL_KEY, DEFAULT_ELASTICSEARCH_URL),
            secret: setting(ES_CONFIG_SECRET_KEY, DEFAULT_ELASTICSEARCH_SECRET),
        })
    }

    /// Points fluentd at the admin cluster log store once registered, at the local one otherwise
    pub async fn configure_logging(&self) {
        let daemonset = match self
            .local
            .get::<DaemonSet>(Some(VERRAZZANO_SYSTEM_NAMESPACE), FLUENTD_DAEMONSET)
            .await
        {
            Ok(Some(ds)) => ds,
            Ok(None) => {
                debug!(daemonset = FLUENTD_DAEMONSET, "log collector not installed");
                return;
            }
            Err(e) => {
                error!(daemonset = FLUENTD_DAEMONSET, error = %e, "failed to fetch the log collector");
                return;
            }
        };

        let target = match self.logging_target().await {
            Ok(t) => t,
            Err(e) => {
                error!(error = %e, "failed to resolve the logging target");
                return;
            }
        };

        let mut updated = daemonset.clone();
        if let Some(pod) = updated.spec.as_mut().and_then(|s| s.template.spec.as_mut()) {
            rewrite_fluentd(pod, &target);
        }
        if updated.spec == daemonset.spec {
            return;
        }

        match self.local.replace(&updated).await {
            Ok(_) => info!(
                cluster = %target.cluster_name,
                secret = %target.secret,
                "updated log collector target"
            ),
            Err(e) => error!(daemonset = FLUENTD_DAEMONSET, error = %e, "failed to update the log collector"),
        }
    }
}
