// Copyright 2026 Verrazzano Maintainers
// SPDX-License-Identifier: Apache-2.0

//! Object builders shared by unit tests

use std::collections::BTreeMap;
use std::sync::Arc;

use k8s_openapi::ByteString;
use k8s_openapi::api::core::v1::Secret;
use kube::api::ObjectMeta;

use crate::client::ClusterApi;
use crate::client::fake::FakeClusterClient;
use crate::constants::{CLUSTER_NAME_DATA, VERRAZZANO_SYSTEM_NAMESPACE};

/// Fake cluster and the typed api in front of it
pub fn fake_cluster() -> (Arc<FakeClusterClient>, ClusterApi) {
    let fake = Arc::new(FakeClusterClient::default());
    let api = ClusterApi::new(fake.clone());
    (fake, api)
}

/// Metadata with a name and an optional namespace
pub fn meta(namespace: Option<&str>, name: &str) -> ObjectMeta {
    ObjectMeta {
        name: Some(name.into()),
        namespace: namespace.map(Into::into),
        ..ObjectMeta::default()
    }
}

/// Metadata with labels
pub fn meta_with_labels(namespace: &str, name: &str, labels: &[(&str, &str)]) -> ObjectMeta {
    ObjectMeta {
        labels: Some(
            labels
                .iter()
                .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
                .collect(),
        ),
        ..meta(Some(namespace), name)
    }
}

/// Secret with UTF-8 data
pub fn secret(namespace: &str, name: &str, data: &[(&str, &str)]) -> Secret {
    Secret {
        metadata: meta(Some(namespace), name),
        data: Some(
            data.iter()
                .map(|(k, v)| ((*k).to_string(), ByteString(v.as_bytes().to_vec())))
                .collect::<BTreeMap<_, _>>(),
        ),
        ..Secret::default()
    }
}

/// Registration secret naming this cluster
pub fn registration_secret(name: &str, cluster: &str) -> Secret {
    secret(
        VERRAZZANO_SYSTEM_NAMESPACE,
        name,
        &[(CLUSTER_NAME_DATA, cluster)],
    )
}
