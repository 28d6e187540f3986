// Copyright 2026 Verrazzano Maintainers
// SPDX-License-Identifier: Apache-2.0

//! Generates yaml CRD resources from rust code.
//! Writes one file per kind into the directory named by the `CRDS_DIR` environment variable.
use std::{fs::File, io::Write, path};

use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;
use kube::CustomResourceExt;
use verrazzano_crd::{
    MultiClusterApplicationConfiguration, MultiClusterComponent, MultiClusterConfigMap,
    MultiClusterSecret, VerrazzanoManagedCluster, VerrazzanoProject,
};

#[allow(clippy::unwrap_used)]
fn main() {
    let crds_dir = std::env::var_os("CRDS_DIR").unwrap();
    let crds: [(&str, CustomResourceDefinition); 6] = [
        ("multiclustersecret", MultiClusterSecret::crd()),
        ("multiclusterconfigmap", MultiClusterConfigMap::crd()),
        ("multiclustercomponent", MultiClusterComponent::crd()),
        (
            "multiclusterapplicationconfiguration",
            MultiClusterApplicationConfiguration::crd(),
        ),
        ("verrazzanoproject", VerrazzanoProject::crd()),
        ("verrazzanomanagedcluster", VerrazzanoManagedCluster::crd()),
    ];

    for (name, crd) in crds {
        let schema = serde_yaml::to_string(&crd).unwrap();
        let crd_path = path::Path::new(&crds_dir).join(format!("{name}-crd.yaml"));
        let mut file = File::create(crd_path).unwrap();
        file.write_all(schema.as_bytes()).unwrap();
    }
}
