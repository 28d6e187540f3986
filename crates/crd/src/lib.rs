// Copyright 2026 Verrazzano Maintainers
// SPDX-License-Identifier: Apache-2.0

//! Custom resource definitions for the Verrazzano multi-cluster operators

pub mod multicluster;
pub mod v1_alpha1;

pub use multicluster::{MultiClusterKind, MultiClusterResource};
pub use v1_alpha1::{
    MultiClusterApplicationConfiguration, MultiClusterComponent, MultiClusterConfigMap,
    MultiClusterResourceStatus, MultiClusterSecret, VerrazzanoManagedCluster, VerrazzanoProject,
};
