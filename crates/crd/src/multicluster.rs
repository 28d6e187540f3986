// Copyright 2026 Verrazzano Maintainers
// SPDX-License-Identifier: Apache-2.0

//! Behaviour shared by every placement carrying kind

use std::fmt;

use k8s_openapi::NamespaceResourceScope;
use kube::{Resource, ResourceExt};
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::v1_alpha1::{
    MultiClusterApplicationConfiguration, MultiClusterApplicationConfigurationSpec,
    MultiClusterComponent, MultiClusterComponentSpec, MultiClusterConfigMap,
    MultiClusterConfigMapSpec, MultiClusterResourceStatus, MultiClusterSecret,
    MultiClusterSecretSpec, Placement, VerrazzanoProject, VerrazzanoProjectSpec,
};

/// Discriminator of the kinds synchronised from the admin cluster
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MultiClusterKind {
    /// `MultiClusterSecret`
    Secret,
    /// `MultiClusterConfigMap`
    ConfigMap,
    /// `MultiClusterComponent`
    Component,
    /// `MultiClusterApplicationConfiguration`
    ApplicationConfiguration,
    /// `VerrazzanoProject`
    Project,
}

impl MultiClusterKind {
    /// Kubernetes kind name
    #[must_use]
    pub fn kind(self) -> &'static str {
        match self {
            MultiClusterKind::Secret => "MultiClusterSecret",
            MultiClusterKind::ConfigMap => "MultiClusterConfigMap",
            MultiClusterKind::Component => "MultiClusterComponent",
            MultiClusterKind::ApplicationConfiguration => "MultiClusterApplicationConfiguration",
            MultiClusterKind::Project => "VerrazzanoProject",
        }
    }
}

impl fmt::Display for MultiClusterKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.kind())
    }
}

/// A namespaced custom resource carrying a placement and a multi-cluster status
pub trait MultiClusterResource:
    Resource<DynamicType = (), Scope = NamespaceResourceScope>
    + Clone
    + fmt::Debug
    + Serialize
    + DeserializeOwned
    + Send
    + Sync
    + 'static
{
    /// Spec type, compared when mirroring between clusters
    type Spec: Clone + PartialEq + Default + fmt::Debug + Send + Sync;

    /// Kind discriminator
    const KIND: MultiClusterKind;

    /// Builds a new object with the given name and spec
    fn build(name: &str, spec: Self::Spec) -> Self;

    /// Spec of the object
    fn mc_spec(&self) -> &Self::Spec;

    /// Mutable spec of the object
    fn mc_spec_mut(&mut self) -> &mut Self::Spec;

    /// Status of the object, `None` until first reported
    fn mc_status(&self) -> Option<&MultiClusterResourceStatus>;

    /// Status of the object, created when missing
    fn mc_status_mut(&mut self) -> &mut MultiClusterResourceStatus;

    /// Placement of the object
    fn placement(&self) -> &Placement;

    /// Namespace of the object, empty if unset
    fn namespace_or_default(&self) -> String {
        self.namespace().unwrap_or_default()
    }
}

macro_rules! impl_multi_cluster_resource {
    ($kind:ty, $spec:ty, $discriminator:expr) => {
        impl MultiClusterResource for $kind {
            type Spec = $spec;

            const KIND: MultiClusterKind = $discriminator;

            fn build(name: &str, spec: Self::Spec) -> Self {
                <$kind>::new(name, spec)
            }

            fn mc_spec(&self) -> &Self::Spec {
                &self.spec
            }

            fn mc_spec_mut(&mut self) -> &mut Self::Spec {
                &mut self.spec
            }

            fn mc_status(&self) -> Option<&MultiClusterResourceStatus> {
                self.status.as_ref()
            }

            fn mc_status_mut(&mut self) -> &mut MultiClusterResourceStatus {
                self.status.get_or_insert_with(MultiClusterResourceStatus::default)
            }

            fn placement(&self) -> &Placement {
                &self.spec.placement
            }
        }
    };
}

impl_multi_cluster_resource!(
    MultiClusterSecret,
    MultiClusterSecretSpec,
    MultiClusterKind::Secret
);
impl_multi_cluster_resource!(
    MultiClusterConfigMap,
    MultiClusterConfigMapSpec,
    MultiClusterKind::ConfigMap
);
impl_multi_cluster_resource!(
    MultiClusterComponent,
    MultiClusterComponentSpec,
    MultiClusterKind::Component
);
impl_multi_cluster_resource!(
    MultiClusterApplicationConfiguration,
    MultiClusterApplicationConfigurationSpec,
    MultiClusterKind::ApplicationConfiguration
);
impl_multi_cluster_resource!(
    VerrazzanoProject,
    VerrazzanoProjectSpec,
    MultiClusterKind::Project
);
