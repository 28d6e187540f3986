// Copyright 2026 Verrazzano Maintainers
// SPDX-License-Identifier: Apache-2.0

//! Cluster access shared by the agent, the controllers and the webhooks.
//!
//! Every cluster is reached through the object safe [`ClusterClient`] trait working on
//! [`DynamicObject`]s. [`ClusterApi`] layers typed helpers on top of it so callers can
//! keep using `k8s-openapi` and CRD types.

mod api;
#[cfg(test)]
pub mod fake;

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use kube::Resource;
use kube::api::{ApiResource, DynamicObject, TypeMeta};
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::Result;

pub use api::KubeClusterClient;

/// Raw verbs against one cluster
#[async_trait]
pub trait ClusterClient: Send + Sync {
    /// Fetches an object, `None` when it does not exist
    async fn get(
        &self,
        ar: &ApiResource,
        namespace: Option<&str>,
        name: &str,
    ) -> Result<Option<DynamicObject>>;

    /// Lists objects, optionally filtered by a label selector
    async fn list(
        &self,
        ar: &ApiResource,
        namespace: Option<&str>,
        label_selector: Option<&str>,
    ) -> Result<Vec<DynamicObject>>;

    /// Creates an object
    async fn create(&self, ar: &ApiResource, obj: &DynamicObject) -> Result<DynamicObject>;

    /// Replaces an object, honouring `metadata.resourceVersion` when set
    async fn replace(&self, ar: &ApiResource, obj: &DynamicObject) -> Result<DynamicObject>;

    /// Merges `status` into the status subresource, guarded by `resource_version` when given
    async fn patch_status(
        &self,
        ar: &ApiResource,
        namespace: Option<&str>,
        name: &str,
        status: serde_json::Value,
        resource_version: Option<String>,
    ) -> Result<DynamicObject>;

    /// Deletes an object, returns false when it did not exist
    async fn delete(&self, ar: &ApiResource, namespace: Option<&str>, name: &str) -> Result<bool>;
}

/// Outcome of [`ClusterApi::create_or_update`]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OperationResult {
    /// Nothing had to change
    Unchanged,
    /// The object did not exist and was created
    Created,
    /// The object existed and was updated
    Updated,
}

impl fmt::Display for OperationResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            OperationResult::Unchanged => "unchanged",
            OperationResult::Created => "created",
            OperationResult::Updated => "updated",
        })
    }
}

/// Builds the [`ApiResource`] of a statically typed resource
#[must_use]
pub fn api_resource<K: Resource<DynamicType = ()>>() -> ApiResource {
    ApiResource::erase::<K>(&())
}

/// Converts a typed object into a [`DynamicObject`] carrying its type meta
///
/// # Errors
/// Fails when the object cannot be represented as JSON
pub fn to_dynamic<K: Serialize>(obj: &K, ar: &ApiResource) -> Result<DynamicObject> {
    let mut dynamic: DynamicObject = serde_json::from_value(serde_json::to_value(obj)?)?;
    dynamic.types = Some(TypeMeta {
        api_version: ar.api_version.clone(),
        kind: ar.kind.clone(),
    });
    Ok(dynamic)
}

/// Converts a [`DynamicObject`] into a typed object
///
/// # Errors
/// Fails when the object does not match the target type
pub fn from_dynamic<K: DeserializeOwned>(obj: DynamicObject) -> Result<K> {
    Ok(serde_json::from_value(serde_json::to_value(obj)?)?)
}

/// Typed access to one cluster
#[derive(Clone)]
pub struct ClusterApi {
    inner: Arc<dyn ClusterClient>,
}

impl fmt::Debug for ClusterApi {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClusterApi").finish_non_exhaustive()
    }
}

impl ClusterApi {
    /// Wraps a raw client
    pub fn new(inner: Arc<dyn ClusterClient>) -> Self {
        Self { inner }
    }

    /// Wraps a `kube` client
    #[must_use]
    pub fn from_kube(client: kube::Client) -> Self {
        Self::new(Arc::new(KubeClusterClient::new(client)))
    }

    /// Fetches a typed object
    ///
    /// # Errors
    /// Fails on API errors other than not found
    pub async fn get<K>(&self, namespace: Option<&str>, name: &str) -> Result<Option<K>>
    where
        K: Resource<DynamicType = ()> + DeserializeOwned,
    {
        self.inner
            .get(&api_resource::<K>(), namespace, name)
            .await?
            .map(from_dynamic)
            .transpose()
    }

    /// Lists typed objects
    ///
    /// # Errors
    /// Fails on API errors
    pub async fn list<K>(&self, namespace: Option<&str>, label_selector: Option<&str>) -> Result<Vec<K>>
    where
        K: Resource<DynamicType = ()> + DeserializeOwned,
    {
        self.inner
            .list(&api_resource::<K>(), namespace, label_selector)
            .await?
            .into_iter()
            .map(from_dynamic)
            .collect()
    }

    /// Creates a typed object
    ///
    /// # Errors
    /// Fails on API errors, including an existing object
    pub async fn create<K>(&self, obj: &K) -> Result<K>
    where
        K: Resource<DynamicType = ()> + Serialize + DeserializeOwned,
    {
        let ar = api_resource::<K>();
        from_dynamic(self.inner.create(&ar, &to_dynamic(obj, &ar)?).await?)
    }

    /// Replaces a typed object
    ///
    /// # Errors
    /// Fails on API errors, including a stale resource version
    pub async fn replace<K>(&self, obj: &K) -> Result<K>
    where
        K: Resource<DynamicType = ()> + Serialize + DeserializeOwned,
    {
        let ar = api_resource::<K>();
        from_dynamic(self.inner.replace(&ar, &to_dynamic(obj, &ar)?).await?)
    }

    /// Writes the status of a typed object, guarded by its resource version
    ///
    /// # Errors
    /// Fails on API errors, including a stale resource version
    pub async fn patch_status<K, S>(&self, obj: &K, status: &S) -> Result<K>
    where
        K: Resource<DynamicType = ()> + DeserializeOwned,
        S: Serialize,
    {
        let meta = obj.meta();
        let name = meta.name.as_deref().unwrap_or_default();
        let updated = self
            .inner
            .patch_status(
                &api_resource::<K>(),
                meta.namespace.as_deref(),
                name,
                serde_json::to_value(status)?,
                meta.resource_version.clone(),
            )
            .await?;
        from_dynamic(updated)
    }

    /// Deletes a typed object, returns false when it did not exist
    ///
    /// # Errors
    /// Fails on API errors other than not found
    pub async fn delete<K>(&self, namespace: Option<&str>, name: &str) -> Result<bool>
    where
        K: Resource<DynamicType = ()>,
    {
        self.inner.delete(&api_resource::<K>(), namespace, name).await
    }

    /// Fetches the current object or starts from `obj`, applies `mutate` and writes the
    /// result back only when something changed
    ///
    /// # Errors
    /// Fails on API errors
    pub async fn create_or_update<K, F>(&self, obj: K, mutate: F) -> Result<OperationResult>
    where
        K: Resource<DynamicType = ()> + Serialize + DeserializeOwned,
        F: FnOnce(&mut K),
    {
        let meta = obj.meta();
        let name = meta.name.clone().unwrap_or_default();
        let namespace = meta.namespace.clone();

        match self.get::<K>(namespace.as_deref(), &name).await? {
            Some(mut existing) => {
                let before = serde_json::to_value(&existing)?;
                mutate(&mut existing);
                if serde_json::to_value(&existing)? == before {
                    return Ok(OperationResult::Unchanged);
                }
                self.replace(&existing).await?;
                Ok(OperationResult::Updated)
            }
            None => {
                let mut obj = obj;
                mutate(&mut obj);
                self.create(&obj).await?;
                Ok(OperationResult::Created)
            }
        }
    }

    /// Fetches an untyped object
    ///
    /// # Errors
    /// Fails on API errors other than not found
    pub async fn get_dynamic(
        &self,
        ar: &ApiResource,
        namespace: Option<&str>,
        name: &str,
    ) -> Result<Option<DynamicObject>> {
        self.inner.get(ar, namespace, name).await
    }

    /// Lists untyped objects
    ///
    /// # Errors
    /// Fails on API errors
    pub async fn list_dynamic(
        &self,
        ar: &ApiResource,
        namespace: Option<&str>,
        label_selector: Option<&str>,
    ) -> Result<Vec<DynamicObject>> {
        self.inner.list(ar, namespace, label_selector).await
    }

    /// Deletes an untyped object, returns false when it did not exist
    ///
    /// # Errors
    /// Fails on API errors other than not found
    pub async fn delete_dynamic(
        &self,
        ar: &ApiResource,
        namespace: Option<&str>,
        name: &str,
    ) -> Result<bool> {
        self.inner.delete(ar, namespace, name).await
    }

    /// Untyped counterpart of [`ClusterApi::create_or_update`]
    ///
    /// # Errors
    /// Fails on API errors
    pub async fn create_or_update_dynamic<F>(
        &self,
        ar: &ApiResource,
        obj: DynamicObject,
        mutate: F,
    ) -> Result<OperationResult>
    where
        F: FnOnce(&mut DynamicObject),
    {
        let name = obj.metadata.name.clone().unwrap_or_default();
        let namespace = obj.metadata.namespace.clone();

        match self.inner.get(ar, namespace.as_deref(), &name).await? {
            Some(mut existing) => {
                let before = serde_json::to_value(&existing)?;
                mutate(&mut existing);
                if serde_json::to_value(&existing)? == before {
                    return Ok(OperationResult::Unchanged);
                }
                self.inner.replace(ar, &existing).await?;
                Ok(OperationResult::Updated)
            }
            None => {
                let mut obj = obj;
                mutate(&mut obj);
                self.inner.create(ar, &obj).await?;
                Ok(OperationResult::Created)
            }
        }
    }
}
