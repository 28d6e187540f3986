// Copyright 2026 Verrazzano Maintainers
// SPDX-License-Identifier: Apache-2.0

//! In-memory [`ClusterClient`] used by unit tests

#![allow(clippy::unwrap_used, clippy::missing_panics_doc)]

use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use kube::Resource;
use kube::api::{ApiResource, DynamicObject, TypeMeta};
use serde::Serialize;
use serde::de::DeserializeOwned;

use super::{ClusterClient, api_resource, from_dynamic, to_dynamic};
use crate::{Error, Result};

type Key = (String, String, String);

/// Verbs that can be made to fail
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Verb {
    /// `get`
    Get,
    /// `list`
    List,
    /// `create`
    Create,
    /// `replace`
    Replace,
    /// `patch_status`
    PatchStatus,
    /// `delete`
    Delete,
}

/// Error injected by [`FakeClusterClient::fail`]
#[derive(Clone, Copy, Debug)]
pub enum Failure {
    /// API returns 404
    NotFound,
    /// API returns 409
    Conflict,
    /// API returns 403
    Forbidden,
    /// Any other failure
    Internal,
}

/// Objects live in a map keyed by kind, namespace and name
#[derive(Default)]
pub struct FakeClusterClient {
    objects: Mutex<BTreeMap<Key, DynamicObject>>,
    failures: Mutex<HashMap<(Verb, String), (Failure, usize)>>,
    calls: Mutex<HashMap<(Verb, String), usize>>,
    version: AtomicU64,
}

fn kind_key(ar: &ApiResource) -> String {
    format!("{}/{}", ar.api_version, ar.kind)
}

fn key(ar: &ApiResource, namespace: Option<&str>, name: &str) -> Key {
    (
        kind_key(ar),
        namespace.unwrap_or_default().to_string(),
        name.to_string(),
    )
}

fn matches_selector(obj: &DynamicObject, selector: Option<&str>) -> bool {
    let Some(selector) = selector else {
        return true;
    };
    let labels = obj.metadata.labels.clone().unwrap_or_default();
    selector
        .split(',')
        .filter(|term| !term.is_empty())
        .all(|term| match term.split_once('=') {
            Some((k, v)) => labels.get(k).map(String::as_str) == Some(v),
            None => labels.contains_key(term),
        })
}

impl FakeClusterClient {
    /// Seeds a typed object
    pub fn insert<K>(&self, obj: &K)
    where
        K: Resource<DynamicType = ()> + Serialize,
    {
        let ar = api_resource::<K>();
        let mut dynamic = to_dynamic(obj, &ar).unwrap();
        let meta = &mut dynamic.metadata;
        if meta.resource_version.is_none() {
            meta.resource_version = Some(self.next_version());
        }
        let k = key(
            &ar,
            meta.namespace.as_deref(),
            meta.name.as_deref().unwrap_or_default(),
        );
        self.objects.lock().unwrap().insert(k, dynamic);
    }

    /// Seeds an untyped object
    pub fn insert_dynamic(&self, ar: &ApiResource, mut obj: DynamicObject) {
        obj.types = Some(TypeMeta {
            api_version: ar.api_version.clone(),
            kind: ar.kind.clone(),
        });
        if obj.metadata.resource_version.is_none() {
            obj.metadata.resource_version = Some(self.next_version());
        }
        let k = key(
            ar,
            obj.metadata.namespace.as_deref(),
            obj.metadata.name.as_deref().unwrap_or_default(),
        );
        self.objects.lock().unwrap().insert(k, obj);
    }

    /// Reads a typed object back
    pub fn fetch<K>(&self, namespace: Option<&str>, name: &str) -> Option<K>
    where
        K: Resource<DynamicType = ()> + DeserializeOwned,
    {
        let k = key(&api_resource::<K>(), namespace, name);
        let obj = self.objects.lock().unwrap().get(&k).cloned()?;
        Some(from_dynamic(obj).unwrap())
    }

    /// Reads an untyped object back
    pub fn fetch_dynamic(
        &self,
        ar: &ApiResource,
        namespace: Option<&str>,
        name: &str,
    ) -> Option<DynamicObject> {
        self.objects
            .lock()
            .unwrap()
            .get(&key(ar, namespace, name))
            .cloned()
    }

    /// Number of stored objects of a typed kind
    pub fn count<K>(&self) -> usize
    where
        K: Resource<DynamicType = ()>,
    {
        let kind = kind_key(&api_resource::<K>());
        self.objects
            .lock()
            .unwrap()
            .keys()
            .filter(|(k, _, _)| *k == kind)
            .count()
    }

    /// Makes the next `times` calls of `verb` on `kind` fail
    pub fn fail(&self, verb: Verb, kind: &str, failure: Failure, times: usize) {
        self.failures
            .lock()
            .unwrap()
            .insert((verb, kind.to_string()), (failure, times));
    }

    /// Number of `verb` calls made on `kind`
    pub fn calls(&self, verb: Verb, kind: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .get(&(verb, kind.to_string()))
            .copied()
            .unwrap_or_default()
    }

    fn next_version(&self) -> String {
        (self.version.fetch_add(1, Ordering::SeqCst) + 1).to_string()
    }

    fn record(&self, verb: Verb, ar: &ApiResource, name: &str) -> Result<()> {
        *self
            .calls
            .lock()
            .unwrap()
            .entry((verb, ar.kind.clone()))
            .or_default() += 1;

        let mut failures = self.failures.lock().unwrap();
        let Some((failure, remaining)) = failures.get_mut(&(verb, ar.kind.clone())) else {
            return Ok(());
        };
        if *remaining == 0 {
            return Ok(());
        }
        *remaining -= 1;
        let target = format!("{} \"{name}\"", ar.plural);
        Err(match failure {
            Failure::NotFound => Error::NotFound(target),
            Failure::Conflict => Error::Conflict(target),
            Failure::Forbidden => Error::Forbidden(target),
            Failure::Internal => Error::Message(format!("internal error on {target}")),
        })
    }
}

#[async_trait]
impl ClusterClient for FakeClusterClient {
    async fn get(
        &self,
        ar: &ApiResource,
        namespace: Option<&str>,
        name: &str,
    ) -> Result<Option<DynamicObject>> {
        self.record(Verb::Get, ar, name)?;
        Ok(self.fetch_dynamic(ar, namespace, name))
    }

    async fn list(
        &self,
        ar: &ApiResource,
        namespace: Option<&str>,
        label_selector: Option<&str>,
    ) -> Result<Vec<DynamicObject>> {
        self.record(Verb::List, ar, "")?;
        let kind = kind_key(ar);
        Ok(self
            .objects
            .lock()
            .unwrap()
            .iter()
            .filter(|((k, ns, _), _)| *k == kind && namespace.is_none_or(|n| n == ns.as_str()))
            .map(|(_, obj)| obj.clone())
            .filter(|obj| matches_selector(obj, label_selector))
            .collect())
    }

    async fn create(&self, ar: &ApiResource, obj: &DynamicObject) -> Result<DynamicObject> {
        let name = obj.metadata.name.clone().unwrap_or_default();
        self.record(Verb::Create, ar, &name)?;
        let k = key(ar, obj.metadata.namespace.as_deref(), &name);
        let mut objects = self.objects.lock().unwrap();
        if objects.contains_key(&k) {
            return Err(Error::Message(format!(
                "{} \"{name}\" already exists",
                ar.plural
            )));
        }
        let mut created = obj.clone();
        created.types = Some(TypeMeta {
            api_version: ar.api_version.clone(),
            kind: ar.kind.clone(),
        });
        created.metadata.resource_version = Some(self.next_version());
        objects.insert(k, created.clone());
        Ok(created)
    }

    async fn replace(&self, ar: &ApiResource, obj: &DynamicObject) -> Result<DynamicObject> {
        let name = obj.metadata.name.clone().unwrap_or_default();
        self.record(Verb::Replace, ar, &name)?;
        let k = key(ar, obj.metadata.namespace.as_deref(), &name);
        let mut objects = self.objects.lock().unwrap();
        let Some(current) = objects.get(&k) else {
            return Err(Error::NotFound(format!("{} \"{name}\"", ar.plural)));
        };
        if obj.metadata.resource_version.is_some()
            && obj.metadata.resource_version != current.metadata.resource_version
        {
            return Err(Error::Conflict(format!("{} \"{name}\"", ar.plural)));
        }
        let mut replaced = obj.clone();
        replaced.types = current.types.clone();
        replaced.metadata.resource_version = Some(self.next_version());
        objects.insert(k, replaced.clone());
        Ok(replaced)
    }

    async fn patch_status(
        &self,
        ar: &ApiResource,
        namespace: Option<&str>,
        name: &str,
        status: serde_json::Value,
        resource_version: Option<String>,
    ) -> Result<DynamicObject> {
        self.record(Verb::PatchStatus, ar, name)?;
        let k = key(ar, namespace, name);
        let mut objects = self.objects.lock().unwrap();
        let Some(current) = objects.get_mut(&k) else {
            return Err(Error::NotFound(format!("{} \"{name}\"", ar.plural)));
        };
        if resource_version.is_some() && resource_version != current.metadata.resource_version {
            return Err(Error::Conflict(format!("{} \"{name}\"", ar.plural)));
        }
        if !current.data.is_object() {
            current.data = serde_json::json!({});
        }
        current.data["status"] = status;
        current.metadata.resource_version = Some(self.next_version());
        Ok(current.clone())
    }

    async fn delete(&self, ar: &ApiResource, namespace: Option<&str>, name: &str) -> Result<bool> {
        self.record(Verb::Delete, ar, name)?;
        Ok(self
            .objects
            .lock()
            .unwrap()
            .remove(&key(ar, namespace, name))
            .is_some())
    }
}
