// Copyright 2026 Verrazzano Maintainers
// SPDX-License-Identifier: Apache-2.0

use async_trait::async_trait;
use kube::api::{
    Api, ApiResource, DeleteParams, DynamicObject, ListParams, Patch, PatchParams, PostParams,
    TypeMeta,
};
use kube::Client;
use serde_json::json;
use tracing::{debug, instrument};

use super::ClusterClient;
use crate::Result;

/// [`ClusterClient`] backed by a `kube` client
#[derive(Clone)]
pub struct KubeClusterClient {
    client: Client,
}

impl KubeClusterClient {
    /// Wraps a `kube` client
    #[must_use]
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn api(&self, ar: &ApiResource, namespace: Option<&str>) -> Api<DynamicObject> {
        match namespace {
            Some(ns) => Api::namespaced_with(self.client.clone(), ns, ar),
            None => Api::all_with(self.client.clone(), ar),
        }
    }
}

// Built-in types come back from list calls without their type meta.
fn with_types(mut obj: DynamicObject, ar: &ApiResource) -> DynamicObject {
    if obj.types.is_none() {
        obj.types = Some(TypeMeta {
            api_version: ar.api_version.clone(),
            kind: ar.kind.clone(),
        });
    }
    obj
}

#[async_trait]
impl ClusterClient for KubeClusterClient {
    #[instrument(skip(self, ar), fields(kind = %ar.kind))]
    async fn get(
        &self,
        ar: &ApiResource,
        namespace: Option<&str>,
        name: &str,
    ) -> Result<Option<DynamicObject>> {
        let obj = self.api(ar, namespace).get_opt(name).await?;
        Ok(obj.map(|o| with_types(o, ar)))
    }

    #[instrument(skip(self, ar), fields(kind = %ar.kind))]
    async fn list(
        &self,
        ar: &ApiResource,
        namespace: Option<&str>,
        label_selector: Option<&str>,
    ) -> Result<Vec<DynamicObject>> {
        let mut params = ListParams::default();
        if let Some(selector) = label_selector {
            params = params.labels(selector);
        }
        let list = self.api(ar, namespace).list(&params).await?;
        Ok(list.items.into_iter().map(|o| with_types(o, ar)).collect())
    }

    async fn create(&self, ar: &ApiResource, obj: &DynamicObject) -> Result<DynamicObject> {
        let created = self
            .api(ar, obj.metadata.namespace.as_deref())
            .create(&PostParams::default(), obj)
            .await?;
        debug!(kind = %ar.kind, name = created.metadata.name.as_deref(), "created object");
        Ok(with_types(created, ar))
    }

    async fn replace(&self, ar: &ApiResource, obj: &DynamicObject) -> Result<DynamicObject> {
        let name = obj.metadata.name.clone().unwrap_or_default();
        let replaced = self
            .api(ar, obj.metadata.namespace.as_deref())
            .replace(&name, &PostParams::default(), obj)
            .await?;
        debug!(kind = %ar.kind, name = %name, "replaced object");
        Ok(with_types(replaced, ar))
    }

    async fn patch_status(
        &self,
        ar: &ApiResource,
        namespace: Option<&str>,
        name: &str,
        status: serde_json::Value,
        resource_version: Option<String>,
    ) -> Result<DynamicObject> {
        let mut patch = json!({ "status": status });
        if let Some(rv) = resource_version {
            patch["metadata"] = json!({ "resourceVersion": rv });
        }
        let patched = self
            .api(ar, namespace)
            .patch_status(name, &PatchParams::default(), &Patch::Merge(patch))
            .await?;
        Ok(with_types(patched, ar))
    }

    async fn delete(&self, ar: &ApiResource, namespace: Option<&str>, name: &str) -> Result<bool> {
        match self
            .api(ar, namespace)
            .delete(name, &DeleteParams::default())
            .await
        {
            Ok(_) => {
                debug!(kind = %ar.kind, name = %name, "deleted object");
                Ok(true)
            }
            Err(kube::Error::Api(e)) if e.code == 404 => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use http::{Request, Response, StatusCode};
    use k8s_openapi::api::core::v1::Secret;
    use kube::client::Body;
    use serde_json::json;
    use tower_test::mock;

    use crate::client::{ClusterApi, ClusterClient, api_resource};

    use super::KubeClusterClient;

    fn mock_client() -> (KubeClusterClient, mock::Handle<Request<Body>, Response<Body>>) {
        let (service, handle) = mock::pair::<Request<Body>, Response<Body>>();
        (
            KubeClusterClient::new(kube::Client::new(service, "default")),
            handle,
        )
    }

    #[tokio::test]
    async fn missing_object_maps_to_none() {
        let (client, mut handle) = mock_client();
        let server = tokio::spawn(async move {
            let (request, send) = handle.next_request().await.unwrap();
            assert_eq!(
                request.uri().path(),
                "/api/v1/namespaces/verrazzano-system/secrets/verrazzano-cluster-agent"
            );
            let body = json!({
                "kind": "Status",
                "apiVersion": "v1",
                "metadata": {},
                "status": "Failure",
                "message": "secrets \"verrazzano-cluster-agent\" not found",
                "reason": "NotFound",
                "code": 404
            });
            send.send_response(
                Response::builder()
                    .status(StatusCode::NOT_FOUND)
                    .body(Body::from(serde_json::to_vec(&body).unwrap()))
                    .unwrap(),
            );
        });

        let found = client
            .get(
                &api_resource::<Secret>(),
                Some("verrazzano-system"),
                "verrazzano-cluster-agent",
            )
            .await
            .unwrap();
        assert!(found.is_none());
        server.await.unwrap();
    }

    #[tokio::test]
    async fn listed_builtin_objects_are_typed() {
        let (client, mut handle) = mock_client();
        let server = tokio::spawn(async move {
            let (request, send) = handle.next_request().await.unwrap();
            assert_eq!(request.uri().path(), "/api/v1/namespaces/ns1/secrets");
            assert!(
                request
                    .uri()
                    .query()
                    .unwrap()
                    .contains("labelSelector=verrazzano-managed%3Dtrue")
            );
            let body = json!({
                "kind": "SecretList",
                "apiVersion": "v1",
                "metadata": {"resourceVersion": "10"},
                "items": [{
                    "metadata": {"name": "s1", "namespace": "ns1", "resourceVersion": "9"},
                    "data": {"username": "YWRtaW4="}
                }]
            });
            send.send_response(
                Response::builder()
                    .body(Body::from(serde_json::to_vec(&body).unwrap()))
                    .unwrap(),
            );
        });

        let api = ClusterApi::new(std::sync::Arc::new(client));
        let secrets: Vec<Secret> = api
            .list(Some("ns1"), Some("verrazzano-managed=true"))
            .await
            .unwrap();
        assert_eq!(secrets.len(), 1);
        assert_eq!(secrets[0].data.as_ref().unwrap()["username"].0, b"admin");
        server.await.unwrap();
    }
}
