// Copyright 2026 Verrazzano Maintainers
// SPDX-License-Identifier: Apache-2.0

//! Local controllers materialising multi-cluster resources on this cluster

pub mod multicluster;
pub mod project;

use std::sync::Arc;

use futures::StreamExt;
use k8s_openapi::api::core::v1::ObjectReference;
use k8s_openapi::chrono::Utc;
use kube::api::ListParams;
use kube::runtime::Controller;
use kube::runtime::controller::Action;
use kube::runtime::events::{Event, EventType, Recorder};
use kube::runtime::watcher::Config;
use kube::{Api, Client, Resource, ResourceExt};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::sync::{RwLock, mpsc};
use tracing::{Span, debug, error, field, info, instrument, warn};
use verrazzano_crd::{
    MultiClusterApplicationConfiguration, MultiClusterComponent, MultiClusterConfigMap,
    MultiClusterResource, MultiClusterSecret, VerrazzanoProject,
};

use self::multicluster::Materialized;
use crate::client::ClusterApi;
use crate::clusters::{StatusUpdateMessage, random_requeue_delay};
use crate::diagnostics::{Diagnostics, State};
use crate::{Error, Result, telemetry};

/// What a reconcile needs to reach the local cluster and the agent
#[derive(Clone, Debug)]
pub struct ReconcileContext {
    /// Local cluster
    pub client: ClusterApi,
    /// Status updates forwarded to the admin cluster, absent on the admin cluster itself
    pub agent_channel: Option<mpsc::Sender<StatusUpdateMessage>>,
}

/// Context for our reconcilers
#[derive(Clone)]
pub struct Context {
    /// Kubernetes client
    pub client: Client,
    /// Cluster access and agent channel used by the reconcile functions
    pub reconcile: ReconcileContext,
    /// Diagnostics exposed by the web server
    pub diagnostics: Arc<RwLock<Diagnostics>>,
    /// Kubernetes event emitter
    pub recorder: Recorder,
}

impl State {
    /// Converts the application state to controller context
    pub async fn to_ctrl_context(
        &self,
        client: Client,
        agent_channel: Option<mpsc::Sender<StatusUpdateMessage>>,
    ) -> Arc<Context> {
        Arc::new(Context {
            recorder: self.diagnostics.read().await.recorder(client.clone()),
            reconcile: ReconcileContext {
                client: ClusterApi::from_kube(client.clone()),
                agent_channel,
            },
            client,
            diagnostics: self.diagnostics.clone(),
        })
    }
}

/// Adds `finalizer` to `obj` if missing, returns the stored object
///
/// # Errors
/// Fails when the object cannot be updated
pub async fn add_finalizer<K>(client: &ClusterApi, mut obj: K, finalizer: &str) -> Result<K>
where
    K: Resource<DynamicType = ()> + Serialize + DeserializeOwned,
{
    if obj.finalizers().iter().any(|f| f == finalizer) {
        return Ok(obj);
    }
    obj.finalizers_mut().push(finalizer.to_string());
    client.replace(&obj).await
}

/// Removes `finalizer` from `obj` if present, returns the stored object
///
/// # Errors
/// Fails when the object cannot be updated
pub async fn remove_finalizer<K>(client: &ClusterApi, mut obj: K, finalizer: &str) -> Result<K>
where
    K: Resource<DynamicType = ()> + Serialize + DeserializeOwned,
{
    if !obj.finalizers().iter().any(|f| f == finalizer) {
        return Ok(obj);
    }
    obj.finalizers_mut().retain(|f| f != finalizer);
    client.replace(&obj).await
}

/// Starts the local controllers and runs them until shutdown
#[instrument(skip(state, client, agent_channel))]
pub async fn run(
    state: State,
    client: Client,
    agent_channel: Option<mpsc::Sender<StatusUpdateMessage>>,
) {
    info!("initializing multi-cluster controllers");
    let ctx = state.to_ctrl_context(client.clone(), agent_channel).await;

    tokio::join!(
        watch::<MultiClusterSecret, _, _>(client.clone(), ctx.clone(), reconcile_multi_cluster),
        watch::<MultiClusterConfigMap, _, _>(client.clone(), ctx.clone(), reconcile_multi_cluster),
        watch::<MultiClusterComponent, _, _>(client.clone(), ctx.clone(), reconcile_multi_cluster),
        watch::<MultiClusterApplicationConfiguration, _, _>(
            client.clone(),
            ctx.clone(),
            reconcile_multi_cluster
        ),
        watch::<VerrazzanoProject, _, _>(client, ctx, reconcile_verrazzano_project),
    );

    info!("controllers shutdown complete");
}

async fn watch<K, F, Fut>(client: Client, ctx: Arc<Context>, reconciler: F)
where
    K: MultiClusterResource,
    F: FnMut(Arc<K>, Arc<Context>) -> Fut,
    Fut: Future<Output = Result<Action>> + Send + 'static,
{
    let api = Api::<K>::all(client);
    if let Err(e) = api.list(&ListParams::default().limit(1)).await {
        error!(
            kind = %K::KIND,
            error = %e,
            "failed to list resources, CRD may not be installed"
        );
        return;
    }

    info!(kind = %K::KIND, "CRD verified, starting controller");

    Controller::new(api, Config::default().any_semantic())
        .shutdown_on_signal()
        .run(reconciler, error_policy::<K>, ctx)
        .filter_map(|x| async move { std::result::Result::ok(x) })
        .for_each(|_| futures::future::ready(()))
        .await;
}

fn record_trace_id() {
    let trace_id = telemetry::get_trace_id();
    if trace_id != opentelemetry::trace::TraceId::INVALID {
        Span::current().record("trace_id", field::display(&trace_id));
    }
}

#[instrument(skip(doc, ctx), fields(
    kind = %K::KIND,
    name = %doc.name_any(),
    namespace = doc.namespace().as_deref(),
    trace_id = field::Empty,
))]
#[allow(clippy::needless_pass_by_value)]
async fn reconcile_multi_cluster<K: Materialized>(doc: Arc<K>, ctx: Arc<Context>) -> Result<Action> {
    record_trace_id();
    debug!("starting reconciliation");

    let action = multicluster::reconcile_resource(doc.as_ref(), &ctx.reconcile).await?;
    ctx.diagnostics.write().await.last_event = Utc::now();
    Ok(action)
}

#[instrument(skip(doc, ctx), fields(
    name = %doc.name_any(),
    namespace = doc.namespace().as_deref(),
    trace_id = field::Empty,
))]
#[allow(clippy::needless_pass_by_value)]
async fn reconcile_verrazzano_project(doc: Arc<VerrazzanoProject>, ctx: Arc<Context>) -> Result<Action> {
    record_trace_id();
    debug!("starting reconciliation");

    let action = project::reconcile_project(doc.as_ref(), &ctx.reconcile).await?;
    if action == Action::await_change() {
        publish_event(
            &ctx.recorder,
            EventType::Normal,
            "ProjectSynced",
            "Reconcile",
            Some("Namespaces, role bindings and network policies are up to date".into()),
            &doc.object_ref(&()),
        )
        .await;
    }
    ctx.diagnostics.write().await.last_event = Utc::now();
    Ok(action)
}

#[instrument(skip(object, err, ctx), fields(
    kind = %K::KIND,
    name = %object.name_any(),
    namespace = object.namespace().as_deref(),
    error_type = ?err,
))]
#[allow(clippy::needless_pass_by_value)]
fn error_policy<K: MultiClusterResource>(object: Arc<K>, err: &Error, ctx: Arc<Context>) -> Action {
    let err_msg = err.to_string();
    let delay = random_requeue_delay();

    error!(
        error = %err_msg,
        requeue_after_secs = delay.as_secs(),
        "reconciliation failed, scheduling retry"
    );

    let oref = object.object_ref(&());
    tokio::spawn(async move {
        publish_event(
            &ctx.recorder,
            EventType::Warning,
            "ReconciliationFailed",
            "Reconcile",
            Some(format!("Error: {err_msg}")),
            &oref,
        )
        .await;
    });

    Action::requeue(delay)
}

/// Helper function to publish a Kubernetes event
async fn publish_event(
    recorder: &Recorder,
    event_type: EventType,
    reason: impl Into<String>,
    action: impl Into<String>,
    note: Option<String>,
    oref: &ObjectReference,
) {
    let reason = reason.into();
    if let Err(e) = recorder
        .publish(
            &Event {
                type_: event_type,
                reason: reason.clone(),
                note,
                action: action.into(),
                secondary: None,
            },
            oref,
        )
        .await
    {
        warn!(error = %e, reason = %reason, "failed to publish event");
    }
}
