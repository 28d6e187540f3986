// Copyright 2026 Verrazzano Maintainers
// SPDX-License-Identifier: Apache-2.0

//! Validating admission webhooks of the multi-cluster kinds

use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::sync::Arc;

use actix_web::web::{Data, Json, JsonConfig};
use actix_web::{App, HttpResponse, HttpServer, Responder, middleware, post};
use async_trait::async_trait;
use kube::ResourceExt;
use kube::api::DynamicObject;
use kube::core::admission::{AdmissionRequest, AdmissionResponse, AdmissionReview, Operation};
use rustls::ServerConfig;
use rustls::pki_types::CertificateDer;
use serde::de::DeserializeOwned;
use tracing::{debug, error, info, instrument, warn};
use verrazzano_crd::{
    MultiClusterApplicationConfiguration, MultiClusterComponent, MultiClusterConfigMap,
    MultiClusterSecret, VerrazzanoProject,
};

use crate::client::{ClusterApi, from_dynamic};
use crate::config::WebhookArgs;
use crate::{Error, Result};

pub mod validation;

/// Shared by every webhook handler
pub struct WebhookState {
    /// Client of the cluster the webhooks run in
    pub client: ClusterApi,
}

/// An object checked on create and update
#[async_trait]
pub trait Validator: DeserializeOwned + Send + Sync {
    /// Checks the object against the cluster state
    async fn validate(&self, client: &ClusterApi) -> Result<()>;
}

#[async_trait]
impl Validator for VerrazzanoProject {
    async fn validate(&self, client: &ClusterApi) -> Result<()> {
        validation::validate_project(client, self).await
    }
}

#[async_trait]
impl Validator for MultiClusterApplicationConfiguration {
    async fn validate(&self, client: &ClusterApi) -> Result<()> {
        validation::validate_multi_cluster(client, self).await?;
        validation::validate_secrets(client, self).await
    }
}

macro_rules! impl_multi_cluster_validator {
    ($($kind:ty),*) => {
        $(
            #[async_trait]
            impl Validator for $kind {
                async fn validate(&self, client: &ClusterApi) -> Result<()> {
                    validation::validate_multi_cluster(client, self).await
                }
            }
        )*
    };
}

impl_multi_cluster_validator!(MultiClusterSecret, MultiClusterConfigMap, MultiClusterComponent);

/// Answers an admission review for `K`, deletes are always allowed
pub async fn admit<K: Validator>(
    client: &ClusterApi,
    review: AdmissionReview<DynamicObject>,
) -> AdmissionReview<DynamicObject> {
    let req: AdmissionRequest<DynamicObject> = match review.try_into() {
        Ok(req) => req,
        Err(e) => {
            error!(error = %e, "invalid admission review");
            return AdmissionResponse::invalid(e.to_string()).into_review();
        }
    };

    let response = AdmissionResponse::from(&req);
    if matches!(req.operation, Operation::Delete) {
        return response.into_review();
    }
    let Some(obj) = req.object else {
        debug!(uid = %req.uid, "no object in request, allowing");
        return response.into_review();
    };

    let name = obj.name_any();
    let verdict = match from_dynamic::<K>(obj) {
        Ok(typed) => typed.validate(client).await,
        Err(e) => Err(e),
    };
    match verdict {
        Ok(()) => {
            debug!(name, operation = ?req.operation, "admitted");
            response.into_review()
        }
        Err(e) => {
            warn!(name, operation = ?req.operation, error = %e, "denied");
            response.deny(e.to_string()).into_review()
        }
    }
}

#[post("/validate-verrazzanoproject")]
async fn verrazzano_project(
    state: Data<WebhookState>,
    review: Json<AdmissionReview<DynamicObject>>,
) -> impl Responder {
    HttpResponse::Ok().json(admit::<VerrazzanoProject>(&state.client, review.into_inner()).await)
}

#[post("/validate-multiclusterapplicationconfiguration")]
async fn multi_cluster_application_configuration(
    state: Data<WebhookState>,
    review: Json<AdmissionReview<DynamicObject>>,
) -> impl Responder {
    HttpResponse::Ok().json(
        admit::<MultiClusterApplicationConfiguration>(&state.client, review.into_inner()).await,
    )
}

#[post("/validate-multiclustersecret")]
async fn multi_cluster_secret(
    state: Data<WebhookState>,
    review: Json<AdmissionReview<DynamicObject>>,
) -> impl Responder {
    HttpResponse::Ok().json(admit::<MultiClusterSecret>(&state.client, review.into_inner()).await)
}

#[post("/validate-multiclusterconfigmap")]
async fn multi_cluster_config_map(
    state: Data<WebhookState>,
    review: Json<AdmissionReview<DynamicObject>>,
) -> impl Responder {
    HttpResponse::Ok().json(admit::<MultiClusterConfigMap>(&state.client, review.into_inner()).await)
}

#[post("/validate-multiclustercomponent")]
async fn multi_cluster_component(
    state: Data<WebhookState>,
    review: Json<AdmissionReview<DynamicObject>>,
) -> impl Responder {
    HttpResponse::Ok().json(admit::<MultiClusterComponent>(&state.client, review.into_inner()).await)
}

/// Loads the serving certificate chain and key
///
/// # Errors
/// Fails when either file is unreadable or holds no PEM material
pub fn load_tls_config(cert: &Path, key: &Path) -> Result<ServerConfig> {
    let mut reader = BufReader::new(File::open(cert)?);
    let certs = rustls_pemfile::certs(&mut reader).collect::<std::result::Result<Vec<CertificateDer<'static>>, _>>()?;
    if certs.is_empty() {
        return Err(Error::Message(format!("no certificate found in {}", cert.display())));
    }

    let mut reader = BufReader::new(File::open(key)?);
    let key = rustls_pemfile::private_key(&mut reader)?
        .ok_or_else(|| Error::Message(format!("no private key found in {}", key.display())))?;

    Ok(
        ServerConfig::builder_with_provider(Arc::new(rustls::crypto::ring::default_provider()))
            .with_safe_default_protocol_versions()?
            .with_no_client_auth()
            .with_single_cert(certs, key)?,
    )
}

/// Serves the webhooks over HTTPS until shutdown
///
/// # Errors
/// Fails when the TLS material cannot be loaded or the address cannot be bound
#[instrument(skip_all, fields(addr = %args.bind_addr))]
pub async fn run(client: ClusterApi, args: &WebhookArgs) -> Result<()> {
    let tls = load_tls_config(&args.tls_cert, &args.tls_key)?;
    let state = Data::new(WebhookState { client });

    info!("starting admission webhooks");
    HttpServer::new(move || {
        App::new()
            .app_data(state.clone())
            .app_data(JsonConfig::default().limit(4 * 1024 * 1024))
            .wrap(middleware::Logger::default())
            .service(verrazzano_project)
            .service(multi_cluster_application_configuration)
            .service(multi_cluster_secret)
            .service(multi_cluster_config_map)
            .service(multi_cluster_component)
    })
    .bind_rustls_0_23(args.bind_addr, tls)?
    .shutdown_timeout(5)
    .run()
    .await?;
    Ok(())
}
