// Copyright 2026 Verrazzano Maintainers
// SPDX-License-Identifier: Apache-2.0

//! Operator entrypoint

use std::net::SocketAddr;
use std::sync::Arc;

use actix_web::{
    App, HttpRequest, HttpResponse, HttpServer, Responder, get, middleware, web::Data,
};
use clap::Parser;
use kube::Client;
use tokio::sync::{mpsc, watch};
use tracing::{info, instrument, warn};
use verrazzano::agent::{KubeconfigClientFactory, Syncer};
use verrazzano::client::ClusterApi;
use verrazzano::config::{Cli, Command};
use verrazzano::lease::{LeaseParams, run_leader_election};
use verrazzano::mysql::MysqlRepair;
use verrazzano::{State, controller, telemetry, webhook};

#[get("/health")]
async fn health(_: HttpRequest) -> impl Responder {
    HttpResponse::Ok().json("healthy")
}

#[get("/")]
async fn index(c: Data<State>, _: HttpRequest) -> impl Responder {
    let d = c.diagnostics().await;
    HttpResponse::Ok().json(&d)
}

async fn serve_health(state: State, addr: SocketAddr) -> std::io::Result<()> {
    HttpServer::new(move || {
        App::new()
            .app_data(Data::new(state.clone()))
            .wrap(middleware::Logger::default().exclude("/health"))
            .service(health)
            .service(index)
    })
    .bind(addr)?
    .shutdown_timeout(5)
    .run()
    .await
}

#[tokio::main]
#[instrument(level = "info", target = "operator::main", name = "main")]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    telemetry::init(env!("CARGO_PKG_NAME"))?;
    if rustls::crypto::ring::default_provider().install_default().is_err() {
        warn!("rustls crypto provider already installed");
    }

    let state = State::default();
    let client = Client::try_default().await?;
    let health_server = serve_health(state.clone(), cli.health_addr);

    match cli.command {
        Command::Agent(args) => {
            info!("starting in agent mode");
            let (leader_tx, leader_rx) = watch::channel(false);
            let election = run_leader_election(
                client.clone(),
                LeaseParams {
                    lease_name: args.lease_name.clone(),
                    holder_id: cli.holder_id,
                },
                leader_tx,
            );

            let (status_tx, status_rx) = mpsc::channel(args.status_channel_capacity);
            let syncer = Syncer::new(
                ClusterApi::from_kube(client.clone()),
                Arc::new(KubeconfigClientFactory),
                status_rx,
                &args,
            );
            let controllers = controller::run(state.clone(), client, Some(status_tx));
            let agent = syncer.run(state, leader_rx, args.poll_interval());

            tokio::select! {
                r = health_server => r?,
                () = async { tokio::join!(controllers, agent, election); } => {},
            }
        }
        Command::Webhooks(args) => {
            info!("starting in webhooks mode");
            let webhooks = webhook::run(ClusterApi::from_kube(client), &args);
            let (h, w) = tokio::join!(health_server, webhooks);
            h?;
            w?;
        }
        Command::MysqlRepair(args) => {
            info!("starting in mysql-repair mode");
            let (leader_tx, leader_rx) = watch::channel(false);
            let election = run_leader_election(
                client.clone(),
                LeaseParams {
                    lease_name: args.lease_name.clone(),
                    holder_id: cli.holder_id,
                },
                leader_tx,
            );
            let repair = MysqlRepair::new(ClusterApi::from_kube(client), args.repair_timeout())
                .run(state, leader_rx, args.check_interval());

            tokio::select! {
                r = health_server => r?,
                () = async { tokio::join!(repair, election); } => {},
            }
        }
    }
    Ok(())
}
