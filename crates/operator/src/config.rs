// Copyright 2026 Verrazzano Maintainers
// SPDX-License-Identifier: Apache-2.0

//! Command line and environment configuration

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};

/// Verrazzano multi-cluster operators
#[derive(Parser, Debug, Clone)]
#[command(name = "verrazzano", version, about)]
pub struct Cli {
    /// Address of the health and diagnostics server
    #[arg(long, env = "HEALTH_ADDR", default_value = "0.0.0.0:8080")]
    pub health_addr: SocketAddr,

    /// Identity used when acquiring leases
    #[arg(long, env = "HOSTNAME", default_value = "unknown")]
    pub holder_id: String,

    /// Run mode
    #[command(subcommand)]
    pub command: Command,
}

/// Run modes of the binary
#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Multi-cluster agent and the local multi-cluster controllers
    Agent(AgentArgs),
    /// Validating admission webhooks
    Webhooks(WebhookArgs),
    /// MySQL operator repair loop
    MysqlRepair(MysqlRepairArgs),
}

/// Options of the multi-cluster agent
#[derive(Args, Debug, Clone)]
pub struct AgentArgs {
    /// Seconds between two sync iterations
    #[arg(long, env = "AGENT_POLL_INTERVAL_SECS", default_value_t = 60)]
    pub poll_interval_secs: u64,

    /// Status updates pushed to the admin cluster per namespace
    #[arg(long, env = "AGENT_STATUS_BATCH_SIZE", default_value_t = 10)]
    pub status_batch_size: usize,

    /// Buffered status updates before new ones are dropped
    #[arg(long, env = "AGENT_STATUS_CHANNEL_CAPACITY", default_value_t = 50)]
    pub status_channel_capacity: usize,

    /// Seconds between two status update attempts on conflict
    #[arg(long, env = "AGENT_STATUS_RETRY_DELAY_SECS", default_value_t = 3)]
    pub status_retry_delay_secs: u64,

    /// Lease guarding the agent loop
    #[arg(long, env = "AGENT_LEASE_NAME", default_value = "verrazzano-mc-agent")]
    pub lease_name: String,
}

impl AgentArgs {
    /// Poll interval as a duration
    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    /// Status retry delay as a duration
    #[must_use]
    pub fn status_retry_delay(&self) -> Duration {
        Duration::from_secs(self.status_retry_delay_secs)
    }
}

/// Options of the webhook server
#[derive(Args, Debug, Clone)]
pub struct WebhookArgs {
    /// HTTPS bind address
    #[arg(long, env = "WEBHOOK_ADDR", default_value = "0.0.0.0:9443")]
    pub bind_addr: SocketAddr,

    /// PEM encoded certificate chain
    #[arg(long, env = "WEBHOOK_TLS_CERT", default_value = "/etc/webhook/certs/tls.crt")]
    pub tls_cert: PathBuf,

    /// PEM encoded private key
    #[arg(long, env = "WEBHOOK_TLS_KEY", default_value = "/etc/webhook/certs/tls.key")]
    pub tls_key: PathBuf,
}

/// Options of the MySQL repair loop
#[derive(Args, Debug, Clone)]
pub struct MysqlRepairArgs {
    /// Seconds between two checks
    #[arg(long, env = "MYSQL_CHECK_INTERVAL_SECS", default_value_t = 30)]
    pub check_interval_secs: u64,

    /// Seconds a condition may persist before the operator is recycled
    #[arg(long, env = "MYSQL_REPAIR_TIMEOUT_SECS", default_value_t = 300)]
    pub repair_timeout_secs: u64,

    /// Lease guarding the repair loop
    #[arg(long, env = "MYSQL_LEASE_NAME", default_value = "verrazzano-mysql-repair")]
    pub lease_name: String,
}

impl MysqlRepairArgs {
    /// Check interval as a duration
    #[must_use]
    pub fn check_interval(&self) -> Duration {
        Duration::from_secs(self.check_interval_secs)
    }

    /// Repair timeout as a duration
    #[must_use]
    pub fn repair_timeout(&self) -> Duration {
        Duration::from_secs(self.repair_timeout_secs)
    }
}
