// Copyright 2026 Verrazzano Maintainers
// SPDX-License-Identifier: Apache-2.0

//! Operator internals

/// Generic Error for controller and agent lifecycle
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// Kubernetes internal error
    #[error("Kube Error: {0}")]
    KubeError(#[from] kube::Error),

    /// `serde` errors
    #[error("Serialization Error: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// Object does not exist
    #[error("{0} not found")]
    NotFound(String),

    /// Optimistic concurrency failure
    #[error("Operation cannot be fulfilled on {0}: the object has been modified")]
    Conflict(String),

    /// Caller is not allowed to access the object
    #[error("{0} is forbidden")]
    Forbidden(String),

    /// Admin kubeconfig could not be loaded
    #[error("Kubeconfig Error: {0}")]
    KubeconfigError(#[from] kube::config::KubeconfigError),

    /// Agent secret is missing required keys
    #[error("Invalid agent secret: {0}")]
    InvalidAgentSecret(String),

    /// Admission request rejected
    #[error("{0}")]
    Validation(String),

    /// Webhook TLS material could not be loaded
    #[error("TLS Error: {0}")]
    TlsError(#[from] rustls::Error),

    /// Filesystem errors
    #[error("IO Error: {0}")]
    IoError(#[from] std::io::Error),

    /// Generic string error messages
    #[error("{0}")]
    Message(String),
}

impl From<String> for Error {
    fn from(msg: String) -> Self {
        Error::Message(msg)
    }
}

impl Error {
    fn api_code(&self) -> Option<u16> {
        match self {
            Error::KubeError(kube::Error::Api(e)) => Some(e.code),
            _ => None,
        }
    }

    /// True when the object does not exist
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound(_)) || self.api_code() == Some(404)
    }

    /// True when an update lost a resource version race
    #[must_use]
    pub fn is_conflict(&self) -> bool {
        matches!(self, Error::Conflict(_)) || self.api_code() == Some(409)
    }

    /// True when the caller lacks permissions
    #[must_use]
    pub fn is_forbidden(&self) -> bool {
        matches!(self, Error::Forbidden(_)) || self.api_code() == Some(403)
    }
}

/// Generic result type to be used across the operator
pub type Result<T, E = Error> = std::result::Result<T, E>;

pub mod agent;
pub mod client;
pub mod clusters;
pub mod config;
pub mod constants;
pub mod controller;
mod diagnostics;
pub mod lease;
pub mod mysql;
pub mod telemetry;
#[cfg(test)]
mod test_support;
pub mod webhook;

pub use crate::diagnostics::*;
