// Copyright 2026 Verrazzano Maintainers
// SPDX-License-Identifier: Apache-2.0

//! Logging and tracing setup shared by every run mode

use std::env;

use opentelemetry::KeyValue;
use opentelemetry::trace::{TraceContextExt as _, TraceId, TracerProvider};
use opentelemetry_otlp::SpanExporter;
use opentelemetry_resource_detectors::{K8sResourceDetector, ProcessResourceDetector};
use opentelemetry_sdk::Resource;
use opentelemetry_sdk::trace::{SdkTracer, SdkTracerProvider};
use tracing_opentelemetry::{OpenTelemetryLayer, OpenTelemetrySpanExt as _};
use tracing_subscriber::{EnvFilter, Layer, Registry, layer::SubscriberExt, util::SubscriberInitExt};

const LOG_LEVEL_ENV: &str = "LOG_LEVEL";
const LOG_FORMAT_ENV: &str = "LOG_FORMAT";
const OTLP_ENDPOINT_ENV: &str = "OTEL_EXPORTER_OTLP_ENDPOINT";
const DEFAULT_DIRECTIVE: &str = "info";

/// Output format of the fmt layer
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LogFormat {
    /// Human readable lines
    Text,
    /// One JSON object per event
    Json,
}

impl LogFormat {
    /// Reads `LOG_FORMAT`, anything other than `json` means text
    #[must_use]
    pub fn from_env() -> Self {
        match env::var(LOG_FORMAT_ENV) {
            Ok(v) if v.eq_ignore_ascii_case("json") => LogFormat::Json,
            _ => LogFormat::Text,
        }
    }
}

/// Trace id of the current span, [`TraceId::INVALID`] when no exporter is installed
#[must_use]
pub fn get_trace_id() -> TraceId {
    tracing::Span::current()
        .context()
        .span()
        .span_context()
        .trace_id()
}

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_env(LOG_LEVEL_ENV).unwrap_or_else(|_| EnvFilter::new(DEFAULT_DIRECTIVE))
}

fn otel_enabled() -> bool {
    env::var(OTLP_ENDPOINT_ENV).is_ok_and(|v| !v.is_empty())
}

fn resource(service_name: &str) -> Resource {
    Resource::builder()
        .with_detector(Box::new(K8sResourceDetector))
        .with_detector(Box::new(ProcessResourceDetector))
        .with_service_name(service_name.to_string())
        .with_attribute(KeyValue::new("service.version", env!("CARGO_PKG_VERSION")))
        .build()
}

fn init_tracer(service_name: &str) -> anyhow::Result<SdkTracer> {
    let exporter = SpanExporter::builder().with_tonic().build()?;
    let provider = SdkTracerProvider::builder()
        .with_resource(resource(service_name))
        .with_batch_exporter(exporter)
        .build();
    Ok(provider.tracer("verrazzano"))
}

/// Installs the global subscriber, exporting spans over OTLP when
/// `OTEL_EXPORTER_OTLP_ENDPOINT` is set
///
/// # Errors
/// Fails when a subscriber is already installed or the exporter cannot be built
pub fn init(service_name: &str) -> anyhow::Result<()> {
    let logger = match LogFormat::from_env() {
        LogFormat::Json => tracing_subscriber::fmt::layer().json().boxed(),
        LogFormat::Text => tracing_subscriber::fmt::layer().boxed(),
    };
    let reg = Registry::default().with(env_filter()).with(logger);

    if otel_enabled() {
        reg.with(OpenTelemetryLayer::new(init_tracer(service_name)?))
            .try_init()?;
    } else {
        reg.try_init()?;
    }
    Ok(())
}
