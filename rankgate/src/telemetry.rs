//! Structured logging, with optional OpenTelemetry trace export.
//!
//! Logs always go to stdout through the `fmt` layer, filtered by `RUST_LOG` (default `info`).
//! Admission decisions are logged at `debug` under the `rankgate::pipeline` target, so
//! `RUST_LOG=info,rankgate::pipeline=debug` shows every accept and reject.
//!
//! OTLP export is off unless `enable_otel_export` is set. The exporter then reads the standard
//! variables:
//!
//! - `OTEL_SERVICE_NAME` (default `rankgate`)
//! - `OTEL_EXPORTER_OTLP_ENDPOINT` (default `http://localhost:4318`)
//! - `OTEL_EXPORTER_OTLP_PROTOCOL`: `http/protobuf` (default) or `http/json`
//! - `OTEL_EXPORTER_OTLP_HEADERS`: comma-separated `key=value` pairs, `%20` decoded to a space
//!
//! If the exporter cannot be built the service still starts, logging to stdout only.

use opentelemetry::KeyValue;
use opentelemetry::trace::TracerProvider as _;
use opentelemetry_otlp::{Protocol, WithExportConfig, WithHttpConfig};
use opentelemetry_sdk::trace::{SdkTracerProvider, Tracer};
use std::collections::HashMap;
use std::sync::OnceLock;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Kept so spans can be flushed on shutdown; `tracing-opentelemetry` only holds the tracer.
static TRACER_PROVIDER: OnceLock<SdkTracerProvider> = OnceLock::new();

/// OTLP exporter settings read from the environment.
#[derive(Debug, Clone, PartialEq)]
struct OtlpSettings {
    service_name: String,
    endpoint: String,
    protocol: Protocol,
    headers: HashMap<String, String>,
}

impl OtlpSettings {
    fn from_env() -> Self {
        let var = |name: &str| std::env::var(name).ok().filter(|v| !v.is_empty());

        Self {
            service_name: var("OTEL_SERVICE_NAME").unwrap_or_else(|| "rankgate".to_string()),
            endpoint: var("OTEL_EXPORTER_OTLP_ENDPOINT").unwrap_or_else(|| "http://localhost:4318".to_string()),
            protocol: match var("OTEL_EXPORTER_OTLP_PROTOCOL").as_deref() {
                Some("http/json") => Protocol::HttpJson,
                _ => Protocol::HttpBinary,
            },
            headers: var("OTEL_EXPORTER_OTLP_HEADERS").map(|raw| parse_headers(&raw)).unwrap_or_default(),
        }
    }

    fn tracer(self) -> anyhow::Result<Tracer> {
        let exporter = opentelemetry_otlp::SpanExporter::builder()
            .with_http()
            .with_endpoint(&self.endpoint)
            .with_protocol(self.protocol)
            .with_headers(self.headers)
            .build()?;

        let provider = SdkTracerProvider::builder()
            .with_batch_exporter(exporter)
            .with_resource(
                opentelemetry_sdk::Resource::builder()
                    .with_attribute(KeyValue::new("service.name", self.service_name.clone()))
                    .build(),
            )
            .build();

        let tracer = provider.tracer(self.service_name);
        let _ = TRACER_PROVIDER.set(provider);
        Ok(tracer)
    }
}

fn parse_headers(raw: &str) -> HashMap<String, String> {
    raw.replace("%20", " ")
        .split(',')
        .filter_map(|pair| pair.split_once('='))
        .map(|(key, value)| (key.trim().to_string(), value.trim().to_string()))
        .filter(|(key, _)| !key.is_empty())
        .collect()
}

/// Install the global subscriber. Call once, before anything logs.
pub fn init_telemetry(enable_otel_export: bool) -> anyhow::Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let (tracer, otel_error) = if enable_otel_export {
        let settings = OtlpSettings::from_env();
        let endpoint = settings.endpoint.clone();
        match settings.tracer() {
            Ok(tracer) => (Some((tracer, endpoint)), None),
            Err(e) => (None, Some(e)),
        }
    } else {
        (None, None)
    };

    let endpoint = tracer.as_ref().map(|(_, endpoint)| endpoint.clone());
    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .with(tracer.map(|(tracer, _)| tracing_opentelemetry::layer().with_tracer(tracer)))
        .try_init()?;

    match (endpoint, otel_error) {
        (Some(endpoint), _) => info!(%endpoint, "Telemetry initialized with OTLP export"),
        (None, Some(e)) => warn!(error = %e, "OTLP export requested but unavailable, logging to stdout only"),
        (None, None) => info!("Telemetry initialized (OTLP export disabled)"),
    }

    Ok(())
}

/// Flush pending spans. Call before exit.
pub fn shutdown_telemetry() {
    if let Some(provider) = TRACER_PROVIDER.get()
        && let Err(e) = provider.shutdown()
    {
        tracing::error!("Failed to shutdown tracer provider: {}", e);
    }
}
