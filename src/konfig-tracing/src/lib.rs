use anyhow::Result;
use opentelemetry::KeyValue;
use opentelemetry::trace::TracerProvider;
use opentelemetry_otlp::{Protocol, WithExportConfig};
use opentelemetry_sdk::{trace as sdktrace, Resource};
use std::borrow::Cow;
use tracing_opentelemetry::OpenTelemetryLayer;
use tracing_subscriber::filter::EnvFilter;
use tracing_subscriber::fmt;
use tracing_subscriber::{prelude::*, Registry};

/// Keeps the exporter alive; dropping it flushes and shuts the provider down.
#[must_use = "dropping the guard stops span export"]
pub struct TracingGuard {
    provider: Option<sdktrace::SdkTracerProvider>,
}

impl Drop for TracingGuard {
    fn drop(&mut self) {
        if let Some(provider) = self.provider.take() {
            if let Err(e) = provider.shutdown() {
                eprintln!("tracer provider shutdown failed: {e}");
            }
        }
    }
}

/// `logging_mode` selects the output format (`json`, `pretty`, `compact`) or is
/// taken as a filter directive. `RUST_LOG` wins when set.
fn filter_for(logging_mode: &str) -> EnvFilter {
    let directive = match logging_mode {
        "json" | "pretty" | "compact" | "" => "info",
        other => other,
    };
    EnvFilter::try_new(directive).unwrap_or_else(|_| EnvFilter::new("info"))
}

fn otlp_provider(service_name: &str, endpoint: &str) -> Result<sdktrace::SdkTracerProvider> {
    let resource = Resource::builder()
        .with_service_name(Cow::Owned(service_name.to_string()))
        .with_attributes(vec![KeyValue::new("service.version", env!("CARGO_PKG_VERSION"))])
        .build();

    let exporter = opentelemetry_otlp::SpanExporter::builder()
        .with_http()
        .with_protocol(Protocol::HttpBinary)
        .with_endpoint(endpoint)
        .build()?;

    Ok(sdktrace::SdkTracerProvider::builder()
        .with_batch_exporter(exporter)
        .with_resource(resource)
        .build())
}

/// Installs the global subscriber: formatted logs on stderr, plus span export
/// when an OTLP endpoint is given.
pub fn init(service_name: &str, otlp_endpoint: Option<&str>, logging_mode: &str) -> Result<TracingGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| filter_for(logging_mode));

    let fmt_layer: Box<dyn tracing_subscriber::Layer<Registry> + Send + Sync> = match logging_mode {
        "json" => Box::new(
            fmt::layer()
                .json()
                .with_writer(std::io::stderr)
                .with_thread_ids(true)
                .with_thread_names(true)
                .with_filter(filter),
        ),
        "pretty" => Box::new(fmt::layer().pretty().with_writer(std::io::stderr).with_filter(filter)),
        _ => Box::new(fmt::layer().compact().with_writer(std::io::stderr).with_filter(filter)),
    };

    let provider = otlp_endpoint.map(|endpoint| otlp_provider(service_name, endpoint)).transpose()?;
    let otel_layer = provider
        .as_ref()
        .map(|provider| OpenTelemetryLayer::new(provider.tracer(Cow::Owned(service_name.to_string()))));

    let subscriber = Registry::default().with(fmt_layer).with(otel_layer);
    tracing::subscriber::set_global_default(subscriber)?;

    Ok(TracingGuard { provider })
}
