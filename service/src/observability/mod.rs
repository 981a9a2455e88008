use clap::ValueEnum;
use opentelemetry::trace::TracerProvider as _;
use opentelemetry::global;
use opentelemetry_sdk::propagation::TraceContextPropagator;
use opentelemetry_sdk::trace::TracerProvider;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

pub mod propagators;

const TRACER_NAME: &str = "image-proxy";
const DEFAULT_FILTER: &str = "info";

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    /// Human readable lines.
    Pretty,
    /// One JSON object per line.
    Json,
    /// Cloud Logging structured entries: severity, span and event fields.
    Stackdriver,
}

/// Installs the global subscriber and tracer provider. The returned provider
/// must be shut down on exit so buffered spans get exported.
pub fn tracing_setup(format: LogFormat, export_spans: bool) -> anyhow::Result<TracerProvider> {
    let builder = TracerProvider::builder();
    let provider = if export_spans {
        builder
            .with_simple_exporter(opentelemetry_stdout::SpanExporter::default())
            .build()
    } else {
        builder.build()
    };

    global::set_text_map_propagator(TraceContextPropagator::new());
    global::set_tracer_provider(provider.clone());
    let tracer = provider.tracer(TRACER_NAME);

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    let registry = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_opentelemetry::layer().with_tracer(tracer));

    match format {
        LogFormat::Pretty => registry.with(fmt::layer()).try_init()?,
        LogFormat::Json => registry.with(fmt::layer().json()).try_init()?,
        LogFormat::Stackdriver => registry.with(tracing_stackdriver::layer()).try_init()?,
    }

    Ok(provider)
}
