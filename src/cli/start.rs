use crate::cli::{
    actions::Action,
    commands,
    dispatch::{globals, handler},
    globals::GlobalArgs,
};
use anyhow::Result;
use opentelemetry::{trace::TracerProvider as _, KeyValue};
use opentelemetry_otlp::{SpanExporter, WithExportConfig};
use opentelemetry_sdk::{runtime::Tokio, trace::TracerProvider, Resource};
use std::time::Duration;
use tracing_subscriber::{fmt, layer::SubscriberExt, EnvFilter, Registry};

const OTLP_ENDPOINT_ENV: &str = "OTEL_EXPORTER_OTLP_ENDPOINT";

fn verbosity_level(count: u8) -> tracing::Level {
    match count {
        0 => tracing::Level::ERROR,
        1 => tracing::Level::WARN,
        2 => tracing::Level::INFO,
        3 => tracing::Level::DEBUG,
        _ => tracing::Level::TRACE,
    }
}

/// OTLP tracer provider, only when a collector endpoint is configured.
fn tracer_provider() -> Result<Option<TracerProvider>> {
    if std::env::var(OTLP_ENDPOINT_ENV).map_or(true, |endpoint| endpoint.trim().is_empty()) {
        return Ok(None);
    }

    let exporter = SpanExporter::builder()
        .with_tonic()
        .with_timeout(Duration::from_secs(3))
        .build()?;

    let provider = TracerProvider::builder()
        .with_batch_exporter(exporter, Tokio)
        .with_resource(Resource::new(vec![
            KeyValue::new("service.name", env!("CARGO_PKG_NAME")),
            KeyValue::new("service.version", env!("CARGO_PKG_VERSION")),
        ]))
        .build();

    Ok(Some(provider))
}

/// Start the CLI
pub fn start() -> Result<(Action, GlobalArgs)> {
    let matches = commands::new().get_matches();

    let verbosity_level = verbosity_level(matches.get_one::<u8>("verbosity").map_or(0, |&v| v));

    let telemetry = tracer_provider()?.map(|provider| {
        let tracer = provider.tracer(env!("CARGO_PKG_NAME"));
        opentelemetry::global::set_tracer_provider(provider);
        tracing_opentelemetry::layer().with_tracer(tracer)
    });

    // logs go to stderr, stdout carries the JSON outcome
    let json = matches.get_flag("log-json");
    let json_layer = json.then(|| {
        fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .with_file(true)
            .with_line_number(true)
            .with_target(false)
    });
    let fmt_layer = (!json).then(|| {
        fmt::layer()
            .with_writer(std::io::stderr)
            .with_file(true)
            .with_line_number(true)
            .with_thread_ids(true)
            .with_target(false)
    });

    // RUST_LOG=
    let env_filter = EnvFilter::builder()
        .with_default_directive(verbosity_level.into())
        .from_env_lossy();

    let subscriber = Registry::default()
        .with(telemetry)
        .with(json_layer)
        .with(fmt_layer)
        .with(env_filter);

    tracing::subscriber::set_global_default(subscriber)?;

    let globals = globals(&matches)?;
    let action = handler(&matches)?;

    Ok((action, globals))
}
