//! Logging and OpenTelemetry initialization.
//!
//! The terminal belongs to the UI, so nothing is written to stdout or
//! stderr. Every `tracing` event fans out to three sinks under the log
//! directory: `log.txt`, `log.json` and the `logs.db` analytical store.
//! If an OTLP endpoint is configured, traces, metrics and logs are also
//! exported there.

pub mod fanout;
pub mod metrics;
pub mod record;
pub mod sinks;
pub mod store;
pub mod work;

use std::path::PathBuf;
use std::sync::Arc;

use crate::db::Db;
use crate::error::{Error, Result};

pub use fanout::{Fanout, FanoutLayer, LogSink, SinkError};
pub use record::{LogRecord, Severity};

/// Targets silenced regardless of level: the store's own driver would
/// otherwise log every insert back into the store.
const QUIET_TARGETS: &[&str] = &["sqlx=off", "h2=warn", "tonic=warn", "hyper=warn", "tower=warn"];

/// Configuration for telemetry initialization.
pub struct TelemetryConfig {
    /// Directory receiving `log.txt`, `log.json` and `logs.db`.
    pub log_dir: PathBuf,
    /// Default filter when `RUST_LOG` is unset (e.g. "debug").
    pub level: String,
    /// Optional OTLP endpoint (e.g. "http://localhost:4317").
    pub endpoint: Option<String>,
    /// The service name reported in telemetry signals.
    pub service_name: String,
}

/// Guard owning every log resource.
///
/// Call [`shutdown`](Self::shutdown) on the way out so that the store is
/// drained and the resources are released in reverse order of acquisition.
/// Dropping it without `shutdown` still closes the files and shuts OTel down.
pub struct TelemetryGuard {
    fanout: Arc<Fanout>,
    store: Option<(Db, store::StoreWriter)>,
    tracer_provider: Option<opentelemetry_sdk::trace::SdkTracerProvider>,
    meter_provider: Option<opentelemetry_sdk::metrics::SdkMeterProvider>,
    logger_provider: Option<opentelemetry_sdk::logs::SdkLoggerProvider>,
}

impl TelemetryGuard {
    /// Release the store session, then the JSON file, then the text file.
    ///
    /// The file sinks stay attached until the store writer has drained, so
    /// a failed final insert is still reported to them.
    pub async fn shutdown(mut self) {
        if let Some((db, writer)) = self.store.take() {
            // Dropping the store sink ends the writer once its queue is empty.
            drop(self.fanout.remove(store::STORE_SINK));
            writer.finish().await;
            db.close().await;
        }
        let mut sinks = self.fanout.detach();
        while let Some(sink) = sinks.pop() {
            let _ = sink.flush();
        }
    }
}

impl Drop for TelemetryGuard {
    fn drop(&mut self) {
        drop(self.fanout.detach());
        if let Some(provider) = self.logger_provider.take() {
            let _ = provider.shutdown();
        }
        if let Some(provider) = self.meter_provider.take() {
            let _ = provider.shutdown();
        }
        if let Some(provider) = self.tracer_provider.take() {
            let _ = provider.shutdown();
        }
    }
}

/// Open the log sinks, the analytical store and (optionally) OTLP export,
/// and install the global tracing subscriber.
///
/// Must be called inside a tokio runtime.
///
/// # Errors
///
/// Returns an error if a log file or the store cannot be opened, the
/// schema cannot be created, an OTLP exporter fails to build, or a global
/// subscriber is already set.
pub async fn init_telemetry(config: TelemetryConfig) -> Result<TelemetryGuard> {
    use opentelemetry::trace::TracerProvider as _;
    use tracing_subscriber::layer::SubscriberExt as _;
    use tracing_subscriber::util::SubscriberInitExt as _;

    std::fs::create_dir_all(&config.log_dir)?;
    let text = sinks::TextSink::create(config.log_dir.join("log.txt"))?;
    let json = sinks::JsonSink::create(config.log_dir.join("log.json"))?;

    let db = Db::open(&config.log_dir.join("logs.db")).await?;
    db.migrate().await?;

    let fanout = Arc::new(Fanout::new().with_sink(text).with_sink(json));
    let (store_sink, writer) = store::store_sink(db.clone(), Arc::downgrade(&fanout));
    fanout.add(store_sink);
    let fanout_layer = FanoutLayer::new(Arc::clone(&fanout));
    let env_filter = env_filter(&config.level)?;

    let mut guard = TelemetryGuard {
        fanout,
        store: Some((db, writer)),
        tracer_provider: None,
        meter_provider: None,
        logger_provider: None,
    };

    if let Some(endpoint) = config.endpoint {
        // Traces, metrics and logs all go to the same endpoint.
        use opentelemetry_otlp::WithExportConfig as _;

        let resource = opentelemetry_sdk::Resource::builder()
            .with_service_name(config.service_name)
            .build();

        // --- Traces ---
        let span_exporter = opentelemetry_otlp::SpanExporter::builder()
            .with_tonic()
            .with_endpoint(&endpoint)
            .build()
            .map_err(|e| Error::Telemetry(format!("failed to create OTLP span exporter: {e}")))?;

        let tracer_provider = opentelemetry_sdk::trace::SdkTracerProvider::builder()
            .with_batch_exporter(span_exporter)
            .with_resource(resource.clone())
            .build();

        let tracer = tracer_provider.tracer("tui-worker-pool");
        let otel_trace_layer = tracing_opentelemetry::layer().with_tracer(tracer);

        // --- Metrics ---
        let metric_exporter = opentelemetry_otlp::MetricExporter::builder()
            .with_tonic()
            .with_endpoint(&endpoint)
            .build()
            .map_err(|e| Error::Telemetry(format!("failed to create OTLP metric exporter: {e}")))?;

        let meter_provider = opentelemetry_sdk::metrics::SdkMeterProvider::builder()
            .with_periodic_exporter(metric_exporter)
            .with_resource(resource.clone())
            .build();

        opentelemetry::global::set_meter_provider(meter_provider.clone());

        // --- Logs ---
        let log_exporter = opentelemetry_otlp::LogExporter::builder()
            .with_tonic()
            .with_endpoint(&endpoint)
            .build()
            .map_err(|e| Error::Telemetry(format!("failed to create OTLP log exporter: {e}")))?;

        let logger_provider = opentelemetry_sdk::logs::SdkLoggerProvider::builder()
            .with_batch_exporter(log_exporter)
            .with_resource(resource)
            .build();

        let otel_log_layer = opentelemetry_appender_tracing::layer::OpenTelemetryTracingBridge::new(
            &logger_provider,
        );

        tracing_subscriber::registry()
            .with(env_filter)
            .with(fanout_layer)
            .with(otel_trace_layer)
            .with(otel_log_layer)
            .try_init()
            .map_err(|e| Error::Telemetry(format!("failed to init tracing subscriber: {e}")))?;

        guard.tracer_provider = Some(tracer_provider);
        guard.meter_provider = Some(meter_provider);
        guard.logger_provider = Some(logger_provider);
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fanout_layer)
            .try_init()
            .map_err(|e| Error::Telemetry(format!("failed to init tracing subscriber: {e}")))?;
    }

    Ok(guard)
}

/// `RUST_LOG` if set, otherwise `level`, plus [`QUIET_TARGETS`].
fn env_filter(level: &str) -> Result<tracing_subscriber::EnvFilter> {
    use tracing_subscriber::EnvFilter;

    let mut filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .map_err(|e| Error::Config(format!("invalid log level {level:?}: {e}")))?;
    for directive in QUIET_TARGETS {
        let directive = directive
            .parse::<tracing_subscriber::filter::Directive>()
            .map_err(|e| Error::Telemetry(format!("bad filter directive {directive}: {e}")))?;
        filter = filter.add_directive(directive);
    }
    Ok(filter)
}
