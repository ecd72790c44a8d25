//! Fan-out of log records to independent sinks.
//!
//! [`FanoutLayer`] turns every `tracing` event into a [`LogRecord`] and
//! hands it to [`Fanout::emit`], which offers it to each sink in turn.
//! A failing sink never stops delivery to the others and never surfaces
//! at the call site; its failure is reported to the sinks that are still
//! healthy.

use std::cell::Cell;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, PoisonError, RwLock};

use opentelemetry::KeyValue;
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::field::{Field, Visit};
use tracing::span::{Attributes, Id, Record};
use tracing::{Event, Subscriber};
use tracing_subscriber::Layer;
use tracing_subscriber::layer::Context;
use tracing_subscriber::registry::LookupSpan;

use super::metrics;
use super::record::{LogRecord, Severity};

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("encode error: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("sink is closed")]
    Closed,

    #[error("store write failed: {0}")]
    Store(String),

    #[error("sink panicked")]
    Panicked,
}

/// A downstream destination for log records.
///
/// Records must be delivered in the order `accept` is called.
pub trait LogSink: Send + Sync {
    /// Short name used when reporting this sink's failures.
    fn name(&self) -> &str;

    fn accept(&self, record: &LogRecord) -> Result<(), SinkError>;

    fn flush(&self) -> Result<(), SinkError> {
        Ok(())
    }
}

thread_local! {
    /// Set while this thread is inside `emit`. A sink that logs through
    /// `tracing` would otherwise re-enter the fan-out.
    static EMITTING: Cell<bool> = const { Cell::new(false) };
}

/// The set of registered sinks.
#[derive(Default)]
pub struct Fanout {
    sinks: RwLock<Vec<Box<dyn LogSink>>>,
}

impl Fanout {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_sink(self, sink: impl LogSink + 'static) -> Self {
        self.add(sink);
        self
    }

    pub fn add(&self, sink: impl LogSink + 'static) {
        self.sinks
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Box::new(sink));
    }

    pub fn len(&self) -> usize {
        self.sinks.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Offer `record` to every sink. Returns how many accepted it.
    pub fn emit(&self, record: &LogRecord) -> usize {
        if EMITTING.with(|flag| flag.replace(true)) {
            return 0;
        }

        let sinks = self.sinks.read().unwrap_or_else(PoisonError::into_inner);
        let mut failed = Vec::new();
        for (index, sink) in sinks.iter().enumerate() {
            if let Err(e) = deliver(sink.as_ref(), record) {
                failed.push((index, e));
            }
        }

        for (index, error) in &failed {
            let report = failure_report(sinks[*index].name(), error, record);
            for (other, sink) in sinks.iter().enumerate() {
                if failed.iter().all(|(i, _)| *i != other) {
                    let _ = deliver(sink.as_ref(), &report);
                }
            }
        }

        let delivered = sinks.len() - failed.len();
        drop(sinks);
        EMITTING.with(|flag| flag.set(false));
        delivered
    }

    /// Report that `sink` lost `dropped` after it was accepted, to every
    /// other sink. For sinks that write in the background.
    pub fn report_failure(&self, sink: &str, error: &SinkError, dropped: &LogRecord) {
        if EMITTING.with(|flag| flag.replace(true)) {
            return;
        }
        let report = failure_report(sink, error, dropped);
        for other in self.sinks.read().unwrap_or_else(PoisonError::into_inner).iter() {
            if other.name() != sink {
                let _ = deliver(other.as_ref(), &report);
            }
        }
        EMITTING.with(|flag| flag.set(false));
    }

    /// Remove the first sink called `name`. Later records skip it.
    pub fn remove(&self, name: &str) -> Option<Box<dyn LogSink>> {
        let mut sinks = self.sinks.write().unwrap_or_else(PoisonError::into_inner);
        let index = sinks.iter().position(|sink| sink.name() == name)?;
        Some(sinks.remove(index))
    }

    /// Remove and return all sinks in registration order. Later records are
    /// dropped.
    pub fn detach(&self) -> Vec<Box<dyn LogSink>> {
        std::mem::take(&mut *self.sinks.write().unwrap_or_else(PoisonError::into_inner))
    }
}

fn failure_report(sink: &str, error: &SinkError, dropped: &LogRecord) -> LogRecord {
    metrics::sink_failures().add(1, &[KeyValue::new("sink", sink.to_string())]);
    LogRecord::new(Severity::Warn, "log sink failed")
        .attr("sink", sink)
        .attr("error", error.to_string())
        .attr("dropped_message", dropped.message.clone())
}

fn deliver(sink: &dyn LogSink, record: &LogRecord) -> Result<(), SinkError> {
    catch_unwind(AssertUnwindSafe(|| sink.accept(record))).unwrap_or(Err(SinkError::Panicked))
}

// ---------------------------------------------------------------------------
// tracing bridge
// ---------------------------------------------------------------------------

/// `tracing_subscriber` layer feeding a [`Fanout`].
///
/// Event fields become record attributes, merged over the fields of every
/// enclosing span (innermost wins).
pub struct FanoutLayer {
    fanout: Arc<Fanout>,
}

impl FanoutLayer {
    pub fn new(fanout: Arc<Fanout>) -> Self {
        Self { fanout }
    }
}

/// Fields recorded on a span, stored in the span's extensions.
#[derive(Default)]
struct SpanFields(Map<String, Value>);

impl<S> Layer<S> for FanoutLayer
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    fn on_new_span(&self, attrs: &Attributes<'_>, id: &Id, ctx: Context<'_, S>) {
        let Some(span) = ctx.span(id) else { return };
        let mut fields = SpanFields::default();
        attrs.record(&mut FieldVisitor::new(&mut fields.0));
        span.extensions_mut().insert(fields);
    }

    fn on_record(&self, id: &Id, values: &Record<'_>, ctx: Context<'_, S>) {
        let Some(span) = ctx.span(id) else { return };
        let mut extensions = span.extensions_mut();
        if let Some(fields) = extensions.get_mut::<SpanFields>() {
            values.record(&mut FieldVisitor::new(&mut fields.0));
        }
    }

    fn on_event(&self, event: &Event<'_>, ctx: Context<'_, S>) {
        let mut attributes = Map::new();
        if let Some(scope) = ctx.event_scope(event) {
            for span in scope.from_root() {
                if let Some(fields) = span.extensions().get::<SpanFields>() {
                    attributes.extend(fields.0.clone());
                }
            }
        }

        let mut visitor = FieldVisitor::new(&mut attributes);
        event.record(&mut visitor);
        let message = visitor.message.take().unwrap_or_default();

        let mut record = LogRecord::new(Severity::from(event.metadata().level()), message);
        record.attributes = attributes;
        self.fanout.emit(&record);
    }
}

struct FieldVisitor<'a> {
    fields: &'a mut Map<String, Value>,
    message: Option<String>,
}

impl<'a> FieldVisitor<'a> {
    fn new(fields: &'a mut Map<String, Value>) -> Self {
        Self {
            fields,
            message: None,
        }
    }

    fn insert(&mut self, field: &Field, value: Value) {
        if field.name() == "message" {
            self.message = Some(match value {
                Value::String(s) => s,
                other => other.to_string(),
            });
        } else {
            self.fields.insert(field.name().to_string(), value);
        }
    }
}

impl Visit for FieldVisitor<'_> {
    fn record_f64(&mut self, field: &Field, value: f64) {
        self.insert(field, Value::from(value));
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.insert(field, Value::from(value));
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.insert(field, Value::from(value));
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.insert(field, Value::from(value));
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        self.insert(field, Value::from(value));
    }

    fn record_error(&mut self, field: &Field, value: &(dyn std::error::Error + 'static)) {
        self.insert(field, Value::from(value.to_string()));
    }

    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        self.insert(field, Value::from(format!("{value:?}")));
    }
}
