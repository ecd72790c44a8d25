//! Line-oriented file sinks: logfmt-style text and JSON lines.

use std::borrow::Cow;
use std::fs::File;
use std::io::{LineWriter, Write};
use std::path::Path;
use std::sync::{Mutex, PoisonError};

use chrono::SecondsFormat;
use serde::Serialize;
use serde_json::{Map, Value};

use super::fanout::{LogSink, SinkError};
use super::record::{LogRecord, Severity};

/// Keys written by both encodings ahead of the attributes.
const RESERVED_KEYS: &[&str] = &["time", "level", "msg"];

/// Attribute key as written: reserved names get an `attr.` prefix so they
/// cannot shadow the record's own fields.
fn attribute_key(key: &str) -> Cow<'_, str> {
    if RESERVED_KEYS.contains(&key) {
        Cow::Owned(format!("attr.{key}"))
    } else {
        Cow::Borrowed(key)
    }
}

/// Open `path` for writing, truncating any previous contents.
fn truncate(path: &Path) -> std::io::Result<LineWriter<File>> {
    Ok(LineWriter::new(File::create(path)?))
}

// ---------------------------------------------------------------------------
// Text
// ---------------------------------------------------------------------------

/// Writes `time=… level=… msg=… key=value` lines.
pub struct TextSink<W> {
    writer: Mutex<W>,
}

impl TextSink<LineWriter<File>> {
    pub fn create(path: impl AsRef<Path>) -> std::io::Result<Self> {
        Ok(Self::new(truncate(path.as_ref())?))
    }
}

impl<W: Write + Send> TextSink<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer: Mutex::new(writer),
        }
    }

    pub fn into_inner(self) -> W {
        self.writer.into_inner().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Render one record as a single text line (without the newline).
pub fn format_text(record: &LogRecord) -> String {
    let mut line = format!(
        "time={} level={} msg={}",
        record.timestamp.to_rfc3339_opts(SecondsFormat::Millis, true),
        record.severity,
        quote(&record.message)
    );
    for (key, value) in &record.attributes {
        let value = match value {
            Value::String(s) => quote(s),
            other => quote(&other.to_string()),
        };
        line.push(' ');
        line.push_str(&attribute_key(key));
        line.push('=');
        line.push_str(&value);
    }
    line
}

/// Quote a value when it would otherwise break the key=value layout.
fn quote(value: &str) -> String {
    let needs_quotes = value.is_empty()
        || value
            .chars()
            .any(|c| c.is_whitespace() || c.is_control() || c == '"' || c == '=');
    if needs_quotes {
        format!("{value:?}")
    } else {
        value.to_string()
    }
}

impl<W: Write + Send> LogSink for TextSink<W> {
    fn name(&self) -> &str {
        "text"
    }

    fn accept(&self, record: &LogRecord) -> Result<(), SinkError> {
        let mut writer = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        writeln!(writer, "{}", format_text(record))?;
        Ok(())
    }

    fn flush(&self) -> Result<(), SinkError> {
        self.writer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .flush()?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// JSON
// ---------------------------------------------------------------------------

/// Writes one JSON object per line.
pub struct JsonSink<W> {
    writer: Mutex<W>,
}

#[derive(Serialize)]
struct JsonLine<'a> {
    time: String,
    level: Severity,
    msg: &'a str,
    #[serde(flatten)]
    attributes: Cow<'a, Map<String, Value>>,
}

impl JsonSink<LineWriter<File>> {
    pub fn create(path: impl AsRef<Path>) -> std::io::Result<Self> {
        Ok(Self::new(truncate(path.as_ref())?))
    }
}

impl<W: Write + Send> JsonSink<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer: Mutex::new(writer),
        }
    }

    pub fn into_inner(self) -> W {
        self.writer.into_inner().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Render one record as a single JSON line (without the newline).
pub fn format_json(record: &LogRecord) -> serde_json::Result<String> {
    serde_json::to_string(&JsonLine {
        time: record.timestamp.to_rfc3339_opts(SecondsFormat::Millis, true),
        level: record.severity,
        msg: &record.message,
        attributes: json_attributes(&record.attributes),
    })
}

fn json_attributes(attributes: &Map<String, Value>) -> Cow<'_, Map<String, Value>> {
    if attributes.keys().any(|key| RESERVED_KEYS.contains(&key.as_str())) {
        Cow::Owned(
            attributes
                .iter()
                .map(|(key, value)| (attribute_key(key).into_owned(), value.clone()))
                .collect(),
        )
    } else {
        Cow::Borrowed(attributes)
    }
}

impl<W: Write + Send> LogSink for JsonSink<W> {
    fn name(&self) -> &str {
        "json"
    }

    fn accept(&self, record: &LogRecord) -> Result<(), SinkError> {
        let line = format_json(record)?;
        let mut writer = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        writeln!(writer, "{line}")?;
        Ok(())
    }

    fn flush(&self) -> Result<(), SinkError> {
        self.writer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use chrono::Utc;

    fn sample() -> LogRecord {
        LogRecord::new(Severity::Info, "task submitted")
            .at(Utc.with_ymd_and_hms(2026, 10, 18, 12, 0, 0).unwrap())
            .attr("task", "build-report")
            .attr("queued", 1)
    }

    #[test]
    fn text_line_quotes_only_when_needed() {
        assert_eq!(
            format_text(&sample()),
            "time=2026-10-18T12:00:00.000Z level=INFO msg=\"task submitted\" queued=1 task=build-report"
        );
    }

    #[test]
    fn text_line_escapes_embedded_quotes() {
        let record = LogRecord::new(Severity::Warn, "x").attr("task", "say \"hi\"");
        assert!(format_text(&record).ends_with(r#"task="say \"hi\"""#));
    }

    #[test]
    fn json_line_flattens_attributes() {
        let line = format_json(&sample()).unwrap();
        let value: Value = serde_json::from_str(&line).unwrap();
        assert_eq!(value["time"], "2026-10-18T12:00:00.000Z");
        assert_eq!(value["level"], "INFO");
        assert_eq!(value["msg"], "task submitted");
        assert_eq!(value["task"], "build-report");
        assert_eq!(value["queued"], 1);
    }

    #[test]
    fn attributes_cannot_shadow_record_fields() {
        let record = LogRecord::new(Severity::Info, "real")
            .attr("level", "user-level")
            .attr("msg", "user-msg")
            .attr("worker", 1);

        let line = format_json(&record).unwrap();
        assert_eq!(line.matches("\"level\"").count(), 1, "{line}");
        assert_eq!(line.matches("\"msg\"").count(), 1, "{line}");
        let value: Value = serde_json::from_str(&line).unwrap();
        assert_eq!(value["level"], "INFO");
        assert_eq!(value["msg"], "real");
        assert_eq!(value["attr.level"], "user-level");
        assert_eq!(value["attr.msg"], "user-msg");
        assert_eq!(value["worker"], 1);

        let text = format_text(&record);
        assert!(text.contains(" level=INFO "), "{text}");
        assert!(text.contains(" attr.level=user-level"), "{text}");
        assert!(text.contains(" attr.msg=user-msg"), "{text}");
    }

    #[test]
    fn sinks_write_one_line_per_record() {
        let text = TextSink::new(Vec::new());
        let json = JsonSink::new(Vec::new());
        for _ in 0..3 {
            text.accept(&sample()).unwrap();
            json.accept(&sample()).unwrap();
        }
        let text = String::from_utf8(text.into_inner()).unwrap();
        let json = String::from_utf8(json.into_inner()).unwrap();
        assert_eq!(text.lines().count(), 3);
        assert_eq!(json.lines().count(), 3);
    }

    #[test]
    fn create_truncates_existing_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("log.txt");
        std::fs::write(&path, "stale\n").unwrap();

        let sink = TextSink::create(&path).unwrap();
        sink.accept(&sample()).unwrap();
        drop(sink);

        let contents = std::fs::read_to_string(&path).unwrap();
        assert!(!contents.contains("stale"));
        assert_eq!(contents.lines().count(), 1);
    }
}
