//! Log table operations: insert, latest records, per-second counts.

use chrono::{DateTime, Duration, DurationRound, NaiveDateTime, Utc};
use std::collections::HashMap;

use crate::error::{Error, Result};
use crate::telemetry::record::{LogRecord, Severity};

/// Fixed-width so that text order equals time order.
const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.6f";
const SECOND_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Longest histogram window: one day.
pub const MAX_WINDOW_SECS: i64 = 86_400;

fn encode_timestamp(ts: &DateTime<Utc>) -> String {
    ts.format(TIMESTAMP_FORMAT).to_string()
}

fn decode_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f")
        .map(|naive| naive.and_utc())
        .map_err(|e| Error::Other(format!("bad timestamp {raw:?}: {e}")))
}

fn decode_row((timestamp, message_type, message): (String, String, String)) -> Result<LogRecord> {
    let severity: Severity = message_type.parse().map_err(Error::Other)?;
    let payload = serde_json::from_str(&message)
        .map_err(|e| Error::Other(format!("bad log payload: {e}")))?;
    LogRecord::from_payload(decode_timestamp(&timestamp)?, severity, payload).map_err(Error::Other)
}

impl super::Db {
    /// Append one record. All values are bound, never interpolated.
    pub async fn insert_record(&self, record: &LogRecord) -> Result<()> {
        let payload = serde_json::to_string(&record.payload())
            .map_err(|e| Error::Other(format!("serialize log payload: {e}")))?;
        sqlx::query("INSERT INTO log_table (timestamp, message_type, message) VALUES (?1, ?2, ?3)")
            .bind(encode_timestamp(&record.timestamp))
            .bind(record.severity.to_string())
            .bind(payload)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// The most recently timestamped record, if any.
    pub async fn latest_record(&self) -> Result<Option<LogRecord>> {
        Ok(self.recent_records(1).await?.into_iter().next())
    }

    /// Up to `limit` records, newest first. Ties on timestamp are broken by
    /// insertion order. A negative limit returns nothing.
    pub async fn recent_records(&self, limit: i64) -> Result<Vec<LogRecord>> {
        let rows: Vec<(String, String, String)> = sqlx::query_as(
            "SELECT timestamp, message_type, message FROM log_table
             ORDER BY timestamp DESC, rowid DESC
             LIMIT ?1",
        )
        .bind(limit.max(0))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(decode_row).collect()
    }

    pub async fn count_records(&self) -> Result<i64> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM log_table")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    /// Records per second for the `window_secs` seconds ending at `now`,
    /// newest bucket first. Seconds without records are reported as zero.
    /// The window is clamped to `1..=MAX_WINDOW_SECS`.
    pub async fn per_second_counts(
        &self,
        now: DateTime<Utc>,
        window_secs: i64,
    ) -> Result<Vec<(DateTime<Utc>, i64)>> {
        let end = now
            .duration_trunc(Duration::seconds(1))
            .map_err(|e| Error::Other(format!("truncate timestamp: {e}")))?;
        let start = end - Duration::seconds(window_secs.clamp(1, MAX_WINDOW_SECS) - 1);

        let rows: Vec<(String, i64)> = sqlx::query_as(
            "SELECT substr(timestamp, 1, 19) AS bucket, COUNT(*) FROM log_table
             WHERE timestamp >= ?1 AND timestamp < ?2
             GROUP BY bucket",
        )
        .bind(encode_timestamp(&start))
        .bind(encode_timestamp(&(end + Duration::seconds(1))))
        .fetch_all(&self.pool)
        .await?;

        let counts: HashMap<String, i64> = rows.into_iter().collect();
        let mut buckets = Vec::new();
        let mut bucket = end;
        while bucket >= start {
            let key = bucket.format(SECOND_FORMAT).to_string();
            buckets.push((bucket, counts.get(&key).copied().unwrap_or(0)));
            bucket -= Duration::seconds(1);
        }
        Ok(buckets)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn timestamps_survive_encoding() {
        let ts = Utc.with_ymd_and_hms(2026, 10, 18, 9, 5, 7).unwrap() + Duration::microseconds(42);
        assert_eq!(encode_timestamp(&ts), "2026-10-18 09:05:07.000042");
        assert_eq!(decode_timestamp(&encode_timestamp(&ts)).unwrap(), ts);
    }

    #[test]
    fn encoded_timestamps_sort_chronologically() {
        let a = Utc.with_ymd_and_hms(2026, 10, 18, 9, 5, 7).unwrap();
        let b = a + Duration::milliseconds(500);
        let c = a + Duration::seconds(10);
        assert!(encode_timestamp(&a) < encode_timestamp(&b));
        assert!(encode_timestamp(&b) < encode_timestamp(&c));
    }
}
