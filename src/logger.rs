//! Structured diagnostics events.
//!
//! Every failed authentication and every failed workload request is reported as a
//! single JSON object carrying a timestamp, an upper-case event type and a free-form
//! payload, for example:
//! ```json
//! {"ts":"2026-10-18T09:00:01.123Z","type":"AUTH_FAILED","username":"GSPL-1100","status":401,"response":"{\"message\":\"invalid password\"}"}
//! ```
//!
//! Events are delivered to a [`DiagnosticsSink`]. The sinks provided here are:
//!  - [`LogSink`]: writes the event to the `log` facade at `warn` level and, when the
//!    `--events-file` option is set, forwards it to the events logger task;
//!  - [`FailureCollector`]: counts failures and keeps them in memory, then forwards
//!    them to an inner sink.
//!
//! ## Events file
//!
//! The events logger task is enabled with `--events-file`. It is launched before the
//! load test starts and receives events from all workers over an unbounded channel,
//! writing one JSON event per line through Tokio's asynchronous
//! [`BufWriter`](https://docs.rs/tokio/*/tokio/io/struct.BufWriter.html). Sending `None`
//! flushes the file and stops the task.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufWriter};

use crate::LoadTestError;

/// Payload of a diagnostics event, merged into the top level of the event object.
pub type EventPayload = Map<String, Value>;

/// Channel used to send events to the events logger task.
pub type EventLoggerTx = flume::Sender<Option<DiagnosticEvent>>;

/// Join handle of the events logger task.
pub type EventLoggerJoinHandle = tokio::task::JoinHandle<Result<(), LoadTestError>>;

/// One structured diagnostics event.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct DiagnosticEvent {
    /// When the event was emitted.
    pub ts: DateTime<Utc>,
    /// Upper-case event type, ie `AUTH_FAILED`.
    #[serde(rename = "type")]
    pub event_type: String,
    /// Event specific fields.
    #[serde(flatten)]
    pub payload: EventPayload,
}
impl DiagnosticEvent {
    /// Stamps a new event with the current time.
    pub fn new(event_type: &str, payload: EventPayload) -> Self {
        DiagnosticEvent {
            ts: Utc::now(),
            event_type: event_type.to_string(),
            payload,
        }
    }

    /// Renders the event as a single line of JSON.
    pub fn to_json_line(&self) -> String {
        let mut object = Map::new();
        object.insert(
            "ts".to_string(),
            Value::String(self.ts.to_rfc3339_opts(SecondsFormat::Millis, true)),
        );
        object.insert("type".to_string(), Value::String(self.event_type.clone()));
        for (key, value) in &self.payload {
            object.insert(key.clone(), value.clone());
        }
        Value::Object(object).to_string()
    }
}

/// Destination for structured diagnostics events.
///
/// Implementations must be cheap to call from many workers at once.
pub trait DiagnosticsSink: Send + Sync {
    /// Emit one event.
    fn log_event(&self, event_type: &str, payload: EventPayload);
}

/// Builds an [`EventPayload`] from a `serde_json::json!` object literal.
///
/// Anything other than an object is stored under a `value` key.
pub fn payload(value: Value) -> EventPayload {
    match value {
        Value::Object(map) => map,
        other => {
            let mut map = Map::new();
            map.insert("value".to_string(), other);
            map
        }
    }
}

/// Writes events to the `log` facade, and optionally to the events file.
#[derive(Clone, Debug, Default)]
pub struct LogSink {
    events_file: Option<EventLoggerTx>,
}
impl LogSink {
    pub fn new(events_file: Option<EventLoggerTx>) -> Self {
        LogSink { events_file }
    }
}
impl DiagnosticsSink for LogSink {
    fn log_event(&self, event_type: &str, payload: EventPayload) {
        let event = DiagnosticEvent::new(event_type, payload);
        warn!("{}", event.to_json_line());
        if let Some(tx) = self.events_file.as_ref() {
            if let Err(e) = tx.send(Some(event)) {
                debug!("events logger is gone, dropping event: {}", e);
            }
        }
    }
}

/// Counts failures and keeps a copy of every event in memory.
pub struct FailureCollector {
    failed: AtomicUsize,
    records: Mutex<Vec<DiagnosticEvent>>,
    inner: Option<Arc<dyn DiagnosticsSink>>,
}
impl FailureCollector {
    /// A collector that forwards every event to `inner` after recording it.
    pub fn new(inner: Arc<dyn DiagnosticsSink>) -> Self {
        FailureCollector {
            failed: AtomicUsize::new(0),
            records: Mutex::new(Vec::new()),
            inner: Some(inner),
        }
    }

    /// A collector that only records.
    pub fn detached() -> Self {
        FailureCollector {
            failed: AtomicUsize::new(0),
            records: Mutex::new(Vec::new()),
            inner: None,
        }
    }

    /// Total number of failures recorded so far.
    pub fn failed(&self) -> usize {
        self.failed.load(Ordering::SeqCst)
    }

    /// A snapshot of all recorded events.
    pub fn records(&self) -> Vec<DiagnosticEvent> {
        match self.records.lock() {
            Ok(records) => records.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Recorded events of one type.
    pub fn records_of(&self, event_type: &str) -> Vec<DiagnosticEvent> {
        self.records()
            .into_iter()
            .filter(|event| event.event_type == event_type)
            .collect()
    }
}
impl DiagnosticsSink for FailureCollector {
    fn log_event(&self, event_type: &str, payload: EventPayload) {
        self.failed.fetch_add(1, Ordering::SeqCst);
        let event = DiagnosticEvent::new(event_type, payload.clone());
        match self.records.lock() {
            Ok(mut records) => records.push(event),
            Err(poisoned) => poisoned.into_inner().push(event),
        }
        if let Some(inner) = self.inner.as_ref() {
            inner.log_event(event_type, payload);
        }
    }
}

/// Opens the events file and launches the events logger task.
///
/// Returns `None` when no events file is configured.
pub async fn setup_events_logger(
    events_file: &str,
) -> Result<Option<(EventLoggerJoinHandle, EventLoggerTx)>, LoadTestError> {
    if events_file.is_empty() {
        return Ok(None);
    }

    let file = File::create(events_file).await?;
    info!("writing diagnostics events to events_file: {}", events_file);
    let (tx, rx): (EventLoggerTx, flume::Receiver<Option<DiagnosticEvent>>) = flume::unbounded();
    let path = events_file.to_string();
    let writer = BufWriter::with_capacity(64 * 1024, file);
    let handle = tokio::spawn(events_logger_main(writer, path, rx));

    Ok(Some((handle, tx)))
}

/// Waits for events from the workers and writes them to the events file.
async fn events_logger_main(
    mut writer: BufWriter<File>,
    path: String,
    receiver: flume::Receiver<Option<DiagnosticEvent>>,
) -> Result<(), LoadTestError> {
    while let Ok(message) = receiver.recv_async().await {
        match message {
            Some(event) => {
                if let Err(e) = writer
                    .write_all(format!("{}\n", event.to_json_line()).as_bytes())
                    .await
                {
                    warn!("failed to write to {}: {}", &path, e);
                }
            }
            // Empty message means it's time to exit.
            None => break,
        }
    }

    info!("flushing events_file: {}", &path);
    writer.flush().await?;

    Ok(())
}

/// Signals the events logger task to flush and waits for it to exit.
pub async fn shutdown_events_logger(logger: Option<(EventLoggerJoinHandle, EventLoggerTx)>) {
    if let Some((handle, tx)) = logger {
        let _ = tx.send(None);
        match handle.await {
            Ok(Ok(())) => (),
            Ok(Err(e)) => warn!("events logger failed: {}", e),
            Err(e) => warn!("events logger task failed: {}", e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn event_json_flattens_payload() {
        let event = DiagnosticEvent::new(
            "AUTH_FAILED",
            payload(json!({"username": "GSPL-1100", "status": 401})),
        );
        let line: Value = serde_json::from_str(&event.to_json_line()).unwrap();
        assert_eq!(line["type"], "AUTH_FAILED");
        assert_eq!(line["username"], "GSPL-1100");
        assert_eq!(line["status"], 401);
        assert!(line["ts"].as_str().unwrap().ends_with('Z'));
    }

    #[test]
    fn non_object_payload_is_wrapped() {
        let map = payload(json!("boom"));
        assert_eq!(map.get("value"), Some(&json!("boom")));
    }

    #[test]
    fn collector_counts_and_forwards() {
        let inner = Arc::new(FailureCollector::detached());
        let collector = FailureCollector::new(inner.clone());
        collector.log_event("PAYROLL_CHECK_FAILED", payload(json!({"vu": 1})));
        collector.log_event("AUTH_EXCEPTION", payload(json!({"vu": 2})));

        assert_eq!(collector.failed(), 2);
        assert_eq!(collector.records_of("AUTH_EXCEPTION").len(), 1);
        assert_eq!(inner.failed(), 2);
        assert_eq!(inner.records()[0].event_type, "PAYROLL_CHECK_FAILED");
    }

    #[tokio::test]
    async fn events_file_gets_one_line_per_event() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("events.log");
        let path = path.to_str().unwrap().to_string();

        let logger = setup_events_logger(&path).await.unwrap();
        let tx = logger.as_ref().map(|(_, tx)| tx.clone());
        let sink = LogSink::new(tx);
        sink.log_event("GET_ALL_USERS_FAILED", payload(json!({"attempt": 1})));
        sink.log_event("GET_ALL_USERS_FAILED", payload(json!({"attempt": 2})));
        shutdown_events_logger(logger).await;

        let written = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = written.lines().collect();
        assert_eq!(lines.len(), 2);
        let second: Value = serde_json::from_str(lines[1]).unwrap();
        assert_eq!(second["attempt"], 2);
    }

    #[tokio::test]
    async fn empty_events_file_disables_logger() {
        assert!(setup_events_logger("").await.unwrap().is_none());
    }
}
