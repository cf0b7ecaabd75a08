use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::bail;
use chrono::{SecondsFormat, Utc};
use serde::Serialize;
use serde_json::{Map, Value};

use crate::jobs::{JobStage, JobStatus, LogEvent};

pub type EventPayload = Map<String, Value>;

/// Append-only JSONL log for one generation session.
///
/// - default fields are `event`, `session_id`, `ts`
/// - caller payload is merged last and can override defaults
/// - one compact JSON object per line
///
/// Clones share the same file and lock.
#[derive(Debug, Clone)]
pub struct EventLog {
    inner: Arc<EventLogInner>,
}

#[derive(Debug)]
struct EventLogInner {
    path: PathBuf,
    session_id: String,
    lock: Mutex<()>,
}

impl EventLog {
    pub fn new(path: impl Into<PathBuf>, session_id: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(EventLogInner {
                path: path.into(),
                session_id: session_id.into(),
                lock: Mutex::new(()),
            }),
        }
    }

    pub fn path(&self) -> &Path {
        &self.inner.path
    }

    pub fn session_id(&self) -> &str {
        &self.inner.session_id
    }

    pub fn emit(&self, event: &str, payload: EventPayload) -> anyhow::Result<Value> {
        let header = EventHeader {
            event,
            session_id: self.session_id(),
            ts: now_utc_iso(),
        };
        let mut record = into_object(&header)?;
        record.extend(payload);

        if let Some(parent) = self.inner.path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let line = serde_json::to_string(&record)?;
        let _guard = self
            .inner
            .lock
            .lock()
            .map_err(|_| anyhow::anyhow!("event log lock poisoned"))?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.inner.path)?;
        file.write_all(line.as_bytes())?;
        file.write_all(b"\n")?;

        Ok(Value::Object(record))
    }

    /// Records one server snapshot, flattening its events to display text.
    pub fn emit_status(&self, job_id: &str, status: &JobStatus) -> anyhow::Result<Value> {
        let record = StatusRecord {
            job_id,
            stage: &status.stage,
            progress: status.progress,
            messages: status.events.iter().map(LogEvent::display_text).collect(),
            error: status.error.as_deref(),
        };
        self.emit("job_status", into_object(&record)?)
    }
}

#[derive(Serialize)]
struct EventHeader<'a> {
    event: &'a str,
    session_id: &'a str,
    ts: String,
}

/// Payload of a `job_status` line. The stage is written in its wire form so
/// unknown server stages survive verbatim.
#[derive(Serialize)]
struct StatusRecord<'a> {
    job_id: &'a str,
    stage: &'a JobStage,
    progress: f64,
    messages: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<&'a str>,
}

fn into_object(record: &impl Serialize) -> anyhow::Result<EventPayload> {
    match serde_json::to_value(record)? {
        Value::Object(map) => Ok(map),
        other => bail!("event record must serialize to an object, got {other}"),
    }
}

fn now_utc_iso() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, false)
}
