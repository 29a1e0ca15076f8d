use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Context};
use chrono::{SecondsFormat, Utc};
use serde_json::{Map, Value};

pub type EventPayload = Map<String, Value>;

/// Diagnostic log of one studio session, one JSON object per line.
///
/// Records open with `type`, `session_id` and `ts`; payload keys are merged
/// after them and replace any header key they repeat. The file is created on
/// the first record and the handle is kept for the rest of the session.
#[derive(Debug, Clone)]
pub struct EventWriter {
    shared: Arc<SessionLog>,
}

#[derive(Debug)]
struct SessionLog {
    path: PathBuf,
    session_id: String,
    sink: Mutex<Option<File>>,
}

impl EventWriter {
    pub fn new(path: impl Into<PathBuf>, session_id: impl Into<String>) -> Self {
        Self {
            shared: Arc::new(SessionLog {
                path: path.into(),
                session_id: session_id.into(),
                sink: Mutex::new(None),
            }),
        }
    }

    pub fn for_new_session(path: impl Into<PathBuf>) -> Self {
        Self::new(path, new_session_id())
    }

    pub fn path(&self) -> &Path {
        &self.shared.path
    }

    pub fn session_id(&self) -> &str {
        &self.shared.session_id
    }

    /// Appends one record and returns it as written.
    pub fn emit(&self, event_type: &str, payload: EventPayload) -> anyhow::Result<Value> {
        let record = self.record(event_type, payload);
        let mut line = serde_json::to_vec(&record)
            .with_context(|| format!("could not serialize '{event_type}' event"))?;
        line.push(b'\n');

        let mut sink = self
            .shared
            .sink
            .lock()
            .map_err(|_| anyhow!("session log for {} is poisoned", self.shared.session_id))?;
        if sink.is_none() {
            *sink = Some(self.open_sink()?);
        }
        if let Some(file) = sink.as_mut() {
            file.write_all(&line).with_context(|| {
                format!(
                    "could not append '{event_type}' to {}",
                    self.shared.path.display()
                )
            })?;
        }
        Ok(Value::Object(record))
    }

    /// Event types recorded so far, oldest first.
    pub fn read_types(&self) -> anyhow::Result<Vec<String>> {
        if !self.shared.path.exists() {
            return Ok(Vec::new());
        }
        let raw = fs::read_to_string(&self.shared.path)
            .with_context(|| format!("could not read {}", self.shared.path.display()))?;
        Ok(raw
            .lines()
            .filter_map(|line| serde_json::from_str::<Value>(line).ok())
            .filter_map(|row| row.get("type").and_then(Value::as_str).map(str::to_string))
            .collect())
    }

    fn record(&self, event_type: &str, payload: EventPayload) -> Map<String, Value> {
        let mut record = Map::new();
        record.insert("type".to_string(), Value::from(event_type));
        record.insert(
            "session_id".to_string(),
            Value::from(self.shared.session_id.as_str()),
        );
        record.insert(
            "ts".to_string(),
            Value::from(Utc::now().to_rfc3339_opts(SecondsFormat::Micros, false)),
        );
        record.extend(payload);
        record
    }

    fn open_sink(&self) -> anyhow::Result<File> {
        let path = &self.shared.path;
        if let Some(dir) = path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
            fs::create_dir_all(dir)
                .with_context(|| format!("could not create log directory {}", dir.display()))?;
        }
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("could not open session log {}", path.display()))
    }
}

pub fn new_session_id() -> String {
    format!("studio-{}", uuid::Uuid::new_v4())
}
