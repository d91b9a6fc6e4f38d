use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use anyhow::{bail, Context, Result};
use chrono::{SecondsFormat, Utc};
use serde::Serialize;
use serde_json::Value;

/// Something that happened to a try-on session, as written to the journal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionEvent {
    GenerationStarted {
        model: String,
        epoch: u64,
    },
    GenerationSucceeded {
        model: String,
        mime_type: String,
    },
    GenerationFailed {
        model: String,
        error: String,
        reauthorize: bool,
    },
    SessionReset,
    HistoryCleared,
    AuthorizationChanged {
        authorized: bool,
    },
}

/// Append-only `events.jsonl` for one session. Each line is the event plus
/// `session_id` and an RFC 3339 `ts`.
#[derive(Debug, Clone)]
pub struct EventWriter {
    path: PathBuf,
    session_id: String,
    lock: Arc<Mutex<()>>,
}

impl EventWriter {
    pub fn new(path: impl Into<PathBuf>, session_id: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            session_id: session_id.into(),
            lock: Arc::new(Mutex::new(())),
        }
    }

    /// Best-effort append; a journal failure never fails the session.
    pub fn record(&self, event: &SessionEvent) {
        if let Err(err) = self.append(event) {
            tracing::warn!(
                path = %self.path.display(),
                "failed to append session event: {err:#}"
            );
        }
    }

    fn append(&self, event: &SessionEvent) -> Result<()> {
        let line = self.encode(event)?;
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let _guard = self.lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("failed to open {}", self.path.display()))?;
        writeln!(file, "{line}")?;
        Ok(())
    }

    fn encode(&self, event: &SessionEvent) -> Result<String> {
        let Value::Object(mut row) = serde_json::to_value(event)? else {
            bail!("session event did not encode as an object");
        };
        row.insert("session_id".to_string(), Value::String(self.session_id.clone()));
        row.insert(
            "ts".to_string(),
            Value::String(Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)),
        );
        Ok(serde_json::to_string(&row)?)
    }
}
