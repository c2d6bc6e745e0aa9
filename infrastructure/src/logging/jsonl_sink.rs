//! JSONL file sink for transition events
//!
//! Each event is serialized as a single JSON line with a `timestamp` field
//! added, appended to the file via a buffered writer.
//!
//! Thread-safe via `Mutex<BufWriter<File>>`. Flushes after every write so a
//! crash loses at most the event being written.

use async_trait::async_trait;
use conclave_application::ports::event_sink::{EventSink, SinkError};
use conclave_domain::TransitionEvent;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::warn;

pub struct JsonlEventSink {
    writer: Mutex<BufWriter<File>>,
    path: PathBuf,
}

impl JsonlEventSink {
    /// Open (or create) the event log at the given path, appending.
    ///
    /// Creates parent directories if they don't exist. Returns `None` if the
    /// file cannot be opened.
    pub fn new(path: impl AsRef<Path>) -> Option<Self> {
        let path = path.as_ref();

        if let Some(parent) = path.parent()
            && let Err(e) = std::fs::create_dir_all(parent)
        {
            warn!(
                "Could not create event log directory {}: {}",
                parent.display(),
                e
            );
            return None;
        }

        let file = match OpenOptions::new().create(true).append(true).open(path) {
            Ok(f) => f,
            Err(e) => {
                warn!("Could not open event log file {}: {}", path.display(), e);
                return None;
            }
        };

        Some(Self {
            writer: Mutex::new(BufWriter::new(file)),
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl EventSink for JsonlEventSink {
    async fn publish(&self, event: &TransitionEvent) -> Result<(), SinkError> {
        let timestamp = chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true);

        let mut record = serde_json::to_value(event)
            .map_err(|e| SinkError::Unavailable(format!("serialize event: {e}")))?;
        if let serde_json::Value::Object(map) = &mut record {
            map.insert(
                "timestamp".to_string(),
                serde_json::Value::String(timestamp),
            );
        }

        let mut writer = self
            .writer
            .lock()
            .map_err(|_| SinkError::Unavailable("event log lock poisoned".to_string()))?;
        writeln!(writer, "{record}")
            .and_then(|()| writer.flush())
            .map_err(|e| SinkError::Unavailable(format!("write event: {e}")))
    }
}
