//! JSON line-delimited run logging.
//!
//! Every simulation run gets a fresh run id; events are serialized one JSON
//! object per line so downstream tooling can tail or grep a run file.
//! A disabled logger is a no-op sink, which keeps the hot draw loop free of
//! conditionals at call sites.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::Serialize;
use uuid::Uuid;

use crate::error::UrnError;

/// A single loggable event.
#[derive(Debug, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum LogEvent<'a> {
    /// Engine phase transition.
    Phase { phase: &'a str },
    /// Backend setup milestone (wipe, base fill).
    BackendSetup { backend: &'a str, detail: &'a str },
    /// One retry attempt against the remote store.
    Retry {
        op: &'a str,
        attempt: u32,
        max_attempts: u32,
    },
    /// Periodic progress snapshot while running.
    Progress {
        round: usize,
        elements_seen: u64,
        pairs_seen: u64,
    },
}

#[derive(Serialize)]
struct Record<'a> {
    ts_ms: u128,
    run_id: &'a str,
    #[serde(flatten)]
    event: &'a LogEvent<'a>,
}

/// Line-delimited JSON logger, cheaply cloneable across epochs.
#[derive(Clone)]
pub struct JsonlLogger {
    sink: Option<Arc<Mutex<BufWriter<File>>>>,
    run_id: Arc<String>,
}

impl JsonlLogger {
    /// Logger that discards every event.
    pub fn disabled() -> Self {
        Self {
            sink: None,
            run_id: Arc::new(Uuid::new_v4().to_string()),
        }
    }

    /// Logger appending JSONL records to `path`.
    pub fn to_file<P: AsRef<Path>>(path: P) -> Result<Self, UrnError> {
        let file = File::options().create(true).append(true).open(path)?;
        Ok(Self {
            sink: Some(Arc::new(Mutex::new(BufWriter::new(file)))),
            run_id: Arc::new(Uuid::new_v4().to_string()),
        })
    }

    /// Run id attached to every record from this logger.
    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// Write one event. Logging failures never propagate.
    pub fn log(&self, event: &LogEvent<'_>) {
        let Some(sink) = &self.sink else {
            return;
        };
        let record = Record {
            ts_ms: SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_millis())
                .unwrap_or(0),
            run_id: self.run_id.as_str(),
            event,
        };
        if let Ok(line) = serde_json::to_string(&record) {
            if let Ok(mut writer) = sink.lock() {
                let _ = writeln!(writer, "{}", line);
                let _ = writer.flush();
            }
        }
    }
}
