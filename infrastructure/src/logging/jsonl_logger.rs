//! Council run history as JSON Lines
//!
//! One line per [`CouncilEvent`]: a sequence number, the wall-clock
//! timestamp, the event kind, the offset into the run, the round and
//! provider when the event concerns one, then the event's own fields.
//!
//! Lines are buffered and flushed whenever a round settles or a run ends,
//! so a reader tailing the file sees whole rounds.

use council_application::{CouncilEvent, CouncilEventKind, CouncilEventLogger};
use council_domain::Round;
use serde::Serialize;
use serde_json::{Map, Value};
use std::fs::{File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::warn;

#[derive(Serialize)]
struct EventLine<'a> {
    seq: u64,
    timestamp: String,
    #[serde(rename = "type")]
    kind: &'static str,
    elapsed_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    round: Option<Round>,
    #[serde(skip_serializing_if = "Option::is_none")]
    provider: Option<&'a str>,
    #[serde(flatten)]
    fields: &'a Map<String, Value>,
}

struct Sink {
    writer: BufWriter<File>,
    next_seq: u64,
    /// A write already failed and was reported
    broken: bool,
}

impl Sink {
    fn write(&mut self, event: &CouncilEvent) -> io::Result<()> {
        let line = EventLine {
            seq: self.next_seq,
            timestamp: chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
            kind: event.kind.as_str(),
            elapsed_ms: event.elapsed_ms,
            round: event.round,
            provider: event.provider.as_deref(),
            fields: &event.fields,
        };
        serde_json::to_writer(&mut self.writer, &line)?;
        self.writer.write_all(b"\n")?;
        self.next_seq += 1;

        if event.kind.is_terminal() || event.kind == CouncilEventKind::RoundSettled {
            self.writer.flush()?;
        }
        Ok(())
    }
}

/// Appends council events to a JSONL file. Several runs, and several
/// loggers over time, can share one file; `seq` counts per logger.
pub struct JsonlEventLogger {
    sink: Mutex<Sink>,
    path: PathBuf,
}

impl JsonlEventLogger {
    /// Open `path` for appending, creating it and its parent directories.
    pub fn open(path: impl AsRef<Path>) -> io::Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(path)?;

        Ok(Self {
            sink: Mutex::new(Sink {
                writer: BufWriter::new(file),
                next_seq: 0,
                broken: false,
            }),
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl CouncilEventLogger for JsonlEventLogger {
    fn log(&self, event: CouncilEvent) {
        let Ok(mut sink) = self.sink.lock() else {
            return;
        };
        if let Err(e) = sink.write(&event) {
            if !sink.broken {
                warn!(
                    "Could not write council event to {}: {}",
                    self.path.display(),
                    e
                );
            }
            sink.broken = true;
        }
    }
}
