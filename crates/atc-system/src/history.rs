//! Append-only airspace history file.
//!
//! Writes a header block on open, then one "Airspace State" block plus
//! a "Separation Analysis" block per cycle. The file is flushed every
//! cycle; a failed write drops the handle and the next cycle attempts
//! to reopen it.

use crate::registry::AircraftRegistry;
use crate::runner::{PeriodicTask, TaskFlow};
use async_trait::async_trait;
use atc_core::models::AircraftState;
use atc_core::rules::{HISTORY_LOGGING_INTERVAL_MS, LOGGING_PRIORITY};
use atc_core::separation;
use atc_core::AtcError;
use chrono::Local;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

pub struct HistoryLogger {
    registry: Arc<AircraftRegistry>,
    path: PathBuf,
    writer: Mutex<Option<BufWriter<File>>>,
}

impl HistoryLogger {
    pub fn new(path: impl AsRef<Path>, registry: Arc<AircraftRegistry>) -> Arc<Self> {
        let logger = Arc::new(Self {
            registry,
            path: path.as_ref().to_path_buf(),
            writer: Mutex::new(None),
        });

        match logger.open() {
            Ok(()) => tracing::info!(path = %logger.path.display(), "history logger initialized"),
            Err(err) => tracing::warn!(
                path = %logger.path.display(),
                "history file unavailable, will retry: {err}"
            ),
        }

        logger
    }

    fn open(&self) -> Result<(), AtcError> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|err| AtcError::TransientIo(format!("open history file: {err}")))?;

        let mut writer = BufWriter::new(file);
        write_header(&mut writer)
            .map_err(|err| AtcError::TransientIo(format!("write history header: {err}")))?;

        *self
            .writer
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(writer);
        Ok(())
    }

    fn write_cycle(&self, states: &[AircraftState]) -> std::io::Result<()> {
        let mut guard = self
            .writer
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let writer = guard
            .as_mut()
            .ok_or_else(|| std::io::Error::other("history file not open"))?;

        write_state_entry(writer, states)?;
        writer.flush()
    }

    /// Drop the writer so the next cycle reopens the file.
    fn invalidate(&self) {
        *self
            .writer
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = None;
    }
}

fn write_header(writer: &mut impl Write) -> std::io::Result<()> {
    writeln!(writer)?;
    writeln!(writer, "=== ATC System History Log ===")?;
    writeln!(writer, "Started at: {}", Local::now().format("%Y-%m-%d %H:%M:%S"))?;
    writeln!(writer, "Logging interval: {HISTORY_LOGGING_INTERVAL_MS}ms")?;
    writeln!(writer, "{}", "-".repeat(50))?;
    writer.flush()
}

fn write_state_entry(writer: &mut impl Write, states: &[AircraftState]) -> std::io::Result<()> {
    writeln!(
        writer,
        "\n=== Airspace State at {} ===",
        Local::now().format("%Y-%m-%d %H:%M:%S")
    )?;
    writeln!(writer, "Active Aircraft: {}\n", states.len())?;

    for state in states {
        writeln!(writer, "Aircraft ID: {}", state.callsign)?;
        writeln!(
            writer,
            "Position: ({:.2}, {:.2}, {:.2})",
            state.position.x, state.position.y, state.position.z
        )?;
        writeln!(writer, "Speed: {:.2} units/s", state.speed())?;
        writeln!(writer, "Heading: {:.2} degrees", state.heading)?;
        writeln!(writer, "Status: {}", state.status)?;
        writeln!(writer, "Timestamp: {}\n", state.timestamp_ms)?;
    }

    if states.len() > 1 {
        writeln!(writer, "Separation Analysis:")?;
        for i in 0..states.len() {
            for j in (i + 1)..states.len() {
                let (horizontal, vertical) = separation::separation(&states[i], &states[j]);
                writeln!(
                    writer,
                    "{} - {}: Horizontal: {:.2}, Vertical: {:.2}",
                    states[i].callsign, states[j].callsign, horizontal, vertical
                )?;
            }
        }
    }

    writeln!(writer, "{}", "-".repeat(80))
}

#[async_trait]
impl PeriodicTask for HistoryLogger {
    fn name(&self) -> &str {
        "history"
    }

    fn priority(&self) -> i32 {
        LOGGING_PRIORITY
    }

    async fn execute(&self) -> Result<TaskFlow, AtcError> {
        let has_writer = self
            .writer
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .is_some();
        if !has_writer {
            self.open()?;
        }

        let states = self.registry.snapshot();
        if let Err(err) = self.write_cycle(&states) {
            self.invalidate();
            return Err(AtcError::TransientIo(format!("history write failed: {err}")));
        }

        Ok(TaskFlow::Continue)
    }
}
