//! JSON Lines trade log.
//!
//! Uses JSON Lines format (.jsonl) for robustness:
//! - Each line is a complete JSON object
//! - Partial file corruption only affects individual lines
//! - Can be read even if write was interrupted
//!
//! Files rotate daily on the record's own UTC date:
//! `{data_dir}/trades_{YYYY-mm-dd}.jsonl`.

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use xarb_core::{ExecutionIncident, TradeEvent};

use crate::error::PersistenceResult;

/// Trade log settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistenceConfig {
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
    /// Records buffered before a flush. Trades are rare; 1 writes through.
    #[serde(default = "default_max_buffer_size")]
    pub max_buffer_size: usize,
}

fn default_enabled() -> bool {
    true
}

fn default_data_dir() -> String {
    "data/trades".to_string()
}

fn default_max_buffer_size() -> usize {
    1
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            data_dir: default_data_dir(),
            max_buffer_size: default_max_buffer_size(),
        }
    }
}

/// One line of the trade log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "record", rename_all = "snake_case")]
pub enum TradeLogRecord {
    Trade(TradeEvent),
    Incident(ExecutionIncident),
}

impl TradeLogRecord {
    fn timestamp(&self) -> DateTime<Utc> {
        match self {
            Self::Trade(e) => e.timestamp,
            Self::Incident(i) => i.timestamp,
        }
    }
}

impl From<TradeEvent> for TradeLogRecord {
    fn from(event: TradeEvent) -> Self {
        Self::Trade(event)
    }
}

impl From<ExecutionIncident> for TradeLogRecord {
    fn from(incident: ExecutionIncident) -> Self {
        Self::Incident(incident)
    }
}

/// Active writer state for daily file.
struct ActiveWriter {
    writer: BufWriter<File>,
    date: String,
    records_written: usize,
}

/// Append-only JSON Lines writer for trade-log records.
///
/// Uses append mode - safe for interrupted writes.
pub struct TradeLogWriter {
    base_dir: PathBuf,
    buffer: Vec<TradeLogRecord>,
    max_buffer_size: usize,
    /// Open until date rotation.
    active_writer: Option<ActiveWriter>,
}

impl TradeLogWriter {
    /// Create a new writer under `base_dir`.
    pub fn new(base_dir: impl Into<PathBuf>, max_buffer_size: usize) -> Self {
        let base_dir = base_dir.into();
        if let Err(e) = std::fs::create_dir_all(&base_dir) {
            warn!(?e, dir = %base_dir.display(), "Failed to create trade log directory");
        }

        Self {
            base_dir,
            buffer: Vec::with_capacity(max_buffer_size.max(1)),
            max_buffer_size: max_buffer_size.max(1),
            active_writer: None,
        }
    }

    pub fn from_config(config: &PersistenceConfig) -> Self {
        Self::new(&config.data_dir, config.max_buffer_size)
    }

    /// Buffer a record, flushing once the buffer is full.
    pub fn append(&mut self, record: impl Into<TradeLogRecord>) -> PersistenceResult<()> {
        self.buffer.push(record.into());

        if self.buffer.len() >= self.max_buffer_size {
            self.flush()?;
        }

        Ok(())
    }

    #[must_use]
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }

    /// Close the active writer.
    fn close_active_writer(&mut self) {
        if let Some(mut active) = self.active_writer.take() {
            if let Err(e) = active.writer.flush() {
                warn!(?e, "Failed to flush writer on close");
            }
            info!(
                date = %active.date,
                records = active.records_written,
                "Closed trade log writer"
            );
        }
    }

    /// Writer for `date`, rotating if the open file is for another day.
    fn writer_for(&mut self, date: &str) -> PersistenceResult<&mut ActiveWriter> {
        if self.active_writer.as_ref().is_some_and(|w| w.date != date) {
            self.close_active_writer();
        }

        let active = match self.active_writer.take() {
            Some(active) => active,
            None => {
                let path = self.base_dir.join(format!("trades_{date}.jsonl"));
                info!(path = %path.display(), "Opening trade log (append mode)");

                // Append mode - won't truncate existing data
                let file = OpenOptions::new().create(true).append(true).open(&path)?;
                ActiveWriter {
                    writer: BufWriter::new(file),
                    date: date.to_string(),
                    records_written: 0,
                }
            }
        };
        Ok(self.active_writer.insert(active))
    }

    /// Flush buffered records to their daily files.
    pub fn flush(&mut self) -> PersistenceResult<()> {
        if self.buffer.is_empty() {
            return Ok(());
        }

        let records = std::mem::take(&mut self.buffer);
        let record_count = records.len();
        for record in &records {
            let date = record.timestamp().format("%Y-%m-%d").to_string();
            let json = serde_json::to_string(record)?;
            let active = self.writer_for(&date)?;
            writeln!(active.writer, "{json}")?;
            active.records_written += 1;
        }

        if let Some(active) = self.active_writer.as_mut() {
            active.writer.flush()?;
        }

        debug!(records = record_count, "Flushed trade log");
        Ok(())
    }

    /// Close the writer, flushing any pending data.
    pub fn close(&mut self) -> PersistenceResult<()> {
        self.flush()?;
        self.close_active_writer();
        Ok(())
    }
}

impl Drop for TradeLogWriter {
    fn drop(&mut self) {
        if let Err(e) = self.flush() {
            warn!(?e, "Failed to flush buffer on drop");
        }
        self.close_active_writer();
    }
}
