//! Serialized CSV sink shared by all workers.
//!
//! One mutex guards the underlying `csv::Writer`, so rows from concurrent
//! workers never interleave. All rows for one identifier go out under a
//! single lock acquisition.

use crate::error::FetchError;
use crate::types::{AssigneeRecord, OutputMode, OUTPUT_HEADER};
use csv::Writer;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};

const DEFAULT_BUFFER_SIZE: usize = 8192; // 8KB buffer

/// Thread-safe row writer.
pub struct ResultWriter<W: Write> {
    inner: Mutex<Writer<W>>,
    rows_written: AtomicU64,
}

impl ResultWriter<BufWriter<File>> {
    /// Open `path` as the output sink.
    ///
    /// In `Create` mode the file is truncated and the header written. In
    /// `Append` mode the header is written only if the file is new or empty.
    pub fn create<P: AsRef<Path>>(path: P, mode: OutputMode) -> Result<Self, FetchError> {
        let path = path.as_ref();
        tracing::info!(path = %path.display(), %mode, "opening output file");

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| {
                FetchError::file_error(
                    parent.to_string_lossy(),
                    format!("Failed to create directory: {}", e),
                )
            })?;
        }

        let open_result = match mode {
            OutputMode::Create => File::create(path),
            OutputMode::Append => OpenOptions::new().create(true).append(true).open(path),
        };
        let file = open_result.map_err(|e| {
            FetchError::file_error(
                path.to_string_lossy(),
                format!("Failed to open output file: {}", e),
            )
        })?;

        let needs_header = match mode {
            OutputMode::Create => true,
            OutputMode::Append => file
                .metadata()
                .map(|m| m.len() == 0)
                .map_err(|e| FetchError::file_error(path.to_string_lossy(), e.to_string()))?,
        };

        let buf_writer = BufWriter::with_capacity(DEFAULT_BUFFER_SIZE, file);
        Self::from_writer(buf_writer, needs_header)
    }

    /// Flush buffered rows and sync the file to disk.
    ///
    /// Returns the number of data rows written.
    pub fn finish(&self) -> Result<u64, FetchError> {
        let mut writer = self.lock();
        writer.flush()?;
        writer.get_ref().get_ref().sync_all()?;
        Ok(self.rows_written())
    }
}

impl<W: Write> ResultWriter<W> {
    /// Wrap an arbitrary writer, optionally emitting the header first.
    pub fn from_writer(writer: W, write_header: bool) -> Result<Self, FetchError> {
        let mut csv_writer = Writer::from_writer(writer);
        if write_header {
            csv_writer.write_record(OUTPUT_HEADER)?;
        }

        Ok(Self {
            inner: Mutex::new(csv_writer),
            rows_written: AtomicU64::new(0),
        })
    }

    fn lock(&self) -> MutexGuard<'_, Writer<W>> {
        // Poisoning leaves at worst one partially buffered record.
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Write a single row.
    pub fn write_row(&self, record: &AssigneeRecord) -> Result<(), FetchError> {
        self.write_rows(std::slice::from_ref(record))
    }

    /// Write several rows under one lock acquisition.
    ///
    /// A failure part way through leaves the rows before it in the sink.
    /// They are counted in `rows_written` and the error says how many of
    /// `records` went out.
    pub fn write_rows(&self, records: &[AssigneeRecord]) -> Result<(), FetchError> {
        let mut writer = self.lock();
        for (written, record) in records.iter().enumerate() {
            let result = writer.write_record([
                record.patent_id.as_str(),
                record.assignee_id.as_str(),
                record.assignee_organization.as_str(),
            ]);
            if let Err(e) = result {
                self.rows_written.fetch_add(written as u64, Ordering::SeqCst);
                return Err(FetchError::output(format!(
                    "wrote {} of {} rows for '{}' before failing: {}",
                    written,
                    records.len(),
                    record.patent_id,
                    e
                )));
            }
        }
        self.rows_written
            .fetch_add(records.len() as u64, Ordering::SeqCst);
        Ok(())
    }

    /// Data rows written so far (header excluded).
    pub fn rows_written(&self) -> u64 {
        self.rows_written.load(Ordering::SeqCst)
    }

    /// Flush buffered rows to the underlying writer.
    pub fn flush(&self) -> Result<(), FetchError> {
        self.lock().flush()?;
        Ok(())
    }

    /// Flush and return the underlying writer.
    pub fn into_inner(self) -> Result<W, FetchError> {
        let writer = self
            .inner
            .into_inner()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        writer
            .into_inner()
            .map_err(|e| FetchError::output(format!("Failed to flush output: {}", e.error())))
    }
}
