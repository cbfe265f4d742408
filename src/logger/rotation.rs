//! Rotating file sink.
//!
//! Layout: `<root>/<YYYY-MM-DD>/<N>.txt`. Day directories are created on
//! demand and files within a day are numbered from 1. Before every line the
//! sink checks the active file's size and moves to the next number once the
//! cap has been reached, so a line never spans two files.

use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use tracing::{debug, info};

use crate::logger::format::format_record;
use crate::logger::types::LoggerError;
use crate::record::Record;

/// Extension of log files
pub const LOG_FILE_EXTENSION: &str = "txt";

/// Summary of one `write_batch` call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BatchReport {
    /// Lines written
    pub lines: u64,
    /// Bytes written
    pub bytes: u64,
    /// Files opened because the previous one reached the cap
    pub rotations: u64,
}

struct ActiveFile {
    day: NaiveDate,
    index: u32,
    path: PathBuf,
    writer: BufWriter<File>,
    size: u64,
}

/// Appends formatted records to the day's current numbered file.
pub struct RotatingFileSink {
    root: PathBuf,
    max_file_bytes: u64,
    sync_on_flush: bool,
    active: Option<ActiveFile>,
    line: String,
}

impl RotatingFileSink {
    /// Create a sink rooted at `root`; nothing is opened until the first write
    pub fn new(root: impl Into<PathBuf>, max_file_bytes: u64, sync_on_flush: bool) -> Self {
        Self {
            root: root.into(),
            max_file_bytes: max_file_bytes.max(1),
            sync_on_flush,
            active: None,
            line: String::with_capacity(256),
        }
    }

    /// Root directory
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of the file currently being appended to
    pub fn current_path(&self) -> Option<&Path> {
        self.active.as_ref().map(|f| f.path.as_path())
    }

    /// Number of the file currently being appended to
    pub fn current_index(&self) -> Option<u32> {
        self.active.as_ref().map(|f| f.index)
    }

    /// Directory holding the files for `day`
    pub fn day_dir(&self, day: NaiveDate) -> PathBuf {
        self.root.join(day.format("%Y-%m-%d").to_string())
    }

    /// Format and append every record in `batch`, in order, then flush.
    pub fn write_batch(&mut self, batch: &[Record]) -> Result<BatchReport, LoggerError> {
        let mut report = BatchReport::default();
        let mut line = std::mem::take(&mut self.line);

        let result = (|| -> Result<(), LoggerError> {
            for record in batch {
                line.clear();
                format_record(record, &mut line);
                let day = record.timestamp().date_naive();
                if self.write_line(day, line.as_bytes())? {
                    report.rotations += 1;
                }
                report.lines += 1;
                report.bytes += line.len() as u64;
            }
            self.flush()
        })();

        self.line = line;
        result.map(|()| report)
    }

    /// Append one already-formatted line; returns whether the file rotated.
    fn write_line(&mut self, day: NaiveDate, line: &[u8]) -> Result<bool, LoggerError> {
        let mut rotated = false;
        let reopen = match &self.active {
            None => true,
            Some(file) => file.day != day,
        };

        if reopen {
            self.close_active()?;
            self.active = Some(self.open_for_day(day)?);
        } else if let Some(file) = &self.active {
            if file.size >= self.max_file_bytes {
                let next = file.index + 1;
                self.close_active()?;
                let file = self.open_file(day, next)?;
                info!(path = %file.path.display(), "rotated log file");
                self.active = Some(file);
                rotated = true;
            }
        }

        let Some(file) = self.active.as_mut() else {
            return Ok(rotated);
        };
        file.writer
            .write_all(line)
            .map_err(|source| LoggerError::Write {
                path: file.path.clone(),
                source,
            })?;
        file.size += line.len() as u64;
        Ok(rotated)
    }

    /// Flush buffered lines to the OS (and to disk if `sync_on_flush`)
    pub fn flush(&mut self) -> Result<(), LoggerError> {
        let Some(file) = self.active.as_mut() else {
            return Ok(());
        };
        flush_file(file, self.sync_on_flush)
    }

    /// Flush and force the active file to stable storage
    pub fn sync(&mut self) -> Result<(), LoggerError> {
        let Some(file) = self.active.as_mut() else {
            return Ok(());
        };
        flush_file(file, true)
    }

    fn close_active(&mut self) -> Result<(), LoggerError> {
        match self.active.take() {
            Some(mut file) => flush_file(&mut file, true),
            None => Ok(()),
        }
    }

    /// Open the file to continue for `day`: the highest existing number if
    /// it is still below the cap, otherwise the next one.
    fn open_for_day(&self, day: NaiveDate) -> Result<ActiveFile, LoggerError> {
        let dir = self.day_dir(day);
        fs::create_dir_all(&dir).map_err(|source| LoggerError::CreateDir {
            path: dir.clone(),
            source,
        })?;

        let index = match highest_index(&dir).map_err(|source| LoggerError::CreateDir {
            path: dir.clone(),
            source,
        })? {
            Some((index, size)) if size < self.max_file_bytes => index,
            Some((index, _)) => index + 1,
            None => 1,
        };
        self.open_file(day, index)
    }

    fn open_file(&self, day: NaiveDate, index: u32) -> Result<ActiveFile, LoggerError> {
        let dir = self.day_dir(day);
        let path = dir.join(format!("{index}.{LOG_FILE_EXTENSION}"));
        let open = || -> io::Result<(File, u64)> {
            fs::create_dir_all(&dir)?;
            let file = OpenOptions::new().create(true).append(true).open(&path)?;
            let size = file.metadata()?.len();
            Ok((file, size))
        };
        let (file, size) = open().map_err(|source| LoggerError::Open {
            path: path.clone(),
            source,
        })?;

        if tracing::enabled!(tracing::Level::DEBUG) {
            debug!(path = %path.display(), size, "opened log file");
        }
        Ok(ActiveFile {
            day,
            index,
            path,
            writer: BufWriter::with_capacity(64 * 1024, file),
            size,
        })
    }
}

impl Drop for RotatingFileSink {
    fn drop(&mut self) {
        let _ = self.close_active();
    }
}

fn flush_file(file: &mut ActiveFile, sync: bool) -> Result<(), LoggerError> {
    let result = file.writer.flush().and_then(|()| {
        if sync {
            file.writer.get_ref().sync_data()
        } else {
            Ok(())
        }
    });
    result.map_err(|source| LoggerError::Write {
        path: file.path.clone(),
        source,
    })
}

/// Highest `<N>.txt` in `dir` and its size
fn highest_index(dir: &Path) -> io::Result<Option<(u32, u64)>> {
    let mut best: Option<(u32, u64)> = None;
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some(LOG_FILE_EXTENSION) {
            continue;
        }
        let Some(index) = path
            .file_stem()
            .and_then(|s| s.to_str())
            .and_then(|s| s.parse::<u32>().ok())
        else {
            continue;
        };
        if best.map_or(true, |(b, _)| index > b) {
            best = Some((index, entry.metadata()?.len()));
        }
    }
    Ok(best)
}
