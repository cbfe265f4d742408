//! Shared test utilities for reading back log directories.

#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};

/// Every `<N>.txt` file under `root`, ordered by day then file number.
pub fn log_files(root: &Path) -> Vec<PathBuf> {
    let mut days: Vec<PathBuf> = match fs::read_dir(root) {
        Ok(entries) => entries
            .map(|e| e.unwrap().path())
            .filter(|p| p.is_dir())
            .collect(),
        Err(_) => return Vec::new(),
    };
    days.sort();

    let mut files = Vec::new();
    for day in days {
        let mut numbered: Vec<(u32, PathBuf)> = fs::read_dir(&day)
            .unwrap()
            .map(|e| e.unwrap().path())
            .filter_map(|p| {
                let n = p.file_stem()?.to_str()?.parse::<u32>().ok()?;
                (p.extension()? == "txt").then_some((n, p))
            })
            .collect();
        numbered.sort();
        files.extend(numbered.into_iter().map(|(_, p)| p));
    }
    files
}

/// All lines under `root`, in file order.
pub fn read_all_lines(root: &Path) -> Vec<String> {
    let mut lines = Vec::new();
    for file in log_files(root) {
        let content = fs::read_to_string(&file).unwrap();
        assert!(
            content.is_empty() || content.ends_with('\n'),
            "{} ends with a partial line",
            file.display()
        );
        lines.extend(content.lines().map(str::to_string));
    }
    lines
}

/// Last field of a formatted line (the message for event records).
pub fn message_of(line: &str) -> &str {
    line.rsplit(" | ").next().unwrap_or(line)
}
