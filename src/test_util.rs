//! Helpers shared by the unit tests that read back log directories.

use std::fs;
use std::path::{Path, PathBuf};

/// Every `<N>.txt` file under `root`, ordered by day then file number
pub(crate) fn log_files(root: &Path) -> Vec<PathBuf> {
    let Ok(entries) = fs::read_dir(root) else {
        return Vec::new();
    };
    let mut days: Vec<PathBuf> = entries
        .map(|e| e.unwrap().path())
        .filter(|p| p.is_dir())
        .collect();
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

/// All lines under `root`, in day and file order
pub(crate) fn all_lines(root: &Path) -> Vec<String> {
    let mut lines = Vec::new();
    for file in log_files(root) {
        let content = fs::read_to_string(&file).unwrap();
        lines.extend(content.lines().map(str::to_string));
    }
    lines
}
