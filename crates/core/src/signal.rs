//! File-based progress signals written by the client.
//!
//! `<name>_alert.txt` holds `key: value` lines for one tracked pet that reached
//! its goal; `<name>_exp.txt` holds one pipe-separated row per recorded slot.
//! Both are consumed at most once: the engine deletes a file before polling again.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use regex::Regex;

use crate::error::SignalError;
use crate::logger;

pub const ALERT_SUFFIX: &str = "_alert.txt";
pub const SCAN_SUFFIX: &str = "_exp.txt";

/// Parsed `<name>_alert.txt`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlertSignal {
    pub name: String,
    pub pet_id: Option<u64>,
    pub pet_name: String,
    pub level: u32,
    pub current_metric: u64,
    pub target_metric: u64,
    pub timestamp: String,
}

/// One row of `<name>_exp.txt`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanRow {
    pub name: String,
    pub pet_id: u64,
    pub level: u32,
    pub current_metric: u64,
    pub next_level_metric: u64,
    pub timestamp: String,
}

fn parse_number<T: std::str::FromStr>(raw: &str) -> Option<T> {
    let cleaned: String = raw.chars().filter(|c| !matches!(c, ',' | ' ' | '_')).collect();
    cleaned.parse().ok()
}

/// Parse alert text. `Pet Level` and `PET EXP ACTUAL` are required.
pub fn parse_alert(text: &str) -> Result<AlertSignal, String> {
    let mut alert = AlertSignal {
        name: String::new(),
        pet_id: None,
        pet_name: String::new(),
        level: 0,
        current_metric: 0,
        target_metric: 0,
        timestamp: String::new(),
    };
    let (mut has_level, mut has_metric) = (false, false);

    for line in text.lines() {
        let Some((key, value)) = line.split_once(':') else { continue };
        let value = value.trim();
        match key.trim().to_ascii_lowercase().as_str() {
            "name" => alert.name = value.to_string(),
            "database id" => alert.pet_id = parse_number(value),
            "pet name" => alert.pet_name = value.to_string(),
            "pet level" => {
                alert.level = parse_number(value).ok_or_else(|| format!("bad level '{}'", value))?;
                has_level = true;
            }
            "pet exp actual" => {
                alert.current_metric =
                    parse_number(value).ok_or_else(|| format!("bad exp '{}'", value))?;
                has_metric = true;
            }
            "target exp" => alert.target_metric = parse_number(value).unwrap_or(0),
            "timestamp" => alert.timestamp = value.to_string(),
            _ => {}
        }
    }
    if !has_level {
        return Err("missing 'Pet Level'".into());
    }
    if !has_metric {
        return Err("missing 'PET EXP ACTUAL'".into());
    }
    Ok(alert)
}

fn scan_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"^\[(?P<name>[^\]]*)\]\s*Pet:\s*\(ID:\s*(?P<id>\d+)\)\s*\|\s*Level:\s*(?P<level>\d+)\s*\|\s*Current EXP:\s*(?P<cur>[\d,]+)\s*\|\s*Next Level EXP:\s*(?P<next>[\d,]+)\s*\|\s*Date:\s*(?P<date>.*?)\s*$",
        )
        .expect("static regex")
    })
}

/// Parse one dump row.
pub fn parse_scan_row(line: &str) -> Option<ScanRow> {
    let caps = scan_pattern().captures(line.trim())?;
    Some(ScanRow {
        name: caps["name"].to_string(),
        pet_id: parse_number(&caps["id"])?,
        level: parse_number(&caps["level"])?,
        current_metric: parse_number(&caps["cur"])?,
        next_level_metric: parse_number(&caps["next"])?,
        timestamp: caps["date"].to_string(),
    })
}

/// Parse a whole dump, skipping rows that do not match. Zero valid rows is an error.
pub fn parse_scan(text: &str) -> Result<Vec<ScanRow>, String> {
    let mut rows = Vec::new();
    for (n, line) in text.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        match parse_scan_row(line) {
            Some(row) => rows.push(row),
            None => logger::warn(&format!("skipping unparsable scan row {}: {}", n + 1, line)),
        }
    }
    if rows.is_empty() {
        return Err("no valid rows".into());
    }
    Ok(rows)
}

/// Pair row k with the k-th processed slot. Surplus rows are dropped.
pub fn map_rows_to_slots(rows: Vec<ScanRow>, processed: &[usize]) -> Vec<(usize, ScanRow)> {
    if rows.len() > processed.len() {
        logger::warn(&format!(
            "scan has {} rows for {} processed slots, extra rows dropped",
            rows.len(),
            processed.len()
        ));
    }
    processed.iter().copied().zip(rows).collect()
}

/// Remove `path`; a missing file is not an error.
pub fn remove_signal(path: &Path) -> Result<bool, SignalError> {
    match fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
        Err(source) => Err(SignalError::Io { path: path.to_path_buf(), source }),
    }
}

/// Read then delete. The file is deleted even when `parse` rejects it.
fn consume<T>(
    path: &Path,
    parse: impl FnOnce(&str) -> Result<T, String>,
) -> Result<Option<T>, SignalError> {
    let text = match fs::read_to_string(path) {
        Ok(t) => t,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(source) => return Err(SignalError::Io { path: path.to_path_buf(), source }),
    };
    remove_signal(path)?;
    parse(&text)
        .map(Some)
        .map_err(|reason| SignalError::Malformed { path: path.to_path_buf(), reason })
}

/// Directory the client writes signals into.
#[derive(Debug, Clone)]
pub struct SignalChannel {
    dir: PathBuf,
}

impl SignalChannel {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn alert_path(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{}{}", name, ALERT_SUFFIX))
    }

    pub fn scan_path(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{}{}", name, SCAN_SUFFIX))
    }

    /// Pending alert for `name`, deleted on read. Malformed files are logged and dropped.
    pub fn poll_alert(&self, name: &str) -> Option<AlertSignal> {
        match consume(&self.alert_path(name), parse_alert) {
            Ok(alert) => {
                if let Some(a) = &alert {
                    logger::info_p(
                        name,
                        &format!("alert: {} level {} exp {}", a.pet_name, a.level, a.current_metric),
                    );
                }
                alert
            }
            Err(e) => {
                logger::warn_p(name, &e.to_string());
                None
            }
        }
    }

    /// Pending scan dump for `name`, deleted on read.
    pub fn take_scan(&self, name: &str) -> Option<Vec<ScanRow>> {
        match consume(&self.scan_path(name), parse_scan) {
            Ok(rows) => rows,
            Err(e) => {
                logger::warn_p(name, &e.to_string());
                None
            }
        }
    }

    /// Delete leftover alert and scan files from a previous run.
    pub fn clean_stale(&self) -> usize {
        let Ok(entries) = fs::read_dir(&self.dir) else {
            logger::warn(&format!("signal dir {} is not readable", self.dir.display()));
            return 0;
        };
        let mut removed = 0;
        for entry in entries.flatten() {
            let path = entry.path();
            let file_name = entry.file_name().to_string_lossy().to_string();
            if !file_name.ends_with(ALERT_SUFFIX) && !file_name.ends_with(SCAN_SUFFIX) {
                continue;
            }
            match remove_signal(&path) {
                Ok(true) => removed += 1,
                Ok(false) => {}
                Err(e) => logger::warn(&e.to_string()),
            }
        }
        if removed > 0 {
            logger::info(&format!("removed {} stale signal file(s)", removed));
        }
        removed
    }
}
