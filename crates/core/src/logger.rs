use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::sync::{mpsc, Mutex, OnceLock};
use chrono::Local;

static LOGGER: OnceLock<Mutex<Logger>> = OnceLock::new();

struct Logger {
    file: Option<File>,
    sink: Option<mpsc::Sender<LogLine>>,
    prefixes: HashMap<String, u8>, // prefix -> color index
}

// Color indices for the operator surface
pub const COLOR_GRAY: u8 = 1;
pub const COLOR_BLUE: u8 = 2;
pub const COLOR_GREEN: u8 = 3;

/// One structured log record forwarded to the operator surface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogLine {
    pub level: &'static str,
    pub prefix: String,
    pub color: u8,
    pub timestamp: String,
    pub message: String,
}

impl LogLine {
    /// Plain-text rendering, identical to the file format.
    pub fn render(&self) -> String {
        if self.prefix.is_empty() {
            format!("[{}] [{}] {}", self.timestamp, self.level, self.message)
        } else {
            format!("[{}] [{}] [{}] {}", self.timestamp, self.level, self.prefix, self.message)
        }
    }
}

/// Initialize the global logger. Clears the log file.
pub fn init(log_dir: &Path) {
    fs::create_dir_all(log_dir).ok();
    let log_path = log_dir.join("app.log");
    let file = OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(&log_path)
        .ok();

    LOGGER
        .set(Mutex::new(Logger { file, sink: None, prefixes: HashMap::new() }))
        .ok();
}

/// Initialize without a log file (tests, dry runs).
pub fn init_memory() {
    LOGGER
        .set(Mutex::new(Logger { file: None, sink: None, prefixes: HashMap::new() }))
        .ok();
}

/// Wire the status/log stream channel.
pub fn set_sink(tx: mpsc::Sender<LogLine>) {
    if let Some(logger) = LOGGER.get() {
        if let Ok(mut l) = logger.lock() {
            l.sink = Some(tx);
        }
    }
}

/// Register a prefix with a color. All subsequent log calls through
/// the `_p` variants will use this prefix and color.
pub fn register_prefix(prefix: &str, color: u8) {
    if let Some(logger) = LOGGER.get() {
        if let Ok(mut l) = logger.lock() {
            l.prefixes.insert(prefix.to_string(), color);
        }
    }
}

fn write_log(level: &'static str, prefix: &str, msg: &str) {
    let Some(logger) = LOGGER.get() else { return };
    let Ok(mut l) = logger.lock() else { return };

    let line = LogLine {
        level,
        prefix: prefix.to_string(),
        color: l.prefixes.get(prefix).copied().unwrap_or(0),
        timestamp: Local::now().format("%H:%M:%S").to_string(),
        message: msg.to_string(),
    };

    if let Some(file) = l.file.as_mut() {
        writeln!(file, "{}", line.render()).ok();
    }
    if let Some(tx) = &l.sink {
        tx.send(line).ok();
    }
}

pub fn debug(msg: &str) {
    write_log("DEBUG", "", msg);
}

pub fn info(msg: &str) {
    write_log("INFO", "", msg);
}

pub fn warn(msg: &str) {
    write_log("WARN", "", msg);
}

pub fn error(msg: &str) {
    write_log("ERROR", "", msg);
}

/// Log with a registered prefix. Looks up the color from registration.
pub fn info_p(prefix: &str, msg: &str) {
    write_log("INFO", prefix, msg);
}

pub fn warn_p(prefix: &str, msg: &str) {
    write_log("WARN", prefix, msg);
}

pub fn error_p(prefix: &str, msg: &str) {
    write_log("ERROR", prefix, msg);
}
