//! Logger module
//!
//! Plain text log lines for the server and the dispatcher:
//! - Server lifecycle logging
//! - One access line per request
//! - Warning and error lines, also reachable through [`LogSink`]

pub mod writer;

use chrono::Local;
use std::net::SocketAddr;

use crate::config::Config;

/// Initialize the logger with configuration
///
/// Should be called once at application startup.
pub fn init(config: &Config) -> std::io::Result<()> {
    writer::init(
        config.logging.access_log_file.as_deref(),
        config.logging.error_log_file.as_deref(),
    )
}

/// Prefix a line with the local time
fn stamp(message: &str) -> String {
    format!("{} {message}", Local::now().format("%Y/%m/%d %H:%M:%S"))
}

/// Write to info/access log
fn write_info(message: &str) {
    let line = stamp(message);
    match writer::get() {
        Some(w) => w.write_info(&line),
        None => println!("{line}"),
    }
}

/// Write to error log
fn write_error(message: &str) {
    let line = stamp(message);
    match writer::get() {
        Some(w) => w.write_error(&line),
        None => eprintln!("{line}"),
    }
}

/// Write to access log specifically
fn write_access(message: &str) {
    let line = stamp(message);
    match writer::get() {
        Some(w) => w.write_access(&line),
        None => println!("{line}"),
    }
}

pub fn log_server_start(addr: &SocketAddr, config: &Config, resources: &[String]) {
    write_info("[INFO] ======================================");
    write_info(&format!("[INFO] Listening on: http://{addr}"));
    write_info(&format!("[INFO] API prefix: {}", config.api.prefix));
    write_info(&format!("[INFO] Resources: {}", resources.join(", ")));
    if let Some(workers) = config.server.workers {
        write_info(&format!("[INFO] Worker threads: {workers}"));
    }
    if let Some(ref path) = config.logging.access_log_file {
        write_info(&format!("[INFO] Access log: {path}"));
    }
    if let Some(ref path) = config.logging.error_log_file {
        write_info(&format!("[INFO] Error log: {path}"));
    }
    write_info("[INFO] ======================================");
}

pub fn log_info(message: &str) {
    write_info(&format!("[INFO] {message}"));
}

pub fn log_connection_error(err: &impl std::fmt::Display) {
    write_error(&format!("[ERROR] Failed to serve connection: {err}"));
}

pub fn log_error(message: &str) {
    write_error(&format!("[ERROR] {message}"));
}

pub fn log_warning(message: &str) {
    write_error(&format!("[WARN] {message}"));
}

/// Log one served request
pub fn log_access(peer: &SocketAddr, method: &str, path: &str, status: u16) {
    write_access(&format!("[ACCESS] {peer} \"{method} {path}\" {status}"));
}

pub fn log_shutdown(active_connections: usize) {
    write_info(&format!(
        "[INFO] Shutting down, {active_connections} connection(s) still active"
    ));
}

/// Destination for the warning and error lines of the dispatcher and
/// request contexts
pub trait LogSink: Send + Sync {
    fn warning(&self, line: &str);
    fn error(&self, line: &str);
}

/// Sink writing to the process log
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessLog;

impl LogSink for ProcessLog {
    fn warning(&self, line: &str) {
        log_warning(line);
    }

    fn error(&self, line: &str) {
        log_error(line);
    }
}

/// Sink keeping lines in memory
#[cfg(test)]
#[derive(Debug, Default)]
pub struct MemoryLog {
    warnings: std::sync::Mutex<Vec<String>>,
    errors: std::sync::Mutex<Vec<String>>,
}

#[cfg(test)]
impl MemoryLog {
    pub fn warnings(&self) -> Vec<String> {
        self.warnings.lock().unwrap().clone()
    }

    pub fn errors(&self) -> Vec<String> {
        self.errors.lock().unwrap().clone()
    }
}

#[cfg(test)]
impl LogSink for MemoryLog {
    fn warning(&self, line: &str) {
        self.warnings.lock().unwrap().push(line.to_string());
    }

    fn error(&self, line: &str) {
        self.errors.lock().unwrap().push(line.to_string());
    }
}
