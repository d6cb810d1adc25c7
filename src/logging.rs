//! Structured logging module for Quarterback
//!
//! Writes logs to $QUARTERBACK_LOG_DIR (default ./logs) with categories:
//! - UPLOAD: CSV ingestion and persona creation
//! - SHEETS: Google Sheets reads and imports
//! - ENRICH: Persona enrichment runs
//! - QUERY: Persona chat turns
//! - WEBHOOK: Notification sink deliveries
//! - CONVERSATION: Session lifecycle
//! - ERROR: Errors

use chrono::{Local, Utc};
use once_cell::sync::Lazy;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Mutex;

/// Log categories for structured logging
#[derive(Debug, Clone, Copy)]
pub enum LogCategory {
    Upload,
    Sheets,
    Enrich,
    Query,
    Webhook,
    Conversation,
    Error,
}

impl LogCategory {
    fn as_str(&self) -> &'static str {
        match self {
            LogCategory::Upload => "UPLOAD",
            LogCategory::Sheets => "SHEETS",
            LogCategory::Enrich => "ENRICH",
            LogCategory::Query => "QUERY",
            LogCategory::Webhook => "WEBHOOK",
            LogCategory::Conversation => "CONVERSATION",
            LogCategory::Error => "ERROR",
        }
    }
}

/// Current log file path, set by init_logging
static LOG_FILE: Lazy<Mutex<Option<PathBuf>>> = Lazy::new(|| Mutex::new(None));

fn get_log_dir() -> PathBuf {
    std::env::var("QUARTERBACK_LOG_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("./logs"))
}

fn get_log_file_path() -> PathBuf {
    let today = Local::now().format("%Y-%m-%d").to_string();
    get_log_dir().join(format!("quarterback-{}.log", today))
}

/// Initialize the logging system - creates the log directory if needed
pub fn init_logging() -> Result<(), Box<dyn std::error::Error>> {
    let log_dir = get_log_dir();

    if !log_dir.exists() {
        fs::create_dir_all(&log_dir)?;
    }

    let log_path = get_log_file_path();
    if let Ok(mut current) = LOG_FILE.lock() {
        *current = Some(log_path);
    }

    log(LogCategory::Conversation, None, "Quarterback logging initialized");

    Ok(())
}

/// Log a message with category and optional persona context
pub fn log(category: LogCategory, persona_id: Option<&str>, message: &str) {
    let timestamp = Local::now().format("%Y-%m-%d %H:%M:%S").to_string();
    let persona_context = persona_id
        .map(|id| format!("persona={} | ", &id[..8.min(id.len())]))
        .unwrap_or_default();

    let log_line = format!(
        "[{}] [{}] {}{}\n",
        timestamp,
        category.as_str(),
        persona_context,
        message
    );

    print!("{}", log_line);

    let log_path = LOG_FILE
        .lock()
        .ok()
        .and_then(|path| path.clone())
        .unwrap_or_else(get_log_file_path);
    if let Ok(mut file) = OpenOptions::new().create(true).append(true).open(&log_path) {
        let _ = file.write_all(log_line.as_bytes());
    }
}

pub fn log_upload(persona_id: Option<&str>, message: &str) {
    log(LogCategory::Upload, persona_id, message);
}

pub fn log_sheets(persona_id: Option<&str>, message: &str) {
    log(LogCategory::Sheets, persona_id, message);
}

pub fn log_enrich(persona_id: Option<&str>, message: &str) {
    log(LogCategory::Enrich, persona_id, message);
}

pub fn log_query(persona_id: Option<&str>, message: &str) {
    log(LogCategory::Query, persona_id, message);
}

pub fn log_webhook(persona_id: Option<&str>, message: &str) {
    log(LogCategory::Webhook, persona_id, message);
}

pub fn log_conversation(persona_id: Option<&str>, message: &str) {
    log(LogCategory::Conversation, persona_id, message);
}

pub fn log_error(persona_id: Option<&str>, message: &str) {
    log(LogCategory::Error, persona_id, message);
}

/// Clean up old log files (keep last 7 days)
pub fn cleanup_old_logs() -> Result<usize, Box<dyn std::error::Error>> {
    let log_dir = get_log_dir();
    let mut deleted = 0;

    if !log_dir.exists() {
        return Ok(0);
    }

    let cutoff = Utc::now() - chrono::Duration::days(7);

    for entry in fs::read_dir(&log_dir)? {
        let entry = entry?;
        let path = entry.path();

        if let Ok(metadata) = entry.metadata() {
            if let Ok(modified) = metadata.modified() {
                let modified_time: chrono::DateTime<Utc> = modified.into();
                if modified_time < cutoff && fs::remove_file(&path).is_ok() {
                    deleted += 1;
                }
            }
        }
    }

    Ok(deleted)
}
