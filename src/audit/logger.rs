use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use chrono::Utc;

use crate::cluster::ExecutionResult;

const MAX_LOG_SIZE: u64 = 10 * 1024 * 1024; // 10MB

/// Append-only record of every executed and every rejected command
#[derive(Debug)]
pub struct AuditLogger {
    log_path: PathBuf,
}

impl AuditLogger {
    /// Create an AuditLogger writing to `path`
    pub fn with_path<P: AsRef<Path>>(path: P) -> std::io::Result<Self> {
        let log_path = path.as_ref().to_path_buf();

        // Ensure directory exists
        if let Some(parent) = log_path.parent() {
            fs::create_dir_all(parent)?;
        }

        Ok(Self { log_path })
    }

    /// Log a command execution
    pub fn log_execution(&self, result: &ExecutionResult) -> std::io::Result<()> {
        let fault = match &result.fault {
            Some(fault) => format!(" [fault:{}]", fault),
            None => String::new(),
        };

        let log_entry = format!(
            "[{}] [{}] [exit:{}] [truncated:{}]{} {}\n",
            Utc::now().to_rfc3339(),
            current_user(),
            result.exit_code,
            result.truncated,
            fault,
            result.command
        );

        self.append(&log_entry)
    }

    /// Log a critic rejection for forensics
    ///
    /// Records the prompt, the model output and the rule that fired. This
    /// helps detect prompt-injection attempts and model misbehavior.
    pub fn log_rejection(
        &self,
        prompt: &str,
        candidate: &str,
        rule: &str,
        reason: &str,
    ) -> std::io::Result<()> {
        let log_entry = format!(
            "[{}] [{}] [CRITIC-REJECTED] rule={} prompt=\"{}\" candidate=\"{}\" reason=\"{}\"\n",
            Utc::now().to_rfc3339(),
            current_user(),
            rule,
            prompt.escape_debug(),
            candidate.escape_debug(),
            reason.escape_debug()
        );

        self.append(&log_entry)
    }

    fn append(&self, entry: &str) -> std::io::Result<()> {
        self.rotate_if_needed()?;

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.log_path)?;

        file.write_all(entry.as_bytes())?;
        file.flush()?;

        Ok(())
    }

    /// Rotate log file if it exceeds MAX_LOG_SIZE
    fn rotate_if_needed(&self) -> std::io::Result<()> {
        if !self.log_path.exists() {
            return Ok(());
        }

        let metadata = fs::metadata(&self.log_path)?;
        if metadata.len() > MAX_LOG_SIZE {
            // Rotate: history.log -> history.log.1
            let backup_path = self.log_path.with_extension("log.1");
            fs::rename(&self.log_path, backup_path)?;
        }

        Ok(())
    }

    /// Get the path to the log file
    pub fn log_path(&self) -> &Path {
        &self.log_path
    }
}

fn current_user() -> String {
    std::env::var("USER").unwrap_or_else(|_| "unknown".to_string())
}
