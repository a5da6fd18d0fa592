use std::collections::VecDeque;
use std::fs::OpenOptions;
use std::io::{BufWriter, Write};
use std::path::Path;

use tempfile::NamedTempFile;

use crate::core::message::Message;

/// Appends conversation turns to a plain-text log file. Only user and
/// assistant turns are written; client-side notices stay on screen.
pub struct LoggingState {
    file_path: Option<String>,
    is_active: bool,
}

impl LoggingState {
    pub fn new(log_file: Option<String>) -> Result<Self, Box<dyn std::error::Error>> {
        let mut logging = LoggingState {
            file_path: log_file,
            is_active: false,
        };

        // A file given on the command line enables logging immediately.
        if let Some(path) = logging.file_path.clone() {
            logging.set_log_file(path)?;
        }

        Ok(logging)
    }

    pub fn set_log_file(&mut self, path: String) -> Result<String, Box<dyn std::error::Error>> {
        self.test_file_access(&path)?;

        self.file_path = Some(path.clone());
        self.is_active = true;

        Ok(format!("Logging enabled to: {path}"))
    }

    pub fn toggle_logging(&mut self) -> Result<String, Box<dyn std::error::Error>> {
        match &self.file_path {
            Some(path) => {
                self.is_active = !self.is_active;
                if self.is_active {
                    Ok(format!("Logging resumed to: {path}"))
                } else {
                    Ok(format!("Logging paused (file: {path})"))
                }
            }
            None => {
                Err("No log file specified. Use /log <filename> to enable logging first.".into())
            }
        }
    }

    pub fn is_active(&self) -> bool {
        self.is_active
    }

    pub fn log_turn(&self, message: &Message) -> Result<(), Box<dyn std::error::Error>> {
        if !self.is_active || self.file_path.is_none() || !message.role.is_conversation() {
            return Ok(());
        }

        let file_path = self
            .file_path
            .as_ref()
            .ok_or("logging active without a file path")?;
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(file_path)?;
        let mut writer = BufWriter::new(file);

        write_turn(&mut writer, message)?;
        writer.flush()?;
        Ok(())
    }

    /// Rewrite the log to match the transcript after messages were removed.
    /// Goes through a temp file in the same directory so the existing log is
    /// only replaced once the rewrite is complete.
    pub fn rewrite_transcript(
        &self,
        messages: &VecDeque<Message>,
    ) -> Result<(), Box<dyn std::error::Error>> {
        if !self.is_active || self.file_path.is_none() {
            return Ok(());
        }

        let file_path = self
            .file_path
            .as_ref()
            .ok_or("logging active without a file path")?;
        let target_path = Path::new(file_path);
        let parent = target_path.parent().unwrap_or_else(|| Path::new("."));

        let mut temp_file = NamedTempFile::new_in(parent)?;
        for message in messages {
            if message.role.is_conversation() {
                write_turn(&mut temp_file, message)?;
            }
        }

        temp_file.flush()?;
        temp_file.as_file().sync_all()?;
        temp_file.persist(file_path)?;
        Ok(())
    }

    pub fn get_status_string(&self) -> String {
        match (&self.file_path, self.is_active) {
            (None, _) => "disabled".to_string(),
            (Some(path), true) => format!(
                "active ({})",
                Path::new(path)
                    .file_name()
                    .unwrap_or_default()
                    .to_string_lossy()
            ),
            (Some(path), false) => format!(
                "paused ({})",
                Path::new(path)
                    .file_name()
                    .unwrap_or_default()
                    .to_string_lossy()
            ),
        }
    }

    fn test_file_access(&self, path: &str) -> Result<(), Box<dyn std::error::Error>> {
        let mut file = OpenOptions::new().create(true).append(true).open(path)?;
        file.flush()?;
        Ok(())
    }
}

fn write_turn(writer: &mut impl Write, message: &Message) -> std::io::Result<()> {
    if message.is_user() {
        for line in format!("You: {}", message.content).lines() {
            writeln!(writer, "{line}")?;
        }
    } else {
        for line in message.content.lines() {
            writeln!(writer, "{line}")?;
        }
    }
    // Blank line between turns, matching the on-screen spacing.
    writeln!(writer)
}
