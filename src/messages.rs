//! User facing messages emitted during a scan

use crate::error::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Mutex;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum MessageType {
    Info,
    Warning,
    Error,
}

/// A single message shown to the user of the scan job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserMessage {
    #[serde(rename = "type")]
    pub message_type: MessageType,
    pub text: String,
    pub timestamp: DateTime<Utc>,
}

impl UserMessage {
    pub fn new(message_type: MessageType, text: impl Into<String>) -> Self {
        Self {
            message_type,
            text: text.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn info(text: impl Into<String>) -> Self {
        Self::new(MessageType::Info, text)
    }

    pub fn warning(text: impl Into<String>) -> Self {
        Self::new(MessageType::Warning, text)
    }

    pub fn error(text: impl Into<String>) -> Self {
        Self::new(MessageType::Error, text)
    }
}

/// Collaborator that delivers user messages
pub trait MessageWriter: Send + Sync {
    fn write(&self, message: UserMessage) -> Result<()>;
}

/// Writes one JSON file per message into the PDS user message folder
pub struct FolderMessageWriter {
    folder: PathBuf,
}

impl FolderMessageWriter {
    pub fn new(folder: impl Into<PathBuf>) -> Self {
        Self {
            folder: folder.into(),
        }
    }
}

impl MessageWriter for FolderMessageWriter {
    fn write(&self, message: UserMessage) -> Result<()> {
        std::fs::create_dir_all(&self.folder)?;
        let file_name = format!(
            "message_{}_{}.json",
            message.timestamp.format("%Y%m%d%H%M%S%3f"),
            uuid::Uuid::new_v4()
        );
        let path = self.folder.join(file_name);
        std::fs::write(&path, serde_json::to_string_pretty(&message)?)?;
        debug!("User message written to {}", path.display());
        Ok(())
    }
}

/// Sends messages to the log only, used when no message folder is configured
pub struct LogMessageWriter;

impl MessageWriter for LogMessageWriter {
    fn write(&self, message: UserMessage) -> Result<()> {
        info!("[{:?}] {}", message.message_type, message.text);
        Ok(())
    }
}

/// Keeps messages in memory
#[derive(Default)]
pub struct CollectingMessageWriter {
    messages: Mutex<Vec<UserMessage>>,
}

impl CollectingMessageWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> Vec<UserMessage> {
        self.messages
            .lock()
            .map(|m| m.clone())
            .unwrap_or_default()
    }
}

impl MessageWriter for CollectingMessageWriter {
    fn write(&self, message: UserMessage) -> Result<()> {
        if let Ok(mut messages) = self.messages.lock() {
            messages.push(message);
        }
        Ok(())
    }
}
