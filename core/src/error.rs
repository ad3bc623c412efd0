/// Error types for the chat engine
use std::collections::BTreeMap;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ChatError {
    /// Transport failure, no response from the backend
    #[error("Network error: {0}")]
    Network(String),

    /// Non-2xx response
    #[error("Server error ({status}): {message}")]
    Server { status: u16, message: String },

    /// 4xx with field-level errors (relevant to send)
    #[error("Validation error: {message}")]
    Validation {
        message: String,
        fields: BTreeMap<String, Vec<String>>,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    /// Command sent to an engine whose task has exited
    #[error("Engine stopped")]
    EngineStopped,
}

impl ChatError {
    /// Text shown to the user when an operation boundary swallows the error.
    pub fn user_message(&self) -> String {
        match self {
            ChatError::Network(_) => "Connection to the server failed".to_string(),
            ChatError::Server { status: 401, .. } => "Session expired, please sign in again".to_string(),
            ChatError::Server { message, .. } if !message.is_empty() => message.clone(),
            ChatError::Server { status, .. } => format!("Server error ({})", status),
            ChatError::Validation { message, fields } => {
                let first_field = fields
                    .iter()
                    .find_map(|(name, errs)| errs.first().map(|e| format!("{}: {}", name, e)));
                match first_field {
                    Some(f) if message.is_empty() => f,
                    _ => message.clone(),
                }
            }
            ChatError::Serialization(_) => "Unexpected response from the server".to_string(),
            ChatError::Io(e) => e.to_string(),
            ChatError::Config(msg) => msg.clone(),
            ChatError::EngineStopped => "Chat engine stopped".to_string(),
        }
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, ChatError::Network(_) | ChatError::Server { status: 500..=599, .. })
    }
}

pub type Result<T> = std::result::Result<T, ChatError>;
