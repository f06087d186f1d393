//! Error types for install-aws-server

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for provisioning operations
#[derive(Error, Debug)]
pub enum InstallError {
    #[error("Configuration file {} does not exist!", .0.display())]
    ConfigNotFound(PathBuf),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("INI parsing error: {0}")]
    Ini(#[from] ini::ParseError),

    #[error("No such role {0}!")]
    UnknownRole(String),

    #[error("{0} already exists!")]
    HostnameExists(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Command `{command}` failed with status {status}: {stderr}")]
    Command {
        command: String,
        status: i32,
        stderr: String,
    },

    #[error("Unexpected response from {call}: {message}")]
    InvalidResponse { call: String, message: String },

    #[error("Template error: {0}")]
    Template(String),
}

impl InstallError {
    /// Create a command failure error
    pub fn command(command: impl Into<String>, status: i32, stderr: impl Into<String>) -> Self {
        Self::Command {
            command: command.into(),
            status,
            stderr: stderr.into(),
        }
    }

    /// Create an invalid response error
    pub fn invalid_response(call: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidResponse {
            call: call.into(),
            message: message.into(),
        }
    }

    /// Process exit status for this error
    ///
    /// Every failure aborts the run with status 1.
    pub fn exit_code(&self) -> u8 {
        1
    }
}
