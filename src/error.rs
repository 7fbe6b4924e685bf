//! Error types for the ZAP wrapper

use thiserror::Error;

/// Process exit codes reported by the wrapper binary
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitCode {
    Ok,
    ProductExecutionError,
    ScanJobCancelled,
    IoError,
    PdsConfigurationError,
    InvalidZapResponse,
    UnsupportedConfiguration,
}

impl ExitCode {
    /// Numeric process exit code
    pub fn code(&self) -> i32 {
        match self {
            ExitCode::Ok => 0,
            ExitCode::IoError => 1,
            ExitCode::ProductExecutionError => 2,
            ExitCode::PdsConfigurationError => 3,
            ExitCode::UnsupportedConfiguration => 4,
            ExitCode::InvalidZapResponse => 5,
            ExitCode::ScanJobCancelled => 6,
        }
    }
}

/// Main error type for wrapper operations
#[derive(Debug, Error)]
pub enum ZapWrapperError {
    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("URL parse error: {0}")]
    UrlError(#[from] url::ParseError),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Unsupported configuration: {0}")]
    UnsupportedConfiguration(String),

    #[error("ZAP API call '{endpoint}' failed: {message}")]
    ZapApiError {
        endpoint: String,
        /// Error code of the engine, e.g. `already_exists`
        code: Option<String>,
        message: String,
    },

    #[error("Invalid ZAP response: {0}")]
    InvalidZapResponse(String),

    #[error("Scan '{context_name}' was cancelled")]
    ScanCancelled { context_name: String },

    #[error("For scan: {context_name}. An error occurred while scanning: {source}")]
    ScanFailed {
        context_name: String,
        #[source]
        source: Box<ZapWrapperError>,
    },
}

impl ZapWrapperError {
    /// Exit code the wrapper process should terminate with for this error
    pub fn exit_code(&self) -> ExitCode {
        match self {
            ZapWrapperError::ScanCancelled { .. } => ExitCode::ScanJobCancelled,
            ZapWrapperError::IoError(_) => ExitCode::IoError,
            ZapWrapperError::ConfigError(_)
            | ZapWrapperError::TomlError(_)
            | ZapWrapperError::UrlError(_) => ExitCode::PdsConfigurationError,
            ZapWrapperError::UnsupportedConfiguration(_) => ExitCode::UnsupportedConfiguration,
            ZapWrapperError::InvalidZapResponse(_) | ZapWrapperError::JsonError(_) => {
                ExitCode::InvalidZapResponse
            }
            ZapWrapperError::ScanFailed { source, .. } => match source.exit_code() {
                ExitCode::ScanJobCancelled => ExitCode::ScanJobCancelled,
                ExitCode::IoError => ExitCode::IoError,
                _ => ExitCode::ProductExecutionError,
            },
            ZapWrapperError::HttpError(_) | ZapWrapperError::ZapApiError { .. } => {
                ExitCode::ProductExecutionError
            }
        }
    }

    /// Whether this error (or the error it wraps) is a cancellation
    pub fn is_cancellation(&self) -> bool {
        self.exit_code() == ExitCode::ScanJobCancelled
    }
}

/// Result type alias for wrapper operations
pub type Result<T> = std::result::Result<T, ZapWrapperError>;
