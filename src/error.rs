// Error taxonomy shared by every layer of the CLI. Library code returns
// `BwmError`; `main` turns it into a one-line message and an exit code.

use thiserror::Error;

/// Exit code for failures outside the taxonomy (e.g. a closed stdout).
pub const GENERIC_EXIT_CODE: u8 = 1;
/// Exit code for malformed user input or unreadable local files.
pub const USER_INPUT_EXIT_CODE: u8 = 2;
/// Exit code for missing or rejected credentials.
pub const AUTH_EXIT_CODE: u8 = 3;
/// Exit code for failures reported by (or on the way to) the remote API.
pub const API_EXIT_CODE: u8 = 4;
/// Exit code when a batch submission had at least one rejected URL.
pub const PARTIAL_FAILURE_EXIT_CODE: u8 = 5;

pub type Result<T> = std::result::Result<T, BwmError>;

#[derive(Error, Debug)]
pub enum BwmError {
    #[error("No API key found. Set BING_WEBMASTER_API_KEY or run `bwm auth login`.")]
    NotAuthenticated,

    #[error("API key rejected ({status}): {message}")]
    Auth { status: u16, message: String },

    #[error("Not found ({status}): {message}")]
    NotFound { status: u16, message: String },

    #[error("Rate limited by API ({status}): {message}")]
    RateLimit { status: u16, message: String },

    #[error("{method} failed ({status}): {message}")]
    Api {
        method: String,
        status: u16,
        message: String,
    },

    #[error("Unexpected response from {method}: {message}")]
    Parse { method: String, message: String },

    #[error("Network error: {0}")]
    Network(String),

    #[error("{0}")]
    Config(String),

    #[error("{0}")]
    Validation(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl BwmError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Process exit code for this error class.
    pub fn exit_code(&self) -> u8 {
        match self {
            Self::Validation(_) | Self::Config(_) => USER_INPUT_EXIT_CODE,
            Self::NotAuthenticated | Self::Auth { .. } => AUTH_EXIT_CODE,
            Self::NotFound { .. }
            | Self::RateLimit { .. }
            | Self::Api { .. }
            | Self::Parse { .. }
            | Self::Network(_) => API_EXIT_CODE,
            Self::Io(_) => GENERIC_EXIT_CODE,
        }
    }
}
