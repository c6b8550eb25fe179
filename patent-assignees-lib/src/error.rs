//! Error handling for assignee fetch operations.
//!
//! Per-identifier errors (transport, hard status, parse, capped throttling)
//! abandon a single identifier and never stop the run. Run-level errors
//! (configuration, input, output) abort before or after dispatch.

use std::fmt;

/// Main error type for the fetch pipeline.
#[derive(Debug, Clone)]
pub enum FetchError {
    /// Connection, DNS or timeout failure while issuing the request
    Transport {
        identifier: String,
        message: String,
    },

    /// The server kept throttling and the configured retry cap was reached
    Throttled {
        identifier: String,
        attempts: u32,
    },

    /// Any response status other than 200 or 429
    HardStatus {
        identifier: String,
        status: u16,
    },

    /// Response body was not JSON or its top level was not an object
    Parse {
        identifier: String,
        message: String,
    },

    /// Configuration errors (invalid settings, unreadable config file, etc.)
    Config {
        message: String,
    },

    /// Input file could not be opened or read
    File {
        path: String,
        message: String,
    },

    /// Output sink could not be created, written or flushed
    Output {
        message: String,
    },

    /// Generic internal errors that don't fit other categories
    Internal {
        message: String,
    },
}

impl FetchError {
    /// Create a new transport error.
    pub fn transport<I: Into<String>, M: Into<String>>(identifier: I, message: M) -> Self {
        Self::Transport {
            identifier: identifier.into(),
            message: message.into(),
        }
    }

    /// Create a new throttling error after `attempts` rejected requests.
    pub fn throttled<I: Into<String>>(identifier: I, attempts: u32) -> Self {
        Self::Throttled {
            identifier: identifier.into(),
            attempts,
        }
    }

    /// Create a new hard status error.
    pub fn hard_status<I: Into<String>>(identifier: I, status: u16) -> Self {
        Self::HardStatus {
            identifier: identifier.into(),
            status,
        }
    }

    /// Create a new parse error.
    pub fn parse<I: Into<String>, M: Into<String>>(identifier: I, message: M) -> Self {
        Self::Parse {
            identifier: identifier.into(),
            message: message.into(),
        }
    }

    /// Create a new configuration error.
    pub fn config<M: Into<String>>(message: M) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create a new file error.
    pub fn file_error<P: Into<String>, M: Into<String>>(path: P, message: M) -> Self {
        Self::File {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Create a new output error.
    pub fn output<M: Into<String>>(message: M) -> Self {
        Self::Output {
            message: message.into(),
        }
    }

    /// Create a new internal error.
    pub fn internal<M: Into<String>>(message: M) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Short machine-readable category, used in run reports.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Transport { .. } => "transport",
            Self::Throttled { .. } => "throttled",
            Self::HardStatus { .. } => "status",
            Self::Parse { .. } => "parse",
            Self::Config { .. } => "config",
            Self::File { .. } => "file",
            Self::Output { .. } => "output",
            Self::Internal { .. } => "internal",
        }
    }
}

impl fmt::Display for FetchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Transport {
                identifier,
                message,
            } => {
                write!(f, "Transport error for '{}': {}", identifier, message)
            }
            Self::Throttled {
                identifier,
                attempts,
            } => {
                write!(
                    f,
                    "Gave up on '{}' after {} throttled attempts",
                    identifier, attempts
                )
            }
            Self::HardStatus { identifier, status } => {
                write!(f, "Unexpected HTTP {} for '{}'", status, identifier)
            }
            Self::Parse {
                identifier,
                message,
            } => {
                write!(f, "Parse error for '{}': {}", identifier, message)
            }
            Self::Config { message } => {
                write!(f, "Configuration error: {}", message)
            }
            Self::File { path, message } => {
                write!(f, "File error at '{}': {}", path, message)
            }
            Self::Output { message } => {
                write!(f, "Output error: {}", message)
            }
            Self::Internal { message } => {
                write!(f, "Internal error: {}", message)
            }
        }
    }
}

impl std::error::Error for FetchError {}

/// Describe a reqwest failure for a transport error message.
pub(crate) fn describe_transport(err: &reqwest::Error) -> String {
    if err.is_timeout() {
        format!("request timed out: {}", err)
    } else if err.is_connect() {
        format!("connection failed: {}", err)
    } else {
        format!("request failed: {}", err)
    }
}

impl From<std::io::Error> for FetchError {
    fn from(err: std::io::Error) -> Self {
        Self::Output {
            message: format!("I/O error: {}", err),
        }
    }
}

impl From<csv::Error> for FetchError {
    fn from(err: csv::Error) -> Self {
        Self::Output {
            message: format!("CSV error: {}", err),
        }
    }
}
