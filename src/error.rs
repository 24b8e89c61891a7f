use thiserror::Error;

use crate::backend::keys::KeyComboError;
use crate::backend::native::TierFailure;

#[derive(Error, Debug)]
pub enum Error {
    /// Unknown or unavailable backend, or an unusable session layout.
    #[error("{message}")]
    Configuration {
        message: String,
        /// Backends usable at the time of the error, when relevant
        available: Vec<String>,
    },

    #[error("{operation} is not supported by the {backend} backend")]
    Unsupported { backend: String, operation: String },

    #[error("Session {0} is closed")]
    ClosedSession(String),

    #[error("Window capture failed for pid {pid}: {}", format_attempts(.attempts))]
    CaptureFailure { pid: i32, attempts: Vec<TierFailure> },

    #[error("Partial injection: {delivered}/{total} characters delivered")]
    PartialInjection { delivered: usize, total: usize },

    #[error("Invalid key combination '{combo}': {source}")]
    InvalidKeyCombo {
        combo: String,
        #[source]
        source: KeyComboError,
    },

    #[error("Input/screen driver error: {0}")]
    Driver(#[from] anyhow::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),
}

impl Error {
    /// Backend selection error; the message ends with the available backends.
    pub(crate) fn configuration(message: impl Into<String>, available: &[impl ToString]) -> Self {
        let available: Vec<String> = available.iter().map(ToString::to_string).collect();
        let listed = if available.is_empty() {
            "none".to_string()
        } else {
            available.join(", ")
        };
        Error::Configuration {
            message: format!("{} (available backends: {})", message.into(), listed),
            available,
        }
    }

    /// Session layout error (directories, options)
    pub(crate) fn layout(message: impl Into<String>) -> Self {
        Error::Configuration {
            message: message.into(),
            available: Vec::new(),
        }
    }

    pub(crate) fn unsupported(backend: &str, operation: &str) -> Self {
        Error::Unsupported {
            backend: backend.to_string(),
            operation: operation.to_string(),
        }
    }

    pub(crate) fn invalid_combo(combo: &str, source: KeyComboError) -> Self {
        Error::InvalidKeyCombo {
            combo: combo.to_string(),
            source,
        }
    }
}

fn format_attempts(attempts: &[TierFailure]) -> String {
    if attempts.is_empty() {
        return "no capture tier could run".to_string();
    }
    attempts
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

pub type Result<T> = std::result::Result<T, Error>;
