//! Crate-level error type.
//!
//! Every controller failure maps onto one [`DevroomError`] variant. Controllers
//! render the failure into their view first and then hand the error back, so
//! the caller decides whether it is fatal (the CLI never treats it as such).

use thiserror::Error;

/// Errors surfaced by the chat and analysis controllers.
#[derive(Debug, Error)]
pub enum DevroomError {
    /// Bad user input, caught before any network call.
    #[error("invalid input: {0}")]
    Validation(String),

    /// The code buffer was blank when an analysis was requested.
    #[error("no code to analyze")]
    EmptyInput,

    /// A chat message was sent while the push channel is not joined.
    #[error("not connected to the chat server")]
    NotConnected,

    /// Network or transport failure on an HTTP call.
    #[error("request to {url} failed: {detail}")]
    RequestFailure { url: String, detail: String },

    /// The analysis backend answered with `success: false`.
    #[error("server reported failure: {0}")]
    ServerReported(String),

    /// Push-channel fault (connect failure, socket error, server error frame).
    #[error("chat channel error: {0}")]
    Channel(String),

    /// Config file could not be parsed.
    #[error("config error: {0}")]
    Config(#[from] toml::de::Error),

    /// Template rendering failed.
    #[error("template error: {0}")]
    Template(#[from] minijinja::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl DevroomError {
    /// Build a [`DevroomError::RequestFailure`] from a reqwest error.
    pub fn request(url: impl Into<String>, err: &reqwest::Error) -> Self {
        DevroomError::RequestFailure {
            url: url.into(),
            detail: err.to_string(),
        }
    }

    /// Whether this error was raised locally, before anything hit the network.
    pub fn is_local(&self) -> bool {
        matches!(
            self,
            DevroomError::Validation(_) | DevroomError::EmptyInput | DevroomError::NotConnected
        )
    }
}
