use camino::Utf8PathBuf;
use miette::Diagnostic;
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum CensusError {
    #[error("invalid task id: {0}")]
    InvalidTaskId(String),

    #[error("duplicate task id: {0}")]
    DuplicateTaskId(u64),

    #[error("invalid task url {url}: {message}")]
    InvalidUrl { url: String, message: String },

    #[error("unsupported HTTP method: {0}")]
    UnsupportedMethod(String),

    #[error("missing config file trait-census.json in current directory")]
    MissingConfig,

    #[error("failed to read config file at {0}")]
    ConfigRead(Utf8PathBuf),

    #[error("failed to parse JSON config: {0}")]
    ConfigParse(String),

    #[error("invalid config: {0}")]
    InvalidConfig(String),

    #[error("no tasks configured (use `tasks`, `range` or --base-url)")]
    NoTasks,

    #[error("HTTP client setup failed: {0}")]
    ClientBuild(String),

    #[error("failed to write output: {0}")]
    Output(String),
}

/// Why a single task produced no record.
///
/// These never leave the worker that hit them; they are logged and collected
/// into the batch report.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FetchFailure {
    #[error("request failed: {message}")]
    Transport { message: String },

    #[error("endpoint returned status {status}: {body}")]
    BadStatus { status: u16, body: String },

    #[error("malformed response: {message}")]
    MalformedResponse { message: String },

    #[error("worker panicked while handling the task")]
    Panicked,
}

impl FetchFailure {
    pub fn transport(message: impl Into<String>) -> Self {
        FetchFailure::Transport {
            message: message.into(),
        }
    }

    pub fn malformed(message: impl Into<String>) -> Self {
        FetchFailure::MalformedResponse {
            message: message.into(),
        }
    }
}
