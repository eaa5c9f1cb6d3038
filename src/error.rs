use thiserror::Error;

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Database error: {0}")]
    Db(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("failed to make request: {0}")]
    Http(#[from] reqwest::Error),

    #[error("failed to decode response: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Report parse error (row {row}, column {column}): {message}")]
    Parse {
        row: usize,
        column: String,
        message: String,
    },

    #[error("API error: {code} - ({kind}) {message}")]
    Api {
        code: String,
        kind: String,
        message: String,
    },

    #[error("HTTP error: {status} (Raw Response: {body})")]
    Status { status: u16, body: String },

    #[error("remote asked us to retry later")]
    RetryLater,

    #[error("missing account information")]
    MissingAccount,

    #[error("Settings error: {0}")]
    Settings(String),

    #[error("{0}")]
    Other(String),
}

impl SyncError {
    pub fn parse(row: usize, column: &str, message: impl Into<String>) -> Self {
        Self::Parse {
            row,
            column: column.to_string(),
            message: message.into(),
        }
    }

    /// Whether the transport should try the request again.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::RetryLater => true,
            Self::Status { status, .. } => *status == 429 || *status >= 500,
            Self::Http(e) => e.is_timeout() || e.is_connect(),
            _ => false,
        }
    }

    /// Whether the request certainly never took effect remotely, so even a
    /// non-idempotent write may be sent again.
    pub fn is_undelivered(&self) -> bool {
        match self {
            Self::RetryLater => true,
            Self::Status { status, .. } => *status == 429,
            Self::Http(e) => e.is_connect(),
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, SyncError>;
