use thiserror::Error;

/// Failure loading the symbol catalog from `/api/symbols`.
///
/// Leaves the catalog empty and sets the global status to `Error` until the next full
/// reload.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CatalogError {
    #[error("symbol catalog request failed: {0}")]
    Transport(String),

    #[error("symbol catalog request returned HTTP {0}")]
    Status(u16),

    #[error("symbol catalog response invalid: {0}")]
    Decode(String),
}

/// Per-symbol metrics fetch failure. Surfaces as that card's `Error` state only.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    #[error("HTTP {status}: {message}")]
    Status { status: u16, message: String },

    #[error("could not reach server: {0}")]
    Transport(String),

    #[error("invalid metrics response: {0}")]
    Decode(String),
}

impl FetchError {
    /// Human readable message shown on the card.
    pub fn message(&self) -> String {
        match self {
            FetchError::Status { message, .. } => message.clone(),
            FetchError::Transport(_) => "could not reach server".to_string(),
            FetchError::Decode(_) => "invalid response".to_string(),
        }
    }
}

/// Rejected add of a tracked symbol. Never fatal, the add is simply a no-op.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AddError {
    #[error("tracked set is full ({capacity} symbols)")]
    CapacityExceeded { capacity: usize },

    #[error("{0} is already tracked")]
    Duplicate(String),
}

/// Storage slot failure. Absorbed by the persistence adapter, never returned to callers
/// of `load`/`save`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PersistenceError {
    #[error("storage I/O failed: {0}")]
    Io(String),

    #[error("stored tracked set is corrupt: {0}")]
    Corrupt(String),
}

impl From<std::io::Error> for PersistenceError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value.to_string())
    }
}

impl From<serde_json::Error> for PersistenceError {
    fn from(value: serde_json::Error) -> Self {
        Self::Corrupt(value.to_string())
    }
}

/// Failures of the terminal front end.
#[derive(Debug, Error)]
pub enum TrackerError {
    #[error("failed to build HTTP client: {0}")]
    Client(String),

    #[error("terminal I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("engine task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}
