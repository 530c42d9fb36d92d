//! Crate-wide error type.
//!
//! Errors fall into four families: configuration problems (rejected before
//! any backend is touched), backend setup/IO failures, transient remote
//! failures that outlived their retry budget, and invariant violations that
//! indicate a defect rather than bad input.

/// Error type shared by every fallible operation in the crate.
#[derive(Debug)]
pub enum UrnError {
    /// Invalid or ambiguous configuration, raised before any pool exists.
    Config(String),
    /// Filesystem error (log file, database file).
    Io(std::io::Error),
    /// SQLite error from the relational backend.
    Sqlite(rusqlite::Error),
    /// Redis error from the remote key-value backend.
    Remote(redis::RedisError),
    /// A retried remote operation exhausted its attempt budget.
    RetriesExhausted { op: String, attempts: u32 },
    /// A draw was requested from a pool with zero total weight.
    EmptyPool,
    /// An internal invariant was broken; never silently corrected.
    Invariant(String),
}

impl std::fmt::Display for UrnError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UrnError::Config(msg) => write!(f, "configuration error: {}", msg),
            UrnError::Io(err) => write!(f, "IO error: {}", err),
            UrnError::Sqlite(err) => write!(f, "sqlite error: {}", err),
            UrnError::Remote(err) => write!(f, "redis error: {}", err),
            UrnError::RetriesExhausted { op, attempts } => {
                write!(f, "remote op '{}' failed after {} attempts", op, attempts)
            }
            UrnError::EmptyPool => write!(f, "draw from a pool with zero total weight"),
            UrnError::Invariant(msg) => write!(f, "invariant violation: {}", msg),
        }
    }
}

impl std::error::Error for UrnError {}

impl From<std::io::Error> for UrnError {
    fn from(value: std::io::Error) -> Self {
        UrnError::Io(value)
    }
}

impl From<rusqlite::Error> for UrnError {
    fn from(value: rusqlite::Error) -> Self {
        UrnError::Sqlite(value)
    }
}

impl From<redis::RedisError> for UrnError {
    fn from(value: redis::RedisError) -> Self {
        UrnError::Remote(value)
    }
}
