use thiserror::Error;

#[derive(Debug, Error)]
pub enum CondError {
    /// An append would run past the table's reservation.
    #[error("Capacity exceeded: {requested} bytes requested, {capacity} bytes reserved")]
    CapacityExceeded { requested: usize, capacity: usize },

    /// A handle that does not address a live record.
    #[error("Invalid handle #{id} (table holds {len})")]
    InvalidHandle { id: u32, len: u32 },

    /// The OS refused to reserve or commit pages.
    #[error("Allocation failed: {0}")]
    AllocationFailed(#[source] std::io::Error),

    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    #[error("Condition #{0} is not valid UTF-8")]
    InvalidUtf8(u32),

    #[error("IO: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON: {0}")]
    SerdeJson(#[from] serde_json::Error),

    #[error("Persist: {0}")]
    Persist(#[from] tempfile::PersistError),
}

pub type Result<T> = std::result::Result<T, CondError>;

/// Fail-fast escape hatch for call sites that treat engine errors as fatal.
pub trait OrFatal<T> {
    fn or_fatal(self) -> T;
}

impl<T> OrFatal<T> for Result<T> {
    #[track_caller]
    fn or_fatal(self) -> T {
        match self {
            Ok(v) => v,
            Err(e) => {
                tracing::error!(error = %e, "fatal condition-table error");
                panic!("fatal condition-table error: {e}");
            }
        }
    }
}
