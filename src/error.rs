use thiserror::Error;
use uuid::Uuid;

/// Failures surfaced by the storage collaborator.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The backing store could not be reached. Reads hitting this are
    /// retried a bounded number of times before the job is failed.
    #[error("storage unavailable: {0}")]
    Unavailable(String),

    #[error("{0} not found")]
    NotFound(&'static str)
}

/// Failure taxonomy for the rating engine. Every variant except
/// `Concurrency` ends up recorded on the calculation job; `Concurrency`
/// is returned to the caller before any job is created.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Malformed or missing game data. Raised before any write occurs.
    #[error("malformed ledger data: {0}")]
    Data(String),

    /// A game references a team or player the roster cannot resolve.
    #[error("unresolvable reference: {0}")]
    Reference(String),

    /// A second trigger arrived while a calculation was running.
    #[error("calculation {0} is already running")]
    Concurrency(Uuid),

    /// A storage read kept failing past the retry budget.
    #[error("storage read failed after {attempts} attempts: {source}")]
    Transient {
        attempts: u32,
        #[source]
        source: StoreError
    },

    /// A storage write failed. Writes are not retried.
    #[error("storage write failed: {0}")]
    Store(#[from] StoreError),

    /// The job was cancelled cooperatively at a round boundary.
    #[error("cancelled at round boundary")]
    Cancelled
}
