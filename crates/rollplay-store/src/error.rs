//! Error types for the store layer.

/// Errors reported by persistence and map collaborators.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// A record the caller expected to exist is absent.
    #[error("{entity} #{id} does not exist")]
    Missing { entity: &'static str, id: u64 },

    /// The backing store failed (I/O, connection, corrupt data).
    #[error("storage failure: {0}")]
    Backend(String),
}
