use thiserror::Error;

/// Errors surfaced by a [`crate::backend::Backend`] implementation.
///
/// `NotFound` is a first-class signal distinct from any I/O or encoding failure so that callers
/// can tell "there are no rows here" apart from "the backend could not answer".
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("row not found")]
    NotFound,

    #[error("backend io error")]
    Io(Box<dyn std::error::Error + Send + Sync>),
}

impl BackendError {
    pub fn io(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Io(Box::new(err))
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, BackendError::NotFound)
    }
}

/// Errors surfaced by the [`crate::engine::StorageEngine`].
///
/// `NotFound` from the backend never reaches a caller through this type: every engine operation
/// that can legitimately return "nothing" swallows it and returns an empty collection instead (see
/// the module docs on `StorageEngine`). What remains here is genuine backend I/O failure.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("backend error")]
    Backend(#[from] BackendError),
}
