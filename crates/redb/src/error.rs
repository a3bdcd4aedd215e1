use tempora_core::BackendError;

/// Wraps every redb failure mode into the engine's [`BackendError`], mirroring the newtype
/// conversion pattern redb-backed stores use to cross a storage-specific error into a
/// storage-agnostic one.
#[derive(Debug)]
pub struct RedbBackendError(BackendError);

impl From<BackendError> for RedbBackendError {
    fn from(value: BackendError) -> Self {
        Self(value)
    }
}

impl From<RedbBackendError> for BackendError {
    fn from(value: RedbBackendError) -> Self {
        value.0
    }
}

impl From<redb::DatabaseError> for RedbBackendError {
    fn from(value: redb::DatabaseError) -> Self {
        Self(BackendError::io(redb::Error::from(value)))
    }
}

impl From<redb::TableError> for RedbBackendError {
    fn from(value: redb::TableError) -> Self {
        Self(BackendError::io(redb::Error::from(value)))
    }
}

impl From<redb::CommitError> for RedbBackendError {
    fn from(value: redb::CommitError) -> Self {
        Self(BackendError::io(redb::Error::from(value)))
    }
}

impl From<redb::StorageError> for RedbBackendError {
    fn from(value: redb::StorageError) -> Self {
        Self(BackendError::io(redb::Error::from(value)))
    }
}

impl From<redb::TransactionError> for RedbBackendError {
    fn from(value: redb::TransactionError) -> Self {
        Self(BackendError::io(redb::Error::from(value)))
    }
}

impl From<bincode::Error> for RedbBackendError {
    fn from(value: bincode::Error) -> Self {
        Self(BackendError::io(value))
    }
}
