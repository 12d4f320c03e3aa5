//! Persistence error taxonomy (`SchemaError`/`InvalidData` variants plus a
//! `From` conversion at the ScyllaDB boundary).

#[derive(Debug, thiserror::Error)]
pub enum PersistenceError {
    #[error("connection error: {0}")]
    Connection(String),

    #[error("schema error: {0}")]
    SchemaError(String),

    #[error("query error: {0}")]
    Query(String),

    #[error("invalid data: {0}")]
    InvalidData(String),

    #[error("not found")]
    NotFound,
}

impl From<scylla::transport::errors::NewSessionError> for PersistenceError {
    fn from(err: scylla::transport::errors::NewSessionError) -> Self {
        PersistenceError::Connection(err.to_string())
    }
}

impl From<scylla::transport::errors::QueryError> for PersistenceError {
    fn from(err: scylla::transport::errors::QueryError) -> Self {
        PersistenceError::Query(err.to_string())
    }
}

impl From<PersistenceError> for ragflow_core::Error {
    fn from(err: PersistenceError) -> Self {
        match err {
            PersistenceError::NotFound => ragflow_core::Error::NotFound(err.to_string()),
            other => ragflow_core::Error::Internal(other.to_string()),
        }
    }
}
