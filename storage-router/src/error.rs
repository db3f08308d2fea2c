//! Router error kinds and their HTTP status mapping.

use thiserror::Error;

/// Flat error enum in the style of `volo::loadbalance::error::LoadBalanceError`:
/// one variant per failure kind, no nested cause hierarchy.
#[derive(Debug, Error)]
pub enum RouterError {
    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("not found")]
    NotFound,

    #[error("no chunkserver group satisfies the request")]
    NoReplica,

    #[error("replica i/o error: {0}")]
    ReplicaIo(String),

    #[error("master unavailable: {0}")]
    MasterUnavailable(String),

    #[error("metastore error: {0}")]
    MetaStore(String),
}

impl RouterError {
    /// Maps an internal failure kind to the HTTP status the front returns,
    /// per the status table in `spec.md` §7: every failure kind besides
    /// `BadRequest`/`NotFound` surfaces to the client as a plain 500 — the
    /// distinction between "no group available", "a replica misbehaved" and
    /// "the master is unreachable" is carried in the body text, not the
    /// status code.
    pub fn status_code(&self) -> http::StatusCode {
        use http::StatusCode;
        match self {
            RouterError::BadRequest(_) => StatusCode::BAD_REQUEST,
            RouterError::NotFound => StatusCode::NOT_FOUND,
            RouterError::NoReplica
            | RouterError::ReplicaIo(_)
            | RouterError::MasterUnavailable(_)
            | RouterError::MetaStore(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}
