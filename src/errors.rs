//! Error types for the object pool

use thiserror::Error;

/// Boxed error returned by factory callbacks.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Error, Debug)]
pub enum PoolError {
    #[error("pool has been closed")]
    PoolClosed,

    #[error("pool exhausted")]
    PoolExhausted,

    #[error("timeout waiting for idle object")]
    BorrowTimeout,

    #[error("returned object not currently part of this pool")]
    NotInPool,

    #[error("object has already been returned to this pool")]
    AlreadyReturned,

    #[error("unable to {operation} object")]
    FactoryFailure {
        operation: &'static str,
        #[source]
        source: Option<BoxError>,
    },

    #[error("factory already set")]
    FactoryAlreadySet,

    #[error("cannot add objects without a factory")]
    NoFactory,

    #[error("interrupted while waiting for idle object")]
    Interrupted,
}

impl PoolError {
    /// A factory callback failed with an underlying error.
    pub(crate) fn factory(operation: &'static str, source: BoxError) -> Self {
        PoolError::FactoryFailure {
            operation,
            source: Some(source),
        }
    }

    /// A factory validation rejected the object without raising an error.
    pub(crate) fn factory_rejected(operation: &'static str) -> Self {
        PoolError::FactoryFailure {
            operation,
            source: None,
        }
    }
}

pub type PoolResult<T> = Result<T, PoolError>;
