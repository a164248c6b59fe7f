//! The lifecycle contract between a pool and the objects it manages

use crate::errors::BoxError;

/// Creates, validates, and tears down pooled objects.
///
/// A pool never invokes any of these callbacks while holding a lock that a
/// borrower or returner would need, so implementations are free to block on
/// I/O (opening a connection, running a ping query).
///
/// Only [`make_object`](Self::make_object) is required; the lifecycle hooks
/// default to no-ops and [`validate_object`](Self::validate_object) defaults
/// to accepting every object.
///
/// # Examples
///
/// ```
/// use genpool::{BoxError, PoolableObjectFactory};
///
/// struct SessionFactory;
///
/// impl PoolableObjectFactory<String> for SessionFactory {
///     fn make_object(&self) -> Result<String, BoxError> {
///         Ok(String::from("session"))
///     }
///
///     fn validate_object(&self, obj: &String) -> Result<bool, BoxError> {
///         Ok(!obj.is_empty())
///     }
/// }
/// ```
pub trait PoolableObjectFactory<T>: Send + Sync {
    /// Create a new instance for the pool.
    fn make_object(&self) -> Result<T, BoxError>;

    /// Release resources held by an instance leaving the pool for good.
    fn destroy_object(&self, _obj: &T) -> Result<(), BoxError> {
        Ok(())
    }

    /// Report whether an instance is still usable. Raising an error counts
    /// as a rejection.
    fn validate_object(&self, _obj: &T) -> Result<bool, BoxError> {
        Ok(true)
    }

    /// Prepare an instance just before it is lent to a borrower.
    fn activate_object(&self, _obj: &T) -> Result<(), BoxError> {
        Ok(())
    }

    /// Quiesce an instance just before it is parked in the idle pool.
    fn passivate_object(&self, _obj: &T) -> Result<(), BoxError> {
        Ok(())
    }
}
