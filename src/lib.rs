//! # genpool
//!
//! Generic, thread-safe object pool for expensive-to-construct instances
//! (database connections, parsers, worker threads) with lifecycle validation
//! and background eviction of stale idle members.
//!
//! ## Features
//!
//! - Bounded creation (`max_total`) with FIFO-fair blocking borrows
//! - Idle retention cap (`max_idle`) with stalest-first displacement
//! - Factory lifecycle hooks: make, destroy, validate, activate, passivate
//! - Validation on borrow, on return, and while idle
//! - Background evictor with hard and soft idle-time thresholds and
//!   `min_idle` replenishment, driven by one shared timer thread
//! - LIFO or FIFO idle reuse order
//! - Immutable configuration snapshots, swappable at runtime
//! - Metrics with Prometheus export
//!
//! ## Quick Start
//!
//! ```rust
//! use genpool::{BoxError, GenericObjectPool, PoolConfig, PoolableObjectFactory};
//!
//! struct ConnFactory;
//!
//! impl PoolableObjectFactory<String> for ConnFactory {
//!     fn make_object(&self) -> Result<String, BoxError> {
//!         Ok(String::from("connection"))
//!     }
//! }
//!
//! let pool = GenericObjectPool::with_factory(ConnFactory, PoolConfig::default());
//! let conn = pool.borrow_object().unwrap();
//! // use the connection, then hand it back
//! pool.return_object(conn).unwrap();
//! ```

mod config;
mod deque;
mod errors;
mod eviction;
mod factory;
mod metrics;
mod pool;
mod pooled;

pub use config::{
    PoolConfig, WhenExhaustedAction, DEFAULT_LIFO, DEFAULT_MAX_IDLE, DEFAULT_MAX_TOTAL,
    DEFAULT_MAX_WAIT_MILLIS, DEFAULT_MIN_EVICTABLE_IDLE_TIME_MILLIS, DEFAULT_MIN_IDLE,
    DEFAULT_NUM_TESTS_PER_EVICTION_RUN, DEFAULT_SOFT_MIN_EVICTABLE_IDLE_TIME_MILLIS,
    DEFAULT_TEST_ON_BORROW, DEFAULT_TEST_ON_RETURN, DEFAULT_TEST_WHILE_IDLE,
    DEFAULT_TIME_BETWEEN_EVICTION_RUNS_MILLIS,
};
pub use deque::IdleDeque;
pub use errors::{BoxError, PoolError, PoolResult};
pub use factory::PoolableObjectFactory;
pub use metrics::{MetricsExporter, PoolMetrics};
pub use pool::{GenericObjectPool, ObjectPool};
pub use pooled::{PooledObject, PooledState};
