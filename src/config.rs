//! Pool configuration options

/// What `borrow_object` does when the pool is exhausted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WhenExhaustedAction {
    /// Fail immediately with `PoolExhausted`.
    Fail,
    /// Block until an idle object becomes available, bounded by `max_wait_millis`.
    #[default]
    Block,
}

pub const DEFAULT_MAX_TOTAL: i32 = 8;
pub const DEFAULT_MAX_IDLE: i32 = 8;
pub const DEFAULT_MIN_IDLE: i32 = 0;
pub const DEFAULT_MAX_WAIT_MILLIS: i64 = -1;
pub const DEFAULT_TEST_ON_BORROW: bool = false;
pub const DEFAULT_TEST_ON_RETURN: bool = false;
pub const DEFAULT_TEST_WHILE_IDLE: bool = false;
pub const DEFAULT_TIME_BETWEEN_EVICTION_RUNS_MILLIS: i64 = -1;
pub const DEFAULT_MIN_EVICTABLE_IDLE_TIME_MILLIS: i64 = 30 * 60 * 1000;
pub const DEFAULT_SOFT_MIN_EVICTABLE_IDLE_TIME_MILLIS: i64 = -1;
pub const DEFAULT_NUM_TESTS_PER_EVICTION_RUN: i32 = 3;
pub const DEFAULT_LIFO: bool = true;

/// Immutable configuration snapshot for a pool.
///
/// Operations read one snapshot at entry; installing a new configuration via
/// `set_config` never alters a call already in flight. Negative sentinels
/// follow the conventions of the options table: a negative cap means
/// unbounded, a non-positive wait means forever, a non-positive eviction
/// cadence disables the evictor.
///
/// # Examples
///
/// ```
/// use genpool::{PoolConfig, WhenExhaustedAction};
///
/// let config = PoolConfig::new()
///     .with_max_total(20)
///     .with_max_idle(5)
///     .with_when_exhausted_action(WhenExhaustedAction::Fail)
///     .with_test_on_borrow(true);
///
/// assert_eq!(config.max_total, 20);
/// assert_eq!(config.max_idle, 5);
/// assert!(config.test_on_borrow);
/// ```
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Cap on members created or being created; negative means unbounded.
    pub max_total: i32,

    /// Cap on members parked idle; negative means unbounded. On return the
    /// stalest idle member is destroyed to make room.
    pub max_idle: i32,

    /// Floor the evictor refills to after each sweep.
    pub min_idle: i32,

    /// Block timeout in milliseconds for [`WhenExhaustedAction::Block`];
    /// non-positive means wait forever.
    pub max_wait_millis: i64,

    /// Behavior when no idle member exists and the creation cap is reached.
    pub when_exhausted_action: WhenExhaustedAction,

    /// Validate members before lending them out.
    pub test_on_borrow: bool,

    /// Validate members as they come back.
    pub test_on_return: bool,

    /// Let the evictor validate the members it examines.
    pub test_while_idle: bool,

    /// Evictor cadence in milliseconds; non-positive disables the evictor.
    pub time_between_eviction_runs_millis: i64,

    /// Hard eviction threshold: idle members older than this are destroyed.
    /// Non-positive disables hard eviction.
    pub min_evictable_idle_time_millis: i64,

    /// Soft eviction threshold, honored only while more than `min_idle`
    /// members sit idle. Non-positive disables soft eviction.
    pub soft_min_evictable_idle_time_millis: i64,

    /// Members examined per evictor run. Negative `-n` means roughly one
    /// `n`th of the idle members per run.
    pub num_tests_per_eviction_run: i32,

    /// Idle reuse order for non-blocked borrows: most recently returned
    /// first when true, oldest first when false.
    pub lifo: bool,
}

impl Default for PoolConfig {
    fn default() -> Self {
        PoolConfig {
            max_total: DEFAULT_MAX_TOTAL,
            max_idle: DEFAULT_MAX_IDLE,
            min_idle: DEFAULT_MIN_IDLE,
            max_wait_millis: DEFAULT_MAX_WAIT_MILLIS,
            when_exhausted_action: WhenExhaustedAction::default(),
            test_on_borrow: DEFAULT_TEST_ON_BORROW,
            test_on_return: DEFAULT_TEST_ON_RETURN,
            test_while_idle: DEFAULT_TEST_WHILE_IDLE,
            time_between_eviction_runs_millis: DEFAULT_TIME_BETWEEN_EVICTION_RUNS_MILLIS,
            min_evictable_idle_time_millis: DEFAULT_MIN_EVICTABLE_IDLE_TIME_MILLIS,
            soft_min_evictable_idle_time_millis: DEFAULT_SOFT_MIN_EVICTABLE_IDLE_TIME_MILLIS,
            num_tests_per_eviction_run: DEFAULT_NUM_TESTS_PER_EVICTION_RUN,
            lifo: DEFAULT_LIFO,
        }
    }
}

impl PoolConfig {
    /// Create a configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_total(mut self, max_total: i32) -> Self {
        self.max_total = max_total;
        self
    }

    pub fn with_max_idle(mut self, max_idle: i32) -> Self {
        self.max_idle = max_idle;
        self
    }

    pub fn with_min_idle(mut self, min_idle: i32) -> Self {
        self.min_idle = min_idle;
        self
    }

    pub fn with_max_wait_millis(mut self, max_wait_millis: i64) -> Self {
        self.max_wait_millis = max_wait_millis;
        self
    }

    pub fn with_when_exhausted_action(mut self, action: WhenExhaustedAction) -> Self {
        self.when_exhausted_action = action;
        self
    }

    pub fn with_test_on_borrow(mut self, test_on_borrow: bool) -> Self {
        self.test_on_borrow = test_on_borrow;
        self
    }

    pub fn with_test_on_return(mut self, test_on_return: bool) -> Self {
        self.test_on_return = test_on_return;
        self
    }

    pub fn with_test_while_idle(mut self, test_while_idle: bool) -> Self {
        self.test_while_idle = test_while_idle;
        self
    }

    pub fn with_time_between_eviction_runs_millis(mut self, millis: i64) -> Self {
        self.time_between_eviction_runs_millis = millis;
        self
    }

    pub fn with_min_evictable_idle_time_millis(mut self, millis: i64) -> Self {
        self.min_evictable_idle_time_millis = millis;
        self
    }

    pub fn with_soft_min_evictable_idle_time_millis(mut self, millis: i64) -> Self {
        self.soft_min_evictable_idle_time_millis = millis;
        self
    }

    pub fn with_num_tests_per_eviction_run(mut self, num_tests: i32) -> Self {
        self.num_tests_per_eviction_run = num_tests;
        self
    }

    pub fn with_lifo(mut self, lifo: bool) -> Self {
        self.lifo = lifo;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let c = PoolConfig::default();
        assert_eq!(c.max_total, 8);
        assert_eq!(c.max_idle, 8);
        assert_eq!(c.min_idle, 0);
        assert_eq!(c.max_wait_millis, -1);
        assert_eq!(c.when_exhausted_action, WhenExhaustedAction::Block);
        assert!(!c.test_on_borrow);
        assert!(!c.test_on_return);
        assert!(!c.test_while_idle);
        assert_eq!(c.time_between_eviction_runs_millis, -1);
        assert_eq!(c.min_evictable_idle_time_millis, 30 * 60 * 1000);
        assert_eq!(c.soft_min_evictable_idle_time_millis, -1);
        assert_eq!(c.num_tests_per_eviction_run, 3);
        assert!(c.lifo);
    }

    #[test]
    fn builder_overrides_fields() {
        let c = PoolConfig::new()
            .with_max_total(-1)
            .with_min_idle(2)
            .with_lifo(false)
            .with_num_tests_per_eviction_run(-2);
        assert_eq!(c.max_total, -1);
        assert_eq!(c.min_idle, 2);
        assert!(!c.lifo);
        assert_eq!(c.num_tests_per_eviction_run, -2);
    }
}
