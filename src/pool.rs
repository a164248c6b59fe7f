//! Core object pool implementation

use std::collections::HashMap;
use std::fmt::Write as _;
use std::hash::Hash;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};

use crate::config::{PoolConfig, WhenExhaustedAction};
use crate::deque::{IdleDeque, TakeError};
use crate::errors::{PoolError, PoolResult};
use crate::eviction::{self, EvictorTask, TaskHandle};
use crate::factory::PoolableObjectFactory;
use crate::metrics::{MetricsExporter, MetricsTracker, PoolMetrics};
use crate::pooled::PooledObject;

/// The pooling contract: lend, reclaim, discard, pre-load, drain, shut down.
pub trait ObjectPool<T>: Send + Sync {
    /// Obtain an instance, creating one when capacity allows.
    fn borrow_object(&self) -> PoolResult<T>;

    /// Give a borrowed instance back.
    fn return_object(&self, obj: T) -> PoolResult<()>;

    /// Discard an instance known to be broken. Factory destroy errors
    /// propagate to the caller.
    fn invalidate_object(&self, obj: T) -> PoolResult<()>;

    /// Create one instance and park it idle, for warming up a pool.
    fn add_object(&self) -> PoolResult<()>;

    /// Destroy every idle instance. Instances checked out stay untouched.
    fn clear(&self);

    /// Close the pool: drain idle instances and stop the evictor. Borrows
    /// fail afterwards; returns and invalidations keep working, with
    /// returned instances destroyed.
    fn close(&self);

    /// Instances currently checked out.
    fn num_active(&self) -> usize;

    /// Instances currently parked idle.
    fn num_idle(&self) -> usize;
}

/// A configurable, thread-safe object pool.
///
/// Instances are produced by a [`PoolableObjectFactory`] and recycled through
/// an idle deque. Capacity is bounded by `max_total`, idle retention by
/// `max_idle`, and a background evictor can age out or re-validate idle
/// members on a fixed cadence.
///
/// The value type doubles as the lookup key on return, so `T` must be
/// `Clone + Eq + Hash`. Pools of heavyweight resources typically use
/// `Arc<Resource>` as the value type.
///
/// # Examples
///
/// ```
/// use genpool::{BoxError, GenericObjectPool, PoolConfig, PoolableObjectFactory};
///
/// struct SessionFactory;
///
/// impl PoolableObjectFactory<String> for SessionFactory {
///     fn make_object(&self) -> Result<String, BoxError> {
///         Ok(String::from("session"))
///     }
/// }
///
/// let pool = GenericObjectPool::with_factory(SessionFactory, PoolConfig::default());
/// let session = pool.borrow_object().unwrap();
/// assert_eq!(pool.num_active(), 1);
/// pool.return_object(session).unwrap();
/// assert_eq!(pool.num_idle(), 1);
/// ```
pub struct GenericObjectPool<T> {
    inner: Arc<PoolInner<T>>,
}

impl<T> Clone for GenericObjectPool<T> {
    fn clone(&self) -> Self {
        GenericObjectPool {
            inner: Arc::clone(&self.inner),
        }
    }
}

struct PoolInner<T> {
    config: RwLock<Arc<PoolConfig>>,
    factory: RwLock<Option<Arc<dyn PoolableObjectFactory<T>>>>,
    all_objects: DashMap<T, Arc<PooledObject<T>>>,
    idle_objects: IdleDeque<T>,
    /// Members created or being created. May transiently overshoot
    /// `max_total` across racing creators; `create` settles it back.
    create_count: AtomicI64,
    closed: AtomicBool,
    eviction_cursor: Mutex<EvictionCursor<T>>,
    evictor: Mutex<Option<TaskHandle>>,
    metrics: MetricsTracker,
}

impl<T> Drop for PoolInner<T> {
    fn drop(&mut self) {
        if let Some(handle) = self.evictor.get_mut().take() {
            eviction::cancel(handle);
        }
    }
}

/// Walks idle members oldest-to-youngest across eviction runs. Operates on a
/// point-in-time snapshot; members that left the deque since are skipped by
/// the state machine when the evictor tries to claim them.
struct EvictionCursor<T> {
    snapshot: Vec<Arc<PooledObject<T>>>,
    pos: usize,
}

impl<T> EvictionCursor<T> {
    fn new() -> Self {
        EvictionCursor {
            snapshot: Vec::new(),
            pos: 0,
        }
    }

    fn next(&mut self) -> Option<Arc<PooledObject<T>>> {
        let member = self.snapshot.get(self.pos)?;
        self.pos += 1;
        Some(Arc::clone(member))
    }

    fn reset(&mut self, mut snapshot: Vec<Arc<PooledObject<T>>>, lifo: bool) {
        // LIFO parks fresh members at the head, so oldest-first means
        // walking from the tail.
        if lifo {
            snapshot.reverse();
        }
        self.snapshot = snapshot;
        self.pos = 0;
    }
}

fn positive_millis(millis: i64) -> Option<Duration> {
    if millis > 0 {
        Some(Duration::from_millis(millis as u64))
    } else {
        None
    }
}

impl<T> GenericObjectPool<T>
where
    T: Clone + Eq + Hash + Send + Sync + 'static,
{
    /// Create a pool with no factory yet. Install one with
    /// [`set_factory`](Self::set_factory) before borrowing.
    pub fn new(config: PoolConfig) -> Self {
        Self::build(None, config)
    }

    /// Create a pool around a factory.
    pub fn with_factory<F>(factory: F, config: PoolConfig) -> Self
    where
        F: PoolableObjectFactory<T> + 'static,
    {
        Self::build(Some(Arc::new(factory)), config)
    }

    fn build(factory: Option<Arc<dyn PoolableObjectFactory<T>>>, config: PoolConfig) -> Self {
        let eviction_delay = config.time_between_eviction_runs_millis;
        tracing::info!(
            max_total = config.max_total,
            max_idle = config.max_idle,
            eviction_millis = eviction_delay,
            "object pool created"
        );
        let inner = Arc::new(PoolInner {
            config: RwLock::new(Arc::new(config)),
            factory: RwLock::new(factory),
            all_objects: DashMap::new(),
            idle_objects: IdleDeque::new(),
            create_count: AtomicI64::new(0),
            closed: AtomicBool::new(false),
            eviction_cursor: Mutex::new(EvictionCursor::new()),
            evictor: Mutex::new(None),
            metrics: MetricsTracker::default(),
        });
        PoolInner::start_evictor(&inner, eviction_delay);
        GenericObjectPool { inner }
    }

    /// Obtain an instance from the pool.
    ///
    /// An idle instance is reused when one is available; otherwise a new one
    /// is created while `create_count` stays under `max_total`. With neither
    /// possible the exhausted action decides: fail immediately, or block
    /// until an instance is returned (bounded by `max_wait_millis`).
    ///
    /// Activation or validation failures on a reused instance destroy it and
    /// the loop moves on to the next candidate; the same failures on a
    /// freshly created instance abort the borrow with
    /// [`PoolError::FactoryFailure`].
    pub fn borrow_object(&self) -> PoolResult<T> {
        let inner = &self.inner;
        inner.assert_open()?;

        // One snapshot for the whole call; concurrent reconfiguration does
        // not alter a borrow already in flight.
        let cfg = inner.config_snapshot();
        let action = cfg.when_exhausted_action;
        let max_wait = cfg.max_wait_millis;

        loop {
            let mut created = false;
            let mut member = inner.idle_objects.poll_first();
            if member.is_none() {
                member = inner.create()?;
                created = member.is_some();
            }
            if member.is_none() && action == WhenExhaustedAction::Block {
                member = if max_wait <= 0 {
                    match inner.idle_objects.take_first() {
                        Ok(member) => Some(member),
                        Err(TakeError::Cancelled) => return Err(PoolError::Interrupted),
                    }
                } else {
                    match inner
                        .idle_objects
                        .poll_first_timeout(Duration::from_millis(max_wait as u64))
                    {
                        Ok(Some(member)) => Some(member),
                        Ok(None) => {
                            MetricsTracker::incr(&inner.metrics.borrow_timeouts);
                            return Err(PoolError::BorrowTimeout);
                        }
                        Err(TakeError::Cancelled) => return Err(PoolError::Interrupted),
                    }
                };
            }
            let member = match member {
                Some(member) => member,
                None => return Err(PoolError::PoolExhausted),
            };

            if !member.allocate() {
                // Lost the member to a concurrent evictor or invalidation.
                continue;
            }

            if let Some(factory) = inner.factory_snapshot() {
                if let Err(cause) = factory.activate_object(member.object()) {
                    inner.destroy_quietly(&member);
                    if created {
                        return Err(PoolError::factory("activate", cause));
                    }
                    continue;
                }
                if cfg.test_on_borrow {
                    match factory.validate_object(member.object()) {
                        Ok(true) => {}
                        verdict => {
                            MetricsTracker::incr(&inner.metrics.validation_failures);
                            inner.destroy_quietly(&member);
                            if created {
                                return Err(match verdict {
                                    Err(cause) => PoolError::factory("validate", cause),
                                    _ => PoolError::factory_rejected("validate"),
                                });
                            }
                            continue;
                        }
                    }
                }
            }

            MetricsTracker::incr(&inner.metrics.total_borrowed);
            return Ok(member.object().clone());
        }
    }

    /// Return a borrowed instance to the pool.
    ///
    /// The instance is validated (when `test_on_return` is set) and
    /// passivated; a failure in either destroys it silently. An accepted
    /// instance is parked at the head (LIFO) or tail (FIFO) of the idle
    /// deque. When the idle cap is already met the stalest idle member is
    /// destroyed to make room.
    pub fn return_object(&self, obj: T) -> PoolResult<()> {
        let inner = &self.inner;
        let member = match inner.all_objects.get(&obj) {
            Some(entry) => Arc::clone(entry.value()),
            None => return Err(PoolError::NotInPool),
        };

        let cfg = inner.config_snapshot();
        let factory = inner.factory_snapshot();

        if cfg.test_on_return {
            if let Some(factory) = &factory {
                if !matches!(factory.validate_object(member.object()), Ok(true)) {
                    MetricsTracker::incr(&inner.metrics.validation_failures);
                    inner.destroy_quietly(&member);
                    return Ok(());
                }
            }
        }

        if let Some(factory) = &factory {
            if factory.passivate_object(member.object()).is_err() {
                inner.destroy_quietly(&member);
                return Ok(());
            }
        }

        if !member.deallocate() {
            return Err(PoolError::AlreadyReturned);
        }
        MetricsTracker::incr(&inner.metrics.total_returned);

        if inner.closed.load(Ordering::SeqCst) {
            inner.destroy_quietly(&member);
            return Ok(());
        }

        let max_idle = cfg.max_idle;
        if max_idle >= 0 && inner.idle_objects.len() >= max_idle as usize {
            // Displace the stalest idle member to make room; with nothing
            // idle to displace the returner itself is dropped.
            let stale = if cfg.lifo {
                inner.idle_objects.poll_last()
            } else {
                inner.idle_objects.poll_first()
            };
            match stale {
                Some(stale) => inner.destroy_quietly(&stale),
                None => {
                    inner.destroy_quietly(&member);
                    return Ok(());
                }
            }
        }
        inner.park_idle(&cfg, member);
        Ok(())
    }

    /// Remove an instance from the pool and destroy it. Unlike the
    /// housekeeping paths, factory destroy errors propagate.
    pub fn invalidate_object(&self, obj: T) -> PoolResult<()> {
        let member = match self.inner.all_objects.get(&obj) {
            Some(entry) => Arc::clone(entry.value()),
            None => return Err(PoolError::NotInPool),
        };
        self.inner.destroy(&member)
    }

    /// Create an instance, passivate it, and park it idle.
    pub fn add_object(&self) -> PoolResult<()> {
        let inner = &self.inner;
        inner.assert_open()?;
        let factory = inner.factory_snapshot().ok_or(PoolError::NoFactory)?;
        let cfg = inner.config_snapshot();
        if let Some(member) = inner.create()? {
            if let Err(cause) = factory.passivate_object(member.object()) {
                inner.destroy_quietly(&member);
                return Err(PoolError::factory("passivate", cause));
            }
            inner.park_idle(&cfg, member);
        }
        Ok(())
    }

    /// Destroy every idle instance. Instances returned while the drain is in
    /// progress may be parked and survive it.
    pub fn clear(&self) {
        while let Some(member) = self.inner.idle_objects.poll_first() {
            self.inner.destroy_quietly(&member);
        }
    }

    /// Close the pool. Idempotent. Blocked borrowers are woken with
    /// [`PoolError::Interrupted`]; instances still checked out are destroyed
    /// as they come back.
    pub fn close(&self) {
        if self.inner.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.clear();
        self.inner.stop_evictor();
        self.inner.idle_objects.cancel_waiters();
        tracing::info!("object pool closed");
    }

    /// Instances currently checked out.
    pub fn num_active(&self) -> usize {
        self.inner
            .all_objects
            .len()
            .saturating_sub(self.inner.idle_objects.len())
    }

    /// Instances currently parked idle.
    pub fn num_idle(&self) -> usize {
        self.inner.idle_objects.len()
    }

    /// Install the factory.
    ///
    /// The first installation always succeeds. Rebinding succeeds only while
    /// no instance is checked out; idle instances built by the previous
    /// factory are destroyed first.
    pub fn set_factory<F>(&self, factory: F) -> PoolResult<()>
    where
        F: PoolableObjectFactory<T> + 'static,
    {
        self.inner.assert_open()?;
        let mut slot = self.inner.factory.write();
        if slot.is_none() {
            *slot = Some(Arc::new(factory));
            return Ok(());
        }
        if self.num_active() > 0 {
            return Err(PoolError::FactoryAlreadySet);
        }
        let old = slot.clone();
        while let Some(member) = self.inner.idle_objects.poll_first() {
            if let Err(err) = self.inner.destroy_with(&member, old.as_ref()) {
                tracing::warn!(error = %err, "ignoring failure to destroy pooled object");
            }
        }
        *slot = Some(Arc::new(factory));
        Ok(())
    }

    /// Install a new configuration snapshot. Calls already in flight keep
    /// the snapshot they read at entry. The evictor is restarted, or
    /// stopped, per the new cadence.
    pub fn set_config(&self, config: PoolConfig) {
        let eviction_delay = config.time_between_eviction_runs_millis;
        *self.inner.config.write() = Arc::new(config);
        PoolInner::start_evictor(&self.inner, eviction_delay);
    }

    /// The current configuration snapshot.
    pub fn config(&self) -> PoolConfig {
        (*self.inner.config_snapshot()).clone()
    }

    /// Run one eviction pass by hand, outside the timer cadence.
    pub fn evict(&self) -> PoolResult<()> {
        self.inner.evict()
    }

    /// Current metrics snapshot.
    pub fn metrics(&self) -> PoolMetrics {
        self.inner.metrics.snapshot(self.num_active(), self.num_idle())
    }

    /// Render metrics in Prometheus exposition format.
    pub fn export_metrics_prometheus(
        &self,
        pool_name: &str,
        tags: Option<&HashMap<String, String>>,
    ) -> String {
        MetricsExporter::export_prometheus(&self.metrics(), pool_name, tags)
    }

    /// Counts plus per-member idle times, for debugging.
    pub fn debug_info(&self) -> String {
        let mut buf = String::new();
        let _ = writeln!(buf, "Active: {}", self.num_active());
        let _ = writeln!(buf, "Idle: {}", self.num_idle());
        let _ = writeln!(buf, "Idle Objects:");
        for member in self.inner.idle_objects.snapshot() {
            let _ = writeln!(buf, "\tidle for {}ms", member.idle_time().as_millis());
        }
        buf
    }
}

impl<T> ObjectPool<T> for GenericObjectPool<T>
where
    T: Clone + Eq + Hash + Send + Sync + 'static,
{
    fn borrow_object(&self) -> PoolResult<T> {
        GenericObjectPool::borrow_object(self)
    }

    fn return_object(&self, obj: T) -> PoolResult<()> {
        GenericObjectPool::return_object(self, obj)
    }

    fn invalidate_object(&self, obj: T) -> PoolResult<()> {
        GenericObjectPool::invalidate_object(self, obj)
    }

    fn add_object(&self) -> PoolResult<()> {
        GenericObjectPool::add_object(self)
    }

    fn clear(&self) {
        GenericObjectPool::clear(self)
    }

    fn close(&self) {
        GenericObjectPool::close(self)
    }

    fn num_active(&self) -> usize {
        GenericObjectPool::num_active(self)
    }

    fn num_idle(&self) -> usize {
        GenericObjectPool::num_idle(self)
    }
}

impl<T> PoolInner<T>
where
    T: Clone + Eq + Hash + Send + Sync + 'static,
{
    fn assert_open(&self) -> PoolResult<()> {
        if self.closed.load(Ordering::SeqCst) {
            Err(PoolError::PoolClosed)
        } else {
            Ok(())
        }
    }

    fn config_snapshot(&self) -> Arc<PoolConfig> {
        Arc::clone(&self.config.read())
    }

    fn factory_snapshot(&self) -> Option<Arc<dyn PoolableObjectFactory<T>>> {
        self.factory.read().clone()
    }

    fn park_idle(&self, cfg: &PoolConfig, member: Arc<PooledObject<T>>) {
        if cfg.lifo {
            self.idle_objects.add_first(member);
        } else {
            self.idle_objects.add_last(member);
        }
    }

    /// Create a member while capacity allows. `Ok(None)` means the cap is
    /// reached or no factory is installed. The count is incremented first
    /// and settled back on rejection or factory failure, so the cap holds
    /// across racing creators.
    fn create(&self) -> PoolResult<Option<Arc<PooledObject<T>>>> {
        let factory = match self.factory_snapshot() {
            Some(factory) => factory,
            None => return Ok(None),
        };
        let max_total = self.config_snapshot().max_total;
        let count = self.create_count.fetch_add(1, Ordering::SeqCst) + 1;
        if max_total >= 0 && count > i64::from(max_total) {
            self.create_count.fetch_sub(1, Ordering::SeqCst);
            return Ok(None);
        }
        let value = match factory.make_object() {
            Ok(value) => value,
            Err(cause) => {
                self.create_count.fetch_sub(1, Ordering::SeqCst);
                return Err(PoolError::factory("make", cause));
            }
        };
        let member = Arc::new(PooledObject::new(value.clone()));
        self.all_objects.insert(value, Arc::clone(&member));
        MetricsTracker::incr(&self.metrics.total_created);
        tracing::debug!(total = self.all_objects.len(), "created pooled object");
        Ok(Some(member))
    }

    fn destroy(&self, member: &Arc<PooledObject<T>>) -> PoolResult<()> {
        let factory = self.factory_snapshot();
        self.destroy_with(member, factory.as_ref())
    }

    fn destroy_with(
        &self,
        member: &Arc<PooledObject<T>>,
        factory: Option<&Arc<dyn PoolableObjectFactory<T>>>,
    ) -> PoolResult<()> {
        if !member.invalidate() {
            // A racing path already destroyed this member.
            return Ok(());
        }
        self.idle_objects.remove(member);
        self.all_objects.remove(member.object());
        let result = match factory {
            Some(factory) => factory
                .destroy_object(member.object())
                .map_err(|cause| PoolError::factory("destroy", cause)),
            None => Ok(()),
        };
        self.create_count.fetch_sub(1, Ordering::SeqCst);
        MetricsTracker::incr(&self.metrics.total_destroyed);
        tracing::debug!(remaining = self.all_objects.len(), "destroyed pooled object");
        result
    }

    /// The swallow policy for housekeeping paths: destroy failures are
    /// logged and dropped.
    fn destroy_quietly(&self, member: &Arc<PooledObject<T>>) {
        if let Err(err) = self.destroy(member) {
            tracing::warn!(error = %err, "ignoring failure to destroy pooled object");
        }
    }

    /// One eviction pass: examine up to the per-run budget of idle members
    /// oldest-first, destroying those past the idle-time thresholds and,
    /// when `test_while_idle` is set, those failing re-validation.
    fn evict(&self) -> PoolResult<()> {
        self.assert_open()?;
        if self.idle_objects.len() == 0 {
            return Ok(());
        }

        let cfg = self.config_snapshot();
        let factory = self.factory_snapshot();
        let hard_threshold = positive_millis(cfg.min_evictable_idle_time_millis);
        let soft_threshold = positive_millis(cfg.soft_min_evictable_idle_time_millis);
        let min_idle = cfg.min_idle.max(0) as usize;
        let num_tests = self.num_tests(&cfg);

        let mut cursor = self.eviction_cursor.lock();
        let mut tested = 0;
        while tested < num_tests {
            let member = match cursor.next() {
                Some(member) => member,
                None => {
                    cursor.reset(self.idle_objects.snapshot(), cfg.lifo);
                    match cursor.next() {
                        Some(member) => member,
                        None => return Ok(()),
                    }
                }
            };

            if !member.start_eviction_test() {
                // Borrowed or destroyed since the snapshot; not counted
                // against the budget.
                continue;
            }
            tested += 1;

            let idle_time = member.idle_time();
            let hard_evict = hard_threshold.is_some_and(|t| idle_time > t);
            let soft_evict = soft_threshold
                .is_some_and(|t| idle_time > t && self.idle_objects.len() > min_idle);
            if hard_evict || soft_evict {
                self.destroy_quietly(&member);
                MetricsTracker::incr(&self.metrics.total_evicted);
                tracing::debug!(idle_millis = idle_time.as_millis() as u64, "evicted idle object");
                continue;
            }

            if cfg.test_while_idle {
                if let Some(factory) = &factory {
                    if factory.activate_object(member.object()).is_err() {
                        self.destroy_quietly(&member);
                    } else if !matches!(factory.validate_object(member.object()), Ok(true)) {
                        MetricsTracker::incr(&self.metrics.validation_failures);
                        self.destroy_quietly(&member);
                    } else if factory.passivate_object(member.object()).is_err() {
                        self.destroy_quietly(&member);
                    }
                }
            }
            PooledObject::end_eviction_test(&member, &self.idle_objects);
        }
        Ok(())
    }

    /// Top the idle pool up to `min_idle`, stopping when the creation cap is
    /// reached or the factory fails.
    fn ensure_min_idle(&self) -> PoolResult<()> {
        let cfg = self.config_snapshot();
        if cfg.min_idle < 1 {
            return Ok(());
        }
        while self.idle_objects.len() < cfg.min_idle as usize {
            match self.create()? {
                Some(member) => self.park_idle(&cfg, member),
                None => break,
            }
        }
        Ok(())
    }

    /// Per-run examination budget. A negative setting of `-n` examines
    /// roughly one `n`th of the idle members per run.
    fn num_tests(&self, cfg: &PoolConfig) -> usize {
        let idle = self.idle_objects.len();
        let n = cfg.num_tests_per_eviction_run;
        if n >= 0 {
            (n as usize).min(idle)
        } else {
            let denom = n.unsigned_abs() as usize;
            (idle + denom - 1) / denom
        }
    }

    fn start_evictor(inner: &Arc<Self>, delay_millis: i64) {
        let mut slot = inner.evictor.lock();
        if let Some(handle) = slot.take() {
            eviction::cancel(handle);
        }
        if delay_millis > 0 && !inner.closed.load(Ordering::SeqCst) {
            let weak = Arc::downgrade(inner);
            let run: EvictorTask = Arc::new(move || {
                let inner = match weak.upgrade() {
                    Some(inner) => inner,
                    None => return false,
                };
                if inner.closed.load(Ordering::SeqCst) {
                    return false;
                }
                // Failures stay inside the run so the timer survives.
                if let Err(err) = inner.evict() {
                    tracing::debug!(error = %err, "eviction pass skipped");
                }
                if let Err(err) = inner.ensure_min_idle() {
                    tracing::warn!(error = %err, "unable to replenish idle objects");
                }
                true
            });
            let period = Duration::from_millis(delay_millis as u64);
            *slot = Some(eviction::schedule(run, period, period));
        }
    }

    fn stop_evictor(&self) {
        let mut slot = self.evictor.lock();
        if let Some(handle) = slot.take() {
            eviction::cancel(handle);
        }
    }
}
