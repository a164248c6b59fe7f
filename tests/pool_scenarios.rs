//! Coordinator behavior under sequential and concurrent use

use std::collections::HashSet;
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use genpool::{
    BoxError, GenericObjectPool, ObjectPool, PoolConfig, PoolError, PoolableObjectFactory,
    WhenExhaustedAction,
};

#[derive(Default)]
struct FactoryState {
    made: AtomicI32,
    destroyed: Mutex<Vec<i32>>,
}

struct IntFactory {
    state: Arc<FactoryState>,
    validate: Option<fn(i32) -> bool>,
    passivate_fails: Option<fn(i32) -> bool>,
}

impl IntFactory {
    fn new(state: Arc<FactoryState>) -> Self {
        IntFactory {
            state,
            validate: None,
            passivate_fails: None,
        }
    }
}

impl PoolableObjectFactory<i32> for IntFactory {
    fn make_object(&self) -> Result<i32, BoxError> {
        Ok(self.state.made.fetch_add(1, Ordering::SeqCst))
    }

    fn destroy_object(&self, obj: &i32) -> Result<(), BoxError> {
        self.state.destroyed.lock().unwrap().push(*obj);
        Ok(())
    }

    fn validate_object(&self, obj: &i32) -> Result<bool, BoxError> {
        Ok(self.validate.map_or(true, |accept| accept(*obj)))
    }

    fn passivate_object(&self, obj: &i32) -> Result<(), BoxError> {
        match self.passivate_fails {
            Some(fails) if fails(*obj) => Err("passivation refused".into()),
            _ => Ok(()),
        }
    }
}

#[derive(Default)]
struct StringState {
    made: AtomicI32,
    destroyed: Mutex<Vec<String>>,
}

struct StringFactory {
    state: Arc<StringState>,
}

impl PoolableObjectFactory<String> for StringFactory {
    fn make_object(&self) -> Result<String, BoxError> {
        Ok(self.state.made.fetch_add(1, Ordering::SeqCst).to_string())
    }

    fn destroy_object(&self, obj: &String) -> Result<(), BoxError> {
        self.state.destroyed.lock().unwrap().push(obj.clone());
        Ok(())
    }
}

#[test]
fn idle_cap_limits_parked_members() {
    let state = Arc::new(StringState::default());
    let config = PoolConfig::new().with_max_total(-1).with_max_idle(8);
    let pool = GenericObjectPool::with_factory(
        StringFactory {
            state: Arc::clone(&state),
        },
        config,
    );

    let held: Vec<String> = (0..100).map(|_| pool.borrow_object().unwrap()).collect();
    assert_eq!(pool.num_active(), 100);
    assert_eq!(pool.num_idle(), 0);

    for (k, obj) in held.into_iter().enumerate() {
        pool.return_object(obj).unwrap();
        assert_eq!(pool.num_active(), 99 - k);
        assert_eq!(pool.num_idle(), (k + 1).min(8));
    }
    assert_eq!(state.destroyed.lock().unwrap().len(), 92);
}

#[test]
fn borrow_without_factory_reports_exhausted() {
    let config = PoolConfig::new().with_when_exhausted_action(WhenExhaustedAction::Fail);
    let pool: GenericObjectPool<i32> = GenericObjectPool::new(config);
    assert!(matches!(pool.borrow_object(), Err(PoolError::PoolExhausted)));
}

#[test]
fn set_factory_rejected_while_objects_active() {
    let state = Arc::new(FactoryState::default());
    let pool: GenericObjectPool<i32> = GenericObjectPool::new(PoolConfig::default());
    pool.set_factory(IntFactory::new(Arc::clone(&state))).unwrap();

    let held = pool.borrow_object().unwrap();
    assert!(matches!(
        pool.set_factory(IntFactory::new(Arc::clone(&state))),
        Err(PoolError::FactoryAlreadySet)
    ));

    pool.return_object(held).unwrap();
    pool.set_factory(IntFactory::new(Arc::clone(&state))).unwrap();
    // Rebinding discards the idle member built by the old factory.
    assert_eq!(pool.num_idle(), 0);
    assert_eq!(*state.destroyed.lock().unwrap(), vec![0]);
}

#[test]
fn invalid_and_passivation_failures_filter_returns() {
    let state = Arc::new(FactoryState::default());
    let mut factory = IntFactory::new(Arc::clone(&state));
    factory.validate = Some(|n| n % 2 == 1);
    factory.passivate_fails = Some(|n| n % 3 == 0);
    let config = PoolConfig::new()
        .with_max_total(-1)
        .with_max_idle(20)
        .with_test_on_return(true);
    let pool = GenericObjectPool::with_factory(factory, config);

    let held: Vec<i32> = (0..10).map(|_| pool.borrow_object().unwrap()).collect();
    assert_eq!(held, (0..10).collect::<Vec<_>>());
    for obj in held {
        pool.return_object(obj).unwrap();
    }
    assert_eq!(pool.num_idle(), 3);

    let mut survivors: Vec<i32> = (0..3).map(|_| pool.borrow_object().unwrap()).collect();
    survivors.sort_unstable();
    assert_eq!(survivors, vec![1, 5, 7]);
}

#[test]
fn overflow_discards_stalest_idle_member() {
    let state = Arc::new(FactoryState::default());
    let config = PoolConfig::new().with_max_total(4).with_max_idle(3);
    let pool = GenericObjectPool::with_factory(IntFactory::new(Arc::clone(&state)), config);

    let objs: Vec<i32> = (0..4).map(|_| pool.borrow_object().unwrap()).collect();
    pool.return_object(objs[0]).unwrap();
    pool.return_object(objs[1]).unwrap();
    pool.return_object(objs[2]).unwrap();
    assert!(state.destroyed.lock().unwrap().is_empty());

    pool.return_object(objs[3]).unwrap();
    assert_eq!(*state.destroyed.lock().unwrap(), vec![0]);
    assert_eq!(pool.num_idle(), 3);
    assert_eq!(pool.num_active(), 0);
}

#[test]
fn blocked_borrowers_are_served_fifo() {
    let state = Arc::new(FactoryState::default());
    let config = PoolConfig::new().with_max_total(1);
    let pool = GenericObjectPool::with_factory(IntFactory::new(state), config);

    let held = pool.borrow_object().unwrap();
    let order: Arc<Mutex<Vec<&'static str>>> = Arc::new(Mutex::new(Vec::new()));

    let spawn_borrower = |name: &'static str| {
        let pool = pool.clone();
        let order = Arc::clone(&order);
        thread::spawn(move || {
            let obj = pool.borrow_object().unwrap();
            order.lock().unwrap().push(name);
            thread::sleep(Duration::from_millis(150));
            pool.return_object(obj).unwrap();
        })
    };

    let b = spawn_borrower("b");
    thread::sleep(Duration::from_millis(150));
    let c = spawn_borrower("c");
    thread::sleep(Duration::from_millis(150));

    pool.return_object(held).unwrap();
    b.join().unwrap();
    c.join().unwrap();
    assert_eq!(*order.lock().unwrap(), vec!["b", "c"]);
}

#[test]
fn balanced_borrows_restore_counts() {
    let state = Arc::new(FactoryState::default());
    let pool =
        GenericObjectPool::with_factory(IntFactory::new(state), PoolConfig::default());
    pool.add_object().unwrap();
    pool.add_object().unwrap();
    assert_eq!((pool.num_active(), pool.num_idle()), (0, 2));

    for _ in 0..5 {
        let a = pool.borrow_object().unwrap();
        let b = pool.borrow_object().unwrap();
        pool.return_object(b).unwrap();
        pool.return_object(a).unwrap();
    }
    assert_eq!((pool.num_active(), pool.num_idle()), (0, 2));

    let metrics = pool.metrics();
    assert_eq!(metrics.total_borrowed, 10);
    assert_eq!(metrics.total_returned, 10);
    assert_eq!(metrics.total_created, 2);
    assert_eq!(metrics.total_destroyed, 0);
}

#[test]
fn pool_works_through_the_trait_object() {
    let state = Arc::new(FactoryState::default());
    let pool =
        GenericObjectPool::with_factory(IntFactory::new(state), PoolConfig::default());
    let pool: &dyn ObjectPool<i32> = &pool;

    let obj = pool.borrow_object().unwrap();
    assert_eq!(pool.num_active(), 1);
    pool.return_object(obj).unwrap();
    assert_eq!(pool.num_idle(), 1);
}

#[test]
fn close_is_idempotent() {
    let state = Arc::new(FactoryState::default());
    let pool = GenericObjectPool::with_factory(
        IntFactory::new(Arc::clone(&state)),
        PoolConfig::default(),
    );
    pool.add_object().unwrap();
    pool.add_object().unwrap();
    let held = pool.borrow_object().unwrap();

    pool.close();
    let destroyed_once = state.destroyed.lock().unwrap().len();
    assert_eq!(destroyed_once, 1);
    pool.close();
    assert_eq!(state.destroyed.lock().unwrap().len(), destroyed_once);

    assert!(matches!(pool.borrow_object(), Err(PoolError::PoolClosed)));

    // Returns still work after close; the instance is destroyed.
    pool.return_object(held).unwrap();
    assert_eq!(pool.num_active(), 0);
    assert_eq!(state.destroyed.lock().unwrap().len(), 2);
}

#[test]
fn second_return_is_rejected() {
    let state = Arc::new(FactoryState::default());
    let pool =
        GenericObjectPool::with_factory(IntFactory::new(state), PoolConfig::default());
    let obj = pool.borrow_object().unwrap();
    pool.return_object(obj).unwrap();
    assert!(matches!(
        pool.return_object(obj),
        Err(PoolError::AlreadyReturned)
    ));
}

#[test]
fn return_of_unknown_object_is_rejected() {
    let state = Arc::new(FactoryState::default());
    let pool =
        GenericObjectPool::with_factory(IntFactory::new(state), PoolConfig::default());
    assert!(matches!(
        pool.return_object(12345),
        Err(PoolError::NotInPool)
    ));
}

#[test]
fn blocked_borrow_times_out() {
    let state = Arc::new(FactoryState::default());
    let config = PoolConfig::new().with_max_total(1).with_max_wait_millis(100);
    let pool = GenericObjectPool::with_factory(IntFactory::new(state), config);

    let _held = pool.borrow_object().unwrap();
    let start = Instant::now();
    assert!(matches!(
        pool.borrow_object(),
        Err(PoolError::BorrowTimeout)
    ));
    assert!(start.elapsed() >= Duration::from_millis(100));
}

#[test]
fn close_interrupts_blocked_borrowers() {
    let state = Arc::new(FactoryState::default());
    let config = PoolConfig::new().with_max_total(1);
    let pool = GenericObjectPool::with_factory(IntFactory::new(state), config);

    let held = pool.borrow_object().unwrap();
    let waiter = {
        let pool = pool.clone();
        thread::spawn(move || pool.borrow_object())
    };
    thread::sleep(Duration::from_millis(200));

    pool.close();
    assert!(matches!(
        waiter.join().unwrap(),
        Err(PoolError::Interrupted)
    ));

    pool.return_object(held).unwrap();
    assert_eq!(pool.num_active(), 0);
}

#[test]
fn invalidate_removes_member_and_frees_capacity() {
    let state = Arc::new(FactoryState::default());
    let config = PoolConfig::new()
        .with_max_total(1)
        .with_when_exhausted_action(WhenExhaustedAction::Fail);
    let pool = GenericObjectPool::with_factory(IntFactory::new(Arc::clone(&state)), config);

    let obj = pool.borrow_object().unwrap();
    assert_eq!(pool.num_active(), 1);
    pool.invalidate_object(obj).unwrap();
    assert_eq!(pool.num_active(), 0);
    assert_eq!(*state.destroyed.lock().unwrap(), vec![0]);
    assert!(matches!(
        pool.invalidate_object(obj),
        Err(PoolError::NotInPool)
    ));

    // Capacity freed by the invalidation is usable again.
    assert_eq!(pool.borrow_object().unwrap(), 1);
}

#[test]
fn concurrent_borrowers_never_share_an_instance() {
    let state = Arc::new(FactoryState::default());
    let config = PoolConfig::new()
        .with_max_total(4)
        .with_max_wait_millis(5000);
    let pool = GenericObjectPool::with_factory(IntFactory::new(state), config);
    let in_use: Arc<Mutex<HashSet<i32>>> = Arc::new(Mutex::new(HashSet::new()));

    let mut handles = Vec::new();
    for _ in 0..8 {
        let pool = pool.clone();
        let in_use = Arc::clone(&in_use);
        handles.push(thread::spawn(move || {
            for _ in 0..200 {
                let obj = pool.borrow_object().unwrap();
                assert!(
                    in_use.lock().unwrap().insert(obj),
                    "instance lent to two borrowers"
                );
                thread::yield_now();
                in_use.lock().unwrap().remove(&obj);
                pool.return_object(obj).unwrap();
            }
        }));
    }
    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(pool.num_active(), 0);
    assert!(pool.num_idle() <= 4);
}
