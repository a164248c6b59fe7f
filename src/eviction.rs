//! Process-wide timer that drives eviction runs for every pool

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use once_cell::sync::Lazy;
use parking_lot::{Condvar, Mutex};

/// A periodic job. Returning false unschedules the job, which is how evictor
/// tasks detach themselves once their pool is closed or dropped.
pub(crate) type EvictorTask = Arc<dyn Fn() -> bool + Send + Sync>;

/// Handle for a scheduled task, used to cancel it.
#[derive(Debug)]
pub(crate) struct TaskHandle {
    id: u64,
}

static TIMER: Lazy<EvictionTimer> = Lazy::new(EvictionTimer::new);

struct ScheduledTask {
    id: u64,
    next_run: Instant,
    period: Duration,
    run: EvictorTask,
}

struct TimerState {
    tasks: Vec<ScheduledTask>,
    next_id: u64,
    worker_alive: bool,
}

/// Shared timer. The worker thread starts lazily on the first schedule and
/// exits once the task list drains, so idle processes hold no extra thread.
struct EvictionTimer {
    state: Mutex<TimerState>,
    cond: Condvar,
}

impl EvictionTimer {
    fn new() -> Self {
        EvictionTimer {
            state: Mutex::new(TimerState {
                tasks: Vec::new(),
                next_id: 0,
                worker_alive: false,
            }),
            cond: Condvar::new(),
        }
    }
}

/// Schedule `run` to fire after `delay` and then every `period`.
pub(crate) fn schedule(run: EvictorTask, delay: Duration, period: Duration) -> TaskHandle {
    let mut state = TIMER.state.lock();
    let id = state.next_id;
    state.next_id += 1;
    state.tasks.push(ScheduledTask {
        id,
        next_run: Instant::now() + delay,
        period,
        run,
    });
    if !state.worker_alive {
        state.worker_alive = true;
        if let Err(err) = thread::Builder::new()
            .name("genpool-evictor".into())
            .spawn(worker_loop)
        {
            state.worker_alive = false;
            tracing::error!(error = %err, "failed to spawn evictor timer thread");
        }
    }
    TIMER.cond.notify_one();
    TaskHandle { id }
}

/// Cancel a scheduled task.
pub(crate) fn cancel(handle: TaskHandle) {
    cancel_id(handle.id);
}

fn cancel_id(id: u64) {
    let mut state = TIMER.state.lock();
    state.tasks.retain(|task| task.id != id);
    TIMER.cond.notify_one();
}

fn worker_loop() {
    loop {
        let mut due: Vec<(u64, EvictorTask)> = Vec::new();
        {
            let mut state = TIMER.state.lock();
            loop {
                let next = match state.tasks.iter().map(|task| task.next_run).min() {
                    Some(next) => next,
                    None => {
                        state.worker_alive = false;
                        return;
                    }
                };
                if next <= Instant::now() {
                    break;
                }
                TIMER.cond.wait_until(&mut state, next);
            }
            let now = Instant::now();
            for task in state.tasks.iter_mut() {
                if task.next_run <= now {
                    task.next_run = now + task.period;
                    due.push((task.id, Arc::clone(&task.run)));
                }
            }
        }
        // Tasks run without the timer lock so a slow eviction pass in one
        // pool cannot stall scheduling for the others.
        for (id, run) in due {
            if !run() {
                cancel_id(id);
            }
        }
    }
}
