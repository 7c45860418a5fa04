//! Dispatch context for timers and gesture callbacks
//!
//! Everything the classifier defers (hold timers, settle timers, released
//! notifications) runs as a [`Job`] on a [`Scheduler`]. Jobs run one at a
//! time, ordered by deadline and then by submission order.
//!
//! Two schedulers are provided:
//!
//! - [`RunLoop`] owns a dedicated thread that sleeps until the next deadline.
//! - [`ManualScheduler`] keeps a virtual clock that the host advances from its
//!   own loop. Tests use it to drive timing deterministically.

use parking_lot::{Condvar, Mutex, MutexGuard};
use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};
use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Deferred unit of work
pub type Job = Box<dyn FnOnce() + Send + 'static>;

/// Handle to a scheduled job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerId(u64);

/// A single-threaded timer context.
pub trait Scheduler: Send + Sync {
    /// Current time as seen by this scheduler
    fn now(&self) -> Instant;

    /// Run `job` once `delay` has elapsed
    fn schedule(&self, delay: Duration, job: Job) -> TimerId;

    /// Drop a pending job. Returns false if it already ran or was cancelled.
    fn cancel(&self, id: TimerId) -> bool;
}

/// Pending jobs ordered by (deadline, id). Cancelled ids stay in the heap
/// until they surface and are skipped.
#[derive(Default)]
struct TimerQueue {
    order: BinaryHeap<Reverse<(Instant, u64)>>,
    jobs: HashMap<u64, Job>,
    next_id: u64,
}

impl TimerQueue {
    fn push(&mut self, deadline: Instant, job: Job) -> TimerId {
        let id = self.next_id;
        self.next_id += 1;
        self.order.push(Reverse((deadline, id)));
        self.jobs.insert(id, job);
        TimerId(id)
    }

    fn cancel(&mut self, id: TimerId) -> bool {
        self.jobs.remove(&id.0).is_some()
    }

    fn next_deadline(&mut self) -> Option<Instant> {
        while let Some(&Reverse((deadline, id))) = self.order.peek() {
            if self.jobs.contains_key(&id) {
                return Some(deadline);
            }
            self.order.pop();
        }
        None
    }

    fn pop_due(&mut self, now: Instant) -> Option<(Instant, Job)> {
        loop {
            let Reverse((deadline, id)) = *self.order.peek()?;
            if deadline > now {
                return None;
            }
            self.order.pop();
            if let Some(job) = self.jobs.remove(&id) {
                return Some((deadline, job));
            }
        }
    }

    fn len(&self) -> usize {
        self.jobs.len()
    }
}

fn run_job(job: Job) {
    if panic::catch_unwind(AssertUnwindSafe(job)).is_err() {
        log::error!("dispatch job panicked; continuing with the next job");
    }
}

struct Shared {
    queue: Mutex<TimerQueue>,
    wakeup: Condvar,
    shutdown: AtomicBool,
}

/// Scheduler backed by a dedicated dispatch thread
pub struct RunLoop {
    shared: Arc<Shared>,
    thread: Option<JoinHandle<()>>,
}

impl RunLoop {
    /// Spawn the dispatch thread
    pub fn spawn() -> io::Result<Self> {
        Self::spawn_named("keyboard-tapkit-dispatch")
    }

    pub fn spawn_named(name: &str) -> io::Result<Self> {
        let shared = Arc::new(Shared {
            queue: Mutex::new(TimerQueue::default()),
            wakeup: Condvar::new(),
            shutdown: AtomicBool::new(false),
        });

        let worker = Arc::clone(&shared);
        let thread = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || Self::run(worker))?;

        log::debug!("dispatch thread '{}' started", name);
        Ok(Self {
            shared,
            thread: Some(thread),
        })
    }

    fn run(shared: Arc<Shared>) {
        let mut queue = shared.queue.lock();
        loop {
            if shared.shutdown.load(Ordering::Acquire) {
                break;
            }

            if let Some((_, job)) = queue.pop_due(Instant::now()) {
                MutexGuard::unlocked(&mut queue, || run_job(job));
                continue;
            }

            match queue.next_deadline() {
                Some(deadline) => {
                    shared.wakeup.wait_until(&mut queue, deadline);
                }
                None => shared.wakeup.wait(&mut queue),
            }
        }
    }

    /// Number of pending jobs
    pub fn pending(&self) -> usize {
        self.shared.queue.lock().len()
    }
}

impl Scheduler for RunLoop {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn schedule(&self, delay: Duration, job: Job) -> TimerId {
        let deadline = Instant::now() + delay;
        let id = self.shared.queue.lock().push(deadline, job);
        self.shared.wakeup.notify_one();
        id
    }

    fn cancel(&self, id: TimerId) -> bool {
        self.shared.queue.lock().cancel(id)
    }
}

impl Drop for RunLoop {
    fn drop(&mut self) {
        {
            let _queue = self.shared.queue.lock();
            self.shared.shutdown.store(true, Ordering::Release);
            self.shared.wakeup.notify_all();
        }

        if let Some(handle) = self.thread.take() {
            // The last owner may be a job running on the dispatch thread itself
            if handle.thread().id() == thread::current().id() {
                return;
            }
            if handle.join().is_err() {
                log::error!("dispatch thread panicked");
            }
        }
    }
}

/// Scheduler with a virtual clock advanced by the host.
///
/// Nothing runs until [`ManualScheduler::advance`], [`ManualScheduler::advance_to`]
/// or [`ManualScheduler::run_due`] is called; each runs every job whose
/// deadline has been reached, including jobs scheduled by those jobs.
pub struct ManualScheduler {
    now: Mutex<Instant>,
    queue: Mutex<TimerQueue>,
}

impl ManualScheduler {
    pub fn new() -> Self {
        Self::starting_at(Instant::now())
    }

    pub fn starting_at(start: Instant) -> Self {
        Self {
            now: Mutex::new(start),
            queue: Mutex::new(TimerQueue::default()),
        }
    }

    /// Move the clock forward by `by`, running due jobs. Returns the number run.
    pub fn advance(&self, by: Duration) -> usize {
        let target = self.now() + by;
        self.advance_to(target)
    }

    /// Move the clock to `target`, running due jobs. Never moves backwards.
    pub fn advance_to(&self, target: Instant) -> usize {
        let mut ran = 0;
        loop {
            let next = self.queue.lock().pop_due(target);
            let Some((deadline, job)) = next else { break };
            {
                let mut now = self.now.lock();
                if deadline > *now {
                    *now = deadline;
                }
            }
            run_job(job);
            ran += 1;
        }

        let mut now = self.now.lock();
        if target > *now {
            *now = target;
        }
        ran
    }

    /// Run jobs that are due at the current time
    pub fn run_due(&self) -> usize {
        self.advance_to(self.now())
    }

    /// Number of pending jobs
    pub fn pending(&self) -> usize {
        self.queue.lock().len()
    }
}

impl Default for ManualScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Scheduler for ManualScheduler {
    fn now(&self) -> Instant {
        *self.now.lock()
    }

    fn schedule(&self, delay: Duration, job: Job) -> TimerId {
        let deadline = self.now() + delay;
        self.queue.lock().push(deadline, job)
    }

    fn cancel(&self, id: TimerId) -> bool {
        self.queue.lock().cancel(id)
    }
}
