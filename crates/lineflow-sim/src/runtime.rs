//! Cooperative task runtime over virtual time.
//!
//! Simulation processes (the arrival generator, one routing task per item,
//! one restock loop per station) are ordinary `async` blocks. The runtime
//! polls exactly one of them at a time, so shared model state lives in
//! `Cell`/`RefCell` without locks: a mutation made between two suspension
//! points is never observed half-done.
//!
//! Every resumption goes through the [`EventQueue`] as an
//! [`EventKind::Resume`] event. Timers schedule one at their deadline; the
//! sync primitives schedule one at the current instant when they hand a slot
//! or stock to a waiter. Equal timestamps fire in scheduling order, so the
//! whole interleaving is a function of the seed.
//!
//! ```text
//!   spawn ──► Resume(t, task) ──► EventQueue ──pop──► advance clock ──► poll task
//!                   ▲                                                      │
//!                   └──── Delay / Resource / Container / Gate wakeups ◄────┘
//! ```

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll, Waker};

use serde::Serialize;

use crate::clock::SimClock;
use crate::event::{EventId, EventKind, EventQueue};

type LocalTask = Pin<Box<dyn Future<Output = ()>>>;

/// Identifier of a spawned task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TaskId(u64);

impl TaskId {
    pub fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    pub fn as_raw(self) -> u64 {
        self.0
    }
}

struct Kernel {
    clock: SimClock,
    events: EventQueue,
    /// Task being polled right now.
    current_task: Option<TaskId>,
    /// Event whose firing caused the current poll.
    current_event: Option<EventId>,
    next_task: u64,
    /// Spawned but not yet moved into the runtime's task table.
    spawned: Vec<(TaskId, LocalTask)>,
}

/// Handle to the simulation kernel, cloned into every task.
#[derive(Clone)]
pub struct Sim {
    kernel: Rc<RefCell<Kernel>>,
}

impl fmt::Debug for Sim {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Sim")
            .field("now_ns", &self.now())
            .finish_non_exhaustive()
    }
}

impl Sim {
    /// Current virtual time in nanoseconds.
    pub fn now(&self) -> u64 {
        self.kernel.borrow().clock.now()
    }

    /// Suspends the calling task for `delay_ns`.
    ///
    /// A zero delay still yields: the task resumes after everything already
    /// scheduled for the current instant.
    pub fn after(&self, delay_ns: u64) -> Delay {
        Delay {
            sim: self.clone(),
            delay_ns,
            timer: None,
        }
    }

    /// Spawns a task. It first runs after the events already scheduled for
    /// the current instant.
    pub fn spawn<F>(&self, future: F) -> TaskId
    where
        F: Future<Output = ()> + 'static,
    {
        let mut kernel = self.kernel.borrow_mut();
        let id = TaskId(kernel.next_task);
        kernel.next_task += 1;
        kernel.spawned.push((id, Box::pin(future)));
        let now = kernel.clock.now();
        kernel.events.schedule(now, EventKind::Resume(id));
        id
    }

    /// The task currently being polled.
    ///
    /// # Panics
    ///
    /// Panics when a simulation future is polled outside the runtime.
    pub(crate) fn current_task(&self) -> TaskId {
        self.kernel
            .borrow()
            .current_task
            .expect("simulation futures must be awaited inside a spawned task")
    }

    /// Resumes `task` at the current instant, after already-scheduled events.
    pub(crate) fn wake(&self, task: TaskId) {
        let mut kernel = self.kernel.borrow_mut();
        let now = kernel.clock.now();
        kernel.events.schedule(now, EventKind::Resume(task));
    }

    fn schedule_resume(&self, time_ns: u64, task: TaskId) -> EventId {
        self.kernel
            .borrow_mut()
            .events
            .schedule(time_ns, EventKind::Resume(task))
    }

    fn current_event(&self) -> Option<EventId> {
        self.kernel.borrow().current_event
    }
}

/// Future returned by [`Sim::after`].
#[derive(Debug)]
#[must_use = "futures do nothing unless awaited"]
pub struct Delay {
    sim: Sim,
    delay_ns: u64,
    /// Deadline and the event scheduled for it, once armed.
    timer: Option<(u64, EventId)>,
}

impl Future for Delay {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<()> {
        let Some((deadline, timer)) = self.timer else {
            let task = self.sim.current_task();
            let deadline = self.sim.now().saturating_add(self.delay_ns);
            let timer = self.sim.schedule_resume(deadline, task);
            self.timer = Some((deadline, timer));
            return Poll::Pending;
        };

        // Other wakeups may poll this task at the deadline instant before the
        // timer itself fires; event ids order those.
        let now = self.sim.now();
        let fired = now > deadline
            || (now == deadline
                && self
                    .sim
                    .current_event()
                    .is_some_and(|current| current >= timer));
        if fired {
            Poll::Ready(())
        } else {
            Poll::Pending
        }
    }
}

/// Why [`Runtime::run_until`] returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// The next event lies beyond the horizon.
    Horizon,
    /// The event budget ran out.
    EventLimit,
    /// Nothing left to run.
    Idle,
}

/// Owns the task table and drives the event loop.
pub struct Runtime {
    sim: Sim,
    tasks: HashMap<TaskId, LocalTask>,
    events_processed: u64,
}

impl Runtime {
    pub fn new() -> Self {
        Self {
            sim: Sim {
                kernel: Rc::new(RefCell::new(Kernel {
                    clock: SimClock::new(),
                    events: EventQueue::new(),
                    current_task: None,
                    current_event: None,
                    next_task: 0,
                    spawned: Vec::new(),
                })),
            },
            tasks: HashMap::new(),
            events_processed: 0,
        }
    }

    /// Returns a handle for spawning tasks and reading the clock.
    pub fn handle(&self) -> Sim {
        self.sim.clone()
    }

    pub fn now(&self) -> u64 {
        self.sim.now()
    }

    /// Number of events processed so far, across all `run_until` calls.
    pub fn events_processed(&self) -> u64 {
        self.events_processed
    }

    /// Number of tasks that have not finished.
    pub fn live_tasks(&self) -> usize {
        self.tasks.len() + self.sim.kernel.borrow().spawned.len()
    }

    /// Processes every event with a timestamp at or before `horizon_ns`.
    ///
    /// Unless the event budget runs out first, the clock is left at
    /// `horizon_ns` (or where it already was, if later). The run can be
    /// resumed with a later horizon.
    pub fn run_until(&mut self, horizon_ns: u64, max_events: u64) -> StopReason {
        self.adopt_spawned();

        let stop = loop {
            if self.events_processed >= max_events {
                break StopReason::EventLimit;
            }

            let event = {
                let mut kernel = self.sim.kernel.borrow_mut();
                match kernel.events.next_time() {
                    None => break StopReason::Idle,
                    Some(time_ns) if time_ns > horizon_ns => break StopReason::Horizon,
                    Some(_) => {}
                }
                let Some(event) = kernel.events.pop() else {
                    break StopReason::Idle;
                };
                kernel.clock.advance_to(event.time_ns);
                kernel.current_event = Some(event.id);
                event
            };

            self.events_processed += 1;
            match event.kind {
                EventKind::Resume(task) => self.poll_task(task),
            }
        };

        if stop != StopReason::EventLimit {
            let mut kernel = self.sim.kernel.borrow_mut();
            if kernel.clock.now() < horizon_ns {
                kernel.clock.advance_to(horizon_ns);
            }
        }
        stop
    }

    fn poll_task(&mut self, task: TaskId) {
        // Wakeups can outlive the task they were meant for.
        let Some(mut future) = self.tasks.remove(&task) else {
            return;
        };

        self.sim.kernel.borrow_mut().current_task = Some(task);
        let mut cx = Context::from_waker(Waker::noop());
        let poll = future.as_mut().poll(&mut cx);
        self.sim.kernel.borrow_mut().current_task = None;

        if poll.is_pending() {
            self.tasks.insert(task, future);
        }
        self.adopt_spawned();
    }

    fn adopt_spawned(&mut self) {
        let spawned = std::mem::take(&mut self.sim.kernel.borrow_mut().spawned);
        self.tasks.extend(spawned);
    }
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Runtime {
    fn drop(&mut self) {
        // Tasks hold `Sim` clones; leaving them inside the kernel would leak it.
        self.adopt_spawned();
    }
}
