use std::cell::RefCell;
use std::collections::{HashSet, VecDeque};
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll};

use crate::runtime::{Sim, TaskId};

type Ticket = u64;

#[derive(Debug)]
struct ResourceState {
    capacity: usize,
    holders: usize,
    peak_holders: usize,
    waiting: VecDeque<(Ticket, TaskId)>,
    /// Handed a slot but not yet resumed.
    granted: HashSet<Ticket>,
    next_ticket: Ticket,
}

impl ResourceState {
    fn take_slot(&mut self) {
        self.holders += 1;
        self.peak_holders = self.peak_holders.max(self.holders);
    }
}

/// A capacity-bounded resource with a FIFO wait queue.
///
/// Holders are represented by [`ResourceGuard`]s; dropping one frees the slot
/// and hands it to the oldest waiter.
#[derive(Clone)]
pub struct Resource {
    state: Rc<RefCell<ResourceState>>,
    sim: Sim,
}

impl fmt::Debug for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.borrow();
        f.debug_struct("Resource")
            .field("capacity", &state.capacity)
            .field("holders", &state.holders)
            .field("waiting", &state.waiting.len())
            .finish()
    }
}

impl Resource {
    /// Creates a resource. A zero capacity is raised to one.
    pub fn new(sim: &Sim, capacity: usize) -> Self {
        debug_assert!(capacity > 0, "resource capacity must be positive");
        Self {
            state: Rc::new(RefCell::new(ResourceState {
                capacity: capacity.max(1),
                holders: 0,
                peak_holders: 0,
                waiting: VecDeque::new(),
                granted: HashSet::new(),
                next_ticket: 0,
            })),
            sim: sim.clone(),
        }
    }

    /// Requests one slot. Completes immediately when a slot is free and
    /// nobody is queued ahead.
    pub fn request(&self) -> Request {
        Request {
            resource: self.clone(),
            state: RequestState::Idle,
        }
    }

    pub fn capacity(&self) -> usize {
        self.state.borrow().capacity
    }

    /// Slots currently held, including grants not yet observed by their task.
    pub fn holders(&self) -> usize {
        self.state.borrow().holders
    }

    /// Highest number of simultaneous holders seen so far.
    pub fn peak_holders(&self) -> usize {
        self.state.borrow().peak_holders
    }

    pub fn queue_len(&self) -> usize {
        self.state.borrow().waiting.len()
    }

    fn release(&self) {
        let mut state = self.state.borrow_mut();
        debug_assert!(state.holders > 0, "released a resource nobody holds");
        state.holders = state.holders.saturating_sub(1);
        while state.holders < state.capacity {
            let Some((ticket, task)) = state.waiting.pop_front() else {
                break;
            };
            state.take_slot();
            state.granted.insert(ticket);
            self.sim.wake(task);
        }
    }
}

#[derive(Debug)]
enum RequestState {
    Idle,
    Queued(Ticket),
    Done,
}

/// Future returned by [`Resource::request`].
///
/// Dropping it while queued leaves the queue; dropping it after a slot was
/// handed over but before it was observed releases that slot.
#[derive(Debug)]
#[must_use = "futures do nothing unless awaited"]
pub struct Request {
    resource: Resource,
    state: RequestState,
}

impl Request {
    fn granted(&mut self) -> ResourceGuard {
        self.state = RequestState::Done;
        ResourceGuard {
            resource: self.resource.clone(),
        }
    }
}

impl Future for Request {
    type Output = ResourceGuard;

    fn poll(mut self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<ResourceGuard> {
        let this = &mut *self;
        match this.state {
            RequestState::Idle => {
                let mut state = this.resource.state.borrow_mut();
                if state.holders < state.capacity && state.waiting.is_empty() {
                    state.take_slot();
                    drop(state);
                    return Poll::Ready(this.granted());
                }
                let ticket = state.next_ticket;
                state.next_ticket += 1;
                state
                    .waiting
                    .push_back((ticket, this.resource.sim.current_task()));
                this.state = RequestState::Queued(ticket);
                Poll::Pending
            }
            RequestState::Queued(ticket) => {
                if this.resource.state.borrow_mut().granted.remove(&ticket) {
                    Poll::Ready(this.granted())
                } else {
                    Poll::Pending
                }
            }
            RequestState::Done => panic!("resource request polled after completion"),
        }
    }
}

impl Drop for Request {
    fn drop(&mut self) {
        let RequestState::Queued(ticket) = self.state else {
            return;
        };
        let mut state = self.resource.state.borrow_mut();
        if state.granted.remove(&ticket) {
            drop(state);
            self.resource.release();
        } else {
            state.waiting.retain(|(queued, _)| *queued != ticket);
        }
    }
}

/// A held slot. Dropping it releases the slot.
#[derive(Debug)]
#[must_use = "dropping the guard releases the resource immediately"]
pub struct ResourceGuard {
    resource: Resource,
}

impl Drop for ResourceGuard {
    fn drop(&mut self) {
        self.resource.release();
    }
}
