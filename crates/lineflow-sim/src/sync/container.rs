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
struct Pending {
    ticket: Ticket,
    task: TaskId,
    amount: u64,
}

#[derive(Debug)]
struct ContainerState {
    level: u64,
    waiting: VecDeque<Pending>,
    /// Withdrawals already deducted but not yet resumed.
    satisfied: HashSet<Ticket>,
    next_ticket: Ticket,
}

/// A stock of interchangeable units.
///
/// Withdrawals are served strictly in arrival order: a small withdrawal never
/// overtakes a larger one queued before it.
#[derive(Clone)]
pub struct Container {
    state: Rc<RefCell<ContainerState>>,
    sim: Sim,
}

impl fmt::Debug for Container {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.borrow();
        f.debug_struct("Container")
            .field("level", &state.level)
            .field("waiting", &state.waiting.len())
            .finish()
    }
}

impl Container {
    pub fn new(sim: &Sim, initial_level: u64) -> Self {
        Self {
            state: Rc::new(RefCell::new(ContainerState {
                level: initial_level,
                waiting: VecDeque::new(),
                satisfied: HashSet::new(),
                next_ticket: 0,
            })),
            sim: sim.clone(),
        }
    }

    pub fn level(&self) -> u64 {
        self.state.borrow().level
    }

    /// Withdrawals waiting for stock.
    pub fn waiting(&self) -> usize {
        self.state.borrow().waiting.len()
    }

    /// Adds units and serves whatever waiters the new level covers.
    pub fn deposit(&self, amount: u64) {
        let mut state = self.state.borrow_mut();
        state.level = state.level.saturating_add(amount);
        self.serve(&mut state);
    }

    /// Removes `amount` units, waiting until they are available.
    pub fn withdraw(&self, amount: u64) -> Withdraw {
        Withdraw {
            container: self.clone(),
            amount,
            state: WithdrawState::Idle,
        }
    }

    fn serve(&self, state: &mut ContainerState) {
        while let Some(front) = state.waiting.front() {
            if state.level < front.amount {
                break;
            }
            let amount = front.amount;
            if let Some(pending) = state.waiting.pop_front() {
                state.level -= amount;
                state.satisfied.insert(pending.ticket);
                self.sim.wake(pending.task);
            }
        }
    }
}

#[derive(Debug)]
enum WithdrawState {
    Idle,
    Queued(Ticket),
    Done,
}

/// Future returned by [`Container::withdraw`].
///
/// Dropping it while queued leaves the queue; dropping it after the units were
/// set aside puts them back.
#[derive(Debug)]
#[must_use = "futures do nothing unless awaited"]
pub struct Withdraw {
    container: Container,
    amount: u64,
    state: WithdrawState,
}

impl Future for Withdraw {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<()> {
        let this = &mut *self;
        match this.state {
            WithdrawState::Idle => {
                let mut state = this.container.state.borrow_mut();
                if state.waiting.is_empty() && state.level >= this.amount {
                    state.level -= this.amount;
                    this.state = WithdrawState::Done;
                    return Poll::Ready(());
                }
                let ticket = state.next_ticket;
                state.next_ticket += 1;
                state.waiting.push_back(Pending {
                    ticket,
                    task: this.container.sim.current_task(),
                    amount: this.amount,
                });
                this.state = WithdrawState::Queued(ticket);
                Poll::Pending
            }
            WithdrawState::Queued(ticket) => {
                if this.container.state.borrow_mut().satisfied.remove(&ticket) {
                    this.state = WithdrawState::Done;
                    Poll::Ready(())
                } else {
                    Poll::Pending
                }
            }
            WithdrawState::Done => panic!("withdrawal polled after completion"),
        }
    }
}

impl Drop for Withdraw {
    fn drop(&mut self) {
        let WithdrawState::Queued(ticket) = self.state else {
            return;
        };
        let mut state = self.container.state.borrow_mut();
        if state.satisfied.remove(&ticket) {
            state.level = state.level.saturating_add(self.amount);
        } else {
            state.waiting.retain(|pending| pending.ticket != ticket);
        }
        // Either change can unblock the head of the queue.
        self.container.serve(&mut state);
    }
}
