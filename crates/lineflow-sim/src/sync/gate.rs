use std::cell::RefCell;
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll};

use crate::runtime::{Sim, TaskId};

#[derive(Debug)]
struct GateState {
    open: bool,
    waiters: Vec<TaskId>,
}

/// A level-triggered signal: tasks wait while it is closed and all of them
/// resume, in the order they started waiting, when it opens.
#[derive(Debug, Clone)]
pub struct Gate {
    state: Rc<RefCell<GateState>>,
    sim: Sim,
}

impl Gate {
    pub fn new(sim: &Sim, open: bool) -> Self {
        Self {
            state: Rc::new(RefCell::new(GateState {
                open,
                waiters: Vec::new(),
            })),
            sim: sim.clone(),
        }
    }

    pub fn is_open(&self) -> bool {
        self.state.borrow().open
    }

    pub fn close(&self) {
        self.state.borrow_mut().open = false;
    }

    pub fn open(&self) {
        let waiters = {
            let mut state = self.state.borrow_mut();
            state.open = true;
            std::mem::take(&mut state.waiters)
        };
        for task in waiters {
            self.sim.wake(task);
        }
    }

    /// Completes once the gate is open; immediately if it already is.
    pub fn wait_open(&self) -> WaitOpen {
        WaitOpen {
            gate: self.clone(),
            waiter: None,
        }
    }
}

/// Future returned by [`Gate::wait_open`].
#[derive(Debug)]
#[must_use = "futures do nothing unless awaited"]
pub struct WaitOpen {
    gate: Gate,
    waiter: Option<TaskId>,
}

impl Future for WaitOpen {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<()> {
        let this = &mut *self;
        let mut state = this.gate.state.borrow_mut();
        if state.open {
            return Poll::Ready(());
        }
        // Re-register if the gate opened and closed again before this poll.
        let task = this.gate.sim.current_task();
        if !state.waiters.contains(&task) {
            state.waiters.push(task);
        }
        this.waiter = Some(task);
        Poll::Pending
    }
}

impl Drop for WaitOpen {
    fn drop(&mut self) {
        if let Some(task) = self.waiter {
            self.gate
                .state
                .borrow_mut()
                .waiters
                .retain(|waiter| *waiter != task);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::Runtime;
    use crate::sync::testing::{entries, log};

    #[test]
    fn open_gate_passes_through() {
        let mut runtime = Runtime::new();
        let sim = runtime.handle();
        let gate = Gate::new(&sim, true);
        let seen = log();

        let (s, g, l) = (sim.clone(), gate.clone(), Rc::clone(&seen));
        sim.spawn(async move {
            s.after(2).await;
            g.wait_open().await;
            l.borrow_mut().push((s.now(), "through".to_string()));
        });

        runtime.run_until(10, u64::MAX);
        assert_eq!(entries(&seen), vec![(2, "through".to_string())]);
    }

    #[test]
    fn opening_releases_every_waiter_in_order() {
        let mut runtime = Runtime::new();
        let sim = runtime.handle();
        let gate = Gate::new(&sim, false);
        let seen = log();

        for (name, start) in [("first", 1), ("second", 2)] {
            let (s, g, l) = (sim.clone(), gate.clone(), Rc::clone(&seen));
            sim.spawn(async move {
                s.after(start).await;
                g.wait_open().await;
                l.borrow_mut().push((s.now(), name.to_string()));
            });
        }
        let (s, g) = (sim.clone(), gate.clone());
        sim.spawn(async move {
            s.after(5).await;
            g.open();
        });

        runtime.run_until(3, u64::MAX);
        assert!(entries(&seen).is_empty());

        runtime.run_until(10, u64::MAX);
        assert_eq!(
            entries(&seen),
            vec![(5, "first".to_string()), (5, "second".to_string())]
        );
        assert!(gate.is_open());
    }

    #[test]
    fn reopened_gate_blocks_again() {
        let mut runtime = Runtime::new();
        let sim = runtime.handle();
        let gate = Gate::new(&sim, true);
        gate.close();
        let seen = log();

        let (s, g, l) = (sim.clone(), gate.clone(), Rc::clone(&seen));
        sim.spawn(async move {
            g.wait_open().await;
            l.borrow_mut().push((s.now(), "through".to_string()));
        });
        let (s, g) = (sim.clone(), gate.clone());
        sim.spawn(async move {
            s.after(4).await;
            g.open();
        });

        runtime.run_until(10, u64::MAX);
        assert_eq!(entries(&seen), vec![(4, "through".to_string())]);
    }
}
