//! Blocking primitives for simulation tasks.
//!
//! All of them queue waiters strictly FIFO and hand over by scheduling a
//! resume at the current instant, never by running the waiter inline. Every
//! pending future cancels cleanly on drop, which is what makes [`race`] safe
//! to use on resource requests.

mod container;
mod gate;
mod race;
mod resource;

pub use container::{Container, Withdraw};
pub use gate::{Gate, WaitOpen};
pub use race::{Race, Winner, race};
pub use resource::{Request, Resource, ResourceGuard};
