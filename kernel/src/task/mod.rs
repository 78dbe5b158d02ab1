//! Thread & Synchronization Kernel (`spec.md` §4.3): the round-robin
//! scheduler, thread table, locks, conditions, and sleep alarms.

pub mod alarm;
pub mod context;
pub mod scheduler;
pub mod sync;
pub mod thread;

pub use alarm::Alarm;
pub use scheduler::{current_tid, exit, join, spawn, yield_now};
pub use sync::{Condition, Lock};
pub use thread::{EntryFn, Thread, ThreadState, Tid};

/// Boot-time setup, run once after the VMM's main space is active.
pub fn init() {
    scheduler::init();
}
