//! Thread control block (`spec.md` §3, "Thread").

use alloc::string::String;
use alloc::vec::Vec;

use crate::process::ProcessId;

use super::context::CpuContext;
use super::sync::{Condition, Lock};

/// Index into the fixed-size thread table. Slot 0 is the boot thread; the
/// last slot is the idle thread.
pub type Tid = usize;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThreadState {
    Uninitialized,
    Ready,
    Running,
    Waiting,
    Exited,
}

/// Entry point a spawned thread starts executing at.
pub type EntryFn = fn(usize);

pub struct Thread {
    pub id: Tid,
    pub name: String,
    pub state: ThreadState,
    pub context: CpuContext,
    stack: Option<Vec<u8>>,
    pub parent: Option<Tid>,
    /// Name of the condition this thread is currently waiting on, purely
    /// for diagnostics — wait-list membership itself is authoritative.
    pub waiting_on: Option<&'static str>,
    pub child_exit: Condition,
    /// Intrusive owner-list of every lock this thread currently holds,
    /// force-released on exit. Each pointer is valid for at least as long
    /// as this thread holds the lock (`spec.md` §9: keep the intrusive
    /// model for thread-owned lists).
    pub(super) owned_locks: Vec<*mut Lock>,
    pub process: Option<ProcessId>,
    pub(super) entry: Option<EntryFn>,
    pub(super) arg: usize,
}

unsafe impl Send for Thread {}

impl Thread {
    pub fn uninitialized(id: Tid) -> Self {
        Self {
            id,
            name: String::new(),
            state: ThreadState::Uninitialized,
            context: CpuContext::zeroed(),
            stack: None,
            parent: None,
            waiting_on: None,
            child_exit: Condition::new("child_exit"),
            owned_locks: Vec::new(),
            process: None,
            entry: None,
            arg: 0,
        }
    }

    /// Materialize this slot as a freshly spawned kernel thread: allocate
    /// its stack and point its saved context at `trampoline`, which is
    /// expected to load `entry`/`arg` from the slot and tail-call `entry`.
    pub fn spawn_into(
        &mut self,
        name: &str,
        parent: Option<Tid>,
        stack_size: usize,
        trampoline: u64,
    ) -> &mut Self {
        let mut stack = alloc::vec![0u8; stack_size];
        let stack_top = stack.as_mut_ptr() as u64 + stack_size as u64;
        self.name = String::from(name);
        self.state = ThreadState::Ready;
        self.context = CpuContext::new_entry(trampoline, stack_top);
        self.stack = Some(stack);
        self.parent = parent;
        self.waiting_on = None;
        self.child_exit = Condition::new("child_exit");
        self.owned_locks.clear();
        self.entry = None;
        self.arg = 0;
        self
    }

    /// Drop the stack buffer. Safe the moment the scheduler switches off an
    /// `Exited` thread, regardless of whether its parent has joined it yet —
    /// the slot stays `Exited` until `reclaim_stack` runs, so `join` can
    /// still find it.
    pub(super) fn free_stack(&mut self) {
        self.stack = None;
    }

    /// Full slot reclaim: release the stack (if not already released) and
    /// mark the slot `Uninitialized` so `spawn` can reuse it. Called only by
    /// `join`, which is the sole place that may observe `Exited` and retire
    /// it — retiring the slot any earlier would make the parent's `join`
    /// unable to find its child.
    pub fn reclaim_stack(&mut self) {
        self.free_stack();
        self.state = ThreadState::Uninitialized;
    }

    #[cfg(test)]
    pub(super) fn has_stack(&self) -> bool {
        self.stack.is_some()
    }
}
