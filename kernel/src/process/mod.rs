//! Process table: a small, fixed-capacity registry the syscall dispatcher
//! uses to look up the calling process's address space and fd table.
//!
//! Grounded on `ryanbreen-breenix/kernel/src/process/mod.rs`'s
//! `ProcessManager` global behind a `spin::Mutex`, accessed only through a
//! `with_process_manager`-style critical section.

pub mod process;

pub use process::{FdTable, Process, ProcessId, ProcessState};

use alloc::vec::Vec;
use spin::Mutex;

use crate::arch::without_interrupts;
use crate::config::NPROC;
use crate::error::{KError, KResult};
use crate::memory::vmm::MTag;
use crate::task::{scheduler, Tid};

static PROCESSES: Mutex<Vec<Option<Process>>> = Mutex::new(Vec::new());

pub fn init() {
    *PROCESSES.lock() = (0..NPROC).map(|_| None).collect();
}

/// Run `f` with the process table locked and interrupts disabled.
pub fn with_process_manager<R>(f: impl FnOnce(&mut Vec<Option<Process>>) -> R) -> R {
    without_interrupts(|| f(&mut PROCESSES.lock()))
}

/// Register a freshly created process (the result of `fork`, or the first
/// boot process), and stamp its main thread's back-pointer.
pub fn create(mspace: MTag, main_thread: Tid, parent: Option<ProcessId>) -> KResult<ProcessId> {
    let slot = with_process_manager(|procs| {
        let slot = procs.iter().position(Option::is_none).ok_or(KError::TooManyProcesses)?;
        procs[slot] = Some(Process::new(slot, mspace, main_thread, parent));
        Ok::<_, KError>(slot)
    })?;
    scheduler::with_scheduler(|threads| threads[main_thread].process = Some(slot));
    Ok(slot)
}

/// The process owning the currently running thread.
///
/// Panics if the running thread has no process — every thread reachable
/// from user-mode syscall dispatch belongs to one by construction.
pub fn current() -> ProcessId {
    scheduler::with_scheduler(|threads| threads[scheduler::current_tid()].process)
        .expect("running thread has no owning process")
}

pub fn exit(pid: ProcessId, code: i32) {
    with_process_manager(|procs| {
        if let Some(p) = procs[pid].as_mut() {
            p.state = ProcessState::Exited(code);
        }
    });
}

pub fn reap(pid: ProcessId) -> Option<Process> {
    with_process_manager(|procs| procs[pid].take())
}

/// Free the process-table slot whose main thread is `tid`, if any. Called
/// once `scheduler::join` has reaped that thread's table slot, so a
/// process's `mspace`/fd resources don't outlive its thread across repeated
/// fork/exit/wait cycles.
pub fn reap_exited_thread(tid: Tid) -> Option<Process> {
    let pid = with_process_manager(|procs| {
        procs.iter().flatten().find(|p| p.main_thread == tid).map(|p| p.id)
    })?;
    reap(pid)
}

/// Run `f` against the calling process's fd table.
pub fn with_current_fds<R>(f: impl FnOnce(&mut FdTable) -> R) -> R {
    let pid = current();
    with_process_manager(|procs| f(&mut procs[pid].as_mut().expect("current process missing from table").fds))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reap_exited_thread_frees_the_slot_owning_that_thread() {
        init();
        scheduler::test_reset(1);
        let pid = create(0, 1, Some(0)).unwrap();

        assert!(reap_exited_thread(2).is_none());
        assert!(with_process_manager(|procs| procs[pid].is_some()));

        let reaped = reap_exited_thread(1).unwrap();
        assert_eq!(reaped.id, pid);
        assert!(with_process_manager(|procs| procs[pid].is_none()));
    }
}
