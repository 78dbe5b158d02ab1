//! Process control block — `spec.md` §6's process/syscall surface, kept at
//! interface level per §1: enough to drive `fork`/`exec`/`wait`/fd
//! multiplexing against the TSK/VMM/IOF core, not a full process manager.
//!
//! Grounded on `ryanbreen-breenix/kernel/src/process/process.rs`'s
//! `Process`/`ProcessState` shape, generalized to this kernel's fd table
//! and address-space tag.

use crate::config::PROCESS_IOMAX;
use crate::io::IoHandle;
use crate::memory::vmm::MTag;
use crate::task::Tid;

pub type ProcessId = usize;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessState {
    Running,
    Exited(i32),
}

/// Per-process bounded file-descriptor table
/// (`ryanbreen-breenix/kernel/src/ipc/fd.rs`'s `FdTable`, generalized to
/// hold `IoHandle`s over the closed `IoObject` variant set instead of a
/// `FdKind` enum tied to stdio/pipe-only backing).
pub struct FdTable {
    slots: [Option<IoHandle>; PROCESS_IOMAX],
}

impl FdTable {
    pub const fn new() -> Self {
        const NONE: Option<IoHandle> = None;
        Self { slots: [NONE; PROCESS_IOMAX] }
    }

    /// Install `handle` at `hint` (or the first free slot if `hint` is
    /// negative or already taken).
    pub fn alloc(&mut self, hint: isize, handle: IoHandle) -> Option<usize> {
        if hint >= 0 {
            let idx = hint as usize;
            if idx < PROCESS_IOMAX && self.slots[idx].is_none() {
                self.slots[idx] = Some(handle);
                return Some(idx);
            }
        }
        let idx = self.slots.iter().position(Option::is_none)?;
        self.slots[idx] = Some(handle);
        Some(idx)
    }

    pub fn get(&self, fd: usize) -> Option<&IoHandle> {
        self.slots.get(fd).and_then(Option::as_ref)
    }

    pub fn get_mut(&mut self, fd: usize) -> Option<&mut IoHandle> {
        self.slots.get_mut(fd).and_then(Option::as_mut)
    }

    pub fn close(&mut self, fd: usize) -> Option<IoHandle> {
        self.slots.get_mut(fd).and_then(Option::take)
    }

    /// Duplicate `oldfd` into `newfd`, closing whatever was there.
    pub fn dup2(&mut self, oldfd: usize, newfd: usize) -> Option<()> {
        let handle = self.get(oldfd)?.clone();
        if newfd >= PROCESS_IOMAX {
            return None;
        }
        self.slots[newfd] = Some(handle);
        Some(())
    }
}

pub struct Process {
    pub id: ProcessId,
    pub state: ProcessState,
    pub mspace: MTag,
    pub main_thread: Tid,
    pub fds: FdTable,
    pub parent: Option<ProcessId>,
}

impl Process {
    pub fn new(id: ProcessId, mspace: MTag, main_thread: Tid, parent: Option<ProcessId>) -> Self {
        Self { id, state: ProcessState::Running, mspace, main_thread, fds: FdTable::new(), parent }
    }
}
