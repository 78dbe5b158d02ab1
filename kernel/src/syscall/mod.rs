//! Process & syscall interface (`spec.md` §6), kept at interface level per
//! `spec.md` §1: enough to drive `fork`/`exec`/`wait`/fd multiplexing
//! against the TSK/VMM/IOF/KT core, not a full ABI-compatible syscall
//! table. Grounded on `ryanbreen-breenix/kernel/src/syscall/`'s
//! dispatcher/handler split.

pub mod dispatcher;
pub mod fd;
pub mod numbers;
pub mod process;
pub mod userptr;

pub use dispatcher::dispatch;
pub use numbers::SyscallNumber;
