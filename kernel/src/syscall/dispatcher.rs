//! Syscall dispatch (`spec.md` §6): routes a syscall number and up to three
//! trap-frame arguments to its handler, converting the `KResult` back to
//! the negative-errno convention the trap-return path expects.
//!
//! Grounded on `ryanbreen-breenix/kernel/src/syscall/dispatcher.rs`'s
//! `dispatch_syscall`, generalized from its 16-case Linux-flavored table to
//! `spec.md` §6's 16-entry table.

use super::numbers::SyscallNumber;
use super::{fd, process};
use crate::error::KResult;

fn to_raw<T: Into<i64>>(r: KResult<T>) -> i64 {
    match r {
        Ok(v) => v.into(),
        Err(e) => e.to_errno() as i64,
    }
}

/// Dispatch one syscall. `exit` diverges (it never returns to the caller);
/// every other entry returns a value or a negative errno.
pub fn dispatch(num: u64, a0: u64, a1: u64, a2: u64) -> i64 {
    let Some(syscall) = SyscallNumber::from_u64(num) else {
        log::warn!("unknown syscall number: {num}");
        return crate::error::KError::NotSupported.to_errno() as i64;
    };

    match syscall {
        SyscallNumber::Exit => process::sys_exit(a0 as i32),
        SyscallNumber::Exec => to_raw(process::sys_exec(a0, a1, a2)),
        SyscallNumber::Fork => to_raw(process::sys_fork().map(|tid| tid as i64)),
        SyscallNumber::Wait => to_raw(process::sys_wait(a0).map(|tid| tid as i64)),
        SyscallNumber::Print => to_raw(process::sys_print(a0)),
        SyscallNumber::Usleep => to_raw(process::sys_usleep(a0)),
        SyscallNumber::DevOpen => to_raw(fd::sys_devopen(a0 as i64, a1, a2)),
        SyscallNumber::FsOpen => to_raw(fd::sys_fsopen(a0 as i64, a1)),
        SyscallNumber::FsCreate => to_raw(fd::sys_fscreate(a0)),
        SyscallNumber::FsDelete => to_raw(fd::sys_fsdelete(a0)),
        SyscallNumber::Close => to_raw(fd::sys_close(a0)),
        SyscallNumber::Read => to_raw(fd::sys_read(a0, a1, a2)),
        SyscallNumber::Write => to_raw(fd::sys_write(a0, a1, a2)),
        SyscallNumber::Ioctl => to_raw(fd::sys_ioctl(a0, a1, a2)),
        SyscallNumber::Pipe => to_raw(fd::sys_pipe(a0, a1)),
        SyscallNumber::IoDup => to_raw(fd::sys_iodup(a0, a1 as i64)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_syscall_number_yields_notsupported_errno() {
        assert_eq!(dispatch(255, 0, 0, 0), crate::error::KError::NotSupported.to_errno() as i64);
    }
}
