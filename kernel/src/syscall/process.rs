//! Process-lifecycle syscalls (`spec.md` §6: `exit`, `exec`, `fork`, `wait`,
//! `usleep`). Grounded on
//! `ryanbreen-breenix/kernel/src/syscall/handlers.rs`'s `sys_fork`/
//! `sys_exec`/`sys_waitpid` shape, generalized onto this kernel's
//! `process`/`task` split instead of x86_64 process control blocks.

use crate::error::{KError, KResult};
use crate::memory::vmm;
use crate::process;
use crate::task::{scheduler, Alarm, Tid};

use super::userptr::copy_user_cstr;

/// There is no ELF loader in this tree (`spec.md` §1's Non-goal): a forked
/// child has nothing resident to run, so it exits immediately. A real boot
/// build's trap-return glue supplies a trampoline that resumes the child
/// in user mode instead of spawning this stub.
fn child_exits_immediately(_arg: usize) {
    scheduler::exit();
}

/// `exit`: terminate the calling process and its main thread.
pub fn sys_exit(code: i32) -> ! {
    process::exit(process::current(), code);
    scheduler::exit();
}

/// `fork`: clone the calling process's address space and spawn a new
/// thread/process pair for it. The parent sees the child's tid; per
/// `spec.md` §6, the child itself observes 0 (handled by the trap-return
/// glue that resumes it, not by this function, which only ever runs on the
/// parent's stack).
pub fn sys_fork() -> KResult<Tid> {
    let child_mspace = vmm::clone_active_mspace();
    let parent = process::current();
    let child_tid = scheduler::spawn("forked", child_exits_immediately, 0)?;
    process::create(child_mspace, child_tid, Some(parent))?;
    Ok(child_tid)
}

/// `exec`: tear down the calling process's user mappings. Per `spec.md`
/// §1's Non-goal, there is no ELF loader to map a new image back in —
/// `entry_point` names an already-resident entry an external loader placed
/// there, matching `spec.md` §6's `fd` argument being reinterpreted at this
/// layer as "where the next instruction comes from" rather than a real fd.
pub fn sys_exec(entry_point: u64, _argc: u64, _argv: u64) -> KResult<i64> {
    if entry_point == 0 {
        return Err(KError::Invalid);
    }
    vmm::reset_active_mspace();
    Ok(0)
}

/// `wait`: block until the named child (or, for `tid == 0`, any child)
/// exits, then free its process-table slot.
pub fn sys_wait(tid: u64) -> KResult<Tid> {
    let reaped = scheduler::join(tid as Tid)?;
    process::reap_exited_thread(reaped);
    Ok(reaped)
}

/// `usleep`: block the calling thread for `usec` ticks.
///
/// The kernel's tick granularity is implementation-defined (`spec.md` §4.3
/// only specifies tick-counted alarms, not a wall-clock unit), so `usec` is
/// taken directly as a tick count here.
pub fn sys_usleep(usec: u64) -> KResult<i64> {
    let mut alarm = Alarm::new("usleep");
    alarm.sleep(usec.max(1));
    Ok(0)
}

/// `print`: validate and copy a NUL-terminated string from user memory,
/// then log it. Console character I/O itself is an external collaborator
/// (`spec.md` §1); this lowers onto the kernel's own logging sink instead
/// of a UART driver.
pub fn sys_print(cstr: u64) -> KResult<i64> {
    let line = copy_user_cstr(cstr)?;
    log::info!("{line}");
    Ok(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wait_with_no_children_reports_no_child() {
        scheduler::test_reset(1);
        assert_eq!(sys_wait(0), Err(KError::NoChild));
    }
}
