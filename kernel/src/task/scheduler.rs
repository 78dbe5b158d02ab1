//! Round-robin thread scheduler (`spec.md` §4.3).
//!
//! All ready-list/thread-table surgery runs under
//! [`crate::arch::without_interrupts`], generalizing
//! `ryanbreen-breenix/kernel/src/task/scheduler.rs`'s
//! `x86_64::instructions::interrupts::without_interrupts` critical section
//! to this crate's RISC-V equivalent. The thread table is allocated once at
//! [`init`] and never resized, so a `Tid`'s slot address is stable for the
//! life of the kernel — `Lock`'s owner-list and `join`'s blocking wait both
//! rely on that to hold a raw pointer across a temporarily-dropped lock.

use alloc::collections::VecDeque;
use alloc::vec::Vec;
use core::sync::atomic::{AtomicUsize, Ordering};

use spin::Mutex;

use crate::arch::without_interrupts;
use crate::config::{NTHR, STACK_SIZE};
use crate::error::{KError, KResult};

use super::thread::{EntryFn, Thread, ThreadState, Tid};

static THREADS: Mutex<Vec<Thread>> = Mutex::new(Vec::new());
static READY_QUEUE: Mutex<VecDeque<Tid>> = Mutex::new(VecDeque::new());
static CURRENT: AtomicUsize = AtomicUsize::new(0);

fn idle_tid() -> Tid {
    NTHR - 1
}

/// Boot-time setup: slot 0 becomes the running "main" thread, the last slot
/// the idle thread, everything between starts empty.
pub fn init() {
    let mut threads: Vec<Thread> = (0..NTHR).map(Thread::uninitialized).collect();
    threads[0].state = ThreadState::Running;
    threads[0].name = alloc::string::String::from("main");
    threads[idle_tid()].state = ThreadState::Ready;
    threads[idle_tid()].name = alloc::string::String::from("idle");
    *THREADS.lock() = threads;
    READY_QUEUE.lock().clear();
    CURRENT.store(0, Ordering::SeqCst);
}

/// Run `f` with the thread table locked and interrupts disabled.
pub fn with_scheduler<R>(f: impl FnOnce(&mut Vec<Thread>) -> R) -> R {
    without_interrupts(|| f(&mut THREADS.lock()))
}

pub fn current_tid() -> Tid {
    CURRENT.load(Ordering::SeqCst)
}

/// Allocate a thread-table slot, give it a stack, and make it ready.
pub fn spawn(name: &str, entry: EntryFn, arg: usize) -> KResult<Tid> {
    let parent = current_tid();
    let idle = idle_tid();
    with_scheduler(|threads| {
        let slot = threads
            .iter()
            .position(|t| t.id != idle && t.state == ThreadState::Uninitialized)
            .ok_or(KError::TooManyThreads)?;
        threads[slot].spawn_into(name, Some(parent), STACK_SIZE, thread_trampoline_addr());
        threads[slot].entry = Some(entry);
        threads[slot].arg = arg;
        Ok(slot)
    })
    .map(|slot| {
        READY_QUEUE.lock().push_back(slot);
        slot
    })
}

#[cfg(target_arch = "riscv64")]
fn thread_trampoline_addr() -> u64 {
    thread_trampoline as u64
}

#[cfg(not(target_arch = "riscv64"))]
fn thread_trampoline_addr() -> u64 {
    0
}

/// The real entry dispatch: lands here off the asm context-switch return,
/// reads this thread's `entry`/`arg` out of its table slot, and tail-calls
/// it. Register-level argument plumbing (which register carries `tid`) is
/// boot/trap glue, an external collaborator; this function is only ever
/// reached on real hardware.
#[cfg(target_arch = "riscv64")]
extern "C" fn thread_trampoline(tid: usize) -> ! {
    let (entry, arg) = with_scheduler(|threads| (threads[tid].entry, threads[tid].arg));
    if let Some(entry) = entry {
        entry(arg);
    }
    exit();
    unreachable!("exit() does not return");
}

/// Pick the next ready thread (or idle) and switch to it. Callers that are
/// blocking or exiting flip the current thread's state away from `Running`
/// before calling this, so it is not re-enqueued.
fn schedule() {
    without_interrupts(|| {
        let next = READY_QUEUE.lock().pop_front().unwrap_or_else(idle_tid);
        let mut threads = THREADS.lock();
        let prev = CURRENT.load(Ordering::SeqCst);
        let requeue_prev = threads[prev].state == ThreadState::Running;
        if requeue_prev {
            threads[prev].state = ThreadState::Ready;
        } else if threads[prev].state == ThreadState::Exited {
            // Release the stack as soon as we switch off it, independent of
            // whether or when a parent calls `join`. The table slot itself
            // stays put (state `Exited`) until `join` reclaims it.
            threads[prev].free_stack();
        }
        threads[next].state = ThreadState::Running;
        CURRENT.store(next, Ordering::SeqCst);
        drop(threads);
        if requeue_prev {
            READY_QUEUE.lock().push_back(prev);
        }
        // On real hardware this saves `prev`'s callee-saved registers and
        // loads `next`'s; on the host test build there is only ever one
        // real call stack, so the switch is bookkeeping-only.
    });
}

/// Suspend the current thread and rotate to the next ready one.
pub fn yield_now() {
    schedule();
}

/// Suspend the calling thread on `wait_list` until woken by [`wake_all`].
pub fn block_on(wait_list: &mut VecDeque<Tid>) {
    without_interrupts(|| {
        let me = current_tid();
        THREADS.lock()[me].state = ThreadState::Waiting;
        wait_list.push_back(me);
    });
    schedule();
}

/// Move every thread in `woken` to the ready list, preserving order.
pub fn wake_all(woken: impl Iterator<Item = Tid>) {
    without_interrupts(|| {
        let mut threads = THREADS.lock();
        let mut ready = READY_QUEUE.lock();
        for tid in woken {
            threads[tid].state = ThreadState::Ready;
            ready.push_back(tid);
        }
    });
}

pub(super) fn register_owned_lock(tid: Tid, lock: *mut super::sync::Lock) {
    without_interrupts(|| THREADS.lock()[tid].owned_locks.push(lock));
}

pub(super) fn unregister_owned_lock(tid: Tid, lock: *mut super::sync::Lock) {
    without_interrupts(|| THREADS.lock()[tid].owned_locks.retain(|&l| l != lock));
}

/// Terminate the calling thread: release every lock it still holds, notify
/// its parent, and hand the CPU to the next ready thread (which frees this
/// thread's stack once it runs).
pub fn exit() -> ! {
    let me = current_tid();
    let parent = without_interrupts(|| {
        let mut threads = THREADS.lock();
        let locks: Vec<*mut super::sync::Lock> = threads[me].owned_locks.drain(..).collect();
        drop(threads);
        for lock in locks {
            unsafe { (*lock).force_release() };
        }
        let mut threads = THREADS.lock();
        threads[me].state = ThreadState::Exited;
        threads[me].parent
    });
    if let Some(parent) = parent {
        let cond_ptr = without_interrupts(|| &mut THREADS.lock()[parent].child_exit as *mut super::sync::Condition);
        unsafe { (*cond_ptr).broadcast() };
    }
    schedule();
    unreachable!("an exited thread is never rescheduled");
}

fn reparent_children(threads: &mut [Thread], exited: Tid, grandparent: Tid) {
    for t in threads.iter_mut() {
        if t.parent == Some(exited) {
            t.parent = Some(grandparent);
        }
    }
}

/// Block until the identified child exits (or, for `tid == 0`, any child),
/// then reap its slot.
pub fn join(tid: Tid) -> KResult<Tid> {
    let me = current_tid();
    loop {
        let outcome = with_scheduler(|threads| -> Option<KResult<Tid>> {
            if tid == 0 {
                if let Some(exited) = threads.iter().position(|t| t.parent == Some(me) && t.state == ThreadState::Exited) {
                    reparent_children(threads, exited, me);
                    threads[exited].reclaim_stack();
                    return Some(Ok(exited));
                }
                if !threads.iter().any(|t| t.parent == Some(me)) {
                    return Some(Err(KError::NoChild));
                }
                None
            } else {
                if tid >= threads.len() || threads[tid].parent != Some(me) {
                    return Some(Err(KError::NoChild));
                }
                if threads[tid].state == ThreadState::Exited {
                    reparent_children(threads, tid, me);
                    threads[tid].reclaim_stack();
                    return Some(Ok(tid));
                }
                None
            }
        });
        match outcome {
            Some(result) => return result,
            None => {
                let cond_ptr = with_scheduler(|threads| &mut threads[me].child_exit as *mut super::sync::Condition);
                unsafe { (*cond_ptr).wait() };
            }
        }
    }
}

#[cfg(test)]
pub fn test_reset(ready_count: usize) {
    let mut threads: Vec<Thread> = (0..NTHR).map(Thread::uninitialized).collect();
    for t in threads.iter_mut().take(ready_count) {
        t.state = ThreadState::Ready;
    }
    threads[0].state = ThreadState::Running;
    *THREADS.lock() = threads;
    let mut ready = READY_QUEUE.lock();
    ready.clear();
    ready.extend(1..ready_count);
    CURRENT.store(0, Ordering::SeqCst);
}

#[cfg(test)]
pub fn test_set_current(tid: Tid) {
    CURRENT.store(tid, Ordering::SeqCst);
}

#[cfg(test)]
pub fn test_state(tid: Tid) -> ThreadState {
    THREADS.lock()[tid].state
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_robin_visits_are_balanced() {
        const K: usize = 4;
        const ROUNDS: usize = 21;
        test_reset(K);

        let mut visits = [0usize; K];
        visits[0] += 1;
        for _ in 0..ROUNDS {
            yield_now();
            visits[current_tid()] += 1;
        }

        let total: usize = visits.iter().sum();
        assert_eq!(total, ROUNDS + 1);
        let lo = total / K;
        let hi = (total + K - 1) / K;
        for v in visits {
            assert!(v == lo || v == hi, "unbalanced visit count {v}, expected {lo} or {hi}");
        }
    }

    #[test]
    fn block_on_and_wake_all_preserve_fifo_order() {
        test_reset(1);
        let mut wait_list: VecDeque<Tid> = VecDeque::new();

        test_set_current(1);
        block_on(&mut wait_list);
        test_set_current(2);
        block_on(&mut wait_list);

        assert_eq!(wait_list, VecDeque::from(alloc::vec![1, 2]));
        assert_eq!(test_state(1), ThreadState::Waiting);
        assert_eq!(test_state(2), ThreadState::Waiting);

        wake_all(wait_list.drain(..));
        assert_eq!(test_state(1), ThreadState::Ready);
        assert_eq!(test_state(2), ThreadState::Ready);
    }

    #[test]
    fn join_reaps_exited_child_and_reparents_grandchildren() {
        test_reset(1);
        with_scheduler(|threads| {
            threads[1].state = ThreadState::Exited;
            threads[1].parent = Some(0);
            threads[2].state = ThreadState::Ready;
            threads[2].parent = Some(1);
        });
        let reaped = join(1).unwrap();
        assert_eq!(reaped, 1);
        assert_eq!(test_state(1), ThreadState::Uninitialized);
        with_scheduler(|threads| assert_eq!(threads[2].parent, Some(0)));
    }

    #[test]
    fn join_with_no_children_is_an_error() {
        test_reset(1);
        assert_eq!(join(0), Err(KError::NoChild));
    }

    #[test]
    fn schedule_frees_an_exited_threads_stack_without_joining() {
        test_reset(1);
        with_scheduler(|threads| {
            threads[1].spawn_into("doomed", Some(0), 64, 0);
            assert!(threads[1].has_stack());
            threads[1].state = ThreadState::Exited;
        });
        test_set_current(1);

        yield_now();

        with_scheduler(|threads| assert!(!threads[1].has_stack()));
        assert_eq!(test_state(1), ThreadState::Exited);
    }
}
