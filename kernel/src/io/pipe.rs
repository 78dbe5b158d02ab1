//! Anonymous pipes (`spec.md` §4.4): a one-page ring buffer shared by a
//! read and a write endpoint, with independent per-endpoint close tracking.
//!
//! The wait list lives on a `Condition` embedded in the shared buffer, so a
//! waiter must release the buffer's lock before calling `wait` (it drops
//! back into the scheduler, not into this module) — the same
//! get-pointer-then-drop-the-guard idiom `task::scheduler::join` uses for
//! its own `child_exit` condition.

use alloc::boxed::Box;
use alloc::sync::Arc;

use spin::Mutex;

use crate::config::PAGE_SIZE;
use crate::error::{KError, KResult};
use crate::task::Condition;

use super::IoHandle;
use super::IoObject;

struct PipeShared {
    buf: Box<[u8; PAGE_SIZE]>,
    head: u16,
    tail: u16,
    reader_closed: bool,
    writer_closed: bool,
    not_empty: Condition,
    not_full: Condition,
}

impl PipeShared {
    fn occupied(&self) -> u16 {
        self.tail.wrapping_sub(self.head)
    }

    fn is_empty(&self) -> bool {
        self.head == self.tail
    }

    fn is_full(&self) -> bool {
        self.occupied() as usize == PAGE_SIZE
    }
}

pub struct PipeEndpoint {
    shared: Arc<Mutex<PipeShared>>,
}

/// Create a connected pipe. Returns `(write_handle, read_handle)`.
pub fn create_pipe() -> (IoHandle, IoHandle) {
    let shared = Arc::new(Mutex::new(PipeShared {
        buf: Box::new([0u8; PAGE_SIZE]),
        head: 0,
        tail: 0,
        reader_closed: false,
        writer_closed: false,
        not_empty: Condition::new("pipe_not_empty"),
        not_full: Condition::new("pipe_not_full"),
    }));
    let wio = IoHandle::new(IoObject::PipeWrite(PipeEndpoint { shared: shared.clone() }));
    let rio = IoHandle::new(IoObject::PipeRead(PipeEndpoint { shared }));
    (wio, rio)
}

impl PipeEndpoint {
    /// Read up to one page. Blocks while the buffer is empty and the writer
    /// is still open; returns 0 (EOF) once the writer has closed and the
    /// buffer has drained.
    pub fn read(&mut self, buf: &mut [u8]) -> KResult<usize> {
        let want = buf.len().min(PAGE_SIZE);
        loop {
            let mut shared = self.shared.lock();
            if !shared.is_empty() {
                let take = want.min(shared.occupied() as usize);
                for i in 0..take {
                    let idx = (shared.head.wrapping_add(i as u16) as usize) % PAGE_SIZE;
                    buf[i] = shared.buf[idx];
                }
                shared.head = shared.head.wrapping_add(take as u16);
                shared.not_full.broadcast();
                return Ok(take);
            }
            if shared.writer_closed {
                return Ok(0);
            }
            let cond_ptr = &mut shared.not_empty as *mut Condition;
            drop(shared);
            unsafe { (*cond_ptr).wait() };
        }
    }

    /// Write up to one page. Blocks while the buffer is full and the reader
    /// is still open; fails with `KError::Pipe` once the reader has closed.
    pub fn write(&mut self, buf: &[u8]) -> KResult<usize> {
        let want = buf.len().min(PAGE_SIZE);
        if want == 0 {
            return Ok(0);
        }
        loop {
            let mut shared = self.shared.lock();
            if shared.reader_closed {
                return Err(KError::Pipe);
            }
            if !shared.is_full() {
                let space = PAGE_SIZE - shared.occupied() as usize;
                let put = want.min(space);
                for i in 0..put {
                    let idx = (shared.tail.wrapping_add(i as u16) as usize) % PAGE_SIZE;
                    shared.buf[idx] = buf[i];
                }
                shared.tail = shared.tail.wrapping_add(put as u16);
                shared.not_empty.broadcast();
                return Ok(put);
            }
            let cond_ptr = &mut shared.not_full as *mut Condition;
            drop(shared);
            unsafe { (*cond_ptr).wait() };
        }
    }

    pub fn on_reader_closed(&mut self) {
        let mut shared = self.shared.lock();
        shared.reader_closed = true;
        shared.not_full.broadcast();
    }

    pub fn on_writer_closed(&mut self) {
        let mut shared = self.shared.lock();
        shared.writer_closed = true;
        shared.not_empty.broadcast();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::scheduler;

    #[test]
    fn write_then_read_hands_off_bytes_in_order() {
        scheduler::test_reset(1);
        let (wio, rio) = create_pipe();
        assert_eq!(wio.write(b"hello").unwrap(), 5);
        let mut buf = [0u8; 5];
        assert_eq!(rio.read(&mut buf).unwrap(), 5);
        assert_eq!(&buf, b"hello");
    }

    #[test]
    fn read_after_writer_closes_and_drains_is_eof() {
        scheduler::test_reset(1);
        let (wio, rio) = create_pipe();
        wio.write(b"x").unwrap();
        wio.close();
        let mut buf = [0u8; 1];
        assert_eq!(rio.read(&mut buf).unwrap(), 1);
        assert_eq!(rio.read(&mut buf).unwrap(), 0);
    }

    #[test]
    fn write_after_reader_closes_fails_with_pipe_error() {
        scheduler::test_reset(1);
        let (wio, rio) = create_pipe();
        rio.close();
        assert_eq!(wio.write(b"x"), Err(KError::Pipe));
    }

    #[test]
    fn write_exceeding_one_page_is_truncated_to_a_page() {
        scheduler::test_reset(1);
        let (wio, _rio) = create_pipe();
        let big = alloc::vec![7u8; PAGE_SIZE + 100];
        assert_eq!(wio.write(&big).unwrap(), PAGE_SIZE);
    }
}
