//! I/O Object Framework (`spec.md` §4.4): one polymorphic byte-stream
//! abstraction, modeled as a closed set of variants dispatched through
//! `read`/`write`/`readat`/`writeat`/`cntl`/`close` rather than a vtable of
//! raw function pointers (`spec.md` §9's redesign note). Reference counting
//! lives on [`IoHandle`], an `Arc`-backed wrapper around the variant.

pub mod memio;
pub mod null;
pub mod pipe;
pub mod seekable;

use alloc::boxed::Box;
use alloc::sync::Arc;

use spin::Mutex;

use crate::error::{KError, KResult};
use crate::fs::file::FileIo;

pub use memio::MemIo;
pub use null::NullIo;
pub use pipe::{create_pipe, PipeEndpoint};
pub use seekable::Seekable;

/// Control commands understood by `cntl`. Position (`GetPos`/`SetPos`) is
/// only meaningful for [`Seekable`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CntlCmd {
    GetBlkSz,
    GetEnd,
    SetEnd(u64),
    GetPos,
    SetPos(u64),
}

/// The closed set of concrete I/O backings.
pub enum IoObject {
    Null(NullIo),
    Mem(MemIo),
    Seekable(Seekable),
    PipeRead(PipeEndpoint),
    PipeWrite(PipeEndpoint),
    File(FileIo),
}

impl IoObject {
    pub fn read(&mut self, buf: &mut [u8]) -> KResult<usize> {
        match self {
            IoObject::Null(n) => Ok(n.read(buf)),
            IoObject::Seekable(s) => s.read(buf),
            IoObject::PipeRead(p) => p.read(buf),
            IoObject::Mem(_) | IoObject::PipeWrite(_) | IoObject::File(_) => Err(KError::NotSupported),
        }
    }

    pub fn write(&mut self, buf: &[u8]) -> KResult<usize> {
        match self {
            IoObject::Null(n) => Ok(n.write(buf)),
            IoObject::Seekable(s) => s.write(buf),
            IoObject::PipeWrite(p) => p.write(buf),
            IoObject::Mem(_) | IoObject::PipeRead(_) | IoObject::File(_) => Err(KError::NotSupported),
        }
    }

    pub fn readat(&self, pos: u64, buf: &mut [u8]) -> KResult<usize> {
        match self {
            IoObject::Mem(m) => m.readat(pos, buf),
            IoObject::File(f) => f.readat(pos, buf),
            _ => Err(KError::NotSupported),
        }
    }

    pub fn writeat(&mut self, pos: u64, buf: &[u8]) -> KResult<usize> {
        match self {
            IoObject::Mem(m) => m.writeat(pos, buf),
            IoObject::File(f) => f.writeat(pos, buf),
            _ => Err(KError::NotSupported),
        }
    }

    pub fn cntl(&mut self, cmd: CntlCmd) -> KResult<u64> {
        match self {
            IoObject::Mem(m) => m.cntl(cmd),
            IoObject::Seekable(s) => s.cntl(cmd),
            IoObject::File(f) => f.cntl(cmd),
            _ => match cmd {
                CntlCmd::GetBlkSz => Ok(1),
                _ => Err(KError::NotSupported),
            },
        }
    }

    /// Variant-specific teardown, run once when the last handle closes.
    fn on_close(&mut self) {
        match self {
            IoObject::Seekable(s) => s.close_backing(),
            IoObject::PipeRead(p) => p.on_reader_closed(),
            IoObject::PipeWrite(p) => p.on_writer_closed(),
            IoObject::File(f) => f.on_close(),
            _ => {}
        }
    }
}

/// A reference-counted handle to an [`IoObject`]. Cloning shares the
/// underlying object (more outstanding references); `close` must be called
/// exactly once per handle.
#[derive(Clone)]
pub struct IoHandle(Arc<Mutex<IoObject>>);

impl IoHandle {
    pub fn new(obj: IoObject) -> Self {
        Self(Arc::new(Mutex::new(obj)))
    }

    pub fn read(&self, buf: &mut [u8]) -> KResult<usize> {
        self.0.lock().read(buf)
    }

    pub fn write(&self, buf: &[u8]) -> KResult<usize> {
        self.0.lock().write(buf)
    }

    pub fn readat(&self, pos: u64, buf: &mut [u8]) -> KResult<usize> {
        self.0.lock().readat(pos, buf)
    }

    pub fn writeat(&self, pos: u64, buf: &[u8]) -> KResult<usize> {
        self.0.lock().writeat(pos, buf)
    }

    pub fn cntl(&self, cmd: CntlCmd) -> KResult<u64> {
        self.0.lock().cntl(cmd)
    }

    /// Decrement this handle's reference count; if it was the last
    /// outstanding reference, run the variant's teardown.
    pub fn close(self) {
        if Arc::strong_count(&self.0) == 1 {
            self.0.lock().on_close();
        }
    }
}

pub fn boxed(obj: IoObject) -> Box<IoObject> {
    Box::new(obj)
}
