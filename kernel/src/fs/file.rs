//! Per-open-file I/O object (`spec.md` §4.6): the thing `kernel::fs::open`
//! hands back, wrapped in [`crate::io::Seekable`] by the caller. Carries
//! only an inode number and a cached size; every operation re-reads the
//! inode through the mount so concurrent `extend` calls are observed.

use crate::error::{KError, KResult};
use crate::io::CntlCmd;

use super::inode;

pub struct FileIo {
    inode_no: u16,
    size: u64,
}

impl FileIo {
    pub(crate) fn new(inode_no: u16, size: u64) -> Self {
        Self { inode_no, size }
    }

    pub fn readat(&self, pos: u64, buf: &mut [u8]) -> KResult<usize> {
        super::with_mount(|m| {
            let file_inode = inode::read_inode(&m.cache, m.geometry.inode_table_start, self.inode_no as u64)?;
            inode::read_bytes(&m.cache, &file_inode, pos, buf)
        })
    }

    pub fn writeat(&self, pos: u64, buf: &[u8]) -> KResult<usize> {
        super::with_mount(|m| {
            let file_inode = inode::read_inode(&m.cache, m.geometry.inode_table_start, self.inode_no as u64)?;
            inode::write_bytes(&m.cache, &file_inode, pos, buf)
        })
    }

    pub fn cntl(&mut self, cmd: CntlCmd) -> KResult<u64> {
        match cmd {
            CntlCmd::GetBlkSz => Ok(crate::config::FS_BLOCK_SIZE as u64),
            CntlCmd::GetEnd => Ok(self.size),
            CntlCmd::SetEnd(new_end) => {
                super::extend(self.inode_no, new_end)?;
                // `extend` never shrinks the on-disk inode; mirror that
                // no-shrink contract here so a smaller `new_end` can't make
                // `Seekable` believe the file got smaller than it is.
                self.size = new_end.max(self.size);
                Ok(self.size)
            }
            CntlCmd::GetPos | CntlCmd::SetPos(_) => Err(KError::NotSupported),
        }
    }

    pub fn on_close(&mut self) {
        super::close_file(self.inode_no);
    }
}
