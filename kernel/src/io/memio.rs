//! Memory-backed byte stream (`spec.md` §4.4, "MemIO"): a bounded in-memory
//! region addressed by position, used both as a real device substitute and
//! as the `BlockDevice` fixture for host tests (per `spec.md` §1's
//! substitution note).

use alloc::vec::Vec;

use crate::error::{KError, KResult};

use super::CntlCmd;

pub struct MemIo {
    data: Vec<u8>,
    capacity: usize,
    size: usize,
}

impl MemIo {
    pub fn new(capacity: usize) -> Self {
        Self { data: alloc::vec![0u8; capacity], capacity, size: capacity }
    }

    pub fn from_vec(data: Vec<u8>) -> Self {
        let capacity = data.len();
        Self { capacity, size: capacity, data }
    }

    pub fn readat(&self, pos: u64, buf: &mut [u8]) -> KResult<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        let pos = pos as usize;
        if pos > self.size {
            return Err(KError::Invalid);
        }
        let n = buf.len().min(self.size - pos);
        buf[..n].copy_from_slice(&self.data[pos..pos + n]);
        Ok(n)
    }

    pub fn writeat(&mut self, pos: u64, buf: &[u8]) -> KResult<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        let pos = pos as usize;
        if pos > self.size {
            return Err(KError::Invalid);
        }
        let n = buf.len().min(self.size - pos);
        self.data[pos..pos + n].copy_from_slice(&buf[..n]);
        Ok(n)
    }

    pub fn cntl(&mut self, cmd: CntlCmd) -> KResult<u64> {
        match cmd {
            CntlCmd::GetBlkSz => Ok(1),
            CntlCmd::GetEnd => Ok(self.size as u64),
            CntlCmd::SetEnd(new_size) => {
                if new_size as usize > self.capacity {
                    return Err(KError::Invalid);
                }
                self.size = new_size as usize;
                Ok(self.size as u64)
            }
            CntlCmd::GetPos | CntlCmd::SetPos(_) => Err(KError::NotSupported),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn readat_truncates_to_remaining_size() {
        let mem = MemIo::from_vec(alloc::vec![1, 2, 3, 4]);
        let mut buf = [0u8; 8];
        let n = mem.readat(2, &mut buf).unwrap();
        assert_eq!(n, 2);
        assert_eq!(&buf[..2], &[3, 4]);
    }

    #[test]
    fn readat_past_size_is_invalid() {
        let mem = MemIo::from_vec(alloc::vec![1, 2, 3]);
        let mut buf = [0u8; 4];
        assert_eq!(mem.readat(10, &mut buf), Err(KError::Invalid));
    }

    #[test]
    fn setend_cannot_grow_past_capacity() {
        let mut mem = MemIo::new(8);
        mem.cntl(CntlCmd::SetEnd(4)).unwrap();
        assert_eq!(mem.cntl(CntlCmd::GetEnd).unwrap(), 4);
        assert_eq!(mem.cntl(CntlCmd::SetEnd(9)), Err(KError::Invalid));
    }
}
