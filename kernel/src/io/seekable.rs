//! Seekable wrapper (`spec.md` §4.4): adds `pos`/`end`/`blksz` semantics
//! over any backing I/O object that implements `readat`/`writeat`.

use alloc::boxed::Box;

use crate::error::{KError, KResult};

use super::{CntlCmd, IoObject};

pub struct Seekable {
    backing: Box<IoObject>,
    pos: u64,
    end: u64,
    blksz: u64,
}

impl Seekable {
    pub fn new(mut backing: Box<IoObject>) -> KResult<Self> {
        let blksz = backing.cntl(CntlCmd::GetBlkSz)?.max(1);
        let end = backing.cntl(CntlCmd::GetEnd)?;
        Ok(Self { backing, pos: 0, end, blksz })
    }

    pub fn read(&mut self, buf: &mut [u8]) -> KResult<usize> {
        let remaining = self.end.saturating_sub(self.pos);
        let requested = (buf.len() as u64).min(remaining);
        if requested > 0 && requested < self.blksz {
            return Err(KError::Invalid);
        }
        let n = requested - (requested % self.blksz);
        if n == 0 {
            return Ok(0);
        }
        let got = self.backing.readat(self.pos, &mut buf[..n as usize])?;
        self.pos += got as u64;
        Ok(got)
    }

    pub fn write(&mut self, buf: &[u8]) -> KResult<usize> {
        let n = (buf.len() as u64) - (buf.len() as u64 % self.blksz);
        if n == 0 {
            return Ok(0);
        }
        if self.pos + n > self.end {
            self.end = self.backing.cntl(CntlCmd::SetEnd(self.pos + n))?;
        }
        let got = self.backing.writeat(self.pos, &buf[..n as usize])?;
        self.pos += got as u64;
        Ok(got)
    }

    pub fn cntl(&mut self, cmd: CntlCmd) -> KResult<u64> {
        match cmd {
            CntlCmd::GetBlkSz => Ok(self.blksz),
            CntlCmd::GetEnd => Ok(self.end),
            CntlCmd::SetEnd(new_end) => {
                self.end = self.backing.cntl(CntlCmd::SetEnd(new_end))?;
                Ok(self.end)
            }
            CntlCmd::GetPos => Ok(self.pos),
            CntlCmd::SetPos(new_pos) => {
                if new_pos % self.blksz != 0 || new_pos > self.end {
                    return Err(KError::Invalid);
                }
                self.pos = new_pos;
                Ok(self.pos)
            }
        }
    }

    pub(crate) fn close_backing(&mut self) {
        self.backing.on_close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::MemIo;

    fn wrapped(data: alloc::vec::Vec<u8>) -> Seekable {
        Seekable::new(alloc::boxed::Box::new(IoObject::Mem(MemIo::from_vec(data)))).unwrap()
    }

    #[test]
    fn write_then_read_back_from_same_position_round_trips() {
        let mut s = wrapped(alloc::vec![0u8; 16]);
        let n = s.write(&[1, 2, 3, 4]).unwrap();
        assert_eq!(n, 4);
        s.cntl(CntlCmd::SetPos(0)).unwrap();
        let mut buf = [0u8; 4];
        let got = s.read(&mut buf).unwrap();
        assert_eq!(got, 4);
        assert_eq!(buf, [1, 2, 3, 4]);
    }

    #[test]
    fn setpos_rejects_unaligned_or_out_of_range() {
        let mut s = wrapped(alloc::vec![0u8; 16]);
        assert!(s.cntl(CntlCmd::SetPos(100)).is_err());
    }
}
