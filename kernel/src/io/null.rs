//! The null I/O object (`spec.md` §4.4): reads and writes complete
//! immediately with zero bytes transferred.

#[derive(Debug, Default, Clone, Copy)]
pub struct NullIo;

impl NullIo {
    pub fn read(&mut self, _buf: &mut [u8]) -> usize {
        0
    }

    pub fn write(&mut self, _buf: &[u8]) -> usize {
        0
    }
}
