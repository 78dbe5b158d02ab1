//! Syscall numbers (`spec.md` §6). Values are this kernel's own convention,
//! not Linux-compatible — there is no ABI to stay compatible with here.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u64)]
#[allow(dead_code)]
pub enum SyscallNumber {
    Exit = 0,
    Exec = 1,
    Fork = 2,
    Wait = 3,
    Print = 4,
    Usleep = 5,
    DevOpen = 6,
    FsOpen = 7,
    FsCreate = 8,
    FsDelete = 9,
    Close = 10,
    Read = 11,
    Write = 12,
    Ioctl = 13,
    Pipe = 14,
    IoDup = 15,
}

impl SyscallNumber {
    pub fn from_u64(n: u64) -> Option<Self> {
        Some(match n {
            0 => Self::Exit,
            1 => Self::Exec,
            2 => Self::Fork,
            3 => Self::Wait,
            4 => Self::Print,
            5 => Self::Usleep,
            6 => Self::DevOpen,
            7 => Self::FsOpen,
            8 => Self::FsCreate,
            9 => Self::FsDelete,
            10 => Self::Close,
            11 => Self::Read,
            12 => Self::Write,
            13 => Self::Ioctl,
            14 => Self::Pipe,
            15 => Self::IoDup,
            _ => return None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_every_defined_number() {
        for n in 0..=15u64 {
            assert_eq!(SyscallNumber::from_u64(n).map(|s| s as u64), Some(n));
        }
        assert_eq!(SyscallNumber::from_u64(16), None);
    }
}
