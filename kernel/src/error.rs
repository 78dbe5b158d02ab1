//! The kernel-wide error taxonomy (`spec.md` §7).
//!
//! Recoverable errors flow as `Result<T, KError>` from the originating call
//! up to the syscall boundary unchanged, where [`KError::to_errno`] converts
//! to the negative-integer convention user processes see. Programming errors
//! detectable only at runtime (releasing an unowned lock, calling
//! `condition_wait` from a thread that isn't running) are `panic!`/
//! `debug_assert!` at the point of detection, not represented here.

use core::fmt;

/// A recoverable kernel error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KError {
    /// Bad argument, misalignment, or a zero-length string.
    Invalid,
    /// Kernel allocation failed.
    NoMemory,
    /// Operation absent from an I/O object's vtable.
    NotSupported,
    /// Name not found.
    NotFound,
    /// Fd out of range or unused.
    BadFd,
    /// Fd table full.
    TooManyFiles,
    /// Process table full.
    TooManyProcesses,
    /// Thread table full.
    TooManyThreads,
    /// No child to wait for.
    NoChild,
    /// Permission denial or out-of-range memory access.
    Access,
    /// A single-open device is already open.
    Busy,
    /// The backing device reported a failure.
    Io,
    /// The peer end of a pipe has closed.
    Pipe,
    /// The filesystem has no free data blocks left.
    NoDataBlocks,
    /// The filesystem has no free inodes left.
    NoInodeBlocks,
}

impl KError {
    /// POSIX-style negative errno, as returned in the syscall result slot.
    pub const fn to_errno(self) -> i32 {
        -(match self {
            KError::Invalid => 22,
            KError::NoMemory => 12,
            KError::NotSupported => 38,
            KError::NotFound => 2,
            KError::BadFd => 9,
            KError::TooManyFiles => 24,
            KError::TooManyProcesses => 100,
            KError::TooManyThreads => 101,
            KError::NoChild => 10,
            KError::Access => 13,
            KError::Busy => 16,
            KError::Io => 5,
            KError::Pipe => 32,
            KError::NoDataBlocks => 102,
            KError::NoInodeBlocks => 103,
        })
    }
}

impl fmt::Display for KError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            KError::Invalid => "invalid argument",
            KError::NoMemory => "out of memory",
            KError::NotSupported => "operation not supported",
            KError::NotFound => "no such entry",
            KError::BadFd => "bad file descriptor",
            KError::TooManyFiles => "too many open files",
            KError::TooManyProcesses => "too many processes",
            KError::TooManyThreads => "too many threads",
            KError::NoChild => "no child process",
            KError::Access => "permission denied",
            KError::Busy => "device busy",
            KError::Io => "I/O error",
            KError::Pipe => "broken pipe",
            KError::NoDataBlocks => "filesystem out of data blocks",
            KError::NoInodeBlocks => "filesystem out of inodes",
        };
        f.write_str(s)
    }
}

/// Convenience alias used throughout the core.
pub type KResult<T> = Result<T, KError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn errno_values_are_negative_and_distinct() {
        let all = [
            KError::Invalid,
            KError::NoMemory,
            KError::NotSupported,
            KError::NotFound,
            KError::BadFd,
            KError::TooManyFiles,
            KError::TooManyProcesses,
            KError::TooManyThreads,
            KError::NoChild,
            KError::Access,
            KError::Busy,
            KError::Io,
            KError::Pipe,
            KError::NoDataBlocks,
            KError::NoInodeBlocks,
        ];
        for e in all {
            assert!(e.to_errno() < 0);
        }
    }
}
