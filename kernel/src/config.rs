//! Compile-time kernel configuration.
//!
//! Knobs only — none of these are part of an on-disk or user-visible wire
//! format (those live in [`crate::fs::layout`] and [`crate::io::cntl`]).

/// Page size in bytes. Fixed by the Sv39 leaf granularity.
pub const PAGE_SIZE: usize = 4096;

/// Maximum number of live threads, including the boot thread (slot 0) and
/// the idle thread (the last slot).
pub const NTHR: usize = 16;

/// Maximum number of live processes.
pub const NPROC: usize = 16;

/// Per-process file-descriptor table size.
pub const PROCESS_IOMAX: usize = 16;

/// Number of slots in the block cache.
pub const CACHE_CAPACITY: usize = 64;

/// Kernel thread stack size in bytes.
pub const STACK_SIZE: usize = 4000;

/// Start of the user virtual address window.
pub const UMEM_START_VMA: u64 = 0x0000_0000_0000_1000;

/// End (exclusive) of the user virtual address window.
pub const UMEM_END_VMA: u64 = 0x0000_0040_0000_0000;

/// Filesystem block size in bytes.
pub const FS_BLOCK_SIZE: usize = 512;

/// Pointers per indirect block (`FS_BLOCK_SIZE / 4`).
pub const PTRS_PER_BLOCK: usize = FS_BLOCK_SIZE / 4;

/// Width of a directory entry's name field, including the null terminator.
pub const MAX_NAME_LEN: usize = 14;
