//! Validated user-memory access for syscall argument marshalling
//! (`spec.md` §6, "all user pointers are validated before dereference").
//!
//! Physical memory is identity-mapped into kernel space
//! ([`crate::memory::vmm`]'s assumption), and `sstatus.SUM` is set at boot
//! (`crate::arch::enable_sum`), so a validated user virtual address is
//! directly dereferenceable from supervisor mode without a CR3-style
//! switch — validation is the whole of the safety argument here.

use alloc::vec::Vec;

use crate::error::KResult;
use crate::memory::pagetable::PteFlags;
use crate::memory::vmm;

const READ: PteFlags = PteFlags { read: true, write: false, execute: false, user: true, global: false };
const WRITE: PteFlags = PteFlags { read: false, write: true, execute: false, user: true, global: false };

/// Copy `len` bytes out of user memory at `ptr`.
pub fn copy_from_user(ptr: u64, len: usize) -> KResult<Vec<u8>> {
    vmm::validate_vptr_len(ptr, len as u64, READ)?;
    let mut buf = alloc::vec![0u8; len];
    unsafe { core::ptr::copy_nonoverlapping(ptr as *const u8, buf.as_mut_ptr(), len) };
    Ok(buf)
}

/// Copy `data` into user memory at `ptr`.
pub fn copy_to_user(ptr: u64, data: &[u8]) -> KResult<()> {
    vmm::validate_vptr_len(ptr, data.len() as u64, WRITE)?;
    unsafe { core::ptr::copy_nonoverlapping(data.as_ptr(), ptr as *mut u8, data.len()) };
    Ok(())
}

/// Validate and read a NUL-terminated user string.
pub fn copy_user_cstr(ptr: u64) -> KResult<alloc::string::String> {
    let len = vmm::validate_vstr(ptr, READ)?;
    let bytes = copy_from_user(ptr, len)?;
    Ok(alloc::string::String::from_utf8_lossy(&bytes).into_owned())
}
