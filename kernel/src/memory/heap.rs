//! Kernel heap: the allocator whose *contract* `spec.md` §1 scopes in (the
//! rest of the core allocates `alloc::boxed::Box`/`Vec`/`Arc` through it) but
//! whose internals are named out of scope. Wired to a real crate rather than
//! an unimplemented stub, following
//! `ryanbreen-breenix/kernel/src/memory/heap.rs`'s use of
//! `linked_list_allocator::LockedHeap`.

use linked_list_allocator::LockedHeap;

use crate::memory::layout::KERNEL_IMAGE_START;

/// Virtual base of the kernel heap, placed directly above a generous
/// headroom for the kernel image.
pub const HEAP_START: u64 = KERNEL_IMAGE_START + 64 * 1024 * 1024;

/// 4 MiB heap. Generous for a teaching kernel's thread/process/cache tables.
pub const HEAP_SIZE: usize = 4 * 1024 * 1024;

#[global_allocator]
static ALLOCATOR: LockedHeap = LockedHeap::empty();

/// Map `[HEAP_START, HEAP_START + HEAP_SIZE)` and hand it to the global
/// allocator. Must run after the boot mapping and before any `alloc`-using
/// code (including `memory::ppp::init`, which allocates its free list
/// `Vec` from this heap).
///
/// # Safety
/// Must be called exactly once, and the mapped range must not alias any
/// other mapping.
pub unsafe fn init(map_range: impl FnOnce(u64, usize)) {
    map_range(HEAP_START, HEAP_SIZE);
    ALLOCATOR.lock().init(HEAP_START as *mut u8, HEAP_SIZE);
}

#[cfg(not(test))]
#[alloc_error_handler]
fn alloc_error_handler(layout: core::alloc::Layout) -> ! {
    panic!("kernel heap allocation failed: {:?}", layout);
}
