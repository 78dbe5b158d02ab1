//! Virtual Memory Manager (`spec.md` §4.2): builds the main address space at
//! boot, creates/edits/clones per-process spaces, validates user pointers,
//! and services user-mode page faults.
//!
//! Physical memory is identity-mapped into the kernel's own address space
//! (a physical address and its kernel virtual address are the same `u64`),
//! the same assumption `ryanbreen-breenix/kernel/src/memory/mod.rs` makes
//! for its `phys_to_virt` helper. That makes page-table pages directly
//! dereferenceable through the physical address stored in a `Pte`, on real
//! hardware and in host unit tests alike (tests seed the physical page pool
//! with the address of a real host buffer).

use conquer_once::spin::OnceCell;

use crate::arch;
use crate::config::{PAGE_SIZE, UMEM_END_VMA, UMEM_START_VMA};
use crate::error::{KError, KResult};
use crate::memory::pagetable::{is_well_formed, vpn_indices, PageTable, Pte, PteFlags};
use crate::memory::ppp;

/// Opaque address-space tag: paging mode + ASID + root physical page number,
/// encoded exactly as the hardware `satp` register.
pub type MTag = u64;

const SV39_MODE: u64 = 8;

fn make_tag(root_phys: u64) -> MTag {
    debug_assert_eq!(root_phys % PAGE_SIZE as u64, 0);
    (SV39_MODE << 60) | (root_phys >> 12)
}

fn tag_root_phys(tag: MTag) -> u64 {
    (tag & ((1u64 << 44) - 1)) << 12
}

static MAIN_TAG: OnceCell<MTag> = OnceCell::uninit();

unsafe fn table_ref<'a>(phys: u64) -> &'a PageTable {
    &*(phys as *const PageTable)
}

unsafe fn table_mut<'a>(phys: u64) -> &'a mut PageTable {
    &mut *(phys as *mut PageTable)
}

fn alloc_table() -> u64 {
    let phys = ppp::alloc_pages(1);
    unsafe { *(phys as *mut PageTable) = PageTable::zeroed() };
    phys
}

fn active_root_phys() -> u64 {
    tag_root_phys(arch::read_satp())
}

/// Create a fresh, all-zero root table and install it as the main (kernel)
/// space. Callers perform the boot mapping afterward.
pub fn init_main() -> MTag {
    let root = alloc_table();
    let tag = make_tag(root);
    MAIN_TAG.try_init_once(|| tag).expect("memory::vmm::init_main called more than once");
    tag
}

fn main_tag() -> MTag {
    *MAIN_TAG.get().expect("memory::vmm::init_main not called")
}

/// Walk to the final-level table covering `vma`, creating interior tables
/// along the way when `alloc` is set. Returns the table holding the leaf
/// slot and the index within it.
fn walk(root_phys: u64, vma: u64, alloc: bool) -> Option<(u64, usize)> {
    let idx = vpn_indices(vma);
    let mut table_phys = root_phys;
    for level in idx.iter().take(2) {
        let pte = unsafe { table_ref(table_phys) }.entry(*level);
        table_phys = if pte.is_valid() {
            if pte.is_leaf() {
                // A superpage (boot mapping) covers this address; 4 KiB
                // granularity operations don't apply here.
                return None;
            }
            pte.phys_addr()
        } else {
            if !alloc {
                return None;
            }
            let child = alloc_table();
            unsafe { table_mut(table_phys) }.set_entry(*level, Pte::interior(child));
            child
        };
    }
    Some((table_phys, idx[2]))
}

/// Install or overwrite a 4 KiB leaf at `vma` mapping physical page `pp`.
pub fn map_page(vma: u64, pp: u64, flags: PteFlags) -> KResult<()> {
    if vma % PAGE_SIZE as u64 != 0 || pp % PAGE_SIZE as u64 != 0 || !is_well_formed(vma) {
        return Err(KError::Invalid);
    }
    let root = active_root_phys();
    let (table_phys, idx) = walk(root, vma, true).ok_or(KError::Invalid)?;
    unsafe { table_mut(table_phys) }.set_entry(idx, Pte::leaf(pp, flags));
    arch::sfence_vma();
    Ok(())
}

/// Contiguous identity-style mapping of `[vma, vma+size)` onto physical pages
/// starting at `pp`, rounding `size` up to a page multiple.
pub fn map_range(vma: u64, size: u64, pp: u64, flags: PteFlags) -> KResult<()> {
    let pages = (size + PAGE_SIZE as u64 - 1) / PAGE_SIZE as u64;
    for i in 0..pages {
        map_page(vma + i * PAGE_SIZE as u64, pp + i * PAGE_SIZE as u64, flags)?;
    }
    Ok(())
}

/// Allocate fresh zeroed pages and map them over `[vma, vma+size)`.
pub fn alloc_and_map_range(vma: u64, size: u64, flags: PteFlags) -> KResult<u64> {
    let pages = (size + PAGE_SIZE as u64 - 1) / PAGE_SIZE as u64;
    for i in 0..pages {
        let pp = ppp::alloc_pages(1);
        unsafe { core::ptr::write_bytes(pp as *mut u8, 0, PAGE_SIZE) };
        map_page(vma + i * PAGE_SIZE as u64, pp, flags)?;
    }
    Ok(vma)
}

/// Reassign permission bits on existing valid, non-global leaves in
/// `[vp, vp+size)`. Leaves outside that description are left untouched.
pub fn set_range_flags(vp: u64, size: u64, flags: PteFlags) -> KResult<()> {
    let root = active_root_phys();
    let pages = (size + PAGE_SIZE as u64 - 1) / PAGE_SIZE as u64;
    for i in 0..pages {
        let vma = vp + i * PAGE_SIZE as u64;
        if let Some((table_phys, idx)) = walk(root, vma, false) {
            let table = unsafe { table_mut(table_phys) };
            let pte = table.entry(idx);
            if pte.is_valid() && pte.is_leaf() && !pte.is_global() {
                table.set_entry(idx, pte.with_flags(flags));
            }
        }
    }
    arch::sfence_vma();
    Ok(())
}

/// Free the backing page of and null every valid, non-global leaf in
/// `[vp, vp+size)`.
pub fn unmap_and_free_range(vp: u64, size: u64) {
    let root = active_root_phys();
    let pages = (size + PAGE_SIZE as u64 - 1) / PAGE_SIZE as u64;
    for i in 0..pages {
        let vma = vp + i * PAGE_SIZE as u64;
        if let Some((table_phys, idx)) = walk(root, vma, false) {
            let table = unsafe { table_mut(table_phys) };
            let pte = table.entry(idx);
            if pte.is_valid() && pte.is_leaf() && !pte.is_global() {
                ppp::free_pages(pte.phys_addr(), 1);
                table.set_entry(idx, Pte::null());
            }
        }
    }
    arch::sfence_vma();
}

/// The active address-space tag (current `satp`).
pub fn active_mspace() -> MTag {
    arch::read_satp()
}

/// Install `tag` as the active address space.
///
/// # Safety
/// `tag` must name a space built by this module (`init_main` or
/// `clone_active_mspace`), not yet discarded.
pub unsafe fn switch_mspace(tag: MTag) {
    arch::write_satp(tag);
}

/// Deep-copy `[UMEM_START_VMA, UMEM_END_VMA)` into a fresh root that shares
/// every other (global) root entry with the active space.
pub fn clone_active_mspace() -> MTag {
    let src_root = active_root_phys();
    let dst_root = alloc_table();

    for (i, pte) in unsafe { table_ref(src_root) }.iter() {
        if !pte.is_valid() {
            continue;
        }
        if pte.is_global() {
            unsafe { table_mut(dst_root) }.set_entry(i, pte);
        }
    }

    for vma in (UMEM_START_VMA..UMEM_END_VMA).step_by(PAGE_SIZE) {
        let Some((src_table, idx)) = walk(src_root, vma, false) else { continue };
        let pte = unsafe { table_ref(src_table) }.entry(idx);
        if !pte.is_valid() {
            continue;
        }
        debug_assert!(!pte.is_global());
        let (dst_table, dst_idx) = walk(dst_root, vma, true).expect("umem vma always walkable");
        let new_pp = ppp::alloc_pages(1);
        unsafe {
            core::ptr::copy_nonoverlapping(
                pte.phys_addr() as *const u8,
                new_pp as *mut u8,
                PAGE_SIZE,
            );
        }
        unsafe { table_mut(dst_table) }.set_entry(dst_idx, Pte::leaf(new_pp, pte.flags()));
    }

    make_tag(dst_root)
}

/// Free every non-global subtree reachable from `root_phys` (leaves and the
/// interior tables that lead to them), then free `root_phys` itself. Global
/// entries are shared with another space and left untouched.
fn free_user_subtree(table_phys: u64, level: usize) {
    let table = unsafe { table_ref(table_phys) };
    for (_, pte) in table.iter() {
        if !pte.is_valid() || pte.is_global() {
            continue;
        }
        if level < 2 && !pte.is_leaf() {
            free_user_subtree(pte.phys_addr(), level + 1);
            ppp::free_pages(pte.phys_addr(), 1);
        } else if pte.is_leaf() {
            ppp::free_pages(pte.phys_addr(), 1);
        }
    }
}

/// Unmap and free all user pages in the active space, keeping its table
/// structure (and root) for reuse.
pub fn reset_active_mspace() {
    unmap_and_free_range(UMEM_START_VMA, UMEM_END_VMA - UMEM_START_VMA);
}

/// Reclaim the active space entirely (user pages, interior user tables, and
/// the root itself) and switch back to the main space.
pub fn discard_active_mspace() -> MTag {
    let root = active_root_phys();
    let main = main_tag();
    debug_assert_ne!(make_tag(root), main, "cannot discard the main address space");
    free_user_subtree(root, 0);
    ppp::free_pages(root, 1);
    unsafe { switch_mspace(main) };
    main
}

/// Require a valid leaf with at least `required` permissions for every page
/// touched by `[p, p+len)`.
pub fn validate_vptr_len(p: u64, len: u64, required: PteFlags) -> KResult<()> {
    if p == 0 {
        return Err(KError::Invalid);
    }
    if len == 0 {
        return Ok(());
    }
    let root = active_root_phys();
    let page_mask = !(PAGE_SIZE as u64 - 1);
    let first_page = p & page_mask;
    let last_page = (p + len - 1) & page_mask;
    let pages = (last_page - first_page) / PAGE_SIZE as u64 + 1;
    for i in 0..pages {
        let vma = first_page + i * PAGE_SIZE as u64;
        let (table_phys, idx) = walk(root, vma, false).ok_or(KError::Access)?;
        let pte = unsafe { table_ref(table_phys) }.entry(idx);
        if !pte.is_valid() || !pte.is_leaf() {
            return Err(KError::Access);
        }
        let f = pte.flags();
        if (required.read && !f.read) || (required.write && !f.write) || (required.execute && !f.execute) || !f.user
        {
            return Err(KError::Access);
        }
    }
    Ok(())
}

/// Like [`validate_vptr_len`], but walks byte-by-byte until a null
/// terminator is found, failing if the scan crosses into an invalid page
/// first.
pub fn validate_vstr(s: u64, required: PteFlags) -> KResult<usize> {
    if s == 0 {
        return Err(KError::Invalid);
    }
    let root = active_root_phys();
    let mut vma = s;
    let mut len = 0usize;
    loop {
        let page = vma & !(PAGE_SIZE as u64 - 1);
        let (table_phys, idx) = walk(root, page, false).ok_or(KError::Access)?;
        let pte = unsafe { table_ref(table_phys) }.entry(idx);
        if !pte.is_valid() || !pte.is_leaf() {
            return Err(KError::Access);
        }
        let f = pte.flags();
        if (required.read && !f.read) || !f.user {
            return Err(KError::Access);
        }
        let offset = (vma - page) as usize;
        let byte = unsafe { *((pte.phys_addr() as usize + offset) as *const u8) };
        if byte == 0 {
            return Ok(len);
        }
        len += 1;
        vma += 1;
    }
}

/// Fix up a user-mode page fault, or report it as fatal.
///
/// `cause` is the raw `scause` value; this policy doesn't distinguish load
/// from store faults, so it is accepted but unused beyond logging.
pub fn handle_umode_page_fault(_cause: u64, vma: u64) -> bool {
    if vma < UMEM_START_VMA || vma >= UMEM_END_VMA {
        return false;
    }
    let page = vma & !(PAGE_SIZE as u64 - 1);
    let root = active_root_phys();
    if let Some((table_phys, idx)) = walk(root, page, false) {
        if unsafe { table_ref(table_phys) }.entry(idx).is_valid() {
            return false;
        }
    }
    alloc_and_map_range(page, PAGE_SIZE as u64, PteFlags { read: true, write: true, execute: false, user: true, global: false })
        .is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::ppp;

    /// Real host memory standing in for physical RAM; identity-mapping
    /// means a `u64` drawn from this buffer's address range is both a valid
    /// "physical address" and a dereferenceable host pointer. Leaked
    /// deliberately — each test gets its own fresh region for the life of
    /// the process.
    fn setup() -> MTag {
        const PAGES: u64 = 512;
        let layout = core::alloc::Layout::from_size_align((PAGES * PAGE_SIZE as u64) as usize, PAGE_SIZE).unwrap();
        let ptr = unsafe { alloc::alloc::alloc_zeroed(layout) };
        let base = ptr as u64;
        ppp::init(base, PAGES);
        init_main()
    }

    #[test]
    fn map_and_validate_round_trip() {
        let main = setup();
        unsafe { switch_mspace(main) };
        let pp = ppp::alloc_pages(1);
        map_page(UMEM_START_VMA, pp, PteFlags { read: true, write: true, execute: false, user: true, global: false }).unwrap();
        validate_vptr_len(UMEM_START_VMA, PAGE_SIZE as u64, PteFlags::rw()).unwrap();
        assert!(validate_vptr_len(UMEM_START_VMA + PAGE_SIZE as u64, 1, PteFlags::rw()).is_err());
    }

    #[test]
    fn page_fault_lazily_maps_umem_once() {
        let main = setup();
        unsafe { switch_mspace(main) };
        assert!(handle_umode_page_fault(0, UMEM_START_VMA));
        // second fault on an already-valid page is genuine and fatal
        assert!(!handle_umode_page_fault(0, UMEM_START_VMA));
    }

    #[test]
    fn page_fault_outside_umem_is_fatal() {
        let main = setup();
        unsafe { switch_mspace(main) };
        assert!(!handle_umode_page_fault(0, UMEM_END_VMA));
    }

    #[test]
    fn clone_is_isolated_and_discard_reclaims_pages() {
        let main = setup();
        unsafe { switch_mspace(main) };
        let before = ppp::free_page_count();

        let pp = ppp::alloc_pages(1);
        map_page(UMEM_START_VMA, pp, PteFlags { read: true, write: true, execute: false, user: true, global: false }).unwrap();
        unsafe { (pp as *mut u32).write(42) };

        let cloned = clone_active_mspace();
        unsafe { switch_mspace(cloned) };
        let (table_phys, idx) = walk(active_root_phys(), UMEM_START_VMA, false).unwrap();
        let cloned_pp = unsafe { table_ref(table_phys) }.entry(idx).phys_addr();
        unsafe { (cloned_pp as *mut u32).write(10) };
        assert_eq!(unsafe { *(cloned_pp as *const u32) }, 10);

        unsafe { switch_mspace(main) };
        assert_eq!(unsafe { *(pp as *const u32) }, 42);

        unsafe { switch_mspace(cloned) };
        let returned = discard_active_mspace();
        assert_eq!(returned, main);
        assert_eq!(ppp::free_page_count(), before - 1);
    }
}
