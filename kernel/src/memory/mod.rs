//! Physical/virtual memory management: the Physical Page Pool, the Sv39
//! page-table value type, the Virtual Memory Manager built over both, the
//! boot address-space layout, and the kernel heap.

pub mod heap;
pub mod layout;
pub mod pagetable;
pub mod ppp;
pub mod vmm;

use crate::memory::pagetable::PteFlags;

/// Boot-time orchestration: carve out the heap, seed the physical page pool
/// with the rest of RAM, build the main address space, and perform the
/// identity/kernel-image boot mapping described in `spec.md` §4.2.
///
/// External collaborator territory (the linker-provided image symbols, the
/// platform's RAM size) means this only runs in the real boot build.
#[cfg(target_arch = "riscv64")]
pub fn init() {
    use crate::memory::layout::{image_regions, KERNEL_IMAGE_START, MMIO_BASE, MMIO_SIZE, RAM_END};

    unsafe {
        heap::init(|vma, size| {
            let _ = vmm::map_range(vma, size as u64, vma, PteFlags::rw().global());
        });
    }

    let heap_end = heap::HEAP_START + heap::HEAP_SIZE as u64;
    ppp::init(heap_end, (RAM_END - heap_end) / config_page_size());

    let main = vmm::init_main();
    unsafe { vmm::switch_mspace(main) };

    let gigapage = 1u64 << 30;
    let mut mmio = MMIO_BASE;
    while mmio < MMIO_BASE + MMIO_SIZE {
        let _ = vmm::map_range(mmio, gigapage, mmio, PteFlags::rw().global());
        mmio += gigapage;
    }

    let (text, rodata, data) = image_regions();
    let _ = vmm::map_range(text.start, text.end - text.start, text.start, PteFlags::rx().global());
    let _ = vmm::map_range(rodata.start, rodata.end - rodata.start, rodata.start, PteFlags::r().global());
    let _ = vmm::map_range(data.start, data.end - data.start, data.start, PteFlags::rw().global());

    let megapage = 1u64 << 21;
    let mut ram = (data.end + megapage - 1) & !(megapage - 1);
    while ram < RAM_END {
        let _ = vmm::map_range(ram, megapage, ram, PteFlags::rw().global());
        ram += megapage;
    }

    let _ = KERNEL_IMAGE_START;
    crate::arch::sfence_vma();
    crate::arch::enable_sum();
}

fn config_page_size() -> u64 {
    crate::config::PAGE_SIZE as u64
}
