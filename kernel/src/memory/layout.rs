//! Physical address-space layout for the QEMU `virt` machine this kernel
//! targets. Centralized here the way
//! `ryanbreen-breenix/kernel/src/memory/layout.rs` centralizes its own
//! address ranges, so the boot mapping and the linker script agree on one
//! source of truth.
//!
//! The exact symbols (`__kernel_start` etc.) are provided by boot/link glue,
//! an external collaborator; this module only names the ranges the VMM's
//! boot mapping needs and provides sane defaults for host tests.

/// Base of the identity-mapped MMIO window (UART, PLIC, virtio transports).
pub const MMIO_BASE: u64 = 0x1000_0000;

/// Size of the MMIO window, mapped as global R/W gigapages.
pub const MMIO_SIZE: u64 = 0x1000_0000;

/// Physical load address of the kernel image.
pub const KERNEL_IMAGE_START: u64 = 0x8020_0000;

/// End of RAM. 128 MiB is enough for the teaching workloads this kernel
/// targets; real deployments read this from the device tree instead.
pub const RAM_END: u64 = 0x8000_0000 + 128 * 1024 * 1024;

/// Boot-time partition of the kernel image into region, flags pairs,
/// populated by the linker script's section symbols. The VMM maps each
/// region with 4 KiB leaves per `spec.md` §4.2's boot mapping.
pub struct ImageRegion {
    pub start: u64,
    pub end: u64,
}

extern "C" {
    static __text_start: u8;
    static __text_end: u8;
    static __rodata_start: u8;
    static __rodata_end: u8;
    static __data_start: u8;
    static __bss_end: u8;
}

/// Read the linker-provided section boundaries. Only valid in the real
/// boot build; host tests never call this.
#[cfg(target_arch = "riscv64")]
pub fn image_regions() -> (ImageRegion, ImageRegion, ImageRegion) {
    unsafe {
        (
            ImageRegion { start: &__text_start as *const u8 as u64, end: &__text_end as *const u8 as u64 },
            ImageRegion { start: &__rodata_start as *const u8 as u64, end: &__rodata_end as *const u8 as u64 },
            ImageRegion { start: &__data_start as *const u8 as u64, end: &__bss_end as *const u8 as u64 },
        )
    }
}
