//! Thin RISC-V register access, isolated behind a small surface so the rest
//! of the core can be written (and unit tested) without real hardware.
//!
//! Everything here is either a single CSR read/write or a critical-section
//! helper; no page-table walking or trap handling lives in this module —
//! that is boot/trap glue and stays an external collaborator.

#[cfg(target_arch = "riscv64")]
mod riscv64 {
    use riscv::register::{sstatus, satp};

    /// Run `f` with the supervisor interrupt-enable bit cleared, restoring
    /// its previous value on return. Used to guard the ready list, condition
    /// wait lists, the sleep list, and the physical page pool's free list.
    pub fn without_interrupts<F, R>(f: F) -> R
    where
        F: FnOnce() -> R,
    {
        let was_enabled = sstatus::read().sie();
        unsafe { sstatus::clear_sie() };
        let result = f();
        if was_enabled {
            unsafe { sstatus::set_sie() };
        }
        result
    }

    /// Read the active address-space tag (`satp`).
    pub fn read_satp() -> u64 {
        satp::read().bits() as u64
    }

    /// Install a new address-space tag and flush the TLB for it.
    ///
    /// # Safety
    /// `tag` must encode a valid, fully populated root page table.
    pub unsafe fn write_satp(tag: u64) {
        core::arch::asm!("csrw satp, {0}", in(reg) tag);
        sfence_vma();
    }

    /// Flush the entire TLB (`sfence.vma` with no operands).
    pub fn sfence_vma() {
        unsafe { core::arch::asm!("sfence.vma") };
    }

    /// Enable `sstatus.SUM` so supervisor code may dereference user pages.
    pub fn enable_sum() {
        unsafe { sstatus::set_sum() };
    }

    /// Arm the timer comparator for the next wake at absolute tick `deadline`.
    pub fn arm_timer(deadline: u64) {
        let _ = sbi_rt::set_timer(deadline);
    }

    /// Disarm the timer by arming it for the furthest possible future tick.
    /// RISC-V has no native "cancel" for SBI timers.
    pub fn disarm_timer() {
        let _ = sbi_rt::set_timer(u64::MAX);
    }
}

#[cfg(target_arch = "riscv64")]
pub use riscv64::*;

/// Host-test fallback: a single global "satp" and "sie" cell, enough to
/// exercise the VMM/TSK unit tests on a non-RISC-V host.
#[cfg(not(target_arch = "riscv64"))]
mod stub {
    use core::sync::atomic::{AtomicBool, AtomicU64, Ordering};

    static SATP: AtomicU64 = AtomicU64::new(0);
    static SIE: AtomicBool = AtomicBool::new(true);
    static SFENCE_COUNT: AtomicU64 = AtomicU64::new(0);

    pub fn without_interrupts<F, R>(f: F) -> R
    where
        F: FnOnce() -> R,
    {
        let was_enabled = SIE.swap(false, Ordering::SeqCst);
        let result = f();
        SIE.store(was_enabled, Ordering::SeqCst);
        result
    }

    pub fn read_satp() -> u64 {
        SATP.load(Ordering::SeqCst)
    }

    /// # Safety
    /// No hardware effect on non-RISC-V hosts; kept `unsafe` to match the
    /// real implementation's signature.
    pub unsafe fn write_satp(tag: u64) {
        SATP.store(tag, Ordering::SeqCst);
        sfence_vma();
    }

    pub fn sfence_vma() {
        SFENCE_COUNT.fetch_add(1, Ordering::SeqCst);
    }

    pub fn enable_sum() {}

    static TIMER_DEADLINE: AtomicU64 = AtomicU64::new(u64::MAX);

    pub fn arm_timer(deadline: u64) {
        TIMER_DEADLINE.store(deadline, Ordering::SeqCst);
    }

    pub fn disarm_timer() {
        TIMER_DEADLINE.store(u64::MAX, Ordering::SeqCst);
    }

    #[cfg(test)]
    pub fn sfence_count() -> u64 {
        SFENCE_COUNT.load(Ordering::SeqCst)
    }

    #[cfg(test)]
    pub fn timer_deadline() -> u64 {
        TIMER_DEADLINE.load(Ordering::SeqCst)
    }
}

#[cfg(not(target_arch = "riscv64"))]
pub use stub::*;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn without_interrupts_restores_prior_state() {
        let satp_before = read_satp();
        without_interrupts(|| {
            // nested critical sections don't panic or deadlock
            without_interrupts(|| {});
        });
        assert_eq!(read_satp(), satp_before);
    }
}
