//! Physical Page Pool (`spec.md` §4.1): owns every page of RAM outside the
//! kernel image and heap, and hands out contiguous, page-aligned runs.
//!
//! The free list is kept as an address-ordered `Vec<PageChunk>` rather than
//! the spec's singly-linked chunks — the same shape
//! `ryanbreen-breenix/kernel/src/memory/frame_allocator.rs` uses for its
//! `FREE_FRAMES` list — which gives the same ordering/coalescing invariants
//! with simpler split/merge code.

use alloc::vec::Vec;
use spin::Mutex;

use crate::arch::without_interrupts;
use crate::config::PAGE_SIZE;

/// A contiguous run of free, page-aligned physical memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct PageChunk {
    start: u64,
    pagecnt: u64,
}

struct FreeList {
    chunks: Vec<PageChunk>,
}

impl FreeList {
    fn alloc(&mut self, n: u64) -> Option<u64> {
        let (idx, chunk) = self
            .chunks
            .iter()
            .enumerate()
            .filter(|(_, c)| c.pagecnt >= n)
            .min_by_key(|(_, c)| c.pagecnt)
            .map(|(i, c)| (i, *c))?;

        if chunk.pagecnt == n {
            self.chunks.remove(idx);
            Some(chunk.start)
        } else {
            // Return the upper `n` pages; the low part keeps its address,
            // so the list stays sorted without re-insertion.
            let base = chunk.start + (chunk.pagecnt - n) * PAGE_SIZE as u64;
            self.chunks[idx].pagecnt -= n;
            Some(base)
        }
    }

    fn free(&mut self, p: u64, n: u64) {
        debug_assert_eq!(p % PAGE_SIZE as u64, 0, "free_pages: unaligned base");
        let end = p + n * PAGE_SIZE as u64;

        let idx = self
            .chunks
            .partition_point(|c| c.start < p);

        let merge_prev = idx > 0 && self.chunks[idx - 1].start + self.chunks[idx - 1].pagecnt * PAGE_SIZE as u64 == p;
        let merge_next = idx < self.chunks.len() && self.chunks[idx].start == end;

        match (merge_prev, merge_next) {
            (true, true) => {
                let next_pagecnt = self.chunks[idx].pagecnt;
                self.chunks[idx - 1].pagecnt += n + next_pagecnt;
                self.chunks.remove(idx);
            }
            (true, false) => {
                self.chunks[idx - 1].pagecnt += n;
            }
            (false, true) => {
                self.chunks[idx].start = p;
                self.chunks[idx].pagecnt += n;
            }
            (false, false) => {
                self.chunks.insert(idx, PageChunk { start: p, pagecnt: n });
            }
        }
    }

    fn free_page_count(&self) -> u64 {
        self.chunks.iter().map(|c| c.pagecnt).sum()
    }

    fn largest_chunk_pages(&self) -> u64 {
        self.chunks.iter().map(|c| c.pagecnt).max().unwrap_or(0)
    }
}

static FREE_LIST: Mutex<Option<FreeList>> = Mutex::new(None);

/// Seed the pool with a single chunk spanning `[start, start + pagecnt * PAGE_SIZE)`.
/// Called once at boot after the kernel image and heap have been carved out.
pub fn init(start: u64, pagecnt: u64) {
    let mut guard = FREE_LIST.lock();
    *guard = Some(FreeList {
        chunks: alloc::vec![PageChunk { start, pagecnt }],
    });
}

/// Allocate `n` contiguous, page-aligned physical pages.
///
/// # Panics
/// Panics if no chunk of at least `n` pages exists — the pool is exhausted
/// and, per `spec.md` §7, that is a fatal condition, not a recoverable error.
pub fn alloc_pages(n: u64) -> u64 {
    without_interrupts(|| {
        let mut guard = FREE_LIST.lock();
        let list = guard.as_mut().expect("ppp::init not called");
        list.alloc(n).expect("physical page pool exhausted")
    })
}

/// Return `n` pages starting at `p` (must be page-aligned) to the pool.
pub fn free_pages(p: u64, n: u64) {
    without_interrupts(|| {
        let mut guard = FREE_LIST.lock();
        let list = guard.as_mut().expect("ppp::init not called");
        list.free(p, n);
    });
}

/// Total number of free pages across every chunk.
pub fn free_page_count() -> u64 {
    without_interrupts(|| {
        FREE_LIST.lock().as_ref().map(FreeList::free_page_count).unwrap_or(0)
    })
}

/// Diagnostics snapshot, not part of `spec.md`'s operation set.
#[derive(Debug, Clone, Copy)]
pub struct PppStats {
    pub total_free_pages: u64,
    pub largest_chunk_pages: u64,
}

pub fn stats() -> PppStats {
    without_interrupts(|| {
        let guard = FREE_LIST.lock();
        match guard.as_ref() {
            Some(list) => PppStats {
                total_free_pages: list.free_page_count(),
                largest_chunk_pages: list.largest_chunk_pages(),
            },
            None => PppStats { total_free_pages: 0, largest_chunk_pages: 0 },
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reset(pagecnt: u64) {
        init(0, pagecnt);
    }

    #[test]
    fn alloc_free_round_trip_restores_single_chunk() {
        reset(100);
        let a = alloc_pages(1);
        let b = alloc_pages(2);
        let c = alloc_pages(10);
        free_pages(b, 2);
        free_pages(a, 1);
        free_pages(c, 10);
        assert_eq!(free_page_count(), 100);
        let s = stats();
        assert_eq!(s.total_free_pages, 100);
        assert_eq!(s.largest_chunk_pages, 100);
    }

    #[test]
    fn split_keeps_low_part_at_original_address() {
        reset(10);
        let p = alloc_pages(4);
        // the chunk was [0,10); allocating 4 returns the upper 4 pages
        assert_eq!(p, 6 * PAGE_SIZE as u64);
        assert_eq!(free_page_count(), 6);
    }

    #[test]
    fn free_coalesces_adjacent_chunks() {
        reset(10);
        let a = alloc_pages(3);
        let b = alloc_pages(3);
        free_pages(a, 3);
        free_pages(b, 3);
        assert_eq!(stats().largest_chunk_pages, free_page_count());
    }

    #[test]
    #[should_panic(expected = "exhausted")]
    fn alloc_past_capacity_panics() {
        reset(1);
        alloc_pages(2);
    }
}
