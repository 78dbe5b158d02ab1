//! Fixed-capacity clock-replacement block cache (`spec.md` §4.5).
//!
//! Every slot's lock is collapsed into the single `Mutex<Inner>` guarding the
//! whole cache, the same whole-structure-lock simplification the physical
//! page pool and scheduler use for their free/ready lists — no call ever
//! holds a slot open across a suspension point, so a slot-granular lock
//! buys nothing here. `get_block`/`release_block` from `spec.md` are folded
//! into `readat`/`writeat`/`flush`, which acquire, use, and release a slot
//! within one call.

use alloc::vec::Vec;

use spin::Mutex;

use crate::config::{CACHE_CAPACITY, FS_BLOCK_SIZE};
use crate::error::KResult;

use super::BlockDevice;

struct Slot {
    block_id: Option<u64>,
    used: bool,
    dirty: bool,
    data: [u8; FS_BLOCK_SIZE],
}

impl Slot {
    const fn empty() -> Self {
        Self { block_id: None, used: false, dirty: false, data: [0u8; FS_BLOCK_SIZE] }
    }
}

struct Inner {
    slots: Vec<Slot>,
    hand: usize,
    last_read: usize,
}

pub struct BlockCache<D: BlockDevice> {
    backing: D,
    inner: Mutex<Inner>,
}

impl<D: BlockDevice> BlockCache<D> {
    pub fn new(backing: D) -> Self {
        let slots = (0..CACHE_CAPACITY).map(|_| Slot::empty()).collect();
        Self { backing, inner: Mutex::new(Inner { slots, hand: 0, last_read: 0 }) }
    }

    /// Find the slot for `block_id`, evicting and loading via the clock hand
    /// if it isn't resident. Writes back the victim first if it was dirty.
    fn locate(&self, inner: &mut Inner, block_id: u64) -> KResult<usize> {
        if let Some(idx) = inner.slots.iter().position(|s| s.block_id == Some(block_id)) {
            inner.slots[idx].used = true;
            return Ok(idx);
        }
        loop {
            let idx = inner.hand;
            inner.hand = (inner.hand + 1) % inner.slots.len();
            if inner.slots[idx].used {
                inner.slots[idx].used = false;
                continue;
            }
            if inner.slots[idx].dirty {
                let victim_id = inner.slots[idx].block_id.expect("dirty slot has no block id");
                let data = inner.slots[idx].data;
                self.backing.writeat(victim_id * FS_BLOCK_SIZE as u64, &data)?;
            }
            let mut data = [0u8; FS_BLOCK_SIZE];
            self.backing.readat(block_id * FS_BLOCK_SIZE as u64, &mut data)?;
            inner.slots[idx] = Slot { block_id: Some(block_id), used: true, dirty: false, data };
            return Ok(idx);
        }
    }

    /// Copy at most one block's worth of bytes starting at `pos`.
    pub fn readat(&self, pos: u64, buf: &mut [u8]) -> KResult<usize> {
        let block_id = pos / FS_BLOCK_SIZE as u64;
        let offset = (pos % FS_BLOCK_SIZE as u64) as usize;
        let mut inner = self.inner.lock();
        let idx = self.locate(&mut inner, block_id)?;
        let n = buf.len().min(FS_BLOCK_SIZE - offset);
        buf[..n].copy_from_slice(&inner.slots[idx].data[offset..offset + n]);
        inner.last_read = idx;
        Ok(n)
    }

    /// Copy at most one block's worth of bytes into the cache, marking the
    /// slot dirty. Written data is not durable until [`Self::flush`].
    pub fn writeat(&self, pos: u64, buf: &[u8]) -> KResult<usize> {
        let block_id = pos / FS_BLOCK_SIZE as u64;
        let offset = (pos % FS_BLOCK_SIZE as u64) as usize;
        let mut inner = self.inner.lock();
        let idx = self.locate(&mut inner, block_id)?;
        let n = buf.len().min(FS_BLOCK_SIZE - offset);
        inner.slots[idx].data[offset..offset + n].copy_from_slice(&buf[..n]);
        inner.slots[idx].dirty = true;
        Ok(n)
    }

    /// Write every dirty slot back to the backing device.
    pub fn flush(&self) -> KResult<()> {
        let mut inner = self.inner.lock();
        for slot in inner.slots.iter_mut() {
            if slot.dirty {
                let block_id = slot.block_id.expect("dirty slot has no block id");
                self.backing.writeat(block_id * FS_BLOCK_SIZE as u64, &slot.data)?;
                slot.dirty = false;
            }
        }
        Ok(())
    }

    #[cfg(test)]
    fn last_read_slot(&self) -> usize {
        self.inner.lock().last_read
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::{IoHandle, IoObject, MemIo};

    fn fixture(blocks: usize) -> BlockCache<IoHandle> {
        let backing = IoHandle::new(IoObject::Mem(MemIo::new(blocks * FS_BLOCK_SIZE)));
        BlockCache::new(backing)
    }

    #[test]
    fn write_then_read_same_block_without_eviction() {
        let cache = fixture(4);
        cache.writeat(5, &[9, 9, 9]).unwrap();
        let mut buf = [0u8; 3];
        cache.readat(5, &mut buf).unwrap();
        assert_eq!(buf, [9, 9, 9]);
        assert_eq!(cache.last_read_slot(), 0);
    }

    #[test]
    fn flush_clears_dirty_and_persists_to_backing() {
        let backing = IoHandle::new(IoObject::Mem(MemIo::new(FS_BLOCK_SIZE)));
        let cache = BlockCache::new(backing.clone());
        cache.writeat(0, &[42u8; 4]).unwrap();
        cache.flush().unwrap();

        let mut raw = [0u8; 4];
        backing.readat(0, &mut raw).unwrap();
        assert_eq!(raw, [42u8; 4]);

        let inner = cache.inner.lock();
        assert!(inner.slots.iter().all(|s| !s.dirty));
    }

    #[test]
    fn eviction_writes_back_dirty_victim_before_reuse() {
        let blocks = CACHE_CAPACITY + 1;
        let backing = IoHandle::new(IoObject::Mem(MemIo::new(blocks * FS_BLOCK_SIZE)));
        let cache = BlockCache::new(backing.clone());
        for i in 0..blocks {
            cache.writeat(i as u64 * FS_BLOCK_SIZE as u64, &[i as u8]).unwrap();
        }
        // Block 0's slot was evicted (and written back) to make room for
        // the (CACHE_CAPACITY + 1)th block, without an explicit flush.
        let mut raw = [0u8; 1];
        backing.readat(0, &mut raw).unwrap();
        assert_eq!(raw[0], 0);
    }
}
