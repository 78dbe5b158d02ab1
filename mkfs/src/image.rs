//! Filesystem image builder.
//!
//! Builds the byte image directly in memory, following the same block
//! addressing scheme as `kernel::fs::inode` (direct/indirect/double-indirect
//! pointers) and the same first-clear-bit bitmap scan as
//! `kernel::fs::bitmap::DataBitmap`, just against a flat `Vec<u8>` instead of
//! a block cache over an `IoObject`.

use anyhow::{bail, Result};

use crate::layout::{DirEntry, Inode, Superblock, DENTRY_BYTES, FS_BLOCK_SIZE, INODES_PER_BLOCK, INODE_BYTES, PTRS_PER_BLOCK, ROOT_INODE};

pub struct Image {
    buf: Vec<u8>,
    total_blocks: u32,
    bitmap_start: u64,
    bitmap_block_count: u32,
    inode_table_start: u64,
    inode_block_count: u32,
    data_start: u64,
    data_block_count: u64,
    next_inode: u16,
    inode_capacity: u16,
    root: Inode,
}

fn blocks_for(size: u64) -> u64 {
    (size + FS_BLOCK_SIZE as u64 - 1) / FS_BLOCK_SIZE as u64
}

impl Image {
    pub fn new(total_blocks: u32, inode_count: u32) -> Result<Self> {
        if total_blocks < 4 {
            bail!("image is too small to hold a superblock, bitmap, inode table, and any data");
        }
        let bitmap_block_count = ((total_blocks as u64 + FS_BLOCK_SIZE as u64 * 8 - 1) / (FS_BLOCK_SIZE as u64 * 8)) as u32;
        let inode_capacity = inode_count.max(1);
        let inode_block_count = ((inode_capacity as u64 + INODES_PER_BLOCK as u64 - 1) / INODES_PER_BLOCK as u64) as u32;

        let reserved = 1 + bitmap_block_count as u64 + inode_block_count as u64;
        if reserved >= total_blocks as u64 {
            bail!("image is too small for {inode_capacity} inodes: only {reserved} blocks of metadata would leave no room for data");
        }
        let data_block_count = total_blocks as u64 - reserved;
        if inode_capacity > u16::MAX as u32 {
            bail!("inode count {inode_capacity} exceeds the 16-bit inode number space");
        }

        let buf = vec![0u8; total_blocks as usize * FS_BLOCK_SIZE];
        Ok(Self {
            buf,
            total_blocks,
            bitmap_start: 1,
            bitmap_block_count,
            inode_table_start: 1 + bitmap_block_count as u64,
            inode_block_count,
            data_start: reserved,
            data_block_count,
            next_inode: 1,
            inode_capacity: inode_capacity as u16,
            root: Inode::default(),
        })
    }

    fn bitmap_byte_addr(&self, byte_idx: u64) -> u64 {
        self.bitmap_start * FS_BLOCK_SIZE as u64 + byte_idx
    }

    fn alloc_data_block(&mut self) -> Result<u32> {
        let byte_count = (self.data_block_count + 7) / 8;
        for byte_idx in 0..byte_count {
            let addr = self.bitmap_byte_addr(byte_idx) as usize;
            let byte = self.buf[addr];
            if byte == 0xFF {
                continue;
            }
            for bit in 0..8u64 {
                let n = byte_idx * 8 + bit;
                if n >= self.data_block_count {
                    break;
                }
                if byte & (1 << bit) == 0 {
                    self.buf[addr] |= 1 << bit;
                    return Ok(self.data_start as u32 + n as u32);
                }
            }
        }
        bail!("filesystem image ran out of data blocks")
    }

    fn read_ptr(&self, block: u64, slot: u64) -> u32 {
        let addr = (block * FS_BLOCK_SIZE as u64 + slot * 4) as usize;
        u32::from_le_bytes(self.buf[addr..addr + 4].try_into().unwrap())
    }

    fn write_ptr(&mut self, block: u64, slot: u64, value: u32) {
        let addr = (block * FS_BLOCK_SIZE as u64 + slot * 4) as usize;
        self.buf[addr..addr + 4].copy_from_slice(&value.to_le_bytes());
    }

    fn data_blockat(&self, inode: &Inode, k: u64) -> u32 {
        if k < 3 {
            return inode.block[k as usize];
        }
        if k - 3 < PTRS_PER_BLOCK as u64 {
            return self.read_ptr(inode.indirect as u64, k - 3);
        }
        let span = (PTRS_PER_BLOCK * PTRS_PER_BLOCK) as u64;
        let raw_m = k - 3 - PTRS_PER_BLOCK as u64;
        let (dindirect, local_m) = if raw_m < span { (inode.dindirect[0], raw_m) } else { (inode.dindirect[1], raw_m - span) };
        let indirect_block = self.read_ptr(dindirect as u64, local_m / PTRS_PER_BLOCK as u64);
        self.read_ptr(indirect_block as u64, local_m % PTRS_PER_BLOCK as u64)
    }

    /// Allocate the data block backing logical index `k`, allocating any
    /// indirect or double-indirect pointer block the first time it is
    /// touched. Mirrors `kernel::fs::inode::allocate_new_data_block`, minus
    /// the per-step inode persistence that tree does for crash safety — this
    /// tool writes the inode once, after every block it owns is in place.
    fn allocate_new_data_block(&mut self, inode: &mut Inode, k: u64) -> Result<u32> {
        if k < 3 {
            let blk = self.alloc_data_block()?;
            inode.block[k as usize] = blk;
            return Ok(blk);
        }

        if k - 3 < PTRS_PER_BLOCK as u64 {
            if k == 3 {
                inode.indirect = self.alloc_data_block()?;
            }
            let blk = self.alloc_data_block()?;
            self.write_ptr(inode.indirect as u64, k - 3, blk);
            return Ok(blk);
        }

        let span = (PTRS_PER_BLOCK * PTRS_PER_BLOCK) as u64;
        let raw_m = k - 3 - PTRS_PER_BLOCK as u64;
        let which = if raw_m < span { 0usize } else { 1usize };
        let local_m = if which == 0 { raw_m } else { raw_m - span };

        if raw_m % span == 0 {
            inode.dindirect[which] = self.alloc_data_block()?;
        }
        let dindirect = inode.dindirect[which];
        if local_m % PTRS_PER_BLOCK as u64 == 0 {
            let new_ind = self.alloc_data_block()?;
            self.write_ptr(dindirect as u64, local_m / PTRS_PER_BLOCK as u64, new_ind);
        }
        let indirect_block = self.read_ptr(dindirect as u64, local_m / PTRS_PER_BLOCK as u64);
        let blk = self.alloc_data_block()?;
        self.write_ptr(indirect_block as u64, local_m % PTRS_PER_BLOCK as u64, blk);
        Ok(blk)
    }

    /// Grow `inode` by appending `data` at its current size, allocating
    /// every newly needed block along the way.
    fn append_bytes(&mut self, inode: &mut Inode, data: &[u8]) -> Result<()> {
        let old_size = inode.size as u64;
        let new_size = old_size + data.len() as u64;
        let old_blocks = blocks_for(old_size);
        let new_blocks = blocks_for(new_size);
        for k in old_blocks..new_blocks {
            self.allocate_new_data_block(inode, k)?;
        }
        inode.size = new_size as u32;

        let mut done = 0usize;
        while done < data.len() {
            let abs = old_size + done as u64;
            let k = abs / FS_BLOCK_SIZE as u64;
            let off = (abs % FS_BLOCK_SIZE as u64) as usize;
            let block_id = self.data_blockat(inode, k);
            let chunk = (data.len() - done).min(FS_BLOCK_SIZE - off);
            let addr = block_id as u64 * FS_BLOCK_SIZE as u64 + off as u64;
            self.buf[addr as usize..addr as usize + chunk].copy_from_slice(&data[done..done + chunk]);
            done += chunk;
        }
        Ok(())
    }

    fn write_inode(&mut self, ino: u16, inode: &Inode) {
        let addr = (self.inode_table_start * FS_BLOCK_SIZE as u64 + ino as u64 * INODE_BYTES as u64) as usize;
        let mut encoded = [0u8; INODE_BYTES];
        inode.encode(&mut encoded);
        self.buf[addr..addr + INODE_BYTES].copy_from_slice(&encoded);
    }

    /// Allocate a new inode, fill it with `contents`, and append a root
    /// directory entry naming it.
    pub fn add_file(&mut self, name: &str, contents: &[u8]) -> Result<()> {
        if self.next_inode >= self.inode_capacity {
            bail!("inode table has no free slots for '{name}'");
        }
        let ino = self.next_inode;
        self.next_inode += 1;

        let mut file_inode = Inode::default();
        self.append_bytes(&mut file_inode, contents)?;
        self.write_inode(ino, &file_inode);

        let entry = DirEntry::from_name(ino, name)?;
        let mut encoded = [0u8; DENTRY_BYTES];
        entry.encode(&mut encoded);
        let mut root = self.root;
        self.append_bytes(&mut root, &encoded)?;
        self.root = root;
        Ok(())
    }

    /// Persist the root inode and superblock, and return the finished image.
    pub fn finish(mut self) -> Vec<u8> {
        let root = self.root;
        self.write_inode(ROOT_INODE, &root);

        let sb = Superblock {
            block_count: self.total_blocks,
            bitmap_block_count: self.bitmap_block_count,
            inode_block_count: self.inode_block_count,
            root_directory_inode: ROOT_INODE,
        };
        let mut sb_block = [0u8; FS_BLOCK_SIZE];
        sb.encode(&mut sb_block);
        self.buf[0..FS_BLOCK_SIZE].copy_from_slice(&sb_block);
        self.buf
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn small_file_lands_in_a_direct_block() {
        let mut image = Image::new(64, 16).unwrap();
        image.add_file("hello", b"hello, world").unwrap();
        let buf = image.finish();

        let inode_table_start = (1 + 1) * FS_BLOCK_SIZE;
        let ino1_addr = inode_table_start + INODE_BYTES;
        let block = u32::from_le_bytes(buf[ino1_addr + 8..ino1_addr + 12].try_into().unwrap());
        assert_ne!(block, 0);
        let data_addr = block as usize * FS_BLOCK_SIZE;
        assert_eq!(&buf[data_addr..data_addr + 12], b"hello, world");
    }

    #[test]
    fn file_spanning_the_indirect_block_is_reachable() {
        let mut image = Image::new(600, 8).unwrap();
        let payload: Vec<u8> = (0..FS_BLOCK_SIZE * 5).map(|i| (i % 251) as u8).collect();
        image.add_file("big", &payload).unwrap();
        let buf = image.finish();

        let inode_table_start = (1 + 1) * FS_BLOCK_SIZE;
        let ino1_addr = inode_table_start + INODE_BYTES;
        let size = u32::from_le_bytes(buf[ino1_addr..ino1_addr + 4].try_into().unwrap());
        assert_eq!(size as usize, payload.len());
        let indirect = u32::from_le_bytes(buf[ino1_addr + 20..ino1_addr + 24].try_into().unwrap());
        assert_ne!(indirect, 0);
    }

    #[test]
    fn inode_table_exhaustion_is_reported() {
        let mut image = Image::new(64, 2).unwrap();
        image.add_file("a", b"x").unwrap();
        let err = image.add_file("b", b"y");
        assert!(err.is_err());
    }

    #[test]
    fn duplicate_names_are_not_rejected_by_the_image_builder() {
        // mkfs trusts its input file list; name collisions are a caller
        // error surfaced as two dentries sharing a name, not a panic.
        let mut image = Image::new(64, 16).unwrap();
        image.add_file("dup", b"one").unwrap();
        image.add_file("dup", b"two").unwrap();
        let buf = image.finish();
        assert!(!buf.is_empty());
    }
}
