//! On-disk byte layout for the filesystem image, mirroring
//! `kt-kernel`'s `fs::layout`/`fs::inode`/`fs::bitmap` encoding exactly so an
//! image this tool writes mounts cleanly.
//!
//! Duplicated rather than linked against `kt-kernel`: that crate is
//! `no_std` and boots its own `#[global_allocator]` against a mapped kernel
//! heap (see `kernel/src/memory/heap.rs`), which this host-side tool has no
//! equivalent for. The struct shapes and block-addressing arithmetic below
//! are copied from `kernel/src/fs/{layout,inode,bitmap}.rs` byte for byte.

use anyhow::{bail, Result};

pub const FS_BLOCK_SIZE: usize = 512;
pub const PTRS_PER_BLOCK: usize = FS_BLOCK_SIZE / 4;
pub const MAX_NAME_LEN: usize = 14;

pub const INODE_BYTES: usize = 32;
pub const DENTRY_BYTES: usize = 16;
pub const INODES_PER_BLOCK: usize = FS_BLOCK_SIZE / INODE_BYTES;

pub const ROOT_INODE: u16 = 0;

#[derive(Debug, Clone, Copy, Default)]
pub struct Superblock {
    pub block_count: u32,
    pub bitmap_block_count: u32,
    pub inode_block_count: u32,
    pub root_directory_inode: u16,
}

impl Superblock {
    pub fn encode(&self, block: &mut [u8; FS_BLOCK_SIZE]) {
        block[0..4].copy_from_slice(&self.block_count.to_le_bytes());
        block[4..8].copy_from_slice(&self.bitmap_block_count.to_le_bytes());
        block[8..12].copy_from_slice(&self.inode_block_count.to_le_bytes());
        block[12..14].copy_from_slice(&self.root_directory_inode.to_le_bytes());
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Inode {
    pub size: u32,
    pub flags: u32,
    pub block: [u32; 3],
    pub indirect: u32,
    pub dindirect: [u32; 2],
}

impl Inode {
    pub fn encode(&self, buf: &mut [u8; INODE_BYTES]) {
        buf[0..4].copy_from_slice(&self.size.to_le_bytes());
        buf[4..8].copy_from_slice(&self.flags.to_le_bytes());
        for i in 0..3 {
            buf[8 + i * 4..12 + i * 4].copy_from_slice(&self.block[i].to_le_bytes());
        }
        buf[20..24].copy_from_slice(&self.indirect.to_le_bytes());
        buf[24..28].copy_from_slice(&self.dindirect[0].to_le_bytes());
        buf[28..32].copy_from_slice(&self.dindirect[1].to_le_bytes());
    }
}

pub struct DirEntry {
    pub inode: u16,
    name: [u8; MAX_NAME_LEN],
}

impl DirEntry {
    pub fn from_name(inode: u16, name: &str) -> Result<Self> {
        let bytes = name.as_bytes();
        if bytes.is_empty() || bytes.len() >= MAX_NAME_LEN {
            bail!("'{name}' does not fit in a {MAX_NAME_LEN}-byte dentry name field");
        }
        let mut arr = [0u8; MAX_NAME_LEN];
        arr[..bytes.len()].copy_from_slice(bytes);
        Ok(Self { inode, name: arr })
    }

    pub fn encode(&self, buf: &mut [u8; DENTRY_BYTES]) {
        buf[0..2].copy_from_slice(&self.inode.to_le_bytes());
        buf[2..2 + MAX_NAME_LEN].copy_from_slice(&self.name);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overlong_name_is_rejected() {
        assert!(DirEntry::from_name(1, "thisnameiswaytoolong").is_err());
    }

    #[test]
    fn dentry_is_sixteen_bytes() {
        let e = DirEntry::from_name(7, "readme").unwrap();
        let mut buf = [0u8; DENTRY_BYTES];
        e.encode(&mut buf);
        assert_eq!(&buf[0..2], &7u16.to_le_bytes());
        assert_eq!(&buf[2..8], b"readme");
        assert!(buf[8..].iter().all(|&b| b == 0));
    }
}
