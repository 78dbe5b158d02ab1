//! On-disk layout structs for the KT filesystem (`spec.md` §3, §6).
//!
//! Fields are encoded/decoded through explicit little-endian byte slices
//! rather than `#[repr(packed)]` field access, avoiding the unaligned-
//! reference UB that comes with taking `&` to a packed field — the safe
//! equivalent of `ryanbreen-breenix/kernel/src/fs/ext2/inode.rs`'s manual
//! on-disk struct parsing.

use crate::config::{FS_BLOCK_SIZE, MAX_NAME_LEN, PTRS_PER_BLOCK};

pub const SUPERBLOCK_BYTES: usize = 14;
pub const INODE_BYTES: usize = 32;
pub const DENTRY_BYTES: usize = 16;

const _: () = assert!(PTRS_PER_BLOCK == FS_BLOCK_SIZE / 4);
const _: () = assert!(DENTRY_BYTES == 2 + MAX_NAME_LEN);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
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

    pub fn decode(block: &[u8; FS_BLOCK_SIZE]) -> Self {
        Self {
            block_count: u32::from_le_bytes(block[0..4].try_into().unwrap()),
            bitmap_block_count: u32::from_le_bytes(block[4..8].try_into().unwrap()),
            inode_block_count: u32::from_le_bytes(block[8..12].try_into().unwrap()),
            root_directory_inode: u16::from_le_bytes(block[12..14].try_into().unwrap()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
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

    pub fn decode(buf: &[u8; INODE_BYTES]) -> Self {
        Self {
            size: u32::from_le_bytes(buf[0..4].try_into().unwrap()),
            flags: u32::from_le_bytes(buf[4..8].try_into().unwrap()),
            block: [
                u32::from_le_bytes(buf[8..12].try_into().unwrap()),
                u32::from_le_bytes(buf[12..16].try_into().unwrap()),
                u32::from_le_bytes(buf[16..20].try_into().unwrap()),
            ],
            indirect: u32::from_le_bytes(buf[20..24].try_into().unwrap()),
            dindirect: [
                u32::from_le_bytes(buf[24..28].try_into().unwrap()),
                u32::from_le_bytes(buf[28..32].try_into().unwrap()),
            ],
        }
    }
}

/// A 16-byte directory entry: a 2-byte inode number and a 14-byte
/// null-terminated name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DirEntry {
    pub inode: u16,
    name: [u8; MAX_NAME_LEN],
}

impl DirEntry {
    pub fn from_name(inode: u16, name: &str) -> Option<Self> {
        let bytes = name.as_bytes();
        if bytes.is_empty() || bytes.len() >= MAX_NAME_LEN {
            return None;
        }
        let mut arr = [0u8; MAX_NAME_LEN];
        arr[..bytes.len()].copy_from_slice(bytes);
        Some(Self { inode, name: arr })
    }

    pub fn name_str(&self) -> &str {
        let end = self.name.iter().position(|&b| b == 0).unwrap_or(MAX_NAME_LEN);
        core::str::from_utf8(&self.name[..end]).unwrap_or("")
    }

    pub fn encode(&self, buf: &mut [u8; DENTRY_BYTES]) {
        buf[0..2].copy_from_slice(&self.inode.to_le_bytes());
        buf[2..2 + MAX_NAME_LEN].copy_from_slice(&self.name);
    }

    pub fn decode(buf: &[u8; DENTRY_BYTES]) -> Self {
        let mut name = [0u8; MAX_NAME_LEN];
        name.copy_from_slice(&buf[2..2 + MAX_NAME_LEN]);
        Self { inode: u16::from_le_bytes(buf[0..2].try_into().unwrap()), name }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn superblock_round_trips_through_a_block() {
        let sb = Superblock { block_count: 65536, bitmap_block_count: 16, inode_block_count: 64, root_directory_inode: 0 };
        let mut block = [0u8; FS_BLOCK_SIZE];
        sb.encode(&mut block);
        assert_eq!(Superblock::decode(&block), sb);
    }

    #[test]
    fn inode_round_trips_through_its_bytes() {
        let ino = Inode { size: 12345, flags: 0, block: [1, 2, 3], indirect: 4, dindirect: [5, 6] };
        let mut buf = [0u8; INODE_BYTES];
        ino.encode(&mut buf);
        assert_eq!(Inode::decode(&buf), ino);
    }

    #[test]
    fn dentry_name_round_trips_and_rejects_overlong() {
        let e = DirEntry::from_name(7, "file7").unwrap();
        let mut buf = [0u8; DENTRY_BYTES];
        e.encode(&mut buf);
        let back = DirEntry::decode(&buf);
        assert_eq!(back.inode, 7);
        assert_eq!(back.name_str(), "file7");
        assert!(DirEntry::from_name(1, "thisnameiswaytoolong").is_none());
    }
}
