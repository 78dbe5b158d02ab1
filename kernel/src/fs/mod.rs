//! The KT filesystem (`spec.md` §4.6): mounted once per boot against a
//! block-device I/O object, with a root directory (no subdirectories) whose
//! entries are themselves ordinary file data of the root inode.

pub mod bitmap;
pub mod dir;
pub mod file;
pub mod inode;
pub mod layout;

pub use file::FileIo;

use alloc::boxed::Box;
use alloc::vec::Vec;

use spin::Mutex;

use crate::block::BlockCache;
use crate::config::FS_BLOCK_SIZE;
use crate::error::{KError, KResult};
use crate::io::{IoHandle, IoObject, Seekable};

use bitmap::{DataBitmap, InodeBitmap};
use layout::{Inode, Superblock, DENTRY_BYTES, INODE_BYTES};

/// Block-granularity geometry derived from the superblock at mount time.
#[derive(Clone, Copy)]
pub(crate) struct Geometry {
    pub bitmap_start: u64,
    pub inode_table_start: u64,
    pub data_start: u64,
    pub data_block_count: u64,
}

struct Mount {
    cache: BlockCache<IoHandle>,
    geometry: Geometry,
    superblock: Superblock,
    data_bitmap: DataBitmap,
    inode_bitmap: InodeBitmap,
    root_inode: Inode,
    open_files: Vec<u16>,
}

static MOUNT: Mutex<Option<Mount>> = Mutex::new(None);

fn with_mount<R>(f: impl FnOnce(&mut Mount) -> R) -> R {
    let mut guard = MOUNT.lock();
    f(guard.as_mut().expect("filesystem not mounted"))
}

/// Mount the filesystem image backed by `device`: read the superblock,
/// derive geometry, and rebuild the in-memory inode bitmap by marking the
/// root directory and every inode it references.
pub fn mount(device: IoHandle) -> KResult<()> {
    let cache = BlockCache::new(device);

    let mut sb_block = [0u8; FS_BLOCK_SIZE];
    cache.readat(0, &mut sb_block)?;
    let superblock = Superblock::decode(&sb_block);

    let geometry = Geometry {
        bitmap_start: 1,
        inode_table_start: 1 + superblock.bitmap_block_count as u64,
        data_start: 1 + superblock.bitmap_block_count as u64 + superblock.inode_block_count as u64,
        data_block_count: superblock.block_count as u64
            - 1
            - superblock.bitmap_block_count as u64
            - superblock.inode_block_count as u64,
    };
    let data_bitmap = DataBitmap::new(geometry.bitmap_start, geometry.data_block_count);

    let inode_capacity = superblock.inode_block_count as u64 * (FS_BLOCK_SIZE as u64 / INODE_BYTES as u64);
    let mut inode_bitmap = InodeBitmap::new(inode_capacity as usize);

    let root_inode = inode::read_inode(&cache, geometry.inode_table_start, superblock.root_directory_inode as u64)?;
    inode_bitmap.mark_used(superblock.root_directory_inode as usize);
    for i in 0..dir::entry_count(&root_inode) {
        let entry = dir::read_entry(&cache, &root_inode, i)?;
        inode_bitmap.mark_used(entry.inode as usize);
    }

    *MOUNT.lock() = Some(Mount { cache, geometry, superblock, data_bitmap, inode_bitmap, root_inode, open_files: Vec::new() });
    Ok(())
}

pub fn create(name: &str) -> KResult<()> {
    with_mount(|m| {
        let root_ino = m.superblock.root_directory_inode as u64;
        dir::create(&m.cache, &m.geometry, &m.data_bitmap, &mut m.inode_bitmap, m.geometry.inode_table_start, root_ino, &mut m.root_inode, name)?;
        m.cache.flush()
    })
}

pub fn open(name: &str) -> KResult<IoHandle> {
    with_mount(|m| {
        let (_, entry) = dir::find(&m.cache, &m.root_inode, name)?.ok_or(KError::NotFound)?;
        let file_inode = inode::read_inode(&m.cache, m.geometry.inode_table_start, entry.inode as u64)?;
        m.open_files.push(entry.inode);
        let file_io = FileIo::new(entry.inode, file_inode.size as u64);
        let seekable = Seekable::new(Box::new(IoObject::File(file_io)))?;
        Ok(IoHandle::new(IoObject::Seekable(seekable)))
    })
}

pub fn delete(name: &str) -> KResult<()> {
    with_mount(|m| {
        let (index, entry) = dir::find(&m.cache, &m.root_inode, name)?.ok_or(KError::NotFound)?;
        let root_ino = m.superblock.root_directory_inode as u64;

        let file_inode = inode::read_inode(&m.cache, m.geometry.inode_table_start, entry.inode as u64)?;
        free_all_blocks(&m.cache, &m.data_bitmap, &m.geometry, &file_inode)?;
        m.inode_bitmap.release(entry.inode as usize);

        let last_index = dir::entry_count(&m.root_inode) - 1;
        if index != last_index {
            let last_entry = dir::read_entry(&m.cache, &m.root_inode, last_index)?;
            dir::write_entry(&m.cache, &m.root_inode, index, &last_entry)?;
        }

        let old_size = m.root_inode.size;
        let new_size = old_size - DENTRY_BYTES as u32;
        if new_size % FS_BLOCK_SIZE as u32 == 0 {
            let freed_k = new_size as u64 / FS_BLOCK_SIZE as u64;
            let block_id = inode::data_blockat(&m.cache, &m.root_inode, freed_k)?;
            if block_id != 0 {
                m.data_bitmap.release(&m.cache, block_id as u64 - m.geometry.data_start)?;
            }
        }
        m.root_inode.size = new_size;
        inode::write_inode(&m.cache, m.geometry.inode_table_start, root_ino, &m.root_inode)?;

        m.open_files.retain(|&ino| ino != entry.inode);
        m.cache.flush()
    })
}

/// Grow a file to `new_len`, allocating every data block the new range
/// newly spans. A no-op if `new_len` does not grow the file.
pub fn extend(inode_no: u16, new_len: u64) -> KResult<()> {
    with_mount(|m| {
        let mut target = inode::read_inode(&m.cache, m.geometry.inode_table_start, inode_no as u64)?;
        if new_len == 0 || new_len <= target.size as u64 {
            return Ok(());
        }
        let old_blocks = blocks_for(target.size as u64);
        let new_blocks = blocks_for(new_len);
        target.size = new_len as u32;
        inode::write_inode(&m.cache, m.geometry.inode_table_start, inode_no as u64, &target)?;
        for k in old_blocks..new_blocks {
            inode::allocate_new_data_block(&m.cache, &m.data_bitmap, &m.geometry, m.geometry.inode_table_start, inode_no as u64, &mut target, k)?;
        }
        Ok(())
    })
}

pub(crate) fn close_file(inode_no: u16) {
    with_mount(|m| m.open_files.retain(|&ino| ino != inode_no));
}

pub fn free_data_block_count() -> KResult<u64> {
    with_mount(|m| m.data_bitmap.free_count(&m.cache))
}

pub fn free_inode_count() -> usize {
    with_mount(|m| m.inode_bitmap.free_count())
}

fn blocks_for(size: u64) -> u64 {
    (size + FS_BLOCK_SIZE as u64 - 1) / FS_BLOCK_SIZE as u64
}

/// Release every data, indirect, and double-indirect pointer block an
/// inode owns, walking logical indices from last to first so a pointer
/// block is freed only once nothing still referenced through it remains.
fn free_all_blocks(cache: &BlockCache<IoHandle>, data_bitmap: &DataBitmap, geometry: &Geometry, inode: &Inode) -> KResult<()> {
    use crate::config::PTRS_PER_BLOCK;

    let blocks = blocks_for(inode.size as u64);
    let span = (PTRS_PER_BLOCK * PTRS_PER_BLOCK) as u64;

    for k in (0..blocks).rev() {
        let block_id = inode::data_blockat(cache, inode, k)?;
        if block_id != 0 {
            data_bitmap.release(cache, block_id as u64 - geometry.data_start)?;
        }

        if k == 3 && inode.indirect != 0 {
            data_bitmap.release(cache, inode.indirect as u64 - geometry.data_start)?;
        }

        if k >= 3 + PTRS_PER_BLOCK as u64 {
            let raw_m = k - 3 - PTRS_PER_BLOCK as u64;
            let which = if raw_m < span { 0usize } else { 1usize };
            let local_m = if which == 0 { raw_m } else { raw_m - span };
            let dindirect = inode.dindirect[which];

            if local_m % PTRS_PER_BLOCK as u64 == 0 && dindirect != 0 {
                let indirect_block = inode::read_ptr(cache, dindirect as u64, local_m / PTRS_PER_BLOCK as u64)?;
                if indirect_block != 0 {
                    data_bitmap.release(cache, indirect_block as u64 - geometry.data_start)?;
                }
            }
            if raw_m % span == 0 && dindirect != 0 {
                data_bitmap.release(cache, dindirect as u64 - geometry.data_start)?;
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::{IoObject, MemIo};

    /// Builds a tiny image in memory matching `mkfs`'s byte layout: 1
    /// superblock block, `bitmap_blocks` bitmap blocks, `inode_blocks`
    /// inode-table blocks, the rest data, with an empty root directory at
    /// inode 0.
    fn build_image(total_blocks: u32, bitmap_blocks: u32, inode_blocks: u32) -> IoHandle {
        let device = IoHandle::new(IoObject::Mem(MemIo::new(total_blocks as usize * FS_BLOCK_SIZE)));
        let sb = Superblock { block_count: total_blocks, bitmap_block_count: bitmap_blocks, inode_block_count: inode_blocks, root_directory_inode: 0 };
        let mut sb_block = [0u8; FS_BLOCK_SIZE];
        sb.encode(&mut sb_block);
        device.writeat(0, &sb_block).unwrap();

        let root = Inode::default();
        let mut ino_buf = [0u8; INODE_BYTES];
        root.encode(&mut ino_buf);
        let inode_table_start = (1 + bitmap_blocks) as u64 * FS_BLOCK_SIZE as u64;
        device.writeat(inode_table_start, &ino_buf).unwrap();

        device
    }

    fn mounted(total_blocks: u32, bitmap_blocks: u32, inode_blocks: u32) {
        let device = build_image(total_blocks, bitmap_blocks, inode_blocks);
        mount(device).unwrap();
    }

    #[test]
    fn create_extend_write_read_round_trip() {
        mounted(64, 1, 4);
        create("file7").unwrap();
        let io = open("file7").unwrap();
        io.cntl(crate::io::CntlCmd::SetEnd(512 * 4)).unwrap();

        let payload: alloc::vec::Vec<u8> = (0..512 * 4).map(|i| (i % 256) as u8).collect();
        let written = io.write(&payload).unwrap();
        assert_eq!(written, payload.len());

        io.cntl(crate::io::CntlCmd::SetPos(0)).unwrap();
        let mut read_back = alloc::vec![0u8; payload.len()];
        let got = io.read(&mut read_back).unwrap();
        assert_eq!(got, payload.len());
        assert_eq!(read_back, payload);
    }

    #[test]
    fn delete_reclaims_inode_and_data_blocks() {
        mounted(64, 1, 4);
        let free_before = free_data_block_count().unwrap();
        let free_inodes_before = free_inode_count();

        create("temp").unwrap();
        let io = open("temp").unwrap();
        io.cntl(crate::io::CntlCmd::SetEnd(512)).unwrap();
        io.close();

        delete("temp").unwrap();
        assert_eq!(free_data_block_count().unwrap(), free_before);
        assert_eq!(free_inode_count(), free_inodes_before);
    }

    #[test]
    fn directory_stays_compact_after_interleaved_create_delete() {
        mounted(64, 1, 4);
        for i in 0..8 {
            create(&alloc::format!("file{i}")).unwrap();
        }
        delete("file3").unwrap();
        delete("file4").unwrap();

        let count = with_mount(|m| dir::entry_count(&m.root_inode));
        assert_eq!(count, 6);
        for i in 0..count {
            let name = with_mount(|m| dir::read_entry(&m.cache, &m.root_inode, i).unwrap().name_str().to_string());
            assert_ne!(name, "file3");
            assert_ne!(name, "file4");
        }
    }
}
