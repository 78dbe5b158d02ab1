//! Root-directory operations (`spec.md` §4.6). There are no subdirectories;
//! every entry names a file in the single root directory, whose entries are
//! stored as the root inode's ordinary file data.

use crate::block::BlockCache;
use crate::config::{FS_BLOCK_SIZE, MAX_NAME_LEN};
use crate::error::{KError, KResult};
use crate::io::IoHandle;

use super::bitmap::{DataBitmap, InodeBitmap};
use super::inode::{self, allocate_new_data_block};
use super::layout::{DirEntry, Inode, DENTRY_BYTES};
use super::Geometry;

pub fn entry_count(root: &Inode) -> usize {
    root.size as usize / DENTRY_BYTES
}

pub fn read_entry(cache: &BlockCache<IoHandle>, root: &Inode, index: usize) -> KResult<DirEntry> {
    let mut buf = [0u8; DENTRY_BYTES];
    inode::read_through(cache, root, (index * DENTRY_BYTES) as u64, &mut buf)?;
    Ok(DirEntry::decode(&buf))
}

pub(crate) fn write_entry(cache: &BlockCache<IoHandle>, root: &Inode, index: usize, entry: &DirEntry) -> KResult<()> {
    let mut buf = [0u8; DENTRY_BYTES];
    entry.encode(&mut buf);
    inode::write_through(cache, root, (index * DENTRY_BYTES) as u64, &buf)?;
    Ok(())
}

pub fn find(cache: &BlockCache<IoHandle>, root: &Inode, name: &str) -> KResult<Option<(usize, DirEntry)>> {
    for i in 0..entry_count(root) {
        let entry = read_entry(cache, root, i)?;
        if entry.name_str() == name {
            return Ok(Some((i, entry)));
        }
    }
    Ok(None)
}

/// Append a new entry for `name`, growing the root inode by one data block
/// whenever the new entry would start past the current last block.
#[allow(clippy::too_many_arguments)]
pub fn create(
    cache: &BlockCache<IoHandle>,
    geometry: &Geometry,
    data_bitmap: &DataBitmap,
    inode_bitmap: &mut InodeBitmap,
    inode_table_start: u64,
    root_ino: u64,
    root: &mut Inode,
    name: &str,
) -> KResult<u16> {
    if name.is_empty() || name.len() >= MAX_NAME_LEN {
        return Err(KError::Invalid);
    }
    if find(cache, root, name)?.is_some() {
        return Err(KError::Invalid);
    }

    let count = entry_count(root);
    let offset = (count * DENTRY_BYTES) as u64;
    if offset % FS_BLOCK_SIZE as u64 == 0 {
        let k = offset / FS_BLOCK_SIZE as u64;
        allocate_new_data_block(cache, data_bitmap, geometry, inode_table_start, root_ino, root, k)?;
    }

    let new_ino = inode_bitmap.alloc()? as u16;
    let entry = DirEntry::from_name(new_ino, name).ok_or(KError::Invalid)?;
    write_entry(cache, root, count, &entry)?;

    inode::write_inode(cache, inode_table_start, new_ino as u64, &Inode::default())?;

    root.size += DENTRY_BYTES as u32;
    inode::write_inode(cache, inode_table_start, root_ino, root)?;
    Ok(new_ino)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::{IoHandle, IoObject, MemIo};

    fn fixture() -> (BlockCache<IoHandle>, Geometry, DataBitmap, InodeBitmap, Inode) {
        let geometry = Geometry { bitmap_start: 0, inode_table_start: 1, data_start: 2, data_block_count: 32 };
        let cache = BlockCache::new(IoHandle::new(IoObject::Mem(MemIo::new(40 * FS_BLOCK_SIZE))));
        let data_bitmap = DataBitmap::new(geometry.bitmap_start, geometry.data_block_count);
        let inode_bitmap = InodeBitmap::new(16);
        (cache, geometry, data_bitmap, inode_bitmap, Inode::default())
    }

    #[test]
    fn create_appends_entries_findable_by_name() {
        let (cache, geometry, data_bitmap, mut inode_bitmap, mut root) = fixture();
        let a = create(&cache, &geometry, &data_bitmap, &mut inode_bitmap, geometry.inode_table_start, 0, &mut root, "alpha").unwrap();
        let b = create(&cache, &geometry, &data_bitmap, &mut inode_bitmap, geometry.inode_table_start, 0, &mut root, "beta").unwrap();
        assert_ne!(a, b);
        assert_eq!(entry_count(&root), 2);
        let (idx, entry) = find(&cache, &root, "beta").unwrap().unwrap();
        assert_eq!(idx, 1);
        assert_eq!(entry.inode, b);
    }

    #[test]
    fn duplicate_name_is_rejected() {
        let (cache, geometry, data_bitmap, mut inode_bitmap, mut root) = fixture();
        create(&cache, &geometry, &data_bitmap, &mut inode_bitmap, geometry.inode_table_start, 0, &mut root, "dup").unwrap();
        let err = create(&cache, &geometry, &data_bitmap, &mut inode_bitmap, geometry.inode_table_start, 0, &mut root, "dup");
        assert_eq!(err, Err(KError::Invalid));
    }

    #[test]
    fn overlong_name_is_rejected() {
        let (cache, geometry, data_bitmap, mut inode_bitmap, mut root) = fixture();
        let err = create(&cache, &geometry, &data_bitmap, &mut inode_bitmap, geometry.inode_table_start, 0, &mut root, "waytoolongofaname");
        assert_eq!(err, Err(KError::Invalid));
    }
}
