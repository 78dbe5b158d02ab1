//! Fd-table syscalls (`spec.md` §6: `devopen`, `fsopen`, `fscreate`,
//! `fsdelete`, `close`, `read`, `write`, `ioctl`, `pipe`, `iodup`).
//! Grounded on `ryanbreen-breenix/kernel/src/syscall/pipe.rs`/`fs.rs`'s
//! fd-allocation shape, generalized onto this kernel's `IoHandle`/`FdTable`
//! instead of a `FdKind` enum over stdio/pipe/socket.

use crate::error::{KError, KResult};
use crate::fs;
use crate::io::{self, CntlCmd, IoHandle, IoObject, NullIo};
use crate::process;

use super::userptr::{copy_from_user, copy_to_user, copy_user_cstr};

/// Open a named device instance into the fd table. Device drivers are an
/// external collaborator (`spec.md` §1); the only name this core-only tree
/// can actually back is `"null"`, standing in for the registry a real boot
/// build's driver init would populate (console, virtio-blk, virtio-rng).
pub fn sys_devopen(fd_hint: i64, name: u64, _instno: u64) -> KResult<i64> {
    let name = copy_user_cstr(name)?;
    let handle = match name.as_str() {
        "null" => IoHandle::new(IoObject::Null(NullIo)),
        _ => return Err(KError::NotFound),
    };
    install(fd_hint, handle)
}

pub fn sys_fsopen(fd_hint: i64, name: u64) -> KResult<i64> {
    let name = copy_user_cstr(name)?;
    let handle = fs::open(&name)?;
    install(fd_hint, handle)
}

pub fn sys_fscreate(name: u64) -> KResult<i64> {
    let name = copy_user_cstr(name)?;
    fs::create(&name)?;
    Ok(0)
}

pub fn sys_fsdelete(name: u64) -> KResult<i64> {
    let name = copy_user_cstr(name)?;
    fs::delete(&name)?;
    Ok(0)
}

pub fn sys_close(fd: u64) -> KResult<i64> {
    let handle = process::with_current_fds(|fds| fds.close(fd as usize)).ok_or(KError::BadFd)?;
    handle.close();
    Ok(0)
}

pub fn sys_read(fd: u64, buf: u64, n: u64) -> KResult<i64> {
    let handle = process::with_current_fds(|fds| fds.get(fd as usize).cloned()).ok_or(KError::BadFd)?;
    let mut kbuf = alloc::vec![0u8; n as usize];
    let got = handle.read(&mut kbuf)?;
    copy_to_user(buf, &kbuf[..got])?;
    Ok(got as i64)
}

pub fn sys_write(fd: u64, buf: u64, n: u64) -> KResult<i64> {
    let handle = process::with_current_fds(|fds| fds.get(fd as usize).cloned()).ok_or(KError::BadFd)?;
    let kbuf = copy_from_user(buf, n as usize)?;
    let written = handle.write(&kbuf)?;
    Ok(written as i64)
}

pub fn sys_ioctl(fd: u64, cmd: u64, arg: u64) -> KResult<i64> {
    let handle = process::with_current_fds(|fds| fds.get(fd as usize).cloned()).ok_or(KError::BadFd)?;
    let cmd = decode_cntl(cmd, arg)?;
    Ok(handle.cntl(cmd)? as i64)
}

fn decode_cntl(cmd: u64, arg: u64) -> KResult<CntlCmd> {
    Ok(match cmd {
        0 => CntlCmd::GetBlkSz,
        1 => CntlCmd::GetEnd,
        2 => CntlCmd::SetEnd(arg),
        3 => CntlCmd::GetPos,
        4 => CntlCmd::SetPos(arg),
        _ => return Err(KError::Invalid),
    })
}

/// `pipe`: create a pipe, install both ends, and write the fds back to
/// `*wfd`/`*rfd` in user memory.
pub fn sys_pipe(wfd_ptr: u64, rfd_ptr: u64) -> KResult<i64> {
    let (write_end, read_end) = io::create_pipe();
    let wfd = install(-1, write_end)?;
    let rfd = install(-1, read_end)?;
    copy_to_user(wfd_ptr, &(wfd as u64).to_le_bytes())?;
    copy_to_user(rfd_ptr, &(rfd as u64).to_le_bytes())?;
    Ok(0)
}

pub fn sys_iodup(oldfd: u64, newfd: i64) -> KResult<i64> {
    let handle = process::with_current_fds(|fds| fds.get(oldfd as usize).cloned()).ok_or(KError::BadFd)?;
    install(newfd, handle)
}

fn install(hint: i64, handle: IoHandle) -> KResult<i64> {
    process::with_current_fds(|fds| fds.alloc(hint as isize, handle)).map(|fd| fd as i64).ok_or(KError::TooManyFiles)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_cntl_maps_every_defined_command() {
        assert_eq!(decode_cntl(0, 0).unwrap(), CntlCmd::GetBlkSz);
        assert_eq!(decode_cntl(2, 99).unwrap(), CntlCmd::SetEnd(99));
        assert_eq!(decode_cntl(4, 7).unwrap(), CntlCmd::SetPos(7));
        assert_eq!(decode_cntl(99, 0), Err(KError::Invalid));
    }
}
