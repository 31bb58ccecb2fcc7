//! The `mmap(2)` family.
use core::ffi::{c_int, c_void};
use core::sync::atomic::{AtomicUsize, Ordering};
use std::ffi::CString;
use std::os::unix::ffi::OsStrExt;
use std::path::Path;

use crate::{AccessFlags, Advice, Error, Provider, Region};

/// Mapping through the POSIX `mmap` interface of `libc`.
pub struct Posix;

fn check(ret: c_int) -> Result<(), Error> {
    if ret == -1 {
        Err(Error::last_os_error())
    } else {
        Ok(())
    }
}

fn prot_of(access: AccessFlags) -> c_int {
    if access.contains(AccessFlags::NO_ACCESS) {
        return libc::PROT_NONE;
    }

    let mut prot = libc::PROT_NONE;
    if access.is_readable() {
        prot |= libc::PROT_READ;
    }
    if access.is_writable() {
        prot |= libc::PROT_WRITE;
    }
    if access.is_executable() {
        prot |= libc::PROT_EXEC;
    }
    prot
}

impl Provider for Posix {
    type Handle = c_int;

    const INVALID: c_int = -1;

    fn page_size() -> usize {
        static PAGE_SIZE: AtomicUsize = AtomicUsize::new(0);

        let mut size = PAGE_SIZE.load(Ordering::Relaxed);
        if size == 0 {
            // Safety: no preconditions, `_SC_PAGESIZE` is always supported.
            let ret = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
            size = usize::try_from(ret).unwrap_or(4096);
            PAGE_SIZE.store(size, Ordering::Relaxed);
        }

        size
    }

    fn last_error() -> c_int {
        std::io::Error::last_os_error().raw_os_error().unwrap_or(0)
    }

    fn open_file(path: &Path, access: AccessFlags) -> Result<c_int, Error> {
        let path = CString::new(path.as_os_str().as_bytes()).map_err(|_| Error::InvalidArgs)?;

        let mut flags = libc::O_CLOEXEC;
        flags |= if access.opens_for_write() {
            libc::O_RDWR
        } else {
            libc::O_RDONLY
        };

        if access.contains(AccessFlags::CREATE) {
            flags |= libc::O_CREAT;
        }

        let mode: libc::c_uint = 0o644;
        // Safety: `path` is a valid, nul-terminated string.
        let fd = unsafe { libc::open(path.as_ptr(), flags, mode) };
        if fd == -1 {
            return Err(Error::last_os_error());
        }

        Ok(fd)
    }

    fn dup_handle(handle: c_int) -> Result<c_int, Error> {
        // Safety: duplication has no memory safety preconditions.
        let fd = unsafe { libc::fcntl(handle, libc::F_DUPFD_CLOEXEC, 0) };
        if fd == -1 {
            return Err(Error::last_os_error());
        }

        Ok(fd)
    }

    fn close_file(handle: c_int) -> Result<(), Error> {
        check(unsafe { libc::close(handle) })
    }

    fn file_size(handle: c_int) -> Result<u64, Error> {
        let mut uninit = core::mem::MaybeUninit::<libc::stat>::zeroed();
        // Safety: passing the correct pointer to a struct of libc::stat.
        check(unsafe { libc::fstat(handle, uninit.as_mut_ptr()) })?;
        // Safety: always initialized on return with success.
        let stat = unsafe { uninit.assume_init() };
        u64::try_from(stat.st_size).map_err(|_| Error::InvalidArgs)
    }

    fn resize_file(handle: c_int, new_size: u64) -> Result<(), Error> {
        let new_size = libc::off_t::try_from(new_size).map_err(|_| Error::InvalidArgs)?;
        check(unsafe { libc::ftruncate(handle, new_size) })
    }

    unsafe fn map(
        region: &mut Region<c_int>,
        access: AccessFlags,
        length: usize,
        offset: u64,
    ) -> Result<(), Error> {
        let offset_t = libc::off_t::try_from(offset).map_err(|_| Error::InvalidArgs)?;

        let mut flags = if access.is_copy() {
            libc::MAP_PRIVATE
        } else {
            libc::MAP_SHARED
        };

        if region.handle == Self::INVALID {
            flags |= libc::MAP_ANON;
        }

        let ptr = libc::mmap(
            core::ptr::null_mut(),
            length,
            prot_of(access),
            flags,
            region.handle,
            offset_t,
        );

        if ptr == libc::MAP_FAILED {
            return Err(Error::last_os_error());
        }

        region.ptr = ptr.cast();
        region.len = length;
        region.offset = offset;
        Ok(())
    }

    unsafe fn unmap(region: &mut Region<c_int>) -> Result<(), Error> {
        check(libc::munmap(region.ptr.cast(), region.len))?;
        region.ptr = core::ptr::null_mut();
        region.len = 0;
        Ok(())
    }

    #[cfg(any(target_os = "linux", target_os = "android"))]
    unsafe fn remap(region: &mut Region<c_int>, new_len: usize) -> Result<(), Error> {
        let ptr = libc::mremap(
            region.ptr.cast(),
            region.len,
            new_len,
            libc::MREMAP_MAYMOVE,
        );

        if ptr == libc::MAP_FAILED {
            return Err(Error::last_os_error());
        }

        region.ptr = ptr.cast();
        region.len = new_len;
        Ok(())
    }

    #[cfg(not(any(target_os = "linux", target_os = "android")))]
    unsafe fn remap(_: &mut Region<c_int>, _: usize) -> Result<(), Error> {
        Err(Error::Unimplemented)
    }

    unsafe fn sync(ptr: *mut u8, len: usize) -> Result<(), Error> {
        check(libc::msync(ptr.cast(), len, libc::MS_SYNC))
    }

    unsafe fn lock(ptr: *mut u8, len: usize) -> Result<(), Error> {
        check(libc::mlock(ptr as *const c_void, len))
    }

    unsafe fn unlock(ptr: *mut u8, len: usize) -> Result<(), Error> {
        check(libc::munlock(ptr as *const c_void, len))
    }

    unsafe fn protect(ptr: *mut u8, len: usize, access: AccessFlags) -> Result<(), Error> {
        check(libc::mprotect(ptr.cast(), len, prot_of(access)))
    }

    unsafe fn advise(ptr: *mut u8, len: usize, advice: Advice) -> Result<(), Error> {
        let advice = match advice {
            Advice::Normal => libc::MADV_NORMAL,
            Advice::Random => libc::MADV_RANDOM,
            Advice::Sequential => libc::MADV_SEQUENTIAL,
            Advice::WillNeed => libc::MADV_WILLNEED,
            Advice::DontNeed => libc::MADV_DONTNEED,
        };

        check(libc::madvise(ptr.cast(), len, advice))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_size_is_power_of_two() {
        let size = Posix::page_size();
        assert!(size.is_power_of_two());
        assert_eq!(Posix::align_to_page_size(size as u64 + 7), size as u64);
        assert_eq!(Posix::align_to_page_size(size as u64 - 1), 0);
    }

    #[test]
    fn open_missing_reports_enoent() {
        let dir = tempfile::tempdir().unwrap();
        let err = Posix::open_file(&dir.path().join("missing.bin"), AccessFlags::READ_ONLY)
            .unwrap_err();
        assert_eq!(err, Error::Os(libc::ENOENT));
    }

    #[test]
    fn file_lifecycle() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("file.bin");

        let fd = Posix::open_file(&path, AccessFlags::DEFAULT).unwrap();
        assert_eq!(Posix::file_size(fd).unwrap(), 0);
        Posix::resize_file(fd, 100).unwrap();
        assert_eq!(Posix::file_size(fd).unwrap(), 100);

        let dup = Posix::dup_handle(fd).unwrap();
        assert_ne!(dup, fd);
        Posix::close_file(fd).unwrap();
        assert_eq!(Posix::file_size(dup).unwrap(), 100);
        Posix::close_file(dup).unwrap();
    }

    #[test]
    fn anonymous_region() {
        let mut region = Region::new(Posix::INVALID, Posix::INVALID);
        let len = Posix::page_size();

        unsafe {
            Posix::map(&mut region, AccessFlags::DEFAULT, len, 0).unwrap();
            assert!(region.is_mapped());
            assert_eq!(region.len, len);

            // Anonymous memory is zeroed.
            let bytes = core::slice::from_raw_parts_mut(region.ptr, region.len);
            assert!(bytes.iter().all(|&b| b == 0));
            bytes[0] = 0xab;

            Posix::lock(region.ptr, region.len).ok();
            Posix::unlock(region.ptr, region.len).ok();
            Posix::advise(region.ptr, region.len, Advice::Sequential).unwrap();
            Posix::protect(region.ptr, region.len, AccessFlags::READ_ONLY).unwrap();

            Posix::unmap(&mut region).unwrap();
        }

        assert!(!region.is_mapped());
    }
}
