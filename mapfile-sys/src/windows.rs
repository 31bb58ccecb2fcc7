//! File mapping objects and views of `memoryapi.h`.
//!
//! <https://learn.microsoft.com/en-us/windows/win32/api/memoryapi/>
use core::ffi::c_int;
use core::mem::MaybeUninit;
use core::ptr::{null, null_mut};
use core::sync::atomic::{AtomicUsize, Ordering};
use std::os::windows::ffi::OsStrExt;
use std::path::Path;

use windows_sys::Win32::{
    Foundation::{
        CloseHandle, DuplicateHandle, GetLastError, DUPLICATE_SAME_ACCESS, GENERIC_READ,
        GENERIC_WRITE, HANDLE, INVALID_HANDLE_VALUE,
    },
    Storage::FileSystem::{
        CreateFileW, GetFileSizeEx, SetEndOfFile, SetFilePointerEx, FILE_ATTRIBUTE_NORMAL,
        FILE_BEGIN, FILE_SHARE_DELETE, FILE_SHARE_READ, FILE_SHARE_WRITE, OPEN_ALWAYS,
        OPEN_EXISTING,
    },
    System::{
        Memory::{
            CreateFileMappingW, FlushViewOfFile, MapViewOfFile, UnmapViewOfFile, VirtualLock,
            VirtualProtect, VirtualUnlock, FILE_MAP, FILE_MAP_COPY, FILE_MAP_EXECUTE,
            FILE_MAP_READ, FILE_MAP_WRITE, MEMORY_MAPPED_VIEW_ADDRESS, PAGE_EXECUTE_READ,
            PAGE_EXECUTE_READWRITE, PAGE_EXECUTE_WRITECOPY, PAGE_NOACCESS,
            PAGE_PROTECTION_FLAGS, PAGE_READONLY, PAGE_READWRITE, PAGE_WRITECOPY,
        },
        SystemInformation::{GetSystemInfo, SYSTEM_INFO},
        Threading::GetCurrentProcess,
    },
};

use crate::{AccessFlags, Advice, Error, Provider, Region};

/// Mapping through file mapping objects and views.
pub struct Windows;

fn check(ret: i32) -> Result<(), Error> {
    if ret == 0 {
        Err(Error::last_os_error())
    } else {
        Ok(())
    }
}

/// Protection of the pages, also used for the mapping object.
fn page_protection(access: AccessFlags) -> PAGE_PROTECTION_FLAGS {
    if access.contains(AccessFlags::NO_ACCESS) {
        return PAGE_NOACCESS;
    }

    match (access.is_writable(), access.is_copy(), access.is_executable()) {
        (true, true, false) => PAGE_WRITECOPY,
        (true, true, true) => PAGE_EXECUTE_WRITECOPY,
        (true, false, false) => PAGE_READWRITE,
        (true, false, true) => PAGE_EXECUTE_READWRITE,
        (false, _, false) => PAGE_READONLY,
        (false, _, true) => PAGE_EXECUTE_READ,
    }
}

fn view_access(access: AccessFlags) -> FILE_MAP {
    let mut map = if access.is_copy() {
        FILE_MAP_COPY
    } else if access.is_writable() {
        FILE_MAP_WRITE
    } else {
        FILE_MAP_READ
    };

    if access.is_executable() {
        map |= FILE_MAP_EXECUTE;
    }

    map
}

fn split(value: u64) -> (u32, u32) {
    ((value >> 32) as u32, value as u32)
}

impl Provider for Windows {
    type Handle = HANDLE;

    const INVALID: HANDLE = INVALID_HANDLE_VALUE;

    /// The allocation granularity, views must start at a multiple of it.
    fn page_size() -> usize {
        static GRANULARITY: AtomicUsize = AtomicUsize::new(0);

        let mut size = GRANULARITY.load(Ordering::Relaxed);
        if size == 0 {
            let info = unsafe {
                let mut info = MaybeUninit::<SYSTEM_INFO>::uninit();
                GetSystemInfo(info.as_mut_ptr());
                info.assume_init()
            };

            size = info.dwAllocationGranularity as usize;
            GRANULARITY.store(size, Ordering::Relaxed);
        }

        size
    }

    fn last_error() -> c_int {
        // Safety: `GetLastError`'s internal errno is stored using TLS.
        unsafe { GetLastError() as c_int }
    }

    fn open_file(path: &Path, access: AccessFlags) -> Result<HANDLE, Error> {
        let wide: Vec<u16> = path.as_os_str().encode_wide().chain(Some(0)).collect();
        if wide[..wide.len() - 1].contains(&0) {
            return Err(Error::InvalidArgs);
        }

        let desired = if access.opens_for_write() {
            GENERIC_READ | GENERIC_WRITE
        } else {
            GENERIC_READ
        };

        let disposition = if access.contains(AccessFlags::CREATE) {
            OPEN_ALWAYS
        } else {
            OPEN_EXISTING
        };

        let handle = unsafe {
            CreateFileW(
                wide.as_ptr(),
                desired,
                FILE_SHARE_READ | FILE_SHARE_WRITE | FILE_SHARE_DELETE,
                null(),
                disposition,
                FILE_ATTRIBUTE_NORMAL,
                0,
            )
        };

        if handle == INVALID_HANDLE_VALUE {
            return Err(Error::last_os_error());
        }

        Ok(handle)
    }

    fn dup_handle(handle: HANDLE) -> Result<HANDLE, Error> {
        let mut target: HANDLE = 0;
        check(unsafe {
            let process = GetCurrentProcess();
            DuplicateHandle(
                process,
                handle,
                process,
                &mut target,
                0,
                0,
                DUPLICATE_SAME_ACCESS,
            )
        })?;

        Ok(target)
    }

    fn close_file(handle: HANDLE) -> Result<(), Error> {
        check(unsafe { CloseHandle(handle) })
    }

    fn file_size(handle: HANDLE) -> Result<u64, Error> {
        let mut size = 0i64;
        check(unsafe { GetFileSizeEx(handle, &mut size) })?;
        u64::try_from(size).map_err(|_| Error::InvalidArgs)
    }

    fn resize_file(handle: HANDLE, new_size: u64) -> Result<(), Error> {
        let new_size = i64::try_from(new_size).map_err(|_| Error::InvalidArgs)?;
        check(unsafe { SetFilePointerEx(handle, new_size, null_mut(), FILE_BEGIN) })?;
        check(unsafe { SetEndOfFile(handle) })
    }

    unsafe fn map(
        region: &mut Region<HANDLE>,
        access: AccessFlags,
        length: usize,
        offset: u64,
    ) -> Result<(), Error> {
        // The mapping object must span the whole view, relative to the start of the file.
        let extent = offset
            .checked_add(length as u64)
            .ok_or(Error::InvalidArgs)?;
        let (extent_hi, extent_lo) = split(extent);
        let (offset_hi, offset_lo) = split(offset);

        let section = CreateFileMappingW(
            region.handle,
            null(),
            page_protection(access),
            extent_hi,
            extent_lo,
            null(),
        );

        if section == 0 {
            return Err(Error::last_os_error());
        }

        let view = MapViewOfFile(section, view_access(access), offset_hi, offset_lo, length);
        if view.Value.is_null() {
            let err = Error::last_os_error();
            CloseHandle(section);
            return Err(err);
        }

        region.ptr = view.Value.cast();
        region.section = section;
        region.len = length;
        region.offset = offset;
        Ok(())
    }

    unsafe fn unmap(region: &mut Region<HANDLE>) -> Result<(), Error> {
        check(UnmapViewOfFile(MEMORY_MAPPED_VIEW_ADDRESS {
            Value: region.ptr.cast(),
        }))?;

        region.ptr = null_mut();
        region.len = 0;

        let section = core::mem::replace(&mut region.section, INVALID_HANDLE_VALUE);
        check(CloseHandle(section))
    }

    unsafe fn remap(_: &mut Region<HANDLE>, _: usize) -> Result<(), Error> {
        Err(Error::Unimplemented)
    }

    unsafe fn sync(ptr: *mut u8, len: usize) -> Result<(), Error> {
        check(FlushViewOfFile(ptr.cast(), len))
    }

    unsafe fn lock(ptr: *mut u8, len: usize) -> Result<(), Error> {
        check(VirtualLock(ptr.cast(), len))
    }

    unsafe fn unlock(ptr: *mut u8, len: usize) -> Result<(), Error> {
        check(VirtualUnlock(ptr.cast(), len))
    }

    unsafe fn protect(ptr: *mut u8, len: usize, access: AccessFlags) -> Result<(), Error> {
        let mut old: PAGE_PROTECTION_FLAGS = 0;
        check(VirtualProtect(ptr.cast(), len, page_protection(access), &mut old))
    }

    // FIXME: `PrefetchVirtualMemory` could serve `WillNeed` and `OfferVirtualMemory` `DontNeed`.
    unsafe fn advise(_: *mut u8, _: usize, _: Advice) -> Result<(), Error> {
        Err(Error::Unimplemented)
    }
}
