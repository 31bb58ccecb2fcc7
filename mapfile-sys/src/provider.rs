use core::ffi::c_int;
use core::fmt;
use std::path::Path;

use crate::{AccessFlags, Advice, Error, Native};

/// One active mapping, as the OS sees it.
///
/// The pointer is page aligned and `offset` is the page aligned file offset it corresponds to.
/// A region with a null `ptr` is not mapped.
pub struct Region<H> {
    /// The start of the mapping as returned by the OS.
    pub ptr: *mut u8,
    /// The backing file, or the provider's invalid handle for anonymous memory.
    pub handle: H,
    /// The mapping object of a view, only used on Windows.
    pub section: H,
    /// The number of bytes the OS mapped for us.
    pub len: usize,
    /// The file offset of `ptr`, always aligned to the page size.
    pub offset: u64,
}

/// The table of OS operations the mapping engine is built on.
///
/// All functions are associated functions: a provider is a type, never a value, and calls through
/// it are resolved at compile time. Exactly one implementation exists per platform, see
/// [`Native`](crate::Native); the trait exists so the engine can be written once and tested
/// against a customized table.
///
/// Errors are captured at the call site of the failing OS function, the returned
/// [`Error::Os`] holds its code.
pub trait Provider {
    type Handle: Copy + Eq + fmt::Debug;

    /// The handle value that refers to no file.
    const INVALID: Self::Handle;

    /// The granularity at which mappings can start.
    fn page_size() -> usize;

    /// Round an offset down to the page size.
    fn align_to_page_size(offset: u64) -> u64 {
        offset & !(Self::page_size() as u64 - 1)
    }

    /// The platform's most recent error code of this thread.
    fn last_error() -> c_int;

    fn open_file(path: &Path, access: AccessFlags) -> Result<Self::Handle, Error>;
    fn dup_handle(handle: Self::Handle) -> Result<Self::Handle, Error>;
    fn close_file(handle: Self::Handle) -> Result<(), Error>;
    fn file_size(handle: Self::Handle) -> Result<u64, Error>;
    /// Truncate or extend the file to `new_size` bytes.
    fn resize_file(handle: Self::Handle, new_size: u64) -> Result<(), Error>;

    /// Map `length` bytes at the aligned `offset` of `region.handle`.
    ///
    /// An invalid handle requests anonymous, zero-initialized memory. On success `ptr`, `len`
    /// and `offset` of the region describe the new mapping.
    ///
    /// # Safety
    ///
    /// The region must not currently be mapped, otherwise that mapping is leaked.
    unsafe fn map(
        region: &mut Region<Self::Handle>,
        access: AccessFlags,
        length: usize,
        offset: u64,
    ) -> Result<(), Error>;

    /// Release the mapping of the region.
    ///
    /// # Safety
    ///
    /// The region must be mapped and no references into it may be used afterwards.
    unsafe fn unmap(region: &mut Region<Self::Handle>) -> Result<(), Error>;

    /// Change the length of a mapping, possibly moving it.
    ///
    /// Reports [`Error::Unimplemented`] where the platform has no such primitive.
    ///
    /// # Safety
    ///
    /// The region must be mapped and no references into it may be used afterwards.
    unsafe fn remap(region: &mut Region<Self::Handle>, new_len: usize) -> Result<(), Error>;

    /// Write back dirty pages of the range to the backing file.
    ///
    /// # Safety
    ///
    /// `ptr` must be page aligned and `ptr..ptr+len` lie in a live mapping.
    unsafe fn sync(ptr: *mut u8, len: usize) -> Result<(), Error>;

    /// # Safety
    ///
    /// `ptr` must be page aligned and `ptr..ptr+len` lie in a live mapping.
    unsafe fn lock(ptr: *mut u8, len: usize) -> Result<(), Error>;

    /// # Safety
    ///
    /// `ptr` must be page aligned and `ptr..ptr+len` lie in a live mapping.
    unsafe fn unlock(ptr: *mut u8, len: usize) -> Result<(), Error>;

    /// Change the protection of the pages in the range.
    ///
    /// # Safety
    ///
    /// `ptr` must be page aligned and `ptr..ptr+len` lie in a live mapping. References into the
    /// range must not be used in a way the new protection forbids.
    unsafe fn protect(ptr: *mut u8, len: usize, access: AccessFlags) -> Result<(), Error>;

    /// # Safety
    ///
    /// `ptr` must be page aligned and `ptr..ptr+len` lie in a live mapping. With
    /// [`Advice::DontNeed`], private pages may be dropped and read back as zero.
    unsafe fn advise(ptr: *mut u8, len: usize, advice: Advice) -> Result<(), Error>;
}

impl<H> Region<H> {
    /// An unmapped region of the given handle.
    pub fn new(handle: H, invalid: H) -> Self {
        Region {
            ptr: core::ptr::null_mut(),
            handle,
            section: invalid,
            len: 0,
            offset: 0,
        }
    }

    pub fn is_mapped(&self) -> bool {
        !self.ptr.is_null()
    }
}

impl<H: fmt::Debug> fmt::Debug for Region<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Region")
            .field("ptr", &self.ptr)
            .field("handle", &self.handle)
            .field("len", &self.len)
            .field("offset", &self.offset)
            .finish()
    }
}

pub(crate) fn last_error() -> c_int {
    <Native as Provider>::last_error()
}
