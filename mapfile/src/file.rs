use core::fmt;
use core::marker::PhantomData;
use core::ptr::NonNull;
use std::path::Path;

use mapfile_sys::{AccessFlags, Advice, AsNativeHandle, Error, Native, Provider, Region, Result};
use tracing::{debug, warn};

/// One mapping of a file or of anonymous memory.
///
/// The handle is either empty or mapped. Any operation that fails on the way to a new mapping
/// leaves it empty, releasing whatever it had acquired, and owned file handles are closed when
/// the mapping that needed them goes away.
///
/// The requested range does not need to be page aligned. The OS mapping starts at the page
/// boundary below the requested offset and the handle hides that padding: all accessors
/// address the requested range only.
pub struct MappedFile<P: Provider = Native> {
    region: Region<P::Handle>,
    /// Start of the requested range, inside the region.
    data: Option<NonNull<u8>>,
    /// Length of the requested range.
    len: usize,
    /// The requested, unaligned file offset.
    offset: u64,
    /// Whether the file handle is closed together with the mapping.
    owned: bool,
    access: AccessFlags,
    provider: PhantomData<P>,
}

// Safety: the mapping is exclusively owned, nothing in it is tied to the creating thread.
unsafe impl<P: Provider> Send for MappedFile<P> where P::Handle: Send {}

impl MappedFile<Native> {
    /// Create an empty handle.
    pub fn new() -> Self {
        Self::default()
    }

    /// Map an open file, leaving it open.
    ///
    /// The mapping uses a duplicate of the file's handle, so `file` may be dropped while the
    /// mapping lives on.
    pub fn map_file(
        &mut self,
        file: &impl AsNativeHandle,
        access: AccessFlags,
        length: Option<usize>,
        offset: u64,
    ) -> Result<()> {
        // Safety: the handle is valid for this call and is duplicated before being stored.
        unsafe { self.file_map(file.as_native_handle(), access, true, length, offset) }
    }
}

impl<P: Provider> MappedFile<P> {
    /// Open the file at `path` and map a range of it.
    ///
    /// With a `length` of `None`, the mapping extends to the end of the file. A request that
    /// reaches past the end grows the file when the access allows it, see
    /// [`AccessFlags::may_grow`], and is otherwise clamped to the file. An `offset` at or past
    /// the end of the file is invalid.
    ///
    /// Note that [`AccessFlags::DEFAULT`] creates and writes, so it grows files too, without
    /// the `RESIZE` bit. Use [`AccessFlags::READ_WRITE`] to keep the file at its size.
    pub fn map(
        &mut self,
        path: impl AsRef<Path>,
        access: AccessFlags,
        length: Option<usize>,
        offset: u64,
    ) -> Result<()> {
        self.unmap()?;

        let path = path.as_ref();
        let handle = P::open_file(path, access)?;
        self.region.handle = handle;
        self.owned = true;

        debug!(path = %path.display(), ?access, ?length, offset, "mapping file");
        let result = self.map_file_impl(access, length, offset);
        self.settle(result)
    }

    /// Map `length` bytes of zeroed, private memory.
    ///
    /// The memory is readable and writable.
    pub fn anon_map(&mut self, length: usize) -> Result<()> {
        self.unmap()?;

        if length == 0 {
            return Err(Error::InvalidArgs);
        }

        self.region.handle = P::INVALID;
        self.owned = false;

        debug!(length, "mapping anonymous memory");
        let result = self.map_impl(AccessFlags::DEFAULT, length, 0);
        self.settle(result)
    }

    /// Map an already open file handle.
    ///
    /// With `duplicate`, the handle is duplicated and the mapping owns the duplicate. Otherwise
    /// the mapping borrows `handle` and never closes it.
    ///
    /// # Safety
    ///
    /// `handle` must be an open file of the provider. Without `duplicate`, it must stay open
    /// for as long as this mapping refers to it.
    pub unsafe fn file_map(
        &mut self,
        handle: P::Handle,
        access: AccessFlags,
        duplicate: bool,
        length: Option<usize>,
        offset: u64,
    ) -> Result<()> {
        self.unmap()?;

        if handle == P::INVALID {
            return Err(Error::InvalidArgs);
        }

        if duplicate {
            self.region.handle = P::dup_handle(handle)?;
            self.owned = true;
        } else {
            self.region.handle = handle;
            self.owned = false;
        }

        debug!(?handle, duplicate, ?access, ?length, offset, "mapping file handle");
        let result = self.map_file_impl(access, length, offset);
        self.settle(result)
    }

    /// Release the mapping, closing the file handle if it is owned.
    ///
    /// Unmapping an empty handle does nothing. When the OS refuses to release the mapping, the
    /// handle stays mapped and the error is returned. An error reported after the pages were
    /// released still leaves the handle empty.
    pub fn unmap(&mut self) -> Result<()> {
        if !self.region.is_mapped() {
            return Ok(());
        }

        // Safety: the region is mapped, and `&mut self` outlives every view into it.
        let result = unsafe { P::unmap(&mut self.region) };
        if self.region.is_mapped() {
            return result;
        }

        debug!(len = self.len, offset = self.offset, "unmapped");
        self.reset();
        result
    }

    /// Write every dirty page of the mapping back to the file.
    pub fn flush(&self) -> Result<()> {
        self.require_file()?;
        // Safety: the region is mapped.
        unsafe { P::sync(self.region.ptr, self.region.len) }
    }

    /// Write back the pages covering `length` bytes at `offset` of the mapped range.
    ///
    /// The range is clamped to the mapping and widened to page boundaries.
    pub fn sync(&self, offset: usize, length: usize) -> Result<()> {
        self.require_file()?;

        if offset >= self.len {
            return Err(Error::InvalidArgs);
        }

        let length = length.min(self.len - offset);
        let start = self.padding() + offset;
        let aligned = P::align_to_page_size(start as u64) as usize;

        // Safety: `aligned <= start` and `start + length` is within the region.
        unsafe { P::sync(self.region.ptr.add(aligned), start - aligned + length) }
    }

    /// Map a different range of the same file.
    ///
    /// The current mapping is released first, so a failure leaves the handle empty.
    pub fn remap(&mut self, access: AccessFlags, length: Option<usize>, offset: u64) -> Result<()> {
        self.require_file()?;

        // Safety: the region is mapped and `&mut self` outlives every view into it.
        let released = unsafe { P::unmap(&mut self.region) };
        if self.region.is_mapped() {
            return released;
        }

        if let Err(err) = released {
            self.reset();
            return Err(err);
        }

        self.data = None;
        self.len = 0;

        debug!(?access, ?length, offset, "remapping");
        let result = self.map_file_impl(access, length, offset);
        self.settle(result)
    }

    /// Change the length of the mapped range, keeping its offset.
    ///
    /// Resizing to zero releases the mapping. A file mapping without write access can not be
    /// resized at all. Growing past the end of the file grows the file when the access allows
    /// it, see [`AccessFlags::may_grow`], and is refused with [`Error::InvalidArgs`] otherwise,
    /// keeping the mapping as it was. Private mappings never grow their file. Shrinking leaves
    /// the file alone.
    ///
    /// If the OS fails to resize the file or the mapping, the mapping is released and the error
    /// returned.
    pub fn resize(&mut self, new_len: usize) -> Result<()> {
        self.require_mapped()?;

        if new_len == self.len {
            return Ok(());
        }

        if new_len == 0 {
            return self.unmap();
        }

        if !self.is_anon() && !self.access.is_writable() {
            return Err(Error::InvalidArgs);
        }

        let padding = self.padding();
        let mapped = padding.checked_add(new_len).ok_or(Error::InvalidArgs)?;
        let end = self
            .offset
            .checked_add(new_len as u64)
            .ok_or(Error::InvalidArgs)?;

        if !self.is_anon() {
            let handle = self.region.handle;
            let file_size = match P::file_size(handle) {
                Ok(size) => size,
                Err(err) => return Err(self.release_after(err, new_len)),
            };

            // Pages past the end of the file fault on access.
            if end > file_size {
                if !self.access.may_grow() || self.access.is_copy() {
                    return Err(Error::InvalidArgs);
                }

                debug!(from = file_size, to = end, "growing file");
                if let Err(err) = P::resize_file(handle, end) {
                    return Err(self.release_after(err, new_len));
                }
            }
        }

        // Safety: the region is mapped and `&mut self` outlives every view into it.
        match unsafe { P::remap(&mut self.region, mapped) } {
            Ok(()) => {
                debug!(from = self.len, to = new_len, "resized");
                self.len = new_len;
                // Safety: the new region spans `padding + new_len` bytes.
                self.data = NonNull::new(unsafe { self.region.ptr.add(padding) });
                Ok(())
            }
            Err(err) => Err(self.release_after(err, new_len)),
        }
    }

    /// Release the mapping after a failed resize and hand back the error.
    fn release_after(&mut self, err: Error, new_len: usize) -> Error {
        warn!(%err, len = self.len, new_len, "resize failed, releasing the mapping");
        // Safety: a failed resize leaves the old region in place.
        if let Err(err) = unsafe { P::unmap(&mut self.region) } {
            warn!(%err, "failed to release the mapping, leaking it");
        }

        self.reset();
        err
    }

    /// Keep the pages of the mapping in physical memory.
    pub fn lock(&self) -> Result<()> {
        self.require_mapped()?;
        // Safety: the region is mapped.
        unsafe { P::lock(self.region.ptr, self.region.len) }
    }

    pub fn unlock(&self) -> Result<()> {
        self.require_mapped()?;
        // Safety: the region is mapped.
        unsafe { P::unlock(self.region.ptr, self.region.len) }
    }

    /// Change the protection of the mapping's pages.
    ///
    /// On success, `access` is recorded and decides what the accessors of the handle permit.
    pub fn protect(&mut self, access: AccessFlags) -> Result<()> {
        self.require_mapped()?;
        // Safety: the region is mapped, `&mut self` excludes views that could be invalidated.
        unsafe { P::protect(self.region.ptr, self.region.len, access)? };
        self.access = access;
        Ok(())
    }

    /// Tell the OS how the mapping is going to be used.
    ///
    /// Without the `advise` feature this always reports [`Error::Unimplemented`].
    pub fn advise(&mut self, advice: Advice) -> Result<()> {
        #[cfg(feature = "advise")]
        {
            self.require_mapped()?;
            // Safety: the region is mapped, `&mut self` excludes views into pages that may drop.
            unsafe { P::advise(self.region.ptr, self.region.len, advice) }
        }

        #[cfg(not(feature = "advise"))]
        {
            let _ = advice;
            Err(Error::Unimplemented)
        }
    }

    /// Move the mapping out, leaving this handle empty.
    pub fn take(&mut self) -> Self {
        core::mem::take(self)
    }

    pub fn is_mapped(&self) -> bool {
        self.data.is_some()
    }

    /// Whether this maps anonymous memory rather than a file.
    pub fn is_anon(&self) -> bool {
        self.is_mapped() && self.region.handle == P::INVALID
    }

    pub fn is_readable(&self) -> bool {
        self.is_mapped() && self.access.is_readable()
    }

    pub fn is_writable(&self) -> bool {
        self.is_mapped() && self.access.is_writable()
    }

    /// The length of the requested range, zero when empty.
    pub fn size(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// The requested file offset of the range.
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// The access the mapping was created with, or last protected to.
    pub fn access(&self) -> AccessFlags {
        self.access
    }

    /// The backing file, or the provider's invalid handle.
    pub fn file_handle(&self) -> P::Handle {
        self.region.handle
    }

    /// Start of the requested range, null when empty.
    pub fn as_ptr(&self) -> *const u8 {
        self.data.map_or(core::ptr::null(), |ptr| ptr.as_ptr().cast_const())
    }

    pub fn as_mut_ptr(&mut self) -> *mut u8 {
        self.data.map_or(core::ptr::null_mut(), NonNull::as_ptr)
    }

    /// The bytes of the requested range, empty unless the mapping is readable.
    pub fn as_slice(&self) -> &[u8] {
        match self.data {
            // Safety: the region is mapped for `len` bytes past `data`, and readable.
            Some(ptr) if self.access.is_readable() => unsafe {
                core::slice::from_raw_parts(ptr.as_ptr(), self.len)
            },
            _ => &[],
        }
    }

    /// The bytes of the requested range, if the mapping is writable.
    pub fn as_mut_slice(&mut self) -> Option<&mut [u8]> {
        match self.data {
            // Safety: as in `as_slice`, and `&mut self` makes this the only view.
            Some(ptr) if self.access.is_writable() => Some(unsafe {
                core::slice::from_raw_parts_mut(ptr.as_ptr(), self.len)
            }),
            _ => None,
        }
    }

    fn padding(&self) -> usize {
        (self.offset - self.region.offset) as usize
    }

    fn require_mapped(&self) -> Result<()> {
        if self.is_mapped() {
            Ok(())
        } else {
            Err(Error::Unmapped)
        }
    }

    fn require_file(&self) -> Result<()> {
        self.require_mapped()?;
        if self.is_anon() {
            Err(Error::MapIsAnon)
        } else {
            Ok(())
        }
    }

    /// Decide the length of a file mapping, resizing the file as the access asks.
    fn map_file_impl(
        &mut self,
        access: AccessFlags,
        length: Option<usize>,
        offset: u64,
    ) -> Result<()> {
        let handle = self.region.handle;
        let file_size = P::file_size(handle)?;

        let rest_of_file = || -> Result<usize> {
            if offset >= file_size {
                return Err(Error::InvalidArgs);
            }

            usize::try_from(file_size - offset).map_err(|_| Error::InvalidArgs)
        };

        let length = match length {
            None => rest_of_file()?,
            Some(0) => return Err(Error::InvalidArgs),
            Some(length) => {
                let end = offset
                    .checked_add(length as u64)
                    .ok_or(Error::InvalidArgs)?;

                if access.must_resize() {
                    if end != file_size {
                        debug!(from = file_size, to = end, "resizing file");
                        P::resize_file(handle, end)?;
                    }
                    length
                } else if end <= file_size {
                    length
                } else if access.may_grow() {
                    debug!(from = file_size, to = end, "growing file");
                    P::resize_file(handle, end)?;
                    length
                } else {
                    rest_of_file()?
                }
            }
        };

        self.map_impl(access, length, offset)
    }

    fn map_impl(&mut self, access: AccessFlags, length: usize, offset: u64) -> Result<()> {
        let aligned = P::align_to_page_size(offset);
        let padding = usize::try_from(offset - aligned).map_err(|_| Error::InvalidArgs)?;
        let mapped = padding.checked_add(length).ok_or(Error::InvalidArgs)?;

        // Safety: every caller unmapped the region before.
        unsafe { P::map(&mut self.region, access, mapped, aligned)? };

        self.offset = offset;
        self.len = length;
        self.access = access;
        // Safety: `padding < mapped`, inside the new region.
        self.data = NonNull::new(unsafe { self.region.ptr.add(padding) });
        Ok(())
    }

    /// Fall back to empty if mapping failed.
    fn settle(&mut self, result: Result<()>) -> Result<()> {
        if let Err(err) = result {
            debug!(%err, "mapping failed");
            self.reset();
            return Err(err);
        }

        Ok(())
    }

    /// Forget the region and close the handle if owned. The region must not be mapped.
    fn reset(&mut self) {
        if self.owned {
            if let Err(err) = P::close_file(self.region.handle) {
                warn!(%err, handle = ?self.region.handle, "failed to close file");
            }
        }

        self.region = Region::new(P::INVALID, P::INVALID);
        self.data = None;
        self.len = 0;
        self.offset = 0;
        self.owned = false;
        self.access = AccessFlags::empty();
    }
}

impl<P: Provider> Default for MappedFile<P> {
    fn default() -> Self {
        MappedFile {
            region: Region::new(P::INVALID, P::INVALID),
            data: None,
            len: 0,
            offset: 0,
            owned: false,
            access: AccessFlags::empty(),
            provider: PhantomData,
        }
    }
}

impl<P: Provider> Drop for MappedFile<P> {
    fn drop(&mut self) {
        if let Err(err) = self.unmap() {
            warn!(%err, "failed to unmap on drop");
        }
    }
}

impl<P: Provider> fmt::Debug for MappedFile<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MappedFile")
            .field("region", &self.region)
            .field("len", &self.len)
            .field("offset", &self.offset)
            .field("owned", &self.owned)
            .field("access", &self.access)
            .finish()
    }
}

/// Read-only view of the bookkeeping of a [`MappedFile`].
#[cfg(any(test, feature = "inspect"))]
pub struct Inspect<'lt, P: Provider> {
    file: &'lt MappedFile<P>,
}

#[cfg(any(test, feature = "inspect"))]
impl<P: Provider> MappedFile<P> {
    pub fn inspect(&self) -> Inspect<'_, P> {
        Inspect { file: self }
    }
}

#[cfg(any(test, feature = "inspect"))]
impl<P: Provider> Inspect<'_, P> {
    /// The length the OS mapped, including the padding.
    pub fn mapped_len(&self) -> usize {
        self.file.region.len
    }

    /// The page aligned offset the OS mapping starts at.
    pub fn aligned_offset(&self) -> u64 {
        self.file.region.offset
    }

    /// Bytes between the OS mapping and the requested range.
    pub fn padding(&self) -> usize {
        if self.file.is_mapped() {
            self.file.padding()
        } else {
            0
        }
    }

    pub fn owns_handle(&self) -> bool {
        self.file.owned
    }
}

#[test]
fn empty_handle_refuses_operations() {
    let mut file = MappedFile::new();
    assert!(!file.is_mapped());
    assert_eq!(file.size(), 0);
    assert!(file.as_ptr().is_null());
    assert!(file.as_slice().is_empty());
    assert!(file.as_mut_slice().is_none());

    assert_eq!(file.flush(), Err(Error::Unmapped));
    assert_eq!(file.sync(0, 1), Err(Error::Unmapped));
    assert_eq!(file.resize(10), Err(Error::Unmapped));
    assert_eq!(file.lock(), Err(Error::Unmapped));
    assert_eq!(file.unlock(), Err(Error::Unmapped));
    assert_eq!(file.protect(AccessFlags::READ_ONLY), Err(Error::Unmapped));
    assert_eq!(
        file.remap(AccessFlags::READ_ONLY, None, 0),
        Err(Error::Unmapped)
    );

    if cfg!(feature = "advise") {
        assert_eq!(file.advise(Advice::Normal), Err(Error::Unmapped));
    } else {
        assert_eq!(file.advise(Advice::Normal), Err(Error::Unimplemented));
    }

    assert_eq!(file.unmap(), Ok(()));
    assert!(!file.is_mapped());
}

#[test]
fn anonymous_memory_is_zeroed_and_writable() {
    let mut file = MappedFile::new();
    file.anon_map(100).unwrap();

    assert!(file.is_anon());
    assert!(file.is_writable());
    assert_eq!(file.size(), 100);
    assert!(file.as_slice().iter().all(|&b| b == 0));

    file.as_mut_slice().unwrap().fill(0x5a);
    assert_eq!(file.as_slice()[99], 0x5a);

    assert_eq!(file.flush(), Err(Error::MapIsAnon));
    assert_eq!(file.sync(0, 1), Err(Error::MapIsAnon));
    assert_eq!(file.anon_map(0), Err(Error::InvalidArgs));
    assert!(!file.is_mapped());
}

#[test]
fn unaligned_offset_is_hidden() {
    let page = Native::page_size();
    let mut tmp = tempfile::NamedTempFile::new().unwrap();
    let content: Vec<u8> = (0..2 * page).map(|i| i as u8).collect();
    std::io::Write::write_all(&mut tmp, &content).unwrap();

    let offset = page as u64 + 3;
    let mut file = MappedFile::new();
    file.map(tmp.path(), AccessFlags::READ_ONLY, Some(10), offset).unwrap();

    assert_eq!(file.as_slice(), &content[page + 3..page + 13]);
    assert_eq!(file.offset(), offset);

    let inspect = file.inspect();
    assert_eq!(inspect.padding(), 3);
    assert_eq!(inspect.aligned_offset(), page as u64);
    assert_eq!(inspect.mapped_len(), 13);
    assert!(inspect.owns_handle());
}

#[test]
fn failed_map_leaves_handle_empty() {
    let dir = tempfile::tempdir().unwrap();
    let mut file = MappedFile::new();
    file.anon_map(16).unwrap();

    let err = file
        .map(dir.path().join("missing"), AccessFlags::READ_ONLY, None, 0)
        .unwrap_err();
    assert!(err.raw_os_error().is_some());
    assert!(!file.is_mapped());
    assert_eq!(file.size(), 0);
}

#[test]
fn take_moves_the_mapping() {
    let mut file = MappedFile::new();
    file.anon_map(8).unwrap();
    let ptr = file.as_ptr();

    let taken = file.take();
    assert!(!file.is_mapped());
    assert_eq!(taken.as_ptr(), ptr);
    assert_eq!(taken.size(), 8);
}
