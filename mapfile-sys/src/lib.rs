//! Raw mapping operations of the operating system.
//!
//! Everything in here is a thin layer over `mmap` and friends, or the `MapViewOfFile` family on
//! Windows. The functions are stateless: they receive a [`Region`] describing one mapping and
//! fill or consume it. Ownership of that region, the arithmetic between page-aligned OS offsets
//! and byte offsets requested by a user, lives one layer up in the `mapfile` crate.
//!
//! The backend is chosen by the target at compile time. [`Native`] names it, and code generic
//! over [`Provider`] monomorphizes to direct calls.
mod error;
mod flags;
mod provider;

#[cfg(unix)]
mod posix;
#[cfg(windows)]
mod windows;

pub use error::{Error, Result};
pub use flags::{AccessFlags, Advice};
pub use provider::{Provider, Region};

#[cfg(unix)]
pub use posix::Posix;
#[cfg(windows)]
pub use windows::Windows;

/// The provider of the platform we are compiled for.
#[cfg(unix)]
pub type Native = Posix;
/// The provider of the platform we are compiled for.
#[cfg(windows)]
pub type Native = Windows;

/// The raw handle type of the [`Native`] provider.
pub type NativeHandle = <Native as Provider>::Handle;

/// Something that can lend its raw OS handle for mapping.
///
/// Implemented for everything with a raw file descriptor (or raw `HANDLE` on Windows), which
/// covers `std::fs::File`, `memfile::MemFile` and the like.
pub trait AsNativeHandle {
    fn as_native_handle(&self) -> NativeHandle;
}

#[cfg(unix)]
impl<T: std::os::fd::AsRawFd> AsNativeHandle for T {
    fn as_native_handle(&self) -> NativeHandle {
        self.as_raw_fd()
    }
}

#[cfg(windows)]
impl<T: std::os::windows::io::AsRawHandle> AsNativeHandle for T {
    fn as_native_handle(&self) -> NativeHandle {
        self.as_raw_handle() as NativeHandle
    }
}
