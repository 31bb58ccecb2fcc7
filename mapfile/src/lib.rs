//! Memory-mapped files with explicit ownership.
//!
//! A [`MappedFile`] owns exactly one mapping of a file, or of anonymous memory, and tracks how a
//! byte-granular request sits inside the page-granular mapping the OS hands out. It is either
//! empty or mapped, and every failed transition leaves it empty rather than half initialized.
//!
//! On top of the raw bytes:
//!
//! - [`MappedBuf`] moves a cursor over the mapped range. Reads and writes go directly to the
//!   mapped memory, there is no buffering of any kind.
//! - [`MappedStream`] reads and writes fixed-width numbers in a chosen byte order and collects
//!   failures in a sticky [`Status`], so a sequence of fields can be checked once at the end.
//!
//! ## Views of shared memory
//!
//! The slices handed out by [`MappedFile::as_slice`] and the buffer's views point into a shared
//! mapping. Another process (or another mapping in this one) may modify or truncate the file at
//! any time, which this library can neither prevent nor detect. Coordinating writers is up to the
//! caller.
mod buf;
pub mod endian;
mod file;
mod stream;


pub use buf::{MappedBuf, Whence};
pub use endian::{Endian, Scalar};
pub use file::MappedFile;
pub use stream::{Decode, Encode, Hook, MappedStream, Status};

#[cfg(any(test, feature = "inspect"))]
pub use file::Inspect;

pub use mapfile_sys::{AccessFlags, Advice, AsNativeHandle, Error, Native, Provider, Result};
