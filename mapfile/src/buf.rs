use core::fmt;
use std::io;
use std::path::Path;

use mapfile_sys::{AccessFlags, Error, Native, Provider, Result};

use crate::MappedFile;

/// The base of a [`MappedBuf::seek`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Whence {
    Begin,
    Current,
    End,
}

/// A cursor over a [`MappedFile`].
///
/// Reads and writes copy straight from and into the mapping and are never short for any other
/// reason than reaching its end. Writes to a mapping that is not writable do nothing and report
/// zero bytes. The cursor always stays within `0..=size()`.
pub struct MappedBuf<P: Provider = Native> {
    file: MappedFile<P>,
    pos: usize,
}

impl<P: Provider> MappedBuf<P> {
    pub fn new(file: MappedFile<P>) -> Self {
        MappedBuf { file, pos: 0 }
    }

    /// Map a file into the buffer, replacing the current mapping.
    ///
    /// See [`MappedFile::map`] for the meaning of the arguments.
    pub fn map(
        &mut self,
        path: impl AsRef<Path>,
        access: AccessFlags,
        length: Option<usize>,
        offset: u64,
    ) -> Result<()> {
        self.pos = 0;
        self.file.map(path, access, length, offset)
    }

    pub fn file(&self) -> &MappedFile<P> {
        &self.file
    }

    /// The underlying mapping.
    ///
    /// Shrinking it through this reference moves the cursor back to the new end.
    pub fn file_mut(&mut self) -> &mut MappedFile<P> {
        &mut self.file
    }

    /// Replace the mapping, releasing the previous one, and rewind.
    pub fn push_file(&mut self, file: MappedFile<P>) {
        self.file = file;
        self.pos = 0;
    }

    /// Take the mapping out, leaving the buffer empty.
    pub fn pop_file(&mut self) -> MappedFile<P> {
        self.pos = 0;
        self.file.take()
    }

    pub fn into_inner(self) -> MappedFile<P> {
        self.file
    }

    pub fn size(&self) -> usize {
        self.file.size()
    }

    pub fn tell(&self) -> usize {
        self.pos.min(self.size())
    }

    pub fn remaining(&self) -> usize {
        self.size() - self.tell()
    }

    pub fn is_eof(&self) -> bool {
        self.remaining() == 0
    }

    /// Move the cursor and return its new position.
    ///
    /// Targets outside of the mapping are clamped to its bounds.
    pub fn seek(&mut self, offset: i64, whence: Whence) -> usize {
        let size = self.size();
        let base = match whence {
            Whence::Begin => 0,
            Whence::Current => self.tell(),
            Whence::End => size,
        };

        let target = base as i128 + i128::from(offset);
        self.pos = target.clamp(0, size as i128) as usize;
        self.pos
    }

    pub fn rewind(&mut self) {
        self.pos = 0;
    }

    /// Copy up to `dst.len()` bytes, returning how many were read.
    pub fn read(&mut self, dst: &mut [u8]) -> usize {
        let src = self.read_view(dst.len());
        let n = src.len();
        dst[..n].copy_from_slice(src);
        n
    }

    pub fn read_byte(&mut self) -> Option<u8> {
        self.read_view(1).first().copied()
    }

    /// Borrow up to `len` bytes at the cursor and advance past them.
    pub fn read_view(&mut self, len: usize) -> &[u8] {
        let data = self.file.as_slice();
        let start = self.pos.min(data.len());
        let n = len.min(data.len() - start);
        self.pos = start + n;
        &data[start..start + n]
    }

    /// Borrow the bytes up to and including the next `separator`.
    ///
    /// At the end of the mapping the line may lack the separator, and past the end it is empty.
    pub fn read_line(&mut self, separator: u8) -> &[u8] {
        let data = self.file.as_slice();
        let start = self.pos.min(data.len());
        let rest = &data[start..];
        let n = rest
            .iter()
            .position(|&b| b == separator)
            .map_or(rest.len(), |idx| idx + 1);
        self.pos = start + n;
        &rest[..n]
    }

    /// Copy up to `src.len()` bytes into the mapping, returning how many were written.
    pub fn write(&mut self, src: &[u8]) -> usize {
        let Some(data) = self.file.as_mut_slice() else {
            return 0;
        };

        let start = self.pos.min(data.len());
        let n = src.len().min(data.len() - start);
        data[start..start + n].copy_from_slice(&src[..n]);
        self.pos = start + n;
        n
    }

    pub fn write_byte(&mut self, byte: u8) -> usize {
        self.write(&[byte])
    }

    pub fn write_view(&mut self, view: impl AsRef<[u8]>) -> usize {
        self.write(view.as_ref())
    }

    /// Write the mapping back to its file.
    pub fn flush(&self) -> Result<()> {
        self.file.flush()
    }
}

impl<P: Provider> Default for MappedBuf<P> {
    fn default() -> Self {
        MappedBuf::new(MappedFile::default())
    }
}

impl<P: Provider> From<MappedFile<P>> for MappedBuf<P> {
    fn from(file: MappedFile<P>) -> Self {
        MappedBuf::new(file)
    }
}

impl<P: Provider> fmt::Debug for MappedBuf<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MappedBuf")
            .field("file", &self.file)
            .field("pos", &self.pos)
            .finish()
    }
}

impl<P: Provider> io::Read for MappedBuf<P> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        Ok(MappedBuf::read(self, buf))
    }
}

impl<P: Provider> io::BufRead for MappedBuf<P> {
    fn fill_buf(&mut self) -> io::Result<&[u8]> {
        let data = self.file.as_slice();
        Ok(&data[self.pos.min(data.len())..])
    }

    fn consume(&mut self, amt: usize) {
        self.pos = (self.tell() + amt).min(self.size());
    }
}

impl<P: Provider> io::Write for MappedBuf<P> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if !buf.is_empty() && !self.file.is_writable() {
            return Err(io::ErrorKind::PermissionDenied.into());
        }

        Ok(MappedBuf::write(self, buf))
    }

    /// Anonymous memory has nothing to flush to, that is not an error here.
    fn flush(&mut self) -> io::Result<()> {
        match self.file.flush() {
            Ok(()) | Err(Error::MapIsAnon) | Err(Error::Unmapped) => Ok(()),
            Err(err) => Err(err.into()),
        }
    }
}

impl<P: Provider> io::Seek for MappedBuf<P> {
    /// Seeking is clamped to the mapping rather than failing.
    fn seek(&mut self, pos: io::SeekFrom) -> io::Result<u64> {
        let (offset, whence) = match pos {
            io::SeekFrom::Start(n) => (i64::try_from(n).unwrap_or(i64::MAX), Whence::Begin),
            io::SeekFrom::Current(n) => (n, Whence::Current),
            io::SeekFrom::End(n) => (n, Whence::End),
        };

        Ok(MappedBuf::seek(self, offset, whence) as u64)
    }
}

#[test]
fn lines_and_cursor() {
    let mut file = MappedFile::new();
    file.anon_map(5).unwrap();
    file.as_mut_slice().unwrap().copy_from_slice(b"ab\ncd");

    let mut buf = MappedBuf::new(file);
    assert_eq!(buf.read_line(b'\n'), b"ab\n");
    assert_eq!(buf.tell(), 3);
    assert_eq!(buf.read_line(b'\n'), b"cd");
    assert!(buf.is_eof());
    assert_eq!(buf.read_line(b'\n'), b"");

    assert_eq!(buf.seek(-100, Whence::Current), 0);
    assert_eq!(buf.seek(100, Whence::Begin), 5);
    assert_eq!(buf.seek(-2, Whence::End), 3);
    assert_eq!(buf.read_byte(), Some(b'c'));
}

#[test]
fn writes_stop_at_the_end() {
    let mut buf = MappedBuf::new(MappedFile::new());
    assert_eq!(buf.write(b"nothing mapped"), 0);

    buf.file_mut().anon_map(4).unwrap();
    assert_eq!(buf.write(b"abcdef"), 4);
    assert_eq!(buf.write_byte(b'g'), 0);
    assert_eq!(buf.file().as_slice(), b"abcd");

    buf.file_mut().protect(AccessFlags::READ_ONLY).unwrap();
    buf.rewind();
    assert_eq!(buf.write(b"x"), 0);
    assert_eq!(buf.read_view(8), b"abcd");
}

#[cfg(any(target_os = "linux", target_os = "android"))]
#[test]
fn shrinking_clamps_the_cursor() {
    let mut buf = MappedBuf::new(MappedFile::new());
    buf.file_mut().anon_map(4).unwrap();
    assert_eq!(buf.seek(0, Whence::End), 4);

    buf.file_mut().resize(2).unwrap();
    assert_eq!(buf.tell(), 2);
    assert!(buf.is_eof());
}
