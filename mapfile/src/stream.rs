use core::fmt;

use mapfile_sys::{Native, Provider, Result};

use crate::endian::{fit_endian, Endian, Scalar};
use crate::MappedBuf;

/// The sticky state of a [`MappedStream`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Status {
    #[default]
    Ok,
    ReadFailed,
    WriteFailed,
}

/// A function that can be chained into a stream with [`MappedStream::with`].
pub type Hook<P = Native> = fn(&mut MappedStream<P>);

/// Typed reads and writes over a [`MappedBuf`] in a fixed byte order.
///
/// The first short read or write sets the status, after which every value operation is skipped
/// until the status is cleared. Values read after a failure are left at their default. This makes
/// chains such as `stream.read(&mut a).read(&mut b)` safe to check once at the end.
pub struct MappedStream<P: Provider = Native> {
    buf: MappedBuf<P>,
    endian: Endian,
    status: Status,
}

impl<P: Provider> MappedStream<P> {
    pub fn new(buf: MappedBuf<P>, endian: Endian) -> Self {
        MappedStream {
            buf,
            endian,
            status: Status::Ok,
        }
    }

    pub fn endian(&self) -> Endian {
        self.endian
    }

    pub fn status(&self) -> Status {
        self.status
    }

    pub fn is_ok(&self) -> bool {
        self.status == Status::Ok
    }

    pub fn set_status(&mut self, status: Status) {
        self.status = status;
    }

    pub fn clear_status(&mut self) {
        self.status = Status::Ok;
    }

    pub fn buffer(&self) -> &MappedBuf<P> {
        &self.buf
    }

    pub fn buffer_mut(&mut self) -> &mut MappedBuf<P> {
        &mut self.buf
    }

    /// Replace the buffer, releasing the previous one. The status is kept.
    pub fn push_buffer(&mut self, buf: MappedBuf<P>) {
        self.buf = buf;
    }

    /// Take the buffer out, leaving an empty one.
    pub fn pop_buffer(&mut self) -> MappedBuf<P> {
        core::mem::take(&mut self.buf)
    }

    pub fn into_inner(self) -> MappedBuf<P> {
        self.buf
    }

    /// Read one value in the stream's byte order.
    ///
    /// If fewer bytes than the value's width remain, `out` is set to its default and the status
    /// becomes [`Status::ReadFailed`].
    pub fn read<T: Scalar>(&mut self, out: &mut T) -> &mut Self {
        if !self.is_ok() {
            return self;
        }

        let mut bytes = T::Bytes::default();
        if self.buf.read(bytes.as_mut()) == T::SIZE {
            *out = fit_endian(self.endian, T::decode_ne(bytes));
        } else {
            *out = T::default();
            self.status = Status::ReadFailed;
        }

        self
    }

    /// Read one value, see [`Self::read`].
    pub fn get<T: Scalar>(&mut self) -> T {
        let mut value = T::default();
        self.read(&mut value);
        value
    }

    /// Write one value in the stream's byte order.
    ///
    /// A partial write sets [`Status::WriteFailed`], the bytes that fit stay written.
    pub fn write<T: Scalar>(&mut self, value: T) -> &mut Self {
        if !self.is_ok() {
            return self;
        }

        let bytes = fit_endian(self.endian, value).encode_ne();
        if self.buf.write(bytes.as_ref()) != T::SIZE {
            self.status = Status::WriteFailed;
        }

        self
    }

    /// Read raw bytes, failing the stream unless `dst` is filled.
    pub fn read_bytes(&mut self, dst: &mut [u8]) -> usize {
        if !self.is_ok() {
            return 0;
        }

        let n = self.buf.read(dst);
        if n != dst.len() {
            self.status = Status::ReadFailed;
        }

        n
    }

    /// Write raw bytes, failing the stream unless all of `src` is written.
    pub fn write_bytes(&mut self, src: &[u8]) -> usize {
        if !self.is_ok() {
            return 0;
        }

        let n = self.buf.write(src);
        if n != src.len() {
            self.status = Status::WriteFailed;
        }

        n
    }

    pub fn encode<T: Encode + ?Sized>(&mut self, value: &T) -> &mut Self {
        if self.is_ok() {
            value.encode(self);
        }

        self
    }

    pub fn decode<T: Decode + ?Sized>(&mut self, out: &mut T) -> &mut Self {
        if self.is_ok() {
            out.decode(self);
        }

        self
    }

    /// Run a function on the stream as part of a chain.
    ///
    /// The function runs regardless of the status, it decides on its own what a failed stream
    /// means to it.
    pub fn with(&mut self, hook: impl FnOnce(&mut Self)) -> &mut Self {
        hook(self);
        self
    }

    pub fn flush(&self) -> Result<()> {
        self.buf.flush()
    }
}

impl<P: Provider> Default for MappedStream<P> {
    fn default() -> Self {
        MappedStream::new(MappedBuf::default(), Endian::NATIVE)
    }
}

impl<P: Provider> fmt::Debug for MappedStream<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MappedStream")
            .field("buf", &self.buf)
            .field("endian", &self.endian)
            .field("status", &self.status)
            .finish()
    }
}

/// A value with a representation in a [`MappedStream`].
pub trait Encode {
    fn encode<P: Provider>(&self, stream: &mut MappedStream<P>);
}

/// A value that can be read back from a [`MappedStream`].
pub trait Decode {
    fn decode<P: Provider>(&mut self, stream: &mut MappedStream<P>);
}

impl<T: Scalar> Encode for T {
    fn encode<P: Provider>(&self, stream: &mut MappedStream<P>) {
        stream.write(*self);
    }
}

impl<T: Scalar> Decode for T {
    fn decode<P: Provider>(&mut self, stream: &mut MappedStream<P>) {
        stream.read(self);
    }
}

/// Raw bytes, without a length.
impl Encode for [u8] {
    fn encode<P: Provider>(&self, stream: &mut MappedStream<P>) {
        stream.write_bytes(self);
    }
}

/// Fills the slice with raw bytes.
impl Decode for [u8] {
    fn decode<P: Provider>(&mut self, stream: &mut MappedStream<P>) {
        stream.read_bytes(self);
    }
}

impl<T: Encode, const N: usize> Encode for [T; N] {
    fn encode<P: Provider>(&self, stream: &mut MappedStream<P>) {
        for item in self {
            stream.encode(item);
        }
    }
}

impl<T: Decode, const N: usize> Decode for [T; N] {
    fn decode<P: Provider>(&mut self, stream: &mut MappedStream<P>) {
        for item in self {
            stream.decode(item);
        }
    }
}

#[test]
fn failure_is_sticky() {
    let mut file = crate::MappedFile::new();
    file.anon_map(6).unwrap();
    let mut stream = MappedStream::new(MappedBuf::new(file), Endian::Little);

    let (mut a, mut b, mut c) = (0u32, 0u32, 0u8);
    stream.write(7u32).write(8u32);
    assert_eq!(stream.status(), Status::WriteFailed);
    assert_eq!(stream.buffer().tell(), 6);

    // Skipped entirely while failed.
    stream.buffer_mut().rewind();
    stream.read(&mut a);
    assert_eq!(a, 0);
    assert_eq!(stream.buffer().tell(), 0);

    stream.clear_status();
    stream.read(&mut a).read(&mut b).read(&mut c);
    assert_eq!(a, 7);
    assert_eq!(b, 0);
    assert_eq!(c, 0);
    assert_eq!(stream.status(), Status::ReadFailed);
}
