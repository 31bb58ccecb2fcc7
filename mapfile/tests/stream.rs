use mapfile::{
    AccessFlags, Decode, Encode, Endian, Hook, MappedBuf, MappedFile, MappedStream, Provider,
    Status,
};

fn anon_stream(len: usize, endian: Endian) -> MappedStream {
    let mut file = MappedFile::new();
    file.anon_map(len).unwrap();
    MappedStream::new(MappedBuf::new(file), endian)
}

#[test]
fn byte_order_on_the_wire() {
    let mut big = anon_stream(4, Endian::Big);
    big.write(0x0102_0304u32);
    assert!(big.is_ok());
    assert_eq!(big.buffer().file().as_slice(), [1, 2, 3, 4]);

    let mut little = anon_stream(4, Endian::Little);
    little.write(0x0102_0304u32);
    assert_eq!(little.buffer().file().as_slice(), [4, 3, 2, 1]);

    little.buffer_mut().rewind();
    assert_eq!(little.get::<u32>(), 0x0102_0304);

    // The same bytes, read the other way around.
    let file = little.pop_buffer().into_inner();
    let mut big = MappedStream::new(MappedBuf::new(file), Endian::Big);
    assert_eq!(big.get::<u32>(), 0x0403_0201);
}

#[test]
fn mixed_values_in_sequence() {
    let mut stream = anon_stream(64, Endian::Big);
    stream
        .write(-3i8)
        .write(0xbeefu16)
        .write(-70_000i32)
        .write(u64::MAX - 1)
        .write(2.5f32)
        .write(-0.125f64)
        .write(true);
    assert!(stream.is_ok());
    assert_eq!(stream.buffer().tell(), 1 + 2 + 4 + 8 + 4 + 8 + 1);

    stream.buffer_mut().rewind();
    let (mut a, mut b, mut c, mut d) = (0i8, 0u16, 0i32, 0u64);
    let (mut e, mut f, mut g) = (0f32, 0f64, false);
    stream
        .read(&mut a)
        .read(&mut b)
        .read(&mut c)
        .read(&mut d)
        .read(&mut e)
        .read(&mut f)
        .read(&mut g);

    assert!(stream.is_ok());
    assert_eq!((a, b, c, d), (-3, 0xbeef, -70_000, u64::MAX - 1));
    assert_eq!((e, f, g), (2.5, -0.125, true));
}

/// A string stored with a 32-bit length in front.
struct Prefixed(String);

impl Encode for Prefixed {
    fn encode<P: Provider>(&self, stream: &mut MappedStream<P>) {
        stream.write(self.0.len() as u32);
        stream.write_bytes(self.0.as_bytes());
    }
}

impl Decode for Prefixed {
    fn decode<P: Provider>(&mut self, stream: &mut MappedStream<P>) {
        let len = stream.get::<u32>() as usize;
        if !stream.is_ok() {
            return;
        }

        if len > stream.buffer().remaining() {
            stream.set_status(Status::ReadFailed);
            return;
        }

        let mut bytes = vec![0; len];
        stream.read_bytes(&mut bytes);
        match String::from_utf8(bytes) {
            Ok(string) => self.0 = string,
            Err(_) => stream.set_status(Status::ReadFailed),
        }
    }
}

#[test]
fn length_prefixed_strings() {
    let mut stream = anon_stream(32, Endian::Little);
    stream
        .encode(&Prefixed("mapped".into()))
        .encode(&Prefixed(String::new()))
        .encode(&[1u16, 2, 3]);
    assert!(stream.is_ok());
    assert_eq!(&stream.buffer().file().as_slice()[..4], [6, 0, 0, 0]);

    stream.buffer_mut().rewind();
    let (mut first, mut second) = (Prefixed(String::new()), Prefixed("x".into()));
    let mut numbers = [0u16; 3];
    stream.decode(&mut first).decode(&mut second).decode(&mut numbers);

    assert!(stream.is_ok());
    assert_eq!(first.0, "mapped");
    assert_eq!(second.0, "");
    assert_eq!(numbers, [1, 2, 3]);

    // A length running past the end fails instead of reading garbage.
    stream.buffer_mut().rewind();
    stream.write(1000u32);
    stream.buffer_mut().rewind();
    stream.decode(&mut first);
    assert_eq!(stream.status(), Status::ReadFailed);
    assert_eq!(first.0, "mapped");
}

fn skip_header(stream: &mut MappedStream) {
    stream.buffer_mut().seek(2, mapfile::Whence::Current);
}

#[test]
fn hooks_run_in_the_chain() {
    let mut stream = anon_stream(8, Endian::Little);
    stream.write_bytes(&[0xff, 0xff, 7, 0, 9, 0]);
    stream.buffer_mut().rewind();

    let hook: Hook = skip_header;
    let (mut a, mut b) = (0u16, 0u16);
    stream.with(hook).read(&mut a).with(|s| {
        assert!(s.is_ok());
    });
    stream.read(&mut b);
    assert_eq!((a, b), (7, 9));

    // Still invoked on a failed stream.
    stream.set_status(Status::WriteFailed);
    let mut called = false;
    stream.with(|_| called = true);
    assert!(called);
}

#[test]
fn streams_over_files() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("stream.bin");

    let mut buf: MappedBuf = MappedBuf::default();
    buf.map(&path, AccessFlags::DEFAULT, Some(12), 0).unwrap();
    let mut stream = MappedStream::new(buf, Endian::Big);
    stream.write(1u32).write(2u64);
    assert!(stream.is_ok());
    stream.flush().unwrap();
    drop(stream);

    assert_eq!(
        std::fs::read(&path).unwrap(),
        [0, 0, 0, 1, 0, 0, 0, 0, 0, 0, 0, 2]
    );

    let mut read: MappedStream = MappedStream::new(MappedBuf::default(), Endian::Big);
    read.buffer_mut()
        .map(&path, AccessFlags::READ_ONLY, None, 0)
        .unwrap();
    assert_eq!(read.get::<u32>(), 1);
    assert_eq!(read.get::<u64>(), 2);
    assert_eq!(read.get::<u8>(), 0);
    assert_eq!(read.status(), Status::ReadFailed);

    // Nothing can be written through a read-only mapping.
    read.clear_status();
    read.buffer_mut().rewind();
    read.write(5u8);
    assert_eq!(read.status(), Status::WriteFailed);
}
