use std::fs;
use std::io::Write;

use mapfile::{AccessFlags, Advice, Error, MappedBuf, MappedFile, Native, Provider, Whence};

#[test]
fn writes_reach_the_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("written.bin");

    let mut file = MappedFile::new();
    file.map(&path, AccessFlags::DEFAULT, Some(11), 0).unwrap();
    assert_eq!(fs::metadata(&path).unwrap().len(), 11);

    file.as_mut_slice().unwrap().copy_from_slice(b"hello world");
    file.flush().unwrap();
    file.unmap().unwrap();

    assert_eq!(fs::read(&path).unwrap(), b"hello world");

    // And are seen by the next mapping.
    let mut again = MappedFile::new();
    again.map(&path, AccessFlags::READ_ONLY, None, 6).unwrap();
    assert_eq!(again.as_slice(), b"world");
}

#[test]
fn shared_with_other_mappers() {
    let mut tmp = tempfile::tempfile().unwrap();
    tmp.write_all(&[0; 64]).unwrap();

    let mut file = MappedFile::new();
    file.map_file(&tmp, AccessFlags::READ_WRITE, None, 0).unwrap();

    let other = unsafe { memmap2::Mmap::map(&tmp) }.unwrap();
    file.as_mut_slice().unwrap()[..4].copy_from_slice(b"seen");
    assert_eq!(&other[..4], b"seen");

    // The mapping keeps its own handle.
    drop(tmp);
    file.as_mut_slice().unwrap()[4] = b'!';
    file.flush().unwrap();
    assert_eq!(&other[..5], b"seen!");
}

#[test]
fn private_mappings_keep_writes() {
    let mut tmp = tempfile::NamedTempFile::new().unwrap();
    tmp.write_all(b"original").unwrap();

    let mut file = MappedFile::new();
    file.map(tmp.path(), AccessFlags::WRITE_COPY, None, 0).unwrap();
    file.as_mut_slice().unwrap().copy_from_slice(b"modified");
    assert_eq!(file.as_slice(), b"modified");
    file.unmap().unwrap();

    assert_eq!(fs::read(tmp.path()).unwrap(), b"original");
}

#[test]
fn resize_access_sets_the_file_length() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("exact.bin");
    fs::write(&path, vec![7u8; 1000]).unwrap();

    let mut file = MappedFile::new();
    file.map(&path, AccessFlags::RESIZE, Some(100), 10).unwrap();
    assert_eq!(file.size(), 100);
    file.unmap().unwrap();

    assert_eq!(fs::metadata(&path).unwrap().len(), 110);
}

#[test]
fn missing_files_are_os_errors() {
    let dir = tempfile::tempdir().unwrap();
    let mut file = MappedFile::new();

    let err = file
        .map(dir.path().join("absent"), AccessFlags::READ_ONLY, None, 0)
        .unwrap_err();
    assert!(err.raw_os_error().is_some());
    assert!(err.code() > 0);
    assert!(!err.to_string().is_empty());

    let io: std::io::Error = err.into();
    assert_eq!(io.kind(), std::io::ErrorKind::NotFound);
}

#[test]
fn empty_files_can_not_be_mapped_whole() {
    let tmp = tempfile::NamedTempFile::new().unwrap();
    let mut file = MappedFile::new();

    assert_eq!(
        file.map(tmp.path(), AccessFlags::READ_ONLY, None, 0),
        Err(Error::InvalidArgs)
    );

    // But can grow with the right access.
    file.map(tmp.path(), AccessFlags::DEFAULT, Some(3), 0).unwrap();
    assert_eq!(file.as_slice(), [0, 0, 0]);
}

#[test]
fn remap_moves_the_window() {
    let page = Native::page_size();
    let content: Vec<u8> = (0..3 * page).map(|i| (i % 251) as u8).collect();
    let mut tmp = tempfile::NamedTempFile::new().unwrap();
    tmp.write_all(&content).unwrap();

    let mut file = MappedFile::new();
    file.map(tmp.path(), AccessFlags::READ_ONLY, Some(page), 0).unwrap();
    assert_eq!(file.as_slice(), &content[..page]);

    let offset = 2 * page + 17;
    file.remap(AccessFlags::READ_ONLY, None, offset as u64).unwrap();
    assert_eq!(file.as_slice(), &content[offset..]);
    assert_eq!(file.offset(), offset as u64);

    file.sync(0, 1).unwrap();
}

#[test]
fn read_only_mappings_stay_read_only() {
    let mut tmp = tempfile::NamedTempFile::new().unwrap();
    tmp.write_all(b"fixed").unwrap();

    let mut file = MappedFile::new();
    file.map(tmp.path(), AccessFlags::READ_ONLY, None, 0).unwrap();
    assert!(!file.is_writable());
    assert!(file.as_mut_slice().is_none());
    assert_eq!(file.resize(100), Err(Error::InvalidArgs));

    // The descriptor itself is read-only, the OS refuses to upgrade the pages.
    let err = file.protect(AccessFlags::READ_WRITE).unwrap_err();
    assert!(err.raw_os_error().is_some());
    assert_eq!(file.access(), AccessFlags::READ_ONLY);

    let mut buf = MappedBuf::new(file);
    assert_eq!(buf.write(b"other"), 0);
    assert_eq!(buf.read_view(5), b"fixed");
}

#[test]
fn hints_and_locks() {
    let mut file = MappedFile::new();
    file.anon_map(Native::page_size()).unwrap();

    if cfg!(all(unix, feature = "advise")) {
        file.advise(Advice::Sequential).unwrap();
        file.advise(Advice::WillNeed).unwrap();
    } else {
        assert_eq!(file.advise(Advice::Random), Err(Error::Unimplemented));
    }

    // Locking can be refused by resource limits, it must not break the mapping.
    if file.lock().is_ok() {
        file.unlock().unwrap();
    }

    file.protect(AccessFlags::READ_ONLY).unwrap();
    assert!(!file.is_writable());
    assert_eq!(file.as_slice().len(), Native::page_size());
}

#[cfg(any(target_os = "linux", target_os = "android"))]
#[test]
fn anonymous_resize_keeps_the_prefix() {
    let mut file = MappedFile::new();
    file.anon_map(10).unwrap();
    file.as_mut_slice().unwrap().copy_from_slice(b"1234567890");

    file.resize(5).unwrap();
    assert_eq!(file.as_slice(), b"12345");

    file.resize(4 * Native::page_size()).unwrap();
    assert_eq!(&file.as_slice()[..5], b"12345");

    file.resize(0).unwrap();
    assert!(!file.is_mapped());
}

#[cfg(any(target_os = "linux", target_os = "android"))]
#[test]
fn resize_within_the_file_keeps_its_length() {
    let page = Native::page_size();
    let mut tmp = tempfile::NamedTempFile::new().unwrap();
    tmp.write_all(&vec![1u8; 2 * page]).unwrap();

    let mut file = MappedFile::new();
    file.map(tmp.path(), AccessFlags::READ_WRITE, Some(page), 0).unwrap();
    file.resize(2 * page).unwrap();
    assert_eq!(file.as_slice(), vec![1u8; 2 * page]);
    file.unmap().unwrap();

    assert_eq!(fs::metadata(tmp.path()).unwrap().len(), 2 * page as u64);
}

#[cfg(any(target_os = "linux", target_os = "android"))]
#[test]
fn resize_past_the_end_of_the_file() {
    let page = Native::page_size();
    let mut tmp = tempfile::NamedTempFile::new().unwrap();
    tmp.write_all(b"0123456789").unwrap();

    let mut buf: MappedBuf = MappedBuf::default();
    buf.map(tmp.path(), AccessFlags::READ_WRITE, None, 0).unwrap();
    assert_eq!(buf.file_mut().resize(3 * page), Err(Error::InvalidArgs));
    assert_eq!(buf.size(), 10);
    assert_eq!(fs::metadata(tmp.path()).unwrap().len(), 10);

    // Nothing past the end of the file is reachable.
    buf.seek(2 * page as i64, Whence::Begin);
    assert_eq!(buf.read_byte(), None);

    // With the right to grow, the file follows the mapping.
    buf.map(tmp.path(), AccessFlags::DEFAULT, None, 0).unwrap();
    buf.file_mut().resize(3 * page).unwrap();
    assert_eq!(fs::metadata(tmp.path()).unwrap().len(), 3 * page as u64);

    buf.seek(2 * page as i64, Whence::Begin);
    assert_eq!(buf.read_byte(), Some(0));
    buf.rewind();
    assert_eq!(buf.read_view(10), b"0123456789");
}

#[cfg(not(any(target_os = "linux", target_os = "android")))]
#[test]
fn resize_without_remap_releases() {
    let mut file = MappedFile::new();
    file.anon_map(10).unwrap();
    assert_eq!(file.resize(5), Err(Error::Unimplemented));
    assert!(!file.is_mapped());
}

#[test]
fn unmap_always_empties() {
    let page = Native::page_size();
    let mut tmp = tempfile::NamedTempFile::new().unwrap();
    tmp.write_all(&vec![0xa5; 2 * page + 100]).unwrap();

    let mut file = MappedFile::new();
    for (length, offset) in [
        (None, 0),
        (Some(1), 0),
        (Some(page), 1),
        (None, page as u64),
        (Some(50), 2 * page as u64 + 49),
        (Some(10 * page), 7),
    ] {
        file.map(tmp.path(), AccessFlags::READ_ONLY, length, offset).unwrap();
        assert!(file.is_mapped());
        assert!(file.as_slice().iter().all(|&b| b == 0xa5));

        file.unmap().unwrap();
        assert!(!file.is_mapped());
        assert_eq!(file.size(), 0);
        assert_eq!(file.unmap(), Ok(()));
    }
}

#[test]
fn buffer_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("round.bin");
    let content: Vec<u8> = (0..=255u8).rev().collect();

    let mut buf: MappedBuf = MappedBuf::default();
    buf.map(&path, AccessFlags::DEFAULT, Some(content.len()), 0).unwrap();
    assert_eq!(buf.write(&content[..100]), 100);
    assert_eq!(buf.write_view(&content[100..]), 156);
    assert!(buf.is_eof());
    buf.flush().unwrap();

    buf.rewind();
    let mut back = vec![0; content.len()];
    assert_eq!(buf.read(&mut back), content.len());
    assert_eq!(back, content);

    let file = buf.pop_file();
    assert_eq!(buf.size(), 0);
    buf.push_file(file);
    assert_eq!(buf.read_view(3), [255, 254, 253]);
}
