//! Literal boundary scenarios, driven entirely through the public
//! `FileSystem`/`Session` API rather than any module-internal type.

use blockfs_core::{BitmapFreeMap, FileSystem, InMemoryDevice, Session};

fn format(sector_count: u32) -> FileSystem<InMemoryDevice, BitmapFreeMap> {
    let device = InMemoryDevice::new(sector_count);
    let freemap = BitmapFreeMap::new(sector_count);
    FileSystem::format(device, freemap).unwrap()
}

/// 1. Format sector_count=4096, create "x", write "hello" at 0, close,
///    reopen, read 5 bytes -> "hello"; filesize("x") = 5.
#[test]
fn scenario_1_basic_write_read_roundtrip() {
    let fs = format(4096);
    let session = Session::new(&fs);

    session.create("x", 0).unwrap();
    let fd = session.open("x").unwrap();
    session.write(fd, b"hello").unwrap();
    session.close(fd).unwrap();

    let fd = session.open("x").unwrap();
    let mut buf = [0u8; 5];
    assert_eq!(session.read(fd, &mut buf).unwrap(), 5);
    assert_eq!(&buf, b"hello");
    assert_eq!(session.filesize(fd).unwrap(), 5);
    session.close(fd).unwrap();
}

/// 2. Create "sparse", write "end" at offset 65536, close, reopen, read 4
///    bytes at 0 -> four NULs; read 3 bytes at 65536 -> "end"; filesize =
///    65539.
#[test]
fn scenario_2_sparse_hole_reads_as_zero() {
    let fs = format(4096);
    let session = Session::new(&fs);

    session.create("sparse", 0).unwrap();
    let fd = session.open("sparse").unwrap();
    session.seek(fd, 65536).unwrap();
    session.write(fd, b"end").unwrap();
    session.close(fd).unwrap();

    let fd = session.open("sparse").unwrap();
    let mut head = [0xaau8; 4];
    session.seek(fd, 0).unwrap();
    assert_eq!(session.read(fd, &mut head).unwrap(), 4);
    assert_eq!(head, [0u8; 4]);

    let mut tail = [0u8; 3];
    session.seek(fd, 65536).unwrap();
    assert_eq!(session.read(fd, &mut tail).unwrap(), 3);
    assert_eq!(&tail, b"end");

    assert_eq!(session.filesize(fd).unwrap(), 65539);
    session.close(fd).unwrap();
}

/// 3. Create 65 distinct files each with one sector of unique content; close
///    all. The cache has 64 frames, so this forces eviction and writeback;
///    every file's content must still read back correctly after reopen.
#[test]
fn scenario_3_eviction_storm_preserves_every_file() {
    let fs = format(4096);
    let session = Session::new(&fs);

    const N: usize = 65;
    for i in 0..N {
        let name = format!("f{i}");
        session.create(&name, 0).unwrap();
        let fd = session.open(&name).unwrap();
        let content = vec![i as u8; 512];
        session.write(fd, &content).unwrap();
        session.close(fd).unwrap();
    }

    for i in 0..N {
        let name = format!("f{i}");
        let fd = session.open(&name).unwrap();
        let mut buf = vec![0u8; 512];
        assert_eq!(session.read(fd, &mut buf).unwrap(), 512);
        assert!(buf.iter().all(|&b| b == i as u8), "file f{i} corrupted");
        session.close(fd).unwrap();
    }
}

/// 4. mkdir "/a"; mkdir "/a/b"; create "/a/b/c"; resolve_parent("/a/b/c") ->
///    (dir(/a/b), "c"); remove("/a/b") -> NotEmpty.
#[test]
fn scenario_4_resolve_parent_and_nonempty_remove() {
    let fs = format(4096);
    let session = Session::new(&fs);

    session.mkdir("/a").unwrap();
    session.mkdir("/a/b").unwrap();
    session.create("/a/b/c", 0).unwrap();

    let (parent, name) = fs.resolve_parent(None, "/a/b/c").unwrap();
    let b = fs.resolve(None, "/a/b").unwrap();
    assert_eq!(parent.sector(), b.sector());
    assert_eq!(name.as_str(), "c");
    fs.close_inode(parent).unwrap();
    fs.close_inode(b).unwrap();

    assert!(matches!(
        session.remove("/a/b"),
        Err(blockfs_core::FsError::NotEmpty)
    ));
}

/// 5 & 6. deny_write coordination: a write from one handle is silently
/// dropped to zero while another handle holds a deny-write lease, and
/// succeeds again once the lease is released.
#[test]
fn scenario_5_6_deny_write_blocks_then_releases() {
    let fs = format(4096);
    let session = Session::new(&fs);

    session.create("f", 0).unwrap();
    let writer = session.open("f").unwrap();
    let locker = session.open("f").unwrap();

    session.deny_write(locker).unwrap();
    assert_eq!(session.write(writer, &[0u8; 4096]).unwrap(), 0);

    session.allow_write(locker).unwrap();
    assert_eq!(session.write(writer, &[0u8; 4096]).unwrap(), 4096);

    session.close(writer).unwrap();
    session.close(locker).unwrap();
}
