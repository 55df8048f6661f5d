mod common;

use common::CacheWriter;
use js5fs::FileStore;

#[test]
fn single_sector_read() {
    let dir = tempfile::tempdir().unwrap();

    // One normal sector holding archive 7 of index 2, written by hand:
    // archive id, chunk 0, next 0, index id, then 3 payload bytes + padding.
    let mut dat2 = vec![0, 7, 0, 0, 0, 0, 0, 2, 0xAA, 0xBB, 0xCC];
    dat2.resize(common::SECTOR_SIZE, 0);
    std::fs::write(dir.path().join("main_file_cache.dat2"), &dat2).unwrap();

    // 6-byte index record at offset 7 * 6: length 3, start sector 0.
    let mut idx2 = vec![0; 7 * 6];
    idx2.extend(&[0, 0, 3, 0, 0, 0]);
    std::fs::write(dir.path().join("main_file_cache.idx2"), &idx2).unwrap();

    for index_id in [0, 1, 255] {
        std::fs::write(
            dir.path().join(format!("main_file_cache.idx{}", index_id)),
            [],
        )
        .unwrap();
    }

    let store = FileStore::open(dir.path()).unwrap();
    assert_eq!(store.read(2, 7).unwrap(), vec![0xAA, 0xBB, 0xCC]);
}

#[test]
fn multi_sector_chain() {
    let dir = tempfile::tempdir().unwrap();

    let data: Vec<u8> = (0..1000_u32).map(|i| i as u8).collect();
    let mut writer = CacheWriter::new();
    writer.put(0, 12, &data);
    writer.write_to(dir.path());

    let store = FileStore::open(dir.path()).unwrap();
    assert_eq!(store.read(0, 12).unwrap(), data);
}

#[test]
fn expanded_archive_read() {
    let dir = tempfile::tempdir().unwrap();

    let wide: Vec<u8> = (0..1337_u32).map(|i| (i * 7) as u8).collect();
    let narrow = vec![5; 100];
    let mut writer = CacheWriter::new();
    // Normal and expanded chains mix freely within one data file.
    writer.put(0, 3, &narrow);
    writer.put(0, 0x10001, &wide);
    writer.write_to(dir.path());

    let store = FileStore::open(dir.path()).unwrap();
    assert_eq!(store.read(0, 0x10001).unwrap(), wide);
    assert_eq!(store.read(0, 3).unwrap(), narrow);
}

#[test]
fn store_queries() {
    let dir = tempfile::tempdir().unwrap();

    let mut writer = CacheWriter::new();
    writer.put(0, 0, b"a");
    writer.put(1, 4, b"b");
    writer.write_to(dir.path());

    let store = FileStore::open(dir.path()).unwrap();
    assert_eq!(store.index_count(), 2);
    assert!(store.has_data());
    assert_eq!(store.entry_count(1).unwrap(), 5);
    assert!(store.entry_count(9).is_err());

    let archive = store.archive_ref(1, 4).unwrap();
    assert_eq!(archive.length, 1);
}

#[test]
fn discovery_stops_at_first_gap() {
    let dir = tempfile::tempdir().unwrap();

    let mut writer = CacheWriter::new();
    writer.put(0, 0, b"a");
    writer.write_to(dir.path());
    // An index file beyond a gap is not part of the contiguous prefix.
    std::fs::write(dir.path().join("main_file_cache.idx2"), []).unwrap();

    let store = FileStore::open(dir.path()).unwrap();
    assert_eq!(store.index_count(), 1);
    assert!(store.read(2, 0).is_err());
}

#[test]
fn open_without_data_file_fails() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("main_file_cache.idx0"), []).unwrap();
    std::fs::write(dir.path().join("main_file_cache.idx255"), []).unwrap();

    assert!(FileStore::open(dir.path()).is_err());
}

#[test]
fn open_without_reference_index_fails() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("main_file_cache.dat2"), [0]).unwrap();
    std::fs::write(dir.path().join("main_file_cache.idx0"), []).unwrap();

    assert!(FileStore::open(dir.path()).is_err());
}

#[test]
fn open_without_any_data_index_fails() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("main_file_cache.dat2"), [0]).unwrap();
    std::fs::write(dir.path().join("main_file_cache.idx255"), []).unwrap();

    assert!(FileStore::open(dir.path()).is_err());
}

#[test]
fn sector_of_foreign_index_rejected() {
    let dir = tempfile::tempdir().unwrap();

    let mut writer = CacheWriter::new();
    writer.put(1, 12, b"not yours");
    writer.write_to(dir.path());

    // Claim archive (0, 12) points at index 1's chain.
    let mut idx0 = vec![0; 12 * 6];
    idx0.extend(&[0, 0, 9, 0, 0, 0]);
    std::fs::write(dir.path().join("main_file_cache.idx0"), idx0).unwrap();

    let store = FileStore::open(dir.path()).unwrap();
    assert!(store.read(0, 12).is_err());
    assert!(store.read(1, 12).is_ok());
}

#[test]
fn truncated_chain_rejected() {
    let dir = tempfile::tempdir().unwrap();

    let mut writer = CacheWriter::new();
    writer.put(0, 0, &vec![1; 600]);
    writer.write_to(dir.path());

    // Lie about the length so the chain runs off the end of the file.
    let mut idx0 = Vec::new();
    idx0.extend(&[0, 8, 0, 0, 0, 0]); // length 2048, start sector 0
    std::fs::write(dir.path().join("main_file_cache.idx0"), idx0).unwrap();

    let store = FileStore::open(dir.path()).unwrap();
    assert!(store.read(0, 0).is_err());
}
