//! End-to-end tests for the build pipeline.
//!
//! Each test writes a source into a scratch directory, runs the driver
//! through `LocalStorage`, and inspects the artifacts written next to it.

use linehash::config::Encoding;
use linehash::mph::Artifact;
use linehash::output::InfoRecord;
use linehash::parts::LocalStorage;
use linehash::{build_hash, ComputeHashCommand, HashError};
use std::fs;
use std::path::Path;
use tempfile::TempDir;

// =============================================================================
// Helper functions
// =============================================================================

fn write_source(dir: &TempDir, name: &str, content: &[u8]) -> String {
    let path = dir.path().join(name);
    fs::write(&path, content).unwrap();
    path.to_str().unwrap().to_string()
}

fn exists(path: &str) -> bool {
    Path::new(path).exists()
}

fn greek() -> (TempDir, String) {
    let dir = tempfile::tempdir().unwrap();
    let src = write_source(&dir, "greek.txt", b"alpha\nbeta\ngamma\n");
    (dir, src)
}

// =============================================================================
// Output selection
// =============================================================================

#[test]
fn test_unsigned_build_writes_only_map() {
    let (_dir, src) = greek();
    let n = build_hash(&LocalStorage::new(), &src, 0, false, Encoding::utf8(), false).unwrap();
    assert_eq!(n, 3);
    assert!(exists(&format!("{}.map", src)));
    assert!(!exists(&format!("{}.smap", src)));
    assert!(!exists(&format!("{}.mapinfo", src)));

    let map = Artifact::open(format!("{}.map", src)).unwrap();
    let mut indices: Vec<u64> = ["alpha", "beta", "gamma"]
        .iter()
        .map(|k| map.get(k).unwrap())
        .collect();
    assert_eq!(indices, vec![0, 1, 2]);
    indices.sort();
    indices.dedup();
    assert_eq!(indices.len(), 3);
}

#[test]
fn test_signed_build_without_keep_unsigned() {
    let (_dir, src) = greek();
    let n = build_hash(&LocalStorage::new(), &src, 16, false, Encoding::utf8(), false).unwrap();
    assert_eq!(n, 3);
    assert!(exists(&format!("{}.smap", src)));
    assert!(!exists(&format!("{}.map", src)));

    let smap = Artifact::open(format!("{}.smap", src)).unwrap();
    assert!(smap.is_signed());
    assert_eq!(smap.get("beta"), Some(1));
    assert_eq!(smap.get("delta"), None);
}

#[test]
fn test_info_record_unsigned() {
    let (_dir, src) = greek();
    build_hash(&LocalStorage::new(), &src, 0, false, Encoding::utf8(), true).unwrap();

    let text = fs::read_to_string(format!("{}.mapinfo", src)).unwrap();
    let record = InfoRecord::parse(&text).unwrap();
    assert_eq!(record.size, 3);
    assert_eq!(record.signed_width, None);
    let bits = record.unsigned_bits.unwrap();
    assert!(bits > 0);
    assert_eq!(text, format!("size\t3\nunsignedBits\t{}\n", bits));
}

#[test]
fn test_info_record_signed_and_unsigned() {
    let (_dir, src) = greek();
    build_hash(&LocalStorage::new(), &src, 8, true, Encoding::utf8(), true).unwrap();

    let text = fs::read_to_string(format!("{}.mapinfo", src)).unwrap();
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines.len(), 3);
    assert_eq!(lines[0], "size\t3");
    assert!(lines[1].starts_with("unsignedBits\t"));
    assert_eq!(lines[2], "signedWidth\t8");
    assert!(text.ends_with('\n'));
}

#[test]
fn test_rebuild_overwrites() {
    let (dir, src) = greek();
    let storage = LocalStorage::new();
    build_hash(&storage, &src, 0, false, Encoding::utf8(), false).unwrap();
    write_source(&dir, "greek.txt", b"omega\n");
    assert_eq!(
        build_hash(&storage, &src, 0, false, Encoding::utf8(), false).unwrap(),
        1
    );
    let map = Artifact::open(format!("{}.map", src)).unwrap();
    assert_eq!(map.size64(), 1);
    assert_eq!(map.get("omega"), Some(0));
}

// =============================================================================
// Edge cases
// =============================================================================

#[test]
fn test_duplicate_key_writes_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let src = write_source(&dir, "dups.txt", b"x\nx\n");
    let err = build_hash(&LocalStorage::new(), &src, 16, true, Encoding::utf8(), true).unwrap_err();
    match err {
        HashError::DuplicateKey(key) => assert_eq!(key, "x"),
        other => panic!("expected duplicate key, got {}", other),
    }
    assert!(!exists(&format!("{}.map", src)));
    assert!(!exists(&format!("{}.smap", src)));
    assert!(!exists(&format!("{}.mapinfo", src)));
}

#[test]
fn test_empty_source() {
    let dir = tempfile::tempdir().unwrap();
    let src = write_source(&dir, "empty.txt", b"");
    let n = build_hash(&LocalStorage::new(), &src, 0, false, Encoding::utf8(), true).unwrap();
    assert_eq!(n, 0);

    let map = Artifact::open(format!("{}.map", src)).unwrap();
    assert_eq!(map.size64(), 0);
    let info = InfoRecord::parse(&fs::read_to_string(format!("{}.mapinfo", src)).unwrap()).unwrap();
    assert_eq!(info.size, 0);
}

#[test]
fn test_crlf_and_missing_final_newline() {
    let dir = tempfile::tempdir().unwrap();
    let src = write_source(&dir, "crlf.txt", b"one\r\ntwo\r\nthree");
    let n = build_hash(&LocalStorage::new(), &src, 32, false, Encoding::utf8(), false).unwrap();
    assert_eq!(n, 3);
    let smap = Artifact::open(format!("{}.smap", src)).unwrap();
    assert_eq!(smap.get("two"), Some(1));
    assert_eq!(smap.get("three"), Some(2));
    assert_eq!(smap.get("two\r"), None);
}

#[test]
fn test_lone_carriage_returns_end_lines() {
    let dir = tempfile::tempdir().unwrap();
    let src = write_source(&dir, "cr.txt", b"one\rtwo\r\nthree\rfour\n");
    let n = build_hash(&LocalStorage::new(), &src, 16, false, Encoding::utf8(), false).unwrap();
    assert_eq!(n, 4);
    let smap = Artifact::open(format!("{}.smap", src)).unwrap();
    assert_eq!(smap.get("one"), Some(0));
    assert_eq!(smap.get("three"), Some(2));
    assert_eq!(smap.get("four"), Some(3));
    assert_eq!(smap.get("one\rtwo"), None);
}

// =============================================================================
// Sources: parts, compression, encodings
// =============================================================================

#[test]
fn test_part_directory() {
    let dir = tempfile::tempdir().unwrap();
    let parts = dir.path().join("keys");
    fs::create_dir(&parts).unwrap();
    fs::write(parts.join("part-00001"), "c\nd\n").unwrap();
    fs::write(parts.join("part-00000"), "a\nb\n").unwrap();
    let compressed = zstd::encode_all(&b"e\nf\n"[..], 3).unwrap();
    fs::write(parts.join("part-00002.zst"), compressed).unwrap();
    fs::write(parts.join("_SUCCESS"), "").unwrap();
    fs::write(parts.join(".part-00000.crc"), "junk\n").unwrap();

    let src = format!("{}/", parts.to_str().unwrap());
    let n = build_hash(&LocalStorage::new(), &src, 0, false, Encoding::utf8(), false).unwrap();
    assert_eq!(n, 6);

    let map = Artifact::open(format!("{}.map", parts.to_str().unwrap())).unwrap();
    for (i, key) in ["a", "b", "c", "d", "e", "f"].iter().enumerate() {
        assert_eq!(map.get(key), Some(i as u64));
    }
}

#[test]
fn test_empty_part_directory_fails() {
    let dir = tempfile::tempdir().unwrap();
    let parts = dir.path().join("nothing");
    fs::create_dir(&parts).unwrap();
    fs::write(parts.join("_SUCCESS"), "").unwrap();

    let err = build_hash(
        &LocalStorage::new(),
        parts.to_str().unwrap(),
        0,
        false,
        Encoding::utf8(),
        false,
    )
    .unwrap_err();
    assert!(matches!(err, HashError::Open { .. }));
}

#[test]
fn test_compressed_source_strips_suffix() {
    let dir = tempfile::tempdir().unwrap();
    let compressed = zstd::encode_all(&b"red\ngreen\nblue\n"[..], 3).unwrap();
    let src = write_source(&dir, "colors.txt.zst", &compressed);

    let n = build_hash(&LocalStorage::new(), &src, 0, false, Encoding::utf8(), true).unwrap();
    assert_eq!(n, 3);

    let base = dir.path().join("colors.txt");
    let base = base.to_str().unwrap();
    assert!(exists(&format!("{}.map", base)));
    assert!(exists(&format!("{}.mapinfo", base)));
    assert!(!exists(&format!("{}.map", src)));
}

#[test]
fn test_windows_1252_source() {
    let dir = tempfile::tempdir().unwrap();
    let src = write_source(&dir, "latin1.txt", b"caf\xe9\nna\xefve\n\x805\n");

    let err = build_hash(&LocalStorage::new(), &src, 0, false, Encoding::utf8(), false).unwrap_err();
    assert!(matches!(err, HashError::Decode { line: 1, .. }));

    let latin1: Encoding = "latin1".parse().unwrap();
    assert_eq!(latin1, Encoding::windows_1252());
    let n = build_hash(&LocalStorage::new(), &src, 16, false, latin1, false).unwrap();
    assert_eq!(n, 3);
    let smap = Artifact::open(format!("{}.smap", src)).unwrap();
    assert_eq!(smap.get("café"), Some(0));
    assert_eq!(smap.get("naïve"), Some(1));
    assert_eq!(smap.get("€5"), Some(2));
}

fn utf16(text: &str, big_endian: bool) -> Vec<u8> {
    text.encode_utf16()
        .flat_map(|u| if big_endian { u.to_be_bytes() } else { u.to_le_bytes() })
        .collect()
}

#[test]
fn test_utf16_sources() {
    let dir = tempfile::tempdir().unwrap();
    let text = "ключ\r\n鍵\r\nclé\r\n🔑\r\n";
    for (name, big_endian) in [("UTF-16LE", false), ("UTF-16BE", true)] {
        let src = write_source(&dir, &format!("{}.txt", name), &utf16(text, big_endian));
        let encoding: Encoding = name.parse().unwrap();
        let n = build_hash(&LocalStorage::new(), &src, 24, false, encoding, false).unwrap();
        assert_eq!(n, 4, "{}", name);
        let smap = Artifact::open(format!("{}.smap", src)).unwrap();
        for (i, key) in ["ключ", "鍵", "clé", "🔑"].iter().enumerate() {
            assert_eq!(smap.get(key), Some(i as u64), "{} {}", name, key);
        }

        // Read as UTF-8 the same bytes are not valid keys.
        assert!(build_hash(&LocalStorage::new(), &src, 0, false, Encoding::utf8(), false).is_err());
    }
}

#[test]
fn test_utf16_code_unit_split_between_parts() {
    let dir = tempfile::tempdir().unwrap();
    let parts = dir.path().join("wide");
    fs::create_dir(&parts).unwrap();
    let bytes = utf16("ä\nö\nü\n", false);
    // Cut inside the second code unit.
    fs::write(parts.join("part-00000"), &bytes[..3]).unwrap();
    let tail = zstd::encode_all(&bytes[3..], 3).unwrap();
    fs::write(parts.join("part-00001.zst"), tail).unwrap();

    let src = parts.to_str().unwrap();
    let n = build_hash(&LocalStorage::new(), src, 0, false, Encoding::utf16le(), false).unwrap();
    assert_eq!(n, 3);
    let map = Artifact::open(format!("{}.map", src)).unwrap();
    assert_eq!(map.get("ü"), Some(2));
}

#[test]
fn test_seed_does_not_change_indices() {
    let dir = tempfile::tempdir().unwrap();
    let keys: Vec<String> = (0..2000).map(|i| format!("user:{}", i * 31)).collect();
    let src = write_source(&dir, "users.txt", keys.join("\n").as_bytes());

    let storage = LocalStorage::new();
    ComputeHashCommand::new()
        .with_seed(99)
        .run(&storage, &src)
        .unwrap();
    let map = Artifact::open(format!("{}.map", src)).unwrap();
    for (i, key) in keys.iter().enumerate() {
        assert_eq!(map.get(key), Some(i as u64));
    }
}

#[cfg(unix)]
#[test]
fn test_artifact_permissions() {
    use std::os::unix::fs::PermissionsExt;

    let (_dir, src) = greek();
    build_hash(&LocalStorage::new(), &src, 0, false, Encoding::utf8(), false).unwrap();
    let mode = fs::metadata(format!("{}.map", src)).unwrap().permissions().mode();
    assert_eq!(mode & 0o777, 0o777);

    let restricted = LocalStorage::new().with_permissions(Some(0o640));
    build_hash(&restricted, &src, 0, false, Encoding::utf8(), false).unwrap();
    let mode = fs::metadata(format!("{}.map", src)).unwrap().permissions().mode();
    assert_eq!(mode & 0o777, 0o640);
}
