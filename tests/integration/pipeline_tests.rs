use fsdedup::duplicates::{DuplicateFinder, FinderConfig, FinderError, HashConfig};
use fsdedup::scanner::{expand_paths, HashAlgorithm, Hasher, ScanError};
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::tempdir;

const MIB: usize = 1024 * 1024;

fn write(dir: &Path, name: &str, content: &[u8]) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, content).unwrap();
    path
}

fn finder(min_size: u64) -> DuplicateFinder {
    DuplicateFinder::new(FinderConfig::default().with_min_size(min_size))
}

#[test]
fn test_three_identical_and_one_different_same_size() {
    let dir = tempdir().unwrap();
    let same = vec![0x5a; MIB];
    let mut different = same.clone();
    different[MIB - 1] = 0x00;

    let paths = vec![
        write(dir.path(), "a", &same),
        write(dir.path(), "b", &same),
        write(dir.path(), "c", &same),
        write(dir.path(), "d", &different),
    ];

    let report = finder(MIB as u64).find_duplicates(&paths).unwrap();

    assert_eq!(report.groups.len(), 1);
    let group = &report.groups[0];
    assert_eq!(group.paths(), paths[..3].to_vec());
    assert_eq!(group.origin().unwrap().path, paths[0]);
    assert_eq!(group.size, MIB as u64);
    assert_eq!(report.summary.reclaimable_bytes, 2 * MIB as u64);
    assert_eq!(report.summary.hashing.unique_digests, 1);
    assert!(report.skipped.is_empty());
}

#[test]
fn test_files_below_threshold_are_never_grouped() {
    let dir = tempdir().unwrap();
    let paths = vec![
        write(dir.path(), "small1", b"tiny"),
        write(dir.path(), "small2", b"tiny"),
        write(dir.path(), "big1", &[1u8; 2048]),
        write(dir.path(), "big2", &[1u8; 2048]),
    ];

    let report = finder(1024).find_duplicates(&paths).unwrap();

    assert_eq!(report.groups.len(), 1);
    assert!(report.groups[0].files.iter().all(|f| f.size >= 1024));
    assert_eq!(report.summary.grouping.below_threshold, 2);
    assert_eq!(report.summary.grouping.total_files, 4);
}

#[test]
fn test_unique_sizes_are_not_hashed() {
    let dir = tempdir().unwrap();
    let paths = vec![
        write(dir.path(), "a", b"one"),
        write(dir.path(), "b", b"three"),
        write(dir.path(), "c", b"seventeen"),
    ];

    let report = finder(0).find_duplicates(&paths).unwrap();

    assert!(report.groups.is_empty());
    assert_eq!(report.summary.hashing.input_files, 0);
    assert_eq!(report.summary.grouping.eliminated_unique, 3);
}

#[test]
fn test_empty_files_are_not_grouped() {
    let dir = tempdir().unwrap();
    let paths = vec![
        write(dir.path(), "e1", b""),
        write(dir.path(), "e2", b""),
    ];

    let report = finder(0).find_duplicates(&paths).unwrap();

    assert!(report.groups.is_empty());
    assert_eq!(report.summary.grouping.empty_files, 2);
}

#[test]
fn test_missing_path_is_fatal() {
    let dir = tempdir().unwrap();
    let paths = vec![write(dir.path(), "a", b"data"), dir.path().join("ghost")];

    let err = finder(0).find_duplicates(&paths).unwrap_err();
    match err {
        FinderError::Metadata(ScanError::NotFound(path)) => {
            assert_eq!(path, dir.path().join("ghost"));
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[test]
fn test_repeated_argument_counted_once() {
    let dir = tempdir().unwrap();
    let a = write(dir.path(), "a", b"payload");
    let b = write(dir.path(), "b", b"payload");

    let report = finder(0)
        .find_duplicates(&[a.clone(), a.clone(), b.clone()])
        .unwrap();

    assert_eq!(report.groups.len(), 1);
    assert_eq!(report.groups[0].paths(), vec![a, b]);
    assert_eq!(report.summary.grouping.hardlinks, 1);
}

#[cfg(unix)]
#[test]
fn test_hardlinks_are_skipped() {
    let dir = tempdir().unwrap();
    let a = write(dir.path(), "a", b"linked content");
    let link = dir.path().join("link");
    fs::hard_link(&a, &link).unwrap();

    let report = finder(0).find_duplicates(&[a, link]).unwrap();

    assert!(report.groups.is_empty());
    assert_eq!(report.summary.grouping.hardlinks, 1);
}

#[test]
fn test_origin_follows_input_order() {
    let dir = tempdir().unwrap();
    let x = write(dir.path(), "x", b"shared");
    let y = write(dir.path(), "y", b"shared");
    let z = write(dir.path(), "z", b"shared");

    let report = finder(0)
        .find_duplicates(&[z.clone(), x.clone(), y.clone()])
        .unwrap();

    assert_eq!(report.groups[0].paths(), vec![z, x, y]);
}

#[test]
fn test_groups_ordered_largest_first() {
    let dir = tempdir().unwrap();
    let paths = vec![
        write(dir.path(), "s1", &[1u8; 10]),
        write(dir.path(), "s2", &[1u8; 10]),
        write(dir.path(), "l1", &[2u8; 100]),
        write(dir.path(), "l2", &[2u8; 100]),
    ];

    let report = finder(0).find_duplicates(&paths).unwrap();

    let sizes: Vec<u64> = report.groups.iter().map(|g| g.size).collect();
    assert_eq!(sizes, vec![100, 10]);
}

#[test]
fn test_sha256_and_blake3_agree_on_grouping() {
    let dir = tempdir().unwrap();
    let paths = vec![
        write(dir.path(), "a", b"alpha-1"),
        write(dir.path(), "b", b"alpha-1"),
        write(dir.path(), "c", b"alpha-2"),
    ];

    let run = |algorithm| {
        DuplicateFinder::new(
            FinderConfig::default()
                .with_min_size(0)
                .with_hasher(Hasher::new().with_algorithm(algorithm)),
        )
        .find_duplicates(&paths)
        .unwrap()
    };
    let blake = run(HashAlgorithm::Blake3);
    let sha = run(HashAlgorithm::Sha256);

    assert_eq!(blake.groups.len(), 1);
    assert_eq!(blake.groups[0].paths(), sha.groups[0].paths());
    assert_ne!(blake.groups[0].digest, sha.groups[0].digest);
}

#[test]
fn test_unreadable_member_skips_only_its_size_group() {
    let dir = tempdir().unwrap();
    let paths = vec![
        write(dir.path(), "a", b"group one"),
        write(dir.path(), "b", b"group one"),
        write(dir.path(), "c", b"group one"),
        write(dir.path(), "x", b"second group!"),
        write(dir.path(), "y", b"second group!"),
    ];
    let finder = finder(0);
    let (size_groups, _) =
        fsdedup::duplicates::group_paths_by_size(&paths, finder.config().min_size).unwrap();
    fs::remove_file(&paths[1]).unwrap();

    let report = finder.find_in_size_groups(size_groups);

    assert_eq!(report.groups.len(), 1);
    assert_eq!(report.groups[0].paths(), vec![paths[3].clone(), paths[4].clone()]);
    assert_eq!(report.skipped.len(), 1);
    assert_eq!(report.skipped[0].size, 9);
    assert!(report.skipped[0].errors.contains_key(&paths[1]));
    assert_eq!(report.summary.reclaimable_bytes, 13);
}

#[cfg(unix)]
#[test]
fn test_permission_denied_member_reported() {
    use std::os::unix::fs::PermissionsExt;

    let dir = tempdir().unwrap();
    let a = write(dir.path(), "a", b"locked content");
    let b = write(dir.path(), "b", b"locked content");
    fs::set_permissions(&b, fs::Permissions::from_mode(0o000)).unwrap();

    // Privileged users can still read the file
    if fs::read(&b).is_ok() {
        return;
    }

    let report = finder(0).find_duplicates(&[a, b.clone()]).unwrap();
    assert!(report.groups.is_empty());
    assert_eq!(report.skipped.len(), 1);
    assert!(report.skipped[0].errors.contains_key(&b));
}

#[test]
fn test_expand_then_find_recursive() {
    let dir = tempdir().unwrap();
    fs::create_dir_all(dir.path().join("nested/deeper")).unwrap();
    write(dir.path(), "top.bin", b"tree content");
    write(&dir.path().join("nested"), "mid.bin", b"tree content");
    write(&dir.path().join("nested/deeper"), "low.bin", b"tree content");
    write(&dir.path().join("nested"), "other.bin", b"unrelated!!!");

    let paths = expand_paths(&[dir.path()], true).unwrap();
    assert_eq!(paths.len(), 4);

    let report = finder(0).find_duplicates(&paths).unwrap();
    assert_eq!(report.groups.len(), 1);
    assert_eq!(report.groups[0].len(), 3);

    // Sorted traversal makes the origin reproducible
    let again = finder(0)
        .find_duplicates(&expand_paths(&[dir.path()], true).unwrap())
        .unwrap();
    assert_eq!(again.groups[0].paths(), report.groups[0].paths());
}

#[test]
fn test_directory_without_recursion_rejected() {
    let dir = tempdir().unwrap();
    let err = expand_paths(&[dir.path()], false).unwrap_err();
    assert!(matches!(err, ScanError::IsADirectory(_)));
}

#[test]
fn test_single_worker_single_slot_channel() {
    let dir = tempdir().unwrap();
    let paths: Vec<_> = (0..20)
        .map(|i| write(dir.path(), &format!("f{i:02}"), format!("{}", i % 4).as_bytes()))
        .collect();

    let config = FinderConfig::default().with_min_size(0).with_hash_config(
        HashConfig::default()
            .with_io_threads(1)
            .with_channel_capacity(1),
    );
    let report = DuplicateFinder::new(config).find_duplicates(&paths).unwrap();

    assert_eq!(report.groups.len(), 4);
    assert!(report.groups.iter().all(|g| g.len() == 5));
    assert_eq!(report.summary.reclaimable_bytes, 16);
}
