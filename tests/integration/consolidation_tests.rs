#![cfg(unix)]

use filetime::{set_file_mtime, FileTime};
use fsdedup::actions::{
    CloneError, ConsolidationConfig, ConsolidationEngine, ExtentCloner, UnsupportedCloner,
};
use fsdedup::duplicates::{DuplicateFinder, FinderConfig, ScanReport};
use std::collections::{HashMap, HashSet};
use std::fs::{self, File};
use std::io;
use std::os::unix::fs::MetadataExt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tempfile::{tempdir, TempDir};

type Inode = (u64, u64);

fn inode(file: &File) -> io::Result<Inode> {
    let metadata = file.metadata()?;
    Ok((metadata.dev(), metadata.ino()))
}

/// Models reflinks on any filesystem: each inode points at an extent id,
/// and cloning copies the source's id onto the destination.
#[derive(Default)]
struct ModelCloner {
    extents: Mutex<HashMap<Inode, u64>>,
    refuse: Mutex<HashSet<Inode>>,
    clone_calls: Mutex<usize>,
}

impl ModelCloner {
    fn refuse(&self, path: &Path) {
        let metadata = fs::metadata(path).unwrap();
        self.refuse
            .lock()
            .unwrap()
            .insert((metadata.dev(), metadata.ino()));
    }

    fn calls(&self) -> usize {
        *self.clone_calls.lock().unwrap()
    }
}

impl ExtentCloner for ModelCloner {
    fn name(&self) -> &'static str {
        "model"
    }

    fn clone_extents(&self, source: &File, dest: &File) -> io::Result<()> {
        *self.clone_calls.lock().unwrap() += 1;
        let (src, dst) = (inode(source)?, inode(dest)?);
        if self.refuse.lock().unwrap().contains(&dst) {
            return Err(io::Error::new(
                io::ErrorKind::Unsupported,
                "filesystem does not support reflinks",
            ));
        }
        let mut extents = self.extents.lock().unwrap();
        let id = *extents.entry(src).or_insert(src.1);
        extents.insert(dst, id);
        Ok(())
    }

    fn shares_extents(&self, a: &File, b: &File) -> io::Result<bool> {
        let extents = self.extents.lock().unwrap();
        let (a, b) = (inode(a)?, inode(b)?);
        Ok(matches!((extents.get(&a), extents.get(&b)), (Some(x), Some(y)) if x == y))
    }
}

fn duplicates(dir: &TempDir, names: &[&str], content: &[u8]) -> Vec<PathBuf> {
    names
        .iter()
        .map(|name| {
            let path = dir.path().join(name);
            fs::write(&path, content).unwrap();
            path
        })
        .collect()
}

fn scan(paths: &[PathBuf], cloner: Arc<dyn ExtentCloner>) -> ScanReport {
    DuplicateFinder::new(
        FinderConfig::default()
            .with_min_size(0)
            .with_extent_probe(cloner),
    )
    .find_duplicates(paths)
    .unwrap()
}

#[test]
fn test_consolidation_clones_every_member_onto_origin() {
    let dir = tempdir().unwrap();
    let paths = duplicates(&dir, &["a", "b", "c"], b"identical bytes");
    let cloner = Arc::new(ModelCloner::default());

    let report = scan(&paths, cloner.clone());
    let batch = ConsolidationEngine::new(cloner.clone()).consolidate_all(&report.groups);

    assert!(batch.all_succeeded());
    assert_eq!(batch.outcomes.len(), 1);
    assert_eq!(batch.outcomes[0].origin, paths[0]);
    assert_eq!(batch.outcomes[0].cloned, paths[1..].to_vec());
    assert_eq!(batch.bytes_shared(), 2 * 15);
    assert_eq!(cloner.calls(), 2);
}

#[test]
fn test_second_run_is_idempotent() {
    let dir = tempdir().unwrap();
    let paths = duplicates(&dir, &["a", "b", "c"], b"run me twice");
    let cloner = Arc::new(ModelCloner::default());

    let first = scan(&paths, cloner.clone());
    assert_eq!(first.summary.reclaimable_bytes, 24);
    let batch = ConsolidationEngine::new(cloner.clone()).consolidate_all(&first.groups);
    assert!(batch.all_succeeded());

    let second = scan(&paths, cloner.clone());
    assert_eq!(second.summary.reclaimable_bytes, 0);
    assert_eq!(second.summary.already_shared, 2);

    let again = ConsolidationEngine::new(cloner.clone()).consolidate_all(&second.groups);
    assert!(again.all_succeeded());
    assert_eq!(again.cloned_count(), 0);
    assert_eq!(again.already_shared_count(), 2);
    assert_eq!(cloner.calls(), 2);
}

#[test]
fn test_unsupported_member_failure_is_collected() {
    let dir = tempdir().unwrap();
    let paths = duplicates(&dir, &["a", "b"], b"two of a kind");
    let cloner = Arc::new(ModelCloner::default());
    cloner.refuse(&paths[1]);

    let report = scan(&paths, cloner.clone());
    let reclaimable_before = report.groups[0].reclaimable_bytes();
    let outcome = ConsolidationEngine::new(cloner).consolidate(&report.groups[0]);

    assert!(outcome.cloned.is_empty());
    assert!(matches!(
        outcome.failures.get(&paths[1]),
        Some(CloneError::Unsupported(p)) if *p == paths[1]
    ));
    assert_eq!(report.groups[0].reclaimable_bytes(), reclaimable_before);
    assert_eq!(reclaimable_before, 13);
}

#[test]
fn test_failure_does_not_stop_remaining_members_or_groups() {
    let dir = tempdir().unwrap();
    let mut paths = duplicates(&dir, &["a", "b", "c"], b"first group");
    paths.extend(duplicates(&dir, &["x", "y"], b"second group, longer"));
    let cloner = Arc::new(ModelCloner::default());
    cloner.refuse(&paths[1]);

    let report = scan(&paths, cloner.clone());
    let batch = ConsolidationEngine::new(cloner).consolidate_all(&report.groups);

    assert_eq!(batch.failure_count(), 1);
    assert_eq!(batch.cloned_count(), 2);
    assert!(!batch.all_succeeded());
    assert!(batch.summary().contains("1 failed"));
}

#[test]
fn test_missing_origin_fails_every_member() {
    let dir = tempdir().unwrap();
    let paths = duplicates(&dir, &["a", "b", "c"], b"origin goes away");
    let cloner = Arc::new(ModelCloner::default());

    let report = scan(&paths, cloner.clone());
    fs::remove_file(&paths[0]).unwrap();
    let outcome = ConsolidationEngine::new(cloner.clone()).consolidate(&report.groups[0]);

    assert_eq!(outcome.failures.len(), 2);
    assert!(outcome
        .failures
        .values()
        .all(|e| matches!(e, CloneError::OriginUnavailable { .. })));
    assert_eq!(cloner.calls(), 0);
}

#[test]
fn test_member_modified_after_hashing_is_not_cloned() {
    let dir = tempdir().unwrap();
    let paths = duplicates(&dir, &["a", "b"], b"touched later");
    let cloner = Arc::new(ModelCloner::default());

    let report = scan(&paths, cloner.clone());
    set_file_mtime(&paths[1], FileTime::from_unix_time(1_000_000_000, 0)).unwrap();

    let outcome = ConsolidationEngine::new(cloner.clone()).consolidate(&report.groups[0]);
    assert!(matches!(
        outcome.failures.get(&paths[1]),
        Some(CloneError::Modified(_))
    ));
    assert_eq!(cloner.calls(), 0);

    let unchecked = ConsolidationEngine::new(cloner.clone())
        .with_config(ConsolidationConfig::default().with_verify_before_clone(false))
        .consolidate(&report.groups[0]);
    assert!(unchecked.is_success());
    assert_eq!(cloner.calls(), 1);
}

#[test]
fn test_member_resized_after_hashing_is_not_cloned() {
    let dir = tempdir().unwrap();
    let paths = duplicates(&dir, &["a", "b"], b"grows later");
    let cloner = Arc::new(ModelCloner::default());

    let report = scan(&paths, cloner.clone());
    fs::write(&paths[1], b"grows later, a lot").unwrap();

    let outcome = ConsolidationEngine::new(cloner).consolidate(&report.groups[0]);
    assert!(matches!(
        outcome.failures.get(&paths[1]),
        Some(CloneError::Modified(_))
    ));
}

#[test]
fn test_origin_modified_after_hashing_fails_group() {
    let dir = tempdir().unwrap();
    let paths = duplicates(&dir, &["a", "b", "c"], b"origin touched");
    let cloner = Arc::new(ModelCloner::default());

    let report = scan(&paths, cloner.clone());
    set_file_mtime(&paths[0], FileTime::from_unix_time(1_000_000_000, 0)).unwrap();

    let outcome = ConsolidationEngine::new(cloner).consolidate(&report.groups[0]);
    assert_eq!(outcome.failures.len(), 2);
}

#[test]
fn test_unsupported_platform_refuses_without_touching_files() {
    let dir = tempdir().unwrap();
    let paths = duplicates(&dir, &["a", "b"], b"stay as you are");
    let before: Vec<_> = paths.iter().map(|p| fs::metadata(p).unwrap().ino()).collect();

    let report = scan(&paths, Arc::new(UnsupportedCloner));
    let outcome = ConsolidationEngine::new(Arc::new(UnsupportedCloner)).consolidate(&report.groups[0]);

    assert!(matches!(
        outcome.failures.get(&paths[1]),
        Some(CloneError::Unsupported(_))
    ));
    let after: Vec<_> = paths.iter().map(|p| fs::metadata(p).unwrap().ino()).collect();
    assert_eq!(before, after);
    assert_eq!(fs::read(&paths[1]).unwrap(), b"stay as you are");
}

#[test]
fn test_inode_and_permissions_preserved() {
    use std::os::unix::fs::PermissionsExt;

    let dir = tempdir().unwrap();
    let paths = duplicates(&dir, &["a", "b"], b"keep my mode");
    fs::set_permissions(&paths[1], fs::Permissions::from_mode(0o640)).unwrap();
    let cloner = Arc::new(ModelCloner::default());

    let report = scan(&paths, cloner.clone());
    let outcome = ConsolidationEngine::new(cloner).consolidate(&report.groups[0]);
    assert!(outcome.is_success());

    let metadata = fs::metadata(&paths[1]).unwrap();
    assert_eq!(metadata.permissions().mode() & 0o777, 0o640);
    assert_eq!(metadata.uid(), fs::metadata(&paths[0]).unwrap().uid());
    assert_ne!(metadata.ino(), fs::metadata(&paths[0]).unwrap().ino());
}

#[cfg(target_os = "linux")]
#[test]
fn test_platform_cloner_on_real_filesystem() {
    use fsdedup::actions::platform_cloner;

    let dir = tempdir().unwrap();
    let content: Vec<u8> = (0..70_000u32).map(|i| (i % 251) as u8).collect();
    let paths = duplicates(&dir, &["a", "b"], &content);
    let cloner = platform_cloner();
    assert_eq!(cloner.name(), "ficlone");

    // Independently written files never report shared extents. Filesystems
    // without FIEMAP answer with an error instead.
    let (a, b) = (File::open(&paths[0]).unwrap(), File::open(&paths[1]).unwrap());
    assert!(!matches!(cloner.shares_extents(&a, &b), Ok(true)));

    let report = scan(&paths, Arc::clone(&cloner));
    assert!(report.groups[0].already_shared.is_empty());
    assert_eq!(report.summary.reclaimable_bytes, 70_000);

    let outcome = ConsolidationEngine::new(Arc::clone(&cloner)).consolidate(&report.groups[0]);
    if outcome.is_success() {
        assert_eq!(outcome.cloned, vec![paths[1].clone()]);
        let (a, b) = (File::open(&paths[0]).unwrap(), File::open(&paths[1]).unwrap());
        assert!(cloner.shares_extents(&a, &b).unwrap());
    } else {
        assert!(matches!(
            outcome.failures.get(&paths[1]),
            Some(CloneError::Unsupported(p)) if *p == paths[1]
        ));
    }
    assert_eq!(fs::read(&paths[0]).unwrap(), content);
    assert_eq!(fs::read(&paths[1]).unwrap(), content);
}
