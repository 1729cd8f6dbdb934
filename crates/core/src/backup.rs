use std::collections::BTreeMap;
use std::fs::{self, File, FileTimes, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use chrono::{DateTime, TimeDelta, Utc};
use tracing::{debug, info, warn};

use crate::error::{DedupeError, Result};
use crate::lock::{LockMode, ManifestLock};
use crate::model::{BackupIssue, BackupRecord, BackupStatistics};

pub const DEFAULT_BACKUP_DIR: &str = ".dupsafe_backups";
pub const MANIFEST_FILE: &str = "manifest.json";

type Manifest = BTreeMap<String, BackupRecord>;

/// Copies files aside before they are deleted and tracks every copy in a JSON
/// manifest. Manifest access is guarded by advisory file locks, so several
/// processes may share one backup directory.
#[derive(Debug, Clone)]
pub struct BackupManager {
    backup_dir: PathBuf,
    manifest_path: PathBuf,
}

impl BackupManager {
    pub fn new(backup_dir: impl AsRef<Path>) -> Result<Self> {
        let requested = backup_dir.as_ref();
        let backup_dir = if requested.is_absolute() {
            requested.to_path_buf()
        } else {
            std::env::current_dir()
                .map_err(|err| DedupeError::io_failure("failed to resolve working directory", err))?
                .join(requested)
        };
        fs::create_dir_all(&backup_dir).map_err(|err| {
            DedupeError::io_failure(
                format!("failed to create backup directory {}", backup_dir.display()),
                err,
            )
        })?;
        let manifest_path = backup_dir.join(MANIFEST_FILE);
        Ok(Self {
            backup_dir,
            manifest_path,
        })
    }

    /// A hidden backup directory under the current working directory.
    pub fn default_location() -> Result<Self> {
        Self::new(DEFAULT_BACKUP_DIR)
    }

    pub fn backup_dir(&self) -> &Path {
        &self.backup_dir
    }

    pub fn manifest_path(&self) -> &Path {
        &self.manifest_path
    }

    pub fn create_backup(&self, path: &Path) -> Result<BackupRecord> {
        let metadata = fs::metadata(path).map_err(|err| DedupeError::from_io(path, err))?;
        if !metadata.is_file() {
            return Err(DedupeError::invalid_argument(format!(
                "only regular files can be backed up: {}",
                path.display()
            )));
        }
        let original_path = fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf());

        let backup_path = self.claim_backup_path(path)?;
        if let Err(err) = copy_with_times(path, &backup_path, &metadata) {
            let _ = fs::remove_file(&backup_path);
            return Err(DedupeError::io_failure(
                format!("failed to copy {} into backup store", path.display()),
                err,
            ));
        }

        let record = BackupRecord {
            original_path,
            backup_path: backup_path.clone(),
            backup_time: Utc::now(),
            file_size: metadata.len(),
            original_mtime: metadata
                .modified()
                .map(DateTime::<Utc>::from)
                .unwrap_or_else(|_| Utc::now()),
        };

        let key = manifest_key(&backup_path);
        let inserted = record.clone();
        if let Err(err) = self.update_manifest(|manifest| {
            manifest.insert(key, inserted);
            Ok(())
        }) {
            // A copy without a manifest entry would be invisible to cleanup.
            let _ = fs::remove_file(&backup_path);
            return Err(err);
        }

        info!(
            original = %record.original_path.display(),
            backup = %record.backup_path.display(),
            bytes = record.file_size,
            "backup created"
        );
        Ok(record)
    }

    /// Copies a backup back to its original location, or to `target` when given.
    pub fn restore_backup(&self, backup_path: &Path, target: Option<&Path>) -> Result<PathBuf> {
        let manifest = self.read_manifest()?;
        let record = lookup(&manifest, backup_path)
            .ok_or_else(|| DedupeError::NotFound(backup_path.to_path_buf()))?;
        if !record.backup_path.is_file() {
            return Err(DedupeError::NotFound(record.backup_path.clone()));
        }

        let destination = target
            .map(Path::to_path_buf)
            .unwrap_or_else(|| record.original_path.clone());
        if let Some(parent) = destination.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|err| {
                    DedupeError::io_failure(
                        format!("failed to create {}", parent.display()),
                        err,
                    )
                })?;
            }
        }

        make_writable(&destination)
            .and_then(|_| fs::copy(&record.backup_path, &destination))
            .map_err(|err| {
                DedupeError::io_failure(
                    format!(
                        "failed to restore {} to {}",
                        record.backup_path.display(),
                        destination.display()
                    ),
                    err,
                )
            })?;
        if let Err(err) = set_modified(&destination, record.original_mtime.into()) {
            warn!(
                "restored {} but could not reset its mtime: {}",
                destination.display(),
                err
            );
        }

        info!(
            backup = %record.backup_path.display(),
            restored = %destination.display(),
            "backup restored"
        );
        Ok(destination)
    }

    /// Drops one manifest entry and deletes its backup file.
    pub fn forget_backup(&self, backup_path: &Path) -> Result<BackupRecord> {
        let record = self.update_manifest(|manifest| {
            let key = lookup_key(manifest, backup_path)
                .ok_or_else(|| DedupeError::NotFound(backup_path.to_path_buf()))?;
            manifest
                .remove(&key)
                .ok_or_else(|| DedupeError::NotFound(backup_path.to_path_buf()))
        })?;
        remove_backup_file(&record.backup_path);
        Ok(record)
    }

    /// Backs `path` up, then deletes it. The original is only removed once the
    /// backup and its manifest entry exist.
    pub fn remove_with_backup(&self, path: &Path) -> Result<BackupRecord> {
        let record = self.create_backup(path)?;
        fs::remove_file(path).map_err(|err| DedupeError::from_io(path, err))?;
        info!(
            removed = %path.display(),
            backup = %record.backup_path.display(),
            "file removed with backup"
        );
        Ok(record)
    }

    /// Removes entries strictly older than `max_age_days` and returns their backup paths.
    pub fn cleanup_old_backups(&self, max_age_days: i64) -> Result<Vec<PathBuf>> {
        if max_age_days < 0 {
            return Err(DedupeError::invalid_argument(format!(
                "max_age_days must be non-negative, got {max_age_days}"
            )));
        }
        let cutoff = TimeDelta::try_days(max_age_days)
            .and_then(|age| Utc::now().checked_sub_signed(age))
            .ok_or_else(|| {
                DedupeError::invalid_argument(format!("max_age_days {max_age_days} is too large"))
            })?;

        let removed = self.update_manifest(|manifest| {
            let expired = manifest
                .iter()
                .filter(|(_, record)| record.backup_time < cutoff)
                .map(|(key, _)| key.clone())
                .collect::<Vec<_>>();
            Ok(expired
                .into_iter()
                .filter_map(|key| manifest.remove(&key))
                .collect::<Vec<_>>())
        })?;

        for record in &removed {
            remove_backup_file(&record.backup_path);
        }
        info!(
            removed = removed.len(),
            max_age_days, "old backups cleaned up"
        );
        Ok(removed.into_iter().map(|record| record.backup_path).collect())
    }

    pub fn verify_backups(&self) -> Result<Vec<BackupIssue>> {
        let manifest = self.read_manifest()?;
        let mut issues = Vec::new();
        for record in manifest.values() {
            match fs::metadata(&record.backup_path) {
                Ok(meta) if meta.len() != record.file_size => {
                    issues.push(BackupIssue::SizeMismatch {
                        backup_path: record.backup_path.clone(),
                        expected: record.file_size,
                        actual: meta.len(),
                    })
                }
                Ok(_) => {}
                Err(_) => issues.push(BackupIssue::Missing {
                    backup_path: record.backup_path.clone(),
                }),
            }
        }
        if !issues.is_empty() {
            warn!(issues = issues.len(), "backup verification found problems");
        }
        Ok(issues)
    }

    /// Manifest entries, most recent first.
    pub fn list_backups(&self) -> Result<Vec<BackupRecord>> {
        let mut records = self.read_manifest()?.into_values().collect::<Vec<_>>();
        records.sort_by(|a, b| {
            b.backup_time
                .cmp(&a.backup_time)
                .then_with(|| a.backup_path.cmp(&b.backup_path))
        });
        Ok(records)
    }

    pub fn statistics(&self) -> Result<BackupStatistics> {
        let records = self.list_backups()?;
        Ok(BackupStatistics {
            backup_dir: self.backup_dir.clone(),
            total_backups: records.len(),
            total_size: records.iter().map(|record| record.file_size).sum(),
            newest: records.first().map(|record| record.backup_time),
            oldest: records.last().map(|record| record.backup_time),
        })
    }

    fn claim_backup_path(&self, original: &Path) -> Result<PathBuf> {
        let stem = original
            .file_stem()
            .map(|stem| stem.to_string_lossy().to_string())
            .unwrap_or_else(|| "file".to_string());
        let extension = original
            .extension()
            .map(|ext| format!(".{}", ext.to_string_lossy()))
            .unwrap_or_default();
        let stamp = Utc::now().format("%Y%m%d_%H%M%S_%6f").to_string();

        let mut attempt = 0_u32;
        loop {
            let name = if attempt == 0 {
                format!("{stem}_{stamp}{extension}")
            } else {
                format!("{stem}_{stamp}_{attempt}{extension}")
            };
            let candidate = self.backup_dir.join(name);
            match OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&candidate)
            {
                Ok(_) => return Ok(candidate),
                Err(err) if err.kind() == io::ErrorKind::AlreadyExists => attempt += 1,
                Err(err) => {
                    return Err(DedupeError::io_failure(
                        format!("failed to reserve {}", candidate.display()),
                        err,
                    ))
                }
            }
        }
    }

    fn read_manifest(&self) -> Result<Manifest> {
        let file = match File::open(&self.manifest_path) {
            Ok(file) => file,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Manifest::new()),
            Err(err) => return Err(self.manifest_error("open", err)),
        };
        let _lock = ManifestLock::acquire(&file, LockMode::Shared)
            .map_err(|err| self.manifest_error("lock", err))?;

        let mut data = String::new();
        (&file)
            .read_to_string(&mut data)
            .map_err(|err| self.manifest_error("read", err))?;
        Ok(parse_manifest(&data, &self.manifest_path))
    }

    /// Runs one read-modify-write cycle under a single exclusive lock. Nothing is
    /// written when `apply` fails.
    fn update_manifest<T, F>(&self, apply: F) -> Result<T>
    where
        F: FnOnce(&mut Manifest) -> Result<T>,
    {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&self.manifest_path)
            .map_err(|err| self.manifest_error("open", err))?;
        let _lock = ManifestLock::acquire(&file, LockMode::Exclusive)
            .map_err(|err| self.manifest_error("lock", err))?;

        let mut data = String::new();
        (&file)
            .read_to_string(&mut data)
            .map_err(|err| self.manifest_error("read", err))?;
        let mut manifest = parse_manifest(&data, &self.manifest_path);

        let output = apply(&mut manifest)?;

        let payload = serde_json::to_vec_pretty(&manifest)
            .map_err(|err| self.manifest_error("serialize", io::Error::other(err)))?;
        file.set_len(0)
            .map_err(|err| self.manifest_error("truncate", err))?;
        (&file)
            .seek(SeekFrom::Start(0))
            .and_then(|_| (&file).write_all(&payload))
            .and_then(|_| file.sync_all())
            .map_err(|err| self.manifest_error("write", err))?;
        debug!(entries = manifest.len(), "manifest written");
        Ok(output)
    }

    fn manifest_error(&self, action: &str, err: io::Error) -> DedupeError {
        DedupeError::io_failure(
            format!("failed to {action} manifest {}", self.manifest_path.display()),
            err,
        )
    }
}

/// Corrupt JSON yields an empty manifest: the store stays usable at the cost of
/// forgetting the old entries.
fn parse_manifest(data: &str, path: &Path) -> Manifest {
    if data.trim().is_empty() {
        return Manifest::new();
    }
    match serde_json::from_str(data) {
        Ok(manifest) => manifest,
        Err(err) => {
            warn!(
                "manifest {} is corrupt ({}); starting from an empty manifest",
                path.display(),
                err
            );
            Manifest::new()
        }
    }
}

fn manifest_key(path: &Path) -> String {
    path.to_string_lossy().to_string()
}

fn lookup_key(manifest: &Manifest, backup_path: &Path) -> Option<String> {
    let direct = manifest_key(backup_path);
    if manifest.contains_key(&direct) {
        return Some(direct);
    }
    let resolved = manifest_key(&fs::canonicalize(backup_path).ok()?);
    manifest.contains_key(&resolved).then_some(resolved)
}

fn lookup<'a>(manifest: &'a Manifest, backup_path: &Path) -> Option<&'a BackupRecord> {
    lookup_key(manifest, backup_path).and_then(|key| manifest.get(&key))
}

fn remove_backup_file(path: &Path) {
    match fs::remove_file(path) {
        Ok(()) => debug!(backup = %path.display(), "backup file removed"),
        Err(err) if err.kind() == io::ErrorKind::NotFound => {}
        Err(err) => warn!("failed to remove backup file {}: {}", path.display(), err),
    }
}

fn copy_with_times(source: &Path, destination: &Path, metadata: &fs::Metadata) -> io::Result<()> {
    fs::copy(source, destination)?;
    let mut times = FileTimes::new();
    if let Ok(modified) = metadata.modified() {
        times = times.set_modified(modified);
    }
    if let Ok(accessed) = metadata.accessed() {
        times = times.set_accessed(accessed);
    }
    set_file_times(destination, times)
}

fn set_modified(path: &Path, modified: SystemTime) -> io::Result<()> {
    set_file_times(path, FileTimes::new().set_modified(modified))
}

/// `fs::copy` carries the source permissions over, so the copy may already be
/// read-only. On unix the owner can change timestamps through a read handle.
fn set_file_times(path: &Path, times: FileTimes) -> io::Result<()> {
    #[cfg(unix)]
    let file = File::open(path)?;
    #[cfg(not(unix))]
    let file = OpenOptions::new().write(true).open(path)?;
    file.set_times(times)
}

/// Lets a restore overwrite a previously restored read-only file.
fn make_writable(path: &Path) -> io::Result<()> {
    let metadata = match fs::metadata(path) {
        Ok(metadata) => metadata,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(()),
        Err(err) => return Err(err),
    };
    let mut permissions = metadata.permissions();
    if !metadata.is_file() || !permissions.readonly() {
        return Ok(());
    }
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        permissions.set_mode(permissions.mode() | 0o200);
    }
    #[cfg(not(unix))]
    #[allow(clippy::permissions_set_readonly_false)]
    permissions.set_readonly(false);
    fs::set_permissions(path, permissions)
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::fs;
    use std::sync::Arc;
    use std::thread;

    use chrono::{Duration, Utc};
    use tempfile::TempDir;

    use super::{BackupManager, MANIFEST_FILE};
    use crate::error::DedupeError;
    use crate::model::{BackupIssue, BackupRecord};

    fn setup() -> (TempDir, BackupManager) {
        let temp = TempDir::new().expect("tempdir");
        let manager = BackupManager::new(temp.path().join("backups")).expect("manager");
        (temp, manager)
    }

    #[test]
    fn backup_then_restore_to_fresh_target_is_byte_identical() {
        let (temp, manager) = setup();
        let source = temp.path().join("report.pdf");
        let payload = (0..5000_u32).map(|i| (i % 256) as u8).collect::<Vec<_>>();
        fs::write(&source, &payload).expect("write");

        let record = manager.create_backup(&source).expect("backup");
        assert_eq!(record.file_size, payload.len() as u64);
        assert!(record.backup_path.starts_with(manager.backup_dir()));
        assert_eq!(
            record.backup_path.extension().and_then(|e| e.to_str()),
            Some("pdf")
        );

        let target = temp.path().join("restored/deep/report.pdf");
        let restored = manager
            .restore_backup(&record.backup_path, Some(&target))
            .expect("restore");
        assert_eq!(restored, target);
        assert_eq!(fs::read(&target).expect("read"), payload);
    }

    #[test]
    fn restore_defaults_to_original_location() {
        let (temp, manager) = setup();
        let source = temp.path().join("notes.txt");
        fs::write(&source, b"keep me").expect("write");

        let record = manager.remove_with_backup(&source).expect("remove");
        assert!(!source.exists());
        assert!(record.backup_path.exists());

        let restored = manager
            .restore_backup(&record.backup_path, None)
            .expect("restore");
        assert_eq!(fs::read(&restored).expect("read"), b"keep me");
        assert_eq!(
            fs::canonicalize(&restored).expect("canon"),
            fs::canonicalize(&source).expect("canon")
        );
    }

    #[test]
    fn missing_inputs_are_not_found() {
        let (temp, manager) = setup();
        let err = manager
            .create_backup(&temp.path().join("ghost.txt"))
            .expect_err("missing source");
        assert!(err.is_not_found());

        let err = manager
            .restore_backup(&temp.path().join("unknown.bak"), None)
            .expect_err("unknown backup");
        assert!(err.is_not_found());
    }

    #[test]
    fn rapid_backups_of_one_file_get_distinct_names() {
        let (temp, manager) = setup();
        let source = temp.path().join("same.txt");
        fs::write(&source, b"x").expect("write");

        let mut paths = (0..5)
            .map(|_| manager.create_backup(&source).expect("backup").backup_path)
            .collect::<Vec<_>>();
        paths.sort();
        paths.dedup();
        assert_eq!(paths.len(), 5);
        assert_eq!(manager.list_backups().expect("list").len(), 5);
    }

    #[test]
    fn cleanup_zero_days_removes_everything() {
        let (temp, manager) = setup();
        for name in ["a.txt", "b.txt", "c.txt"] {
            let path = temp.path().join(name);
            fs::write(&path, name.as_bytes()).expect("write");
            manager.create_backup(&path).expect("backup");
        }

        let removed = manager.cleanup_old_backups(0).expect("cleanup");
        assert_eq!(removed.len(), 3);
        assert!(removed.iter().all(|path| !path.exists()));
        assert!(manager.list_backups().expect("list").is_empty());
    }

    #[test]
    fn cleanup_keeps_recent_and_rejects_negative_age() {
        let (temp, manager) = setup();
        let path = temp.path().join("fresh.txt");
        fs::write(&path, b"fresh").expect("write");
        manager.create_backup(&path).expect("backup");

        assert!(manager.cleanup_old_backups(30).expect("cleanup").is_empty());
        assert_eq!(manager.list_backups().expect("list").len(), 1);
        assert!(matches!(
            manager.cleanup_old_backups(-1),
            Err(DedupeError::InvalidArgument(_))
        ));
    }

    #[test]
    fn verify_flags_missing_and_resized_backups() {
        let (temp, manager) = setup();
        let a = temp.path().join("a.txt");
        let b = temp.path().join("b.txt");
        fs::write(&a, b"alpha").expect("a");
        fs::write(&b, b"bravo").expect("b");
        let ra = manager.create_backup(&a).expect("backup a");
        let rb = manager.create_backup(&b).expect("backup b");

        assert!(manager.verify_backups().expect("verify").is_empty());

        fs::remove_file(&ra.backup_path).expect("delete");
        fs::write(&rb.backup_path, b"bravo, but longer").expect("grow");

        let issues = manager.verify_backups().expect("verify");
        assert_eq!(issues.len(), 2);
        assert!(issues.contains(&BackupIssue::Missing {
            backup_path: ra.backup_path.clone()
        }));
        assert!(issues.contains(&BackupIssue::SizeMismatch {
            backup_path: rb.backup_path.clone(),
            expected: 5,
            actual: 17,
        }));
    }

    #[test]
    fn corrupt_manifest_resets_to_empty() {
        let (temp, manager) = setup();
        fs::write(manager.backup_dir().join(MANIFEST_FILE), b"{ not json").expect("corrupt");

        assert!(manager.list_backups().expect("list").is_empty());

        let path = temp.path().join("after.txt");
        fs::write(&path, b"after").expect("write");
        manager.create_backup(&path).expect("backup");
        assert_eq!(manager.list_backups().expect("list").len(), 1);
    }

    #[test]
    fn forget_removes_entry_and_file() {
        let (temp, manager) = setup();
        let path = temp.path().join("gone.txt");
        fs::write(&path, b"gone").expect("write");
        let record = manager.create_backup(&path).expect("backup");

        let forgotten = manager.forget_backup(&record.backup_path).expect("forget");
        assert_eq!(forgotten, record);
        assert!(!record.backup_path.exists());
        assert!(manager.forget_backup(&record.backup_path).is_err());
    }

    #[test]
    fn list_and_statistics_are_recency_sorted() {
        let (_temp, manager) = setup();
        let now = Utc::now();
        let mut manifest = BTreeMap::new();
        for (name, age) in [("old", 10), ("new", 1), ("mid", 5)] {
            let backup_path = manager.backup_dir().join(format!("{name}.txt"));
            fs::write(&backup_path, b"1234").expect("write");
            manifest.insert(
                backup_path.to_string_lossy().to_string(),
                BackupRecord {
                    original_path: format!("/data/{name}.txt").into(),
                    backup_path,
                    backup_time: now - Duration::days(age),
                    file_size: 4,
                    original_mtime: now - Duration::days(age + 1),
                },
            );
        }
        fs::write(
            manager.manifest_path(),
            serde_json::to_vec_pretty(&manifest).expect("json"),
        )
        .expect("manifest");

        let names = manager
            .list_backups()
            .expect("list")
            .iter()
            .map(|r| r.original_path.to_string_lossy().to_string())
            .collect::<Vec<_>>();
        assert_eq!(names, vec!["/data/new.txt", "/data/mid.txt", "/data/old.txt"]);

        let stats = manager.statistics().expect("stats");
        assert_eq!(stats.total_backups, 3);
        assert_eq!(stats.total_size, 12);
        assert_eq!(stats.newest, Some(now - Duration::days(1)));
        assert_eq!(stats.oldest, Some(now - Duration::days(10)));
    }

    #[cfg(unix)]
    #[test]
    fn read_only_files_back_up_and_restore_with_their_mtime() {
        use std::fs::{File, FileTimes};
        use std::os::unix::fs::PermissionsExt;
        use std::time::{Duration as StdDuration, SystemTime};

        let (temp, manager) = setup();
        let source = temp.path().join("archived.txt");
        fs::write(&source, b"frozen").expect("write");
        let mtime = SystemTime::UNIX_EPOCH + StdDuration::from_secs(1_600_000_000);
        File::options()
            .write(true)
            .open(&source)
            .and_then(|file| file.set_times(FileTimes::new().set_modified(mtime)))
            .expect("set mtime");
        fs::set_permissions(&source, fs::Permissions::from_mode(0o444)).expect("chmod");

        let record = manager.remove_with_backup(&source).expect("remove");
        assert!(!source.exists());
        let backup_meta = fs::metadata(&record.backup_path).expect("backup meta");
        assert_eq!(backup_meta.modified().expect("mtime"), mtime);

        let restored = manager
            .restore_backup(&record.backup_path, None)
            .expect("restore");
        assert_eq!(fs::read(&restored).expect("read"), b"frozen");
        assert_eq!(
            fs::metadata(&restored).expect("meta").modified().expect("mtime"),
            mtime
        );

        manager
            .restore_backup(&record.backup_path, Some(&restored))
            .expect("restore over read-only copy");
        assert_eq!(fs::read(&restored).expect("read"), b"frozen");
    }

    #[test]
    fn manifest_with_naive_timestamps_is_kept() {
        let (temp, manager) = setup();
        let backup_path = manager.backup_dir().join("legacy.txt");
        fs::write(&backup_path, b"old").expect("write");
        let manifest = serde_json::json!({
            backup_path.to_string_lossy(): {
                "original_path": "/data/legacy.txt",
                "backup_path": backup_path,
                "backup_time": "2024-05-01T12:00:00.123456",
                "file_size": 3,
                "original_mtime": "2024-04-30T08:15:00"
            }
        });
        fs::write(manager.manifest_path(), manifest.to_string()).expect("manifest");

        let records = manager.list_backups().expect("list");
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].backup_path, backup_path);

        let path = temp.path().join("new.txt");
        fs::write(&path, b"new").expect("write");
        manager.create_backup(&path).expect("backup");
        assert_eq!(manager.list_backups().expect("list").len(), 2);
    }

    #[test]
    fn concurrent_writers_do_not_lose_entries() {
        let (temp, manager) = setup();
        let dir = Arc::new(manager.backup_dir().to_path_buf());
        let sources = Arc::new(temp.path().to_path_buf());

        let handles = (0..4)
            .map(|worker| {
                let dir = Arc::clone(&dir);
                let sources = Arc::clone(&sources);
                thread::spawn(move || {
                    let manager = BackupManager::new(dir.as_path()).expect("manager");
                    for item in 0..5 {
                        let path = sources.join(format!("w{worker}_{item}.txt"));
                        fs::write(&path, format!("{worker}-{item}")).expect("write");
                        manager.create_backup(&path).expect("backup");
                    }
                })
            })
            .collect::<Vec<_>>();
        for handle in handles {
            handle.join().expect("join");
        }

        assert_eq!(manager.list_backups().expect("list").len(), 20);
        assert!(manager.verify_backups().expect("verify").is_empty());
    }
}
