use std::collections::BTreeMap;
use std::fs;

use anyhow::Result;
use chrono::{Duration, Utc};
use dupsafe_core::{BackupManager, BackupRecord};
use tempfile::TempDir;

#[test]
fn cleanup_drops_every_expired_backup() -> Result<()> {
    let temp = TempDir::new()?;
    let manager = BackupManager::new(temp.path().join("store"))?;
    let forty_days_ago = Utc::now() - Duration::days(40);

    let mut manifest = BTreeMap::new();
    for i in 0..10 {
        let backup_path = manager.backup_dir().join(format!("file{i}_old.txt"));
        fs::write(&backup_path, format!("payload {i}"))?;
        manifest.insert(
            backup_path.to_string_lossy().to_string(),
            BackupRecord {
                original_path: temp.path().join(format!("file{i}.txt")),
                backup_path,
                backup_time: forty_days_ago,
                file_size: format!("payload {i}").len() as u64,
                original_mtime: forty_days_ago,
            },
        );
    }
    fs::write(manager.manifest_path(), serde_json::to_string_pretty(&manifest)?)?;
    assert_eq!(manager.list_backups()?.len(), 10);

    let removed = manager.cleanup_old_backups(30)?;
    assert_eq!(removed.len(), 10);
    assert!(removed.iter().all(|path| !path.exists()));
    assert!(manager.list_backups()?.is_empty());

    let stored: BTreeMap<String, BackupRecord> =
        serde_json::from_str(&fs::read_to_string(manager.manifest_path())?)?;
    assert!(stored.is_empty());
    Ok(())
}

#[test]
fn recent_backups_survive_cleanup_and_verify_clean() -> Result<()> {
    let temp = TempDir::new()?;
    let source = temp.path().join("report.csv");
    fs::write(&source, "a,b,c\n1,2,3\n")?;

    let manager = BackupManager::new(temp.path().join("store"))?;
    let record = manager.create_backup(&source)?;
    assert_eq!(record.file_size, 12);

    assert!(manager.cleanup_old_backups(30)?.is_empty());
    assert!(manager.verify_backups()?.is_empty());

    let stats = manager.statistics()?;
    assert_eq!(stats.total_backups, 1);
    assert_eq!(stats.total_size, 12);
    assert_eq!(stats.oldest, stats.newest);
    Ok(())
}
