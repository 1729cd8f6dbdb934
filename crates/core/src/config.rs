use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::backup::{BackupManager, DEFAULT_BACKUP_DIR};
use crate::documents::DocumentMatcherOptions;
use crate::error::{DedupeError, Result};
use crate::hasher::{validate_chunk_size, FileHasher, HashAlgorithm, DEFAULT_CHUNK_SIZE};
use crate::images::ImageMatcherOptions;
use crate::scan::{validate_scan_options, ScanOptions};

pub const DEFAULT_MAX_BACKUP_AGE_DAYS: i64 = 30;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HashingConfig {
    #[serde(default)]
    pub algorithm: HashAlgorithm,
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
}

impl Default for HashingConfig {
    fn default() -> Self {
        Self {
            algorithm: HashAlgorithm::default(),
            chunk_size: default_chunk_size(),
        }
    }
}

impl HashingConfig {
    pub fn hasher(&self) -> Result<FileHasher> {
        FileHasher::new(self.algorithm, self.chunk_size)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackupConfig {
    #[serde(default = "default_backup_dir")]
    pub dir: PathBuf,
    #[serde(default = "default_max_age_days")]
    pub max_age_days: i64,
}

impl Default for BackupConfig {
    fn default() -> Self {
        Self {
            dir: default_backup_dir(),
            max_age_days: default_max_age_days(),
        }
    }
}

impl BackupConfig {
    pub fn manager(&self) -> Result<BackupManager> {
        BackupManager::new(&self.dir)
    }
}

fn default_chunk_size() -> usize {
    DEFAULT_CHUNK_SIZE
}

fn default_backup_dir() -> PathBuf {
    PathBuf::from(DEFAULT_BACKUP_DIR)
}

fn default_max_age_days() -> i64 {
    DEFAULT_MAX_BACKUP_AGE_DAYS
}

/// Engine settings, loadable from a JSON file. Missing sections and fields
/// fall back to their defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct EngineConfig {
    #[serde(default)]
    pub hashing: HashingConfig,
    #[serde(default)]
    pub scan: ScanOptions,
    #[serde(default)]
    pub backup: BackupConfig,
    #[serde(default)]
    pub images: ImageMatcherOptions,
    #[serde(default)]
    pub documents: DocumentMatcherOptions,
}

impl EngineConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path).map_err(|err| {
            DedupeError::invalid_argument(format!(
                "cannot read config {}: {}",
                path.display(),
                err
            ))
        })?;
        let config: Self = serde_json::from_str(&raw).map_err(|err| {
            DedupeError::invalid_argument(format!("invalid config {}: {}", path.display(), err))
        })?;
        config.validate()?;
        debug!(path = %path.display(), "configuration loaded");
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        validate_chunk_size(self.hashing.chunk_size)?;
        validate_scan_options(&self.scan)?;
        if self.backup.max_age_days < 0 {
            return Err(DedupeError::invalid_argument(format!(
                "backup max_age_days must not be negative, got {}",
                self.backup.max_age_days
            )));
        }
        self.images.validate()?;
        self.documents.validate()
    }
}
