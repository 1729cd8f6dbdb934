use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Instant;

use tracing::{info, warn};

use crate::error::{DedupeError, Result};
use crate::hasher::FileHasher;
use crate::index::DuplicateIndex;
use crate::model::{DuplicateGroup, IndexStatistics, IndexedFile, ScanSummary};
use crate::scan::{enumerate_files, FileEntry, ScanOptions};

const SIZE_UNIQUE_PREFIX: &str = "size-unique:";

/// Exact-content duplicate finder. Files are bucketed by size first and only
/// buckets with more than one member are hashed.
#[derive(Debug, Default)]
pub struct DuplicateDetector {
    hasher: FileHasher,
    options: ScanOptions,
    index: DuplicateIndex,
}

impl DuplicateDetector {
    pub fn new(hasher: FileHasher, options: ScanOptions) -> Self {
        Self {
            hasher,
            options,
            index: DuplicateIndex::new(),
        }
    }

    pub fn hasher(&self) -> &FileHasher {
        &self.hasher
    }

    pub fn options(&self) -> &ScanOptions {
        &self.options
    }

    pub fn index(&self) -> &DuplicateIndex {
        &self.index
    }

    pub fn scan_directory(&mut self, root: &Path) -> Result<ScanSummary> {
        self.scan_directory_with_progress(root, |_, _| {})
    }

    /// `on_progress(processed, total)` fires after each hashed file; `total` only
    /// counts files that needed hashing.
    pub fn scan_directory_with_progress<F>(
        &mut self,
        root: &Path,
        mut on_progress: F,
    ) -> Result<ScanSummary>
    where
        F: FnMut(usize, usize),
    {
        let started = Instant::now();
        let enumeration = enumerate_files(root, &self.options)?;
        let mut summary = ScanSummary {
            root: root.to_path_buf(),
            files_seen: enumeration.files.len(),
            warnings: enumeration.warnings,
            ..ScanSummary::default()
        };

        let mut by_size: HashMap<u64, Vec<FileEntry>> = HashMap::new();
        for entry in enumeration.files {
            by_size.entry(entry.metadata.size).or_default().push(entry);
        }

        let mut to_hash = Vec::new();
        for (size, mut bucket) in by_size {
            if bucket.len() == 1 {
                let entry = bucket.remove(0);
                let key = size_unique_key(size, &entry.path);
                self.index
                    .add_file(&entry.path, key, Some(entry.metadata))?;
                summary.size_unique_files += 1;
            } else {
                to_hash.extend(bucket);
            }
        }
        to_hash.sort_by(|a, b| a.path.cmp(&b.path));

        let total = to_hash.len();
        for (processed, entry) in to_hash.into_iter().enumerate() {
            match self.hasher.compute_hash(&entry.path) {
                Ok(hash) => {
                    self.index.add_file(&entry.path, hash, Some(entry.metadata))?;
                    summary.files_hashed += 1;
                }
                Err(err) => {
                    summary.hash_failures += 1;
                    let message = format!("hash skipped for {}: {}", entry.path.display(), err);
                    warn!("{message}");
                    summary.warnings.push(message);
                }
            }
            on_progress(processed + 1, total);
        }

        summary.elapsed_ms = started.elapsed().as_millis() as u64;
        info!(
            root = %root.display(),
            files = summary.files_seen,
            hashed = summary.files_hashed,
            skipped = summary.hash_failures,
            "duplicate scan finished"
        );
        Ok(summary)
    }

    /// Files under `dir` with the same content as `target`, excluding `target` itself.
    /// Replaces whatever the index held from earlier runs.
    pub fn find_duplicates_of_file(&mut self, target: &Path, dir: &Path) -> Result<Vec<IndexedFile>> {
        let target_hash = self.hasher.compute_hash(target)?;
        let target_size = std::fs::metadata(target)
            .map_err(|err| DedupeError::from_io(target, err))?
            .len();
        let resolved_target = canonical(target);

        self.index.clear();
        self.scan_directory(dir)?;

        // Lone same-size files were registered without hashing; hash them now.
        let unhashed = self
            .index
            .files_by_size(target_size)
            .iter()
            .filter(|item| is_size_unique_key(&item.hash))
            .cloned()
            .collect::<Vec<_>>();
        for item in unhashed {
            if canonical(&item.path) == resolved_target {
                continue;
            }
            match self.hasher.compute_hash(&item.path) {
                Ok(hash) => self.index.add_file(&item.path, hash, Some(item.metadata))?,
                Err(err) => warn!("hash skipped for {}: {}", item.path.display(), err),
            }
        }

        Ok(self
            .index
            .files_by_hash(&target_hash)
            .iter()
            .filter(|item| canonical(&item.path) != resolved_target)
            .cloned()
            .collect())
    }

    pub fn duplicates(&self) -> Vec<DuplicateGroup> {
        self.index.duplicates()
    }

    pub fn statistics(&self) -> IndexStatistics {
        self.index.statistics()
    }

    pub fn clear(&mut self) {
        self.index.clear();
    }
}

fn size_unique_key(size: u64, path: &Path) -> String {
    format!("{SIZE_UNIQUE_PREFIX}{size}:{}", path.display())
}

pub fn is_size_unique_key(hash: &str) -> bool {
    hash.starts_with(SIZE_UNIQUE_PREFIX)
}

fn canonical(path: &Path) -> PathBuf {
    std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}
