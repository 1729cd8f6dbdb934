use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::error::{DedupeError, Result};
use crate::model::{DuplicateGroup, FileMetadata, IndexStatistics, IndexedFile};

/// Hash- and size-bucketed view of the files registered during one detection run.
///
/// Not synchronized: callers that hash in parallel must funnel inserts through a
/// single owner.
#[derive(Debug, Default)]
pub struct DuplicateIndex {
    by_hash: HashMap<String, Vec<IndexedFile>>,
    by_size: HashMap<u64, Vec<IndexedFile>>,
    hash_of: HashMap<PathBuf, String>,
}

impl DuplicateIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_file(
        &mut self,
        path: &Path,
        hash: impl Into<String>,
        metadata: Option<FileMetadata>,
    ) -> Result<()> {
        let metadata = match metadata {
            Some(metadata) => metadata,
            None => {
                let fs_meta =
                    std::fs::metadata(path).map_err(|err| DedupeError::from_io(path, err))?;
                FileMetadata::from_fs(&fs_meta)
            }
        };

        self.remove_path(path);

        let entry = IndexedFile {
            path: path.to_path_buf(),
            hash: hash.into(),
            metadata,
        };
        self.hash_of.insert(entry.path.clone(), entry.hash.clone());
        self.by_size
            .entry(metadata.size)
            .or_default()
            .push(entry.clone());
        self.by_hash.entry(entry.hash.clone()).or_default().push(entry);
        Ok(())
    }

    fn remove_path(&mut self, path: &Path) {
        let Some(previous) = self.hash_of.remove(path) else {
            return;
        };
        let mut previous_size = None;
        if let Some(bucket) = self.by_hash.get_mut(&previous) {
            if let Some(pos) = bucket.iter().position(|item| item.path == path) {
                previous_size = Some(bucket.remove(pos).metadata.size);
            }
            if bucket.is_empty() {
                self.by_hash.remove(&previous);
            }
        }
        if let Some(size) = previous_size {
            if let Some(bucket) = self.by_size.get_mut(&size) {
                bucket.retain(|item| item.path != path);
                if bucket.is_empty() {
                    self.by_size.remove(&size);
                }
            }
        }
    }

    pub fn files_by_hash(&self, hash: &str) -> &[IndexedFile] {
        self.by_hash.get(hash).map(Vec::as_slice).unwrap_or_default()
    }

    pub fn files_by_size(&self, size: u64) -> &[IndexedFile] {
        self.by_size.get(&size).map(Vec::as_slice).unwrap_or_default()
    }

    pub fn hash_of(&self, path: &Path) -> Option<&str> {
        self.hash_of.get(path).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.hash_of.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hash_of.is_empty()
    }

    /// Hash buckets with at least two members, largest waste first.
    pub fn duplicates(&self) -> Vec<DuplicateGroup> {
        let mut groups = self
            .by_hash
            .iter()
            .filter(|(_, files)| files.len() >= 2)
            .map(|(hash, files)| {
                let mut files = files.clone();
                files.sort_by(|a, b| a.path.cmp(&b.path));
                let size = files[0].metadata.size;
                let count = files.len();
                DuplicateGroup {
                    hash: hash.clone(),
                    size,
                    count,
                    total_size: size.saturating_mul(count as u64),
                    wasted_space: size.saturating_mul(count as u64 - 1),
                    files,
                }
            })
            .collect::<Vec<_>>();

        groups.sort_by(|a, b| {
            b.wasted_space
                .cmp(&a.wasted_space)
                .then_with(|| a.hash.cmp(&b.hash))
        });
        groups
    }

    pub fn statistics(&self) -> IndexStatistics {
        let groups = self.duplicates();
        let duplicate_files = groups.iter().map(|group| group.count).sum::<usize>();
        let total_files = self.len();
        IndexStatistics {
            total_files,
            unique_files: total_files - duplicate_files,
            duplicate_files,
            duplicate_groups: groups.len(),
            wasted_space: groups.iter().map(|group| group.wasted_space).sum(),
        }
    }

    pub fn clear(&mut self) {
        self.by_hash.clear();
        self.by_size.clear();
        self.hash_of.clear();
    }
}
