use std::path::{Path, PathBuf};

use globset::{Glob, GlobSet, GlobSetBuilder};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::error::{DedupeError, Result};
use crate::model::FileMetadata;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScanOptions {
    #[serde(default = "default_recursive")]
    pub recursive: bool,
    #[serde(default)]
    pub min_size: u64,
    #[serde(default)]
    pub max_size: Option<u64>,
    #[serde(default)]
    pub include: Vec<String>,
    #[serde(default)]
    pub exclude: Vec<String>,
    #[serde(default)]
    pub follow_symlinks: bool,
}

fn default_recursive() -> bool {
    true
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            recursive: default_recursive(),
            min_size: 0,
            max_size: None,
            include: Vec::new(),
            exclude: Vec::new(),
            follow_symlinks: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FileEntry {
    pub path: PathBuf,
    pub metadata: FileMetadata,
}

#[derive(Debug, Default)]
pub struct Enumeration {
    pub files: Vec<FileEntry>,
    pub warnings: Vec<String>,
}

/// Lists regular files under `root` that pass the size bounds and pattern filters.
///
/// A missing or unreadable root is an error; problems below the root become warnings.
pub fn enumerate_files(root: &Path, options: &ScanOptions) -> Result<Enumeration> {
    validate_scan_options(options)?;
    let root_meta = std::fs::metadata(root).map_err(|err| DedupeError::from_io(root, err))?;
    if !root_meta.is_dir() {
        return Err(DedupeError::invalid_argument(format!(
            "scan root is not a directory: {}",
            root.display()
        )));
    }

    let mut out = Enumeration::default();
    let excludes = PatternMatcher::new(&options.exclude, &mut out.warnings);
    let includes = PatternMatcher::new(&options.include, &mut out.warnings);

    let mut walker = WalkDir::new(root).follow_links(options.follow_symlinks);
    if !options.recursive {
        walker = walker.max_depth(1);
    }
    let iter = walker.into_iter().filter_entry(|entry| {
        if entry.depth() == 0 {
            return true;
        }
        !excludes.is_match(entry.path())
    });

    for item in iter {
        let entry = match item {
            Ok(entry) => entry,
            Err(err) => {
                out.warnings
                    .push(format!("walk error under {}: {}", root.display(), err));
                continue;
            }
        };
        if entry.depth() == 0 || !entry.file_type().is_file() {
            continue;
        }
        if !includes.is_empty() && !includes.is_match(entry.path()) {
            continue;
        }

        let metadata = match entry.metadata() {
            Ok(metadata) => metadata,
            Err(err) => {
                out.warnings.push(format!(
                    "metadata read failed for {}: {}",
                    entry.path().display(),
                    err
                ));
                continue;
            }
        };

        let size = metadata.len();
        if size < options.min_size || options.max_size.is_some_and(|max| size > max) {
            continue;
        }

        out.files.push(FileEntry {
            path: entry.into_path(),
            metadata: FileMetadata::from_fs(&metadata),
        });
    }

    for warning in &out.warnings {
        warn!("{warning}");
    }
    debug!(
        root = %root.display(),
        files = out.files.len(),
        "enumerated files"
    );
    Ok(out)
}

/// Files under `root` whose extension (lowercased) is in `extensions`.
pub fn enumerate_by_extension(
    root: &Path,
    recursive: bool,
    extensions: &[&str],
) -> Result<Enumeration> {
    let options = ScanOptions {
        recursive,
        ..ScanOptions::default()
    };
    let mut out = enumerate_files(root, &options)?;
    out.files.retain(|entry| {
        extension_of(&entry.path).is_some_and(|ext| extensions.contains(&ext.as_str()))
    });
    Ok(out)
}

pub fn extension_of(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_lowercase())
}

struct PatternMatcher {
    globset: Option<GlobSet>,
    substrings: Vec<String>,
}

impl PatternMatcher {
    fn new(patterns: &[String], warnings: &mut Vec<String>) -> Self {
        if patterns.is_empty() {
            return Self {
                globset: None,
                substrings: Vec::new(),
            };
        }

        let mut builder = GlobSetBuilder::new();
        let mut substrings = Vec::new();
        let mut globs = 0_usize;
        for pattern in patterns {
            let pattern = pattern.trim();
            if pattern.is_empty() {
                continue;
            }

            if is_plain_substring_pattern(pattern) {
                substrings.push(pattern.to_lowercase());
                continue;
            }

            // Bare "*.ext" patterns should match at any depth.
            let normalized = if pattern.contains('/') {
                pattern.to_string()
            } else {
                format!("**/{pattern}")
            };
            match Glob::new(&normalized) {
                Ok(glob) => {
                    builder.add(glob);
                    globs += 1;
                }
                Err(err) => {
                    warnings.push(format!(
                        "invalid glob '{pattern}': {err}; using substring fallback."
                    ));
                    substrings.push(pattern.to_lowercase());
                }
            }
        }

        let globset = if globs == 0 {
            None
        } else {
            match builder.build() {
                Ok(set) => Some(set),
                Err(err) => {
                    warnings.push(format!(
                        "failed to compile glob set: {err}; glob patterns disabled."
                    ));
                    None
                }
            }
        };

        Self {
            globset,
            substrings,
        }
    }

    fn is_empty(&self) -> bool {
        self.globset.is_none() && self.substrings.is_empty()
    }

    fn is_match(&self, path: &Path) -> bool {
        if let Some(globset) = &self.globset {
            if globset.is_match(path) {
                return true;
            }
        }

        if self.substrings.is_empty() {
            return false;
        }

        let lowered = path.to_string_lossy().to_lowercase();
        self.substrings
            .iter()
            .any(|pattern| lowered.contains(pattern))
    }
}

fn is_plain_substring_pattern(pattern: &str) -> bool {
    !pattern
        .chars()
        .any(|ch| matches!(ch, '*' | '?' | '[' | ']' | '{' | '}'))
}

pub(crate) fn validate_scan_options(options: &ScanOptions) -> Result<()> {
    if let Some(max_size) = options.max_size {
        if max_size < options.min_size {
            return Err(DedupeError::invalid_argument(format!(
                "max_size ({max_size}) must not be below min_size ({})",
                options.min_size
            )));
        }
    }
    Ok(())
}
