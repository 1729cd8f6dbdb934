use std::fmt;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use crate::error::{DedupeError, Result};
use crate::model::FileFingerprint;

pub const DEFAULT_CHUNK_SIZE: usize = 64 * 1024;
pub const MIN_CHUNK_SIZE: usize = 1024;
pub const MAX_CHUNK_SIZE: usize = 10 * 1024 * 1024;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum HashAlgorithm {
    Md5,
    #[default]
    #[serde(alias = "sha-256")]
    Sha256,
    Blake3,
}

impl HashAlgorithm {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Md5 => "md5",
            Self::Sha256 => "sha256",
            Self::Blake3 => "blake3",
        }
    }
}

impl fmt::Display for HashAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HashAlgorithm {
    type Err = DedupeError;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "md5" => Ok(Self::Md5),
            "sha256" | "sha-256" => Ok(Self::Sha256),
            "blake3" => Ok(Self::Blake3),
            other => Err(DedupeError::invalid_argument(format!(
                "unsupported hash algorithm '{other}'"
            ))),
        }
    }
}

enum StreamingDigest {
    Md5(md5::Context),
    Sha256(Sha256),
    Blake3(Box<blake3::Hasher>),
}

impl StreamingDigest {
    fn new(algorithm: HashAlgorithm) -> Self {
        match algorithm {
            HashAlgorithm::Md5 => Self::Md5(md5::Context::new()),
            HashAlgorithm::Sha256 => Self::Sha256(Sha256::new()),
            HashAlgorithm::Blake3 => Self::Blake3(Box::new(blake3::Hasher::new())),
        }
    }

    fn update(&mut self, bytes: &[u8]) {
        match self {
            Self::Md5(ctx) => ctx.consume(bytes),
            Self::Sha256(hasher) => hasher.update(bytes),
            Self::Blake3(hasher) => {
                hasher.update(bytes);
            }
        }
    }

    fn finalize_hex(self) -> String {
        match self {
            Self::Md5(ctx) => format!("{:x}", ctx.compute()),
            Self::Sha256(hasher) => format!("{:x}", hasher.finalize()),
            Self::Blake3(hasher) => hasher.finalize().to_hex().to_string(),
        }
    }
}

/// Streams file content through a digest in fixed-size chunks, so memory use
/// does not grow with file size.
#[derive(Debug, Clone)]
pub struct FileHasher {
    algorithm: HashAlgorithm,
    chunk_size: usize,
}

impl Default for FileHasher {
    fn default() -> Self {
        Self {
            algorithm: HashAlgorithm::default(),
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }
}

impl FileHasher {
    pub fn new(algorithm: HashAlgorithm, chunk_size: usize) -> Result<Self> {
        validate_chunk_size(chunk_size)?;
        Ok(Self {
            algorithm,
            chunk_size,
        })
    }

    pub fn with_algorithm(algorithm: HashAlgorithm) -> Self {
        Self {
            algorithm,
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }

    pub fn algorithm(&self) -> HashAlgorithm {
        self.algorithm
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn compute_hash(&self, path: &Path) -> Result<String> {
        let mut file = File::open(path).map_err(|err| DedupeError::from_io(path, err))?;
        let mut digest = StreamingDigest::new(self.algorithm);
        let mut buffer = vec![0_u8; self.chunk_size];

        loop {
            let bytes_read = file
                .read(&mut buffer)
                .map_err(|err| DedupeError::from_io(path, err))?;
            if bytes_read == 0 {
                break;
            }
            digest.update(&buffer[..bytes_read]);
        }

        let hash = digest.finalize_hex();
        debug!(path = %path.display(), algorithm = %self.algorithm, "hashed file");
        Ok(hash)
    }

    pub fn fingerprint(&self, path: &Path) -> Result<FileFingerprint> {
        let size = std::fs::metadata(path)
            .map_err(|err| DedupeError::from_io(path, err))?
            .len();
        let content_hash = self.compute_hash(path)?;
        Ok(FileFingerprint {
            path: path.to_path_buf(),
            size,
            content_hash,
            algorithm: self.algorithm,
        })
    }

    /// Hashes every path it can. Failures are logged and the file is left out.
    pub fn compute_batch(&self, paths: &[PathBuf]) -> Vec<FileFingerprint> {
        let mut fingerprints = Vec::with_capacity(paths.len());
        for path in paths {
            match self.fingerprint(path) {
                Ok(fingerprint) => fingerprints.push(fingerprint),
                Err(err) => warn!("hash skipped for {}: {}", path.display(), err),
            }
        }
        fingerprints
    }
}

pub(crate) fn validate_chunk_size(chunk_size: usize) -> Result<()> {
    if !(MIN_CHUNK_SIZE..=MAX_CHUNK_SIZE).contains(&chunk_size) {
        return Err(DedupeError::invalid_argument(format!(
            "chunk size {chunk_size} must be between {MIN_CHUNK_SIZE} and {MAX_CHUNK_SIZE} bytes"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::fs;

    use tempfile::TempDir;

    use super::{FileHasher, HashAlgorithm, MAX_CHUNK_SIZE, MIN_CHUNK_SIZE};
    use crate::error::DedupeError;

    #[test]
    fn identical_bytes_hash_identically() {
        let temp = TempDir::new().expect("tempdir");
        let a = temp.path().join("a.bin");
        let b = temp.path().join("b.bin");
        fs::write(&a, b"same bytes").expect("write a");
        fs::write(&b, b"same bytes").expect("write b");

        for algorithm in [HashAlgorithm::Md5, HashAlgorithm::Sha256, HashAlgorithm::Blake3] {
            let hasher = FileHasher::with_algorithm(algorithm);
            let first = hasher.compute_hash(&a).expect("hash a");
            assert_eq!(first, hasher.compute_hash(&a).expect("rehash a"));
            assert_eq!(first, hasher.compute_hash(&b).expect("hash b"));
        }
    }

    #[test]
    fn known_digests() {
        let temp = TempDir::new().expect("tempdir");
        let path = temp.path().join("abc.txt");
        fs::write(&path, b"abc").expect("write");

        let md5 = FileHasher::with_algorithm(HashAlgorithm::Md5)
            .compute_hash(&path)
            .expect("md5");
        assert_eq!(md5, "900150983cd24fb0d6963f7d28e17f72");

        let sha = FileHasher::with_algorithm(HashAlgorithm::Sha256)
            .compute_hash(&path)
            .expect("sha256");
        assert_eq!(
            sha,
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn small_chunks_match_default_chunks() {
        let temp = TempDir::new().expect("tempdir");
        let path = temp.path().join("big.bin");
        let payload = (0..200_000_u32).map(|i| (i % 251) as u8).collect::<Vec<_>>();
        fs::write(&path, &payload).expect("write");

        let small = FileHasher::new(HashAlgorithm::Sha256, MIN_CHUNK_SIZE).expect("hasher");
        let default = FileHasher::default();
        assert_eq!(
            small.compute_hash(&path).expect("small"),
            default.compute_hash(&path).expect("default")
        );
    }

    #[test]
    fn rejects_out_of_range_chunk_sizes() {
        assert!(matches!(
            FileHasher::new(HashAlgorithm::Md5, MIN_CHUNK_SIZE - 1),
            Err(DedupeError::InvalidArgument(_))
        ));
        assert!(matches!(
            FileHasher::new(HashAlgorithm::Md5, MAX_CHUNK_SIZE + 1),
            Err(DedupeError::InvalidArgument(_))
        ));
        assert!(FileHasher::new(HashAlgorithm::Md5, MAX_CHUNK_SIZE).is_ok());
    }

    #[test]
    fn parses_algorithm_names() {
        assert_eq!("MD5".parse::<HashAlgorithm>().expect("md5"), HashAlgorithm::Md5);
        assert_eq!(
            "sha-256".parse::<HashAlgorithm>().expect("sha"),
            HashAlgorithm::Sha256
        );
        assert!(matches!(
            "crc32".parse::<HashAlgorithm>(),
            Err(DedupeError::InvalidArgument(_))
        ));
    }

    #[test]
    fn missing_file_is_not_found_and_batch_skips_it() {
        let temp = TempDir::new().expect("tempdir");
        let present = temp.path().join("present.txt");
        fs::write(&present, b"here").expect("write");
        let missing = temp.path().join("missing.txt");

        let hasher = FileHasher::default();
        assert!(hasher.compute_hash(&missing).expect_err("missing").is_not_found());

        let batch = hasher.compute_batch(&[present.clone(), missing]);
        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].path, present);
        assert_eq!(batch[0].size, 4);
    }
}
