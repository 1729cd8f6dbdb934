use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use image::{DynamicImage, ImageReader};
use image_hasher::{HashAlg, Hasher, HasherConfig};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::cluster::single_linkage;
use crate::error::{DedupeError, Result};
use crate::model::{ImageCluster, PerceptualFingerprint};
use crate::scan::{enumerate_by_extension, extension_of};

pub const SUPPORTED_IMAGE_EXTENSIONS: &[&str] =
    &["jpg", "jpeg", "png", "gif", "bmp", "tiff", "tif", "webp"];

pub const DEFAULT_HASH_SIZE: u32 = 8;
pub const DEFAULT_IMAGE_THRESHOLD: u32 = 10;

#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord, Default,
)]
#[serde(rename_all = "snake_case")]
pub enum PerceptualVariant {
    /// DCT-based; tolerates most edits.
    #[default]
    Perceptual,
    /// Gradient-based; fast and resize-tolerant.
    Difference,
    /// Mean-based; fastest, near-exact copies only.
    Average,
}

impl PerceptualVariant {
    pub const ALL: [PerceptualVariant; 3] = [Self::Perceptual, Self::Difference, Self::Average];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Perceptual => "perceptual",
            Self::Difference => "difference",
            Self::Average => "average",
        }
    }
}

impl fmt::Display for PerceptualVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PerceptualVariant {
    type Err = DedupeError;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "perceptual" | "phash" => Ok(Self::Perceptual),
            "difference" | "dhash" => Ok(Self::Difference),
            "average" | "ahash" => Ok(Self::Average),
            other => Err(DedupeError::invalid_argument(format!(
                "unknown perceptual hash variant '{other}'"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SimilarityBand {
    Exact,
    NearIdentical,
    Similar,
    LooselySimilar,
    Distinct,
}

impl SimilarityBand {
    pub fn from_distance(distance: u32) -> Self {
        match distance {
            0 => Self::Exact,
            1..=5 => Self::NearIdentical,
            6..=10 => Self::Similar,
            11..=20 => Self::LooselySimilar,
            _ => Self::Distinct,
        }
    }
}

pub trait ImageDecoder {
    fn decode(&self, path: &Path) -> Result<DynamicImage>;
}

/// Decodes through the `image` crate, sniffing the format from content.
#[derive(Debug, Default, Clone, Copy)]
pub struct StandardDecoder;

impl ImageDecoder for StandardDecoder {
    fn decode(&self, path: &Path) -> Result<DynamicImage> {
        let reader = ImageReader::open(path)
            .map_err(|err| DedupeError::from_io(path, err))?
            .with_guessed_format()
            .map_err(|err| DedupeError::from_io(path, err))?;
        if reader.format().is_none() {
            return Err(DedupeError::InvalidFormat(format!(
                "unrecognized image format: {}",
                path.display()
            )));
        }
        reader
            .decode()
            .map_err(|err| DedupeError::Corrupt(format!("{}: {}", path.display(), err)))
    }
}

pub trait FingerprintProvider {
    fn variant(&self) -> PerceptualVariant;

    /// Lowercase hex rendering of the perceptual hash bits.
    fn fingerprint(&self, image: &DynamicImage) -> String;
}

pub struct ImageHasherProvider {
    variant: PerceptualVariant,
    hasher: Hasher,
}

impl ImageHasherProvider {
    pub fn new(variant: PerceptualVariant, hash_size: u32) -> Self {
        let config = HasherConfig::new().hash_size(hash_size, hash_size);
        let config = match variant {
            PerceptualVariant::Perceptual => config.hash_alg(HashAlg::Mean).preproc_dct(),
            PerceptualVariant::Difference => config.hash_alg(HashAlg::Gradient),
            PerceptualVariant::Average => config.hash_alg(HashAlg::Mean),
        };
        Self {
            variant,
            hasher: config.to_hasher(),
        }
    }
}

impl FingerprintProvider for ImageHasherProvider {
    fn variant(&self) -> PerceptualVariant {
        self.variant
    }

    fn fingerprint(&self, image: &DynamicImage) -> String {
        to_hex(self.hasher.hash_image(image).as_bytes())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ImageMatcherOptions {
    pub variant: PerceptualVariant,
    pub threshold: u32,
    pub hash_size: u32,
}

impl Default for ImageMatcherOptions {
    fn default() -> Self {
        Self {
            variant: PerceptualVariant::default(),
            threshold: DEFAULT_IMAGE_THRESHOLD,
            hash_size: DEFAULT_HASH_SIZE,
        }
    }
}

impl ImageMatcherOptions {
    pub fn validate(&self) -> Result<()> {
        let size = self.hash_size;
        if !(4..=32).contains(&size) || (size * size) % 8 != 0 {
            return Err(DedupeError::invalid_argument(format!(
                "hash_size {size} must be 4..=32 with a whole number of bytes"
            )));
        }
        if self.threshold > size * size {
            return Err(DedupeError::invalid_argument(format!(
                "threshold {} exceeds the {}-bit fingerprint",
                self.threshold,
                size * size
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ImageValidation {
    pub path: PathBuf,
    pub valid: bool,
    pub format: Option<String>,
    pub dimensions: Option<(u32, u32)>,
    pub reason: Option<String>,
}

/// Visual duplicate finder. Each variant is a registered [`FingerprintProvider`];
/// grouping is single-linkage over Hamming distance.
pub struct ImageDeduplicator {
    options: ImageMatcherOptions,
    decoder: Box<dyn ImageDecoder>,
    providers: HashMap<PerceptualVariant, Box<dyn FingerprintProvider>>,
}

impl ImageDeduplicator {
    pub fn new(options: ImageMatcherOptions) -> Result<Self> {
        options.validate()?;
        let providers = PerceptualVariant::ALL
            .into_iter()
            .map(|variant| {
                let provider: Box<dyn FingerprintProvider> =
                    Box::new(ImageHasherProvider::new(variant, options.hash_size));
                (variant, provider)
            })
            .collect();
        Ok(Self {
            options,
            decoder: Box::new(StandardDecoder),
            providers,
        })
    }

    /// Replaces the provider registered for `provider.variant()`.
    pub fn register_provider(&mut self, provider: Box<dyn FingerprintProvider>) {
        self.providers.insert(provider.variant(), provider);
    }

    pub fn options(&self) -> &ImageMatcherOptions {
        &self.options
    }

    pub fn bit_len(&self) -> u32 {
        self.options.hash_size * self.options.hash_size
    }

    /// `None` when the image cannot be read, decoded or fingerprinted.
    pub fn fingerprint(&self, path: &Path) -> Option<PerceptualFingerprint> {
        let provider = match self.providers.get(&self.options.variant) {
            Some(provider) => provider,
            None => {
                warn!("no fingerprint provider registered for {}", self.options.variant);
                return None;
            }
        };
        match self.decoder.decode(path) {
            Ok(image) => {
                let hash = provider.fingerprint(&image);
                debug!(path = %path.display(), hash = %hash, "image fingerprinted");
                Some(PerceptualFingerprint {
                    path: path.to_path_buf(),
                    hash,
                    variant: self.options.variant,
                })
            }
            Err(err) => {
                warn!("image skipped {}: {}", path.display(), err);
                None
            }
        }
    }

    pub fn fingerprint_batch<F>(&self, paths: &[PathBuf], mut on_progress: F) -> Vec<PerceptualFingerprint>
    where
        F: FnMut(usize, usize),
    {
        let total = paths.len();
        let mut fingerprints = Vec::with_capacity(total);
        for (processed, path) in paths.iter().enumerate() {
            if let Some(fingerprint) = self.fingerprint(path) {
                fingerprints.push(fingerprint);
            }
            on_progress(processed + 1, total);
        }
        fingerprints
    }

    pub fn find_duplicates(&self, dir: &Path, recursive: bool) -> Result<Vec<ImageCluster>> {
        let paths = self.image_paths(dir, recursive)?;
        let fingerprints = self.fingerprint_batch(&paths, |_, _| {});
        let clusters = self.cluster(&fingerprints);
        info!(
            dir = %dir.display(),
            images = paths.len(),
            fingerprinted = fingerprints.len(),
            clusters = clusters.len(),
            "image duplicate scan finished"
        );
        Ok(clusters)
    }

    /// Groups fingerprints whose distance is within the threshold, chaining
    /// transitively (single linkage).
    pub fn cluster(&self, fingerprints: &[PerceptualFingerprint]) -> Vec<ImageCluster> {
        let threshold = self.options.threshold;
        let distance = |i: usize, j: usize| hamming_distance(&fingerprints[i].hash, &fingerprints[j].hash);

        single_linkage(fingerprints.len(), 2, |i, j| {
            distance(i, j).is_some_and(|d| d <= threshold)
        })
        .into_iter()
        .map(|members| {
            let mut max_distance = 0;
            for (pos, &i) in members.iter().enumerate() {
                for &j in &members[pos + 1..] {
                    if let Some(d) = distance(i, j) {
                        max_distance = max_distance.max(d);
                    }
                }
            }
            let mut paths = members
                .iter()
                .map(|&i| fingerprints[i].path.clone())
                .collect::<Vec<_>>();
            paths.sort();
            ImageCluster {
                paths,
                max_distance,
            }
        })
        .collect()
    }

    /// Images under `dir` within the threshold of `target`, closest first.
    pub fn find_similar(&self, target: &Path, dir: &Path, recursive: bool) -> Result<Vec<(PathBuf, u32)>> {
        let reference = self.fingerprint(target).ok_or_else(|| {
            DedupeError::Corrupt(format!("cannot fingerprint {}", target.display()))
        })?;
        let resolved_target = std::fs::canonicalize(target).unwrap_or_else(|_| target.to_path_buf());

        let paths = self.image_paths(dir, recursive)?;
        let mut matches = self
            .fingerprint_batch(&paths, |_, _| {})
            .into_iter()
            .filter(|candidate| {
                std::fs::canonicalize(&candidate.path).unwrap_or_else(|_| candidate.path.clone())
                    != resolved_target
            })
            .filter_map(|candidate| {
                hamming_distance(&reference.hash, &candidate.hash)
                    .filter(|d| *d <= self.options.threshold)
                    .map(|d| (candidate.path, d))
            })
            .collect::<Vec<_>>();
        matches.sort_by(|a, b| a.1.cmp(&b.1).then_with(|| a.0.cmp(&b.0)));
        Ok(matches)
    }

    pub fn validate_image(&self, path: &Path) -> ImageValidation {
        let mut report = ImageValidation {
            path: path.to_path_buf(),
            valid: false,
            format: None,
            dimensions: None,
            reason: None,
        };

        if !path.is_file() {
            report.reason = Some("file does not exist".to_string());
            return report;
        }
        let supported = extension_of(path)
            .is_some_and(|ext| SUPPORTED_IMAGE_EXTENSIONS.contains(&ext.as_str()));
        if !supported {
            report.reason = Some("unsupported image extension".to_string());
            return report;
        }

        let format = ImageReader::open(path)
            .and_then(|reader| reader.with_guessed_format())
            .ok()
            .and_then(|reader| reader.format());
        report.format = format.map(|format| format!("{format:?}").to_lowercase());
        if format.is_none() {
            report.reason = Some("unrecognized image content".to_string());
            return report;
        }

        match self.decoder.decode(path) {
            Ok(image) => {
                report.dimensions = Some((image.width(), image.height()));
                report.valid = true;
            }
            Err(err) => report.reason = Some(err.to_string()),
        }
        report
    }

    fn image_paths(&self, dir: &Path, recursive: bool) -> Result<Vec<PathBuf>> {
        let mut paths = enumerate_by_extension(dir, recursive, SUPPORTED_IMAGE_EXTENSIONS)?
            .files
            .into_iter()
            .map(|entry| entry.path)
            .collect::<Vec<_>>();
        paths.sort();
        Ok(paths)
    }
}

/// Number of differing bits between two equal-length hex fingerprints.
pub fn hamming_distance(a: &str, b: &str) -> Option<u32> {
    if a.len() != b.len() {
        return None;
    }
    a.chars().zip(b.chars()).try_fold(0_u32, |acc, (x, y)| {
        let x = x.to_digit(16)?;
        let y = y.to_digit(16)?;
        Some(acc + (x ^ y).count_ones())
    })
}

/// `1 - distance / bit_len`, in [0, 1].
pub fn similarity(a: &PerceptualFingerprint, b: &PerceptualFingerprint) -> Option<f64> {
    if a.variant != b.variant {
        return None;
    }
    let bits = a.bit_len();
    if bits == 0 {
        return None;
    }
    hamming_distance(&a.hash, &b.hash).map(|distance| 1.0 - f64::from(distance) / bits as f64)
}

fn to_hex(bytes: &[u8]) -> String {
    bytes.iter().map(|byte| format!("{byte:02x}")).collect()
}
