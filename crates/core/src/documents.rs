use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::embed::{DocumentEmbedder, EmbedderOptions, EmbeddingCache};
use crate::error::{DedupeError, Result};
use crate::extract::{DocumentExtractor, TextExtractor};
use crate::model::DocumentCluster;
use crate::scan::enumerate_by_extension;
use crate::semantic::{average_similarity, find_duplicate_groups, DEFAULT_SIMILARITY_THRESHOLD};

pub const DEFAULT_MIN_TEXT_LENGTH: usize = 50;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentMatcherOptions {
    #[serde(default = "default_similarity_threshold")]
    pub similarity_threshold: f32,
    #[serde(default = "default_min_text_length")]
    pub min_text_length: usize,
    #[serde(flatten)]
    pub embedding: EmbedderOptions,
    #[serde(default)]
    pub cache_dir: Option<PathBuf>,
}

impl Default for DocumentMatcherOptions {
    fn default() -> Self {
        Self {
            similarity_threshold: default_similarity_threshold(),
            min_text_length: default_min_text_length(),
            embedding: EmbedderOptions::default(),
            cache_dir: None,
        }
    }
}

impl DocumentMatcherOptions {
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.similarity_threshold) {
            return Err(DedupeError::invalid_argument(format!(
                "document similarity threshold must be in [0, 1], got {}",
                self.similarity_threshold
            )));
        }
        self.embedding.validate()
    }
}

fn default_similarity_threshold() -> f32 {
    DEFAULT_SIMILARITY_THRESHOLD
}

fn default_min_text_length() -> usize {
    DEFAULT_MIN_TEXT_LENGTH
}

struct Candidate {
    path: PathBuf,
    text: String,
    size: u64,
}

/// Extract, embed and group documents whose text is near-identical.
#[derive(Clone)]
pub struct DocumentDeduplicator {
    options: DocumentMatcherOptions,
    extractor: DocumentExtractor,
}

impl DocumentDeduplicator {
    pub fn new(options: DocumentMatcherOptions) -> Result<Self> {
        options.validate()?;
        Ok(Self {
            options,
            extractor: DocumentExtractor::new(),
        })
    }

    pub fn options(&self) -> &DocumentMatcherOptions {
        &self.options
    }

    pub fn register_extractor(&mut self, extractor: Arc<dyn TextExtractor>) {
        self.extractor.register(extractor);
    }

    pub fn find_duplicates(&self, dir: &Path, recursive: bool) -> Result<Vec<DocumentCluster>> {
        let extensions = self.extractor.supported_extensions();
        let mut paths = enumerate_by_extension(dir, recursive, &extensions)?
            .files
            .into_iter()
            .map(|entry| entry.path)
            .collect::<Vec<_>>();
        paths.sort();
        self.find_duplicates_in(&paths)
    }

    pub fn find_duplicates_in(&self, paths: &[PathBuf]) -> Result<Vec<DocumentCluster>> {
        let candidates = self.collect_candidates(paths);
        if candidates.len() < 2 {
            debug!(
                eligible = candidates.len(),
                "not enough documents with text to compare"
            );
            return Ok(Vec::new());
        }

        let texts = candidates
            .iter()
            .map(|candidate| candidate.text.as_str())
            .collect::<Vec<_>>();
        let mut embedder = DocumentEmbedder::new(self.options.embedding.clone())?;
        embedder.fit(&texts)?;
        let vectors = self.embed(&embedder, &texts)?;

        let clusters = find_duplicate_groups(&vectors, self.options.similarity_threshold)
            .into_iter()
            .map(|members| {
                let total_size = members.iter().map(|&i| candidates[i].size).sum::<u64>();
                let count = members.len() as u64;
                DocumentCluster {
                    paths: members.iter().map(|&i| candidates[i].path.clone()).collect(),
                    average_similarity: average_similarity(&vectors, &members),
                    total_size,
                    estimated_wasted_space: estimated_waste(total_size, count),
                }
            })
            .collect::<Vec<_>>();

        info!(
            documents = candidates.len(),
            clusters = clusters.len(),
            threshold = self.options.similarity_threshold,
            "document comparison finished"
        );
        Ok(clusters)
    }

    fn collect_candidates(&self, paths: &[PathBuf]) -> Vec<Candidate> {
        let supported = paths
            .iter()
            .filter(|path| {
                let ok = self.extractor.is_supported(path);
                if !ok {
                    debug!(path = %path.display(), "no text extractor, skipping");
                }
                ok
            })
            .cloned()
            .collect::<Vec<_>>();

        self.extractor
            .extract_batch(&supported)
            .into_iter()
            .filter_map(|(path, text)| {
                if text.trim().chars().count() < self.options.min_text_length {
                    debug!(path = %path.display(), "document text too short, skipping");
                    return None;
                }
                let size = match fs::metadata(&path) {
                    Ok(metadata) => metadata.len(),
                    Err(err) => {
                        warn!("skipping document {}: {}", path.display(), err);
                        return None;
                    }
                };
                Some(Candidate { path, text, size })
            })
            .collect()
    }

    fn embed(&self, embedder: &DocumentEmbedder, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        let (Some(cache_dir), Some(signature)) = (&self.options.cache_dir, embedder.signature())
        else {
            return embedder.transform(texts);
        };

        let mut cache = EmbeddingCache::open(cache_dir, &signature)?;
        let missing = texts
            .iter()
            .copied()
            .filter(|text| cache.get(text).is_none())
            .collect::<Vec<_>>();
        if !missing.is_empty() {
            let fresh = embedder.transform(&missing)?;
            for (text, vector) in missing.iter().zip(fresh) {
                cache.insert(text, vector);
            }
            cache.persist()?;
        }
        debug!(
            cached = texts.len() - missing.len(),
            computed = missing.len(),
            "document vectors ready"
        );

        Ok(texts
            .iter()
            .map(|text| cache.get(text).map(<[f32]>::to_vec).unwrap_or_default())
            .collect())
    }
}

/// `(count - 1)` copies of the average member size, rounded down.
fn estimated_waste(total_size: u64, count: u64) -> u64 {
    if count == 0 {
        return 0;
    }
    let waste = u128::from(total_size) * u128::from(count - 1) / u128::from(count);
    u64::try_from(waste).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::path::Path;
    use std::sync::Arc;

    use anyhow::Result as AnyResult;
    use tempfile::TempDir;

    use super::{estimated_waste, DocumentDeduplicator, DocumentMatcherOptions};
    use crate::embed::CACHE_FILE;
    use crate::extract::TextExtractor;

    const REPORT: &str = "The annual maintenance report covers pump inspections, valve \
        replacements, filter cleaning schedules and the pressure readings collected \
        across all three treatment stations during the winter season.";

    const RECIPE: &str = "Whisk the eggs with sugar until pale, fold in sifted flour and \
        melted butter, then bake the sponge in a moderate oven until golden and springy \
        to the touch.";

    #[test]
    fn near_identical_documents_group_and_estimate_waste() {
        let temp = TempDir::new().expect("tempdir");
        fs::write(temp.path().join("report.txt"), REPORT).expect("report");
        fs::write(
            temp.path().join("report_copy.md"),
            format!("{REPORT} Revised."),
        )
        .expect("copy");
        fs::write(temp.path().join("recipe.txt"), RECIPE).expect("recipe");
        fs::write(temp.path().join("short.txt"), "too short").expect("short");
        fs::write(temp.path().join("image.png"), REPORT).expect("ignored");

        let dedupe = DocumentDeduplicator::new(DocumentMatcherOptions::default()).expect("new");
        let clusters = dedupe.find_duplicates(temp.path(), true).expect("scan");

        assert_eq!(clusters.len(), 1);
        let cluster = &clusters[0];
        assert_eq!(
            cluster.paths,
            vec![temp.path().join("report.txt"), temp.path().join("report_copy.md")]
        );
        assert!(cluster.average_similarity >= 0.85);
        let sizes = (REPORT.len() + REPORT.len() + " Revised.".len()) as u64;
        assert_eq!(cluster.total_size, sizes);
        assert_eq!(cluster.estimated_wasted_space, sizes / 2);
    }

    #[test]
    fn waste_estimate_multiplies_before_dividing() {
        let temp = TempDir::new().expect("tempdir");
        let texts = [
            REPORT.to_string(),
            format!("{REPORT} Revised."),
            format!("{REPORT} Final."),
        ];
        for (i, text) in texts.iter().enumerate() {
            fs::write(temp.path().join(format!("report_{i}.txt")), text).expect("write");
        }

        let dedupe = DocumentDeduplicator::new(DocumentMatcherOptions::default()).expect("new");
        let clusters = dedupe.find_duplicates(temp.path(), false).expect("scan");
        assert_eq!(clusters.len(), 1);
        assert_eq!(clusters[0].paths.len(), 3);

        let total = texts.iter().map(|text| text.len() as u64).sum::<u64>();
        assert_eq!(clusters[0].total_size, total);
        assert_eq!(clusters[0].estimated_wasted_space, total * 2 / 3);
    }

    #[test]
    fn waste_estimate_rounds_down_and_does_not_overflow() {
        assert_eq!(estimated_waste(260, 3), 173);
        assert_eq!(estimated_waste(100, 1), 0);
        assert_eq!(estimated_waste(0, 0), 0);
        assert_eq!(estimated_waste(u64::MAX, 2), u64::MAX / 2);
    }

    #[test]
    fn fewer_than_two_eligible_documents_is_empty() {
        let temp = TempDir::new().expect("tempdir");
        let only = temp.path().join("only.txt");
        fs::write(&only, REPORT).expect("write");
        let short = temp.path().join("short.txt");
        fs::write(&short, "tiny").expect("write");

        let dedupe = DocumentDeduplicator::new(DocumentMatcherOptions::default()).expect("new");
        assert!(dedupe.find_duplicates_in(&[only, short]).expect("run").is_empty());
    }

    #[test]
    fn invalid_threshold_is_rejected() {
        let options = DocumentMatcherOptions {
            similarity_threshold: 1.5,
            ..DocumentMatcherOptions::default()
        };
        assert!(DocumentDeduplicator::new(options).is_err());
    }

    #[test]
    fn cache_directory_is_populated_and_reused() {
        let temp = TempDir::new().expect("tempdir");
        let docs = temp.path().join("docs");
        let cache = temp.path().join("cache");
        fs::create_dir(&docs).expect("docs");
        fs::write(docs.join("a.txt"), REPORT).expect("a");
        fs::write(docs.join("b.txt"), REPORT).expect("b");

        let dedupe = DocumentDeduplicator::new(DocumentMatcherOptions {
            cache_dir: Some(cache.clone()),
            ..DocumentMatcherOptions::default()
        })
        .expect("new");

        let first = dedupe.find_duplicates(&docs, false).expect("first");
        assert!(cache.join(CACHE_FILE).exists());
        let second = dedupe.find_duplicates(&docs, false).expect("second");
        assert_eq!(first, second);
        assert_eq!(first[0].paths.len(), 2);
    }

    #[test]
    fn custom_extractors_extend_supported_formats() {
        struct Upper;

        impl TextExtractor for Upper {
            fn name(&self) -> &'static str {
                "upper"
            }

            fn extensions(&self) -> &'static [&'static str] {
                &["note"]
            }

            fn extract(&self, path: &Path) -> AnyResult<String> {
                Ok(fs::read_to_string(path)?.to_uppercase())
            }
        }

        let temp = TempDir::new().expect("tempdir");
        fs::write(temp.path().join("a.note"), RECIPE).expect("a");
        fs::write(temp.path().join("b.note"), RECIPE.to_lowercase()).expect("b");

        let mut dedupe =
            DocumentDeduplicator::new(DocumentMatcherOptions::default()).expect("new");
        assert!(dedupe.find_duplicates(temp.path(), false).expect("before").is_empty());

        dedupe.register_extractor(Arc::new(Upper));
        let clusters = dedupe.find_duplicates(temp.path(), false).expect("after");
        assert_eq!(clusters.len(), 1);
        assert!(clusters[0].average_similarity > 0.99);
    }
}
