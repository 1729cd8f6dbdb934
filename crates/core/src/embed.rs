use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{DedupeError, Result};

pub const DEFAULT_MAX_FEATURES: usize = 5_000;
pub const CACHE_FILE: &str = "embeddings.json";

const STOP_WORDS: &[&str] = &[
    "about", "above", "after", "again", "against", "all", "am", "an", "and", "any", "are",
    "as", "at", "be", "because", "been", "before", "being", "below", "between", "both", "but",
    "by", "can", "could", "did", "do", "does", "doing", "down", "during", "each", "few", "for",
    "from", "further", "had", "has", "have", "having", "he", "her", "here", "hers", "herself",
    "him", "himself", "his", "how", "if", "in", "into", "is", "it", "its", "itself", "just",
    "me", "more", "most", "my", "myself", "no", "nor", "not", "now", "of", "off", "on", "once",
    "only", "or", "other", "our", "ours", "ourselves", "out", "over", "own", "same", "she",
    "should", "so", "some", "such", "than", "that", "the", "their", "theirs", "them",
    "themselves", "then", "there", "these", "they", "this", "those", "through", "to", "too",
    "under", "until", "up", "very", "was", "we", "were", "what", "when", "where", "which",
    "while", "who", "whom", "why", "will", "with", "would", "you", "your", "yours", "yourself",
    "yourselves",
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbedderOptions {
    #[serde(default = "default_max_features")]
    pub max_features: usize,
    #[serde(default = "default_ngram_min")]
    pub ngram_min: usize,
    #[serde(default = "default_ngram_max")]
    pub ngram_max: usize,
    /// Minimum number of documents a term must appear in.
    #[serde(default = "default_min_df")]
    pub min_df: usize,
    /// Maximum share of documents a term may appear in.
    #[serde(default = "default_max_df")]
    pub max_df: f64,
}

impl Default for EmbedderOptions {
    fn default() -> Self {
        Self {
            max_features: default_max_features(),
            ngram_min: default_ngram_min(),
            ngram_max: default_ngram_max(),
            min_df: default_min_df(),
            max_df: default_max_df(),
        }
    }
}

impl EmbedderOptions {
    pub fn validate(&self) -> Result<()> {
        if self.ngram_min == 0 || self.ngram_min > self.ngram_max {
            return Err(DedupeError::invalid_argument(format!(
                "invalid n-gram range {}..={}",
                self.ngram_min, self.ngram_max
            )));
        }
        if self.max_features == 0 {
            return Err(DedupeError::invalid_argument("max_features must be positive"));
        }
        if !(self.max_df > 0.0 && self.max_df <= 1.0) {
            return Err(DedupeError::invalid_argument(format!(
                "max_df must be in (0, 1], got {}",
                self.max_df
            )));
        }
        Ok(())
    }
}

fn default_max_features() -> usize {
    DEFAULT_MAX_FEATURES
}

fn default_ngram_min() -> usize {
    1
}

fn default_ngram_max() -> usize {
    2
}

fn default_min_df() -> usize {
    1
}

fn default_max_df() -> f64 {
    1.0
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct TfIdfModel {
    options: EmbedderOptions,
    document_count: usize,
    vocabulary: BTreeMap<String, usize>,
    idf: Vec<f32>,
}

/// TF-IDF vectoriser: raw term counts weighted by smoothed idf, L2-normalised.
#[derive(Debug, Clone, Default)]
pub struct DocumentEmbedder {
    options: EmbedderOptions,
    model: Option<TfIdfModel>,
}

impl DocumentEmbedder {
    pub fn new(options: EmbedderOptions) -> Result<Self> {
        options.validate()?;
        Ok(Self {
            options,
            model: None,
        })
    }

    pub fn options(&self) -> &EmbedderOptions {
        &self.options
    }

    pub fn is_fitted(&self) -> bool {
        self.model.is_some()
    }

    pub fn vocabulary_len(&self) -> usize {
        self.model.as_ref().map_or(0, |model| model.vocabulary.len())
    }

    pub fn fit<S: AsRef<str>>(&mut self, texts: &[S]) -> Result<()> {
        if texts.is_empty() {
            return Err(DedupeError::invalid_argument(
                "cannot fit an embedding model on zero documents",
            ));
        }

        let mut document_frequency: HashMap<String, usize> = HashMap::new();
        let mut corpus_frequency: HashMap<String, usize> = HashMap::new();
        for text in texts {
            let mut counts = self.term_counts(text.as_ref());
            for (term, count) in counts.drain() {
                *corpus_frequency.entry(term.clone()).or_default() += count;
                *document_frequency.entry(term).or_default() += 1;
            }
        }

        let n = texts.len();
        let max_documents = self.options.max_df * n as f64;
        let mut kept = document_frequency
            .iter()
            .filter(|&(_, &df)| df >= self.options.min_df && df as f64 <= max_documents)
            .map(|(term, _)| (term.as_str(), corpus_frequency[term]))
            .collect::<Vec<_>>();
        kept.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
        kept.truncate(self.options.max_features);

        let mut terms = kept.into_iter().map(|(term, _)| term).collect::<Vec<_>>();
        terms.sort_unstable();

        let mut vocabulary = BTreeMap::new();
        let mut idf = Vec::with_capacity(terms.len());
        for (column, term) in terms.into_iter().enumerate() {
            let df = document_frequency[term];
            idf.push((((1 + n) as f64 / (1 + df) as f64).ln() + 1.0) as f32);
            vocabulary.insert(term.to_string(), column);
        }

        if vocabulary.is_empty() {
            warn!(documents = n, "embedding vocabulary is empty after filtering");
        }
        info!(
            documents = n,
            vocabulary = vocabulary.len(),
            "embedding model fitted"
        );
        self.model = Some(TfIdfModel {
            options: self.options.clone(),
            document_count: n,
            vocabulary,
            idf,
        });
        Ok(())
    }

    pub fn transform<S: AsRef<str>>(&self, texts: &[S]) -> Result<Vec<Vec<f32>>> {
        let model = self.model.as_ref().ok_or_else(|| {
            DedupeError::invalid_argument("embedding model must be fitted before transform")
        })?;

        Ok(texts
            .iter()
            .map(|text| {
                let mut vector = vec![0.0_f32; model.vocabulary.len()];
                for (term, count) in self.term_counts(text.as_ref()) {
                    if let Some(&column) = model.vocabulary.get(&term) {
                        vector[column] = count as f32 * model.idf[column];
                    }
                }
                normalize(&mut vector);
                vector
            })
            .collect())
    }

    pub fn fit_transform<S: AsRef<str>>(&mut self, texts: &[S]) -> Result<Vec<Vec<f32>>> {
        self.fit(texts)?;
        self.transform(texts)
    }

    /// Stable identifier of the fitted model, used to invalidate cached vectors.
    pub fn signature(&self) -> Option<String> {
        let model = self.model.as_ref()?;
        let bytes = serde_json::to_vec(model).ok()?;
        Some(blake3::hash(&bytes).to_hex().to_string())
    }

    pub fn save_model(&self, path: &Path) -> Result<()> {
        let model = self
            .model
            .as_ref()
            .ok_or_else(|| DedupeError::invalid_argument("no fitted embedding model to save"))?;
        let json = serde_json::to_string_pretty(model)
            .map_err(|err| DedupeError::InvalidFormat(err.to_string()))?;
        fs::write(path, json).map_err(|err| DedupeError::from_io(path, err))?;
        debug!(path = %path.display(), "embedding model saved");
        Ok(())
    }

    pub fn load_model(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path).map_err(|err| DedupeError::from_io(path, err))?;
        let model: TfIdfModel = serde_json::from_str(&raw).map_err(|err| {
            DedupeError::InvalidFormat(format!(
                "embedding model {} is not valid: {}",
                path.display(),
                err
            ))
        })?;
        if model.idf.len() != model.vocabulary.len() {
            return Err(DedupeError::Corrupt(format!(
                "embedding model {} has {} idf weights for {} terms",
                path.display(),
                model.idf.len(),
                model.vocabulary.len()
            )));
        }
        Ok(Self {
            options: model.options.clone(),
            model: Some(model),
        })
    }

    fn term_counts(&self, text: &str) -> HashMap<String, usize> {
        let tokens = tokenize(text);
        let mut counts = HashMap::new();
        for n in self.options.ngram_min..=self.options.ngram_max {
            if n > tokens.len() {
                break;
            }
            for window in tokens.windows(n) {
                *counts.entry(window.join(" ")).or_default() += 1;
            }
        }
        counts
    }
}

fn tokenize(text: &str) -> Vec<String> {
    text.split(|ch: char| !ch.is_alphanumeric())
        .filter(|token| token.chars().count() >= 2)
        .map(str::to_lowercase)
        .filter(|token| !STOP_WORDS.contains(&token.as_str()))
        .collect()
}

fn normalize(vector: &mut [f32]) {
    let norm = vector.iter().map(|value| value * value).sum::<f32>().sqrt();
    if norm > 0.0 {
        vector.iter_mut().for_each(|value| *value /= norm);
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct CacheFile {
    model: String,
    entries: HashMap<String, Vec<f32>>,
}

/// On-disk vector cache keyed by the BLAKE3 digest of the document text.
///
/// Entries belong to one fitted model; opening the cache for a different
/// model signature starts from empty.
#[derive(Debug)]
pub struct EmbeddingCache {
    path: PathBuf,
    contents: CacheFile,
    dirty: bool,
}

impl EmbeddingCache {
    pub fn open(dir: &Path, model_signature: &str) -> Result<Self> {
        fs::create_dir_all(dir).map_err(|err| DedupeError::from_io(dir, err))?;
        let path = dir.join(CACHE_FILE);

        let contents = match fs::read_to_string(&path) {
            Ok(raw) => match serde_json::from_str::<CacheFile>(&raw) {
                Ok(cache) if cache.model == model_signature => cache,
                Ok(_) => {
                    debug!(path = %path.display(), "embedding cache built for another model");
                    CacheFile::default()
                }
                Err(err) => {
                    warn!("embedding cache {} unreadable, starting empty: {}", path.display(), err);
                    CacheFile::default()
                }
            },
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => CacheFile::default(),
            Err(err) => return Err(DedupeError::from_io(&path, err)),
        };

        Ok(Self {
            path,
            contents: CacheFile {
                model: model_signature.to_string(),
                entries: contents.entries,
            },
            dirty: false,
        })
    }

    pub fn key(text: &str) -> String {
        blake3::hash(text.as_bytes()).to_hex().to_string()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> usize {
        self.contents.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.contents.entries.is_empty()
    }

    pub fn get(&self, text: &str) -> Option<&[f32]> {
        self.contents
            .entries
            .get(&Self::key(text))
            .map(Vec::as_slice)
    }

    pub fn insert(&mut self, text: &str, vector: Vec<f32>) {
        self.contents.entries.insert(Self::key(text), vector);
        self.dirty = true;
    }

    pub fn persist(&mut self) -> Result<()> {
        if !self.dirty {
            return Ok(());
        }
        let json = serde_json::to_string(&self.contents)
            .map_err(|err| DedupeError::InvalidFormat(err.to_string()))?;
        let staging = self.path.with_extension("json.tmp");
        fs::write(&staging, json).map_err(|err| DedupeError::from_io(&staging, err))?;
        fs::rename(&staging, &self.path).map_err(|err| DedupeError::from_io(&self.path, err))?;
        self.dirty = false;
        debug!(path = %self.path.display(), entries = self.len(), "embedding cache persisted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::{tokenize, DocumentEmbedder, EmbedderOptions, EmbeddingCache};
    use crate::error::DedupeError;

    fn norm(vector: &[f32]) -> f32 {
        vector.iter().map(|v| v * v).sum::<f32>().sqrt()
    }

    #[test]
    fn tokenizer_drops_stop_words_and_short_tokens() {
        assert_eq!(
            tokenize("The quick brown fox, a B-52 and I."),
            vec!["quick", "brown", "fox", "52"]
        );
    }

    #[test]
    fn transform_requires_fit() {
        let embedder = DocumentEmbedder::default();
        assert!(matches!(
            embedder.transform(&["hello world"]),
            Err(DedupeError::InvalidArgument(_))
        ));
        let mut embedder = DocumentEmbedder::default();
        assert!(embedder.fit::<&str>(&[]).is_err());
    }

    #[test]
    fn vectors_are_unit_length_and_share_dimension() {
        let mut embedder = DocumentEmbedder::default();
        let vectors = embedder
            .fit_transform(&[
                "quarterly revenue grew across every region",
                "revenue fell in the northern region",
                "the",
            ])
            .expect("fit");

        assert_eq!(vectors.len(), 3);
        assert!(vectors.iter().all(|v| v.len() == embedder.vocabulary_len()));
        assert!((norm(&vectors[0]) - 1.0).abs() < 1e-5);
        assert!((norm(&vectors[1]) - 1.0).abs() < 1e-5);
        // Only stop words: nothing to weight.
        assert_eq!(norm(&vectors[2]), 0.0);
    }

    #[test]
    fn bigrams_and_feature_cap_are_applied() {
        let mut embedder = DocumentEmbedder::new(EmbedderOptions {
            max_features: 3,
            ..EmbedderOptions::default()
        })
        .expect("options");
        embedder
            .fit(&["alpha beta alpha beta gamma", "alpha beta delta"])
            .expect("fit");
        // alpha, beta and "alpha beta" are the most frequent terms.
        assert_eq!(embedder.vocabulary_len(), 3);

        let mut unigrams = DocumentEmbedder::new(EmbedderOptions {
            ngram_max: 1,
            ..EmbedderOptions::default()
        })
        .expect("options");
        unigrams
            .fit(&["alpha beta alpha beta gamma", "alpha beta delta"])
            .expect("fit");
        assert_eq!(unigrams.vocabulary_len(), 4);
    }

    #[test]
    fn document_frequency_bounds_filter_terms() {
        let mut embedder = DocumentEmbedder::new(EmbedderOptions {
            ngram_max: 1,
            min_df: 2,
            ..EmbedderOptions::default()
        })
        .expect("options");
        embedder
            .fit(&["shared rare", "shared other", "shared"])
            .expect("fit");
        assert_eq!(embedder.vocabulary_len(), 1);

        assert!(DocumentEmbedder::new(EmbedderOptions {
            ngram_min: 3,
            ngram_max: 2,
            ..EmbedderOptions::default()
        })
        .is_err());
    }

    #[test]
    fn saved_model_reproduces_vectors() {
        let temp = TempDir::new().expect("tempdir");
        let path = temp.path().join("model.json");
        let corpus = ["invoice for march services", "invoice for april services"];

        let mut embedder = DocumentEmbedder::default();
        let expected = embedder.fit_transform(&corpus).expect("fit");
        embedder.save_model(&path).expect("save");

        let loaded = DocumentEmbedder::load_model(&path).expect("load");
        assert_eq!(loaded.transform(&corpus).expect("transform"), expected);
        assert_eq!(loaded.signature(), embedder.signature());

        std::fs::write(&path, "{ nope").expect("corrupt");
        assert!(matches!(
            DocumentEmbedder::load_model(&path),
            Err(DedupeError::InvalidFormat(_))
        ));
    }

    #[test]
    fn cache_persists_per_model_signature() {
        let temp = TempDir::new().expect("tempdir");

        let mut cache = EmbeddingCache::open(temp.path(), "model-a").expect("open");
        assert!(cache.is_empty());
        cache.insert("some text", vec![0.6, 0.8]);
        cache.persist().expect("persist");

        let reopened = EmbeddingCache::open(temp.path(), "model-a").expect("reopen");
        assert_eq!(reopened.get("some text"), Some(&[0.6_f32, 0.8][..]));
        assert_eq!(reopened.get("other text"), None);

        let other_model = EmbeddingCache::open(temp.path(), "model-b").expect("other");
        assert!(other_model.is_empty());
    }
}
