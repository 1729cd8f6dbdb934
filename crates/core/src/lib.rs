pub mod backup;
pub mod cluster;
pub mod config;
pub mod dedupe;
pub mod documents;
pub mod embed;
pub mod error;
pub mod extract;
pub mod hasher;
pub mod images;
pub mod index;
pub mod lock;
pub mod markdown;
pub mod model;
pub mod scan;
pub mod semantic;

pub use backup::{BackupManager, DEFAULT_BACKUP_DIR, MANIFEST_FILE};
pub use config::{BackupConfig, EngineConfig, HashingConfig};
pub use dedupe::{is_size_unique_key, DuplicateDetector};
pub use documents::{DocumentDeduplicator, DocumentMatcherOptions};
pub use embed::{DocumentEmbedder, EmbedderOptions, EmbeddingCache};
pub use error::{DedupeError, Result};
pub use extract::{DocumentExtractor, TextExtractor};
pub use hasher::{FileHasher, HashAlgorithm};
pub use images::{
    hamming_distance, similarity, FingerprintProvider, ImageDecoder, ImageDeduplicator,
    ImageMatcherOptions, ImageValidation, PerceptualVariant, SimilarityBand,
};
pub use index::DuplicateIndex;
pub use markdown::{human_bytes, render_markdown_summary};
pub use model::{
    BackupIssue, BackupRecord, BackupStatistics, DocumentCluster, DuplicateGroup,
    DuplicateReport, FileFingerprint, FileMetadata, ImageCluster, IndexStatistics, IndexedFile,
    PerceptualFingerprint, ScanSummary, REPORT_VERSION,
};
pub use scan::ScanOptions;
