use std::path::PathBuf;

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use serde::{de, Deserialize, Deserializer, Serialize};

use crate::hasher::HashAlgorithm;

pub const REPORT_VERSION: &str = "1.0.0";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FileFingerprint {
    pub path: PathBuf,
    pub size: u64,
    pub content_hash: String,
    pub algorithm: HashAlgorithm,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct FileMetadata {
    pub size: u64,
    #[serde(default)]
    pub modified: Option<DateTime<Utc>>,
    #[serde(default)]
    pub accessed: Option<DateTime<Utc>>,
}

impl FileMetadata {
    pub fn from_fs(metadata: &std::fs::Metadata) -> Self {
        Self {
            size: metadata.len(),
            modified: metadata.modified().ok().map(DateTime::<Utc>::from),
            accessed: metadata.accessed().ok().map(DateTime::<Utc>::from),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct IndexedFile {
    pub path: PathBuf,
    pub hash: String,
    pub metadata: FileMetadata,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DuplicateGroup {
    pub hash: String,
    pub size: u64,
    pub files: Vec<IndexedFile>,
    pub count: usize,
    pub total_size: u64,
    pub wasted_space: u64,
}

impl DuplicateGroup {
    pub fn keep(&self) -> Option<&IndexedFile> {
        self.files.first()
    }

    pub fn redundant(&self) -> &[IndexedFile] {
        self.files.get(1..).unwrap_or_default()
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct IndexStatistics {
    pub total_files: usize,
    pub unique_files: usize,
    pub duplicate_files: usize,
    pub duplicate_groups: usize,
    pub wasted_space: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct ScanSummary {
    pub root: PathBuf,
    pub files_seen: usize,
    pub files_hashed: usize,
    pub size_unique_files: usize,
    pub hash_failures: usize,
    pub elapsed_ms: u64,
    #[serde(default)]
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BackupRecord {
    pub original_path: PathBuf,
    pub backup_path: PathBuf,
    /// Written as RFC 3339. Timestamps without an offset are read back as UTC.
    #[serde(deserialize_with = "deserialize_timestamp")]
    pub backup_time: DateTime<Utc>,
    pub file_size: u64,
    #[serde(deserialize_with = "deserialize_timestamp")]
    pub original_mtime: DateTime<Utc>,
}

const NAIVE_TIMESTAMP_FORMATS: [&str; 2] = ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"];

pub(crate) fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(stamp) = DateTime::parse_from_rfc3339(raw) {
        return Some(stamp.with_timezone(&Utc));
    }
    NAIVE_TIMESTAMP_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(raw, format).ok())
        .map(|naive| Utc.from_utc_datetime(&naive))
}

fn deserialize_timestamp<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    parse_timestamp(&raw).ok_or_else(|| de::Error::custom(format!("invalid timestamp `{raw}`")))
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BackupIssue {
    Missing { backup_path: PathBuf },
    SizeMismatch { backup_path: PathBuf, expected: u64, actual: u64 },
}

impl BackupIssue {
    pub fn backup_path(&self) -> &PathBuf {
        match self {
            Self::Missing { backup_path } | Self::SizeMismatch { backup_path, .. } => backup_path,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BackupStatistics {
    pub backup_dir: PathBuf,
    pub total_backups: usize,
    pub total_size: u64,
    pub oldest: Option<DateTime<Utc>>,
    pub newest: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PerceptualFingerprint {
    pub path: PathBuf,
    pub hash: String,
    pub variant: crate::images::PerceptualVariant,
}

impl PerceptualFingerprint {
    pub fn bit_len(&self) -> usize {
        self.hash.len() * 4
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ImageCluster {
    pub paths: Vec<PathBuf>,
    pub max_distance: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DocumentCluster {
    pub paths: Vec<PathBuf>,
    pub average_similarity: f32,
    pub total_size: u64,
    pub estimated_wasted_space: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DuplicateReport {
    pub report_version: String,
    pub generated_at: DateTime<Utc>,
    pub summary: ScanSummary,
    pub statistics: IndexStatistics,
    pub groups: Vec<DuplicateGroup>,
    #[serde(default)]
    pub image_clusters: Vec<ImageCluster>,
    #[serde(default)]
    pub document_clusters: Vec<DocumentCluster>,
}

impl DuplicateReport {
    pub fn new(summary: ScanSummary, statistics: IndexStatistics, groups: Vec<DuplicateGroup>) -> Self {
        Self {
            report_version: REPORT_VERSION.to_string(),
            generated_at: Utc::now(),
            summary,
            statistics,
            groups,
            image_clusters: Vec::new(),
            document_clusters: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use super::{parse_timestamp, BackupRecord};

    #[test]
    fn timestamps_with_and_without_offset_parse() {
        let expected = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).single().expect("date");
        assert_eq!(parse_timestamp("2024-05-01T12:00:00Z"), Some(expected));
        assert_eq!(parse_timestamp("2024-05-01T14:00:00+02:00"), Some(expected));
        assert_eq!(parse_timestamp("2024-05-01T12:00:00"), Some(expected));
        assert_eq!(parse_timestamp("2024-05-01 12:00:00"), Some(expected));
        assert_eq!(
            parse_timestamp("2024-05-01T12:00:00.123456"),
            Some(expected + chrono::Duration::microseconds(123_456))
        );
        assert_eq!(parse_timestamp("yesterday"), None);
    }

    #[test]
    fn backup_record_accepts_naive_timestamps() {
        let json = r#"{
            "original_path": "/data/a.txt",
            "backup_path": "/store/a_1.txt",
            "backup_time": "2024-05-01T12:00:00.123456",
            "file_size": 3,
            "original_mtime": "2024-04-30T08:15:00+00:00"
        }"#;
        let record: BackupRecord = serde_json::from_str(json).expect("record");
        assert_eq!(record.file_size, 3);
        assert_eq!(
            record.original_mtime,
            Utc.with_ymd_and_hms(2024, 4, 30, 8, 15, 0).single().expect("date")
        );
        assert!(serde_json::from_str::<BackupRecord>(&json.replace("2024-05-01T12", "noon")).is_err());
    }
}
