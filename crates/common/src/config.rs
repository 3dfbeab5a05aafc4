//! Application configuration.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Application configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Database configuration.
    pub database: DatabaseConfig,
    /// Blob storage configuration.
    #[serde(default)]
    pub storage: StorageSettings,
    /// Uploaded file policy.
    #[serde(default)]
    pub files: FileSettings,
    /// Garbage collection of expired uploads.
    #[serde(default)]
    pub reclamation: ReclamationSettings,
}

/// Database connection configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// `PostgreSQL` connection URL.
    pub url: String,
    /// Maximum number of connections in the pool.
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    /// Minimum number of connections in the pool.
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,
}

/// Which blob storage backend to use.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageKind {
    /// Local filesystem.
    #[default]
    Local,
    /// S3-compatible object storage.
    S3,
}

/// Blob storage configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct StorageSettings {
    /// Backend kind.
    #[serde(default)]
    pub backend: StorageKind,
    /// Bucket that receives participant documents.
    #[serde(default = "default_bucket")]
    pub bucket: String,
    /// Root directory for the local backend (one sub-directory per bucket).
    #[serde(default = "default_base_path")]
    pub base_path: PathBuf,
    /// S3 endpoint URL.
    #[serde(default)]
    pub endpoint: Option<String>,
    /// S3 region.
    #[serde(default)]
    pub region: Option<String>,
    /// S3 access key ID.
    #[serde(default)]
    pub access_key_id: Option<String>,
    /// S3 secret access key.
    #[serde(default)]
    pub secret_access_key: Option<String>,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            backend: StorageKind::Local,
            bucket: default_bucket(),
            base_path: default_base_path(),
            endpoint: None,
            region: None,
            access_key_id: None,
            secret_access_key: None,
        }
    }
}

/// Upload policy.
#[derive(Debug, Clone, Deserialize)]
pub struct FileSettings {
    /// How long an unreferenced upload lives before it may be reclaimed.
    #[serde(default = "default_temporary_ttl_secs")]
    pub temporary_ttl_secs: u64,
    /// Largest accepted upload.
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: u64,
    /// Accepted MIME types.
    #[serde(default = "default_allowed_content_types")]
    pub allowed_content_types: Vec<String>,
}

impl Default for FileSettings {
    fn default() -> Self {
        Self {
            temporary_ttl_secs: default_temporary_ttl_secs(),
            max_upload_bytes: default_max_upload_bytes(),
            allowed_content_types: default_allowed_content_types(),
        }
    }
}

impl FileSettings {
    /// Temporary upload lifetime.
    #[must_use]
    pub const fn temporary_ttl(&self) -> Duration {
        Duration::from_secs(self.temporary_ttl_secs)
    }

    /// Whether a content type is accepted.
    #[must_use]
    pub fn accepts(&self, content_type: &str) -> bool {
        self.allowed_content_types
            .iter()
            .any(|allowed| allowed.eq_ignore_ascii_case(content_type))
    }
}

/// Reclamation worker configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ReclamationSettings {
    /// Seconds between reclamation batches.
    #[serde(default = "default_reclaim_interval_secs")]
    pub interval_secs: u64,
    /// Files claimed per batch.
    #[serde(default = "default_batch_size")]
    pub batch_size: u64,
    /// Claims older than this are considered abandoned.
    #[serde(default = "default_stale_claim_age_secs")]
    pub stale_claim_age_secs: u64,
    /// Seconds between stale-claim sweeps.
    #[serde(default = "default_stale_sweep_interval_secs")]
    pub stale_sweep_interval_secs: u64,
}

impl Default for ReclamationSettings {
    fn default() -> Self {
        Self {
            interval_secs: default_reclaim_interval_secs(),
            batch_size: default_batch_size(),
            stale_claim_age_secs: default_stale_claim_age_secs(),
            stale_sweep_interval_secs: default_stale_sweep_interval_secs(),
        }
    }
}

const fn default_max_connections() -> u32 {
    100
}

const fn default_min_connections() -> u32 {
    5
}

fn default_bucket() -> String {
    "enrollment-documents".to_string()
}

fn default_base_path() -> PathBuf {
    PathBuf::from("./files")
}

const fn default_temporary_ttl_secs() -> u64 {
    24 * 60 * 60
}

const fn default_max_upload_bytes() -> u64 {
    10 * 1024 * 1024
}

fn default_allowed_content_types() -> Vec<String> {
    vec![
        "application/pdf".to_string(),
        "image/jpeg".to_string(),
        "image/png".to_string(),
    ]
}

const fn default_reclaim_interval_secs() -> u64 {
    300
}

const fn default_batch_size() -> u64 {
    100
}

const fn default_stale_claim_age_secs() -> u64 {
    1800
}

const fn default_stale_sweep_interval_secs() -> u64 {
    600
}

impl Config {
    /// Load configuration from files and environment variables.
    ///
    /// Configuration is loaded in the following order:
    /// 1. `.env` (if present, exported into the process environment)
    /// 2. `config/default.toml`
    /// 3. `config/{environment}.toml` (based on `ENROLLMENT_ENV`)
    /// 4. Environment variables with `ENROLLMENT__` prefix
    pub fn load() -> Result<Self, config::ConfigError> {
        dotenvy::dotenv().ok();
        let env = std::env::var("ENROLLMENT_ENV").unwrap_or_else(|_| "development".to_string());

        let config = config::Config::builder()
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::File::with_name(&format!("config/{env}")).required(false))
            .add_source(
                config::Environment::with_prefix("ENROLLMENT")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }

    /// Load configuration from a specific file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, config::ConfigError> {
        let config = config::Config::builder()
            .add_source(config::File::from(path.as_ref()))
            .add_source(
                config::Environment::with_prefix("ENROLLMENT")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn parse(toml: &str) -> Config {
        config::Config::builder()
            .add_source(config::File::from_str(toml, config::FileFormat::Toml))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap()
    }

    #[test]
    fn test_defaults_apply() {
        let config = parse(
            r#"
            [database]
            url = "postgres://localhost/enrollment"
            "#,
        );

        assert_eq!(config.database.max_connections, 100);
        assert_eq!(config.storage.backend, StorageKind::Local);
        assert_eq!(config.storage.bucket, "enrollment-documents");
        assert_eq!(config.files.temporary_ttl(), Duration::from_secs(86_400));
        assert_eq!(config.reclamation.batch_size, 100);
    }

    #[test]
    fn test_overrides() {
        let config = parse(
            r#"
            [database]
            url = "postgres://localhost/enrollment"

            [storage]
            backend = "s3"
            bucket = "docs"

            [reclamation]
            batch_size = 10
            stale_claim_age_secs = 60
            "#,
        );

        assert_eq!(config.storage.backend, StorageKind::S3);
        assert_eq!(config.storage.bucket, "docs");
        assert_eq!(config.reclamation.batch_size, 10);
        assert_eq!(config.reclamation.stale_claim_age_secs, 60);
    }

    #[test]
    fn test_file_settings_accepts_case_insensitive() {
        let files = FileSettings::default();
        assert!(files.accepts("application/pdf"));
        assert!(files.accepts("IMAGE/PNG"));
        assert!(!files.accepts("application/zip"));
    }
}
