use serde::Deserialize;
use service_core::config as core_config;
use service_core::error::AppError;
use std::env;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
pub struct RecordConfig {
    #[serde(flatten)]
    pub common: core_config::Config,
    pub storage: StorageConfig,
    pub download: DownloadConfig,
    pub limits: LimitsConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    pub local_path: String,
    pub s3_bucket: Option<String>,
    pub s3_region: Option<String>,
}

#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    Local,
    S3,
    Memory,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DownloadConfig {
    /// Scratch directory that receives downloaded copies.
    pub dir: String,
    pub url_ttl_secs: u64,
    pub fetch_timeout_secs: u64,
}

impl DownloadConfig {
    pub fn url_ttl(&self) -> Duration {
        Duration::from_secs(self.url_ttl_secs)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LimitsConfig {
    pub max_upload_bytes: u64,
    /// Owners whose document library stays cached; the least recently used
    /// one is evicted beyond this.
    pub max_cached_owners: usize,
}

const DEFAULT_MAX_UPLOAD_BYTES: &str = "20971520";
const DEFAULT_MAX_CACHED_OWNERS: usize = 1024;

impl RecordConfig {
    pub fn load() -> Result<Self, AppError> {
        // Common section: .env, `configuration` file and APP__ variables.
        let common_config = core_config::Config::load()?;

        let is_prod = env::var("ENVIRONMENT").unwrap_or_else(|_| "dev".to_string()) == "prod";

        let config = RecordConfig {
            common: common_config,
            storage: StorageConfig {
                backend: get_env("STORAGE_BACKEND", Some("local"), is_prod)?
                    .parse()
                    .map_err(|e: String| AppError::ConfigError(anyhow::anyhow!(e)))?,
                local_path: get_env("STORAGE_LOCAL_PATH", Some("storage"), is_prod)?,
                s3_bucket: env::var("STORAGE_S3_BUCKET").ok(),
                s3_region: env::var("STORAGE_S3_REGION").ok(),
            },
            download: DownloadConfig {
                dir: get_env("DOWNLOAD_DIR", Some("downloads"), is_prod)?,
                url_ttl_secs: parse_env("DOWNLOAD_URL_TTL_SECS", "900", is_prod)?,
                fetch_timeout_secs: parse_env("FETCH_TIMEOUT_SECS", "60", is_prod)?,
            },
            limits: LimitsConfig {
                max_upload_bytes: parse_env("MAX_UPLOAD_BYTES", DEFAULT_MAX_UPLOAD_BYTES, is_prod)?,
                max_cached_owners: parse_env(
                    "MAX_CACHED_OWNERS",
                    &DEFAULT_MAX_CACHED_OWNERS.to_string(),
                    is_prod,
                )? as usize,
            },
        };
        config.validate()?;
        Ok(config)
    }

    /// Settings for tests and embedding: local backend under `root`.
    pub fn local(root: &str) -> Self {
        RecordConfig {
            common: core_config::Config::default(),
            storage: StorageConfig {
                backend: StorageBackend::Local,
                local_path: format!("{}/storage", root),
                s3_bucket: None,
                s3_region: None,
            },
            download: DownloadConfig {
                dir: format!("{}/downloads", root),
                url_ttl_secs: 900,
                fetch_timeout_secs: 60,
            },
            limits: LimitsConfig {
                max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES.parse().unwrap_or(u64::MAX),
                max_cached_owners: DEFAULT_MAX_CACHED_OWNERS,
            },
        }
    }

    fn validate(&self) -> Result<(), AppError> {
        if self.storage.backend == StorageBackend::S3 && self.storage.s3_bucket.is_none() {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "STORAGE_S3_BUCKET is required for the s3 backend"
            )));
        }
        if self.limits.max_upload_bytes == 0 {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "MAX_UPLOAD_BYTES must be positive"
            )));
        }
        if self.limits.max_cached_owners == 0 {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "MAX_CACHED_OWNERS must be positive"
            )));
        }
        Ok(())
    }
}

impl std::str::FromStr for StorageBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "local" => Ok(StorageBackend::Local),
            "s3" => Ok(StorageBackend::S3),
            "memory" => Ok(StorageBackend::Memory),
            _ => Err(format!("Invalid storage backend: {}", s)),
        }
    }
}

fn get_env(key: &str, default: Option<&str>, is_prod: bool) -> Result<String, AppError> {
    match env::var(key) {
        Ok(val) => Ok(val),
        Err(_) => {
            if is_prod {
                Err(AppError::ConfigError(anyhow::anyhow!(
                    "{} is required in production but not set",
                    key
                )))
            } else if let Some(def) = default {
                Ok(def.to_string())
            } else {
                Err(AppError::ConfigError(anyhow::anyhow!(
                    "{} is required but not set",
                    key
                )))
            }
        }
    }
}

fn parse_env(key: &str, default: &str, is_prod: bool) -> Result<u64, AppError> {
    get_env(key, Some(default), is_prod)?
        .parse()
        .map_err(|e| AppError::ConfigError(anyhow::anyhow!("{} is not a number: {}", key, e)))
}
