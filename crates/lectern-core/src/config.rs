//! Configuration module
//!
//! Environment-driven configuration for the API and render worker, validated
//! once at startup. Storage credentials, queue tuning, and upload limits all
//! arrive through the environment; anything missing that a selected backend
//! needs is a startup error, not a runtime surprise.

use std::env;

use crate::constants::{
    DEFAULT_CHUNK_SIZE_BYTES, DEFAULT_MAX_UPLOAD_SIZE_BYTES, DEFAULT_SESSION_TTL_SECS,
};

/// Storage backend selection.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StorageBackendKind {
    S3,
    Local,
}

/// Application configuration.
#[derive(Clone, Debug)]
pub struct Config {
    pub server_port: u16,
    pub cors_origins: Vec<String>,
    pub environment: String,
    pub database_url: String,
    pub db_max_connections: u32,
    pub db_timeout_seconds: u64,

    // Storage configuration
    pub storage_backend: StorageBackendKind,
    pub s3_public_bucket: Option<String>,
    pub s3_private_bucket: Option<String>,
    pub s3_region: Option<String>,
    pub s3_endpoint: Option<String>,
    pub local_storage_path: Option<String>,
    pub local_storage_base_url: Option<String>,

    // Upload protocol
    pub chunk_size_bytes: u64,
    pub max_upload_size_bytes: u64,
    pub session_ttl_secs: i64,
    pub session_sweep_interval_secs: u64,
    pub document_allowed_extensions: Vec<String>,
    pub document_allowed_content_types: Vec<String>,

    // Conversion / watermarking
    pub soffice_path: String,
    pub convert_timeout_secs: u64,
    pub watermark_brand_label: String,
    pub watermark_contact_label: String,

    // Render queue
    pub render_queue_max_workers: usize,
    pub render_queue_poll_interval_ms: u64,
    pub render_job_timeout_seconds: i32,
    pub stale_job_reap_interval_secs: u64,
    pub stale_job_grace_period_secs: i64,
}

impl Config {
    /// Check if the application is running in production mode
    pub fn is_production(&self) -> bool {
        let env = self.environment.to_lowercase();
        env == "production" || env == "prod"
    }

    pub fn from_env() -> Result<Self, anyhow::Error> {
        dotenvy::dotenv().ok();

        const SESSION_SWEEP_INTERVAL_SECS: u64 = 300;
        const MAX_CONNECTIONS: u32 = 20;
        const CONNECTION_TIMEOUT_SECS: u64 = 30;
        const CONVERT_TIMEOUT_SECS: u64 = 120;
        const RENDER_QUEUE_MAX_WORKERS: usize = 4;
        const RENDER_QUEUE_POLL_INTERVAL_MS: u64 = 1000;
        const RENDER_JOB_TIMEOUT_SECS: i32 = 600;
        const STALE_JOB_REAP_INTERVAL_SECS: u64 = 60;
        const STALE_JOB_GRACE_PERIOD_SECS: i64 = 300;

        let environment = env::var("ENVIRONMENT")
            .or_else(|_| env::var("APP_ENV"))
            .unwrap_or_else(|_| "development".to_string());

        let cors_origins_str = env::var("CORS_ORIGINS").unwrap_or_else(|_| "*".to_string());
        let is_production =
            environment.to_lowercase() == "production" || environment.to_lowercase() == "prod";
        if is_production && cors_origins_str.trim() == "*" {
            return Err(anyhow::anyhow!(
                "CORS_ORIGINS cannot be '*' in production. Please specify explicit origins."
            ));
        }

        let cors_origins: Vec<String> = cors_origins_str
            .split(',')
            .map(|s| s.trim().to_string())
            .collect();

        let storage_backend = match env::var("STORAGE_BACKEND")
            .unwrap_or_else(|_| "local".to_string())
            .to_lowercase()
            .as_str()
        {
            "s3" => StorageBackendKind::S3,
            _ => StorageBackendKind::Local,
        };

        let config = Config {
            server_port: env::var("PORT")
                .unwrap_or_else(|_| "4000".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("PORT must be a valid number"))?,
            cors_origins,
            environment,
            database_url: env::var("DATABASE_URL")
                .map_err(|_| anyhow::anyhow!("DATABASE_URL must be set"))?,
            db_max_connections: env::var("DB_MAX_CONNECTIONS")
                .unwrap_or_else(|_| MAX_CONNECTIONS.to_string())
                .parse()
                .unwrap_or(MAX_CONNECTIONS),
            db_timeout_seconds: env::var("DB_TIMEOUT_SECONDS")
                .unwrap_or_else(|_| CONNECTION_TIMEOUT_SECS.to_string())
                .parse()
                .unwrap_or(CONNECTION_TIMEOUT_SECS),
            storage_backend,
            s3_public_bucket: env::var("S3_PUBLIC_BUCKET").ok(),
            s3_private_bucket: env::var("S3_PRIVATE_BUCKET").ok(),
            s3_region: env::var("S3_REGION").ok().or(env::var("AWS_REGION").ok()),
            s3_endpoint: env::var("S3_ENDPOINT").ok(),
            local_storage_path: env::var("LOCAL_STORAGE_PATH").ok(),
            local_storage_base_url: env::var("LOCAL_STORAGE_BASE_URL").ok(),
            chunk_size_bytes: env::var("CHUNK_SIZE_BYTES")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(DEFAULT_CHUNK_SIZE_BYTES),
            max_upload_size_bytes: env::var("MAX_UPLOAD_SIZE_MB")
                .ok()
                .and_then(|s| s.parse::<u64>().ok())
                .map(|mb| mb * 1024 * 1024)
                .unwrap_or(DEFAULT_MAX_UPLOAD_SIZE_BYTES),
            session_ttl_secs: env::var("SESSION_TTL_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(DEFAULT_SESSION_TTL_SECS),
            session_sweep_interval_secs: env::var("SESSION_SWEEP_INTERVAL_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(SESSION_SWEEP_INTERVAL_SECS),
            document_allowed_extensions: env::var("DOCUMENT_ALLOWED_EXTENSIONS")
                .unwrap_or_else(|_| "pdf,doc,docx,ppt,pptx,odt,odp".to_string())
                .split(',')
                .map(|s| s.trim().to_lowercase())
                .collect(),
            document_allowed_content_types: env::var("DOCUMENT_ALLOWED_CONTENT_TYPES")
                .unwrap_or_else(|_| {
                    [
                        "application/pdf",
                        "application/msword",
                        "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
                        "application/vnd.ms-powerpoint",
                        "application/vnd.openxmlformats-officedocument.presentationml.presentation",
                        "application/vnd.oasis.opendocument.text",
                        "application/vnd.oasis.opendocument.presentation",
                    ]
                    .join(",")
                })
                .split(',')
                .map(|s| s.trim().to_lowercase())
                .collect(),
            soffice_path: env::var("SOFFICE_PATH").unwrap_or_else(|_| "soffice".to_string()),
            convert_timeout_secs: env::var("CONVERT_TIMEOUT_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(CONVERT_TIMEOUT_SECS),
            watermark_brand_label: env::var("WATERMARK_BRAND_LABEL")
                .unwrap_or_else(|_| "Lectern".to_string()),
            watermark_contact_label: env::var("WATERMARK_CONTACT_LABEL")
                .unwrap_or_else(|_| "lectern.example.com".to_string()),
            render_queue_max_workers: env::var("RENDER_QUEUE_MAX_WORKERS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(RENDER_QUEUE_MAX_WORKERS),
            render_queue_poll_interval_ms: env::var("RENDER_QUEUE_POLL_INTERVAL_MS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(RENDER_QUEUE_POLL_INTERVAL_MS),
            render_job_timeout_seconds: env::var("RENDER_JOB_TIMEOUT_SECONDS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(RENDER_JOB_TIMEOUT_SECS),
            stale_job_reap_interval_secs: env::var("STALE_JOB_REAP_INTERVAL_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(STALE_JOB_REAP_INTERVAL_SECS),
            stale_job_grace_period_secs: env::var("STALE_JOB_GRACE_PERIOD_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(STALE_JOB_GRACE_PERIOD_SECS),
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), anyhow::Error> {
        if !self.database_url.starts_with("postgresql://")
            && !self.database_url.starts_with("postgres://")
        {
            return Err(anyhow::anyhow!(
                "DATABASE_URL must be a valid PostgreSQL connection string"
            ));
        }

        if self.chunk_size_bytes == 0 {
            return Err(anyhow::anyhow!("CHUNK_SIZE_BYTES must be greater than 0"));
        }

        if self.max_upload_size_bytes < self.chunk_size_bytes {
            return Err(anyhow::anyhow!(
                "MAX_UPLOAD_SIZE_MB must be at least one chunk ({} bytes)",
                self.chunk_size_bytes
            ));
        }

        match self.storage_backend {
            StorageBackendKind::S3 => {
                if self.s3_public_bucket.is_none() || self.s3_private_bucket.is_none() {
                    return Err(anyhow::anyhow!(
                        "S3_PUBLIC_BUCKET and S3_PRIVATE_BUCKET must be set when using S3 storage backend"
                    ));
                }
                if self.s3_region.is_none() {
                    return Err(anyhow::anyhow!(
                        "S3_REGION or AWS_REGION must be set when using S3 storage backend"
                    ));
                }
            }
            StorageBackendKind::Local => {
                if self.local_storage_path.is_none() {
                    return Err(anyhow::anyhow!(
                        "LOCAL_STORAGE_PATH must be set when using local storage backend"
                    ));
                }
                if self.local_storage_base_url.is_none() {
                    return Err(anyhow::anyhow!(
                        "LOCAL_STORAGE_BASE_URL must be set when using local storage backend"
                    ));
                }
            }
        }

        Ok(())
    }
}
