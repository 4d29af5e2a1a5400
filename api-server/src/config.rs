//! Configuration module

use std::env;
use std::time::Duration;

use flowguard_core::PipelineConfig;

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Server port
    pub port: u16,

    /// How long `POST /upload?wait=true` waits for the job
    pub upload_wait_timeout: Duration,

    /// Request body limit for uploads
    pub max_upload_bytes: usize,

    /// Pipeline settings shared with the core
    pub pipeline: PipelineConfig,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        Self {
            port: env::var("PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(8000),

            upload_wait_timeout: env::var("UPLOAD_WAIT_TIMEOUT_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(Duration::from_secs(300)),

            max_upload_bytes: env::var("MAX_UPLOAD_MB")
                .ok()
                .and_then(|s| s.parse::<usize>().ok())
                .unwrap_or(512)
                * 1024
                * 1024,

            pipeline: PipelineConfig::from_env(),
        }
    }
}
