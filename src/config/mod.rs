use crate::utils::validation::MAX_FILE_SIZE;
use std::env;
use std::path::PathBuf;
use std::time::Duration;

/// Runtime configuration for the upload and conversion pipeline
#[derive(Debug, Clone)]
pub struct ConverterConfig {
    /// Directory holding per-request scratch files (default: "./temp")
    pub scratch_dir: PathBuf,

    /// Maximum accepted upload size in bytes (default: 100 MiB)
    pub max_file_size: usize,

    /// Upper bound on a single decode + encode run (default: 60 s)
    pub conversion_timeout: Duration,

    /// Conversions allowed to run on the blocking pool at once
    /// (default: available parallelism)
    pub max_concurrent_conversions: usize,

    /// Decoder allocation ceiling in bytes (default: 512 MiB)
    pub max_decode_alloc: u64,

    /// Remove leftovers of a previous process from the scratch directory at startup
    pub purge_scratch_on_startup: bool,
}

impl Default for ConverterConfig {
    fn default() -> Self {
        Self {
            scratch_dir: PathBuf::from("./temp"),
            max_file_size: MAX_FILE_SIZE,
            conversion_timeout: Duration::from_secs(60),
            max_concurrent_conversions: default_parallelism(),
            max_decode_alloc: 512 * 1024 * 1024, // 512 MiB
            purge_scratch_on_startup: true,
        }
    }
}

impl ConverterConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        let default = Self::default();

        Self {
            scratch_dir: env::var("SCRATCH_DIR")
                .ok()
                .filter(|v| !v.trim().is_empty())
                .map(PathBuf::from)
                .unwrap_or(default.scratch_dir),

            max_file_size: env::var("MAX_FILE_SIZE")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.max_file_size),

            conversion_timeout: env::var("CONVERSION_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(default.conversion_timeout),

            max_concurrent_conversions: env::var("MAX_CONCURRENT_CONVERSIONS")
                .ok()
                .and_then(|v| v.parse().ok())
                .filter(|n: &usize| *n > 0)
                .unwrap_or(default.max_concurrent_conversions),

            max_decode_alloc: env::var("MAX_DECODE_ALLOC")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.max_decode_alloc),

            purge_scratch_on_startup: env::var("PURGE_SCRATCH_ON_STARTUP")
                .map(|v| v.to_lowercase() != "false" && v != "0")
                .unwrap_or(default.purge_scratch_on_startup),
        }
    }

    /// Create config for development (short timeout, scratch left alone at startup)
    pub fn development() -> Self {
        Self {
            conversion_timeout: Duration::from_secs(15),
            purge_scratch_on_startup: false,
            ..Self::default()
        }
    }

    /// Same defaults, rooted at a caller-chosen scratch directory
    pub fn with_scratch_dir(scratch_dir: impl Into<PathBuf>) -> Self {
        Self {
            scratch_dir: scratch_dir.into(),
            ..Self::default()
        }
    }
}

fn default_parallelism() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ConverterConfig::default();
        assert_eq!(config.scratch_dir, PathBuf::from("./temp"));
        assert_eq!(config.max_file_size, 100 * 1024 * 1024);
        assert_eq!(config.conversion_timeout, Duration::from_secs(60));
        assert!(config.max_concurrent_conversions >= 1);
        assert!(config.purge_scratch_on_startup);
    }

    #[test]
    fn test_development_config() {
        let config = ConverterConfig::development();
        assert!(!config.purge_scratch_on_startup);
        assert_eq!(config.conversion_timeout, Duration::from_secs(15));
        assert_eq!(config.max_file_size, 100 * 1024 * 1024);
    }

    #[test]
    fn test_with_scratch_dir() {
        let config = ConverterConfig::with_scratch_dir("/tmp/scratch-x");
        assert_eq!(config.scratch_dir, PathBuf::from("/tmp/scratch-x"));
        assert_eq!(config.max_file_size, 100 * 1024 * 1024);
    }
}
