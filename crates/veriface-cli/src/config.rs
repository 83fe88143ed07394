use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;
use veriface_core::DetectorBackend;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid {key}: {reason}")]
    Invalid { key: &'static str, reason: String },
    #[error("VERIFACE_ANALYZER=mock is not allowed when VERIFACE_ENVIRONMENT=production")]
    MockInProduction,
}

/// Which analyzer binding to construct at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnalyzerKind {
    Onnx,
    Mock,
}

impl FromStr for AnalyzerKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "onnx" => Ok(AnalyzerKind::Onnx),
            "mock" => Ok(AnalyzerKind::Mock),
            other => Err(format!("unknown analyzer '{other}' (expected onnx or mock)")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Development,
    Production,
}

impl FromStr for Environment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "development" | "dev" => Ok(Environment::Development),
            "production" | "prod" => Ok(Environment::Production),
            other => Err(format!("unknown environment '{other}'")),
        }
    }
}

/// Process configuration, resolved once from `VERIFACE_*` environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Connection string for the backing store.
    pub database_url: String,
    /// Maximum pooled database connections.
    pub db_pool_size: u32,
    /// How long to wait for a database connection before giving up.
    pub db_connect_timeout_secs: u64,
    /// Real ONNX models or the random mock.
    pub analyzer: AnalyzerKind,
    pub environment: Environment,
    /// Directory containing `det_10g.onnx` and `genderage.onnx`.
    pub model_dir: PathBuf,
    pub detector_backend: DetectorBackend,
    /// Where per-request staging files are created.
    pub staging_dir: PathBuf,
    /// Caller-side deadline per verification; 0 disables it.
    pub verify_timeout_secs: u64,
}

impl Config {
    /// Load configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let config = Self {
            database_url: lookup("VERIFACE_DATABASE_URL")
                .unwrap_or_else(|| "sqlite:///./veriface.db".to_string()),
            db_pool_size: parse_num(&lookup, "VERIFACE_DB_POOL_SIZE", 5),
            db_connect_timeout_secs: parse_num(&lookup, "VERIFACE_DB_CONNECT_TIMEOUT_SECS", 5),
            analyzer: parse_enum(&lookup, "VERIFACE_ANALYZER", AnalyzerKind::Onnx)?,
            environment: parse_enum(&lookup, "VERIFACE_ENVIRONMENT", Environment::Development)?,
            model_dir: lookup("VERIFACE_MODEL_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(veriface_core::default_model_dir),
            detector_backend: parse_enum(
                &lookup,
                "VERIFACE_DETECTOR_BACKEND",
                DetectorBackend::Scrfd,
            )?,
            staging_dir: lookup("VERIFACE_STAGING_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(std::env::temp_dir),
            verify_timeout_secs: parse_num(&lookup, "VERIFACE_VERIFY_TIMEOUT_SECS", 30),
        };

        if config.analyzer == AnalyzerKind::Mock && config.environment == Environment::Production {
            return Err(ConfigError::MockInProduction);
        }
        Ok(config)
    }

    pub fn db_connect_timeout(&self) -> Duration {
        Duration::from_secs(self.db_connect_timeout_secs.max(1))
    }

    pub fn verify_timeout(&self) -> Option<Duration> {
        (self.verify_timeout_secs > 0).then(|| Duration::from_secs(self.verify_timeout_secs))
    }
}

/// Numbers that are missing, malformed or out of range fall back to `default`.
fn parse_num<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> T {
    lookup(key).and_then(|v| v.trim().parse().ok()).unwrap_or(default)
}

fn parse_enum<T: FromStr<Err = String>>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &'static str,
    default: T,
) -> Result<T, ConfigError> {
    match lookup(key) {
        Some(value) => value.parse().map_err(|reason| ConfigError::Invalid { key, reason }),
        None => Ok(default),
    }
}
