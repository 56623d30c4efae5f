use std::env;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

pub const PRIMARY_CONFIG_PATH: &str = "/etc/facegate/config.toml";
pub const SECONDARY_CONFIG_PATH: &str = "/usr/local/etc/facegate/config.toml";
pub const DEFAULT_VERIFICATION_THRESHOLD: f64 = 0.6;
pub const DEFAULT_DATA_DIR: &str = "./faces";
pub const DATA_DIR_ENV: &str = "FACEGATE_DATA_DIR";
pub const DEFAULT_JITTERS: u32 = 1;

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct ConfigFile {
    pub verification_threshold: Option<f64>,
    pub data_dir: Option<PathBuf>,
    pub landmark_model: Option<PathBuf>,
    pub encoder_model: Option<PathBuf>,
    pub jitters: Option<u32>,
    pub digest_only: Option<bool>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedConfig {
    pub verification_threshold: f64,
    pub data_dir: PathBuf,
    pub landmark_model: Option<PathBuf>,
    pub encoder_model: Option<PathBuf>,
    pub jitters: u32,
    pub digest_only: bool,
}

impl ResolvedConfig {
    pub fn from_raw(raw: ConfigFile) -> Self {
        Self::from_raw_with_env(raw, env::var(DATA_DIR_ENV).ok().map(PathBuf::from))
    }

    fn from_raw_with_env(raw: ConfigFile, env_data_dir: Option<PathBuf>) -> Self {
        Self {
            verification_threshold: raw
                .verification_threshold
                .filter(|value| value.is_finite() && *value >= 0.0)
                .unwrap_or(DEFAULT_VERIFICATION_THRESHOLD),
            data_dir: env_data_dir
                .or(raw.data_dir)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_DATA_DIR)),
            landmark_model: raw.landmark_model,
            encoder_model: raw.encoder_model,
            jitters: raw.jitters.unwrap_or(DEFAULT_JITTERS).max(1),
            digest_only: raw.digest_only.unwrap_or(false),
        }
    }
}

impl Default for ResolvedConfig {
    fn default() -> Self {
        Self::from_raw_with_env(ConfigFile::default(), None)
    }
}

#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub contents: ConfigFile,
    pub source: PathBuf,
}

impl LoadedConfig {
    pub fn new(contents: ConfigFile, source: PathBuf) -> Self {
        Self { contents, source }
    }

    pub fn source(&self) -> &Path {
        &self.source
    }
}

#[derive(Debug, Clone)]
pub struct ResolvedConfigWithSource {
    pub resolved: ResolvedConfig,
    pub source: Option<PathBuf>,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to parse {path}: {message}")]
    Parse { path: PathBuf, message: String },
}

pub fn default_config_paths() -> [PathBuf; 2] {
    [
        PathBuf::from(PRIMARY_CONFIG_PATH),
        PathBuf::from(SECONDARY_CONFIG_PATH),
    ]
}

pub fn load_from_paths(paths: &[PathBuf]) -> Result<Option<LoadedConfig>, ConfigError> {
    for path in paths {
        match fs::read_to_string(path) {
            Ok(contents) => {
                let parsed =
                    toml::from_str::<ConfigFile>(&contents).map_err(|err| ConfigError::Parse {
                        path: path.clone(),
                        message: err.to_string(),
                    })?;
                return Ok(Some(LoadedConfig::new(parsed, path.clone())));
            }
            Err(err) if err.kind() == io::ErrorKind::NotFound => continue,
            Err(err) => {
                return Err(ConfigError::Read {
                    path: path.clone(),
                    source: err,
                })
            }
        }
    }

    Ok(None)
}

pub fn load_resolved_from_paths(
    paths: &[PathBuf],
) -> Result<ResolvedConfigWithSource, ConfigError> {
    match load_from_paths(paths)? {
        Some(entry) => {
            let path = entry.source.clone();
            Ok(ResolvedConfigWithSource {
                resolved: ResolvedConfig::from_raw(entry.contents),
                source: Some(path),
            })
        }
        None => Ok(ResolvedConfigWithSource {
            resolved: ResolvedConfig::from_raw(ConfigFile::default()),
            source: None,
        }),
    }
}
