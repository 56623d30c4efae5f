use std::io;
use std::path::PathBuf;

use facegate_config::{default_config_paths, load_resolved_from_paths, ConfigError};
use facegate_core::errors::{AppError, AppResult};
use facegate_core::faces::{ExtractorSettings, ServiceConfig};

use crate::cli::Cli;

#[derive(Debug, Clone, Default)]
pub struct ServiceOverrides {
    pub data_dir: Option<PathBuf>,
    pub threshold: Option<f64>,
    pub landmark_model: Option<PathBuf>,
    pub encoder_model: Option<PathBuf>,
    pub jitters: Option<u32>,
    pub digest_only: bool,
}

impl From<&Cli> for ServiceOverrides {
    fn from(cli: &Cli) -> Self {
        Self {
            data_dir: cli.data_dir.clone(),
            threshold: cli.threshold,
            landmark_model: cli.landmark_model.clone(),
            encoder_model: cli.encoder_model.clone(),
            jitters: cli.jitters,
            digest_only: cli.digest_only,
        }
    }
}

pub fn resolve_service_config(cli: &Cli) -> AppResult<ServiceConfig> {
    let overrides = ServiceOverrides::from(cli);
    match &cli.config {
        Some(path) => {
            if !path.exists() {
                return Err(AppError::ConfigRead {
                    path: path.clone(),
                    source: io::Error::new(io::ErrorKind::NotFound, "file does not exist"),
                });
            }
            resolve_service_config_with_sources(&overrides, &[path.clone()])
        }
        None => resolve_service_config_with_sources(&overrides, &default_config_paths()),
    }
}

pub fn resolve_service_config_with_sources(
    overrides: &ServiceOverrides,
    sources: &[PathBuf],
) -> AppResult<ServiceConfig> {
    let loaded = load_resolved_from_paths(sources).map_err(map_config_error)?;
    match &loaded.source {
        Some(path) => tracing::debug!(path = %path.display(), "loaded configuration"),
        None => tracing::debug!("no configuration file found; using defaults"),
    }
    let resolved = loaded.resolved;

    let threshold = match overrides.threshold {
        Some(value) if value.is_finite() && value >= 0.0 => value,
        Some(value) => {
            tracing::warn!(
                threshold = value,
                fallback = resolved.verification_threshold,
                "ignoring invalid --threshold"
            );
            resolved.verification_threshold
        }
        None => resolved.verification_threshold,
    };

    Ok(ServiceConfig {
        data_dir: overrides.data_dir.clone().unwrap_or(resolved.data_dir),
        threshold,
        extractor: ExtractorSettings {
            landmark_model: overrides
                .landmark_model
                .clone()
                .or(resolved.landmark_model),
            encoder_model: overrides.encoder_model.clone().or(resolved.encoder_model),
            jitters: overrides.jitters.unwrap_or(resolved.jitters).max(1),
            force_digest: overrides.digest_only || resolved.digest_only,
        },
    })
}

fn map_config_error(err: ConfigError) -> AppError {
    match err {
        ConfigError::Read { path, source } => AppError::ConfigRead { path, source },
        ConfigError::Parse { path, message } => AppError::ConfigParse { path, message },
    }
}
