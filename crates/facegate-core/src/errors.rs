use std::io;
use std::path::PathBuf;
use std::process::ExitCode;

use serde::Serialize;
use thiserror::Error;

use crate::faces::encoding::ExtractionMode;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("invalid user id '{user}': {message}")]
    InvalidUser { user: String, message: String },

    #[error("face image data is required")]
    MissingImage,

    #[error("input file not found or unreadable: {path}")]
    MissingInput { path: PathBuf },

    #[error("failed to decode image from {origin}: {message}")]
    ImageDecode { origin: String, message: String },

    #[error("no face detected in image")]
    NoFaceDetected,

    #[error("multiple faces detected ({count}); ensure only one face is visible")]
    MultipleFacesDetected { count: usize },

    #[error("could not extract face features: {0}")]
    ExtractionFailed(String),

    #[error("missing {kind} model; provide {flag} or set ${env}")]
    MissingModel {
        kind: &'static str,
        flag: &'static str,
        env: &'static str,
    },

    #[error("failed to load model {path}: {message}")]
    ModelLoad { path: PathBuf, message: String },

    #[error("face already registered for user {user}")]
    Conflict { user: String },

    #[error("no registered face found for user {user}")]
    NotFound { user: String },

    #[error("stored encoding is {stored} but probe encoding is {probe}; re-register the user")]
    ModeMismatch {
        stored: ExtractionMode,
        probe: ExtractionMode,
    },

    #[error("descriptor length mismatch: stored {stored} values, probe {probe}")]
    DescriptorShape { stored: usize, probe: usize },

    #[error("failed to read encoding store {path}: {source}")]
    PersistenceRead {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to write encoding store {path}: {source}")]
    PersistenceWrite {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("encoding store {path} is invalid: {message}")]
    InvalidStore { path: PathBuf, message: String },

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("failed to read configuration file {path}: {source}")]
    ConfigRead {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("invalid configuration file {path}: {message}")]
    ConfigParse { path: PathBuf, message: String },
}

/// Machine-readable failure category reported alongside every failed operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    InvalidInput,
    ImageDecode,
    NoFaceDetected,
    MultipleFacesDetected,
    ExtractionFailed,
    Conflict,
    NotFound,
    ModeMismatch,
    NotVerified,
    Persistence,
    Config,
}

impl ErrorKind {
    pub fn exit_code(self) -> ExitCode {
        match self {
            ErrorKind::InvalidInput | ErrorKind::ImageDecode | ErrorKind::Config => {
                ExitCode::from(2)
            }
            ErrorKind::NoFaceDetected
            | ErrorKind::MultipleFacesDetected
            | ErrorKind::ExtractionFailed
            | ErrorKind::ModeMismatch
            | ErrorKind::NotVerified => ExitCode::from(3),
            ErrorKind::Conflict | ErrorKind::NotFound => ExitCode::from(4),
            ErrorKind::Persistence => ExitCode::from(1),
        }
    }
}

impl AppError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            AppError::InvalidUser { .. } | AppError::MissingImage => ErrorKind::InvalidInput,
            AppError::MissingInput { .. } | AppError::ImageDecode { .. } => ErrorKind::ImageDecode,
            AppError::NoFaceDetected => ErrorKind::NoFaceDetected,
            AppError::MultipleFacesDetected { .. } => ErrorKind::MultipleFacesDetected,
            AppError::ExtractionFailed(_)
            | AppError::MissingModel { .. }
            | AppError::ModelLoad { .. } => ErrorKind::ExtractionFailed,
            AppError::Conflict { .. } => ErrorKind::Conflict,
            AppError::NotFound { .. } => ErrorKind::NotFound,
            AppError::ModeMismatch { .. } | AppError::DescriptorShape { .. } => {
                ErrorKind::ModeMismatch
            }
            AppError::PersistenceRead { .. }
            | AppError::PersistenceWrite { .. }
            | AppError::InvalidStore { .. }
            | AppError::Serialization(_)
            | AppError::Io(_) => ErrorKind::Persistence,
            AppError::ConfigRead { .. } | AppError::ConfigParse { .. } => ErrorKind::Config,
        }
    }

    pub fn exit_code(&self) -> ExitCode {
        self.kind().exit_code()
    }

    pub fn human_message(&self) -> String {
        self.to_string()
    }
}

pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extraction_errors_share_a_kind() {
        assert_eq!(
            AppError::ExtractionFailed("empty".into()).kind(),
            ErrorKind::ExtractionFailed
        );
        assert_eq!(
            AppError::ModelLoad {
                path: PathBuf::from("landmark.dat"),
                message: "bad".into(),
            }
            .kind(),
            ErrorKind::ExtractionFailed
        );
    }

    #[test]
    fn descriptor_shape_is_reported_as_mode_mismatch() {
        let err = AppError::DescriptorShape {
            stored: 128,
            probe: 64,
        };
        assert_eq!(err.kind(), ErrorKind::ModeMismatch);
    }

    #[test]
    fn kinds_serialize_in_snake_case() {
        let json = serde_json::to_string(&ErrorKind::MultipleFacesDetected).unwrap();
        assert_eq!(json, "\"multiple_faces_detected\"");
    }

    #[test]
    fn mode_mismatch_message_names_both_modes() {
        let err = AppError::ModeMismatch {
            stored: ExtractionMode::Vector,
            probe: ExtractionMode::Digest,
        };
        let message = err.human_message();
        assert!(message.contains("vector"));
        assert!(message.contains("digest"));
    }
}
