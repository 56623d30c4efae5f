use std::path::PathBuf;

use chrono::{SecondsFormat, Utc};
use image::RgbImage;
use serde::Serialize;
use tracing::{info, warn};

use crate::errors::{AppError, AppResult, ErrorKind};
use crate::faces::encoding::{ExtractionMode, FaceRecord};
use crate::faces::extractor::{select_extractor, ExtractorSettings, FeatureExtractor};
use crate::faces::matcher::{MatchEngine, MatchReason, VerificationResult};
use crate::faces::registry::EncodingStore;
use crate::faces::store::{
    encodings_path, FilesystemFaceStore, FilesystemReferenceImages, ReferenceImageSink,
};

#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub data_dir: PathBuf,
    pub threshold: f64,
    pub extractor: ExtractorSettings,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterResponse {
    pub success: bool,
    pub message: String,
    pub user_id: String,
    pub face_registered: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorKind>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyResponse {
    pub success: bool,
    pub verified: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub distance: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<MatchReason>,
    pub message: String,
    pub face_registered: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorKind>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusResponse {
    pub registered: bool,
    pub user_id: String,
    pub message: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteResponse {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorKind>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: String,
    pub mode: ExtractionMode,
    pub face_recognition_enabled: bool,
    pub registered_faces: usize,
    pub timestamp: String,
}

pub struct VerificationService {
    extractor: Box<dyn FeatureExtractor>,
    store: EncodingStore,
    matcher: MatchEngine,
    images: Box<dyn ReferenceImageSink>,
}

impl VerificationService {
    pub fn open(config: &ServiceConfig) -> Self {
        let extractor = select_extractor(&config.extractor);
        let store = EncodingStore::open(
            encodings_path(&config.data_dir),
            Box::new(FilesystemFaceStore),
        );
        let images = FilesystemReferenceImages::new(&config.data_dir);
        Self::with_components(
            extractor,
            store,
            MatchEngine::new(config.threshold),
            Box::new(images),
        )
    }

    pub fn with_components(
        extractor: Box<dyn FeatureExtractor>,
        store: EncodingStore,
        matcher: MatchEngine,
        images: Box<dyn ReferenceImageSink>,
    ) -> Self {
        let active = extractor.mode();
        for mode in store.modes() {
            if mode != active {
                warn!(
                    stored = %mode,
                    active = %active,
                    "encoding store holds records from another extraction mode; those users cannot verify until re-registered"
                );
            }
        }
        Self {
            extractor,
            store,
            matcher,
            images,
        }
    }

    pub fn mode(&self) -> ExtractionMode {
        self.extractor.mode()
    }

    pub fn store(&self) -> &EncodingStore {
        &self.store
    }

    pub fn register(&self, user_id: &str, image: Option<&RgbImage>) -> RegisterResponse {
        match self.try_register(user_id, image) {
            Ok(record) => RegisterResponse {
                success: true,
                message: "Face registered successfully".into(),
                user_id: record.user_id,
                face_registered: true,
                error: None,
            },
            Err(err) => {
                warn!(user = %user_id, error = %err, "registration failed");
                RegisterResponse {
                    success: false,
                    message: err.human_message(),
                    user_id: user_id.to_string(),
                    face_registered: self.store.status(user_id),
                    error: Some(err.kind()),
                }
            }
        }
    }

    fn try_register(&self, user_id: &str, image: Option<&RgbImage>) -> AppResult<FaceRecord> {
        validate_user_id(user_id)?;
        // Cheap rejection before extraction; the store checks again under its lock.
        if self.store.status(user_id) {
            return Err(AppError::Conflict {
                user: user_id.to_string(),
            });
        }
        let image = image.ok_or(AppError::MissingImage)?;

        let encoding = self.extractor.extract(image)?;
        let record = self.store.register_with(user_id, encoding, |_| {
            if let Err(err) = self.images.store(user_id, image) {
                warn!(user = %user_id, error = %err, "failed to save reference image");
            }
        })?;
        info!(user = %user_id, mode = %record.encoding.mode(), "face registered");
        Ok(record)
    }

    pub fn verify(&self, user_id: &str, image: Option<&RgbImage>) -> VerifyResponse {
        match self.try_verify(user_id, image) {
            Ok(result) => {
                info!(
                    user = %user_id,
                    verified = result.verified,
                    confidence = result.confidence,
                    "face verification"
                );
                let message = if result.verified {
                    "Face verified successfully"
                } else {
                    "Face does not match. Please try again."
                };
                VerifyResponse {
                    success: result.verified,
                    verified: result.verified,
                    confidence: Some(round4(result.display_confidence())),
                    distance: result.distance,
                    reason: Some(result.reason),
                    message: message.into(),
                    face_registered: true,
                    error: (!result.verified).then_some(ErrorKind::NotVerified),
                }
            }
            Err(err) => {
                warn!(user = %user_id, error = %err, "verification failed");
                VerifyResponse {
                    success: false,
                    verified: false,
                    confidence: None,
                    distance: None,
                    reason: None,
                    message: err.human_message(),
                    face_registered: self.store.status(user_id),
                    error: Some(err.kind()),
                }
            }
        }
    }

    fn try_verify(&self, user_id: &str, image: Option<&RgbImage>) -> AppResult<VerificationResult> {
        validate_user_id(user_id)?;
        let record = self.store.lookup(user_id)?;
        let image = image.ok_or(AppError::MissingImage)?;
        let probe = self.extractor.extract(image)?;
        self.matcher.compare(&record.encoding, &probe)
    }

    pub fn status(&self, user_id: &str) -> StatusResponse {
        let registered = self.store.status(user_id);
        StatusResponse {
            registered,
            user_id: user_id.to_string(),
            message: if registered {
                "Face registered".into()
            } else {
                "Face not registered".into()
            },
        }
    }

    pub fn delete(&self, user_id: &str) -> DeleteResponse {
        match self.try_delete(user_id) {
            Ok(()) => DeleteResponse {
                success: true,
                message: "Face registration deleted".into(),
                error: None,
            },
            Err(err) => {
                warn!(user = %user_id, error = %err, "delete failed");
                DeleteResponse {
                    success: false,
                    message: err.human_message(),
                    error: Some(err.kind()),
                }
            }
        }
    }

    fn try_delete(&self, user_id: &str) -> AppResult<()> {
        validate_user_id(user_id)?;
        self.store.delete_with(user_id, |_| {
            if let Err(err) = self.images.remove(user_id) {
                warn!(user = %user_id, error = %err, "failed to remove reference image");
            }
        })?;
        info!(user = %user_id, "face registration deleted");
        Ok(())
    }

    pub fn health(&self) -> HealthResponse {
        let mode = self.mode();
        HealthResponse {
            status: "healthy".into(),
            mode,
            face_recognition_enabled: mode == ExtractionMode::Vector,
            registered_faces: self.store.len(),
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        }
    }
}

pub fn validate_user_id(user: &str) -> AppResult<()> {
    if user.trim().is_empty() {
        return Err(AppError::InvalidUser {
            user: user.to_string(),
            message: "user id cannot be empty".into(),
        });
    }
    Ok(())
}

fn round4(value: f64) -> f64 {
    (value * 10_000.0).round() / 10_000.0
}
