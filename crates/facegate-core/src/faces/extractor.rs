use std::env;
use std::path::PathBuf;

#[cfg(feature = "dlib")]
use dlib_face_recognition::{
    FaceDetector, FaceDetectorTrait, FaceEncoderNetwork, FaceEncoderTrait, ImageMatrix,
    LandmarkPredictor, LandmarkPredictorTrait,
};
use image::imageops::{self, FilterType};
use image::RgbImage;
#[cfg(feature = "dlib")]
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::errors::{AppError, AppResult};
use crate::faces::encoding::{BiometricEncoding, ExtractionMode};

const LANDMARK_ENV: &str = "DLIB_LANDMARK_MODEL";
const ENCODER_ENV: &str = "DLIB_ENCODER_MODEL";
pub const DIGEST_SIDE: u32 = 32;
pub const DEFAULT_JITTERS: u32 = 1;

#[derive(Debug, Clone)]
pub struct ExtractorSettings {
    pub landmark_model: Option<PathBuf>,
    pub encoder_model: Option<PathBuf>,
    pub jitters: u32,
    pub force_digest: bool,
}

impl Default for ExtractorSettings {
    fn default() -> Self {
        Self {
            landmark_model: None,
            encoder_model: None,
            jitters: DEFAULT_JITTERS,
            force_digest: false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct FaceModelPaths {
    pub landmark: PathBuf,
    pub encoder: PathBuf,
}

pub trait ModelPathResolver {
    fn resolve(&self, settings: &ExtractorSettings) -> AppResult<FaceModelPaths>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct EnvModelPathResolver;

impl ModelPathResolver for EnvModelPathResolver {
    fn resolve(&self, settings: &ExtractorSettings) -> AppResult<FaceModelPaths> {
        let landmark = settings
            .landmark_model
            .clone()
            .or_else(|| env::var(LANDMARK_ENV).ok().map(PathBuf::from))
            .ok_or(AppError::MissingModel {
                kind: "landmark predictor",
                flag: "--landmark-model",
                env: LANDMARK_ENV,
            })?;

        let encoder = settings
            .encoder_model
            .clone()
            .or_else(|| env::var(ENCODER_ENV).ok().map(PathBuf::from))
            .ok_or(AppError::MissingModel {
                kind: "face encoding network",
                flag: "--encoder-model",
                env: ENCODER_ENV,
            })?;

        Ok(FaceModelPaths { landmark, encoder })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BoundingBox {
    pub left: i64,
    pub top: i64,
    pub right: i64,
    pub bottom: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FaceEmbeddingRecord {
    pub bounding_box: BoundingBox,
    pub embedding: Vec<f64>,
}

/// Turns a decoded image into a biometric encoding.
///
/// Exactly one implementation is active per process; callers only need
/// `mode()` when tagging or checking stored records.
pub trait FeatureExtractor: Send + Sync {
    fn mode(&self) -> ExtractionMode;
    fn extract(&self, image: &RgbImage) -> AppResult<BiometricEncoding>;
}

pub trait FaceEmbeddingBackend: Send + Sync {
    fn extract(&self, image: &RgbImage, num_jitters: u32) -> AppResult<Vec<FaceEmbeddingRecord>>;
}

pub struct VectorExtractor<B> {
    backend: B,
    jitters: u32,
}

impl<B: FaceEmbeddingBackend> VectorExtractor<B> {
    pub fn new(backend: B, jitters: u32) -> Self {
        Self { backend, jitters }
    }
}

impl<B: FaceEmbeddingBackend> FeatureExtractor for VectorExtractor<B> {
    fn mode(&self) -> ExtractionMode {
        ExtractionMode::Vector
    }

    fn extract(&self, image: &RgbImage) -> AppResult<BiometricEncoding> {
        let mut faces = self.backend.extract(image, self.jitters)?;
        debug!(faces = faces.len(), "located faces");
        if faces.len() > 1 {
            return Err(AppError::MultipleFacesDetected { count: faces.len() });
        }
        let face = faces.pop().ok_or(AppError::NoFaceDetected)?;
        validate_descriptor(&face.embedding)?;
        Ok(BiometricEncoding::Vector(face.embedding))
    }
}

pub fn validate_descriptor(embedding: &[f64]) -> AppResult<()> {
    if embedding.is_empty() {
        return Err(AppError::ExtractionFailed("descriptor is empty".into()));
    }
    if let Some(idx) = embedding.iter().position(|value| !value.is_finite()) {
        return Err(AppError::ExtractionFailed(format!(
            "descriptor value at index {idx} is not finite"
        )));
    }
    let magnitude = embedding
        .iter()
        .map(|value| value * value)
        .sum::<f64>()
        .sqrt();
    if magnitude <= f64::EPSILON {
        return Err(AppError::ExtractionFailed(
            "descriptor has zero magnitude".into(),
        ));
    }
    Ok(())
}

/// Fallback strategy: a content digest of the downsampled image.
///
/// It never looks for a face, so two different people produce unrelated
/// digests and the match engine cannot use them for identity.
#[derive(Debug, Clone, Copy, Default)]
pub struct DigestExtractor;

impl FeatureExtractor for DigestExtractor {
    fn mode(&self) -> ExtractionMode {
        ExtractionMode::Digest
    }

    fn extract(&self, image: &RgbImage) -> AppResult<BiometricEncoding> {
        if image.width() == 0 || image.height() == 0 {
            return Err(AppError::ImageDecode {
                origin: "pixel buffer".into(),
                message: "image has no pixels".into(),
            });
        }
        Ok(BiometricEncoding::Digest(image_digest(image)))
    }
}

pub fn image_digest(image: &RgbImage) -> String {
    let small = imageops::resize(image, DIGEST_SIDE, DIGEST_SIDE, FilterType::CatmullRom);
    format!("{:x}", md5::compute(small.as_raw()))
}

pub fn select_extractor(settings: &ExtractorSettings) -> Box<dyn FeatureExtractor> {
    if settings.force_digest {
        info!("digest mode forced by configuration; faces are stored but not compared");
        return Box::new(DigestExtractor);
    }

    #[cfg(feature = "dlib")]
    {
        let loaded = EnvModelPathResolver
            .resolve(settings)
            .and_then(|models| DlibBackend::new(&models));
        match loaded {
            Ok(backend) => {
                info!(jitters = settings.jitters, "face recognition models loaded; vector mode enabled");
                return Box::new(VectorExtractor::new(backend, settings.jitters));
            }
            Err(err) => {
                warn!(error = %err, "face recognition unavailable; falling back to digest mode");
            }
        }
    }

    #[cfg(not(feature = "dlib"))]
    warn!("built without dlib support; falling back to digest mode");

    Box::new(DigestExtractor)
}

#[cfg(feature = "dlib")]
pub struct DlibBackend {
    inner: Mutex<DlibModels>,
}

#[cfg(feature = "dlib")]
struct DlibModels {
    detector: FaceDetector,
    predictor: LandmarkPredictor,
    encoder: FaceEncoderNetwork,
}

#[cfg(feature = "dlib")]
impl DlibBackend {
    pub fn new(models: &FaceModelPaths) -> AppResult<Self> {
        debug!(path = %models.landmark.display(), "loading landmark model");
        let predictor =
            LandmarkPredictor::open(&models.landmark).map_err(|message| AppError::ModelLoad {
                path: models.landmark.clone(),
                message,
            })?;
        debug!(path = %models.encoder.display(), "loading encoder model");
        let encoder =
            FaceEncoderNetwork::open(&models.encoder).map_err(|message| AppError::ModelLoad {
                path: models.encoder.clone(),
                message,
            })?;
        let detector = FaceDetector::new();

        Ok(Self {
            inner: Mutex::new(DlibModels {
                detector,
                predictor,
                encoder,
            }),
        })
    }
}

#[cfg(feature = "dlib")]
impl FaceEmbeddingBackend for DlibBackend {
    fn extract(&self, image: &RgbImage, num_jitters: u32) -> AppResult<Vec<FaceEmbeddingRecord>> {
        let models = self.inner.lock();
        let matrix = ImageMatrix::from_image(image);
        let locations = models.detector.face_locations(&matrix);

        let mut landmarks = Vec::with_capacity(locations.len());
        for rect in locations.iter() {
            landmarks.push(models.predictor.face_landmarks(&matrix, rect));
        }

        let encodings = models
            .encoder
            .get_face_encodings(&matrix, &landmarks, num_jitters);
        if encodings.len() != locations.len() {
            return Err(AppError::ExtractionFailed(format!(
                "encoder produced {} descriptor(s) for {} face(s)",
                encodings.len(),
                locations.len()
            )));
        }

        let mut records = Vec::with_capacity(locations.len());
        for (rect, encoding) in locations.iter().zip(encodings.iter()) {
            records.push(FaceEmbeddingRecord {
                bounding_box: BoundingBox {
                    left: rect.left,
                    top: rect.top,
                    right: rect.right,
                    bottom: rect.bottom,
                },
                embedding: encoding.as_ref().to_vec(),
            });
        }

        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    struct StubBackend {
        faces: Vec<FaceEmbeddingRecord>,
    }

    impl FaceEmbeddingBackend for StubBackend {
        fn extract(
            &self,
            _image: &RgbImage,
            _num_jitters: u32,
        ) -> AppResult<Vec<FaceEmbeddingRecord>> {
            Ok(self.faces.clone())
        }
    }

    fn face(embedding: Vec<f64>) -> FaceEmbeddingRecord {
        FaceEmbeddingRecord {
            bounding_box: BoundingBox {
                left: 0,
                top: 0,
                right: 1,
                bottom: 1,
            },
            embedding,
        }
    }

    fn solid(width: u32, height: u32, pixel: [u8; 3]) -> RgbImage {
        RgbImage::from_pixel(width, height, Rgb(pixel))
    }

    #[test]
    fn vector_extractor_rejects_image_without_faces() {
        let extractor = VectorExtractor::new(StubBackend { faces: vec![] }, 1);
        let err = extractor.extract(&solid(4, 4, [0, 0, 0])).unwrap_err();
        assert!(matches!(err, AppError::NoFaceDetected));
    }

    #[test]
    fn vector_extractor_rejects_multiple_faces() {
        let backend = StubBackend {
            faces: vec![face(vec![0.1, 0.2]), face(vec![0.3, 0.4])],
        };
        let extractor = VectorExtractor::new(backend, 1);
        let err = extractor.extract(&solid(4, 4, [0, 0, 0])).unwrap_err();
        match err {
            AppError::MultipleFacesDetected { count } => assert_eq!(count, 2),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn vector_extractor_returns_single_descriptor() {
        let backend = StubBackend {
            faces: vec![face(vec![0.1, 0.2, 0.3])],
        };
        let extractor = VectorExtractor::new(backend, 1);
        let encoding = extractor.extract(&solid(4, 4, [0, 0, 0])).unwrap();
        assert_eq!(encoding, BiometricEncoding::Vector(vec![0.1, 0.2, 0.3]));
        assert_eq!(extractor.mode(), ExtractionMode::Vector);
    }

    #[test]
    fn zero_magnitude_descriptor_is_extraction_failure() {
        let backend = StubBackend {
            faces: vec![face(vec![0.0, 0.0])],
        };
        let extractor = VectorExtractor::new(backend, 1);
        let err = extractor.extract(&solid(4, 4, [0, 0, 0])).unwrap_err();
        assert!(matches!(err, AppError::ExtractionFailed(_)));
    }

    #[test]
    fn non_finite_descriptor_is_extraction_failure() {
        let err = validate_descriptor(&[0.5, f64::NAN]).unwrap_err();
        assert!(matches!(err, AppError::ExtractionFailed(_)));
    }

    #[test]
    fn digest_is_deterministic_hex() {
        let image = solid(64, 48, [200, 10, 30]);
        let first = image_digest(&image);
        let second = image_digest(&image);
        assert_eq!(first, second);
        assert_eq!(first.len(), 32);
        assert!(first.chars().all(|ch| ch.is_ascii_hexdigit()));
    }

    #[test]
    fn digest_differs_for_different_content() {
        let red = image_digest(&solid(40, 40, [255, 0, 0]));
        let blue = image_digest(&solid(40, 40, [0, 0, 255]));
        assert_ne!(red, blue);
    }

    #[test]
    fn digest_extractor_never_looks_for_faces() {
        let encoding = DigestExtractor.extract(&solid(3, 3, [1, 2, 3])).unwrap();
        assert_eq!(encoding.mode(), ExtractionMode::Digest);
    }

    #[test]
    fn forced_digest_selects_fallback() {
        let settings = ExtractorSettings {
            force_digest: true,
            ..ExtractorSettings::default()
        };
        assert_eq!(select_extractor(&settings).mode(), ExtractionMode::Digest);
    }

    #[cfg(not(feature = "dlib"))]
    #[test]
    fn builds_without_dlib_fall_back_to_digest() {
        let settings = ExtractorSettings {
            landmark_model: Some(PathBuf::from("landmark.dat")),
            encoder_model: Some(PathBuf::from("encoder.dat")),
            ..ExtractorSettings::default()
        };
        assert_eq!(select_extractor(&settings).mode(), ExtractionMode::Digest);
    }

    #[test]
    fn explicit_model_paths_win_over_environment() {
        let settings = ExtractorSettings {
            landmark_model: Some(PathBuf::from("/models/landmark.dat")),
            encoder_model: Some(PathBuf::from("/models/encoder.dat")),
            ..ExtractorSettings::default()
        };
        let paths = EnvModelPathResolver.resolve(&settings).unwrap();
        assert_eq!(paths.landmark, PathBuf::from("/models/landmark.dat"));
        assert_eq!(paths.encoder, PathBuf::from("/models/encoder.dat"));
    }
}
