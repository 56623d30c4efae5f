pub mod encoding;
pub mod extractor;
pub mod matcher;
pub mod registry;
pub mod service;
pub mod store;

pub use encoding::{BiometricEncoding, ExtractionMode, FaceRecord};

pub use extractor::{
    image_digest, select_extractor, validate_descriptor, BoundingBox, DigestExtractor,
    EnvModelPathResolver, ExtractorSettings, FaceEmbeddingBackend, FaceEmbeddingRecord,
    FaceModelPaths, FeatureExtractor, ModelPathResolver, VectorExtractor,
};

#[cfg(feature = "dlib")]
pub use extractor::DlibBackend;

pub use matcher::{
    euclidean_distance, MatchEngine, MatchReason, VerificationResult,
    DEFAULT_VERIFICATION_THRESHOLD, FALLBACK_CONFIDENCE,
};

pub use registry::EncodingStore;

pub use service::{
    validate_user_id, DeleteResponse, HealthResponse, RegisterResponse, ServiceConfig,
    StatusResponse, VerificationService, VerifyResponse,
};

pub use store::{
    encodings_path, image_file_stem, read_encoding_store, write_encoding_store, FaceStore,
    FilesystemFaceStore, FilesystemReferenceImages, ReferenceImageSink, ENCODINGS_FILE,
};
