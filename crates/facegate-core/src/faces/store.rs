use std::fs;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use image::{ImageFormat, RgbImage};
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tracing::debug;

use crate::errors::{AppError, AppResult};
use crate::faces::encoding::FaceRecord;

pub const ENCODINGS_FILE: &str = "encodings.json";
const STORE_VERSION: u32 = 1;

pub trait FaceStore: Send + Sync {
    fn load(&self, path: &Path) -> AppResult<Vec<FaceRecord>>;
    fn save(&self, path: &Path, records: &[FaceRecord]) -> AppResult<()>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct FilesystemFaceStore;

impl FaceStore for FilesystemFaceStore {
    fn load(&self, path: &Path) -> AppResult<Vec<FaceRecord>> {
        read_encoding_store(path)
    }

    fn save(&self, path: &Path, records: &[FaceRecord]) -> AppResult<()> {
        write_encoding_store(path, records)
    }
}

pub fn encodings_path(data_dir: &Path) -> PathBuf {
    data_dir.join(ENCODINGS_FILE)
}

#[derive(Serialize, Deserialize)]
struct EncodingStoreFile {
    version: u32,
    records: Vec<FaceRecord>,
}

pub fn read_encoding_store(path: &Path) -> AppResult<Vec<FaceRecord>> {
    let data = match fs::read(path) {
        Ok(data) => data,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(source) => {
            return Err(AppError::PersistenceRead {
                path: path.to_path_buf(),
                source,
            })
        }
    };

    let file: EncodingStoreFile =
        serde_json::from_slice(&data).map_err(|err| AppError::InvalidStore {
            path: path.to_path_buf(),
            message: format!("invalid encoding store contents: {err}"),
        })?;
    if file.version != STORE_VERSION {
        return Err(AppError::InvalidStore {
            path: path.to_path_buf(),
            message: format!("unsupported encoding store version {}", file.version),
        });
    }

    Ok(file.records)
}

pub fn write_encoding_store(path: &Path, records: &[FaceRecord]) -> AppResult<()> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(parent).map_err(|source| AppError::PersistenceWrite {
        path: parent.to_path_buf(),
        source,
    })?;

    let mut sorted = records.to_vec();
    sorted.sort_by(|a, b| a.user_id.cmp(&b.user_id));
    let serialized = serde_json::to_vec_pretty(&EncodingStoreFile {
        version: STORE_VERSION,
        records: sorted,
    })?;

    let mut tmp = NamedTempFile::new_in(parent).map_err(|source| AppError::PersistenceWrite {
        path: path.to_path_buf(),
        source,
    })?;

    {
        let file = tmp.as_file_mut();
        write_payload(BufWriter::new(&mut *file), &serialized, path)?;
        file.sync_all().map_err(|source| AppError::PersistenceWrite {
            path: path.to_path_buf(),
            source,
        })?;
    }

    let file = tmp.persist(path).map_err(|err| AppError::PersistenceWrite {
        path: path.to_path_buf(),
        source: err.error,
    })?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mut perms = file
            .metadata()
            .map_err(|source| AppError::PersistenceWrite {
                path: path.to_path_buf(),
                source,
            })?
            .permissions();
        perms.set_mode(0o600);
        file.set_permissions(perms)
            .map_err(|source| AppError::PersistenceWrite {
                path: path.to_path_buf(),
                source,
            })?;
    }
    #[cfg(not(unix))]
    drop(file);

    debug!(path = %path.display(), records = records.len(), "encoding store written");
    Ok(())
}

fn write_payload<W: Write>(mut writer: W, payload: &[u8], path: &Path) -> AppResult<()> {
    let write_err = |source| AppError::PersistenceWrite {
        path: path.to_path_buf(),
        source,
    };
    writer.write_all(payload).map_err(write_err)?;
    writer.write_all(b"\n").map_err(write_err)?;
    writer.flush().map_err(write_err)
}

/// Side storage for the image a user registered with.
pub trait ReferenceImageSink: Send + Sync {
    fn store(&self, user_id: &str, image: &RgbImage) -> AppResult<()>;
    fn remove(&self, user_id: &str) -> AppResult<()>;
}

#[derive(Debug, Clone)]
pub struct FilesystemReferenceImages {
    dir: PathBuf,
}

impl FilesystemReferenceImages {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn image_path(&self, user_id: &str) -> PathBuf {
        self.dir.join(format!("{}.jpg", image_file_stem(user_id)))
    }
}

/// Percent-encodes every byte outside `[A-Za-z0-9_-]` so any user id maps to
/// a single path component and distinct ids never share a file.
pub fn image_file_stem(user_id: &str) -> String {
    let mut stem = String::with_capacity(user_id.len());
    for byte in user_id.bytes() {
        if byte.is_ascii_alphanumeric() || byte == b'-' || byte == b'_' {
            stem.push(char::from(byte));
        } else {
            stem.push_str(&format!("%{byte:02X}"));
        }
    }
    stem
}

impl ReferenceImageSink for FilesystemReferenceImages {
    fn store(&self, user_id: &str, image: &RgbImage) -> AppResult<()> {
        fs::create_dir_all(&self.dir).map_err(|source| AppError::PersistenceWrite {
            path: self.dir.clone(),
            source,
        })?;
        let path = self.image_path(user_id);
        image
            .save_with_format(&path, ImageFormat::Jpeg)
            .map_err(|err| AppError::PersistenceWrite {
                path: path.clone(),
                source: io::Error::new(io::ErrorKind::Other, err.to_string()),
            })
    }

    fn remove(&self, user_id: &str) -> AppResult<()> {
        let path = self.image_path(user_id);
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(AppError::PersistenceWrite { path, source }),
        }
    }
}
