use std::path::Path;

use base64::{engine::general_purpose, Engine as _};
use image::RgbImage;
use tracing::debug;

use crate::errors::{AppError, AppResult};

/// Decode a client payload: plain base64 or a `data:image/...;base64,` URL.
pub fn decode_image_data(payload: &str) -> AppResult<RgbImage> {
    let encoded = match payload.split_once(',') {
        Some((_, data)) => data,
        None => payload,
    };
    let bytes = general_purpose::STANDARD
        .decode(encoded.trim())
        .map_err(|err| AppError::ImageDecode {
            origin: "base64 payload".into(),
            message: err.to_string(),
        })?;
    decode_image_bytes(&bytes, "base64 payload")
}

pub fn load_image_file(path: &Path) -> AppResult<RgbImage> {
    if !path.exists() {
        return Err(AppError::MissingInput {
            path: path.to_path_buf(),
        });
    }
    let image = image::open(path).map_err(|err| AppError::ImageDecode {
        origin: path.display().to_string(),
        message: err.to_string(),
    })?;
    let rgb = image.to_rgb8();
    debug!(path = %path.display(), width = rgb.width(), height = rgb.height(), "loaded image");
    Ok(rgb)
}

fn decode_image_bytes(bytes: &[u8], origin: &str) -> AppResult<RgbImage> {
    let image = image::load_from_memory(bytes).map_err(|err| AppError::ImageDecode {
        origin: origin.to_string(),
        message: err.to_string(),
    })?;
    let rgb = image.to_rgb8();
    debug!(width = rgb.width(), height = rgb.height(), "decoded image payload");
    Ok(rgb)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageOutputFormat, Rgb};
    use std::io::Cursor;
    use tempfile::TempDir;

    fn png_base64(image: &RgbImage) -> String {
        let mut bytes = Cursor::new(Vec::new());
        image
            .write_to(&mut bytes, ImageOutputFormat::Png)
            .unwrap();
        general_purpose::STANDARD.encode(bytes.into_inner())
    }

    #[test]
    fn decodes_plain_base64_png() {
        let source = RgbImage::from_pixel(5, 3, Rgb([9, 8, 7]));
        let decoded = decode_image_data(&png_base64(&source)).unwrap();
        assert_eq!(decoded, source);
    }

    #[test]
    fn strips_data_url_prefix() {
        let source = RgbImage::from_pixel(2, 2, Rgb([1, 2, 3]));
        let payload = format!("data:image/png;base64,{}", png_base64(&source));
        let decoded = decode_image_data(&payload).unwrap();
        assert_eq!(decoded.dimensions(), (2, 2));
    }

    #[test]
    fn invalid_base64_is_decode_error() {
        let err = decode_image_data("@@not-base64@@").unwrap_err();
        assert!(matches!(err, AppError::ImageDecode { .. }));
    }

    #[test]
    fn non_image_bytes_are_decode_error() {
        let payload = general_purpose::STANDARD.encode(b"plain text, not pixels");
        let err = decode_image_data(&payload).unwrap_err();
        assert!(matches!(err, AppError::ImageDecode { .. }));
    }

    #[test]
    fn missing_file_is_reported() {
        let tmp = TempDir::new().unwrap();
        let missing = tmp.path().join("missing.png");
        match load_image_file(&missing).unwrap_err() {
            AppError::MissingInput { path } => assert_eq!(path, missing),
            other => panic!("unexpected error: {:?}", other),
        }
    }
}
