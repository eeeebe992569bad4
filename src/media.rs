//! Upload validation and server-side image re-encoding.

use crate::errors::MediaError;
use image::{codecs::jpeg::JpegEncoder, imageops::FilterType, DynamicImage, ImageError, ImageReader, Limits};
use std::io::Cursor;

/// Raster formats accepted for any upload. Scriptable formats such as SVG
/// are never stored.
pub const RASTER_IMAGE_TYPES: &[&str] = &["image/jpeg", "image/png", "image/webp", "image/gif"];
/// Largest width or height the decoder will accept.
pub const MAX_DECODE_SIDE: u32 = 16_384;
const MAX_DECODE_ALLOC: u64 = 256 * 1024 * 1024;
pub const PROFILE_PHOTO_MAX_BYTES: usize = 10 * 1024 * 1024;
pub const PROFILE_PHOTO_SIDE: u32 = 400;
pub const PROFILE_PHOTO_QUALITY: u8 = 85;

const OCTET_STREAM: &str = "application/octet-stream";

/// Best-known MIME type of an upload: the declared one, else a sniff of the
/// bytes, else a guess from the file name.
pub fn resolve_content_type(declared: Option<&str>, file_name: Option<&str>, data: &[u8]) -> Option<String> {
    let declared = declared
        .map(|ct| ct.split(';').next().unwrap_or(ct).trim().to_lowercase())
        .filter(|ct| !ct.is_empty() && ct != OCTET_STREAM);
    if declared.is_some() {
        return declared;
    }

    if let Ok(format) = image::guess_format(data) {
        return Some(format.to_mime_type().to_string());
    }

    file_name.and_then(|name| mime_guess::from_path(name).first_raw().map(|s| s.to_string()))
}

pub fn ensure_image(content_type: Option<&str>, size: usize, max: usize) -> Result<(), MediaError> {
    if size == 0 {
        return Err(MediaError::Empty);
    }
    if size > max {
        return Err(MediaError::TooLarge { size, max });
    }
    ensure_allowed_type(content_type, RASTER_IMAGE_TYPES)
}

pub fn ensure_allowed_type(content_type: Option<&str>, allowed: &[&str]) -> Result<(), MediaError> {
    match content_type {
        Some(ct) if allowed.contains(&ct) => Ok(()),
        other => Err(MediaError::UnsupportedType(other.unwrap_or("unknown").to_string())),
    }
}

/// File extension for a stored object.
pub fn extension_for(content_type: Option<&str>, file_name: Option<&str>) -> String {
    let from_type = match content_type {
        Some("image/jpeg") => Some("jpg"),
        Some("image/png") => Some("png"),
        Some("image/webp") => Some("webp"),
        Some("image/gif") => Some("gif"),
        Some(ct) => mime_guess::get_mime_extensions_str(ct).and_then(|exts| exts.first().copied()),
        None => None,
    };
    if let Some(ext) = from_type {
        return ext.to_string();
    }

    file_name
        .and_then(|name| name.rsplit_once('.').map(|(_, ext)| ext.to_lowercase()))
        .filter(|ext| !ext.is_empty() && ext.chars().all(|c| c.is_ascii_alphanumeric()))
        .unwrap_or_else(|| "bin".to_string())
}

fn decode(data: &[u8]) -> Result<DynamicImage, MediaError> {
    decode_within(data, MAX_DECODE_SIDE)
}

// Dimensions are checked against the header before any pixel buffer is allocated.
fn decode_within(data: &[u8], max_side: u32) -> Result<DynamicImage, MediaError> {
    let mut limits = Limits::default();
    limits.max_image_width = Some(max_side);
    limits.max_image_height = Some(max_side);
    limits.max_alloc = Some(MAX_DECODE_ALLOC);

    let mut reader = ImageReader::new(Cursor::new(data))
        .with_guessed_format()
        .map_err(|e| MediaError::Decode(ImageError::IoError(e)))?;
    reader.limits(limits);
    reader.decode().map_err(MediaError::Decode)
}

fn encode_jpeg(image: &DynamicImage, quality: u8) -> Result<Vec<u8>, MediaError> {
    let mut out = Vec::new();
    let encoder = JpegEncoder::new_with_quality(&mut out, quality);
    // JPEG has no alpha channel.
    DynamicImage::ImageRgb8(image.to_rgb8())
        .write_with_encoder(encoder)
        .map_err(MediaError::Encode)?;
    Ok(out)
}

/// Shrinks to at most `max_width` wide, keeping the aspect ratio, and
/// re-encodes as JPEG. Narrower images keep their size.
pub fn recompress(data: &[u8], max_width: u32, quality: u8) -> Result<Vec<u8>, MediaError> {
    let image = decode(data)?;
    let image = if image.width() > max_width {
        let height = ((image.height() as u64 * max_width as u64) / image.width() as u64).max(1) as u32;
        image.resize_exact(max_width, height, FilterType::Lanczos3)
    } else {
        image
    };
    encode_jpeg(&image, quality)
}

/// Center-crops to a square and scales to `side` x `side`.
pub fn square_avatar(data: &[u8], side: u32, quality: u8) -> Result<Vec<u8>, MediaError> {
    let image = decode(data)?;
    let edge = image.width().min(image.height());
    let x = (image.width() - edge) / 2;
    let y = (image.height() - edge) / 2;
    let avatar = image
        .crop_imm(x, y, edge, edge)
        .resize_exact(side, side, FilterType::Lanczos3);
    encode_jpeg(&avatar, quality)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GenericImageView, ImageFormat, Rgb, RgbImage};

    fn png(width: u32, height: u32) -> Vec<u8> {
        let buffer = RgbImage::from_pixel(width, height, Rgb([200, 40, 90]));
        let mut out = Cursor::new(Vec::new());
        DynamicImage::ImageRgb8(buffer)
            .write_to(&mut out, ImageFormat::Png)
            .unwrap();
        out.into_inner()
    }

    #[test]
    fn sniffs_when_the_declared_type_is_generic() {
        let data = png(4, 4);
        assert_eq!(
            resolve_content_type(Some("application/octet-stream"), None, &data).as_deref(),
            Some("image/png")
        );
        assert_eq!(
            resolve_content_type(Some("image/JPEG; charset=binary"), None, &data).as_deref(),
            Some("image/jpeg")
        );
        assert_eq!(
            resolve_content_type(None, Some("notes.txt"), b"hello").as_deref(),
            Some("text/plain")
        );
    }

    #[test]
    fn validation_checks_size_then_type() {
        assert!(matches!(ensure_image(Some("image/png"), 0, 10), Err(MediaError::Empty)));
        assert!(matches!(
            ensure_image(Some("image/png"), 11, 10),
            Err(MediaError::TooLarge { size: 11, max: 10 })
        ));
        assert!(matches!(
            ensure_image(Some("text/plain"), 5, 10),
            Err(MediaError::UnsupportedType(_))
        ));
        assert!(ensure_image(Some("image/webp"), 5, 10).is_ok());
        assert!(matches!(
            ensure_image(Some("image/svg+xml"), 5, 10),
            Err(MediaError::UnsupportedType(_))
        ));
        assert!(ensure_allowed_type(Some("image/bmp"), RASTER_IMAGE_TYPES).is_err());
    }

    #[test]
    fn extensions_prefer_the_content_type() {
        assert_eq!(extension_for(Some("image/jpeg"), Some("shot.PNG")), "jpg");
        assert_eq!(extension_for(None, Some("shot.PNG")), "png");
        assert_eq!(extension_for(None, None), "bin");
    }

    #[test]
    fn recompress_limits_width_and_keeps_aspect() {
        let out = recompress(&png(400, 200), 100, 80).unwrap();
        assert_eq!(image::guess_format(&out).unwrap(), ImageFormat::Jpeg);
        let decoded = image::load_from_memory(&out).unwrap();
        assert_eq!(decoded.dimensions(), (100, 50));

        let small = image::load_from_memory(&recompress(&png(60, 30), 100, 80).unwrap()).unwrap();
        assert_eq!(small.dimensions(), (60, 30));
    }

    #[test]
    fn avatar_is_square() {
        let out = square_avatar(&png(300, 120), 64, 85).unwrap();
        let decoded = image::load_from_memory(&out).unwrap();
        assert_eq!(decoded.dimensions(), (64, 64));
    }

    #[test]
    fn oversized_dimensions_are_refused_before_decoding() {
        assert!(matches!(
            decode_within(&png(64, 16), 32),
            Err(MediaError::Decode(ImageError::Limits(_)))
        ));
        assert!(decode_within(&png(32, 32), 32).is_ok());
    }

    #[test]
    fn garbage_is_a_decode_error() {
        assert!(matches!(recompress(b"not an image", 100, 80), Err(MediaError::Decode(_))));
    }
}
