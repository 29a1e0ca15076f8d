//! Conversions between files, base64 payloads and `data:` URLs.
//!
//! Results travel through the studio as data URLs so the front-end can show or
//! save them without knowing which path produced them.

use std::fs;
use std::io::Cursor;
use std::path::Path;

use anyhow::{bail, Context, Result};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use image::codecs::webp::WebPEncoder;
use image::ExtendedColorType;
use studio_contracts::studio::ImageFile;

use crate::error::StudioError;

pub const JPEG_MIME: &str = "image/jpeg";
pub const WEBP_MIME: &str = "image/webp";
pub const DEFAULT_WEBP_QUALITY: f32 = 0.8;
pub const DOWNLOAD_PREFIX: &str = "ecom-studio-ai-result";

/// Returns the payload after the first `,` of a data URL.
///
/// The payload itself is not validated.
pub fn data_url_to_base64(data_url: &str) -> Option<&str> {
    data_url.split_once(',').map(|(_, payload)| payload)
}

/// Wraps raw model output (JPEG) so it can be displayed or saved directly.
pub fn process_final_image(generated_base64: &str) -> String {
    format!("data:{JPEG_MIME};base64,{generated_base64}")
}

pub fn to_data_url(mime_type: &str, bytes: &[u8]) -> String {
    format!("data:{mime_type};base64,{}", BASE64.encode(bytes))
}

/// Media type declared in a data URL header, if any.
pub fn media_type_of(data_url: &str) -> Option<&str> {
    let header = data_url.strip_prefix("data:")?.split_once(',')?.0;
    header
        .split(';')
        .next()
        .map(str::trim)
        .filter(|mime| !mime.is_empty())
}

pub fn decode_data_url(data_url: &str) -> Result<Vec<u8>, StudioError> {
    let payload = data_url_to_base64(data_url)
        .ok_or_else(|| StudioError::Codec("Image is not a base64 data URL".to_string()))?;
    BASE64
        .decode(payload.trim().as_bytes())
        .map_err(|err| StudioError::Codec(format!("Image payload is not valid base64: {err}")))
}

/// Loads a file from disk into an image descriptor.
///
/// Magic bytes decide the media type; the extension is only a fallback.
pub fn read_image_file(path: &Path) -> Result<ImageFile> {
    let bytes = fs::read(path).with_context(|| format!("failed reading {}", path.display()))?;
    if bytes.is_empty() {
        bail!("{} is empty", path.display());
    }
    let mime_type = image::guess_format(&bytes)
        .map(|format| format.to_mime_type())
        .ok()
        .or_else(|| mime_for_path(path));
    let Some(mime_type) = mime_type else {
        bail!("{} is not a supported image file", path.display());
    };
    let name = path
        .file_name()
        .and_then(|value| value.to_str())
        .unwrap_or("image")
        .to_string();
    Ok(ImageFile::new(name, to_data_url(mime_type, &bytes), mime_type))
}

pub fn mime_for_path(path: &Path) -> Option<&'static str> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    match ext.as_str() {
        "png" => Some("image/png"),
        "jpg" | "jpeg" => Some(JPEG_MIME),
        "webp" => Some(WEBP_MIME),
        "gif" => Some("image/gif"),
        "bmp" => Some("image/bmp"),
        _ => None,
    }
}

/// Re-encodes any decodable image as WebP and returns it as a data URL.
///
/// `quality` is a 0..=1 fraction. Below 1.0 the RGB channels are quantized
/// before the lossless encoder runs, which trades color detail for size.
pub fn convert_to_webp(data_url: &str, quality: f32) -> Result<String, StudioError> {
    let load_failed = |detail: String| {
        StudioError::Codec(format!("Failed to load image for WebP conversion: {detail}"))
    };
    let payload = data_url_to_base64(data_url)
        .ok_or_else(|| load_failed("missing data URL payload".to_string()))?;
    let bytes = BASE64
        .decode(payload.trim().as_bytes())
        .map_err(|err| load_failed(err.to_string()))?;
    let decoded = image::load_from_memory(&bytes).map_err(|err| load_failed(err.to_string()))?;

    let mut rgba = decoded.to_rgba8();
    let percent = (quality.clamp(0.0, 1.0) * 100.0).round() as u8;
    if percent < 100 {
        quantize_rgb(rgba.as_mut(), percent);
    }

    let (width, height) = rgba.dimensions();
    let mut buffer = Vec::new();
    WebPEncoder::new_lossless(Cursor::new(&mut buffer))
        .encode(rgba.as_raw(), width, height, ExtendedColorType::Rgba8)
        .map_err(|err| StudioError::Codec(format!("Could not encode WebP: {err}")))?;
    Ok(to_data_url(WEBP_MIME, &buffer))
}

/// Snaps each RGB channel to a palette whose size grows with `percent`.
/// Alpha is left untouched.
fn quantize_rgb(data: &mut [u8], percent: u8) {
    let levels = levels_for_quality(percent);
    let step = 255.0 / (levels as f32 - 1.0);
    for pixel in data.chunks_exact_mut(4) {
        for channel in pixel.iter_mut().take(3) {
            let bucket = (f32::from(*channel) / step).round();
            *channel = (bucket * step).round().clamp(0.0, 255.0) as u8;
        }
    }
}

fn levels_for_quality(percent: u8) -> u16 {
    if percent >= 100 {
        return 256;
    }
    let normalized = f32::from(percent.max(1)) / 100.0;
    (2.0 + normalized * normalized * 254.0).round().clamp(2.0, 256.0) as u16
}

pub fn extension_for_mime(mime_type: Option<&str>) -> &'static str {
    match mime_type.map(str::to_ascii_lowercase).as_deref() {
        Some("image/webp") => "webp",
        Some("image/png") => "png",
        Some("image/gif") => "gif",
        _ => "jpg",
    }
}

/// `ecom-studio-ai-result-{millis}.{ext}`, with the extension taken from the result.
pub fn download_file_name(data_url: &str, unix_millis: i64) -> String {
    format!(
        "{DOWNLOAD_PREFIX}-{unix_millis}.{}",
        extension_for_mime(media_type_of(data_url))
    )
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::io::Cursor;

    use image::{DynamicImage, ImageBuffer, ImageFormat, Rgba};

    use super::*;

    fn sample_png() -> Vec<u8> {
        let buf: ImageBuffer<Rgba<u8>, Vec<u8>> = ImageBuffer::from_fn(4, 3, |x, y| {
            if x == 3 && y == 2 {
                Rgba([255, 255, 255, 0])
            } else {
                Rgba([(x * 60) as u8, (y * 90) as u8, 200, 255])
            }
        });
        let mut bytes = Vec::new();
        DynamicImage::ImageRgba8(buf)
            .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
            .expect("encode fixture");
        bytes
    }

    #[test]
    fn base64_survives_wrapping_as_displayable() {
        let payload = "iVBORw0KGgoAAAANSUhEUg==";
        let displayable = process_final_image(payload);
        assert!(displayable.starts_with("data:image/jpeg;base64,"));
        assert_eq!(data_url_to_base64(&displayable), Some(payload));
    }

    #[test]
    fn data_url_without_separator_has_no_payload() {
        assert_eq!(data_url_to_base64("not-a-data-url"), None);
        assert_eq!(media_type_of("not-a-data-url"), None);
        assert_eq!(media_type_of("data:image/png;base64,AAAA"), Some("image/png"));
        assert!(decode_data_url("data:image/png;base64,@@@").is_err());
    }

    #[test]
    fn png_converts_to_webp_with_alpha_and_dimensions() -> anyhow::Result<()> {
        let data_url = to_data_url("image/png", &sample_png());
        let converted = convert_to_webp(&data_url, 1.0)?;
        assert!(converted.starts_with("data:image/webp;base64,"));

        let bytes = decode_data_url(&converted)?;
        let decoded = image::load_from_memory_with_format(&bytes, ImageFormat::WebP)?.to_rgba8();
        assert_eq!(decoded.dimensions(), (4, 3));
        assert_eq!(decoded.get_pixel(3, 2).0[3], 0);
        assert_eq!(decoded.get_pixel(1, 1).0, [60, 90, 200, 255]);
        Ok(())
    }

    #[test]
    fn lossy_quality_still_produces_decodable_webp() -> anyhow::Result<()> {
        let data_url = to_data_url("image/png", &sample_png());
        let converted = convert_to_webp(&data_url, DEFAULT_WEBP_QUALITY)?;
        let bytes = decode_data_url(&converted)?;
        let decoded = image::load_from_memory_with_format(&bytes, ImageFormat::WebP)?;
        assert_eq!(decoded.width(), 4);
        Ok(())
    }

    #[test]
    fn quantize_keeps_extremes_and_alpha() {
        let mut pixels = vec![0, 255, 130, 77];
        quantize_rgb(&mut pixels, 10);
        assert_eq!(pixels[0], 0);
        assert_eq!(pixels[1], 255);
        assert_eq!(pixels[3], 77);
        assert_eq!(levels_for_quality(100), 256);
        assert_eq!(levels_for_quality(0), 2);
    }

    #[test]
    fn undecodable_image_fails_to_load() {
        let err = convert_to_webp("data:image/png;base64,aGVsbG8=", 0.8).unwrap_err();
        assert_eq!(err.kind(), "codec");
        assert!(err
            .to_string()
            .starts_with("Failed to load image for WebP conversion"));
        assert!(convert_to_webp("garbage", 0.8).is_err());
    }

    #[test]
    fn read_image_file_prefers_magic_bytes() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("mislabeled.jpg");
        fs::write(&path, sample_png())?;

        let image = read_image_file(&path)?;
        assert_eq!(image.name, "mislabeled.jpg");
        assert_eq!(image.mime_type, "image/png");
        assert!(image.data_url.starts_with("data:image/png;base64,"));
        assert_eq!(decode_data_url(&image.data_url)?, sample_png());
        Ok(())
    }

    #[test]
    fn read_image_file_rejects_non_images() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("notes.txt");
        fs::write(&path, b"just text")?;
        assert!(read_image_file(&path).is_err());
        assert!(read_image_file(&temp.path().join("missing.png")).is_err());
        Ok(())
    }

    #[test]
    fn download_name_follows_result_type() {
        assert_eq!(
            download_file_name("data:image/jpeg;base64,AA", 1700000000000),
            "ecom-studio-ai-result-1700000000000.jpg"
        );
        assert_eq!(
            download_file_name("data:image/webp;base64,AA", 5),
            "ecom-studio-ai-result-5.webp"
        );
        assert_eq!(download_file_name("oops", 5), "ecom-studio-ai-result-5.jpg");
    }
}
