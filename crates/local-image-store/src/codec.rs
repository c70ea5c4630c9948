//! Payload decoding, color normalization and PNG re-encoding

use crate::error::{Result, StoreError};
use crate::types::ImagePayload;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use image::codecs::png::{CompressionType, FilterType, PngEncoder};
use image::{DynamicImage, ImageFormat, Rgb, RgbImage, RgbaImage};
use tracing::debug;

/// Unwrap a payload into raw image bytes.
///
/// Base64 text may be bare or carry a data-URL header; everything up to and
/// including the first comma of a `data:` payload is dropped. ASCII
/// whitespace inside the base64 text is ignored.
pub fn decode_payload(payload: ImagePayload) -> Result<Vec<u8>> {
    match payload {
        ImagePayload::Bytes(bytes) => Ok(bytes),
        ImagePayload::Base64(text) => {
            let encoded = strip_data_url(text.trim())?;
            let cleaned: String = encoded
                .chars()
                .filter(|c| !c.is_ascii_whitespace())
                .collect();
            Ok(STANDARD.decode(cleaned)?)
        }
    }
}

fn strip_data_url(text: &str) -> Result<&str> {
    if !text.starts_with("data:") {
        return Ok(text);
    }
    text.split_once(',')
        .map(|(_, data)| data)
        .ok_or_else(|| StoreError::InvalidEncoding("data URL has no payload".to_string()))
}

/// Decode a payload, flatten alpha onto white and re-encode as PNG.
///
/// Only formats listed in `accepted` are decoded; anything else, including
/// recognisable formats outside the list, is `UnsupportedFormat`.
pub fn decode_and_normalize(payload: ImagePayload, accepted: &[ImageFormat]) -> Result<Vec<u8>> {
    let bytes = decode_payload(payload)?;

    let format = image::guess_format(&bytes)?;
    if !accepted.contains(&format) {
        return Err(StoreError::UnsupportedFormat(format!(
            "{:?} images are not accepted",
            format
        )));
    }

    let decoded = image::load_from_memory_with_format(&bytes, format)?;
    debug!(
        format = ?format,
        width = decoded.width(),
        height = decoded.height(),
        color = ?decoded.color(),
        "Decoded image"
    );

    encode_png(&normalize(decoded))
}

/// Decoder formats matching an extension allowlist
pub(crate) fn accepted_formats(extensions: &[String]) -> Vec<ImageFormat> {
    let mut formats: Vec<ImageFormat> = extensions
        .iter()
        .filter_map(|ext| ImageFormat::from_extension(ext))
        .collect();
    formats.dedup();
    formats
}

/// Drop alpha by compositing onto opaque white. Opaque grey and RGB images
/// keep their color type so they round-trip losslessly; other opaque layouts
/// become 8-bit RGB.
pub(crate) fn normalize(image: DynamicImage) -> DynamicImage {
    if image.color().has_alpha() {
        return DynamicImage::ImageRgb8(flatten_onto_white(&image.to_rgba8()));
    }
    match image {
        DynamicImage::ImageLuma8(_)
        | DynamicImage::ImageLuma16(_)
        | DynamicImage::ImageRgb8(_)
        | DynamicImage::ImageRgb16(_) => image,
        other => DynamicImage::ImageRgb8(other.to_rgb8()),
    }
}

fn flatten_onto_white(rgba: &RgbaImage) -> RgbImage {
    RgbImage::from_fn(rgba.width(), rgba.height(), |x, y| {
        let [r, g, b, a] = rgba.get_pixel(x, y).0;
        Rgb([blend(r, a), blend(g, a), blend(b, a)])
    })
}

fn blend(channel: u8, alpha: u8) -> u8 {
    let (c, a) = (channel as u32, alpha as u32);
    ((c * a + 255 * (255 - a) + 127) / 255) as u8
}

fn encode_png(image: &DynamicImage) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    let encoder = PngEncoder::new_with_quality(&mut out, CompressionType::Best, FilterType::Adaptive);
    image
        .write_with_encoder(encoder)
        .map_err(|e| StoreError::Unexpected(format!("PNG encoding failed: {}", e)))?;
    Ok(out)
}
