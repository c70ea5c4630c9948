//! Helpers for building in-memory test images

use base64::{engine::general_purpose::STANDARD, Engine as _};
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use std::io::Cursor;
use std::path::Path;
use std::time::{Duration, SystemTime};

/// Deterministic opaque RGB gradient
pub fn opaque_rgb(width: u32, height: u32) -> DynamicImage {
    DynamicImage::ImageRgb8(RgbImage::from_fn(width, height, |x, y| {
        Rgb([(x * 40) as u8, (y * 60) as u8, ((x + y) * 20) as u8])
    }))
}

pub fn encode(image: &DynamicImage, format: ImageFormat) -> Vec<u8> {
    let mut out = Cursor::new(Vec::new());
    image.write_to(&mut out, format).unwrap();
    out.into_inner()
}

pub fn to_base64(bytes: &[u8]) -> String {
    STANDARD.encode(bytes)
}

pub fn png_base64(width: u32, height: u32) -> String {
    to_base64(&encode(&opaque_rgb(width, height), ImageFormat::Png))
}

/// Backdate a file's modification time by `secs_ago` seconds
pub fn set_mtime(path: &Path, secs_ago: u64) {
    let file = std::fs::File::options().write(true).open(path).unwrap();
    file.set_modified(SystemTime::now() - Duration::from_secs(secs_ago))
        .unwrap();
}

/// Create a file in `dir` whose modification time is `secs_ago` in the past
pub fn write_aged(dir: &Path, name: &str, bytes: &[u8], secs_ago: u64) {
    let path = dir.join(name);
    std::fs::write(&path, bytes).unwrap();
    set_mtime(&path, secs_ago);
}
