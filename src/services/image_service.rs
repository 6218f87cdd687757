use crate::error::{AppError, Result};
use crate::services::exif_service::{apply_orientation, read_orientation};
use base64::Engine;
use image::codecs::png::PngEncoder;
use image::{ImageEncoder, ImageReader, RgbImage};
use std::io::Cursor;

pub const ACCEPTED_EXTENSIONS: [&str; 4] = ["jpg", "jpeg", "png", "webp"];

/// Decode encoded bytes into an upright RGB bitmap.
///
/// Every decode path goes through here (uploads, URL bodies and redecodes of
/// stored session bytes), so the preview and the model input always agree.
pub fn decode_normalized(bytes: &[u8]) -> Result<RgbImage> {
    let img = ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()?
        .decode()?;

    let orientation = read_orientation(bytes);
    Ok(apply_orientation(img, orientation).into_rgb8())
}

/// Encode an RGB bitmap as PNG. Lossless, so a redecode gives the same pixels.
pub fn encode_png(img: &RgbImage) -> Result<Vec<u8>> {
    let mut png_bytes = Vec::new();
    PngEncoder::new(&mut png_bytes).write_image(
        img.as_raw(),
        img.width(),
        img.height(),
        image::ExtendedColorType::Rgb8,
    )?;
    Ok(png_bytes)
}

pub fn png_data_uri(png_bytes: &[u8]) -> String {
    let b64 = base64::engine::general_purpose::STANDARD.encode(png_bytes);
    format!("data:image/png;base64,{}", b64)
}

/// Checks an uploaded file name against the accepted raster formats.
pub fn check_upload_extension(file_name: &str) -> Result<()> {
    let Some(ext) = std::path::Path::new(file_name)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
    else {
        return Err(AppError::UnsupportedFormat("file name has no extension".to_string()));
    };

    if ACCEPTED_EXTENSIONS.contains(&ext.as_str()) {
        Ok(())
    } else {
        Err(AppError::UnsupportedFormat(format!(".{}", ext)))
    }
}
