use crate::error::{AppError, Result};
use image::imageops::{self, FilterType};
use image::RgbImage;
use ndarray::Array4;

pub const TARGET_SIZE: u32 = 224;

/// Per-channel affine normalization: `(x / 255 - mean) / std`.
#[derive(Debug, Clone, Copy)]
pub struct Normalization {
    pub mean: [f32; 3],
    pub std: [f32; 3],
}

/// Largest centered square; odd leftovers are trimmed toward the lower bound.
pub fn center_crop_square(img: &RgbImage) -> RgbImage {
    let (w, h) = img.dimensions();
    let side = w.min(h);
    if w == h {
        return img.clone();
    }
    let left = (w - side) / 2;
    let top = (h - side) / 2;
    imageops::crop_imm(img, left, top, side, side).to_image()
}

/// Builds the (1, 224, 224, 3) NHWC input tensor for one image.
pub fn preprocess_image(
    img: &RgbImage,
    do_center_crop: bool,
    norm: &Normalization,
) -> Result<Array4<f32>> {
    let cropped;
    let source = if do_center_crop {
        cropped = center_crop_square(img);
        &cropped
    } else {
        img
    };

    // Lanczos both shrinks without aliasing and upscales small inputs.
    let resized = imageops::resize(source, TARGET_SIZE, TARGET_SIZE, FilterType::Lanczos3);

    let data: Vec<f32> = resized
        .into_raw()
        .chunks_exact(3)
        .flat_map(|pixel| {
            (0..3).map(move |c| (pixel[c] as f32 / 255.0 - norm.mean[c]) / norm.std[c])
        })
        .collect();

    Array4::from_shape_vec(
        (1, TARGET_SIZE as usize, TARGET_SIZE as usize, 3),
        data,
    )
    .map_err(|e| AppError::Internal(format!("Failed to create tensor: {}", e)))
}
