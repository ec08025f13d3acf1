//! Tally-sheet image preprocessing
//!
//! Phone photos of tally sheets arrive skewed, shadowed and noisy.
//! Before recognition the image goes through greyscale conversion,
//! histogram equalisation, adaptive binarisation and a median denoise
//! pass, then is written to a temp file for the OCR binary.

use escrutinio_common::{Error, Result};
use image::GrayImage;
use imageproc::contrast::{adaptive_threshold, equalize_histogram};
use imageproc::filter::median_filter;
use std::path::{Path, PathBuf};

/// Block radius for adaptive thresholding; sized for tally-sheet cell
/// text at typical phone-camera resolutions.
const THRESHOLD_BLOCK_RADIUS: u32 = 11;

/// Median filter radius for the denoise pass
const DENOISE_RADIUS: u32 = 1;

/// Load and preprocess a tally-sheet image for recognition.
///
/// Returns `OCR_IMAGE_UNREADABLE` when the bytes do not decode as an
/// image; callers still create the capture stub in that case.
pub fn prepare_image(image_path: &Path) -> Result<GrayImage> {
    let image = image::open(image_path)
        .map_err(|e| Error::OcrImageUnreadable(format!("{}: {}", image_path.display(), e)))?;

    let grey = image.into_luma8();
    let equalized = equalize_histogram(&grey);
    let binarized = adaptive_threshold(&equalized, THRESHOLD_BLOCK_RADIUS);
    let denoised = median_filter(&binarized, DENOISE_RADIUS, DENOISE_RADIUS);

    Ok(denoised)
}

/// Preprocess and write the result next to the OS temp dir for the OCR
/// binary to pick up. The caller removes the file after recognition.
pub fn prepare_to_temp_file(image_path: &Path) -> Result<PathBuf> {
    let prepared = prepare_image(image_path)?;
    let temp_path = std::env::temp_dir().join(format!("e14_prepared_{}.png", uuid::Uuid::new_v4()));
    prepared
        .save(&temp_path)
        .map_err(|e| Error::OcrImageUnreadable(format!("saving prepared image: {}", e)))?;
    Ok(temp_path)
}
