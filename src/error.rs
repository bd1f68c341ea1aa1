use crate::ocr::OcrError;
use std::io;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// The overlay could not be rediscovered: not enough good keypoint
    /// correspondences survived the ratio test. Recoverable, retry on a
    /// later frame.
    #[error("Not enough matches are found - {found}/{required}")]
    NoOverlayFound { found: usize, required: usize },
    /// The estimated overlay transform has zero scale. Fatal for this frame.
    #[error("Scale is zero")]
    InvalidScale,
    /// Error reading the template or the training dataset file
    #[error("Asset could not be read")]
    AssetReadError(#[from] io::Error),
    /// Error decoding an image
    #[error("Image {path} could not be decoded")]
    ImageError {
        path: String,
        source: image::error::ImageError,
    },
    /// Error encoding or decoding the persisted training dataset
    #[error("Training dataset could not be decoded")]
    DatasetError(#[from] serde_json::Error),
    /// The external OCR engine failed on the match title line
    #[error("OCR engine failed")]
    Ocr(#[from] OcrError),
}
