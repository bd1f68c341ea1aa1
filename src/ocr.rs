//! Contract for the external optical-character-recognition engine.
//!
//! The reference deployment wraps Tesseract. The core asks for exactly two
//! operations: a single line of free text (the match title) and a single
//! word restricted to a digit vocabulary (ambiguous glyphs and training
//! labels). Calls are blocking with no built-in timeout.

use image::GrayImage;
use thiserror::Error;

/// Opaque failure reported by the external OCR engine.
#[derive(Debug, Error)]
#[error("ocr engine: {0}")]
pub struct OcrError(pub String);

pub trait OcrEngine {
    /// Read a single line of text, e.g. the match title.
    fn read_line(&self, img: &GrayImage) -> Result<String, OcrError>;

    /// Read a single word using a digit-only vocabulary.
    fn read_digits(&self, img: &GrayImage) -> Result<String, OcrError>;
}
