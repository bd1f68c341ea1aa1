//! Digit segmentation and classification.
//!
//! A thresholded region is segmented into connected components, rescaled to a
//! canonical height, and each surviving glyph is classified by the trained
//! nearest-neighbor model. Glyphs wider than the canonical height are most
//! likely merged digits and are routed to the external OCR engine instead.

use crate::classifier::KnnClassifier;
use crate::dataset::{DatasetStore, TrainingDataset};
use crate::error::Error;
use crate::ocr::OcrEngine;
use image::imageops::{resize, FilterType};
use image::{GenericImageView, GrayImage, Luma};
use imageproc::region_labelling::{connected_components, Connectivity};
use log::warn;
use std::collections::HashMap;
use std::path::Path;

/// All glyph classification happens at this height.
pub const OCR_HEIGHT: u32 = 64;
/// Side of the downscaled glyph grid used as the feature vector (10x10).
const FEATURE_SIZE: u32 = 10;
/// Components at most this large are noise when computing the digit span.
const SPAN_MIN_AREA: u32 = 50;
/// Components must exceed this area (after rescaling) to count as glyphs.
const GLYPH_MIN_AREA: u32 = 100;
/// Neighbors consulted by the classifier.
const KNN_K: usize = 3;

/// A connected component's bounding box and pixel area.
#[derive(Debug, Clone, Copy)]
struct Component {
    x: u32,
    y: u32,
    width: u32,
    height: u32,
    area: u32,
}

fn find_components(img: &GrayImage) -> Vec<Component> {
    let labels = connected_components(img, Connectivity::Eight, Luma([0u8]));
    let mut boxes: HashMap<u32, (u32, u32, u32, u32, u32)> = HashMap::new();
    for (x, y, label) in labels.enumerate_pixels().map(|(x, y, p)| (x, y, p[0])) {
        if label == 0 {
            continue;
        }
        let entry = boxes.entry(label).or_insert((x, y, x, y, 0));
        entry.0 = entry.0.min(x);
        entry.1 = entry.1.min(y);
        entry.2 = entry.2.max(x);
        entry.3 = entry.3.max(y);
        entry.4 += 1;
    }
    boxes
        .values()
        .map(|&(x0, y0, x1, y1, area)| Component {
            x: x0,
            y: y0,
            width: x1 - x0 + 1,
            height: y1 - y0 + 1,
            area,
        })
        .collect()
}

/// Extract the structural feature vector for a glyph: the glyph centered in a
/// square and downscaled to a FEATURE_SIZE grid, pixels normalized to 0..1.
fn extract_features(img: &GrayImage, glyph: &Component) -> Vec<f32> {
    let side = glyph.width.max(glyph.height);
    let mut square = GrayImage::new(side, side);
    let x0 = (side - glyph.width) / 2;
    let y0 = (side - glyph.height) / 2;
    let crop = img.view(glyph.x, glyph.y, glyph.width, glyph.height);
    for (x, y, p) in crop.to_image().enumerate_pixels() {
        square.put_pixel(x0 + x, y0 + y, *p);
    }
    let grid = resize(&square, FEATURE_SIZE, FEATURE_SIZE, FilterType::Triangle);
    grid.pixels().map(|p| p[0] as f32 / 255.0).collect()
}

/// Invert a glyph crop onto a white canvas for the external OCR engine.
/// `pad` white pixels surround the glyph; extra canvas is added when `dim`
/// exceeds the padded crop.
fn inverted_canvas(img: &GrayImage, glyph: &Component, pad: u32) -> GrayImage {
    let dim_w = glyph.width + 2 * pad;
    let dim_h = glyph.height + 2 * pad;
    let dim = dim_w.max(dim_h).max(OCR_HEIGHT + 5);
    let mut canvas = GrayImage::from_pixel(dim, dim, Luma([255u8]));
    let x0 = (dim - glyph.width) / 2;
    let y0 = (dim - glyph.height) / 2;
    let crop = img.view(glyph.x, glyph.y, glyph.width, glyph.height);
    for (x, y, p) in crop.to_image().enumerate_pixels() {
        canvas.put_pixel(x0 + x, y0 + y, Luma([255 - p[0]]));
    }
    canvas
}

/// Crop a binary image to the vertical span of its non-noise components and
/// rescale it to OCR_HEIGHT, preserving aspect ratio.
fn crop_to_digit_span(img: &GrayImage) -> Option<GrayImage> {
    let mut top = img.height();
    let mut bottom = 0;
    for c in find_components(img) {
        if c.area > SPAN_MIN_AREA {
            top = top.min(c.y);
            bottom = bottom.max(c.y + c.height);
        }
    }
    if bottom <= top {
        return None;
    }
    let span = img.view(0, top, img.width(), bottom - top).to_image();
    let scale = OCR_HEIGHT as f64 / span.height() as f64;
    let width = ((span.width() as f64 * scale).round() as u32).max(1);
    Some(resize(&span, width, OCR_HEIGHT, FilterType::Triangle))
}

/// Recognizes digit strings in thresholded regions.
///
/// Owns the persisted training dataset and the nearest-neighbor model built
/// from it at construction. Appending samples (training mode) flushes the
/// dataset to the store immediately but does not retrain the model; build a
/// new recognizer to pick up new samples.
pub struct DigitRecognizer {
    dataset: TrainingDataset,
    model: KnnClassifier,
    store: Box<dyn DatasetStore>,
}

impl DigitRecognizer {
    /// Load the dataset from `store` (or start empty when
    /// `append_training_data` is false) and train the model from it.
    pub fn new(store: Box<dyn DatasetStore>, append_training_data: bool) -> Result<Self, Error> {
        let dataset = if append_training_data {
            store.load()?
        } else {
            TrainingDataset::default()
        };
        let model = KnnClassifier::train(&dataset);
        Ok(DigitRecognizer {
            dataset,
            model,
            store,
        })
    }

    pub fn dataset(&self) -> &TrainingDataset {
        &self.dataset
    }

    /// Bulk-export the current dataset to a JSON file.
    pub fn export_dataset<P: AsRef<Path>>(&self, path: P) -> Result<(), Error> {
        self.dataset.export_to(path)
    }

    /// Read the number painted in a thresholded region.
    ///
    /// Never fails: regions without recognizable digits yield None. An OCR
    /// engine failure on a fallback glyph is logged and the glyph skipped.
    pub fn recognize(&self, img: &GrayImage, ocr: &dyn OcrEngine) -> Option<u32> {
        let canonical = crop_to_digit_span(img)?;
        let mut digits: Vec<(String, u32)> = Vec::new();
        for glyph in find_components(&canonical) {
            if glyph.area <= GLYPH_MIN_AREA {
                continue;
            }
            if glyph.width > OCR_HEIGHT {
                // Likely a merged multi-digit blob, beyond the per-glyph model.
                warn!("glyph wider than canonical height, falling back to the OCR engine");
                match ocr.read_digits(&inverted_canvas(&canonical, &glyph, 5)) {
                    Ok(text) => {
                        let text = text.trim().to_string();
                        if !text.is_empty() && text.chars().all(|c| c.is_ascii_digit()) {
                            digits.push((text, glyph.x));
                        }
                    }
                    Err(err) => warn!("ocr fallback failed: {}", err),
                }
                continue;
            }
            let features = extract_features(&canonical, &glyph);
            if let Some(digit) = self.model.classify(&features, KNN_K) {
                digits.push((digit.to_string(), glyph.x));
            }
        }
        digits.sort_by_key(|&(_, x)| x);
        let number: String = digits.into_iter().map(|(d, _)| d).collect();
        number.parse().ok()
    }

    /// Training mode: label every glyph through the external OCR engine and
    /// append (features, label) pairs to the persisted dataset. Accepted
    /// samples are flushed to the store immediately. Never yields a
    /// recognized value.
    pub fn collect(&mut self, img: &GrayImage, ocr: &dyn OcrEngine) -> Result<(), Error> {
        let canonical = match crop_to_digit_span(img) {
            Some(canonical) => canonical,
            None => return Ok(()),
        };
        for glyph in find_components(&canonical) {
            if glyph.area <= GLYPH_MIN_AREA || glyph.width > OCR_HEIGHT {
                continue;
            }
            let features = extract_features(&canonical, &glyph);
            match ocr.read_digits(&inverted_canvas(&canonical, &glyph, 5)) {
                Ok(text) => {
                    let text = text.trim();
                    if !text.is_empty() && text.chars().all(|c| c.is_ascii_digit()) {
                        if let Ok(label) = text.parse() {
                            self.dataset.push(features, label);
                            self.store.flush(&self.dataset)?;
                        }
                    }
                }
                Err(err) => warn!("ocr labeling failed: {}", err),
            }
        }
        Ok(())
    }
}
