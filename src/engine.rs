//! Per-frame orchestration: normalize the frame, locate the overlay, and
//! hand the located region helpers to a season-specific field extractor.

use crate::dataset::DatasetStore;
use crate::digits::{DigitRecognizer, OCR_HEIGHT};
use crate::error::Error;
use crate::features::FeatureDetector;
use crate::locator::OverlayLocator;
use crate::matchkey::MatchKeyResolver;
use crate::ocr::OcrEngine;
use crate::region;
use crate::transform::Transform;
use image::imageops::{grayscale, resize, FilterType};
use image::{GenericImageView, GrayImage, Luma, Rgb, RgbImage};
use imageproc::distance_transform::Norm;
use imageproc::morphology::open;
use std::path::Path;

/// Every frame is normalized to this resolution before processing.
const FRAME_WIDTH: u32 = 1280;
const FRAME_HEIGHT: u32 = 720;

/// RGB ranges for the white-on-dark and dark-on-white overlay text.
const WHITE_LOW: [u8; 3] = [120, 120, 120];
const BLACK_HIGH: [u8; 3] = [135, 135, 155];

const SATURATION_THRESHOLD: f64 = 0.2;

#[derive(Clone, Copy, PartialEq)]
enum ReadMode {
    Recognize,
    Train,
}

/// Season-specific field extraction.
///
/// The core locates the overlay and supplies a [FieldReader]; which crops
/// correspond to which fields is entirely the implementor's business.
pub trait FrameFieldExtractor {
    /// Season-defined structured match state.
    type Fields;

    fn extract(&self, fields: &mut FieldReader<'_>, frame: &RgbImage)
        -> Result<Self::Fields, Error>;
}

/// The recognition capabilities handed to a [FrameFieldExtractor] for one
/// located frame.
pub struct FieldReader<'a> {
    transform: Transform,
    digits: &'a mut DigitRecognizer,
    resolver: &'a MatchKeyResolver,
    ocr: &'a dyn OcrEngine,
    mode: ReadMode,
}

impl FieldReader<'_> {
    /// The overlay transform for this frame.
    pub fn transform(&self) -> Transform {
        self.transform
    }

    /// Map a template-space point to frame coordinates.
    pub fn transform_point(&self, point: (f64, f64)) -> (i32, i32) {
        self.transform.transform_point(point)
    }

    /// Crop a frame region, rescale it to the canonical OCR height, and
    /// threshold it to a binary image (white text or black text), with a 3x3
    /// morphological open to drop speckle.
    pub fn crop_thresh(
        &self,
        frame: &RgbImage,
        tl: (i32, i32),
        br: (i32, i32),
        white: bool,
    ) -> GrayImage {
        crop_thresh(frame, tl, br, white)
    }

    /// Read the number in a thresholded region.
    ///
    /// In training mode the region is diverted into sample collection and no
    /// value is returned.
    pub fn parse_digits(&mut self, img: &GrayImage) -> Result<Option<u32>, Error> {
        match self.mode {
            ReadMode::Recognize => Ok(self.digits.recognize(img, self.ocr)),
            ReadMode::Train => {
                self.digits.collect(img, self.ocr)?;
                Ok(None)
            }
        }
    }

    /// OCR the raw match title from a thresholded region.
    pub fn read_match_title(&self, img: &GrayImage) -> Result<String, Error> {
        let inverted = GrayImage::from_fn(img.width(), img.height(), |x, y| {
            Luma([255 - img.get_pixel(x, y)[0]])
        });
        Ok(self.ocr.read_line(&inverted)?.trim().to_string())
    }

    /// OCR the match title and resolve it to a canonical match key.
    /// An unresolvable title yields None; an OCR engine failure propagates.
    pub fn read_match_key(&self, img: &GrayImage) -> Result<Option<String>, Error> {
        let title = self.read_match_title(img)?;
        Ok(self.resolver.resolve(&title))
    }

    /// Match a region against candidate templates at the overlay scale.
    pub fn match_templates<'t>(
        &self,
        region: &GrayImage,
        candidates: &'t [(String, GrayImage)],
    ) -> Option<&'t str> {
        region::best_match(region, self.transform.scale, candidates)
    }

    /// Whether the pixel at `point` is saturated (an alliance color rather
    /// than gray chrome).
    pub fn is_saturated(&self, frame: &RgbImage, point: (i32, i32)) -> bool {
        saturation(frame, point) > SATURATION_THRESHOLD
    }
}

fn crop_thresh(frame: &RgbImage, tl: (i32, i32), br: (i32, i32), white: bool) -> GrayImage {
    // A slightly-off transform can map a region past the frame edge; clamp
    // both corners inside the frame so the view below cannot assert.
    let x0 = (tl.0.max(0) as u32).min(frame.width().saturating_sub(1));
    let y0 = (tl.1.max(0) as u32).min(frame.height().saturating_sub(1));
    let x1 = (br.0.max(0) as u32).min(frame.width()).max(x0 + 1);
    let y1 = (br.1.max(0) as u32).min(frame.height()).max(y0 + 1);
    let crop = frame.view(x0, y0, x1 - x0, y1 - y0).to_image();

    let scale = OCR_HEIGHT as f64 / crop.height() as f64;
    let width = ((crop.width() as f64 * scale).round() as u32).max(1);
    let scaled = resize(&crop, width, OCR_HEIGHT, FilterType::Triangle);

    let in_range = |p: &Rgb<u8>| {
        if white {
            p[0] >= WHITE_LOW[0] && p[1] >= WHITE_LOW[1] && p[2] >= WHITE_LOW[2]
        } else {
            p[0] <= BLACK_HIGH[0] && p[1] <= BLACK_HIGH[1] && p[2] <= BLACK_HIGH[2]
        }
    };
    let mask = GrayImage::from_fn(scaled.width(), scaled.height(), |x, y| {
        if in_range(scaled.get_pixel(x, y)) {
            Luma([255u8])
        } else {
            Luma([0u8])
        }
    });
    open(&mask, Norm::LInf, 1)
}

fn saturation(frame: &RgbImage, point: (i32, i32)) -> f64 {
    let x = (point.0.max(0) as u32).min(frame.width() - 1);
    let y = (point.1.max(0) as u32).min(frame.height() - 1);
    let p = frame.get_pixel(x, y);
    let max = p[0].max(p[1]).max(p[2]);
    let min = p[0].min(p[1]).min(p[2]);
    if max == 0 {
        return 0.0;
    }
    (max - min) as f64 / max as f64
}

/// Reads match state from broadcast frames.
///
/// One engine instance per video stream: the cached overlay transform is
/// per-instance mutable state and is not synchronized.
pub struct RecognitionEngine {
    locator: OverlayLocator,
    digits: DigitRecognizer,
    resolver: MatchKeyResolver,
    ocr: Box<dyn OcrEngine>,
}

impl RecognitionEngine {
    /// Build an engine from a season's overlay template and the external
    /// services. The training dataset is loaded from `store` (unless
    /// `append_training_data` is false) and the digit model trained from it,
    /// once, here.
    pub fn new(
        template: GrayImage,
        detector: Box<dyn FeatureDetector>,
        ocr: Box<dyn OcrEngine>,
        store: Box<dyn DatasetStore>,
        append_training_data: bool,
    ) -> Result<RecognitionEngine, Error> {
        Ok(RecognitionEngine {
            locator: OverlayLocator::new(template, detector),
            digits: DigitRecognizer::new(store, append_training_data)?,
            resolver: MatchKeyResolver::new(),
            ocr,
        })
    }

    /// Recognize one frame: locate the overlay and run `extractor` over it.
    ///
    /// # Errors
    /// * [Error::NoOverlayFound] / [Error::InvalidScale] from overlay
    ///   location; retry policy belongs to the caller.
    pub fn read<X: FrameFieldExtractor>(
        &mut self,
        extractor: &X,
        frame: &RgbImage,
        force_rediscover: bool,
    ) -> Result<X::Fields, Error> {
        self.process(extractor, frame, force_rediscover, ReadMode::Recognize)
    }

    /// Identical control flow to [read](Self::read), but digit recognition is
    /// diverted into training-sample collection and no result is returned.
    pub fn train<X: FrameFieldExtractor>(
        &mut self,
        extractor: &X,
        frame: &RgbImage,
        force_rediscover: bool,
    ) -> Result<(), Error> {
        self.process(extractor, frame, force_rediscover, ReadMode::Train)
            .map(|_| ())
    }

    fn process<X: FrameFieldExtractor>(
        &mut self,
        extractor: &X,
        frame: &RgbImage,
        force_rediscover: bool,
        mode: ReadMode,
    ) -> Result<X::Fields, Error> {
        let frame = resize(frame, FRAME_WIDTH, FRAME_HEIGHT, FilterType::Triangle);
        let gray = grayscale(&frame);
        let transform = self.locator.locate(&gray, force_rediscover)?;
        let mut fields = FieldReader {
            transform,
            digits: &mut self.digits,
            resolver: &self.resolver,
            ocr: self.ocr.as_ref(),
            mode,
        };
        extractor.extract(&mut fields, &frame)
    }

    /// True when the last processed frame rediscovered the overlay.
    pub fn is_new_overlay(&self) -> bool {
        self.locator.is_new_overlay()
    }

    /// The currently cached overlay transform, if any.
    pub fn transform(&self) -> Option<Transform> {
        self.locator.transform()
    }

    /// Bulk-export the training dataset.
    pub fn save_training_data<P: AsRef<Path>>(&self, path: P) -> Result<(), Error> {
        self.digits.export_dataset(path)
    }
}
