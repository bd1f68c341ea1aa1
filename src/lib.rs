//! A library that reads match state from the score overlay in FRC broadcast
//! video frames.
//!
//! The core pipeline locates the score overlay in each frame with sparse
//! feature matching, tracks it with a cached similarity transform, reads the
//! numbers painted on it with a trainable digit classifier, and resolves the
//! OCR'd match title to a canonical match key.
//!
//! Which pixel regions hold which fields changes every season, so field
//! extraction is a capability the caller implements:
//!
//! ```no_run
//! # use frc_livescore::{
//! #     Error, FieldReader, FrameFieldExtractor, JsonDatasetStore, RecognitionEngine,
//! # };
//! # use image::RgbImage;
//! # fn detector() -> Box<dyn frc_livescore::FeatureDetector> { unimplemented!() }
//! # fn ocr() -> Box<dyn frc_livescore::OcrEngine> { unimplemented!() }
//! struct Season2022;
//!
//! impl FrameFieldExtractor for Season2022 {
//!     type Fields = (Option<u32>, Option<u32>);
//!
//!     fn extract(&self, fields: &mut FieldReader, frame: &RgbImage)
//!         -> Result<Self::Fields, Error>
//!     {
//!         let tl = fields.transform_point((316.0, 77.0));
//!         let br = fields.transform_point((496.0, 129.0));
//!         let red = fields.parse_digits(&fields.crop_thresh(frame, tl, br, true))?;
//!         let tl = fields.transform_point((784.0, 77.0));
//!         let br = fields.transform_point((964.0, 129.0));
//!         let blue = fields.parse_digits(&fields.crop_thresh(frame, tl, br, true))?;
//!         Ok((red, blue))
//!     }
//! }
//!
//! let template = image::open("templates/score_overlay_2022.png")?.into_luma8();
//! let store = Box::new(JsonDatasetStore::new("training_data/digits.json"));
//! let mut engine = RecognitionEngine::new(template, detector(), ocr(), store, true)?;
//! let frame: RgbImage = image::open("frame.png")?.into_rgb8();
//! let (red, blue) = engine.read(&Season2022, &frame, false)?;
//! # Ok::<(), anyhow::Error>(())
//! ```
//!
//! The feature detector/matcher and the OCR engine are external services
//! behind the [FeatureDetector] and [OcrEngine] traits; the reference
//! deployment uses ORB with a FLANN matcher, and Tesseract.

mod classifier;
mod dataset;
mod digits;
mod engine;
mod error;
mod features;
mod geometry;
mod locator;
mod matchkey;
mod ocr;
mod region;
mod transform;

pub use classifier::KnnClassifier;
pub use dataset::{DatasetStore, JsonDatasetStore, Sample, TrainingDataset};
pub use digits::{DigitRecognizer, OCR_HEIGHT};
pub use engine::{FieldReader, FrameFieldExtractor, RecognitionEngine};
pub use error::Error;
pub use features::{DescriptorMatch, FeatureDetector, Features, KeyPoint};
pub use geometry::estimate_similarity;
pub use locator::OverlayLocator;
pub use matchkey::MatchKeyResolver;
pub use ocr::{OcrEngine, OcrError};
pub use region::best_match;
pub use transform::Transform;
