//! End-to-end engine tests with doubled external services: a fixed-keypoint
//! feature detector and a canned OCR engine.

use anyhow::Result;
use frc_livescore::{
    DatasetStore, DescriptorMatch, Error, FeatureDetector, FieldReader, Features,
    FrameFieldExtractor, JsonDatasetStore, KeyPoint, OcrEngine, OcrError, RecognitionEngine,
};
use image::{GrayImage, Luma, Rgb, RgbImage};

/// Detector double: the same keypoint grid on the template and the frame, so
/// the overlay is found at identity scale and offset.
struct FixedDetector;

impl FixedDetector {
    fn points() -> Vec<KeyPoint> {
        (0..12)
            .map(|i| KeyPoint {
                x: (i % 4) as f32 * 20.0 + 3.0,
                y: (i / 4) as f32 * 15.0 + 2.0,
            })
            .collect()
    }
}

impl FeatureDetector for FixedDetector {
    fn detect_and_compute(&self, _img: &GrayImage) -> Features {
        let keypoints = Self::points();
        let descriptors = (0..keypoints.len()).map(|i| vec![i as u8]).collect();
        Features {
            keypoints,
            descriptors,
        }
    }

    fn knn_match(
        &self,
        query: &[Vec<u8>],
        train: &[Vec<u8>],
        _k: usize,
    ) -> Vec<Vec<DescriptorMatch>> {
        (0..query.len().min(train.len()))
            .map(|i| {
                vec![
                    DescriptorMatch {
                        query_index: i,
                        train_index: i,
                        distance: 5.0,
                    },
                    DescriptorMatch {
                        query_index: i,
                        train_index: (i + 1) % train.len(),
                        distance: 80.0,
                    },
                ]
            })
            .collect()
    }
}

struct CannedOcr {
    title: &'static str,
    digits: &'static str,
}

impl OcrEngine for CannedOcr {
    fn read_line(&self, _img: &GrayImage) -> Result<String, OcrError> {
        Ok(self.title.to_string())
    }
    fn read_digits(&self, _img: &GrayImage) -> Result<String, OcrError> {
        Ok(self.digits.to_string())
    }
}

#[derive(Debug, PartialEq)]
struct MatchState {
    score: Option<u32>,
    match_key: Option<String>,
    red_alliance: bool,
}

/// A minimal season hook: one score field, the title line, one color probe.
struct TestSeason;

impl FrameFieldExtractor for TestSeason {
    type Fields = MatchState;

    fn extract(&self, fields: &mut FieldReader, frame: &RgbImage) -> Result<MatchState, Error> {
        let tl = fields.transform_point((400.0, 20.0));
        let br = fields.transform_point((600.0, 60.0));
        let region = fields.crop_thresh(frame, tl, br, true);
        let score = fields.parse_digits(&region)?;

        let title_region = fields.crop_thresh(frame, (100, 80), (500, 110), false);
        let match_key = fields.read_match_key(&title_region)?;

        let red_alliance = fields.is_saturated(frame, (50, 50));
        Ok(MatchState {
            score,
            match_key,
            red_alliance,
        })
    }
}

fn overlay_template() -> GrayImage {
    GrayImage::from_fn(100, 60, |x, y| {
        if (x / 5 + y / 5) % 2 == 0 {
            Luma([255u8])
        } else {
            Luma([40u8])
        }
    })
}

/// A frame with a saturated red patch and a wide white "score" blob that
/// forces the digit pipeline onto the OCR fallback.
fn test_frame() -> RgbImage {
    let mut frame = RgbImage::from_pixel(1280, 720, Rgb([20, 20, 20]));
    for y in 40..70 {
        for x in 50..150 {
            frame.put_pixel(x + 400, y - 20, Rgb([240, 240, 240]));
        }
    }
    for y in 40..60 {
        for x in 40..60 {
            frame.put_pixel(x, y, Rgb([200, 30, 30]));
        }
    }
    frame
}

fn engine(dir: &std::path::Path, ocr: CannedOcr) -> Result<RecognitionEngine> {
    let _ = env_logger::builder().is_test(true).try_init();
    let store = Box::new(JsonDatasetStore::new(dir.join("digits.json")));
    Ok(RecognitionEngine::new(
        overlay_template(),
        Box::new(FixedDetector),
        Box::new(ocr),
        store,
        true,
    )?)
}

#[test]
fn test_read_extracts_fields() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let mut engine = engine(
        dir.path(),
        CannedOcr {
            title: "Qualification 12 of 100",
            digits: "42",
        },
    )?;
    let state = engine.read(&TestSeason, &test_frame(), false)?;
    assert_eq!(
        state,
        MatchState {
            score: Some(42),
            match_key: Some("qm12".to_string()),
            red_alliance: true,
        }
    );
    assert!(engine.is_new_overlay());
    let t = engine.transform().unwrap();
    assert!((t.scale - 1.0).abs() < 1e-6);
    Ok(())
}

#[test]
fn test_train_collects_instead_of_reading() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let mut engine = engine(
        dir.path(),
        CannedOcr {
            title: "Quarterfinal 3",
            digits: "7",
        },
    )?;
    // Narrow blob so the glyph stays inside the per-glyph model's range.
    let mut frame = RgbImage::from_pixel(1280, 720, Rgb([20, 20, 20]));
    for y in 40..70 {
        for x in 470..485 {
            frame.put_pixel(x, y, Rgb([240, 240, 240]));
        }
    }
    engine.train(&TestSeason, &frame, false)?;

    let export = dir.path().join("export.json");
    engine.save_training_data(&export)?;
    let exported = JsonDatasetStore::new(export).load()?;
    assert_eq!(exported.len(), 1);
    assert_eq!(exported.samples[0].label, 7);

    // The flushed store holds the same sample.
    let store = JsonDatasetStore::new(dir.path().join("digits.json"));
    assert_eq!(store.load()?.len(), 1);
    Ok(())
}

/// A season hook whose score crop lies past the right frame edge, as happens
/// when a slightly-off transform maps a region out of frame.
struct OffFrameSeason;

impl FrameFieldExtractor for OffFrameSeason {
    type Fields = Option<u32>;

    fn extract(&self, fields: &mut FieldReader, frame: &RgbImage) -> Result<Option<u32>, Error> {
        let region = fields.crop_thresh(frame, (1500, 10), (1600, 50), true);
        fields.parse_digits(&region)
    }
}

#[test]
fn test_out_of_frame_region_reads_empty() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let mut engine = engine(
        dir.path(),
        CannedOcr {
            title: "",
            digits: "",
        },
    )?;
    let score = engine.read(&OffFrameSeason, &test_frame(), false)?;
    assert_eq!(score, None);
    Ok(())
}

#[test]
fn test_unmatched_title_yields_no_key() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let mut engine = engine(
        dir.path(),
        CannedOcr {
            title: "Awards Ceremony",
            digits: "",
        },
    )?;
    let state = engine.read(&TestSeason, &test_frame(), false)?;
    assert_eq!(state.match_key, None);
    Ok(())
}
