use crate::error::Error;
use crate::features::{DescriptorMatch, FeatureDetector, Features};
use crate::geometry::{estimate_similarity, PointPair};
use crate::transform::Transform;
use image::imageops::{resize, FilterType};
use image::{GenericImageView, GrayImage};
use imageproc::template_matching::{find_extremes, match_template, MatchTemplateMethod};
use log::debug;

/// Lowe's ratio test threshold for keypoint correspondences.
const RATIO_TEST: f32 = 0.75;
/// Minimum good correspondences required to accept a rediscovery.
const MIN_MATCH_COUNT: usize = 9;
/// Normalized cross-correlation score above which the cached transform is
/// kept without re-running feature extraction. Empirical.
const REUSE_THRESHOLD: f32 = 0.8;

/// Locates the score overlay in a frame and tracks its transform.
///
/// Holds the reference overlay template with its precomputed features, and a
/// cached [Transform] reused while the overlay has not moved. One locator per
/// video stream; the cache must not be shared across threads.
pub struct OverlayLocator {
    detector: Box<dyn FeatureDetector>,
    template: GrayImage,
    template_features: Features,
    transform: Option<Transform>,
    new_overlay: bool,
}

impl OverlayLocator {
    /// Create a locator for a reference overlay template. The template
    /// features are extracted once, here.
    pub fn new(template: GrayImage, detector: Box<dyn FeatureDetector>) -> OverlayLocator {
        let template_features = detector.detect_and_compute(&template);
        OverlayLocator {
            detector,
            template,
            template_features,
            transform: None,
            new_overlay: false,
        }
    }

    /// Load the overlay template from an image file.
    pub fn from_file(
        path: &str,
        detector: Box<dyn FeatureDetector>,
    ) -> Result<OverlayLocator, Error> {
        let template = image::open(path)
            .map_err(|source| Error::ImageError {
                path: path.to_string(),
                source,
            })?
            .into_luma8();
        Ok(OverlayLocator::new(template, detector))
    }

    /// The currently cached transform, if any.
    pub fn transform(&self) -> Option<Transform> {
        self.transform
    }

    /// True when the last `locate` call rediscovered the overlay instead of
    /// reusing the cached transform.
    pub fn is_new_overlay(&self) -> bool {
        self.new_overlay
    }

    /// Map a template-space point to frame coordinates.
    /// Returns None when no transform is cached.
    pub fn transform_point(&self, point: (f64, f64)) -> Option<(i32, i32)> {
        self.transform.map(|t| t.transform_point(point))
    }

    /// Locate the overlay in `frame`.
    ///
    /// Reuses the cached transform when the overlay still correlates at its
    /// last-known position; otherwise rediscovers it from keypoint matches.
    ///
    /// # Errors
    /// * [Error::NoOverlayFound] when too few correspondences survive the
    ///   ratio test. The cache is cleared.
    /// * [Error::InvalidScale] when the estimated transform has zero scale.
    ///   Nothing is cached.
    pub fn locate(&mut self, frame: &GrayImage, force_rediscover: bool) -> Result<Transform, Error> {
        if !force_rediscover {
            if let Some(transform) = self.transform {
                if self.overlay_still_there(frame, &transform) {
                    self.new_overlay = false;
                    return Ok(transform);
                }
            }
        }
        self.rediscover(frame)
    }

    /// Fast path: correlate the template against the overlay's last-known
    /// bounding box.
    fn overlay_still_there(&self, frame: &GrayImage, transform: &Transform) -> bool {
        let (tw, th) = (self.template.width() as f64, self.template.height() as f64);
        let x0 = transform.tx.max(0.0) as u32;
        let y0 = transform.ty.max(0.0) as u32;
        let x1 = ((transform.tx + tw * transform.scale) as u32).min(frame.width().saturating_sub(1));
        let y1 = ((transform.ty + th * transform.scale) as u32).min(frame.height().saturating_sub(1));
        if x1 <= x0 || y1 <= y0 {
            return false;
        }
        let overlay = frame.view(x0, y0, x1 - x0, y1 - y0).to_image();
        let scaled = resize(
            &self.template,
            overlay.width(),
            overlay.height(),
            FilterType::Triangle,
        );
        let result = match_template(
            &overlay,
            &scaled,
            MatchTemplateMethod::CrossCorrelationNormalized,
        );
        let score = find_extremes(&result).max_value;
        debug!("overlay reuse score {}", score);
        score > REUSE_THRESHOLD
    }

    fn rediscover(&mut self, frame: &GrayImage) -> Result<Transform, Error> {
        let frame_features = self.detector.detect_and_compute(frame);
        let matches = self.detector.knn_match(
            &self.template_features.descriptors,
            &frame_features.descriptors,
            2,
        );

        // Keep the good matches as per Lowe's ratio test.
        let good: Vec<DescriptorMatch> = matches
            .iter()
            .filter_map(|pair| match pair.as_slice() {
                [best, second] if best.distance < RATIO_TEST * second.distance => Some(*best),
                _ => None,
            })
            .collect();

        if good.len() < MIN_MATCH_COUNT {
            self.transform = None;
            self.new_overlay = false;
            return Err(Error::NoOverlayFound {
                found: good.len(),
                required: MIN_MATCH_COUNT,
            });
        }

        let pairs: Vec<PointPair> = good
            .iter()
            .map(|m| {
                let src = self.template_features.keypoints[m.query_index];
                let dst = frame_features.keypoints[m.train_index];
                ((src.x, src.y), (dst.x, dst.y))
            })
            .collect();

        match estimate_similarity(&pairs) {
            Some(transform) if transform.scale == 0.0 => Err(Error::InvalidScale),
            Some(transform) => {
                debug!(
                    "overlay rediscovered: scale {} tx {} ty {}",
                    transform.scale, transform.tx, transform.ty
                );
                self.transform = Some(transform);
                self.new_overlay = true;
                Ok(transform)
            }
            None => {
                self.transform = None;
                self.new_overlay = false;
                Err(Error::NoOverlayFound {
                    found: good.len(),
                    required: MIN_MATCH_COUNT,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::KeyPoint;
    use image::Luma;
    use std::cell::Cell;
    use std::rc::Rc;

    /// Detector double: fixed keypoints, descriptor row i matched to train
    /// row i with a comfortable ratio-test margin.
    struct MockDetector {
        template_points: Vec<KeyPoint>,
        frame_points: Vec<KeyPoint>,
        detect_calls: Rc<Cell<usize>>,
    }

    impl MockDetector {
        fn features(points: &[KeyPoint]) -> Features {
            Features {
                keypoints: points.to_vec(),
                descriptors: (0..points.len()).map(|i| vec![i as u8]).collect(),
            }
        }
    }

    impl FeatureDetector for MockDetector {
        fn detect_and_compute(&self, img: &GrayImage) -> Features {
            self.detect_calls.set(self.detect_calls.get() + 1);
            if img.width() < 700 {
                Self::features(&self.template_points)
            } else {
                Self::features(&self.frame_points)
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
                            distance: 10.0,
                        },
                        DescriptorMatch {
                            query_index: i,
                            train_index: (i + 1) % train.len(),
                            distance: 100.0,
                        },
                    ]
                })
                .collect()
        }
    }

    fn checkerboard(width: u32, height: u32) -> GrayImage {
        GrayImage::from_fn(width, height, |x, y| {
            if (x / 8 + y / 8) % 2 == 0 {
                Luma([255u8])
            } else {
                Luma([0u8])
            }
        })
    }

    fn spread_points(n: usize) -> Vec<KeyPoint> {
        (0..n)
            .map(|i| KeyPoint {
                x: (i % 4) as f32 * 15.0 + 2.0,
                y: (i / 4) as f32 * 12.0 + 3.0,
            })
            .collect()
    }

    fn test_frame(template: &GrayImage) -> GrayImage {
        let mut frame = GrayImage::new(1280, 720);
        for (x, y, p) in template.enumerate_pixels() {
            frame.put_pixel(x, y, *p);
        }
        frame
    }

    #[test]
    fn test_cache_reuse_skips_feature_extraction() {
        let template = checkerboard(64, 48);
        let frame = test_frame(&template);
        let calls = Rc::new(Cell::new(0));
        let points = spread_points(12);
        let mut locator = OverlayLocator::new(
            template,
            Box::new(MockDetector {
                template_points: points.clone(),
                frame_points: points,
                detect_calls: Rc::clone(&calls),
            }),
        );
        assert_eq!(calls.get(), 1); // template features

        let t = locator.locate(&frame, false).unwrap();
        assert_eq!(calls.get(), 2);
        assert!(locator.is_new_overlay());
        assert!((t.scale - 1.0).abs() < 1e-6);
        assert!(t.tx.abs() < 1e-3 && t.ty.abs() < 1e-3);

        // Overlay has not moved: second call must not re-extract features.
        let t2 = locator.locate(&frame, false).unwrap();
        assert_eq!(calls.get(), 2);
        assert!(!locator.is_new_overlay());
        assert_eq!(t, t2);

        // Forcing rediscovery bypasses the fast path.
        locator.locate(&frame, true).unwrap();
        assert_eq!(calls.get(), 3);
    }

    #[test]
    fn test_too_few_matches_clears_cache() {
        let template = checkerboard(64, 48);
        let frame = test_frame(&template);
        let calls = Rc::new(Cell::new(0));
        let points = spread_points(12);
        let mut locator = OverlayLocator::new(
            template.clone(),
            Box::new(MockDetector {
                template_points: points.clone(),
                frame_points: points.clone(),
                detect_calls: Rc::clone(&calls),
            }),
        );
        locator.locate(&frame, false).unwrap();
        assert!(locator.transform().is_some());

        // Swap in a detector that only produces 4 frame keypoints.
        locator.detector = Box::new(MockDetector {
            template_points: points,
            frame_points: spread_points(4),
            detect_calls: calls,
        });
        match locator.locate(&frame, true) {
            Err(Error::NoOverlayFound { found, required }) => {
                assert_eq!(found, 4);
                assert_eq!(required, 9);
            }
            other => panic!("expected NoOverlayFound, got {:?}", other.map(|_| ())),
        }
        assert!(locator.transform().is_none());
    }

    #[test]
    fn test_zero_sized_frame_with_cached_transform() {
        let template = checkerboard(64, 48);
        let frame = test_frame(&template);
        let calls = Rc::new(Cell::new(0));
        let points = spread_points(12);
        let mut locator = OverlayLocator::new(
            template,
            Box::new(MockDetector {
                template_points: points.clone(),
                frame_points: points,
                detect_calls: Rc::clone(&calls),
            }),
        );
        locator.locate(&frame, false).unwrap();
        // An empty frame cannot take the fast path; it must fall through to
        // rediscovery instead of slicing an empty view.
        let empty = GrayImage::new(0, 0);
        locator.locate(&empty, false).unwrap();
        assert_eq!(calls.get(), 3);
    }

    #[test]
    fn test_collapsed_matches_are_invalid_scale() {
        let template = checkerboard(64, 48);
        let frame = test_frame(&template);
        // All frame keypoints collapse onto one pixel: degenerate estimate.
        let collapsed: Vec<KeyPoint> = (0..12).map(|_| KeyPoint { x: 100.0, y: 50.0 }).collect();
        let mut locator = OverlayLocator::new(
            template,
            Box::new(MockDetector {
                template_points: spread_points(12),
                frame_points: collapsed,
                detect_calls: Rc::new(Cell::new(0)),
            }),
        );
        match locator.locate(&frame, false) {
            Err(Error::InvalidScale) => {}
            other => panic!("expected InvalidScale, got {:?}", other.map(|_| ())),
        }
        assert!(locator.transform().is_none());
    }
}
