//! Contract for the external keypoint detector and descriptor matcher.
//!
//! The reference deployment uses an ORB detector with a FLANN-based matcher.
//! The core only needs keypoint positions, one binary descriptor per keypoint,
//! and k-nearest-neighbor matching between two descriptor sets, so those are
//! the whole contract.

use image::GrayImage;

/// A detected keypoint position in image coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct KeyPoint {
    pub x: f32,
    pub y: f32,
}

/// Keypoints with their descriptors, one descriptor row per keypoint.
#[derive(Debug, Clone, Default)]
pub struct Features {
    pub keypoints: Vec<KeyPoint>,
    pub descriptors: Vec<Vec<u8>>,
}

/// A correspondence between a query descriptor and a train descriptor.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DescriptorMatch {
    pub query_index: usize,
    pub train_index: usize,
    pub distance: f32,
}

/// External feature detection and matching service.
///
/// Calls are blocking and have no built-in timeout; callers needing bounded
/// latency must impose it around the frame-processing call.
pub trait FeatureDetector {
    /// Detect keypoints and compute their descriptors.
    fn detect_and_compute(&self, img: &GrayImage) -> Features;

    /// For every query descriptor return up to `k` nearest train descriptors,
    /// best first. Rows with fewer than `k` candidates are allowed.
    fn knn_match(
        &self,
        query: &[Vec<u8>],
        train: &[Vec<u8>],
        k: usize,
    ) -> Vec<Vec<DescriptorMatch>>;
}
