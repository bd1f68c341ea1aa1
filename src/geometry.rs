//! Robust similarity estimation from matched point pairs.

use crate::transform::Transform;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// A matched point pair: (template point, frame point).
pub type PointPair = ((f32, f32), (f32, f32));

const RANSAC_ITERATIONS: usize = 100;
/// Squared reprojection distance for a pair to count as an inlier (3 px).
const INLIER_SQ_DIST: f64 = 9.0;

/// Full similarity: x' = a*x - b*y + tx, y' = b*x + a*y + ty.
#[derive(Debug, Clone, Copy)]
struct Similarity {
    a: f64,
    b: f64,
    tx: f64,
    ty: f64,
}

impl Similarity {
    fn apply(&self, p: (f32, f32)) -> (f64, f64) {
        let (x, y) = (p.0 as f64, p.1 as f64);
        (
            self.a * x - self.b * y + self.tx,
            self.b * x + self.a * y + self.ty,
        )
    }

    fn sq_error(&self, pair: &PointPair) -> f64 {
        let (px, py) = self.apply(pair.0);
        let dx = px - pair.1 .0 as f64;
        let dy = py - pair.1 .1 as f64;
        dx * dx + dy * dy
    }
}

/// Closed-form least-squares similarity fit over all pairs.
/// Returns None when the template points are (nearly) coincident.
fn fit(pairs: &[PointPair]) -> Option<Similarity> {
    let n = pairs.len() as f64;
    if pairs.len() < 2 {
        return None;
    }
    let (mut sx, mut sy, mut sxp, mut syp) = (0f64, 0f64, 0f64, 0f64);
    let (mut snorm, mut dot, mut cross) = (0f64, 0f64, 0f64);
    for &((x, y), (xp, yp)) in pairs {
        let (x, y, xp, yp) = (x as f64, y as f64, xp as f64, yp as f64);
        sx += x;
        sy += y;
        sxp += xp;
        syp += yp;
        snorm += x * x + y * y;
        dot += x * xp + y * yp;
        cross += x * yp - y * xp;
    }
    let den = snorm - (sx * sx + sy * sy) / n;
    if den.abs() < f64::EPSILON {
        return None;
    }
    let a = (dot - (sx * sxp + sy * syp) / n) / den;
    let b = (cross - (sx * syp - sy * sxp) / n) / den;
    let tx = (sxp - a * sx + b * sy) / n;
    let ty = (syp - b * sx - a * sy) / n;
    Some(Similarity { a, b, tx, ty })
}

/// Estimate a similarity transform from matched pairs, tolerating outliers.
///
/// RANSAC over minimal two-pair samples, then a least-squares refit over the
/// best inlier set. The returned `scale` is the cosine component of the
/// similarity; overlay rotation is expected to be negligible. The sampler is
/// seeded so rediscovery is deterministic from frame to frame.
pub fn estimate_similarity(pairs: &[PointPair]) -> Option<Transform> {
    if pairs.len() < 2 {
        return None;
    }
    let best = if pairs.len() == 2 {
        fit(pairs)?
    } else {
        let mut rng = StdRng::seed_from_u64(0x5ca1e);
        let mut best: Option<(usize, Similarity)> = None;
        for _ in 0..RANSAC_ITERATIONS {
            let i = rng.gen_range(0..pairs.len());
            let mut j = rng.gen_range(0..pairs.len() - 1);
            if j >= i {
                j += 1;
            }
            let model = match fit(&[pairs[i], pairs[j]]) {
                Some(model) => model,
                None => continue,
            };
            let inliers = pairs
                .iter()
                .filter(|p| model.sq_error(p) < INLIER_SQ_DIST)
                .count();
            if best.map_or(true, |(n, _)| inliers > n) {
                best = Some((inliers, model));
            }
        }
        let (_, model) = best?;
        let inliers: Vec<PointPair> = pairs
            .iter()
            .filter(|p| model.sq_error(p) < INLIER_SQ_DIST)
            .cloned()
            .collect();
        fit(&inliers).unwrap_or(model)
    };
    Some(Transform {
        scale: best.a,
        tx: best.tx,
        ty: best.ty,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn apply(scale: f64, tx: f64, ty: f64, p: (f32, f32)) -> (f32, f32) {
        (
            (p.0 as f64 * scale + tx) as f32,
            (p.1 as f64 * scale + ty) as f32,
        )
    }

    #[test]
    fn test_exact_fit() {
        let src = [(0.0, 0.0), (10.0, 0.0), (10.0, 5.0), (0.0, 5.0)];
        let pairs: Vec<PointPair> = src
            .iter()
            .map(|&p| (p, apply(1.5, 20.0, -7.0, p)))
            .collect();
        let t = estimate_similarity(&pairs).unwrap();
        assert!((t.scale - 1.5).abs() < 1e-6);
        assert!((t.tx - 20.0).abs() < 1e-4);
        assert!((t.ty + 7.0).abs() < 1e-4);
    }

    #[test]
    fn test_tolerates_outliers() {
        let mut pairs: Vec<PointPair> = (0..12)
            .map(|i| {
                let p = (i as f32 * 7.0, (i % 4) as f32 * 11.0);
                (p, apply(2.0, 5.0, 3.0, p))
            })
            .collect();
        // two gross outliers
        pairs.push(((1.0, 1.0), (500.0, 500.0)));
        pairs.push(((2.0, 2.0), (-300.0, 40.0)));
        let t = estimate_similarity(&pairs).unwrap();
        assert!((t.scale - 2.0).abs() < 1e-3);
        assert!((t.tx - 5.0).abs() < 1e-2);
        assert!((t.ty - 3.0).abs() < 1e-2);
    }

    #[test]
    fn test_degenerate_template_points() {
        let pairs = [((3.0, 3.0), (1.0, 1.0)), ((3.0, 3.0), (2.0, 2.0))];
        assert!(estimate_similarity(&pairs).is_none());
    }

    #[test]
    fn test_collapsed_frame_points_give_zero_scale() {
        let pairs: Vec<PointPair> = (0..10)
            .map(|i| ((i as f32 * 5.0, i as f32 * 3.0), (100.0, 50.0)))
            .collect();
        let t = estimate_similarity(&pairs).unwrap();
        assert!(t.scale.abs() < 1e-9);
    }
}
