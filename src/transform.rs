/// Similarity mapping from template space to frame space.
///
/// `scale` is the cosine component of the estimated similarity (the original
/// rotation is assumed to be negligible for a broadcast overlay). A transform
/// with `scale == 0` is never cached; see [Error::InvalidScale](crate::Error).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transform {
    pub scale: f64,
    pub tx: f64,
    pub ty: f64,
}

impl Transform {
    /// Map a template-space point to frame coordinates, rounded to pixels.
    pub fn transform_point(&self, point: (f64, f64)) -> (i32, i32) {
        (
            (point.0 * self.scale + self.tx).round() as i32,
            (point.1 * self.scale + self.ty).round() as i32,
        )
    }
}
