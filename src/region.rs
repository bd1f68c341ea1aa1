//! Template matching for small fixed sets of visual states.

use image::imageops::{resize, FilterType};
use image::GrayImage;
use imageproc::template_matching::{find_extremes, match_template, MatchTemplateMethod};
use log::debug;

/// Match `region` against candidate templates and return the best key.
///
/// Every candidate is scaled by the overlay transform `scale` before the
/// normalized cross-correlation. Candidates that do not fit inside the region
/// after scaling are skipped. Ties go to whichever candidate is listed first;
/// this is an arbitrary tie-break, not a guarantee that survives reordering.
pub fn best_match<'a>(
    region: &GrayImage,
    scale: f64,
    candidates: &'a [(String, GrayImage)],
) -> Option<&'a str> {
    let mut best_score = 0f32;
    let mut matched_key = None;
    for (key, template) in candidates {
        let width = (template.width() as f64 * scale).round() as u32;
        let height = (template.height() as f64 * scale).round() as u32;
        if width == 0 || height == 0 || width > region.width() || height > region.height() {
            debug!("candidate {} does not fit region, skipped", key);
            continue;
        }
        let scaled = resize(template, width, height, FilterType::Triangle);
        let result = match_template(
            region,
            &scaled,
            MatchTemplateMethod::CrossCorrelationNormalized,
        );
        let score = find_extremes(&result).max_value;
        if score > best_score {
            best_score = score;
            matched_key = Some(key.as_str());
        }
    }
    matched_key
}
