//! Nearest-neighbor digit classifier.

use crate::dataset::TrainingDataset;

/// A k-nearest-neighbor model over the training dataset.
///
/// Trained once from a dataset snapshot and immutable afterwards; samples
/// appended later are only picked up by training a new model.
pub struct KnnClassifier {
    samples: Vec<(Vec<f32>, u32)>,
}

impl KnnClassifier {
    /// Snapshot `dataset` into a ready-to-query model.
    pub fn train(dataset: &TrainingDataset) -> KnnClassifier {
        KnnClassifier {
            samples: dataset
                .samples
                .iter()
                .map(|s| (s.features.clone(), s.label))
                .collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Classify a feature vector by majority vote over the `k` nearest
    /// samples; vote ties go to the label with the smallest summed distance.
    /// Returns None when the model is empty.
    pub fn classify(&self, features: &[f32], k: usize) -> Option<u32> {
        if self.samples.is_empty() || k == 0 {
            return None;
        }
        let mut neighbors: Vec<(f32, u32)> = self
            .samples
            .iter()
            .map(|(sample, label)| (sq_distance(sample, features), *label))
            .collect();
        neighbors.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal));
        neighbors.truncate(k);

        let mut votes: Vec<(u32, usize, f32)> = Vec::new(); // label, count, summed distance
        for &(dist, label) in &neighbors {
            match votes.iter_mut().find(|v| v.0 == label) {
                Some(v) => {
                    v.1 += 1;
                    v.2 += dist;
                }
                None => votes.push((label, 1, dist)),
            }
        }
        votes
            .into_iter()
            .max_by(|a, b| {
                a.1.cmp(&b.1).then(
                    b.2.partial_cmp(&a.2)
                        .unwrap_or(std::cmp::Ordering::Equal),
                )
            })
            .map(|(label, _, _)| label)
    }
}

fn sq_distance(a: &[f32], b: &[f32]) -> f32 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| (x - y) * (x - y))
        .sum()
}
