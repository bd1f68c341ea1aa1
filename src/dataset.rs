//! The persisted digit training dataset and its storage abstraction.

use crate::error::Error;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// One labeled training sample: a structural feature vector and the digit it
/// was OCR'd as.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Sample {
    pub features: Vec<f32>,
    pub label: u32,
}

/// Append-only collection of training samples.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TrainingDataset {
    pub samples: Vec<Sample>,
}

impl TrainingDataset {
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn push(&mut self, features: Vec<f32>, label: u32) {
        self.samples.push(Sample { features, label });
    }

    /// Bulk export to a JSON file.
    pub fn export_to<P: AsRef<Path>>(&self, path: P) -> Result<(), Error> {
        fs::write(path, serde_json::to_vec(self)?)?;
        Ok(())
    }
}

/// Repository for the training dataset, so the backing store is swappable
/// without touching recognition logic.
pub trait DatasetStore {
    fn load(&self) -> Result<TrainingDataset, Error>;
    fn flush(&self, dataset: &TrainingDataset) -> Result<(), Error>;
}

/// Stores the dataset as a JSON file. A missing file loads as an empty
/// dataset.
pub struct JsonDatasetStore {
    path: PathBuf,
}

impl JsonDatasetStore {
    pub fn new<P: Into<PathBuf>>(path: P) -> JsonDatasetStore {
        JsonDatasetStore { path: path.into() }
    }
}

impl DatasetStore for JsonDatasetStore {
    fn load(&self) -> Result<TrainingDataset, Error> {
        if !self.path.exists() {
            return Ok(TrainingDataset::default());
        }
        let bytes = fs::read(&self.path)?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    fn flush(&self, dataset: &TrainingDataset) -> Result<(), Error> {
        fs::write(&self.path, serde_json::to_vec(dataset)?)?;
        Ok(())
    }
}
