use crate::error::{AppError, Result};
use serde::{Deserialize, Serialize};
use std::ops::RangeInclusive;

pub const TOP_K_RANGE: RangeInclusive<usize> = 1..=5;
pub const THRESHOLD_RANGE: RangeInclusive<f32> = 0.0..=1.0;

#[derive(Debug, Serialize, Clone)]
pub struct ModelStatus {
    pub downloaded: bool,
    pub loading: bool,
    pub ready: bool,
    pub error: Option<String>,
}

#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct Prediction {
    pub class_name: String,
    pub confidence: f32,
}

/// The sidebar controls that shape a classification request.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Controls {
    pub top_k: usize,
    pub threshold: f32,
    pub center_crop: bool,
}

impl Default for Controls {
    fn default() -> Self {
        Self {
            top_k: 3,
            threshold: 0.05,
            center_crop: true,
        }
    }
}

impl Controls {
    pub fn validate(&self) -> Result<()> {
        if !TOP_K_RANGE.contains(&self.top_k) {
            return Err(AppError::InvalidControls(format!(
                "top_k must be between {} and {}, got {}",
                TOP_K_RANGE.start(),
                TOP_K_RANGE.end(),
                self.top_k
            )));
        }
        if !THRESHOLD_RANGE.contains(&self.threshold) {
            return Err(AppError::InvalidControls(format!(
                "threshold must be between 0.0 and 1.0, got {}",
                self.threshold
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Serialize, Clone)]
pub struct ClassifyOutcome {
    pub predictions: Vec<Prediction>,
    pub vocabulary_size: usize,
    pub source: String,
}
