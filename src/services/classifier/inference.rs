use crate::config::{InputLayout, ModelSettings};
use crate::error::{AppError, Result};
use crate::models::classify_types::Prediction;
use crate::services::classifier::preprocess::Normalization;
use crate::services::classifier::ranking;
use ndarray::Array4;
use ort::session::Session;
use ort::value::Value;
use std::sync::Mutex;
use std::time::Instant;

/// A loaded network plus its label vocabulary.
///
/// ONNX Runtime needs `&mut Session` per run, so runs are serialized by the mutex.
pub struct Classifier {
    session: Mutex<Session>,
    labels: Vec<String>,
    layout: InputLayout,
    normalization: Normalization,
    apply_softmax: bool,
}

impl Classifier {
    pub fn new(session: Session, labels: Vec<String>, settings: &ModelSettings) -> Self {
        Self {
            session: Mutex::new(session),
            labels,
            layout: settings.input_layout,
            normalization: Normalization {
                mean: settings.mean,
                std: settings.std,
            },
            apply_softmax: settings.apply_softmax,
        }
    }

    pub fn normalization(&self) -> &Normalization {
        &self.normalization
    }

    pub fn vocabulary_size(&self) -> usize {
        self.labels.len()
    }

    /// Forward pass over an NHWC tensor; returns the whole vocabulary ranked.
    pub fn classify(&self, input: Array4<f32>) -> Result<Vec<Prediction>> {
        let start = Instant::now();
        let input = to_input_layout(input, self.layout);

        let outputs = {
            let mut session = self.session.lock()?;
            run_inference_with_model(&mut session, input)?
        };

        let probabilities = if self.apply_softmax {
            ranking::softmax(&outputs)
        } else {
            outputs
        };
        let ranked = ranking::rank(&probabilities, &self.labels);

        log::debug!(
            "Inference over {} classes took {:.1}ms",
            ranked.len(),
            start.elapsed().as_secs_f64() * 1000.0
        );
        Ok(ranked)
    }
}

/// Runs the session on a single input and returns its first output, flattened.
/// Rearranges an NHWC tensor into the axis order the graph expects.
pub fn to_input_layout(input: Array4<f32>, layout: InputLayout) -> Array4<f32> {
    match layout {
        InputLayout::Nhwc => input,
        InputLayout::Nchw => input
            .permuted_axes([0, 3, 1, 2])
            .as_standard_layout()
            .into_owned(),
    }
}

fn run_inference_with_model(model: &mut Session, input: Array4<f32>) -> Result<Vec<f32>> {
    let input_name = model.inputs()[0].name().to_string();

    let input_tensor = Value::from_array(input)
        .map_err(|e| AppError::Model(format!("Failed to create tensor value: {}", e)))?;

    let outputs = model
        .run(ort::inputs![input_name.as_str() => input_tensor])
        .map_err(|e| AppError::Model(format!("Inference failed: {}", e)))?;

    let output_value = outputs
        .values()
        .next()
        .ok_or_else(|| AppError::Model("Model produced no outputs".to_string()))?;

    let (_, data) = output_value
        .try_extract_tensor::<f32>()
        .map_err(|e| AppError::Model(format!("Failed to extract output tensor: {}", e)))?;

    Ok(data.to_vec())
}
