use crate::error::{AppError, Result};
use crate::models::classify_types::Prediction;

/// Numerically stable softmax.
pub fn softmax(logits: &[f32]) -> Vec<f32> {
    let max_logit = logits.iter().fold(f32::NEG_INFINITY, |a, &b| a.max(b));
    let exp_sum: f32 = logits.iter().map(|&x| (x - max_logit).exp()).sum();
    logits
        .iter()
        .map(|&x| (x - max_logit).exp() / exp_sum)
        .collect()
}

/// Pairs every probability with its label, highest first.
pub fn rank(probabilities: &[f32], labels: &[String]) -> Vec<Prediction> {
    let mut indexed: Vec<(usize, f32)> = probabilities.iter().copied().enumerate().collect();
    indexed.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));

    indexed
        .into_iter()
        .map(|(idx, conf)| Prediction {
            class_name: labels
                .get(idx)
                .cloned()
                .unwrap_or_else(|| format!("class_{}", idx)),
            confidence: conf,
        })
        .collect()
}

/// Threshold first, then truncate, so a strict threshold may leave fewer than `top_k`.
pub fn filter_predictions(ranked: &[Prediction], top_k: usize, threshold: f32) -> Vec<Prediction> {
    ranked
        .iter()
        .filter(|p| p.confidence >= threshold)
        .take(top_k)
        .cloned()
        .collect()
}

/// Reads the label vocabulary from a Hugging Face `config.json` `id2label` map.
pub fn parse_labels(config_content: &str) -> Result<Vec<String>> {
    let config: serde_json::Value = serde_json::from_str(config_content)?;

    let id2label = config["id2label"]
        .as_object()
        .ok_or_else(|| AppError::Model("Config missing id2label field".to_string()))?;

    let mut labels: Vec<(usize, String)> = id2label
        .iter()
        .filter_map(|(k, v)| {
            let idx = k.parse::<usize>().ok()?;
            let label = v.as_str().unwrap_or("unknown").to_string();
            Some((idx, label))
        })
        .collect();
    labels.sort_by_key(|(idx, _)| *idx);

    if labels.is_empty() {
        return Err(AppError::Model("Config id2label is empty".to_string()));
    }
    Ok(labels.into_iter().map(|(_, label)| label).collect())
}
