use crate::error::{AppError, Result};
use crate::models::classify_types::Controls;
use serde::{Deserialize, Serialize};
use std::path::Path;

pub const SETTINGS_FILE: &str = "settings.json";

const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
     AppleWebKit/537.36 (KHTML, like Gecko) \
     Chrome/121.0 Safari/537.36";

/// Axis order the ONNX graph expects for its image input.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InputLayout {
    Nhwc,
    Nchw,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelSettings {
    pub name: String,
    pub model_url: String,
    pub labels_url: String,
    pub model_file: String,
    pub labels_file: String,
    pub input_layout: InputLayout,
    pub mean: [f32; 3],
    pub std: [f32; 3],
    pub apply_softmax: bool,
    pub use_gpu: bool,
    pub intra_threads: usize,
}

impl Default for ModelSettings {
    fn default() -> Self {
        Self {
            name: "mobilenet_v2_1.0_224".to_string(),
            model_url: "https://huggingface.co/Xenova/mobilenet_v2_1.0_224/resolve/main/onnx/model.onnx"
                .to_string(),
            labels_url: "https://huggingface.co/Xenova/mobilenet_v2_1.0_224/resolve/main/config.json"
                .to_string(),
            model_file: "mobilenet_v2_1.0_224.onnx".to_string(),
            labels_file: "mobilenet_v2_1.0_224-config.json".to_string(),
            input_layout: InputLayout::Nchw,
            // Scales pixels to [-1, 1], the MobileNetV2 training distribution.
            mean: [0.5, 0.5, 0.5],
            std: [0.5, 0.5, 0.5],
            apply_softmax: true,
            use_gpu: true,
            intra_threads: 4,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchSettings {
    pub timeout_secs: u64,
    pub user_agent: String,
}

impl Default for FetchSettings {
    fn default() -> Self {
        Self {
            timeout_secs: 10,
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub model: ModelSettings,
    pub fetch: FetchSettings,
    pub controls: Controls,
}

impl Settings {
    /// Reads `settings.json` from `dir`. A missing file yields the defaults.
    pub fn load(dir: &Path) -> Result<Self> {
        let path = dir.join(SETTINGS_FILE);
        if !path.exists() {
            log::info!("No settings at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(&path)?;
        let settings: Settings = serde_json::from_str(&content)?;
        settings.validate()?;
        log::info!("Loaded settings from {}", path.display());
        Ok(settings)
    }

    /// Rejects values that would silently break every classification or fetch.
    pub fn validate(&self) -> Result<()> {
        self.controls.validate()?;

        if self.model.mean.iter().any(|m| !m.is_finite()) {
            return Err(AppError::InvalidSettings(format!(
                "model.mean must be finite, got {:?}",
                self.model.mean
            )));
        }
        if self.model.std.iter().any(|s| !s.is_finite() || *s <= 0.0) {
            return Err(AppError::InvalidSettings(format!(
                "model.std entries must be positive, got {:?}",
                self.model.std
            )));
        }
        if self.model.intra_threads == 0 {
            return Err(AppError::InvalidSettings(
                "model.intra_threads must be at least 1".to_string(),
            ));
        }
        if self.fetch.timeout_secs == 0 {
            return Err(AppError::InvalidSettings(
                "fetch.timeout_secs must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Like [`Settings::load`], but a broken file is logged and ignored.
    pub fn load_or_default(dir: &Path) -> Self {
        Self::load(dir).unwrap_or_else(|e| {
            log::warn!("Ignoring settings in {}: {}", dir.display(), e);
            Self::default()
        })
    }
}
