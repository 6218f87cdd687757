use serde::ser::SerializeStruct;
use serde::{Serialize, Serializer};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, AppError>;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Could not decode image: {0}")]
    Decode(#[from] image::ImageError),

    #[error("Unsupported file type: {0} (expected jpg, jpeg, png or webp)")]
    UnsupportedFormat(String),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Invalid controls: {0}")]
    InvalidControls(String),

    #[error("No image loaded")]
    NoImage,

    #[error("Model error: {0}")]
    Model(String),

    #[error("Settings error: {0}")]
    Config(#[from] serde_json::Error),

    #[error("Invalid settings: {0}")]
    InvalidSettings(String),

    #[error("{0}")]
    Internal(String),
}

impl AppError {
    pub fn kind(&self) -> &'static str {
        match self {
            AppError::Io(_) => "io",
            AppError::Http(_) => "http",
            AppError::Decode(_) => "decode",
            AppError::UnsupportedFormat(_) => "unsupported_format",
            AppError::InvalidUrl(_) => "invalid_url",
            AppError::InvalidControls(_) => "invalid_controls",
            AppError::NoImage => "no_image",
            AppError::Model(_) => "model",
            AppError::Config(_) | AppError::InvalidSettings(_) => "config",
            AppError::Internal(_) => "internal",
        }
    }
}

impl From<ort::Error> for AppError {
    fn from(err: ort::Error) -> Self {
        AppError::Model(err.to_string())
    }
}

impl From<tokio::task::JoinError> for AppError {
    fn from(err: tokio::task::JoinError) -> Self {
        AppError::Internal(format!("Background task failed: {}", err))
    }
}

impl<T> From<std::sync::PoisonError<T>> for AppError {
    fn from(err: std::sync::PoisonError<T>) -> Self {
        AppError::Internal(format!("Lock poisoned: {}", err))
    }
}

// Tauri commands hand errors to the webview as JSON.
impl Serialize for AppError {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("AppError", 2)?;
        state.serialize_field("kind", self.kind())?;
        state.serialize_field("message", &self.to_string())?;
        state.end()
    }
}
