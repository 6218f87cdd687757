use serde::Serialize;
use std::fmt;

pub const INFO_READY: &str = "Click \"Classify\" to see what the model thinks.";
pub const INFO_EMPTY: &str = "Upload a file, or paste a URL and click \"Load from URL\".";

/// Where the image currently held in the session came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ImageSource {
    #[serde(rename = "file")]
    File,
    #[serde(rename = "URL")]
    Url,
}

impl fmt::Display for ImageSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ImageSource::File => write!(f, "file"),
            ImageSource::Url => write!(f, "URL"),
        }
    }
}

#[derive(Debug, Serialize, Clone)]
pub struct PreviewImage {
    pub data_uri: String,
    pub caption: String,
    pub width: u32,
    pub height: u32,
}

/// Everything one render of the page needs.
#[derive(Debug, Serialize, Clone)]
pub struct ViewState {
    pub image: Option<PreviewImage>,
    pub error: Option<String>,
    pub info: String,
}

impl ViewState {
    pub fn empty() -> Self {
        Self {
            image: None,
            error: None,
            info: INFO_EMPTY.to_string(),
        }
    }
}
