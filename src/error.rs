//! Error type for viewer construction and configuration

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ViewerError {
    #[error("Invalid image dimensions: {width}x{height}")]
    InvalidDimensions { width: u32, height: u32 },

    #[error("Invalid tile size: {width}x{height}")]
    InvalidTileSize { width: u32, height: u32 },

    #[error("Pyramid must have at least one level")]
    NoLevels,

    #[error("Expected {expected} per-level scale factors, got {actual}")]
    ScalingLengthMismatch { expected: usize, actual: usize },

    #[error("Scale factor for level {level} must be finite and positive, got {value}")]
    InvalidScale { level: usize, value: f64 },

    #[error("Scale factors must increase with level, level {level} is not larger than the one below")]
    ScalingNotIncreasing { level: usize },

    #[error("At most {max} over-zoom levels are supported, got {value}")]
    OverzoomTooLarge { value: u32, max: u32 },

    #[error("Continuous zoom step must be a positive percentage, got {0}")]
    InvalidZoomStep(f64),

    #[error("Malformed JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Failed to fetch {url}: {reason}")]
    Fetch { url: String, reason: String },

    #[error("Failed to decode tile: {0}")]
    Decode(#[from] image::ImageError),
}

pub type Result<T> = std::result::Result<T, ViewerError>;
