//! Viewer configuration
//!
//! Every field has a default, so `{}` is a valid configuration and callers
//! only spell out what they change.

use serde::{Deserialize, Serialize};

use crate::cache::RetryPolicy;
use crate::error::{Result, ViewerError};
use crate::viewport::BoundsPolicy;
use crate::zoom::{ZoomController, ZoomMode};

/// Default pre-fetch margin around the viewport, in tiles
pub const DEFAULT_MARGIN_TILES: u32 = 2;

/// Default delay before a pan triggers a visible-tile recomputation
pub const DEFAULT_DEBOUNCE_MS: u32 = 100;

/// Default delay before retrying a failed tile
pub const DEFAULT_RETRY_DELAY_MS: u32 = 1000;

/// Default number of digital zoom steps past the sharpest level
pub const DEFAULT_OVERZOOM_LEVELS: u32 = 2;

/// Each over-zoom level doubles the scale, so 256x is plenty
pub const MAX_OVERZOOM_LEVELS: u32 = 8;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ViewerConfig {
    pub margin_tiles: u32,
    pub debounce_ms: u32,
    pub retry_delay_ms: u32,
    /// Automatic retries after a failed fetch
    pub max_retries: u32,
    pub overzoom_levels: u32,
    pub zoom_mode: ZoomMode,
    pub bounds: BoundsPolicy,
    /// Log an advisory message when a zoom request hits a limit
    pub report_zoom_limits: bool,
    /// Start fitted to the container instead of at the lowest level
    pub fit_on_load: bool,
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self {
            margin_tiles: DEFAULT_MARGIN_TILES,
            debounce_ms: DEFAULT_DEBOUNCE_MS,
            retry_delay_ms: DEFAULT_RETRY_DELAY_MS,
            max_retries: 1,
            overzoom_levels: DEFAULT_OVERZOOM_LEVELS,
            zoom_mode: ZoomMode::default(),
            bounds: BoundsPolicy::default(),
            report_zoom_limits: true,
            fit_on_load: true,
        }
    }
}

impl ViewerConfig {
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values that parse but cannot drive a viewer
    pub fn validate(&self) -> Result<()> {
        if self.overzoom_levels > MAX_OVERZOOM_LEVELS {
            return Err(ViewerError::OverzoomTooLarge {
                value: self.overzoom_levels,
                max: MAX_OVERZOOM_LEVELS,
            });
        }
        if let ZoomMode::Continuous { step_percent } = self.zoom_mode {
            if !step_percent.is_finite() || step_percent <= 0.0 {
                return Err(ViewerError::InvalidZoomStep(step_percent));
            }
        }
        Ok(())
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries,
            delay: self.retry_delay_ms as f64 / 1000.0,
        }
    }

    pub fn zoom_controller(&self) -> ZoomController {
        ZoomController::new(self.zoom_mode, self.overzoom_levels, self.report_zoom_limits)
    }

    /// Debounce delay in seconds
    pub fn debounce_secs(&self) -> f64 {
        self.debounce_ms as f64 / 1000.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_json_gives_defaults() {
        let config = ViewerConfig::from_json("{}").unwrap();
        assert_eq!(config, ViewerConfig::default());
        assert_eq!(config.retry_policy(), RetryPolicy::default());
        assert!((config.debounce_secs() - 0.1).abs() < 1e-12);
    }

    #[test]
    fn test_partial_json() {
        let json = r#"{
            "marginTiles": 3,
            "zoomMode": {"mode": "continuous", "stepPercent": 20},
            "bounds": {"centerUndersized": false},
            "retryDelayMs": 250
        }"#;
        let config = ViewerConfig::from_json(json).unwrap();
        assert_eq!(config.margin_tiles, 3);
        assert_eq!(config.zoom_mode, ZoomMode::Continuous { step_percent: 20.0 });
        assert!(!config.bounds.center_undersized);
        assert!(config.bounds.constrain_edges);
        assert_eq!(config.retry_policy().delay, 0.25);
        assert_eq!(config.debounce_ms, DEFAULT_DEBOUNCE_MS);
    }

    #[test]
    fn test_rejects_wrong_types() {
        assert!(ViewerConfig::from_json(r#"{"marginTiles": "two"}"#).is_err());
    }

    #[test]
    fn test_rejects_out_of_range_values() {
        assert!(matches!(
            ViewerConfig::from_json(r#"{"overzoomLevels": 4294967295}"#),
            Err(ViewerError::OverzoomTooLarge { value: 4294967295, max: MAX_OVERZOOM_LEVELS })
        ));
        assert!(ViewerConfig::from_json(r#"{"overzoomLevels": 8}"#).is_ok());

        for step in ["-50", "0", "-100"] {
            let json = format!(r#"{{"zoomMode": {{"mode": "continuous", "stepPercent": {}}}}}"#, step);
            assert!(
                matches!(ViewerConfig::from_json(&json), Err(ViewerError::InvalidZoomStep(_))),
                "step {} accepted",
                step
            );
        }

        let config = ViewerConfig {
            zoom_mode: ZoomMode::Continuous { step_percent: f64::NAN },
            ..ViewerConfig::default()
        };
        assert!(config.validate().is_err());
        assert!(ViewerConfig::default().validate().is_ok());
    }
}
