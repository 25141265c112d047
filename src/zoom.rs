//! Zoom stepping, absolute zoom and zoom-to-fit
//!
//! All changes go through [`ViewportState::set_zoom`], so the focal point
//! stays put on screen. Requests outside the allowed range are rejected as a
//! whole and leave the viewport untouched.

use serde::{Deserialize, Serialize};

use crate::pyramid::ImagePyramid;
use crate::viewport::ViewportState;

const EPSILON: f64 = 1e-9;

/// How `zoom_by` steps
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "camelCase")]
pub enum ZoomMode {
    /// One pyramid level per step
    Discrete,
    /// Multiply or divide the scale by `1 + step_percent / 100` per step
    #[serde(rename_all = "camelCase")]
    Continuous { step_percent: f64 },
}

impl Default for ZoomMode {
    fn default() -> Self {
        Self::Discrete
    }
}

/// Absolute zoom request
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ZoomTarget {
    /// Zoom index; past the top level means digital zoom
    Level(u32),
    /// Display percent of full resolution (100 = 1:1)
    Percent(f64),
}

/// Which end of the zoom range stopped a request
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ZoomLimit {
    Min,
    Max,
}

/// Result of a zoom request
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ZoomOutcome {
    Applied { level: u32, scale: f64 },
    /// Already at the requested zoom
    Unchanged,
    Rejected(ZoomLimit),
}

impl ZoomOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, ZoomOutcome::Applied { .. })
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct ZoomController {
    mode: ZoomMode,
    /// Digital zoom steps allowed past the sharpest pyramid level
    overzoom_levels: u32,
    /// Log rejected requests as advisory messages
    report_limits: bool,
}

impl Default for ZoomController {
    fn default() -> Self {
        Self::new(ZoomMode::Discrete, 2, true)
    }
}

impl ZoomController {
    pub fn new(mode: ZoomMode, overzoom_levels: u32, report_limits: bool) -> Self {
        Self {
            mode,
            overzoom_levels,
            report_limits,
        }
    }

    pub fn mode(&self) -> ZoomMode {
        self.mode
    }

    pub fn reports_limits(&self) -> bool {
        self.report_limits
    }

    /// Highest zoom index, including over-zoom
    pub fn max_zoom_level(&self, pyramid: &ImagePyramid) -> u32 {
        pyramid.max_level().saturating_add(self.overzoom_levels)
    }

    pub fn min_scale(&self, pyramid: &ImagePyramid) -> f64 {
        pyramid.scale_for_level(0)
    }

    pub fn max_scale(&self, pyramid: &ImagePyramid) -> f64 {
        pyramid.scale_for_level(self.max_zoom_level(pyramid))
    }

    /// Step in (`direction > 0`) or out (`direction < 0`) around `focal`
    pub fn zoom_by(
        &self,
        viewport: &mut ViewportState,
        pyramid: &ImagePyramid,
        direction: i32,
        focal: (f64, f64),
    ) -> ZoomOutcome {
        if direction == 0 {
            return ZoomOutcome::Unchanged;
        }
        let zoom_in = direction > 0;

        let outcome = match self.mode {
            ZoomMode::Discrete => {
                let current = viewport.scale;
                let max = self.max_zoom_level(pyramid);
                let next = if zoom_in {
                    (0..=max).find(|&z| pyramid.scale_for_level(z) > current * (1.0 + EPSILON))
                } else {
                    (0..=max).rev().find(|&z| pyramid.scale_for_level(z) < current * (1.0 - EPSILON))
                };
                match next {
                    Some(level) => apply(viewport, level, pyramid.scale_for_level(level), focal),
                    None => ZoomOutcome::Rejected(limit_for(zoom_in)),
                }
            }
            ZoomMode::Continuous { step_percent } => {
                let factor = 1.0 + step_percent / 100.0;
                let scale = if zoom_in {
                    viewport.scale * factor
                } else {
                    viewport.scale / factor
                };
                self.apply_scale(viewport, pyramid, scale, focal)
            }
        };
        self.report(outcome)
    }

    /// Zoom to an absolute level or percent around `focal`
    pub fn zoom_to(
        &self,
        viewport: &mut ViewportState,
        pyramid: &ImagePyramid,
        target: ZoomTarget,
        focal: (f64, f64),
    ) -> ZoomOutcome {
        let outcome = match target {
            ZoomTarget::Level(level) => {
                if level > self.max_zoom_level(pyramid) {
                    ZoomOutcome::Rejected(ZoomLimit::Max)
                } else {
                    let scale = pyramid.scale_for_level(level);
                    if level == viewport.zoom_level && same_scale(scale, viewport.scale) {
                        ZoomOutcome::Unchanged
                    } else {
                        apply(viewport, level, scale, focal)
                    }
                }
            }
            ZoomTarget::Percent(percent) => self.apply_scale(viewport, pyramid, percent / 100.0, focal),
        };
        self.report(outcome)
    }

    /// 1:1 display around `focal`
    pub fn zoom_actual_size(
        &self,
        viewport: &mut ViewportState,
        pyramid: &ImagePyramid,
        focal: (f64, f64),
    ) -> ZoomOutcome {
        self.zoom_to(viewport, pyramid, ZoomTarget::Percent(100.0), focal)
    }

    /// Fit the whole image into a container of the given size and center it.
    ///
    /// With `only_shrink`, an image that already fits at 100% stays at 100%.
    pub fn zoom_to_fit(
        &self,
        viewport: &mut ViewportState,
        pyramid: &ImagePyramid,
        only_shrink: bool,
        container_width: f64,
        container_height: f64,
    ) -> ZoomOutcome {
        if container_width <= 0.0 || container_height <= 0.0 {
            return ZoomOutcome::Unchanged;
        }
        let (w, h) = (pyramid.width() as f64, pyramid.height() as f64);
        let mut scale = (container_width / w).min(container_height / h);
        if only_shrink && scale >= 1.0 {
            scale = 1.0;
        }
        let scale = scale.clamp(self.min_scale(pyramid), self.max_scale(pyramid));
        let level = self.zoom_index_for_scale(pyramid, scale);

        viewport.width = container_width;
        viewport.height = container_height;
        viewport.zoom_level = level;
        viewport.scale = scale;
        viewport.center_on(w / 2.0, h / 2.0);
        ZoomOutcome::Applied { level, scale }
    }

    pub fn can_zoom_in(&self, viewport: &ViewportState, pyramid: &ImagePyramid) -> bool {
        viewport.scale < self.max_scale(pyramid) * (1.0 - EPSILON)
    }

    pub fn can_zoom_out(&self, viewport: &ViewportState, pyramid: &ImagePyramid) -> bool {
        viewport.scale > self.min_scale(pyramid) * (1.0 + EPSILON)
    }

    /// Zoom index used for an arbitrary scale: the best real level, or an
    /// over-zoom index once the scale passes the top level.
    pub fn zoom_index_for_scale(&self, pyramid: &ImagePyramid, scale: f64) -> u32 {
        let top = pyramid.max_level();
        let top_scale = pyramid.scale_for_level(top);
        if scale <= top_scale * (1.0 + EPSILON) {
            return pyramid.level_for_scale(scale);
        }
        let extra = (scale / top_scale).log2().ceil().max(0.0) as u32;
        (top + extra).min(self.max_zoom_level(pyramid))
    }

    fn apply_scale(
        &self,
        viewport: &mut ViewportState,
        pyramid: &ImagePyramid,
        scale: f64,
        focal: (f64, f64),
    ) -> ZoomOutcome {
        if !scale.is_finite() || scale < self.min_scale(pyramid) * (1.0 - EPSILON) {
            return ZoomOutcome::Rejected(ZoomLimit::Min);
        }
        if scale > self.max_scale(pyramid) * (1.0 + EPSILON) {
            return ZoomOutcome::Rejected(ZoomLimit::Max);
        }
        if same_scale(scale, viewport.scale) {
            return ZoomOutcome::Unchanged;
        }
        let level = self.zoom_index_for_scale(pyramid, scale);
        apply(viewport, level, scale, focal)
    }

    fn report(&self, outcome: ZoomOutcome) -> ZoomOutcome {
        if let ZoomOutcome::Rejected(limit) = outcome {
            if self.report_limits {
                match limit {
                    ZoomLimit::Min => log::info!("Already at the lowest zoom"),
                    ZoomLimit::Max => log::info!("Already at the highest zoom"),
                }
            }
        }
        outcome
    }
}

fn apply(viewport: &mut ViewportState, level: u32, scale: f64, focal: (f64, f64)) -> ZoomOutcome {
    viewport.set_zoom(level, scale, focal);
    ZoomOutcome::Applied { level, scale }
}

fn same_scale(a: f64, b: f64) -> bool {
    (a - b).abs() <= a.abs().max(b.abs()) * EPSILON
}

fn limit_for(zoom_in: bool) -> ZoomLimit {
    if zoom_in {
        ZoomLimit::Max
    } else {
        ZoomLimit::Min
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square_4096() -> ImagePyramid {
        ImagePyramid::new(4096, 4096, 256, 256, 5).unwrap()
    }

    fn viewport_at(level: u32, pyramid: &ImagePyramid) -> ViewportState {
        let mut v = ViewportState::new(800.0, 600.0);
        v.zoom_level = level;
        v.scale = pyramid.scale_for_level(level);
        v
    }

    #[test]
    fn test_zoom_by_steps_one_level() {
        let p = square_4096();
        let z = ZoomController::default();
        let mut v = viewport_at(2, &p);

        assert_eq!(
            z.zoom_by(&mut v, &p, 1, (400.0, 300.0)),
            ZoomOutcome::Applied { level: 3, scale: 0.5 }
        );
        assert_eq!(
            z.zoom_by(&mut v, &p, -1, (400.0, 300.0)),
            ZoomOutcome::Applied { level: 2, scale: 0.25 }
        );
        assert_eq!(v.zoom_level, 2);
    }

    #[test]
    fn test_zoom_by_keeps_focal_point() {
        let p = square_4096();
        let z = ZoomController::default();
        let mut v = viewport_at(3, &p);
        v.pan_x = -300.0;
        v.pan_y = -120.0;
        let focal = (123.0, 456.0);
        let before = v.to_image_space(focal.0, focal.1);

        z.zoom_by(&mut v, &p, 1, focal);
        let after = v.to_image_space(focal.0, focal.1);
        assert!((before.0 - after.0).abs() < 1e-9);
        assert!((before.1 - after.1).abs() < 1e-9);
    }

    #[test]
    fn test_zoom_limits_and_overzoom() {
        let p = square_4096();
        let z = ZoomController::default();
        let mut v = viewport_at(0, &p);

        assert_eq!(z.zoom_by(&mut v, &p, -1, (0.0, 0.0)), ZoomOutcome::Rejected(ZoomLimit::Min));
        assert_eq!(v.zoom_level, 0);

        let mut v = viewport_at(4, &p);
        assert!(z.zoom_by(&mut v, &p, 1, (0.0, 0.0)).is_applied());
        assert!(z.zoom_by(&mut v, &p, 1, (0.0, 0.0)).is_applied());
        assert_eq!(v.zoom_level, 6);
        assert!((v.scale - 4.0).abs() < 1e-12);

        let before = v.clone();
        assert_eq!(z.zoom_by(&mut v, &p, 1, (10.0, 10.0)), ZoomOutcome::Rejected(ZoomLimit::Max));
        assert_eq!(v, before);
        assert!(!z.can_zoom_in(&v, &p));
        assert!(z.can_zoom_out(&v, &p));
    }

    #[test]
    fn test_no_overzoom() {
        let p = square_4096();
        let z = ZoomController::new(ZoomMode::Discrete, 0, false);
        let mut v = viewport_at(4, &p);
        assert_eq!(z.zoom_by(&mut v, &p, 1, (0.0, 0.0)), ZoomOutcome::Rejected(ZoomLimit::Max));
    }

    #[test]
    fn test_max_zoom_level_saturates() {
        let p = square_4096();
        let z = ZoomController::new(ZoomMode::Discrete, u32::MAX, false);
        assert_eq!(z.max_zoom_level(&p), u32::MAX);
    }

    #[test]
    fn test_discrete_step_from_fit_scale() {
        let p = square_4096();
        let z = ZoomController::default();
        let mut v = viewport_at(2, &p);
        v.scale = 0.3;
        assert_eq!(
            z.zoom_by(&mut v, &p, 1, (0.0, 0.0)),
            ZoomOutcome::Applied { level: 3, scale: 0.5 }
        );
        v.scale = 0.3;
        assert_eq!(
            z.zoom_by(&mut v, &p, -1, (0.0, 0.0)),
            ZoomOutcome::Applied { level: 2, scale: 0.25 }
        );
    }

    #[test]
    fn test_continuous_steps() {
        let p = square_4096();
        let z = ZoomController::new(ZoomMode::Continuous { step_percent: 25.0 }, 2, true);
        let mut v = viewport_at(4, &p);

        let outcome = z.zoom_by(&mut v, &p, 1, (400.0, 300.0));
        assert!((v.scale - 1.25).abs() < 1e-12);
        assert_eq!(outcome, ZoomOutcome::Applied { level: 5, scale: v.scale });

        z.zoom_by(&mut v, &p, -1, (400.0, 300.0));
        z.zoom_by(&mut v, &p, -1, (400.0, 300.0));
        assert!((v.scale - 0.8).abs() < 1e-12);
        assert_eq!(v.zoom_level, 4);

        v.scale = 1.0 / 16.0;
        assert_eq!(z.zoom_by(&mut v, &p, -1, (0.0, 0.0)), ZoomOutcome::Rejected(ZoomLimit::Min));
    }

    #[test]
    fn test_zoom_to() {
        let p = square_4096();
        let z = ZoomController::default();
        let mut v = viewport_at(0, &p);

        assert_eq!(
            z.zoom_to(&mut v, &p, ZoomTarget::Level(3), (400.0, 300.0)),
            ZoomOutcome::Applied { level: 3, scale: 0.5 }
        );
        assert_eq!(z.zoom_to(&mut v, &p, ZoomTarget::Level(3), (0.0, 0.0)), ZoomOutcome::Unchanged);
        assert_eq!(z.zoom_to(&mut v, &p, ZoomTarget::Level(7), (0.0, 0.0)), ZoomOutcome::Rejected(ZoomLimit::Max));

        let outcome = z.zoom_to(&mut v, &p, ZoomTarget::Percent(30.0), (0.0, 0.0));
        assert_eq!(outcome, ZoomOutcome::Applied { level: 3, scale: 0.3 });
        assert_eq!(
            z.zoom_to(&mut v, &p, ZoomTarget::Percent(1.0), (0.0, 0.0)),
            ZoomOutcome::Rejected(ZoomLimit::Min)
        );
        assert_eq!(
            z.zoom_to(&mut v, &p, ZoomTarget::Percent(500.0), (0.0, 0.0)),
            ZoomOutcome::Rejected(ZoomLimit::Max)
        );

        let outcome = z.zoom_actual_size(&mut v, &p, (400.0, 300.0));
        assert_eq!(outcome, ZoomOutcome::Applied { level: 4, scale: 1.0 });
    }

    #[test]
    fn test_zoom_to_fit_only_shrink_keeps_actual_size() {
        let p = ImagePyramid::new(400, 300, 256, 256, 2).unwrap();
        let z = ZoomController::default();
        let mut v = viewport_at(0, &p);

        let outcome = z.zoom_to_fit(&mut v, &p, true, 800.0, 600.0);
        assert_eq!(outcome, ZoomOutcome::Applied { level: 1, scale: 1.0 });
        assert_eq!(v.scale, 1.0);
        // centered
        assert_eq!((v.pan_x, v.pan_y), (200.0, 150.0));

        // without only_shrink the image is upscaled to fill the container
        let outcome = z.zoom_to_fit(&mut v, &p, false, 800.0, 600.0);
        assert_eq!(outcome, ZoomOutcome::Applied { level: 2, scale: 2.0 });
    }

    #[test]
    fn test_zoom_to_fit_shrinks_large_image() {
        let p = square_4096();
        let z = ZoomController::default();
        let mut v = viewport_at(4, &p);

        let outcome = z.zoom_to_fit(&mut v, &p, true, 800.0, 600.0);
        let expected = 600.0 / 4096.0;
        assert!((v.scale - expected).abs() < 1e-12);
        assert_eq!(v.zoom_level, 2);
        assert!(outcome.is_applied());

        let (x0, y0, x1, y1) = v.visible_image_rect();
        assert!(x0 <= 0.0 && x1 >= 4096.0);
        assert!((y0 - 0.0).abs() < 1e-9 && (y1 - 4096.0).abs() < 1e-9);
    }

    #[test]
    fn test_zoom_mode_from_json() {
        let mode: ZoomMode = serde_json::from_str(r#"{"mode":"continuous","stepPercent":10.0}"#).unwrap();
        assert_eq!(mode, ZoomMode::Continuous { step_percent: 10.0 });
        let mode: ZoomMode = serde_json::from_str(r#"{"mode":"discrete"}"#).unwrap();
        assert_eq!(mode, ZoomMode::Discrete);
    }
}
