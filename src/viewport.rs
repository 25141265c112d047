//! Pan/zoom state and coordinate mapping between viewport and image space
//!
//! This module contains pure coordinate logic that can be unit tested
//! without egui. Image space is full-resolution image pixels; viewport space
//! is pixels relative to the top-left corner of the visible area.

use serde::{Deserialize, Serialize};

/// Pan, zoom and size of one viewer's visible area
#[derive(Clone, Debug, PartialEq)]
pub struct ViewportState {
    /// Viewport position of the image origin (may be negative)
    pub pan_x: f64,
    pub pan_y: f64,
    /// Zoom index; past the pyramid's top level when over-zoomed
    pub zoom_level: u32,
    /// Display pixels per full-resolution image pixel
    pub scale: f64,
    /// Visible area in pixels
    pub width: f64,
    pub height: f64,
}

impl ViewportState {
    pub fn new(width: f64, height: f64) -> Self {
        Self {
            pan_x: 0.0,
            pan_y: 0.0,
            zoom_level: 0,
            scale: 1.0,
            width,
            height,
        }
    }

    pub fn to_image_space(&self, viewport_x: f64, viewport_y: f64) -> (f64, f64) {
        (
            (viewport_x - self.pan_x) / self.scale,
            (viewport_y - self.pan_y) / self.scale,
        )
    }

    pub fn to_viewport_space(&self, image_x: f64, image_y: f64) -> (f64, f64) {
        (
            image_x * self.scale + self.pan_x,
            image_y * self.scale + self.pan_y,
        )
    }

    /// Move the image by a viewport-pixel delta. No clamping; see [`BoundsPolicy`].
    pub fn pan(&mut self, delta_x: f64, delta_y: f64) {
        self.pan_x += delta_x;
        self.pan_y += delta_y;
    }

    /// Change zoom while keeping the image point under `focal` fixed on screen.
    pub fn set_zoom(&mut self, level: u32, scale: f64, focal: (f64, f64)) {
        let (ix, iy) = self.to_image_space(focal.0, focal.1);
        self.zoom_level = level;
        self.scale = scale;
        self.pan_x = focal.0 - ix * scale;
        self.pan_y = focal.1 - iy * scale;
    }

    /// Resize the visible area, keeping the image point at the centre fixed
    pub fn resize(&mut self, width: f64, height: f64) {
        let (cx, cy) = self.to_image_space(self.width / 2.0, self.height / 2.0);
        self.width = width;
        self.height = height;
        self.center_on(cx, cy);
    }

    /// Pan so that the given image point sits at the viewport centre
    pub fn center_on(&mut self, image_x: f64, image_y: f64) {
        self.pan_x = self.width / 2.0 - image_x * self.scale;
        self.pan_y = self.height / 2.0 - image_y * self.scale;
    }

    /// Viewport centre in viewport coordinates
    pub fn center(&self) -> (f64, f64) {
        (self.width / 2.0, self.height / 2.0)
    }

    /// Image-space rectangle `(x0, y0, x1, y1)` covered by the viewport
    pub fn visible_image_rect(&self) -> (f64, f64, f64, f64) {
        let (x0, y0) = self.to_image_space(0.0, 0.0);
        let (x1, y1) = self.to_image_space(self.width, self.height);
        (x0, y0, x1, y1)
    }

    pub fn is_empty(&self) -> bool {
        self.width <= 0.0 || self.height <= 0.0
    }
}

/// Caller-selected constraint applied after pan and zoom changes
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct BoundsPolicy {
    /// Center an image smaller than the viewport along that axis
    pub center_undersized: bool,
    /// Keep image edges from being dragged inside the viewport
    pub constrain_edges: bool,
}

impl Default for BoundsPolicy {
    fn default() -> Self {
        Self {
            center_undersized: true,
            constrain_edges: true,
        }
    }
}

impl BoundsPolicy {
    /// No centering and no clamping
    pub const FREE: BoundsPolicy = BoundsPolicy {
        center_undersized: false,
        constrain_edges: false,
    };

    /// Adjust pan for an image of `image_width` x `image_height` full-resolution pixels
    pub fn apply(&self, viewport: &mut ViewportState, image_width: f64, image_height: f64) {
        viewport.pan_x = self.constrain_axis(viewport.pan_x, viewport.width, image_width * viewport.scale);
        viewport.pan_y = self.constrain_axis(viewport.pan_y, viewport.height, image_height * viewport.scale);
    }

    fn constrain_axis(&self, pan: f64, view: f64, displayed: f64) -> f64 {
        if displayed <= view {
            if self.center_undersized {
                (view - displayed) / 2.0
            } else if self.constrain_edges {
                pan.clamp(0.0, view - displayed)
            } else {
                pan
            }
        } else if self.constrain_edges {
            pan.clamp(view - displayed, 0.0)
        } else {
            pan
        }
    }
}
