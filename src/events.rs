//! Notifications for the embedding page

use crate::zoom::ZoomLimit;

#[derive(Clone, Debug, PartialEq)]
pub enum ViewerEvent {
    /// Image origin moved to `(x, y)` in viewport pixels
    Moved { x: f64, y: f64 },
    /// Zoom changed; `visible_width`/`visible_height` are in image pixels
    Zoomed {
        level: u32,
        scale: f64,
        visible_width: f64,
        visible_height: f64,
    },
    Resized { width: f64, height: f64 },
    /// A zoom request was refused
    ZoomLimitReached(ZoomLimit),
}

impl ViewerEvent {
    /// Name used when forwarding to JavaScript
    pub fn name(&self) -> &'static str {
        match self {
            ViewerEvent::Moved { .. } => "viewerMoved",
            ViewerEvent::Zoomed { .. } => "viewerZoomed",
            ViewerEvent::Resized { .. } => "viewerResized",
            ViewerEvent::ZoomLimitReached(_) => "viewerZoomLimit",
        }
    }
}
