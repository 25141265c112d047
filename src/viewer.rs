//! The tile viewer: pyramid, viewport, zoom and cache tied together
//!
//! `TiledViewer` owns no rendering and no clock. The host calls the mutating
//! operations as input arrives, then `update` once per frame with the current
//! time and a [`TileLoader`]; afterwards `placements` lists what to draw.

use std::collections::BTreeSet;

use crate::cache::{TileCache, TileLoader, TileState};
use crate::config::ViewerConfig;
use crate::debounce::Debounce;
use crate::error::Result;
use crate::events::ViewerEvent;
use crate::input::InputAdapter;
use crate::pyramid::{ImagePyramid, PyramidMetadata, TileKey};
use crate::url::TileUrlProvider;
use crate::viewport::{BoundsPolicy, ViewportState};
use crate::visible;
use crate::zoom::{ZoomController, ZoomMode, ZoomOutcome, ZoomTarget};

/// Accumulated pinch (in powers of two) needed for one discrete step
const GESTURE_STEP_LOG2: f64 = 0.5;

/// Where to draw one tile this frame
#[derive(Debug)]
pub struct TilePlacement<'a, R> {
    pub key: TileKey,
    /// `(x, y, w, h)` in viewport pixels
    pub rect: (f64, f64, f64, f64),
    pub state: TileState,
    pub resource: Option<&'a R>,
}

pub struct TiledViewer<R> {
    viewport: ViewportState,
    zoom: ZoomController,
    bounds: BoundsPolicy,
    cache: TileCache<R>,
    margin_tiles: u32,
    fit_on_load: bool,
    /// Set once the viewer has had a non-empty size
    sized: bool,
    refresh: Debounce,
    visible: BTreeSet<TileKey>,
    events: Vec<ViewerEvent>,
    /// Last pointer position of an active pan gesture
    drag_from: Option<(f64, f64)>,
    /// Pinch accumulated toward the next discrete step, in powers of two
    gesture_log2: f64,
}

impl<R> TiledViewer<R> {
    pub fn new(metadata: PyramidMetadata, provider: Box<dyn TileUrlProvider>, config: &ViewerConfig) -> Result<Self> {
        config.validate()?;
        let pyramid = ImagePyramid::try_from(metadata)?;
        Ok(Self::with_pyramid(pyramid, provider, config))
    }

    pub fn with_pyramid(pyramid: ImagePyramid, provider: Box<dyn TileUrlProvider>, config: &ViewerConfig) -> Self {
        let mut viewport = ViewportState::new(0.0, 0.0);
        viewport.scale = pyramid.scale_for_level(0);
        log::debug!(
            "New viewer for {}x{} image, {} levels",
            pyramid.width(),
            pyramid.height(),
            pyramid.level_count()
        );

        Self {
            viewport,
            zoom: config.zoom_controller(),
            bounds: config.bounds,
            cache: TileCache::new(pyramid, provider, config.retry_policy()),
            margin_tiles: config.margin_tiles,
            fit_on_load: config.fit_on_load,
            sized: false,
            refresh: Debounce::new(config.debounce_secs()),
            visible: BTreeSet::new(),
            events: Vec::new(),
            drag_from: None,
            gesture_log2: 0.0,
        }
    }

    pub fn pyramid(&self) -> &ImagePyramid {
        self.cache.pyramid()
    }

    pub fn viewport(&self) -> &ViewportState {
        &self.viewport
    }

    pub fn cache(&self) -> &TileCache<R> {
        &self.cache
    }

    pub fn zoom_controller(&self) -> &ZoomController {
        &self.zoom
    }

    /// Tile keys from the last recomputation
    pub fn visible_tiles(&self) -> &BTreeSet<TileKey> {
        &self.visible
    }

    pub fn take_events(&mut self) -> Vec<ViewerEvent> {
        std::mem::take(&mut self.events)
    }

    /// Set the container size. The first non-empty sizing positions the image;
    /// later ones keep the image point under the centre in place.
    pub fn resize(&mut self, width: f64, height: f64, now: f64) {
        if width == self.viewport.width && height == self.viewport.height {
            return;
        }
        if self.sized {
            self.viewport.resize(width, height);
            if !self.viewport.is_empty() {
                self.apply_bounds();
            }
        } else {
            self.viewport.width = width;
            self.viewport.height = height;
            if !self.viewport.is_empty() {
                self.sized = true;
                if self.fit_on_load {
                    let outcome = self.zoom.zoom_to_fit(&mut self.viewport, self.cache.pyramid(), true, width, height);
                    self.after_zoom(outcome, now);
                } else {
                    self.apply_bounds();
                }
            }
        }
        self.events.push(ViewerEvent::Resized { width, height });
        self.refresh.trigger(now);
    }

    pub fn pan_by(&mut self, dx: f64, dy: f64, now: f64) {
        let before = (self.viewport.pan_x, self.viewport.pan_y);
        self.viewport.pan(dx, dy);
        self.apply_bounds();
        if (self.viewport.pan_x, self.viewport.pan_y) != before {
            self.events.push(ViewerEvent::Moved {
                x: self.viewport.pan_x,
                y: self.viewport.pan_y,
            });
            self.refresh.schedule(now);
        }
    }

    /// Center the view on a full-resolution image point
    pub fn center_on(&mut self, image_x: f64, image_y: f64, now: f64) {
        self.viewport.center_on(image_x, image_y);
        self.apply_bounds();
        self.events.push(ViewerEvent::Moved {
            x: self.viewport.pan_x,
            y: self.viewport.pan_y,
        });
        self.refresh.trigger(now);
    }

    pub fn zoom_by(&mut self, direction: i32, focal: (f64, f64), now: f64) -> ZoomOutcome {
        let outcome = self.zoom.zoom_by(&mut self.viewport, self.cache.pyramid(), direction, focal);
        self.after_zoom(outcome, now)
    }

    pub fn zoom_to(&mut self, target: ZoomTarget, focal: (f64, f64), now: f64) -> ZoomOutcome {
        let outcome = self.zoom.zoom_to(&mut self.viewport, self.cache.pyramid(), target, focal);
        self.after_zoom(outcome, now)
    }

    /// Fit the image into the current viewport
    pub fn zoom_to_fit(&mut self, only_shrink: bool, now: f64) -> ZoomOutcome {
        let (w, h) = (self.viewport.width, self.viewport.height);
        let outcome = self.zoom.zoom_to_fit(&mut self.viewport, self.cache.pyramid(), only_shrink, w, h);
        self.after_zoom(outcome, now)
    }

    /// 1:1 around the viewport centre
    pub fn zoom_actual_size(&mut self, now: f64) -> ZoomOutcome {
        let focal = self.viewport.center();
        let outcome = self.zoom.zoom_actual_size(&mut self.viewport, self.cache.pyramid(), focal);
        self.after_zoom(outcome, now)
    }

    fn after_zoom(&mut self, outcome: ZoomOutcome, now: f64) -> ZoomOutcome {
        match outcome {
            ZoomOutcome::Applied { level, scale } => {
                self.apply_bounds();
                self.events.push(ViewerEvent::Zoomed {
                    level,
                    scale,
                    visible_width: self.viewport.width / scale,
                    visible_height: self.viewport.height / scale,
                });
                self.refresh.trigger(now);
            }
            ZoomOutcome::Rejected(limit) => self.events.push(ViewerEvent::ZoomLimitReached(limit)),
            ZoomOutcome::Unchanged => {}
        }
        outcome
    }

    fn apply_bounds(&mut self) {
        let pyramid = self.cache.pyramid();
        let (w, h) = (pyramid.width() as f64, pyramid.height() as f64);
        self.bounds.apply(&mut self.viewport, w, h);
    }

    /// Visible part of the image as `(x0, y0, x1, y1)` in full-resolution pixels
    pub fn view_bounds(&self) -> (f64, f64, f64, f64) {
        let pyramid = self.cache.pyramid();
        let (x0, y0, x1, y1) = self.viewport.visible_image_rect();
        let (w, h) = (pyramid.width() as f64, pyramid.height() as f64);
        (x0.clamp(0.0, w), y0.clamp(0.0, h), x1.clamp(0.0, w), y1.clamp(0.0, h))
    }

    /// Run due retries and, when a refresh is due, recompute the visible set
    /// and resolve it through the cache. Returns true if the set was recomputed.
    pub fn update(&mut self, now: f64, loader: &mut dyn TileLoader) -> bool {
        let restarted = self.cache.poll_retries(now, loader);
        if restarted > 0 {
            log::debug!("Retrying {} tiles", restarted);
        }
        if !self.refresh.take_due(now) {
            return false;
        }

        self.visible = visible::visible_tiles(&self.viewport, self.cache.pyramid(), self.margin_tiles);
        for &key in &self.visible {
            self.cache.resolve(key, loader);
        }
        let evicted = self.cache.retain(&self.visible, loader);
        log::trace!(
            "Visible set: {} tiles, evicted {}, cached {}",
            self.visible.len(),
            evicted,
            self.cache.len()
        );
        true
    }

    /// Drop all cached tiles; they are fetched again on the next update
    pub fn invalidate_all(&mut self, now: f64, loader: &mut dyn TileLoader) {
        self.cache.clear(loader);
        self.refresh.trigger(now);
    }

    pub fn invalidate(&mut self, key: TileKey, now: f64, loader: &mut dyn TileLoader) -> bool {
        let removed = self.cache.invalidate(key, loader);
        if removed {
            self.refresh.trigger(now);
        }
        removed
    }

    pub fn on_tile_loaded(&mut self, key: TileKey, url: &str, resource: R) -> bool {
        self.cache.on_load_success(key, url, resource)
    }

    pub fn on_tile_failed(&mut self, key: TileKey, url: &str, now: f64) -> bool {
        self.cache.on_load_failure(key, url, now)
    }

    /// Earliest time `update` has work to do
    pub fn next_wakeup(&self) -> Option<f64> {
        match (self.refresh.due(), self.cache.next_retry_at()) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    /// Tiles of the current visible set with their on-screen rectangles
    pub fn placements(&self) -> Vec<TilePlacement<'_, R>> {
        let pyramid = self.cache.pyramid();
        self.visible
            .iter()
            .filter_map(|&key| {
                let entry = self.cache.get(key)?;
                Some(TilePlacement {
                    key,
                    rect: visible::tile_screen_rect(&self.viewport, pyramid, key),
                    state: entry.state(),
                    resource: entry.resource(),
                })
            })
            .collect()
    }
}

impl<R> InputAdapter for TiledViewer<R> {
    fn on_pan_start(&mut self, x: f64, y: f64, _now: f64) {
        self.drag_from = Some((x, y));
    }

    fn on_pan_move(&mut self, x: f64, y: f64, now: f64) {
        if let Some((fx, fy)) = self.drag_from {
            self.pan_by(x - fx, y - fy, now);
            self.drag_from = Some((x, y));
        }
    }

    fn on_pan_end(&mut self, now: f64) {
        if self.drag_from.take().is_some() {
            self.refresh.trigger(now);
        }
    }

    fn on_zoom_gesture(&mut self, factor: f64, focal: (f64, f64), now: f64) {
        if !factor.is_finite() || factor <= 0.0 || factor == 1.0 {
            return;
        }
        match self.zoom.mode() {
            ZoomMode::Discrete => {
                self.gesture_log2 += factor.log2();
                if self.gesture_log2.abs() >= GESTURE_STEP_LOG2 {
                    let direction = if self.gesture_log2 > 0.0 { 1 } else { -1 };
                    self.gesture_log2 = 0.0;
                    self.zoom_by(direction, focal, now);
                }
            }
            ZoomMode::Continuous { .. } => {
                let percent = self.viewport.scale * factor * 100.0;
                self.zoom_to(ZoomTarget::Percent(percent), focal, now);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::tests::RecordingLoader;
    use crate::url::TilePathTemplate;
    use crate::zoom::ZoomLimit;

    fn metadata() -> PyramidMetadata {
        PyramidMetadata {
            width: 4096,
            height: 4096,
            tile_width: 256,
            tile_height: 256,
            level_count: 5,
            scaling_per_level: None,
        }
    }

    fn provider() -> Box<dyn TileUrlProvider> {
        Box::new(TilePathTemplate {
            prefix: "/tiles/".to_string(),
            extension: "jpg".to_string(),
        })
    }

    fn viewer(config: ViewerConfig) -> TiledViewer<u8> {
        TiledViewer::new(metadata(), provider(), &config).unwrap()
    }

    #[test]
    fn test_rejects_bad_metadata() {
        let mut meta = metadata();
        meta.level_count = 0;
        assert!(TiledViewer::<u8>::new(meta, provider(), &ViewerConfig::default()).is_err());
    }

    #[test]
    fn test_rejects_bad_config() {
        let config = ViewerConfig {
            overzoom_levels: u32::MAX,
            ..ViewerConfig::default()
        };
        assert!(TiledViewer::<u8>::new(metadata(), provider(), &config).is_err());

        let config = ViewerConfig {
            zoom_mode: ZoomMode::Continuous { step_percent: -50.0 },
            ..ViewerConfig::default()
        };
        assert!(TiledViewer::<u8>::new(metadata(), provider(), &config).is_err());
    }

    #[test]
    fn test_first_resize_fits_and_loads() {
        let mut v = viewer(ViewerConfig::default());
        let mut loader = RecordingLoader::default();
        v.resize(800.0, 600.0, 0.0);

        let vp = v.viewport();
        assert!((vp.scale - 600.0 / 4096.0).abs() < 1e-12);
        assert_eq!(vp.zoom_level, 2);

        assert!(v.update(0.0, &mut loader));
        // level 2 is 4x4 tiles and the whole image is on screen
        assert_eq!(v.visible_tiles().len(), 16);
        assert_eq!(loader.started.len(), 16);
        assert!(loader.started.iter().all(|(k, _)| k.level == 2));

        let events = v.take_events();
        assert!(matches!(events[0], ViewerEvent::Zoomed { level: 2, .. }));
        assert_eq!(events[1], ViewerEvent::Resized { width: 800.0, height: 600.0 });
        assert!(v.take_events().is_empty());
    }

    #[test]
    fn test_collapse_and_restore_keeps_view() {
        let mut v = viewer(ViewerConfig::default());
        v.resize(800.0, 600.0, 0.0);
        v.zoom_actual_size(0.0);
        v.pan_by(-300.0, -200.0, 0.0);
        assert_eq!((v.viewport().pan_x, v.viewport().pan_y), (-1948.0, -1948.0));
        v.take_events();

        v.resize(0.0, 0.0, 1.0);
        v.resize(800.0, 600.0, 2.0);

        let vp = v.viewport();
        assert_eq!(vp.scale, 1.0);
        assert_eq!(vp.zoom_level, 4);
        assert_eq!((vp.pan_x, vp.pan_y), (-1948.0, -1948.0));
        let events = v.take_events();
        assert!(events.iter().all(|e| matches!(e, ViewerEvent::Resized { .. })));
        assert_eq!(events.len(), 2);
    }

    #[test]
    fn test_empty_first_size_waits_to_fit() {
        let mut v = viewer(ViewerConfig::default());
        v.resize(800.0, 0.0, 0.0);
        assert_eq!(v.viewport().zoom_level, 0);
        v.resize(800.0, 600.0, 0.0);
        assert_eq!(v.viewport().zoom_level, 2);
        assert!((v.viewport().scale - 600.0 / 4096.0).abs() < 1e-12);
    }

    #[test]
    fn test_pan_is_debounced() {
        let config = ViewerConfig {
            margin_tiles: 0,
            ..ViewerConfig::default()
        };
        let mut v = viewer(config);
        let mut loader = RecordingLoader::default();
        v.resize(800.0, 600.0, 0.0);
        v.zoom_actual_size(0.0);
        v.update(0.0, &mut loader);
        let after_zoom = loader.started.len();

        v.pan_by(-300.0, 0.0, 1.0);
        v.pan_by(-300.0, 0.0, 1.02);
        assert!(!v.update(1.05, &mut loader));
        assert_eq!(loader.started.len(), after_zoom);

        assert!(v.update(1.1, &mut loader));
        assert!(loader.started.len() > after_zoom);
        assert_eq!(v.next_wakeup(), None);
    }

    #[test]
    fn test_centered_actual_size_scenario() {
        let config = ViewerConfig {
            margin_tiles: 0,
            ..ViewerConfig::default()
        };
        let mut v = viewer(config);
        let mut loader = RecordingLoader::default();
        v.resize(800.0, 600.0, 0.0);
        v.zoom_to(ZoomTarget::Percent(100.0), (400.0, 300.0), 0.0);
        v.center_on(2048.0, 2048.0, 0.0);
        assert_eq!((v.viewport().pan_x, v.viewport().pan_y), (-1648.0, -1748.0));

        v.update(0.0, &mut loader);
        let keys: Vec<TileKey> = v.visible_tiles().iter().copied().collect();
        assert_eq!(keys.len(), 16);
        assert_eq!(keys.first(), Some(&TileKey::new(4, 6, 6)));
        assert_eq!(keys.last(), Some(&TileKey::new(4, 9, 9)));

        let (x0, y0, x1, y1) = v.view_bounds();
        assert_eq!((x0, y0, x1, y1), (1648.0, 1748.0, 2448.0, 2348.0));
    }

    #[test]
    fn test_placements_follow_loads() {
        let mut v = viewer(ViewerConfig::default());
        let mut loader = RecordingLoader::default();
        v.resize(800.0, 600.0, 0.0);
        v.update(0.0, &mut loader);

        let (key, url) = loader.started[0].clone();
        assert!(v.on_tile_loaded(key, &url, 42));
        let placements = v.placements();
        assert_eq!(placements.len(), 16);
        let loaded = placements.iter().find(|p| p.key == key).unwrap();
        assert_eq!(loaded.state, TileState::Loaded);
        assert_eq!(loaded.resource, Some(&42));
        assert!(placements.iter().filter(|p| p.resource.is_none()).count() == 15);
    }

    #[test]
    fn test_failed_tile_retries_through_update() {
        let mut v = viewer(ViewerConfig::default());
        let mut loader = RecordingLoader::default();
        v.resize(800.0, 600.0, 0.0);
        v.update(0.0, &mut loader);
        let (key, url) = loader.started[0].clone();

        assert!(v.on_tile_failed(key, &url, 2.0));
        assert_eq!(v.next_wakeup(), Some(3.0));
        let before = loader.started.len();
        v.update(3.0, &mut loader);
        assert_eq!(loader.started.len(), before + 1);

        v.on_tile_failed(key, &url, 3.5);
        v.update(10.0, &mut loader);
        assert_eq!(loader.started.len(), before + 1);
        assert_eq!(v.cache().get(key).unwrap().state(), TileState::Failed);
    }

    #[test]
    fn test_zoom_limit_event() {
        let mut v = viewer(ViewerConfig::default());
        v.resize(800.0, 600.0, 0.0);
        v.take_events();

        v.zoom_to(ZoomTarget::Level(0), (400.0, 300.0), 0.0);
        let outcome = v.zoom_by(-1, (400.0, 300.0), 0.0);
        assert_eq!(outcome, ZoomOutcome::Rejected(ZoomLimit::Min));
        let events = v.take_events();
        assert_eq!(events.last(), Some(&ViewerEvent::ZoomLimitReached(ZoomLimit::Min)));
    }

    #[test]
    fn test_pan_gesture_and_bounds() {
        let mut v = viewer(ViewerConfig::default());
        v.resize(800.0, 600.0, 0.0);
        v.zoom_actual_size(0.0);
        let start = (v.viewport().pan_x, v.viewport().pan_y);

        v.on_pan_start(100.0, 100.0, 0.0);
        v.on_pan_move(150.0, 80.0, 0.01);
        v.on_pan_move(160.0, 60.0, 0.02);
        v.on_pan_end(0.03);
        assert_eq!(v.viewport().pan_x, start.0 + 60.0);
        assert_eq!(v.viewport().pan_y, start.1 - 40.0);

        // moves without a pan start are ignored
        v.on_pan_move(500.0, 500.0, 0.04);
        assert_eq!(v.viewport().pan_x, start.0 + 60.0);

        // dragging far past the edge stops at the edge
        v.pan_by(100_000.0, 0.0, 0.05);
        assert_eq!(v.viewport().pan_x, 0.0);
    }

    #[test]
    fn test_pinch_accumulates_into_steps() {
        let mut v = viewer(ViewerConfig::default());
        v.resize(800.0, 600.0, 0.0);
        v.zoom_to(ZoomTarget::Level(3), (400.0, 300.0), 0.0);

        v.on_zoom_gesture(1.1, (400.0, 300.0), 0.1);
        assert_eq!(v.viewport().zoom_level, 3);
        for _ in 0..4 {
            v.on_zoom_gesture(1.1, (400.0, 300.0), 0.1);
        }
        assert_eq!(v.viewport().zoom_level, 4);
    }

    #[test]
    fn test_continuous_pinch() {
        let config = ViewerConfig {
            zoom_mode: ZoomMode::Continuous { step_percent: 10.0 },
            ..ViewerConfig::default()
        };
        let mut v = viewer(config);
        v.resize(800.0, 600.0, 0.0);
        v.zoom_actual_size(0.0);
        v.on_zoom_gesture(0.5, (400.0, 300.0), 0.1);
        assert!((v.viewport().scale - 0.5).abs() < 1e-12);
        assert_eq!(v.viewport().zoom_level, 3);
    }

    #[test]
    fn test_invalidate_all_refetches() {
        let mut v = viewer(ViewerConfig::default());
        let mut loader = RecordingLoader::default();
        v.resize(800.0, 600.0, 0.0);
        v.update(0.0, &mut loader);
        assert_eq!(loader.started.len(), 16);

        v.invalidate_all(1.0, &mut loader);
        assert_eq!(loader.released.len(), 16);
        assert!(v.update(1.0, &mut loader));
        assert_eq!(loader.started.len(), 32);
    }
}
