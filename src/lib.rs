//! panoview - A browser-based deep-zoom tiled image viewer using Rust, WASM, and egui
//!
//! Large images are served as a pyramid of fixed-size tiles, one grid per zoom
//! level. The viewer works out which tiles cover the visible area, fetches
//! them through a pluggable URL scheme, caches them with a small retry policy,
//! and pans and zooms around a focal point.
//!
//! ## Architecture
//!
//! - `TiledViewer`: Pure viewer state (pyramid, viewport, zoom, tile cache), no rendering
//! - `TiledImageWidget`: Self-contained egui widget that draws a `TiledViewer` and feeds it input
//! - `ViewerApp`: Thin eframe App shell that hosts the widget
//! - `ViewerHandle`: WASM interface for JavaScript to control the viewer

#[cfg(target_arch = "wasm32")]
use std::cell::RefCell;
#[cfg(target_arch = "wasm32")]
use std::rc::Rc;
#[cfg(target_arch = "wasm32")]
use wasm_bindgen::prelude::*;
#[cfg(target_arch = "wasm32")]
use web_sys::HtmlCanvasElement;

#[cfg(target_arch = "wasm32")]
mod app;
mod cache;
mod config;
mod debounce;
mod error;
mod events;
mod fetch;
mod input;
mod pyramid;
mod url;
mod viewer;
mod viewport;
mod visible;
mod widget;
mod zoom;

pub use cache::{CacheStats, RetryPolicy, TileCache, TileEntry, TileLoader, TileState};
pub use config::{
    ViewerConfig, DEFAULT_DEBOUNCE_MS, DEFAULT_MARGIN_TILES, DEFAULT_OVERZOOM_LEVELS, DEFAULT_RETRY_DELAY_MS,
    MAX_OVERZOOM_LEVELS,
};
pub use error::{Result, ViewerError};
pub use events::ViewerEvent;
pub use fetch::{decode_tile, FetchLoader, LoadResult};
pub use input::InputAdapter;
pub use pyramid::{ImagePyramid, PyramidMetadata, TileKey};
pub use url::{RegionQuery, TilePathTemplate, TileUrlProvider, UrlSource};
pub use viewer::{TilePlacement, TiledViewer};
pub use viewport::{BoundsPolicy, ViewportState};
pub use visible::{tile_screen_rect, visible_tiles, TileRange};
pub use widget::TiledImageWidget;
pub use zoom::{ZoomController, ZoomLimit, ZoomMode, ZoomOutcome, ZoomTarget};

#[cfg(target_arch = "wasm32")]
use app::ViewerApp;

/// Callbacks that can be registered from JavaScript
#[cfg(target_arch = "wasm32")]
#[derive(Default)]
pub struct ViewerCallbacks {
    /// Called after the image moved: { type, x, y }
    pub on_moved: Option<js_sys::Function>,
    /// Called after a zoom change or a refused zoom request
    pub on_zoomed: Option<js_sys::Function>,
    /// Called after the container was resized: { type, width, height }
    pub on_resized: Option<js_sys::Function>,
}

/// A handle to a viewer instance. Each handle manages its own canvas and state.
///
/// This struct is exposed to JavaScript and provides methods to control the viewer.
/// It holds an Rc to the widget so it can call methods on it, and also stores
/// the eframe runner for the application lifecycle.
#[cfg(target_arch = "wasm32")]
#[wasm_bindgen]
pub struct ViewerHandle {
    /// The widget instance (shared with ViewerApp)
    widget: Rc<RefCell<TiledImageWidget>>,
    /// Callbacks registered from JavaScript
    callbacks: Rc<RefCell<ViewerCallbacks>>,
    /// The eframe runner (kept alive to maintain the render loop)
    runner: eframe::WebRunner,
}

#[cfg(target_arch = "wasm32")]
#[wasm_bindgen]
impl ViewerHandle {
    /// Create a new viewer instance attached to the given canvas element.
    /// Returns a promise that resolves to a ViewerHandle when initialization completes.
    ///
    /// # Arguments
    /// * `metadata_json` - `{ width, height, tileWidth, tileHeight, levelCount, scalingPerLevel? }`
    /// * `url_source_json` - `{ kind: "path", prefix, extension? }` or `{ kind: "region", base }`
    /// * `config_json` - optional `ViewerConfig` overrides, e.g. `{ "marginTiles": 1 }`
    #[wasm_bindgen]
    pub async fn create(
        canvas: HtmlCanvasElement,
        metadata_json: String,
        url_source_json: String,
        config_json: Option<String>,
    ) -> Result<ViewerHandle, JsValue> {
        // Initialize logging for debug builds
        #[cfg(debug_assertions)]
        {
            eframe::WebLogger::init(log::LevelFilter::Debug).ok();
        }
        #[cfg(not(debug_assertions))]
        {
            eframe::WebLogger::init(log::LevelFilter::Warn).ok();
        }

        let metadata = PyramidMetadata::from_json(&metadata_json).map_err(to_js_error)?;
        let url_source: UrlSource = serde_json::from_str(&url_source_json)
            .map_err(|err| to_js_error(ViewerError::from(err)))?;
        let config = match config_json {
            Some(json) => ViewerConfig::from_json(&json).map_err(to_js_error)?,
            None => ViewerConfig::default(),
        };

        // Create the widget that will be shared between the handle and the app
        let widget = TiledImageWidget::new(metadata, url_source.into_provider(), &config).map_err(to_js_error)?;
        let widget = Rc::new(RefCell::new(widget));
        let widget_for_app = widget.clone();

        let callbacks = Rc::new(RefCell::new(ViewerCallbacks::default()));
        let callbacks_for_app = callbacks.clone();

        let web_options = eframe::WebOptions::default();
        let runner = eframe::WebRunner::new();

        runner
            .start(
                canvas,
                web_options,
                Box::new(move |cc| Ok(Box::new(ViewerApp::new(cc, widget_for_app.clone(), callbacks_for_app.clone())))),
            )
            .await?;

        Ok(ViewerHandle { widget, callbacks, runner })
    }

    /// End event loop and release resources
    #[wasm_bindgen(js_name = destroy)]
    pub fn destroy(&self) {
        self.clear_callbacks();
        self.runner.destroy();
    }

    /// Zoom in by one step around the viewport centre. Returns false at the limit.
    #[wasm_bindgen(js_name = zoomIn)]
    pub fn zoom_in(&self) -> bool {
        self.widget.borrow_mut().zoom_in().is_applied()
    }

    /// Zoom out by one step around the viewport centre. Returns false at the limit.
    #[wasm_bindgen(js_name = zoomOut)]
    pub fn zoom_out(&self) -> bool {
        self.widget.borrow_mut().zoom_out().is_applied()
    }

    /// Zoom to a level index (0 = most zoomed out)
    #[wasm_bindgen(js_name = zoomTo)]
    pub fn zoom_to(&self, level: u32) -> bool {
        self.widget.borrow_mut().zoom_to(ZoomTarget::Level(level)).is_applied()
    }

    /// Zoom to a display percent (100 = one screen pixel per image pixel)
    #[wasm_bindgen(js_name = zoomToPercent)]
    pub fn zoom_to_percent(&self, percent: f64) -> bool {
        self.widget.borrow_mut().zoom_to(ZoomTarget::Percent(percent)).is_applied()
    }

    /// Fit the whole image into the canvas
    #[wasm_bindgen(js_name = zoomToFit)]
    pub fn zoom_to_fit(&self) {
        self.widget.borrow_mut().zoom_to_fit();
    }

    /// Show the image at 100%
    #[wasm_bindgen(js_name = zoomActualSize)]
    pub fn zoom_actual_size(&self) {
        self.widget.borrow_mut().zoom_actual_size();
    }

    /// Get current zoom level index
    #[wasm_bindgen(js_name = getZoomLevel)]
    pub fn get_zoom_level(&self) -> u32 {
        self.widget.borrow().zoom_level()
    }

    /// Get current display scale (1.0 = 100%)
    #[wasm_bindgen(js_name = getScale)]
    pub fn get_scale(&self) -> f64 {
        self.widget.borrow().scale()
    }

    /// Move the image by a delta in canvas pixels
    #[wasm_bindgen(js_name = panBy)]
    pub fn pan_by(&self, dx: f64, dy: f64) {
        self.widget.borrow_mut().pan_by(dx, dy);
    }

    /// Center the view on a full-resolution image point
    #[wasm_bindgen(js_name = centerOn)]
    pub fn center_on(&self, x: f64, y: f64) {
        self.widget.borrow_mut().center_on(x, y);
    }

    /// Get visible image bounds as [xmin, xmax, ymin, ymax] in full-resolution pixels.
    #[wasm_bindgen(js_name = getViewBounds)]
    pub fn get_view_bounds(&self) -> js_sys::Float64Array {
        let (x0, y0, x1, y1) = self.widget.borrow().viewer().view_bounds();
        let result = js_sys::Float64Array::new_with_length(4);
        result.copy_from(&[x0, x1, y0, y1]);
        result
    }

    /// Drop all cached tiles and fetch the visible ones again
    #[wasm_bindgen(js_name = invalidateTiles)]
    pub fn invalidate_tiles(&self) {
        self.widget.borrow_mut().invalidate_tiles();
    }

    // =========================================================================
    // Callback registration
    // =========================================================================

    /// Register a callback for pan changes: { type, x, y }
    #[wasm_bindgen(js_name = onMoved)]
    pub fn on_moved(&self, callback: js_sys::Function) {
        self.callbacks.borrow_mut().on_moved = Some(callback);
    }

    /// Register a callback for zoom changes:
    /// { type, zoomLevel, scale, visibleWidth, visibleHeight }, or { type, limit }
    /// when a request was refused
    #[wasm_bindgen(js_name = onZoomed)]
    pub fn on_zoomed(&self, callback: js_sys::Function) {
        self.callbacks.borrow_mut().on_zoomed = Some(callback);
    }

    /// Register a callback for canvas size changes: { type, width, height }
    #[wasm_bindgen(js_name = onResized)]
    pub fn on_resized(&self, callback: js_sys::Function) {
        self.callbacks.borrow_mut().on_resized = Some(callback);
    }

    /// Clear all registered callbacks.
    #[wasm_bindgen(js_name = clearCallbacks)]
    pub fn clear_callbacks(&self) {
        let mut callbacks = self.callbacks.borrow_mut();
        callbacks.on_moved = None;
        callbacks.on_zoomed = None;
        callbacks.on_resized = None;
    }
}

#[cfg(target_arch = "wasm32")]
fn to_js_error(err: ViewerError) -> JsValue {
    JsValue::from_str(&err.to_string())
}
