//! Input-source independent gesture interface
//!
//! Pointer, touch and keyboard specifics stay in the widget; the viewer only
//! sees these calls. Positions are viewport pixels and `now` is seconds on the
//! same clock the viewer's `update` receives.

pub trait InputAdapter {
    fn on_pan_start(&mut self, x: f64, y: f64, now: f64);

    fn on_pan_move(&mut self, x: f64, y: f64, now: f64);

    fn on_pan_end(&mut self, now: f64);

    /// Pinch or ctrl-wheel zoom. `factor` > 1 zooms in.
    fn on_zoom_gesture(&mut self, factor: f64, focal: (f64, f64), now: f64);
}
