//! Browser tile fetching
//!
//! `FetchLoader` starts one `fetch()` per tile on the browser event loop and
//! parks the decoded result in an inbox. The widget drains the inbox at the
//! start of each frame and hands the results to the viewer, so cache state only
//! changes on the UI thread.

use std::cell::RefCell;
use std::rc::Rc;

use egui::ColorImage;

use crate::cache::TileLoader;
use crate::error::ViewerError;
use crate::pyramid::TileKey;

/// A finished fetch, successful or not
pub struct LoadResult {
    pub key: TileKey,
    /// The URL the fetch was started for
    pub url: String,
    pub image: Result<ColorImage, ViewerError>,
}

type Inbox = Rc<RefCell<Vec<LoadResult>>>;

pub struct FetchLoader {
    inbox: Inbox,
    /// Repainted when a result arrives
    ctx: Option<egui::Context>,
    in_flight: usize,
}

impl FetchLoader {
    pub fn new(ctx: Option<egui::Context>) -> Self {
        Self {
            inbox: Rc::new(RefCell::new(Vec::new())),
            ctx,
            in_flight: 0,
        }
    }

    /// Context to wake when results arrive
    pub fn set_context(&mut self, ctx: egui::Context) {
        self.ctx = Some(ctx);
    }

    /// Take every result that arrived since the last call
    pub fn drain(&mut self) -> Vec<LoadResult> {
        let results = std::mem::take(&mut *self.inbox.borrow_mut());
        self.in_flight = self.in_flight.saturating_sub(results.len());
        results
    }

    /// Fetches started but not yet drained
    pub fn in_flight(&self) -> usize {
        self.in_flight
    }
}

impl TileLoader for FetchLoader {
    fn begin_load(&mut self, key: TileKey, url: &str) {
        self.in_flight += 1;
        spawn_fetch(self.inbox.clone(), self.ctx.clone(), key, url.to_string());
    }
}

#[cfg(target_arch = "wasm32")]
fn spawn_fetch(inbox: Inbox, ctx: Option<egui::Context>, key: TileKey, url: String) {
    wasm_bindgen_futures::spawn_local(async move {
        let image = match fetch_bytes(&url).await {
            Ok(bytes) => decode_tile(&bytes).map_err(ViewerError::from),
            Err(err) => Err(ViewerError::Fetch {
                url: url.clone(),
                reason: err.as_string().unwrap_or_else(|| format!("{:?}", err)),
            }),
        };
        inbox.borrow_mut().push(LoadResult { key, url, image });
        if let Some(ctx) = ctx {
            ctx.request_repaint();
        }
    });
}

/// Outside the browser there is nothing to fetch with; every load fails
#[cfg(not(target_arch = "wasm32"))]
fn spawn_fetch(inbox: Inbox, ctx: Option<egui::Context>, key: TileKey, url: String) {
    let image = Err(ViewerError::Fetch {
        url: url.clone(),
        reason: "tile fetching is only available in the browser".to_string(),
    });
    inbox.borrow_mut().push(LoadResult { key, url, image });
    if let Some(ctx) = ctx {
        ctx.request_repaint();
    }
}

#[cfg(target_arch = "wasm32")]
async fn fetch_bytes(url: &str) -> Result<Vec<u8>, wasm_bindgen::JsValue> {
    use wasm_bindgen::{JsCast, JsValue};
    use wasm_bindgen_futures::JsFuture;

    let window = web_sys::window().ok_or_else(|| JsValue::from_str("no window"))?;

    let opts = web_sys::RequestInit::new();
    opts.set_method("GET");
    opts.set_mode(web_sys::RequestMode::Cors);
    let request = web_sys::Request::new_with_str_and_init(url, &opts)?;

    let response: web_sys::Response = JsFuture::from(window.fetch_with_request(&request))
        .await?
        .dyn_into()?;
    if !response.ok() {
        return Err(JsValue::from_str(&format!("HTTP {}", response.status())));
    }

    let buffer = JsFuture::from(response.array_buffer()?).await?;
    Ok(js_sys::Uint8Array::new(&buffer).to_vec())
}

/// Decode a JPEG or PNG tile into an egui image
pub fn decode_tile(bytes: &[u8]) -> Result<ColorImage, image::ImageError> {
    let rgba = image::load_from_memory(bytes)?.to_rgba8();
    let size = [rgba.width() as usize, rgba.height() as usize];
    Ok(ColorImage::from_rgba_unmultiplied(size, rgba.as_raw()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use egui::Color32;
    use std::io::Cursor;

    fn png_bytes() -> Vec<u8> {
        let mut img = image::RgbaImage::new(3, 2);
        img.put_pixel(0, 0, image::Rgba([255, 0, 0, 255]));
        img.put_pixel(2, 1, image::Rgba([0, 0, 255, 255]));
        let mut bytes = Vec::new();
        img.write_to(&mut Cursor::new(&mut bytes), image::ImageFormat::Png)
            .unwrap();
        bytes
    }

    #[test]
    fn test_decode_png() {
        let image = decode_tile(&png_bytes()).unwrap();
        assert_eq!(image.size, [3, 2]);
        assert_eq!(image.pixels[0], Color32::from_rgb(255, 0, 0));
        assert_eq!(image.pixels[5], Color32::from_rgb(0, 0, 255));
    }

    #[test]
    fn test_decode_garbage_fails() {
        assert!(decode_tile(b"not an image").is_err());
        assert!(decode_tile(&[]).is_err());
    }

    #[cfg(not(target_arch = "wasm32"))]
    #[test]
    fn test_native_loads_fail_into_inbox() {
        let mut loader = FetchLoader::new(None);
        let key = TileKey::new(1, 2, 3);
        loader.begin_load(key, "/tiles/1-2-3.jpg");
        assert_eq!(loader.in_flight(), 1);

        let results = loader.drain();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].key, key);
        assert_eq!(results[0].url, "/tiles/1-2-3.jpg");
        assert!(matches!(results[0].image, Err(ViewerError::Fetch { .. })));
        assert_eq!(loader.in_flight(), 0);
        assert!(loader.drain().is_empty());
    }
}
