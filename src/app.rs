//! Thin eframe App shell that hosts the widget and forwards its events to JS

use std::cell::RefCell;
use std::rc::Rc;

use wasm_bindgen::JsValue;

use crate::events::ViewerEvent;
use crate::zoom::ZoomLimit;
use crate::widget::TiledImageWidget;
use crate::ViewerCallbacks;

/// The egui application for the viewer
pub struct ViewerApp {
    widget: Rc<RefCell<TiledImageWidget>>,
    callbacks: Rc<RefCell<ViewerCallbacks>>,
}

impl ViewerApp {
    pub fn new(
        _cc: &eframe::CreationContext<'_>,
        widget: Rc<RefCell<TiledImageWidget>>,
        callbacks: Rc<RefCell<ViewerCallbacks>>,
    ) -> Self {
        Self { widget, callbacks }
    }

    /// Call the registered callback for each event
    fn dispatch(&self, events: Vec<ViewerEvent>) {
        let callbacks = self.callbacks.borrow();
        for event in events {
            let callback = match event {
                ViewerEvent::Moved { .. } => callbacks.on_moved.as_ref(),
                ViewerEvent::Zoomed { .. } | ViewerEvent::ZoomLimitReached(_) => callbacks.on_zoomed.as_ref(),
                ViewerEvent::Resized { .. } => callbacks.on_resized.as_ref(),
            };
            if let Some(callback) = callback {
                if let Err(err) = callback.call1(&JsValue::NULL, &event_to_js(&event)) {
                    log::warn!("{} callback failed: {:?}", event.name(), err);
                }
            }
        }
    }
}

impl eframe::App for ViewerApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        egui::CentralPanel::default()
            .frame(egui::Frame::NONE)
            .show(ctx, |ui| {
                let size = ui.available_size();
                self.widget.borrow_mut().show(ui, size);
            });

        // Callbacks may call back into the handle, so the widget borrow is released first
        let events = self.widget.borrow_mut().take_events();
        if !events.is_empty() {
            self.dispatch(events);
        }
    }
}

/// Build the plain object passed to a JS callback
fn event_to_js(event: &ViewerEvent) -> JsValue {
    let obj = js_sys::Object::new();
    let set = |key: &str, value: JsValue| {
        let _ = js_sys::Reflect::set(&obj, &JsValue::from_str(key), &value);
    };
    set("type", JsValue::from_str(event.name()));
    match *event {
        ViewerEvent::Moved { x, y } => {
            set("x", x.into());
            set("y", y.into());
        }
        ViewerEvent::Zoomed {
            level,
            scale,
            visible_width,
            visible_height,
        } => {
            set("zoomLevel", level.into());
            set("scale", scale.into());
            set("visibleWidth", visible_width.into());
            set("visibleHeight", visible_height.into());
        }
        ViewerEvent::Resized { width, height } => {
            set("width", width.into());
            set("height", height.into());
        }
        ViewerEvent::ZoomLimitReached(limit) => {
            let which = match limit {
                ZoomLimit::Min => "min",
                ZoomLimit::Max => "max",
            };
            set("limit", JsValue::from_str(which));
        }
    }
    obj.into()
}
