mod dom;

use std::collections::HashMap;

use scrollgate_core::{MountedSection, Page, ScrollLockConfig, Section};
use scrollgate_protocol::SectionId;
use tracing::debug;
use wasm_bindgen::prelude::*;
use web_sys::Element;

pub use dom::{BodySuppressor, WebObservation, WebViewport};

/// Scroll-lock state for one page load, exposed to JavaScript.
///
/// Create one at the page root, mount every full-screen section with its
/// element, and call `teardown()` (or `free()`) when the page goes away.
#[wasm_bindgen]
pub struct ScrollLockPage {
    sections: HashMap<SectionId, MountedSection<(), WebObservation>>,
    viewport: WebViewport,
    page: Option<Page>,
}

#[wasm_bindgen]
impl ScrollLockPage {
    /// `config_json` follows `ScrollLockConfig`; omit it for the defaults
    /// (50 % threshold, `overflow: hidden` on the body).
    #[wasm_bindgen(constructor)]
    pub fn new(config_json: Option<String>) -> Result<ScrollLockPage, JsError> {
        let config = match config_json {
            Some(json) => ScrollLockConfig::from_json(json.as_bytes())
                .map_err(|e| JsError::new(&e.to_string()))?,
            None => ScrollLockConfig::default(),
        };
        let viewport = WebViewport::new(config.threshold())
            .map_err(|e| JsError::new(&dom::js_message(&e)))?;
        let suppressor = BodySuppressor::new(config.suppression.clone());
        Ok(Self {
            sections: HashMap::new(),
            viewport,
            page: Some(Page::new(config, suppressor)),
        })
    }

    /// Start observing `element` as section `id`.
    ///
    /// Ids must be unique among mounted sections; mounting a live id again
    /// is rejected.
    #[wasm_bindgen(js_name = mountSection)]
    pub fn mount_section(
        &mut self,
        id: &str,
        element: &Element,
        has_viewed_all: bool,
    ) -> Result<(), JsError> {
        let Some(page) = &self.page else {
            return Err(JsError::new("page has been torn down"));
        };
        if self.sections.contains_key(id) {
            return Err(JsError::new(&format!("section {id:?} is already mounted")));
        }
        let section = Section::new(id, has_viewed_all, ());
        let key = section.id().clone();
        let mounted = page.mount(section, &mut self.viewport, element);
        debug!(section = id, has_viewed_all, "section mounted");
        self.sections.insert(key, mounted);
        Ok(())
    }

    /// Push the owner's latest completion state for section `id`.
    #[wasm_bindgen(js_name = setHasViewedAll)]
    pub fn set_has_viewed_all(&self, id: &str, value: bool) -> Result<(), JsError> {
        let section = self
            .sections
            .get(id)
            .ok_or_else(|| JsError::new(&format!("section {id:?} is not mounted")))?;
        section
            .set_has_viewed_all(value)
            .map_err(|e| JsError::new(&e.to_string()))
    }

    /// Stop observing section `id` and release its lock. Unknown ids are
    /// ignored.
    #[wasm_bindgen(js_name = unmountSection)]
    pub fn unmount_section(&mut self, id: &str) -> Result<(), JsError> {
        let Some(section) = self.sections.remove(id) else {
            return Ok(());
        };
        debug!(section = id, "section unmounted");
        section.unmount().map_err(|e| JsError::new(&e.to_string()))
    }

    #[wasm_bindgen(js_name = isScrollLocked)]
    pub fn is_scroll_locked(&self) -> bool {
        self.page
            .as_ref()
            .is_some_and(|p| p.registry().is_suppressed())
    }

    /// Current lock holders and suppression state as JSON.
    pub fn snapshot(&self) -> Result<String, JsError> {
        let snapshot = self
            .page
            .as_ref()
            .map(|p| p.registry().snapshot())
            .unwrap_or_default();
        serde_json::to_string(&snapshot).map_err(|e| JsError::new(&e.to_string()))
    }

    /// Lock events since the last call, as a JSON array.
    #[wasm_bindgen(js_name = drainEvents)]
    pub fn drain_events(&self) -> Result<String, JsError> {
        let events = self
            .page
            .as_ref()
            .map(|p| p.registry().drain_events())
            .unwrap_or_default();
        serde_json::to_string(&events).map_err(|e| JsError::new(&e.to_string()))
    }

    /// Unmount every section and lift suppression. Further mounts fail.
    pub fn teardown(&mut self) -> Result<(), JsError> {
        let mut first_err = None;
        for (_, section) in self.sections.drain() {
            if let Err(e) = section.unmount() {
                first_err = first_err.or(Some(e));
            }
        }
        if let Some(page) = self.page.take()
            && let Err(e) = page.teardown()
        {
            first_err = first_err.or(Some(e));
        }
        match first_err {
            Some(e) => Err(JsError::new(&e.to_string())),
            None => Ok(()),
        }
    }
}
