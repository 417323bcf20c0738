use std::cell::RefCell;
use std::rc::{Rc, Weak};

use js_sys::Array;
use scrollgate_core::{
    ObservationHandle, ScrollSuppressor, SuppressionError, SuppressionStyle, ViewportObserver,
    VisibilityCallback,
};
use scrollgate_protocol::Threshold;
use tracing::trace;
use wasm_bindgen::JsCast;
use wasm_bindgen::prelude::*;
use web_sys::{
    Element, HtmlElement, IntersectionObserver, IntersectionObserverEntry,
    IntersectionObserverInit,
};

/// Suppresses page scrolling by toggling one style property on
/// `document.body`.
pub struct BodySuppressor {
    style: SuppressionStyle,
}

impl BodySuppressor {
    pub fn new(style: SuppressionStyle) -> Self {
        Self { style }
    }
}

impl ScrollSuppressor for BodySuppressor {
    fn apply(&mut self) -> Result<(), SuppressionError> {
        let body = document_body().map_err(SuppressionError::apply)?;
        body.style()
            .set_property(&self.style.property, &self.style.value)
            .map_err(|e| SuppressionError::apply(js_message(&e)))
    }

    fn remove(&mut self) -> Result<(), SuppressionError> {
        let body = document_body().map_err(SuppressionError::remove)?;
        body.style()
            .remove_property(&self.style.property)
            .map(|_| ())
            .map_err(|e| SuppressionError::remove(js_message(&e)))
    }
}

fn document_body() -> Result<HtmlElement, String> {
    web_sys::window()
        .and_then(|w| w.document())
        .and_then(|d| d.body())
        .ok_or_else(|| "document has no body".to_string())
}

pub(crate) fn js_message(value: &JsValue) -> String {
    value.as_string().unwrap_or_else(|| format!("{value:?}"))
}

type EntriesCallback = dyn FnMut(Array) -> Result<(), JsValue>;

struct WebTarget {
    key: u64,
    element: Element,
    last: Option<bool>,
    callback: Option<VisibilityCallback>,
}

type Targets = Rc<RefCell<Vec<WebTarget>>>;

/// One browser `IntersectionObserver` shared by every section of a page.
///
/// Entries are matched back to sections by element identity. The browser
/// reports a ratio crossing at the configured threshold; an entry counts as
/// intersecting only if the ratio also meets the threshold.
pub struct WebViewport {
    threshold: Threshold,
    observer: IntersectionObserver,
    targets: Targets,
    next_key: u64,
    _on_entries: Closure<EntriesCallback>,
}

impl WebViewport {
    pub fn new(threshold: Threshold) -> Result<Self, JsValue> {
        let targets: Targets = Rc::default();
        let weak = Rc::downgrade(&targets);
        let on_entries = Closure::<EntriesCallback>::new(move |entries: Array| {
            dispatch(&weak, &entries, threshold)
        });

        let options = IntersectionObserverInit::new();
        options.set_threshold(&JsValue::from_f64(threshold.fraction()));
        let observer =
            IntersectionObserver::new_with_options(on_entries.as_ref().unchecked_ref(), &options)?;

        Ok(Self {
            threshold,
            observer,
            targets,
            next_key: 0,
            _on_entries: on_entries,
        })
    }
}

impl Drop for WebViewport {
    fn drop(&mut self) {
        self.observer.disconnect();
    }
}

impl ViewportObserver for WebViewport {
    type Target = Element;
    type Handle = WebObservation;

    fn threshold(&self) -> Threshold {
        self.threshold
    }

    fn observe(&mut self, target: &Element, on_change: VisibilityCallback) -> WebObservation {
        let key = self.next_key;
        self.next_key += 1;
        self.targets.borrow_mut().push(WebTarget {
            key,
            element: target.clone(),
            last: None,
            callback: Some(on_change),
        });
        self.observer.observe(target);
        WebObservation {
            key,
            element: target.clone(),
            observer: self.observer.clone(),
            targets: Rc::downgrade(&self.targets),
            connected: true,
        }
    }
}

pub struct WebObservation {
    key: u64,
    element: Element,
    observer: IntersectionObserver,
    targets: Weak<RefCell<Vec<WebTarget>>>,
    connected: bool,
}

impl ObservationHandle for WebObservation {
    fn disconnect(&mut self) {
        if !std::mem::replace(&mut self.connected, false) {
            return;
        }
        let Some(targets) = self.targets.upgrade() else {
            return;
        };
        let mut targets = targets.borrow_mut();
        targets.retain(|t| t.key != self.key);
        if !targets.iter().any(|t| same_element(&t.element, &self.element)) {
            self.observer.unobserve(&self.element);
        }
    }
}

fn same_element(a: &Element, b: &Element) -> bool {
    let a: &JsValue = a.as_ref();
    let b: &JsValue = b.as_ref();
    a == b
}

/// Slack allowed below the threshold. Browsers deliver the crossing entry
/// with a ratio computed from rounded layout, e.g. 0.4999 at 0.5.
const RATIO_TOLERANCE: f64 = 1e-3;

fn entry_intersects(is_intersecting: bool, ratio: f64, threshold: Threshold) -> bool {
    is_intersecting && ratio > 0.0 && threshold.is_met((ratio + RATIO_TOLERANCE).min(1.0))
}

fn dispatch(
    weak: &Weak<RefCell<Vec<WebTarget>>>,
    entries: &Array,
    threshold: Threshold,
) -> Result<(), JsValue> {
    let Some(targets) = weak.upgrade() else {
        return Ok(());
    };
    let mut first_err: Option<SuppressionError> = None;

    for entry in entries.iter() {
        let entry: IntersectionObserverEntry = entry.unchecked_into();
        let intersecting =
            entry_intersects(entry.is_intersecting(), entry.intersection_ratio(), threshold);
        let element = entry.target();

        let due: Vec<u64> = targets
            .borrow_mut()
            .iter_mut()
            .filter(|t| same_element(&t.element, &element) && t.last != Some(intersecting))
            .map(|t| {
                t.last = Some(intersecting);
                t.key
            })
            .collect();
        if !due.is_empty() {
            trace!(ratio = entry.intersection_ratio(), intersecting, "intersection entry");
        }

        for key in due {
            let taken = targets
                .borrow_mut()
                .iter_mut()
                .find(|t| t.key == key)
                .and_then(|t| t.callback.take());
            let Some(mut callback) = taken else {
                continue;
            };
            let result = callback(intersecting);
            if let Some(t) = targets.borrow_mut().iter_mut().find(|t| t.key == key) {
                t.callback = Some(callback);
            }
            if let Err(e) = result {
                first_err = first_err.or(Some(e));
            }
        }
    }

    match first_err {
        Some(e) => Err(JsError::new(&e.to_string()).into()),
        None => Ok(()),
    }
}
