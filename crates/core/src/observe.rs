use std::cell::RefCell;
use std::rc::{Rc, Weak};

use scrollgate_protocol::{SectionId, Threshold, VisibilityEvent};
use tracing::trace;

use crate::error::SuppressionError;

/// Receives `is_intersecting` (threshold already applied) on every
/// visibility change of one observed target.
pub type VisibilityCallback = Box<dyn FnMut(bool) -> Result<(), SuppressionError>>;

/// A live subscription to a viewport primitive.
pub trait ObservationHandle {
    /// Stop delivering events. Calling this more than once is harmless.
    fn disconnect(&mut self);
}

/// The viewport-intersection primitive.
///
/// Built with a fixed area threshold; delivers an event whenever an observed
/// target crosses it. Errors returned by the callback belong to whoever
/// drives the primitive.
pub trait ViewportObserver {
    type Target: ?Sized;
    type Handle: ObservationHandle;

    fn threshold(&self) -> Threshold;

    fn observe(&mut self, target: &Self::Target, on_change: VisibilityCallback) -> Self::Handle;
}

/// In-memory viewport for hosts that compute visibility themselves.
///
/// Targets are named by [`SectionId`]. The host calls
/// [`ManualViewport::report`] with each target's visible-area ratio; like
/// the browser primitive, an observer hears about the first report and
/// afterwards only about threshold crossings.
#[derive(Clone)]
pub struct ManualViewport {
    inner: Rc<RefCell<ManualInner>>,
}

struct ManualInner {
    threshold: Threshold,
    observations: Vec<Observation>,
    next_key: u64,
    seq: u64,
}

struct Observation {
    key: u64,
    target: SectionId,
    last: Option<bool>,
    /// `None` while the callback is running.
    callback: Option<VisibilityCallback>,
}

impl ManualViewport {
    pub fn new(threshold: Threshold) -> Self {
        Self {
            inner: Rc::new(RefCell::new(ManualInner {
                threshold,
                observations: Vec::new(),
                next_key: 0,
                seq: 0,
            })),
        }
    }

    /// Report the visible-area ratio of `target`.
    ///
    /// Returns the delivered event, or `None` when no observer of `target`
    /// saw a change. Every interested observer is notified even if one of
    /// them fails; the first error is returned.
    pub fn report(
        &self,
        target: &str,
        ratio: f64,
    ) -> Result<Option<VisibilityEvent>, SuppressionError> {
        let (intersecting, due, seq) = {
            let mut inner = self.inner.borrow_mut();
            let intersecting = inner.threshold.is_met(ratio);
            let mut due = Vec::new();
            for obs in inner.observations.iter_mut() {
                if obs.target.as_str() == target && obs.last != Some(intersecting) {
                    obs.last = Some(intersecting);
                    due.push(obs.key);
                }
            }
            if due.is_empty() {
                return Ok(None);
            }
            inner.seq += 1;
            (intersecting, due, inner.seq)
        };
        trace!(section = target, ratio, intersecting, seq, "visibility changed");

        let mut first_err = None;
        for key in due {
            // Take the callback out so it can run without the viewport borrowed.
            let Some(mut callback) = self.take_callback(key) else {
                continue;
            };
            let result = callback(intersecting);
            self.restore_callback(key, callback);
            if let Err(e) = result {
                first_err = first_err.or(Some(e));
            }
        }

        match first_err {
            Some(e) => Err(e),
            None => Ok(Some(VisibilityEvent {
                section: SectionId::from(target),
                intersecting,
                seq,
            })),
        }
    }

    /// Number of live observations.
    pub fn observer_count(&self) -> usize {
        self.inner.borrow().observations.len()
    }

    fn take_callback(&self, key: u64) -> Option<VisibilityCallback> {
        self.inner
            .borrow_mut()
            .observations
            .iter_mut()
            .find(|o| o.key == key)
            .and_then(|o| o.callback.take())
    }

    fn restore_callback(&self, key: u64, callback: VisibilityCallback) {
        // The observation may have been disconnected from inside the callback.
        if let Some(obs) = self
            .inner
            .borrow_mut()
            .observations
            .iter_mut()
            .find(|o| o.key == key)
        {
            obs.callback = Some(callback);
        }
    }
}

impl ViewportObserver for ManualViewport {
    type Target = SectionId;
    type Handle = ManualObservation;

    fn threshold(&self) -> Threshold {
        self.inner.borrow().threshold
    }

    fn observe(&mut self, target: &SectionId, on_change: VisibilityCallback) -> ManualObservation {
        let mut inner = self.inner.borrow_mut();
        let key = inner.next_key;
        inner.next_key += 1;
        inner.observations.push(Observation {
            key,
            target: target.clone(),
            last: None,
            callback: Some(on_change),
        });
        ManualObservation {
            viewport: Rc::downgrade(&self.inner),
            key,
        }
    }
}

pub struct ManualObservation {
    viewport: Weak<RefCell<ManualInner>>,
    key: u64,
}

impl ObservationHandle for ManualObservation {
    fn disconnect(&mut self) {
        if let Some(inner) = self.viewport.upgrade() {
            inner.borrow_mut().observations.retain(|o| o.key != self.key);
        }
    }
}
