use serde::{Deserialize, Serialize};

use crate::section_id::SectionId;

/// Fraction of a section's area that must be inside the viewport before the
/// section counts as "in view" for locking.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "f64", into = "f64")]
pub struct Threshold(f64);

impl Threshold {
    /// Half of the section's area.
    pub const HALF: Threshold = Threshold(0.5);

    /// Returns `None` unless `fraction` is finite and in `(0, 1]`.
    pub fn new(fraction: f64) -> Option<Self> {
        (fraction.is_finite() && fraction > 0.0 && fraction <= 1.0).then_some(Self(fraction))
    }

    pub fn fraction(self) -> f64 {
        self.0
    }

    /// Whether a visible-area ratio counts as intersecting.
    ///
    /// A ratio of zero never counts, even though the browser reports an
    /// edge-adjacent element as intersecting.
    pub fn is_met(self, ratio: f64) -> bool {
        ratio > 0.0 && ratio >= self.0
    }
}

impl Default for Threshold {
    fn default() -> Self {
        Self::HALF
    }
}

impl TryFrom<f64> for Threshold {
    type Error = String;

    fn try_from(value: f64) -> Result<Self, Self::Error> {
        Threshold::new(value).ok_or_else(|| format!("threshold {value} is outside (0, 1]"))
    }
}

impl From<Threshold> for f64 {
    fn from(t: Threshold) -> f64 {
        t.0
    }
}

/// Per-section lock state as driven by its reporter.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LockState {
    #[default]
    Unlocked,
    Locked,
}

impl LockState {
    /// A section holds the lock only while it is in view and the visitor
    /// has not seen everything in it yet.
    pub fn decide(intersecting: bool, has_viewed_all: bool) -> Self {
        if intersecting && !has_viewed_all {
            LockState::Locked
        } else {
            LockState::Unlocked
        }
    }

    pub fn is_locked(self) -> bool {
        self == LockState::Locked
    }
}

/// Point-in-time view of the registry, handed to hosts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistrySnapshot {
    /// Sections currently holding a lock, sorted ascending.
    pub holders: Vec<SectionId>,
    /// Whether page scrolling is currently suppressed.
    pub suppressed: bool,
}
