use serde::{Deserialize, Serialize};

use crate::section_id::SectionId;

/// One visibility change delivered by a viewport primitive.
///
/// Transient; only the arrival order (`seq`) carries time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VisibilityEvent {
    pub section: SectionId,
    /// Whether the section crosses the intersection threshold.
    pub intersecting: bool,
    pub seq: u64,
}

/// A registry journal entry.
///
/// Only effective changes are journaled: a repeated `request_lock` for a
/// held id or a stale `release_lock` never produces an entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LockEvent {
    /// A section joined the lock set.
    Locked { section: SectionId },

    /// A section left the lock set.
    Released { section: SectionId },

    /// Page scrolling became suppressed.
    SuppressionApplied,

    /// Page scrolling is allowed again.
    SuppressionRemoved,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lock_event_is_tagged() {
        let ev = LockEvent::Locked {
            section: "hero".into(),
        };
        let json = serde_json::to_string(&ev).expect("event serializes");
        assert_eq!(json, r#"{"kind":"locked","section":"hero"}"#);

        let json =
            serde_json::to_string(&LockEvent::SuppressionRemoved).expect("event serializes");
        assert_eq!(json, r#"{"kind":"suppression_removed"}"#);
    }

    #[test]
    fn lock_event_parses_back() {
        let ev: LockEvent = serde_json::from_str(r#"{"kind":"released","section":"gallery"}"#)
            .expect("tagged event parses");
        assert_eq!(
            ev,
            LockEvent::Released {
                section: "gallery".into()
            }
        );
    }
}
