use std::borrow::Borrow;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// Page-unique name of one full-screen section, chosen by its owner.
///
/// The registry, the reporter and host tables all hold clones of the same
/// `Arc<str>`. Ordering and hashing follow the underlying `str`, so sets
/// keyed by `SectionId` can be queried with a plain `&str`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SectionId(Arc<str>);

impl SectionId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for SectionId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl From<&str> for SectionId {
    fn from(s: &str) -> Self {
        SectionId(Arc::from(s))
    }
}

impl From<String> for SectionId {
    fn from(s: String) -> Self {
        SectionId(Arc::from(s))
    }
}

impl fmt::Display for SectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
