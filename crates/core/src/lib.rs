//! Viewport-driven scroll lock.
//!
//! Each full-screen section mounts an [`IntersectionReporter`] that requests
//! a lock from the page's [`LockRegistry`] while the section is in view and
//! its owner has not flagged it complete. Page scrolling is suppressed
//! exactly while at least one lock is held.
//!
//! The two outside primitives, viewport intersection and scroll
//! suppression, are traits ([`ViewportObserver`], [`ScrollSuppressor`]) so
//! the same core runs behind a browser bridge, a terminal host or a test.

pub mod config;
pub mod error;
pub mod flag;
pub mod observe;
pub mod page;
pub mod registry;
pub mod reporter;
pub mod suppress;

pub use config::{ScrollLockConfig, SuppressionStyle};
pub use error::{ConfigError, SuppressionAction, SuppressionError};
pub use flag::{CompletionFlag, FlagSubscription};
pub use observe::{
    ManualObservation, ManualViewport, ObservationHandle, ViewportObserver, VisibilityCallback,
};
pub use page::{MountedSection, Page, Section};
pub use registry::LockRegistry;
pub use reporter::IntersectionReporter;
pub use suppress::{FlagSuppressor, ScrollSuppressor, SuppressionProbe};

pub use scrollgate_protocol as protocol;
