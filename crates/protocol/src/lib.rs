pub mod events;
pub mod section_id;
pub mod types;

pub use events::{LockEvent, VisibilityEvent};
pub use section_id::SectionId;
pub use types::{LockState, RegistrySnapshot, Threshold};
