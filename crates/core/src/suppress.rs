use std::cell::Cell;
use std::rc::Rc;

use crate::error::SuppressionError;

/// The page-wide scroll-suppression primitive.
///
/// Only the registry calls this, and only on a transition of the lock set
/// between empty and non-empty.
pub trait ScrollSuppressor {
    fn apply(&mut self) -> Result<(), SuppressionError>;
    fn remove(&mut self) -> Result<(), SuppressionError>;
}

impl<S: ScrollSuppressor + ?Sized> ScrollSuppressor for Box<S> {
    fn apply(&mut self) -> Result<(), SuppressionError> {
        (**self).apply()
    }

    fn remove(&mut self) -> Result<(), SuppressionError> {
        (**self).remove()
    }
}

/// In-memory suppressor backed by a shared boolean.
///
/// Hosts that own their own scrolling (the terminal player) read
/// [`FlagSuppressor::is_active`] through a [`SuppressionProbe`] to decide
/// whether scroll input is honoured.
#[derive(Debug, Default)]
pub struct FlagSuppressor {
    state: Rc<SuppressionState>,
}

#[derive(Debug, Default)]
struct SuppressionState {
    active: Cell<bool>,
    applies: Cell<usize>,
    removes: Cell<usize>,
}

/// Read-only view of a [`FlagSuppressor`] that stays valid after the
/// suppressor has been moved into a registry.
#[derive(Debug, Clone)]
pub struct SuppressionProbe {
    state: Rc<SuppressionState>,
}

impl FlagSuppressor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn probe(&self) -> SuppressionProbe {
        SuppressionProbe {
            state: Rc::clone(&self.state),
        }
    }

    pub fn is_active(&self) -> bool {
        self.state.active.get()
    }
}

impl SuppressionProbe {
    pub fn is_active(&self) -> bool {
        self.state.active.get()
    }

    /// Number of `apply` calls seen so far.
    pub fn applies(&self) -> usize {
        self.state.applies.get()
    }

    /// Number of `remove` calls seen so far.
    pub fn removes(&self) -> usize {
        self.state.removes.get()
    }
}

impl ScrollSuppressor for FlagSuppressor {
    fn apply(&mut self) -> Result<(), SuppressionError> {
        self.state.applies.set(self.state.applies.get() + 1);
        self.state.active.set(true);
        Ok(())
    }

    fn remove(&mut self) -> Result<(), SuppressionError> {
        self.state.removes.set(self.state.removes.get() + 1);
        self.state.active.set(false);
        Ok(())
    }
}
