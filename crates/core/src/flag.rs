use std::cell::{Cell, RefCell};
use std::rc::Rc;

use crate::error::SuppressionError;

pub type FlagCallback = Box<dyn FnMut(bool) -> Result<(), SuppressionError>>;

/// Live "has the visitor seen everything" signal owned by a section.
///
/// The section's own logic decides when to flip it. Reporters subscribe and
/// re-evaluate on every change, so the lock reacts to the latest value
/// rather than the value seen at mount time.
#[derive(Clone, Default)]
pub struct CompletionFlag {
    inner: Rc<FlagInner>,
}

#[derive(Default)]
struct FlagInner {
    value: Cell<bool>,
    subscribers: RefCell<Vec<Subscriber>>,
    next_key: Cell<u64>,
}

struct Subscriber {
    key: u64,
    callback: Option<FlagCallback>,
}

/// Returned by [`CompletionFlag::subscribe`]; pass it back to unsubscribe.
#[must_use = "dropping the subscription token leaks the callback"]
#[derive(Debug, PartialEq, Eq)]
pub struct FlagSubscription {
    key: u64,
}

impl CompletionFlag {
    pub fn new(has_viewed_all: bool) -> Self {
        let flag = Self::default();
        flag.inner.value.set(has_viewed_all);
        flag
    }

    pub fn get(&self) -> bool {
        self.inner.value.get()
    }

    /// Update the flag and notify subscribers if the value changed.
    ///
    /// Every subscriber runs even if an earlier one fails; the first error
    /// is returned.
    pub fn set(&self, has_viewed_all: bool) -> Result<(), SuppressionError> {
        if self.inner.value.replace(has_viewed_all) == has_viewed_all {
            return Ok(());
        }
        let keys: Vec<u64> = self.inner.subscribers.borrow().iter().map(|s| s.key).collect();
        let mut first_err = None;
        for key in keys {
            let Some(mut callback) = self.take(key) else {
                continue;
            };
            let result = callback(has_viewed_all);
            self.restore(key, callback);
            if let Err(e) = result {
                first_err = first_err.or(Some(e));
            }
        }
        first_err.map_or(Ok(()), Err)
    }

    pub fn subscribe(&self, callback: FlagCallback) -> FlagSubscription {
        let key = self.inner.next_key.get();
        self.inner.next_key.set(key + 1);
        self.inner.subscribers.borrow_mut().push(Subscriber {
            key,
            callback: Some(callback),
        });
        FlagSubscription { key }
    }

    pub fn unsubscribe(&self, subscription: FlagSubscription) {
        self.inner
            .subscribers
            .borrow_mut()
            .retain(|s| s.key != subscription.key);
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.subscribers.borrow().len()
    }

    fn take(&self, key: u64) -> Option<FlagCallback> {
        self.inner
            .subscribers
            .borrow_mut()
            .iter_mut()
            .find(|s| s.key == key)
            .and_then(|s| s.callback.take())
    }

    fn restore(&self, key: u64, callback: FlagCallback) {
        if let Some(sub) = self
            .inner
            .subscribers
            .borrow_mut()
            .iter_mut()
            .find(|s| s.key == key)
        {
            sub.callback = Some(callback);
        }
    }
}

impl std::fmt::Debug for CompletionFlag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompletionFlag")
            .field("value", &self.get())
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}
