use std::cell::RefCell;
use std::collections::{BTreeSet, VecDeque};
use std::rc::Rc;

use scrollgate_protocol::{LockEvent, RegistrySnapshot, SectionId};
use tracing::debug;

use crate::config::{DEFAULT_JOURNAL_CAPACITY, ScrollLockConfig};
use crate::error::SuppressionError;
use crate::suppress::ScrollSuppressor;

/// Page-scoped authority on whether page scrolling is suppressed.
///
/// Cloning yields another handle to the same lock set. Create one per page
/// load at the page root and hand clones to every section.
///
/// Suppression is active iff the lock set is non-empty. The suppression
/// primitive is only called when those two disagree, so it sees exactly one
/// `apply` per empty → non-empty transition and one `remove` per
/// non-empty → empty transition. The primitive must not call back into the
/// registry.
///
/// [`LockRegistry::teardown`] closes the registry for good: later lock
/// requests from sections that are still mounted are ignored, so a
/// torn-down page never suppresses scrolling again.
#[derive(Clone)]
pub struct LockRegistry {
    inner: Rc<RefCell<RegistryInner>>,
}

struct RegistryInner {
    holders: BTreeSet<SectionId>,
    /// Last state the primitive successfully reached.
    suppressed: bool,
    suppressor: Box<dyn ScrollSuppressor>,
    journal: VecDeque<LockEvent>,
    journal_capacity: usize,
    closed: bool,
}

impl LockRegistry {
    pub fn new(suppressor: impl ScrollSuppressor + 'static) -> Self {
        Self::with_journal_capacity(suppressor, DEFAULT_JOURNAL_CAPACITY)
    }

    pub fn with_config(
        config: &ScrollLockConfig,
        suppressor: impl ScrollSuppressor + 'static,
    ) -> Self {
        Self::with_journal_capacity(suppressor, config.journal_capacity)
    }

    fn with_journal_capacity(
        suppressor: impl ScrollSuppressor + 'static,
        journal_capacity: usize,
    ) -> Self {
        Self {
            inner: Rc::new(RefCell::new(RegistryInner {
                holders: BTreeSet::new(),
                suppressed: false,
                suppressor: Box::new(suppressor),
                journal: VecDeque::new(),
                journal_capacity,
                closed: false,
            })),
        }
    }

    /// Add `id` to the lock set. Requesting a lock already held, or any
    /// lock after teardown, is a no-op.
    pub fn request_lock(&self, id: &SectionId) -> Result<(), SuppressionError> {
        let mut inner = self.inner.borrow_mut();
        if inner.closed {
            debug!(section = %id, "lock request after teardown ignored");
        } else if inner.holders.insert(id.clone()) {
            debug!(section = %id, holders = inner.holders.len(), "scroll lock acquired");
            inner.record(LockEvent::Locked {
                section: id.clone(),
            });
        }
        inner.reconcile()
    }

    /// Remove `id` from the lock set. Releasing an id that holds no lock,
    /// including one from a section that already unmounted, is a no-op.
    pub fn release_lock(&self, id: &str) -> Result<(), SuppressionError> {
        let mut inner = self.inner.borrow_mut();
        if let Some(section) = inner.holders.take(id) {
            debug!(section = %section, holders = inner.holders.len(), "scroll lock released");
            inner.record(LockEvent::Released { section });
        }
        inner.reconcile()
    }

    /// Clear every lock and lift suppression when the page unmounts. Later
    /// lock requests are ignored.
    pub fn teardown(&self) -> Result<(), SuppressionError> {
        let mut inner = self.inner.borrow_mut();
        inner.closed = true;
        let released = std::mem::take(&mut inner.holders);
        if !released.is_empty() {
            debug!(count = released.len(), "releasing remaining locks on teardown");
        }
        for section in released {
            inner.record(LockEvent::Released { section });
        }
        inner.reconcile()
    }

    /// Whether [`LockRegistry::teardown`] has run.
    pub fn is_closed(&self) -> bool {
        self.inner.borrow().closed
    }

    pub fn is_suppressed(&self) -> bool {
        self.inner.borrow().suppressed
    }

    pub fn is_locked(&self, id: &str) -> bool {
        self.inner.borrow().holders.contains(id)
    }

    /// Current lock holders, sorted ascending.
    pub fn holders(&self) -> Vec<SectionId> {
        self.inner.borrow().holders.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.inner.borrow().holders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.borrow().holders.is_empty()
    }

    pub fn snapshot(&self) -> RegistrySnapshot {
        let inner = self.inner.borrow();
        RegistrySnapshot {
            holders: inner.holders.iter().cloned().collect(),
            suppressed: inner.suppressed,
        }
    }

    /// Take every journaled event, oldest first.
    pub fn drain_events(&self) -> Vec<LockEvent> {
        self.inner.borrow_mut().journal.drain(..).collect()
    }
}

impl std::fmt::Debug for LockRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.borrow();
        f.debug_struct("LockRegistry")
            .field("holders", &inner.holders)
            .field("suppressed", &inner.suppressed)
            .field("closed", &inner.closed)
            .finish_non_exhaustive()
    }
}

impl RegistryInner {
    fn reconcile(&mut self) -> Result<(), SuppressionError> {
        let wanted = !self.holders.is_empty();
        if wanted == self.suppressed {
            return Ok(());
        }
        if wanted {
            self.suppressor.apply()?;
            debug!("page scroll suppressed");
            self.record(LockEvent::SuppressionApplied);
        } else {
            self.suppressor.remove()?;
            debug!("page scroll restored");
            self.record(LockEvent::SuppressionRemoved);
        }
        self.suppressed = wanted;
        Ok(())
    }

    fn record(&mut self, event: LockEvent) {
        if self.journal_capacity == 0 {
            return;
        }
        if self.journal.len() >= self.journal_capacity {
            self.journal.pop_front();
        }
        self.journal.push_back(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::suppress::testing::FlakySuppressor;
    use crate::suppress::{FlagSuppressor, SuppressionProbe};

    fn registry() -> (LockRegistry, SuppressionProbe) {
        let suppressor = FlagSuppressor::new();
        let probe = suppressor.probe();
        (LockRegistry::new(suppressor), probe)
    }

    fn lock(reg: &LockRegistry, id: &str) {
        reg.request_lock(&id.into()).expect("flag suppressor never fails");
    }

    fn release(reg: &LockRegistry, id: &str) {
        reg.release_lock(id).expect("flag suppressor never fails");
    }

    #[test]
    fn request_is_idempotent() {
        let (reg, probe) = registry();
        lock(&reg, "hero");
        lock(&reg, "hero");
        assert_eq!(reg.holders(), vec![SectionId::from("hero")]);
        assert!(reg.is_suppressed());
        assert_eq!(probe.applies(), 1);
    }

    #[test]
    fn release_is_idempotent_and_tolerates_stale_ids() {
        let (reg, probe) = registry();
        release(&reg, "never-mounted");
        assert_eq!(probe.removes(), 0);

        lock(&reg, "hero");
        release(&reg, "hero");
        release(&reg, "hero");
        assert!(reg.is_empty());
        assert!(!reg.is_suppressed());
        assert_eq!((probe.applies(), probe.removes()), (1, 1));
    }

    #[test]
    fn suppression_follows_set_emptiness() {
        let (reg, probe) = registry();
        let ids: Vec<SectionId> = ["a", "b", "c", "d"]
            .into_iter()
            .map(SectionId::from)
            .collect();

        // xorshift keeps the sequence deterministic.
        let mut x: u32 = 0x9E37_79B9;
        for _ in 0..500 {
            x ^= x << 13;
            x ^= x >> 17;
            x ^= x << 5;
            let id = &ids[(x % 4) as usize];
            let result = if x & 0x100 == 0 {
                reg.request_lock(id)
            } else {
                reg.release_lock(id.as_str())
            };
            assert!(result.is_ok());
            assert_eq!(reg.is_suppressed(), !reg.is_empty());
            assert_eq!(probe.is_active(), !reg.is_empty());
        }
        assert!(probe.applies() >= probe.removes());
        assert!(probe.applies() - probe.removes() <= 1);
    }

    #[test]
    fn second_holder_does_not_reapply() {
        let (reg, probe) = registry();
        lock(&reg, "hero");
        lock(&reg, "gallery");
        release(&reg, "hero");
        assert!(reg.is_suppressed());
        assert!(reg.is_locked("gallery"));
        assert!(!reg.is_locked("hero"));
        assert_eq!((probe.applies(), probe.removes()), (1, 0));
    }

    #[test]
    fn failed_apply_fails_open_and_retries() {
        let flaky = FlakySuppressor::default();
        flaky.failing.set(true);
        let reg = LockRegistry::new(flaky.clone());

        let err = reg.request_lock(&"hero".into());
        assert_eq!(err, Err(SuppressionError::apply("document has no body")));
        // Membership is recorded; scrolling stays available.
        assert!(reg.is_locked("hero"));
        assert!(!reg.is_suppressed());
        assert!(!flaky.active.get());

        flaky.failing.set(false);
        assert!(reg.request_lock(&"hero".into()).is_ok());
        assert!(reg.is_suppressed());
        assert!(flaky.active.get());
    }

    #[test]
    fn teardown_clears_everything() {
        let (reg, probe) = registry();
        lock(&reg, "hero");
        lock(&reg, "gallery");
        assert!(reg.teardown().is_ok());
        assert!(reg.is_empty());
        assert!(reg.is_closed());
        assert!(!probe.is_active());
        assert_eq!(probe.removes(), 1);
        // A second teardown has nothing left to do.
        assert!(reg.teardown().is_ok());
        assert_eq!(probe.removes(), 1);
    }

    #[test]
    fn requests_after_teardown_are_ignored() {
        let (reg, probe) = registry();
        lock(&reg, "hero");
        assert!(reg.teardown().is_ok());
        reg.drain_events();

        lock(&reg, "gallery");
        assert!(reg.is_empty());
        assert!(!reg.is_suppressed());
        assert!(!probe.is_active());
        assert_eq!(probe.applies(), 1);
        assert!(reg.drain_events().is_empty());
    }

    #[test]
    fn failed_teardown_retries_removal_on_next_call() {
        let flaky = FlakySuppressor::default();
        let reg = LockRegistry::new(flaky.clone());
        lock(&reg, "hero");
        assert!(flaky.active.get());

        flaky.failing.set(true);
        assert!(reg.teardown().is_err());
        assert!(reg.is_suppressed());

        flaky.failing.set(false);
        lock(&reg, "hero");
        assert!(reg.is_empty());
        assert!(!reg.is_suppressed());
        assert!(!flaky.active.get());
    }

    #[test]
    fn journal_records_only_effective_changes() {
        let (reg, _) = registry();
        let hero = SectionId::from("hero");
        lock(&reg, "hero");
        lock(&reg, "hero");
        release(&reg, "gallery");
        release(&reg, "hero");
        assert_eq!(
            reg.drain_events(),
            vec![
                LockEvent::Locked {
                    section: hero.clone()
                },
                LockEvent::SuppressionApplied,
                LockEvent::Released { section: hero },
                LockEvent::SuppressionRemoved,
            ]
        );
        assert!(reg.drain_events().is_empty());
    }

    #[test]
    fn journal_is_bounded() {
        let config = ScrollLockConfig {
            journal_capacity: 2,
            ..ScrollLockConfig::default()
        };
        let reg = LockRegistry::with_config(&config, FlagSuppressor::new());
        lock(&reg, "a");
        lock(&reg, "b");
        assert_eq!(
            reg.drain_events(),
            vec![
                LockEvent::SuppressionApplied,
                LockEvent::Locked {
                    section: "b".into()
                },
            ]
        );

        let silent = LockRegistry::with_config(
            &ScrollLockConfig {
                journal_capacity: 0,
                ..ScrollLockConfig::default()
            },
            FlagSuppressor::new(),
        );
        lock(&silent, "a");
        assert!(silent.drain_events().is_empty());
    }

    #[test]
    fn clones_share_state() {
        let (reg, _) = registry();
        let other = reg.clone();
        lock(&other, "hero");
        assert!(reg.is_locked("hero"));
        assert!(other.teardown().is_ok());
        assert!(reg.is_closed());
    }

    #[test]
    fn snapshot_is_sorted() {
        let (reg, _) = registry();
        lock(&reg, "hero");
        lock(&reg, "gallery");
        let snap = reg.snapshot();
        assert_eq!(
            snap.holders,
            vec![SectionId::from("gallery"), SectionId::from("hero")]
        );
        assert!(snap.suppressed);
    }
}
