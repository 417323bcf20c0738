use std::cell::RefCell;
use std::rc::{Rc, Weak};

use scrollgate_protocol::{LockState, SectionId};
use tracing::{trace, warn};

use crate::error::SuppressionError;
use crate::flag::{CompletionFlag, FlagSubscription};
use crate::observe::{ObservationHandle, ViewportObserver};
use crate::registry::LockRegistry;

/// Turns one section's visibility and completion flag into lock requests.
///
/// Both inputs are subscriptions: the decision is re-evaluated whenever the
/// viewport reports a threshold crossing or the owner flips the flag, and
/// the registry is only called when the decided state actually changes.
///
/// Unmounting (or dropping) disconnects both subscriptions and releases the
/// section's lock whatever its last state was.
pub struct IntersectionReporter<H: ObservationHandle> {
    id: SectionId,
    shared: Rc<RefCell<ReporterState>>,
    flag: CompletionFlag,
    observation: Option<H>,
    subscription: Option<FlagSubscription>,
}

struct ReporterState {
    id: SectionId,
    registry: LockRegistry,
    intersecting: bool,
    has_viewed_all: bool,
    state: LockState,
}

impl ReporterState {
    fn evaluate(&mut self) -> Result<(), SuppressionError> {
        let next = LockState::decide(self.intersecting, self.has_viewed_all);
        trace!(
            section = %self.id,
            intersecting = self.intersecting,
            has_viewed_all = self.has_viewed_all,
            ?next,
            "evaluate"
        );
        if next == self.state {
            return Ok(());
        }
        // Membership changes even if the suppression primitive then fails.
        self.state = next;
        match next {
            LockState::Locked => self.registry.request_lock(&self.id),
            LockState::Unlocked => self.registry.release_lock(self.id.as_str()),
        }
    }
}

impl<H: ObservationHandle> IntersectionReporter<H> {
    /// Start observing `target` and `flag` on behalf of section `id`.
    ///
    /// Identifiers must be unique among concurrently mounted reporters of
    /// one registry; two reporters sharing an id would fight over one lock.
    pub fn mount<V>(
        registry: &LockRegistry,
        id: SectionId,
        viewport: &mut V,
        target: &V::Target,
        flag: &CompletionFlag,
    ) -> Self
    where
        V: ViewportObserver<Handle = H>,
    {
        let shared = Rc::new(RefCell::new(ReporterState {
            id: id.clone(),
            registry: registry.clone(),
            intersecting: false,
            has_viewed_all: flag.get(),
            state: LockState::Unlocked,
        }));

        let weak = Rc::downgrade(&shared);
        let observation = viewport.observe(
            target,
            Box::new(move |intersecting| {
                with_state(&weak, |s| {
                    s.intersecting = intersecting;
                    s.evaluate()
                })
            }),
        );

        let weak = Rc::downgrade(&shared);
        let subscription = flag.subscribe(Box::new(move |has_viewed_all| {
            with_state(&weak, |s| {
                s.has_viewed_all = has_viewed_all;
                s.evaluate()
            })
        }));

        trace!(section = %id, threshold = viewport.threshold().fraction(), "reporter mounted");
        Self {
            id,
            shared,
            flag: flag.clone(),
            observation: Some(observation),
            subscription: Some(subscription),
        }
    }

    pub fn section_id(&self) -> &SectionId {
        &self.id
    }

    /// Always `Unlocked` once the page registry has been torn down.
    pub fn state(&self) -> LockState {
        let state = self.shared.borrow();
        if state.registry.is_closed() {
            LockState::Unlocked
        } else {
            state.state
        }
    }

    /// Stop observing and release the lock unconditionally.
    pub fn unmount(mut self) -> Result<(), SuppressionError> {
        self.release().unwrap_or(Ok(()))
    }

    /// `None` once resources have already been released.
    fn release(&mut self) -> Option<Result<(), SuppressionError>> {
        let mut observation = self.observation.take()?;
        observation.disconnect();
        if let Some(subscription) = self.subscription.take() {
            self.flag.unsubscribe(subscription);
        }
        let mut state = self.shared.borrow_mut();
        state.state = LockState::Unlocked;
        trace!(section = %self.id, "reporter unmounted");
        Some(state.registry.release_lock(self.id.as_str()))
    }
}

impl<H: ObservationHandle> Drop for IntersectionReporter<H> {
    fn drop(&mut self) {
        if let Some(Err(e)) = self.release() {
            warn!(section = %self.id, error = %e, "lock release failed while dropping reporter");
        }
    }
}

impl<H: ObservationHandle> std::fmt::Debug for IntersectionReporter<H> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.shared.borrow();
        f.debug_struct("IntersectionReporter")
            .field("id", &self.id)
            .field("intersecting", &state.intersecting)
            .field("has_viewed_all", &state.has_viewed_all)
            .field("state", &state.state)
            .finish()
    }
}

fn with_state(
    weak: &Weak<RefCell<ReporterState>>,
    f: impl FnOnce(&mut ReporterState) -> Result<(), SuppressionError>,
) -> Result<(), SuppressionError> {
    match weak.upgrade() {
        Some(shared) => f(&mut shared.borrow_mut()),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use scrollgate_protocol::{LockEvent, Threshold};

    use super::*;
    use crate::observe::{ManualObservation, ManualViewport};
    use crate::suppress::testing::FlakySuppressor;
    use crate::suppress::{FlagSuppressor, SuppressionProbe};

    struct Fixture {
        registry: LockRegistry,
        probe: SuppressionProbe,
        viewport: ManualViewport,
    }

    impl Fixture {
        fn new() -> Self {
            let suppressor = FlagSuppressor::new();
            let probe = suppressor.probe();
            Self {
                registry: LockRegistry::new(suppressor),
                probe,
                viewport: ManualViewport::new(Threshold::HALF),
            }
        }

        fn mount(
            &mut self,
            id: &str,
            flag: &CompletionFlag,
        ) -> IntersectionReporter<ManualObservation> {
            let id = SectionId::from(id);
            IntersectionReporter::mount(&self.registry, id.clone(), &mut self.viewport, &id, flag)
        }

        fn show(&self, id: &str, ratio: f64) {
            self.viewport
                .report(id, ratio)
                .expect("flag suppressor never fails");
        }
    }

    #[test]
    fn starts_unlocked() {
        let mut fx = Fixture::new();
        let reporter = fx.mount("hero", &CompletionFlag::new(false));
        assert_eq!(reporter.state(), LockState::Unlocked);
        assert!(fx.registry.is_empty());
        assert_eq!(reporter.section_id().as_str(), "hero");
    }

    #[test]
    fn locks_while_in_view_and_incomplete() {
        let mut fx = Fixture::new();
        let reporter = fx.mount("hero", &CompletionFlag::new(false));

        fx.show("hero", 0.6);
        assert_eq!(reporter.state(), LockState::Locked);
        assert!(fx.registry.is_locked("hero"));
        assert!(fx.probe.is_active());

        fx.show("hero", 0.2);
        assert_eq!(reporter.state(), LockState::Unlocked);
        assert!(!fx.probe.is_active());
    }

    #[test]
    fn completed_section_never_locks() {
        let mut fx = Fixture::new();
        let _reporter = fx.mount("hero", &CompletionFlag::new(true));
        fx.show("hero", 1.0);
        assert!(fx.registry.is_empty());
        assert_eq!(fx.probe.applies(), 0);
    }

    #[test]
    fn flag_flip_releases_without_visibility_change() {
        let mut fx = Fixture::new();
        let flag = CompletionFlag::new(false);
        let reporter = fx.mount("hero", &flag);
        fx.show("hero", 1.0);
        assert!(fx.registry.is_locked("hero"));

        flag.set(true).expect("release succeeds");
        assert_eq!(reporter.state(), LockState::Unlocked);
        assert!(!fx.registry.is_locked("hero"));

        // Flipping back while still in view locks again.
        flag.set(false).expect("lock succeeds");
        assert!(fx.registry.is_locked("hero"));
    }

    #[test]
    fn one_registry_call_per_transition() {
        let mut fx = Fixture::new();
        let flag = CompletionFlag::new(false);
        let _reporter = fx.mount("hero", &flag);
        fx.show("hero", 0.6);
        fx.show("hero", 0.9);
        flag.set(false).expect("unchanged flag notifies nobody");
        fx.show("hero", 0.1);
        fx.show("hero", 0.05);
        assert_eq!(
            fx.registry.drain_events(),
            vec![
                LockEvent::Locked {
                    section: "hero".into()
                },
                LockEvent::SuppressionApplied,
                LockEvent::Released {
                    section: "hero".into()
                },
                LockEvent::SuppressionRemoved,
            ]
        );
    }

    #[test]
    fn unmount_releases_and_disconnects() {
        let mut fx = Fixture::new();
        let flag = CompletionFlag::new(false);
        let reporter = fx.mount("hero", &flag);
        fx.show("hero", 1.0);
        assert!(fx.probe.is_active());

        assert!(reporter.unmount().is_ok());
        assert!(fx.registry.is_empty());
        assert!(!fx.probe.is_active());
        assert_eq!(fx.viewport.observer_count(), 0);
        assert_eq!(flag.subscriber_count(), 0);

        // Late inputs reach nobody.
        fx.show("hero", 0.0);
        fx.show("hero", 1.0);
        assert!(fx.registry.is_empty());
    }

    #[test]
    fn drop_releases_like_unmount() {
        let mut fx = Fixture::new();
        let flag = CompletionFlag::new(false);
        {
            let _reporter = fx.mount("hero", &flag);
            fx.show("hero", 1.0);
            assert!(fx.registry.is_locked("hero"));
        }
        assert!(fx.registry.is_empty());
        assert!(!fx.probe.is_active());
        assert_eq!(flag.subscriber_count(), 0);
    }

    #[test]
    fn unmount_of_unlocked_section_is_harmless() {
        let mut fx = Fixture::new();
        let reporter = fx.mount("hero", &CompletionFlag::new(false));
        assert!(reporter.unmount().is_ok());
        assert_eq!(fx.probe.removes(), 0);
    }

    #[test]
    fn state_reads_unlocked_after_registry_teardown() {
        let mut fx = Fixture::new();
        let reporter = fx.mount("hero", &CompletionFlag::new(false));
        fx.show("hero", 1.0);
        assert_eq!(reporter.state(), LockState::Locked);

        fx.registry.teardown().expect("flag suppressor never fails");
        assert_eq!(reporter.state(), LockState::Unlocked);
    }

    fn flaky_fixture() -> (FlakySuppressor, LockRegistry, ManualViewport) {
        let flaky = FlakySuppressor::default();
        let registry = LockRegistry::new(flaky.clone());
        (flaky, registry, ManualViewport::new(Threshold::HALF))
    }

    #[test]
    fn unmount_returns_the_suppressor_error() {
        let (flaky, registry, mut viewport) = flaky_fixture();
        let id = SectionId::from("hero");
        let reporter = IntersectionReporter::mount(
            &registry,
            id.clone(),
            &mut viewport,
            &id,
            &CompletionFlag::new(false),
        );
        viewport.report("hero", 1.0).expect("apply succeeds");
        assert!(flaky.active.get());

        flaky.failing.set(true);
        assert_eq!(
            reporter.unmount(),
            Err(SuppressionError::remove("document has no body"))
        );
        // The lock is gone even though scrolling could not be restored yet.
        assert!(registry.is_empty());
        assert!(registry.is_suppressed());
        assert_eq!(viewport.observer_count(), 0);

        flaky.failing.set(false);
        registry.release_lock("hero").expect("retry succeeds");
        assert!(!flaky.active.get());
    }

    #[test]
    fn drop_with_failing_suppressor_still_releases() {
        let (flaky, registry, mut viewport) = flaky_fixture();
        let id = SectionId::from("hero");
        let flag = CompletionFlag::new(false);
        {
            let _reporter =
                IntersectionReporter::mount(&registry, id.clone(), &mut viewport, &id, &flag);
            viewport.report("hero", 1.0).expect("apply succeeds");
            flaky.failing.set(true);
        }
        assert!(registry.is_empty());
        assert_eq!(flag.subscriber_count(), 0);
        assert_eq!(viewport.observer_count(), 0);
        assert!(flaky.active.get());

        flaky.failing.set(false);
        registry.release_lock("hero").expect("retry succeeds");
        assert!(!flaky.active.get());
        assert!(!registry.is_suppressed());
    }
}
