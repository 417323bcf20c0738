use scrollgate_protocol::{LockState, SectionId, Threshold};
use tracing::{debug, warn};

use crate::config::ScrollLockConfig;
use crate::error::SuppressionError;
use crate::flag::CompletionFlag;
use crate::observe::{ObservationHandle, ViewportObserver};
use crate::registry::LockRegistry;
use crate::reporter::IntersectionReporter;
use crate::suppress::ScrollSuppressor;

/// Root of one page load: owns the registry every section shares.
///
/// Tearing the page down (explicitly or on drop) clears the lock set and
/// lifts suppression. The registry stays closed afterwards: sections that
/// outlive the page can neither take a lock nor report one.
pub struct Page {
    config: ScrollLockConfig,
    registry: LockRegistry,
    torn_down: bool,
}

impl Page {
    pub fn new(config: ScrollLockConfig, suppressor: impl ScrollSuppressor + 'static) -> Self {
        let registry = LockRegistry::with_config(&config, suppressor);
        debug!(threshold = config.threshold().fraction(), "page scope created");
        Self {
            config,
            registry,
            torn_down: false,
        }
    }

    pub fn threshold(&self) -> Threshold {
        self.config.threshold()
    }

    pub fn registry(&self) -> &LockRegistry {
        &self.registry
    }

    /// Mount `section` against this page's registry.
    pub fn mount<C, V>(
        &self,
        section: Section<C>,
        viewport: &mut V,
        target: &V::Target,
    ) -> MountedSection<C, V::Handle>
    where
        V: ViewportObserver,
    {
        section.mount(&self.registry, viewport, target)
    }

    pub fn teardown(mut self) -> Result<(), SuppressionError> {
        self.torn_down = true;
        debug!("page scope torn down");
        self.registry.teardown()
    }
}

impl Drop for Page {
    fn drop(&mut self) {
        if self.torn_down {
            return;
        }
        if let Err(e) = self.registry.teardown() {
            warn!(error = %e, "could not lift scroll suppression while dropping page");
        }
    }
}

/// A full-viewport section before it is mounted: its identifier, the
/// owner's completion flag and whatever content the host renders for it.
#[derive(Debug)]
pub struct Section<C> {
    id: SectionId,
    has_viewed_all: CompletionFlag,
    content: C,
}

impl<C> Section<C> {
    pub fn new(id: impl Into<SectionId>, has_viewed_all: bool, content: C) -> Self {
        Self::with_flag(id, CompletionFlag::new(has_viewed_all), content)
    }

    /// Use a flag the owner already holds a handle to.
    pub fn with_flag(id: impl Into<SectionId>, has_viewed_all: CompletionFlag, content: C) -> Self {
        Self {
            id: id.into(),
            has_viewed_all,
            content,
        }
    }

    pub fn id(&self) -> &SectionId {
        &self.id
    }

    pub fn mount<V>(
        self,
        registry: &LockRegistry,
        viewport: &mut V,
        target: &V::Target,
    ) -> MountedSection<C, V::Handle>
    where
        V: ViewportObserver,
    {
        let reporter =
            IntersectionReporter::mount(registry, self.id, viewport, target, &self.has_viewed_all);
        MountedSection {
            reporter,
            has_viewed_all: self.has_viewed_all,
            content: self.content,
        }
    }
}

/// A section whose reporter is live.
pub struct MountedSection<C, H: ObservationHandle> {
    reporter: IntersectionReporter<H>,
    has_viewed_all: CompletionFlag,
    content: C,
}

impl<C, H: ObservationHandle> MountedSection<C, H> {
    pub fn id(&self) -> &SectionId {
        self.reporter.section_id()
    }

    pub fn content(&self) -> &C {
        &self.content
    }

    pub fn content_mut(&mut self) -> &mut C {
        &mut self.content
    }

    pub fn has_viewed_all(&self) -> &CompletionFlag {
        &self.has_viewed_all
    }

    pub fn set_has_viewed_all(&self, value: bool) -> Result<(), SuppressionError> {
        self.has_viewed_all.set(value)
    }

    pub fn state(&self) -> LockState {
        self.reporter.state()
    }

    /// Release the lock, stop observing and hand the content back.
    pub fn unmount(self) -> Result<C, SuppressionError> {
        let MountedSection {
            reporter, content, ..
        } = self;
        reporter.unmount()?;
        Ok(content)
    }
}
