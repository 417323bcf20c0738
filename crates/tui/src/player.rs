use anyhow::Result;
use scrollgate_core::{
    FlagSuppressor, ManualObservation, ManualViewport, MountedSection, Page, ScrollLockConfig,
    Section, SuppressionProbe,
};
use scrollgate_protocol::{LockState, SectionId};
use tracing::{debug, info};

use crate::deck::Deck;

/// What the terminal shows for one section.
#[derive(Debug, Clone)]
pub struct SectionCard {
    pub title: String,
    pub items: Vec<String>,
    pub revealed: usize,
}

impl SectionCard {
    pub fn is_complete(&self) -> bool {
        self.revealed >= self.items.len()
    }
}

type Mounted = MountedSection<SectionCard, ManualObservation>;

/// A vertical stack of full-screen sections with registry-gated scrolling.
///
/// Section `i` occupies rows `[i * h, (i + 1) * h)` of the page and the
/// viewport is `h` rows tall, so a section is fully visible exactly when
/// the offset equals its top.
pub struct Player {
    page: Page,
    viewport: ManualViewport,
    probe: SuppressionProbe,
    sections: Vec<Mounted>,
    section_height: u32,
    offset: u32,
}

impl Player {
    pub fn new(deck: &Deck, config: ScrollLockConfig, section_height: u16) -> Result<Self> {
        let suppressor = FlagSuppressor::new();
        let probe = suppressor.probe();
        let page = Page::new(config, suppressor);
        let mut viewport = ManualViewport::new(page.threshold());

        let sections = deck
            .sections
            .iter()
            .map(|s| {
                let card = SectionCard {
                    title: s.title.clone(),
                    items: s.items.clone(),
                    revealed: 0,
                };
                let complete = card.is_complete();
                page.mount(Section::new(s.id.clone(), complete, card), &mut viewport, &s.id)
            })
            .collect();

        let mut player = Self {
            page,
            viewport,
            probe,
            sections,
            section_height: u32::from(section_height.max(1)),
            offset: 0,
        };
        player.sync()?;
        Ok(player)
    }

    pub fn sections(&self) -> impl Iterator<Item = (&SectionId, &SectionCard, LockState)> {
        self.sections.iter().map(|s| (s.id(), s.content(), s.state()))
    }

    pub fn offset(&self) -> u32 {
        self.offset
    }

    pub fn section_height(&self) -> u32 {
        self.section_height
    }

    pub fn is_locked(&self) -> bool {
        self.probe.is_active()
    }

    pub fn holders(&self) -> Vec<SectionId> {
        self.page.registry().holders()
    }

    /// Scroll by `rows`. Returns `false` when scrolling is suppressed.
    pub fn scroll_by(&mut self, rows: i64) -> Result<bool> {
        if self.is_locked() {
            debug!(rows, "scroll blocked by lock");
            return Ok(false);
        }
        let max = i64::from(self.max_offset());
        let next = (i64::from(self.offset) + rows).clamp(0, max);
        self.offset = u32::try_from(next)?;
        self.sync()?;
        Ok(true)
    }

    /// The terminal changed size; keep the focused section in place.
    pub fn resize(&mut self, section_height: u16) -> Result<()> {
        let focused = self.focused();
        self.section_height = u32::from(section_height.max(1));
        self.offset = self.top_of(focused).min(self.max_offset());
        self.sync()
    }

    /// Reveal the next hidden item of the most visible section. Returns
    /// `false` if it had nothing left to reveal.
    pub fn reveal_next(&mut self) -> Result<bool> {
        let idx = self.focused();
        let Some(section) = self.sections.get_mut(idx) else {
            return Ok(false);
        };
        let card = section.content_mut();
        if card.is_complete() {
            return Ok(false);
        }
        card.revealed += 1;
        let (revealed, complete) = (card.revealed, card.is_complete());
        debug!(section = %section.id(), revealed, "item revealed");
        if complete {
            info!(section = %section.id(), "section viewed in full");
            section.set_has_viewed_all(true)?;
        }
        Ok(true)
    }

    /// Index of the section with the largest visible share (first wins).
    pub fn focused(&self) -> usize {
        let mut best = (0, 0.0);
        for idx in 0..self.sections.len() {
            let ratio = self.visible_ratio(idx);
            if ratio > best.1 {
                best = (idx, ratio);
            }
        }
        best.0
    }

    pub fn visible_ratio(&self, idx: usize) -> f64 {
        let h = u64::from(self.section_height);
        let top = idx as u64 * h;
        let view_top = u64::from(self.offset);
        let overlap = (top + h).min(view_top + h).saturating_sub(top.max(view_top));
        overlap as f64 / h as f64
    }

    /// Unmount every section and tear the page down.
    pub fn shutdown(self) -> Result<()> {
        let Player { page, sections, .. } = self;
        for section in sections {
            section.unmount()?;
        }
        page.teardown()?;
        Ok(())
    }

    fn max_offset(&self) -> u32 {
        self.top_of(self.sections.len().saturating_sub(1))
    }

    fn top_of(&self, idx: usize) -> u32 {
        u32::try_from(idx).unwrap_or(u32::MAX).saturating_mul(self.section_height)
    }

    /// Feed every section's visibility to the viewport, then snap to the
    /// first section holding the lock so it is shown in full.
    fn sync(&mut self) -> Result<()> {
        self.report_all()?;
        if !self.is_locked() {
            return Ok(());
        }
        let holder = self
            .sections
            .iter()
            .position(|s| s.state().is_locked());
        if let Some(idx) = holder {
            let top = self.top_of(idx);
            if top != self.offset {
                debug!(section = %self.sections[idx].id(), top, "snapping to locked section");
                self.offset = top;
                self.report_all()?;
            }
        }
        Ok(())
    }

    fn report_all(&self) -> Result<()> {
        for (idx, section) in self.sections.iter().enumerate() {
            let ratio = self.visible_ratio(idx);
            if let Some(event) = self.viewport.report(section.id().as_str(), ratio)? {
                debug!(
                    section = %event.section,
                    intersecting = event.intersecting,
                    seq = event.seq,
                    "visibility"
                );
            }
        }
        Ok(())
    }
}
