//! Off-screen stage for detached copies.
//!
//! The stage is the container the rasterizer sees. It sits outside the
//! visible viewport but keeps a real width and background so layout does
//! not depend on the live chat view. A `Stage` is mounted once and disposed
//! exactly once: either through `dispose()` or, on any other exit path,
//! from `Drop`.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use log::{debug, trace};

use crate::color::Color;
use crate::snapshot::DetachedCopy;

/// Width used when neither a sizing hint nor a declared width exists.
pub const FALLBACK_WIDTH: u32 = 800;
/// Background used when the host theme yields nothing.
pub const FALLBACK_BACKGROUND: Color = Color::rgb(0x1e, 0x1e, 0x1e);
/// Padding around the staged copies.
pub const STAGE_PADDING: u32 = 10;
/// Offset that keeps the stage outside the viewport.
pub const OFFSCREEN_OFFSET: i32 = -9999;

static NEXT_STAGE_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StageId(u64);

impl StageId {
    fn next() -> Self {
        StageId(NEXT_STAGE_ID.fetch_add(1, Ordering::Relaxed))
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct StageOptions {
    /// Preferred width, usually the live chat panel's width
    pub sizing_hint: Option<u32>,
    /// Background resolved from the host theme
    pub background_hint: Option<Color>,
}

/// The mounted container handed to the rasterizer
#[derive(Debug, Clone, PartialEq)]
pub struct StagedContainer {
    pub id: StageId,
    /// Top-left corner in document coordinates (off-screen)
    pub origin: (i32, i32),
    pub width: u32,
    pub padding: u32,
    pub background: Color,
    pub children: Vec<DetachedCopy>,
}

impl StagedContainer {
    /// Width available to the copies inside the padding
    pub fn content_width(&self) -> u32 {
        self.width.saturating_sub(self.padding * 2)
    }

    pub fn is_offscreen(&self) -> bool {
        self.origin.0 + self.width as i32 <= 0 || self.origin.1 < 0
    }
}

/// Surface the stage is mounted into.
pub trait StageHost: Send + Sync {
    fn mount(&self, container: &StagedContainer);
    fn unmount(&self, id: StageId);
}

/// Default host: keeps no pixels, only counts live stages.
#[derive(Debug, Default)]
pub struct OffscreenHost {
    live: AtomicUsize,
}

impl OffscreenHost {
    pub const fn new() -> Self {
        Self {
            live: AtomicUsize::new(0),
        }
    }

    /// Stages currently mounted
    pub fn live(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }
}

impl StageHost for OffscreenHost {
    fn mount(&self, container: &StagedContainer) {
        self.live.fetch_add(1, Ordering::SeqCst);
        trace!("stage {:?} mounted at {:?}", container.id, container.origin);
    }

    fn unmount(&self, id: StageId) {
        self.live.fetch_sub(1, Ordering::SeqCst);
        trace!("stage {:?} unmounted", id);
    }
}

/// A mounted stage owned by one pipeline run
pub struct Stage<'h> {
    host: &'h dyn StageHost,
    container: Option<StagedContainer>,
}

impl<'h> Stage<'h> {
    /// Mount `copies`, in order, into a fresh off-screen container.
    pub fn mount(host: &'h dyn StageHost, copies: Vec<DetachedCopy>, options: StageOptions) -> Self {
        let width = options
            .sizing_hint
            .or_else(|| copies.first().and_then(|c| c.root.declared_width()))
            .unwrap_or(FALLBACK_WIDTH);
        let background = options.background_hint.unwrap_or(FALLBACK_BACKGROUND);
        let container = StagedContainer {
            id: StageId::next(),
            origin: (OFFSCREEN_OFFSET, OFFSCREEN_OFFSET),
            width,
            padding: STAGE_PADDING,
            background,
            children: copies,
        };
        debug!(
            "staging {} copies at width {}px on {}",
            container.children.len(),
            container.width,
            container.background
        );
        host.mount(&container);
        Self {
            host,
            container: Some(container),
        }
    }

    /// The mounted container. Only `None` after disposal, which consumes
    /// the stage, so callers always see it mounted.
    pub fn container(&self) -> &StagedContainer {
        match &self.container {
            Some(c) => c,
            None => unreachable!("stage used after dispose"),
        }
    }

    /// Stay mounted and idle for `delay` so late layout work can settle.
    pub async fn settle(&self, delay: Duration) {
        if delay.is_zero() {
            return;
        }
        trace!("stage settling for {:?}", delay);
        tokio::time::sleep(delay).await;
    }

    /// Unmount and drop every staged copy.
    pub fn dispose(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if let Some(container) = self.container.take() {
            self.host.unmount(container.id);
        }
    }
}

impl Drop for Stage<'_> {
    fn drop(&mut self) {
        self.release();
    }
}
