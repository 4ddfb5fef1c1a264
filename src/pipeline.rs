//! The capture pipeline.
//!
//! One run executes, strictly in order:
//! select → snapshot → stage (mount) → settle → rasterize → stage (dispose)
//! → export. The stage is disposed whether or not rasterization succeeds,
//! and nothing is exported after a failed render.

use log::{debug, info, warn};

use crate::export::{Exporter, NamingContext};
use crate::host::{Conversation, MessageRef};
use crate::progress::{
    NoopProgress, ProgressEvent, ProgressReporter, PHASE_DONE, PHASE_ENCODE, PHASE_PREPARE, PHASE_RENDER,
};
use crate::rasterizer::Rasterizer;
use crate::select::{select_targets, CaptureRequest};
use crate::snapshot::snapshot;
use crate::stage::{OffscreenHost, Stage, StageHost, StageOptions};
use crate::{CaptureConfig, Error, Result};

static DEFAULT_STAGE_HOST: OffscreenHost = OffscreenHost::new();
static NOOP_PROGRESS: NoopProgress = NoopProgress;

/// What a successful capture produced
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureOutcome {
    /// Name the download sink stored the image under
    pub filename: String,
    /// Messages that were captured, in order
    pub selection: Vec<MessageRef>,
    pub width: u32,
    pub height: u32,
    /// Hex SHA-256 of the PNG bytes
    pub digest: String,
}

/// Runs capture requests against one conversation.
///
/// Every collaborator is borrowed, so concurrent runs share nothing mutable
/// beyond what the collaborators themselves synchronize.
pub struct Capturer<'a> {
    conversation: &'a Conversation,
    rasterizer: &'a dyn Rasterizer,
    exporter: &'a Exporter,
    config: CaptureConfig,
    stage_host: &'a dyn StageHost,
    progress: &'a dyn ProgressReporter,
    sizing_hint: Option<u32>,
}

impl<'a> Capturer<'a> {
    pub fn new(conversation: &'a Conversation, rasterizer: &'a dyn Rasterizer, exporter: &'a Exporter) -> Self {
        Self {
            conversation,
            rasterizer,
            exporter,
            config: CaptureConfig::default(),
            stage_host: &DEFAULT_STAGE_HOST,
            progress: &NOOP_PROGRESS,
            sizing_hint: None,
        }
    }

    pub fn with_config(mut self, config: CaptureConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_stage_host(mut self, host: &'a dyn StageHost) -> Self {
        self.stage_host = host;
        self
    }

    pub fn with_progress(mut self, progress: &'a dyn ProgressReporter) -> Self {
        self.progress = progress;
        self
    }

    /// Stage width to use instead of the chat panel's width
    pub fn with_sizing_hint(mut self, width: Option<u32>) -> Self {
        self.sizing_hint = width;
        self
    }

    pub fn config(&self) -> &CaptureConfig {
        &self.config
    }

    pub fn conversation(&self) -> &Conversation {
        self.conversation
    }

    /// Run one capture request to completion.
    pub async fn run(&self, request: CaptureRequest) -> Result<CaptureOutcome> {
        let result = self.run_phases(&request).await;
        if let Err(e) = &result {
            warn!("capture '{}' failed: {}", request.hint(), e);
        }
        self.progress.settle(result.is_ok());
        result
    }

    fn report(&self, (phase, ratio): (&str, f32)) {
        self.progress.report(&ProgressEvent::new(phase, ratio));
    }

    async fn run_phases(&self, request: &CaptureRequest) -> Result<CaptureOutcome> {
        let raster_options = self.config.raster_options()?;

        let selection = select_targets(self.conversation, &request.target)?;
        info!("capturing {} message(s) ({})", selection.len(), request.hint());

        self.report(PHASE_PREPARE);
        let copies = snapshot(self.conversation, &selection, request.include_header)?;

        let options = StageOptions {
            sizing_hint: self.sizing_hint.or_else(|| self.conversation.panel_width()),
            background_hint: self.conversation.theme_background().map(|(color, lookup)| {
                debug!("stage background {} from {:?}", color, lookup);
                color
            }),
        };
        let stage = Stage::mount(self.stage_host, copies, options);
        stage.settle(self.config.settle_delay()).await;

        self.report(PHASE_RENDER);
        let rendered = self.rasterizer.rasterize(stage.container(), &raster_options).await;
        stage.dispose();

        let image = rendered.map_err(|e| match e {
            Error::RenderFailure(_) => e,
            other => Error::RenderFailure(other.to_string()),
        })?;
        debug!("rendered {}x{} image sha256={}", image.width, image.height, image.digest());

        self.report(PHASE_ENCODE);
        let naming = request
            .naming_anchor()
            .and_then(|m| self.conversation.meta(m))
            .map(NamingContext::from);
        let filename = self.exporter.export(&image, naming.as_ref(), &request.hint())?;
        self.report(PHASE_DONE);

        Ok(CaptureOutcome {
            filename,
            selection,
            width: image.width,
            height: image.height,
            digest: image.digest(),
        })
    }
}
