//! chatshot
//!
//! Capture chat messages from a chat-client conversation as PNG images.
//!
//! A capture runs as a fixed pipeline:
//!
//! 1. **Select** the messages a request covers (`select`)
//! 2. **Snapshot** them into detached copies (`snapshot`)
//! 3. **Stage** the copies off-screen with a stable width and background (`stage`)
//! 4. **Rasterize** the stage (`rasterizer`, built-in backend in `rendering`)
//! 5. **Export** the image under a derived file name (`export`)
//!
//! # Example
//!
//! ```no_run
//! use chatshot::{CaptureConfig, Capturer, CaptureRequest, CaptureTarget, Conversation};
//! use chatshot::export::{DirectorySink, Exporter};
//! use chatshot::rendering::BitmapRasterizer;
//!
//! # async fn run() -> chatshot::Result<()> {
//! let html = std::fs::read_to_string("chat.html")?;
//! let conversation = Conversation::parse(&html)?;
//! let rasterizer = BitmapRasterizer::new();
//! let exporter = Exporter::new("SillyTavern", Box::new(DirectorySink::new("shots")));
//!
//! let capturer = Capturer::new(&conversation, &rasterizer, &exporter)
//!     .with_config(CaptureConfig::default());
//! let outcome = capturer.run(CaptureRequest::new(CaptureTarget::Last)).await?;
//! println!("saved {}", outcome.filename);
//! # Ok(())
//! # }
//! ```

use std::time::Duration;

pub mod error;
pub use error::{Error, Result};

pub mod actions;
pub mod color;
pub mod export;
pub mod host;
pub mod pipeline;
pub mod progress;
pub mod rasterizer;
pub mod select;
pub mod settings;
pub mod snapshot;
pub mod stage;

// Built-in rasterizer: layout, paint and PNG encoding
#[cfg(feature = "bitmap")]
pub mod rendering;

pub use host::{Conversation, HostSelectors, MessageRef};
pub use pipeline::{CaptureOutcome, Capturer};
pub use rasterizer::{RasterImage, RasterOptions, Rasterizer, RenderMode};
pub use select::{CaptureRequest, CaptureTarget, Direction, WindowSpec};

/// Configuration for one capture run
///
/// Passed explicitly into every pipeline invocation. The defaults match the
/// host plugin's defaults:
/// - a 10 ms settle delay before rasterization
/// - 2x output scale
/// - the alternate (markup) render mode
///
/// # Examples
///
/// ```
/// let cfg = chatshot::CaptureConfig::default();
/// assert_eq!(cfg.scale, 2.0);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct CaptureConfig {
    /// Time the stage stays mounted before rasterization, in milliseconds
    pub delay_ms: u64,
    /// Output scale forwarded to the rasterizer
    pub scale: f32,
    /// Render through serialized markup instead of the staged tree
    pub use_alternate_render_mode: bool,
    /// Report progress while capturing
    pub show_progress: bool,
    /// First component of exported file names
    pub file_prefix: String,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            delay_ms: 10,
            scale: 2.0,
            use_alternate_render_mode: true,
            show_progress: true,
            file_prefix: export::DEFAULT_PREFIX.to_string(),
        }
    }
}

impl CaptureConfig {
    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }

    pub fn render_mode(&self) -> RenderMode {
        if self.use_alternate_render_mode {
            RenderMode::Markup
        } else {
            RenderMode::Direct
        }
    }

    /// Rasterizer options; fails when `scale` is not a positive number.
    pub fn raster_options(&self) -> Result<RasterOptions> {
        RasterOptions::new(self.scale, self.render_mode())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = CaptureConfig::default();
        assert_eq!(config.delay_ms, 10);
        assert_eq!(config.settle_delay(), Duration::from_millis(10));
        assert_eq!(config.render_mode(), RenderMode::Markup);
        assert_eq!(config.file_prefix, "SillyTavern");
    }

    #[test]
    fn test_raster_options() {
        let config = CaptureConfig {
            scale: 1.5,
            use_alternate_render_mode: false,
            ..Default::default()
        };
        let opts = config.raster_options().unwrap();
        assert_eq!(opts.scale, 1.5);
        assert_eq!(opts.render_mode, RenderMode::Direct);

        let bad = CaptureConfig {
            scale: 0.0,
            ..Default::default()
        };
        assert!(bad.raster_options().is_err());
    }
}
