//! Rasterizer interface.
//!
//! The pipeline treats rasterization as a black box: a staged container goes
//! in, an encoded image comes out. The call is awaited once per capture and
//! never retried. The built-in backend lives in `rendering` (feature
//! `bitmap`); hosts can plug in anything else.

use async_trait::async_trait;
use base64::Engine as _;
use sha2::{Digest, Sha256};

use crate::stage::StagedContainer;
use crate::{Error, Result};

/// How the rasterizer walks the staged container
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RenderMode {
    /// Lay out the staged tree directly
    #[default]
    Direct,
    /// Serialize the stage to markup and render the re-parsed markup
    Markup,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RasterOptions {
    /// Device pixel ratio applied to the output, > 0
    pub scale: f32,
    pub render_mode: RenderMode,
}

impl RasterOptions {
    pub fn new(scale: f32, render_mode: RenderMode) -> Result<Self> {
        if !(scale.is_finite() && scale > 0.0) {
            return Err(Error::ConfigError(format!("scale must be a positive number, got {}", scale)));
        }
        Ok(Self { scale, render_mode })
    }
}

impl Default for RasterOptions {
    fn default() -> Self {
        Self {
            scale: 1.0,
            render_mode: RenderMode::Direct,
        }
    }
}

/// An encoded PNG image
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RasterImage {
    pub width: u32,
    pub height: u32,
    pub png_data: Vec<u8>,
}

impl RasterImage {
    pub fn new(width: u32, height: u32, png_data: Vec<u8>) -> Self {
        Self { width, height, png_data }
    }

    /// `data:image/png;base64,...` form used by browser downloads
    pub fn to_data_uri(&self) -> String {
        format!(
            "data:image/png;base64,{}",
            base64::engine::general_purpose::STANDARD.encode(&self.png_data)
        )
    }

    /// Hex SHA-256 of the encoded bytes
    pub fn digest(&self) -> String {
        hex::encode(Sha256::digest(&self.png_data))
    }
}

/// Render a staged container to an image.
#[async_trait]
pub trait Rasterizer: Send + Sync {
    /// Fails with `Error::RenderFailure` on any internal error.
    async fn rasterize(&self, container: &StagedContainer, options: &RasterOptions) -> Result<RasterImage>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn options_reject_non_positive_scale() {
        assert!(RasterOptions::new(0.0, RenderMode::Direct).is_err());
        assert!(RasterOptions::new(-1.0, RenderMode::Direct).is_err());
        assert!(RasterOptions::new(f32::NAN, RenderMode::Markup).is_err());
        assert_eq!(RasterOptions::new(2.0, RenderMode::Markup).unwrap().scale, 2.0);
    }

    #[test]
    fn data_uri_and_digest() {
        let img = RasterImage::new(1, 1, b"abc".to_vec());
        assert_eq!(img.to_data_uri(), "data:image/png;base64,YWJj");
        assert_eq!(
            img.digest(),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }
}
