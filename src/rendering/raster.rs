/// Pixel rasterization and PNG encoding

use std::io::Cursor;

use font8x8::{UnicodeFonts, BASIC_FONTS, LATIN_FONTS};
use image::{ImageFormat, Rgba, RgbaImage};

use crate::color::Color;
use crate::rendering::layout::GLYPH;
use crate::rendering::paint::PaintCommand;
use crate::{Error, Result};

/// Largest surface edge, in device pixels
pub const MAX_DIMENSION: u32 = 16384;

/// Device size of a `width` x `height` CSS pixel surface at `scale`.
pub fn device_size(width: u32, height: u32, scale: f32) -> Result<(u32, u32)> {
    let w = (width as f32 * scale).ceil();
    let h = (height as f32 * scale).ceil();
    if !(w >= 1.0 && h >= 1.0) {
        return Err(Error::RenderFailure(format!("empty surface {}x{} at scale {}", width, height, scale)));
    }
    if w > MAX_DIMENSION as f32 || h > MAX_DIMENSION as f32 {
        return Err(Error::RenderFailure(format!(
            "surface {}x{} exceeds the {}px limit",
            w, h, MAX_DIMENSION
        )));
    }
    Ok((w as u32, h as u32))
}

/// Paint `commands` onto a `background` surface. Command coordinates are
/// CSS pixels; `scale` maps them to device pixels.
pub fn rasterize(width: u32, height: u32, background: Color, commands: &[PaintCommand], scale: f32) -> Result<RgbaImage> {
    let (w, h) = device_size(width, height, scale)?;
    let clear = background.over(Color::rgb(0, 0, 0));
    let mut img = RgbaImage::from_pixel(w, h, Rgba(clear.to_array()));
    let mut canvas = Canvas { img: &mut img, scale };

    for cmd in commands {
        match cmd {
            PaintCommand::SolidRect {
                x,
                y,
                width,
                height,
                color,
            } => canvas.fill(*x as f32, *y as f32, *width as f32, *height as f32, *color),
            PaintCommand::Text {
                x,
                y,
                text,
                color,
                scale: text_scale,
            } => canvas.text(*x, *y, text, *color, *text_scale),
        }
    }
    Ok(img)
}

struct Canvas<'i> {
    img: &'i mut RgbaImage,
    scale: f32,
}

impl Canvas<'_> {
    /// Blend a CSS-pixel rectangle onto the surface, clipped to its bounds.
    fn fill(&mut self, x: f32, y: f32, width: f32, height: f32, color: Color) {
        if color.is_transparent() {
            return;
        }
        let to_device = |v: f32, max: u32| ((v * self.scale).round().max(0.0) as u32).min(max);
        let (iw, ih) = self.img.dimensions();
        let (x0, x1) = (to_device(x, iw), to_device(x + width, iw));
        let (y0, y1) = (to_device(y, ih), to_device(y + height, ih));
        for py in y0..y1 {
            for px in x0..x1 {
                let dst = self.img.get_pixel(px, py);
                let base = Color::rgb(dst[0], dst[1], dst[2]);
                self.img.put_pixel(px, py, Rgba(color.over(base).to_array()));
            }
        }
    }

    fn text(&mut self, x: i32, y: i32, text: &str, color: Color, text_scale: u32) {
        let cell = text_scale.max(1) as f32;
        let mut cursor_x = x as f32;
        for ch in text.chars() {
            if let Some(glyph) = glyph_for(ch) {
                for (row_idx, &row) in glyph.iter().enumerate() {
                    for col_idx in 0..8u32 {
                        if (row >> col_idx) & 1 == 0 {
                            continue;
                        }
                        self.fill(
                            cursor_x + col_idx as f32 * cell,
                            y as f32 + row_idx as f32 * cell,
                            cell,
                            cell,
                            color,
                        );
                    }
                }
            }
            cursor_x += GLYPH as f32 * cell;
        }
    }
}

/// Glyph bitmap for `ch`; unknown printable characters draw as `?`.
fn glyph_for(ch: char) -> Option<[u8; 8]> {
    if ch == ' ' {
        return None;
    }
    BASIC_FONTS
        .get(ch)
        .or_else(|| LATIN_FONTS.get(ch))
        .or_else(|| BASIC_FONTS.get('?'))
}

/// Encode as PNG.
pub fn encode_png(img: &RgbaImage) -> Result<Vec<u8>> {
    let mut out = Cursor::new(Vec::new());
    img.write_to(&mut out, ImageFormat::Png)
        .map_err(|e| Error::RenderFailure(format!("png encoding failed: {}", e)))?;
    Ok(out.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn surface_size_follows_scale_and_limits() {
        assert_eq!(device_size(100, 50, 2.0).unwrap(), (200, 100));
        assert_eq!(device_size(101, 51, 1.5).unwrap(), (152, 77));
        assert!(matches!(device_size(0, 50, 1.0), Err(Error::RenderFailure(_))));
        assert!(matches!(device_size(9000, 10, 2.0), Err(Error::RenderFailure(_))));
    }

    #[test]
    fn rects_are_scaled_and_clipped() {
        let cmds = vec![PaintCommand::SolidRect {
            x: 2,
            y: 2,
            width: 100,
            height: 1,
            color: Color::rgb(255, 0, 0),
        }];
        let img = rasterize(10, 10, Color::rgb(0, 0, 0), &cmds, 2.0).unwrap();
        assert_eq!(img.dimensions(), (20, 20));
        assert_eq!(img.get_pixel(4, 4).0, [255, 0, 0, 255]);
        assert_eq!(img.get_pixel(19, 5).0, [255, 0, 0, 255]);
        assert_eq!(img.get_pixel(3, 4).0, [0, 0, 0, 255]);
        assert_eq!(img.get_pixel(4, 6).0, [0, 0, 0, 255]);
    }

    #[test]
    fn text_sets_glyph_pixels() {
        let cmds = vec![PaintCommand::Text {
            x: 0,
            y: 0,
            text: "H".into(),
            color: Color::rgb(255, 255, 255),
            scale: 1,
        }];
        let img = rasterize(8, 8, Color::rgb(0, 0, 0), &cmds, 1.0).unwrap();
        let lit = img.pixels().filter(|p| p.0[0] == 255).count();
        let expected: u32 = BASIC_FONTS.get('H').unwrap().iter().map(|r| r.count_ones()).sum();
        assert_eq!(lit as u32, expected);
        assert!(glyph_for('é').is_some());
        assert!(glyph_for('\u{4e2d}').is_some());
        assert!(glyph_for(' ').is_none());
    }

    #[test]
    fn png_signature() {
        let img = rasterize(4, 4, Color::rgb(30, 30, 30), &[], 1.0).unwrap();
        let png = encode_png(&img).unwrap();
        assert_eq!(&png[..8], b"\x89PNG\r\n\x1a\n");
    }
}
