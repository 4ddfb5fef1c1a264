/// Paint commands for a laid-out stage

use crate::color::Color;
use crate::rendering::layout::{ElementType, PageLayout, GLYPH, LEADING};

const LIGHT_TEXT: Color = Color::rgb(0xdc, 0xdc, 0xd2);
const DARK_TEXT: Color = Color::rgb(0x22, 0x22, 0x22);
const LIGHT_ACCENT: Color = Color::rgb(0xe8, 0xc0, 0x7d);
const DARK_ACCENT: Color = Color::rgb(0x6a, 0x3d, 0x9a);

#[derive(Debug, Clone, PartialEq)]
pub enum PaintCommand {
    SolidRect {
        x: i32,
        y: i32,
        width: u32,
        height: u32,
        color: Color,
    },
    /// One line of text; `scale` multiplies the 8px glyph cell
    Text {
        x: i32,
        y: i32,
        text: String,
        color: Color,
        scale: u32,
    },
}

/// Tint that sets own messages apart from the page background
fn own_message_tint(page: Color) -> Color {
    if page.is_dark() {
        Color::rgba(255, 255, 255, 18)
    } else {
        Color::rgba(0, 0, 0, 18)
    }
}

/// Build the display list, back to front. The page background itself is
/// the raster's clear color and is not part of the list.
pub fn build_display_list(layout: &PageLayout) -> Vec<PaintCommand> {
    let mut cmds = Vec::new();
    let page = layout.background;

    for (i, message) in layout.messages.iter().enumerate() {
        let mut surface = page;
        let fill = message
            .background
            .or_else(|| message.is_own_message.then(|| own_message_tint(page)));
        if let Some(fill) = fill {
            cmds.push(PaintCommand::SolidRect {
                x: message.rect.x,
                y: message.rect.y,
                width: message.rect.width,
                height: message.rect.height,
                color: fill,
            });
            surface = fill.over(page);
        }

        // separator above every message but the first
        if i > 0 {
            let divider = if page.is_dark() {
                Color::rgba(255, 255, 255, 40)
            } else {
                Color::rgba(0, 0, 0, 40)
            };
            cmds.push(PaintCommand::SolidRect {
                x: message.rect.x,
                y: message.rect.y - 4,
                width: message.rect.width,
                height: 1,
                color: divider,
            });
        }

        let dark = surface.is_dark();
        for block in &message.blocks {
            let default_color = match (block.kind, dark) {
                (ElementType::Header, true) => LIGHT_ACCENT,
                (ElementType::Header, false) => DARK_ACCENT,
                (_, true) => LIGHT_TEXT,
                (_, false) => DARK_TEXT,
            };
            let color = block.color.unwrap_or(default_color);
            let scale = block.kind.text_scale();
            let line_h = ((GLYPH + LEADING) * scale) as i32;
            for (n, line) in block.lines.iter().enumerate() {
                if line.is_empty() {
                    continue;
                }
                cmds.push(PaintCommand::Text {
                    x: block.rect.x,
                    y: block.rect.y + n as i32 * line_h + (LEADING * scale / 2) as i32,
                    text: line.clone(),
                    color,
                    scale,
                });
            }
        }
    }
    cmds
}
