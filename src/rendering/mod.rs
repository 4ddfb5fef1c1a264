//! Built-in rasterizer
//!
//! Lays the staged copies out on a fixed character grid, paints them with
//! an 8x8 bitmap font and encodes the result as PNG. It is deterministic:
//! the same stage and options always produce the same bytes.

pub mod layout;
pub mod paint;
pub mod raster;

use async_trait::async_trait;
use log::debug;
use scraper::{ElementRef, Html, Selector};

use crate::rasterizer::{RasterImage, RasterOptions, Rasterizer, RenderMode};
use crate::snapshot::DetachedElement;
use crate::stage::StagedContainer;
use crate::{Error, Result};

const COPY_MARKER: &str = "data-stage-copy";

/// Bitmap-font rasterizer
#[derive(Debug, Clone, Copy, Default)]
pub struct BitmapRasterizer;

impl BitmapRasterizer {
    pub fn new() -> Self {
        Self
    }

    /// Render synchronously.
    pub fn render(&self, container: &StagedContainer, options: &RasterOptions) -> Result<RasterImage> {
        let reparsed;
        let roots: Vec<&DetachedElement> = match options.render_mode {
            RenderMode::Direct => container.children.iter().map(|c| &c.root).collect(),
            RenderMode::Markup => {
                reparsed = reparse_markup(container)?;
                reparsed.iter().collect()
            }
        };

        let page = layout::layout_stage(container, &roots);
        let commands = paint::build_display_list(&page);
        debug!(
            "painting {}x{} stage: {} messages, {} commands",
            page.width,
            page.height,
            page.messages.len(),
            commands.len()
        );
        let img = raster::rasterize(page.width, page.height, page.background, &commands, options.scale)?;
        let png = raster::encode_png(&img)?;
        Ok(RasterImage::new(img.width(), img.height(), png))
    }
}

#[async_trait]
impl Rasterizer for BitmapRasterizer {
    async fn rasterize(&self, container: &StagedContainer, options: &RasterOptions) -> Result<RasterImage> {
        self.render(container, options)
    }
}

/// Elements a root must sit inside for the HTML parser to keep it,
/// outermost first. Table parts and options get dropped inside a `div`.
fn parse_context(root: &str) -> &'static [&'static str] {
    match root {
        "tr" => &["table", "tbody"],
        "td" | "th" => &["table", "tbody", "tr"],
        "tbody" | "thead" | "tfoot" | "caption" | "colgroup" => &["table"],
        "col" => &["table", "colgroup"],
        "option" | "optgroup" => &["select"],
        _ => &["div"],
    }
}

/// Serialize the staged copies and parse them back, the way a browser
/// renders an embedded markup snapshot. Each copy is parsed on its own,
/// wrapped in the context its root element needs.
fn reparse_markup(container: &StagedContainer) -> Result<Vec<DetachedElement>> {
    let marker = Selector::parse(&format!("[{}]", COPY_MARKER))
        .map_err(|e| Error::RenderFailure(format!("marker selector: {:?}", e)))?;

    let mut roots = Vec::with_capacity(container.children.len());
    for copy in &container.children {
        let context = parse_context(&copy.root.name);
        let mut markup = String::new();
        for (depth, tag) in context.iter().enumerate() {
            if depth == 0 {
                markup.push_str(&format!("<{} {}>", tag, COPY_MARKER));
            } else {
                markup.push_str(&format!("<{}>", tag));
            }
        }
        markup.push_str(&copy.root.to_html());
        for tag in context.iter().rev() {
            markup.push_str(&format!("</{}>", tag));
        }

        let fragment = Html::parse_fragment(&markup);
        let root = fragment.select(&marker).next().and_then(|wrapper| {
            let inner = context[1..].iter().try_fold(wrapper, |el, tag| {
                el.children()
                    .filter_map(ElementRef::wrap)
                    .find(|child| child.value().name() == *tag)
            })?;
            inner
                .children()
                .filter_map(ElementRef::wrap)
                .find(|child| child.value().name() == copy.root.name)
        });
        if let Some(root) = root {
            roots.push(DetachedElement::from_element(root));
        }
    }

    if roots.len() != container.children.len() {
        return Err(Error::RenderFailure(format!(
            "markup snapshot kept {} of {} messages",
            roots.len(),
            container.children.len()
        )));
    }
    Ok(roots)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::Conversation;
    use crate::snapshot::snapshot;
    use crate::stage::{OffscreenHost, Stage, StageOptions};

    const CHAT: &str = r#"<div id="chat">
      <div class="mes" mesid="0"><div class="mes_block">
        <div class="ch_name"><span class="name_text">Bot</span></div>
        <div class="mes_text"><p>Hello &amp; <i>welcome</i></p></div>
      </div></div>
      <div class="mes user_mes" mesid="1"><div class="mes_block">
        <div class="ch_name"><span class="name_text">You</span></div>
        <div class="mes_text"><p>Thanks!</p></div>
      </div></div>
    </div>"#;

    fn render(mode: RenderMode, scale: f32) -> Result<RasterImage> {
        let conv = Conversation::parse(CHAT).unwrap();
        let copies = snapshot(&conv, &conv.messages(), true).unwrap();
        let host = OffscreenHost::new();
        let stage = Stage::mount(
            &host,
            copies,
            StageOptions {
                sizing_hint: Some(320),
                background_hint: None,
            },
        );
        let options = RasterOptions::new(scale, mode).unwrap();
        BitmapRasterizer::new().render(stage.container(), &options)
    }

    #[test]
    fn both_modes_produce_the_same_png() {
        let direct = render(RenderMode::Direct, 1.0).unwrap();
        let markup = render(RenderMode::Markup, 1.0).unwrap();
        assert_eq!(&direct.png_data[..8], b"\x89PNG\r\n\x1a\n");
        assert_eq!(direct.width, 320);
        assert_eq!(direct, markup);
    }

    #[test]
    fn scale_multiplies_device_size() {
        let one = render(RenderMode::Direct, 1.0).unwrap();
        let two = render(RenderMode::Direct, 2.0).unwrap();
        assert_eq!(two.width, one.width * 2);
        assert_eq!(two.height, one.height * 2);
    }

    #[test]
    fn rendering_is_deterministic() {
        let a = render(RenderMode::Markup, 2.0).unwrap();
        let b = render(RenderMode::Markup, 2.0).unwrap();
        assert_eq!(a.digest(), b.digest());
    }

    #[test]
    fn table_row_messages_survive_markup_mode() {
        let conv = Conversation::parse(r#"<table id="chat"><tr class="mes"><td>hello row</td></tr></table>"#).unwrap();
        assert_eq!(conv.len(), 1);
        let copies = snapshot(&conv, &conv.messages(), true).unwrap();
        let host = OffscreenHost::new();
        let stage = Stage::mount(
            &host,
            copies,
            StageOptions {
                sizing_hint: Some(200),
                background_hint: None,
            },
        );

        let reparsed = reparse_markup(stage.container()).unwrap();
        assert_eq!(reparsed.len(), 1);
        assert_eq!(reparsed[0].name, "tr");
        assert_eq!(reparsed[0].text_content(), "hello row");

        let rasterizer = BitmapRasterizer::new();
        let direct = rasterizer
            .render(stage.container(), &RasterOptions::new(1.0, RenderMode::Direct).unwrap())
            .unwrap();
        let markup = rasterizer
            .render(stage.container(), &RasterOptions::new(1.0, RenderMode::Markup).unwrap())
            .unwrap();
        assert_eq!(direct, markup);
    }

    #[test]
    fn copy_roots_get_a_parser_context() {
        assert_eq!(parse_context("td"), &["table", "tbody", "tr"]);
        assert_eq!(parse_context("option"), &["select"]);
        assert_eq!(parse_context("li"), &["div"]);
        assert_eq!(parse_context("div"), &["div"]);
    }

    #[test]
    fn oversized_stage_is_a_render_failure() {
        let host = OffscreenHost::new();
        let stage = Stage::mount(
            &host,
            Vec::new(),
            StageOptions {
                sizing_hint: Some(20_000),
                background_hint: None,
            },
        );
        let err = BitmapRasterizer::new()
            .render(stage.container(), &RasterOptions::default())
            .unwrap_err();
        assert!(matches!(err, Error::RenderFailure(_)));
    }
}
