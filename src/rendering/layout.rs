/// Block layout for staged message copies
///
/// Every message becomes one box stacked vertically inside the stage
/// padding. Inside a box, block-level descendants become text blocks laid
/// out on an 8px character grid; inline content is flattened into the
/// nearest block.

use crate::color::{parse_css_color, Color};
use crate::snapshot::{DetachedElement, DetachedNode};
use crate::stage::StagedContainer;

/// Glyph cell size in CSS pixels at text scale 1
pub const GLYPH: u32 = 8;
/// Vertical space between lines at text scale 1
pub const LEADING: u32 = 4;
/// Inner padding of each message box
pub const BOX_PADDING: u32 = 6;
/// Gap between stacked message boxes
pub const BOX_GAP: u32 = 8;
/// Gap between text blocks inside a box
pub const BLOCK_GAP: u32 = 4;

const BLOCK_ELEMENTS: &[&str] = &[
    "address", "article", "aside", "blockquote", "details", "dd", "div", "dl", "dt", "figcaption", "figure",
    "footer", "h1", "h2", "h3", "h4", "h5", "h6", "header", "hr", "li", "main", "nav", "ol", "p", "pre",
    "section", "summary", "table", "tr", "ul",
];

const SKIPPED_ELEMENTS: &[&str] = &["head", "noscript", "script", "style", "template", "title"];

/// Classes the host uses for a message's sender header
const HEADER_CLASSES: &[&str] = &["ch_name", "name_text"];
const OWN_MESSAGE_CLASS: &str = "user_mes";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElementType {
    /// `h1`/`h2`, drawn at twice the text scale
    Title,
    /// Sender name row
    Header,
    Paragraph,
}

impl ElementType {
    pub fn text_scale(&self) -> u32 {
        match self {
            ElementType::Title => 2,
            _ => 1,
        }
    }
}

/// A wrapped run of text
#[derive(Debug, Clone, PartialEq)]
pub struct TextBlock {
    pub rect: Rect,
    pub lines: Vec<String>,
    pub kind: ElementType,
    /// Inline `color` from the nearest styled ancestor
    pub color: Option<Color>,
}

/// One staged message
#[derive(Debug, Clone, PartialEq)]
pub struct MessageBox {
    pub rect: Rect,
    /// Inline `background-color` of the copied root
    pub background: Option<Color>,
    pub is_own_message: bool,
    pub blocks: Vec<TextBlock>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PageLayout {
    pub width: u32,
    pub height: u32,
    pub background: Color,
    pub messages: Vec<MessageBox>,
}

/// Lay out `roots` (one per staged copy, in order) inside `container`.
pub fn layout_stage(container: &StagedContainer, roots: &[&DetachedElement]) -> PageLayout {
    let padding = container.padding;
    let box_width = container.content_width();
    let mut y = padding;
    let mut messages = Vec::with_capacity(roots.len());

    for (i, root) in roots.iter().enumerate() {
        if i > 0 {
            y += BOX_GAP;
        }
        let message = layout_message(root, padding as i32, y as i32, box_width);
        y += message.rect.height;
        messages.push(message);
    }

    PageLayout {
        width: container.width,
        height: y + padding,
        background: container.background,
        messages,
    }
}

fn layout_message(root: &DetachedElement, x: i32, y: i32, width: u32) -> MessageBox {
    let mut raw = Vec::new();
    let mut current = RawBlock::new(ElementType::Paragraph, None);
    collect_blocks(root, ElementType::Paragraph, None, &mut current, &mut raw);
    flush(&mut current, &mut raw);

    let inner_w = width.saturating_sub(BOX_PADDING * 2);
    let mut cursor = y as u32 + BOX_PADDING;
    let mut blocks = Vec::with_capacity(raw.len());
    for (i, block) in raw.into_iter().enumerate() {
        if i > 0 {
            cursor += BLOCK_GAP;
        }
        let scale = block.kind.text_scale();
        let lines = wrap_text(&block.text, chars_per_line(inner_w, scale));
        let line_h = (GLYPH + LEADING) * scale;
        let height = (lines.len().max(1) as u32) * line_h;
        blocks.push(TextBlock {
            rect: Rect {
                x: x + BOX_PADDING as i32,
                y: cursor as i32,
                width: inner_w,
                height,
            },
            lines,
            kind: block.kind,
            color: block.color,
        });
        cursor += height;
    }
    let height = cursor + BOX_PADDING - y as u32;

    MessageBox {
        rect: Rect { x, y, width, height },
        background: root.style("background-color").and_then(|v| parse_css_color(&v)),
        is_own_message: root.has_class(OWN_MESSAGE_CLASS),
        blocks,
    }
}

struct RawBlock {
    kind: ElementType,
    color: Option<Color>,
    text: String,
}

impl RawBlock {
    fn new(kind: ElementType, color: Option<Color>) -> Self {
        Self {
            kind,
            color,
            text: String::new(),
        }
    }

    /// Append `text` with HTML whitespace collapsing.
    fn push_text(&mut self, text: &str) {
        let collapsible = |c: char| c.is_whitespace() && c != '\u{a0}';
        if text.starts_with(collapsible) {
            self.soft_space();
        }
        let mut any = false;
        for (i, word) in text.split(collapsible).filter(|w| !w.is_empty()).enumerate() {
            if i > 0 {
                self.text.push(' ');
            }
            self.text.push_str(&word.replace('\u{a0}', " "));
            any = true;
        }
        if any && text.ends_with(collapsible) {
            self.soft_space();
        }
    }

    fn soft_space(&mut self) {
        if !self.text.is_empty() && !self.text.ends_with([' ', '\n']) {
            self.text.push(' ');
        }
    }

    fn line_break(&mut self) {
        while self.text.ends_with(' ') {
            self.text.pop();
        }
        self.text.push('\n');
    }
}

fn flush(current: &mut RawBlock, out: &mut Vec<RawBlock>) {
    if !current.text.trim().is_empty() {
        let next = RawBlock::new(current.kind, current.color);
        out.push(std::mem::replace(current, next));
    } else {
        current.text.clear();
    }
}

fn is_hidden(el: &DetachedElement) -> bool {
    SKIPPED_ELEMENTS.contains(&el.name.as_str())
        || el.attr("hidden").is_some()
        || el
            .style("display")
            .map(|d| d.trim().eq_ignore_ascii_case("none"))
            .unwrap_or(false)
}

fn collect_blocks(
    el: &DetachedElement,
    kind: ElementType,
    color: Option<Color>,
    current: &mut RawBlock,
    out: &mut Vec<RawBlock>,
) {
    if is_hidden(el) {
        return;
    }
    let name = el.name.as_str();
    if name == "br" {
        current.line_break();
        return;
    }

    let kind = match name {
        "h1" | "h2" => ElementType::Title,
        _ if HEADER_CLASSES.iter().any(|c| el.has_class(c)) => ElementType::Header,
        _ => kind,
    };
    let color = el.style("color").and_then(|v| parse_css_color(&v)).or(color);
    let is_block = BLOCK_ELEMENTS.contains(&name);

    if is_block {
        flush(current, out);
        current.kind = kind;
        current.color = color;
    }
    for child in &el.children {
        match child {
            DetachedNode::Text(t) => current.push_text(t),
            DetachedNode::Element(e) => {
                if BLOCK_ELEMENTS.contains(&e.name.as_str()) {
                    collect_blocks(e, kind, color, current, out);
                    current.kind = kind;
                    current.color = color;
                } else {
                    collect_blocks(e, kind, color, current, out);
                }
            }
        }
    }
    if is_block {
        flush(current, out);
    }
}

/// Characters that fit on one line of `width` pixels at `scale`
pub fn chars_per_line(width: u32, scale: u32) -> usize {
    let cell = GLYPH * scale.max(1);
    ((width / cell) as usize).max(1)
}

/// Greedy word wrap on a character grid. Counts chars, not bytes; words
/// longer than a line are split.
pub fn wrap_text(text: &str, max_chars: usize) -> Vec<String> {
    let max_chars = max_chars.max(1);
    let mut lines = Vec::new();
    for paragraph in text.split('\n') {
        let mut cur = String::new();
        let mut cur_len = 0usize;
        for word in paragraph.split(' ').filter(|w| !w.is_empty()) {
            let mut word: Vec<char> = word.chars().collect();
            while word.len() > max_chars {
                if cur_len > 0 {
                    lines.push(std::mem::take(&mut cur));
                    cur_len = 0;
                }
                let rest = word.split_off(max_chars);
                lines.push(word.into_iter().collect());
                word = rest;
            }
            if word.is_empty() {
                continue;
            }
            let needed = if cur_len == 0 { word.len() } else { cur_len + 1 + word.len() };
            if needed > max_chars {
                lines.push(std::mem::take(&mut cur));
                cur_len = 0;
            }
            if cur_len > 0 {
                cur.push(' ');
                cur_len += 1;
            }
            cur.extend(word.iter());
            cur_len += word.len();
        }
        lines.push(cur);
    }
    while lines.len() > 1 && lines.last().map(|l| l.is_empty()).unwrap_or(false) {
        lines.pop();
    }
    lines
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::Conversation;
    use crate::snapshot::snapshot;
    use crate::stage::{OffscreenHost, Stage, StageOptions};

    fn staged_layout(html: &str, width: u32) -> PageLayout {
        let conv = Conversation::parse(html).unwrap();
        let copies = snapshot(&conv, &conv.messages(), true).unwrap();
        let host = OffscreenHost::new();
        let stage = Stage::mount(
            &host,
            copies,
            StageOptions {
                sizing_hint: Some(width),
                background_hint: None,
            },
        );
        let roots: Vec<&DetachedElement> = stage.container().children.iter().map(|c| &c.root).collect();
        layout_stage(stage.container(), &roots)
    }

    #[test]
    fn wraps_on_character_grid() {
        assert_eq!(wrap_text("hello world again", 11), vec!["hello world", "again"]);
        assert_eq!(wrap_text("abcdefghij", 4), vec!["abcd", "efgh", "ij"]);
        assert_eq!(wrap_text("héllo wörld", 5), vec!["héllo", "wörld"]);
        assert_eq!(wrap_text("one\ntwo", 80), vec!["one", "two"]);
        assert_eq!(wrap_text("", 10), vec![""]);
        assert_eq!(chars_per_line(100, 1), 12);
        assert_eq!(chars_per_line(100, 2), 6);
        assert_eq!(chars_per_line(3, 1), 1);
    }

    #[test]
    fn messages_stack_inside_padding() {
        let layout = staged_layout(
            r#"<div id="chat">
              <div class="mes"><p>first</p></div>
              <div class="mes user_mes" style="background-color: #334455"><p>second</p><p>third</p></div>
            </div>"#,
            300,
        );
        assert_eq!(layout.width, 300);
        assert_eq!(layout.messages.len(), 2);
        let (a, b) = (&layout.messages[0], &layout.messages[1]);
        assert_eq!(a.rect.x, 10);
        assert_eq!(a.rect.y, 10);
        assert_eq!(a.rect.width, 280);
        assert_eq!(b.rect.y, a.rect.y + a.rect.height as i32 + BOX_GAP as i32);
        assert_eq!(layout.height, b.rect.y as u32 + b.rect.height + 10);
        assert!(b.is_own_message);
        assert_eq!(b.background, Some(Color::rgb(0x33, 0x44, 0x55)));
        assert_eq!(b.blocks.len(), 2);
    }

    #[test]
    fn headings_headers_and_hidden_content() {
        let layout = staged_layout(
            r#"<div id="chat"><div class="mes"><div class="mes_block">
              <div class="ch_name"><span class="name_text">Alice</span></div>
              <div class="mes_text">
                <h1>Big</h1>
                <p style="color: #ff0000">red <b>bold</b> text<br>next line</p>
                <p style="display: none">hidden</p>
                <script>var x = 1;</script>
              </div>
            </div></div></div>"#,
            400,
        );
        let blocks = &layout.messages[0].blocks;
        let kinds: Vec<ElementType> = blocks.iter().map(|b| b.kind).collect();
        assert_eq!(kinds, vec![ElementType::Header, ElementType::Title, ElementType::Paragraph]);
        assert_eq!(blocks[0].lines, vec!["Alice"]);
        assert_eq!(blocks[2].lines, vec!["red bold text", "next line"]);
        assert_eq!(blocks[2].color, Some(Color::rgb(255, 0, 0)));
        assert_eq!(blocks[1].rect.height, (GLYPH + LEADING) * 2);
        let all: String = blocks.iter().flat_map(|b| b.lines.clone()).collect();
        assert!(!all.contains("hidden"));
        assert!(!all.contains("var x"));
    }

    #[test]
    fn empty_stage_is_only_padding() {
        let host = OffscreenHost::new();
        let stage = Stage::mount(&host, Vec::new(), StageOptions::default());
        let layout = layout_stage(stage.container(), &[]);
        assert_eq!(layout.height, 20);
        assert!(layout.messages.is_empty());
    }
}
