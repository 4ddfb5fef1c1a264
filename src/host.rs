//! Host document adapter.
//!
//! The host is a chat client whose conversation lives in the DOM: a chat
//! container holding one element per message. `Conversation` parses that
//! markup with `scraper` and exposes the pieces the capture pipeline reads:
//! the flat message sequence, the "last" and "selected" predicates, the body
//! and header regions of a message, naming metadata, and theme lookups.
//! The document is never mutated.

use std::sync::atomic::{AtomicU64, Ordering};

use ego_tree::NodeId;
use log::debug;
use scraper::{ElementRef, Html, Selector};
use serde::{Deserialize, Serialize};

use crate::color::{parse_css_color, Color};
use crate::{Error, Result};

/// CSS selectors describing the host's message markup
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct HostSelectors {
    /// Chat container holding every message
    pub chat: String,
    /// One message
    pub message: String,
    /// The message the host flags as the latest one
    pub last_message: String,
    /// Body text region inside a message
    pub message_text: String,
    /// Header region (avatar, sender name, buttons) inside a message
    pub message_header: String,
    /// Sender name inside a message, looked up before `message_header`
    pub sender_name: String,
    /// Predicates for the selected message, tried in order
    pub selected: Vec<String>,
    /// Class marking messages written by the local user
    pub own_message_class: String,
}

impl Default for HostSelectors {
    fn default() -> Self {
        Self {
            chat: "#chat".to_string(),
            message: ".mes".to_string(),
            last_message: ".mes.last_mes".to_string(),
            message_text: ".mes_block .mes_text".to_string(),
            message_header: ".mes_block .ch_name".to_string(),
            sender_name: ".mes_block .ch_name .name_text".to_string(),
            selected: vec![".mes[data-selected=\"true\"]".to_string(), ".mes.selected".to_string()],
            own_message_class: "user_mes".to_string(),
        }
    }
}

struct CompiledSelectors {
    chat: Selector,
    message: Selector,
    last_message: Selector,
    message_text: Selector,
    message_header: Selector,
    sender_name: Selector,
    selected: Vec<Selector>,
    own_message_class: String,
}

impl CompiledSelectors {
    fn compile(raw: &HostSelectors) -> Result<Self> {
        Ok(Self {
            chat: compile_selector(&raw.chat)?,
            message: compile_selector(&raw.message)?,
            last_message: compile_selector(&raw.last_message)?,
            message_text: compile_selector(&raw.message_text)?,
            message_header: compile_selector(&raw.message_header)?,
            sender_name: compile_selector(&raw.sender_name)?,
            selected: raw
                .selected
                .iter()
                .map(|s| compile_selector(s))
                .collect::<Result<Vec<_>>>()?,
            own_message_class: raw.own_message_class.clone(),
        })
    }
}

fn compile_selector(s: &str) -> Result<Selector> {
    Selector::parse(s).map_err(|e| Error::ConfigError(format!("invalid selector '{}': {:?}", s, e)))
}

static NEXT_CONVERSATION_ID: AtomicU64 = AtomicU64::new(1);

/// Opaque handle to one message of a `Conversation`.
///
/// A handle only resolves against the conversation that issued it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MessageRef {
    conversation: u64,
    ordinal: usize,
}

impl MessageRef {
    /// Position among the conversation's messages (0-based)
    pub fn ordinal(&self) -> usize {
        self.ordinal
    }
}

/// Naming metadata read from a message element
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MessageMeta {
    pub id: Option<String>,
    pub sender: Option<String>,
    pub timestamp: Option<String>,
    pub is_user: bool,
}

/// Ordered background lookups against the host theme.
///
/// Each strategy only yields a color when its precondition holds; the first
/// one that yields wins. When none does, the stage falls back to its own
/// fixed dark background.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThemeLookup {
    /// Inline `background-color` (or `background`) of the chat container,
    /// used when present and not fully transparent.
    ChatPanelBackground,
    /// `--pcb` custom property on `<body>` (or `<html>`), used when non-empty.
    PanelCustomProperty,
    /// `--SmartThemeBlurTintColor` on `<body>` (or `<html>`), used when non-empty.
    ThemeTint,
}

pub const THEME_LOOKUPS: [ThemeLookup; 3] = [
    ThemeLookup::ChatPanelBackground,
    ThemeLookup::PanelCustomProperty,
    ThemeLookup::ThemeTint,
];

impl ThemeLookup {
    fn resolve(&self, conversation: &Conversation) -> Option<Color> {
        match self {
            ThemeLookup::ChatPanelBackground => {
                let chat = conversation.chat()?;
                let style = chat.value().attr("style")?;
                style_value(style, "background-color")
                    .or_else(|| style_value(style, "background"))
                    .and_then(|v| parse_css_color(&v))
                    .filter(|c| !c.is_transparent())
            }
            ThemeLookup::PanelCustomProperty => conversation
                .document_property("--pcb")
                .and_then(|v| parse_css_color(&v)),
            ThemeLookup::ThemeTint => conversation
                .document_property("--SmartThemeBlurTintColor")
                .and_then(|v| parse_css_color(&v)),
        }
    }
}

/// A parsed chat conversation
pub struct Conversation {
    id: u64,
    document: Html,
    selectors: CompiledSelectors,
    messages: Vec<NodeId>,
}

impl Conversation {
    /// Parse a conversation using the default host selectors.
    pub fn parse(html: &str) -> Result<Self> {
        Self::parse_with(html, &HostSelectors::default())
    }

    /// Parse a conversation with custom host selectors. Fails with
    /// `TargetNotFound` when the chat container is missing.
    pub fn parse_with(html: &str, selectors: &HostSelectors) -> Result<Self> {
        let compiled = CompiledSelectors::compile(selectors)?;
        let document = Html::parse_document(html);
        let messages: Vec<NodeId> = {
            let chat = document.select(&compiled.chat).next().ok_or_else(|| {
                Error::TargetNotFound(format!("chat container '{}' not found", selectors.chat))
            })?;
            chat.select(&compiled.message).map(|el| el.id()).collect()
        };
        let id = NEXT_CONVERSATION_ID.fetch_add(1, Ordering::Relaxed);
        debug!("parsed conversation {} with {} messages", id, messages.len());
        Ok(Self {
            id,
            document,
            selectors: compiled,
            messages,
        })
    }

    fn chat(&self) -> Option<ElementRef<'_>> {
        self.document.select(&self.selectors.chat).next()
    }

    fn handle(&self, ordinal: usize) -> MessageRef {
        MessageRef {
            conversation: self.id,
            ordinal,
        }
    }

    fn node(&self, id: NodeId) -> Option<ElementRef<'_>> {
        self.document.tree.get(id).and_then(ElementRef::wrap)
    }

    fn position(&self, pred: impl Fn(&ElementRef<'_>) -> bool) -> Option<MessageRef> {
        self.messages
            .iter()
            .position(|&id| self.node(id).map(|el| pred(&el)).unwrap_or(false))
            .map(|ordinal| self.handle(ordinal))
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Every message, in document order
    pub fn messages(&self) -> Vec<MessageRef> {
        (0..self.len()).map(|ordinal| self.handle(ordinal)).collect()
    }

    /// Whether `message` was issued by this conversation
    pub fn contains(&self, message: MessageRef) -> bool {
        message.conversation == self.id && message.ordinal < self.len()
    }

    /// Handle for the message at `ordinal`
    pub fn message_at(&self, ordinal: usize) -> Option<MessageRef> {
        (ordinal < self.len()).then(|| self.handle(ordinal))
    }

    pub fn element(&self, message: MessageRef) -> Option<ElementRef<'_>> {
        if message.conversation != self.id {
            return None;
        }
        self.node(*self.messages.get(message.ordinal)?)
    }

    /// The message matching the host's "last message" selector
    pub fn last_message(&self) -> Option<MessageRef> {
        self.position(|el| self.selectors.last_message.matches(el))
    }

    /// The first message flagged as selected
    pub fn selected_message(&self) -> Option<MessageRef> {
        self.selectors
            .selected
            .iter()
            .find_map(|sel| self.position(|el| sel.matches(el)))
    }

    /// Look a message up by its unique id (`mesid`, `data-msg-id` or `id`).
    pub fn find_by_id(&self, id: &str) -> Option<MessageRef> {
        self.position(|el| message_id(el).as_deref() == Some(id))
    }

    /// Body text region of a message, if the host markup has one
    pub fn body_region(&self, message: MessageRef) -> Option<ElementRef<'_>> {
        self.element(message)?.select(&self.selectors.message_text).next()
    }

    /// Header region of a message, if the host markup has one
    pub fn header_region(&self, message: MessageRef) -> Option<ElementRef<'_>> {
        self.element(message)?.select(&self.selectors.message_header).next()
    }

    pub fn meta(&self, message: MessageRef) -> Option<MessageMeta> {
        let el = self.element(message)?;
        let sender = el
            .select(&self.selectors.sender_name)
            .next()
            .or_else(|| self.header_region(message))
            .map(|n| n.text().collect::<String>().trim().to_string())
            .filter(|s| !s.is_empty());
        let own_class = self.selectors.own_message_class.as_str();
        let is_user = has_class(&el, own_class)
            || el
                .ancestors()
                .filter_map(ElementRef::wrap)
                .any(|a| has_class(&a, own_class));
        Some(MessageMeta {
            id: message_id(&el),
            sender,
            timestamp: el.value().attr("data-timestamp").map(|s| s.to_string()),
            is_user,
        })
    }

    /// Rendered width of the chat panel, when the markup declares one
    pub fn panel_width(&self) -> Option<u32> {
        let chat = self.chat()?;
        let attrs = chat.value();
        attrs
            .attr("style")
            .and_then(|s| style_value(s, "width"))
            .and_then(|v| parse_px(&v))
            .or_else(|| attrs.attr("data-width").and_then(parse_px))
            .or_else(|| attrs.attr("width").and_then(parse_px))
    }

    /// Background resolved from the host theme via `THEME_LOOKUPS`.
    pub fn theme_background(&self) -> Option<(Color, ThemeLookup)> {
        THEME_LOOKUPS
            .iter()
            .find_map(|lookup| lookup.resolve(self).map(|c| (c, *lookup)))
    }

    fn document_property(&self, name: &str) -> Option<String> {
        ["body", "html"].iter().find_map(|tag| {
            let sel = Selector::parse(tag).ok()?;
            let el = self.document.select(&sel).next()?;
            style_value(el.value().attr("style")?, name)
        })
    }
}

fn message_id(el: &ElementRef<'_>) -> Option<String> {
    let v = el.value();
    v.attr("mesid")
        .or_else(|| v.attr("data-msg-id"))
        .or_else(|| v.attr("id"))
        .map(|s| s.to_string())
        .filter(|s| !s.is_empty())
}

fn has_class(el: &ElementRef<'_>, class: &str) -> bool {
    el.value()
        .attr("class")
        .map(|c| c.split_whitespace().any(|x| x == class))
        .unwrap_or(false)
}

/// Value of one declaration in an inline `style` attribute. Custom
/// properties (`--name`) match case-sensitively, others do not. Empty
/// values count as absent.
pub(crate) fn style_value(style: &str, name: &str) -> Option<String> {
    style.split(';').rev().find_map(|decl| {
        let (prop, value) = decl.split_once(':')?;
        let prop = prop.trim();
        let matches = if name.starts_with("--") {
            prop == name
        } else {
            prop.eq_ignore_ascii_case(name)
        };
        let value = value.trim().trim_end_matches("!important").trim();
        (matches && !value.is_empty()).then(|| value.to_string())
    })
}

/// Parse `"640px"` or `"640"` into pixels.
pub(crate) fn parse_px(raw: &str) -> Option<u32> {
    let v = raw.trim();
    let v = v.strip_suffix("px").unwrap_or(v).trim();
    let px = v.parse::<f64>().ok()?;
    (px.is_finite() && px >= 1.0).then(|| px.round() as u32)
}
