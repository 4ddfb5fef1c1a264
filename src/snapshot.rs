//! Detached copies of message subtrees.
//!
//! A copy is an owned tree with no link back to the parsed document, so it
//! can be staged, serialized and laid out while the conversation stays
//! untouched. Copies are never pruned: host markup varies too much for
//! selective deletion to be safe.

use log::{debug, warn};
use scraper::{ElementRef, Node};

use crate::host::{parse_px, style_value, Conversation, MessageRef};
use crate::{Error, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DetachedNode {
    Element(DetachedElement),
    Text(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DetachedElement {
    pub name: String,
    pub attrs: Vec<(String, String)>,
    pub children: Vec<DetachedNode>,
}

impl DetachedElement {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attrs: Vec::new(),
            children: Vec::new(),
        }
    }

    /// Deep copy of `el` and all of its descendants.
    pub fn from_element(el: ElementRef<'_>) -> Self {
        let value = el.value();
        let mut out = DetachedElement {
            name: value.name().to_string(),
            attrs: value.attrs().map(|(k, v)| (k.to_string(), v.to_string())).collect(),
            children: Vec::new(),
        };
        for child in el.children() {
            match child.value() {
                Node::Text(t) => {
                    let text: &str = &t.text;
                    out.children.push(DetachedNode::Text(text.to_string()));
                }
                Node::Element(_) => {
                    if let Some(child_el) = ElementRef::wrap(child) {
                        out.children.push(DetachedNode::Element(Self::from_element(child_el)));
                    }
                }
                // comments, doctypes and processing instructions carry no
                // rendering content
                _ => {}
            }
        }
        out
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn set_attr(&mut self, name: &str, value: impl Into<String>) {
        let value = value.into();
        match self.attrs.iter_mut().find(|(k, _)| k.eq_ignore_ascii_case(name)) {
            Some(slot) => slot.1 = value,
            None => self.attrs.push((name.to_string(), value)),
        }
    }

    pub fn has_class(&self, class: &str) -> bool {
        self.attr("class")
            .map(|c| c.split_whitespace().any(|x| x == class))
            .unwrap_or(false)
    }

    pub fn style(&self, property: &str) -> Option<String> {
        self.attr("style").and_then(|s| style_value(s, property))
    }

    /// Width the markup declares for this element (`style="width: Npx"` or
    /// a `width` attribute).
    pub fn declared_width(&self) -> Option<u32> {
        self.style("width")
            .and_then(|v| parse_px(&v))
            .or_else(|| self.attr("width").and_then(parse_px))
    }

    /// Concatenated text of all descendants
    pub fn text_content(&self) -> String {
        let mut out = String::new();
        collect_text(&self.children, &mut out);
        out
    }

    /// Number of nodes in this subtree, the element itself included
    pub fn node_count(&self) -> usize {
        1 + self
            .children
            .iter()
            .map(|c| match c {
                DetachedNode::Element(e) => e.node_count(),
                DetachedNode::Text(_) => 1,
            })
            .sum::<usize>()
    }

    /// Serialize back to HTML markup.
    pub fn to_html(&self) -> String {
        let mut out = String::new();
        write_html(self, &mut out);
        out
    }
}

fn collect_text(nodes: &[DetachedNode], out: &mut String) {
    for node in nodes {
        match node {
            DetachedNode::Text(t) => out.push_str(t),
            DetachedNode::Element(e) => collect_text(&e.children, out),
        }
    }
}

const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "source", "track", "wbr",
];

fn write_html(el: &DetachedElement, out: &mut String) {
    out.push('<');
    out.push_str(&el.name);
    for (k, v) in &el.attrs {
        out.push(' ');
        out.push_str(k);
        out.push_str("=\"");
        out.push_str(&escape(v, true));
        out.push('"');
    }
    out.push('>');
    if VOID_ELEMENTS.contains(&el.name.as_str()) {
        return;
    }
    for child in &el.children {
        match child {
            DetachedNode::Text(t) => out.push_str(&escape(t, false)),
            DetachedNode::Element(e) => write_html(e, out),
        }
    }
    out.push_str("</");
    out.push_str(&el.name);
    out.push('>');
}

fn escape(s: &str, attribute: bool) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' if attribute => out.push_str("&quot;"),
            '\u{a0}' => out.push_str("&nbsp;"),
            c => out.push(c),
        }
    }
    out
}

/// A staged-ready copy of one message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DetachedCopy {
    /// Message the copy was taken from
    pub source: MessageRef,
    pub root: DetachedElement,
    /// True when only the body region was copied
    pub body_only: bool,
}

/// Copy `nodes` out of the conversation, in order.
///
/// With `include_header = false` a message that has a body region is copied
/// as that region alone; a message without one is copied whole.
pub fn snapshot(conversation: &Conversation, nodes: &[MessageRef], include_header: bool) -> Result<Vec<DetachedCopy>> {
    nodes
        .iter()
        .map(|&source| {
            let element = conversation.element(source).ok_or_else(|| {
                Error::PreparationFailure(format!("message #{} is no longer in the document", source.ordinal()))
            })?;

            if !include_header {
                match conversation.body_region(source) {
                    Some(body) => {
                        return Ok(DetachedCopy {
                            source,
                            root: DetachedElement::from_element(body),
                            body_only: true,
                        })
                    }
                    None => warn!(
                        "message #{} has no body region, capturing the full message",
                        source.ordinal()
                    ),
                }
            }

            let root = DetachedElement::from_element(element);
            debug!("copied message #{} ({} nodes)", source.ordinal(), root.node_count());
            Ok(DetachedCopy {
                source,
                root,
                body_only: false,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const CHAT: &str = r#"<div id="chat">
  <div class="mes" mesid="1"><div class="mes_block">
    <div class="ch_name"><span class="name_text">Alice</span></div>
    <div class="mes_text"><p>Hello <b>there</b> &amp; welcome</p><!-- note --></div>
  </div></div>
  <div class="mes" mesid="2" style="width: 512px"><p>headerless</p><br></div>
</div>"#;

    #[test]
    fn full_copy_keeps_every_descendant() {
        let conv = Conversation::parse(CHAT).unwrap();
        let first = conv.message_at(0).unwrap();
        let copies = snapshot(&conv, &[first], true).unwrap();
        assert_eq!(copies.len(), 1);
        let root = &copies[0].root;
        assert!(!copies[0].body_only);
        assert_eq!(root.attr("mesid"), Some("1"));
        let text = root.text_content();
        assert!(text.contains("Alice"));
        assert!(text.contains("Hello there & welcome"));
    }

    #[test]
    fn body_only_copy_drops_the_header() {
        let conv = Conversation::parse(CHAT).unwrap();
        let first = conv.message_at(0).unwrap();
        let copies = snapshot(&conv, &[first], false).unwrap();
        assert!(copies[0].body_only);
        assert!(copies[0].root.has_class("mes_text"));
        assert!(!copies[0].root.text_content().contains("Alice"));
    }

    #[test]
    fn missing_body_region_falls_back_to_full_copy() {
        let conv = Conversation::parse(CHAT).unwrap();
        let second = conv.message_at(1).unwrap();
        let copies = snapshot(&conv, &[second], false).unwrap();
        assert!(!copies[0].body_only);
        assert!(copies[0].root.has_class("mes"));
        assert_eq!(copies[0].root.declared_width(), Some(512));
    }

    #[test]
    fn copies_are_independent() {
        let conv = Conversation::parse(CHAT).unwrap();
        let first = conv.message_at(0).unwrap();
        let mut a = snapshot(&conv, &[first], true).unwrap().remove(0);
        let b = snapshot(&conv, &[first], true).unwrap().remove(0);
        assert_eq!(a, b);

        a.root.set_attr("mesid", "changed");
        a.root.children.clear();
        assert_ne!(a, b);
        assert_eq!(b.root.attr("mesid"), Some("1"));
        assert!(b.root.text_content().contains("Hello"));

        let c = snapshot(&conv, &[first], true).unwrap().remove(0);
        assert_eq!(b, c);
    }

    #[test]
    fn html_serialization_escapes_text_and_attributes() {
        let mut el = DetachedElement::new("div");
        el.set_attr("title", "a \"quoted\" <title>");
        el.children.push(DetachedNode::Text("1 < 2 & 3".into()));
        el.children.push(DetachedNode::Element(DetachedElement::new("br")));
        assert_eq!(
            el.to_html(),
            "<div title=\"a &quot;quoted&quot; &lt;title&gt;\">1 &lt; 2 &amp; 3<br></div>"
        );
    }
}
