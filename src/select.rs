//! Message selection: which messages a capture request covers.

use std::fmt;
use std::str::FromStr;

use crate::host::{Conversation, MessageRef};
use crate::{Error, Result};

/// Largest window a context-menu action can request.
pub const MAX_WINDOW: u8 = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Before,
    After,
}

/// A contiguous run of messages relative to an anchor: the anchor plus
/// `count` neighbours in `direction`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowSpec {
    direction: Direction,
    count: u8,
}

impl WindowSpec {
    pub fn new(direction: Direction, count: u8) -> Result<Self> {
        if count == 0 || count > MAX_WINDOW {
            return Err(Error::ConfigError(format!(
                "window count must be between 1 and {}, got {}",
                MAX_WINDOW, count
            )));
        }
        Ok(Self { direction, count })
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn count(&self) -> u8 {
        self.count
    }
}

/// Context-menu action names: `prev1`..`prev4`, `next1`..`next4`.
impl FromStr for WindowSpec {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        let (direction, digits) = if let Some(rest) = s.strip_prefix("prev") {
            (Direction::Before, rest)
        } else if let Some(rest) = s.strip_prefix("next") {
            (Direction::After, rest)
        } else {
            return Err(Error::ConfigError(format!("unknown window action '{}'", s)));
        };
        let count = digits
            .parse::<u8>()
            .map_err(|_| Error::ConfigError(format!("unknown window action '{}'", s)))?;
        WindowSpec::new(direction, count)
    }
}

impl fmt::Display for WindowSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.direction {
            Direction::Before => write!(f, "prev{}", self.count),
            Direction::After => write!(f, "next{}", self.count),
        }
    }
}

/// What a capture request points at
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureTarget {
    /// The host's latest message
    Last,
    /// The message flagged as selected
    Selected,
    /// One specific message (the per-message capture button)
    Message(MessageRef),
    /// A window of messages around an anchor
    Window { anchor: MessageRef, spec: WindowSpec },
    /// Every message of the conversation
    Conversation,
}

/// One user-initiated capture
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureRequest {
    pub target: CaptureTarget,
    pub include_header: bool,
}

impl CaptureRequest {
    pub fn new(target: CaptureTarget) -> Self {
        Self {
            target,
            include_header: true,
        }
    }

    pub fn without_header(mut self) -> Self {
        self.include_header = false;
        self
    }

    /// The message whose metadata names the exported file, if any.
    pub fn naming_anchor(&self) -> Option<MessageRef> {
        match self.target {
            CaptureTarget::Message(m) => Some(m),
            CaptureTarget::Window { anchor, .. } => Some(anchor),
            _ => None,
        }
    }

    /// File-name hint used when there is no naming anchor.
    pub fn hint(&self) -> String {
        match self.target {
            CaptureTarget::Last => "last_message".to_string(),
            CaptureTarget::Selected => "selected".to_string(),
            CaptureTarget::Message(_) => "message".to_string(),
            CaptureTarget::Window { spec, .. } => format!("messages_{}", spec),
            CaptureTarget::Conversation => "conversation".to_string(),
        }
    }
}

/// Select the window `spec` describes around `anchor` from `all`.
///
/// The result always contains the anchor; requests that reach past either
/// end of `all` are clamped silently.
pub fn select_window<T: PartialEq + Clone>(all: &[T], anchor: &T, spec: WindowSpec) -> Result<Vec<T>> {
    let i = all
        .iter()
        .position(|n| n == anchor)
        .ok_or_else(|| Error::AnchorNotFound("anchor is not part of the message sequence".into()))?;
    let count = spec.count as usize;
    let (start, end) = match spec.direction {
        Direction::Before => (i.saturating_sub(count), i),
        Direction::After => (i, (i + count).min(all.len() - 1)),
    };
    Ok(all[start..=end].to_vec())
}

/// Resolve a capture target against a conversation.
pub fn select_targets(conversation: &Conversation, target: &CaptureTarget) -> Result<Vec<MessageRef>> {
    match target {
        CaptureTarget::Last => conversation
            .last_message()
            .map(|m| vec![m])
            .ok_or_else(|| Error::TargetNotFound("last message not found".into())),
        CaptureTarget::Selected => conversation
            .selected_message()
            .map(|m| vec![m])
            .ok_or_else(|| Error::TargetNotFound("no message is selected".into())),
        CaptureTarget::Message(m) => {
            if conversation.contains(*m) {
                Ok(vec![*m])
            } else {
                Err(Error::AnchorNotFound(format!("message #{} is not in the conversation", m.ordinal())))
            }
        }
        CaptureTarget::Window { anchor, spec } => select_window(&conversation.messages(), anchor, *spec),
        CaptureTarget::Conversation => {
            let all = conversation.messages();
            if all.is_empty() {
                Err(Error::TargetNotFound("the conversation has no messages".into()))
            } else {
                Ok(all)
            }
        }
    }
}
