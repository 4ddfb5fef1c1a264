//! User actions and their top-level handling.
//!
//! Each button or menu click becomes one `UserAction`. The dispatcher turns
//! it into a single `CaptureRequest`, runs it, and owns the failure policy:
//! nothing is retried, every failure ends in exactly one alert, and the
//! per-message busy state is released on every exit path.

use std::collections::HashSet;
use std::sync::Mutex;

use log::{debug, error};

use crate::host::Conversation;
use crate::pipeline::{CaptureOutcome, Capturer};
use crate::select::{CaptureRequest, CaptureTarget, WindowSpec};
use crate::{Error, Result};

/// A click the host forwards to the plugin
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserAction {
    /// The capture button on one message
    CaptureMessage { message_id: String },
    /// An entry of a message's long-press menu (`prev2`, `next1`, ...)
    ContextMenu { message_id: String, window: WindowSpec },
    /// "Capture last message" in the settings panel or extension menu
    CaptureLast,
    /// Capture the selected message
    CaptureSelected,
    /// "Capture entire conversation" in the extension menu
    CaptureConversation,
}

impl UserAction {
    /// Build the capture request this action stands for.
    pub fn to_request(&self, conversation: &Conversation, include_header: bool) -> Result<CaptureRequest> {
        let anchor = |id: &str| {
            conversation
                .find_by_id(id)
                .ok_or_else(|| Error::AnchorNotFound(format!("no message with id '{}'", id)))
        };
        let target = match self {
            UserAction::CaptureMessage { message_id } => CaptureTarget::Message(anchor(message_id)?),
            UserAction::ContextMenu { message_id, window } => CaptureTarget::Window {
                anchor: anchor(message_id)?,
                spec: *window,
            },
            UserAction::CaptureLast => CaptureTarget::Last,
            UserAction::CaptureSelected => CaptureTarget::Selected,
            UserAction::CaptureConversation => CaptureTarget::Conversation,
        };
        Ok(CaptureRequest {
            target,
            include_header,
        })
    }

    /// Message whose button shows the busy spinner while this action runs
    fn busy_key(&self) -> Option<&str> {
        match self {
            UserAction::CaptureMessage { message_id } | UserAction::ContextMenu { message_id, .. } => {
                Some(message_id.as_str())
            }
            _ => None,
        }
    }
}

/// Where user-visible failure messages go (the host's alert)
pub trait Notifier: Send + Sync {
    fn alert(&self, text: &str);
}

/// Notifier that writes alerts to the error log
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn alert(&self, text: &str) {
        error!("{}", text);
    }
}

/// How a dispatched action ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionOutcome {
    Captured(CaptureOutcome),
    /// The message was already busy with another capture
    Ignored,
    /// The capture failed; carries the alert text shown to the user
    Failed(String),
}

/// Dispatches user actions and applies the failure policy
pub struct ActionDispatcher<'n> {
    notifier: &'n dyn Notifier,
    include_header: bool,
    busy: Mutex<HashSet<String>>,
}

struct BusyGuard<'d> {
    busy: &'d Mutex<HashSet<String>>,
    key: String,
}

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        if let Ok(mut set) = self.busy.lock() {
            set.remove(&self.key);
        }
    }
}

impl<'n> ActionDispatcher<'n> {
    pub fn new(notifier: &'n dyn Notifier) -> Self {
        Self {
            notifier,
            include_header: true,
            busy: Mutex::new(HashSet::new()),
        }
    }

    pub fn with_header(mut self, include_header: bool) -> Self {
        self.include_header = include_header;
        self
    }

    /// Whether a capture for `message_id` is in flight
    pub fn is_busy(&self, message_id: &str) -> bool {
        self.busy.lock().map(|s| s.contains(message_id)).unwrap_or(false)
    }

    fn acquire(&self, key: &str) -> Option<BusyGuard<'_>> {
        let mut set = self.busy.lock().ok()?;
        if !set.insert(key.to_string()) {
            return None;
        }
        Some(BusyGuard {
            busy: &self.busy,
            key: key.to_string(),
        })
    }

    pub async fn dispatch(&self, capturer: &Capturer<'_>, action: &UserAction) -> ActionOutcome {
        let _guard = match action.busy_key() {
            Some(key) => match self.acquire(key) {
                Some(guard) => Some(guard),
                None => {
                    debug!("message {} is already being captured, ignoring {:?}", key, action);
                    return ActionOutcome::Ignored;
                }
            },
            None => None,
        };

        let result = match action.to_request(capturer.conversation(), self.include_header) {
            Ok(request) => capturer.run(request).await,
            Err(e) => Err(e),
        };

        match result {
            Ok(outcome) => ActionOutcome::Captured(outcome),
            Err(e) => {
                let text = format!("Screenshot failed: {}", e.user_message());
                self.notifier.alert(&text);
                ActionOutcome::Failed(text)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::select::Direction;

    const CHAT: &str = r#"<div id="chat">
      <div class="mes" mesid="0">a</div>
      <div class="mes" mesid="1">b</div>
      <div class="mes last_mes" mesid="2">c</div>
    </div>"#;

    #[test]
    fn actions_map_to_requests() {
        let conv = Conversation::parse(CHAT).unwrap();
        let req = UserAction::CaptureLast.to_request(&conv, true).unwrap();
        assert_eq!(req.target, CaptureTarget::Last);
        assert!(req.include_header);

        let window = WindowSpec::new(Direction::Before, 2).unwrap();
        let req = UserAction::ContextMenu {
            message_id: "2".into(),
            window,
        }
        .to_request(&conv, false)
        .unwrap();
        assert_eq!(
            req.target,
            CaptureTarget::Window {
                anchor: conv.message_at(2).unwrap(),
                spec: window
            }
        );
        assert!(!req.include_header);

        let err = UserAction::CaptureMessage { message_id: "42".into() }
            .to_request(&conv, true)
            .unwrap_err();
        assert!(matches!(err, Error::AnchorNotFound(_)));
    }

    #[test]
    fn busy_guard_is_released_on_drop() {
        let notifier = LogNotifier;
        let dispatcher = ActionDispatcher::new(&notifier);
        {
            let guard = dispatcher.acquire("7");
            assert!(guard.is_some());
            assert!(dispatcher.is_busy("7"));
            assert!(dispatcher.acquire("7").is_none());
        }
        assert!(!dispatcher.is_busy("7"));
        assert!(dispatcher.acquire("7").is_some());
    }
}
