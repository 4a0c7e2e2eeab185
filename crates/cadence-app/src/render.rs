//! Terminal rendering of delivery notifications.
//!
//! Notifications carry the full content so far. The terminal can only
//! append, so each one is turned into the text that still has to be written.

use cadence_core::types::MessageId;
use cadence_delivery::Notification;

/// Tracks what has already been written for the current reply.
#[derive(Debug, Default)]
pub struct Transcript {
    current: Option<MessageId>,
    written: String,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    /// Text to write for `notification`.
    pub fn render(&mut self, notification: &Notification) -> String {
        let mut out = String::new();
        if self.current != Some(notification.message_id) {
            self.current = Some(notification.message_id);
            self.written.clear();
            out.push_str("assistant> ");
        }

        match notification.content.strip_prefix(self.written.as_str()) {
            Some(delta) => out.push_str(delta),
            None => {
                // Content was replaced (apology or fallback text)
                out.push_str("\n  ");
                out.push_str(&notification.content);
            }
        }
        self.written.clone_from(&notification.content);

        if notification.terminal {
            if let Some(model) = &notification.model_name {
                out.push_str(&format!("\n  [{}]", model));
            }
            out.push('\n');
            self.current = None;
            self.written.clear();
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn note(id: MessageId, content: &str, model: Option<&str>, terminal: bool) -> Notification {
        Notification {
            message_id: id,
            content: content.to_string(),
            model_name: model.map(str::to_string),
            terminal,
        }
    }

    #[test]
    fn test_appends_only_new_text() {
        let id = MessageId::new();
        let mut t = Transcript::new();
        assert_eq!(t.render(&note(id, "a b", None, false)), "assistant> a b");
        assert_eq!(t.render(&note(id, "a b c d", None, false)), " c d");
        assert_eq!(t.render(&note(id, "a b c d", Some("X"), true)), "\n  [X]\n");
    }

    #[test]
    fn test_replaced_content_written_on_new_line() {
        let id = MessageId::new();
        let mut t = Transcript::new();
        t.render(&note(id, "Partial", None, false));
        assert_eq!(t.render(&note(id, "Sorry", None, true)), "\n  Sorry\n");
    }

    #[test]
    fn test_new_message_gets_prefix() {
        let mut t = Transcript::new();
        t.render(&note(MessageId::new(), "one", None, true));
        assert_eq!(
            t.render(&note(MessageId::new(), "two", None, false)),
            "assistant> two"
        );
    }
}
