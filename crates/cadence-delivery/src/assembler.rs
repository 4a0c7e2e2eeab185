//! Accumulation of one in-flight reply into UI snapshots.
//!
//! The assembler applies [`DeliveryEvent`]s in arrival order and turns them
//! into [`Notification`]s carrying the full content so far. The model name is
//! withheld until the delivery finishes, and nothing is emitted once the
//! session has been retired.

use cadence_core::config::DeliveryConfig;
use cadence_core::events::DeliveryEvent;
use cadence_core::types::MessageId;
use serde::Serialize;

/// Snapshot pushed to the message store and UI after each visible change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notification {
    pub message_id: MessageId,
    /// Full content so far. Empty means "still pending".
    pub content: String,
    /// Present only on the terminal notification of a successful delivery.
    pub model_name: Option<String>,
    /// Last notification for this message.
    pub terminal: bool,
}

/// How a retired session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssemblyOutcome {
    /// `Done` after at least some content.
    Completed,
    /// `Done` with nothing to show; the fallback text was substituted.
    Empty,
    /// An `Error` event replaced the content with the apology text.
    Failed,
}

/// Mutable accumulation state for exactly one delivery.
#[derive(Debug, Clone)]
pub struct DeliverySession {
    target: MessageId,
    accumulated: String,
    announced_model: Option<String>,
    chunks: usize,
    terminal: bool,
}

impl DeliverySession {
    pub fn new(target: MessageId) -> Self {
        Self {
            target,
            accumulated: String::new(),
            announced_model: None,
            chunks: 0,
            terminal: false,
        }
    }

    pub fn target(&self) -> MessageId {
        self.target
    }

    /// Raw accumulated text, untrimmed.
    pub fn accumulated_text(&self) -> &str {
        &self.accumulated
    }

    pub fn announced_model(&self) -> Option<&str> {
        self.announced_model.as_deref()
    }

    /// Number of content chunks applied.
    pub fn chunk_count(&self) -> usize {
        self.chunks
    }

    pub fn is_terminal(&self) -> bool {
        self.terminal
    }

    fn snapshot(&self) -> &str {
        self.accumulated.trim_end()
    }
}

/// Applies delivery events to a [`DeliverySession`].
#[derive(Debug, Clone)]
pub struct ResponseAssembler {
    session: DeliverySession,
    apology_text: String,
    empty_result_text: String,
    outcome: Option<AssemblyOutcome>,
}

impl ResponseAssembler {
    /// Start assembling the reply for `target`, using the fixed user-facing
    /// texts from `config`.
    pub fn new(target: MessageId, config: &DeliveryConfig) -> Self {
        Self {
            session: DeliverySession::new(target),
            apology_text: config.apology_text.clone(),
            empty_result_text: config.empty_result_text.clone(),
            outcome: None,
        }
    }

    pub fn session(&self) -> &DeliverySession {
        &self.session
    }

    /// Whether a terminal event has been applied.
    pub fn is_retired(&self) -> bool {
        self.session.terminal
    }

    pub fn outcome(&self) -> Option<AssemblyOutcome> {
        self.outcome
    }

    /// Apply one event, returning the notification it produces, if any.
    ///
    /// Events arriving after retirement are ignored.
    pub fn apply(&mut self, event: DeliveryEvent) -> Option<Notification> {
        if self.session.terminal {
            tracing::debug!(
                message_id = %self.session.target,
                kind = event.kind(),
                "Ignoring event for retired session"
            );
            return None;
        }

        match event {
            DeliveryEvent::ContentChunk(text) => {
                self.session.accumulated.push_str(&text);
                self.session.chunks += 1;
                Some(self.notification(self.session.snapshot().to_string(), None, false))
            }
            DeliveryEvent::ModelAnnounced(name) => {
                self.session.announced_model = Some(name);
                None
            }
            DeliveryEvent::Done => {
                self.session.terminal = true;
                let snapshot = self.session.snapshot();
                let (content, outcome) = if snapshot.is_empty() {
                    (self.empty_result_text.clone(), AssemblyOutcome::Empty)
                } else {
                    (snapshot.to_string(), AssemblyOutcome::Completed)
                };
                self.outcome = Some(outcome);
                let model = self.session.announced_model.clone();
                Some(self.notification(content, model, true))
            }
            DeliveryEvent::Error(reason) => {
                self.session.terminal = true;
                self.outcome = Some(AssemblyOutcome::Failed);
                tracing::debug!(
                    message_id = %self.session.target,
                    reason = %reason,
                    discarded_chars = self.session.accumulated.len(),
                    "Replacing partial reply with apology"
                );
                Some(self.notification(self.apology_text.clone(), None, true))
            }
        }
    }

    fn notification(
        &self,
        content: String,
        model_name: Option<String>,
        terminal: bool,
    ) -> Notification {
        Notification {
            message_id: self.session.target,
            content,
            model_name,
            terminal,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assembler() -> ResponseAssembler {
        ResponseAssembler::new(MessageId::new(), &DeliveryConfig::default())
    }

    fn chunk(s: &str) -> DeliveryEvent {
        DeliveryEvent::ContentChunk(s.to_string())
    }

    // ---- Content accumulation ----

    #[test]
    fn test_chunks_accumulate_in_order() {
        let mut a = assembler();
        let n1 = a.apply(chunk("Hel")).unwrap();
        let n2 = a.apply(chunk("lo")).unwrap();
        assert_eq!(n1.content, "Hel");
        assert_eq!(n2.content, "Hello");
        assert!(!n2.terminal);
        assert_eq!(a.session().chunk_count(), 2);
    }

    #[test]
    fn test_snapshot_trims_trailing_whitespace_only() {
        let mut a = assembler();
        let n = a.apply(chunk("  a b ")).unwrap();
        assert_eq!(n.content, "  a b");
        // Internal text keeps the whitespace so the next chunk joins cleanly
        assert_eq!(a.session().accumulated_text(), "  a b ");
        let n = a.apply(chunk("c d ")).unwrap();
        assert_eq!(n.content, "  a b c d");
    }

    #[test]
    fn test_notifications_target_session_message() {
        let id = MessageId::new();
        let mut a = ResponseAssembler::new(id, &DeliveryConfig::default());
        assert_eq!(a.apply(chunk("x")).unwrap().message_id, id);
        assert_eq!(a.apply(DeliveryEvent::Done).unwrap().message_id, id);
    }

    // ---- Model withholding ----

    #[test]
    fn test_model_withheld_until_done() {
        let mut a = assembler();
        assert!(a.apply(DeliveryEvent::ModelAnnounced("m".into())).is_none());
        let n = a.apply(chunk("text")).unwrap();
        assert!(n.model_name.is_none());
        let done = a.apply(DeliveryEvent::Done).unwrap();
        assert_eq!(done.model_name.as_deref(), Some("m"));
        assert!(done.terminal);
        assert_eq!(done.content, "text");
    }

    #[test]
    fn test_done_without_model_leaves_model_absent() {
        let mut a = assembler();
        a.apply(chunk("Hi"));
        let done = a.apply(DeliveryEvent::Done).unwrap();
        assert_eq!(done.content, "Hi");
        assert!(done.model_name.is_none());
        assert_eq!(a.outcome(), Some(AssemblyOutcome::Completed));
    }

    #[test]
    fn test_latest_model_announcement_wins() {
        let mut a = assembler();
        a.apply(DeliveryEvent::ModelAnnounced("first".into()));
        a.apply(chunk("x"));
        a.apply(DeliveryEvent::ModelAnnounced("second".into()));
        let done = a.apply(DeliveryEvent::Done).unwrap();
        assert_eq!(done.model_name.as_deref(), Some("second"));
    }

    // ---- Errors ----

    #[test]
    fn test_error_replaces_partial_content_with_apology() {
        let mut a = assembler();
        a.apply(chunk("partial answer"));
        a.apply(DeliveryEvent::ModelAnnounced("m".into()));
        let n = a.apply(DeliveryEvent::Error("upstream 500".into())).unwrap();
        assert_eq!(n.content, DeliveryConfig::default().apology_text);
        assert!(n.model_name.is_none());
        assert!(n.terminal);
        assert_eq!(a.outcome(), Some(AssemblyOutcome::Failed));
    }

    #[test]
    fn test_custom_texts_are_used() {
        let config = DeliveryConfig {
            apology_text: "custom apology".into(),
            empty_result_text: "custom empty".into(),
            ..DeliveryConfig::default()
        };
        let mut a = ResponseAssembler::new(MessageId::new(), &config);
        assert_eq!(
            a.apply(DeliveryEvent::Error("x".into())).unwrap().content,
            "custom apology"
        );
        let mut b = ResponseAssembler::new(MessageId::new(), &config);
        assert_eq!(b.apply(DeliveryEvent::Done).unwrap().content, "custom empty");
    }

    // ---- Empty result ----

    #[test]
    fn test_done_without_content_uses_fallback() {
        let mut a = assembler();
        let n = a.apply(DeliveryEvent::Done).unwrap();
        assert_eq!(n.content, DeliveryConfig::default().empty_result_text);
        assert!(n.terminal);
        assert_eq!(a.outcome(), Some(AssemblyOutcome::Empty));
    }

    #[test]
    fn test_whitespace_only_content_counts_as_empty() {
        let mut a = assembler();
        a.apply(chunk("   "));
        let n = a.apply(DeliveryEvent::Done).unwrap();
        assert_eq!(n.content, DeliveryConfig::default().empty_result_text);
    }

    // ---- Retirement ----

    #[test]
    fn test_late_events_after_done_are_ignored() {
        let mut a = assembler();
        a.apply(chunk("final"));
        a.apply(DeliveryEvent::Done);
        assert!(a.is_retired());
        assert!(a.apply(chunk("late")).is_none());
        assert!(a.apply(DeliveryEvent::Error("late".into())).is_none());
        assert!(a.apply(DeliveryEvent::Done).is_none());
        assert_eq!(a.session().accumulated_text(), "final");
        assert_eq!(a.outcome(), Some(AssemblyOutcome::Completed));
    }

    #[test]
    fn test_late_events_after_error_are_ignored() {
        let mut a = assembler();
        a.apply(DeliveryEvent::Error("boom".into()));
        assert!(a.apply(chunk("more")).is_none());
        assert!(a.apply(DeliveryEvent::ModelAnnounced("m".into())).is_none());
        assert!(a.session().announced_model().is_none());
    }

    #[test]
    fn test_exactly_one_terminal_notification() {
        let mut a = assembler();
        let events = vec![
            chunk("a "),
            chunk("b "),
            DeliveryEvent::ModelAnnounced("m".into()),
            DeliveryEvent::Done,
            DeliveryEvent::Done,
        ];
        let terminal = events
            .into_iter()
            .filter_map(|e| a.apply(e))
            .filter(|n| n.terminal)
            .count();
        assert_eq!(terminal, 1);
    }
}
