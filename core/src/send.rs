/// Optimistic send pipeline
use crate::model::{ConversationId, DeliveryState, Message, MessageId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// What happens to the optimistic message when the create request fails
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SendFailurePolicy {
    /// Remove the pending message and give its text back to the composer
    #[default]
    Expire,
    /// Leave the pending message on screen until a read returns a different
    /// tail. Polls matching the stored fingerprint are skipped and keep it.
    Keep,
}

/// A create request in flight, bound to the conversation it was sent from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingMessage {
    pub conversation: ConversationId,
    pub temp_id: MessageId,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureAction {
    /// Drop the pending message; restore `text` into an empty composer
    Expire { temp_id: MessageId, text: String },
    Keep,
}

#[derive(Debug)]
pub struct SendPipeline {
    next_temp: u64,
    policy: SendFailurePolicy,
}

impl SendPipeline {
    pub fn new(policy: SendFailurePolicy) -> Self {
        Self { next_temp: 0, policy }
    }

    /// Step 1 of a send: trim the draft, build the pending message and the
    /// outgoing request. Returns `None` (and leaves the draft alone) when the
    /// text is blank or no conversation is active. The draft is cleared on
    /// success.
    pub fn compose(
        &mut self,
        active: Option<ConversationId>,
        draft: &mut String,
        tail_created_at: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Option<(Message, OutgoingMessage)> {
        let conversation = active?;
        let text = draft.trim();
        if text.is_empty() {
            return None;
        }
        let text = text.to_string();
        draft.clear();

        self.next_temp += 1;
        let temp_id = MessageId::Temp(self.next_temp);
        // Keep the sequence ordered even if the local clock lags the server
        let created_at = tail_created_at.map_or(now, |tail| tail.max(now));

        let pending = Message {
            id: temp_id,
            text: text.clone(),
            created_at,
            is_mine: true,
            delivery: DeliveryState::Pending,
        };
        let outgoing = OutgoingMessage {
            conversation,
            temp_id,
            text,
        };
        Some((pending, outgoing))
    }

    pub fn on_failure(&self, outgoing: &OutgoingMessage) -> FailureAction {
        match self.policy {
            SendFailurePolicy::Expire => FailureAction::Expire {
                temp_id: outgoing.temp_id,
                text: outgoing.text.clone(),
            },
            SendFailurePolicy::Keep => FailureAction::Keep,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    #[test]
    fn test_compose_trims_and_clears_draft() {
        let mut pipeline = SendPipeline::new(SendFailurePolicy::Expire);
        let mut draft = "  hello  ".to_string();
        let (pending, outgoing) = pipeline.compose(Some(1), &mut draft, None, at(100)).unwrap();

        assert!(draft.is_empty());
        assert_eq!(pending.text, "hello");
        assert!(pending.is_mine);
        assert!(pending.is_pending());
        assert_eq!(pending.created_at, at(100));
        assert_eq!(outgoing.conversation, 1);
        assert_eq!(outgoing.temp_id, pending.id);
    }

    #[test]
    fn test_blank_or_inactive_is_noop() {
        let mut pipeline = SendPipeline::new(SendFailurePolicy::Expire);
        let mut draft = "   ".to_string();
        assert!(pipeline.compose(Some(1), &mut draft, None, at(0)).is_none());
        assert_eq!(draft, "   ");

        let mut draft = "hi".to_string();
        assert!(pipeline.compose(None, &mut draft, None, at(0)).is_none());
        assert_eq!(draft, "hi");
    }

    #[test]
    fn test_temp_ids_are_unique() {
        let mut pipeline = SendPipeline::new(SendFailurePolicy::Expire);
        let mut ids = Vec::new();
        for _ in 0..3 {
            let mut draft = "x".to_string();
            let (pending, _) = pipeline.compose(Some(1), &mut draft, None, at(0)).unwrap();
            ids.push(pending.id);
        }
        assert_eq!(ids, vec![MessageId::Temp(1), MessageId::Temp(2), MessageId::Temp(3)]);
    }

    #[test]
    fn test_pending_never_sorts_before_tail() {
        let mut pipeline = SendPipeline::new(SendFailurePolicy::Expire);
        let mut draft = "late clock".to_string();
        let (pending, _) = pipeline
            .compose(Some(1), &mut draft, Some(at(500)), at(100))
            .unwrap();
        assert_eq!(pending.created_at, at(500));
    }

    #[test]
    fn test_failure_policy() {
        let outgoing = OutgoingMessage {
            conversation: 1,
            temp_id: MessageId::Temp(4),
            text: "hi".to_string(),
        };
        let expire = SendPipeline::new(SendFailurePolicy::Expire);
        assert_eq!(
            expire.on_failure(&outgoing),
            FailureAction::Expire {
                temp_id: MessageId::Temp(4),
                text: "hi".to_string()
            }
        );
        let keep = SendPipeline::new(SendFailurePolicy::Keep);
        assert_eq!(keep.on_failure(&outgoing), FailureAction::Keep);
    }
}
