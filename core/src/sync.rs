/// Message synchronization loop for the active conversation
use crate::error::Result;
use crate::fingerprint::Fingerprint;
use crate::model::{ConversationId, Message, MessageId};
use serde::Serialize;
use tracing::{debug, warn};

/// Identity of one fetch, captured when the request starts. A result is
/// applied only if its token still matches the current activation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchToken {
    pub conversation: ConversationId,
    pub generation: u64,
    pub seq: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncState {
    #[default]
    Idle,
    Loading,
    Committed,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchOutcome {
    /// Displayed sequence replaced
    Committed,
    /// Same fingerprint as what is shown; nothing touched
    Unchanged,
    /// Token belongs to an abandoned conversation or a superseded poll
    Stale,
    Failed,
}

#[derive(Debug, Default)]
pub struct MessageSync {
    active: Option<ConversationId>,
    generation: u64,
    next_seq: u64,
    applied_seq: u64,
    fingerprint: Fingerprint,
    messages: Vec<Message>,
    state: SyncState,
}

impl MessageSync {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind to a conversation: clear what is shown, reset the fingerprint and
    /// return the token for the immediate fetch.
    pub fn activate(&mut self, conversation: ConversationId) -> FetchToken {
        self.generation += 1;
        self.active = Some(conversation);
        self.applied_seq = 0;
        self.next_seq = 0;
        self.fingerprint = Fingerprint::Unset;
        self.messages.clear();
        debug!("Sync activated for conversation {} (generation {})", conversation, self.generation);
        self.issue(conversation)
    }

    /// Invalidate everything in flight (component teardown).
    pub fn teardown(&mut self) {
        self.generation += 1;
        self.active = None;
        self.state = SyncState::Idle;
    }

    /// Token for a poll tick or reconciliation read, if a conversation is active.
    pub fn begin_fetch(&mut self) -> Option<FetchToken> {
        self.active.map(|c| self.issue(c))
    }

    fn issue(&mut self, conversation: ConversationId) -> FetchToken {
        self.next_seq += 1;
        self.state = SyncState::Loading;
        FetchToken {
            conversation,
            generation: self.generation,
            seq: self.next_seq,
        }
    }

    pub fn is_current(&self, token: &FetchToken) -> bool {
        self.active == Some(token.conversation)
            && token.generation == self.generation
            && token.seq > self.applied_seq
    }

    /// Apply a fetch result. `force` skips the fingerprint filter; it is used
    /// for the reconciliation read after a send, which always replaces.
    pub fn complete(&mut self, token: FetchToken, result: Result<Vec<Message>>, force: bool) -> FetchOutcome {
        if !self.is_current(&token) {
            debug!(
                "Dropping stale fetch for conversation {} (generation {}, seq {})",
                token.conversation, token.generation, token.seq
            );
            return FetchOutcome::Stale;
        }

        let mut messages = match result {
            Ok(messages) => messages,
            Err(e) => {
                warn!("Message fetch for conversation {} failed: {}", token.conversation, e);
                self.state = SyncState::Error;
                return FetchOutcome::Failed;
            }
        };

        self.applied_seq = token.seq;
        // Stable: equal timestamps keep server order
        messages.sort_by_key(|m| m.created_at);

        let fingerprint = Fingerprint::of(&messages);
        if !force && fingerprint == self.fingerprint {
            self.state = SyncState::Committed;
            return FetchOutcome::Unchanged;
        }

        self.fingerprint = fingerprint;
        self.messages = messages;
        self.state = SyncState::Committed;
        FetchOutcome::Committed
    }

    /// Append a locally created message (optimistic send).
    pub fn append_local(&mut self, message: Message) {
        self.messages.push(message);
    }

    pub fn remove_local(&mut self, id: MessageId) -> Option<Message> {
        let pos = self.messages.iter().position(|m| m.id == id)?;
        Some(self.messages.remove(pos))
    }

    pub fn active(&self) -> Option<ConversationId> {
        self.active
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn state(&self) -> SyncState {
        self.state
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ChatError;
    use crate::model::DeliveryState;
    use chrono::{TimeZone, Utc};

    fn msg(id: u64, secs: i64) -> Message {
        Message {
            id: MessageId::Server(id),
            text: format!("m{}", id),
            created_at: Utc.timestamp_opt(secs, 0).unwrap(),
            is_mine: false,
            delivery: DeliveryState::Confirmed,
        }
    }

    #[test]
    fn test_identical_polls_commit_once() {
        let mut sync = MessageSync::new();
        let t0 = sync.activate(1);
        assert_eq!(sync.complete(t0, Ok(vec![msg(1, 1), msg(2, 2)]), false), FetchOutcome::Committed);

        for _ in 0..5 {
            let t = sync.begin_fetch().unwrap();
            assert_eq!(sync.complete(t, Ok(vec![msg(1, 1), msg(2, 2)]), false), FetchOutcome::Unchanged);
        }
        assert_eq!(sync.messages().len(), 2);
        assert_eq!(sync.state(), SyncState::Committed);
    }

    #[test]
    fn test_empty_first_read_commits() {
        let mut sync = MessageSync::new();
        let t0 = sync.activate(1);
        assert_eq!(sync.complete(t0, Ok(vec![]), false), FetchOutcome::Committed);
        let t1 = sync.begin_fetch().unwrap();
        assert_eq!(sync.complete(t1, Ok(vec![]), false), FetchOutcome::Unchanged);
    }

    #[test]
    fn test_result_for_abandoned_conversation_is_dropped() {
        let mut sync = MessageSync::new();
        let stale = sync.activate(1);
        let fresh = sync.activate(2);

        assert_eq!(sync.complete(stale, Ok(vec![msg(9, 9)]), false), FetchOutcome::Stale);
        assert!(sync.messages().is_empty());
        assert_eq!(sync.complete(fresh, Ok(vec![msg(1, 1)]), false), FetchOutcome::Committed);
    }

    #[test]
    fn test_switch_back_does_not_revive_old_token() {
        let mut sync = MessageSync::new();
        let old = sync.activate(1);
        sync.activate(2);
        sync.activate(1);
        // same conversation id, older generation
        assert_eq!(sync.complete(old, Ok(vec![msg(1, 1)]), false), FetchOutcome::Stale);
    }

    #[test]
    fn test_superseded_poll_is_dropped() {
        let mut sync = MessageSync::new();
        let t0 = sync.activate(1);
        let t1 = sync.begin_fetch().unwrap();
        assert_eq!(sync.complete(t1, Ok(vec![msg(1, 1), msg(2, 2)]), false), FetchOutcome::Committed);
        // older request finishing late must not roll back
        assert_eq!(sync.complete(t0, Ok(vec![msg(1, 1)]), false), FetchOutcome::Stale);
        assert_eq!(sync.messages().len(), 2);
    }

    #[test]
    fn test_failure_keeps_last_good_sequence() {
        let mut sync = MessageSync::new();
        let t0 = sync.activate(1);
        sync.complete(t0, Ok(vec![msg(1, 1)]), false);

        let t1 = sync.begin_fetch().unwrap();
        let outcome = sync.complete(t1, Err(ChatError::Network("timeout".to_string())), false);
        assert_eq!(outcome, FetchOutcome::Failed);
        assert_eq!(sync.state(), SyncState::Error);
        assert_eq!(sync.messages().len(), 1);

        let t2 = sync.begin_fetch().unwrap();
        assert_eq!(sync.complete(t2, Ok(vec![msg(1, 1)]), false), FetchOutcome::Unchanged);
        assert_eq!(sync.state(), SyncState::Committed);
    }

    #[test]
    fn test_commits_are_ordered_by_creation_time() {
        let mut sync = MessageSync::new();
        let t0 = sync.activate(1);
        sync.complete(t0, Ok(vec![msg(3, 30), msg(1, 10), msg(2, 10)]), false);
        let order: Vec<_> = sync.messages().iter().map(|m| m.id).collect();
        assert_eq!(
            order,
            vec![MessageId::Server(1), MessageId::Server(2), MessageId::Server(3)]
        );
        assert!(sync
            .messages()
            .windows(2)
            .all(|w| w[0].created_at <= w[1].created_at));
    }

    #[test]
    fn test_forced_commit_replaces_even_when_unchanged() {
        let mut sync = MessageSync::new();
        let t0 = sync.activate(1);
        sync.complete(t0, Ok(vec![msg(1, 1)]), false);

        let mut local = msg(0, 5);
        local.id = MessageId::Temp(1);
        local.delivery = DeliveryState::Pending;
        sync.append_local(local);

        let t1 = sync.begin_fetch().unwrap();
        assert_eq!(sync.complete(t1, Ok(vec![msg(1, 1)]), true), FetchOutcome::Committed);
        assert!(sync.messages().iter().all(|m| !m.is_pending()));
    }

    #[test]
    fn test_teardown_invalidates_in_flight() {
        let mut sync = MessageSync::new();
        let t0 = sync.activate(1);
        sync.teardown();
        assert_eq!(sync.complete(t0, Ok(vec![msg(1, 1)]), false), FetchOutcome::Stale);
        assert!(sync.begin_fetch().is_none());
        assert_eq!(sync.state(), SyncState::Idle);
    }
}
