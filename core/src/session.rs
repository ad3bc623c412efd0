/// Sans-IO conversation session
///
/// Every input (user action, poll tick, backend completion) is a method that
/// mutates local state synchronously and returns the I/O the caller has to
/// perform next. State changes are published as [`EngineEvent`]s.
use crate::config::Config;
use crate::directory::ConversationDirectory;
use crate::error::{ChatError, Result};
use crate::events::EngineEvent;
use crate::model::{Conversation, ConversationId, Message};
use crate::prefill::DraftPrefill;
use crate::scroll::{CommitCause, ScrollAction, ScrollAnchor, Viewport};
use crate::send::{FailureAction, OutgoingMessage, SendPipeline};
use crate::sync::{FetchOutcome, FetchToken, MessageSync, SyncState};
use chrono::Utc;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

const EVENT_CAPACITY: usize = 256;

/// I/O requested by the session
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    LoadDirectory,
    FetchMessages { token: FetchToken, cause: CommitCause },
    CreateMessage(OutgoingMessage),
    MarkRead(ConversationId),
    OpenWith(u64),
    /// (Re)start the poll schedule bound to this conversation
    StartPolling(ConversationId),
}

pub struct ChatSession {
    directory: ConversationDirectory,
    sync: MessageSync,
    scroll: ScrollAnchor,
    prefill: DraftPrefill,
    sender: SendPipeline,
    draft: String,
    error: Option<String>,
    mark_read_on_open: bool,
    events: broadcast::Sender<EngineEvent>,
}

impl ChatSession {
    pub fn new(config: &Config) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            directory: ConversationDirectory::new(config.open_conversation),
            sync: MessageSync::new(),
            scroll: ScrollAnchor::new(config.near_bottom_px),
            prefill: DraftPrefill::new(config.role),
            sender: SendPipeline::new(config.send_failure_policy),
            draft: String::new(),
            error: None,
            mark_read_on_open: config.mark_read_on_open,
            events,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.events.subscribe()
    }

    pub fn event_sender(&self) -> broadcast::Sender<EngineEvent> {
        self.events.clone()
    }

    pub fn start(&mut self) -> Vec<Effect> {
        vec![Effect::LoadDirectory]
    }

    pub fn reload_directory(&self) -> Vec<Effect> {
        vec![Effect::LoadDirectory]
    }

    pub fn on_directory_loaded(&mut self, result: Result<Vec<Conversation>>) -> Vec<Effect> {
        match self.directory.apply_load(result).map(|list| list.to_vec()) {
            Ok(conversations) => {
                self.clear_error();
                self.emit(EngineEvent::DirectoryUpdated { conversations });
            }
            Err(e) => {
                self.raise_error(&e);
                return Vec::new();
            }
        }

        let current = self.sync.active();
        match self.directory.resolve_selection(current) {
            Some(id) if Some(id) != current => self.activate(id),
            _ => {
                // Opened before its row was listed: the name may be known now
                if let Some(active) = current {
                    self.prefill_draft(active);
                }
                Vec::new()
            }
        }
    }

    /// User click on a conversation. Clicking the active one does nothing.
    pub fn select(&mut self, conversation: ConversationId) -> Vec<Effect> {
        if self.sync.active() == Some(conversation) {
            return Vec::new();
        }
        self.activate(conversation)
    }

    fn activate(&mut self, conversation: ConversationId) -> Vec<Effect> {
        info!("Opening conversation {}", conversation);
        self.scroll.reset();
        let token = self.sync.activate(conversation);
        self.emit(EngineEvent::SelectionChanged {
            conversation_id: conversation,
        });

        self.prefill_draft(conversation);

        let mut effects = vec![
            Effect::FetchMessages {
                token,
                cause: CommitCause::Poll,
            },
            Effect::StartPolling(conversation),
        ];
        if self.mark_read_on_open {
            effects.push(Effect::MarkRead(conversation));
        }
        effects
    }

    fn prefill_draft(&mut self, conversation: ConversationId) {
        let name = self
            .directory
            .get(conversation)
            .map(|c| c.counterpart.display_name.clone());
        if self.prefill.on_activate(conversation, name.as_deref(), &mut self.draft) {
            debug!("Prefilled draft for conversation {}", conversation);
            self.emit(EngineEvent::DraftChanged {
                text: self.draft.clone(),
            });
        }
    }

    pub fn poll_tick(&mut self) -> Vec<Effect> {
        match self.sync.begin_fetch() {
            Some(token) => vec![Effect::FetchMessages {
                token,
                cause: CommitCause::Poll,
            }],
            None => Vec::new(),
        }
    }

    pub fn on_messages(
        &mut self,
        token: FetchToken,
        cause: CommitCause,
        result: Result<Vec<Message>>,
    ) -> Vec<Effect> {
        let failure = result.as_ref().err().map(ChatError::user_message);
        let force = cause == CommitCause::Reconcile;

        match self.sync.complete(token, result, force) {
            FetchOutcome::Committed => {
                self.clear_error();
                self.commit(token.conversation, cause);
            }
            FetchOutcome::Unchanged => self.clear_error(),
            FetchOutcome::Failed => self.raise(failure.unwrap_or_default()),
            FetchOutcome::Stale => {}
        }
        Vec::new()
    }

    /// Compose field edits coming from the UI.
    pub fn set_draft(&mut self, text: String) {
        self.draft = text;
    }

    pub fn observe_viewport(&mut self, viewport: Viewport) {
        self.scroll.observe(viewport);
    }

    pub fn send(&mut self) -> Vec<Effect> {
        let tail = self.sync.messages().last().map(|m| m.created_at);
        let Some((pending, outgoing)) =
            self.sender
                .compose(self.sync.active(), &mut self.draft, tail, Utc::now())
        else {
            return Vec::new();
        };

        debug!(
            "Sending {} to conversation {}",
            outgoing.temp_id, outgoing.conversation
        );
        self.sync.append_local(pending);
        self.emit(EngineEvent::DraftChanged {
            text: String::new(),
        });
        self.commit(outgoing.conversation, CommitCause::Send);
        vec![Effect::CreateMessage(outgoing)]
    }

    pub fn on_send_result(&mut self, outgoing: OutgoingMessage, result: Result<Message>) -> Vec<Effect> {
        let still_active = self.sync.active() == Some(outgoing.conversation);

        match result {
            Ok(created) => {
                info!(
                    "Message {} confirmed in conversation {}",
                    created.id, outgoing.conversation
                );
                let mut effects = Vec::new();
                if still_active {
                    if let Some(token) = self.sync.begin_fetch() {
                        effects.push(Effect::FetchMessages {
                            token,
                            cause: CommitCause::Reconcile,
                        });
                    }
                }
                effects.push(Effect::LoadDirectory);
                effects
            }
            Err(e) => {
                warn!(
                    "Send to conversation {} failed: {}",
                    outgoing.conversation, e
                );
                self.raise_error(&e);

                if let FailureAction::Expire { temp_id, text } = self.sender.on_failure(&outgoing) {
                    if still_active {
                        if self.sync.remove_local(temp_id).is_some() {
                            self.commit(outgoing.conversation, CommitCause::Rollback);
                        }
                        if self.draft.trim().is_empty() {
                            self.draft = text;
                            self.emit(EngineEvent::DraftChanged {
                                text: self.draft.clone(),
                            });
                        }
                    }
                }
                Vec::new()
            }
        }
    }

    /// "Message this user" from elsewhere in the app.
    pub fn open_with(&mut self, counterpart: u64) -> Vec<Effect> {
        vec![Effect::OpenWith(counterpart)]
    }

    pub fn on_opened(&mut self, result: Result<ConversationId>) -> Vec<Effect> {
        match result {
            Ok(id) => {
                if self.directory.set_hint(id) {
                    // The hint is picked up by the reload
                    vec![Effect::LoadDirectory]
                } else {
                    let mut effects = self.select(id);
                    effects.push(Effect::LoadDirectory);
                    effects
                }
            }
            Err(e) => {
                self.raise_error(&e);
                Vec::new()
            }
        }
    }

    pub fn shutdown(&mut self) {
        self.sync.teardown();
    }

    pub fn active(&self) -> Option<ConversationId> {
        self.sync.active()
    }

    pub fn messages(&self) -> &[Message] {
        self.sync.messages()
    }

    pub fn conversations(&self) -> &[Conversation] {
        self.directory.conversations()
    }

    pub fn search(&self, query: &str) -> Vec<&Conversation> {
        self.directory.search(query)
    }

    pub fn draft(&self) -> &str {
        &self.draft
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn sync_state(&self) -> SyncState {
        self.sync.state()
    }

    pub fn is_near_bottom(&self) -> bool {
        self.scroll.is_near_bottom()
    }

    fn commit(&mut self, conversation: ConversationId, cause: CommitCause) {
        self.emit(EngineEvent::MessagesCommitted {
            conversation_id: conversation,
            messages: self.sync.messages().to_vec(),
            cause,
        });
        if self.scroll.after_commit(cause) == ScrollAction::ToBottom {
            self.emit(EngineEvent::ScrollToBottom {
                conversation_id: conversation,
            });
        }
    }

    fn raise_error(&mut self, e: &ChatError) {
        self.raise(e.user_message());
    }

    fn raise(&mut self, message: String) {
        self.error = Some(message.clone());
        self.emit(EngineEvent::Error { message });
    }

    fn clear_error(&mut self) {
        if self.error.take().is_some() {
            self.emit(EngineEvent::ErrorCleared);
        }
    }

    fn emit(&self, event: EngineEvent) {
        // No subscribers is fine (headless use)
        let _ = self.events.send(event);
    }
}
