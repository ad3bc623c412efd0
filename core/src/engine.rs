/// Async driver: runs a [`ChatSession`] against a [`ChatBackend`] on one task
use crate::backend::ChatBackend;
use crate::config::Config;
use crate::error::{ChatError, Result};
use crate::events::EngineEvent;
use crate::model::{Conversation, ConversationId, Message};
use crate::scheduler::{PollScheduler, Visibility};
use crate::scroll::{CommitCause, Viewport};
use crate::send::OutgoingMessage;
use crate::session::{ChatSession, Effect};
use crate::sync::FetchToken;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, watch};
use tracing::{debug, info, warn};

/// Commands accepted from front-ends
#[derive(Debug, Clone)]
pub enum EngineCommand {
    Select(ConversationId),
    OpenWith(u64),
    SetDraft(String),
    Send,
    Viewport(Viewport),
    ReloadDirectory,
    Shutdown,
}

/// Backend call finished on a spawned task
enum Completion {
    Directory(Result<Vec<Conversation>>),
    Messages {
        token: FetchToken,
        cause: CommitCause,
        result: Result<Vec<Message>>,
    },
    Sent {
        outgoing: OutgoingMessage,
        result: Result<Message>,
    },
    Opened(Result<ConversationId>),
}

/// Cloneable handle to a running engine
#[derive(Clone)]
pub struct EngineHandle {
    commands: mpsc::UnboundedSender<EngineCommand>,
    events: broadcast::Sender<EngineEvent>,
}

impl EngineHandle {
    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.events.subscribe()
    }

    pub fn command(&self, command: EngineCommand) -> Result<()> {
        self.commands
            .send(command)
            .map_err(|_| ChatError::EngineStopped)
    }

    pub fn select(&self, conversation: ConversationId) -> Result<()> {
        self.command(EngineCommand::Select(conversation))
    }

    pub fn open_with(&self, counterpart: u64) -> Result<()> {
        self.command(EngineCommand::OpenWith(counterpart))
    }

    pub fn set_draft(&self, text: impl Into<String>) -> Result<()> {
        self.command(EngineCommand::SetDraft(text.into()))
    }

    pub fn send(&self) -> Result<()> {
        self.command(EngineCommand::Send)
    }

    pub fn viewport(&self, viewport: Viewport) -> Result<()> {
        self.command(EngineCommand::Viewport(viewport))
    }

    pub fn reload_directory(&self) -> Result<()> {
        self.command(EngineCommand::ReloadDirectory)
    }

    pub fn shutdown(&self) -> Result<()> {
        self.command(EngineCommand::Shutdown)
    }
}

pub struct ChatEngine {
    session: ChatSession,
    backend: Arc<dyn ChatBackend>,
    scheduler: PollScheduler,
    visibility: watch::Receiver<Visibility>,
    commands: mpsc::UnboundedReceiver<EngineCommand>,
    done_tx: mpsc::UnboundedSender<Completion>,
    done_rx: mpsc::UnboundedReceiver<Completion>,
}

impl ChatEngine {
    pub fn new(
        config: &Config,
        backend: Arc<dyn ChatBackend>,
        visibility: watch::Receiver<Visibility>,
    ) -> (Self, EngineHandle) {
        let session = ChatSession::new(config);
        let (command_tx, commands) = mpsc::unbounded_channel();
        let (done_tx, done_rx) = mpsc::unbounded_channel();
        let handle = EngineHandle {
            commands: command_tx,
            events: session.event_sender(),
        };

        let engine = Self {
            session,
            backend,
            scheduler: PollScheduler::new(config.poll_interval),
            visibility,
            commands,
            done_tx,
            done_rx,
        };
        (engine, handle)
    }

    /// Run until `Shutdown` or every handle is dropped. Results that arrive
    /// after that are discarded with the task.
    pub async fn run(mut self) -> Result<()> {
        info!("Chat engine started");
        let effects = self.session.start();
        self.execute(effects);

        // A dropped visibility sender freezes the last reported value
        let mut visibility_open = true;

        loop {
            tokio::select! {
                command = self.commands.recv() => {
                    let command = match command {
                        Some(EngineCommand::Shutdown) | None => break,
                        Some(command) => command,
                    };
                    let effects = self.handle_command(command);
                    self.execute(effects);
                }
                Some(done) = self.done_rx.recv() => {
                    let effects = self.handle_completion(done);
                    self.execute(effects);
                }
                changed = self.visibility.changed(), if visibility_open => {
                    if changed.is_err() {
                        debug!("Visibility source closed");
                        visibility_open = false;
                        continue;
                    }
                    let visibility = *self.visibility.borrow_and_update();
                    debug!("View is now {:?}", visibility);
                    if self.scheduler.on_visibility(visibility).is_some() {
                        let effects = self.session.poll_tick();
                        self.execute(effects);
                    }
                }
                conversation = self.scheduler.next_tick() => {
                    debug!("Poll tick for conversation {}", conversation);
                    let effects = self.session.poll_tick();
                    self.execute(effects);
                }
            }
        }

        self.scheduler.stop();
        self.session.shutdown();
        info!("Chat engine stopped");
        Ok(())
    }

    fn handle_command(&mut self, command: EngineCommand) -> Vec<Effect> {
        match command {
            EngineCommand::Select(conversation) => self.session.select(conversation),
            EngineCommand::OpenWith(counterpart) => self.session.open_with(counterpart),
            EngineCommand::SetDraft(text) => {
                self.session.set_draft(text);
                Vec::new()
            }
            EngineCommand::Send => self.session.send(),
            EngineCommand::Viewport(viewport) => {
                self.session.observe_viewport(viewport);
                Vec::new()
            }
            EngineCommand::ReloadDirectory => self.session.reload_directory(),
            EngineCommand::Shutdown => Vec::new(),
        }
    }

    fn handle_completion(&mut self, done: Completion) -> Vec<Effect> {
        match done {
            Completion::Directory(result) => self.session.on_directory_loaded(result),
            Completion::Messages {
                token,
                cause,
                result,
            } => self.session.on_messages(token, cause, result),
            Completion::Sent { outgoing, result } => self.session.on_send_result(outgoing, result),
            Completion::Opened(result) => self.session.on_opened(result),
        }
    }

    fn execute(&mut self, effects: Vec<Effect>) {
        for effect in effects {
            match effect {
                Effect::LoadDirectory => self.spawn_call(|backend| async move {
                    Completion::Directory(backend.list_conversations().await)
                }),
                Effect::FetchMessages { token, cause } => self.spawn_call(move |backend| async move {
                    let result = backend.list_messages(token.conversation).await;
                    Completion::Messages {
                        token,
                        cause,
                        result,
                    }
                }),
                Effect::CreateMessage(outgoing) => self.spawn_call(move |backend| async move {
                    let result = backend
                        .create_message(outgoing.conversation, &outgoing.text)
                        .await;
                    Completion::Sent { outgoing, result }
                }),
                Effect::OpenWith(counterpart) => self.spawn_call(move |backend| async move {
                    Completion::Opened(backend.open_conversation_with(counterpart).await)
                }),
                Effect::MarkRead(conversation) => {
                    let backend = self.backend.clone();
                    tokio::spawn(async move {
                        if let Err(e) = backend.mark_read(conversation).await {
                            warn!("Failed to mark conversation {} read: {}", conversation, e);
                        }
                    });
                }
                Effect::StartPolling(conversation) => {
                    let visibility = *self.visibility.borrow();
                    // Activation already issued its own fetch
                    self.scheduler.start(conversation, visibility);
                }
            }
        }
    }

    fn spawn_call<F, Fut>(&self, call: F)
    where
        F: FnOnce(Arc<dyn ChatBackend>) -> Fut,
        Fut: Future<Output = Completion> + Send + 'static,
    {
        let done_tx = self.done_tx.clone();
        let fut = call(self.backend.clone());
        tokio::spawn(async move {
            // Receiver gone means the engine stopped
            let _ = done_tx.send(fut.await);
        });
    }
}
