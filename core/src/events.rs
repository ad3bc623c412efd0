/// Engine output events, streamed to whatever renders the conversation view
use crate::model::{Conversation, ConversationId, Message};
use crate::scroll::CommitCause;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EngineEvent {
    /// Fresh conversation list from the server
    DirectoryUpdated { conversations: Vec<Conversation> },
    /// Active conversation changed
    SelectionChanged { conversation_id: ConversationId },
    /// Displayed message sequence replaced
    MessagesCommitted {
        conversation_id: ConversationId,
        messages: Vec<Message>,
        cause: CommitCause,
    },
    /// Jump the message list to the newest message
    ScrollToBottom { conversation_id: ConversationId },
    /// Compose field content changed by the engine (prefill, clear, restore)
    DraftChanged { text: String },
    /// User-visible error flag raised
    Error { message: String },
    /// Error flag cleared by a later successful operation
    ErrorCleared,
}
