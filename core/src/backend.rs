/// Collaborator REST surface consumed by the engine
use crate::error::Result;
use crate::model::{Conversation, ConversationId, Message};
use async_trait::async_trait;

/// Backend operations. All calls carry the session credential; none of them
/// is retried by the implementation.
#[async_trait]
pub trait ChatBackend: Send + Sync {
    /// `GET /conversations/`, in server order
    async fn list_conversations(&self) -> Result<Vec<Conversation>>;

    /// `GET /conversations/{id}/messages/`, ascending by creation time
    async fn list_messages(&self, conversation: ConversationId) -> Result<Vec<Message>>;

    /// `POST /conversations/{id}/messages/`
    async fn create_message(&self, conversation: ConversationId, text: &str) -> Result<Message>;

    /// `POST /conversations/with/{profile_id}/`: find or create, returns the id
    async fn open_conversation_with(&self, counterpart: u64) -> Result<ConversationId>;

    /// `POST /conversations/{id}/read/`
    async fn mark_read(&self, conversation: ConversationId) -> Result<()>;
}
