/// Conversation directory: server-ordered list plus selection policy
use crate::backend::ChatBackend;
use crate::error::Result;
use crate::model::{Conversation, ConversationId};
use tracing::{debug, warn};

#[derive(Debug, Default)]
pub struct ConversationDirectory {
    conversations: Vec<Conversation>,
    /// One-shot "open this conversation" request from elsewhere in the app
    pending_hint: Option<ConversationId>,
    hint_consumed: bool,
}

impl ConversationDirectory {
    pub fn new(hint: Option<ConversationId>) -> Self {
        Self {
            pending_hint: hint,
            ..Default::default()
        }
    }

    /// Replace the list with a fresh server read. On failure the previous
    /// list stays as it was and the error goes back to the caller.
    pub fn apply_load(&mut self, result: Result<Vec<Conversation>>) -> Result<&[Conversation]> {
        match result {
            Ok(list) => {
                debug!("Directory loaded: {} conversations", list.len());
                self.conversations = list;
                Ok(&self.conversations)
            }
            Err(e) => {
                warn!("Directory load failed: {}", e);
                Err(e)
            }
        }
    }

    /// Set the external hint. Ignored once a hint has been consumed by this
    /// engine instance.
    pub fn set_hint(&mut self, conversation: ConversationId) -> bool {
        if self.hint_consumed {
            return false;
        }
        self.pending_hint = Some(conversation);
        true
    }

    /// Pick the active conversation after a load. The hint wins once; the
    /// first entry is used only when nothing is selected yet.
    pub fn resolve_selection(&mut self, current: Option<ConversationId>) -> Option<ConversationId> {
        if let Some(hint) = self.pending_hint.take() {
            self.hint_consumed = true;
            return Some(hint);
        }
        current.or_else(|| self.conversations.first().map(|c| c.id))
    }

    pub fn conversations(&self) -> &[Conversation] {
        &self.conversations
    }

    pub fn get(&self, id: ConversationId) -> Option<&Conversation> {
        self.conversations.iter().find(|c| c.id == id)
    }

    pub fn search(&self, query: &str) -> Vec<&Conversation> {
        search_by_name(&self.conversations, query)
    }

    /// Fetch and apply a fresh list in one step.
    pub async fn load(&mut self, backend: &dyn ChatBackend) -> Result<&[Conversation]> {
        let result = backend.list_conversations().await;
        self.apply_load(result)
    }
}

/// Case-insensitive match on the counterpart's display name; an empty query
/// matches everything.
pub fn search_by_name<'a>(conversations: &'a [Conversation], query: &str) -> Vec<&'a Conversation> {
    let needle = query.trim().to_lowercase();
    conversations
        .iter()
        .filter(|c| needle.is_empty() || c.counterpart.display_name.to_lowercase().contains(&needle))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ChatError;
    use crate::model::Counterpart;

    fn conv(id: ConversationId, name: &str) -> Conversation {
        Conversation {
            id,
            counterpart: Counterpart {
                identity: Some(id * 10),
                display_name: name.to_string(),
                avatar_ref: None,
            },
            last_message_preview: String::new(),
            last_message_at: None,
            unread_count: 0,
        }
    }

    #[test]
    fn test_first_entry_selected_by_default() {
        let mut dir = ConversationDirectory::new(None);
        dir.apply_load(Ok(vec![conv(1, "A"), conv(2, "B")])).unwrap();
        assert_eq!(dir.resolve_selection(None), Some(1));
    }

    #[test]
    fn test_hint_wins_once() {
        let mut dir = ConversationDirectory::new(Some(2));
        dir.apply_load(Ok(vec![conv(1, "A"), conv(2, "B")])).unwrap();
        assert_eq!(dir.resolve_selection(None), Some(2));

        // user clicked into 1, refresh must not clobber it
        assert_eq!(dir.resolve_selection(Some(1)), Some(1));
        assert!(!dir.set_hint(2));
    }

    #[test]
    fn test_failed_load_keeps_previous_list() {
        let mut dir = ConversationDirectory::new(None);
        dir.apply_load(Ok(vec![conv(1, "A")])).unwrap();
        let err = dir
            .apply_load(Err(ChatError::Network("down".to_string())))
            .unwrap_err();
        assert!(matches!(err, ChatError::Network(_)));
        assert_eq!(dir.conversations().len(), 1);
    }

    #[test]
    fn test_first_load_failure_leaves_empty() {
        let mut dir = ConversationDirectory::new(None);
        assert!(dir
            .apply_load(Err(ChatError::Network("down".to_string())))
            .is_err());
        assert!(dir.conversations().is_empty());
        assert_eq!(dir.resolve_selection(None), None);
    }

    #[test]
    fn test_search_by_name() {
        let mut dir = ConversationDirectory::new(None);
        dir.apply_load(Ok(vec![conv(1, "Acme Foods"), conv(2, "Bloggy"), conv(3, "acme tools")]))
            .unwrap();
        let ids: Vec<_> = dir.search(" ACME ").iter().map(|c| c.id).collect();
        assert_eq!(ids, vec![1, 3]);
        assert_eq!(dir.search("").len(), 3);
        assert!(dir.search("zzz").is_empty());
    }
}
