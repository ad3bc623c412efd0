/// REST client for the chat backend (session-cookie auth, JSON bodies)
///
/// Endpoints, relative to `base_url`:
///   GET  /conversations/
///   GET  /conversations/:id/messages/
///   POST /conversations/:id/messages/     body: {"text":"..."}
///   POST /conversations/:id/read/
///   POST /conversations/with/:profile_id/
use crate::backend::ChatBackend;
use crate::config::Config;
use crate::error::{ChatError, Result};
use crate::model::{Conversation, ConversationId, Counterpart, DeliveryState, Message, MessageId};
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use http::header::{ACCEPT, CONTENT_TYPE, COOKIE};
use http::{Method, Request, Uri};
use http_body_util::{BodyExt, Full};
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::{debug, warn};

const FALLBACK_DISPLAY_NAME: &str = "Conversation";

// ─── Wire types ──────────────────────────────────────────────────────────────

/// List endpoints answer either a bare array or `{"results": [...]}`
/// (`{"messages": [...]}` on older servers).
#[derive(Deserialize)]
#[serde(untagged)]
enum Listing<T> {
    Bare(Vec<T>),
    Wrapped {
        #[serde(alias = "messages")]
        results: Vec<T>,
    },
}

impl<T> Listing<T> {
    fn into_vec(self) -> Vec<T> {
        match self {
            Listing::Bare(items) | Listing::Wrapped { results: items } => items,
        }
    }
}

#[derive(Deserialize)]
struct WireParty {
    #[serde(default)]
    id: Option<u64>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    avatar_url: Option<String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum WireLastMessage {
    Text(String),
    Full {
        #[serde(default)]
        text: String,
        #[serde(default)]
        created_at: Option<DateTime<Utc>>,
    },
}

#[derive(Deserialize)]
struct WireConversation {
    id: ConversationId,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    avatar_url: Option<String>,
    #[serde(default)]
    last_message: Option<WireLastMessage>,
    #[serde(default)]
    last_message_at: Option<DateTime<Utc>>,
    #[serde(default)]
    unread_count: u32,
    #[serde(default)]
    other: Option<WireParty>,
    #[serde(default)]
    nickname: Option<String>,
    #[serde(default)]
    brand_name: Option<String>,
}

impl From<WireConversation> for Conversation {
    fn from(w: WireConversation) -> Self {
        let (party_id, party_name, party_avatar) = match w.other {
            Some(p) => (p.id, p.name, p.avatar_url),
            None => (None, None, None),
        };

        let display_name = [party_name, w.title, w.nickname, w.brand_name]
            .into_iter()
            .flatten()
            .map(|s| s.trim().to_string())
            .find(|s| !s.is_empty())
            .unwrap_or_else(|| FALLBACK_DISPLAY_NAME.to_string());

        let (preview, preview_at) = match w.last_message {
            Some(WireLastMessage::Text(text)) => (text, None),
            Some(WireLastMessage::Full { text, created_at }) => (text, created_at),
            None => (String::new(), None),
        };

        Conversation {
            id: w.id,
            counterpart: Counterpart {
                identity: party_id,
                display_name,
                avatar_ref: party_avatar.or(w.avatar_url).filter(|s| !s.is_empty()),
            },
            last_message_preview: preview,
            last_message_at: w.last_message_at.or(preview_at),
            unread_count: w.unread_count,
        }
    }
}

#[derive(Deserialize)]
struct WireMessage {
    id: u64,
    #[serde(default)]
    text: String,
    created_at: DateTime<Utc>,
    #[serde(default)]
    is_mine: bool,
}

impl From<WireMessage> for Message {
    fn from(w: WireMessage) -> Self {
        Message {
            id: MessageId::Server(w.id),
            text: w.text,
            created_at: w.created_at,
            is_mine: w.is_mine,
            delivery: DeliveryState::Confirmed,
        }
    }
}

/// `201 {"message": {...}}`, or the bare message
#[derive(Deserialize)]
#[serde(untagged)]
enum CreatedMessage {
    Wrapped { message: WireMessage },
    Bare(WireMessage),
}

#[derive(Deserialize)]
struct OpenedConversation {
    #[serde(alias = "id")]
    conversation_id: ConversationId,
}

// ─── Client ──────────────────────────────────────────────────────────────────

type HttpClient = Client<HttpConnector, Full<Bytes>>;

pub struct HttpChatBackend {
    client: HttpClient,
    base_url: String,
    cookie: Option<String>,
}

impl HttpChatBackend {
    pub fn new(config: &Config) -> Result<Self> {
        config.validate()?;
        let client = Client::builder(TokioExecutor::new()).build_http();
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            cookie: config.session_cookie.clone(),
        })
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let body = self.send(Method::GET, path, None).await?;
        Ok(serde_json::from_slice(&body)?)
    }

    async fn post_json<T: DeserializeOwned>(&self, path: &str, payload: Option<Value>) -> Result<T> {
        let body = self.send(Method::POST, path, payload).await?;
        Ok(serde_json::from_slice(&body)?)
    }

    async fn send(&self, method: Method, path: &str, payload: Option<Value>) -> Result<Bytes> {
        let url = format!("{}{}", self.base_url, path);
        let uri: Uri = url
            .parse()
            .map_err(|e| ChatError::Config(format!("Invalid URL {}: {}", url, e)))?;

        let mut builder = Request::builder()
            .method(method.clone())
            .uri(uri)
            .header(ACCEPT, "application/json");
        if let Some(cookie) = &self.cookie {
            builder = builder.header(COOKIE, cookie.as_str());
            // Session-authenticated writes need the CSRF token echoed back
            if method != Method::GET {
                if let Some(token) = csrf_token(cookie) {
                    builder = builder.header("X-CSRFToken", token);
                }
            }
        }

        let body = match payload {
            Some(value) => {
                builder = builder.header(CONTENT_TYPE, "application/json");
                Bytes::from(serde_json::to_vec(&value)?)
            }
            None => Bytes::new(),
        };
        let request = builder
            .body(Full::new(body))
            .map_err(|e| ChatError::Network(e.to_string()))?;

        debug!("{} {}", method, url);
        let response = self
            .client
            .request(request)
            .await
            .map_err(|e| ChatError::Network(e.to_string()))?;

        let status = response.status();
        let bytes = response
            .into_body()
            .collect()
            .await
            .map_err(|e| ChatError::Network(e.to_string()))?
            .to_bytes();

        if !status.is_success() {
            let err = error_from_response(status.as_u16(), &bytes);
            warn!("{} {} failed: {}", method, url, err);
            return Err(err);
        }
        Ok(bytes)
    }
}

#[async_trait]
impl ChatBackend for HttpChatBackend {
    async fn list_conversations(&self) -> Result<Vec<Conversation>> {
        let listing: Listing<WireConversation> = self.get_json("/conversations/").await?;
        Ok(listing.into_vec().into_iter().map(Conversation::from).collect())
    }

    async fn list_messages(&self, conversation: ConversationId) -> Result<Vec<Message>> {
        let path = format!("/conversations/{}/messages/", conversation);
        let listing: Listing<WireMessage> = self.get_json(&path).await?;
        Ok(listing.into_vec().into_iter().map(Message::from).collect())
    }

    async fn create_message(&self, conversation: ConversationId, text: &str) -> Result<Message> {
        let path = format!("/conversations/{}/messages/", conversation);
        let created: CreatedMessage = self
            .post_json(&path, Some(serde_json::json!({ "text": text })))
            .await?;
        let wire = match created {
            CreatedMessage::Wrapped { message } | CreatedMessage::Bare(message) => message,
        };
        Ok(wire.into())
    }

    async fn open_conversation_with(&self, counterpart: u64) -> Result<ConversationId> {
        let path = format!("/conversations/with/{}/", counterpart);
        let opened: OpenedConversation = self.post_json(&path, None).await?;
        Ok(opened.conversation_id)
    }

    async fn mark_read(&self, conversation: ConversationId) -> Result<()> {
        let path = format!("/conversations/{}/read/", conversation);
        self.send(Method::POST, &path, None).await?;
        Ok(())
    }
}

// ─── Utilities ────────────────────────────────────────────────────────────────

/// Map a non-2xx response to an error. `error`/`detail` carry the message;
/// any other string or string-array key is a field error.
fn error_from_response(status: u16, body: &[u8]) -> ChatError {
    let mut message = String::new();
    let mut fields: BTreeMap<String, Vec<String>> = BTreeMap::new();

    if let Ok(Value::Object(map)) = serde_json::from_slice::<Value>(body) {
        for (key, value) in map {
            match value {
                Value::String(s) if key == "error" || key == "detail" => message = s,
                Value::String(s) => {
                    fields.insert(key, vec![s]);
                }
                Value::Array(items) => {
                    let errs: Vec<String> = items
                        .iter()
                        .filter_map(|i| i.as_str().map(str::to_string))
                        .collect();
                    if !errs.is_empty() {
                        fields.insert(key, errs);
                    }
                }
                _ => {}
            }
        }
    }

    match status {
        400 | 422 => {
            if message.is_empty() && fields.is_empty() {
                message = format!("Request rejected ({})", status);
            }
            ChatError::Validation { message, fields }
        }
        _ => ChatError::Server { status, message },
    }
}

fn csrf_token(cookie: &str) -> Option<&str> {
    cookie
        .split(';')
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == "csrftoken")
        .map(|(_, value)| value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conversation_listing_wrapped() {
        let json = r#"{"results":[
            {"id":1,"title":"Spring campaign","last_message":"See you","last_message_at":"2024-05-01T10:00:00Z","unread_count":2,
             "other":{"id":9,"name":"Acme","avatar_url":"/a.png"}},
            {"id":2,"nickname":"@kate","last_message":{"text":"hi","created_at":"2024-05-02T08:00:00Z"}}
        ]}"#;
        let listing: Listing<WireConversation> = serde_json::from_str(json).unwrap();
        let list: Vec<Conversation> = listing.into_vec().into_iter().map(Conversation::from).collect();

        assert_eq!(list[0].counterpart.display_name, "Acme");
        assert_eq!(list[0].counterpart.identity, Some(9));
        assert_eq!(list[0].counterpart.avatar_ref.as_deref(), Some("/a.png"));
        assert_eq!(list[0].unread_count, 2);
        assert_eq!(list[1].counterpart.display_name, "@kate");
        assert_eq!(list[1].last_message_preview, "hi");
        assert!(list[1].last_message_at.is_some());
    }

    #[test]
    fn test_display_name_fallback() {
        let json = r#"[{"id":3,"title":"  ","other":{"name":""}}]"#;
        let listing: Listing<WireConversation> = serde_json::from_str(json).unwrap();
        let conv = Conversation::from(listing.into_vec().remove(0));
        assert_eq!(conv.counterpart.display_name, "Conversation");
        assert_eq!(conv.last_message_preview, "");
    }

    #[test]
    fn test_message_listing_aliases() {
        let json = r#"{"messages":[{"id":5,"text":"yo","created_at":"2024-05-01T10:00:00Z","is_mine":true}]}"#;
        let listing: Listing<WireMessage> = serde_json::from_str(json).unwrap();
        let messages: Vec<Message> = listing.into_vec().into_iter().map(Message::from).collect();
        assert_eq!(messages[0].id, MessageId::Server(5));
        assert!(messages[0].is_mine);
        assert_eq!(messages[0].delivery, DeliveryState::Confirmed);
    }

    #[test]
    fn test_created_message_shapes() {
        let wrapped: CreatedMessage = serde_json::from_str(
            r#"{"message":{"id":7,"text":"hello","created_at":"2024-05-01T10:00:00Z","is_mine":true}}"#,
        )
        .unwrap();
        assert!(matches!(wrapped, CreatedMessage::Wrapped { .. }));

        let bare: CreatedMessage =
            serde_json::from_str(r#"{"id":7,"text":"hello","created_at":"2024-05-01T10:00:00Z"}"#).unwrap();
        assert!(matches!(bare, CreatedMessage::Bare(_)));
    }

    #[test]
    fn test_error_mapping() {
        let err = error_from_response(400, br#"{"error":"text is required"}"#);
        assert_eq!(err.user_message(), "text is required");

        let err = error_from_response(400, br#"{"text":["This field may not be blank."]}"#);
        assert_eq!(err.user_message(), "text: This field may not be blank.");

        let err = error_from_response(403, br#"{"detail":"Not a participant"}"#);
        assert!(matches!(err, ChatError::Server { status: 403, .. }));
        assert_eq!(err.user_message(), "Not a participant");

        let err = error_from_response(502, b"<html>bad gateway</html>");
        assert!(err.is_transient());
    }

    #[test]
    fn test_csrf_token_from_cookie() {
        assert_eq!(csrf_token("sessionid=a; csrftoken=b"), Some("b"));
        assert_eq!(csrf_token("sessionid=a"), None);
    }
}
