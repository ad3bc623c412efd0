/// Chatsync - conversation synchronization engine
///
/// Keeps a two-party messaging client in step with its backend: conversation
/// directory, polled message sync with stale-result rejection, optimistic
/// sends, scroll anchoring and draft prefill.

pub mod error;
pub mod config;
pub mod model;
pub mod events;
pub mod backend;
pub mod http_backend;
pub mod directory;
pub mod fingerprint;
pub mod sync;
pub mod scheduler;
pub mod scroll;
pub mod send;
pub mod prefill;
pub mod session;
pub mod engine;
pub mod cli_app;

pub use error::{ChatError, Result};
pub use config::Config;
pub use backend::ChatBackend;
pub use engine::{ChatEngine, EngineCommand, EngineHandle};
pub use events::EngineEvent;
pub use session::{ChatSession, Effect};
