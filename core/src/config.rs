/// Configuration management
use crate::error::{ChatError, Result};
use crate::model::{ConversationId, Role};
use crate::scheduler::DEFAULT_POLL_INTERVAL;
use crate::scroll::DEFAULT_NEAR_BOTTOM_PX;
use crate::send::SendFailurePolicy;
use serde::{Deserialize, Serialize};
use std::time::Duration;

const DEFAULT_BASE_URL: &str = "http://127.0.0.1:8000/api";

/// Engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Backend API root, e.g. `http://127.0.0.1:8000/api`
    pub base_url: String,

    /// Value of the `Cookie` header carrying the session credential
    pub session_cookie: Option<String>,

    /// Marketplace side of the signed-in user (selects the prefill template)
    pub role: Role,

    /// Message poll interval while a conversation is open
    pub poll_interval: Duration,

    /// Distance from the bottom, in pixels, still counted as "near bottom"
    pub near_bottom_px: u32,

    /// Conversation to open instead of the first one (one-shot)
    pub open_conversation: Option<ConversationId>,

    /// What a failed send does to its optimistic message
    pub send_failure_policy: SendFailurePolicy,

    /// Mark incoming messages read when a conversation is opened
    pub mark_read_on_open: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            session_cookie: None,
            role: Role::Requester,
            poll_interval: DEFAULT_POLL_INTERVAL,
            near_bottom_px: DEFAULT_NEAR_BOTTOM_PX,
            open_conversation: None,
            send_failure_policy: SendFailurePolicy::Expire,
            mark_read_on_open: true,
        }
    }
}

impl Config {
    /// Create config from command line flags (program name and subcommand
    /// already stripped), then apply env overrides.
    pub fn from_args(args: &[String]) -> Result<Self> {
        let mut config = Config::default();

        let mut i = 0;
        while i < args.len() {
            match args[i].as_str() {
                "--base-url" => {
                    config.base_url = flag_value(args, i, "--base-url", "a URL")?.to_string();
                    i += 2;
                }
                "--session" => {
                    let raw = flag_value(args, i, "--session", "a cookie value")?;
                    config.session_cookie = Some(session_header(raw));
                    i += 2;
                }
                "--role" => {
                    let raw = flag_value(args, i, "--role", "requester|responder")?;
                    config.role = raw.parse().map_err(ChatError::Config)?;
                    i += 2;
                }
                "--poll-secs" => {
                    let raw = flag_value(args, i, "--poll-secs", "a number of seconds")?;
                    config.poll_interval = parse_poll_secs(raw)?;
                    i += 2;
                }
                "--near-bottom-px" => {
                    let raw = flag_value(args, i, "--near-bottom-px", "a pixel count")?;
                    config.near_bottom_px = raw.parse::<u32>().map_err(|_| {
                        ChatError::Config("--near-bottom-px must be a non-negative number".to_string())
                    })?;
                    i += 2;
                }
                "--conversation" => {
                    let raw = flag_value(args, i, "--conversation", "a conversation id")?;
                    config.open_conversation = Some(raw.parse::<ConversationId>().map_err(|_| {
                        ChatError::Config("--conversation must be a numeric id".to_string())
                    })?);
                    i += 2;
                }
                "--keep-failed" => {
                    config.send_failure_policy = SendFailurePolicy::Keep;
                    i += 1;
                }
                "--no-mark-read" => {
                    config.mark_read_on_open = false;
                    i += 1;
                }
                other => {
                    return Err(ChatError::Config(format!("Unknown argument: {}", other)));
                }
            }
        }

        // Env overrides (nice for scripts)
        if let Ok(url) = std::env::var("CHATSYNC_BASE_URL") {
            config.base_url = url;
        }
        if let Ok(session) = std::env::var("CHATSYNC_SESSION") {
            config.session_cookie = Some(session_header(&session));
        }
        if let Ok(secs) = std::env::var("CHATSYNC_POLL_SECS") {
            config.poll_interval = parse_poll_secs(&secs)?;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if !self.base_url.starts_with("http://") {
            return Err(ChatError::Config(format!(
                "Base URL must be plain http:// (got {}); terminate TLS in a local proxy",
                self.base_url
            )));
        }
        if self.poll_interval.is_zero() {
            return Err(ChatError::Config("Poll interval must be positive".to_string()));
        }
        Ok(())
    }
}

fn flag_value<'a>(args: &'a [String], i: usize, flag: &str, what: &str) -> Result<&'a str> {
    args.get(i + 1)
        .map(|s| s.as_str())
        .ok_or_else(|| ChatError::Config(format!("{} requires {}", flag, what)))
}

fn parse_poll_secs(raw: &str) -> Result<Duration> {
    match raw.trim().parse::<u64>() {
        Ok(secs) if secs > 0 => Ok(Duration::from_secs(secs)),
        _ => Err(ChatError::Config("Poll interval must be a positive number of seconds".to_string())),
    }
}

/// Accept either a bare session id or a full `name=value` cookie.
fn session_header(raw: &str) -> String {
    if raw.contains('=') {
        raw.to_string()
    } else {
        format!("sessionid={}", raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.poll_interval, Duration::from_secs(10));
        assert_eq!(config.near_bottom_px, 100);
        assert_eq!(config.send_failure_policy, SendFailurePolicy::Expire);
        assert!(config.mark_read_on_open);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_flags() {
        let config = Config::from_args(&args(&[
            "--role",
            "blogger",
            "--session",
            "abc123",
            "--conversation",
            "42",
            "--near-bottom-px",
            "80",
            "--keep-failed",
            "--no-mark-read",
        ]))
        .unwrap();
        assert_eq!(config.role, Role::Responder);
        assert_eq!(config.session_cookie.as_deref(), Some("sessionid=abc123"));
        assert_eq!(config.open_conversation, Some(42));
        assert_eq!(config.near_bottom_px, 80);
        assert_eq!(config.send_failure_policy, SendFailurePolicy::Keep);
        assert!(!config.mark_read_on_open);
    }

    #[test]
    fn test_bad_flags() {
        assert!(Config::from_args(&args(&["--poll-secs", "0"])).is_err());
        assert!(Config::from_args(&args(&["--conversation"])).is_err());
        assert!(Config::from_args(&args(&["--role", "admin"])).is_err());
        assert!(Config::from_args(&args(&["stray"])).is_err());
        assert!(Config::from_args(&args(&["--base-url", "https://example.com/api"])).is_err());
    }

    #[test]
    fn test_full_cookie_kept() {
        assert_eq!(session_header("sessionid=x; csrftoken=y"), "sessionid=x; csrftoken=y");
    }
}
