/// Visibility-aware poll scheduler
use crate::model::ConversationId;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};
use tracing::debug;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Visibility {
    Visible,
    Hidden,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Stopped,
    Running(ConversationId),
    Paused(ConversationId),
}

/// Fixed-interval ticks bound to one conversation. Ticks only fire while
/// running; `start` and `resume` ask the caller for an immediate poll and
/// restart the interval from now. No backoff: every tick is equally spaced.
pub struct PollScheduler {
    period: Duration,
    state: SchedulerState,
    interval: Option<Interval>,
}

impl PollScheduler {
    pub fn new(period: Duration) -> Self {
        Self {
            period,
            state: SchedulerState::Stopped,
            interval: None,
        }
    }

    /// Bind to `conversation`, replacing any previous schedule. Returns true
    /// if the caller should poll now; false when the view is hidden and the
    /// schedule starts paused.
    pub fn start(&mut self, conversation: ConversationId, visibility: Visibility) -> bool {
        match visibility {
            Visibility::Visible => {
                self.state = SchedulerState::Running(conversation);
                self.arm();
                debug!("Polling conversation {} every {:?}", conversation, self.period);
                true
            }
            Visibility::Hidden => {
                self.state = SchedulerState::Paused(conversation);
                self.interval = None;
                false
            }
        }
    }

    pub fn pause(&mut self) {
        if let SchedulerState::Running(conversation) = self.state {
            debug!("Polling paused for conversation {}", conversation);
            self.state = SchedulerState::Paused(conversation);
            self.interval = None;
        }
    }

    /// Returns the conversation to poll immediately, if the schedule was paused.
    pub fn resume(&mut self) -> Option<ConversationId> {
        if let SchedulerState::Paused(conversation) = self.state {
            debug!("Polling resumed for conversation {}", conversation);
            self.state = SchedulerState::Running(conversation);
            self.arm();
            return Some(conversation);
        }
        None
    }

    pub fn stop(&mut self) {
        self.state = SchedulerState::Stopped;
        self.interval = None;
    }

    /// Apply a visibility change. Returns the conversation to poll now when
    /// becoming visible resumed a paused schedule.
    pub fn on_visibility(&mut self, visibility: Visibility) -> Option<ConversationId> {
        match visibility {
            Visibility::Hidden => {
                self.pause();
                None
            }
            Visibility::Visible => self.resume(),
        }
    }

    pub fn state(&self) -> SchedulerState {
        self.state
    }

    /// Wait for the next tick. Never resolves unless running.
    pub async fn next_tick(&mut self) -> ConversationId {
        match (self.state, self.interval.as_mut()) {
            (SchedulerState::Running(conversation), Some(interval)) => {
                interval.tick().await;
                conversation
            }
            _ => std::future::pending().await,
        }
    }

    fn arm(&mut self) {
        // Tick 0 is the caller's immediate poll; the interval starts one period out
        let mut interval = interval_at(Instant::now() + self.period, self.period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        self.interval = Some(interval);
    }
}
