/// Scroll anchoring for the message list viewport
use serde::{Deserialize, Serialize};

pub const DEFAULT_NEAR_BOTTOM_PX: u32 = 100;

/// Geometry of the scrollable message list, in pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Viewport {
    pub scroll_top: u32,
    pub scroll_height: u32,
    pub client_height: u32,
}

impl Viewport {
    pub fn distance_from_bottom(&self) -> u32 {
        self.scroll_height
            .saturating_sub(self.scroll_top.saturating_add(self.client_height))
    }
}

/// Why displayed messages were replaced
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommitCause {
    /// Poll tick or activation fetch
    Poll,
    /// Read issued right after a successful send
    Reconcile,
    /// Local optimistic append
    Send,
    /// Failed send withdrawn from the list
    Rollback,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScrollAction {
    Stay,
    ToBottom,
}

#[derive(Debug, Clone)]
pub struct ScrollAnchor {
    threshold_px: u32,
    near_bottom: bool,
}

impl ScrollAnchor {
    pub fn new(threshold_px: u32) -> Self {
        Self {
            threshold_px,
            // Nothing rendered yet counts as anchored
            near_bottom: true,
        }
    }

    /// Record a viewport report from the UI (on every scroll).
    pub fn observe(&mut self, viewport: Viewport) {
        self.near_bottom = viewport.distance_from_bottom() < self.threshold_px;
    }

    pub fn is_near_bottom(&self) -> bool {
        self.near_bottom
    }

    /// Decide what to do after a commit. The sender's own action always
    /// scrolls; anything else only follows a user who was already at the bottom.
    pub fn after_commit(&mut self, cause: CommitCause) -> ScrollAction {
        let action = match cause {
            CommitCause::Send => ScrollAction::ToBottom,
            CommitCause::Poll | CommitCause::Reconcile if self.near_bottom => ScrollAction::ToBottom,
            CommitCause::Poll | CommitCause::Reconcile | CommitCause::Rollback => ScrollAction::Stay,
        };
        if action == ScrollAction::ToBottom {
            self.near_bottom = true;
        }
        action
    }

    /// Forget the previous conversation's position.
    pub fn reset(&mut self) {
        self.near_bottom = true;
    }
}
