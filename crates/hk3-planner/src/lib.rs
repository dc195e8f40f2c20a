use hk3_state::{GameState, Plan};
use std::time::{Duration, Instant};

pub mod remote;
pub mod replay;
pub mod rules;

pub use remote::RemotePlanner;
pub use replay::ReplayPlanner;
pub use rules::RulePlanner;

/// Maps a game-state snapshot to a plan
pub enum Planner {
    Rules(RulePlanner),
    Replay(ReplayPlanner),
    Remote(RemotePlanner),
}

impl Planner {
    pub fn name(&self) -> &'static str {
        match self {
            Planner::Rules(_) => "rules",
            Planner::Replay(_) => "stub",
            Planner::Remote(_) => "remote",
        }
    }

    /// Whether the caller should encode the current frame for this planner
    pub fn wants_image(&self) -> bool {
        match self {
            Planner::Remote(p) => p.wants_image(),
            _ => false,
        }
    }

    /// `image` is the current frame as PNG bytes, if the planner asked for it.
    pub async fn plan(&mut self, state: &GameState, image: Option<&[u8]>) -> Plan {
        match self {
            Planner::Rules(p) => p.plan(state),
            Planner::Replay(p) => p.plan(state).await,
            Planner::Remote(p) => p.plan(state, image).await,
        }
    }
}

/// Minimum spacing between calls
#[derive(Debug, Clone)]
pub struct Cooldown {
    min_interval: Duration,
    last: Option<Instant>,
}

impl Cooldown {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last: None,
        }
    }

    /// Claim a slot at `now`. Fails without updating the last call time when
    /// the previous claim was less than `min_interval` ago.
    pub fn try_acquire(&mut self, now: Instant) -> bool {
        if let Some(last) = self.last {
            if now.saturating_duration_since(last) < self.min_interval {
                return false;
            }
        }
        self.last = Some(now);
        true
    }
}
