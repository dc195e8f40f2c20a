use hk3_config::ProfileConfig;
use hk3_state::{Action, GameState, Plan};

/// Clicks the center of every configured anchor that is on screen.
pub struct RulePlanner {
    click_anchors: Vec<String>,
    risky: Vec<String>,
}

impl RulePlanner {
    pub fn new(click_anchors: Vec<String>, risky: Vec<String>) -> Self {
        Self {
            click_anchors,
            risky,
        }
    }

    pub fn from_profile(profile: &ProfileConfig) -> Self {
        Self::new(
            profile.click_anchors.clone(),
            profile.risky_templates.clone(),
        )
    }

    pub fn plan(&self, state: &GameState) -> Plan {
        let actions: Vec<Action> = self
            .click_anchors
            .iter()
            .filter_map(|name| {
                let m = state.anchors.get(name).filter(|m| m.found)?;
                let (x, y) = m.bbox.center();
                let action = Action::click(x as i32, y as i32).with_risky(self.risky.contains(name));
                Some(action)
            })
            .collect();

        let intent = if actions.is_empty() { "noop" } else { "dismiss" };
        Plan::new(intent, actions, false)
    }
}
