use hk3_state::{normalize_plan, GameState, Plan};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

pub const STATE_FILE: &str = "state.json";
pub const RESPONSE_FILE: &str = "planner_response.json";
pub const CONSUMED_FILE: &str = "planner_response.consumed.json";

/// Offline planner: publishes each state to `state.json` and replays a plan an
/// external tool drops into `planner_response.json`.
///
/// File protocol for tools writing responses:
/// - `state.json` is rewritten every frame.
/// - `planner_response.json` is read at most once. Right after reading, the bot
///   renames it to `planner_response.consumed.json`, replacing any earlier one,
///   so a plan is never replayed on later frames. Write a new file for every plan.
/// - Write the response to a temporary name and rename it into place, so a
///   half-written file is never picked up.
/// - A response that is not valid JSON is still consumed and yields the
///   `invalid_response` no-op plan.
pub struct ReplayPlanner {
    dir: PathBuf,
}

impl ReplayPlanner {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub async fn plan(&mut self, state: &GameState) -> Plan {
        if let Err(e) = self.write_state(state).await {
            warn!("Failed to write state for offline planning: {:#}", e);
        }

        let response_path = self.dir.join(RESPONSE_FILE);
        let content = match tokio::fs::read_to_string(&response_path).await {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Plan::noop("noop"),
            Err(e) => {
                warn!("Failed to read {}: {}", response_path.display(), e);
                return Plan::noop("noop");
            }
        };

        if let Err(e) = tokio::fs::rename(&response_path, self.dir.join(CONSUMED_FILE)).await {
            warn!("Failed to mark {} consumed: {}", response_path.display(), e);
        }

        match serde_json::from_str::<serde_json::Value>(&content) {
            Ok(value) => {
                let plan = normalize_plan(&value);
                info!("Replaying plan '{}' with {} actions", plan.intent, plan.actions.len());
                plan
            }
            Err(e) => {
                warn!("Failed to parse {}: {}", RESPONSE_FILE, e);
                Plan::noop("invalid_response")
            }
        }
    }

    async fn write_state(&self, state: &GameState) -> anyhow::Result<()> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let path = self.dir.join(STATE_FILE);
        tokio::fs::write(&path, state.to_json()?).await?;
        tracing::debug!("Wrote {} for offline planning", path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hk3_state::Action;

    #[tokio::test]
    async fn test_writes_state_and_returns_noop_without_response() {
        let dir = tempfile::tempdir().unwrap();
        let mut planner = ReplayPlanner::new(dir.path().join("debug"));
        let state = GameState::new(true, true, None);

        let plan = planner.plan(&state).await;
        assert_eq!(plan, Plan::noop("noop"));

        let written = std::fs::read_to_string(dir.path().join("debug").join(STATE_FILE)).unwrap();
        let value: serde_json::Value = serde_json::from_str(&written).unwrap();
        assert_eq!(value["mode"], "unknown");
    }

    #[tokio::test]
    async fn test_response_is_replayed_once() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join(RESPONSE_FILE),
            r#"{"intent": "open_menu", "actions": [{"type": "keypress", "key": "esc"}, {"type": "fly"}]}"#,
        )
        .unwrap();
        let mut planner = ReplayPlanner::new(dir.path());
        let state = GameState::new(true, true, None);

        let plan = planner.plan(&state).await;
        assert_eq!(plan.intent, "open_menu");
        assert_eq!(plan.actions, vec![Action::key_press("esc", 50)]);
        assert!(!dir.path().join(RESPONSE_FILE).exists());
        assert!(dir.path().join(CONSUMED_FILE).exists());

        assert_eq!(planner.plan(&state).await, Plan::noop("noop"));
    }

    #[tokio::test]
    async fn test_unparseable_response_is_noop() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(RESPONSE_FILE), "{not json").unwrap();
        let mut planner = ReplayPlanner::new(dir.path());

        let plan = planner.plan(&GameState::new(false, true, None)).await;
        assert_eq!(plan, Plan::noop("invalid_response"));
        assert!(!dir.path().join(RESPONSE_FILE).exists());
    }

    #[tokio::test]
    async fn test_new_response_replaces_consumed_one() {
        let dir = tempfile::tempdir().unwrap();
        let mut planner = ReplayPlanner::new(dir.path());
        let state = GameState::new(true, true, None);

        for intent in ["first", "second"] {
            std::fs::write(
                dir.path().join(RESPONSE_FILE),
                format!(r#"{{"intent": "{}", "actions": []}}"#, intent),
            )
            .unwrap();
            assert_eq!(planner.plan(&state).await.intent, intent);
        }

        let consumed = std::fs::read_to_string(dir.path().join(CONSUMED_FILE)).unwrap();
        assert!(consumed.contains("second"));
    }
}
