use hk3_state::{Action, ActionKind};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::backend::{InputBackend, KeyName, MouseButton};
use crate::safety::SafetyContext;

/// Sends primitive actions to the input backend, each one gated by the
/// [`SafetyContext`]. Every operation returns whether it was performed.
pub struct ActionExecutor {
    safety: SafetyContext,
    backend: Box<dyn InputBackend>,
    last_click: Option<Instant>,
}

impl ActionExecutor {
    pub fn new(safety: SafetyContext, backend: Box<dyn InputBackend>) -> Self {
        Self {
            safety,
            backend,
            last_click: None,
        }
    }

    pub fn safety(&self) -> &SafetyContext {
        &self.safety
    }

    pub fn safety_mut(&mut self) -> &mut SafetyContext {
        &mut self.safety
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    async fn gate(&mut self) -> bool {
        if !self.backend.is_available() {
            debug!("No input backend; skipping action");
            return false;
        }
        if !self.safety.allowed() {
            return false;
        }
        self.safety.rate_limit().await;
        true
    }

    fn parse_key(key: &str) -> Option<KeyName> {
        let parsed = KeyName::parse(key);
        if parsed.is_none() {
            warn!("Unknown key '{}'", key);
        }
        parsed
    }

    /// Press and release `key`, holding it for `duration_ms`.
    pub async fn press_key(&mut self, key: &str, duration_ms: u64) -> bool {
        let Some(key) = Self::parse_key(key) else {
            return false;
        };
        if !self.gate().await {
            return false;
        }
        if let Err(e) = self.backend.key_down(key) {
            warn!("Key down {} failed: {:#}", key, e);
            return false;
        }
        tokio::time::sleep(Duration::from_millis(duration_ms)).await;
        if let Err(e) = self.backend.key_up(key) {
            warn!("Key up {} failed: {:#}", key, e);
            return false;
        }
        true
    }

    /// Press (`on`) or release a key without the matching opposite event.
    pub async fn hold_key(&mut self, key: &str, on: bool) -> bool {
        let Some(key) = Self::parse_key(key) else {
            return false;
        };
        if !self.gate().await {
            return false;
        }
        let result = if on {
            self.backend.key_down(key)
        } else {
            self.backend.key_up(key)
        };
        report(result, "hold key")
    }

    pub async fn move_cursor(&mut self, dx: i32, dy: i32) -> bool {
        if !self.gate().await {
            return false;
        }
        report(self.backend.move_relative(dx, dy), "move cursor")
    }

    /// Move to a screen point, clamped into the client rect.
    pub async fn move_cursor_to(&mut self, x: i32, y: i32) -> bool {
        if !self.gate().await {
            return false;
        }
        let (cx, cy) = self.safety.clamp_point(x, y);
        report(self.backend.move_to(cx, cy), "move cursor")
    }

    /// Click at a screen point, clamped into the client rect. Clicks are
    /// additionally spaced by the click cooldown.
    pub async fn click(&mut self, x: i32, y: i32, button: MouseButton) -> bool {
        if !self.gate().await {
            return false;
        }
        if let Some(last) = self.last_click {
            let ready = last + self.safety.click_cooldown();
            if ready > Instant::now() {
                tokio::time::sleep_until(ready).await;
                // Focus or the kill switch may have changed while waiting
                if !self.safety.allowed() {
                    return false;
                }
            }
        }
        let (cx, cy) = self.safety.clamp_point(x, y);
        let result = self
            .backend
            .move_to(cx, cy)
            .and_then(|_| self.backend.click(button));
        self.last_click = Some(Instant::now());
        debug!("Click {:?} at ({}, {})", button, cx, cy);
        report(result, "click")
    }

    pub async fn type_text(&mut self, text: &str) -> bool {
        if !self.gate().await {
            return false;
        }
        report(self.backend.type_text(text), "type text")
    }

    /// Plain sleep; not gated.
    pub async fn wait(&mut self, ms: u64) -> bool {
        tokio::time::sleep(Duration::from_millis(ms)).await;
        true
    }

    pub fn set_kill_switch(&mut self, enabled: bool) {
        if enabled {
            self.safety.kill_switch().engage();
            warn!("Kill switch engaged");
        } else {
            self.safety.kill_switch().clear();
            warn!("Kill switch cleared");
        }
    }

    /// Run plan actions in order and return how many were performed. Click
    /// coordinates are client-area pixels and are moved to screen space here.
    /// Stops early once the kill switch is engaged.
    pub async fn execute(&mut self, actions: &[Action]) -> usize {
        let mut performed = 0;
        for action in actions {
            if self.safety.kill_switch().is_engaged() {
                warn!("Kill switch engaged; dropping remaining actions");
                break;
            }
            let done = match &action.kind {
                ActionKind::Click { x, y } => {
                    let (sx, sy) = self.client_to_screen(*x, *y);
                    self.click(sx, sy, MouseButton::Left).await
                }
                ActionKind::KeyPress { key, duration_ms } => self.press_key(key, *duration_ms).await,
                ActionKind::Wait { ms } => self.wait(*ms).await,
            };
            if done {
                performed += 1;
            }
        }
        performed
    }

    fn client_to_screen(&self, x: i32, y: i32) -> (i32, i32) {
        match self.safety.client_rect() {
            Some(r) => (r.left.saturating_add(x), r.top.saturating_add(y)),
            None => (x, y),
        }
    }
}

fn report(result: anyhow::Result<()>, what: &str) -> bool {
    match result {
        Ok(()) => true,
        Err(e) => {
            warn!("{} failed: {:#}", what, e);
            false
        }
    }
}
