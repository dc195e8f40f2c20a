//! The gate every synthetic input passes through.
//!
//! One [`SafetyContext`] exists per run. The main loop refreshes its window
//! observations, the executor consults [`SafetyContext::check`] and
//! [`SafetyContext::rate_limit`] before each action, and the emergency-stop
//! listener only ever touches the shared [`KillSwitch`].

use hk3_capture::{ClientRect, WindowHandle, WindowService};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;
use tracing::warn;

/// Emergency stop flag shared with the key listener. Stays engaged until cleared.
#[derive(Debug, Clone, Default)]
pub struct KillSwitch(Arc<AtomicBool>);

impl KillSwitch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn engage(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_engaged(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    pub fn clear(&self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Why input is currently blocked
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum Inhibition {
    #[error("kill switch engaged")]
    KillSwitch,
    #[error("target window not focused")]
    WindowNotFocused,
    #[error("client rect unknown")]
    ClientRectUnknown,
}

pub struct SafetyContext {
    window: Arc<dyn WindowService>,
    handle: Option<WindowHandle>,
    strict_focus: bool,
    client_rect: Option<ClientRect>,
    max_actions_per_sec: u32,
    min_delay: Duration,
    last_action: Option<Instant>,
    kill_switch: KillSwitch,
}

impl SafetyContext {
    pub fn new(
        window: Arc<dyn WindowService>,
        handle: Option<WindowHandle>,
        strict_focus: bool,
        max_actions_per_sec: u32,
        min_delay: Duration,
        kill_switch: KillSwitch,
    ) -> Self {
        let mut ctx = Self {
            window,
            handle,
            strict_focus,
            client_rect: None,
            max_actions_per_sec: max_actions_per_sec.max(1),
            min_delay,
            last_action: None,
            kill_switch,
        };
        ctx.update_rect();
        ctx
    }

    pub fn handle(&self) -> Option<WindowHandle> {
        self.handle
    }

    pub fn set_handle(&mut self, handle: Option<WindowHandle>) {
        self.handle = handle;
        self.update_rect();
    }

    pub fn client_rect(&self) -> Option<ClientRect> {
        self.client_rect
    }

    /// Re-read the client rect of the current window.
    pub fn update_rect(&mut self) {
        self.client_rect = self.handle.and_then(|h| self.window.client_rect(h));
    }

    pub fn kill_switch(&self) -> &KillSwitch {
        &self.kill_switch
    }

    /// Minimum spacing between clicks
    pub fn click_cooldown(&self) -> Duration {
        Duration::from_secs(1) / self.max_actions_per_sec
    }

    /// The single decision point for synthetic input. With strict focus on, a
    /// missing window handle counts as unfocused.
    pub fn check(&self) -> Result<(), Inhibition> {
        if self.kill_switch.is_engaged() {
            return Err(Inhibition::KillSwitch);
        }
        if self.strict_focus {
            let focused = self.handle.is_some_and(|h| self.window.is_focused(h));
            if !focused {
                return Err(Inhibition::WindowNotFocused);
            }
        }
        if self.client_rect.is_none() {
            return Err(Inhibition::ClientRectUnknown);
        }
        Ok(())
    }

    /// [`check`](Self::check), logging the reason when blocked
    pub fn allowed(&self) -> bool {
        match self.check() {
            Ok(()) => true,
            Err(reason) => {
                warn!("Input blocked: {}", reason);
                false
            }
        }
    }

    /// Clamp a screen point into the client rect (right/bottom exclusive).
    /// Unknown rect passes the point through.
    pub fn clamp_point(&self, x: i32, y: i32) -> (i32, i32) {
        match self.client_rect {
            None => (x, y),
            Some(r) => (
                x.max(r.left).min(r.right - 1),
                y.max(r.top).min(r.bottom - 1),
            ),
        }
    }

    /// Wait until `min_delay` has passed since the last action, then stamp now.
    pub async fn rate_limit(&mut self) {
        if let Some(last) = self.last_action {
            tokio::time::sleep_until(last + self.min_delay).await;
        }
        self.last_action = Some(Instant::now());
    }
}
