use std::thread::JoinHandle;

use crate::safety::KillSwitch;

/// Key that engages the kill switch
pub const KILL_KEY: &str = "F8";

/// Start the emergency-stop listener. Its only effect is engaging `kill_switch`.
/// Returns `None` where no global key listener is available.
pub fn spawn_kill_switch_listener(kill_switch: KillSwitch) -> Option<JoinHandle<()>> {
    #[cfg(target_os = "windows")]
    {
        win32::spawn(kill_switch)
    }
    #[cfg(not(target_os = "windows"))]
    {
        let _ = kill_switch;
        tracing::warn!("No global key listener on this platform; {} kill switch disabled", KILL_KEY);
        None
    }
}

#[cfg(target_os = "windows")]
mod win32 {
    use super::KILL_KEY;
    use crate::safety::KillSwitch;
    use std::thread::JoinHandle;
    use std::time::Duration;
    use tracing::{info, warn};
    use windows::Win32::UI::Input::KeyboardAndMouse::{GetAsyncKeyState, VK_F8};

    const POLL: Duration = Duration::from_millis(50);

    fn key_down() -> bool {
        let state = unsafe { GetAsyncKeyState(VK_F8.0 as i32) };
        (state as u16) & 0x8000 != 0
    }

    pub fn spawn(kill_switch: KillSwitch) -> Option<JoinHandle<()>> {
        let spawned = std::thread::Builder::new()
            .name("kill-switch".into())
            .spawn(move || {
                let mut was_down = false;
                loop {
                    let down = key_down();
                    if down && !was_down {
                        kill_switch.engage();
                        warn!("{} pressed: kill switch engaged", KILL_KEY);
                    }
                    was_down = down;
                    std::thread::sleep(POLL);
                }
            });
        match spawned {
            Ok(handle) => {
                info!("Kill switch listener active (press {} to stop input)", KILL_KEY);
                Some(handle)
            }
            Err(e) => {
                warn!("Failed to start kill switch listener: {}", e);
                None
            }
        }
    }
}
