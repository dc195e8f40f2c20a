use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::warn;

use crate::ClientRect;

/// Opaque OS window identifier (HWND on Windows).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WindowHandle(pub u64);

impl fmt::Display for WindowHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

/// One way of recognizing the game window. Any populated field that matches is enough.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WindowPattern {
    /// Case-insensitive substring of the window title
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contains: Option<String>,
    /// Regular expression searched in the window title
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub regex: Option<String>,
    /// Exact window class name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub class_name: Option<String>,
}

impl WindowPattern {
    pub fn contains(text: &str) -> Self {
        Self {
            contains: Some(text.to_string()),
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.contains.is_none() && self.regex.is_none() && self.class_name.is_none()
    }

    pub fn matches(&self, title: &str, class_name: &str) -> bool {
        if let Some(ref needle) = self.contains {
            if title.to_lowercase().contains(&needle.to_lowercase()) {
                return true;
            }
        }
        if let Some(ref pattern) = self.regex {
            match Regex::new(pattern) {
                Ok(re) if re.is_match(title) => return true,
                Ok(_) => {}
                Err(e) => warn!("Invalid window regex {:?}: {}", pattern, e),
            }
        }
        if let Some(ref class) = self.class_name {
            if class == class_name {
                return true;
            }
        }
        false
    }
}

/// True if any pattern matches the given title/class pair.
pub fn matches_any(patterns: &[WindowPattern], title: &str, class_name: &str) -> bool {
    patterns.iter().any(|p| p.matches(title, class_name))
}

/// OS window lookup and inspection.
pub trait WindowService: Send + Sync {
    fn name(&self) -> &'static str;

    /// First top-level window matching any of the patterns.
    fn find_window(&self, patterns: &[WindowPattern]) -> Option<WindowHandle>;

    /// Client area in screen coordinates.
    fn client_rect(&self, handle: WindowHandle) -> Option<ClientRect>;

    fn is_focused(&self, handle: WindowHandle) -> bool;

    fn is_valid(&self, handle: WindowHandle) -> bool;
}

/// Provider used when no window API is available on this platform.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullWindowService;

impl WindowService for NullWindowService {
    fn name(&self) -> &'static str {
        "none"
    }

    fn find_window(&self, _patterns: &[WindowPattern]) -> Option<WindowHandle> {
        None
    }

    fn client_rect(&self, _handle: WindowHandle) -> Option<ClientRect> {
        None
    }

    fn is_focused(&self, _handle: WindowHandle) -> bool {
        false
    }

    fn is_valid(&self, _handle: WindowHandle) -> bool {
        false
    }
}

/// Pick the window provider for the current OS.
pub fn default_window_service() -> Box<dyn WindowService> {
    #[cfg(target_os = "windows")]
    {
        Box::new(win32::Win32WindowService)
    }
    #[cfg(not(target_os = "windows"))]
    {
        warn!("Window API not available on this platform; the game window cannot be found");
        Box::new(NullWindowService)
    }
}

#[cfg(target_os = "windows")]
pub mod win32 {
    use super::*;
    use tracing::debug;
    use windows::Win32::Foundation::{BOOL, HWND, LPARAM, POINT, RECT};
    use windows::Win32::Graphics::Gdi::ClientToScreen;
    use windows::Win32::UI::WindowsAndMessaging::{
        EnumWindows, GetClassNameW, GetClientRect, GetForegroundWindow, GetWindowTextW, IsWindow,
        IsWindowVisible,
    };

    pub struct Win32WindowService;

    fn hwnd(handle: WindowHandle) -> HWND {
        HWND(handle.0 as usize as *mut core::ffi::c_void)
    }

    fn window_text(hwnd: HWND) -> String {
        let mut buf = [0u16; 512];
        let len = unsafe { GetWindowTextW(hwnd, &mut buf) };
        String::from_utf16_lossy(&buf[..len.max(0) as usize])
    }

    fn class_name(hwnd: HWND) -> String {
        let mut buf = [0u16; 256];
        let len = unsafe { GetClassNameW(hwnd, &mut buf) };
        String::from_utf16_lossy(&buf[..len.max(0) as usize])
    }

    struct EnumState<'a> {
        patterns: &'a [WindowPattern],
        found: Option<HWND>,
    }

    unsafe extern "system" fn enum_proc(hwnd: HWND, lparam: LPARAM) -> BOOL {
        let state = &mut *(lparam.0 as *mut EnumState<'_>);
        if !IsWindowVisible(hwnd).as_bool() {
            return BOOL(1);
        }
        let title = window_text(hwnd);
        let class = class_name(hwnd);
        if matches_any(state.patterns, &title, &class) {
            debug!("Found game window: {:?} ({})", title, class);
            state.found = Some(hwnd);
            return BOOL(0);
        }
        BOOL(1)
    }

    impl WindowService for Win32WindowService {
        fn name(&self) -> &'static str {
            "win32"
        }

        fn find_window(&self, patterns: &[WindowPattern]) -> Option<WindowHandle> {
            let mut state = EnumState {
                patterns,
                found: None,
            };
            // EnumWindows reports an error when the callback stops enumeration early.
            let _ = unsafe {
                EnumWindows(Some(enum_proc), LPARAM(&mut state as *mut EnumState<'_> as isize))
            };
            state.found.map(|h| WindowHandle(h.0 as usize as u64))
        }

        fn client_rect(&self, handle: WindowHandle) -> Option<ClientRect> {
            let hwnd = hwnd(handle);
            let mut rect = RECT::default();
            if let Err(e) = unsafe { GetClientRect(hwnd, &mut rect) } {
                warn!("Failed to get client rect: {}", e);
                return None;
            }
            let mut origin = POINT { x: 0, y: 0 };
            if !unsafe { ClientToScreen(hwnd, &mut origin) }.as_bool() {
                warn!("Failed to map client origin to screen");
                return None;
            }
            Some(ClientRect::new(
                origin.x,
                origin.y,
                origin.x + rect.right,
                origin.y + rect.bottom,
            ))
        }

        fn is_focused(&self, handle: WindowHandle) -> bool {
            let foreground = unsafe { GetForegroundWindow() };
            foreground == hwnd(handle)
        }

        fn is_valid(&self, handle: WindowHandle) -> bool {
            let valid = unsafe { IsWindow(hwnd(handle)) };
            valid.as_bool()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_contains_is_case_insensitive() {
        let p = WindowPattern::contains("Roblox");
        assert!(p.matches("ROBLOX - Humankind", ""));
        assert!(!p.matches("Notepad", ""));
    }

    #[test]
    fn test_regex_and_class_patterns() {
        let by_regex = WindowPattern {
            regex: Some(r"^Humankind \d$".into()),
            ..Default::default()
        };
        assert!(by_regex.matches("Humankind 3", ""));
        assert!(!by_regex.matches("Humankind 3 (launcher)", ""));

        let by_class = WindowPattern {
            class_name: Some("WINDOWSCLIENT".into()),
            ..Default::default()
        };
        assert!(by_class.matches("anything", "WINDOWSCLIENT"));
        assert!(!by_class.matches("anything", "windowsclient"));
    }

    #[test]
    fn test_invalid_regex_never_matches() {
        let p = WindowPattern {
            regex: Some("(".into()),
            ..Default::default()
        };
        assert!(!p.matches("(", ""));
    }

    #[test]
    fn test_matches_any() {
        let patterns = vec![WindowPattern::contains("foo"), WindowPattern::contains("bar")];
        assert!(matches_any(&patterns, "a bar window", ""));
        assert!(!matches_any(&patterns, "baz", ""));
        assert!(!matches_any(&[], "foo", ""));
    }

    #[test]
    fn test_null_service_finds_nothing() {
        let svc = NullWindowService;
        assert!(svc.find_window(&[WindowPattern::contains("")]).is_none());
        assert!(!svc.is_valid(WindowHandle(1)));
        assert!(svc.client_rect(WindowHandle(1)).is_none());
    }

    #[cfg(target_os = "windows")]
    #[test]
    fn test_win32_rejects_null_handle() {
        let svc = win32::Win32WindowService;
        assert!(!svc.is_valid(WindowHandle(0)));
        assert!(svc.client_rect(WindowHandle(0)).is_none());
    }
}
