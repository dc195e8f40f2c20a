use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::time::{Instant, SystemTime, UNIX_EPOCH};
use tracing::{debug, warn};

use crate::window::{WindowHandle, WindowService};
use crate::{ClientRect, Frame};

/// Pixel grabber for a window's client area.
pub trait CaptureBackend: Send {
    fn name(&self) -> &'static str;

    /// Capture the client area `rect` (screen coordinates) of `handle`.
    fn capture(&mut self, handle: WindowHandle, rect: &ClientRect) -> Result<Frame>;
}

/// Status of the frame source, refreshed on every grab
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CaptureStatus {
    pub is_capturing: bool,
    pub window_found: bool,
    pub fps: f64,
    pub last_capture_time: Option<u64>,
    pub resolution: Option<(u32, u32)>,
}

/// Produces one frame per call from the current target window.
pub struct FrameSource {
    backend: Option<Box<dyn CaptureBackend>>,
    handle: Option<WindowHandle>,
    status: CaptureStatus,
    frame_count: u64,
    fps_timer: Instant,
}

impl FrameSource {
    pub fn new(backend: Option<Box<dyn CaptureBackend>>, handle: Option<WindowHandle>) -> Self {
        if backend.is_none() {
            warn!("No capture backend available; frames cannot be grabbed");
        }
        Self {
            backend,
            handle,
            status: CaptureStatus::default(),
            frame_count: 0,
            fps_timer: Instant::now(),
        }
    }

    pub fn update_handle(&mut self, handle: Option<WindowHandle>) {
        self.handle = handle;
    }

    pub fn handle(&self) -> Option<WindowHandle> {
        self.handle
    }

    pub fn status(&self) -> &CaptureStatus {
        &self.status
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.as_ref().map_or("none", |b| b.name())
    }

    /// Grab the current client area, or `None` when the window region is unknown,
    /// no backend exists, or the backend fails.
    pub fn grab(&mut self, windows: &dyn WindowService) -> Option<Frame> {
        let Some(handle) = self.handle else {
            self.status = CaptureStatus::default();
            return None;
        };
        let Some(rect) = windows.client_rect(handle) else {
            debug!("Client rect unknown for window {}", handle);
            self.status = CaptureStatus {
                window_found: true,
                ..CaptureStatus::default()
            };
            return None;
        };
        let Some(backend) = self.backend.as_mut() else {
            warn!("No capture backend available");
            return None;
        };

        match backend.capture(handle, &rect) {
            Ok(frame) => {
                self.record_frame(&frame);
                Some(frame)
            }
            Err(e) => {
                warn!("Capture failed: {:#}", e);
                self.status = CaptureStatus {
                    window_found: true,
                    ..CaptureStatus::default()
                };
                None
            }
        }
    }

    fn record_frame(&mut self, frame: &Frame) {
        self.frame_count += 1;

        let elapsed = self.fps_timer.elapsed().as_secs_f64();
        let fps = if elapsed > 0.0 {
            self.frame_count as f64 / elapsed
        } else {
            0.0
        };

        // Reset FPS counter every 5 seconds
        if elapsed > 5.0 {
            self.frame_count = 0;
            self.fps_timer = Instant::now();
        }

        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as u64;

        self.status = CaptureStatus {
            is_capturing: true,
            window_found: true,
            fps,
            last_capture_time: Some(now),
            resolution: Some(frame.dimensions()),
        };
    }
}

/// Pick the capture provider for the current OS.
pub fn default_capture_backend() -> Option<Box<dyn CaptureBackend>> {
    #[cfg(target_os = "windows")]
    {
        Some(Box::new(xcap_backend::XcapBackend))
    }
    #[cfg(not(target_os = "windows"))]
    {
        None
    }
}

#[cfg(target_os = "windows")]
pub mod xcap_backend {
    use super::*;
    use anyhow::{anyhow, Context};
    use xcap::Window;

    /// Captures the whole window through xcap, then crops to the client area.
    pub struct XcapBackend;

    impl CaptureBackend for XcapBackend {
        fn name(&self) -> &'static str {
            "xcap"
        }

        fn capture(&mut self, handle: WindowHandle, rect: &ClientRect) -> Result<Frame> {
            let windows = Window::all().context("Failed to enumerate windows")?;
            let window = windows
                .into_iter()
                .find(|w| w.id().map(|id| id as u64 == handle.0).unwrap_or(false))
                .ok_or_else(|| anyhow!("Window {} is not capturable", handle))?;

            let win_x = window.x().context("Failed to read window position")?;
            let win_y = window.y().context("Failed to read window position")?;
            let img = window
                .capture_image()
                .context("Failed to capture window image")?;

            let full = image::DynamicImage::ImageRgba8(img).to_rgb8();
            let client = crate::BoundingBox::new(
                (rect.left - win_x).max(0) as u32,
                (rect.top - win_y).max(0) as u32,
                rect.width().max(1),
                rect.height().max(1),
            );
            Ok(crate::crop_absolute(&full, &client))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::window::WindowPattern;

    struct FixedWindow(Option<ClientRect>);

    impl WindowService for FixedWindow {
        fn name(&self) -> &'static str {
            "fixed"
        }
        fn find_window(&self, _patterns: &[WindowPattern]) -> Option<WindowHandle> {
            Some(WindowHandle(7))
        }
        fn client_rect(&self, _handle: WindowHandle) -> Option<ClientRect> {
            self.0
        }
        fn is_focused(&self, _handle: WindowHandle) -> bool {
            true
        }
        fn is_valid(&self, _handle: WindowHandle) -> bool {
            true
        }
    }

    struct SolidBackend;

    impl CaptureBackend for SolidBackend {
        fn name(&self) -> &'static str {
            "solid"
        }
        fn capture(&mut self, _handle: WindowHandle, rect: &ClientRect) -> Result<Frame> {
            Ok(Frame::from_pixel(rect.width(), rect.height(), image::Rgb([9, 9, 9])))
        }
    }

    struct FailingBackend;

    impl CaptureBackend for FailingBackend {
        fn name(&self) -> &'static str {
            "failing"
        }
        fn capture(&mut self, _handle: WindowHandle, _rect: &ClientRect) -> Result<Frame> {
            anyhow::bail!("device lost")
        }
    }

    #[test]
    fn test_grab_uses_client_rect_size() {
        let windows = FixedWindow(Some(ClientRect::new(100, 100, 420, 340)));
        let mut source = FrameSource::new(Some(Box::new(SolidBackend)), Some(WindowHandle(7)));
        let frame = source.grab(&windows).expect("frame");
        assert_eq!(frame.dimensions(), (320, 240));
        assert!(source.status().is_capturing);
        assert_eq!(source.status().resolution, Some((320, 240)));
    }

    #[test]
    fn test_grab_without_window_or_rect_returns_none() {
        let windows = FixedWindow(None);
        let mut source = FrameSource::new(Some(Box::new(SolidBackend)), Some(WindowHandle(7)));
        assert!(source.grab(&windows).is_none());
        assert!(source.status().window_found);

        source.update_handle(None);
        assert!(source.grab(&windows).is_none());
        assert!(!source.status().window_found);
    }

    #[test]
    fn test_grab_degrades_without_backend() {
        let windows = FixedWindow(Some(ClientRect::new(0, 0, 10, 10)));
        let mut source = FrameSource::new(None, Some(WindowHandle(7)));
        assert_eq!(source.backend_name(), "none");
        assert!(source.grab(&windows).is_none());
    }

    #[test]
    fn test_backend_error_is_not_fatal() {
        let windows = FixedWindow(Some(ClientRect::new(0, 0, 10, 10)));
        let mut source = FrameSource::new(Some(Box::new(FailingBackend)), Some(WindowHandle(7)));
        assert!(source.grab(&windows).is_none());
        assert!(!source.status().is_capturing);
    }
}
