use anyhow::Result;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MouseButton {
    #[default]
    Left,
    Right,
}

/// Keys a plan may name
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyName {
    Char(char),
    Enter,
    Escape,
    Space,
    Tab,
    Backspace,
    Shift,
    Control,
    Alt,
    Up,
    Down,
    Left,
    Right,
    F(u8),
}

impl KeyName {
    /// Parse a key name such as `e`, `esc`, `enter`, `f5` or `left`. Case-insensitive.
    pub fn parse(name: &str) -> Option<Self> {
        let mut chars = name.chars();
        if let (Some(c), None) = (chars.next(), chars.next()) {
            return Some(KeyName::Char(c.to_ascii_lowercase()));
        }

        let lower = name.trim().to_ascii_lowercase();
        let key = match lower.as_str() {
            "enter" | "return" => KeyName::Enter,
            "esc" | "escape" => KeyName::Escape,
            "space" => KeyName::Space,
            "tab" => KeyName::Tab,
            "backspace" => KeyName::Backspace,
            "shift" => KeyName::Shift,
            "ctrl" | "control" => KeyName::Control,
            "alt" => KeyName::Alt,
            "up" => KeyName::Up,
            "down" => KeyName::Down,
            "left" => KeyName::Left,
            "right" => KeyName::Right,
            other => {
                let n: u8 = other.strip_prefix('f')?.parse().ok()?;
                if !(1..=12).contains(&n) {
                    return None;
                }
                KeyName::F(n)
            }
        };
        Some(key)
    }
}

impl fmt::Display for KeyName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyName::Char(c) => write!(f, "{}", c),
            KeyName::F(n) => write!(f, "f{}", n),
            other => f.write_str(&format!("{:?}", other).to_ascii_lowercase()),
        }
    }
}

/// OS-level synthetic input. Coordinates are screen pixels.
pub trait InputBackend {
    fn name(&self) -> &'static str;
    fn is_available(&self) -> bool {
        true
    }
    fn key_down(&mut self, key: KeyName) -> Result<()>;
    fn key_up(&mut self, key: KeyName) -> Result<()>;
    fn move_relative(&mut self, dx: i32, dy: i32) -> Result<()>;
    fn move_to(&mut self, x: i32, y: i32) -> Result<()>;
    fn click(&mut self, button: MouseButton) -> Result<()>;
    fn type_text(&mut self, text: &str) -> Result<()>;
}

/// Stand-in when no input backend exists on this platform
pub struct UnavailableBackend;

impl InputBackend for UnavailableBackend {
    fn name(&self) -> &'static str {
        "unavailable"
    }

    fn is_available(&self) -> bool {
        false
    }

    fn key_down(&mut self, _key: KeyName) -> Result<()> {
        anyhow::bail!("no input backend")
    }

    fn key_up(&mut self, _key: KeyName) -> Result<()> {
        anyhow::bail!("no input backend")
    }

    fn move_relative(&mut self, _dx: i32, _dy: i32) -> Result<()> {
        anyhow::bail!("no input backend")
    }

    fn move_to(&mut self, _x: i32, _y: i32) -> Result<()> {
        anyhow::bail!("no input backend")
    }

    fn click(&mut self, _button: MouseButton) -> Result<()> {
        anyhow::bail!("no input backend")
    }

    fn type_text(&mut self, _text: &str) -> Result<()> {
        anyhow::bail!("no input backend")
    }
}

/// Best input backend for this platform, resolved once at startup.
pub fn default_backend() -> Box<dyn InputBackend> {
    #[cfg(target_os = "windows")]
    {
        match enigo_backend::EnigoBackend::new() {
            Ok(b) => return Box::new(b),
            Err(e) => tracing::warn!("Failed to initialize input backend: {:#}", e),
        }
    }
    #[cfg(not(target_os = "windows"))]
    {
        tracing::warn!("Synthetic input is only supported on Windows; actions will not be sent");
    }
    Box::new(UnavailableBackend)
}

#[cfg(target_os = "windows")]
pub mod enigo_backend {
    use super::{InputBackend, KeyName, MouseButton};
    use anyhow::{Context, Result};
    use enigo::{Button, Coordinate, Direction, Enigo, Key, Keyboard, Mouse, Settings};

    pub struct EnigoBackend {
        enigo: Enigo,
    }

    impl EnigoBackend {
        pub fn new() -> Result<Self> {
            let enigo = Enigo::new(&Settings::default()).context("failed to create enigo")?;
            Ok(Self { enigo })
        }
    }

    fn key(name: KeyName) -> Key {
        match name {
            KeyName::Char(c) => Key::Unicode(c),
            KeyName::Enter => Key::Return,
            KeyName::Escape => Key::Escape,
            KeyName::Space => Key::Space,
            KeyName::Tab => Key::Tab,
            KeyName::Backspace => Key::Backspace,
            KeyName::Shift => Key::Shift,
            KeyName::Control => Key::Control,
            KeyName::Alt => Key::Alt,
            KeyName::Up => Key::UpArrow,
            KeyName::Down => Key::DownArrow,
            KeyName::Left => Key::LeftArrow,
            KeyName::Right => Key::RightArrow,
            KeyName::F(n) => match n {
                1 => Key::F1,
                2 => Key::F2,
                3 => Key::F3,
                4 => Key::F4,
                5 => Key::F5,
                6 => Key::F6,
                7 => Key::F7,
                8 => Key::F8,
                9 => Key::F9,
                10 => Key::F10,
                11 => Key::F11,
                _ => Key::F12,
            },
        }
    }

    impl InputBackend for EnigoBackend {
        fn name(&self) -> &'static str {
            "enigo"
        }

        fn key_down(&mut self, name: KeyName) -> Result<()> {
            self.enigo.key(key(name), Direction::Press)?;
            Ok(())
        }

        fn key_up(&mut self, name: KeyName) -> Result<()> {
            self.enigo.key(key(name), Direction::Release)?;
            Ok(())
        }

        fn move_relative(&mut self, dx: i32, dy: i32) -> Result<()> {
            self.enigo.move_mouse(dx, dy, Coordinate::Rel)?;
            Ok(())
        }

        fn move_to(&mut self, x: i32, y: i32) -> Result<()> {
            self.enigo.move_mouse(x, y, Coordinate::Abs)?;
            Ok(())
        }

        fn click(&mut self, button: MouseButton) -> Result<()> {
            let button = match button {
                MouseButton::Left => Button::Left,
                MouseButton::Right => Button::Right,
            };
            self.enigo.button(button, Direction::Click)?;
            Ok(())
        }

        fn type_text(&mut self, text: &str) -> Result<()> {
            self.enigo.text(text)?;
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_key_names() {
        assert_eq!(KeyName::parse("e"), Some(KeyName::Char('e')));
        assert_eq!(KeyName::parse("E"), Some(KeyName::Char('e')));
        assert_eq!(KeyName::parse("1"), Some(KeyName::Char('1')));
        assert_eq!(KeyName::parse("Esc"), Some(KeyName::Escape));
        assert_eq!(KeyName::parse("return"), Some(KeyName::Enter));
        assert_eq!(KeyName::parse("ctrl"), Some(KeyName::Control));
        assert_eq!(KeyName::parse("F8"), Some(KeyName::F(8)));
        assert_eq!(KeyName::parse("f12"), Some(KeyName::F(12)));
        assert_eq!(KeyName::parse("f13"), None);
        assert_eq!(KeyName::parse("f"), Some(KeyName::Char('f')));
        assert_eq!(KeyName::parse("fx"), None);
        assert_eq!(KeyName::parse("hyper"), None);
        assert_eq!(KeyName::parse(""), None);
    }

    #[test]
    fn test_display_round_trips() {
        for key in [
            KeyName::Char('q'),
            KeyName::Escape,
            KeyName::Backspace,
            KeyName::Up,
            KeyName::F(3),
        ] {
            assert_eq!(KeyName::parse(&key.to_string()), Some(key));
        }
    }

    #[test]
    fn test_unavailable_backend_refuses() {
        let mut backend = UnavailableBackend;
        assert!(!backend.is_available());
        assert!(backend.click(MouseButton::Left).is_err());
        assert!(backend.type_text("hi").is_err());
    }
}
