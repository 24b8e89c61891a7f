//! Cross-platform mouse and keyboard input using enigo
//!
//! Foreground-only: events go to whatever window currently has focus.

use enigo::{Axis, Button, Coordinate, Direction, Enigo, Key, Keyboard, Mouse, Settings};
use std::thread;
use std::time::Duration;

use super::keys::{KeyCombo, Modifier};
use super::types::MouseButton;

/// Input controller for mouse and keyboard simulation
pub struct InputController {
    enigo: Enigo,
}

impl InputController {
    /// Open a connection to the platform input system
    pub fn new() -> anyhow::Result<Self> {
        let enigo = Enigo::new(&Settings::default())
            .map_err(|e| anyhow::anyhow!("Failed to create input controller: {:?}", e))?;
        Ok(Self { enigo })
    }

    // ============ Queries ============

    pub fn location(&self) -> anyhow::Result<(i32, i32)> {
        self.enigo
            .location()
            .map_err(|e| anyhow::anyhow!("Failed to query cursor position: {:?}", e))
    }

    pub fn main_display(&self) -> anyhow::Result<(i32, i32)> {
        self.enigo
            .main_display()
            .map_err(|e| anyhow::anyhow!("Failed to query display size: {:?}", e))
    }

    // ============ Mouse Operations ============

    /// Move mouse to absolute screen coordinates
    pub fn move_mouse(&mut self, x: i32, y: i32) -> anyhow::Result<()> {
        self.enigo
            .move_mouse(x, y, Coordinate::Abs)
            .map_err(|e| anyhow::anyhow!("Failed to move mouse: {:?}", e))
    }

    /// Click at the current mouse position
    pub fn click(&mut self, button: MouseButton) -> anyhow::Result<()> {
        self.enigo
            .button(to_enigo_button(button), Direction::Click)
            .map_err(|e| anyhow::anyhow!("Failed to click: {:?}", e))
    }

    /// Click at specific coordinates
    pub fn click_at(&mut self, x: i32, y: i32, button: MouseButton) -> anyhow::Result<()> {
        self.move_mouse(x, y)?;
        thread::sleep(Duration::from_millis(50));
        self.click(button)
    }

    /// Double-click at specific coordinates
    pub fn double_click_at(&mut self, x: i32, y: i32) -> anyhow::Result<()> {
        self.move_mouse(x, y)?;
        thread::sleep(Duration::from_millis(50));
        self.click(MouseButton::Left)?;
        thread::sleep(Duration::from_millis(50));
        self.click(MouseButton::Left)
    }

    fn mouse_down(&mut self, button: MouseButton) -> anyhow::Result<()> {
        self.enigo
            .button(to_enigo_button(button), Direction::Press)
            .map_err(|e| anyhow::anyhow!("Failed to press mouse button: {:?}", e))
    }

    fn mouse_up(&mut self, button: MouseButton) -> anyhow::Result<()> {
        self.enigo
            .button(to_enigo_button(button), Direction::Release)
            .map_err(|e| anyhow::anyhow!("Failed to release mouse button: {:?}", e))
    }

    /// Scroll the wheel; positive amounts scroll up
    pub fn scroll(&mut self, amount: i32) -> anyhow::Result<()> {
        // enigo treats positive lengths as "down"
        self.enigo
            .scroll(-amount, Axis::Vertical)
            .map_err(|e| anyhow::anyhow!("Failed to scroll: {:?}", e))
    }

    /// Drag from one point to another with the left button held
    pub fn drag(&mut self, from_x: i32, from_y: i32, to_x: i32, to_y: i32) -> anyhow::Result<()> {
        self.move_mouse(from_x, from_y)?;
        thread::sleep(Duration::from_millis(50));
        self.mouse_down(MouseButton::Left)?;
        thread::sleep(Duration::from_millis(50));
        self.move_mouse(to_x, to_y)?;
        thread::sleep(Duration::from_millis(50));
        self.mouse_up(MouseButton::Left)
    }

    // ============ Keyboard Operations ============

    /// Type text string
    pub fn type_text(&mut self, text: &str) -> anyhow::Result<()> {
        self.enigo
            .text(text)
            .map_err(|e| anyhow::anyhow!("Failed to type text: {:?}", e))
    }

    /// Press a parsed key combination (modifiers held around the main key)
    pub fn key_combo(&mut self, combo: &KeyCombo) -> anyhow::Result<()> {
        let key = enigo_key(combo.key())
            .ok_or_else(|| anyhow::anyhow!("Unknown key: {}", combo.key()))?;

        for modifier in combo.modifiers() {
            self.key(modifier_key(*modifier), Direction::Press)?;
        }
        if !combo.modifiers().is_empty() {
            thread::sleep(Duration::from_millis(20));
        }

        let pressed = self.key(key, Direction::Click);

        // Always release modifiers, even if the main key failed
        for modifier in combo.modifiers().iter().rev() {
            self.key(modifier_key(*modifier), Direction::Release)?;
        }
        pressed
    }

    fn key(&mut self, key: Key, direction: Direction) -> anyhow::Result<()> {
        self.enigo
            .key(key, direction)
            .map_err(|e| anyhow::anyhow!("Failed to press key: {:?}", e))
    }
}

fn to_enigo_button(button: MouseButton) -> Button {
    match button {
        MouseButton::Left => Button::Left,
        MouseButton::Right => Button::Right,
        MouseButton::Middle => Button::Middle,
    }
}

fn modifier_key(modifier: Modifier) -> Key {
    match modifier {
        Modifier::Command => Key::Meta,
        Modifier::Shift => Key::Shift,
        Modifier::Option => Key::Alt,
        Modifier::Control => Key::Control,
    }
}

/// Map a canonical key name (see [`super::keys::canonical_key`]) to enigo
pub fn enigo_key(name: &str) -> Option<Key> {
    let mut chars = name.chars();
    if let (Some(c), None) = (chars.next(), chars.next()) {
        return Some(Key::Unicode(c));
    }

    let key = match name {
        "f1" => Key::F1,
        "f2" => Key::F2,
        "f3" => Key::F3,
        "f4" => Key::F4,
        "f5" => Key::F5,
        "f6" => Key::F6,
        "f7" => Key::F7,
        "f8" => Key::F8,
        "f9" => Key::F9,
        "f10" => Key::F10,
        "f11" => Key::F11,
        "f12" => Key::F12,

        "command" => Key::Meta,
        "shift" => Key::Shift,
        "option" => Key::Alt,
        "control" => Key::Control,

        "up" => Key::UpArrow,
        "down" => Key::DownArrow,
        "left" => Key::LeftArrow,
        "right" => Key::RightArrow,
        "home" => Key::Home,
        "end" => Key::End,
        "pageup" => Key::PageUp,
        "pagedown" => Key::PageDown,

        "backspace" => Key::Backspace,
        "delete" => Key::Delete,
        "return" => Key::Return,
        "tab" => Key::Tab,
        "escape" => Key::Escape,
        "space" => Key::Space,
        "capslock" => Key::CapsLock,
        _ => return None,
    };
    Some(key)
}
