//! Toolkit independent input events and their interpretation

use std::time::{Duration, Instant};

use crate::config::{InputConfig, Point};

/// Keys the tool cares about
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Key {
    Char(char),
    Escape,
}

/// A pointer or keyboard event in canvas coordinates
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum InputEvent {
    PointerDown(Point),
    PointerMove(Point),
    PointerUp(Point),
    KeyPressed(Key),
}

/// What a key press asks for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    ToggleMarkers,
    Reset,
    Quit,
}

/// Maps key presses to commands
#[derive(Debug, Clone)]
pub struct KeyBindings {
    toggle: char,
    reset: char,
    quit: char,
}

impl KeyBindings {
    pub fn from_config(config: &InputConfig) -> Self {
        Self {
            toggle: config.toggle_key.to_ascii_lowercase(),
            reset: config.reset_key.to_ascii_lowercase(),
            quit: config.quit_key.to_ascii_lowercase(),
        }
    }

    pub fn command(&self, key: Key) -> Option<Command> {
        match key {
            Key::Escape => Some(Command::Quit),
            Key::Char(c) => {
                let c = c.to_ascii_lowercase();
                if c == self.quit {
                    Some(Command::Quit)
                } else if c == self.toggle {
                    Some(Command::ToggleMarkers)
                } else if c == self.reset {
                    Some(Command::Reset)
                } else {
                    None
                }
            }
        }
    }
}

/// Detects two presses close together in time and space
#[derive(Debug, Clone)]
pub struct ClickTracker {
    window: Duration,
    radius_sq: f64,
    last: Option<(Instant, Point)>,
}

impl ClickTracker {
    pub fn new(window: Duration, radius: f64) -> Self {
        Self {
            window,
            radius_sq: radius * radius,
            last: None,
        }
    }

    pub fn from_config(config: &InputConfig) -> Self {
        Self::new(
            Duration::from_millis(config.double_click_ms),
            config.double_click_radius,
        )
    }

    /// Record a press; true if it completes a double-click
    pub fn press(&mut self, at: Instant, pos: Point) -> bool {
        if let Some((when, where_)) = self.last {
            let in_time = at.saturating_duration_since(when) <= self.window;
            if in_time && pos.distance_squared(where_) <= self.radius_sq {
                // a third press starts a new sequence
                self.last = None;
                return true;
            }
        }
        self.last = Some((at, pos));
        false
    }
}
