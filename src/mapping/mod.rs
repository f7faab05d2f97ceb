//! Turns raw dial reports into key presses.
//!
//! ```text
//! RawReport ──► EdgeDetector ──► LogicalEvent ──► KeyEmitter ──► OS input
//!               (DialState)                       (KeyMap)
//! ```

pub mod edge_detector;
pub mod error;
pub mod keyboard;
pub mod keymap;

pub use edge_detector::{detect_edges, DetectedEvents, DialState, EdgeDetector};
pub use error::MappingError;
pub use keyboard::{KeyEmitter, KeyInjector};
pub use keymap::{KeyMap, KeySymbol};

use std::fmt;

/// Logical directions a key can be bound to
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Direction {
    Down,
    Up,
    Left,
    Right,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Down => write!(f, "Down"),
            Direction::Up => write!(f, "Up"),
            Direction::Left => write!(f, "Left"),
            Direction::Right => write!(f, "Right"),
        }
    }
}

/// Event derived from one report
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum LogicalEvent {
    ButtonDown,
    ButtonUp,
    RotateRight,
    RotateLeft,
}

impl LogicalEvent {
    /// Key map slot the event is sent through
    pub fn direction(self) -> Direction {
        match self {
            LogicalEvent::ButtonDown => Direction::Down,
            LogicalEvent::ButtonUp => Direction::Up,
            LogicalEvent::RotateRight => Direction::Right,
            LogicalEvent::RotateLeft => Direction::Left,
        }
    }
}
