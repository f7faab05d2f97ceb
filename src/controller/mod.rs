//! Polling loop driving the dial
//!
//! 1. [`dial_controller`] - statum state machine owning the device and the mapping
//! 2. [`controller_handle`] - settings, run summary and the blocking task wrapper
//!
//! # Architecture
//!
//! ```text
//! Opening ──► Running ──► Closing ──► Terminated
//!    │          │  ▲
//!    │          └──┘ read ─► detect ─► emit
//!    └──────────────────────────────► (open failed)
//! ```
//!
//! The loop is single-threaded and blocking; the only wait is the bounded device read,
//! so a cancellation request is seen within one read timeout.

pub mod controller_handle;
pub mod dial_controller;

pub use controller_handle::{ControllerError, ControllerHandle, ControllerSettings, RunSummary};
pub use dial_controller::{ControllerState, DialController};
