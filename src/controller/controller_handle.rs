//! Controller Handle - runs the dial controller off the async runtime
//!
//! The polling loop blocks on device reads, so it runs on tokio's blocking pool. The
//! handle keeps the cancellation token and the task, giving callers a way to request
//! a stop and wait for the device to be released.

use super::dial_controller;
use crate::config::{ConfigError, ReadErrorPolicy, Settings};
use crate::device::{DeviceError, DeviceIdentity, ReportSource};
use crate::mapping::KeyEmitter;
use chrono::{DateTime, Local};
use std::fmt;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Configuration of the polling loop
///
/// # Examples
///
/// ```rust,ignore
/// use dial2key::controller::ControllerSettings;
/// use std::time::Duration;
///
/// let settings = ControllerSettings {
///     read_timeout: Duration::from_millis(250),
///     ..ControllerSettings::default()
/// };
/// ```
#[derive(Clone, Debug)]
pub struct ControllerSettings {
    /// Device to open
    pub identity: DeviceIdentity,

    /// Upper bound for a single read, and so for the reaction time to a stop request
    pub read_timeout: Duration,

    /// What to do after a read error that is not a timeout
    pub read_error_policy: ReadErrorPolicy,

    /// Pause after a read error before the next read
    pub error_backoff: Duration,
}

impl Default for ControllerSettings {
    fn default() -> Self {
        Self {
            identity: DeviceIdentity::dial(),
            read_timeout: Duration::from_millis(crate::config::DEFAULT_READ_TIMEOUT_MS),
            read_error_policy: ReadErrorPolicy::Continue,
            error_backoff: Duration::from_millis(50),
        }
    }
}

impl ControllerSettings {
    /// Takes the read timeout and error policy from the settings file
    pub fn from_settings(settings: &Settings) -> Result<Self, ConfigError> {
        Ok(Self {
            read_timeout: settings.read_timeout()?,
            read_error_policy: settings.read_error_policy(),
            ..Self::default()
        })
    }
}

/// Errors that end a controller run
#[derive(Debug, thiserror::Error)]
pub enum ControllerError {
    /// Opening or claiming the device failed
    #[error("Device error: {0}")]
    Device(#[from] DeviceError),

    /// A read failed under the abort policy
    #[error("Read failed: {0}")]
    ReadFailed(#[source] DeviceError),

    /// Polling was attempted without a claimed device
    #[error("Device is not open")]
    NotOpen,

    /// The blocking task died
    #[error("Thread error: {0}")]
    ThreadError(String),
}

/// Counters collected over one run
#[derive(Clone, Debug)]
pub struct RunSummary {
    pub started_at: DateTime<Local>,
    pub reports: u64,
    pub events: u64,
    pub timeouts: u64,
    pub read_errors: u64,
    pub malformed_reports: u64,
    pub injection_failures: u64,
}

impl Default for RunSummary {
    fn default() -> Self {
        Self {
            started_at: Local::now(),
            reports: 0,
            events: 0,
            timeouts: 0,
            read_errors: 0,
            malformed_reports: 0,
            injection_failures: 0,
        }
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let elapsed = Local::now() - self.started_at;
        write!(
            f,
            "{} reports, {} events, {} timeouts, {} read errors, {} malformed, \
             {} failed injections in {}s (since {})",
            self.reports,
            self.events,
            self.timeouts,
            self.read_errors,
            self.malformed_reports,
            self.injection_failures,
            elapsed.num_seconds(),
            self.started_at.format("%H:%M:%S")
        )
    }
}

/// Handle to a dial controller running on the blocking pool
pub struct ControllerHandle {
    cancel: CancellationToken,
    task: Option<JoinHandle<Result<RunSummary, ControllerError>>>,
}

impl ControllerHandle {
    /// Starts the full lifecycle (open, poll, close) on a blocking task
    ///
    /// Cancelling `cancel` ends the loop within one read timeout.
    pub fn spawn(
        settings: ControllerSettings,
        source: Box<dyn ReportSource>,
        emitter: KeyEmitter,
        cancel: CancellationToken,
    ) -> Self {
        info!("Spawning dial controller for {}", settings.identity);
        let token = cancel.clone();
        let task = tokio::task::spawn_blocking(move || {
            dial_controller::run(settings, source, emitter, token)
        });
        debug!("Blocking task spawned");

        Self {
            cancel,
            task: Some(task),
        }
    }

    /// Token that stops the loop when cancelled; also used for Ctrl+C
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Waits for the controller to finish on its own or through the token
    pub async fn join(&mut self) -> Result<RunSummary, ControllerError> {
        let Some(task) = self.task.take() else {
            warn!("Dial controller already joined");
            return Err(ControllerError::ThreadError("already joined".to_string()));
        };

        match task.await {
            Ok(result) => {
                debug!("Dial controller task completed");
                result
            }
            Err(e) => {
                error!("Dial controller task panicked: {}", e);
                Err(ControllerError::ThreadError(format!(
                    "Dial controller task panicked: {}",
                    e
                )))
            }
        }
    }
}
