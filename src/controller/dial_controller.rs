//! Dial controller with statum state machine
//!
//! ```text
//! Opening ──► Running ──► Closing ──► Terminated
//! ```
//!
//! The claimed device lives in a [`DeviceGuard`], so it is released exactly once
//! whichever way `Running` ends: cancellation, the abort read-error policy, or a
//! panic unwinding out of the loop.

use super::controller_handle::{ControllerError, ControllerSettings, RunSummary};
use crate::config::ReadErrorPolicy;
use crate::device::{DeviceGuard, ReadOutcome, ReportSource};
use crate::mapping::{EdgeDetector, KeyEmitter};
use statum::{machine, state};
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

/// Lifecycle of the polling loop
#[state]
#[derive(Debug, Clone)]
pub enum ControllerState {
    Opening,    // Looking up and claiming the device
    Running,    // Read → detect → emit
    Closing,    // Releasing the device
    Terminated, // Loop over
}

/// Outcome of a single loop iteration
enum Flow {
    Continue,
    Abort(ControllerError),
}

#[machine]
pub struct DialController<S: ControllerState> {
    settings: ControllerSettings,
    source: Box<dyn ReportSource>,
    device: Option<DeviceGuard>,
    detector: EdgeDetector,
    emitter: KeyEmitter,
    cancel: CancellationToken,
    summary: RunSummary,
    read_error_streak: u32,
    failure: Option<ControllerError>,
}

impl DialController<Opening> {
    pub fn create(
        settings: ControllerSettings,
        source: Box<dyn ReportSource>,
        emitter: KeyEmitter,
        cancel: CancellationToken,
    ) -> Self {
        debug!("Creating dial controller with settings: {:?}", settings);
        let detector = EdgeDetector::new(emitter.key_map().delay());

        Self::new(
            settings,
            source,
            None, // device
            detector,
            emitter,
            cancel,
            RunSummary::default(),
            0,    // read_error_streak
            None, // failure
        )
    }

    /// Claims the device and transitions to Running
    ///
    /// On failure nothing was claimed, so there is nothing to close.
    pub fn open(mut self) -> Result<DialController<Running>, ControllerError> {
        let identity = self.settings.identity;
        info!("Searching for device {}", identity);

        match self.source.open(identity) {
            Ok(handle) => {
                let guard = DeviceGuard::new(handle);
                let endpoint = guard.endpoint();
                info!(
                    "Device {} ready on interface {}, endpoint 0x{:02x} ({} byte reports)",
                    endpoint.identity,
                    endpoint.interface_number,
                    endpoint.endpoint_address,
                    endpoint.max_packet_size
                );
                self.device = Some(guard);
                Ok(self.transition())
            }
            Err(e) => {
                error!("Failed to open device {}: {}", identity, e);
                Err(ControllerError::Device(e))
            }
        }
    }
}

impl DialController<Running> {
    /// Reads one report and emits whatever it produced
    fn poll_once(&mut self) -> Flow {
        let timeout = self.settings.read_timeout;
        let outcome = match self.device.as_mut() {
            Some(device) => device.read(timeout),
            None => return Flow::Abort(ControllerError::NotOpen),
        };

        match outcome {
            ReadOutcome::Timeout => {
                // an idle read ends the error streak
                self.read_error_streak = 0;
                self.summary.timeouts += 1;
                trace!("Read timed out after {:?}", timeout);
                Flow::Continue
            }
            ReadOutcome::Report(report) => {
                self.read_error_streak = 0;
                self.summary.reports += 1;
                trace!("Received: {:?}", report);
                self.handle_report(&report);
                Flow::Continue
            }
            ReadOutcome::Failed(e) => {
                self.summary.read_errors += 1;
                match self.settings.read_error_policy {
                    ReadErrorPolicy::Abort => {
                        error!("Read failed, stopping: {}", e);
                        Flow::Abort(ControllerError::ReadFailed(e))
                    }
                    ReadErrorPolicy::Continue => {
                        if self.read_error_streak == 0 {
                            warn!("Read failed, continuing: {}", e);
                        } else {
                            debug!(
                                "Read failed ({} in a row): {}",
                                self.read_error_streak + 1,
                                e
                            );
                        }
                        self.read_error_streak = self.read_error_streak.saturating_add(1);
                        std::thread::sleep(self.settings.error_backoff);
                        Flow::Continue
                    }
                }
            }
        }
    }

    fn handle_report(&mut self, report: &[u8]) {
        let events = match self.detector.detect(report, Instant::now()) {
            Ok(events) => events,
            Err(e) => {
                self.summary.malformed_reports += 1;
                warn!("Skipping report {:?}: {}", report, e);
                return;
            }
        };

        for event in events.iter() {
            self.summary.events += 1;
            if let Err(e) = self.emitter.emit(event.direction()) {
                self.summary.injection_failures += 1;
                warn!("Failed to send {:?}: {}", event, e);
            }
        }
    }

    /// Polls until cancelled (or a read fails under the abort policy)
    pub fn run_until_cancelled(mut self) -> DialController<Closing> {
        info!("Starting to read data (press Ctrl+C to stop)");

        loop {
            if self.cancel.is_cancelled() {
                info!("Stop requested, leaving read loop");
                break;
            }
            if let Flow::Abort(e) = self.poll_once() {
                self.failure = Some(e);
                break;
            }
        }

        self.transition()
    }
}

impl DialController<Closing> {
    /// Releases the device and transitions to Terminated
    pub fn close(mut self) -> DialController<Terminated> {
        if let Some(mut device) = self.device.take() {
            device.release();
        }
        info!("Dial controller stopped: {}", self.summary);
        self.transition()
    }
}

impl DialController<Terminated> {
    /// Summary of the run, or the error that ended it
    pub fn finish(self) -> Result<RunSummary, ControllerError> {
        match self.failure {
            Some(e) => Err(e),
            None => Ok(self.summary),
        }
    }
}

/// Runs the whole lifecycle on the calling thread
pub fn run(
    settings: ControllerSettings,
    source: Box<dyn ReportSource>,
    emitter: KeyEmitter,
    cancel: CancellationToken,
) -> Result<RunSummary, ControllerError> {
    DialController::create(settings, source, emitter, cancel)
        .open()?
        .run_until_cancelled()
        .close()
        .finish()
}
