//! Edge detection over successive dial reports
//!
//! Byte 0 carries the button level (0 = up, 1 = down). Byte 1 carries the rotation of
//! the report (1 = one tick right, 255 = one tick left, 0 = none). Button events fire on
//! level changes; rotation is sampled only once the rate-limit window has expired.
//!
//! Once the window expires it restarts on that iteration even when byte 1 is 0, so a
//! rotation arriving right after an idle report can still be swallowed.

use super::{LogicalEvent, MappingError};
use std::time::{Duration, Instant};
use tracing::trace;

/// Number of leading report bytes the detector reads
pub const REPORT_MIN_LEN: usize = 2;

const BUTTON_BYTE: usize = 0;
const ROTATION_BYTE: usize = 1;

const BUTTON_UP: u8 = 0;
const BUTTON_DOWN: u8 = 1;
const TICK_RIGHT: u8 = 1;
const TICK_LEFT: u8 = 255;

/// State carried from one report to the next
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DialState {
    /// Last seen value of report byte 0
    pub last_axis0_value: u8,
    /// When the rotation window last restarted; `None` until the first report
    pub last_rate_limit_timestamp: Option<Instant>,
}

impl DialState {
    fn window_expired(&self, now: Instant, delay: Duration) -> bool {
        match self.last_rate_limit_timestamp {
            None => true,
            Some(last) => now.saturating_duration_since(last) >= delay,
        }
    }
}

/// Events found in one report
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DetectedEvents {
    pub button: Option<LogicalEvent>,
    pub rotation: Option<LogicalEvent>,
}

impl DetectedEvents {
    /// Button event first, then rotation
    pub fn iter(&self) -> impl Iterator<Item = LogicalEvent> {
        self.button.into_iter().chain(self.rotation)
    }
}

/// Derives the events of `report` and the state for the next report
///
/// Reports shorter than [`REPORT_MIN_LEN`] are rejected without touching `state`.
pub fn detect_edges(
    report: &[u8],
    state: DialState,
    delay: Duration,
    now: Instant,
) -> Result<(DetectedEvents, DialState), MappingError> {
    if report.len() < REPORT_MIN_LEN {
        return Err(MappingError::MalformedReport {
            expected: REPORT_MIN_LEN,
            actual: report.len(),
        });
    }

    let mut next = state;
    let mut events = DetectedEvents::default();

    let level = report[BUTTON_BYTE];
    if level != state.last_axis0_value {
        // reserved levels update the state without an event
        next.last_axis0_value = level;
        events.button = match level {
            BUTTON_DOWN => Some(LogicalEvent::ButtonDown),
            BUTTON_UP => Some(LogicalEvent::ButtonUp),
            other => {
                trace!("Ignoring reserved button level {}", other);
                None
            }
        };
    }

    if state.window_expired(now, delay) {
        events.rotation = match report[ROTATION_BYTE] {
            TICK_RIGHT => Some(LogicalEvent::RotateRight),
            TICK_LEFT => Some(LogicalEvent::RotateLeft),
            _ => None,
        };
        next.last_rate_limit_timestamp = Some(now);
    }

    Ok((events, next))
}

/// [`detect_edges`] with the state kept in place
#[derive(Clone, Debug)]
pub struct EdgeDetector {
    delay: Duration,
    state: DialState,
}

impl EdgeDetector {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            state: DialState::default(),
        }
    }

    pub fn state(&self) -> &DialState {
        &self.state
    }

    /// Feeds one report observed at `now`
    pub fn detect(&mut self, report: &[u8], now: Instant) -> Result<DetectedEvents, MappingError> {
        let (events, next) = detect_edges(report, self.state, self.delay, now)?;
        self.state = next;
        Ok(events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DELAY: Duration = Duration::from_millis(200);

    fn ms(base: Instant, offset: u64) -> Instant {
        base + Duration::from_millis(offset)
    }

    #[test]
    fn alternating_button_emits_one_event_per_change() {
        let base = Instant::now();
        let mut detector = EdgeDetector::new(DELAY);
        let levels = [1u8, 1, 0, 0, 0, 1, 0, 1, 1];
        let mut buttons = Vec::new();

        for (i, level) in levels.iter().enumerate() {
            let events = detector.detect(&[*level, 0], ms(base, i as u64)).unwrap();
            buttons.extend(events.button);
        }

        assert_eq!(
            buttons,
            vec![
                LogicalEvent::ButtonDown,
                LogicalEvent::ButtonUp,
                LogicalEvent::ButtonDown,
                LogicalEvent::ButtonUp,
                LogicalEvent::ButtonDown,
            ]
        );
    }

    #[test]
    fn reserved_level_updates_state_silently() {
        let base = Instant::now();
        let mut detector = EdgeDetector::new(DELAY);

        let events = detector.detect(&[7, 0], base).unwrap();
        assert_eq!(events.button, None);
        assert_eq!(detector.state().last_axis0_value, 7);

        // 7 -> 0 is still a change, so the release is reported
        let events = detector.detect(&[0, 0], ms(base, 1)).unwrap();
        assert_eq!(events.button, Some(LogicalEvent::ButtonUp));
    }

    #[test]
    fn rotation_is_rate_limited_per_window() {
        let base = Instant::now();
        let mut detector = EdgeDetector::new(DELAY);
        let mut rights = Vec::new();

        // a right tick every 50ms for one second
        for step in 0..20u64 {
            let now = ms(base, step * 50);
            if detector.detect(&[0, 1], now).unwrap().rotation.is_some() {
                rights.push(step * 50);
            }
        }

        assert_eq!(rights, vec![0, 200, 400, 600, 800]);
    }

    #[test]
    fn idle_report_restarts_expired_window() {
        let base = Instant::now();
        let mut detector = EdgeDetector::new(DELAY);

        // expired on first report, restarted by a report without rotation
        let events = detector.detect(&[0, 0], base).unwrap();
        assert_eq!(events, DetectedEvents::default());
        assert_eq!(detector.state().last_rate_limit_timestamp, Some(base));

        let events = detector.detect(&[0, 1], ms(base, 150)).unwrap();
        assert_eq!(events.rotation, None);

        let events = detector.detect(&[0, 255], ms(base, 250)).unwrap();
        assert_eq!(events.rotation, Some(LogicalEvent::RotateLeft));
    }

    #[test]
    fn unknown_rotation_values_are_ignored() {
        let base = Instant::now();
        let (events, next) = detect_edges(&[0, 2], DialState::default(), DELAY, base).unwrap();
        assert_eq!(events.rotation, None);
        assert_eq!(next.last_rate_limit_timestamp, Some(base));
    }

    #[test]
    fn short_report_is_rejected_without_state_change() {
        let base = Instant::now();
        let mut detector = EdgeDetector::new(DELAY);
        detector.detect(&[1, 0], base).unwrap();
        let before = *detector.state();

        let err = detector.detect(&[0], ms(base, 500)).unwrap_err();
        assert!(matches!(
            err,
            MappingError::MalformedReport {
                expected: 2,
                actual: 1
            }
        ));
        assert_eq!(*detector.state(), before);
    }

    #[test]
    fn zero_delay_never_limits() {
        let base = Instant::now();
        let mut detector = EdgeDetector::new(Duration::ZERO);
        for step in 0..5u64 {
            let events = detector.detect(&[0, 1], ms(base, step)).unwrap();
            assert_eq!(events.rotation, Some(LogicalEvent::RotateRight));
        }
    }

    #[test]
    fn button_and_rotation_in_one_report() {
        let base = Instant::now();
        let (events, _) = detect_edges(&[1, 255], DialState::default(), DELAY, base).unwrap();
        assert_eq!(
            events.iter().collect::<Vec<_>>(),
            vec![LogicalEvent::ButtonDown, LogicalEvent::RotateLeft]
        );
    }

    #[test]
    fn press_and_release_scenario() {
        let base = Instant::now();
        let mut detector = EdgeDetector::new(DELAY);
        let reports: [[u8; 2]; 4] = [[0, 0], [1, 0], [1, 1], [0, 1]];
        let mut seen = Vec::new();

        for (i, report) in reports.iter().enumerate() {
            let events = detector.detect(report, ms(base, i as u64 * 50)).unwrap();
            seen.extend(events.iter());
        }

        assert_eq!(seen, vec![LogicalEvent::ButtonDown, LogicalEvent::ButtonUp]);
    }
}
