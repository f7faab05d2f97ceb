//! Report source for the rotary dial
//!
//! Opens the dial over libusb, claims its first interface and hands out fixed-size
//! input reports through a bounded-timeout read.
//!
//! # Architecture
//!
//! ```text
//! ReportSource::open ──► ReportHandle ──► DeviceGuard ──► Controller
//!   (find + claim)        (read/close)     (release once)
//! ```
//!
//! The [`ReportSource`]/[`ReportHandle`] split keeps the controller independent of
//! libusb, so the polling loop can be driven by in-memory doubles in tests.

pub mod diagnostics;
pub mod usb;

use std::fmt;
use std::time::Duration;
use tracing::{debug, info};

/// Vendor id of the supported dial
pub const DIAL_VENDOR_ID: u16 = 0x077d;

/// Product id of the supported dial
pub const DIAL_PRODUCT_ID: u16 = 0x0410;

/// Vendor/product pair identifying a USB device
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct DeviceIdentity {
    pub vendor_id: u16,
    pub product_id: u16,
}

impl DeviceIdentity {
    pub const fn new(vendor_id: u16, product_id: u16) -> Self {
        Self {
            vendor_id,
            product_id,
        }
    }

    /// The dial this bridge is built for
    pub const fn dial() -> Self {
        Self::new(DIAL_VENDOR_ID, DIAL_PRODUCT_ID)
    }
}

impl Default for DeviceIdentity {
    fn default() -> Self {
        Self::dial()
    }
}

impl fmt::Display for DeviceIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04x}:{:04x}", self.vendor_id, self.product_id)
    }
}

/// Attributes of an opened and claimed device
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EndpointInfo {
    pub identity: DeviceIdentity,
    pub interface_number: u8,
    pub endpoint_address: u8,
    pub max_packet_size: u16,
}

/// Errors raised while opening or reading the device
#[derive(Debug, thiserror::Error)]
pub enum DeviceError {
    /// Target device is not attached
    #[error("Device {0} not found")]
    NotFound(DeviceIdentity),

    /// The OS refused access to the device or its interface
    #[error("Access to device {identity} denied: {source}")]
    Access {
        identity: DeviceIdentity,
        #[source]
        source: rusb::Error,
    },

    /// The active configuration exposes no interface
    #[error("Device {0} exposes no interface")]
    NoInterface(DeviceIdentity),

    /// The first interface has no device-to-host endpoint
    #[error("No IN endpoint on interface {interface_number} of device {identity}")]
    NoInEndpoint {
        identity: DeviceIdentity,
        interface_number: u8,
    },

    /// Any other libusb failure
    #[error("USB error: {0}")]
    Usb(#[from] rusb::Error),
}

/// Tagged result of one bounded read
///
/// Timeouts are an expected outcome of polling a device that only reports on change,
/// so they are a variant of their own instead of an error.
#[derive(Debug)]
pub enum ReadOutcome {
    /// One raw input report, exactly as many bytes as the device delivered
    Report(Vec<u8>),
    /// Nothing arrived within the timeout
    Timeout,
    /// Low-level I/O failure other than a timeout
    Failed(DeviceError),
}

/// Locates and claims a device
pub trait ReportSource: Send {
    /// Opens the device, selects its IN endpoint and claims the interface exclusively
    ///
    /// On error nothing stays claimed.
    fn open(&mut self, identity: DeviceIdentity) -> Result<Box<dyn ReportHandle>, DeviceError>;
}

/// An opened, claimed device
pub trait ReportHandle: Send {
    /// Endpoint the reports are read from
    fn endpoint(&self) -> &EndpointInfo;

    /// Blocks for at most `timeout` waiting for one report
    fn read(&mut self, timeout: Duration) -> ReadOutcome;

    /// Releases the claimed interface and any cached resources
    ///
    /// Must be idempotent.
    fn close(&mut self);
}

/// Scoped ownership of a claimed device
///
/// Calls [`ReportHandle::close`] exactly once: from [`DeviceGuard::release`] or, on
/// any other exit path including a panic unwinding through the loop, from `Drop`.
pub struct DeviceGuard {
    handle: Box<dyn ReportHandle>,
    released: bool,
}

impl DeviceGuard {
    pub fn new(handle: Box<dyn ReportHandle>) -> Self {
        debug!("Guarding claimed device {}", handle.endpoint().identity);
        Self {
            handle,
            released: false,
        }
    }

    pub fn endpoint(&self) -> &EndpointInfo {
        self.handle.endpoint()
    }

    pub fn read(&mut self, timeout: Duration) -> ReadOutcome {
        self.handle.read(timeout)
    }

    /// Closes the device if it has not been closed yet
    pub fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        let endpoint = self.handle.endpoint();
        info!(
            "Releasing interface {} of device {}",
            endpoint.interface_number, endpoint.identity
        );
        self.handle.close();
    }
}

impl Drop for DeviceGuard {
    fn drop(&mut self) {
        self.release();
    }
}
