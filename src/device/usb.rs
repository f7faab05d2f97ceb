//! libusb-backed report source

use super::{DeviceError, DeviceIdentity, EndpointInfo, ReadOutcome, ReportHandle, ReportSource};
use rusb::{Device, DeviceHandle, Direction, GlobalContext, TransferType, UsbContext};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Opens devices through the global libusb context
#[derive(Debug, Default)]
pub struct UsbReportSource;

impl UsbReportSource {
    pub fn new() -> Self {
        Self
    }
}

impl ReportSource for UsbReportSource {
    fn open(&mut self, identity: DeviceIdentity) -> Result<Box<dyn ReportHandle>, DeviceError> {
        let device = find_device(&GlobalContext::default(), identity)?;
        Ok(Box::new(UsbDial::claim(device, identity)?))
    }
}

/// Returns the first attached device matching `identity`
pub fn find_device<T: UsbContext>(
    context: &T,
    identity: DeviceIdentity,
) -> Result<Device<T>, DeviceError> {
    for device in context.devices()?.iter() {
        let descriptor = match device.device_descriptor() {
            Ok(d) => d,
            Err(e) => {
                debug!(
                    "Skipping device on bus {} address {}: {}",
                    device.bus_number(),
                    device.address(),
                    e
                );
                continue;
            }
        };
        if descriptor.vendor_id() == identity.vendor_id
            && descriptor.product_id() == identity.product_id
        {
            debug!(
                "Found {} on bus {} address {}",
                identity,
                device.bus_number(),
                device.address()
            );
            return Ok(device);
        }
    }
    Err(DeviceError::NotFound(identity))
}

/// The dial with its first interface claimed
pub struct UsbDial {
    handle: Option<DeviceHandle<GlobalContext>>,
    endpoint: EndpointInfo,
    transfer_type: TransferType,
    buffer: Vec<u8>,
}

impl UsbDial {
    /// Configures the device and claims its first interface
    ///
    /// The interface is claimed last, so every earlier failure leaves nothing to undo
    /// beyond dropping the libusb handle.
    pub fn claim(
        device: Device<GlobalContext>,
        identity: DeviceIdentity,
    ) -> Result<Self, DeviceError> {
        let mut handle = device.open().map_err(|e| access_or_usb(identity, e))?;

        match handle.set_auto_detach_kernel_driver(true) {
            Ok(()) => debug!("Kernel driver auto-detach enabled"),
            Err(rusb::Error::NotSupported) => debug!("Kernel driver auto-detach not supported"),
            Err(e) => warn!("Could not enable kernel driver auto-detach: {}", e),
        }

        let config = device.config_descriptor(0)?;
        let wanted = config.number();
        let active = handle.active_configuration().unwrap_or(0);
        if active != wanted {
            handle
                .set_active_configuration(wanted)
                .map_err(|e| access_or_usb(identity, e))?;
        }
        info!("Device configuration {} set", wanted);

        let setting = config
            .interfaces()
            .next()
            .and_then(|interface| interface.descriptors().next())
            .ok_or(DeviceError::NoInterface(identity))?;
        let interface_number = setting.interface_number();

        let in_endpoint = setting
            .endpoint_descriptors()
            .find(|ep| ep.direction() == Direction::In)
            .ok_or(DeviceError::NoInEndpoint {
                identity,
                interface_number,
            })?;
        info!(
            "Found IN endpoint 0x{:02x} ({:?}, {} bytes)",
            in_endpoint.address(),
            in_endpoint.transfer_type(),
            in_endpoint.max_packet_size()
        );

        handle
            .claim_interface(interface_number)
            .map_err(|e| access_or_usb(identity, e))?;
        info!("Claimed interface {}", interface_number);

        let max_packet_size = in_endpoint.max_packet_size();
        Ok(Self {
            handle: Some(handle),
            endpoint: EndpointInfo {
                identity,
                interface_number,
                endpoint_address: in_endpoint.address(),
                max_packet_size,
            },
            transfer_type: in_endpoint.transfer_type(),
            buffer: vec![0; usize::from(max_packet_size.max(1))],
        })
    }
}

impl ReportHandle for UsbDial {
    fn endpoint(&self) -> &EndpointInfo {
        &self.endpoint
    }

    fn read(&mut self, timeout: Duration) -> ReadOutcome {
        let Some(handle) = self.handle.as_ref() else {
            return ReadOutcome::Failed(DeviceError::Usb(rusb::Error::NoDevice));
        };

        let address = self.endpoint.endpoint_address;
        let result = match self.transfer_type {
            TransferType::Bulk => handle.read_bulk(address, &mut self.buffer, timeout),
            _ => handle.read_interrupt(address, &mut self.buffer, timeout),
        };

        match result {
            Ok(size) => ReadOutcome::Report(self.buffer[..size].to_vec()),
            Err(rusb::Error::Timeout) => ReadOutcome::Timeout,
            Err(e) => ReadOutcome::Failed(DeviceError::Usb(e)),
        }
    }

    fn close(&mut self) {
        let Some(mut handle) = self.handle.take() else {
            return;
        };
        let interface = self.endpoint.interface_number;
        match handle.release_interface(interface) {
            Ok(()) => info!("Released interface {}", interface),
            Err(e) => warn!("Failed to release interface {}: {}", interface, e),
        }
        drop(handle);
        info!("Device resources disposed");
    }
}

impl Drop for UsbDial {
    fn drop(&mut self) {
        self.close();
    }
}

fn access_or_usb(identity: DeviceIdentity, error: rusb::Error) -> DeviceError {
    match error {
        rusb::Error::Access => DeviceError::Access {
            identity,
            source: error,
        },
        rusb::Error::NoDevice | rusb::Error::NotFound => DeviceError::NotFound(identity),
        other => DeviceError::Usb(other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn access_errors_are_classified() {
        let identity = DeviceIdentity::dial();
        assert!(matches!(
            access_or_usb(identity, rusb::Error::Access),
            DeviceError::Access { .. }
        ));
        assert!(matches!(
            access_or_usb(identity, rusb::Error::NoDevice),
            DeviceError::NotFound(_)
        ));
        assert!(matches!(
            access_or_usb(identity, rusb::Error::Busy),
            DeviceError::Usb(rusb::Error::Busy)
        ));
    }
}
