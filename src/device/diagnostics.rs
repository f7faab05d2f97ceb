//! Descriptor listing for attached USB devices
//!
//! Informational only: per-device failures are recorded on the summary and never
//! abort the enumeration of the remaining devices.

use super::usb::find_device;
use super::{DeviceError, DeviceIdentity};
use rusb::{Device, UsbContext};
use std::fmt;
use std::time::Duration;
use tracing::{debug, warn};

const STRING_TIMEOUT: Duration = Duration::from_millis(200);

/// Descriptor fields of one device
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DeviceSummary {
    pub vendor_id: u16,
    pub product_id: u16,
    pub bus_number: u8,
    pub address: u8,
    pub manufacturer: Option<String>,
    pub product: Option<String>,
    pub serial_number: Option<String>,
    /// Why the string descriptors could not be read, if they could not
    pub string_error: Option<String>,
}

impl fmt::Display for DeviceSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Vendor ID: 0x{:04x}", self.vendor_id)?;
        writeln!(f, "Product ID: 0x{:04x}", self.product_id)?;
        writeln!(f, "Bus {:03} Address {:03}", self.bus_number, self.address)?;
        if let Some(manufacturer) = &self.manufacturer {
            writeln!(f, "Manufacturer: {}", manufacturer)?;
        }
        if let Some(product) = &self.product {
            writeln!(f, "Product: {}", product)?;
        }
        if let Some(serial) = &self.serial_number {
            writeln!(f, "Serial Number: {}", serial)?;
        }
        if let Some(error) = &self.string_error {
            writeln!(
                f,
                "Could not read string descriptors for device 0x{:04x}:0x{:04x}. Error: {}",
                self.vendor_id, self.product_id, error
            )?;
        }
        write!(f, "{}", "-".repeat(30))
    }
}

/// Summarizes a single device, tolerating string descriptor failures
pub fn summarize<T: UsbContext>(device: &Device<T>) -> Result<DeviceSummary, DeviceError> {
    let descriptor = device.device_descriptor()?;
    let mut summary = DeviceSummary {
        vendor_id: descriptor.vendor_id(),
        product_id: descriptor.product_id(),
        bus_number: device.bus_number(),
        address: device.address(),
        ..DeviceSummary::default()
    };

    let handle = match device.open() {
        Ok(handle) => handle,
        Err(e) => {
            debug!(
                "Cannot open {:04x}:{:04x} for string descriptors: {}",
                summary.vendor_id, summary.product_id, e
            );
            summary.string_error = Some(e.to_string());
            return Ok(summary);
        }
    };

    let language = match handle.read_languages(STRING_TIMEOUT) {
        Ok(languages) => languages.into_iter().next(),
        Err(e) => {
            summary.string_error = Some(e.to_string());
            return Ok(summary);
        }
    };
    let Some(language) = language else {
        return Ok(summary);
    };

    let mut first_error = None;
    let mut read = |result: rusb::Result<String>| match result {
        Ok(text) if !text.is_empty() => Some(text),
        Ok(_) => None,
        Err(e) => {
            first_error.get_or_insert(e.to_string());
            None
        }
    };

    if descriptor.manufacturer_string_index().is_some() {
        summary.manufacturer = read(handle.read_manufacturer_string(
            language,
            &descriptor,
            STRING_TIMEOUT,
        ));
    }
    if descriptor.product_string_index().is_some() {
        summary.product = read(handle.read_product_string(language, &descriptor, STRING_TIMEOUT));
    }
    if descriptor.serial_number_string_index().is_some() {
        summary.serial_number = read(handle.read_serial_number_string(
            language,
            &descriptor,
            STRING_TIMEOUT,
        ));
    }
    summary.string_error = first_error;

    Ok(summary)
}

/// Summaries of every attached device
pub fn list_devices() -> Result<Vec<DeviceSummary>, DeviceError> {
    let devices = rusb::devices()?;
    let mut summaries = Vec::with_capacity(devices.len());
    for device in devices.iter() {
        match summarize(&device) {
            Ok(summary) => summaries.push(summary),
            Err(e) => warn!(
                "Skipping device on bus {} address {}: {}",
                device.bus_number(),
                device.address(),
                e
            ),
        }
    }
    Ok(summaries)
}

/// Summary of the device matching `identity`
pub fn describe(identity: DeviceIdentity) -> Result<DeviceSummary, DeviceError> {
    let device = find_device(&rusb::GlobalContext::default(), identity)?;
    summarize(&device)
}

/// Prints every attached device to stdout
pub fn print_all() -> Result<(), DeviceError> {
    let summaries = list_devices()?;
    if summaries.is_empty() {
        println!("No USB devices found.");
        return Ok(());
    }
    println!("--- Connected USB Devices ---");
    for summary in summaries {
        println!("{}", summary);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn summary_prints_present_strings_only() {
        let summary = DeviceSummary {
            vendor_id: 0x077d,
            product_id: 0x0410,
            bus_number: 1,
            address: 7,
            manufacturer: Some("Griffin Technology".into()),
            product: None,
            serial_number: None,
            string_error: None,
        };
        let text = summary.to_string();
        assert!(text.contains("Vendor ID: 0x077d"));
        assert!(text.contains("Product ID: 0x0410"));
        assert!(text.contains("Manufacturer: Griffin Technology"));
        assert!(!text.contains("Product:"));
        assert!(text.ends_with(&"-".repeat(30)));
    }

    #[test]
    fn summary_reports_string_errors() {
        let summary = DeviceSummary {
            vendor_id: 0x1234,
            product_id: 0x5678,
            string_error: Some("Access denied (insufficient permissions)".into()),
            ..DeviceSummary::default()
        };
        assert!(summary
            .to_string()
            .contains("Could not read string descriptors for device 0x1234:0x5678"));
    }
}
