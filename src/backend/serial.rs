//! Serial port backend for the load cell link
//!
//! This module provides the real transport using the `serialport` crate:
//! port enumeration and a [`SerialLink`] whose reads time out after the
//! configured poll interval so the reader thread can observe a stop
//! request promptly.
//!
//! # Example
//!
//! ```ignore
//! use tensile_lab::backend::serial::{list_available_ports, SerialPortOpener};
//! use tensile_lab::backend::LinkOpener;
//! use tensile_lab::config::SerialSettings;
//!
//! for port in list_available_ports()? {
//!     println!("Found: {}", port);
//! }
//!
//! let link = SerialPortOpener.open(&port, &SerialSettings::default())?;
//! ```

use crate::backend::link::{LinkOpener, SerialLink};
use crate::config::SerialSettings;
use crate::error::{LabError, Result};
use crate::types::PortId;
use serialport::{SerialPort, SerialPortType};
use std::io::Read;

/// List the serial ports present on this machine
pub fn list_available_ports() -> Result<Vec<PortId>> {
    let ports = serialport::available_ports()?;
    Ok(ports
        .into_iter()
        .map(|info| {
            let port = PortId::new(info.port_name);
            match info.port_type {
                SerialPortType::UsbPort(usb) => {
                    let desc = usb
                        .product
                        .or(usb.manufacturer)
                        .unwrap_or_else(|| format!("USB {:04x}:{:04x}", usb.vid, usb.pid));
                    port.with_description(desc)
                }
                SerialPortType::BluetoothPort => port.with_description("Bluetooth"),
                SerialPortType::PciPort | SerialPortType::Unknown => port,
            }
        })
        .collect())
}

/// A serial port opened for reading samples
pub struct SerialPortLink {
    port: Box<dyn SerialPort>,
    name: String,
}

impl SerialPortLink {
    /// Open a port with the link settings
    pub fn open(port: &PortId, settings: &SerialSettings) -> Result<Self> {
        let serial = serialport::new(&port.name, settings.baud_rate)
            .timeout(settings.poll_interval())
            .open()
            .map_err(|e| LabError::Connect {
                port: port.name.clone(),
                message: e.to_string(),
            })?;

        tracing::info!(
            "Opened {} at {} baud (poll {:?})",
            port.name,
            settings.baud_rate,
            settings.poll_interval()
        );

        Ok(Self {
            port: serial,
            name: port.name.clone(),
        })
    }
}

impl Read for SerialPortLink {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.port.read(buf)
    }
}

impl SerialLink for SerialPortLink {
    fn port_name(&self) -> &str {
        &self.name
    }
}

impl Drop for SerialPortLink {
    fn drop(&mut self) {
        tracing::debug!("Released {}", self.name);
    }
}

/// Opens real serial ports
#[derive(Debug, Clone, Copy, Default)]
pub struct SerialPortOpener;

impl LinkOpener for SerialPortOpener {
    fn list_ports(&self) -> Result<Vec<PortId>> {
        list_available_ports()
    }

    fn open(&self, port: &PortId, settings: &SerialSettings) -> Result<Box<dyn SerialLink>> {
        Ok(Box::new(SerialPortLink::open(port, settings)?))
    }
}
