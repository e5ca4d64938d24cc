//! Native serial device backed by the `serialport` crate.
//!
//! Wraps `serialport::SerialPort` with our own `SerialDevice` trait so the
//! channel can be driven by real hardware or by the mock bus.

use super::error::PortError;
use super::traits::{DeviceOpener, EndpointConfig, ModemStatus, SerialDevice};
use serde::Serialize;
use std::io::{Read, Write};
use std::time::Duration;
use tracing::debug;

/// Serial device implementation wrapping `serialport::SerialPort`.
pub struct SyncSerialPort {
    /// The underlying serial port implementation.
    port: Box<dyn serialport::SerialPort>,
    /// The port name/path for identification.
    name: String,
}

impl SyncSerialPort {
    /// Open a serial port and apply the endpoint's line parameters.
    ///
    /// `poll_interval` becomes the port timeout, so every read and write
    /// returns within it.
    ///
    /// # Example
    /// ```no_run
    /// use comlink::port::{EndpointConfig, SyncSerialPort};
    /// use std::time::Duration;
    ///
    /// let config = EndpointConfig::new("/dev/ttyUSB0", 115200);
    /// let port = SyncSerialPort::open(&config, Duration::from_millis(50))?;
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn open(config: &EndpointConfig, poll_interval: Duration) -> Result<Self, PortError> {
        let parity: serialport::Parity = config.parity.try_into()?;
        let stop_bits: serialport::StopBits = config.stop_bits.try_into()?;
        let address = config.address.as_str();

        let mut port = serialport::new(address, config.baud_rate)
            .data_bits(config.data_bits.into())
            .flow_control(config.flow_control.into())
            .parity(parity)
            .stop_bits(stop_bits)
            .timeout(poll_interval)
            .open()
            .map_err(|e| match e.kind() {
                serialport::ErrorKind::NoDevice => PortError::not_found(address),
                serialport::ErrorKind::InvalidInput => PortError::invalid_config(e.to_string()),
                serialport::ErrorKind::Io(std::io::ErrorKind::PermissionDenied)
                | serialport::ErrorKind::Io(std::io::ErrorKind::AddrInUse) => {
                    PortError::InUse(address.to_string())
                }
                _ => PortError::Serial(e),
            })?;

        // RTS belongs to the driver under hardware handshake.
        if config.flow_control != super::traits::FlowControl::Hardware {
            port.write_request_to_send(config.rts)?;
        }
        port.write_data_terminal_ready(config.dtr)?;

        debug!(port = address, baud = config.baud_rate, "native serial port opened");
        Ok(Self {
            port,
            name: address.to_string(),
        })
    }

    /// Get a reference to the underlying serialport implementation.
    ///
    /// This can be useful for accessing platform-specific features.
    pub fn as_raw(&self) -> &dyn serialport::SerialPort {
        &*self.port
    }
}

impl SerialDevice for SyncSerialPort {
    fn name(&self) -> &str {
        &self.name
    }

    fn read_bytes(&mut self, buffer: &mut [u8]) -> Result<usize, PortError> {
        self.port.read(buffer).map_err(PortError::Io)
    }

    fn write_bytes(&mut self, data: &[u8]) -> Result<usize, PortError> {
        self.port.write(data).map_err(PortError::Io)
    }

    fn modem_status(&mut self) -> Result<ModemStatus, PortError> {
        Ok(ModemStatus {
            clear_to_send: self.port.read_clear_to_send()?,
            data_set_ready: self.port.read_data_set_ready()?,
            ring_indicator: self.port.read_ring_indicator()?,
            carrier_detect: self.port.read_carrier_detect()?,
        })
    }

    fn set_rts(&mut self, level: bool) -> Result<(), PortError> {
        self.port
            .write_request_to_send(level)
            .map_err(PortError::Serial)
    }

    fn set_dtr(&mut self, level: bool) -> Result<(), PortError> {
        self.port
            .write_data_terminal_ready(level)
            .map_err(PortError::Serial)
    }

    fn try_clone_device(&self) -> Result<Box<dyn SerialDevice>, PortError> {
        let port = self.port.try_clone()?;
        Ok(Box::new(Self {
            port,
            name: self.name.clone(),
        }))
    }
}

impl std::fmt::Debug for SyncSerialPort {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncSerialPort")
            .field("name", &self.name)
            .field("baud_rate", &self.port.baud_rate().ok())
            .finish()
    }
}

/// Opens endpoints through the operating system's serial driver.
#[derive(Debug, Default, Clone, Copy)]
pub struct NativeOpener;

impl DeviceOpener for NativeOpener {
    fn open(
        &self,
        config: &EndpointConfig,
        poll_interval: Duration,
    ) -> Result<Box<dyn SerialDevice>, PortError> {
        Ok(Box::new(SyncSerialPort::open(config, poll_interval)?))
    }
}

/// An addressable endpoint as reported by the operating system.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EndpointInfo {
    /// Address to put into `EndpointConfig::address`.
    pub id: String,
    /// Human readable description.
    pub label: String,
}

/// List the serial endpoints the OS currently exposes.
pub fn list_endpoints() -> Result<Vec<EndpointInfo>, PortError> {
    let ports = serialport::available_ports()?;
    Ok(ports
        .into_iter()
        .map(|info| {
            let label = match &info.port_type {
                serialport::SerialPortType::UsbPort(usb) => {
                    let product = usb.product.as_deref().unwrap_or("USB serial");
                    format!("{product} ({:04x}:{:04x})", usb.vid, usb.pid)
                }
                serialport::SerialPortType::BluetoothPort => "Bluetooth serial".to_string(),
                serialport::SerialPortType::PciPort => "PCI serial".to_string(),
                serialport::SerialPortType::Unknown => "Serial port".to_string(),
            };
            EndpointInfo {
                id: info.port_name,
                label,
            }
        })
        .collect())
}
