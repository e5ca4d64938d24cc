//! Core traits and value types for the serial channel.
//!
//! Defines the `SerialDevice` trait that lets both real serial ports and the
//! in-process mock bus sit underneath a `PortChannel`, plus the endpoint
//! configuration handed to `PortChannel::open`.

use super::error::PortError;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// Line parameters for one serial endpoint.
///
/// Immutable once passed to `PortChannel::open`; the channel keeps its own copy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointConfig {
    /// System path or name of the endpoint ("COM3", "/dev/ttyUSB0").
    pub address: String,

    /// Baud rate (bits per second).
    pub baud_rate: u32,

    /// Number of data bits (5, 6, 7, or 8).
    #[serde(default)]
    pub data_bits: DataBits,

    /// Parity checking mode.
    #[serde(default)]
    pub parity: Parity,

    /// Number of stop bits.
    #[serde(default)]
    pub stop_bits: StopBits,

    /// Flow control mode.
    #[serde(default)]
    pub flow_control: FlowControl,

    /// Initial RTS line level. Ignored under hardware flow control.
    #[serde(default)]
    pub rts: bool,

    /// Initial DTR line level.
    #[serde(default)]
    pub dtr: bool,
}

impl EndpointConfig {
    /// 8N1, no flow control, RTS/DTR low.
    pub fn new(address: impl Into<String>, baud_rate: u32) -> Self {
        Self {
            address: address.into(),
            baud_rate,
            data_bits: DataBits::default(),
            parity: Parity::default(),
            stop_bits: StopBits::default(),
            flow_control: FlowControl::default(),
            rts: false,
            dtr: false,
        }
    }

    /// Range sanity only. Whether the device accepts the combination is
    /// decided when the line parameters are applied.
    pub fn validate(&self) -> Result<(), PortError> {
        if self.address.trim().is_empty() {
            return Err(PortError::invalid_config("endpoint address is empty"));
        }
        if self.baud_rate == 0 {
            return Err(PortError::invalid_config(
                "baud rate must be greater than zero",
            ));
        }
        Ok(())
    }
}

/// Number of data bits per character.
///
/// Serialized as the plain integer so configuration files can say `data_bits = 7`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum DataBits {
    Five,
    Six,
    Seven,
    #[default]
    Eight,
}

impl TryFrom<u8> for DataBits {
    type Error = PortError;

    fn try_from(bits: u8) -> Result<Self, Self::Error> {
        match bits {
            5 => Ok(Self::Five),
            6 => Ok(Self::Six),
            7 => Ok(Self::Seven),
            8 => Ok(Self::Eight),
            other => Err(PortError::invalid_config(format!(
                "data bits must be between 5 and 8, got {other}"
            ))),
        }
    }
}

impl From<DataBits> for u8 {
    fn from(bits: DataBits) -> Self {
        match bits {
            DataBits::Five => 5,
            DataBits::Six => 6,
            DataBits::Seven => 7,
            DataBits::Eight => 8,
        }
    }
}

impl From<DataBits> for serialport::DataBits {
    fn from(bits: DataBits) -> Self {
        match bits {
            DataBits::Five => serialport::DataBits::Five,
            DataBits::Six => serialport::DataBits::Six,
            DataBits::Seven => serialport::DataBits::Seven,
            DataBits::Eight => serialport::DataBits::Eight,
        }
    }
}

/// Parity checking modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Parity {
    #[default]
    None,
    Odd,
    Even,
    Mark,
    Space,
}

impl TryFrom<Parity> for serialport::Parity {
    type Error = PortError;

    fn try_from(parity: Parity) -> Result<Self, Self::Error> {
        match parity {
            Parity::None => Ok(serialport::Parity::None),
            Parity::Odd => Ok(serialport::Parity::Odd),
            Parity::Even => Ok(serialport::Parity::Even),
            Parity::Mark | Parity::Space => Err(PortError::unsupported(format!(
                "{parity:?} parity is not available on the native backend"
            ))),
        }
    }
}

/// Number of stop bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopBits {
    #[default]
    One,
    OnePointFive,
    Two,
}

impl TryFrom<StopBits> for serialport::StopBits {
    type Error = PortError;

    fn try_from(bits: StopBits) -> Result<Self, Self::Error> {
        match bits {
            StopBits::One => Ok(serialport::StopBits::One),
            StopBits::Two => Ok(serialport::StopBits::Two),
            StopBits::OnePointFive => Err(PortError::unsupported(
                "1.5 stop bits are not available on the native backend",
            )),
        }
    }
}

/// Flow control modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowControl {
    #[default]
    None,
    Hardware,
    Software,
}

impl From<FlowControl> for serialport::FlowControl {
    fn from(flow: FlowControl) -> Self {
        match flow {
            FlowControl::None => serialport::FlowControl::None,
            FlowControl::Software => serialport::FlowControl::Software,
            FlowControl::Hardware => serialport::FlowControl::Hardware,
        }
    }
}

/// Snapshot of the modem input lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct ModemStatus {
    pub clear_to_send: bool,
    pub data_set_ready: bool,
    pub ring_indicator: bool,
    pub carrier_detect: bool,
}

/// Wakes a device call that is blocked in a read.
pub type InterruptHandle = Arc<dyn Fn() + Send + Sync>;

/// One open handle onto a serial endpoint.
///
/// Reads and writes are bounded by the poll interval the opener applied: a call
/// that made no progress within it returns an error for which
/// [`PortError::is_pending`] is true.
pub trait SerialDevice: Send + std::fmt::Debug {
    /// Get the name/path of the endpoint.
    fn name(&self) -> &str;

    /// Read bytes from the device into the provided buffer.
    ///
    /// Returns the number of bytes actually read.
    fn read_bytes(&mut self, buffer: &mut [u8]) -> Result<usize, PortError>;

    /// Write bytes to the device.
    ///
    /// Returns the number of bytes actually written, which may be short.
    fn write_bytes(&mut self, data: &[u8]) -> Result<usize, PortError>;

    /// Query CTS/DSR/RI/CD.
    fn modem_status(&mut self) -> Result<ModemStatus, PortError>;

    /// Drive the RTS output line.
    fn set_rts(&mut self, level: bool) -> Result<(), PortError>;

    /// Drive the DTR output line.
    fn set_dtr(&mut self, level: bool) -> Result<(), PortError>;

    /// Open a second handle onto the same connection, used as the reader half.
    fn try_clone_device(&self) -> Result<Box<dyn SerialDevice>, PortError>;

    /// Handle that cancels an in-flight read, if the backend supports it.
    ///
    /// Backends without one rely on the poll interval to notice shutdown.
    fn interrupt_handle(&self) -> Option<InterruptHandle> {
        None
    }
}

/// Opens devices for a `PortChannel`.
pub trait DeviceOpener: Send + Sync + std::fmt::Debug {
    /// Open the endpoint and apply every line parameter in `config`.
    ///
    /// `poll_interval` bounds each individual read and write call.
    fn open(
        &self,
        config: &EndpointConfig,
        poll_interval: Duration,
    ) -> Result<Box<dyn SerialDevice>, PortError>;
}
