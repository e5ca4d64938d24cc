//! Serial transport layer.
//!
//! `PortChannel` owns one open connection and its receive thread. Devices are
//! reached through the `SerialDevice`/`DeviceOpener` traits so the same channel
//! runs over real ports (`NativeOpener`) or the in-process `MockBus`.

pub mod channel;
pub mod error;
pub mod mock;
pub mod signal;
pub mod sync_port;
pub mod traits;

pub use channel::{ChannelOptions, ChannelStats, DataCallback, PortChannel};
pub use error::PortError;
pub use mock::{MockBus, MockDevice, MockEndpoint};
pub use sync_port::{list_endpoints, EndpointInfo, NativeOpener, SyncSerialPort};
pub use traits::*;
