//! Transport traits for the robot link.
//!
//! The [`Transport`] trait abstracts over an opened byte stream to the robot.
//! The [`Connector`] trait enumerates candidate devices and opens them. The
//! serial implementations live in `botlink-transport`; mock implementations
//! for deterministic tests live in `botlink-test-harness`.
//!
//! Timeouts are not part of these traits. [`SerialLink`](crate::link::SerialLink)
//! bounds every call with its configured read and write windows, so a
//! transport only needs to move bytes.

use async_trait::async_trait;

use crate::error::Result;

/// Asynchronous byte-level transport to the robot.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Write all of `data` to the device and flush.
    async fn send(&mut self, data: &[u8]) -> Result<()>;

    /// Read whatever bytes are available into `buf`, waiting until at least
    /// one arrives. Returns the number of bytes read.
    async fn receive(&mut self, buf: &mut [u8]) -> Result<usize>;

    /// Close the transport.
    ///
    /// After calling `close()`, subsequent `send()` and `receive()` calls
    /// should return [`Error::NotConnected`](crate::error::Error::NotConnected).
    async fn close(&mut self) -> Result<()>;

    /// Check whether the transport is currently open.
    fn is_connected(&self) -> bool;
}

/// A device reported by port enumeration.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PortInfo {
    /// System path or name used to open the device (e.g. `/dev/rfcomm0`, `COM5`).
    pub name: String,
    /// Short description of the device type (e.g. `Bluetooth`, `USB (10C4:EA60)`).
    pub description: String,
}

impl PortInfo {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        PortInfo {
            name: name.into(),
            description: description.into(),
        }
    }
}

/// Enumerates and opens devices.
#[async_trait]
pub trait Connector: Send + Sync {
    /// List the devices currently present.
    fn list_ports(&self) -> Result<Vec<PortInfo>>;

    /// Open the device described by `port`.
    ///
    /// Implementations should map missing, busy or permission-denied devices
    /// to [`Error::OpenFailed`](crate::error::Error::OpenFailed).
    async fn open(&self, port: &PortInfo) -> Result<Box<dyn Transport>>;
}
