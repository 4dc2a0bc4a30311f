//! Serial port transport for the robot link.
//!
//! This module provides [`SerialTransport`], which implements the
//! [`Transport`] trait for serial devices, and [`SerialConnector`], which
//! enumerates and opens them.
//!
//! A Bluetooth SPP module (HC-05, HC-06) paired with the host shows up as
//! an ordinary serial port:
//! - Linux: `/dev/rfcommN` once bound with `rfcomm bind`
//! - macOS: `/dev/cu.<device-name>`
//! - Windows: an outgoing `COMn` port
//!
//! These modules default to 9600 baud, 8N1.
//!
//! # Example
//!
//! ```no_run
//! use botlink_transport::SerialTransport;
//! use botlink_core::transport::Transport;
//!
//! # async fn example() -> botlink_core::Result<()> {
//! let mut transport = SerialTransport::open("/dev/rfcomm0", 9600).await?;
//!
//! // Send a two-instruction packet: Forward, Light
//! transport.send(&[2, 1, 5]).await?;
//! # Ok(())
//! # }
//! ```

use async_trait::async_trait;
use botlink_core::error::{Error, Result};
use botlink_core::transport::{Connector, PortInfo, Transport};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio_serial::{SerialPort, SerialPortBuilderExt, SerialPortType, SerialStream};

/// Serial port settings for the robot link.
///
/// Framing is always 8N1, which every HC-05/HC-06 firmware and Arduino
/// sketch for this robot uses. Only the line speed and the handshake vary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SerialConfig {
    /// Baud rate. HC-05 modules ship at 9600; some are reflashed to 38400
    /// or 115200.
    pub baud_rate: u32,
    /// Use RTS/CTS. Only USB adapters wired for it support this; Bluetooth
    /// SPP bindings ignore it.
    pub hardware_flow_control: bool,
    /// Pulse DTR on open. A USB-attached Arduino reboots on DTR, dropping
    /// anything sent during its bootloader window, so this is off by default.
    pub reset_on_open: bool,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            baud_rate: 9600,
            hardware_flow_control: false,
            reset_on_open: false,
        }
    }
}

impl SerialConfig {
    fn flow_control(&self) -> tokio_serial::FlowControl {
        if self.hardware_flow_control {
            tokio_serial::FlowControl::Hardware
        } else {
            tokio_serial::FlowControl::None
        }
    }
}

/// Serial port transport to the robot.
pub struct SerialTransport {
    /// The underlying serial port stream
    port: Option<SerialStream>,
    /// Port name for logging/debugging
    port_name: String,
}

impl SerialTransport {
    /// Open a serial port with the given baud rate and default settings.
    ///
    /// # Arguments
    ///
    /// * `port` - Serial port path (e.g., "/dev/rfcomm0" on Linux, "COM5" on Windows)
    /// * `baud_rate` - Baud rate (e.g., 9600, 38400, 115200)
    pub async fn open(port: &str, baud_rate: u32) -> Result<Self> {
        let config = SerialConfig {
            baud_rate,
            ..Default::default()
        };
        Self::open_with_config(port, config).await
    }

    /// Open a serial port with full configuration control.
    ///
    /// Fails with [`Error::OpenFailed`] if the device is missing, busy or
    /// not accessible.
    pub async fn open_with_config(port: &str, config: SerialConfig) -> Result<Self> {
        tracing::debug!(
            port = %port,
            baud_rate = config.baud_rate,
            hardware_flow_control = config.hardware_flow_control,
            reset_on_open = config.reset_on_open,
            "Opening serial port"
        );

        let mut serial_stream = tokio_serial::new(port, config.baud_rate)
            .data_bits(tokio_serial::DataBits::Eight)
            .stop_bits(tokio_serial::StopBits::One)
            .parity(tokio_serial::Parity::None)
            .flow_control(config.flow_control())
            .open_native_async()
            .map_err(|e| {
                tracing::error!(port = %port, error = %e, "Failed to open serial port");
                Error::OpenFailed {
                    port: port.to_string(),
                    reason: e.to_string(),
                }
            })?;

        if let Err(e) = serial_stream.write_data_terminal_ready(config.reset_on_open) {
            tracing::warn!(port = %port, error = %e, "Failed to set DTR");
        }

        tracing::info!(port = %port, baud_rate = config.baud_rate, "Serial port opened successfully");

        Ok(Self {
            port: Some(serial_stream),
            port_name: port.to_string(),
        })
    }

    /// Get the name of the serial port.
    pub fn port_name(&self) -> &str {
        &self.port_name
    }
}

#[async_trait]
impl Transport for SerialTransport {
    async fn send(&mut self, data: &[u8]) -> Result<()> {
        let port = self.port.as_mut().ok_or(Error::NotConnected)?;

        tracing::trace!(
            port = %self.port_name,
            bytes = data.len(),
            data = ?data,
            "Sending data"
        );

        port.write_all(data).await.map_err(|e| {
            tracing::error!(
                port = %self.port_name,
                error = %e,
                "Failed to send data"
            );
            map_io_error(e)
        })?;

        // Flush so the packet leaves the host buffer before we return
        port.flush().await.map_err(|e| {
            tracing::error!(
                port = %self.port_name,
                error = %e,
                "Failed to flush serial port"
            );
            map_io_error(e)
        })?;

        Ok(())
    }

    async fn receive(&mut self, buf: &mut [u8]) -> Result<usize> {
        let port = self.port.as_mut().ok_or(Error::NotConnected)?;

        match port.read(buf).await {
            Ok(n) => {
                tracing::trace!(
                    port = %self.port_name,
                    bytes = n,
                    data = ?&buf[..n],
                    "Received data"
                );
                Ok(n)
            }
            Err(e) => {
                tracing::error!(
                    port = %self.port_name,
                    error = %e,
                    "Failed to receive data"
                );
                Err(map_io_error(e))
            }
        }
    }

    async fn close(&mut self) -> Result<()> {
        if let Some(mut port) = self.port.take() {
            tracing::debug!(port = %self.port_name, "Closing serial port");

            // Flush any pending data before closing
            if let Err(e) = port.flush().await {
                tracing::warn!(
                    port = %self.port_name,
                    error = %e,
                    "Failed to flush before closing (continuing anyway)"
                );
            }

            // The port will be dropped here, which closes it
            tracing::info!(port = %self.port_name, "Serial port closed");
        }

        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.port.is_some()
    }
}

impl Drop for SerialTransport {
    fn drop(&mut self) {
        if self.port.is_some() {
            tracing::debug!(port = %self.port_name, "SerialTransport dropped, closing port");
        }
    }
}

/// A dropped Bluetooth link surfaces as a broken pipe or a not-connected error.
fn map_io_error(e: std::io::Error) -> Error {
    match e.kind() {
        std::io::ErrorKind::BrokenPipe | std::io::ErrorKind::NotConnected => Error::ConnectionLost,
        _ => Error::Io(e),
    }
}

/// Enumerates and opens the host's serial ports.
#[derive(Debug, Clone, Default)]
pub struct SerialConnector {
    config: SerialConfig,
}

impl SerialConnector {
    pub fn new(config: SerialConfig) -> Self {
        SerialConnector { config }
    }

    pub fn config(&self) -> &SerialConfig {
        &self.config
    }
}

#[async_trait]
impl Connector for SerialConnector {
    fn list_ports(&self) -> Result<Vec<PortInfo>> {
        let ports = tokio_serial::available_ports()
            .map_err(|e| Error::Transport(format!("Failed to enumerate ports: {e}")))?;

        Ok(ports
            .into_iter()
            .map(|p| PortInfo::new(p.port_name, describe_port_type(&p.port_type)))
            .collect())
    }

    async fn open(&self, port: &PortInfo) -> Result<Box<dyn Transport>> {
        let transport = SerialTransport::open_with_config(&port.name, self.config.clone()).await?;
        Ok(Box::new(transport))
    }
}

fn describe_port_type(port_type: &SerialPortType) -> String {
    match port_type {
        SerialPortType::UsbPort(info) => match &info.product {
            Some(product) => format!("USB {product} ({:04X}:{:04X})", info.vid, info.pid),
            None => format!("USB ({:04X}:{:04X})", info.vid, info.pid),
        },
        SerialPortType::BluetoothPort => "Bluetooth".to_string(),
        SerialPortType::PciPort => "PCI".to_string(),
        SerialPortType::Unknown => "Serial".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serial_config_default() {
        let config = SerialConfig::default();
        assert_eq!(config.baud_rate, 9600);
        assert!(!config.hardware_flow_control);
        assert!(!config.reset_on_open);
        assert_eq!(config.flow_control(), tokio_serial::FlowControl::None);
    }

    #[test]
    fn test_hardware_flow_control() {
        let config = SerialConfig {
            hardware_flow_control: true,
            ..SerialConfig::default()
        };
        assert_eq!(config.flow_control(), tokio_serial::FlowControl::Hardware);
    }

    #[test]
    fn test_io_error_mapping() {
        let lost = map_io_error(std::io::Error::new(std::io::ErrorKind::BrokenPipe, "gone"));
        assert!(matches!(lost, Error::ConnectionLost));
        let other = map_io_error(std::io::Error::new(std::io::ErrorKind::Other, "glitch"));
        assert!(matches!(other, Error::Io(_)));
    }

    #[test]
    fn test_port_type_descriptions() {
        assert_eq!(describe_port_type(&SerialPortType::BluetoothPort), "Bluetooth");
        assert_eq!(describe_port_type(&SerialPortType::PciPort), "PCI");
        assert_eq!(describe_port_type(&SerialPortType::Unknown), "Serial");
    }

    #[tokio::test]
    async fn test_open_missing_port_fails() {
        let result = SerialTransport::open("/dev/botlink-does-not-exist", 9600).await;
        assert!(matches!(result, Err(Error::OpenFailed { .. })));
    }
}
