//! Serial transport for botlink.
//!
//! This crate provides the operating-system implementations of the
//! [`Transport`](botlink_core::Transport) and
//! [`Connector`](botlink_core::Connector) traits from `botlink-core`:
//!
//! - [`SerialTransport`]: an open serial port (USB virtual COM port or
//!   Bluetooth SPP binding)
//! - [`SerialConnector`]: enumerates ports through `tokio-serial` and opens
//!   them with a [`SerialConfig`]
//!
//! # Example
//!
//! ```no_run
//! use botlink_core::{ControllerBuilder, Instruction};
//! use botlink_transport::{SerialConfig, SerialConnector};
//!
//! # async fn example() -> botlink_core::Result<()> {
//! let controller = ControllerBuilder::new()
//!     .build(Box::new(SerialConnector::new(SerialConfig::default())));
//!
//! let port = controller.link().ports().into_iter().next().expect("no serial ports");
//! controller.select_port(&port)?;
//! controller.add_instruction(Instruction::Forward)?;
//! controller.send_instructions().await?;
//! # Ok(())
//! # }
//! ```

pub mod serial;

pub use serial::{SerialConfig, SerialConnector, SerialTransport};
