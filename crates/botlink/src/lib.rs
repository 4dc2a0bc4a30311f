//! # botlink -- queue robot instructions and send them over a serial link
//!
//! `botlink` lets an operator build an ordered list of robot commands and
//! send them as one compact packet to an embedded device over a serial
//! byte stream, typically a Bluetooth SPP module such as an HC-05.
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use botlink::{ControllerBuilder, Instruction};
//! use botlink::serial::{SerialConfig, SerialConnector};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let controller = Arc::new(
//!         ControllerBuilder::new().build(Box::new(SerialConnector::new(SerialConfig::default()))),
//!     );
//!
//!     let port = controller.link().ports().into_iter().next().expect("no serial ports");
//!     controller.select_port(&port)?;
//!
//!     controller.add_instruction(Instruction::Forward)?;
//!     controller.add_instruction(Instruction::Light)?;
//!     let bytes = controller.spawn_send().await??;
//!     println!("sent {bytes} bytes");
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! | Crate                   | Purpose                                          |
//! |-------------------------|--------------------------------------------------|
//! | `botlink-core`          | Catalog, queue, packet codec, link, connection   |
//! | `botlink-transport`     | Serial port transport and enumeration            |
//! | `botlink-test-harness`  | Mock devices and connectors for tests            |
//! | **`botlink`**           | This facade crate -- re-exports everything       |
//!
//! ## Wire Format
//!
//! ```text
//! byte 0       : N = number of instructions (0-255)
//! byte 1..=N   : wire code of each instruction, in queue order
//! ```
//!
//! `[Forward, Light]` encodes to `[2, 1, 5]`; an empty queue encodes to `[0]`.
//!
//! ## Observing State
//!
//! The queue, the link and the connection machine each accept synchronous
//! listeners through `subscribe`, called after every change. The
//! [`Controller`] also re-publishes all of them as [`BotEvent`]s on a
//! broadcast channel:
//!
//! ```no_run
//! use botlink::{BotEvent, Controller};
//! # async fn example(controller: &Controller) {
//! let mut events = controller.subscribe_events();
//! while let Ok(event) = events.recv().await {
//!     if let BotEvent::StateChanged { state, reason } = event {
//!         println!("Status: {state} {}", reason.unwrap_or_default());
//!     }
//! }
//! # }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature  | Enables                                   | Default |
//! |----------|-------------------------------------------|---------|
//! | `serial` | [`serial`] module (tokio-serial transport) | yes     |

pub use botlink_core::*;

/// Serial port transport backend.
///
/// Provides [`SerialConnector`](serial::SerialConnector) and
/// [`SerialTransport`](serial::SerialTransport) for talking to the robot
/// over a USB or Bluetooth serial port.
#[cfg(feature = "serial")]
pub mod serial {
    pub use botlink_transport::*;
}

/// Returns every instruction an operator can queue, in palette order.
///
/// # Example
///
/// ```
/// for instruction in botlink::palette() {
///     println!("{:>2}  {}", instruction.wire_code(), instruction);
/// }
/// ```
pub fn palette() -> Vec<Instruction> {
    Instruction::palette().collect()
}
