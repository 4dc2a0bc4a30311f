//! botlink-core: instruction queue, packet codec and connection lifecycle.
//!
//! This crate holds everything about talking to the robot except the
//! operating-system serial port itself, which lives in `botlink-transport`.
//! UI layers depend on these types and drive them through [`Controller`].
//!
//! # Key types
//!
//! - [`Instruction`] -- the command catalog and its fixed wire codes
//! - [`InstructionQueue`] -- the ordered list awaiting transmission
//! - [`packet::encode`] -- queue snapshot to length-prefixed packet
//! - [`SerialLink`] -- port polling, selection, lazy open, bounded I/O
//! - [`ConnectionMachine`] -- Disconnected / Connecting / Connected
//! - [`Notifier`] -- synchronous change listeners
//! - [`Controller`] -- facade tying the above together
//! - [`Error`] / [`Result`] -- error handling

pub mod connection;
pub mod controller;
pub mod error;
pub mod events;
pub mod helpers;
pub mod instruction;
pub mod link;
pub mod notifier;
pub mod packet;
pub mod queue;
pub mod transport;

// Re-export key types at crate root for ergonomic `use botlink_core::*`.
pub use connection::{ConnectionMachine, ConnectionState};
pub use controller::{Controller, ControllerBuilder};
pub use error::{Error, Result};
pub use events::BotEvent;
pub use helpers::format_packet_hex;
pub use instruction::{Instruction, ParseInstructionError};
pub use link::{LinkConfig, PortDescriptor, SerialLink, SessionEnd};
pub use notifier::{Notifier, SubscriptionId};
pub use queue::{InstructionQueue, MAX_INSTRUCTIONS};
pub use transport::{Connector, PortInfo, Transport};
