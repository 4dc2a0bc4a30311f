//! Asynchronous controller event types.
//!
//! The [`Controller`](crate::controller::Controller) re-publishes every
//! queue, port-list and connection notification as a [`BotEvent`] on a
//! [`tokio::sync::broadcast`] channel, so async consumers (status bars,
//! loggers, the CLI) can follow the controller without registering
//! synchronous listeners.

use crate::connection::ConnectionState;

/// An event emitted by the controller when observable state changes.
///
/// Delivery is best-effort through a bounded broadcast channel; a slow
/// consumer may see `RecvError::Lagged` and should re-read state directly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BotEvent {
    /// The instruction queue was mutated.
    QueueChanged {
        /// Queue length after the mutation.
        len: usize,
    },

    /// The port list was refreshed.
    PortsRefreshed {
        /// Number of ports found.
        count: usize,
    },

    /// The connection state machine made a transition.
    StateChanged {
        /// The new state.
        state: ConnectionState,
        /// Why the link dropped, when the transition was caused by a failure.
        reason: Option<String>,
    },

    /// A packet was written to the device.
    PacketSent {
        /// Packet length in bytes, including the count prefix.
        bytes: usize,
    },
}
