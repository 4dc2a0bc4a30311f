//! The controller facade and its builder.
//!
//! [`Controller`] owns one instruction queue, one serial link and the
//! connection machine for that link, and exposes the operations a UI needs:
//! edit the queue, poll and select ports, connect, disconnect and send.
//!
//! Connect and send can be run on a tokio task with
//! [`spawn_connect`](Controller::spawn_connect) and
//! [`spawn_send`](Controller::spawn_send) so a UI thread never waits on the
//! device. Their outcome is delivered through the returned `JoinHandle` and
//! through the [`BotEvent`] channel.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use botlink_core::{ControllerBuilder, Instruction};
//! # async fn example(connector: Box<dyn botlink_core::Connector>) -> botlink_core::Result<()> {
//! let controller = Arc::new(ControllerBuilder::new().build(connector));
//!
//! let ports = controller.link().ports();
//! controller.select_port(&ports[0])?;
//!
//! controller.add_instruction(Instruction::Forward)?;
//! controller.add_instruction(Instruction::Light)?;
//! controller.spawn_send().await.expect("send task panicked")?;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::connection::{ConnectionMachine, ConnectionState};
use crate::error::{Error, Result};
use crate::events::BotEvent;
use crate::helpers::format_packet_hex;
use crate::instruction::Instruction;
use crate::link::{LinkConfig, PortDescriptor, SerialLink};
use crate::packet;
use crate::queue::InstructionQueue;
use crate::transport::Connector;

/// Fluent builder for [`Controller`].
///
/// Defaults: 200ms read and write timeouts, 5s open timeout, an event
/// channel of 64 entries, and one port poll at build time.
#[derive(Debug, Clone)]
pub struct ControllerBuilder {
    link_config: LinkConfig,
    event_capacity: usize,
    poll_on_build: bool,
}

impl ControllerBuilder {
    pub fn new() -> Self {
        ControllerBuilder {
            link_config: LinkConfig::default(),
            event_capacity: 64,
            poll_on_build: true,
        }
    }

    /// Set the read window (default: 200ms).
    pub fn read_timeout(mut self, timeout: Duration) -> Self {
        self.link_config.read_timeout = timeout;
        self
    }

    /// Set the write window (default: 200ms).
    pub fn write_timeout(mut self, timeout: Duration) -> Self {
        self.link_config.write_timeout = timeout;
        self
    }

    /// Set the upper bound on opening the device (default: 5s).
    pub fn open_timeout(mut self, timeout: Duration) -> Self {
        self.link_config.open_timeout = timeout;
        self
    }

    /// Set the capacity of the [`BotEvent`] broadcast channel (default: 64).
    pub fn event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity.max(1);
        self
    }

    /// Whether to poll ports once while building (default: true).
    pub fn poll_on_build(mut self, poll: bool) -> Self {
        self.poll_on_build = poll;
        self
    }

    /// Build a controller around `connector`.
    ///
    /// A failed initial poll is logged and leaves the port list empty.
    pub fn build(self, connector: Box<dyn Connector>) -> Controller {
        let link = Arc::new(SerialLink::with_config(connector, self.link_config));
        let connection = ConnectionMachine::new(link.clone());
        let queue = Arc::new(InstructionQueue::new());
        let (event_tx, _) = broadcast::channel(self.event_capacity);

        let tx = event_tx.clone();
        queue.subscribe(move |queue| {
            let _ = tx.send(BotEvent::QueueChanged { len: queue.len() });
        });

        let tx = event_tx.clone();
        link.subscribe(move |link| {
            let _ = tx.send(BotEvent::PortsRefreshed {
                count: link.ports().len(),
            });
        });

        let tx = event_tx.clone();
        connection.subscribe(move |machine| {
            let state = machine.state();
            let reason = match state {
                ConnectionState::Disconnected => machine.last_failure(),
                _ => None,
            };
            let _ = tx.send(BotEvent::StateChanged { state, reason });
        });

        let controller = Controller {
            queue,
            link,
            connection,
            event_tx,
        };

        if self.poll_on_build {
            if let Err(e) = controller.poll_ports() {
                tracing::warn!(error = %e, "Initial port poll failed");
            }
        }

        controller
    }
}

impl Default for ControllerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Queue, link and connection lifecycle for one robot.
pub struct Controller {
    queue: Arc<InstructionQueue>,
    link: Arc<SerialLink>,
    connection: Arc<ConnectionMachine>,
    event_tx: broadcast::Sender<BotEvent>,
}

impl Controller {
    /// Build a controller with default settings.
    pub fn new(connector: Box<dyn Connector>) -> Self {
        ControllerBuilder::new().build(connector)
    }

    pub fn queue(&self) -> &Arc<InstructionQueue> {
        &self.queue
    }

    pub fn link(&self) -> &Arc<SerialLink> {
        &self.link
    }

    pub fn connection(&self) -> &Arc<ConnectionMachine> {
        &self.connection
    }

    pub fn state(&self) -> ConnectionState {
        self.connection.state()
    }

    /// Subscribe to controller events.
    pub fn subscribe_events(&self) -> broadcast::Receiver<BotEvent> {
        self.event_tx.subscribe()
    }

    pub fn add_instruction(&self, instruction: Instruction) -> Result<()> {
        self.queue.append(instruction)
    }

    pub fn remove_instruction(&self, index: usize) -> Result<Instruction> {
        self.queue.remove_at(index)
    }

    pub fn clear_instructions(&self) {
        self.queue.clear()
    }

    pub fn poll_ports(&self) -> Result<Vec<PortDescriptor>> {
        self.link.poll_ports()
    }

    pub fn select_port(&self, port: &PortDescriptor) -> Result<()> {
        self.link.select_port(port)
    }

    /// Connect to the selected port.
    pub async fn connect(&self) -> Result<()> {
        self.connection.open_connection().await
    }

    /// Close the link and return to `Disconnected`.
    pub async fn disconnect(&self) {
        self.connection.close().await
    }

    /// Encode the current queue and write it to the robot.
    ///
    /// Connects first if the link is not `Connected`. On a write failure
    /// the link is closed and the connection drops to `Disconnected`; the
    /// queue is never modified, so the operator can retry after
    /// reconnecting. Returns the packet length.
    pub async fn send_instructions(&self) -> Result<usize> {
        let snapshot = self.queue.snapshot();
        let packet = packet::encode(&snapshot)?;

        if !self.link.is_ready() {
            tracing::error!("Select a port before sending instructions");
            return Err(Error::NoPortSelected);
        }

        tracing::info!(
            size = packet.len(),
            instructions = snapshot.len(),
            "Sending instruction packet"
        );
        tracing::debug!(data = %format_packet_hex(&packet), "Packet contents");

        if self.connection.state() != ConnectionState::Connected {
            self.connection.open_connection().await?;
        }

        match self.link.write(&packet).await {
            Ok(()) => {
                let _ = self.event_tx.send(BotEvent::PacketSent {
                    bytes: packet.len(),
                });
                Ok(packet.len())
            }
            Err(e) => {
                // Record the reason before closing, or the close would be
                // reported as a plain disconnect.
                self.connection.link_lost(e.to_string());
                self.link.close().await;
                Err(e)
            }
        }
    }

    /// Read up to `n` bytes of reply from the robot.
    ///
    /// A link failure during the read drops the connection to
    /// `Disconnected`, reported through the usual state event.
    pub async fn read_reply(&self, n: usize) -> Result<Vec<u8>> {
        self.link.read(n).await
    }

    /// Run [`connect`](Self::connect) on a tokio task.
    pub fn spawn_connect(self: &Arc<Self>) -> JoinHandle<Result<()>> {
        let controller = self.clone();
        tokio::spawn(async move { controller.connect().await })
    }

    /// Run [`send_instructions`](Self::send_instructions) on a tokio task.
    pub fn spawn_send(self: &Arc<Self>) -> JoinHandle<Result<usize>> {
        let controller = self.clone();
        tokio::spawn(async move { controller.send_instructions().await })
    }
}

impl std::fmt::Debug for Controller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Controller")
            .field("queue", &self.queue)
            .field("link", &self.link)
            .field("connection", &self.connection)
            .finish_non_exhaustive()
    }
}
