//! The serial link to the robot.
//!
//! [`SerialLink`] owns the port list, the selected port and the single open
//! device handle. It wraps a [`Connector`] and applies the link's policies on
//! top of it:
//!
//! - port descriptors are scoped to the poll that produced them; selecting a
//!   descriptor from an older poll fails with [`Error::UnknownPort`];
//! - the selected device is opened lazily on the first read or write;
//! - every read and write is bounded by a short timeout;
//! - `close()` cancels any read or write blocked on the device, which then
//!   fails with [`Error::DeviceClosed`];
//! - whenever the open handle goes away, by `close()` or by a failure, the
//!   link publishes a [`SessionEnd`] so the connection state can follow.
//!
//! Only one open, close, read or write runs against the device at a time.

use std::fmt;
use std::sync::Mutex;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};
use crate::helpers::{format_packet_hex, lock};
use crate::notifier::{Notifier, SubscriptionId};
use crate::transport::{Connector, PortInfo, Transport};

/// Timeouts applied by [`SerialLink`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkConfig {
    /// Read window. A read returns whatever arrived when it elapses.
    pub read_timeout: Duration,
    /// Write window. A write still pending when it elapses fails with
    /// [`Error::WriteTimeout`].
    pub write_timeout: Duration,
    /// Upper bound on opening the device. Bluetooth SPP ports can take
    /// several seconds to establish the RFCOMM channel.
    pub open_timeout: Duration,
}

impl Default for LinkConfig {
    fn default() -> Self {
        LinkConfig {
            read_timeout: Duration::from_millis(200),
            write_timeout: Duration::from_millis(200),
            open_timeout: Duration::from_secs(5),
        }
    }
}

/// A device found by [`SerialLink::poll_ports`].
///
/// Descriptors can only be obtained from a poll and are only accepted by
/// [`SerialLink::select_port`] until the next poll.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortDescriptor {
    info: PortInfo,
    generation: u64,
}

impl PortDescriptor {
    /// System name used to open the device.
    pub fn name(&self) -> &str {
        &self.info.name
    }

    /// Device type as reported by enumeration.
    pub fn description(&self) -> &str {
        &self.info.description
    }

    pub fn info(&self) -> &PortInfo {
        &self.info
    }
}

impl fmt::Display for PortDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.info.description.is_empty() {
            f.write_str(&self.info.name)
        } else {
            write!(f, "{} ({})", self.info.name, self.info.description)
        }
    }
}

/// Why the open device handle went away.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEnd {
    /// Closed on request.
    Closed,
    /// Dropped after a read, write or open failure.
    Failed(String),
}

#[derive(Debug, Default)]
struct PortList {
    generation: u64,
    ports: Vec<PortDescriptor>,
}

/// The open device and the token that aborts operations blocked on it.
struct Session {
    transport: Box<dyn Transport>,
    port: String,
    cancel: CancellationToken,
}

/// Owner of the robot's serial device.
pub struct SerialLink {
    connector: Box<dyn Connector>,
    config: LinkConfig,
    ports: Mutex<PortList>,
    selected: Mutex<Option<PortDescriptor>>,
    session: tokio::sync::Mutex<Option<Session>>,
    // Cancelled by close() before it waits for the session lock.
    active_cancel: Mutex<Option<CancellationToken>>,
    notifier: Notifier<SerialLink>,
    session_notifier: Notifier<SessionEnd>,
}

impl SerialLink {
    pub fn new(connector: Box<dyn Connector>) -> Self {
        Self::with_config(connector, LinkConfig::default())
    }

    pub fn with_config(connector: Box<dyn Connector>, config: LinkConfig) -> Self {
        SerialLink {
            connector,
            config,
            ports: Mutex::new(PortList::default()),
            selected: Mutex::new(None),
            session: tokio::sync::Mutex::new(None),
            active_cancel: Mutex::new(None),
            notifier: Notifier::new(),
            session_notifier: Notifier::new(),
        }
    }

    pub fn config(&self) -> &LinkConfig {
        &self.config
    }

    /// Enumerate devices, replacing the previous port list.
    ///
    /// Descriptors from earlier polls become invalid. The selection is moved
    /// to the new descriptor with the same name, or cleared if that device
    /// is gone. Listeners are notified afterwards even when the list is
    /// empty or unchanged. If enumeration fails, the list is replaced by an
    /// empty one and the error returned.
    pub fn poll_ports(&self) -> Result<Vec<PortDescriptor>> {
        let listed = self.connector.list_ports();
        let infos = match &listed {
            Ok(infos) => infos.clone(),
            Err(e) => {
                tracing::warn!(error = %e, "Failed to enumerate ports");
                Vec::new()
            }
        };

        let descriptors = {
            let mut list = lock(&self.ports);
            list.generation += 1;
            let generation = list.generation;
            list.ports = infos
                .into_iter()
                .map(|info| PortDescriptor { info, generation })
                .collect();

            let mut selected = lock(&self.selected);
            if let Some(current) = selected.take() {
                *selected = list.ports.iter().find(|p| p.name() == current.name()).cloned();
                if selected.is_none() {
                    tracing::warn!(port = %current.name(), "Selected port disappeared, clearing selection");
                }
            }
            list.ports.clone()
        };

        for port in &descriptors {
            tracing::info!(port = %port.name(), description = %port.description(), "Found available port");
        }
        tracing::debug!(count = descriptors.len(), "Port list refreshed");

        self.notifier.publish(self);
        listed.map(|_| descriptors)
    }

    /// The port list from the most recent poll.
    pub fn ports(&self) -> Vec<PortDescriptor> {
        lock(&self.ports).ports.clone()
    }

    /// Record `port` as the device to open. Does not open it.
    ///
    /// If a different device is currently open it is closed before the new
    /// one is opened by the next `open()`, `write()` or `read()`.
    pub fn select_port(&self, port: &PortDescriptor) -> Result<()> {
        {
            let list = lock(&self.ports);
            if port.generation != list.generation || !list.ports.contains(port) {
                tracing::warn!(port = %port.name(), "Rejected port from a stale poll");
                return Err(Error::UnknownPort(port.name().to_string()));
            }
            *lock(&self.selected) = Some(port.clone());
        }

        tracing::info!(port = %port.name(), "Selected port");
        Ok(())
    }

    pub fn selected_port(&self) -> Option<PortDescriptor> {
        lock(&self.selected).clone()
    }

    /// Whether a port has been selected, i.e. whether a write can be attempted.
    pub fn is_ready(&self) -> bool {
        lock(&self.selected).is_some()
    }

    /// Whether the device handle is currently open.
    pub async fn is_open(&self) -> bool {
        self.session
            .lock()
            .await
            .as_ref()
            .is_some_and(|session| session.transport.is_connected())
    }

    /// Open the selected device. A no-op if it is already open.
    pub async fn open(&self) -> Result<()> {
        let selected = self.selected_port().ok_or(Error::NoPortSelected)?;
        let mut session = self.session.lock().await;
        self.open_session(&mut session, &selected).await
    }

    /// Write `data` to the device, opening it first if needed.
    pub async fn write(&self, data: &[u8]) -> Result<()> {
        let selected = self.selected_port().ok_or_else(|| {
            tracing::error!("Write attempted before a port was selected");
            Error::NoPortSelected
        })?;
        let mut guard = self.session.lock().await;
        self.open_session(&mut guard, &selected).await?;
        let session = guard.as_mut().ok_or(Error::NotConnected)?;

        tracing::trace!(
            port = %session.port,
            bytes = data.len(),
            data = %format_packet_hex(data),
            "Writing to device"
        );

        let cancel = session.cancel.clone();
        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(Error::DeviceClosed),
            sent = tokio::time::timeout(self.config.write_timeout, session.transport.send(data)) => {
                sent.unwrap_or(Err(Error::WriteTimeout))
            }
        };

        match &result {
            Ok(()) => tracing::trace!(port = %session.port, "Write complete"),
            Err(Error::WriteTimeout) => tracing::warn!(
                port = %session.port,
                timeout_ms = self.config.write_timeout.as_millis(),
                "Write timed out"
            ),
            Err(e) => tracing::error!(port = %session.port, error = %e, "Write failed"),
        }

        if let Err(e) = &result {
            if is_link_failure(e) {
                Self::drop_session(&mut guard).await;
                drop(guard);
                self.session_notifier.publish(&SessionEnd::Failed(e.to_string()));
            }
        }
        result
    }

    /// Read up to `n` bytes, opening the device first if needed.
    ///
    /// Collects bytes until `n` have arrived or the read window elapses.
    /// A window with no data yields an empty vector, not an error.
    pub async fn read(&self, n: usize) -> Result<Vec<u8>> {
        let selected = self.selected_port().ok_or(Error::NoPortSelected)?;
        let mut guard = self.session.lock().await;
        self.open_session(&mut guard, &selected).await?;
        let session = guard.as_mut().ok_or(Error::NotConnected)?;

        let mut buf = vec![0u8; n];
        let mut filled = 0;
        let deadline = tokio::time::Instant::now() + self.config.read_timeout;
        let cancel = session.cancel.clone();

        let mut failure = None;
        while filled < n {
            let received = tokio::select! {
                biased;
                _ = cancel.cancelled() => Err(Error::DeviceClosed),
                r = tokio::time::timeout_at(deadline, session.transport.receive(&mut buf[filled..])) => {
                    match r {
                        Ok(r) => r,
                        // Window elapsed.
                        Err(_) => break,
                    }
                }
            };
            match received {
                Ok(0) => break,
                Ok(k) => filled += k,
                Err(e) => {
                    failure = Some(e);
                    break;
                }
            }
        }

        if let Some(e) = failure {
            tracing::error!(port = %session.port, error = %e, "Read failed");
            if is_link_failure(&e) {
                Self::drop_session(&mut guard).await;
                drop(guard);
                self.session_notifier.publish(&SessionEnd::Failed(e.to_string()));
            }
            return Err(e);
        }

        buf.truncate(filled);
        tracing::trace!(
            port = %session.port,
            requested = n,
            bytes = filled,
            data = %format_packet_hex(&buf),
            "Read from device"
        );
        Ok(buf)
    }

    /// Write a single ASCII `'0'` to check that the device accepts data.
    pub async fn probe(&self) -> Result<()> {
        self.write(b"0").await
    }

    /// Close the device. Idempotent and infallible.
    ///
    /// Any read or write blocked on the device fails with
    /// [`Error::DeviceClosed`]. Driver-level close errors are logged.
    pub async fn close(&self) {
        let cancel = lock(&self.active_cancel).take();
        if let Some(cancel) = cancel {
            cancel.cancel();
        }
        let mut session = self.session.lock().await;
        if Self::drop_session(&mut session).await {
            drop(session);
            self.session_notifier.publish(&SessionEnd::Closed);
        }
    }

    /// Register a listener called after every port poll.
    pub fn subscribe<F>(&self, listener: F) -> SubscriptionId
    where
        F: Fn(&SerialLink) + Send + Sync + 'static,
    {
        self.notifier.subscribe(listener)
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.notifier.unsubscribe(id)
    }

    /// Register a listener called each time the open device handle goes
    /// away. Not called when no handle was open.
    pub fn on_session_end<F>(&self, listener: F) -> SubscriptionId
    where
        F: Fn(&SessionEnd) + Send + Sync + 'static,
    {
        self.session_notifier.subscribe(listener)
    }

    pub fn unsubscribe_session_end(&self, id: SubscriptionId) -> bool {
        self.session_notifier.unsubscribe(id)
    }

    // Like ensure_open, but reports a handle that was dropped and not replaced.
    async fn open_session(&self, session: &mut Option<Session>, port: &PortDescriptor) -> Result<()> {
        let had_session = session.is_some();
        let opened = self.ensure_open(session, port).await;
        if let Err(e) = &opened {
            if had_session {
                self.session_notifier.publish(&SessionEnd::Failed(e.to_string()));
            }
        }
        opened
    }

    async fn ensure_open(&self, session: &mut Option<Session>, port: &PortDescriptor) -> Result<()> {
        if let Some(current) = session.as_ref() {
            if current.port == port.name() && current.transport.is_connected() {
                return Ok(());
            }
            tracing::debug!(
                old = %current.port,
                new = %port.name(),
                "Replacing device handle"
            );
            Self::drop_session(session).await;
        }

        tracing::debug!(
            port = %port.name(),
            timeout_ms = self.config.open_timeout.as_millis(),
            "Opening port"
        );

        let opened = tokio::time::timeout(self.config.open_timeout, self.connector.open(port.info()))
            .await
            .unwrap_or_else(|_| Err(open_failed(port, "timed out")));

        let transport = opened.map_err(|e| {
            let e = match e {
                Error::OpenFailed { .. } => e,
                other => open_failed(port, &other.to_string()),
            };
            tracing::error!(port = %port.name(), error = %e, "Failed to open port");
            e
        })?;

        let cancel = CancellationToken::new();
        *lock(&self.active_cancel) = Some(cancel.clone());
        *session = Some(Session {
            transport,
            port: port.name().to_string(),
            cancel,
        });

        tracing::info!(port = %port.name(), "Port opened");
        Ok(())
    }

    /// Close and forget the open handle. Returns whether there was one.
    async fn drop_session(session: &mut Option<Session>) -> bool {
        let Some(mut current) = session.take() else {
            return false;
        };
        current.cancel.cancel();
        if let Err(e) = current.transport.close().await {
            tracing::warn!(
                port = %current.port,
                error = %e,
                "Failed to close device (continuing anyway)"
            );
        }
        tracing::info!(port = %current.port, "Port closed");
        true
    }
}

impl fmt::Debug for SerialLink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SerialLink")
            .field("config", &self.config)
            .field("selected", &self.selected_port())
            .field("ports", &lock(&self.ports).ports.len())
            .finish_non_exhaustive()
    }
}

fn open_failed(port: &PortDescriptor, reason: &str) -> Error {
    Error::OpenFailed {
        port: port.name().to_string(),
        reason: reason.to_string(),
    }
}

/// Errors after which the device handle can no longer be trusted.
fn is_link_failure(e: &Error) -> bool {
    matches!(
        e,
        Error::ConnectionLost | Error::NotConnected | Error::Io(_) | Error::Transport(_)
    )
}
