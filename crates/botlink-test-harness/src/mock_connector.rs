//! Mock port enumeration and opening.
//!
//! [`MockConnector`] implements [`Connector`] over a scripted set of
//! [`MockDevice`]s. Tests add and remove ports, make opens fail or hang, and
//! make enumeration fail. The connector is cheaply cloneable; clones share
//! state, so a test can hand one clone to the link and keep another.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use botlink_core::error::{Error, Result};
use botlink_core::transport::{Connector, PortInfo, Transport};

use crate::mock_serial::{MockDevice, MockTransport};

#[derive(Debug, Default)]
struct ConnectorState {
    ports: Vec<PortInfo>,
    devices: HashMap<String, MockDevice>,
    open_failures: HashMap<String, String>,
    list_failure: Option<String>,
    open_delay: Option<Duration>,
    list_count: usize,
}

/// A scripted [`Connector`] for tests and the CLI's `--mock` mode.
#[derive(Debug, Clone, Default)]
pub struct MockConnector {
    state: Arc<Mutex<ConnectorState>>,
}

impl MockConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a port and return the device behind it.
    pub fn add_port(&self, name: &str, description: &str) -> MockDevice {
        let device = MockDevice::new();
        let mut state = self.lock();
        state.ports.push(PortInfo::new(name, description));
        state.devices.insert(name.to_string(), device.clone());
        device
    }

    /// Remove a port, as if the device was unplugged or unpaired.
    pub fn remove_port(&self, name: &str) {
        let mut state = self.lock();
        state.ports.retain(|p| p.name != name);
        state.devices.remove(name);
    }

    /// The device behind `name`, if present.
    pub fn device(&self, name: &str) -> Option<MockDevice> {
        self.lock().devices.get(name).cloned()
    }

    /// Make opening `name` fail with [`Error::OpenFailed`] and `reason`.
    pub fn fail_open(&self, name: &str, reason: &str) {
        self.lock()
            .open_failures
            .insert(name.to_string(), reason.to_string());
    }

    /// Undo [`fail_open`](Self::fail_open).
    pub fn allow_open(&self, name: &str) {
        self.lock().open_failures.remove(name);
    }

    /// Make enumeration fail with [`Error::Transport`], or succeed again
    /// with `None`.
    pub fn fail_listing(&self, reason: Option<&str>) {
        self.lock().list_failure = reason.map(str::to_string);
    }

    /// Delay every open by `delay`.
    pub fn set_open_delay(&self, delay: Option<Duration>) {
        self.lock().open_delay = delay;
    }

    /// Number of times ports were listed.
    pub fn list_count(&self) -> usize {
        self.lock().list_count
    }

    fn lock(&self) -> MutexGuard<'_, ConnectorState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl Connector for MockConnector {
    fn list_ports(&self) -> Result<Vec<PortInfo>> {
        let mut state = self.lock();
        state.list_count += 1;
        if let Some(reason) = &state.list_failure {
            return Err(Error::Transport(reason.clone()));
        }
        Ok(state.ports.clone())
    }

    async fn open(&self, port: &PortInfo) -> Result<Box<dyn Transport>> {
        let delay = self.lock().open_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let state = self.lock();
        if let Some(reason) = state.open_failures.get(&port.name) {
            return Err(Error::OpenFailed {
                port: port.name.clone(),
                reason: reason.clone(),
            });
        }
        let device = state
            .devices
            .get(&port.name)
            .cloned()
            .ok_or_else(|| Error::OpenFailed {
                port: port.name.clone(),
                reason: "no such device".into(),
            })?;
        drop(state);

        Ok(Box::new(MockTransport::new(device)))
    }
}
