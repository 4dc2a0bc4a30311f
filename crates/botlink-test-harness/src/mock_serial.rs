//! Mock transport for deterministic testing without a robot.
//!
//! [`MockTransport`] implements the [`Transport`] trait on top of a shared
//! [`MockDevice`]. The device is the test's handle: it records every packet
//! written, feeds bytes back to `receive()`, and can be told to stall or fail
//! writes. Because the link takes ownership of the transport, the device
//! handle is what a test keeps to inspect traffic afterwards.
//!
//! # Example
//!
//! ```
//! use botlink_test_harness::MockDevice;
//!
//! let device = MockDevice::new();
//! // When the link writes this packet, queue this reply for the next read.
//! device.expect(&[2, 1, 5], b"OK");
//! ```

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::Notify;

use botlink_core::error::{Error, Result};
use botlink_core::transport::Transport;

/// A pre-loaded request/response pair.
#[derive(Debug, Clone)]
struct Expectation {
    /// The exact bytes we expect to be written.
    request: Vec<u8>,
    /// The bytes to make readable once the matching request is written.
    response: Vec<u8>,
}

/// How the next write or read should fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IoFailure {
    /// Return [`Error::ConnectionLost`], as a dropped Bluetooth link does.
    ConnectionLost,
    /// Return a broken-pipe [`Error::Io`].
    BrokenPipe,
}

impl IoFailure {
    fn into_error(self) -> Error {
        match self {
            IoFailure::ConnectionLost => Error::ConnectionLost,
            IoFailure::BrokenPipe => Error::Io(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "broken pipe",
            )),
        }
    }
}

#[derive(Debug, Default)]
struct DeviceState {
    expectations: VecDeque<Expectation>,
    readable: VecDeque<u8>,
    sent_log: Vec<Vec<u8>>,
    open: bool,
    stall_writes: bool,
    next_write_failure: Option<IoFailure>,
    next_read_failure: Option<IoFailure>,
    fail_close: bool,
    open_count: usize,
    close_count: usize,
}

/// Shared state of one simulated device.
#[derive(Debug, Clone, Default)]
pub struct MockDevice {
    state: Arc<Mutex<DeviceState>>,
    data_ready: Arc<Notify>,
}

impl MockDevice {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an expected request/response pair.
    ///
    /// While expectations remain, each write must match the next one or it
    /// fails with [`Error::Protocol`]. A matching write makes `response`
    /// readable.
    pub fn expect(&self, request: &[u8], response: &[u8]) {
        self.lock().expectations.push_back(Expectation {
            request: request.to_vec(),
            response: response.to_vec(),
        });
    }

    /// Make `bytes` readable without waiting for a write.
    pub fn push_response(&self, bytes: &[u8]) {
        self.lock().readable.extend(bytes.iter().copied());
        self.data_ready.notify_one();
    }

    /// Every buffer written to this device, one entry per `send()` call.
    pub fn sent_data(&self) -> Vec<Vec<u8>> {
        self.lock().sent_log.clone()
    }

    /// Number of expectations that have not yet been consumed.
    pub fn remaining_expectations(&self) -> usize {
        self.lock().expectations.len()
    }

    /// When set, writes never complete (the caller's timeout must fire).
    pub fn set_stall_writes(&self, stall: bool) {
        self.lock().stall_writes = stall;
    }

    /// Make the next write fail once.
    pub fn fail_next_write(&self, failure: IoFailure) {
        self.lock().next_write_failure = Some(failure);
    }

    /// Make the next read fail once, waking a read already waiting for data.
    pub fn fail_next_read(&self, failure: IoFailure) {
        self.lock().next_read_failure = Some(failure);
        self.data_ready.notify_one();
    }

    /// When set, `close()` reports an error (after closing anyway).
    pub fn set_fail_close(&self, fail: bool) {
        self.lock().fail_close = fail;
    }

    /// Whether a transport on this device is currently open.
    pub fn is_open(&self) -> bool {
        self.lock().open
    }

    pub fn open_count(&self) -> usize {
        self.lock().open_count
    }

    pub fn close_count(&self) -> usize {
        self.lock().close_count
    }

    fn lock(&self) -> MutexGuard<'_, DeviceState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// A mock [`Transport`] bound to a [`MockDevice`].
#[derive(Debug)]
pub struct MockTransport {
    device: MockDevice,
    connected: bool,
}

impl MockTransport {
    /// Open a transport on `device`.
    pub fn new(device: MockDevice) -> Self {
        {
            let mut state = device.lock();
            state.open = true;
            state.open_count += 1;
        }
        MockTransport {
            device,
            connected: true,
        }
    }

    pub fn device(&self) -> &MockDevice {
        &self.device
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&mut self, data: &[u8]) -> Result<()> {
        if !self.connected {
            return Err(Error::NotConnected);
        }

        let stall = {
            let mut state = self.device.lock();
            if let Some(failure) = state.next_write_failure.take() {
                return Err(failure.into_error());
            }
            state.stall_writes
        };

        if stall {
            std::future::pending::<()>().await;
        }

        let mut state = self.device.lock();
        state.sent_log.push(data.to_vec());

        if let Some(expectation) = state.expectations.pop_front() {
            if data != expectation.request.as_slice() {
                return Err(Error::Protocol(format!(
                    "unexpected send data: expected {:02X?}, got {:02X?}",
                    expectation.request, data
                )));
            }
            state.readable.extend(expectation.response);
            drop(state);
            self.device.data_ready.notify_one();
        }
        Ok(())
    }

    async fn receive(&mut self, buf: &mut [u8]) -> Result<usize> {
        loop {
            if !self.connected {
                return Err(Error::NotConnected);
            }
            {
                let mut state = self.device.lock();
                if let Some(failure) = state.next_read_failure.take() {
                    return Err(failure.into_error());
                }
                if !state.readable.is_empty() {
                    let n = state.readable.len().min(buf.len());
                    for (slot, byte) in buf.iter_mut().zip(state.readable.drain(..n)) {
                        *slot = byte;
                    }
                    return Ok(n);
                }
            }
            self.device.data_ready.notified().await;
        }
    }

    async fn close(&mut self) -> Result<()> {
        if !self.connected {
            return Ok(());
        }
        self.connected = false;
        let mut state = self.device.lock();
        state.open = false;
        state.close_count += 1;
        if state.fail_close {
            return Err(Error::Transport("device refused to close".into()));
        }
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected
    }
}
