//! botlink-test-harness: mock devices and connectors for botlink.
//!
//! This crate provides [`MockConnector`] and [`MockTransport`] for
//! deterministic testing of the queue, link and connection lifecycle without
//! a robot or a serial adapter. [`MockDevice`] is the test-side handle used
//! to inspect written packets and script replies and failures.

pub mod mock_connector;
pub mod mock_serial;

pub use mock_connector::MockConnector;
pub use mock_serial::{MockDevice, MockTransport, IoFailure};
