//! SerialLink behaviour against mock devices.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use botlink_core::{Error, LinkConfig, SerialLink, SessionEnd};
use botlink_test_harness::{IoFailure, MockConnector, MockDevice};

fn fast_config() -> LinkConfig {
    LinkConfig {
        read_timeout: Duration::from_millis(50),
        write_timeout: Duration::from_millis(50),
        open_timeout: Duration::from_millis(500),
    }
}

fn link_with(connector: &MockConnector) -> SerialLink {
    SerialLink::with_config(Box::new(connector.clone()), fast_config())
}

/// One port, polled and selected.
fn selected_link(name: &str) -> (SerialLink, MockConnector, MockDevice) {
    let connector = MockConnector::new();
    let device = connector.add_port(name, "Bluetooth");
    let link = link_with(&connector);
    let ports = link.poll_ports().unwrap();
    link.select_port(&ports[0]).unwrap();
    (link, connector, device)
}

#[test]
fn poll_twice_lists_same_ports() {
    let connector = MockConnector::new();
    connector.add_port("/dev/rfcomm0", "Bluetooth");
    connector.add_port("/dev/ttyUSB0", "USB");
    let link = link_with(&connector);

    let first: Vec<String> = link.poll_ports().unwrap().iter().map(|p| p.name().to_string()).collect();
    let second: Vec<String> = link.poll_ports().unwrap().iter().map(|p| p.name().to_string()).collect();
    assert_eq!(first, ["/dev/rfcomm0", "/dev/ttyUSB0"]);
    assert_eq!(first, second);
    assert_eq!(link.ports().len(), 2);
}

#[test]
fn stale_descriptor_is_rejected() {
    let connector = MockConnector::new();
    connector.add_port("COM5", "Bluetooth");
    let link = link_with(&connector);

    let old = link.poll_ports().unwrap();
    link.poll_ports().unwrap();

    let err = link.select_port(&old[0]).unwrap_err();
    assert!(matches!(err, Error::UnknownPort(ref name) if name == "COM5"));
    assert!(!link.is_ready());

    let fresh = link.ports();
    link.select_port(&fresh[0]).unwrap();
    assert!(link.is_ready());
    assert_eq!(link.selected_port().unwrap().name(), "COM5");
}

#[test]
fn descriptor_from_another_link_is_rejected() {
    let connector = MockConnector::new();
    connector.add_port("COM5", "Bluetooth");
    let a = link_with(&connector);
    let b = link_with(&MockConnector::new());

    let ports = a.poll_ports().unwrap();
    b.poll_ports().unwrap();
    assert!(matches!(b.select_port(&ports[0]), Err(Error::UnknownPort(_))));
}

#[test]
fn poll_publishes_even_when_empty() {
    let link = link_with(&MockConnector::new());
    let calls = Arc::new(AtomicUsize::new(0));
    let seen = calls.clone();
    link.subscribe(move |link| {
        assert!(link.ports().is_empty());
        seen.fetch_add(1, Ordering::SeqCst);
    });

    assert!(link.poll_ports().unwrap().is_empty());
    link.poll_ports().unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[test]
fn listing_failure_empties_list_and_still_publishes() {
    let connector = MockConnector::new();
    connector.add_port("COM5", "");
    let link = link_with(&connector);
    link.poll_ports().unwrap();

    let calls = Arc::new(AtomicUsize::new(0));
    let seen = calls.clone();
    link.subscribe(move |_| {
        seen.fetch_add(1, Ordering::SeqCst);
    });

    connector.fail_listing(Some("enumeration unavailable"));
    assert!(matches!(link.poll_ports(), Err(Error::Transport(_))));
    assert!(link.ports().is_empty());
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn operations_without_selection_fail() {
    let link = link_with(&MockConnector::new());
    assert!(!link.is_ready());
    assert!(matches!(link.open().await, Err(Error::NoPortSelected)));
    assert!(matches!(link.write(&[0]).await, Err(Error::NoPortSelected)));
    assert!(matches!(link.read(1).await, Err(Error::NoPortSelected)));
}

#[tokio::test]
async fn write_opens_lazily() {
    let (link, _connector, device) = selected_link("/dev/rfcomm0");
    assert_eq!(device.open_count(), 0);
    assert!(!link.is_open().await);

    link.write(&[2, 1, 5]).await.unwrap();
    link.write(&[0]).await.unwrap();

    assert!(link.is_open().await);
    assert_eq!(device.open_count(), 1);
    assert_eq!(device.sent_data(), vec![vec![2, 1, 5], vec![0]]);
}

#[tokio::test]
async fn open_is_idempotent() {
    let (link, _connector, device) = selected_link("COM5");
    link.open().await.unwrap();
    link.open().await.unwrap();
    assert_eq!(device.open_count(), 1);
}

#[tokio::test]
async fn open_failure_is_reported() {
    let (link, connector, _device) = selected_link("COM5");
    connector.fail_open("COM5", "device busy");

    let err = link.open().await.unwrap_err();
    assert_eq!(err.to_string(), "failed to open COM5: device busy");
    assert!(!link.is_open().await);

    let err = link.write(&[0]).await.unwrap_err();
    assert!(matches!(err, Error::OpenFailed { .. }));
}

#[tokio::test(start_paused = true)]
async fn open_timeout_becomes_open_failure() {
    let (link, connector, _device) = selected_link("COM5");
    connector.set_open_delay(Some(Duration::from_secs(30)));

    let err = link.open().await.unwrap_err();
    assert!(matches!(err, Error::OpenFailed { ref reason, .. } if reason == "timed out"));
}

#[tokio::test(start_paused = true)]
async fn stalled_write_times_out() {
    let (link, _connector, device) = selected_link("COM5");
    device.set_stall_writes(true);

    assert!(matches!(link.write(&[1, 1]).await, Err(Error::WriteTimeout)));
    // The handle survives a timeout.
    assert!(link.is_open().await);

    device.set_stall_writes(false);
    link.write(&[1, 1]).await.unwrap();
    assert_eq!(device.open_count(), 1);
}

#[tokio::test]
async fn connection_lost_drops_handle_and_next_write_reopens() {
    let (link, _connector, device) = selected_link("COM5");
    link.open().await.unwrap();

    device.fail_next_write(IoFailure::ConnectionLost);
    assert!(matches!(link.write(&[0]).await, Err(Error::ConnectionLost)));
    assert!(!link.is_open().await);
    assert_eq!(device.close_count(), 1);

    link.write(&[0]).await.unwrap();
    assert_eq!(device.open_count(), 2);
}

#[tokio::test(start_paused = true)]
async fn read_with_no_data_returns_empty() {
    let (link, _connector, _device) = selected_link("COM5");
    let bytes = link.read(4).await.unwrap();
    assert!(bytes.is_empty());
}

#[tokio::test(start_paused = true)]
async fn read_returns_partial_data_when_window_elapses() {
    let (link, _connector, device) = selected_link("COM5");
    link.open().await.unwrap();
    device.push_response(&[0x4F, 0x4B]);

    assert_eq!(link.read(8).await.unwrap(), vec![0x4F, 0x4B]);
}

#[tokio::test]
async fn read_stops_at_requested_length() {
    let (link, _connector, device) = selected_link("COM5");
    link.open().await.unwrap();
    device.push_response(&[1, 2, 3, 4, 5]);

    assert_eq!(link.read(3).await.unwrap(), vec![1, 2, 3]);
    assert_eq!(link.read(3).await.unwrap(), vec![4, 5]);
}

#[tokio::test]
async fn read_collects_reply_to_write() {
    let (link, _connector, device) = selected_link("COM5");
    device.expect(&[1, 6], b"ACK");

    link.write(&[1, 6]).await.unwrap();
    assert_eq!(link.read(3).await.unwrap(), b"ACK");
    assert_eq!(device.remaining_expectations(), 0);
}

#[tokio::test]
async fn probe_writes_ascii_zero() {
    let (link, _connector, device) = selected_link("COM5");
    link.probe().await.unwrap();
    assert_eq!(device.sent_data(), vec![b"0".to_vec()]);
}

#[tokio::test(start_paused = true)]
async fn close_unblocks_stalled_write() {
    let connector = MockConnector::new();
    let device = connector.add_port("COM5", "Bluetooth");
    let config = LinkConfig {
        write_timeout: Duration::from_secs(60),
        ..fast_config()
    };
    let link = Arc::new(SerialLink::with_config(Box::new(connector), config));
    let ports = link.poll_ports().unwrap();
    link.select_port(&ports[0]).unwrap();
    link.open().await.unwrap();
    device.set_stall_writes(true);

    let writer = {
        let link = link.clone();
        tokio::spawn(async move { link.write(&[3, 1, 1, 1]).await })
    };
    tokio::time::sleep(Duration::from_millis(10)).await;

    link.close().await;
    let result = writer.await.unwrap();
    assert!(matches!(result, Err(Error::DeviceClosed)));
    assert!(!device.is_open());
}

#[tokio::test]
async fn close_is_idempotent_and_swallows_close_errors() {
    let (link, _connector, device) = selected_link("COM5");
    link.open().await.unwrap();
    device.set_fail_close(true);

    link.close().await;
    link.close().await;
    assert!(!link.is_open().await);
    assert!(!device.is_open());
    assert_eq!(device.close_count(), 1);

    // Closing a link that was never opened is fine too.
    link_with(&MockConnector::new()).close().await;
}

#[tokio::test]
async fn selecting_another_port_replaces_handle_on_next_write() {
    let connector = MockConnector::new();
    let first = connector.add_port("COM5", "Bluetooth");
    let second = connector.add_port("COM6", "Bluetooth");
    let link = link_with(&connector);
    let ports = link.poll_ports().unwrap();

    link.select_port(&ports[0]).unwrap();
    link.write(&[0]).await.unwrap();

    link.select_port(&ports[1]).unwrap();
    link.write(&[1, 4]).await.unwrap();

    assert!(!first.is_open());
    assert!(second.is_open());
    assert_eq!(first.sent_data(), vec![vec![0]]);
    assert_eq!(second.sent_data(), vec![vec![1, 4]]);
}

#[tokio::test]
async fn repoll_moves_selection_to_fresh_descriptor() {
    let (link, _connector, device) = selected_link("COM5");
    link.poll_ports().unwrap();

    let selected = link.selected_port().unwrap();
    assert_eq!(selected, link.ports()[0]);
    // The refreshed selection is accepted again by select_port.
    link.select_port(&selected).unwrap();

    link.open().await.unwrap();
    assert_eq!(device.open_count(), 1);
}

#[tokio::test]
async fn repoll_clears_selection_when_device_disappears() {
    let (link, connector, device) = selected_link("COM5");
    connector.remove_port("COM5");
    link.poll_ports().unwrap();

    assert!(link.ports().is_empty());
    assert!(!link.is_ready());
    assert!(link.selected_port().is_none());
    assert!(matches!(link.open().await, Err(Error::NoPortSelected)));
    assert!(matches!(link.write(&[0]).await, Err(Error::NoPortSelected)));
    assert_eq!(device.open_count(), 0);
}

#[test]
fn repoll_keeps_selection_when_listing_still_has_it() {
    let connector = MockConnector::new();
    connector.add_port("COM5", "");
    connector.add_port("COM6", "");
    let link = link_with(&connector);
    let ports = link.poll_ports().unwrap();
    link.select_port(&ports[1]).unwrap();

    connector.remove_port("COM5");
    link.poll_ports().unwrap();
    assert_eq!(link.selected_port().unwrap().name(), "COM6");
}

fn record_session_ends(link: &SerialLink) -> Arc<Mutex<Vec<SessionEnd>>> {
    let ends = Arc::new(Mutex::new(Vec::new()));
    let log = ends.clone();
    link.on_session_end(move |end| log.lock().unwrap().push(end.clone()));
    ends
}

#[tokio::test]
async fn read_failure_publishes_session_end() {
    let (link, _connector, device) = selected_link("COM5");
    let ends = record_session_ends(&link);
    link.open().await.unwrap();

    device.fail_next_read(IoFailure::ConnectionLost);
    assert!(matches!(link.read(4).await, Err(Error::ConnectionLost)));
    assert!(!link.is_open().await);
    assert_eq!(
        *ends.lock().unwrap(),
        [SessionEnd::Failed("connection lost".into())]
    );
}

#[tokio::test]
async fn close_publishes_session_end_only_when_open() {
    let (link, _connector, _device) = selected_link("COM5");
    let ends = record_session_ends(&link);

    link.close().await;
    assert!(ends.lock().unwrap().is_empty());

    link.open().await.unwrap();
    link.close().await;
    link.close().await;
    assert_eq!(*ends.lock().unwrap(), [SessionEnd::Closed]);
}

#[tokio::test]
async fn failed_reopen_after_port_switch_publishes_session_end() {
    let connector = MockConnector::new();
    connector.add_port("COM5", "");
    connector.add_port("COM6", "");
    connector.fail_open("COM6", "device busy");
    let link = link_with(&connector);
    let ends = record_session_ends(&link);
    let ports = link.poll_ports().unwrap();

    link.select_port(&ports[0]).unwrap();
    link.open().await.unwrap();
    link.select_port(&ports[1]).unwrap();

    assert!(matches!(link.write(&[0]).await, Err(Error::OpenFailed { .. })));
    assert!(!link.is_open().await);
    assert_eq!(
        *ends.lock().unwrap(),
        [SessionEnd::Failed("failed to open COM6: device busy".into())]
    );
}
