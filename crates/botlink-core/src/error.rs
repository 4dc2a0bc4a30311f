//! Error types for botlink.
//!
//! All fallible operations across the workspace return [`Result<T>`], which
//! uses [`Error`] as the error type. Queue, packet, transport and
//! connection-lifecycle failures are all captured here.

/// The error type for all botlink operations.
///
/// Queue and packet errors are raised synchronously to the caller. Transport
/// errors surface from the link and additionally drive the connection state
/// back to `Disconnected` when they occur during a send.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A read, write or open was attempted before any port was selected.
    #[error("no port selected")]
    NoPortSelected,

    /// The port descriptor did not come from the most recent port poll.
    #[error("unknown port: {0}")]
    UnknownPort(String),

    /// The device could not be opened (missing, busy, permission denied).
    #[error("failed to open {port}: {reason}")]
    OpenFailed {
        /// Name of the port that failed to open.
        port: String,
        /// Reason reported by the operating system or driver.
        reason: String,
    },

    /// A write did not complete within the configured write window.
    #[error("timeout writing to device")]
    WriteTimeout,

    /// `remove_at` was called with an index past the end of the queue.
    #[error("index {index} out of range for queue of length {len}")]
    IndexOutOfRange {
        /// The rejected index.
        index: usize,
        /// Queue length at the time of the call.
        len: usize,
    },

    /// Appending would grow the queue past what a single packet can carry.
    #[error("instruction queue is full")]
    CapacityExceeded,

    /// A snapshot has more instructions than the one-byte length prefix allows.
    #[error("packet too large: {0} instructions")]
    PacketTooLarge(usize),

    /// A connection attempt is already in flight.
    #[error("connection attempt already in progress")]
    AlreadyConnecting,

    /// The device was closed while an operation was blocked on it.
    #[error("device closed")]
    DeviceClosed,

    /// A transport-level error (serial port enumeration, driver failure).
    #[error("transport error: {0}")]
    Transport(String),

    /// A malformed packet was decoded.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// The transport handle is not open.
    #[error("not connected")]
    NotConnected,

    /// The link to the device was lost unexpectedly.
    #[error("connection lost")]
    ConnectionLost,

    /// An underlying I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// A convenience `Result` alias using [`Error`] as the error type.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_no_port_selected() {
        assert_eq!(Error::NoPortSelected.to_string(), "no port selected");
    }

    #[test]
    fn error_display_unknown_port() {
        let e = Error::UnknownPort("/dev/rfcomm0".into());
        assert_eq!(e.to_string(), "unknown port: /dev/rfcomm0");
    }

    #[test]
    fn error_display_open_failed() {
        let e = Error::OpenFailed {
            port: "COM4".into(),
            reason: "access denied".into(),
        };
        assert_eq!(e.to_string(), "failed to open COM4: access denied");
    }

    #[test]
    fn error_display_write_timeout() {
        assert_eq!(Error::WriteTimeout.to_string(), "timeout writing to device");
    }

    #[test]
    fn error_display_index_out_of_range() {
        let e = Error::IndexOutOfRange { index: 7, len: 3 };
        assert_eq!(
            e.to_string(),
            "index 7 out of range for queue of length 3"
        );
    }

    #[test]
    fn error_display_capacity_and_packet_size() {
        assert_eq!(
            Error::CapacityExceeded.to_string(),
            "instruction queue is full"
        );
        assert_eq!(
            Error::PacketTooLarge(300).to_string(),
            "packet too large: 300 instructions"
        );
    }

    #[test]
    fn error_display_already_connecting() {
        assert_eq!(
            Error::AlreadyConnecting.to_string(),
            "connection attempt already in progress"
        );
    }

    #[test]
    fn error_display_device_closed() {
        assert_eq!(Error::DeviceClosed.to_string(), "device closed");
    }

    #[test]
    fn error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe broken");
        let e: Error = io_err.into();
        assert!(matches!(e, Error::Io(_)));
        assert!(e.to_string().contains("pipe broken"));
    }

    #[test]
    fn error_is_send_sync() {
        fn assert_send<T: Send>() {}
        fn assert_sync<T: Sync>() {}
        assert_send::<Error>();
        assert_sync::<Error>();
    }

    #[test]
    fn error_implements_std_error() {
        fn assert_std_error<T: std::error::Error>() {}
        assert_std_error::<Error>();
    }
}
