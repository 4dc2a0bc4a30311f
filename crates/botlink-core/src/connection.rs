//! Connection lifecycle for the serial link.
//!
//! [`ConnectionMachine`] tracks whether the robot link is
//! [`Disconnected`](ConnectionState::Disconnected),
//! [`Connecting`](ConnectionState::Connecting) or
//! [`Connected`](ConnectionState::Connected), driven by the outcome of
//! [`SerialLink::open`]. Each transition publishes exactly one notification;
//! listeners read the new state and, after a failure, the reason.
//!
//! The machine also follows the link's [`SessionEnd`] notifications, so a
//! read failure or a `close()` issued directly on the link still returns it
//! to `Disconnected`.
//!
//! ```text
//! Disconnected --open_connection()------> Connecting
//! Connecting   --open ok--------------->  Connected
//! Connecting   --open failed----------->  Disconnected (reason recorded)
//! Connecting   --close()--------------->  Disconnected
//! Connected    --close()/link_lost----->  Disconnected
//! Connected    --link session ended---->  Disconnected
//! ```

use std::fmt;
use std::sync::{Arc, Mutex, Weak};

use crate::error::{Error, Result};
use crate::helpers::lock;
use crate::link::{SerialLink, SessionEnd};
use crate::notifier::{Notifier, SubscriptionId};

/// State of the robot link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ConnectionState::Disconnected => "Not Connected",
            ConnectionState::Connecting => "Connecting",
            ConnectionState::Connected => "Connected",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Default)]
struct Status {
    state: ConnectionState,
    last_failure: Option<String>,
    // Bumped by close(); an open that started under an older epoch is void.
    epoch: u64,
}

/// Owner of the [`ConnectionState`] for one [`SerialLink`].
pub struct ConnectionMachine {
    link: Arc<SerialLink>,
    status: Mutex<Status>,
    notifier: Notifier<ConnectionMachine>,
    session_listener: SubscriptionId,
}

impl ConnectionMachine {
    /// Create a machine for `link`, starting `Disconnected`.
    ///
    /// The machine listens for the link's session ends until it is dropped.
    pub fn new(link: Arc<SerialLink>) -> Arc<Self> {
        Arc::new_cyclic(|weak: &Weak<ConnectionMachine>| {
            let weak = weak.clone();
            let session_listener = link.on_session_end(move |end| {
                if let Some(machine) = weak.upgrade() {
                    machine.session_ended(end);
                }
            });
            ConnectionMachine {
                link,
                status: Mutex::new(Status::default()),
                notifier: Notifier::new(),
                session_listener,
            }
        })
    }

    pub fn link(&self) -> &Arc<SerialLink> {
        &self.link
    }

    pub fn state(&self) -> ConnectionState {
        lock(&self.status).state
    }

    /// Reason for the most recent failed connect or link loss. Cleared by a
    /// successful connect.
    pub fn last_failure(&self) -> Option<String> {
        lock(&self.status).last_failure.clone()
    }

    /// Open the link, moving through `Connecting`.
    ///
    /// Returns immediately with success if already `Connected`, and fails
    /// with [`Error::AlreadyConnecting`] if another attempt is in flight. On
    /// failure the machine returns to `Disconnected` and the error is both
    /// recorded and returned. A [`close`](Self::close) issued while the
    /// attempt is in flight wins: the attempt fails with
    /// [`Error::DeviceClosed`] and the link is left closed.
    pub async fn open_connection(&self) -> Result<()> {
        let epoch = {
            let mut status = lock(&self.status);
            match status.state {
                ConnectionState::Connected => return Ok(()),
                ConnectionState::Connecting => return Err(Error::AlreadyConnecting),
                ConnectionState::Disconnected => status.state = ConnectionState::Connecting,
            }
            status.epoch
        };
        tracing::debug!("Connecting");
        self.notifier.publish(self);

        let opened = self.link.open().await;

        let current = {
            let mut status = lock(&self.status);
            let current = status.epoch == epoch && status.state == ConnectionState::Connecting;
            if current {
                match &opened {
                    Ok(()) => {
                        status.state = ConnectionState::Connected;
                        status.last_failure = None;
                    }
                    Err(e) => {
                        status.state = ConnectionState::Disconnected;
                        status.last_failure = Some(e.to_string());
                    }
                }
            }
            current
        };

        if !current {
            tracing::debug!("Connection attempt cancelled by close");
            // The open may have completed after close() released the link.
            self.link.close().await;
            return opened.and(Err(Error::DeviceClosed));
        }

        match &opened {
            Ok(()) => tracing::info!("Connected"),
            Err(e) => tracing::warn!(error = %e, "Connection attempt failed"),
        }
        self.notifier.publish(self);
        opened
    }

    /// Close the link. Infallible; a no-op transition-wise when already
    /// `Disconnected`.
    pub async fn close(&self) {
        let previous = {
            let mut status = lock(&self.status);
            status.epoch += 1;
            let previous = status.state;
            status.state = ConnectionState::Disconnected;
            status.last_failure = None;
            previous
        };
        self.link.close().await;
        if previous != ConnectionState::Disconnected {
            tracing::info!("Disconnected");
            self.notifier.publish(self);
        }
    }

    /// Record that the link failed underneath an established connection.
    ///
    /// Moves `Connected` to `Disconnected`. Ignored in any other state, since
    /// a failure while `Connecting` is reported by `open_connection` itself.
    pub fn link_lost(&self, reason: impl Into<String>) {
        self.drop_connected(Some(reason.into()));
    }

    /// Register a listener called after every state transition.
    pub fn subscribe<F>(&self, listener: F) -> SubscriptionId
    where
        F: Fn(&ConnectionMachine) + Send + Sync + 'static,
    {
        self.notifier.subscribe(listener)
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.notifier.unsubscribe(id)
    }

    fn session_ended(&self, end: &SessionEnd) {
        match end {
            SessionEnd::Closed => self.drop_connected(None),
            SessionEnd::Failed(reason) => self.drop_connected(Some(reason.clone())),
        }
    }

    /// `Connected` to `Disconnected`, recording `reason`. Ignored otherwise.
    fn drop_connected(&self, reason: Option<String>) {
        {
            let mut status = lock(&self.status);
            if status.state != ConnectionState::Connected {
                return;
            }
            status.state = ConnectionState::Disconnected;
            status.last_failure = reason.clone();
        }
        match reason {
            Some(reason) => tracing::warn!(reason = %reason, "Link lost"),
            None => tracing::info!("Link closed"),
        }
        self.notifier.publish(self);
    }
}

impl Drop for ConnectionMachine {
    fn drop(&mut self) {
        self.link.unsubscribe_session_end(self.session_listener);
    }
}

impl fmt::Debug for ConnectionMachine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let status = lock(&self.status);
        f.debug_struct("ConnectionMachine")
            .field("state", &status.state)
            .field("last_failure", &status.last_failure)
            .finish_non_exhaustive()
    }
}
