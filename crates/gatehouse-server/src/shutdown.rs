//! Graceful shutdown.
//!
//! A [`ShutdownSignal`] wraps a [`CancellationToken`]. Triggering it stops
//! the accept loop and asks every open connection to close once its current
//! request is answered. In-flight requests keep running: their tokens hang
//! off a separate server abort token that fires only when the drain bound
//! (`shutdown_timeout`) runs out.
//!
//! [`ShutdownSignal::child_token`] is meant for background tasks that should
//! stop as soon as shutdown begins.
//!
//! # Example
//!
//! ```
//! use gatehouse_server::ShutdownSignal;
//!
//! let shutdown = ShutdownSignal::new();
//! let sweeper = shutdown.child_token();
//!
//! shutdown.trigger();
//! assert!(shutdown.is_shutdown());
//! assert!(sweeper.is_cancelled());
//! ```

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::Notify;
use tokio_util::sync::{CancellationToken, WaitForCancellationFuture};

/// Server-wide shutdown trigger.
#[derive(Debug, Clone, Default)]
pub struct ShutdownSignal {
    token: CancellationToken,
}

impl ShutdownSignal {
    /// Creates an untriggered signal.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Wraps an existing token, e.g. one owned by an embedding application.
    #[must_use]
    pub const fn from_token(token: CancellationToken) -> Self {
        Self { token }
    }

    /// Triggers shutdown. Idempotent.
    pub fn trigger(&self) {
        if !self.token.is_cancelled() {
            tracing::info!("shutdown triggered");
        }
        self.token.cancel();
    }

    /// Returns `true` once shutdown has been triggered.
    #[must_use]
    pub fn is_shutdown(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Completes when shutdown is triggered, immediately if it already was.
    pub fn recv(&self) -> WaitForCancellationFuture<'_> {
        self.token.cancelled()
    }

    /// Returns a token cancelled together with this signal, for background
    /// work. Request contexts do not use it.
    #[must_use]
    pub fn child_token(&self) -> CancellationToken {
        self.token.child_token()
    }

    /// Creates a signal triggered by SIGTERM or SIGINT.
    ///
    /// Must be called from within a Tokio runtime. If the handlers cannot be
    /// registered the failure is logged and the signal only fires when
    /// triggered manually.
    #[must_use]
    pub fn with_os_signals() -> Self {
        let signal = Self::new();
        let trigger = signal.clone();

        tokio::spawn(async move {
            match wait_for_os_signal().await {
                Ok(name) => {
                    tracing::info!(signal = name, "received signal, initiating graceful shutdown");
                    trigger.trigger();
                }
                Err(err) => {
                    tracing::error!(err = %err, "could not install signal handlers");
                }
            }
        });

        signal
    }
}

#[cfg(unix)]
async fn wait_for_os_signal() -> std::io::Result<&'static str> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;

    tokio::select! {
        _ = sigterm.recv() => Ok("SIGTERM"),
        _ = sigint.recv() => Ok("SIGINT"),
    }
}

#[cfg(not(unix))]
async fn wait_for_os_signal() -> std::io::Result<&'static str> {
    tokio::signal::ctrl_c().await?;
    Ok("ctrl-c")
}

/// Counts open connections so shutdown can wait for them to drain.
///
/// ```
/// use gatehouse_server::ConnectionTracker;
///
/// let tracker = ConnectionTracker::new();
/// let token = tracker.acquire();
/// assert_eq!(tracker.active_connections(), 1);
///
/// drop(token);
/// assert_eq!(tracker.active_connections(), 0);
/// ```
#[derive(Debug, Clone, Default)]
pub struct ConnectionTracker {
    active: Arc<AtomicUsize>,
    notify: Arc<Notify>,
}

impl ConnectionTracker {
    /// Creates a tracker with no connections.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a connection until the returned token is dropped.
    #[must_use]
    pub fn acquire(&self) -> ConnectionToken {
        self.active.fetch_add(1, Ordering::SeqCst);
        ConnectionToken {
            active: Arc::clone(&self.active),
            notify: Arc::clone(&self.notify),
        }
    }

    /// Returns the number of open connections.
    #[must_use]
    pub fn active_connections(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    /// Waits until every connection token has been dropped.
    pub async fn wait_for_drain(&self) {
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if self.active.load(Ordering::SeqCst) == 0 {
                return;
            }
            notified.await;
        }
    }
}

/// An open connection. Dropping it releases the slot in the tracker.
#[derive(Debug)]
pub struct ConnectionToken {
    active: Arc<AtomicUsize>,
    notify: Arc<Notify>,
}

impl Drop for ConnectionToken {
    fn drop(&mut self) {
        if self.active.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.notify.notify_waiters();
        }
    }
}
