//! Shutdown coordination.
//!
//! - [`ShutdownSignal`]: a cloneable one-shot trigger. The server uses one
//!   internally to stop its accept loop and connections; callers pass
//!   another to [`RunningServer::await_shutdown`](crate::RunningServer::await_shutdown)
//!   as the cancellation source.
//! - [`ConnectionTracker`]: counts open connections so shutdown can wait
//!   for them to drain.
//! - [`OsSignals`]: SIGINT/SIGTERM delivery.

use std::io;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::Notify;
use tokio::task::JoinHandle;

/// A signal that can be used to trigger and await shutdown.
///
/// All clones observe the same trigger.
///
/// # Example
///
/// ```rust
/// use webdiag_server::ShutdownSignal;
///
/// let shutdown = ShutdownSignal::new();
/// let observer = shutdown.clone();
///
/// shutdown.trigger();
/// assert!(observer.is_shutdown());
/// ```
#[derive(Debug, Clone)]
pub struct ShutdownSignal {
    triggered: Arc<AtomicBool>,
    notify: Arc<Notify>,
}

impl ShutdownSignal {
    /// Creates an untriggered signal.
    #[must_use]
    pub fn new() -> Self {
        Self {
            triggered: Arc::new(AtomicBool::new(false)),
            notify: Arc::new(Notify::new()),
        }
    }

    /// Triggers the signal, waking every waiter. Idempotent.
    pub fn trigger(&self) {
        if self
            .triggered
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
        {
            self.notify.notify_waiters();
        }
    }

    /// Returns `true` once [`trigger`](Self::trigger) has been called.
    #[must_use]
    pub fn is_shutdown(&self) -> bool {
        self.triggered.load(Ordering::SeqCst)
    }

    /// Completes once the signal is triggered, immediately if it already was.
    pub async fn recv(&self) {
        let notified = self.notify.notified();
        tokio::pin!(notified);
        // Register before checking the flag so a concurrent trigger is not lost.
        notified.as_mut().enable();

        if self.is_shutdown() {
            return;
        }
        notified.await;
    }
}

impl Default for ShutdownSignal {
    fn default() -> Self {
        Self::new()
    }
}

/// Counts open connections.
///
/// Each connection task holds a [`ConnectionToken`]; dropping the last one
/// wakes [`wait_for_shutdown`](Self::wait_for_shutdown).
///
/// ```rust
/// use webdiag_server::ConnectionTracker;
///
/// let tracker = ConnectionTracker::new();
/// let token = tracker.acquire();
/// assert_eq!(tracker.active_connections(), 1);
///
/// drop(token);
/// assert_eq!(tracker.active_connections(), 0);
/// ```
#[derive(Debug, Clone)]
pub struct ConnectionTracker {
    active: Arc<AtomicUsize>,
    notify: Arc<Notify>,
}

impl ConnectionTracker {
    /// Creates a tracker with no connections.
    #[must_use]
    pub fn new() -> Self {
        Self {
            active: Arc::new(AtomicUsize::new(0)),
            notify: Arc::new(Notify::new()),
        }
    }

    /// Registers a connection. Hold the token for the connection's lifetime.
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

    /// Waits until no connections are open.
    pub async fn wait_for_shutdown(&self) {
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

impl Default for ConnectionTracker {
    fn default() -> Self {
        Self::new()
    }
}

/// An open connection, released on drop.
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

/// A shutdown-requesting OS signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalKind {
    /// SIGINT (Ctrl+C).
    Interrupt,
    /// SIGTERM.
    Terminate,
}

impl SignalKind {
    /// Returns the POSIX signal number.
    #[must_use]
    pub const fn number(self) -> i32 {
        match self {
            Self::Interrupt => 2,
            Self::Terminate => 15,
        }
    }

    /// Returns the conventional signal name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Interrupt => "SIGINT",
            Self::Terminate => "SIGTERM",
        }
    }

    /// Exit status of a process killed by this signal.
    #[must_use]
    pub const fn exit_code(self) -> i32 {
        128 + self.number()
    }
}

impl std::fmt::Display for SignalKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Registered SIGINT and SIGTERM handlers.
///
/// Once registered the runtime owns these signals for the rest of the
/// process; the default disposition cannot be restored. Use
/// [`escalate`](Self::escalate) after the first signal so that a second one
/// still terminates the process.
#[derive(Debug)]
pub struct OsSignals {
    #[cfg(unix)]
    interrupt: tokio::signal::unix::Signal,
    #[cfg(unix)]
    terminate: tokio::signal::unix::Signal,
}

impl OsSignals {
    /// Installs the handlers. Must be called within a Tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns the I/O error if a handler cannot be installed.
    #[cfg(unix)]
    pub fn register() -> io::Result<Self> {
        use tokio::signal::unix::{signal, SignalKind as Kind};

        Ok(Self {
            interrupt: signal(Kind::interrupt())?,
            terminate: signal(Kind::terminate())?,
        })
    }

    /// Installs the Ctrl+C handler.
    ///
    /// # Errors
    ///
    /// Never fails on this platform; the signature matches Unix.
    #[cfg(not(unix))]
    pub fn register() -> io::Result<Self> {
        Ok(Self {})
    }

    /// Waits for the next SIGINT or SIGTERM.
    #[cfg(unix)]
    pub async fn recv(&mut self) -> SignalKind {
        tokio::select! {
            Some(()) = self.interrupt.recv() => SignalKind::Interrupt,
            Some(()) = self.terminate.recv() => SignalKind::Terminate,
            else => std::future::pending().await,
        }
    }

    /// Waits for the next Ctrl+C.
    #[cfg(not(unix))]
    pub async fn recv(&mut self) -> SignalKind {
        if tokio::signal::ctrl_c().await.is_err() {
            std::future::pending::<()>().await;
        }
        SignalKind::Interrupt
    }

    /// Spawns a watcher that exits the process on the next signal.
    ///
    /// The exit status is `128 + signal number`, what the shell reports
    /// for a process killed by that signal.
    pub fn escalate(mut self) -> JoinHandle<()> {
        tokio::spawn(async move {
            let signal = self.recv().await;
            tracing::error!(signal = %signal, "second signal received, exiting immediately");
            std::process::exit(signal.exit_code());
        })
    }
}
