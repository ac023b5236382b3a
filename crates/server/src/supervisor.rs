//! Process-level shutdown handling.
//!
//! Termination signals flip a one-shot flag; the main flow waits on it and
//! then stops the service exactly once.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use service::ManagedStore;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::controller::KvService;
use crate::errors::ShutdownError;

/// One-shot shutdown request. The first `request` wins; later ones are ignored.
#[derive(Debug, Default)]
pub struct ShutdownSignal {
    requested: AtomicBool,
    notify: Notify,
}

impl ShutdownSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` only for the call that actually requested shutdown.
    pub fn request(&self) -> bool {
        if self.requested.swap(true, Ordering::SeqCst) {
            return false;
        }
        self.notify.notify_waiters();
        true
    }

    pub fn is_requested(&self) -> bool {
        self.requested.load(Ordering::SeqCst)
    }

    /// Resolve once shutdown has been requested.
    pub async fn wait(&self) {
        loop {
            // register before checking so a concurrent request is not missed
            let notified = self.notify.notified();
            if self.is_requested() {
                return;
            }
            notified.await;
        }
    }
}

/// Route SIGINT, SIGTERM, SIGHUP and SIGQUIT into `shutdown`.
#[cfg(unix)]
pub fn install_signal_handlers(shutdown: Arc<ShutdownSignal>) -> std::io::Result<JoinHandle<()>> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut interrupt = signal(SignalKind::interrupt())?;
    let mut terminate = signal(SignalKind::terminate())?;
    let mut hangup = signal(SignalKind::hangup())?;
    let mut quit = signal(SignalKind::quit())?;

    Ok(tokio::spawn(async move {
        loop {
            let name = tokio::select! {
                _ = interrupt.recv() => "SIGINT",
                _ = terminate.recv() => "SIGTERM",
                _ = hangup.recv() => "SIGHUP",
                _ = quit.recv() => "SIGQUIT",
            };
            note_signal(&shutdown, name);
        }
    }))
}

/// Route Ctrl+C into `shutdown`.
#[cfg(not(unix))]
pub fn install_signal_handlers(shutdown: Arc<ShutdownSignal>) -> std::io::Result<JoinHandle<()>> {
    Ok(tokio::spawn(async move {
        while tokio::signal::ctrl_c().await.is_ok() {
            note_signal(&shutdown, "ctrl_c");
        }
    }))
}

fn note_signal(shutdown: &ShutdownSignal, name: &str) {
    if shutdown.request() {
        info!(event = "shutdown_signal", signal = name, "shutdown requested");
    } else {
        debug!(signal = name, "shutdown already in progress; signal ignored");
    }
}

/// Block until shutdown is requested, then stop the service.
pub async fn run_until_shutdown<S: ManagedStore>(
    service: &KvService<S>,
    shutdown: &ShutdownSignal,
) -> Result<(), ShutdownError> {
    shutdown.wait().await;
    service.stop().await
}
