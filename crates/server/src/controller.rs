//! Service lifecycle: owns the storage handle and the HTTP listener.
//!
//! `Stopped -> Starting -> Running -> Stopping -> Stopped`. Transitions run
//! under one async mutex, so concurrent `start`/`stop` calls serialize and the
//! storage handle exists exactly while the service is running.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use service::{KvStore, ManagedStore, SledStore, StorageError};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{oneshot, Mutex};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

use crate::errors::{ShutdownError, StartupError};
use crate::routes;

const READY_TIMEOUT: Duration = Duration::from_secs(2);
const RELEASE_ATTEMPTS: usize = 100;
const RELEASE_BACKOFF: Duration = Duration::from_millis(10);

/// Immutable settings for one service instance.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub bind_address: String,
    pub bind_port: u16,
    pub storage_path: PathBuf,
}

impl From<&configs::AppConfig> for ServiceConfig {
    fn from(cfg: &configs::AppConfig) -> Self {
        Self {
            bind_address: cfg.server.address.clone(),
            bind_port: cfg.server.port,
            storage_path: cfg.storage.path.clone(),
        }
    }
}

/// Opens the store for one running period.
pub type StoreOpener<S> = Arc<dyn Fn(&Path) -> Result<S, StorageError> + Send + Sync>;

enum Lifecycle<S> {
    Stopped,
    Running(Running<S>),
}

struct Running<S> {
    store: Arc<S>,
    local_addr: SocketAddr,
    shutdown_tx: oneshot::Sender<()>,
    serve_task: JoinHandle<std::io::Result<()>>,
}

pub struct KvService<S = SledStore> {
    config: ServiceConfig,
    opener: StoreOpener<S>,
    lifecycle: Mutex<Lifecycle<S>>,
}

impl KvService<SledStore> {
    /// Service backed by sled at `config.storage_path`.
    pub fn new(config: ServiceConfig) -> Self {
        Self::with_opener(config, |path: &Path| SledStore::open(path))
    }
}

impl<S: ManagedStore> KvService<S> {
    pub fn with_opener<F>(config: ServiceConfig, opener: F) -> Self
    where
        F: Fn(&Path) -> Result<S, StorageError> + Send + Sync + 'static,
    {
        Self { config, opener: Arc::new(opener), lifecycle: Mutex::new(Lifecycle::Stopped) }
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    pub async fn is_running(&self) -> bool {
        matches!(*self.lifecycle.lock().await, Lifecycle::Running(_))
    }

    /// Address the listener is bound to while running.
    pub async fn local_addr(&self) -> Option<SocketAddr> {
        match &*self.lifecycle.lock().await {
            Lifecycle::Running(r) => Some(r.local_addr),
            Lifecycle::Stopped => None,
        }
    }

    /// Open storage, bind the listener and start serving in the background.
    ///
    /// Returns the bound address. Calling it while running is a no-op. On any
    /// failure the service stays stopped and the storage handle is released.
    pub async fn start(&self) -> Result<SocketAddr, StartupError> {
        let mut lifecycle = self.lifecycle.lock().await;
        if let Lifecycle::Running(r) = &*lifecycle {
            debug!(addr = %r.local_addr, "start requested while running");
            return Ok(r.local_addr);
        }

        let store = Arc::new((self.opener)(&self.config.storage_path)?);

        let addr = format!("{}:{}", self.config.bind_address, self.config.bind_port);
        let bind_to = (self.config.bind_address.as_str(), self.config.bind_port);
        let listener = match TcpListener::bind(bind_to).await {
            Ok(l) => l,
            Err(source) => {
                release_quietly(store).await;
                return Err(StartupError::Bind { addr, source });
            }
        };
        let local_addr = match listener.local_addr() {
            Ok(a) => a,
            Err(source) => {
                release_quietly(store).await;
                return Err(StartupError::Bind { addr, source });
            }
        };

        let handler_store: Arc<dyn KvStore> = store.clone();
        let app = routes::build_router(handler_store);
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let (ready_tx, ready_rx) = oneshot::channel::<()>();

        let serve_task = tokio::spawn(async move {
            let _ = ready_tx.send(());
            axum::serve(
                listener,
                app.into_make_service_with_connect_info::<SocketAddr>(),
            )
            .with_graceful_shutdown(async move {
                let _ = shutdown_rx.await;
            })
            .await
        });

        if let Err(reason) = confirm_accepting(ready_rx, local_addr).await {
            serve_task.abort();
            let _ = serve_task.await;
            release_quietly(store).await;
            return Err(StartupError::NotAccepting(reason));
        }

        info!(addr = %local_addr, storage = %self.config.storage_path.display(), "service running");
        *lifecycle = Lifecycle::Running(Running { store, local_addr, shutdown_tx, serve_task });
        Ok(local_addr)
    }

    /// Stop accepting, drain in-flight requests, then close storage.
    ///
    /// Calling it while stopped is a no-op. The service ends up stopped even
    /// when an error is returned.
    pub async fn stop(&self) -> Result<(), ShutdownError> {
        let mut lifecycle = self.lifecycle.lock().await;
        let running = match std::mem::replace(&mut *lifecycle, Lifecycle::Stopped) {
            Lifecycle::Stopped => {
                debug!("stop requested while stopped");
                return Ok(());
            }
            Lifecycle::Running(r) => r,
        };
        let Running { store, local_addr, shutdown_tx, serve_task } = running;

        info!(addr = %local_addr, "stopping service");
        let _ = shutdown_tx.send(());
        let served = serve_task.await;

        // all connections are drained at this point; storage goes last
        let released = release_store(store).await;

        let outcome = match served {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => {
                error!(error = %e, "serve loop ended with error");
                Err(ShutdownError::Serve(e))
            }
            Err(e) => {
                error!(error = %e, "serve task join failed");
                Err(ShutdownError::Task(e.to_string()))
            }
        };
        released?;
        outcome?;
        info!(addr = %local_addr, "service stopped");
        Ok(())
    }
}

/// Wait for the serve task to report in, then prove the socket accepts.
async fn confirm_accepting(ready: oneshot::Receiver<()>, addr: SocketAddr) -> Result<(), String> {
    match timeout(READY_TIMEOUT, ready).await {
        Ok(Ok(())) => {}
        Ok(Err(_)) => return Err("serve task exited before reporting readiness".into()),
        Err(_) => return Err("serve task did not report readiness in time".into()),
    }
    let probe = probe_addr(addr);
    match timeout(READY_TIMEOUT, TcpStream::connect(probe)).await {
        Ok(Ok(_stream)) => Ok(()),
        Ok(Err(e)) => Err(format!("connect probe to {probe} failed: {e}")),
        Err(_) => Err(format!("connect probe to {probe} timed out")),
    }
}

/// Wildcard binds are probed through loopback.
fn probe_addr(addr: SocketAddr) -> SocketAddr {
    match addr.ip() {
        IpAddr::V4(ip) if ip.is_unspecified() => SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), addr.port()),
        IpAddr::V6(ip) if ip.is_unspecified() => SocketAddr::new(IpAddr::V6(Ipv6Addr::LOCALHOST), addr.port()),
        _ => addr,
    }
}

/// Close the store once this is the last reference to it.
///
/// Connection tasks may still be dropping their router clones right after the
/// serve loop returns, so wait briefly for the count to reach one. A store
/// that stays shared is an error: it was neither flushed nor closed.
async fn release_store<S: ManagedStore>(mut store: Arc<S>) -> Result<(), ShutdownError> {
    for _ in 0..RELEASE_ATTEMPTS {
        match Arc::try_unwrap(store) {
            Ok(owned) => return Ok(owned.close()?),
            Err(shared) => {
                store = shared;
                tokio::time::sleep(RELEASE_BACKOFF).await;
            }
        }
    }
    let refs = Arc::strong_count(&store) - 1;
    error!(refs, "storage still referenced after drain; not closed");
    Err(ShutdownError::StorageBusy { refs })
}

async fn release_quietly<S: ManagedStore>(store: Arc<S>) {
    if let Err(e) = release_store(store).await {
        warn!(error = %e, "closing storage after failed start");
    }
}
