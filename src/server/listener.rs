// ────────────────────────────────
// src/server/listener.rs
// Deferred-bind listener shared by the primary and upgrade surfaces.
// ────────────────────────────────
use arc_swap::ArcSwap;
use hyper::server::conn::Http;
use std::fmt;
use std::io;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{lookup_host, TcpListener};
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

#[cfg(unix)]
use std::os::unix::fs::{FileTypeExt, PermissionsExt};
#[cfg(unix)]
use std::path::Path;
#[cfg(unix)]
use tokio::net::{UnixListener, UnixStream};

use super::handler::{Dispatcher, HandlerSlots, RequestKind};
use crate::config::{AppConfig, ConfigError, DEFAULT_HOST, DEFAULT_PORT};
use crate::metrics::MetricsCollector;
use crate::router::Router;

const ERROR_BACKOFF: Duration = Duration::from_millis(150);

/// Where a listener should bind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListenTarget {
    Tcp { host: String, port: u16 },
    Unix { path: PathBuf, mode: Option<u32> },
}

impl ListenTarget {
    pub fn tcp(host: impl Into<String>, port: u16) -> Self {
        ListenTarget::Tcp {
            host: host.into(),
            port,
        }
    }

    pub fn unix(path: impl Into<PathBuf>) -> Self {
        ListenTarget::Unix {
            path: path.into(),
            mode: None,
        }
    }

    /// Socket path if configured, otherwise `host`/`port` with defaults filled in.
    pub fn from_config(config: &AppConfig) -> Result<Self, ConfigError> {
        if let Some(path) = &config.socket {
            return Ok(ListenTarget::Unix {
                path: path.clone(),
                mode: config.socket_mode_bits()?,
            });
        }

        Ok(ListenTarget::Tcp {
            host: config.host.clone().unwrap_or_else(|| DEFAULT_HOST.to_string()),
            port: config.port.unwrap_or(DEFAULT_PORT),
        })
    }
}

impl fmt::Display for ListenTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ListenTarget::Tcp { host, port } => write!(f, "{host}:{port}"),
            ListenTarget::Unix { path, .. } => write!(f, "{}", path.display()),
        }
    }
}

/// The address a listener is currently bound to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BoundAddress {
    /// Socket path or any other preformatted address.
    Named(String),
    /// Network address as reported by the bound socket.
    HostPort { host: String, port: u16 },
}

impl From<SocketAddr> for BoundAddress {
    fn from(addr: SocketAddr) -> Self {
        BoundAddress::HostPort {
            host: addr.ip().to_string(),
            port: addr.port(),
        }
    }
}

impl fmt::Display for BoundAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BoundAddress::Named(name) => f.write_str(name),
            BoundAddress::HostPort { host, port } => write!(f, "{host}:{port}"),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ListenerError {
    #[error("listener is already listening")]
    AlreadyListening,

    #[error("listener is not listening")]
    NotListening,

    #[error("failed to resolve {host}:{port}: {source}")]
    Resolve {
        host: String,
        port: u16,
        #[source]
        source: io::Error,
    },

    #[error("{host}:{port} did not resolve to any address")]
    ResolveEmpty { host: String, port: u16 },

    #[error("failed to bind {addr}: {source}")]
    BindTcp {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },

    #[error("failed to read bound address: {0}")]
    LocalAddr(#[source] io::Error),

    #[error("failed to bind unix socket {path}: {source}")]
    BindUnix {
        path: String,
        #[source]
        source: io::Error,
    },

    #[error("unix socket {path} is already in use")]
    UnixInUse { path: String },

    #[error("{path} exists and is not a socket")]
    UnixNotSocket { path: String },

    #[error("failed to inspect {path}: {source}")]
    UnixMetadata {
        path: String,
        #[source]
        source: io::Error,
    },

    #[error("failed to probe existing socket {path}: {source}")]
    UnixConnect {
        path: String,
        #[source]
        source: io::Error,
    },

    #[error("failed to remove stale socket {path}: {source}")]
    UnixCleanup {
        path: String,
        #[source]
        source: io::Error,
    },

    #[error("failed to set permissions on {path}: {source}")]
    SocketMode {
        path: String,
        #[source]
        source: io::Error,
    },

    #[error("unix sockets are not supported on this platform: {path}")]
    UnsupportedUnix { path: String },
}

#[derive(Debug)]
enum ListenerState {
    Unbound,
    Listening(BoundAddress),
    Closed,
}

struct ActiveListen {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

/// A network endpoint that is created unbound and bound later with [`Listener::listen`].
///
/// Standard requests go to the router in the `on_request` slot, protocol
/// upgrade requests to the one in `on_upgrade`. No request reaches both.
pub struct Listener {
    slots: Arc<HandlerSlots>,
    state: ArcSwap<ListenerState>,
    active: Mutex<Option<ActiveListen>>,
}

impl Listener {
    pub fn new() -> Self {
        Self {
            slots: Arc::new(HandlerSlots::default()),
            state: ArcSwap::from_pointee(ListenerState::Unbound),
            active: Mutex::new(None),
        }
    }

    /// Install the router for standard (non-upgrade) requests.
    pub fn on_request(&self, router: Router) {
        self.slots.set(RequestKind::Standard, router);
    }

    /// Install the router for protocol-upgrade requests.
    pub fn on_upgrade(&self, router: Router) {
        self.slots.set(RequestKind::Upgrade, router);
    }

    pub fn attach_metrics(&self, metrics: Arc<MetricsCollector>) {
        self.slots.set_metrics(metrics);
    }

    pub fn is_listening(&self) -> bool {
        matches!(**self.state.load(), ListenerState::Listening(_))
    }

    /// Current bound address; `None` before the first listen and after close.
    pub fn address(&self) -> Option<BoundAddress> {
        match &**self.state.load() {
            ListenerState::Listening(address) => Some(address.clone()),
            ListenerState::Unbound | ListenerState::Closed => None,
        }
    }

    /// Bind to `target` and start accepting connections in the background.
    pub async fn listen(&self, target: &ListenTarget) -> Result<BoundAddress, ListenerError> {
        let mut active = self.active.lock().await;
        if active.is_some() {
            return Err(ListenerError::AlreadyListening);
        }

        let (acceptor, address) = Acceptor::bind(target).await?;
        let (shutdown, shutdown_rx) = watch::channel(false);
        let dispatcher = Dispatcher::new(self.slots.clone());
        let task = tokio::spawn(run_accept_loop(acceptor, dispatcher, shutdown_rx));

        self.state
            .store(Arc::new(ListenerState::Listening(address.clone())));
        *active = Some(ActiveListen { shutdown, task });

        info!(%address, "listener bound");
        Ok(address)
    }

    /// Stop accepting connections. Connections already accepted run to completion.
    pub async fn close(&self) -> Result<(), ListenerError> {
        let mut active = self.active.lock().await;
        let ActiveListen { shutdown, task } = active.take().ok_or(ListenerError::NotListening)?;

        self.state.store(Arc::new(ListenerState::Closed));
        let _ = shutdown.send(true);
        if let Err(err) = task.await {
            warn!(%err, "accept loop ended abnormally");
        }

        info!("listener closed");
        Ok(())
    }

    #[cfg(test)]
    pub(crate) fn set_bound_for_test(&self, address: BoundAddress) {
        self.state.store(Arc::new(ListenerState::Listening(address)));
    }
}

impl Default for Listener {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Listener {
    fn drop(&mut self) {
        if let Some(active) = self.active.get_mut().as_ref() {
            let _ = active.shutdown.send(true);
        }
    }
}

impl fmt::Debug for Listener {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Listener")
            .field("state", &**self.state.load())
            .finish_non_exhaustive()
    }
}

enum Acceptor {
    Tcp(TcpListener),
    #[cfg(unix)]
    Unix { listener: UnixListener, path: PathBuf },
}

impl Acceptor {
    async fn bind(target: &ListenTarget) -> Result<(Self, BoundAddress), ListenerError> {
        match target {
            ListenTarget::Tcp { host, port } => {
                let listener = bind_tcp(host, *port).await?;
                let local = listener.local_addr().map_err(ListenerError::LocalAddr)?;
                Ok((Acceptor::Tcp(listener), BoundAddress::from(local)))
            }
            ListenTarget::Unix { path, mode } => {
                #[cfg(unix)]
                {
                    let listener = bind_unix(path, *mode).await?;
                    let address = BoundAddress::Named(path.display().to_string());
                    Ok((
                        Acceptor::Unix {
                            listener,
                            path: path.clone(),
                        },
                        address,
                    ))
                }

                #[cfg(not(unix))]
                {
                    let _ = mode;
                    Err(ListenerError::UnsupportedUnix {
                        path: path.display().to_string(),
                    })
                }
            }
        }
    }

    async fn accept_and_spawn(&self, dispatcher: &Dispatcher) -> io::Result<()> {
        match self {
            Acceptor::Tcp(listener) => {
                let (stream, peer) = listener.accept().await?;
                let _ = stream.set_nodelay(true);
                tokio::spawn(serve_connection(stream, peer.to_string(), dispatcher.clone()));
            }
            #[cfg(unix)]
            Acceptor::Unix { listener, path } => {
                let (stream, _) = listener.accept().await?;
                let peer = path.display().to_string();
                tokio::spawn(serve_connection(stream, peer, dispatcher.clone()));
            }
        }
        Ok(())
    }

    fn cleanup(self) {
        #[cfg(unix)]
        if let Acceptor::Unix { listener, path } = self {
            drop(listener);
            if let Err(err) = std::fs::remove_file(&path) {
                if err.kind() != io::ErrorKind::NotFound {
                    warn!(%err, path = %path.display(), "failed to remove unix socket file");
                }
            }
        }
    }
}

async fn run_accept_loop(
    acceptor: Acceptor,
    dispatcher: Dispatcher,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
            accepted = acceptor.accept_and_spawn(&dispatcher) => {
                if let Err(err) = accepted {
                    warn!(%err, "accept error");
                    tokio::time::sleep(ERROR_BACKOFF).await;
                }
            }
        }
    }

    acceptor.cleanup();
    debug!("accept loop stopped");
}

async fn serve_connection<I>(io: I, peer: String, dispatcher: Dispatcher)
where
    I: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let connection_id = Uuid::new_v4();
    let metrics = dispatcher.metrics();
    if let Some(metrics) = &metrics {
        metrics.increment_active_connections();
    }
    debug!(%connection_id, %peer, "connection accepted");

    let mut http = Http::new();
    http.http1_only(true);
    let result = http.serve_connection(io, dispatcher).with_upgrades().await;

    if let Some(metrics) = &metrics {
        metrics.decrement_active_connections();
        if result.is_err() {
            metrics.record_connection_error();
        }
    }
    if let Err(err) = result {
        warn!(%connection_id, %peer, %err, "connection error");
    }
}

async fn bind_tcp(host: &str, port: u16) -> Result<TcpListener, ListenerError> {
    let mut addrs = lookup_host((host, port))
        .await
        .map_err(|source| ListenerError::Resolve {
            host: host.to_string(),
            port,
            source,
        })?;
    let addr = addrs.next().ok_or_else(|| ListenerError::ResolveEmpty {
        host: host.to_string(),
        port,
    })?;
    TcpListener::bind(addr)
        .await
        .map_err(|source| ListenerError::BindTcp { addr, source })
}

#[cfg(unix)]
async fn bind_unix(path: &Path, mode: Option<u32>) -> Result<UnixListener, ListenerError> {
    let display = || path.display().to_string();

    match tokio::fs::symlink_metadata(path).await {
        Ok(metadata) => {
            if !metadata.file_type().is_socket() {
                return Err(ListenerError::UnixNotSocket { path: display() });
            }
            match UnixStream::connect(path).await {
                Ok(_stream) => return Err(ListenerError::UnixInUse { path: display() }),
                Err(error)
                    if error.kind() == io::ErrorKind::ConnectionRefused
                        || error.kind() == io::ErrorKind::NotFound =>
                {
                    tokio::fs::remove_file(path)
                        .await
                        .map_err(|source| ListenerError::UnixCleanup {
                            path: display(),
                            source,
                        })?;
                    debug!(path = %path.display(), "removed stale unix socket");
                }
                Err(source) => {
                    return Err(ListenerError::UnixConnect {
                        path: display(),
                        source,
                    })
                }
            }
        }
        Err(error) if error.kind() == io::ErrorKind::NotFound => {}
        Err(source) => {
            return Err(ListenerError::UnixMetadata {
                path: display(),
                source,
            })
        }
    }

    let listener = UnixListener::bind(path).map_err(|source| ListenerError::BindUnix {
        path: display(),
        source,
    })?;

    if let Some(mode) = mode {
        tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(mode))
            .await
            .map_err(|source| ListenerError::SocketMode {
                path: display(),
                source,
            })?;
    }

    Ok(listener)
}
