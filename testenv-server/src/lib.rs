use axum::Router;
use std::io;
use std::net::SocketAddr;
use std::sync::mpsc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use testenv_common::{BaseAddress, HarnessError, Result, PROBE_TIMEOUT_MS};
use tokio::sync::oneshot;
use tracing::{info, warn};

pub mod config;
pub mod handlers;
pub mod logging;
pub mod ports;

pub use handlers::{HandlerCatalog, HandlerConfiguration, HandlerId};

/// Whether a [`TestEnvironment`] currently holds a live server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Stopped,
    Running,
}

/// A bound, listening server running on its own thread.
///
/// The thread owns a current-thread tokio runtime; dropping that runtime on
/// shutdown also drops every connection still open.
struct ServerHandle {
    local_addr: SocketAddr,
    shutdown_tx: oneshot::Sender<()>,
    thread: JoinHandle<io::Result<()>>,
}

impl ServerHandle {
    /// Bind `base` and start serving `app`. Returns once the socket is listening.
    fn spawn(base: &BaseAddress, app: Router) -> Result<Self> {
        let port = base.port();
        let start_failed = |source: io::Error| HarnessError::ServerStartFailed { port, source };

        // `bind` settles for the first address the host resolves to, so a port
        // held on another of them (127.0.0.1 vs ::1) would go unnoticed.
        if ports::is_port_in_use(base.socket_host(), port, Duration::from_millis(PROBE_TIMEOUT_MS)) {
            return Err(start_failed(io::Error::new(
                io::ErrorKind::AddrInUse,
                format!("{}:{port} is already accepting connections", base.socket_host()),
            )));
        }

        // Bound on the caller's thread so the kernel queues connections from here on.
        let listener = std::net::TcpListener::bind((base.socket_host(), port)).map_err(start_failed)?;
        listener.set_nonblocking(true).map_err(start_failed)?;
        let local_addr = listener.local_addr().map_err(start_failed)?;

        let (ready_tx, ready_rx) = mpsc::sync_channel(1);
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let thread = thread::Builder::new()
            .name(format!("testenv-server-{port}"))
            .spawn(move || serve(listener, app, ready_tx, shutdown_rx))
            .map_err(start_failed)?;

        match ready_rx.recv() {
            Ok(Ok(())) => Ok(Self { local_addr, shutdown_tx, thread }),
            Ok(Err(source)) => {
                thread.join().ok();
                Err(start_failed(source))
            }
            Err(_) => {
                thread.join().ok();
                Err(start_failed(io::Error::new(
                    io::ErrorKind::Other,
                    "server thread exited before accepting connections",
                )))
            }
        }
    }

    fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Stop accepting, drop in-flight connections and wait for the thread to exit.
    fn shutdown(self) -> Result<()> {
        let addr = self.local_addr;
        // The receiver is gone if the server already exited on its own.
        self.shutdown_tx.send(()).ok();
        match self.thread.join() {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(HarnessError::ServerStopFailed(format!("server on {addr} exited with error: {e}"))),
            Err(_) => Err(HarnessError::ServerStopFailed(format!("server thread for {addr} panicked"))),
        }
    }
}

fn serve(
    listener: std::net::TcpListener,
    app: Router,
    ready_tx: mpsc::SyncSender<io::Result<()>>,
    shutdown_rx: oneshot::Receiver<()>,
) -> io::Result<()> {
    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(e) => {
            ready_tx.send(Err(e)).ok();
            return Ok(());
        }
    };

    runtime.block_on(async move {
        let listener = match tokio::net::TcpListener::from_std(listener) {
            Ok(listener) => listener,
            Err(e) => {
                ready_tx.send(Err(e)).ok();
                return Ok(());
            }
        };
        ready_tx.send(Ok(())).ok();

        tokio::select! {
            result = async { axum::serve(listener, app).await } => result,
            _ = shutdown_rx => Ok(()),
        }
    })
}

/// An HTTP server for integration tests, bound to a fixed base address and
/// serving a fixed handler configuration.
///
/// ```no_run
/// use axum::{routing::get, Router};
/// use testenv_server::{ports::localhost_random_port, TestEnvironment};
///
/// let base = localhost_random_port()?;
/// let mut env = TestEnvironment::for_custom_router(base, Router::new().route("/ping", get(|| async { "pong" })));
/// env.start()?;
/// let url = env.compose_url("/ping");
/// // ... issue requests against `url` ...
/// env.stop();
/// # Ok::<(), testenv_common::HarnessError>(())
/// ```
pub struct TestEnvironment {
    base: BaseAddress,
    handlers: HandlerConfiguration,
    catalog: HandlerCatalog,
    /// `Some` exactly while running.
    server: Option<ServerHandle>,
}

impl TestEnvironment {
    pub fn new(base: BaseAddress, handlers: HandlerConfiguration) -> Self {
        Self { base, handlers, catalog: HandlerCatalog::new(), server: None }
    }

    /// Serve every handler in the catalog.
    pub fn scan_all(base: BaseAddress) -> Self {
        Self::new(base, HandlerConfiguration::ScanAll)
    }

    /// Serve the handlers registered under the named groups.
    pub fn scan_groups<I, S>(base: BaseAddress, groups: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(base, HandlerConfiguration::scan_groups(groups))
    }

    /// Serve exactly the listed handlers.
    pub fn for_handlers<I, S>(base: BaseAddress, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<HandlerId>,
    {
        Self::new(base, HandlerConfiguration::explicit(ids))
    }

    pub fn for_custom_router(base: BaseAddress, router: Router) -> Self {
        Self::new(base, HandlerConfiguration::Custom(router))
    }

    /// Catalog that the scan and explicit-list configurations resolve against.
    pub fn with_catalog(mut self, catalog: HandlerCatalog) -> Self {
        self.catalog = catalog;
        self
    }

    /// Bind the configured port and start serving.
    ///
    /// The handlers are served at the root: every request path goes to them
    /// unchanged, including the base address's path prefix.
    ///
    /// When this returns `Ok` the socket is accepting connections. On error
    /// the environment stays stopped. Starting a running environment is
    /// rejected with [`HarnessError::AlreadyRunning`].
    pub fn start(&mut self) -> Result<()> {
        if self.server.is_some() {
            return Err(HarnessError::AlreadyRunning(self.base.port()));
        }

        let app = self.handlers.resolve(&self.catalog)?;

        info!(port = self.base.port(), handlers = self.handlers.kind(), "Starting HTTP server");
        let server = ServerHandle::spawn(&self.base, app)?;
        info!(addr = %server.local_addr(), base_url = %self.base, "HTTP server accepting connections");
        self.server = Some(server);
        Ok(())
    }

    /// Stop the server if it is running.
    ///
    /// Never fails: shutdown problems are logged as warnings and otherwise
    /// ignored, so teardown cannot mask a test's own result. Use
    /// [`TestEnvironment::try_stop`] to observe them.
    pub fn stop(&mut self) {
        if let Err(e) = self.try_stop() {
            warn!(port = self.base.port(), error = %e, "Stop HTTP server failed");
        }
    }

    /// Stop the server if it is running, reporting shutdown failures.
    ///
    /// The environment is stopped afterwards either way.
    pub fn try_stop(&mut self) -> Result<()> {
        match self.server.take() {
            None => Ok(()),
            Some(server) => {
                info!(port = self.base.port(), "Stopping HTTP server");
                server.shutdown()
            }
        }
    }

    pub fn state(&self) -> LifecycleState {
        match self.server {
            Some(_) => LifecycleState::Running,
            None => LifecycleState::Stopped,
        }
    }

    pub fn is_running(&self) -> bool {
        self.state() == LifecycleState::Running
    }

    /// Absolute URL for `path`, e.g. `compose_url("/foo")` and `compose_url("foo")`
    /// both give `http://localhost:8090/foo`.
    pub fn compose_url(&self, path: &str) -> String {
        self.base.join(path)
    }

    pub fn port(&self) -> u16 {
        self.base.port()
    }

    pub fn base_url(&self) -> String {
        self.base.to_string()
    }

    pub fn base_address(&self) -> &BaseAddress {
        &self.base
    }

    pub fn handlers(&self) -> &HandlerConfiguration {
        &self.handlers
    }

    /// Socket address actually bound, while running.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.server.as_ref().map(ServerHandle::local_addr)
    }
}

impl Drop for TestEnvironment {
    fn drop(&mut self) {
        self.stop();
    }
}
