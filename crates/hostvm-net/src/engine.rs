use std::net::{SocketAddr, TcpListener};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

use hostvm_types::EngineState;
use serde::Serialize;
use tokio::sync::oneshot;
use tracing::{error, info};

use crate::reactor::{self, Shared, Table};
use crate::{ConnectionHandler, ConnectionId, ConnectionInfo, EchoHandler, NetConfig, NetError, NetResult};

/// Reactor counters since the last initialise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct NetStats {
    pub accepted: u64,
    /// Connections closed on accept because the table was full.
    pub rejected: u64,
    pub closed: u64,
    pub bytes_received: u64,
    pub bytes_sent: u64,
}

struct Reactor {
    shared: Arc<Shared>,
    shutdown: Option<oneshot::Sender<()>>,
    thread: Option<JoinHandle<()>>,
    local_addr: SocketAddr,
}

/// Listening endpoint served by one reactor thread: `Uninitialized -> Running -> Uninitialized`.
pub struct NetworkEngine {
    reactor: Option<Reactor>,
}

impl Default for NetworkEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl NetworkEngine {
    pub fn new() -> Self {
        Self { reactor: None }
    }

    pub fn lifecycle(&self) -> EngineState {
        if self.reactor.is_some() {
            EngineState::Running
        } else {
            EngineState::Uninitialized
        }
    }

    /// Listens with the default echo policy.
    pub fn initialize(&mut self, config: &NetConfig) -> NetResult<()> {
        self.initialize_with_handler(config, Box::new(EchoHandler))
    }

    /// Binds the listening socket and starts the reactor thread.
    ///
    /// Re-initialising tears the previous endpoint down first.
    pub fn initialize_with_handler(
        &mut self,
        config: &NetConfig,
        handler: Box<dyn ConnectionHandler>,
    ) -> NetResult<()> {
        self.cleanup();

        let addr = config.listen_addr();
        let bind_err = |source| NetError::Bind {
            addr: addr.to_string(),
            source,
        };
        // std sets SO_REUSEADDR on Unix listeners.
        let listener = TcpListener::bind(addr).map_err(bind_err)?;
        listener.set_nonblocking(true).map_err(bind_err)?;
        let local_addr = listener.local_addr().map_err(bind_err)?;

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_io()
            .enable_time()
            .build()
            .map_err(NetError::Runtime)?;
        let listener = {
            let _guard = runtime.enter();
            tokio::net::TcpListener::from_std(listener).map_err(bind_err)?
        };

        let shared = Arc::new(Shared {
            table: Mutex::new(Table::new(handler)),
        });
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let thread_shared = Arc::clone(&shared);
        let thread_config = *config;
        let thread = std::thread::Builder::new()
            .name("hostvm-net-reactor".into())
            .spawn(move || {
                runtime.block_on(reactor::run(
                    thread_shared,
                    listener,
                    thread_config,
                    shutdown_rx,
                ))
            })
            .map_err(NetError::Spawn)?;

        info!(%local_addr, max_connections = config.max_connections, "network engine listening");
        self.reactor = Some(Reactor {
            shared,
            shutdown: Some(shutdown_tx),
            thread: Some(thread),
            local_addr,
        });
        Ok(())
    }

    /// The bound address, including the actual port when configured with port 0.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.reactor.as_ref().map(|r| r.local_addr)
    }

    fn reactor(&self, op: &'static str) -> NetResult<&Reactor> {
        self.reactor.as_ref().ok_or(NetError::InvalidState {
            state: EngineState::Uninitialized,
            op,
        })
    }

    /// Queues a copy of `bytes` for `conn`. Transmission happens on the reactor thread.
    pub fn send(&self, conn: ConnectionId, bytes: &[u8]) -> NetResult<()> {
        let reactor = self.reactor("send")?;
        let table = reactor.shared.lock();
        let connection = table
            .connections
            .get(&conn)
            .ok_or(NetError::UnknownConnection(conn))?;
        if !connection.enqueue(bytes.to_vec()) {
            return Err(NetError::UnknownConnection(conn));
        }
        Ok(())
    }

    /// Snapshot of the connection table, ordered by id.
    pub fn connections(&self) -> Vec<ConnectionInfo> {
        self.reactor.as_ref().map_or_else(Vec::new, |r| {
            r.shared
                .lock()
                .connections
                .iter()
                .map(|(&id, c)| c.info(id))
                .collect()
        })
    }

    pub fn stats(&self) -> NetStats {
        self.reactor
            .as_ref()
            .map_or_else(NetStats::default, |r| r.shared.lock().stats)
    }

    /// Stops and joins the reactor, then closes every connection and the listener.
    ///
    /// Safe to call repeatedly.
    pub fn cleanup(&mut self) {
        let Some(mut reactor) = self.reactor.take() else {
            return;
        };

        let open = reactor.shared.lock().connections.len();
        if let Some(shutdown) = reactor.shutdown.take() {
            // The reactor may already be gone; joining below reports how.
            let _ = shutdown.send(());
        }
        if let Some(thread) = reactor.thread.take() {
            if thread.join().is_err() {
                error!("network reactor thread panicked");
            }
        }

        reactor.shared.lock().close_all();
        info!(closed = open, "network engine cleaned up");
    }
}

impl Drop for NetworkEngine {
    fn drop(&mut self) {
        self.cleanup();
    }
}
