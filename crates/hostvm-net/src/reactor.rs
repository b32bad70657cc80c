use std::collections::BTreeMap;
use std::io;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::oneshot;
use tokio::task::JoinSet;
use tracing::{debug, error, info, trace, warn};

use crate::connection::{Connection, Inbox, SendQueue};
use crate::engine::NetStats;
use crate::{ConnectionHandler, ConnectionId, NetConfig};

/// Everything shared between the reactor and the engine handle; one lock guards it all.
pub(crate) struct Table {
    pub(crate) connections: BTreeMap<ConnectionId, Connection>,
    pub(crate) handler: Box<dyn ConnectionHandler>,
    pub(crate) stats: NetStats,
    next_id: u64,
}

impl Table {
    pub(crate) fn new(handler: Box<dyn ConnectionHandler>) -> Self {
        Self {
            connections: BTreeMap::new(),
            handler,
            stats: NetStats::default(),
            next_id: 1,
        }
    }

    /// Removes `id` and notifies the handler. Returns `false` if it was already gone.
    fn remove(&mut self, id: ConnectionId) -> bool {
        if self.connections.remove(&id).is_none() {
            return false;
        }
        self.handler.on_close(id);
        self.stats.closed += 1;
        true
    }

    /// Closes every connection still in the table and notifies the handler.
    pub(crate) fn close_all(&mut self) {
        let ids: Vec<_> = self.connections.keys().copied().collect();
        for id in ids {
            self.remove(id);
        }
    }
}

pub(crate) struct Shared {
    pub(crate) table: Mutex<Table>,
}

impl Shared {
    pub(crate) fn lock(&self) -> MutexGuard<'_, Table> {
        self.table.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Accepts connections until `shutdown` fires, then cancels every connection task.
///
/// Runs on a single-threaded runtime: accepts, receives and sends are driven by socket readiness
/// rather than by polling.
pub(crate) async fn run(
    shared: Arc<Shared>,
    listener: TcpListener,
    config: NetConfig,
    mut shutdown: oneshot::Receiver<()>,
) {
    debug!("reactor started");
    let mut tasks = JoinSet::new();

    loop {
        tokio::select! {
            _ = &mut shutdown => break,
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    if let Some((id, inbox, queue)) = register(&shared, peer, &config) {
                        tasks.spawn(serve(
                            Arc::clone(&shared),
                            id,
                            peer,
                            stream,
                            inbox,
                            queue,
                            config.receive_buffer_size,
                        ));
                    }
                }
                Err(err) => {
                    warn!("accept failed: {err}");
                    // Out of descriptors and similar conditions persist; don't spin on them.
                    tokio::time::sleep(Duration::from_millis(10)).await;
                }
            },
            Some(joined) = tasks.join_next() => {
                if let Err(err) = joined {
                    if err.is_panic() {
                        error!("connection task panicked");
                    }
                }
            }
        }
    }

    let open = tasks.len();
    tasks.shutdown().await;
    debug!(cancelled = open, "reactor exited");
}

fn register(
    shared: &Shared,
    peer: SocketAddr,
    config: &NetConfig,
) -> Option<(ConnectionId, Inbox, SendQueue)> {
    let mut table = shared.lock();
    if table.connections.len() >= config.max_connections {
        warn!(
            %peer,
            max_connections = config.max_connections,
            "connection limit reached; closing"
        );
        table.stats.rejected += 1;
        return None;
    }

    let id = ConnectionId(table.next_id);
    table.next_id += 1;
    let (connection, inbox, queue) = Connection::new(peer);
    table.connections.insert(id, connection);
    table.handler.on_accept(id, peer);
    table.stats.accepted += 1;
    info!(conn = %id, %peer, "connection accepted");
    Some((id, inbox, queue))
}

/// Removes the connection from the table when its task ends, however it ends.
struct Registration {
    shared: Arc<Shared>,
    id: ConnectionId,
}

impl Drop for Registration {
    fn drop(&mut self) {
        self.shared.lock().remove(self.id);
    }
}

async fn serve(
    shared: Arc<Shared>,
    id: ConnectionId,
    peer: SocketAddr,
    mut stream: TcpStream,
    mut inbox: Inbox,
    mut queue: SendQueue,
    receive_buffer_size: usize,
) {
    let _registration = Registration {
        shared: Arc::clone(&shared),
        id,
    };
    let (mut reader, mut writer) = stream.split();
    let mut buf = vec![0u8; receive_buffer_size.max(1)];

    let outcome: Option<(&str, io::Error)> = loop {
        let unsent = queue.unsent();
        tokio::select! {
            read = reader.read(&mut buf) => match read {
                Ok(0) => break None,
                Ok(n) => {
                    trace!(conn = %id, bytes = n, "received");
                    let reply = {
                        let mut table = shared.lock();
                        table.stats.bytes_received += n as u64;
                        table.handler.on_receive(id, &buf[..n])
                    };
                    if let Some(reply) = reply {
                        queue.push(reply);
                    }
                }
                Err(err) => break Some(("receive", err)),
            },
            written = writer.write(unsent), if !unsent.is_empty() => match written {
                Ok(0) => break Some(("send", io::ErrorKind::WriteZero.into())),
                Ok(n) => {
                    trace!(conn = %id, bytes = n, "sent");
                    shared.lock().stats.bytes_sent += n as u64;
                    queue.advance(n);
                }
                Err(err) => break Some(("send", err)),
            },
            Some(block) = inbox.recv() => queue.push_counted(block),
        }
    };

    match outcome {
        None => info!(conn = %id, %peer, "peer closed connection"),
        Some((during, err)) => info!(
            conn = %id,
            %peer,
            "connection dropped after {during} error: {err}"
        ),
    }
}
