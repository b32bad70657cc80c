use std::net::SocketAddr;

use crate::ConnectionId;

/// Per-connection traffic policy, called on the reactor thread.
///
/// Calls happen while the reactor holds the connection table, so a handler must not call back
/// into the [`crate::NetworkEngine`]. Replies are returned instead and queued on the connection.
pub trait ConnectionHandler: Send {
    fn on_accept(&mut self, _conn: ConnectionId, _peer: SocketAddr) {}

    /// Bytes received from `conn`. A returned block is appended to that connection's send queue.
    fn on_receive(&mut self, conn: ConnectionId, data: &[u8]) -> Option<Vec<u8>>;

    fn on_close(&mut self, _conn: ConnectionId) {}
}

impl<T: ConnectionHandler + ?Sized> ConnectionHandler for Box<T> {
    fn on_accept(&mut self, conn: ConnectionId, peer: SocketAddr) {
        <T as ConnectionHandler>::on_accept(&mut **self, conn, peer);
    }

    fn on_receive(&mut self, conn: ConnectionId, data: &[u8]) -> Option<Vec<u8>> {
        <T as ConnectionHandler>::on_receive(&mut **self, conn, data)
    }

    fn on_close(&mut self, conn: ConnectionId) {
        <T as ConnectionHandler>::on_close(&mut **self, conn);
    }
}

/// Discards everything received.
impl ConnectionHandler for () {
    fn on_receive(&mut self, _conn: ConnectionId, _data: &[u8]) -> Option<Vec<u8>> {
        None
    }
}

/// Sends every received chunk back to its sender.
#[derive(Debug, Default, Clone, Copy)]
pub struct EchoHandler;

impl ConnectionHandler for EchoHandler {
    fn on_receive(&mut self, _conn: ConnectionId, data: &[u8]) -> Option<Vec<u8>> {
        Some(data.to_vec())
    }
}
