use std::collections::VecDeque;
use std::fmt;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::mpsc;

/// Stable handle for an accepted connection. Ids are never reused within one engine instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct ConnectionId(pub u64);

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConnectionInfo {
    pub id: ConnectionId,
    pub peer: SocketAddr,
    /// Blocks waiting in the send queue.
    pub queued_blocks: usize,
}

/// Table entry for a live connection. The socket itself belongs to the connection's task.
pub(crate) struct Connection {
    pub(crate) peer: SocketAddr,
    outbox: mpsc::UnboundedSender<Vec<u8>>,
    queued: Arc<AtomicUsize>,
}

impl Connection {
    /// Returns the table entry plus the inbox and send queue its task drains.
    pub(crate) fn new(peer: SocketAddr) -> (Self, Inbox, SendQueue) {
        let (outbox, inbox) = mpsc::unbounded_channel();
        let queued = Arc::new(AtomicUsize::new(0));
        let queue = SendQueue {
            blocks: VecDeque::new(),
            offset: 0,
            queued: Arc::clone(&queued),
        };
        (
            Self {
                peer,
                outbox,
                queued,
            },
            inbox,
            queue,
        )
    }

    pub(crate) fn info(&self, id: ConnectionId) -> ConnectionInfo {
        ConnectionInfo {
            id,
            peer: self.peer,
            queued_blocks: self.queued.load(Ordering::Acquire),
        }
    }

    /// Hands `block` to the connection's task. Returns `false` once the task has gone away.
    pub(crate) fn enqueue(&self, block: Vec<u8>) -> bool {
        if block.is_empty() {
            return true;
        }
        self.queued.fetch_add(1, Ordering::AcqRel);
        if self.outbox.send(block).is_err() {
            self.queued.fetch_sub(1, Ordering::AcqRel);
            return false;
        }
        true
    }
}

/// Blocks sent through [`crate::NetworkEngine::send`], on their way to the connection task.
pub(crate) type Inbox = mpsc::UnboundedReceiver<Vec<u8>>;

/// FIFO of outgoing blocks, owned by the connection task.
pub(crate) struct SendQueue {
    blocks: VecDeque<Vec<u8>>,
    /// Bytes of the front block already written.
    offset: usize,
    queued: Arc<AtomicUsize>,
}

impl SendQueue {
    /// Queues a block produced on the connection task itself.
    pub(crate) fn push(&mut self, block: Vec<u8>) {
        if !block.is_empty() {
            self.queued.fetch_add(1, Ordering::AcqRel);
            self.blocks.push_back(block);
        }
    }

    /// Queues a block taken from the inbox; [`Connection::enqueue`] already counted it.
    pub(crate) fn push_counted(&mut self, block: Vec<u8>) {
        self.blocks.push_back(block);
    }

    /// The unsent tail of the front block, or an empty slice when nothing is queued.
    pub(crate) fn unsent(&self) -> &[u8] {
        self.blocks
            .front()
            .map_or(&[][..], |block| &block[self.offset..])
    }

    /// Records `n` bytes of the front block as written.
    pub(crate) fn advance(&mut self, n: usize) {
        self.offset += n;
        if self
            .blocks
            .front()
            .is_some_and(|block| self.offset >= block.len())
        {
            self.blocks.pop_front();
            self.offset = 0;
            self.queued.fetch_sub(1, Ordering::AcqRel);
        }
    }
}
