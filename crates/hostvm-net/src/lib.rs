//! TCP endpoint engine.
//!
//! [`NetworkEngine`] listens on one port and serves every connection from a single reactor thread
//! running a current-thread `tokio` runtime. Each connection receives, drains its send queue and
//! accepts blocks from [`NetworkEngine::send`] as its socket becomes ready. Received bytes go to a
//! [`ConnectionHandler`]; the default [`EchoHandler`] sends them straight back.
#![forbid(unsafe_code)]

mod config;
mod connection;
mod engine;
mod error;
mod handler;
mod reactor;

pub use config::NetConfig;
pub use connection::{ConnectionId, ConnectionInfo};
pub use engine::{NetStats, NetworkEngine};
pub use error::{NetError, NetResult};
pub use handler::{ConnectionHandler, EchoHandler};
