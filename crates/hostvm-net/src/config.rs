use std::net::{IpAddr, Ipv4Addr, SocketAddr};

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetConfig {
    /// Interface to listen on. Defaults to all interfaces.
    pub bind_addr: IpAddr,
    /// TCP port; `0` picks an ephemeral port (see [`crate::NetworkEngine::local_addr`]).
    pub port: u16,
    /// Size of each connection's receive scratch buffer; one receive reads at most this much.
    pub receive_buffer_size: usize,
    /// Connections accepted beyond this are closed immediately.
    pub max_connections: usize,
}

impl Default for NetConfig {
    fn default() -> Self {
        Self {
            bind_addr: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: 5555,
            receive_buffer_size: 8192,
            max_connections: 1024,
        }
    }
}

impl NetConfig {
    pub fn listen_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind_addr, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_and_partial_json() {
        let config: NetConfig = serde_json::from_str(r#"{"port": 0}"#).unwrap();
        assert_eq!(config.port, 0);
        assert_eq!(config.receive_buffer_size, 8192);
        assert_eq!(config.max_connections, 1024);
        assert_eq!(config.listen_addr().to_string(), "0.0.0.0:0");
    }
}
