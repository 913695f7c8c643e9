//! Connectivity probes.
//!
//! A probe is consulted before every run. Probes cannot fail: anything that
//! prevents a probe from vouching for the network reports offline.

use async_trait::async_trait;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::net::TcpStream;

/// Reports current network reachability.
#[async_trait]
pub trait ConnectivityProbe: Send + Sync {
    /// Returns true if the remote is believed reachable.
    async fn is_online(&self) -> bool;
}

/// A probe backed by a flag, for manual overrides and tests.
#[derive(Debug)]
pub struct StaticProbe {
    online: AtomicBool,
}

impl StaticProbe {
    /// Creates a probe with the given initial state.
    pub fn new(online: bool) -> Self {
        Self {
            online: AtomicBool::new(online),
        }
    }

    /// Creates a probe that reports online.
    pub fn online() -> Self {
        Self::new(true)
    }

    /// Creates a probe that reports offline.
    pub fn offline() -> Self {
        Self::new(false)
    }

    /// Changes the reported state.
    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
    }
}

#[async_trait]
impl ConnectivityProbe for StaticProbe {
    async fn is_online(&self) -> bool {
        self.online.load(Ordering::SeqCst)
    }
}

/// A probe that opens a TCP connection to a known endpoint.
#[derive(Debug, Clone)]
pub struct TcpProbe {
    addr: SocketAddr,
    timeout: Duration,
}

impl TcpProbe {
    /// Creates a probe for `addr` with a 3 second connect timeout.
    pub fn new(addr: SocketAddr) -> Self {
        Self {
            addr,
            timeout: Duration::from_secs(3),
        }
    }

    /// Sets the connect timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Returns the probed address.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }
}

#[async_trait]
impl ConnectivityProbe for TcpProbe {
    async fn is_online(&self) -> bool {
        match tokio::time::timeout(self.timeout, TcpStream::connect(self.addr)).await {
            Ok(Ok(_)) => true,
            Ok(Err(e)) => {
                tracing::debug!(addr = %self.addr, error = %e, "connectivity probe failed");
                false
            }
            Err(_) => {
                tracing::debug!(addr = %self.addr, timeout = ?self.timeout, "connectivity probe timed out");
                false
            }
        }
    }
}
