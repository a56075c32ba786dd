//! the `ServerContext` holds the common configuration across the relay
//!
//! Everything here is decided once at startup - the relay strategy, the
//! listen address and the subnet address asserted upstream - and shared
//! read-only between the worker threads. Nothing reads ambient process state
//! after construction.

use std::net::IpAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::dns::client::{DnsClient, DnsUdpClient};
use crate::dns::doh::HttpsDnsClient;
use crate::dns::resolve::{HttpsJsonResolver, QueryResolver, UpstreamForwarder};

pub struct ServerStatistics {
    pub udp_query_count: AtomicUsize,
}

impl ServerStatistics {
    pub fn get_udp_query_count(&self) -> usize {
        self.udp_query_count.load(Ordering::Acquire)
    }
}

/// Relay strategy configuration
#[derive(Clone)]
pub enum RelayStrategy {
    /// Relay raw queries to an ordered list of upstream servers
    Forward { servers: Vec<String> },
    /// Answer queries through the JSON DNS-over-HTTPS API
    HttpsJson { client: Arc<HttpsDnsClient> },
}

/// Main server context containing configuration and shared state
pub struct ServerContext {
    pub client: Box<dyn DnsClient + Sync + Send>,
    pub listen_addr: String,
    pub strategy: RelayStrategy,
    pub subnet_addr: IpAddr,
    pub statistics: ServerStatistics,
}

impl ServerContext {
    pub fn new(strategy: RelayStrategy, listen_addr: String, subnet_addr: IpAddr) -> ServerContext {
        ServerContext {
            client: Box::new(DnsUdpClient::new()),
            listen_addr,
            strategy,
            subnet_addr,
            statistics: ServerStatistics {
                udp_query_count: AtomicUsize::new(0),
            },
        }
    }

    pub fn create_resolver(&self, ptr: Arc<ServerContext>) -> Box<dyn QueryResolver> {
        match self.strategy {
            RelayStrategy::Forward { ref servers } => {
                Box::new(UpstreamForwarder::new(ptr, servers.clone()))
            }
            RelayStrategy::HttpsJson { ref client } => {
                Box::new(HttpsJsonResolver::new(client.clone()))
            }
        }
    }
}
