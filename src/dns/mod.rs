//! DNS Relay Implementation
//!
//! This module provides the complete relay pipeline:
//! * DNS packet parsing and serialization
//! * EDNS client-subnet option injection
//! * Forwarding resolution with upstream failover
//! * DNS-over-HTTPS JSON resolution and answer translation
//! * UDP transport
//!
//! # Module Structure
//!
//! * `buffer` - Low-level packet buffer operations
//! * `protocol` - DNS protocol definitions and packet handling
//! * `edns0` - EDNS client-subnet option handling
//! * `client` - DNS client for outgoing exchanges
//! * `doh` - DNS-over-HTTPS JSON API client
//! * `translate` - JSON answer to wire record translation
//! * `resolve` - Relay strategies (forwarding, HTTPS-JSON)
//! * `context` - Server configuration and shared state
//! * `server` - UDP DNS server implementation
//! * `netutil` - Public address discovery

/// Low-level buffer operations for DNS packet handling
pub mod buffer;

/// DNS client for making outgoing exchanges
pub mod client;

/// Server configuration and shared context
pub mod context;

/// DNS-over-HTTPS JSON API client
pub mod doh;

/// EDNS0 client-subnet option handling
pub mod edns0;

/// Public address discovery
pub mod netutil;

/// DNS protocol definitions and packet structures
pub mod protocol;

/// Relay strategies (forwarding, HTTPS-JSON)
pub mod resolve;

/// UDP DNS server implementation
pub mod server;

/// JSON answer to wire record translation
pub mod translate;
