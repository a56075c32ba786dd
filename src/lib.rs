//! Courier DNS Relay
//!
//! A small DNS relay that forwards client queries to upstream resolvers with
//! an EDNS client-subnet option attached, or answers them by querying a
//! JSON DNS-over-HTTPS API and translating the JSON answer back into
//! wire-format resource records.
//!
//! # Architecture
//!
//! All functionality lives in the `dns` module:
//! * packet buffer and protocol types for the DNS wire format
//! * an UDP exchange client for talking to upstream resolvers
//! * the client-subnet option builder
//! * the JSON API client and the answer translator
//! * the relay strategies and the UDP server loop

/// DNS relay implementation and protocol handling
pub mod dns;
