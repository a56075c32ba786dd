//! resolver implementations for the two relay strategies
//!
//! Both strategies answer one query at a time: the forwarding resolver relays
//! the raw packet to upstream servers, the HTTPS-JSON resolver asks the JSON
//! API and translates the answer. The strategy is fixed at startup; the
//! server asks the context for a resolver per query.

use std::sync::Arc;

use derive_more::{Display, Error, From};

use crate::dns::context::ServerContext;
use crate::dns::doh::HttpsDnsClient;
use crate::dns::edns0::attach_client_subnet;
use crate::dns::protocol::DnsPacket;
use crate::dns::translate::translate_answer;

#[derive(Debug, Display, From, Error)]
pub enum ResolveError {
    Client(crate::dns::client::ClientError),
    Doh(crate::dns::doh::DohError),
    UpstreamExhausted,
    EmptyQuestion,
}

type Result<T> = std::result::Result<T, ResolveError>;

/// Trait for relay strategies
///
/// Implementors produce a complete response packet for an incoming query, or
/// an error if no response can be produced - in which case nothing is written
/// back and the client runs into its own timeout.
pub trait QueryResolver {
    fn resolve(&mut self, request: &DnsPacket) -> Result<DnsPacket>;
}

/// A forwarding resolver with failover
///
/// Attaches the configured client subnet to the query and relays it to the
/// upstream servers in list order. The first completed exchange wins,
/// whatever response code it carries; only transport failures move on to the
/// next server. One pass through the list, no retries.
pub struct UpstreamForwarder {
    context: Arc<ServerContext>,
    servers: Vec<String>,
}

impl UpstreamForwarder {
    pub fn new(context: Arc<ServerContext>, servers: Vec<String>) -> UpstreamForwarder {
        UpstreamForwarder { context, servers }
    }
}

impl QueryResolver for UpstreamForwarder {
    fn resolve(&mut self, request: &DnsPacket) -> Result<DnsPacket> {
        let mut query = request.clone();
        attach_client_subnet(&mut query, self.context.subnet_addr);

        for server in &self.servers {
            match self.context.client.exchange(&query, server) {
                Ok(response) => return Ok(response),
                Err(err) => {
                    log::warn!("upstream {} failed: {}", server, err);
                }
            }
        }

        Err(ResolveError::UpstreamExhausted)
    }
}

/// A resolver backed by the JSON DNS-over-HTTPS API
pub struct HttpsJsonResolver {
    client: Arc<HttpsDnsClient>,
}

impl HttpsJsonResolver {
    pub fn new(client: Arc<HttpsDnsClient>) -> HttpsJsonResolver {
        HttpsJsonResolver { client }
    }
}

impl QueryResolver for HttpsJsonResolver {
    fn resolve(&mut self, request: &DnsPacket) -> Result<DnsPacket> {
        let question = request
            .questions
            .first()
            .ok_or(ResolveError::EmptyQuestion)?;

        let json = self.client.query(question.qtype, &question.name)?;

        Ok(translate_answer(&json, request))
    }
}

#[cfg(test)]
mod tests {

    use std::sync::{Arc, Mutex};

    use super::*;
    use crate::dns::client::ClientError;
    use crate::dns::context::tests::create_test_context;
    use crate::dns::edns0::client_subnet;
    use crate::dns::protocol::{DnsQuestion, DnsRecord, QueryType, TransientTtl};

    fn build_query(qname: &str) -> DnsPacket {
        let mut query = DnsPacket::new();
        query.header.id = 4711;
        query.header.recursion_desired = true;
        query
            .questions
            .push(DnsQuestion::new(qname.into(), QueryType::A));
        query
    }

    #[test]
    fn test_failover_returns_first_completed_exchange() {
        let attempts = Arc::new(Mutex::new(Vec::new()));
        let attempts_clone = attempts.clone();

        let context = create_test_context(Box::new(move |query, server| {
            attempts_clone.lock().unwrap().push(server.to_string());

            if server.starts_with("bad") {
                return Err(ClientError::Io(std::io::Error::new(
                    std::io::ErrorKind::TimedOut,
                    "timed out",
                )));
            }

            let mut response = DnsPacket::new();
            response.header.id = query.header.id;
            response.header.response = true;
            response.answers.push(DnsRecord::A {
                domain: "example.com".to_string(),
                addr: "127.0.0.1".parse().unwrap(),
                ttl: TransientTtl(3600),
            });
            Ok(response)
        }));

        let servers = vec![
            "bad1:53".to_string(),
            "bad2:53".to_string(),
            "good:53".to_string(),
        ];
        let mut forwarder = UpstreamForwarder::new(context.clone(), servers.clone());

        let response = forwarder.resolve(&build_query("example.com")).unwrap();
        assert_eq!(4711, response.header.id);
        assert_eq!(1, response.answers.len());

        // exactly one pass, in list order
        assert_eq!(servers, *attempts.lock().unwrap());
    }

    #[test]
    fn test_all_upstreams_failing_yields_no_response() {
        let context = create_test_context(Box::new(|_, _| {
            Err(ClientError::Io(std::io::Error::new(
                std::io::ErrorKind::ConnectionRefused,
                "refused",
            )))
        }));

        let mut forwarder = UpstreamForwarder::new(
            context,
            vec!["bad1:53".to_string(), "bad2:53".to_string()],
        );

        match forwarder.resolve(&build_query("example.com")) {
            Err(ResolveError::UpstreamExhausted) => {}
            _ => panic!("expected upstream exhaustion"),
        }
    }

    #[test]
    fn test_error_responses_are_still_returned() {
        // NXDOMAIN from the first server is a completed exchange; the second
        // server must not be consulted
        let attempts = Arc::new(Mutex::new(0));
        let attempts_clone = attempts.clone();

        let context = create_test_context(Box::new(move |query, _| {
            *attempts_clone.lock().unwrap() += 1;

            let mut response = DnsPacket::new();
            response.header.id = query.header.id;
            response.header.response = true;
            response.header.rescode = crate::dns::protocol::ResultCode::NXDOMAIN;
            Ok(response)
        }));

        let mut forwarder = UpstreamForwarder::new(
            context,
            vec!["first:53".to_string(), "second:53".to_string()],
        );

        let response = forwarder.resolve(&build_query("nonexistent.example")).unwrap();
        assert_eq!(
            crate::dns::protocol::ResultCode::NXDOMAIN,
            response.header.rescode
        );
        assert_eq!(1, *attempts.lock().unwrap());
    }

    #[test]
    fn test_subnet_option_is_attached_before_forwarding() {
        let seen = Arc::new(Mutex::new(None));
        let seen_clone = seen.clone();

        let context = create_test_context(Box::new(move |query, _| {
            *seen_clone.lock().unwrap() = client_subnet(query);
            Ok(DnsPacket::new())
        }));

        let mut forwarder = UpstreamForwarder::new(context, vec!["good:53".to_string()]);
        forwarder.resolve(&build_query("example.com")).unwrap();

        let subnet = seen.lock().unwrap().clone().unwrap();
        assert_eq!(1, subnet.family);
        assert_eq!(32, subnet.source_prefix_len);
    }
}
