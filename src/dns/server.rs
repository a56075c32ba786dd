//! UDP server implementation for the relay

use std::collections::VecDeque;
use std::net::{SocketAddr, UdpSocket};
use std::sync::atomic::Ordering;
use std::sync::{Arc, Condvar, Mutex};
use std::thread::Builder;

use derive_more::{Display, Error, From};

use crate::dns::buffer::{BytePacketBuffer, PacketBuffer, VectorPacketBuffer};
use crate::dns::context::ServerContext;
use crate::dns::protocol::{DnsPacket, DnsRecord};

#[derive(Debug, Display, From, Error)]
pub enum ServerError {
    Io(std::io::Error),
}

type Result<T> = std::result::Result<T, ServerError>;

macro_rules! return_or_report {
    ( $x:expr, $message:expr ) => {
        match $x {
            Ok(res) => res,
            Err(_) => {
                log::info!($message);
                return;
            }
        }
    };
}

macro_rules! ignore_or_report {
    ( $x:expr, $message:expr ) => {
        match $x {
            Ok(_) => {}
            Err(_) => {
                log::info!($message);
                return;
            }
        };
    };
}

/// Common trait for DNS servers
pub trait DnsServer {
    /// Initialize the server and start listening
    ///
    /// This method should _NOT_ block. Rather, servers are expected to spawn a new
    /// thread to handle requests and return immediately.
    fn run_server(self) -> Result<()>;
}

/// Resolve one query through the configured strategy
///
/// Returns `None` when no response can be produced. The caller must then
/// write nothing: the client observes a timeout rather than a half answer.
pub fn handle_query(context: Arc<ServerContext>, request: &DnsPacket) -> Option<DnsPacket> {
    let mut resolver = context.create_resolver(context.clone());

    match resolver.resolve(request) {
        Ok(response) => Some(response),
        Err(err) => {
            let qname = request
                .questions
                .first()
                .map(|q| q.name.as_str())
                .unwrap_or("<no question>");
            log::warn!("dropping query for {}: {}", qname, err);
            None
        }
    }
}

/// The UDP server
///
/// Accepts DNS queries through UDP, and relays them through the strategy held
/// by the `ServerContext`. Packets are read on a single thread, and a fixed
/// pool of worker threads services the parsed requests.
pub struct DnsUdpServer {
    context: Arc<ServerContext>,
    request_queue: Arc<Mutex<VecDeque<(SocketAddr, DnsPacket)>>>,
    request_cond: Arc<Condvar>,
    thread_count: usize,
}

impl DnsUdpServer {
    pub fn new(context: Arc<ServerContext>, thread_count: usize) -> DnsUdpServer {
        DnsUdpServer {
            context,
            request_queue: Arc::new(Mutex::new(VecDeque::new())),
            request_cond: Arc::new(Condvar::new()),
            thread_count,
        }
    }

    /// Process a single DNS request and send the response
    fn process_request(
        socket: &UdpSocket,
        context: Arc<ServerContext>,
        src: SocketAddr,
        request: &DnsPacket,
    ) {
        let mut size_limit = 512;

        // Check for EDNS
        if request.resources.len() == 1 {
            if let DnsRecord::Opt { packet_len, .. } = request.resources[0] {
                size_limit = packet_len as usize;
            }
        }

        let mut packet = match handle_query(context, request) {
            Some(packet) => packet,
            None => return,
        };

        let mut res_buffer = VectorPacketBuffer::new();
        ignore_or_report!(
            packet.write(&mut res_buffer, size_limit),
            "Failed to write response packet"
        );

        let len = res_buffer.pos();
        let data = return_or_report!(res_buffer.get_range(0, len), "Failed to get buffer data");
        ignore_or_report!(socket.send_to(data, src), "Failed to send response packet");
    }

    /// Spawn a worker thread to handle DNS requests
    fn spawn_request_handler(&self, thread_id: usize, socket: UdpSocket) -> std::io::Result<()> {
        let context = self.context.clone();
        let request_cond = self.request_cond.clone();
        let request_queue = self.request_queue.clone();

        let name = format!("DnsUdpServer-request-{}", thread_id);
        Builder::new().name(name).spawn(move || {
            loop {
                // Acquire lock, and wait on the condition until data is available
                let (src, request) = match request_queue
                    .lock()
                    .ok()
                    .and_then(|x| request_cond.wait(x).ok())
                    .and_then(|mut x| x.pop_front())
                {
                    Some(x) => x,
                    None => continue,
                };

                Self::process_request(&socket, context.clone(), src, &request);
            }
        })?;

        Ok(())
    }

    /// Spawn the main incoming request handler thread
    fn spawn_incoming_handler(self, socket: UdpSocket) -> std::io::Result<()> {
        Builder::new()
            .name("DnsUdpServer-incoming".into())
            .spawn(move || {
                loop {
                    // Read a query packet
                    let mut req_buffer = BytePacketBuffer::new();
                    let (_, src) = match socket.recv_from(&mut req_buffer.buf) {
                        Ok(x) => x,
                        Err(e) => {
                            log::info!("Failed to read from UDP socket: {:?}", e);
                            continue;
                        }
                    };

                    // Parse it
                    let request = match DnsPacket::from_buffer(&mut req_buffer) {
                        Ok(x) => x,
                        Err(e) => {
                            log::info!("Failed to parse UDP query packet: {:?}", e);
                            continue;
                        }
                    };

                    let _ = self
                        .context
                        .statistics
                        .udp_query_count
                        .fetch_add(1, Ordering::Release);

                    // Hand it off to a worker and notify waiting threads
                    self.enqueue_request(src, request);
                }
            })?;

        Ok(())
    }

    /// Add a request to the queue and notify waiting threads
    fn enqueue_request(&self, src: SocketAddr, request: DnsPacket) {
        match self.request_queue.lock() {
            Ok(mut queue) => {
                queue.push_back((src, request));
                self.request_cond.notify_one();
            }
            Err(e) => {
                log::info!("Failed to send UDP request for processing: {}", e);
            }
        }
    }
}

impl DnsServer for DnsUdpServer {
    /// Launch the server
    ///
    /// This method takes ownership of the server, preventing the method from
    /// being called multiple times.
    fn run_server(self) -> Result<()> {
        let socket = UdpSocket::bind(&self.context.listen_addr)?;

        // Spawn worker threads for handling requests
        for thread_id in 0..self.thread_count {
            let socket_clone = match socket.try_clone() {
                Ok(x) => x,
                Err(e) => {
                    log::info!("Failed to clone socket when starting UDP server: {:?}", e);
                    continue;
                }
            };

            self.spawn_request_handler(thread_id, socket_clone)?;
        }

        // Start servicing incoming requests
        self.spawn_incoming_handler(socket)?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {

    use super::*;
    use crate::dns::context::tests::create_test_context;
    use crate::dns::edns0::client_subnet;
    use crate::dns::protocol::{DnsQuestion, QueryType, ResultCode, TransientTtl};

    fn build_query(qname: &str, qtype: QueryType) -> DnsPacket {
        let mut query_packet = DnsPacket::new();
        query_packet.header.id = 777;
        query_packet.header.recursion_desired = true;

        query_packet
            .questions
            .push(DnsQuestion::new(qname.into(), qtype));

        query_packet
    }

    #[test]
    fn test_handle_query_returns_upstream_response() {
        let context = create_test_context(Box::new(|query, _| {
            // the relayed query must carry a subnet option
            assert!(client_subnet(query).is_some());

            let mut response = DnsPacket::new();
            response.header.id = query.header.id;
            response.header.response = true;
            response.answers.push(DnsRecord::A {
                domain: "google.com".to_string(),
                addr: "127.0.0.1".parse().unwrap(),
                ttl: TransientTtl(3600),
            });
            Ok(response)
        }));

        let response =
            handle_query(context, &build_query("google.com", QueryType::A)).unwrap();

        assert_eq!(777, response.header.id);
        assert_eq!(1, response.answers.len());
        match response.answers[0] {
            DnsRecord::A { ref domain, .. } => assert_eq!("google.com", domain),
            _ => panic!(),
        }
    }

    #[test]
    fn test_handle_query_drops_on_upstream_exhaustion() {
        let context = create_test_context(Box::new(|_, _| {
            Err(crate::dns::client::ClientError::Io(std::io::Error::new(
                std::io::ErrorKind::TimedOut,
                "timed out",
            )))
        }));

        let response = handle_query(context, &build_query("google.com", QueryType::A));
        assert!(response.is_none());
    }

    #[test]
    fn test_handle_query_passes_error_rescodes_through() {
        let context = create_test_context(Box::new(|query, _| {
            let mut response = DnsPacket::new();
            response.header.id = query.header.id;
            response.header.response = true;
            response.header.rescode = ResultCode::SERVFAIL;
            Ok(response)
        }));

        let response =
            handle_query(context, &build_query("google.com", QueryType::A)).unwrap();
        assert_eq!(ResultCode::SERVFAIL, response.header.rescode);
    }
}
