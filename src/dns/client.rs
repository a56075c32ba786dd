//! client for exchanging DNS packets with upstream servers

use std::net::UdpSocket;
use std::time::Duration;

use derive_more::{Display, Error, From};

use crate::dns::buffer::BytePacketBuffer;
use crate::dns::protocol::DnsPacket;

#[derive(Debug, Display, From, Error)]
pub enum ClientError {
    Protocol(crate::dns::protocol::ProtocolError),
    Io(std::io::Error),
}

type Result<T> = std::result::Result<T, ClientError>;

/// A single blocking exchange of one query against one server
///
/// Implementors send the packet as-is, preserving its transaction id, and
/// return the matching response. The trait seam lets tests substitute a stub
/// that never touches the network.
pub trait DnsClient {
    fn exchange(&self, query: &DnsPacket, server: &str) -> Result<DnsPacket>;
}

/// The UDP client
///
/// A fresh socket is bound per exchange, so concurrent exchanges from
/// different worker threads never share state. The read timeout bounds the
/// attempt; datagrams whose id doesn't match the query are ignored until the
/// timeout fires.
pub struct DnsUdpClient {
    timeout: Duration,
}

impl Default for DnsUdpClient {
    fn default() -> Self {
        DnsUdpClient::new()
    }
}

impl DnsUdpClient {
    pub fn new() -> DnsUdpClient {
        DnsUdpClient {
            timeout: Duration::from_secs(2),
        }
    }

    pub fn with_timeout(timeout: Duration) -> DnsUdpClient {
        DnsUdpClient { timeout }
    }
}

impl DnsClient for DnsUdpClient {
    fn exchange(&self, query: &DnsPacket, server: &str) -> Result<DnsPacket> {
        let socket = UdpSocket::bind(("0.0.0.0", 0))?;
        socket.set_read_timeout(Some(self.timeout))?;

        let mut req_buffer = BytePacketBuffer::new();
        let mut packet = query.clone();
        packet.write(&mut req_buffer, 512)?;
        socket.send_to(&req_buffer.buf[0..req_buffer.pos], server)?;

        loop {
            let mut res_buffer = BytePacketBuffer::new();
            socket.recv_from(&mut res_buffer.buf)?;

            let response = match DnsPacket::from_buffer(&mut res_buffer) {
                Ok(response) => response,
                Err(err) => {
                    log::info!("failed to parse response packet: {}", err);
                    continue;
                }
            };

            if response.header.id == query.header.id {
                return Ok(response);
            }

            log::info!(
                "discarding response with mismatched id {} from {}",
                response.header.id,
                server
            );
        }
    }
}
