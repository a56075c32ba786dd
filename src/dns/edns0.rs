//! EDNS0 client subnet handling - RFC 6891 / RFC 7871
//!
//! Queries relayed upstream carry the configured client address as an EDNS
//! client-subnet option so resolvers can return geographically appropriate
//! answers. The option lives inside the OPT pseudo-record of the additional
//! section; a query carries at most one OPT record and at most one subnet
//! option.

use std::net::IpAddr;

use crate::dns::protocol::{DnsPacket, DnsRecord};

/// Option code for client subnet (RFC 7871)
pub const EDNS_CLIENT_SUBNET: u16 = 8;

/// UDP payload size advertised on a fresh OPT record
const EDNS_PACKET_LEN: u16 = 4096;

/// Client Subnet Option (RFC 7871)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientSubnetOption {
    /// Address family (1 = IPv4, 2 = IPv6)
    pub family: u16,
    /// Source prefix length
    pub source_prefix_len: u8,
    /// Scope prefix length, always 0 on send
    pub scope_prefix_len: u8,
    /// Client subnet address
    pub address: IpAddr,
}

impl ClientSubnetOption {
    /// Create a subnet option asserting the full host address
    pub fn new(address: IpAddr) -> ClientSubnetOption {
        let (family, source_prefix_len) = match address {
            IpAddr::V4(_) => (1, 32),
            IpAddr::V6(_) => (2, 128),
        };

        ClientSubnetOption {
            family,
            source_prefix_len,
            scope_prefix_len: 0,
            address,
        }
    }

    /// Serialize to option wire format
    pub fn serialize(&self) -> Vec<u8> {
        let mut data = Vec::new();

        data.extend_from_slice(&self.family.to_be_bytes());
        data.push(self.source_prefix_len);
        data.push(self.scope_prefix_len);

        match self.address {
            IpAddr::V4(addr) => data.extend_from_slice(&addr.octets()),
            IpAddr::V6(addr) => data.extend_from_slice(&addr.octets()),
        }

        data
    }

    /// Parse from option wire format
    pub fn parse(data: &[u8]) -> Option<ClientSubnetOption> {
        if data.len() < 4 {
            return None;
        }

        let family = u16::from_be_bytes([data[0], data[1]]);
        let source_prefix_len = data[2];
        let scope_prefix_len = data[3];

        let address = match family {
            1 => {
                let mut bytes = [0u8; 4];
                let len = (data.len() - 4).min(4);
                bytes[..len].copy_from_slice(&data[4..4 + len]);
                IpAddr::from(bytes)
            }
            2 => {
                let mut bytes = [0u8; 16];
                let len = (data.len() - 4).min(16);
                bytes[..len].copy_from_slice(&data[4..4 + len]);
                IpAddr::from(bytes)
            }
            _ => return None,
        };

        Some(ClientSubnetOption {
            family,
            source_prefix_len,
            scope_prefix_len,
            address,
        })
    }
}

/// Split OPT rdata into (code, data) options, ignoring a malformed tail
fn parse_options(data: &[u8]) -> Vec<(u16, Vec<u8>)> {
    let mut options = Vec::new();

    let mut pos = 0;
    while pos + 4 <= data.len() {
        let code = u16::from_be_bytes([data[pos], data[pos + 1]]);
        let len = u16::from_be_bytes([data[pos + 2], data[pos + 3]]) as usize;
        pos += 4;

        if pos + len > data.len() {
            break;
        }

        options.push((code, data[pos..pos + len].to_vec()));
        pos += len;
    }

    options
}

fn serialize_options(options: &[(u16, Vec<u8>)]) -> Vec<u8> {
    let mut data = Vec::new();

    for (code, option) in options {
        data.extend_from_slice(&code.to_be_bytes());
        data.extend_from_slice(&(option.len() as u16).to_be_bytes());
        data.extend_from_slice(option);
    }

    data
}

/// Attach a client subnet option for `addr` to the query
///
/// An OPT record already present in the additional section is reused rather
/// than duplicated, and any subnet option it carries is replaced. Unrelated
/// options are preserved. The full host address is always asserted: prefix 32
/// for IPv4, prefix 128 for IPv6, scope 0.
pub fn attach_client_subnet(packet: &mut DnsPacket, addr: IpAddr) {
    let subnet = ClientSubnetOption::new(addr);

    for res in packet.resources.iter_mut() {
        if let DnsRecord::Opt { ref mut data, .. } = *res {
            let mut options = parse_options(data);
            options.retain(|(code, _)| *code != EDNS_CLIENT_SUBNET);
            options.push((EDNS_CLIENT_SUBNET, subnet.serialize()));
            *data = serialize_options(&options);
            return;
        }
    }

    packet.resources.push(DnsRecord::Opt {
        packet_len: EDNS_PACKET_LEN,
        flags: 0,
        data: serialize_options(&[(EDNS_CLIENT_SUBNET, subnet.serialize())]),
    });
}

/// Extract the subnet option from a query, if any
pub fn client_subnet(packet: &DnsPacket) -> Option<ClientSubnetOption> {
    for res in &packet.resources {
        if let DnsRecord::Opt { ref data, .. } = *res {
            for (code, option) in parse_options(data) {
                if code == EDNS_CLIENT_SUBNET {
                    return ClientSubnetOption::parse(&option);
                }
            }
        }
    }

    None
}

#[cfg(test)]
mod tests {

    use super::*;
    use crate::dns::protocol::{DnsQuestion, QueryType};

    fn count_subnet_options(packet: &DnsPacket) -> usize {
        let mut count = 0;
        for res in &packet.resources {
            if let DnsRecord::Opt { ref data, .. } = *res {
                count += parse_options(data)
                    .iter()
                    .filter(|(code, _)| *code == EDNS_CLIENT_SUBNET)
                    .count();
            }
        }
        count
    }

    fn build_query(qname: &str) -> DnsPacket {
        let mut packet = DnsPacket::new();
        packet.header.id = 1234;
        packet.header.recursion_desired = true;
        packet
            .questions
            .push(DnsQuestion::new(qname.into(), QueryType::A));
        packet
    }

    #[test]
    fn test_attach_ipv4() {
        let mut packet = build_query("example.com");
        attach_client_subnet(&mut packet, "93.184.216.34".parse().unwrap());

        assert_eq!(1, count_subnet_options(&packet));

        let subnet = client_subnet(&packet).unwrap();
        assert_eq!(1, subnet.family);
        assert_eq!(32, subnet.source_prefix_len);
        assert_eq!(0, subnet.scope_prefix_len);
        assert_eq!("93.184.216.34".parse::<IpAddr>().unwrap(), subnet.address);
    }

    #[test]
    fn test_attach_ipv6() {
        let mut packet = build_query("example.com");
        attach_client_subnet(&mut packet, "2001:db8::1".parse().unwrap());

        let subnet = client_subnet(&packet).unwrap();
        assert_eq!(2, subnet.family);
        assert_eq!(128, subnet.source_prefix_len);
        assert_eq!("2001:db8::1".parse::<IpAddr>().unwrap(), subnet.address);
    }

    #[test]
    fn test_attach_twice_keeps_single_option() {
        let mut packet = build_query("example.com");
        attach_client_subnet(&mut packet, "10.0.0.1".parse().unwrap());
        attach_client_subnet(&mut packet, "10.0.0.2".parse().unwrap());

        // still one OPT record and one subnet option, carrying the last address
        assert_eq!(1, packet.resources.len());
        assert_eq!(1, count_subnet_options(&packet));
        assert_eq!(
            "10.0.0.2".parse::<IpAddr>().unwrap(),
            client_subnet(&packet).unwrap().address
        );
    }

    #[test]
    fn test_existing_opt_is_reused_and_options_preserved() {
        let mut packet = build_query("example.com");

        // a query arriving with its own OPT record carrying a cookie option
        let cookie = (10u16, vec![1, 2, 3, 4, 5, 6, 7, 8]);
        packet.resources.push(DnsRecord::Opt {
            packet_len: 1232,
            flags: 0,
            data: serialize_options(&[cookie.clone()]),
        });

        attach_client_subnet(&mut packet, "10.1.2.3".parse().unwrap());

        assert_eq!(1, packet.resources.len());
        assert_eq!(1, count_subnet_options(&packet));

        match packet.resources[0] {
            DnsRecord::Opt {
                packet_len,
                ref data,
                ..
            } => {
                // advertised payload size of the original OPT is untouched
                assert_eq!(1232, packet_len);
                let options = parse_options(data);
                assert!(options.contains(&cookie));
            }
            _ => panic!(),
        }
    }

    #[test]
    fn test_subnet_option_wire_roundtrip() {
        let option = ClientSubnetOption::new("192.0.2.7".parse().unwrap());
        let parsed = ClientSubnetOption::parse(&option.serialize()).unwrap();
        assert_eq!(option, parsed);
    }
}
