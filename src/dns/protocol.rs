//! implements the DNS protocol in a transport agnostic fashion

use std::cmp::Ordering;
use std::hash::{Hash, Hasher};
use std::net::{Ipv4Addr, Ipv6Addr};

use derive_more::{Display, Error, From};
use serde_derive::{Deserialize, Serialize};

use crate::dns::buffer::{PacketBuffer, VectorPacketBuffer};

#[derive(Debug, Display, From, Error)]
pub enum ProtocolError {
    Buffer(crate::dns::buffer::BufferError),
    Io(std::io::Error),
    Hex(hex::FromHexError),
    Base64(base64::DecodeError),
    BadRdata,
}

type Result<T> = std::result::Result<T, ProtocolError>;

/// `QueryType` represents the Record Type of a query or record
///
/// The specific type Unknown takes an integer parameter in order to retain
/// the id of an unknown type when compiling the reply. An integer can be
/// converted to a querytype using the `from_num` function, and back to an
/// integer using the `to_num` method. Presentation-format type names such as
/// those found in signature and denial-of-existence record bodies resolve
/// through `from_name`.
#[derive(PartialEq, Eq, Debug, Clone, Hash, Copy, Serialize, Deserialize)]
pub enum QueryType {
    Unknown(u16),
    A,          // 1
    Ns,         // 2
    Md,         // 3
    Mf,         // 4
    Cname,      // 5
    Soa,        // 6
    Mb,         // 7
    Mg,         // 8
    Mr,         // 9
    Null,       // 10
    Ptr,        // 12
    Hinfo,      // 13
    Minfo,      // 14
    Mx,         // 15
    Txt,        // 16
    Rp,         // 17
    Aaaa,       // 28
    Srv,        // 33
    Opt,        // 41
    Ds,         // 43
    Sshfp,      // 44
    Rrsig,      // 46
    Nsec,       // 47
    Dnskey,     // 48
    Nsec3,      // 50
    Nsec3param, // 51
    Spf,        // 99
}

impl QueryType {
    pub fn to_num(&self) -> u16 {
        match *self {
            QueryType::Unknown(x) => x,
            QueryType::A => 1,
            QueryType::Ns => 2,
            QueryType::Md => 3,
            QueryType::Mf => 4,
            QueryType::Cname => 5,
            QueryType::Soa => 6,
            QueryType::Mb => 7,
            QueryType::Mg => 8,
            QueryType::Mr => 9,
            QueryType::Null => 10,
            QueryType::Ptr => 12,
            QueryType::Hinfo => 13,
            QueryType::Minfo => 14,
            QueryType::Mx => 15,
            QueryType::Txt => 16,
            QueryType::Rp => 17,
            QueryType::Aaaa => 28,
            QueryType::Srv => 33,
            QueryType::Opt => 41,
            QueryType::Ds => 43,
            QueryType::Sshfp => 44,
            QueryType::Rrsig => 46,
            QueryType::Nsec => 47,
            QueryType::Dnskey => 48,
            QueryType::Nsec3 => 50,
            QueryType::Nsec3param => 51,
            QueryType::Spf => 99,
        }
    }

    pub fn from_num(num: u16) -> QueryType {
        match num {
            1 => QueryType::A,
            2 => QueryType::Ns,
            3 => QueryType::Md,
            4 => QueryType::Mf,
            5 => QueryType::Cname,
            6 => QueryType::Soa,
            7 => QueryType::Mb,
            8 => QueryType::Mg,
            9 => QueryType::Mr,
            10 => QueryType::Null,
            12 => QueryType::Ptr,
            13 => QueryType::Hinfo,
            14 => QueryType::Minfo,
            15 => QueryType::Mx,
            16 => QueryType::Txt,
            17 => QueryType::Rp,
            28 => QueryType::Aaaa,
            33 => QueryType::Srv,
            41 => QueryType::Opt,
            43 => QueryType::Ds,
            44 => QueryType::Sshfp,
            46 => QueryType::Rrsig,
            47 => QueryType::Nsec,
            48 => QueryType::Dnskey,
            50 => QueryType::Nsec3,
            51 => QueryType::Nsec3param,
            99 => QueryType::Spf,
            _ => QueryType::Unknown(num),
        }
    }

    /// Resolve a presentation-format type name such as "A" or "RRSIG"
    pub fn from_name(name: &str) -> Option<QueryType> {
        let qtype = match name.to_uppercase().as_str() {
            "A" => QueryType::A,
            "NS" => QueryType::Ns,
            "MD" => QueryType::Md,
            "MF" => QueryType::Mf,
            "CNAME" => QueryType::Cname,
            "SOA" => QueryType::Soa,
            "MB" => QueryType::Mb,
            "MG" => QueryType::Mg,
            "MR" => QueryType::Mr,
            "NULL" => QueryType::Null,
            "PTR" => QueryType::Ptr,
            "HINFO" => QueryType::Hinfo,
            "MINFO" => QueryType::Minfo,
            "MX" => QueryType::Mx,
            "TXT" => QueryType::Txt,
            "RP" => QueryType::Rp,
            "AAAA" => QueryType::Aaaa,
            "SRV" => QueryType::Srv,
            "OPT" => QueryType::Opt,
            "DS" => QueryType::Ds,
            "SSHFP" => QueryType::Sshfp,
            "RRSIG" => QueryType::Rrsig,
            "NSEC" => QueryType::Nsec,
            "DNSKEY" => QueryType::Dnskey,
            "NSEC3" => QueryType::Nsec3,
            "NSEC3PARAM" => QueryType::Nsec3param,
            "SPF" => QueryType::Spf,
            _ => return None,
        };

        Some(qtype)
    }
}

#[derive(Copy, Clone, Debug, Eq, Serialize, Deserialize)]
pub struct TransientTtl(pub u32);

impl PartialEq<TransientTtl> for TransientTtl {
    fn eq(&self, _: &TransientTtl) -> bool {
        true
    }
}

impl PartialOrd<TransientTtl> for TransientTtl {
    fn partial_cmp(&self, other: &TransientTtl) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for TransientTtl {
    fn cmp(&self, _: &TransientTtl) -> Ordering {
        Ordering::Equal
    }
}

impl Hash for TransientTtl {
    fn hash<H>(&self, _: &mut H)
    where
        H: Hasher,
    {
        // purposely left empty
    }
}

/// Decode an RFC 4648 base32hex string, as used for hashed owner names
pub(crate) fn decode_base32hex(s: &str) -> Option<Vec<u8>> {
    let mut bits = 0u32;
    let mut nbits = 0u32;
    let mut out = Vec::new();

    for c in s.bytes() {
        let val = match c {
            b'0'..=b'9' => c - b'0',
            b'A'..=b'V' => c - b'A' + 10,
            b'a'..=b'v' => c - b'a' + 10,
            b'=' => break,
            _ => return None,
        };

        bits = (bits << 5) | val as u32;
        nbits += 5;

        if nbits >= 8 {
            nbits -= 8;
            out.push((bits >> nbits) as u8);
        }
    }

    Some(out)
}

/// `DnsRecord` is the primary representation of a DNS record
///
/// This enumeration is used for reading records off the wire as well as for
/// writing records constructed from their JSON presentation. Signature and
/// digest bodies keep their presentation encoding (hex, base64, base32hex)
/// and are decoded when the record is written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum DnsRecord {
    Unknown {
        domain: String,
        qtype: u16,
        data: Vec<u8>,
        ttl: TransientTtl,
    }, // 0
    A {
        domain: String,
        addr: Ipv4Addr,
        ttl: TransientTtl,
    }, // 1
    Ns {
        domain: String,
        host: String,
        ttl: TransientTtl,
    }, // 2
    Md {
        domain: String,
        host: String,
        ttl: TransientTtl,
    }, // 3
    Mf {
        domain: String,
        host: String,
        ttl: TransientTtl,
    }, // 4
    Cname {
        domain: String,
        host: String,
        ttl: TransientTtl,
    }, // 5
    Soa {
        domain: String,
        m_name: String,
        r_name: String,
        serial: u32,
        refresh: u32,
        retry: u32,
        expire: u32,
        minimum: u32,
        ttl: TransientTtl,
    }, // 6
    Mb {
        domain: String,
        host: String,
        ttl: TransientTtl,
    }, // 7
    Mg {
        domain: String,
        host: String,
        ttl: TransientTtl,
    }, // 8
    Mr {
        domain: String,
        host: String,
        ttl: TransientTtl,
    }, // 9
    Null {
        domain: String,
        ttl: TransientTtl,
    }, // 10
    Ptr {
        domain: String,
        host: String,
        ttl: TransientTtl,
    }, // 12
    Hinfo {
        domain: String,
        ttl: TransientTtl,
    }, // 13
    Minfo {
        domain: String,
        ttl: TransientTtl,
    }, // 14
    Mx {
        domain: String,
        priority: u16,
        host: String,
        ttl: TransientTtl,
    }, // 15
    Txt {
        domain: String,
        strings: Vec<String>,
        ttl: TransientTtl,
    }, // 16
    Rp {
        domain: String,
        mbox: String,
        txt: String,
        ttl: TransientTtl,
    }, // 17
    Aaaa {
        domain: String,
        addr: Ipv6Addr,
        ttl: TransientTtl,
    }, // 28
    Srv {
        domain: String,
        priority: u16,
        weight: u16,
        port: u16,
        host: String,
        ttl: TransientTtl,
    }, // 33
    Opt {
        packet_len: u16,
        flags: u32,
        data: Vec<u8>,
    }, // 41
    Ds {
        domain: String,
        key_tag: u16,
        algorithm: u8,
        digest_type: u8,
        digest: String,
        ttl: TransientTtl,
    }, // 43
    Sshfp {
        domain: String,
        algorithm: u8,
        fp_type: u8,
        fingerprint: String,
        ttl: TransientTtl,
    }, // 44
    Rrsig {
        domain: String,
        type_covered: QueryType,
        algorithm: u8,
        labels: u8,
        orig_ttl: u32,
        expiration: u32,
        inception: u32,
        key_tag: u16,
        signer_name: String,
        signature: String,
        ttl: TransientTtl,
    }, // 46
    Nsec {
        domain: String,
        next_domain: String,
        type_bitmap: Vec<QueryType>,
        ttl: TransientTtl,
    }, // 47
    Dnskey {
        domain: String,
        flags: u16,
        protocol: u8,
        algorithm: u8,
        public_key: String,
        ttl: TransientTtl,
    }, // 48
    Nsec3 {
        domain: String,
        hash_alg: u8,
        flags: u8,
        iterations: u16,
        salt: String,
        next_domain: String,
        type_bitmap: Vec<QueryType>,
        ttl: TransientTtl,
    }, // 50
    Nsec3param {
        domain: String,
        hash_alg: u8,
        flags: u8,
        iterations: u16,
        salt: String,
        ttl: TransientTtl,
    }, // 51
    Spf {
        domain: String,
        strings: Vec<String>,
        ttl: TransientTtl,
    }, // 99
}

fn host_record(qtype: QueryType, domain: String, host: String, ttl: u32) -> DnsRecord {
    let ttl = TransientTtl(ttl);
    match qtype {
        QueryType::Ns => DnsRecord::Ns { domain, host, ttl },
        QueryType::Md => DnsRecord::Md { domain, host, ttl },
        QueryType::Mf => DnsRecord::Mf { domain, host, ttl },
        QueryType::Cname => DnsRecord::Cname { domain, host, ttl },
        QueryType::Mb => DnsRecord::Mb { domain, host, ttl },
        QueryType::Mg => DnsRecord::Mg { domain, host, ttl },
        QueryType::Mr => DnsRecord::Mr { domain, host, ttl },
        _ => DnsRecord::Ptr { domain, host, ttl },
    }
}

/// Read a sequence of character-strings spanning `data_len` bytes
fn read_character_strings<T: PacketBuffer>(
    buffer: &mut T,
    data_len: u16,
) -> Result<Vec<String>> {
    let mut strings = Vec::new();

    let target_pos = buffer.pos() + data_len as usize;
    while buffer.pos() < target_pos {
        let len = buffer.read()? as usize;
        let pos = buffer.pos();
        let str_buffer = buffer.get_range(pos, len)?;
        strings.push(String::from_utf8_lossy(str_buffer).to_string());
        buffer.step(len)?;
    }

    Ok(strings)
}

/// Write an RFC 4034 type bitmap for the supplied set of types
fn write_type_bitmap<T: PacketBuffer>(buffer: &mut T, types: &[QueryType]) -> Result<()> {
    let mut nums: Vec<u16> = types.iter().map(|t| t.to_num()).collect();
    nums.sort_unstable();
    nums.dedup();

    let mut idx = 0;
    while idx < nums.len() {
        let window = (nums[idx] >> 8) as u8;
        let mut bitmap = [0u8; 32];
        let mut octets = 0;

        while idx < nums.len() && (nums[idx] >> 8) as u8 == window {
            let low = (nums[idx] & 0xFF) as usize;
            bitmap[low / 8] |= 0x80 >> (low % 8);
            if low / 8 + 1 > octets {
                octets = low / 8 + 1;
            }
            idx += 1;
        }

        buffer.write_u8(window)?;
        buffer.write_u8(octets as u8)?;
        for b in &bitmap[..octets] {
            buffer.write_u8(*b)?;
        }
    }

    Ok(())
}

impl DnsRecord {
    pub fn read<T: PacketBuffer>(buffer: &mut T) -> Result<DnsRecord> {
        let mut domain = String::new();
        buffer.read_qname(&mut domain)?;

        let qtype_num = buffer.read_u16()?;
        let qtype = QueryType::from_num(qtype_num);
        let class = buffer.read_u16()?;
        let ttl = buffer.read_u32()?;
        let data_len = buffer.read_u16()?;

        match qtype {
            QueryType::A => {
                let raw_addr = buffer.read_u32()?;
                let addr = Ipv4Addr::new(
                    ((raw_addr >> 24) & 0xFF) as u8,
                    ((raw_addr >> 16) & 0xFF) as u8,
                    ((raw_addr >> 8) & 0xFF) as u8,
                    (raw_addr & 0xFF) as u8,
                );

                Ok(DnsRecord::A {
                    domain,
                    addr,
                    ttl: TransientTtl(ttl),
                })
            }
            QueryType::Aaaa => {
                let raw_addr1 = buffer.read_u32()?;
                let raw_addr2 = buffer.read_u32()?;
                let raw_addr3 = buffer.read_u32()?;
                let raw_addr4 = buffer.read_u32()?;
                let addr = Ipv6Addr::new(
                    ((raw_addr1 >> 16) & 0xFFFF) as u16,
                    (raw_addr1 & 0xFFFF) as u16,
                    ((raw_addr2 >> 16) & 0xFFFF) as u16,
                    (raw_addr2 & 0xFFFF) as u16,
                    ((raw_addr3 >> 16) & 0xFFFF) as u16,
                    (raw_addr3 & 0xFFFF) as u16,
                    ((raw_addr4 >> 16) & 0xFFFF) as u16,
                    (raw_addr4 & 0xFFFF) as u16,
                );

                Ok(DnsRecord::Aaaa {
                    domain,
                    addr,
                    ttl: TransientTtl(ttl),
                })
            }
            QueryType::Ns
            | QueryType::Md
            | QueryType::Mf
            | QueryType::Cname
            | QueryType::Mb
            | QueryType::Mg
            | QueryType::Mr
            | QueryType::Ptr => {
                let mut host = String::new();
                buffer.read_qname(&mut host)?;

                Ok(host_record(qtype, domain, host, ttl))
            }
            QueryType::Srv => {
                let priority = buffer.read_u16()?;
                let weight = buffer.read_u16()?;
                let port = buffer.read_u16()?;

                let mut srv = String::new();
                buffer.read_qname(&mut srv)?;

                Ok(DnsRecord::Srv {
                    domain,
                    priority,
                    weight,
                    port,
                    host: srv,
                    ttl: TransientTtl(ttl),
                })
            }
            QueryType::Mx => {
                let priority = buffer.read_u16()?;
                let mut mx = String::new();
                buffer.read_qname(&mut mx)?;

                Ok(DnsRecord::Mx {
                    domain,
                    priority,
                    host: mx,
                    ttl: TransientTtl(ttl),
                })
            }
            QueryType::Soa => {
                let mut m_name = String::new();
                buffer.read_qname(&mut m_name)?;

                let mut r_name = String::new();
                buffer.read_qname(&mut r_name)?;

                let serial = buffer.read_u32()?;
                let refresh = buffer.read_u32()?;
                let retry = buffer.read_u32()?;
                let expire = buffer.read_u32()?;
                let minimum = buffer.read_u32()?;

                Ok(DnsRecord::Soa {
                    domain,
                    m_name,
                    r_name,
                    serial,
                    refresh,
                    retry,
                    expire,
                    minimum,
                    ttl: TransientTtl(ttl),
                })
            }
            QueryType::Txt => {
                let strings = read_character_strings(buffer, data_len)?;

                Ok(DnsRecord::Txt {
                    domain,
                    strings,
                    ttl: TransientTtl(ttl),
                })
            }
            QueryType::Spf => {
                let strings = read_character_strings(buffer, data_len)?;

                Ok(DnsRecord::Spf {
                    domain,
                    strings,
                    ttl: TransientTtl(ttl),
                })
            }
            QueryType::Opt => {
                let cur_pos = buffer.pos();
                let data = buffer.get_range(cur_pos, data_len as usize)?.to_vec();
                buffer.step(data_len as usize)?;

                Ok(DnsRecord::Opt {
                    packet_len: class,
                    flags: ttl,
                    data,
                })
            }
            _ => {
                // Anything else is carried through with its rdata untouched, so
                // forwarded responses keep records this relay does not model.
                let cur_pos = buffer.pos();
                let data = buffer.get_range(cur_pos, data_len as usize)?.to_vec();
                buffer.step(data_len as usize)?;

                Ok(DnsRecord::Unknown {
                    domain,
                    qtype: qtype_num,
                    data,
                    ttl: TransientTtl(ttl),
                })
            }
        }
    }

    pub fn write<T: PacketBuffer>(&self, buffer: &mut T) -> Result<usize> {
        let start_pos = buffer.pos();
        let qtype = self.get_querytype();

        match *self {
            DnsRecord::A {
                ref domain,
                ref addr,
                ttl: TransientTtl(ttl),
            } => {
                buffer.write_qname(domain)?;
                buffer.write_u16(QueryType::A.to_num())?;
                buffer.write_u16(1)?;
                buffer.write_u32(ttl)?;
                buffer.write_u16(4)?;

                for octet in &addr.octets() {
                    buffer.write_u8(*octet)?;
                }
            }
            DnsRecord::Aaaa {
                ref domain,
                ref addr,
                ttl: TransientTtl(ttl),
            } => {
                buffer.write_qname(domain)?;
                buffer.write_u16(QueryType::Aaaa.to_num())?;
                buffer.write_u16(1)?;
                buffer.write_u32(ttl)?;
                buffer.write_u16(16)?;

                for segment in &addr.segments() {
                    buffer.write_u16(*segment)?;
                }
            }
            DnsRecord::Ns {
                ref domain,
                ref host,
                ttl: TransientTtl(ttl),
            }
            | DnsRecord::Md {
                ref domain,
                ref host,
                ttl: TransientTtl(ttl),
            }
            | DnsRecord::Mf {
                ref domain,
                ref host,
                ttl: TransientTtl(ttl),
            }
            | DnsRecord::Cname {
                ref domain,
                ref host,
                ttl: TransientTtl(ttl),
            }
            | DnsRecord::Mb {
                ref domain,
                ref host,
                ttl: TransientTtl(ttl),
            }
            | DnsRecord::Mg {
                ref domain,
                ref host,
                ttl: TransientTtl(ttl),
            }
            | DnsRecord::Mr {
                ref domain,
                ref host,
                ttl: TransientTtl(ttl),
            }
            | DnsRecord::Ptr {
                ref domain,
                ref host,
                ttl: TransientTtl(ttl),
            } => {
                buffer.write_qname(domain)?;
                buffer.write_u16(qtype.to_num())?;
                buffer.write_u16(1)?;
                buffer.write_u32(ttl)?;

                let pos = buffer.pos();
                buffer.write_u16(0)?;

                buffer.write_qname(host)?;

                let size = buffer.pos() - (pos + 2);
                buffer.set_u16(pos, size as u16)?;
            }
            DnsRecord::Soa {
                ref domain,
                ref m_name,
                ref r_name,
                serial,
                refresh,
                retry,
                expire,
                minimum,
                ttl: TransientTtl(ttl),
            } => {
                buffer.write_qname(domain)?;
                buffer.write_u16(QueryType::Soa.to_num())?;
                buffer.write_u16(1)?;
                buffer.write_u32(ttl)?;

                let pos = buffer.pos();
                buffer.write_u16(0)?;

                buffer.write_qname(m_name)?;
                buffer.write_qname(r_name)?;
                buffer.write_u32(serial)?;
                buffer.write_u32(refresh)?;
                buffer.write_u32(retry)?;
                buffer.write_u32(expire)?;
                buffer.write_u32(minimum)?;

                let size = buffer.pos() - (pos + 2);
                buffer.set_u16(pos, size as u16)?;
            }
            DnsRecord::Null {
                ref domain,
                ttl: TransientTtl(ttl),
            }
            | DnsRecord::Hinfo {
                ref domain,
                ttl: TransientTtl(ttl),
            }
            | DnsRecord::Minfo {
                ref domain,
                ttl: TransientTtl(ttl),
            } => {
                // header-only: the body of these types isn't modeled
                buffer.write_qname(domain)?;
                buffer.write_u16(qtype.to_num())?;
                buffer.write_u16(1)?;
                buffer.write_u32(ttl)?;
                buffer.write_u16(0)?;
            }
            DnsRecord::Mx {
                ref domain,
                priority,
                ref host,
                ttl: TransientTtl(ttl),
            } => {
                buffer.write_qname(domain)?;
                buffer.write_u16(QueryType::Mx.to_num())?;
                buffer.write_u16(1)?;
                buffer.write_u32(ttl)?;

                let pos = buffer.pos();
                buffer.write_u16(0)?;

                buffer.write_u16(priority)?;
                buffer.write_qname(host)?;

                let size = buffer.pos() - (pos + 2);
                buffer.set_u16(pos, size as u16)?;
            }
            DnsRecord::Txt {
                ref domain,
                ref strings,
                ttl: TransientTtl(ttl),
            }
            | DnsRecord::Spf {
                ref domain,
                ref strings,
                ttl: TransientTtl(ttl),
            } => {
                buffer.write_qname(domain)?;
                buffer.write_u16(qtype.to_num())?;
                buffer.write_u16(1)?;
                buffer.write_u32(ttl)?;

                let pos = buffer.pos();
                buffer.write_u16(0)?;

                for string in strings {
                    if string.len() > 0xFF {
                        return Err(ProtocolError::BadRdata);
                    }
                    buffer.write_u8(string.len() as u8)?;
                    for b in string.as_bytes() {
                        buffer.write_u8(*b)?;
                    }
                }

                let size = buffer.pos() - (pos + 2);
                buffer.set_u16(pos, size as u16)?;
            }
            DnsRecord::Rp {
                ref domain,
                ref mbox,
                ref txt,
                ttl: TransientTtl(ttl),
            } => {
                buffer.write_qname(domain)?;
                buffer.write_u16(QueryType::Rp.to_num())?;
                buffer.write_u16(1)?;
                buffer.write_u32(ttl)?;

                let pos = buffer.pos();
                buffer.write_u16(0)?;

                buffer.write_qname(mbox)?;
                buffer.write_qname(txt)?;

                let size = buffer.pos() - (pos + 2);
                buffer.set_u16(pos, size as u16)?;
            }
            DnsRecord::Srv {
                ref domain,
                priority,
                weight,
                port,
                ref host,
                ttl: TransientTtl(ttl),
            } => {
                buffer.write_qname(domain)?;
                buffer.write_u16(QueryType::Srv.to_num())?;
                buffer.write_u16(1)?;
                buffer.write_u32(ttl)?;

                let pos = buffer.pos();
                buffer.write_u16(0)?;

                buffer.write_u16(priority)?;
                buffer.write_u16(weight)?;
                buffer.write_u16(port)?;
                buffer.write_qname(host)?;

                let size = buffer.pos() - (pos + 2);
                buffer.set_u16(pos, size as u16)?;
            }
            DnsRecord::Opt {
                packet_len,
                flags,
                ref data,
            } => {
                buffer.write_u8(0)?; // root name
                buffer.write_u16(QueryType::Opt.to_num())?;
                buffer.write_u16(packet_len)?;
                buffer.write_u32(flags)?;

                buffer.write_u16(data.len() as u16)?;
                for b in data {
                    buffer.write_u8(*b)?;
                }
            }
            DnsRecord::Ds {
                ref domain,
                key_tag,
                algorithm,
                digest_type,
                ref digest,
                ttl: TransientTtl(ttl),
            } => {
                buffer.write_qname(domain)?;
                buffer.write_u16(QueryType::Ds.to_num())?;
                buffer.write_u16(1)?;
                buffer.write_u32(ttl)?;

                let pos = buffer.pos();
                buffer.write_u16(0)?;

                buffer.write_u16(key_tag)?;
                buffer.write_u8(algorithm)?;
                buffer.write_u8(digest_type)?;
                for b in hex::decode(digest)? {
                    buffer.write_u8(b)?;
                }

                let size = buffer.pos() - (pos + 2);
                buffer.set_u16(pos, size as u16)?;
            }
            DnsRecord::Sshfp {
                ref domain,
                algorithm,
                fp_type,
                ref fingerprint,
                ttl: TransientTtl(ttl),
            } => {
                buffer.write_qname(domain)?;
                buffer.write_u16(QueryType::Sshfp.to_num())?;
                buffer.write_u16(1)?;
                buffer.write_u32(ttl)?;

                let pos = buffer.pos();
                buffer.write_u16(0)?;

                buffer.write_u8(algorithm)?;
                buffer.write_u8(fp_type)?;
                for b in hex::decode(fingerprint)? {
                    buffer.write_u8(b)?;
                }

                let size = buffer.pos() - (pos + 2);
                buffer.set_u16(pos, size as u16)?;
            }
            DnsRecord::Rrsig {
                ref domain,
                type_covered,
                algorithm,
                labels,
                orig_ttl,
                expiration,
                inception,
                key_tag,
                ref signer_name,
                ref signature,
                ttl: TransientTtl(ttl),
            } => {
                buffer.write_qname(domain)?;
                buffer.write_u16(QueryType::Rrsig.to_num())?;
                buffer.write_u16(1)?;
                buffer.write_u32(ttl)?;

                let pos = buffer.pos();
                buffer.write_u16(0)?;

                buffer.write_u16(type_covered.to_num())?;
                buffer.write_u8(algorithm)?;
                buffer.write_u8(labels)?;
                buffer.write_u32(orig_ttl)?;
                buffer.write_u32(expiration)?;
                buffer.write_u32(inception)?;
                buffer.write_u16(key_tag)?;
                buffer.write_qname(signer_name)?;
                for b in base64::decode(signature)? {
                    buffer.write_u8(b)?;
                }

                let size = buffer.pos() - (pos + 2);
                buffer.set_u16(pos, size as u16)?;
            }
            DnsRecord::Nsec {
                ref domain,
                ref next_domain,
                ref type_bitmap,
                ttl: TransientTtl(ttl),
            } => {
                buffer.write_qname(domain)?;
                buffer.write_u16(QueryType::Nsec.to_num())?;
                buffer.write_u16(1)?;
                buffer.write_u32(ttl)?;

                let pos = buffer.pos();
                buffer.write_u16(0)?;

                buffer.write_qname(next_domain)?;
                write_type_bitmap(buffer, type_bitmap)?;

                let size = buffer.pos() - (pos + 2);
                buffer.set_u16(pos, size as u16)?;
            }
            DnsRecord::Dnskey {
                ref domain,
                flags,
                protocol,
                algorithm,
                ref public_key,
                ttl: TransientTtl(ttl),
            } => {
                buffer.write_qname(domain)?;
                buffer.write_u16(QueryType::Dnskey.to_num())?;
                buffer.write_u16(1)?;
                buffer.write_u32(ttl)?;

                let pos = buffer.pos();
                buffer.write_u16(0)?;

                buffer.write_u16(flags)?;
                buffer.write_u8(protocol)?;
                buffer.write_u8(algorithm)?;
                for b in base64::decode(public_key)? {
                    buffer.write_u8(b)?;
                }

                let size = buffer.pos() - (pos + 2);
                buffer.set_u16(pos, size as u16)?;
            }
            DnsRecord::Nsec3 {
                ref domain,
                hash_alg,
                flags,
                iterations,
                ref salt,
                ref next_domain,
                ref type_bitmap,
                ttl: TransientTtl(ttl),
            } => {
                buffer.write_qname(domain)?;
                buffer.write_u16(QueryType::Nsec3.to_num())?;
                buffer.write_u16(1)?;
                buffer.write_u32(ttl)?;

                let pos = buffer.pos();
                buffer.write_u16(0)?;

                buffer.write_u8(hash_alg)?;
                buffer.write_u8(flags)?;
                buffer.write_u16(iterations)?;

                let salt_bytes = hex::decode(salt)?;
                buffer.write_u8(salt_bytes.len() as u8)?;
                for b in salt_bytes {
                    buffer.write_u8(b)?;
                }

                let next = decode_base32hex(next_domain).ok_or(ProtocolError::BadRdata)?;
                buffer.write_u8(next.len() as u8)?;
                for b in next {
                    buffer.write_u8(b)?;
                }

                write_type_bitmap(buffer, type_bitmap)?;

                let size = buffer.pos() - (pos + 2);
                buffer.set_u16(pos, size as u16)?;
            }
            DnsRecord::Nsec3param {
                ref domain,
                hash_alg,
                flags,
                iterations,
                ref salt,
                ttl: TransientTtl(ttl),
            } => {
                buffer.write_qname(domain)?;
                buffer.write_u16(QueryType::Nsec3param.to_num())?;
                buffer.write_u16(1)?;
                buffer.write_u32(ttl)?;

                let pos = buffer.pos();
                buffer.write_u16(0)?;

                buffer.write_u8(hash_alg)?;
                buffer.write_u8(flags)?;
                buffer.write_u16(iterations)?;

                let salt_bytes = hex::decode(salt)?;
                buffer.write_u8(salt_bytes.len() as u8)?;
                for b in salt_bytes {
                    buffer.write_u8(b)?;
                }

                let size = buffer.pos() - (pos + 2);
                buffer.set_u16(pos, size as u16)?;
            }
            DnsRecord::Unknown {
                ref domain,
                qtype: qtype_num,
                ref data,
                ttl: TransientTtl(ttl),
            } => {
                buffer.write_qname(domain)?;
                buffer.write_u16(qtype_num)?;
                buffer.write_u16(1)?;
                buffer.write_u32(ttl)?;

                buffer.write_u16(data.len() as u16)?;
                for b in data {
                    buffer.write_u8(*b)?;
                }
            }
        }

        Ok(buffer.pos() - start_pos)
    }

    pub fn get_querytype(&self) -> QueryType {
        match *self {
            DnsRecord::Unknown { qtype, .. } => QueryType::Unknown(qtype),
            DnsRecord::A { .. } => QueryType::A,
            DnsRecord::Ns { .. } => QueryType::Ns,
            DnsRecord::Md { .. } => QueryType::Md,
            DnsRecord::Mf { .. } => QueryType::Mf,
            DnsRecord::Cname { .. } => QueryType::Cname,
            DnsRecord::Soa { .. } => QueryType::Soa,
            DnsRecord::Mb { .. } => QueryType::Mb,
            DnsRecord::Mg { .. } => QueryType::Mg,
            DnsRecord::Mr { .. } => QueryType::Mr,
            DnsRecord::Null { .. } => QueryType::Null,
            DnsRecord::Ptr { .. } => QueryType::Ptr,
            DnsRecord::Hinfo { .. } => QueryType::Hinfo,
            DnsRecord::Minfo { .. } => QueryType::Minfo,
            DnsRecord::Mx { .. } => QueryType::Mx,
            DnsRecord::Txt { .. } => QueryType::Txt,
            DnsRecord::Rp { .. } => QueryType::Rp,
            DnsRecord::Aaaa { .. } => QueryType::Aaaa,
            DnsRecord::Srv { .. } => QueryType::Srv,
            DnsRecord::Opt { .. } => QueryType::Opt,
            DnsRecord::Ds { .. } => QueryType::Ds,
            DnsRecord::Sshfp { .. } => QueryType::Sshfp,
            DnsRecord::Rrsig { .. } => QueryType::Rrsig,
            DnsRecord::Nsec { .. } => QueryType::Nsec,
            DnsRecord::Dnskey { .. } => QueryType::Dnskey,
            DnsRecord::Nsec3 { .. } => QueryType::Nsec3,
            DnsRecord::Nsec3param { .. } => QueryType::Nsec3param,
            DnsRecord::Spf { .. } => QueryType::Spf,
        }
    }

    pub fn get_domain(&self) -> Option<String> {
        match *self {
            DnsRecord::Unknown { ref domain, .. }
            | DnsRecord::A { ref domain, .. }
            | DnsRecord::Ns { ref domain, .. }
            | DnsRecord::Md { ref domain, .. }
            | DnsRecord::Mf { ref domain, .. }
            | DnsRecord::Cname { ref domain, .. }
            | DnsRecord::Soa { ref domain, .. }
            | DnsRecord::Mb { ref domain, .. }
            | DnsRecord::Mg { ref domain, .. }
            | DnsRecord::Mr { ref domain, .. }
            | DnsRecord::Null { ref domain, .. }
            | DnsRecord::Ptr { ref domain, .. }
            | DnsRecord::Hinfo { ref domain, .. }
            | DnsRecord::Minfo { ref domain, .. }
            | DnsRecord::Mx { ref domain, .. }
            | DnsRecord::Txt { ref domain, .. }
            | DnsRecord::Rp { ref domain, .. }
            | DnsRecord::Aaaa { ref domain, .. }
            | DnsRecord::Srv { ref domain, .. }
            | DnsRecord::Ds { ref domain, .. }
            | DnsRecord::Sshfp { ref domain, .. }
            | DnsRecord::Rrsig { ref domain, .. }
            | DnsRecord::Nsec { ref domain, .. }
            | DnsRecord::Dnskey { ref domain, .. }
            | DnsRecord::Nsec3 { ref domain, .. }
            | DnsRecord::Nsec3param { ref domain, .. }
            | DnsRecord::Spf { ref domain, .. } => Some(domain.clone()),
            DnsRecord::Opt { .. } => None,
        }
    }

    pub fn get_ttl(&self) -> u32 {
        match *self {
            DnsRecord::Unknown {
                ttl: TransientTtl(ttl),
                ..
            }
            | DnsRecord::A {
                ttl: TransientTtl(ttl),
                ..
            }
            | DnsRecord::Ns {
                ttl: TransientTtl(ttl),
                ..
            }
            | DnsRecord::Md {
                ttl: TransientTtl(ttl),
                ..
            }
            | DnsRecord::Mf {
                ttl: TransientTtl(ttl),
                ..
            }
            | DnsRecord::Cname {
                ttl: TransientTtl(ttl),
                ..
            }
            | DnsRecord::Soa {
                ttl: TransientTtl(ttl),
                ..
            }
            | DnsRecord::Mb {
                ttl: TransientTtl(ttl),
                ..
            }
            | DnsRecord::Mg {
                ttl: TransientTtl(ttl),
                ..
            }
            | DnsRecord::Mr {
                ttl: TransientTtl(ttl),
                ..
            }
            | DnsRecord::Null {
                ttl: TransientTtl(ttl),
                ..
            }
            | DnsRecord::Ptr {
                ttl: TransientTtl(ttl),
                ..
            }
            | DnsRecord::Hinfo {
                ttl: TransientTtl(ttl),
                ..
            }
            | DnsRecord::Minfo {
                ttl: TransientTtl(ttl),
                ..
            }
            | DnsRecord::Mx {
                ttl: TransientTtl(ttl),
                ..
            }
            | DnsRecord::Txt {
                ttl: TransientTtl(ttl),
                ..
            }
            | DnsRecord::Rp {
                ttl: TransientTtl(ttl),
                ..
            }
            | DnsRecord::Aaaa {
                ttl: TransientTtl(ttl),
                ..
            }
            | DnsRecord::Srv {
                ttl: TransientTtl(ttl),
                ..
            }
            | DnsRecord::Ds {
                ttl: TransientTtl(ttl),
                ..
            }
            | DnsRecord::Sshfp {
                ttl: TransientTtl(ttl),
                ..
            }
            | DnsRecord::Rrsig {
                ttl: TransientTtl(ttl),
                ..
            }
            | DnsRecord::Nsec {
                ttl: TransientTtl(ttl),
                ..
            }
            | DnsRecord::Dnskey {
                ttl: TransientTtl(ttl),
                ..
            }
            | DnsRecord::Nsec3 {
                ttl: TransientTtl(ttl),
                ..
            }
            | DnsRecord::Nsec3param {
                ttl: TransientTtl(ttl),
                ..
            }
            | DnsRecord::Spf {
                ttl: TransientTtl(ttl),
                ..
            } => ttl,
            DnsRecord::Opt { .. } => 0,
        }
    }
}

/// The result code of a response, from the header's RCODE field
#[derive(Copy, Clone, Debug, PartialEq, Eq, Default)]
pub enum ResultCode {
    #[default]
    NOERROR = 0,
    FORMERR = 1,
    SERVFAIL = 2,
    NXDOMAIN = 3,
    NOTIMP = 4,
    REFUSED = 5,
    YXDOMAIN = 6,
    YXRRSET = 7,
    NXRRSET = 8,
    NOTAUTH = 9,
    NOTZONE = 10,
}

impl ResultCode {
    pub fn from_num(num: u8) -> ResultCode {
        match num {
            1 => ResultCode::FORMERR,
            2 => ResultCode::SERVFAIL,
            3 => ResultCode::NXDOMAIN,
            4 => ResultCode::NOTIMP,
            5 => ResultCode::REFUSED,
            6 => ResultCode::YXDOMAIN,
            7 => ResultCode::YXRRSET,
            8 => ResultCode::NXRRSET,
            9 => ResultCode::NOTAUTH,
            10 => ResultCode::NOTZONE,
            _ => ResultCode::NOERROR,
        }
    }
}

/// Representation of a DNS header
#[derive(Clone, Debug, Default)]
pub struct DnsHeader {
    pub id: u16, // 16 bits

    pub recursion_desired: bool,    // 1 bit
    pub truncated_message: bool,    // 1 bit
    pub authoritative_answer: bool, // 1 bit
    pub opcode: u8,                 // 4 bits
    pub response: bool,             // 1 bit

    pub rescode: ResultCode,       // 4 bits
    pub checking_disabled: bool,   // 1 bit
    pub authed_data: bool,         // 1 bit
    pub z: bool,                   // 1 bit
    pub recursion_available: bool, // 1 bit

    pub questions: u16,             // 16 bits
    pub answers: u16,               // 16 bits
    pub authoritative_entries: u16, // 16 bits
    pub resource_entries: u16,      // 16 bits
}

impl DnsHeader {
    pub fn new() -> DnsHeader {
        DnsHeader {
            id: 0,

            recursion_desired: false,
            truncated_message: false,
            authoritative_answer: false,
            opcode: 0,
            response: false,

            rescode: ResultCode::NOERROR,
            checking_disabled: false,
            authed_data: false,
            z: false,
            recursion_available: false,

            questions: 0,
            answers: 0,
            authoritative_entries: 0,
            resource_entries: 0,
        }
    }

    pub fn write<T: PacketBuffer>(&self, buffer: &mut T) -> Result<()> {
        buffer.write_u16(self.id)?;

        buffer.write_u8(
            (self.recursion_desired as u8)
                | ((self.truncated_message as u8) << 1)
                | ((self.authoritative_answer as u8) << 2)
                | (self.opcode << 3)
                | ((self.response as u8) << 7),
        )?;

        buffer.write_u8(
            (self.rescode as u8)
                | ((self.checking_disabled as u8) << 4)
                | ((self.authed_data as u8) << 5)
                | ((self.z as u8) << 6)
                | ((self.recursion_available as u8) << 7),
        )?;

        buffer.write_u16(self.questions)?;
        buffer.write_u16(self.answers)?;
        buffer.write_u16(self.authoritative_entries)?;
        buffer.write_u16(self.resource_entries)?;

        Ok(())
    }

    pub fn binary_len(&self) -> usize {
        12
    }

    pub fn read<T: PacketBuffer>(&mut self, buffer: &mut T) -> Result<()> {
        self.id = buffer.read_u16()?;

        let flags = buffer.read_u16()?;
        let a = (flags >> 8) as u8;
        let b = (flags & 0xFF) as u8;
        self.recursion_desired = (a & (1 << 0)) > 0;
        self.truncated_message = (a & (1 << 1)) > 0;
        self.authoritative_answer = (a & (1 << 2)) > 0;
        self.opcode = (a >> 3) & 0x0F;
        self.response = (a & (1 << 7)) > 0;

        self.rescode = ResultCode::from_num(b & 0x0F);
        self.checking_disabled = (b & (1 << 4)) > 0;
        self.authed_data = (b & (1 << 5)) > 0;
        self.z = (b & (1 << 6)) > 0;
        self.recursion_available = (b & (1 << 7)) > 0;

        self.questions = buffer.read_u16()?;
        self.answers = buffer.read_u16()?;
        self.authoritative_entries = buffer.read_u16()?;
        self.resource_entries = buffer.read_u16()?;

        Ok(())
    }
}

/// Representation of a DNS question
///
/// The class is read and discarded when parsing; this relay only speaks the
/// Internet class and reasserts it on write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DnsQuestion {
    pub name: String,
    pub qtype: QueryType,
}

impl DnsQuestion {
    pub fn new(name: String, qtype: QueryType) -> DnsQuestion {
        DnsQuestion { name, qtype }
    }

    pub fn binary_len(&self) -> usize {
        self.name
            .split('.')
            .map(|x| x.len() + 1)
            .fold(1, |x, y| x + y)
    }

    pub fn write<T: PacketBuffer>(&self, buffer: &mut T) -> Result<()> {
        buffer.write_qname(&self.name)?;

        let typenum = self.qtype.to_num();
        buffer.write_u16(typenum)?;
        buffer.write_u16(1)?;

        Ok(())
    }

    pub fn read<T: PacketBuffer>(&mut self, buffer: &mut T) -> Result<()> {
        buffer.read_qname(&mut self.name)?;
        self.qtype = QueryType::from_num(buffer.read_u16()?); // qtype
        let _ = buffer.read_u16()?; // class

        Ok(())
    }
}

/// Representation of a complete DNS packet
///
/// This is the work horse of the relay. A DNS packet can be read and written
/// in a single operation, and is used both by the network facing components
/// and by the answer translator.
#[derive(Clone, Debug, Default)]
pub struct DnsPacket {
    pub header: DnsHeader,
    pub questions: Vec<DnsQuestion>,
    pub answers: Vec<DnsRecord>,
    pub authorities: Vec<DnsRecord>,
    pub resources: Vec<DnsRecord>,
}

impl DnsPacket {
    pub fn new() -> DnsPacket {
        DnsPacket {
            header: DnsHeader::new(),
            questions: Vec::new(),
            answers: Vec::new(),
            authorities: Vec::new(),
            resources: Vec::new(),
        }
    }

    pub fn from_buffer<T: PacketBuffer>(buffer: &mut T) -> Result<DnsPacket> {
        let mut result = DnsPacket::new();
        result.header.read(buffer)?;

        for _ in 0..result.header.questions {
            let mut question = DnsQuestion::new("".to_string(), QueryType::Unknown(0));
            question.read(buffer)?;
            result.questions.push(question);
        }

        for _ in 0..result.header.answers {
            let rec = DnsRecord::read(buffer)?;
            result.answers.push(rec);
        }
        for _ in 0..result.header.authoritative_entries {
            let rec = DnsRecord::read(buffer)?;
            result.authorities.push(rec);
        }
        for _ in 0..result.header.resource_entries {
            let rec = DnsRecord::read(buffer)?;
            result.resources.push(rec);
        }

        Ok(result)
    }

    pub fn write<T: PacketBuffer>(&mut self, buffer: &mut T, max_size: usize) -> Result<()> {
        let mut test_buffer = VectorPacketBuffer::new();

        // The counts are recomputed below; a packet parsed off the wire
        // arrives with them already set.
        self.header.questions = self.questions.len() as u16;
        self.header.answers = 0;
        self.header.authoritative_entries = 0;
        self.header.resource_entries = 0;

        let mut size = self.header.binary_len();
        for question in &self.questions {
            size += question.binary_len();
            question.write(&mut test_buffer)?;
        }

        let mut record_count = self.answers.len() + self.authorities.len() + self.resources.len();

        for (i, rec) in self
            .answers
            .iter()
            .chain(self.authorities.iter())
            .chain(self.resources.iter())
            .enumerate()
        {
            size += rec.write(&mut test_buffer)?;
            if size > max_size {
                record_count = i;
                self.header.truncated_message = true;
                break;
            } else if i < self.answers.len() {
                self.header.answers += 1;
            } else if i < self.answers.len() + self.authorities.len() {
                self.header.authoritative_entries += 1;
            } else {
                self.header.resource_entries += 1;
            }
        }

        self.header.write(buffer)?;

        for question in &self.questions {
            question.write(buffer)?;
        }

        for rec in self
            .answers
            .iter()
            .chain(self.authorities.iter())
            .chain(self.resources.iter())
            .take(record_count)
        {
            rec.write(buffer)?;
        }

        Ok(())
    }
}
