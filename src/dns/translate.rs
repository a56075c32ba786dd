//! translation of JSON answers into wire format packets
//!
//! The JSON API represents record bodies as presentation-format text whose
//! grammar depends on the record type. Each record is translated on its own:
//! a record that doesn't follow its type's grammar is dropped from the
//! response without affecting the records around it. The response header is
//! derived from the JSON status and flags plus the transaction id of the
//! query being answered.

use crate::dns::doh::{DnsJson, DnsJsonRecord};
use crate::dns::protocol::{
    decode_base32hex, DnsPacket, DnsQuestion, DnsRecord, QueryType, ResultCode, TransientTtl,
};

/// Build the response packet for `query` out of a JSON answer
pub fn translate_answer(json: &DnsJson, query: &DnsPacket) -> DnsPacket {
    let mut packet = DnsPacket::new();

    packet.header.id = query.header.id;
    packet.header.response = json.status == 0;
    packet.header.opcode = 0;
    packet.header.authoritative_answer = false;
    packet.header.truncated_message = json.tc;
    packet.header.recursion_desired = json.rd;
    packet.header.recursion_available = json.ra;
    packet.header.authed_data = json.ad;
    packet.header.checking_disabled = json.cd;
    packet.header.rescode = ResultCode::from_num(json.status as u8);

    for question in &json.question {
        packet.questions.push(DnsQuestion::new(
            question.name.clone(),
            QueryType::from_num(question.qtype),
        ));
    }

    translate_records(&json.answer, &mut packet.answers);
    translate_records(&json.authority, &mut packet.authorities);
    translate_records(&json.additional, &mut packet.resources);

    packet
}

fn translate_records(records: &[DnsJsonRecord], out: &mut Vec<DnsRecord>) {
    for record in records {
        if let Some(rec) = translate_record(record) {
            out.push(rec);
        }
    }
}

fn parse_u32(s: &str) -> Option<u32> {
    s.parse().ok()
}

fn parse_u16(s: &str) -> Option<u16> {
    parse_u32(s).map(|n| n as u16)
}

fn parse_u8(s: &str) -> Option<u8> {
    parse_u32(s).map(|n| n as u8)
}

/// An empty salt is presented as "-"
fn parse_salt(s: &str) -> Option<String> {
    let salt = if s == "-" { "" } else { s };
    hex::decode(salt).ok()?;

    Some(salt.to_string())
}

fn parse_type_names(names: &[&str]) -> Option<Vec<QueryType>> {
    names.iter().map(|name| QueryType::from_name(name)).collect()
}

/// Translate a single JSON record into a typed record
///
/// Returns `None` for records that should be dropped: unrecognized types,
/// too few fields for the type's grammar, numeric or digest fields that
/// don't parse, and type names that don't resolve.
pub fn translate_record(jr: &DnsJsonRecord) -> Option<DnsRecord> {
    let domain = jr.name.clone();
    let ttl = TransientTtl(jr.ttl);
    let fields: Vec<&str> = jr.data.split(' ').collect();

    let record = match QueryType::from_num(jr.rtype) {
        QueryType::A => DnsRecord::A {
            domain,
            addr: jr.data.parse().ok()?,
            ttl,
        },
        QueryType::Aaaa => DnsRecord::Aaaa {
            domain,
            addr: jr.data.parse().ok()?,
            ttl,
        },
        QueryType::Ns => DnsRecord::Ns {
            domain,
            host: jr.data.clone(),
            ttl,
        },
        QueryType::Md => DnsRecord::Md {
            domain,
            host: jr.data.clone(),
            ttl,
        },
        QueryType::Mf => DnsRecord::Mf {
            domain,
            host: jr.data.clone(),
            ttl,
        },
        QueryType::Cname => DnsRecord::Cname {
            domain,
            host: jr.data.clone(),
            ttl,
        },
        QueryType::Mb => DnsRecord::Mb {
            domain,
            host: jr.data.clone(),
            ttl,
        },
        QueryType::Mg => DnsRecord::Mg {
            domain,
            host: jr.data.clone(),
            ttl,
        },
        QueryType::Mr => DnsRecord::Mr {
            domain,
            host: jr.data.clone(),
            ttl,
        },
        QueryType::Ptr => DnsRecord::Ptr {
            domain,
            host: jr.data.clone(),
            ttl,
        },
        QueryType::Soa => {
            if fields.len() < 7 {
                return None;
            }
            DnsRecord::Soa {
                domain,
                m_name: fields[0].to_string(),
                r_name: fields[1].to_string(),
                serial: parse_u32(fields[2])?,
                refresh: parse_u32(fields[3])?,
                retry: parse_u32(fields[4])?,
                expire: parse_u32(fields[5])?,
                minimum: parse_u32(fields[6])?,
                ttl,
            }
        }
        QueryType::Null => DnsRecord::Null { domain, ttl },
        QueryType::Hinfo => DnsRecord::Hinfo { domain, ttl },
        QueryType::Minfo => DnsRecord::Minfo { domain, ttl },
        QueryType::Mx => {
            if fields.len() < 2 {
                return None;
            }
            DnsRecord::Mx {
                domain,
                priority: parse_u16(fields[0])?,
                host: fields[1].to_string(),
                ttl,
            }
        }
        QueryType::Txt => DnsRecord::Txt {
            domain,
            strings: fields.iter().map(|s| s.to_string()).collect(),
            ttl,
        },
        QueryType::Spf => DnsRecord::Spf {
            domain,
            strings: fields.iter().map(|s| s.to_string()).collect(),
            ttl,
        },
        QueryType::Rp => {
            if fields.len() < 2 {
                return None;
            }
            DnsRecord::Rp {
                domain,
                mbox: fields[0].to_string(),
                txt: fields[1].to_string(),
                ttl,
            }
        }
        QueryType::Srv => {
            if fields.len() < 4 {
                return None;
            }
            DnsRecord::Srv {
                domain,
                priority: parse_u16(fields[0])?,
                weight: parse_u16(fields[1])?,
                port: parse_u16(fields[2])?,
                host: fields[3].to_string(),
                ttl,
            }
        }
        QueryType::Ds => {
            if fields.len() < 4 {
                return None;
            }
            hex::decode(fields[3]).ok()?;
            DnsRecord::Ds {
                domain,
                key_tag: parse_u16(fields[0])?,
                algorithm: parse_u8(fields[1])?,
                digest_type: parse_u8(fields[2])?,
                digest: fields[3].to_string(),
                ttl,
            }
        }
        QueryType::Sshfp => {
            if fields.len() < 3 {
                return None;
            }
            hex::decode(fields[2]).ok()?;
            DnsRecord::Sshfp {
                domain,
                algorithm: parse_u8(fields[0])?,
                fp_type: parse_u8(fields[1])?,
                fingerprint: fields[2].to_string(),
                ttl,
            }
        }
        QueryType::Rrsig => {
            if fields.len() < 9 {
                return None;
            }
            base64::decode(fields[8]).ok()?;
            DnsRecord::Rrsig {
                domain,
                type_covered: QueryType::from_name(fields[0])?,
                algorithm: parse_u8(fields[1])?,
                labels: parse_u8(fields[2])?,
                orig_ttl: parse_u32(fields[3])?,
                expiration: parse_u32(fields[4])?,
                inception: parse_u32(fields[5])?,
                key_tag: parse_u16(fields[6])?,
                signer_name: fields[7].to_string(),
                signature: fields[8].to_string(),
                ttl,
            }
        }
        QueryType::Nsec => DnsRecord::Nsec {
            domain,
            next_domain: fields[0].to_string(),
            type_bitmap: parse_type_names(&fields[1..])?,
            ttl,
        },
        QueryType::Dnskey => {
            if fields.len() < 4 {
                return None;
            }
            base64::decode(fields[3]).ok()?;
            DnsRecord::Dnskey {
                domain,
                flags: parse_u16(fields[0])?,
                protocol: parse_u8(fields[1])?,
                algorithm: parse_u8(fields[2])?,
                public_key: fields[3].to_string(),
                ttl,
            }
        }
        QueryType::Nsec3 => {
            if fields.len() < 7 {
                return None;
            }
            // salt and hash lengths are carried in the presentation format
            // but recomputed from the decoded bodies on write
            parse_u8(fields[3])?;
            parse_u8(fields[5])?;
            decode_base32hex(fields[6])?;
            DnsRecord::Nsec3 {
                domain,
                hash_alg: parse_u8(fields[0])?,
                flags: parse_u8(fields[1])?,
                iterations: parse_u16(fields[2])?,
                salt: parse_salt(fields[4])?,
                next_domain: fields[6].to_string(),
                type_bitmap: parse_type_names(&fields[7..])?,
                ttl,
            }
        }
        QueryType::Nsec3param => {
            if fields.len() < 5 {
                return None;
            }
            parse_u8(fields[3])?;
            DnsRecord::Nsec3param {
                domain,
                hash_alg: parse_u8(fields[0])?,
                flags: parse_u8(fields[1])?,
                iterations: parse_u16(fields[2])?,
                salt: parse_salt(fields[4])?,
                ttl,
            }
        }
        QueryType::Opt | QueryType::Unknown(_) => return None,
    };

    Some(record)
}

#[cfg(test)]
mod tests {

    use super::*;
    use crate::dns::buffer::{PacketBuffer, VectorPacketBuffer};

    fn json_record(rtype: u16, data: &str) -> DnsJsonRecord {
        DnsJsonRecord {
            name: "example.com.".to_string(),
            rtype,
            ttl: 300,
            data: data.to_string(),
        }
    }

    fn build_query(id: u16) -> DnsPacket {
        let mut query = DnsPacket::new();
        query.header.id = id;
        query.header.recursion_desired = true;
        query
            .questions
            .push(DnsQuestion::new("example.com".to_string(), QueryType::A));
        query
    }

    #[test]
    fn test_translate_a_record() {
        let rec = translate_record(&json_record(1, "93.184.216.34")).unwrap();

        match rec {
            DnsRecord::A { ref addr, .. } => {
                assert_eq!("93.184.216.34".parse::<std::net::Ipv4Addr>().unwrap(), *addr);
            }
            _ => panic!(),
        }
        assert_eq!(300, rec.get_ttl());
    }

    #[test]
    fn test_translate_txt_record() {
        let rec = translate_record(&json_record(16, "hello world")).unwrap();

        match rec {
            DnsRecord::Txt { ref strings, .. } => {
                assert_eq!(vec!["hello".to_string(), "world".to_string()], *strings);
            }
            _ => panic!(),
        }
    }

    #[test]
    fn test_short_soa_is_discarded_rest_translated() {
        let mut json = DnsJson::default();
        json.answer.push(json_record(6, "ns.example.com. mbox.example.com. 1 2"));
        json.answer.push(json_record(1, "1.2.3.4"));

        let response = translate_answer(&json, &build_query(7));

        assert_eq!(1, response.answers.len());
        assert_eq!(QueryType::A, response.answers[0].get_querytype());
    }

    #[test]
    fn test_soa_translates_all_fields() {
        let rec = translate_record(&json_record(
            6,
            "ns.example.com. mbox.example.com. 2024010101 7200 3600 1209600 3600",
        ))
        .unwrap();

        match rec {
            DnsRecord::Soa {
                serial,
                refresh,
                retry,
                expire,
                minimum,
                ..
            } => {
                assert_eq!(2024010101, serial);
                assert_eq!(7200, refresh);
                assert_eq!(3600, retry);
                assert_eq!(1209600, expire);
                assert_eq!(3600, minimum);
            }
            _ => panic!(),
        }
    }

    #[test]
    fn test_rrsig_with_unknown_type_name_is_discarded() {
        let rec = translate_record(&json_record(
            46,
            "BOGUS 8 2 300 20260101000000 20251201000000 12345 example.com. dGVzdA==",
        ));
        assert!(rec.is_none());
    }

    #[test]
    fn test_rrsig_translates() {
        let rec = translate_record(&json_record(
            46,
            "A 8 2 300 1767225600 1764633600 12345 example.com. dGVzdA==",
        ))
        .unwrap();

        match rec {
            DnsRecord::Rrsig {
                type_covered,
                algorithm,
                key_tag,
                ref signer_name,
                ..
            } => {
                assert_eq!(QueryType::A, type_covered);
                assert_eq!(8, algorithm);
                assert_eq!(12345, key_tag);
                assert_eq!("example.com.", signer_name);
            }
            _ => panic!(),
        }
    }

    #[test]
    fn test_nonnumeric_field_is_discarded() {
        // the preference isn't a number; the record is dropped, not fatal
        assert!(translate_record(&json_record(15, "high mail.example.com.")).is_none());
        assert!(translate_record(&json_record(15, "10 mail.example.com.")).is_some());
    }

    #[test]
    fn test_unknown_type_is_discarded() {
        assert!(translate_record(&json_record(64000, "whatever")).is_none());
    }

    #[test]
    fn test_nsec_bitmap() {
        let rec = translate_record(&json_record(47, "next.example.com. A MX RRSIG NSEC")).unwrap();

        match rec {
            DnsRecord::Nsec {
                ref next_domain,
                ref type_bitmap,
                ..
            } => {
                assert_eq!("next.example.com.", next_domain);
                assert_eq!(
                    vec![QueryType::A, QueryType::Mx, QueryType::Rrsig, QueryType::Nsec],
                    *type_bitmap
                );
            }
            _ => panic!(),
        }
    }

    #[test]
    fn test_nsec_with_unknown_type_name_is_discarded() {
        assert!(translate_record(&json_record(47, "next.example.com. A BOGUS")).is_none());
    }

    #[test]
    fn test_status_maps_to_rescode_and_response_flag() {
        let mut json = DnsJson::default();
        json.status = 3;
        json.rd = true;
        json.ra = true;

        let response = translate_answer(&json, &build_query(42));
        assert_eq!(42, response.header.id);
        assert_eq!(ResultCode::NXDOMAIN, response.header.rescode);
        assert!(!response.header.response);
        assert!(response.header.recursion_desired);
        assert!(response.header.recursion_available);

        json.status = 0;
        let response = translate_answer(&json, &build_query(42));
        assert_eq!(ResultCode::NOERROR, response.header.rescode);
        assert!(response.header.response);
    }

    #[test]
    fn test_flags_copied_one_to_one() {
        let mut json = DnsJson::default();
        json.tc = true;
        json.ad = true;
        json.cd = true;

        let response = translate_answer(&json, &build_query(1));
        assert!(response.header.truncated_message);
        assert!(response.header.authed_data);
        assert!(response.header.checking_disabled);
        assert!(!response.header.recursion_desired);
    }

    #[test]
    fn test_question_echo_uses_json_names() {
        let mut json = DnsJson::default();
        json.question.push(crate::dns::doh::DnsJsonQuestion {
            name: "example.com.".to_string(),
            qtype: 28,
        });

        let response = translate_answer(&json, &build_query(5));
        assert_eq!(1, response.questions.len());
        assert_eq!("example.com.", response.questions[0].name);
        assert_eq!(QueryType::Aaaa, response.questions[0].qtype);
    }

    #[test]
    fn test_answer_roundtrip_preserves_records() {
        let mut json = DnsJson::default();
        json.question.push(crate::dns::doh::DnsJsonQuestion {
            name: "example.com".to_string(),
            qtype: 1,
        });
        json.answer.push(DnsJsonRecord {
            name: "example.com".to_string(),
            rtype: 1,
            ttl: 60,
            data: "93.184.216.34".to_string(),
        });
        json.answer.push(DnsJsonRecord {
            name: "www.example.com".to_string(),
            rtype: 5,
            ttl: 120,
            data: "example.com".to_string(),
        });
        json.answer.push(DnsJsonRecord {
            name: "example.com".to_string(),
            rtype: 15,
            ttl: 180,
            data: "10 mail.example.com".to_string(),
        });

        let mut response = translate_answer(&json, &build_query(9));
        assert_eq!(3, response.answers.len());

        // through the wire and back
        let mut buffer = VectorPacketBuffer::new();
        response.write(&mut buffer, 0xFFFF).unwrap();
        buffer.seek(0).unwrap();
        let parsed = DnsPacket::from_buffer(&mut buffer).unwrap();

        assert_eq!(3, parsed.answers.len());

        assert_eq!(QueryType::A, parsed.answers[0].get_querytype());
        assert_eq!(Some("example.com".to_string()), parsed.answers[0].get_domain());
        assert_eq!(60, parsed.answers[0].get_ttl());

        assert_eq!(QueryType::Cname, parsed.answers[1].get_querytype());
        assert_eq!(
            Some("www.example.com".to_string()),
            parsed.answers[1].get_domain()
        );
        assert_eq!(120, parsed.answers[1].get_ttl());

        assert_eq!(QueryType::Mx, parsed.answers[2].get_querytype());
        assert_eq!(Some("example.com".to_string()), parsed.answers[2].get_domain());
        assert_eq!(180, parsed.answers[2].get_ttl());
    }

    #[test]
    fn test_ds_with_bad_digest_is_discarded() {
        assert!(translate_record(&json_record(43, "12345 8 2 nothex!")).is_none());
        assert!(translate_record(&json_record(43, "12345 8 2 49fd46e6c4b45c55d4ac")).is_some());
    }

    #[test]
    fn test_srv_translates() {
        let rec = translate_record(&json_record(33, "10 60 5060 sip.example.com.")).unwrap();

        match rec {
            DnsRecord::Srv {
                priority,
                weight,
                port,
                ref host,
                ..
            } => {
                assert_eq!(10, priority);
                assert_eq!(60, weight);
                assert_eq!(5060, port);
                assert_eq!("sip.example.com.", host);
            }
            _ => panic!(),
        }
    }

    #[test]
    fn test_nsec3param_salt_handling() {
        let rec = translate_record(&json_record(51, "1 0 10 8 aabbccdd")).unwrap();
        match rec {
            DnsRecord::Nsec3param { ref salt, .. } => assert_eq!("aabbccdd", salt),
            _ => panic!(),
        }

        // "-" presents an empty salt
        let rec = translate_record(&json_record(51, "1 0 10 0 -")).unwrap();
        match rec {
            DnsRecord::Nsec3param { ref salt, .. } => assert_eq!("", salt),
            _ => panic!(),
        }
    }
}
