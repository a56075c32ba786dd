//! DNS-over-HTTPS JSON API client
//!
//! Speaks the JSON resolution API (application/dns-json): a GET request with
//! `name`, `type` and `edns_client_subnet` parameters, answered with a JSON
//! document carrying the response code, the header flags and the four record
//! sections. The JSON answer is translated back into a wire packet by the
//! `translate` module.

use std::time::Duration;

use derive_more::{Display, Error, From};
use serde::{Deserialize, Serialize};

use crate::dns::protocol::QueryType;

/// Base URL of the default JSON resolution endpoint
pub const DEFAULT_DOH_ENDPOINT: &str = "https://dns.google.com/resolve";

/// Well-known name queried once at construction to fail fast on an
/// unreachable endpoint
const WARMUP_NAME: &str = "www.google.com";

#[derive(Debug, Display, From, Error)]
pub enum DohError {
    Http(reqwest::Error),
    Json(serde_json::Error),
}

type Result<T> = std::result::Result<T, DohError>;

/// DNS JSON answer format
///
/// Every field is optional on the wire; absent fields decode to their
/// defaults, mirroring how the API omits empty sections.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct DnsJson {
    /// Status (standard DNS response code)
    #[serde(rename = "Status", default)]
    pub status: u16,
    /// Truncated flag
    #[serde(rename = "TC", default)]
    pub tc: bool,
    /// Recursion Desired flag
    #[serde(rename = "RD", default)]
    pub rd: bool,
    /// Recursion Available flag
    #[serde(rename = "RA", default)]
    pub ra: bool,
    /// Authenticated Data flag
    #[serde(rename = "AD", default)]
    pub ad: bool,
    /// Checking Disabled flag
    #[serde(rename = "CD", default)]
    pub cd: bool,
    /// Question section
    #[serde(rename = "Question", default)]
    pub question: Vec<DnsJsonQuestion>,
    /// Answer section
    #[serde(rename = "Answer", default)]
    pub answer: Vec<DnsJsonRecord>,
    /// Authority section
    #[serde(rename = "Authority", default)]
    pub authority: Vec<DnsJsonRecord>,
    /// Additional section
    #[serde(rename = "Additional", default)]
    pub additional: Vec<DnsJsonRecord>,
    /// Subnet the answer was tailored for
    #[serde(rename = "edns_client_subnet", default)]
    pub edns_client_subnet: String,
    /// Diagnostic comment
    #[serde(rename = "Comment", default)]
    pub comment: String,
}

/// DNS JSON Question format
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct DnsJsonQuestion {
    /// Domain name
    #[serde(default)]
    pub name: String,
    /// Query type
    #[serde(rename = "type", default)]
    pub qtype: u16,
}

/// DNS JSON Record format
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct DnsJsonRecord {
    /// Domain name
    #[serde(default)]
    pub name: String,
    /// Record type
    #[serde(rename = "type", default)]
    pub rtype: u16,
    /// Time to live
    #[serde(rename = "TTL", default)]
    pub ttl: u32,
    /// Record data in presentation format, space delimited per type
    #[serde(default)]
    pub data: String,
}

/// Client for the JSON resolution API
pub struct HttpsDnsClient {
    base_url: String,
    client: reqwest::blocking::Client,
    subnet: String,
}

impl HttpsDnsClient {
    /// Build a client and verify the endpoint with a warm-up query
    ///
    /// An unreachable endpoint surfaces here rather than on the first
    /// relayed query; callers treat the failure as fatal at startup.
    pub fn new(base_url: String, subnet: String) -> Result<HttpsDnsClient> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(5))
            .build()?;

        let handler = HttpsDnsClient {
            base_url,
            client,
            subnet,
        };

        let warmup = handler.query(QueryType::A, WARMUP_NAME)?;
        for answer in &warmup.answer {
            log::info!("warm-up result: {}", answer.data);
        }

        Ok(handler)
    }

    /// Query the API for `name` with record type `qtype`
    pub fn query(&self, qtype: QueryType, name: &str) -> Result<DnsJson> {
        let qtype_num = qtype.to_num().to_string();
        let response = self
            .client
            .get(&self.base_url)
            .query(&[
                ("name", name),
                ("type", qtype_num.as_str()),
                ("edns_client_subnet", self.subnet.as_str()),
            ])
            .send()?;

        let body = response.text()?;
        let json = serde_json::from_str(&body)?;

        Ok(json)
    }
}

#[cfg(test)]
mod tests {

    use super::*;

    #[test]
    fn test_decode_answer() {
        let body = r#"{
            "Status": 0,
            "TC": false,
            "RD": true,
            "RA": true,
            "AD": false,
            "CD": false,
            "Question": [{"name": "example.com.", "type": 1}],
            "Answer": [
                {"name": "example.com.", "type": 1, "TTL": 300, "data": "93.184.216.34"}
            ],
            "edns_client_subnet": "93.184.216.0/24"
        }"#;

        let json: DnsJson = serde_json::from_str(body).unwrap();
        assert_eq!(0, json.status);
        assert!(json.rd);
        assert!(json.ra);
        assert_eq!(1, json.question.len());
        assert_eq!(1, json.answer.len());
        assert_eq!("93.184.216.34", json.answer[0].data);
        assert_eq!(300, json.answer[0].ttl);
        assert!(json.authority.is_empty());
        assert!(json.additional.is_empty());
    }

    #[test]
    fn test_decode_nxdomain_answer() {
        // sections the API omits decode to their defaults
        let body = r#"{
            "Status": 3,
            "RD": true,
            "RA": true,
            "Question": [{"name": "nonexistent.example.", "type": 28}],
            "Authority": [
                {"name": "example.", "type": 6, "TTL": 1800,
                 "data": "ns.example. mbox.example. 2024010101 7200 3600 1209600 3600"}
            ],
            "Comment": "Response from 2001:db8::1."
        }"#;

        let json: DnsJson = serde_json::from_str(body).unwrap();
        assert_eq!(3, json.status);
        assert!(!json.tc);
        assert!(json.answer.is_empty());
        assert_eq!(1, json.authority.len());
        assert_eq!(6, json.authority[0].rtype);
    }

    #[test]
    fn test_decode_rejects_malformed_body() {
        assert!(serde_json::from_str::<DnsJson>("<html>not json</html>").is_err());
    }
}
