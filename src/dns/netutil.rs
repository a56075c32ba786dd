//! discovery of the public address of this host
//!
//! When no subnet address is configured, the relay asks an IP echo service
//! which address its traffic appears to come from and asserts that address
//! upstream. The page is free-form text; the first dotted quad wins.

use std::net::Ipv4Addr;

use derive_more::{Display, Error, From};
use regex::Regex;

#[derive(Debug, Display, From, Error)]
pub enum NetutilError {
    Http(reqwest::Error),
    Regex(regex::Error),
    NoAddressFound,
}

type Result<T> = std::result::Result<T, NetutilError>;

/// Echo service consulted when no subnet address is configured
pub const DEFAULT_IP_ECHO_URL: &str = "http://myip.ipip.net";

/// Ask the echo service for the public address of this host
pub fn discover_public_ip(url: &str) -> Result<Ipv4Addr> {
    let body = reqwest::blocking::get(url)?.text()?;

    extract_ipv4(&body)
}

fn extract_ipv4(body: &str) -> Result<Ipv4Addr> {
    let re = Regex::new(r"(?:[0-9]{1,3}\.){3}[0-9]{1,3}")?;

    let found = re
        .find_iter(body)
        .filter_map(|m| m.as_str().parse::<Ipv4Addr>().ok())
        .next();
    found.ok_or(NetutilError::NoAddressFound)
}

#[cfg(test)]
mod tests {

    use super::*;

    #[test]
    fn test_extract_from_echo_page() {
        let body = "IP: 106.120.101.38 from: somewhere\n";
        assert_eq!(
            "106.120.101.38".parse::<Ipv4Addr>().unwrap(),
            extract_ipv4(body).unwrap()
        );
    }

    #[test]
    fn test_first_address_wins() {
        let body = "proxy 10.0.0.1 client 192.0.2.55";
        assert_eq!(
            "10.0.0.1".parse::<Ipv4Addr>().unwrap(),
            extract_ipv4(body).unwrap()
        );
    }

    #[test]
    fn test_no_address_is_an_error() {
        match extract_ipv4("<html>no address here</html>") {
            Err(NetutilError::NoAddressFound) => {}
            _ => panic!("expected NoAddressFound"),
        }
    }
}
