use std::env;
use std::net::IpAddr;
use std::sync::Arc;

use getopts::Options;

use courier::dns::context::{RelayStrategy, ServerContext};
use courier::dns::doh::{HttpsDnsClient, DEFAULT_DOH_ENDPOINT};
use courier::dns::netutil::{discover_public_ip, DEFAULT_IP_ECHO_URL};
use courier::dns::server::{DnsServer, DnsUdpServer};

fn print_usage(program: &str, opts: Options) {
    let brief = format!("Usage: {} [options]", program);
    print!("{}", opts.usage(&brief));
}

/// Main entry point for the courier DNS relay
fn main() {
    simple_logger::init().expect("Failed to initialize logger");

    let args: Vec<String> = env::args().collect();
    let program = args[0].clone();

    let mut opts = Options::new();
    opts.optflag("h", "help", "print this help menu");
    opts.optopt(
        "u",
        "upstream",
        "Comma separated upstream servers for forwarding",
        "SERVERS",
    );
    opts.optopt("l", "listen", "Listen address for incoming queries", "ADDR");
    opts.optopt(
        "s",
        "subnet",
        "Client subnet address asserted upstream (discovered when unset)",
        "IP",
    );
    opts.optflag(
        "j",
        "https-json",
        "Answer through the JSON DNS-over-HTTPS API instead of forwarding",
    );
    opts.optopt(
        "e",
        "endpoint",
        "Base URL of the JSON resolution API",
        "URL",
    );
    opts.optopt("w", "workers", "Number of request handler threads", "COUNT");

    let opt_matches = match opts.parse(&args[1..]) {
        Ok(m) => m,
        Err(f) => panic!("{}", f.to_string()),
    };

    if opt_matches.opt_present("h") {
        print_usage(&program, opts);
        return;
    }

    let subnet_addr: IpAddr = match opt_matches.opt_str("s") {
        Some(value) => match value.parse() {
            Ok(addr) => addr,
            Err(err) => {
                log::error!("unparseable subnet address {}: {}", value, err);
                return;
            }
        },
        None => match discover_public_ip(DEFAULT_IP_ECHO_URL) {
            Ok(addr) => {
                log::info!("discovered public address: {}", addr);
                IpAddr::V4(addr)
            }
            Err(err) => {
                log::error!("public address discovery failed: {}", err);
                return;
            }
        },
    };

    let strategy = if opt_matches.opt_present("j") {
        let endpoint = opt_matches
            .opt_str("e")
            .unwrap_or_else(|| DEFAULT_DOH_ENDPOINT.to_string());

        match HttpsDnsClient::new(endpoint, subnet_addr.to_string()) {
            Ok(client) => RelayStrategy::HttpsJson {
                client: Arc::new(client),
            },
            Err(err) => {
                log::error!("JSON endpoint warm-up failed: {}", err);
                return;
            }
        }
    } else {
        let upstream = opt_matches
            .opt_str("u")
            .unwrap_or_else(|| "8.8.8.8:53,8.8.4.4:53".to_string());
        let servers: Vec<String> = upstream
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        if servers.is_empty() {
            log::error!("no upstream servers configured");
            return;
        }

        RelayStrategy::Forward { servers }
    };

    let listen_addr = opt_matches
        .opt_str("l")
        .unwrap_or_else(|| "127.0.0.1:5553".to_string());
    let workers = opt_matches
        .opt_str("w")
        .and_then(|value| value.parse().ok())
        .unwrap_or(4);

    let context = Arc::new(ServerContext::new(strategy, listen_addr, subnet_addr));

    log::info!("listening on {}", context.listen_addr);

    let server = DnsUdpServer::new(context, workers);
    if let Err(err) = server.run_server() {
        log::error!("failed to bind UDP listener: {}", err);
        return;
    }

    loop {
        std::thread::park();
    }
}
