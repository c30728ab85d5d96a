// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: Apache-2.0

//! Test data generators for traffic simulation.

use super::attacks::ClientKind;
use axum::http::{request::Parts, Request};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

/// Generate a pool of IPv4 addresses, one per host.
pub fn generate_ips(count: usize) -> Vec<IpAddr> {
    (0..count)
        .map(|i| {
            // Use 10.x.x.x private range
            let a = ((i >> 16) & 0xFF) as u8;
            let b = ((i >> 8) & 0xFF) as u8;
            let c = (i & 0xFF) as u8;
            IpAddr::V4(Ipv4Addr::new(10, a, b, c))
        })
        .collect()
}

/// Generate addresses that all fall inside 2001:db8:1::/48.
pub fn generate_ipv6_single_network(count: usize) -> Vec<IpAddr> {
    (0..count)
        .map(|i| {
            let subnet = (i >> 8) as u16;
            let host = (i & 0xFF) as u16 + 1;
            IpAddr::V6(Ipv6Addr::new(0x2001, 0xdb8, 1, subnet, 0, 0, 0, host))
        })
        .collect()
}

/// User agents of current browsers.
pub fn browser_user_agents() -> Vec<&'static str> {
    vec![
        "Mozilla/5.0 (X11; Linux x86_64; rv:128.0) Gecko/20100101 Firefox/128.0",
        "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/126.0.0.0 Safari/537.36",
        "Mozilla/5.0 (Macintosh; Intel Mac OS X 14_5) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.5 Safari/605.1.15",
        "Mozilla/5.0 (iPhone; CPU iPhone OS 17_5 like Mac OS X) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.5 Mobile/15E148 Safari/604.1",
    ]
}

/// User agents of HTTP libraries and crawlers.
pub fn bot_user_agents() -> Vec<&'static str> {
    vec![
        "curl/8.0.1",
        "Wget/1.21.4",
        "python-requests/2.31.0",
        "Go-http-client/2.0",
        "Scrapy/2.11.0 (+https://scrapy.org)",
        "okhttp/4.12.0",
        "Mozilla/5.0 (compatible; Googlebot/2.1; +http://www.google.com/bot.html)",
        "Mozilla/5.0 AppleWebKit/537.36 (KHTML, like Gecko; compatible; bingbot/2.0)",
    ]
}

/// Headers a client of `kind` sends; `i` picks among the user agents.
pub fn headers_for(kind: ClientKind, i: usize) -> Vec<(&'static str, &'static str)> {
    match kind {
        ClientKind::Browser => {
            let agents = browser_user_agents();
            vec![
                ("user-agent", agents[i % agents.len()]),
                (
                    "accept",
                    "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8",
                ),
                ("accept-encoding", "gzip, deflate, br"),
                ("accept-language", "en-US,en;q=0.5"),
                ("connection", "keep-alive"),
            ]
        }
        ClientKind::Library => {
            let agents = bot_user_agents();
            vec![
                ("user-agent", agents[i % agents.len()]),
                ("accept", "*/*"),
                ("accept-encoding", "gzip"),
                ("connection", "close"),
            ]
        }
        ClientKind::Bare => Vec::new(),
    }
}

/// Request head for `path` with the given headers.
pub fn request(path: &str, headers: &[(&str, &str)]) -> Parts {
    let mut builder = Request::builder().uri(path);
    for (name, value) in headers {
        builder = builder.header(*name, *value);
    }
    builder
        .body(())
        .expect("generated request is valid")
        .into_parts()
        .0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_ips() {
        let ips = generate_ips(256);
        assert_eq!(ips.len(), 256);
        // All should be unique
        let unique: std::collections::HashSet<_> = ips.iter().collect();
        assert_eq!(unique.len(), 256);
    }

    #[test]
    fn test_ipv6_addresses_share_a_48() {
        let ips = generate_ipv6_single_network(300);
        let unique: std::collections::HashSet<_> = ips.iter().collect();
        assert_eq!(unique.len(), 300);
        for ip in ips {
            let IpAddr::V6(v6) = ip else { panic!("not IPv6") };
            assert_eq!(&v6.segments()[..3], &[0x2001, 0xdb8, 1]);
        }
    }

    #[test]
    fn test_bare_clients_send_nothing() {
        assert!(headers_for(ClientKind::Bare, 0).is_empty());
        assert_eq!(headers_for(ClientKind::Browser, 0).len(), 5);
    }
}
