//
// Copyright 2017-2026 Hans W. Uhlig. All Rights Reserved.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//

//! Host and service name resolution

use async_trait::async_trait;
use std::collections::HashMap;
use std::io;
use std::net::SocketAddr;
use tracing::trace;

/// Well-known service names accepted in place of a numeric port.
const SERVICES: &[(&str, u16)] = &[("telnet", 23), ("http", 80), ("zard", 2048)];

/// Translates a host/service pair into an ordered list of candidate
/// addresses.
#[async_trait]
pub trait Resolver: Send + Sync + 'static {
    async fn resolve(&self, host: &str, service: &str) -> io::Result<Vec<SocketAddr>>;
}

/// Resolve a service name or numeric port to a port number.
pub fn service_port(service: &str) -> io::Result<u16> {
    if let Ok(port) = service.parse::<u16>() {
        return Ok(port);
    }
    SERVICES
        .iter()
        .find(|(name, _)| name.eq_ignore_ascii_case(service))
        .map(|(_, port)| *port)
        .ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("unknown service `{service}`"),
            )
        })
}

/// System resolver backed by [`tokio::net::lookup_host`].
#[derive(Debug, Clone, Copy, Default)]
pub struct DnsResolver;

#[async_trait]
impl Resolver for DnsResolver {
    async fn resolve(&self, host: &str, service: &str) -> io::Result<Vec<SocketAddr>> {
        let port = service_port(service)?;
        let addresses: Vec<SocketAddr> = tokio::net::lookup_host((host, port)).await?.collect();
        trace!(host, service, count = addresses.len(), "Resolved");
        Ok(addresses)
    }
}

/// Resolver answering from a fixed table.
#[derive(Debug, Clone, Default)]
pub struct StaticResolver {
    entries: HashMap<(String, String), Vec<SocketAddr>>,
}

impl StaticResolver {
    /// Create a resolver with no entries.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace the candidates for a host/service pair
    pub fn with_entry(
        mut self,
        host: impl Into<String>,
        service: impl Into<String>,
        addresses: impl IntoIterator<Item = SocketAddr>,
    ) -> Self {
        self.entries
            .insert((host.into(), service.into()), addresses.into_iter().collect());
        self
    }
}

#[async_trait]
impl Resolver for StaticResolver {
    async fn resolve(&self, host: &str, service: &str) -> io::Result<Vec<SocketAddr>> {
        self.entries
            .get(&(host.to_string(), service.to_string()))
            .cloned()
            .ok_or_else(|| {
                io::Error::new(
                    io::ErrorKind::NotFound,
                    format!("no entry for {host}:{service}"),
                )
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_service_port() {
        assert_eq!(service_port("2048").unwrap(), 2048);
        assert_eq!(service_port("telnet").unwrap(), 23);
        assert_eq!(service_port("ZARD").unwrap(), 2048);
        assert_eq!(
            service_port("gopher").unwrap_err().kind(),
            io::ErrorKind::InvalidInput
        );
    }

    #[tokio::test]
    async fn test_dns_resolver_numeric_host() {
        let addresses = DnsResolver.resolve("127.0.0.1", "zard").await.unwrap();
        assert_eq!(addresses, vec!["127.0.0.1:2048".parse().unwrap()]);
    }

    #[tokio::test]
    async fn test_static_resolver() {
        let first: SocketAddr = "127.0.0.1:4000".parse().unwrap();
        let second: SocketAddr = "127.0.0.1:4001".parse().unwrap();
        let resolver = StaticResolver::new().with_entry("lobby", "zard", [first, second]);

        assert_eq!(
            resolver.resolve("lobby", "zard").await.unwrap(),
            vec![first, second]
        );
        assert_eq!(
            resolver.resolve("lobby", "http").await.unwrap_err().kind(),
            io::ErrorKind::NotFound
        );
    }
}
