//! Service discovery.

use std::collections::HashMap;

use crate::status::{Result, Status};

/// A resolvable backend address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
}

impl Endpoint {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

/// Maps a service name to its current endpoints.
pub trait ServiceDiscovery: Send + Sync {
    fn resolve(&self, service: &str) -> Result<Vec<Endpoint>>;
}

/// In-process registry, useful for tests and single-process demos.
/// Mutation takes `&mut self`; synchronize externally relative to lookups.
#[derive(Debug, Default)]
pub struct InMemoryServiceDiscovery {
    table: HashMap<String, Vec<Endpoint>>,
}

impl InMemoryServiceDiscovery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, service: impl Into<String>, endpoints: Vec<Endpoint>) {
        self.table.insert(service.into(), endpoints);
    }
}

impl ServiceDiscovery for InMemoryServiceDiscovery {
    fn resolve(&self, service: &str) -> Result<Vec<Endpoint>> {
        self.table
            .get(service)
            .cloned()
            .ok_or_else(|| Status::not_found("service not found"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::status::StatusKind;

    #[test]
    fn resolves_registered_service() {
        let mut discovery = InMemoryServiceDiscovery::new();
        discovery.set(
            "kv",
            vec![Endpoint::new("10.0.0.1", 8087), Endpoint::new("10.0.0.2", 8087)],
        );

        let endpoints = discovery.resolve("kv").unwrap();
        assert_eq!(endpoints.len(), 2);
        assert_eq!(endpoints[0], Endpoint::new("10.0.0.1", 8087));
    }

    #[test]
    fn unknown_service_is_not_found() {
        let discovery = InMemoryServiceDiscovery::new();
        let err = discovery.resolve("nope").unwrap_err();
        assert_eq!(err.kind(), StatusKind::NotFound);
    }
}
