//! Endpoint selection over a resolved list.

use std::collections::HashMap;

use parking_lot::Mutex;

use crate::governance::discovery::Endpoint;
use crate::status::{Result, Status};

pub trait LoadBalancer: Send + Sync {
    fn pick(&self, service: &str, endpoints: &[Endpoint]) -> Result<Endpoint>;
}

/// Round-robin with a persistent per-service cursor.
#[derive(Debug, Default)]
pub struct RoundRobinLoadBalancer {
    cursors: Mutex<HashMap<String, usize>>,
}

impl RoundRobinLoadBalancer {
    pub fn new() -> Self {
        Self::default()
    }
}

impl LoadBalancer for RoundRobinLoadBalancer {
    fn pick(&self, service: &str, endpoints: &[Endpoint]) -> Result<Endpoint> {
        if endpoints.is_empty() {
            return Err(Status::unavailable("no endpoints"));
        }

        let mut cursors = self.cursors.lock();
        let cursor = cursors.entry(service.to_string()).or_insert(0);
        let idx = *cursor % endpoints.len();
        *cursor = cursor.wrapping_add(1);
        Ok(endpoints[idx].clone())
    }
}
