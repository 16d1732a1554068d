//! Process-wide cache of which wire dialect each serving endpoint speaks.
//!
//! An endpoint is probed at most once per process lifetime: the first
//! recorded format for an endpoint name sticks until restart. There is no
//! TTL and no invalidation; an endpoint that changes dialect after being
//! probed will keep getting the stale format (known staleness property).

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use tracing::info;
use unistream::EndpointFormat;

#[derive(Debug, Default)]
pub struct FormatResolver {
    cache: Mutex<HashMap<String, EndpointFormat>>,
}

impl FormatResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cached(&self, endpoint_name: &str) -> Option<EndpointFormat> {
        self.cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(endpoint_name)
            .copied()
    }

    /// Record the probed format for an endpoint. First write wins: two
    /// concurrent first-time probes may both call this, and the later one
    /// is ignored so the cached value never flips.
    pub fn record(&self, endpoint_name: &str, format: EndpointFormat) {
        let mut cache = self.cache.lock().unwrap_or_else(PoisonError::into_inner);
        if cache.contains_key(endpoint_name) {
            return;
        }
        cache.insert(endpoint_name.to_string(), format);
        info!(endpoint = %endpoint_name, format = %format, "cached endpoint format");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unseen_endpoint_has_no_format() {
        let resolver = FormatResolver::new();
        assert_eq!(resolver.cached("fresh"), None);
    }

    #[test]
    fn recorded_format_is_returned() {
        let resolver = FormatResolver::new();
        resolver.record("ep", EndpointFormat::ChatCompletion);
        assert_eq!(resolver.cached("ep"), Some(EndpointFormat::ChatCompletion));
    }

    #[test]
    fn first_write_wins() {
        let resolver = FormatResolver::new();
        resolver.record("ep", EndpointFormat::Agent);
        resolver.record("ep", EndpointFormat::ChatCompletion);
        assert_eq!(resolver.cached("ep"), Some(EndpointFormat::Agent));
    }

    #[test]
    fn endpoints_are_independent() {
        let resolver = FormatResolver::new();
        resolver.record("a", EndpointFormat::Agent);
        resolver.record("b", EndpointFormat::ChatCompletion);
        assert_eq!(resolver.cached("a"), Some(EndpointFormat::Agent));
        assert_eq!(resolver.cached("b"), Some(EndpointFormat::ChatCompletion));
    }
}
