//! Prometheus registry and the transition counter exposed at `/metrics`.
use prometheus::{Encoder, IntCounterVec, Opts, Registry, TextEncoder};

pub struct Metrics {
    registry: Registry,
    transitions: IntCounterVec,
}

impl Metrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();
        let transitions = IntCounterVec::new(
            Opts::new(
                "rollgate_change_request_transitions_total",
                "Committed change request transitions",
            ),
            &["action"],
        )?;
        registry.register(Box::new(transitions.clone()))?;
        Ok(Self {
            registry,
            transitions,
        })
    }

    /// Count one committed transition (`created`, `reviewed`, `applied`, `cancelled`).
    pub fn record(&self, action: &str) {
        self.transitions.with_label_values(&[action]).inc();
    }

    pub fn count(&self, action: &str) -> u64 {
        self.transitions.with_label_values(&[action]).get()
    }

    pub fn encode(&self) -> Result<String, prometheus::Error> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder.encode(&self.registry.gather(), &mut buffer)?;
        Ok(String::from_utf8_lossy(&buffer).to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transition_counter() {
        let metrics = Metrics::new().unwrap();
        metrics.record("applied");
        metrics.record("applied");
        assert_eq!(metrics.count("applied"), 2);

        let text = metrics.encode().unwrap();
        assert!(text.contains(r#"rollgate_change_request_transitions_total{action="applied"} 2"#));
    }
}
