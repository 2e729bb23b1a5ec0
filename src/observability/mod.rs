//! Prometheus counters for publish and transaction outcomes.

use prometheus::{Encoder, IntCounterVec, Opts, Registry, TextEncoder};

pub const OUTCOME_SUCCESS: &str = "success";
pub const OUTCOME_FAILURE: &str = "failure";

/// Process metrics, rendered in the Prometheus text format by `/metrics`.
pub struct Metrics {
    registry: Registry,
    publish_total: IntCounterVec,
    transactions_total: IntCounterVec,
}

impl Metrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let publish_total = IntCounterVec::new(
            Opts::new(
                "fraudwatch_publish_total",
                "Records published by the publish_record tool",
            ),
            &["topic", "outcome"],
        )
        .unwrap_or_else(|e| panic!("publish counter options are static: {e}"));

        let transactions_total = IntCounterVec::new(
            Opts::new(
                "fraudwatch_transactions_total",
                "Transactions routed to the agent runtime",
            ),
            &["outcome"],
        )
        .unwrap_or_else(|e| panic!("transaction counter options are static: {e}"));

        for collector in [&publish_total, &transactions_total] {
            if let Err(e) = registry.register(Box::new(collector.clone())) {
                tracing::warn!("Failed to register metric collector: {e}");
            }
        }

        Self {
            registry,
            publish_total,
            transactions_total,
        }
    }

    pub fn record_publish(&self, topic: &str, success: bool) {
        let outcome = if success {
            OUTCOME_SUCCESS
        } else {
            OUTCOME_FAILURE
        };
        self.publish_total
            .with_label_values(&[topic, outcome])
            .inc();
    }

    pub fn publish_count(&self, topic: &str, outcome: &str) -> u64 {
        self.publish_total
            .with_label_values(&[topic, outcome])
            .get()
    }

    pub fn record_transaction(&self, success: bool) {
        let outcome = if success {
            OUTCOME_SUCCESS
        } else {
            OUTCOME_FAILURE
        };
        self.transactions_total.with_label_values(&[outcome]).inc();
    }

    pub fn transaction_count(&self, outcome: &str) -> u64 {
        self.transactions_total.with_label_values(&[outcome]).get()
    }

    /// Encode all collectors in the Prometheus text exposition format.
    pub fn render(&self) -> String {
        let mut buffer = Vec::new();
        if let Err(e) = TextEncoder::new().encode(&self.registry.gather(), &mut buffer) {
            tracing::warn!("Failed to encode metrics: {e}");
            return String::new();
        }
        String::from_utf8(buffer).unwrap_or_default()
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}
