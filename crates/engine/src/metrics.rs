//! Prometheus metrics for the ingestion pipeline: a flat struct of named
//! collectors built once at startup and registered with the shared
//! registry, then cloned into whichever task needs to record against it.

use prometheus::{HistogramVec, IntCounterVec, IntGauge, Opts, Registry};

#[derive(Debug, Clone)]
pub struct EngineMetrics {
    pub events_ingested_total: IntCounterVec,
    pub events_dropped_total: IntCounterVec,
    pub flushes_total: IntCounterVec,
    pub flush_duration_seconds: HistogramVec,
    pub alerts_emitted_total: IntCounterVec,
    pub anomaly_inferences_total: IntCounterVec,
    pub subscriber_count: IntGauge,
}

impl EngineMetrics {
    pub fn new(namespace: &str) -> Result<Self, prometheus::Error> {
        let events_ingested_total = IntCounterVec::new(
            Opts::new(
                format!("{}_events_ingested_total", namespace),
                "Total number of bus messages successfully normalized and buffered",
            ),
            &["topic"],
        )?;

        let events_dropped_total = IntCounterVec::new(
            Opts::new(
                format!("{}_events_dropped_total", namespace),
                "Total number of bus messages dropped before buffering",
            ),
            &["reason"],
        )?;

        let flushes_total = IntCounterVec::new(
            Opts::new(
                format!("{}_flushes_total", namespace),
                "Total number of batch flushes, by trigger and outcome",
            ),
            &["trigger", "outcome"],
        )?;

        let flush_duration_seconds = HistogramVec::new(
            prometheus::HistogramOpts::new(
                format!("{}_flush_duration_seconds", namespace),
                "Time spent persisting and analyzing one flushed batch",
            )
            .buckets(vec![0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]),
            &["outcome"],
        )?;

        let alerts_emitted_total = IntCounterVec::new(
            Opts::new(
                format!("{}_alerts_emitted_total", namespace),
                "Total number of security alerts emitted by severity",
            ),
            &["severity"],
        )?;

        let anomaly_inferences_total = IntCounterVec::new(
            Opts::new(
                format!("{}_anomaly_inferences_total", namespace),
                "Total number of anomaly scorer invocations by outcome",
            ),
            &["outcome"],
        )?;

        let subscriber_count = IntGauge::new(
            format!("{}_subscriber_count", namespace),
            "Current number of live alert-stream subscribers across all tenants",
        )?;

        Ok(Self {
            events_ingested_total,
            events_dropped_total,
            flushes_total,
            flush_duration_seconds,
            alerts_emitted_total,
            anomaly_inferences_total,
            subscriber_count,
        })
    }

    pub fn register_all(&self, registry: &Registry) -> Result<(), prometheus::Error> {
        registry.register(Box::new(self.events_ingested_total.clone()))?;
        registry.register(Box::new(self.events_dropped_total.clone()))?;
        registry.register(Box::new(self.flushes_total.clone()))?;
        registry.register(Box::new(self.flush_duration_seconds.clone()))?;
        registry.register(Box::new(self.alerts_emitted_total.clone()))?;
        registry.register(Box::new(self.anomaly_inferences_total.clone()))?;
        registry.register(Box::new(self.subscriber_count.clone()))?;
        Ok(())
    }
}
