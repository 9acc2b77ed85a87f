//! The streaming telemetry pipeline: normalize bus payloads, buffer and
//! flush them in batches, run the multi-layer violation detector over
//! each tenant's slice, and fan alerts out to live subscribers.
//!
//! Modules are ordered roughly as data flows through them: [`bus`] pulls
//! raw messages in, [`normalize`] decodes them, [`buffer`] batches and
//! persists, [`detector`] (backed by [`features`], [`anomaly`]) scores
//! each event, and [`broadcaster`] pushes resulting alerts out.
//! [`profiles`] is the offline counterpart that (re)learns the
//! auto-profile fields the detector reads. [`consumer`] wires all of the
//! above into the long-running ingestion loop.

pub mod anomaly;
pub mod broadcaster;
pub mod buffer;
pub mod bus;
pub mod consumer;
pub mod detector;
pub mod features;
pub mod metrics;
pub mod normalize;
pub mod profiles;

pub use anomaly::AnomalyScorer;
pub use broadcaster::AlertBroadcaster;
pub use buffer::{flush_batch, BatchBuffer, FlushOutcome};
pub use bus::{Bus, BusMessage, KafkaBus, MockBus};
pub use consumer::{run_consume_loop, ConsumerContext};
pub use detector::{analyze_batch, DetectorInputs, DetectorOutput};
pub use metrics::EngineMetrics;
pub use normalize::{hybrid_entity_id, normalize_event, normalize_identity, NormalizedEvent, NormalizedIdentity};
pub use profiles::build_profiles;
