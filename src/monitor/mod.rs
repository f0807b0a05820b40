mod cache;
mod evaluator;
mod history;
mod network_learning;
mod provider;
mod snapshot;
mod state;
mod verifier;

pub use cache::MetricCache;
pub use evaluator::{AlertRecord, HealthState};
pub use history::POST_TREATMENT_HISTORY_CAPACITY;
pub use network_learning::NetworkUsageLearner;
pub use provider::{ActiveMetricsProvider, CACHED_METRICS};
pub use snapshot::Snapshot;
pub use state::{AlertTracker, CycleReport, DisplayView};
pub use verifier::{PostTreatmentRecord, ShutdownMode};

#[cfg(test)]
pub(crate) use evaluator::{AlertLevel, Evaluation};
#[cfg(test)]
pub(crate) use provider::{Enrichment, MetricSample};
#[cfg(test)]
pub(crate) use snapshot::build_stable;
