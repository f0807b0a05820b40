mod defaults;
mod io;
mod schema;
mod validate;

pub use defaults::default_cooldown_secs;
pub use io::{load_config, resolve_config_path};
pub use schema::{Config, NetworkLearning, Persistence, RuntimeConfig, Thresholds, TreatmentPolicy};
pub use validate::ConfigError;

#[cfg(test)]
pub use schema::ThresholdSpec;
