pub mod provider;
pub mod tree;

pub use provider::{MetricsProvider, ProcSample, SystemProvider};
pub use tree::{ProcessRecord, build_forest};
