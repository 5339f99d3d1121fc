pub mod errors;
pub mod ml;
pub mod repositories;
pub mod signal_policy;
pub mod types;
