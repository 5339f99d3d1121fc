pub mod observability;
pub mod persistence;

pub use persistence::{Database, SqliteCandleRepository};
