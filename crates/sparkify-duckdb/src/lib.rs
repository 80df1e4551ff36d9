pub mod backend;
pub mod loader;

pub use backend::DuckDbWarehouse;

/// Re-export the `duckdb` crate so tests can query through
/// `conn_for_test()` without an extra dependency.
pub use duckdb;
