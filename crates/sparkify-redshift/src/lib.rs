pub mod backend;

pub use backend::{render, RedshiftWarehouse};
