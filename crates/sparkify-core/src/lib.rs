//! Core of the Sparkify warehouse loader: the ordered statement lists, the
//! SQL they carry, and the driver that runs them through a [`Warehouse`].
//!
//! [`Warehouse`]: warehouse::Warehouse

pub mod config;
pub mod error;
pub mod pipeline;
pub mod schema;
pub mod staging;
pub mod statement;
pub mod time;
pub mod transform;
pub mod warehouse;
