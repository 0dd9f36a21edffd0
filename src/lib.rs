//! Fleet reservation engine: availability, pricing, and lifecycle of vehicle
//! bookings over a journaled in-memory store.

pub mod catalog;
pub mod command;
pub mod compactor;
pub mod config;
pub mod engine;
pub mod limits;
pub mod model;
pub mod notify;
pub mod observability;
pub mod store;
pub mod wal;
