//! harvest_client: session & subscription state layer for the API harvesting platform
//!
//! Browses the catalog of harvestable upstream APIs, manages polling
//! subscriptions against the scheduler and normalises the time-series rows
//! they produce.
//!
//! The session gates every authenticated call; catalog, registry and
//! telemetry view each own their state.

pub mod error;
pub mod config;
pub mod logging;
pub mod models;
// Durable credential triple (sled) behind a trait
pub mod storage;
pub mod auth;
pub mod session;
// Reqwest client for the connectors and scheduler
pub mod api;
mod sequence;
pub mod catalog;
pub mod subscriptions;
pub mod telemetry;
pub mod client;

pub use client::HarvestClient;
pub use config::ClientConfig;
pub use error::{ClientError, ErrorKind, Operation, Result};
pub use session::{SessionEvent, SessionManager};
