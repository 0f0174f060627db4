//! River-level flood alerting for the Piracicaba at Timóteo.
//!
//! Polls ANA telemetry for the local gauge and two upstream stations,
//! decides whether residents need to be warned, and hands notifications to
//! the dispatch channels.

pub mod alert;
pub mod analysis;
pub mod archive;
pub mod config;
pub mod dispatch;
pub mod ingest;
pub mod logging;
pub mod model;
pub mod monitor;
pub mod risk;
pub mod state;
pub mod stations;
pub mod verify;
