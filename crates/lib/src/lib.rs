//! Coachline chat core — transport, session alerts, attachment pipeline,
//! and conversation reconciliation shared by the mobile shell and the CLI.

pub mod alerts;
pub mod attachment;
pub mod config;
pub mod credentials;
pub mod endpoints;
pub mod message;
pub mod reconcile;
pub mod sync;
pub mod thumbnail;
pub mod transport;
