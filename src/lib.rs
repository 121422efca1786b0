//! OCPP 1.5/1.6 session handler and transaction engine for an EV charging
//! platform. This crate terminates station messages, drives the
//! per-connector status state
//! machine, computes consumption, enforces authorization, and keeps
//! station records consistent — everything else (pricing, billing,
//! roaming, smart-charging, the REST admin façade, persistence) is an
//! external collaborator consumed through the narrow ports in
//! [`domain::ports`] and [`domain::repositories`].

pub mod application;
pub mod config;
pub mod domain;
pub mod infrastructure;
pub mod server;
pub mod support;
