//! The charging application service: one handler module per inbound OCPP
//! message kind, all implemented as `impl` blocks on the shared
//! [`ChargingEngine`] so they can freely call into one another.

pub mod authorize;
pub mod boot;
pub mod consumption_builder;
pub mod dispatcher;
pub mod engine;
pub mod messages;
pub mod meter_values;
pub mod normalizer;
pub mod start_transaction;
pub mod status;
pub mod stop_transaction;
#[cfg(test)]
mod test_support;

pub use dispatcher::dispatch;
pub use engine::{ChargingEngine, ChargingEngineDeps};
pub use messages::*;
