//! Application layer: the charging engine that implements the component
//! design on top of the domain model and outbound ports.

pub mod charging;
