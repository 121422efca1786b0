//! Reference adapters for every out-of-scope collaborator: a `DashMap`-backed
//! storage and locking implementation (the narrowest satisfying
//! implementation of the persistence/locking collaborators), plus
//! logging-only stand-ins for pricing, billing, roaming, smart-charging and
//! notifications so the binary runs standalone. A deployment that wires in
//! a real tariff engine, invoicing system, or roaming bridge replaces these
//! without touching the core.

pub mod collaborators;
pub mod locks;
pub mod repository;

pub use collaborators::{
    DefaultInactivityClassifier, LoggingBilling, LoggingNotifications, LoggingPricing, LoggingRoaming,
    LoggingSmartCharging, StaticTemplateCatalog,
};
pub use locks::InMemoryLocks;
pub use repository::MemoryRepositoryProvider;
