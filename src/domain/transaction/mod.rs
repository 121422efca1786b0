pub mod model;
pub mod repository;

pub use model::{
    PhaseReadings, RemoteStop, RoamingSessionData, Transaction, TransactionStop, UserSnapshot,
};
pub use repository::TransactionRepository;
