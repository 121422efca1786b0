pub mod model;
pub mod repository;

pub use model::{ChargingStation, Connector, ConnectorStatus, RegistrationStatus};
pub use repository::ChargingStationRepository;
