pub mod version;

pub use version::{OcppTransport, OcppVersion};
