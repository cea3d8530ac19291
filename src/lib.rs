pub mod checkpoint;
pub mod config;
pub mod error;
pub mod exporter;
pub mod fatal;
pub mod identity;
pub mod metrics;
pub mod position;

pub mod kafka;
pub mod store;

pub use config::Config;
pub use error::{Error, Result};
pub use exporter::Exporter;
pub use identity::ExporterIdentity;
pub use metrics::ExporterMetrics;
pub use kafka::{Batch, DeliveryFailure, Record};
pub use position::Position;
