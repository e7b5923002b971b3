pub mod ingest_service;
pub mod pairing_service;
pub mod subscriber_registry;

pub use ingest_service::{DeliveryState, DocumentIngest, IngestConfig, IngestError};
pub use subscriber_registry::{Notice, SubscriberRegistry};
