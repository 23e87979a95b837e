//! Live-delivery core: notification persistence, the connection registry,
//! the delivery dispatcher, pending replay and the ingestion path.

pub mod dispatcher;
pub mod ingestion;
pub mod registry;
pub mod replay;
pub mod store;
