//! Herald HTTP/WebSocket server.
//!
//! Endpoints:
//! - GET  /health, /ping: liveness
//! - POST /webhook/like, /webhook/notifications: webhook ingestion
//! - POST /internal/notifications: inter-service ingestion
//! - GET  /ws: authenticated live-delivery session
//! - GET  /notifications/{id}: list a user's notifications
//! - PUT  /notifications/{id}/read: mark one notification read

pub mod middleware;
pub mod routes;
pub mod session;
pub mod state;
