//! Taskmesh Gateway - Ingestion and Real-Time Fan-Out
//!
//! The producer side of the mesh: the atomic three-step submission
//! (persist -> enqueue -> announce), the HTTP API, the websocket
//! notification hub, the bus-to-hub relays and the synthetic load
//! simulator.

pub mod hub;
pub mod producer;
pub mod relay;
pub mod routes;
pub mod simulator;

#[cfg(test)]
pub(crate) mod testing;

pub use hub::NotificationHub;
pub use producer::{Producer, SubmitRequest};
pub use routes::{create_router, AppState};
