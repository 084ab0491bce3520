//! # dealdesk-node
//!
//! Process wiring for **DealDesk**: in-memory stores, the settlement
//! reconciler behind `POST /webhooks/payments`, and the expiry sweeper on a
//! background task.

pub mod cli;
pub mod error;
pub mod node;
pub mod routes;
pub mod telemetry;

pub use cli::Args;
pub use error::AppError;
pub use node::{LogSink, Node, NodeNegotiation, NodeReconciler, NodeSweeper};
pub use routes::{AppState, SIGNATURE_HEADER, router};
