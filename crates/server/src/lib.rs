//! Parley interpreter server
//!
//! WebSocket streaming endpoint plus a small HTTP control surface
//! (participant settings, health, metrics).

pub mod http;
pub mod metrics;
pub mod state;
pub mod stream;

pub use http::create_router;
pub use metrics::init_metrics;
pub use state::{AppState, SessionHandle, SessionRegistry};
pub use stream::{drive_session, Inbound};
