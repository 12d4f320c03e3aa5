//! HTTP entry point (spec §6): wires every query-time component behind a
//! single axum router.
//!
//! A thin `state`/`http`/`auth` split, with `main.rs` doing all the
//! process-start wiring. Handlers are stateless; durability lives behind
//! the store traits held in `AppState`.

pub mod audio_range;
pub mod auth;
pub mod http;
pub mod metrics;
pub mod state;

pub use http::create_router;
pub use metrics::init_metrics;
pub use state::AppState;
