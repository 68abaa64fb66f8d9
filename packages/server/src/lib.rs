//! Aegis-Server: Entrypoint and Thin Surfaces
//!
//! Wires the platform together at startup — every service is constructed
//! once in [`state::AppState`] and injected — and exposes:
//! - the HTTP/JSON surface (`POST /ingest`, `GET /patients/{id}/360`,
//!   `POST /llm/complete`, `WS /cowork/{session_id}`)
//! - the operator CLI (`serve`, `ingest`, `verify-audit`, `list-sources`,
//!   `replay`)
//!
//! All log output passes through the PHI-redacting writer before it
//! reaches a sink.

pub mod cli;
pub mod config;
pub mod error;
pub mod http;
pub mod state;
pub mod workflows;

pub use config::AegisConfig;
pub use state::AppState;
