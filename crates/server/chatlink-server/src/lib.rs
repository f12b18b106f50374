//! Chat account linking server.
//!
//! A chat user asks for a one-time code, types it into the web form served
//! here, grants consent at the OAuth2 provider, and the resulting credentials
//! are stored against their messaging identity.

pub mod app;
pub mod config;
pub mod notify;
pub mod pages;
pub mod routes;
pub mod service;
pub mod telemetry;

pub use app::{build_app, build_router, build_service};
pub use config::Config;
pub use notify::{LinkNotifier, LogNotifier};
pub use service::LinkService;
