//! datasquad-gateway: HTTP model backend for datasquad
//!
//! Implements `datasquad_core::ModelClient` against any OpenAI-compatible
//! chat-completions endpoint. Credentials are supplied by the caller and
//! forwarded as a bearer token; this crate never loads or validates them.

pub mod client;
pub mod config;
pub mod error;

pub use client::GatewayClient;
pub use config::GatewayConfig;
pub use error::{GatewayError, Result};
