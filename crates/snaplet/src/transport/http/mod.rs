//! HTTP transport via axum.

pub mod routes;
pub mod server;

pub use server::{ServerConfig, serve};
