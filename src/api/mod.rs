//! HTTP and WebSocket surface of the round engine.
//!
//! The WebSocket channel carries the live game protocol; the REST
//! endpoints serve read-only history, stats, and the current-round
//! snapshot for the surrounding app's presentation layer.

pub mod errors;
pub mod handlers;
pub mod models;
pub mod routes;
pub mod server;
pub mod websocket;

pub use server::ApiServer;
