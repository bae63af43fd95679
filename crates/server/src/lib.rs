//! Waybill server library.
//!
//! The HTTP API is built as a library so the binary and the integration
//! tests assemble the same router over different stores and collaborators.

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod config;
pub mod db;
pub mod error;
pub mod middleware;
pub mod routes;
pub mod services;
pub mod state;

pub use routes::app;
pub use state::{AccessPolicy, AppState};
