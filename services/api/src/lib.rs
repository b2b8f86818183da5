//! services/api/src/lib.rs
//!
//! The library crate for the API service. The `api` binary wires these
//! modules together into the running web server.

pub mod adapters;
pub mod config;
pub mod error;
pub mod web;
