//! Core domain + application logic for the restricted content relay.
//!
//! This crate is intentionally framework-agnostic. The chat platform lives
//! behind the `ChatClient` port, implemented in adapter crates.

pub mod audit;
pub mod commands;
pub mod config;
pub mod context;
pub mod domain;
pub mod errors;
pub mod live;
pub mod logging;
pub mod media;
pub mod offset;
pub mod pipeline;
pub mod ports;
pub mod prefetch;
pub mod restriction;
pub mod strategy;

#[cfg(test)]
mod testing;

pub use errors::{Error, Result};
