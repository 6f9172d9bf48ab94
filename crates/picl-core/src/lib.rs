//! Core logic for Picl, a community chat bot.
//!
//! Platform-agnostic: Discord lives behind the ports in [`messaging::port`],
//! implemented by the adapter crate.

pub mod activity;
pub mod capture;
pub mod config;
pub mod domain;
pub mod enforcer;
pub mod errors;
pub mod logging;
pub mod messaging;
pub mod photos;
pub mod relay;
pub mod store;
pub mod texts;
pub mod utils;

#[cfg(test)]
mod testing;

pub use errors::{Error, Result};
