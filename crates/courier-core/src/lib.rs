//! Core domain + application logic for the Courier workspace bot.
//!
//! This crate is intentionally framework-agnostic. Discord lives behind the
//! [`platform::port::ChatPlatform`] port, implemented in the adapter crate.

pub mod approval;
mod commands;
pub mod config;
pub mod domain;
pub mod engine;
pub mod errors;
pub mod formatting;
pub mod logging;
pub mod platform;
pub mod prompt;
pub mod router;
pub mod scanner;
pub mod threads;
pub mod timer;
pub mod voice;

#[cfg(test)]
mod testing;

pub use engine::Engine;
pub use errors::{Error, Result};
