//! fintrack keeps personal expenses and income on the device and mirrors them to a Google Sheet.
//!
//! The record store is the source of truth and works offline. After every change the sync
//! scheduler waits for a quiet period and then overwrites the configured sheet range with the full
//! set of records, refreshing the OAuth access token once if Google rejects it.

pub mod api;
mod app;
pub mod args;
pub mod commands;
mod config;
pub mod error;
mod fs;
pub mod model;
pub mod store;
pub mod sync;
mod utils;

#[cfg(test)]
mod test;

pub use api::Mode;
pub use app::{App, Backends, Status};
pub use config::Config;
pub use error::Error;
pub use error::Result;
