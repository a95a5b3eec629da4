//! CAMA - offline-first capture and sync core for cave surveys.
//!
//! Checkpoints and gas sampling sessions are written to a local redb file and
//! every change is queued for delivery. The sync engine moves the queue to a
//! sink in FIFO batches whenever it can.

pub mod checkpoints;
pub mod config;
pub mod demo;
pub mod sessions;
pub mod state;

#[cfg(test)]
mod testing;

pub use checkpoints::CheckpointService;
pub use config::{Config, ConfigError};
pub use demo::{record_demo, DemoReport};
pub use sessions::SessionService;
pub use state::{default_stations, seed_default_stations, App};
