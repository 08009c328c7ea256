//! Background blockchain sync for a light wallet.
//!
//! Keeps a headers-only chain store, runs a peer session while the device has
//! connectivity, power and storage, and publishes throttled status to the UI.

pub mod chain;
pub mod config;
pub mod network;
pub mod preferences;
pub mod service;
pub mod utils;
pub mod wallet;
