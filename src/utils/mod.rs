//!
//! Utility module for the wallet sync service.
//!
//! Re-exports formatting helpers used by notifications and logging.
/// Utility functions for formatting and display
pub mod index;

pub use index::{format_coin_amount, format_signed_coin_amount};
