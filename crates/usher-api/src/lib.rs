//! Protocol types for usherd IPC
//!
//! This crate defines the stable API between usherd and clients:
//! - Rules (validated form and wire form)
//! - Commands (requests from clients)
//! - Responses
//! - Events (service -> clients)
//! - Versioning

mod commands;
mod events;
mod types;

pub use commands::*;
pub use events::*;
pub use types::*;

/// Current API version
pub const API_VERSION: u32 = 1;
