//! Host interface traits for usherd
//!
//! This crate defines the seams between the core and its collaborators:
//! - `ForegroundSource`: where foreground-app-change events come from
//! - `InterventionSurface`: where intervention prompts go
//!
//! The delivery mechanisms behind both are owned by the host platform; the
//! core only sees these interfaces. `ChannelSource` is the production
//! source (fed by the daemon's IPC layer); mocks live in `mock` for tests.

mod channel;
mod mock;
mod traits;

pub use channel::*;
pub use mock::*;
pub use traits::*;
