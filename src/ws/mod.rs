//! WebSocket plumbing for the notification channels.
//!
//! | Module | Purpose |
//! |--------|---------|
//! | `types` | Channel names, connection identity, the `Transport` capability |
//! | `registry` | Live connections of one channel and the broadcast primitive |
//! | `directory` | Session id to session mapping of one channel |
//! | `session` | Per-client receive loop and cleanup |
//! | `service` | `BroadcastService`, one per channel |
//! | `upgrade` | Axum handler for the upgrade endpoints |

pub mod directory;
pub mod registry;
pub mod service;
pub mod session;
pub mod types;
pub mod upgrade;

#[cfg(test)]
pub(crate) mod testing;
