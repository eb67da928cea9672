//! Connection-scoped session state for the RCON client.
//!
//! This crate holds everything that lives exactly as long as one
//! authenticated connection:
//!
//! 1. **Correlation**: matching fragmented responses back to the command
//!    that produced them, strictly in submission order ([`Correlator`])
//! 2. **Id allocation**: the cycling command id counter ([`CommandIds`])
//! 3. **Lifecycle**: the connection state machine ([`ConnectionState`])
//!
//! # How it fits in the stack
//!
//! ```text
//! Client / Supervisor (above)  ← drives reconnects, owns the socket
//!     ↕
//! Session Layer (this crate)   ← pending commands, response reassembly
//!     ↕
//! Protocol Layer (below)       ← frames, reserved ids
//! ```
//!
//! Nothing here touches the network. On reconnect the supervisor resets
//! these values in place instead of rebuilding them.

mod correlator;
mod error;
mod ids;
mod state;

pub use correlator::{Correlator, Response, ResponseSink};
pub use error::SessionError;
pub use ids::CommandIds;
pub use state::ConnectionState;
