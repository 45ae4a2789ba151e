//! Testbed Shared Types
//!
//! Wire types and errors shared by the notification client and its consumers.

pub mod error;
pub mod messages;
pub mod types;

pub use error::*;
pub use messages::{IncomingMessage, OutgoingMessage};
pub use types::*;
