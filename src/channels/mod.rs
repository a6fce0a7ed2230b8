//! Chat transport abstraction
//!
//! The dispatcher only ever talks to a [`Channel`]; the Telegram bot is one
//! implementation of it.

pub mod traits;

pub use traits::{Channel, ChannelError, OutgoingFile, ResponseButton};
