//! Telegram transport module.
//!
//! Defines the messaging operations the counter needs and implements
//! them on top of a grammers bot session, with edit pacing and flood
//! wait detection.

mod client;
mod rate_limiter;
mod transport;

pub use client::{TelegramBot, TelegramError};
pub use rate_limiter::RateLimiter;
pub use transport::{Acknowledgement, CallbackPress, Transport, TransportError};

#[cfg(test)]
pub(crate) use transport::fake;
