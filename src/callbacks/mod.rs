//! Button press handling module.
//!
//! Parses the callback data of the counter keyboard, runs the requested
//! action and answers every press.

mod handler;
mod types;

pub use handler::CallbackHandler;
pub use types::CallbackAction;
