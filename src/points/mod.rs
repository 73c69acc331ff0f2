//! Social points counter logic.
//!
//! Ties together the per-user daily gate, the shared counter and the
//! rendering of the counter message.

mod coordinator;
mod gate;
mod render;

pub use coordinator::{ActionError, Direction, Outcome, UpdateCoordinator};
pub use gate::{Clock, RateGate, SystemClock};
pub use render::{
    Button, DECREMENT_TOKEN, INCREMENT_TOKEN, LABEL_TOKEN, MESSAGE_TEXT, Renderer, View, label,
};

#[cfg(test)]
pub(crate) use coordinator::tests as harness;
