//! Callback data understood by the bot.

use std::fmt;

use crate::points::{DECREMENT_TOKEN, Direction, INCREMENT_TOKEN, LABEL_TOKEN};

/// Action requested by a button press.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallbackAction {
    /// Move the counter.
    Adjust(Direction),

    /// The label was pressed; only report the current value.
    ShowPoints,
}

impl CallbackAction {
    /// Parses raw callback data.
    ///
    /// Returns `None` for data the bot never attaches to its buttons.
    #[must_use]
    pub fn parse(data: &[u8]) -> Option<Self> {
        let data = std::str::from_utf8(data).ok()?.trim();

        match data {
            INCREMENT_TOKEN => Some(Self::Adjust(Direction::Increment)),
            DECREMENT_TOKEN => Some(Self::Adjust(Direction::Decrement)),
            LABEL_TOKEN => Some(Self::ShowPoints),
            _ => None,
        }
    }
}

impl fmt::Display for CallbackAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Adjust(Direction::Increment) => write!(f, "increment"),
            Self::Adjust(Direction::Decrement) => write!(f, "decrement"),
            Self::ShowPoints => write!(f, "show points"),
        }
    }
}
