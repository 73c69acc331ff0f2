//! Inline keyboard layout of the counter message.

/// Callback data of the increment button.
pub const INCREMENT_TOKEN: &str = "coin_+";

/// Callback data of the decrement button.
pub const DECREMENT_TOKEN: &str = "coin_-";

/// Callback data of the label button.
pub const LABEL_TOKEN: &str = "coin_=";

/// Text of the counter message itself; only the keyboard ever changes.
pub const MESSAGE_TEXT: &str = "Social Points";

const NON_NEGATIVE_GLYPH: &str = "🌟";
const NEGATIVE_GLYPH: &str = "💀";

/// A single inline button.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Button {
    /// Opens a link.
    Url { text: String, url: String },
    /// Sends callback data back to the bot.
    Callback { text: String, data: String },
}

impl Button {
    fn url(text: impl Into<String>, url: impl Into<String>) -> Self {
        Self::Url {
            text: text.into(),
            url: url.into(),
        }
    }

    fn callback(text: impl Into<String>, data: impl Into<String>) -> Self {
        Self::Callback {
            text: text.into(),
            data: data.into(),
        }
    }

    /// Returns the visible button text.
    #[must_use]
    pub fn text(&self) -> &str {
        match self {
            Self::Url { text, .. } | Self::Callback { text, .. } => text,
        }
    }
}

/// Rows of inline buttons attached to the counter message.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct View {
    pub rows: Vec<Vec<Button>>,
}

/// Builds the counter keyboard.
#[derive(Debug, Clone)]
pub struct Renderer {
    contact_url: String,
}

impl Renderer {
    /// Creates a renderer whose contact button opens `contact_url`.
    #[must_use]
    pub fn new(contact_url: impl Into<String>) -> Self {
        Self {
            contact_url: contact_url.into(),
        }
    }

    /// Renders the keyboard for `value`.
    ///
    /// Layout: contact link, then the label, then decrement and increment
    /// side by side.
    #[must_use]
    pub fn render(&self, value: i64) -> View {
        View {
            rows: vec![
                vec![Button::url("Write to the owner 🎭", &self.contact_url)],
                vec![Button::callback(label(value), LABEL_TOKEN)],
                vec![
                    Button::callback("📛", DECREMENT_TOKEN),
                    Button::callback("✴", INCREMENT_TOKEN),
                ],
            ],
        }
    }
}

/// Label text showing `value` with its status glyph.
#[must_use]
pub fn label(value: i64) -> String {
    let glyph = if value < 0 {
        NEGATIVE_GLYPH
    } else {
        NON_NEGATIVE_GLYPH
    };
    format!("{glyph} Social Points: {value}")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn renderer() -> Renderer {
        Renderer::new("https://t.me/owner")
    }

    #[test]
    fn test_render_is_deterministic() {
        assert_eq!(renderer().render(7), renderer().render(7));
        assert_ne!(renderer().render(7), renderer().render(8));
    }

    #[test]
    fn test_status_glyph() {
        assert!(label(5).starts_with(NON_NEGATIVE_GLYPH));
        assert!(label(0).starts_with(NON_NEGATIVE_GLYPH));
        assert!(label(-3).starts_with(NEGATIVE_GLYPH));
        assert!(label(-3).ends_with("-3"));
    }

    #[test]
    fn test_layout() {
        let view = renderer().render(-3);
        assert_eq!(view.rows.len(), 3);

        assert_eq!(
            view.rows[0],
            vec![Button::url("Write to the owner 🎭", "https://t.me/owner")]
        );
        assert_eq!(view.rows[1], vec![Button::callback(label(-3), LABEL_TOKEN)]);

        let actions: Vec<_> = view.rows[2]
            .iter()
            .map(|b| match b {
                Button::Callback { data, .. } => data.as_str(),
                Button::Url { .. } => "",
            })
            .collect();
        assert_eq!(actions, [DECREMENT_TOKEN, INCREMENT_TOKEN]);
    }
}
