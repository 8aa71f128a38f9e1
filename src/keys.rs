use serde::Deserialize;
use std::fmt;

/// Non-printable keys deliverable to a focused element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Key {
    Enter,
    Return,
    Tab,
    Escape,
    Backspace,
    Delete,
    ArrowUp,
    ArrowDown,
    ArrowLeft,
    ArrowRight,
    Home,
    End,
    PageUp,
    PageDown,
    Space,
}

impl Key {
    /// DOM `KeyboardEvent.key` value.
    pub fn dom_key(&self) -> &'static str {
        match self {
            // Return and Enter are the same physical key
            Key::Enter | Key::Return => "Enter",
            Key::Tab => "Tab",
            Key::Escape => "Escape",
            Key::Backspace => "Backspace",
            Key::Delete => "Delete",
            Key::ArrowUp => "ArrowUp",
            Key::ArrowDown => "ArrowDown",
            Key::ArrowLeft => "ArrowLeft",
            Key::ArrowRight => "ArrowRight",
            Key::Home => "Home",
            Key::End => "End",
            Key::PageUp => "PageUp",
            Key::PageDown => "PageDown",
            Key::Space => " ",
        }
    }

    /// Whether this key submits the enclosing form when pressed in a text field.
    pub fn submits(&self) -> bool {
        matches!(self, Key::Enter | Key::Return)
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Key::Space => f.write_str("Space"),
            other => f.write_str(other.dom_key()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn return_is_enter() {
        assert_eq!(Key::Return.dom_key(), Key::Enter.dom_key());
        assert!(Key::Return.submits());
        assert!(!Key::Tab.submits());
    }

    #[test]
    fn deserialize_snake_case() {
        let k: Key = serde_json::from_str("\"arrow_down\"").unwrap();
        assert_eq!(k, Key::ArrowDown);
        let k: Key = serde_json::from_str("\"page_up\"").unwrap();
        assert_eq!(k, Key::PageUp);
    }

    #[test]
    fn display_space() {
        assert_eq!(Key::Space.to_string(), "Space");
        assert_eq!(Key::Escape.to_string(), "Escape");
    }
}
