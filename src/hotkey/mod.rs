//! Hotkey capture
//!
//! Reduces raw key presses to the `<mod>+...+<key>` string understood by the
//! global-hotkey registration layer, e.g. `<ctrl>+<shift>+a` or `<cmd>+<f5>`.

use crate::error::{AssistantError, Result};
use std::ops::{BitOr, BitOrAssign};

/// Modifier bitset of a key press
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Modifiers(u8);

impl Modifiers {
    pub const NONE: Self = Self(0);
    pub const CTRL: Self = Self(1);
    pub const ALT: Self = Self(1 << 1);
    pub const SHIFT: Self = Self(1 << 2);
    pub const META: Self = Self(1 << 3);

    /// Output order of modifier tokens
    const ORDER: [(Self, &'static str); 4] = [
        (Self::CTRL, "<ctrl>"),
        (Self::ALT, "<alt>"),
        (Self::SHIFT, "<shift>"),
        (Self::META, "<cmd>"),
    ];

    #[must_use]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    fn tokens(self) -> impl Iterator<Item = &'static str> {
        Self::ORDER
            .into_iter()
            .filter(move |(m, _)| self.contains(*m))
            .map(|(_, token)| token)
    }
}

impl BitOr for Modifiers {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for Modifiers {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

/// Key code of a press
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Key {
    Control,
    Shift,
    Alt,
    Meta,
    PageUp,
    PageDown,
    Left,
    Right,
    Up,
    Down,
    Enter,
    Return,
    Insert,
    Delete,
    Home,
    End,
    Space,
    Tab,
    Escape,
    Backspace,
    /// Function key F1-F12
    F(u8),
    /// Any other key, by its display name (`"A"`, `"/"`, `"CapsLock"`)
    Named(String),
}

impl Key {
    #[must_use]
    pub const fn is_modifier(&self) -> bool {
        matches!(self, Self::Control | Self::Shift | Self::Alt | Self::Meta)
    }

    /// Token used in the hotkey string
    #[must_use]
    pub fn token(&self) -> String {
        let symbolic = match self {
            Self::PageUp => "<page_up>",
            Self::PageDown => "<page_down>",
            Self::Left => "<left>",
            Self::Right => "<right>",
            Self::Up => "<up>",
            Self::Down => "<down>",
            Self::Enter | Self::Return => "<enter>",
            Self::Insert => "<insert>",
            Self::Delete => "<delete>",
            Self::Home => "<home>",
            Self::End => "<end>",
            Self::Space => "<space>",
            Self::Tab => "<tab>",
            Self::Escape => "<esc>",
            Self::Backspace => "<backspace>",
            Self::F(n @ 1..=12) => return format!("<f{n}>"),
            Self::F(n) => return format!("f{n}"),
            Self::Control => "ctrl",
            Self::Shift => "shift",
            Self::Alt => "alt",
            Self::Meta => "meta",
            Self::Named(name) => return name.to_lowercase(),
        };
        symbolic.to_string()
    }
}

/// Records the most recent non-modifier key combination
#[derive(Debug, Clone, Default)]
pub struct HotkeyRecorder {
    recorded: Option<String>,
}

impl HotkeyRecorder {
    #[must_use]
    pub const fn new() -> Self {
        Self { recorded: None }
    }

    /// Feed one key press
    ///
    /// Lone modifier presses are ignored and leave the recorded hotkey as is.
    /// Returns the newly recorded hotkey, if this press produced one.
    pub fn key_press(&mut self, modifiers: Modifiers, key: &Key) -> Option<&str> {
        if key.is_modifier() {
            return None;
        }

        let hotkey = format_hotkey(modifiers, key);
        tracing::debug!("Recorded hotkey {hotkey}");
        self.recorded = Some(hotkey);
        self.recorded.as_deref()
    }

    #[must_use]
    pub fn recorded_hotkey(&self) -> Option<&str> {
        self.recorded.as_deref()
    }

    pub fn clear(&mut self) {
        self.recorded = None;
    }
}

/// Build the hotkey string for a press
#[must_use]
pub fn format_hotkey(modifiers: Modifiers, key: &Key) -> String {
    let mut parts: Vec<String> = modifiers.tokens().map(str::to_string).collect();
    parts.push(key.token());
    parts.join("+")
}

/// Split a hotkey string into modifiers and key token, validating it
pub fn parse_hotkey(hotkey: &str) -> Result<(Modifiers, String)> {
    let invalid =
        |reason: &str| AssistantError::Hotkey(format!("Invalid hotkey '{hotkey}': {reason}"));

    // '+' is itself a valid key, so only split on separators before the last token
    let (prefix, key) = match hotkey.rsplit_once("++") {
        _ if hotkey == "+" => ("", "+"),
        Some((prefix, "")) => (prefix, "+"),
        _ => hotkey.rsplit_once('+').unwrap_or(("", hotkey)),
    };

    if key.is_empty() {
        return Err(invalid("missing key"));
    }
    if Modifiers::ORDER.iter().any(|(_, token)| *token == key) {
        return Err(invalid("modifier without a key"));
    }

    let mut modifiers = Modifiers::NONE;
    if !prefix.is_empty() {
        for token in prefix.split('+') {
            let (modifier, _) = Modifiers::ORDER
                .iter()
                .find(|(_, t)| *t == token)
                .ok_or_else(|| invalid(&format!("unknown modifier '{token}'")))?;
            if modifiers.contains(*modifier) {
                return Err(invalid(&format!("repeated modifier '{token}'")));
            }
            modifiers |= *modifier;
        }
    }

    Ok((modifiers, key.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ctrl_shift_letter() {
        let mut recorder = HotkeyRecorder::new();
        let result =
            recorder.key_press(Modifiers::CTRL | Modifiers::SHIFT, &Key::Named("A".into()));
        assert_eq!(result, Some("<ctrl>+<shift>+a"));
        assert_eq!(recorder.recorded_hotkey(), Some("<ctrl>+<shift>+a"));
    }

    #[test]
    fn test_bare_modifier_ignored() {
        let mut recorder = HotkeyRecorder::new();
        assert_eq!(recorder.key_press(Modifiers::CTRL, &Key::Control), None);
        assert_eq!(recorder.recorded_hotkey(), None);

        recorder.key_press(Modifiers::ALT, &Key::F(4));
        assert_eq!(
            recorder.key_press(Modifiers::CTRL | Modifiers::SHIFT, &Key::Shift),
            None
        );
        assert_eq!(recorder.recorded_hotkey(), Some("<alt>+<f4>"));
    }

    #[test]
    fn test_modifier_order_is_fixed() {
        let all = Modifiers::META | Modifiers::SHIFT | Modifiers::ALT | Modifiers::CTRL;
        assert_eq!(
            format_hotkey(all, &Key::Space),
            "<ctrl>+<alt>+<shift>+<cmd>+<space>"
        );
        assert_eq!(format_hotkey(Modifiers::META, &Key::Named("K".into())), "<cmd>+k");
    }

    #[test]
    fn test_new_press_overwrites() {
        let mut recorder = HotkeyRecorder::new();
        recorder.key_press(Modifiers::CTRL, &Key::Named("A".into()));
        recorder.key_press(Modifiers::NONE, &Key::Escape);
        assert_eq!(recorder.recorded_hotkey(), Some("<esc>"));

        recorder.clear();
        assert_eq!(recorder.recorded_hotkey(), None);
    }

    #[test]
    fn test_symbolic_keys() {
        let cases = [
            (Key::PageUp, "<page_up>"),
            (Key::PageDown, "<page_down>"),
            (Key::Left, "<left>"),
            (Key::Right, "<right>"),
            (Key::Up, "<up>"),
            (Key::Down, "<down>"),
            (Key::Enter, "<enter>"),
            (Key::Return, "<enter>"),
            (Key::Insert, "<insert>"),
            (Key::Delete, "<delete>"),
            (Key::Home, "<home>"),
            (Key::End, "<end>"),
            (Key::Space, "<space>"),
            (Key::Tab, "<tab>"),
            (Key::Escape, "<esc>"),
            (Key::Backspace, "<backspace>"),
            (Key::F(1), "<f1>"),
            (Key::F(12), "<f12>"),
        ];
        for (key, token) in cases {
            assert_eq!(key.token(), token, "{key:?}");
        }
    }

    #[test]
    fn test_unmapped_keys_lowercase() {
        assert_eq!(Key::F(13).token(), "f13");
        assert_eq!(Key::Named("CapsLock".into()).token(), "capslock");
        assert_eq!(Key::Named("/".into()).token(), "/");
    }

    #[test]
    fn test_parse_hotkey() {
        let (mods, key) = parse_hotkey("<ctrl>+<shift>+a").unwrap();
        assert_eq!(mods, Modifiers::CTRL | Modifiers::SHIFT);
        assert_eq!(key, "a");

        let (mods, key) = parse_hotkey("<cmd>+<shift>+<space>").unwrap();
        assert_eq!(mods, Modifiers::META | Modifiers::SHIFT);
        assert_eq!(key, "<space>");

        let (mods, key) = parse_hotkey("<f9>").unwrap();
        assert!(mods.is_empty());
        assert_eq!(key, "<f9>");

        let (mods, key) = parse_hotkey("<ctrl>++").unwrap();
        assert_eq!(mods, Modifiers::CTRL);
        assert_eq!(key, "+");
    }

    #[test]
    fn test_recorded_plus_key_parses() {
        let mut recorder = HotkeyRecorder::new();
        let hotkey = recorder
            .key_press(Modifiers::NONE, &Key::Named("+".into()))
            .unwrap()
            .to_string();
        assert_eq!(hotkey, "+");
        assert_eq!(parse_hotkey(&hotkey).unwrap(), (Modifiers::NONE, "+".to_string()));

        let hotkey = recorder
            .key_press(Modifiers::SHIFT, &Key::Named("+".into()))
            .unwrap()
            .to_string();
        assert_eq!(parse_hotkey(&hotkey).unwrap(), (Modifiers::SHIFT, "+".to_string()));
    }

    #[test]
    fn test_parse_hotkey_rejects() {
        assert!(parse_hotkey("").is_err());
        assert!(parse_hotkey("<ctrl>+").is_err());
        assert!(parse_hotkey("<ctrl>").is_err());
        assert!(parse_hotkey("<hyper>+a").is_err());
        assert!(parse_hotkey("<ctrl>+<ctrl>+a").is_err());
    }

    #[test]
    fn test_recorded_hotkey_parses() {
        let mut recorder = HotkeyRecorder::new();
        let hotkey = recorder
            .key_press(Modifiers::CTRL | Modifiers::ALT, &Key::Delete)
            .unwrap()
            .to_string();
        let (mods, key) = parse_hotkey(&hotkey).unwrap();
        assert_eq!(mods, Modifiers::CTRL | Modifiers::ALT);
        assert_eq!(key, "<delete>");
    }
}
