//! Minimal color theme table for the status panel.
//!
//! Ten color roles, a few built-ins, and `[[custom_theme]]` entries that
//! override a built-in of the same name or append to the cycle.

use crate::config::CustomTheme;
use ratatui::style::Color;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Theme {
    pub name: String,
    pub primary: Color,
    pub secondary: Color,
    pub accent: Color,
    pub error: Color,
    pub success: Color,
    pub warning: Color,
    pub background: Color,
    pub text: Color,
    pub dimmed: Color,
    pub separator: Color,
}

impl Theme {
    fn synthwave() -> Self {
        Self {
            name: "synthwave".to_string(),
            primary: Color::Rgb(0xFF, 0x6A, 0xC1),
            secondary: Color::Rgb(0x00, 0xE5, 0xFF),
            accent: Color::Rgb(0xB3, 0x88, 0xFF),
            error: Color::Rgb(0xFF, 0x8A, 0x80),
            success: Color::Rgb(0x64, 0xFF, 0xDA),
            warning: Color::Rgb(0xFF, 0xAB, 0x40),
            background: Color::Rgb(0x1A, 0x1A, 0x2E),
            text: Color::Rgb(0xE0, 0xE0, 0xE0),
            dimmed: Color::Rgb(0x66, 0x66, 0x66),
            separator: Color::Rgb(0x44, 0x44, 0x44),
        }
    }

    fn midnight() -> Self {
        Self {
            name: "midnight".to_string(),
            primary: Color::Rgb(0x82, 0xAA, 0xFF),
            secondary: Color::Rgb(0x89, 0xDD, 0xFF),
            accent: Color::Rgb(0xC7, 0x92, 0xEA),
            error: Color::Rgb(0xF0, 0x71, 0x78),
            success: Color::Rgb(0xC3, 0xE8, 0x8D),
            warning: Color::Rgb(0xFF, 0xCB, 0x6B),
            background: Color::Rgb(0x0F, 0x11, 0x1A),
            text: Color::Rgb(0xD6, 0xDE, 0xEB),
            dimmed: Color::Rgb(0x4B, 0x52, 0x63),
            separator: Color::Rgb(0x2E, 0x34, 0x40),
        }
    }

    fn plain() -> Self {
        Self {
            name: "plain".to_string(),
            primary: Color::White,
            secondary: Color::Cyan,
            accent: Color::Magenta,
            error: Color::Red,
            success: Color::Green,
            warning: Color::Yellow,
            background: Color::Reset,
            text: Color::Gray,
            dimmed: Color::DarkGray,
            separator: Color::DarkGray,
        }
    }
}

/// All themes known to this process, in cycle order. Built once at startup.
#[derive(Debug, Clone)]
pub struct ThemeSet {
    themes: Vec<Theme>,
}

impl ThemeSet {
    pub fn builtin() -> Self {
        Self {
            themes: vec![Theme::synthwave(), Theme::midnight(), Theme::plain()],
        }
    }

    pub fn with_custom(custom: &[CustomTheme]) -> Self {
        let mut set = Self::builtin();
        for entry in custom {
            let name = entry.name.to_lowercase();
            if name.is_empty() {
                continue;
            }
            let theme = theme_from_custom(&name, entry, &set.themes[0]);
            match set.themes.iter_mut().find(|t| t.name == name) {
                Some(existing) => *existing = theme,
                None => set.themes.push(theme),
            }
        }
        set
    }

    /// Unknown names fall back to the first theme.
    pub fn resolve(&self, name: &str) -> &Theme {
        let lower = name.to_lowercase();
        self.themes
            .iter()
            .find(|t| t.name == lower)
            .unwrap_or(&self.themes[0])
    }

    pub fn next_theme(&self, current: &str) -> &Theme {
        let lower = current.to_lowercase();
        match self.themes.iter().position(|t| t.name == lower) {
            Some(i) => &self.themes[(i + 1) % self.themes.len()],
            None => &self.themes[0],
        }
    }
}

fn theme_from_custom(name: &str, entry: &CustomTheme, fallback: &Theme) -> Theme {
    let color = |hex: &str, default: Color| parse_hex_color(hex).unwrap_or(default);
    Theme {
        name: name.to_string(),
        primary: color(&entry.primary, fallback.primary),
        secondary: color(&entry.secondary, fallback.secondary),
        accent: color(&entry.accent, fallback.accent),
        error: color(&entry.error, fallback.error),
        success: color(&entry.success, fallback.success),
        warning: color(&entry.warning, fallback.warning),
        background: color(&entry.background, fallback.background),
        text: color(&entry.text, fallback.text),
        dimmed: color(&entry.dimmed, fallback.dimmed),
        separator: color(&entry.separator, fallback.separator),
    }
}

/// "#RRGGBB" → Color; anything else is None.
pub fn parse_hex_color(hex: &str) -> Option<Color> {
    let hex = hex.trim().strip_prefix('#')?;
    if hex.len() != 6 {
        return None;
    }
    let r = u8::from_str_radix(&hex[0..2], 16).ok()?;
    let g = u8::from_str_radix(&hex[2..4], 16).ok()?;
    let b = u8::from_str_radix(&hex[4..6], 16).ok()?;
    Some(Color::Rgb(r, g, b))
}
