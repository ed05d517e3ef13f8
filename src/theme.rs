use ratatui::style::Color;

use crate::line::LogLevel;

/// All themeable colors in the application
#[derive(Clone, Debug)]
pub struct Theme {
    // Log levels
    pub level_error: Color,
    pub level_warn: Color,
    pub level_info: Color,
    pub level_debug: Color,
    pub level_trace: Color,

    // UI borders
    pub border_focused: Color,
    pub border_unfocused: Color,

    // Header
    pub header_title: Color,
    pub header_source: Color,
    pub header_bg: Color,

    // Status bar
    pub status_mode_bg: Color,
    pub status_mode_fg: Color,
    pub status_help: Color,
    pub status_bg: Color,

    // Search match highlight
    pub highlight_match_bg: Color,
    pub highlight_match_fg: Color,

    pub timestamp: Color,

    // Connection indicator
    pub live_connected: Color,
    pub live_disconnected: Color,

    /// Cycled through by the instance palette
    pub instance_colors: Vec<Color>,

    // Empty states / messages
    pub empty_state: Color,
    pub warning_message: Color,
    pub error_message: Color,

    // Help overlay
    pub help_border: Color,
    pub help_bg: Color,
}

impl Default for Theme {
    fn default() -> Self {
        Self::default_theme()
    }
}

impl Theme {
    pub fn default_theme() -> Self {
        Self {
            level_error: Color::LightRed,
            level_warn: Color::Yellow,
            level_info: Color::Green,
            level_debug: Color::Blue,
            level_trace: Color::DarkGray,

            border_focused: Color::Cyan,
            border_unfocused: Color::DarkGray,

            header_title: Color::Green,
            header_source: Color::Cyan,
            header_bg: Color::DarkGray,

            status_mode_bg: Color::Blue,
            status_mode_fg: Color::White,
            status_help: Color::DarkGray,
            status_bg: Color::Black,

            highlight_match_bg: Color::Yellow,
            highlight_match_fg: Color::Black,

            timestamp: Color::DarkGray,

            live_connected: Color::Green,
            live_disconnected: Color::Red,

            instance_colors: vec![
                Color::Cyan,
                Color::Magenta,
                Color::LightBlue,
                Color::LightGreen,
                Color::LightYellow,
                Color::LightMagenta,
                Color::LightCyan,
                Color::LightRed,
            ],

            empty_state: Color::DarkGray,
            warning_message: Color::Yellow,
            error_message: Color::Red,

            help_border: Color::Cyan,
            help_bg: Color::Black,
        }
    }

    /// Nord: cool blues on a dark slate background
    pub fn nord() -> Self {
        Self {
            level_error: Color::Rgb(191, 97, 106),
            level_warn: Color::Rgb(235, 203, 139),
            level_info: Color::Rgb(163, 190, 140),
            level_debug: Color::Rgb(129, 161, 193),
            level_trace: Color::Rgb(76, 86, 106),

            border_focused: Color::Rgb(136, 192, 208),
            border_unfocused: Color::Rgb(67, 76, 94),

            header_title: Color::Rgb(143, 188, 187),
            header_source: Color::Rgb(136, 192, 208),
            header_bg: Color::Rgb(59, 66, 82),

            status_mode_bg: Color::Rgb(94, 129, 172),
            status_mode_fg: Color::Rgb(236, 239, 244),
            status_help: Color::Rgb(76, 86, 106),
            status_bg: Color::Rgb(46, 52, 64),

            highlight_match_bg: Color::Rgb(235, 203, 139),
            highlight_match_fg: Color::Rgb(46, 52, 64),

            timestamp: Color::Rgb(76, 86, 106),

            live_connected: Color::Rgb(163, 190, 140),
            live_disconnected: Color::Rgb(191, 97, 106),

            instance_colors: vec![
                Color::Rgb(136, 192, 208),
                Color::Rgb(180, 142, 173),
                Color::Rgb(208, 135, 112),
                Color::Rgb(143, 188, 187),
                Color::Rgb(235, 203, 139),
                Color::Rgb(129, 161, 193),
            ],

            empty_state: Color::Rgb(76, 86, 106),
            warning_message: Color::Rgb(208, 135, 112),
            error_message: Color::Rgb(191, 97, 106),

            help_border: Color::Rgb(136, 192, 208),
            help_bg: Color::Rgb(46, 52, 64),
        }
    }

    /// Solarized dark
    pub fn solarized() -> Self {
        let base03 = Color::Rgb(0, 43, 54);
        let base02 = Color::Rgb(7, 54, 66);
        let base01 = Color::Rgb(88, 110, 117);
        let base1 = Color::Rgb(147, 161, 161);
        let yellow = Color::Rgb(181, 137, 0);
        let orange = Color::Rgb(203, 75, 22);
        let red = Color::Rgb(220, 50, 47);
        let magenta = Color::Rgb(211, 54, 130);
        let violet = Color::Rgb(108, 113, 196);
        let blue = Color::Rgb(38, 139, 210);
        let cyan = Color::Rgb(42, 161, 152);
        let green = Color::Rgb(133, 153, 0);

        Self {
            level_error: red,
            level_warn: yellow,
            level_info: green,
            level_debug: blue,
            level_trace: base01,

            border_focused: cyan,
            border_unfocused: base02,

            header_title: yellow,
            header_source: cyan,
            header_bg: base02,

            status_mode_bg: blue,
            status_mode_fg: base03,
            status_help: base01,
            status_bg: base03,

            highlight_match_bg: orange,
            highlight_match_fg: base03,

            timestamp: base01,

            live_connected: green,
            live_disconnected: red,

            instance_colors: vec![cyan, magenta, violet, orange, blue, yellow],

            empty_state: base01,
            warning_message: yellow,
            error_message: red,

            help_border: base1,
            help_bg: base03,
        }
    }

    /// Get a theme by name
    pub fn by_name(name: &str) -> Self {
        match name.to_lowercase().as_str() {
            "nord" => Self::nord(),
            "solarized" => Self::solarized(),
            _ => Self::default_theme(),
        }
    }

    /// Color for a detected log level, if it has one
    pub fn level_color(&self, level: LogLevel) -> Option<Color> {
        match level {
            LogLevel::Error => Some(self.level_error),
            LogLevel::Warn => Some(self.level_warn),
            LogLevel::Info => Some(self.level_info),
            LogLevel::Debug => Some(self.level_debug),
            LogLevel::Trace => Some(self.level_trace),
            LogLevel::None => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_name_falls_back_to_default() {
        assert_eq!(Theme::by_name("nope").header_title, Color::Green);
        assert_eq!(Theme::by_name("Nord").header_title, Color::Rgb(143, 188, 187));
    }

    #[test]
    fn test_plain_lines_have_no_level_color() {
        let theme = Theme::default();
        assert_eq!(theme.level_color(LogLevel::None), None);
        assert_eq!(theme.level_color(LogLevel::Error), Some(Color::LightRed));
    }
}
