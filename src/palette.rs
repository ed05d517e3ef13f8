//! Stable per-instance colours.
//!
//! One [`InstancePalette`] lives for one application session and is passed
//! to whatever renders instance names. Colours are handed out in first-seen
//! order and never change for an instance until [`InstancePalette::clear`].

use std::collections::HashMap;

use ratatui::style::Color;

#[derive(Debug)]
pub struct InstancePalette {
    colors: Vec<Color>,
    assigned: HashMap<String, Color>,
}

impl InstancePalette {
    pub fn new(colors: Vec<Color>) -> Self {
        let colors = if colors.is_empty() { vec![Color::Reset] } else { colors };
        Self {
            colors,
            assigned: HashMap::new(),
        }
    }

    /// Colour for `instance_id`, assigning the next one on first sight.
    pub fn color_for(&mut self, instance_id: &str) -> Color {
        if let Some(color) = self.assigned.get(instance_id) {
            return *color;
        }
        let color = self.colors[self.assigned.len() % self.colors.len()];
        self.assigned.insert(instance_id.to_string(), color);
        color
    }

    /// Colour already given to `instance_id`, without assigning one.
    pub fn peek(&self, instance_id: &str) -> Option<Color> {
        self.assigned.get(instance_id).copied()
    }

    pub fn len(&self) -> usize {
        self.assigned.len()
    }

    pub fn is_empty(&self) -> bool {
        self.assigned.is_empty()
    }

    /// Forget all assignments, e.g. when the session ends.
    pub fn clear(&mut self) {
        self.assigned.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_assignment_is_stable_and_cycles() {
        let mut palette = InstancePalette::new(vec![Color::Red, Color::Blue]);
        assert_eq!(palette.color_for("a"), Color::Red);
        assert_eq!(palette.color_for("b"), Color::Blue);
        assert_eq!(palette.color_for("a"), Color::Red);
        assert_eq!(palette.color_for("c"), Color::Red);
        assert_eq!(palette.len(), 3);
    }

    #[test]
    fn test_clear_starts_over() {
        let mut palette = InstancePalette::new(vec![Color::Red, Color::Blue]);
        palette.color_for("a");
        palette.color_for("b");
        palette.clear();
        assert!(palette.peek("b").is_none());
        assert_eq!(palette.color_for("b"), Color::Red);
    }

    #[test]
    fn test_empty_color_list_is_usable() {
        let mut palette = InstancePalette::new(Vec::new());
        assert_eq!(palette.color_for("a"), Color::Reset);
    }
}
