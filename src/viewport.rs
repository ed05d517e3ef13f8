//! Virtualized render window over a rank-addressed container.
//!
//! The controller never touches lines itself. It is told the container size
//! after every mutation and answers which ranks are visible, whether the view
//! follows the newest line, and when an edge is close enough to page in more.

use std::collections::VecDeque;
use std::ops::Range;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Edge {
    Top,
    Bottom,
}

/// Scroll requests for the rendering layer, drained with
/// [`ViewportController::take_signals`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ViewportSignal {
    ScrollToNewest,
    ScrollToRank(usize),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ViewportSettings {
    /// Estimated height of one row, in the same unit as `viewport_height`.
    pub row_height: u32,
    pub viewport_height: u32,
    /// Rows from either end at which the next page is requested.
    pub edge_margin: usize,
    /// Rows from the newest line that still count as "at the bottom".
    pub pin_tolerance: usize,
}

impl Default for ViewportSettings {
    fn default() -> Self {
        Self {
            row_height: 1,
            viewport_height: 24,
            edge_margin: 5,
            pin_tolerance: 1,
        }
    }
}

#[derive(Debug)]
pub struct ViewportController {
    settings: ViewportSettings,
    /// Rank of the first visible line.
    top: usize,
    len: usize,
    pinned: bool,
    top_armed: bool,
    bottom_armed: bool,
    signals: VecDeque<ViewportSignal>,
}

impl ViewportController {
    pub fn new(settings: ViewportSettings) -> Self {
        Self {
            settings,
            top: 0,
            len: 0,
            pinned: true,
            top_armed: true,
            bottom_armed: true,
            signals: VecDeque::new(),
        }
    }

    /// Forget all position state, as for a freshly created container.
    pub fn reset(&mut self) {
        *self = Self::new(self.settings);
    }

    /// Number of rows that fit in the viewport.
    pub fn rows(&self) -> usize {
        let row_height = self.settings.row_height.max(1);
        (self.settings.viewport_height / row_height).max(1) as usize
    }

    pub fn set_viewport_height(&mut self, height: u32) {
        if height == self.settings.viewport_height {
            return;
        }
        self.settings.viewport_height = height;
        if self.pinned {
            self.top = self.max_top();
        } else {
            self.top = self.top.min(self.max_top());
        }
    }

    /// Size the viewport to hold `rows` rows at the estimated row height.
    pub fn fit_rows(&mut self, rows: u16) {
        let height = u32::from(rows) * self.settings.row_height.max(1);
        self.set_viewport_height(height);
    }

    pub fn top(&self) -> usize {
        self.top
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn is_pinned(&self) -> bool {
        self.pinned
    }

    /// Ranks currently on screen.
    pub fn visible_range(&self) -> Range<usize> {
        let end = (self.top + self.rows()).min(self.len);
        self.top.min(end)..end
    }

    /// Record a new container size.
    ///
    /// `anchor` is the new rank of the line that was first on screen before
    /// the mutation; the window follows it so content above the fold does
    /// not shift what the user is reading. While pinned, the window moves to
    /// the newest line instead.
    pub fn content_changed(&mut self, len: usize, anchor: Option<usize>) {
        let grew = len > self.len;
        self.len = len;

        if self.pinned {
            self.top = self.max_top();
            if grew {
                self.push_signal(ViewportSignal::ScrollToNewest);
            }
            return;
        }

        let target = anchor.unwrap_or(self.top).min(self.max_top());
        if target != self.top {
            self.top = target;
            self.push_signal(ViewportSignal::ScrollToRank(target));
        }
    }

    /// User scroll by a number of rows; negative is towards older lines.
    pub fn scroll_by(&mut self, delta: isize) {
        let target = if delta < 0 {
            self.top.saturating_sub(delta.unsigned_abs())
        } else {
            self.top.saturating_add(delta as usize)
        };
        self.scroll_to(target);
    }

    /// User scroll to an explicit rank.
    pub fn scroll_to(&mut self, rank: usize) {
        self.top = rank.min(self.max_top());
        self.pinned = self.within_pin_tolerance();
    }

    /// Re-pin and scroll to the newest line unconditionally.
    pub fn jump_to_newest(&mut self) {
        self.pinned = true;
        self.top = self.max_top();
        self.push_signal(ViewportSignal::ScrollToNewest);
    }

    /// Whether `edge` is within the margin and has not already fired.
    ///
    /// Moving out of the margin re-arms an edge.
    pub fn near_edge(&mut self, edge: Edge) -> bool {
        let margin = self.settings.edge_margin;
        match edge {
            Edge::Top => {
                let near = self.top <= margin;
                if !near {
                    self.top_armed = true;
                }
                near && self.top_armed
            }
            Edge::Bottom => {
                let near = self.top + self.rows() + margin >= self.len;
                if !near {
                    self.bottom_armed = true;
                }
                near && self.bottom_armed
            }
        }
    }

    /// Stop `edge` firing until it is re-armed.
    pub fn disarm(&mut self, edge: Edge) {
        match edge {
            Edge::Top => self.top_armed = false,
            Edge::Bottom => self.bottom_armed = false,
        }
    }

    /// Let `edge` fire again even without leaving the margin.
    pub fn rearm(&mut self, edge: Edge) {
        match edge {
            Edge::Top => self.top_armed = true,
            Edge::Bottom => self.bottom_armed = true,
        }
    }

    pub fn take_signals(&mut self) -> Vec<ViewportSignal> {
        self.signals.drain(..).collect()
    }

    fn max_top(&self) -> usize {
        self.len.saturating_sub(self.rows())
    }

    fn within_pin_tolerance(&self) -> bool {
        self.top + self.rows() + self.settings.pin_tolerance >= self.len
    }

    fn push_signal(&mut self, signal: ViewportSignal) {
        // Only the latest scroll request matters to the renderer.
        self.signals.clear();
        self.signals.push_back(signal);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn viewport(height: u32) -> ViewportController {
        ViewportController::new(ViewportSettings {
            viewport_height: height,
            ..ViewportSettings::default()
        })
    }

    #[test]
    fn test_pinned_by_default_and_follows_growth() {
        let mut vp = viewport(10);
        assert!(vp.is_pinned());
        vp.content_changed(25, None);
        assert_eq!(vp.visible_range(), 15..25);
        assert_eq!(vp.take_signals(), vec![ViewportSignal::ScrollToNewest]);

        vp.content_changed(26, None);
        assert_eq!(vp.visible_range(), 16..26);
    }

    #[test]
    fn test_short_content_shows_everything() {
        let mut vp = viewport(10);
        vp.content_changed(4, None);
        assert_eq!(vp.visible_range(), 0..4);
    }

    #[test]
    fn test_scrolling_away_unpins() {
        let mut vp = viewport(10);
        vp.content_changed(100, None);
        vp.scroll_by(-20);
        assert!(!vp.is_pinned());
        assert_eq!(vp.top(), 70);

        // Arrivals no longer move the window.
        vp.content_changed(110, None);
        assert_eq!(vp.top(), 70);

        vp.scroll_by(-1000);
        assert_eq!(vp.top(), 0);
    }

    #[test]
    fn test_scrolling_back_near_bottom_repins() {
        let mut vp = viewport(10);
        vp.content_changed(100, None);
        vp.scroll_by(-5);
        assert!(!vp.is_pinned());
        // Within one row of the newest line counts as the bottom.
        vp.scroll_by(4);
        assert!(vp.is_pinned());
    }

    #[test]
    fn test_jump_to_newest_repins() {
        let mut vp = viewport(10);
        vp.content_changed(100, None);
        vp.scroll_to(3);
        assert!(!vp.is_pinned());
        vp.take_signals();

        vp.jump_to_newest();
        assert!(vp.is_pinned());
        assert_eq!(vp.top(), 90);
        assert_eq!(vp.take_signals(), vec![ViewportSignal::ScrollToNewest]);
    }

    #[test]
    fn test_anchor_keeps_reading_position() {
        let mut vp = viewport(10);
        vp.content_changed(50, None);
        vp.scroll_to(20);
        // Thirty older lines landed above the line that was at rank 20.
        vp.content_changed(80, Some(50));
        assert_eq!(vp.top(), 50);
        assert_eq!(vp.take_signals(), vec![ViewportSignal::ScrollToRank(50)]);
    }

    #[test]
    fn test_edge_fires_once_until_rearmed() {
        let mut vp = viewport(10);
        vp.content_changed(100, None);
        vp.scroll_to(2);
        assert!(vp.near_edge(Edge::Top));
        vp.disarm(Edge::Top);
        assert!(!vp.near_edge(Edge::Top));
        assert!(!vp.near_edge(Edge::Top));

        vp.rearm(Edge::Top);
        assert!(vp.near_edge(Edge::Top));
    }

    #[test]
    fn test_leaving_margin_rearms_edge() {
        let mut vp = viewport(10);
        vp.content_changed(100, None);
        assert!(vp.near_edge(Edge::Bottom));
        vp.disarm(Edge::Bottom);

        vp.scroll_to(40);
        assert!(!vp.near_edge(Edge::Bottom));
        vp.jump_to_newest();
        assert!(vp.near_edge(Edge::Bottom));
    }

    #[test]
    fn test_row_height_scales_rows() {
        let vp = ViewportController::new(ViewportSettings {
            row_height: 20,
            viewport_height: 400,
            ..ViewportSettings::default()
        });
        assert_eq!(vp.rows(), 20);
    }
}
