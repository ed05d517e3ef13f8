use ratatui::style::{Color, Style};
use regex::{Regex, RegexBuilder};
use tracing::{debug, info};
use tui_textarea::TextArea;

use tideline::fetch::{FetchState, PageKind, PageOutcome, PageResponse};
use tideline::line::LogLine;
use tideline::live::{LiveEvent, LiveTailChannel};
use tideline::palette::InstancePalette;
use tideline::stream::{LogStream, StreamKey};
use tideline::theme::Theme;
use tideline::viewport::ViewportSignal;

/// Input mode for the application
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InputMode {
    /// Normal navigation mode
    Normal,
    /// Editing the search term
    SearchEditing,
}

/// Which panel has focus
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FocusedPanel {
    LogView,
    Instances,
}

/// State of the live connection as last reported by the channel
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LiveStatus {
    Connecting,
    Connected,
    Disconnected(String),
}

/// Main application state
pub struct AppState<'a> {
    pub stream: LogStream,
    pub live: LiveTailChannel,
    pub theme: Theme,
    pub palette: InstancePalette,
    /// Instances known to the session, in first-seen order
    pub instances: Vec<String>,
    /// Selected row in the instances panel
    pub selected_instance_idx: usize,
    /// Current input mode
    pub mode: InputMode,
    /// Search text input widget
    pub search_textarea: TextArea<'a>,
    /// Which panel currently has focus
    pub focused_panel: FocusedPanel,
    /// Whether side panel is visible
    pub show_side_panel: bool,
    /// Whether the app should quit
    pub should_quit: bool,
    /// Status message to display
    pub status_message: Option<String>,
    /// Whether to show help overlay
    pub show_help: bool,
    /// Whether to apply log level coloring (for lines without ANSI)
    pub level_colors_enabled: bool,
    pub live_status: LiveStatus,
    /// Live lines merged while the view was not following
    pub unseen: usize,
    /// Compiled form of the active search term, for highlighting
    pub search_highlight: Option<Regex>,
    has_connected: bool,
}

impl<'a> AppState<'a> {
    pub fn new(stream: LogStream, live: LiveTailChannel, theme: Theme) -> Self {
        let palette = InstancePalette::new(theme.instance_colors.clone());
        let key = stream.key().clone();

        let mut textarea = TextArea::default();
        if let Some(search) = &key.search {
            textarea.insert_str(search);
        }
        textarea.set_cursor_line_style(Style::default());
        textarea.set_placeholder_text("search this source...");
        textarea.set_placeholder_style(Style::default().fg(Color::DarkGray));

        let mut state = Self {
            stream,
            live,
            theme,
            palette,
            instances: Vec::new(),
            selected_instance_idx: 0,
            mode: InputMode::Normal,
            search_textarea: textarea,
            focused_panel: FocusedPanel::LogView,
            show_side_panel: true,
            should_quit: false,
            status_message: None,
            show_help: false,
            level_colors_enabled: true,
            live_status: LiveStatus::Connecting,
            unseen: 0,
            search_highlight: compile_highlight(key.search.as_deref()),
            has_connected: false,
        };
        for id in &key.instances {
            state.learn_instance(id);
        }
        state
    }

    /// Work that runs once per loop iteration, after events are applied.
    pub fn tick(&mut self) {
        if let Some(edge) = self.stream.drive() {
            debug!(?edge, "paging towards edge");
        }
        for signal in self.stream.viewport_mut().take_signals() {
            if signal == ViewportSignal::ScrollToNewest {
                self.unseen = 0;
            }
        }
    }

    /// Apply a completed page request.
    pub fn on_page(&mut self, response: PageResponse) {
        if response.generation == self.stream.generation() {
            if let Ok(lines) = &response.result {
                for line in lines {
                    self.learn_instance(line.instance_id());
                }
            }
        }

        match self.stream.on_page(response) {
            PageOutcome::Stale => {}
            PageOutcome::Loaded { .. } => {
                if self.stream.coordinator().error(PageKind::First).is_none() {
                    self.clear_fetch_error();
                }
            }
            PageOutcome::Exhausted(PageKind::Next) => {}
            PageOutcome::Exhausted(_) => {
                self.status_message = Some("Reached the beginning of history".to_string());
            }
            PageOutcome::Failed { kind, retryable } => {
                let what = match kind {
                    PageKind::First => "load logs",
                    PageKind::Previous => "load older lines",
                    PageKind::Next => "load newer lines",
                };
                let reason = self.stream.coordinator().error(kind).unwrap_or("unknown error");
                let hint = if retryable { " (r to retry)" } else { "" };
                self.status_message = Some(format!("Failed to {what}: {reason}{hint}"));
            }
        }
    }

    /// Apply an event from the live channel.
    pub fn on_live_event(&mut self, event: LiveEvent) {
        match event {
            LiveEvent::Connected => {
                if self.has_connected && self.stream.on_reconnected() {
                    info!("live channel reconnected, backfilling");
                }
                self.has_connected = true;
                self.live_status = LiveStatus::Connected;
            }
            LiveEvent::Disconnected { reason } => {
                self.live_status = LiveStatus::Disconnected(reason);
            }
            LiveEvent::Line(line) => self.push_live_line(line),
        }
    }

    fn push_live_line(&mut self, line: LogLine) {
        self.learn_instance(line.instance_id());
        let following = self.stream.viewport().is_pinned();
        if self.stream.on_live_line(line) && !following {
            self.unseen += 1;
        }
    }

    /// Add an instance to the roster and give it a colour.
    pub fn learn_instance(&mut self, id: &str) {
        if id.is_empty() || self.instances.iter().any(|known| known == id) {
            return;
        }
        self.instances.push(id.to_string());
        self.palette.color_for(id);
    }

    /// Whether an instance is shown under the current filter.
    pub fn is_instance_included(&self, id: &str) -> bool {
        let filter = &self.stream.key().instances;
        filter.is_empty() || filter.iter().any(|included| included == id)
    }

    /// Flip the selected instance in or out of the view.
    ///
    /// The scrollback is discarded because paged history was fetched under
    /// the old instance set.
    pub fn toggle_instance(&mut self, idx: usize) {
        let Some(id) = self.instances.get(idx).cloned() else {
            return;
        };
        let current = &self.stream.key().instances;
        let was_unfiltered = current.is_empty();
        let mut included: Vec<String> = if was_unfiltered {
            self.instances.clone()
        } else {
            current.clone()
        };

        if included.contains(&id) {
            included.retain(|i| i != &id);
            if included.is_empty() {
                // Excluding the last one means no filter at all.
                self.live.set_instances(Vec::<String>::new());
                self.status_message = Some("Showing all instances".to_string());
            } else if was_unfiltered {
                self.live.set_instances(included.clone());
                self.status_message = Some(format!("Hiding {id}"));
            } else {
                self.live.remove_subscription(&id);
                self.status_message = Some(format!("Hiding {id}"));
            }
        } else {
            included.push(id.clone());
            self.live.add_subscription(&id);
            self.status_message = Some(format!("Showing {id}"));
        }

        let key = self.stream.key().clone().with_instances(included);
        self.reset_stream(key);
    }

    /// Get the current search input text
    pub fn search_input(&self) -> String {
        self.search_textarea.lines().join(" ")
    }

    /// Apply the search input, starting the stream over if it changed.
    pub fn apply_search(&mut self) {
        self.mode = InputMode::Normal;
        let key = self.stream.key().clone().with_search(self.search_input());
        if key == *self.stream.key() {
            return;
        }
        self.search_highlight = compile_highlight(key.search.as_deref());
        self.status_message = Some(match &key.search {
            Some(term) => format!("Searching for \"{term}\""),
            None => "Search cleared".to_string(),
        });
        self.reset_stream(key);
    }

    /// Cancel search editing and restore the active term
    pub fn cancel_search(&mut self) {
        let prev = self.stream.key().search.clone().unwrap_or_default();
        self.search_textarea = TextArea::new(vec![prev]);
        self.search_textarea.set_cursor_line_style(Style::default());
        self.mode = InputMode::Normal;
    }

    /// Drop the active search term, if any.
    pub fn clear_search(&mut self) {
        if self.stream.key().search.is_none() {
            return;
        }
        self.search_textarea.select_all();
        self.search_textarea.cut();
        self.apply_search();
    }

    fn reset_stream(&mut self, key: StreamKey) {
        info!(source = %key.source_id, instances = ?key.instances, search = ?key.search, "resetting stream");
        self.stream.reset(Some(key));
        self.unseen = 0;
    }

    /// Re-issue whichever request last failed.
    pub fn retry(&mut self) {
        if self.stream.retry() {
            self.status_message = Some("Retrying...".to_string());
        } else {
            self.status_message = Some("Nothing to retry".to_string());
        }
    }

    fn clear_fetch_error(&mut self) {
        if self
            .status_message
            .as_deref()
            .is_some_and(|msg| msg.starts_with("Failed to"))
        {
            self.status_message = None;
        }
    }

    /// Toggle log level coloring
    pub fn toggle_level_colors(&mut self) {
        self.level_colors_enabled = !self.level_colors_enabled;
        self.status_message = Some(format!(
            "Level colors: {}",
            if self.level_colors_enabled { "on" } else { "off" }
        ));
    }

    /// Toggle side panel visibility
    pub fn toggle_side_panel(&mut self) {
        self.show_side_panel = !self.show_side_panel;
        if !self.show_side_panel {
            self.focused_panel = FocusedPanel::LogView;
        }
    }

    /// Cycle focus between panels
    pub fn cycle_focus(&mut self) {
        if !self.show_side_panel {
            return;
        }
        self.focused_panel = match self.focused_panel {
            FocusedPanel::LogView => FocusedPanel::Instances,
            FocusedPanel::Instances => FocusedPanel::LogView,
        };
    }

    pub fn select_next_instance(&mut self) {
        if self.selected_instance_idx + 1 < self.instances.len() {
            self.selected_instance_idx += 1;
        }
    }

    pub fn select_previous_instance(&mut self) {
        self.selected_instance_idx = self.selected_instance_idx.saturating_sub(1);
    }

    pub fn scroll_up(&mut self, rows: usize) {
        self.stream.viewport_mut().scroll_by(-(rows as isize));
    }

    pub fn scroll_down(&mut self, rows: usize) {
        self.stream.viewport_mut().scroll_by(rows as isize);
    }

    /// Go to the oldest loaded line; paging back starts from there.
    pub fn go_to_top(&mut self) {
        self.stream.viewport_mut().scroll_to(0);
    }

    /// Go to the newest line and follow new arrivals
    pub fn go_to_bottom(&mut self) {
        self.stream.jump_to_newest();
    }

    pub fn page_size(&self) -> usize {
        self.stream.viewport().rows().saturating_sub(1).max(1)
    }

    /// Short label for the request in flight, if any
    pub fn fetch_label(&self) -> Option<&'static str> {
        match self.stream.fetch_state() {
            FetchState::Initial => Some("loading"),
            FetchState::FetchingPrevious => Some("loading older"),
            FetchState::FetchingNext => Some("loading newer"),
            FetchState::Idle => None,
        }
    }

    /// Tear down the session.
    pub fn shutdown(&mut self) {
        self.live.close();
        self.palette.clear();
    }
}

/// Case-insensitive literal matcher for highlighting the search term.
pub fn compile_highlight(term: Option<&str>) -> Option<Regex> {
    let term = term?.trim();
    if term.is_empty() {
        return None;
    }
    RegexBuilder::new(&regex::escape(term))
        .case_insensitive(true)
        .build()
        .ok()
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::Mutex;
    use std::time::Duration;

    use tokio::sync::mpsc;

    use tideline::error::FetchError;
    use tideline::fetch::{HistoryService, PageQuery};
    use tideline::line::SourceInstance;
    use tideline::live::{Backoff, LiveConfig, Subscriptions};
    use tideline::stream::StreamSettings;
    use tideline::viewport::ViewportSettings;

    use super::*;

    /// History that serves the same page to every request and records queries.
    struct FixedHistory {
        page: Vec<LogLine>,
        queries: Mutex<Vec<PageQuery>>,
    }

    #[async_trait::async_trait]
    impl HistoryService for FixedHistory {
        async fn fetch_page(&self, query: &PageQuery) -> Result<Vec<LogLine>, FetchError> {
            self.queries.lock().unwrap().push(query.clone());
            if query.cursor.is_some() {
                return Ok(Vec::new());
            }
            Ok(self.page.clone())
        }
    }

    fn log_line(id: &str, ts: i64, instance: &str) -> LogLine {
        LogLine {
            id: id.to_string(),
            timestamp: ts,
            sequence_number: 0,
            content: format!("INFO request {id}"),
            source: SourceInstance {
                id: instance.to_string(),
                address: String::new(),
            },
        }
    }

    async fn app(
        page: Vec<LogLine>,
    ) -> (AppState<'static>, Arc<FixedHistory>, mpsc::UnboundedReceiver<PageResponse>) {
        let history = Arc::new(FixedHistory {
            page,
            queries: Mutex::new(Vec::new()),
        });
        let (tx, mut rx) = mpsc::unbounded_channel();
        let settings = StreamSettings {
            recent_capacity: 10,
            viewport: ViewportSettings {
                viewport_height: 5,
                ..ViewportSettings::default()
            },
        };
        let mut stream = LogStream::new(history.clone(), tx, StreamKey::new("billing"), settings);
        stream.start();

        let live_config = LiveConfig {
            url: "ws://127.0.0.1:9/ws/billing".to_string(),
            heartbeat: Duration::from_secs(60),
            backoff: Backoff {
                min: Duration::from_secs(60),
                max: Duration::from_secs(60),
            },
        };
        let (live, _events) = LiveTailChannel::open(live_config, Subscriptions::new());
        let mut state = AppState::new(stream, live, Theme::default());

        let first = rx.recv().await.unwrap();
        state.on_page(first);
        (state, history, rx)
    }

    #[tokio::test]
    async fn test_first_page_builds_roster() {
        let page = vec![log_line("a", 1, "api-1"), log_line("b", 2, "api-2"), log_line("c", 3, "api-1")];
        let (mut state, _history, _rx) = app(page).await;
        assert_eq!(state.instances, vec!["api-1".to_string(), "api-2".to_string()]);
        assert!(state.palette.peek("api-2").is_some());
        assert!(state.is_instance_included("api-1"));
        state.shutdown();
        assert!(state.live.is_closed());
    }

    #[tokio::test]
    async fn test_live_lines_counted_while_scrolled_away() {
        let page: Vec<LogLine> = (0..20).map(|i| log_line(&format!("l{i}"), i, "api-1")).collect();
        let (mut state, _history, _rx) = app(page).await;
        state.tick();

        state.go_to_top();
        state.on_live_event(LiveEvent::Line(log_line("new", 100, "api-1")));
        assert_eq!(state.unseen, 1);

        state.go_to_bottom();
        state.tick();
        assert_eq!(state.unseen, 0);
    }

    #[tokio::test]
    async fn test_toggle_instance_restarts_with_filter() {
        let page = vec![log_line("a", 1, "api-1"), log_line("b", 2, "api-2")];
        let (mut state, history, mut rx) = app(page).await;
        let before = state.stream.generation();

        state.toggle_instance(0);
        assert_eq!(state.stream.key().instances, vec!["api-2".to_string()]);
        assert!(!state.is_instance_included("api-1"));
        assert!(state.stream.generation() > before);
        assert!(state.live.subscriptions().is_included("api-2"));
        assert!(!state.live.subscriptions().is_included("api-1"));

        let response = rx.recv().await.unwrap();
        state.on_page(response);
        let last = history.queries.lock().unwrap().last().cloned().unwrap();
        assert_eq!(last.instances, vec!["api-2".to_string()]);
    }

    #[tokio::test]
    async fn test_apply_search_resets_and_highlights() {
        let (mut state, _history, _rx) = app(vec![log_line("a", 1, "api-1")]).await;
        let before = state.stream.generation();
        state.search_textarea.insert_str("Timeout");
        state.apply_search();

        assert_eq!(state.stream.key().search.as_deref(), Some("Timeout"));
        assert!(state.stream.generation() > before);
        assert!(state.search_highlight.as_ref().unwrap().is_match("upstream TIMEOUT"));

        // Same term again is a no-op.
        let current = state.stream.generation();
        state.apply_search();
        assert_eq!(state.stream.generation(), current);
    }

    #[test]
    fn test_highlight_escapes_term() {
        let re = compile_highlight(Some("a.b")).unwrap();
        assert!(re.is_match("xA.By"));
        assert!(!re.is_match("axb"));
        assert!(compile_highlight(Some("  ")).is_none());
    }
}
