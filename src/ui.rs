use ansi_to_tui::IntoText;
use chrono::{DateTime, Local};
use ratatui::{
    Frame,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Clear, List, ListItem, Paragraph, Scrollbar, ScrollbarOrientation, ScrollbarState},
};
use regex::Regex;

use tideline::line::{LogLevel, LogLine};
use tideline::theme::Theme;

use crate::app::{AppState, FocusedPanel, InputMode, LiveStatus};

const SIDE_PANEL_WIDTH: u16 = 32;

/// Draw the entire UI
pub fn draw(frame: &mut Frame, state: &mut AppState) {
    // Main layout: optional side panel + main content
    let main_chunks = if state.show_side_panel {
        Layout::default()
            .direction(Direction::Horizontal)
            .constraints([
                Constraint::Length(SIDE_PANEL_WIDTH),
                Constraint::Min(20),
            ])
            .split(frame.area())
    } else {
        Layout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Min(20)])
            .split(frame.area())
    };

    if state.show_side_panel {
        draw_side_panel(frame, state, main_chunks[0]);
    }

    let content_area = if state.show_side_panel { main_chunks[1] } else { main_chunks[0] };

    let content_chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(1),  // Header
            Constraint::Min(3),     // Log view
            Constraint::Length(1),  // Status bar
            Constraint::Length(1),  // Search bar
        ])
        .split(content_area);

    draw_header(frame, state, content_chunks[0]);
    draw_log_view(frame, state, content_chunks[1]);
    draw_status_bar(frame, state, content_chunks[2]);
    draw_search_bar(frame, state, content_chunks[3]);

    if state.show_help {
        draw_help_overlay(frame, &state.theme);
    }
}

/// Draw the side panel with the instance roster and recent activity
fn draw_side_panel(frame: &mut Frame, state: &mut AppState, area: Rect) {
    let roster_height = (state.instances.len() as u16 + 2).clamp(3, area.height / 2);
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(roster_height),
            Constraint::Min(3),
        ])
        .split(area);

    draw_instances_panel(frame, state, chunks[0]);
    draw_recent_panel(frame, state, chunks[1]);
}

fn panel_border(theme: &Theme, focused: bool) -> Style {
    if focused {
        Style::default().fg(theme.border_focused)
    } else {
        Style::default().fg(theme.border_unfocused)
    }
}

/// Draw the instance list with inclusion marks
fn draw_instances_panel(frame: &mut Frame, state: &mut AppState, area: Rect) {
    let focused = state.focused_panel == FocusedPanel::Instances;
    let block = Block::default()
        .title(" Instances ")
        .borders(Borders::ALL)
        .border_style(panel_border(&state.theme, focused));

    if state.instances.is_empty() {
        let msg = Paragraph::new("  (none yet)")
            .style(Style::default().fg(state.theme.empty_state))
            .block(block);
        frame.render_widget(msg, area);
        return;
    }

    let items: Vec<ListItem> = state
        .instances
        .iter()
        .enumerate()
        .map(|(i, id)| {
            let prefix = if focused && i == state.selected_instance_idx { "▶ " } else { "  " };
            let mark = if state.is_instance_included(id) { "[x] " } else { "[ ] " };
            let color = state.palette.peek(id).unwrap_or(Color::Reset);
            ListItem::new(Line::from(vec![
                Span::raw(prefix),
                Span::raw(mark),
                Span::styled(id.clone(), Style::default().fg(color)),
            ]))
        })
        .collect();

    let list = List::new(items).block(block);
    frame.render_widget(list, area);
}

/// Draw the newest lines, newest first, independent of the scroll position
fn draw_recent_panel(frame: &mut Frame, state: &mut AppState, area: Rect) {
    let block = Block::default()
        .title(" Recent ")
        .borders(Borders::ALL)
        .border_style(panel_border(&state.theme, false));
    let inner_height = block.inner(area).height as usize;

    let recent: Vec<&LogLine> = state.stream.recent().iter().take(inner_height).collect();
    if recent.is_empty() {
        let msg = Paragraph::new("  (quiet)")
            .style(Style::default().fg(state.theme.empty_state))
            .block(block);
        frame.render_widget(msg, area);
        return;
    }

    let items: Vec<ListItem> = recent
        .into_iter()
        .map(|line| {
            let color = state.palette.peek(line.instance_id()).unwrap_or(Color::Reset);
            ListItem::new(Line::from(vec![
                Span::styled(format_time(line.timestamp), Style::default().fg(state.theme.timestamp)),
                Span::raw(" "),
                Span::styled(line.content.clone(), Style::default().fg(color)),
            ]))
        })
        .collect();

    let list = List::new(items).block(block);
    frame.render_widget(list, area);
}

/// Draw the header showing the source, filters and connection
fn draw_header(frame: &mut Frame, state: &AppState, area: Rect) {
    let theme = &state.theme;
    let key = state.stream.key();

    let mut spans = vec![
        Span::styled(" tide ", Style::default().fg(theme.header_title).add_modifier(Modifier::BOLD)),
        Span::raw("| "),
        Span::styled(key.source_id.clone(), Style::default().fg(theme.header_source)),
    ];
    if let Some(search) = &key.search {
        spans.push(Span::raw(format!(" | search: {search}")));
    }
    if !key.instances.is_empty() {
        spans.push(Span::raw(format!(" | {} instance(s)", key.instances.len())));
    }

    let (dot, label, color) = match &state.live_status {
        LiveStatus::Connected => ("●", "live".to_string(), theme.live_connected),
        LiveStatus::Connecting => ("○", "connecting".to_string(), theme.live_disconnected),
        LiveStatus::Disconnected(reason) => ("○", format!("reconnecting ({reason})"), theme.live_disconnected),
    };
    spans.push(Span::raw(" | "));
    spans.push(Span::styled(format!("{dot} {label}"), Style::default().fg(color)));

    let header = Paragraph::new(Line::from(spans)).style(Style::default().bg(theme.header_bg));
    frame.render_widget(header, area);
}

/// Draw the main log view
fn draw_log_view(frame: &mut Frame, state: &mut AppState, area: Rect) {
    let focused = state.focused_panel == FocusedPanel::LogView;
    let block = Block::default()
        .borders(if state.show_side_panel { Borders::LEFT } else { Borders::NONE })
        .border_style(panel_border(&state.theme, focused && state.show_side_panel));

    let inner = block.inner(area);
    frame.render_widget(block, area);

    if inner.height == 0 {
        return;
    }
    state.stream.viewport_mut().fit_rows(inner.height);

    let total = state.stream.lines().len();
    if total == 0 {
        let msg = match state.fetch_label() {
            Some(_) => Paragraph::new("Loading history...").style(Style::default().fg(state.theme.empty_state)),
            None if state.stream.key().search.is_some() => {
                Paragraph::new("No lines match the current search")
                    .style(Style::default().fg(state.theme.warning_message))
            }
            None => Paragraph::new("Waiting for log lines...").style(Style::default().fg(state.theme.empty_state)),
        };
        frame.render_widget(msg, inner);
        return;
    }

    // Only the visible window is rendered.
    let range = state.stream.viewport().visible_range();
    let top = range.start;
    let rows: Vec<LogLine> = state.stream.lines().range(range).cloned().collect();

    let mut lines_content: Vec<Line<'static>> = Vec::with_capacity(inner.height as usize);
    for line in &rows {
        let color = state.palette.color_for(line.instance_id());
        lines_content.push(render_line(
            line,
            &state.theme,
            color,
            state.level_colors_enabled,
            state.search_highlight.as_ref(),
        ));
    }

    frame.render_widget(Paragraph::new(lines_content), inner);

    if total > inner.height as usize {
        let scrollbar = Scrollbar::new(ScrollbarOrientation::VerticalRight)
            .begin_symbol(Some("▲"))
            .end_symbol(Some("▼"));
        let mut scrollbar_state = ScrollbarState::new(total).position(top);
        frame.render_stateful_widget(scrollbar, area, &mut scrollbar_state);
    }
}

/// One log line: timestamp, instance and content.
pub fn render_line(
    line: &LogLine,
    theme: &Theme,
    instance_color: Color,
    level_colors: bool,
    highlight: Option<&Regex>,
) -> Line<'static> {
    let mut spans = vec![
        Span::styled(format_time(line.timestamp), Style::default().fg(theme.timestamp)),
        Span::raw(" "),
        Span::styled(format!("{:<12}", line.instance_id()), Style::default().fg(instance_color)),
        Span::raw(" "),
    ];

    let highlight_style = Style::default()
        .bg(theme.highlight_match_bg)
        .fg(theme.highlight_match_fg);

    if line.content.contains('\x1b') {
        // Line carries its own colours; keep them and skip highlighting.
        match line.content.as_bytes().into_text() {
            Ok(text) => {
                for text_line in text.lines {
                    spans.extend(text_line.spans);
                }
            }
            Err(_) => spans.push(Span::raw(line.content.clone())),
        }
        return Line::from(spans);
    }

    let base = match (level_colors, line.level()) {
        (true, level) if level != LogLevel::None => theme
            .level_color(level)
            .map(|color| Style::default().fg(color))
            .unwrap_or_default(),
        _ => Style::default(),
    };

    match highlight {
        Some(re) => spans.extend(highlight_spans(&line.content, base, re, highlight_style)),
        None => spans.push(Span::styled(line.content.clone(), base)),
    }
    Line::from(spans)
}

/// Split `text` into spans, styling each match of `re` with `highlight`.
pub fn highlight_spans(text: &str, base: Style, re: &Regex, highlight: Style) -> Vec<Span<'static>> {
    let mut spans = Vec::new();
    let mut last = 0;
    for m in re.find_iter(text) {
        if m.start() > last {
            spans.push(Span::styled(text[last..m.start()].to_string(), base));
        }
        spans.push(Span::styled(m.as_str().to_string(), highlight));
        last = m.end();
    }
    if last < text.len() || spans.is_empty() {
        spans.push(Span::styled(text[last..].to_string(), base));
    }
    spans
}

fn format_time(millis: i64) -> String {
    match DateTime::from_timestamp_millis(millis) {
        Some(time) => time.with_timezone(&Local).format("%H:%M:%S%.3f").to_string(),
        None => millis.to_string(),
    }
}

/// Draw the status bar
fn draw_status_bar(frame: &mut Frame, state: &AppState, area: Rect) {
    let theme = &state.theme;
    let viewport = state.stream.viewport();
    let total = state.stream.lines().len();
    let visible = viewport.visible_range();

    let mode_str = match state.mode {
        InputMode::Normal => "NORMAL",
        InputMode::SearchEditing => "SEARCH",
    };

    let position = if total == 0 {
        "0 lines".to_string()
    } else {
        format!("{}-{}/{} lines", visible.start + 1, visible.end, total)
    };

    let mut indicators = Vec::new();
    if viewport.is_pinned() {
        indicators.push("[F]".to_string());
    }
    if state.level_colors_enabled {
        indicators.push("[C]".to_string());
    }
    if state.unseen > 0 {
        indicators.push(format!("↓ {} new", state.unseen));
    }
    if let Some(label) = state.fetch_label() {
        indicators.push(format!("{label}..."));
    }
    let indicators_str = if indicators.is_empty() {
        String::new()
    } else {
        format!(" {}", indicators.join(" "))
    };

    let help_text = match state.mode {
        InputMode::SearchEditing => " Enter:search  Esc:cancel ",
        InputMode::Normal => " ?:help  /:search  G:follow ",
    };

    let status = Line::from(vec![
        Span::styled(
            format!(" {} ", mode_str),
            Style::default().bg(theme.status_mode_bg).fg(theme.status_mode_fg),
        ),
        Span::raw(format!(" {}{} ", position, indicators_str)),
        Span::styled(help_text, Style::default().fg(theme.status_help)),
    ]);

    let paragraph = Paragraph::new(status).style(Style::default().bg(theme.status_bg));
    frame.render_widget(paragraph, area);
}

/// Draw the search input bar, or the status message when not editing
fn draw_search_bar(frame: &mut Frame, state: &mut AppState, area: Rect) {
    match state.mode {
        InputMode::SearchEditing => {
            let chunks = Layout::default()
                .direction(Direction::Horizontal)
                .constraints([
                    Constraint::Length(1),  // "/" prefix
                    Constraint::Min(1),     // textarea
                ])
                .split(area);

            let prefix = Paragraph::new("/").style(Style::default().fg(state.theme.warning_message));
            frame.render_widget(prefix, chunks[0]);
            frame.render_widget(&state.search_textarea, chunks[1]);
        }
        InputMode::Normal => {
            if let Some(msg) = &state.status_message {
                let color = if msg.starts_with("Failed") {
                    state.theme.error_message
                } else {
                    state.theme.warning_message
                };
                let content = Line::from(Span::styled(msg.as_str(), Style::default().fg(color)));
                frame.render_widget(Paragraph::new(content), area);
            }
        }
    }
}

/// Draw the help overlay
fn draw_help_overlay(frame: &mut Frame, theme: &Theme) {
    let area = frame.area();

    let width = 50.min(area.width.saturating_sub(4));
    let height = 24.min(area.height.saturating_sub(4));
    let x = (area.width - width) / 2;
    let y = (area.height - height) / 2;
    let help_area = Rect::new(x, y, width, height);

    frame.render_widget(Clear, help_area);

    let help_text = vec![
        Line::from(Span::styled("Keyboard Shortcuts", Style::default().add_modifier(Modifier::BOLD))),
        Line::from(""),
        Line::from("Navigation:"),
        Line::from("  j/k, ↑/↓     Scroll up/down"),
        Line::from("  PgUp/PgDn    Page up/down"),
        Line::from("  g            Oldest loaded line"),
        Line::from("  G/End        Newest line, follow"),
        Line::from("  Mouse wheel  Scroll"),
        Line::from(""),
        Line::from("Stream:"),
        Line::from("  /            Search this source"),
        Line::from("  Esc          Clear search"),
        Line::from("  Space/Enter  Toggle selected instance"),
        Line::from("  r            Retry failed request"),
        Line::from(""),
        Line::from("Display:"),
        Line::from("  c            Toggle level colors"),
        Line::from("  b            Toggle side panel"),
        Line::from("  Tab          Cycle panel focus"),
        Line::from("  ?            Toggle this help"),
        Line::from("  q            Quit"),
    ];

    let block = Block::default()
        .title(" Help ")
        .borders(Borders::ALL)
        .border_style(Style::default().fg(theme.help_border))
        .style(Style::default().bg(theme.help_bg));

    let paragraph = Paragraph::new(help_text).block(block);
    frame.render_widget(paragraph, help_area);
}
