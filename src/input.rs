use crossterm::event::{KeyCode, KeyEvent, KeyModifiers, MouseEvent, MouseEventKind};
use tui_textarea::Input;

use crate::app::{AppState, FocusedPanel, InputMode};

const WHEEL_ROWS: usize = 3;

/// Handle a mouse event
pub fn handle_mouse(state: &mut AppState, mouse: MouseEvent) {
    match mouse.kind {
        MouseEventKind::ScrollUp => state.scroll_up(WHEEL_ROWS),
        MouseEventKind::ScrollDown => state.scroll_down(WHEEL_ROWS),
        _ => {}
    }
}

/// Handle a key event and update app state accordingly
pub fn handle_key(state: &mut AppState, key: KeyEvent, page_size: usize) {
    // Help overlay takes priority
    if state.show_help {
        if matches!(key.code, KeyCode::Esc | KeyCode::Char('q') | KeyCode::Char('?')) {
            state.show_help = false;
        }
        return;
    }

    match state.mode {
        InputMode::Normal => handle_normal_mode(state, key, page_size),
        InputMode::SearchEditing => handle_search_mode(state, key),
    }
}

fn handle_normal_mode(state: &mut AppState, key: KeyEvent, page_size: usize) {
    match key.code {
        // Quit
        KeyCode::Char('q') => {
            state.should_quit = true;
        }
        // Ctrl+C also quits
        KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => {
            state.should_quit = true;
        }

        // Help
        KeyCode::Char('?') => {
            state.show_help = true;
        }

        // Toggle side panel
        KeyCode::Char('b') => {
            state.toggle_side_panel();
        }

        // Cycle focus between panels
        KeyCode::Tab => {
            state.cycle_focus();
        }

        // Navigation (context-dependent on focused panel)
        KeyCode::Char('j') | KeyCode::Down => match state.focused_panel {
            FocusedPanel::LogView => state.scroll_down(1),
            FocusedPanel::Instances => state.select_next_instance(),
        },
        KeyCode::Char('k') | KeyCode::Up => match state.focused_panel {
            FocusedPanel::LogView => state.scroll_up(1),
            FocusedPanel::Instances => state.select_previous_instance(),
        },

        // Include or exclude the selected instance
        KeyCode::Char(' ') | KeyCode::Enter if state.focused_panel == FocusedPanel::Instances => {
            state.toggle_instance(state.selected_instance_idx);
        }

        // Paging
        KeyCode::PageDown => state.scroll_down(page_size),
        KeyCode::Char('d') if key.modifiers.contains(KeyModifiers::CONTROL) => {
            state.scroll_down(page_size);
        }
        KeyCode::PageUp => state.scroll_up(page_size),
        KeyCode::Char('u') if key.modifiers.contains(KeyModifiers::CONTROL) => {
            state.scroll_up(page_size);
        }
        // Oldest loaded line
        KeyCode::Char('g') | KeyCode::Home => {
            state.go_to_top();
        }
        // Newest line, follow again
        KeyCode::Char('G') | KeyCode::End => {
            state.go_to_bottom();
        }

        // Enter search mode
        KeyCode::Char('/') => {
            state.mode = InputMode::SearchEditing;
            state.focused_panel = FocusedPanel::LogView;
        }

        // Retry the failed page request
        KeyCode::Char('r') => {
            state.retry();
        }

        // Toggle level colors
        KeyCode::Char('c') => {
            state.toggle_level_colors();
        }

        // Clear search
        KeyCode::Esc => {
            state.clear_search();
        }

        _ => {}
    }
}

fn handle_search_mode(state: &mut AppState, key: KeyEvent) {
    match key.code {
        KeyCode::Enter => {
            state.apply_search();
        }
        KeyCode::Esc => {
            state.cancel_search();
        }
        _ => {
            // The term goes to the server, so nothing applies until Enter.
            state.search_textarea.input(Input::from(key));
        }
    }
}
