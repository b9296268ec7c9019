use anyhow::Result;
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers, MouseEvent, MouseEventKind};
use crate::app::{App, InputMode};
use crate::tui::AppEvent;

/// Convert a character index to a byte index for UTF-8 safe string operations
fn char_to_byte_index(s: &str, char_idx: usize) -> usize {
    s.char_indices()
        .nth(char_idx)
        .map(|(i, _)| i)
        .unwrap_or(s.len())
}

pub fn handle_event(app: &mut App, event: AppEvent) -> Result<()> {
    match event {
        AppEvent::Key(key) => handle_key(app, key),
        AppEvent::Mouse(mouse) => handle_mouse(app, mouse),
        AppEvent::Resize(_, _) => {}
        AppEvent::Tick => app.tick_animation(),
        AppEvent::Stream(event) => app.on_stream_event(event),
        AppEvent::Upload(result) => app.on_upload_finished(result),
        AppEvent::Health(result) => app.set_health(result),
    }
    Ok(())
}

fn handle_key(app: &mut App, key: KeyEvent) {
    let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);

    // Global keys that work in any mode
    match key.code {
        KeyCode::Char('c') | KeyCode::Char('q') if ctrl => {
            app.should_quit = true;
            return;
        }
        KeyCode::Char('l') if ctrl => {
            app.clear();
            return;
        }
        KeyCode::PageUp => {
            app.scroll_up(app.page());
            return;
        }
        KeyCode::PageDown => {
            app.scroll_down(app.page());
            return;
        }
        _ => {}
    }

    match app.input_mode {
        InputMode::Message => handle_message_key(app, key),
        InputMode::FilePath => handle_path_key(app, key),
    }
}

fn handle_message_key(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Char('o') if key.modifiers.contains(KeyModifiers::CONTROL) => {
            app.input_mode = InputMode::FilePath;
        }
        KeyCode::Enter => app.send_message(),
        KeyCode::Esc => app.chat.dismiss_error(),
        _ => edit_line(&mut app.chat.input, &mut app.cursor, key),
    }
}

fn handle_path_key(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Enter => app.start_upload(),
        KeyCode::Esc => {
            app.input_mode = InputMode::Message;
            app.path_input.clear();
            app.path_cursor = 0;
        }
        _ => edit_line(&mut app.path_input, &mut app.path_cursor, key),
    }
}

/// Single-line editing shared by the message and path inputs
fn edit_line(text: &mut String, cursor: &mut usize, key: KeyEvent) {
    match key.code {
        KeyCode::Char(c) if !key.modifiers.contains(KeyModifiers::CONTROL) => {
            let byte_pos = char_to_byte_index(text, *cursor);
            text.insert(byte_pos, c);
            *cursor += 1;
        }
        KeyCode::Backspace => {
            if *cursor > 0 {
                *cursor -= 1;
                let byte_pos = char_to_byte_index(text, *cursor);
                text.remove(byte_pos);
            }
        }
        KeyCode::Delete => {
            if *cursor < text.chars().count() {
                let byte_pos = char_to_byte_index(text, *cursor);
                text.remove(byte_pos);
            }
        }
        KeyCode::Left => *cursor = cursor.saturating_sub(1),
        KeyCode::Right => *cursor = (*cursor + 1).min(text.chars().count()),
        KeyCode::Home => *cursor = 0,
        KeyCode::End => *cursor = text.chars().count(),
        _ => {}
    }
}

fn handle_mouse(app: &mut App, mouse: MouseEvent) {
    match mouse.kind {
        MouseEventKind::ScrollUp => app.scroll_up(3),
        MouseEventKind::ScrollDown => app.scroll_down(3),
        _ => {}
    }
}
