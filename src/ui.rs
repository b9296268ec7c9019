use ratatui::{
    Frame,
    layout::{Constraint, Layout, Rect},
    style::{Color, Modifier, Style, Stylize},
    text::{Line, Span, Text},
    widgets::{Block, Borders, Paragraph, Wrap},
};
use crate::app::{App, BackendStatus, InputMode};
use crate::transcript::ChatRole;

/// Style `**bold**` runs; an unmatched `**` is kept literally
fn parse_markdown_line(text: &str) -> Line<'static> {
    let parts: Vec<&str> = text.split("**").collect();
    // An even number of parts means the last marker never closed
    let closed = parts.len() % 2 == 1;
    let last = parts.len() - 1;

    let mut spans = Vec::with_capacity(parts.len());
    for (i, part) in parts.iter().enumerate() {
        let bold = i % 2 == 1 && (closed || i != last);
        if part.is_empty() {
            continue;
        }
        if bold {
            spans.push(Span::styled(
                part.to_string(),
                Style::default().add_modifier(Modifier::BOLD),
            ));
        } else if i % 2 == 1 {
            spans.push(Span::raw(format!("**{part}")));
        } else {
            spans.push(Span::raw(part.to_string()));
        }
    }

    Line::from(spans)
}

pub fn render(app: &mut App, frame: &mut Frame) {
    let banner_height = if app.chat.error_text().is_some() { 3 } else { 0 };

    let [header_area, banner_area, chat_area, input_area, help_area] = Layout::vertical([
        Constraint::Length(3),
        Constraint::Length(banner_height),
        Constraint::Min(0),
        Constraint::Length(3),
        Constraint::Length(1),
    ])
    .areas(frame.area());

    render_header(app, frame, header_area);
    if let Some(error) = app.chat.error_text() {
        let banner = Paragraph::new(format!("⚠️ {error}"))
            .style(Style::default().fg(Color::Red))
            .block(
                Block::default()
                    .borders(Borders::ALL)
                    .border_style(Style::default().fg(Color::Red))
                    .title(" Error (Esc to dismiss) "),
            );
        frame.render_widget(banner, banner_area);
    }
    render_transcript(app, frame, chat_area);
    render_input(app, frame, input_area);
    render_help(app, frame, help_area);
}

fn render_header(app: &App, frame: &mut Frame, area: Rect) {
    let status = match &app.backend_status {
        BackendStatus::Checking => Span::styled("checking…", Style::default().fg(Color::DarkGray)),
        BackendStatus::Online => Span::styled("online", Style::default().fg(Color::Green)),
        BackendStatus::Offline(reason) => {
            Span::styled(format!("offline ({reason})"), Style::default().fg(Color::Red))
        }
    };

    let pdf = match app.chat.pdf_name() {
        Some(name) if app.uploading => {
            let dots = ".".repeat((app.animation_frame as usize) + 1);
            Span::styled(format!("Uploading {name}{dots}"), Style::default().fg(Color::Yellow))
        }
        Some(name) => Span::styled(format!("✅ PDF loaded: {name}"), Style::default().fg(Color::Green)),
        None => Span::styled("No PDF loaded (Ctrl+O)", Style::default().fg(Color::DarkGray)),
    };

    let line = Line::from(vec![
        pdf,
        Span::raw("   "),
        Span::styled(app.backend.base_url().to_string(), Style::default().fg(Color::DarkGray)),
        Span::raw(" "),
        status,
    ]);

    let header = Paragraph::new(line).block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::Blue))
            .title(" 🧠 AI PDF Assistant ".bold()),
    );
    frame.render_widget(header, area);
}

fn render_transcript(app: &mut App, frame: &mut Frame, area: Rect) {
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::DarkGray))
        .title(" Chat ");

    let chat = Paragraph::new(transcript_text(app)).wrap(Wrap { trim: false });

    // Measure with the same wrapper that renders, inside the borders
    let inner = block.inner(area);
    app.chat_height = inner.height;
    app.content_lines = chat.line_count(inner.width).min(u16::MAX as usize) as u16;
    if app.follow {
        app.scroll_to_bottom();
    }

    frame.render_widget(chat.block(block).scroll((app.scroll, 0)), area);
}

fn transcript_text(app: &App) -> Text<'static> {
    let transcript = app.chat.transcript();
    if transcript.is_empty() && !app.chat.is_loading() {
        return Text::from(Span::styled(
            "Load a PDF with Ctrl+O, then ask something about it...",
            Style::default().fg(Color::DarkGray),
        ));
    }

    let mut lines: Vec<Line> = Vec::new();

    for msg in transcript.messages() {
        let (label, color) = match msg.role {
            ChatRole::User => ("You:", Color::Cyan),
            ChatRole::Assistant => ("Assistant:", Color::Yellow),
            ChatRole::System => ("System:", Color::Magenta),
        };
        lines.push(Line::from(Span::styled(
            label,
            Style::default().fg(color).add_modifier(Modifier::BOLD),
        )));

        for line in msg.content.lines() {
            match msg.role {
                ChatRole::Assistant => lines.push(parse_markdown_line(line)),
                ChatRole::System => lines.push(Line::from(Span::styled(
                    line.to_string(),
                    Style::default().fg(Color::Magenta),
                ))),
                ChatRole::User => lines.push(Line::from(line.to_string())),
            }
        }
        lines.push(Line::default());
    }

    if app.chat.is_loading() {
        // Animated ellipsis: cycles through ".", "..", "..."
        let dots = ".".repeat((app.animation_frame as usize) + 1);
        lines.push(Line::from(Span::styled(
            format!("Assistant is typing{dots}"),
            Style::default().fg(Color::DarkGray).add_modifier(Modifier::ITALIC),
        )));
        lines.push(Line::default());
    }

    Text::from(lines)
}

fn render_input(app: &App, frame: &mut Frame, area: Rect) {
    let (text, cursor, title, color) = match app.input_mode {
        InputMode::Message => (
            &app.chat.input,
            app.cursor,
            if app.chat.is_loading() {
                " Ask (waiting for answer…) "
            } else {
                " Ask something about the PDF "
            },
            Color::Cyan,
        ),
        InputMode::FilePath => (
            &app.path_input,
            app.path_cursor,
            " PDF path (Enter to upload, Esc to cancel) ",
            Color::Yellow,
        ),
    };

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(color))
        .title(title);

    // Horizontal scroll keeps the cursor visible
    let inner_width = area.width.saturating_sub(2) as usize;
    let scroll_offset = if inner_width == 0 {
        0
    } else if cursor >= inner_width {
        cursor - inner_width + 1
    } else {
        0
    };

    let visible_text: String = text.chars().skip(scroll_offset).take(inner_width).collect();
    let input = Paragraph::new(visible_text)
        .style(Style::default().fg(color))
        .block(block);
    frame.render_widget(input, area);

    let cursor_x = (cursor - scroll_offset) as u16;
    frame.set_cursor_position((area.x + cursor_x + 1, area.y + 1));
}

fn render_help(app: &App, frame: &mut Frame, area: Rect) {
    let hints = match app.input_mode {
        InputMode::Message => "Enter send · Ctrl+O load PDF · Ctrl+L clear · PgUp/PgDn scroll · Ctrl+C quit",
        InputMode::FilePath => "Enter upload · Esc cancel",
    };
    frame.render_widget(
        Paragraph::new(Span::styled(hints, Style::default().fg(Color::DarkGray))),
        area,
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::BackendClient;
    use crate::test_support::{content, ScriptedBackend};
    use ratatui::{backend::TestBackend, Terminal};
    use tokio::sync::mpsc;

    fn screen_rows(terminal: &Terminal<TestBackend>) -> Vec<String> {
        let buffer = terminal.backend().buffer();
        let width = buffer.area.width as usize;
        buffer
            .content()
            .chunks(width)
            .map(|row| row.iter().map(|cell| cell.symbol()).collect())
            .collect()
    }

    /// Stream a long answer into a small terminal and return the screen
    async fn render_streamed_answer(words: usize) -> (App, Vec<String>) {
        let (tx, _rx) = mpsc::unbounded_channel();
        let (stream_tx, mut stream_rx) = mpsc::unbounded_channel();
        let mut app = App::new(BackendClient::new("http://127.0.0.1:1"), tx, stream_tx);
        let backend = ScriptedBackend::default();

        app.chat.input = "Summarize it".to_string();
        app.chat.send(&backend);

        let mut answer: Vec<String> = (0..words).map(|i| format!("word{i:02}xx")).collect();
        answer.push("LASTTOKEN".to_string());
        backend.sender(0).send(content(&answer.join(" "))).unwrap();
        let event = stream_rx.recv().await.unwrap();
        app.on_stream_event(event);

        let mut terminal = Terminal::new(TestBackend::new(33, 20)).unwrap();
        terminal.draw(|frame| render(&mut app, frame)).unwrap();
        let rows = screen_rows(&terminal);
        (app, rows)
    }

    #[tokio::test]
    async fn test_follow_keeps_latest_token_visible() {
        for words in [60, 300] {
            let (app, rows) = render_streamed_answer(words).await;

            assert!(app.scroll > 0);
            assert!(
                rows.iter().any(|row| row.contains("LASTTOKEN")),
                "latest token off screen for {words} words: {rows:#?}"
            );
            assert!(
                rows.iter().any(|row| row.contains("Assistant is typing")),
                "typing indicator off screen for {words} words: {rows:#?}"
            );
        }
    }

    #[tokio::test]
    async fn test_scrolled_up_view_stays_put() {
        let (mut app, _) = render_streamed_answer(300).await;
        let bottom = app.scroll;
        app.scroll_up(5);

        let mut terminal = Terminal::new(TestBackend::new(33, 20)).unwrap();
        terminal.draw(|frame| render(&mut app, frame)).unwrap();

        assert_eq!(app.scroll, bottom - 5);
        let rows = screen_rows(&terminal);
        assert!(!rows.iter().any(|row| row.contains("Assistant is typing")));
    }

    fn rendered(line: &Line) -> Vec<(String, bool)> {
        line.spans
            .iter()
            .map(|s| {
                (
                    s.content.to_string(),
                    s.style.add_modifier.contains(Modifier::BOLD),
                )
            })
            .collect()
    }

    #[test]
    fn test_bold_runs() {
        let line = parse_markdown_line("The **main** point is **here**.");
        assert_eq!(
            rendered(&line),
            vec![
                ("The ".to_string(), false),
                ("main".to_string(), true),
                (" point is ".to_string(), false),
                ("here".to_string(), true),
                (".".to_string(), false),
            ]
        );
    }

    #[test]
    fn test_unclosed_marker_is_literal() {
        let line = parse_markdown_line("a **b");
        assert_eq!(
            rendered(&line),
            vec![("a ".to_string(), false), ("**b".to_string(), false)]
        );
    }

    #[test]
    fn test_plain_line() {
        let line = parse_markdown_line("no markup");
        assert_eq!(rendered(&line), vec![("no markup".to_string(), false)]);
    }
}
