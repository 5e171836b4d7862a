//! Panel rendering: state badge, live level, transcript, probe results,
//! and the debug pane.

use super::theme::Theme;
use crate::app::{App, ServerStateView, UiState};
use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::style::{Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, BorderType, Borders, Gauge, Paragraph};
use ratatui::Frame;

/// Error badges show at most this many characters before "…".
const ERROR_BADGE_CHARS: usize = 50;

pub fn draw(frame: &mut Frame, app: &App, theme: &Theme) {
    let area = frame.size();
    let outer = Block::default()
        .borders(Borders::ALL)
        .border_type(BorderType::Rounded)
        .border_style(Style::default().fg(theme.secondary))
        .title(Span::styled(
            " Palaver ",
            Style::default()
                .fg(theme.primary)
                .add_modifier(Modifier::BOLD),
        ));
    let inner = outer.inner(area);
    frame.render_widget(outer, area);

    let debug_rows = if app.debug_mode() { 10 } else { 0 };
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(1), // state badge
            Constraint::Length(1), // level meter
            Constraint::Length(1), // transcript
            Constraint::Length(1), // probes
            Constraint::Length(1), // toggles / hints
            Constraint::Length(1), // error badge
            Constraint::Length(debug_rows),
            Constraint::Min(0),
        ])
        .split(inner);

    frame.render_widget(state_line(app, theme), chunks[0]);
    draw_level(frame, app, theme, chunks[1]);
    frame.render_widget(transcript_line(app, theme), chunks[2]);
    frame.render_widget(probe_line(app, theme), chunks[3]);
    frame.render_widget(hint_line(app, theme), chunks[4]);
    frame.render_widget(error_line(app, theme), chunks[5]);
    if app.debug_mode() {
        draw_debug(frame, app, theme, chunks[6]);
    }
}

fn state_line(app: &App, theme: &Theme) -> Paragraph<'static> {
    let (label, color) = match app.state() {
        UiState::Idle => ("IDLE", theme.success),
        UiState::Recording => ("RECORDING", theme.primary),
        UiState::Transcribing => ("TRANSCRIBING", theme.warning),
        UiState::PostProcessing => ("REWRITING", theme.accent),
        UiState::Pasting => ("PASTING", theme.secondary),
        UiState::Error => ("ERROR", theme.error),
    };
    let mut spans = vec![
        Span::styled(
            format!(" {label} "),
            Style::default().fg(color).add_modifier(Modifier::BOLD),
        ),
        Span::styled(
            format!("  hold {} to dictate", app.hotkey_label()),
            Style::default().fg(theme.dimmed),
        ),
    ];
    if app.last_truncated() {
        spans.push(Span::styled(
            "  (capture truncated at limit)",
            Style::default().fg(theme.warning),
        ));
    }
    Paragraph::new(Line::from(spans))
}

fn draw_level(frame: &mut Frame, app: &App, theme: &Theme, area: Rect) {
    if app.state() != UiState::Recording {
        frame.render_widget(Paragraph::new(""), area);
        return;
    }
    let gauge = Gauge::default()
        .gauge_style(Style::default().fg(theme.primary).bg(theme.separator))
        .ratio(app.audio_level().clamp(0.0, 1.0))
        .label(Span::styled("mic", Style::default().fg(theme.text)));
    frame.render_widget(gauge, area);
}

fn transcript_line(app: &App, theme: &Theme) -> Paragraph<'static> {
    let text = if app.last_transcript().is_empty() {
        Span::styled(
            "no transcript yet".to_string(),
            Style::default().fg(theme.dimmed),
        )
    } else {
        Span::styled(
            app.last_transcript().to_string(),
            Style::default()
                .fg(theme.accent)
                .add_modifier(Modifier::ITALIC),
        )
    };
    Paragraph::new(Line::from(vec![
        Span::styled("last: ", Style::default().fg(theme.secondary)),
        text,
    ]))
}

fn probe_line(app: &App, theme: &Theme) -> Paragraph<'static> {
    let status = app.status();
    let ok = Style::default().fg(theme.success);
    let bad = Style::default().fg(theme.error);
    let dim = Style::default().fg(theme.dimmed);

    let mut spans = vec![Span::styled("mic ", dim)];
    if status.mic_available {
        let name = if status.mic_device_name.is_empty() {
            "ok".to_string()
        } else {
            status.mic_device_name.clone()
        };
        spans.push(Span::styled(name, ok));
    } else {
        spans.push(Span::styled("missing".to_string(), bad));
    }
    spans.push(Span::styled("  backend ", dim));
    spans.push(if status.backend_alive {
        Span::styled("online".to_string(), ok)
    } else {
        Span::styled("offline".to_string(), bad)
    });
    spans.push(Span::styled("  model ", dim));
    spans.push(Span::styled(
        status.model_name.clone(),
        Style::default().fg(theme.text),
    ));

    if app.has_server() {
        let (label, style) = match app.server_state() {
            ServerStateView::None => ("-", dim),
            ServerStateView::Starting => ("starting", Style::default().fg(theme.warning)),
            ServerStateView::Running => ("running", ok),
            ServerStateView::Stopped => ("stopped", dim),
            ServerStateView::Error => ("error", bad),
        };
        spans.push(Span::styled("  server ", dim));
        spans.push(Span::styled(label.to_string(), style));
    }
    Paragraph::new(Line::from(spans))
}

fn hint_line(app: &App, theme: &Theme) -> Paragraph<'static> {
    let dim = Style::default().fg(theme.dimmed);
    let key = Style::default().fg(theme.secondary);
    let mut spans = vec![
        Span::styled("t", key),
        Span::styled(" theme  ", dim),
        Span::styled("p", key),
        Span::styled(format!(" tone[{}]  ", app.tone_name()), dim),
        Span::styled("m", key),
        Span::styled(
            format!(
                " model[{}]  ",
                if app.pp_model_name().is_empty() {
                    "-"
                } else {
                    app.pp_model_name()
                }
            ),
            dim,
        ),
    ];
    if app.has_server() {
        spans.push(Span::styled("r", key));
        spans.push(Span::styled(" restart server  ", dim));
    }
    spans.push(Span::styled("q", key));
    spans.push(Span::styled(" quit", dim));
    Paragraph::new(Line::from(spans))
}

fn error_line(app: &App, theme: &Theme) -> Paragraph<'static> {
    if app.last_error().is_empty() {
        return Paragraph::new("");
    }
    Paragraph::new(Line::from(Span::styled(
        truncate_error(app.last_error()),
        Style::default()
            .fg(theme.error)
            .add_modifier(Modifier::BOLD),
    )))
}

fn draw_debug(frame: &mut Frame, app: &App, theme: &Theme, area: Rect) {
    let block = Block::default()
        .borders(Borders::TOP)
        .border_style(Style::default().fg(theme.separator))
        .title(Span::styled("debug", Style::default().fg(theme.dimmed)));
    let inner = block.inner(area);
    frame.render_widget(block, area);

    let visible = inner.height as usize;
    let entries: Vec<&crate::logging::DebugEntry> = app.debug_entries().collect();
    let start = entries.len().saturating_sub(visible);
    let lines: Vec<Line> = entries[start..]
        .iter()
        .map(|entry| {
            Line::from(vec![
                Span::styled(entry.time.clone(), Style::default().fg(theme.dimmed)),
                Span::raw(" "),
                Span::styled(
                    format!("{:<10}", entry.category),
                    Style::default().fg(theme.warning),
                ),
                Span::styled(entry.message.clone(), Style::default().fg(theme.dimmed)),
            ])
        })
        .collect();
    frame.render_widget(Paragraph::new(lines), inner);
}

/// Single-line badge: at most 50 characters of the message, then "…".
pub fn truncate_error(message: &str) -> String {
    let mut chars = message.chars();
    let head: String = chars.by_ref().take(ERROR_BADGE_CHARS).collect();
    if chars.next().is_some() {
        format!("{head}…")
    } else {
        head
    }
}
