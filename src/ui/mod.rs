//! Terminal front-end: raw-mode guard, event loop, and input routing.

mod theme;
mod view;

pub use theme::{parse_hex_color, Theme, ThemeSet};

use crate::app::{App, UiState};
use crate::hotkey::HotkeyEvent;
use crate::logging::DebugEntry;
use anyhow::{Context, Result};
use crossbeam_channel::Receiver;
use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyModifiers};
use crossterm::{execute, terminal};
use ratatui::backend::CrosstermBackend;
use ratatui::Terminal;
use std::io;
use std::time::Duration;

/// Restores the terminal even when the loop exits by error or panic.
struct TerminalGuard;

impl TerminalGuard {
    fn enter() -> Result<Self> {
        terminal::enable_raw_mode().context("enable raw mode")?;
        execute!(io::stdout(), terminal::EnterAlternateScreen).context("enter alt screen")?;
        Ok(Self)
    }
}

impl Drop for TerminalGuard {
    fn drop(&mut self) {
        let _ = execute!(io::stdout(), terminal::LeaveAlternateScreen);
        let _ = terminal::disable_raw_mode();
    }
}

/// Set up the terminal and run the panel until the user quits.
pub fn run_app(
    app: &mut App,
    themes: &ThemeSet,
    hotkeys: Receiver<HotkeyEvent>,
    debug_lines: Receiver<DebugEntry>,
) -> Result<()> {
    let guard = TerminalGuard::enter()?;
    let backend = CrosstermBackend::new(io::stdout());
    let mut terminal = Terminal::new(backend)?;

    let result = event_loop(&mut terminal, app, themes, hotkeys, debug_lines);

    drop(terminal);
    drop(guard);
    result
}

fn event_loop(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    app: &mut App,
    themes: &ThemeSet,
    hotkeys: Receiver<HotkeyEvent>,
    debug_lines: Receiver<DebugEntry>,
) -> Result<()> {
    app.refresh_status();
    let mut theme = themes.resolve(&app.config().theme).clone();
    terminal.draw(|frame| view::draw(frame, app, &theme))?;

    loop {
        app.poll();
        app.maybe_refresh_status();

        while let Ok(event) = hotkeys.try_recv() {
            app.handle_hotkey(event);
        }
        while let Ok(entry) = debug_lines.try_recv() {
            app.push_debug(entry);
        }

        // Recording animates the level meter; redraw every pass while hot.
        let busy = app.state() != UiState::Idle;
        let mut should_draw = app.take_redraw_request() || busy;
        let mut should_quit = false;

        let poll_for = if busy {
            Duration::from_millis(50)
        } else {
            Duration::from_millis(100)
        };
        if event::poll(poll_for)? {
            match event::read()? {
                Event::Key(key) => {
                    match classify_key(app.state(), key) {
                        KeyAction::Quit => should_quit = true,
                        KeyAction::CycleTheme => {
                            let next = themes.next_theme(&app.config().theme).clone();
                            app.set_theme(&next.name);
                            theme = next;
                        }
                        KeyAction::CycleTone => app.cycle_tone(),
                        KeyAction::CycleModel => app.cycle_pp_model(),
                        KeyAction::RestartServer => app.restart_server(),
                        KeyAction::Ignore => {}
                    }
                    should_draw = true;
                }
                Event::Resize(_, _) => should_draw = true,
                _ => {}
            }
        }

        if should_draw {
            terminal.draw(|frame| view::draw(frame, app, &theme))?;
        }
        if should_quit {
            return Ok(());
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum KeyAction {
    Quit,
    CycleTheme,
    CycleTone,
    CycleModel,
    RestartServer,
    Ignore,
}

/// Route a key press for the current state. While Pasting, synthetic
/// keystrokes from the injector can feed back into this terminal, so
/// everything except the hard-quit shortcut is ignored.
fn classify_key(state: UiState, key: KeyEvent) -> KeyAction {
    let is_ctrl_c =
        key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c');
    if state == UiState::Pasting {
        return if is_ctrl_c {
            KeyAction::Quit
        } else {
            KeyAction::Ignore
        };
    }
    if is_ctrl_c {
        return KeyAction::Quit;
    }
    match key.code {
        KeyCode::Char('q') => KeyAction::Quit,
        KeyCode::Char('t') => KeyAction::CycleTheme,
        KeyCode::Char('p') => KeyAction::CycleTone,
        KeyCode::Char('m') => KeyAction::CycleModel,
        KeyCode::Char('r') => KeyAction::RestartServer,
        _ => KeyAction::Ignore,
    }
}
