//! No-echo password prompt.

use std::io::{self, Write};

use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use crossterm::terminal::{disable_raw_mode, enable_raw_mode};

/// What a keystroke does to the password being typed.
#[derive(Debug, PartialEq, Eq)]
enum KeyAction {
    Continue,
    Submit,
    Abort,
}

/// Prompt on stderr and read a password without echoing it.
pub fn read_password(prompt: &str) -> io::Result<String> {
    let mut stderr = io::stderr();
    write!(stderr, "{prompt}")?;
    stderr.flush()?;

    enable_raw_mode()?;
    let result = read_until_enter();
    disable_raw_mode()?;
    writeln!(stderr)?;

    result
}

fn read_until_enter() -> io::Result<String> {
    let mut password = String::new();
    loop {
        if let Event::Key(key) = event::read()? {
            match apply_key(&mut password, key) {
                KeyAction::Continue => {}
                KeyAction::Submit => return Ok(password),
                KeyAction::Abort => {
                    return Err(io::Error::new(
                        io::ErrorKind::Interrupted,
                        "password entry cancelled",
                    ))
                }
            }
        }
    }
}

fn apply_key(password: &mut String, key: KeyEvent) -> KeyAction {
    if key.kind == KeyEventKind::Release {
        return KeyAction::Continue;
    }
    match key.code {
        KeyCode::Enter => KeyAction::Submit,
        KeyCode::Esc => KeyAction::Abort,
        KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => KeyAction::Abort,
        KeyCode::Backspace => {
            password.pop();
            KeyAction::Continue
        }
        KeyCode::Char(c) => {
            password.push(c);
            KeyAction::Continue
        }
        _ => KeyAction::Continue,
    }
}
