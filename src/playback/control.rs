// Line-based keyboard controls for a running session
use std::io::{self, BufRead};
use std::thread::{self, JoinHandle};

use tracing::{debug, warn};

use super::player::PlayerControl;

/// Seconds skipped by a bare `+` or `-`
pub const SEEK_STEP: f64 = 5.0;

/// One command typed by the viewer
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ControlAction {
    TogglePause,
    SeekBy(f64),
    SeekTo(f64),
    Quit,
}

impl ControlAction {
    /// Parse one input line.
    ///
    /// `p` toggles pause, `q` quits, `+`/`-` skip by [`SEEK_STEP`],
    /// `+N`/`-N` skip N seconds and `N` or `g N` jumps to N seconds.
    pub fn parse(line: &str) -> Option<Self> {
        let line = line.trim();
        match line {
            "p" | "pause" => return Some(Self::TogglePause),
            "q" | "quit" => return Some(Self::Quit),
            "+" => return Some(Self::SeekBy(SEEK_STEP)),
            "-" => return Some(Self::SeekBy(-SEEK_STEP)),
            _ => {}
        }

        if line.starts_with('+') || line.starts_with('-') {
            return seconds(line).map(Self::SeekBy);
        }

        let target = line
            .strip_prefix("g ")
            .or_else(|| line.strip_prefix("goto "))
            .unwrap_or(line);
        seconds(target.trim()).map(Self::SeekTo)
    }
}

fn seconds(text: &str) -> Option<f64> {
    text.parse::<f64>().ok().filter(|s| s.is_finite())
}

/// Apply every action read from `input` until it ends or the viewer quits
pub fn read_controls<R: BufRead>(input: R, control: &PlayerControl) {
    for line in input.lines() {
        let Ok(line) = line else {
            break;
        };
        match ControlAction::parse(&line) {
            Some(action) => {
                debug!(?action, "control input");
                if !control.apply(action) {
                    break;
                }
            }
            None if line.trim().is_empty() => {}
            None => warn!(input = line.trim(), "unknown control, use p, q, +N, -N or a time"),
        }
    }
}

/// Read controls from stdin on a background thread
pub fn spawn_stdin_controls(control: PlayerControl) -> io::Result<JoinHandle<()>> {
    thread::Builder::new()
        .name("controls".to_string())
        .spawn(move || read_controls(io::stdin().lock(), &control))
}
