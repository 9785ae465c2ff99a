use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};

use crossterm::terminal::{self, ClearType};
use crossterm::{cursor, execute};
use tracing::warn;

/// Set while stdin is in raw mode. Printers consult it to emit `\r\n`,
/// since raw mode disables the terminal's newline translation.
static RAW_MODE: AtomicBool = AtomicBool::new(false);

pub fn raw_mode_active() -> bool {
    RAW_MODE.load(Ordering::SeqCst)
}

pub fn line_ending() -> &'static str {
    if raw_mode_active() {
        "\r\n"
    } else {
        "\n"
    }
}

/// Print `text` (possibly multi-line) followed by a line ending suitable for
/// the current terminal mode.
pub fn emit(text: &str) {
    let eol = line_ending();
    let mut out = std::io::stdout().lock();
    for line in text.split('\n') {
        let _ = write!(out, "{}{}", line, eol);
    }
    let _ = out.flush();
}

pub fn clear_screen() {
    let mut out = std::io::stdout();
    let _ = execute!(out, terminal::Clear(ClearType::All), cursor::MoveTo(0, 0));
}

/// Holds the terminal in raw mode; dropping it (including while unwinding)
/// restores cooked mode.
pub struct RawModeGuard {
    _private: (),
}

impl RawModeGuard {
    pub fn acquire() -> anyhow::Result<Self> {
        terminal::enable_raw_mode()?;
        RAW_MODE.store(true, Ordering::SeqCst);
        Ok(Self { _private: () })
    }
}

impl Drop for RawModeGuard {
    fn drop(&mut self) {
        RAW_MODE.store(false, Ordering::SeqCst);
        if let Err(e) = terminal::disable_raw_mode() {
            warn!(error = %e, "failed to restore terminal mode");
        }
    }
}
