//! Terminal logging with colored module prefixes.
//!
//! ```ignore
//! log!("build"; "rendering {} documents", count);
//! log!("warn"; "{}: layout `{}` not found", path, name);
//! debug!("render"; "{}", doc.relative_path);
//! ```
//!
//! Progress lines go to stdout and are cut to the terminal width. `warn` and
//! `error` lines go to stderr in full, since they carry error chains.

use colored::{ColoredString, Colorize};
use crossterm::{
    execute,
    terminal::{Clear, ClearType, size},
};
use std::{
    io::{Write, stderr, stdout},
    sync::{
        OnceLock,
        atomic::{AtomicBool, Ordering},
    },
};

static TERMINAL_WIDTH: OnceLock<u16> = OnceLock::new();

static VERBOSE: AtomicBool = AtomicBool::new(false);

/// Columns used by a prefix: `[`, `]` and the following space.
const PREFIX_OVERHEAD: usize = 3;

const FALLBACK_WIDTH: u16 = 120;

fn terminal_width() -> usize {
    *TERMINAL_WIDTH.get_or_init(|| size().map_or(FALLBACK_WIDTH, |(w, _)| w)) as usize
}

// ============================================================================
// Log Macros
// ============================================================================

/// Log a message under a module prefix.
#[macro_export]
macro_rules! log {
    ($module:expr; $($arg:tt)*) => {{
        $crate::logger::log($module, &format!($($arg)*))
    }};
}

/// Like [`log!`], but only when verbose output is on.
#[macro_export]
macro_rules! debug {
    ($module:expr; $($arg:tt)*) => {{
        if $crate::logger::is_verbose() {
            $crate::logger::log($module, &format!($($arg)*))
        }
    }};
}

pub fn set_verbose(verbose: bool) {
    VERBOSE.store(verbose, Ordering::Relaxed);
}

#[inline]
pub fn is_verbose() -> bool {
    VERBOSE.load(Ordering::Relaxed)
}

// ============================================================================
// Output
// ============================================================================

/// How a module's lines are shown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Kind {
    Serve,
    Watch,
    Warn,
    Error,
    Other,
}

impl Kind {
    fn of(module: &str) -> Self {
        match module.to_ascii_lowercase().as_str() {
            "serve" => Self::Serve,
            "watch" => Self::Watch,
            "warn" => Self::Warn,
            "error" => Self::Error,
            _ => Self::Other,
        }
    }

    const fn is_problem(self) -> bool {
        matches!(self, Self::Warn | Self::Error)
    }

    fn paint(self, prefix: String) -> ColoredString {
        match self {
            Self::Serve => prefix.bright_blue().bold(),
            Self::Watch => prefix.bright_green().bold(),
            Self::Error => prefix.bright_red().bold(),
            Self::Warn => prefix.bright_magenta().bold(),
            Self::Other => prefix.bright_yellow().bold(),
        }
    }
}

/// Print `[module] message`.
pub fn log(module: &str, message: &str) {
    let kind = Kind::of(module);
    let prefix = kind.paint(format!("[{module}]"));

    if kind.is_problem() {
        let mut err = stderr().lock();
        writeln!(err, "{prefix} {message}").ok();
        return;
    }

    let mut out = stdout().lock();
    execute!(out, Clear(ClearType::UntilNewLine)).ok();
    let room = terminal_width().saturating_sub(module.len() + PREFIX_OVERHEAD);
    writeln!(out, "{prefix} {}", truncate_str(message, room)).ok();
    out.flush().ok();
}

/// Cut `s` to at most `max_len` bytes on a char boundary.
fn truncate_str(s: &str, max_len: usize) -> &str {
    if s.len() <= max_len {
        return s;
    }
    let mut end = max_len;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}
