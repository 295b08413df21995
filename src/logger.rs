// Copyright 2021-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! The logging sink: classified messages tagged by domain and color.
//! Domain-tagged debug output goes through `tracing`; user-facing
//! status lines go straight to stdout/stderr with `colored` ANSI tags,
//! matching the original's terminal-coloring behavior.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{LazyLock, Mutex};
use std::time::Instant;

use colored::{Color, Colorize};

static DEBUG_ENABLED: AtomicBool = AtomicBool::new(false);
static TIMER: LazyLock<Mutex<Instant>> = LazyLock::new(|| Mutex::new(Instant::now()));

/// Enables the `dbg!` domain-tagged tracing output. Mirrors the
/// original's `enable_debug()` module function.
pub fn enable_debug() {
    DEBUG_ENABLED.store(true, Ordering::Relaxed);
}

pub fn debug_enabled() -> bool {
    DEBUG_ENABLED.load(Ordering::Relaxed)
}

/// A color tag for a status line, matching the original's string-keyed
/// palette (`RED`, `GREEN`, `BROWN`, `WHITE`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tag {
    Red,
    Green,
    Brown,
    White,
}

impl Tag {
    fn to_color(self) -> Color {
        match self {
            Tag::Red => Color::Red,
            Tag::Green => Color::Green,
            // `colored` has no literal brown; the original's terminal
            // brown is conventionally rendered as ANSI yellow.
            Tag::Brown => Color::Yellow,
            Tag::White => Color::White,
        }
    }
}

/// Emits a domain-tagged debug line through `tracing`, only when
/// debugging output has been enabled (same gate as the original's
/// `dbg()` helper, which is a no-op unless `-d`/`--debug` was passed).
pub fn dbg(line: &str, domain: &str) {
    if !debug_enabled() {
        return;
    }
    tracing::debug!(domain, "{}", line.trim_end_matches('\n'));
}

/// Writes to stdout, optionally prefixed and colored. `print_nl`
/// controls whether a trailing newline is appended (watchers that feed
/// in already-newline-terminated lines pass `false`).
pub fn print_stdout(line: &str, prefix: Option<&str>, color: Option<Tag>, print_nl: bool) {
    use std::io::Write;
    let mut out = String::new();
    if let Some(p) = prefix {
        out.push_str(p);
    }
    out.push_str(line);
    if print_nl {
        out.push('\n');
    }
    let rendered = match color {
        Some(tag) => out.color(tag.to_color()).to_string(),
        None => out,
    };
    let _ = write!(std::io::stdout(), "{rendered}");
}

pub fn print_stderr(line: &str, color: Option<Tag>) {
    use std::io::Write;
    let rendered = match color {
        Some(tag) => line.color(tag.to_color()).to_string(),
        None => line.to_string(),
    };
    let _ = writeln!(std::io::stderr(), "{rendered}");
}

/// Resets the elapsed-time clock; called at the start of each timed
/// pipeline phase.
pub fn restart_counting_time() {
    *TIMER.lock().expect("timer mutex poisoned") = Instant::now();
}

/// Prints `<prefix>: <elapsed>s` in the given color, matching the
/// original's `print_elapsed_time`.
pub fn print_elapsed_time(prefix: &str, color: Option<Tag>) {
    let elapsed = TIMER.lock().expect("timer mutex poisoned").elapsed();
    print_stdout(
        &format!("{prefix}: {:.3} s", elapsed.as_secs_f64()),
        None,
        color,
        true,
    );
}
