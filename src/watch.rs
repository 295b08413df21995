// Copyright 2021-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Pluggable line classifiers consuming a child process's output stream.
//! Each watcher retains at most a bounded tail of the most recent lines
//! for failure reporting (default 100); the capture watcher is
//! unbounded.

use regex::Regex;
use std::collections::VecDeque;
use std::sync::LazyLock;

use crate::logger::{dbg, print_stderr, print_stdout, Tag};

const DEFAULT_TAIL: usize = 100;

/// A stateful line classifier.
pub trait Watch: Send {
    /// Consumes one raw byte-line (may include a trailing `\n`).
    fn parse(&mut self, line: &[u8]);

    /// `true` unless the watcher has observed something disqualifying
    /// (only meaningful for [`UnsuppCallWatch`]).
    fn ok(&self) -> bool {
        true
    }

    /// The retained tail of decoded lines, most recent last.
    fn lines(&self) -> &[String] {
        &[]
    }
}

fn decode(line: &[u8]) -> String {
    String::from_utf8_lossy(line).trim_end_matches(['\n', '\r']).to_string()
}

struct Tail {
    buf: VecDeque<String>,
    bound: Option<usize>,
}

impl Tail {
    fn bounded() -> Self {
        Tail {
            buf: VecDeque::new(),
            bound: Some(DEFAULT_TAIL),
        }
    }

    fn unbounded() -> Self {
        Tail {
            buf: VecDeque::new(),
            bound: None,
        }
    }

    fn push(&mut self, line: String) {
        self.buf.push_back(line);
        if let Some(bound) = self.bound {
            while self.buf.len() > bound {
                self.buf.pop_front();
            }
        }
    }

    fn as_slice_vec(&self) -> Vec<String> {
        self.buf.iter().cloned().collect()
    }
}

/// Parses `clang`/`opt` compile output: lines containing `error:` are
/// surfaced to stderr tagged `cc:`; everything else is a domain debug
/// line.
pub struct CompileWatch {
    tail: Tail,
    lines_cache: Vec<String>,
}

impl Default for CompileWatch {
    fn default() -> Self {
        Self::new()
    }
}

impl CompileWatch {
    pub fn new() -> Self {
        CompileWatch {
            tail: Tail::bounded(),
            lines_cache: Vec::new(),
        }
    }
}

impl Watch for CompileWatch {
    fn parse(&mut self, line: &[u8]) {
        let decoded = decode(line);
        self.tail.push(decoded.clone());
        if decoded.contains("error:") {
            print_stderr(&format!("cc: {decoded}"), Some(Tag::Brown));
        } else {
            dbg(&decoded, "compile");
        }
        self.lines_cache = self.tail.as_slice_vec();
    }

    fn lines(&self) -> &[String] {
        &self.lines_cache
    }
}

/// Parses the pass-loading "prepare" stage output (used by the
/// module-loading `opt -load` invocations).
pub struct PrepareWatch {
    tail: Tail,
    lines_cache: Vec<String>,
}

impl Default for PrepareWatch {
    fn default() -> Self {
        Self::new()
    }
}

impl PrepareWatch {
    pub fn new() -> Self {
        PrepareWatch {
            tail: Tail::bounded(),
            lines_cache: Vec::new(),
        }
    }
}

impl Watch for PrepareWatch {
    fn parse(&mut self, line: &[u8]) {
        let decoded = decode(line);
        self.tail.push(decoded.clone());
        if decoded.contains("Removed") || decoded.contains("Defining") {
            print_stdout(&decoded, None, None, true);
        } else {
            dbg(&decoded, "prepare");
        }
        self.lines_cache = self.tail.as_slice_vec();
    }

    fn lines(&self) -> &[String] {
        &self.lines_cache
    }
}

/// Parses `sbt-slicer` output.
pub struct SlicerWatch {
    tail: Tail,
    lines_cache: Vec<String>,
}

impl Default for SlicerWatch {
    fn default() -> Self {
        Self::new()
    }
}

impl SlicerWatch {
    pub fn new() -> Self {
        SlicerWatch {
            tail: Tail::bounded(),
            lines_cache: Vec::new(),
        }
    }
}

impl Watch for SlicerWatch {
    fn parse(&mut self, line: &[u8]) {
        let decoded = decode(line);
        self.tail.push(decoded.clone());
        if decoded.contains("INFO") {
            dbg(&decoded, "slicer");
        } else if decoded.contains("ERROR") || decoded.contains("error") {
            print_stderr(&decoded, None);
        } else {
            dbg(&decoded, "slicer");
        }
        self.lines_cache = self.tail.as_slice_vec();
    }

    fn lines(&self) -> &[String] {
        &self.lines_cache
    }
}

/// Parses `sbt-instr` output.
pub struct InstrumentationWatch {
    tail: Tail,
    lines_cache: Vec<String>,
}

impl Default for InstrumentationWatch {
    fn default() -> Self {
        Self::new()
    }
}

impl InstrumentationWatch {
    pub fn new() -> Self {
        InstrumentationWatch {
            tail: Tail::bounded(),
            lines_cache: Vec::new(),
        }
    }
}

impl Watch for InstrumentationWatch {
    fn parse(&mut self, line: &[u8]) {
        let decoded = decode(line);
        self.tail.push(decoded.clone());
        if decoded.contains("Info") {
            dbg(&decoded, "instrumentation");
        } else if decoded.contains("ERROR") || decoded.contains("error") {
            print_stderr(&decoded, None);
        } else if decoded.contains("Inserted") {
            print_stdout(&decoded, None, None, true);
        } else {
            // Matches the original verbatim: the fallback branch logs to
            // the "slicer" domain, not "instrumentation".
            dbg(&decoded, "slicer");
        }
        self.lines_cache = self.tail.as_slice_vec();
    }

    fn lines(&self) -> &[String] {
        &self.lines_cache
    }
}

static UNSUPPORTED_CALL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r".*call to .* is unsupported.*").expect("valid regex"));

/// Probes for the "call to X is unsupported" diagnostic emitted by the
/// unsupported-call check passes. `ok()` is sticky: once a matching line
/// is seen it never becomes `true` again.
pub struct UnsuppCallWatch {
    ok: bool,
    tail: Tail,
    lines_cache: Vec<String>,
}

impl Default for UnsuppCallWatch {
    fn default() -> Self {
        Self::new()
    }
}

impl UnsuppCallWatch {
    pub fn new() -> Self {
        UnsuppCallWatch {
            ok: true,
            tail: Tail::bounded(),
            lines_cache: Vec::new(),
        }
    }
}

impl Watch for UnsuppCallWatch {
    fn parse(&mut self, line: &[u8]) {
        let decoded = decode(line);
        self.tail.push(decoded.clone());
        dbg(&decoded, "prepare");
        if UNSUPPORTED_CALL.is_match(&decoded) {
            self.ok = false;
        }
        self.lines_cache = self.tail.as_slice_vec();
    }

    fn ok(&self) -> bool {
        self.ok
    }

    fn lines(&self) -> &[String] {
        &self.lines_cache
    }
}

/// Parses generic verification-backend output: `ERROR`/`WARN`/`Assertion`
/// (any case for the first letter) go straight to stderr; everything
/// else is a domain-`all` debug line. Retains every line, unbounded,
/// since the driver needs the full transcript to compute the verdict.
pub struct ToolWatch {
    lines_cache: Vec<String>,
}

impl Default for ToolWatch {
    fn default() -> Self {
        Self::new()
    }
}

impl ToolWatch {
    pub fn new() -> Self {
        ToolWatch {
            lines_cache: Vec::new(),
        }
    }
}

impl Watch for ToolWatch {
    fn parse(&mut self, line: &[u8]) {
        let decoded = decode(line);
        if decoded.contains("ERROR")
            || decoded.contains("WARN")
            || decoded.contains("Assertion")
            || decoded.contains("error")
            || decoded.contains("warn")
        {
            print_stderr(&decoded, None);
        } else {
            dbg(&decoded, "all");
        }
        self.lines_cache.push(decoded);
    }

    fn lines(&self) -> &[String] {
        &self.lines_cache
    }
}

/// Echoes every line to stdout with a fixed prefix and color. Used for
/// the stats (`-count-instr`) side-probe.
pub struct PrintWatch {
    prefix: String,
    color: Option<Tag>,
}

impl PrintWatch {
    pub fn new(prefix: impl Into<String>, color: Option<Tag>) -> Self {
        PrintWatch {
            prefix: prefix.into(),
            color,
        }
    }
}

impl Watch for PrintWatch {
    fn parse(&mut self, line: &[u8]) {
        let decoded = decode(line);
        print_stdout(&decoded, Some(&self.prefix), self.color, true);
    }
}

/// Plain domain-debug watcher used where no special classification is
/// needed (`link`, `postprocess_llvm`, and similar pass-through stages).
pub struct DbgWatch {
    domain: String,
    tail: Tail,
    lines_cache: Vec<String>,
}

impl DbgWatch {
    pub fn new(domain: impl Into<String>) -> Self {
        DbgWatch {
            domain: domain.into(),
            tail: Tail::bounded(),
            lines_cache: Vec::new(),
        }
    }
}

impl Watch for DbgWatch {
    fn parse(&mut self, line: &[u8]) {
        let decoded = decode(line);
        self.tail.push(decoded.clone());
        dbg(&decoded, &self.domain);
        self.lines_cache = self.tail.as_slice_vec();
    }

    fn lines(&self) -> &[String] {
        &self.lines_cache
    }
}

/// Records every line verbatim (trimmed), unbounded, without emitting
/// anything — used by `list_undefined` to recover the symbol-name list.
pub struct CaptureWatch {
    lines: Vec<String>,
}

impl Default for CaptureWatch {
    fn default() -> Self {
        Self::new()
    }
}

impl CaptureWatch {
    pub fn new() -> Self {
        CaptureWatch { lines: Vec::new() }
    }
}

impl Watch for CaptureWatch {
    fn parse(&mut self, line: &[u8]) {
        self.lines.push(decode(line).trim().to_string());
    }

    fn lines(&self) -> &[String] {
        &self.lines
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compile_watch_routes_error_lines_to_stderr_classification() {
        let mut w = CompileWatch::new();
        w.parse(b"foo.c:3:4: error: use of undeclared identifier\n");
        w.parse(b"1 error generated.\n");
        assert_eq!(w.lines().len(), 2);
    }

    #[test]
    fn unsupp_call_watch_is_sticky() {
        let mut w = UnsuppCallWatch::new();
        assert!(w.ok());
        w.parse(b"note: call to printf is unsupported by the model\n");
        assert!(!w.ok());
        w.parse(b"some other unrelated line\n");
        assert!(!w.ok());
    }

    #[test]
    fn unsupp_call_watch_stays_ok_when_no_match() {
        let mut w = UnsuppCallWatch::new();
        w.parse(b"nothing interesting here\n");
        assert!(w.ok());
    }

    #[test]
    fn instrumentation_watch_error_routes_to_stderr() {
        let mut w = InstrumentationWatch::new();
        w.parse(b"ERROR foo\n");
        // Classification doesn't panic and the line is retained either way.
        assert_eq!(w.lines().last().unwrap(), "ERROR foo");
    }

    #[test]
    fn capture_watch_trims_and_keeps_everything() {
        let mut w = CaptureWatch::new();
        for _ in 0..500 {
            w.parse(b"  symbol_name  \n");
        }
        assert_eq!(w.lines().len(), 500);
        assert_eq!(w.lines()[0], "symbol_name");
    }

    #[test]
    fn bounded_tail_keeps_only_the_most_recent_lines() {
        let mut w = CompileWatch::new();
        for i in 0..150 {
            w.parse(format!("line {i}\n").as_bytes());
        }
        assert_eq!(w.lines().len(), DEFAULT_TAIL);
        assert_eq!(w.lines().last().unwrap(), "line 149");
    }
}
