// Copyright 2021-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Small helpers for probing the `clang` compiler used by the compile
//! stage — version detection and the `required_version` comparison the
//! original uses to gate `-Xclang -force-lifetime-markers`.

use std::process::Command;

use regex::Regex;
use std::sync::LazyLock;

static VERSION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d+)\.(\d+)\.(\d+)").expect("valid regex"));

/// Runs `clang --version` and extracts the first `M.m.p` version
/// triple found in its output. Returns `None` if `clang` isn't on PATH
/// or its output doesn't contain a recognizable version.
pub fn get_clang_version() -> Option<(u32, u32, u32)> {
    let output = Command::new("clang").arg("--version").output().ok()?;
    if !output.status.success() {
        return None;
    }
    let text = String::from_utf8_lossy(&output.stdout);
    parse_version(&text)
}

fn parse_version(text: &str) -> Option<(u32, u32, u32)> {
    let caps = VERSION_RE.captures(text)?;
    Some((
        caps[1].parse().ok()?,
        caps[2].parse().ok()?,
        caps[3].parse().ok()?,
    ))
}

/// `true` iff `version >= min`, comparing `(major, minor, micro)`
/// lexicographically.
pub fn required_version(version: Option<(u32, u32, u32)>, min: (u32, u32, u32)) -> bool {
    match version {
        Some(v) => v >= min,
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_a_typical_clang_version_banner() {
        let banner = "clang version 14.0.0 (Fedora 14.0.0-1)\nTarget: x86_64-unknown-linux-gnu\n";
        assert_eq!(parse_version(banner), Some((14, 0, 0)));
    }

    #[test]
    fn required_version_compares_lexicographically() {
        assert!(required_version(Some((4, 0, 1)), (4, 0, 1)));
        assert!(required_version(Some((5, 0, 0)), (4, 0, 1)));
        assert!(!required_version(Some((3, 9, 9)), (4, 0, 1)));
        assert!(!required_version(None, (4, 0, 1)));
    }
}
