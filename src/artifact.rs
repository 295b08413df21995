// Copyright 2021-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Owns the current in-flight bitcode path and derives per-stage output
//! names by suffixing the stem. The artifact pointer is never read
//! before being written (compile or user-supplied `.bc`); each stage
//! that produces a new artifact replaces it atomically.

use std::path::{Path, PathBuf};

/// The fixed name used for the concatenated output of compiling every
/// source file.
pub const LINKED_SOURCES_NAME: &str = "code.bc";

/// Returns `path` with its last extension (the part after the final
/// `.`) removed, preserving the directory component — mirroring the
/// original's `path[:path.rfind('.')]` stem computation, which is not
/// the same as `Path::file_stem` for paths containing dots in a parent
/// directory name.
pub fn stem(path: &Path) -> PathBuf {
    let s = path.to_string_lossy();
    match s.rfind('.') {
        Some(idx) => PathBuf::from(&s[..idx]),
        None => path.to_path_buf(),
    }
}

/// The default compiled-bitcode name for a single source file:
/// `<basename-stem>.bc` in the current working directory.
pub fn compile_output_name(src: &Path) -> PathBuf {
    let basename = src.file_name().map(PathBuf::from).unwrap_or_else(|| src.to_path_buf());
    let mut out = stem(&basename);
    out.set_extension("bc");
    out
}

/// The current artifact pointer. Owned by [`crate::pipeline::Session`].
#[derive(Debug, Default, Clone)]
pub struct Artifact(Option<PathBuf>);

impl Artifact {
    pub fn new() -> Self {
        Artifact(None)
    }

    pub fn get(&self) -> Option<&Path> {
        self.0.as_deref()
    }

    /// Panics if the artifact hasn't been written yet — reading before
    /// the first compile or adoption is a programming error per the
    /// spec's lifecycle invariant.
    pub fn require(&self) -> &Path {
        self.0
            .as_deref()
            .expect("artifact pointer read before being written")
    }

    pub fn set(&mut self, path: PathBuf) {
        self.0 = Some(path);
    }

    /// `<stem>-<tag>.bc`, derived from the current artifact.
    pub fn stage_output(&self, tag: &str) -> PathBuf {
        let mut out = stem(self.require());
        let mut name = out.file_name().unwrap_or_default().to_os_string();
        name.push(format!("-{tag}.bc"));
        out.set_file_name(name);
        out
    }

    /// `<stem>.sliced` — note: no `.bc` suffix, matching the slicer's
    /// actual output naming.
    pub fn sliced_output(&self) -> PathBuf {
        let mut out = stem(self.require());
        let mut name = out.file_name().unwrap_or_default().to_os_string();
        name.push(".sliced");
        out.set_file_name(name);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stem_strips_last_extension_only() {
        assert_eq!(stem(Path::new("foo.bar.bc")), PathBuf::from("foo.bar"));
        assert_eq!(stem(Path::new("/tmp/work/foo.bc")), PathBuf::from("/tmp/work/foo"));
    }

    #[test]
    fn compile_output_name_uses_basename_not_full_path() {
        assert_eq!(
            compile_output_name(Path::new("/src/dir/main.c")),
            PathBuf::from("main.bc")
        );
    }

    #[test]
    fn stage_output_suffixes_the_stem() {
        let mut a = Artifact::new();
        a.set(PathBuf::from("/work/code.bc"));
        assert_eq!(a.stage_output("opt"), PathBuf::from("/work/code-opt.bc"));
        assert_eq!(a.stage_output("inst"), PathBuf::from("/work/code-inst.bc"));
    }

    #[test]
    fn sliced_output_has_no_bc_suffix() {
        let mut a = Artifact::new();
        a.set(PathBuf::from("/work/code-opt.bc"));
        assert_eq!(a.sliced_output(), PathBuf::from("/work/code-opt.sliced"));
    }

    #[test]
    #[should_panic(expected = "read before being written")]
    fn require_panics_before_first_write() {
        let a = Artifact::new();
        let _ = a.require();
    }
}
