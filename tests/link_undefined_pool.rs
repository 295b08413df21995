// Copyright 2021-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0
//!
//! Exercises the undefined-symbol shim resolution and linking fixed point
//! end to end, against a fake `clang`/`llvm-link` toolchain so the test
//! doesn't depend on a real LLVM installation being present.
#![cfg(unix)]

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;

use symbiotic::{KleeBackend, Options, Session};

/// Writes an executable shell script at `path` that, given an argv ending
/// in `-o <out> ...`, creates an empty file at `<out>` and exits 0. Good
/// enough to stand in for `clang`/`llvm-link` when the test only cares
/// about artifact bookkeeping, not actual codegen.
fn write_fake_tool(path: &Path) {
    let script = r#"#!/bin/sh
prev=""
out=""
for arg in "$@"; do
  if [ "$prev" = "-o" ]; then
    out="$arg"
  fi
  prev="$arg"
done
: > "$out"
exit 0
"#;
    fs::write(path, script).expect("write fake tool script");
    let mut perms = fs::metadata(path).unwrap().permissions();
    perms.set_mode(0o755);
    fs::set_permissions(path, perms).unwrap();
}

#[test]
fn link_undefined_pool_compiles_and_links_available_shims() {
    let root = tempfile::tempdir().expect("tempdir");
    let scratch = tempfile::tempdir().expect("scratch tempdir");

    let bin_dir = root.path().join("bin");
    fs::create_dir_all(&bin_dir).unwrap();
    write_fake_tool(&bin_dir.join("clang"));
    write_fake_tool(&bin_dir.join("llvm-link"));

    let path_var = std::env::var("PATH").unwrap_or_default();
    std::env::set_var("PATH", format!("{}:{}", bin_dir.display(), path_var));

    let symbiotic_dir = root.path().join("symbiotic");
    let shim_dir = symbiotic_dir.join("lib").join("klee");
    fs::create_dir_all(&shim_dir).unwrap();
    fs::write(shim_dir.join("my_shim.c"), "void my_shim(void) {}\n").unwrap();

    let prev_cwd = std::env::current_dir().unwrap();
    std::env::set_current_dir(scratch.path()).unwrap();

    let mut options = Options::new(&symbiotic_dir);
    options.linkundef = vec!["klee".to_string()];

    let backend = Box::new(KleeBackend::new(symbiotic_dir.join("bin/klee"), "3.9.1"));
    let mut session = Session::new(vec![], backend, options, symbiotic_dir.clone());

    // Seed the artifact pointer the way compile_sources's initial `link`
    // call would, so `link_undefined_pool`'s own (output-less) `link` call
    // has a current artifact to derive its output name from.
    let seed = scratch.path().join("code.bc");
    let init_lib = scratch.path().join("init.bc");
    fs::write(&init_lib, b"").unwrap();
    session
        .link(Some(seed.clone()), Some(vec![init_lib]))
        .expect("seeding the artifact pointer should succeed");
    assert_eq!(session.artifact_path(), Some(seed.as_path()));

    let linked = session
        .link_undefined_pool(&["my_shim".to_string(), "no_such_symbol".to_string()])
        .expect("link_undefined_pool should succeed against the fake toolchain");

    std::env::set_current_dir(prev_cwd).unwrap();

    assert!(linked, "a shim was available so linking should have occurred");
    assert_eq!(session.linked_functions(), &["my_shim".to_string()]);
}
