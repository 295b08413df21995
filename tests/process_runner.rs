// Copyright 2021-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0
#![cfg(unix)]

use symbiotic::process;
use symbiotic::watch::{CaptureWatch, Watch};

#[test]
fn run_streams_lines_in_arrival_order() {
    let mut watcher = CaptureWatch::new();
    let argv: Vec<&str> = vec!["/bin/sh", "-c", "echo one; echo two; echo three"];
    process::run(&argv, &mut watcher, "should not fail").unwrap();
    assert_eq!(
        watcher.lines(),
        &["one".to_string(), "two".to_string(), "three".to_string()]
    );
}

#[test]
fn run_fails_with_stage_error_on_nonzero_exit() {
    let mut watcher = CaptureWatch::new();
    let argv: Vec<&str> = vec!["/bin/sh", "-c", "exit 7"];
    let err = process::run(&argv, &mut watcher, "boom").unwrap_err();
    assert_eq!(err.to_string(), "boom");
}

#[test]
fn run_fails_with_spawn_error_on_missing_binary() {
    let mut watcher = CaptureWatch::new();
    let argv: Vec<&str> = vec!["/no/such/binary-symbiotic-test"];
    assert!(process::run(&argv, &mut watcher, "unused").is_err());
}

#[test]
fn cancellation_primitives_are_noops_without_a_current_child() {
    assert!(!process::has_process());
    // None of these should panic when no child has ever been registered.
    process::terminate();
    process::kill();
    process::kill_wait();
}
