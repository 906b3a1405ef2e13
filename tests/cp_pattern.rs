#![cfg(not(loom))]

use std::process::{Command, Output};

const USAGE: &str = "usage: cp pattern [consumers] [producers] [seed]";

fn cp_pattern(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_cp_pattern")).args(args).output().unwrap()
}

fn assert_usage(args: &[&str]) {
    let output = cp_pattern(args);
    assert_eq!(output.status.code(), Some(1), "args {args:?}");
    assert!(output.stdout.is_empty());
    let stderr = String::from_utf8(output.stderr).unwrap();
    assert_eq!(stderr.trim_end(), USAGE);
}

#[test]
fn missing_arguments() {
    assert_usage(&[]);
    assert_usage(&["4"]);
    assert_usage(&["4", "3"]);
}

#[test]
fn extra_argument() {
    assert_usage(&["4", "3", "42", "1"]);
}

#[test]
fn non_positive_arguments() {
    assert_usage(&["0", "3", "42"]);
    assert_usage(&["4", "0", "42"]);
    assert_usage(&["4", "3", "0"]);
    assert_usage(&["-1", "3", "42"]);
}

#[test]
fn non_integer_arguments() {
    assert_usage(&["four", "3", "42"]);
    assert_usage(&["4", "3.5", "42"]);
}

#[test]
#[ignore = "produces and consumes one million values"]
fn full_run() {
    let output = cp_pattern(&["4", "3", "42"]);
    assert_eq!(output.status.code(), Some(0));
    let stdout = String::from_utf8(output.stdout).unwrap();
    let mut seen = vec![false; 1_000_000];
    let mut consumed = 0;
    for line in stdout.lines() {
        if let Some(rest) = line.strip_prefix("Consumer ") {
            let n: usize = rest.split_whitespace().nth(2).unwrap().trim_end_matches('.').parse().unwrap();
            assert!(!seen[n], "{n} consumed twice");
            seen[n] = true;
            consumed += 1;
        } else {
            assert!(line.starts_with("Producer "), "{line}");
        }
    }
    assert_eq!(consumed, 1_000_000);
}
