//! Integration tests for sgrep: the binary is run as a subprocess and its
//! exit codes, stdout, and stderr are checked.

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use tempfile::TempDir;

fn sgrep() -> Command {
    Command::cargo_bin("sgrep").unwrap()
}

fn write_file(dir: &TempDir, name: &str, content: &str) -> String {
    let path = dir.path().join(name);
    fs::write(&path, content).unwrap();
    path.to_str().unwrap().to_string()
}

#[test]
fn no_arguments_prints_usage_and_exits_2() {
    sgrep()
        .assert()
        .failure()
        .code(2)
        .stderr(predicate::str::contains("Usage: sgrep"));
}

#[test]
fn unknown_option_exits_2() {
    sgrep()
        .args(["-q", "a"])
        .assert()
        .failure()
        .code(2)
        .stderr(predicate::str::contains("unknown option"));
}

#[test]
fn matches_from_stdin() {
    sgrep()
        .arg("b+")
        .write_stdin("abc\nxyz\nabbz\n")
        .assert()
        .success()
        .stdout("abc\nabbz\n");
}

#[test]
fn no_match_exits_1() {
    sgrep()
        .arg("zzz")
        .write_stdin("abc\n")
        .assert()
        .failure()
        .code(1)
        .stdout("");
}

#[test]
fn bad_pattern_exits_2_with_offset() {
    sgrep()
        .arg("a[b")
        .write_stdin("anything\n")
        .assert()
        .failure()
        .code(2)
        .stderr(predicate::str::contains("error in regex at offset"));
}

#[test]
fn count_only() {
    sgrep()
        .args(["-c", "a"])
        .write_stdin("abc\nxyz\nanother\n")
        .assert()
        .success()
        .stdout("2\n");
}

#[test]
fn line_numbers() {
    sgrep()
        .args(["-n", "z"])
        .write_stdin("abc\nxyz\n")
        .assert()
        .success()
        .stdout("2:xyz\n");
}

#[test]
fn caseless() {
    sgrep()
        .args(["-i", "HELLO"])
        .write_stdin("say hello there\n")
        .assert()
        .success()
        .stdout("say hello there\n");
}

#[test]
fn invert_selection() {
    sgrep()
        .args(["-v", "a"])
        .write_stdin("abc\nxyz\n")
        .assert()
        .success()
        .stdout("xyz\n");
}

#[test]
fn whole_lines_only() {
    sgrep()
        .args(["-x", "abc"])
        .write_stdin("abc\nabcd\nxabc\n")
        .assert()
        .success()
        .stdout("abc\n");
}

#[test]
fn silent_mode_only_sets_exit_code() {
    sgrep()
        .args(["-s", "b"])
        .write_stdin("abc\n")
        .assert()
        .success()
        .stdout("");
    sgrep()
        .args(["-s", "q"])
        .write_stdin("abc\n")
        .assert()
        .failure()
        .code(1)
        .stdout("");
}

#[test]
fn basic_and_extended_syntax() {
    // In BRE, parens are literal unless escaped.
    sgrep()
        .args(["-b", "\\(ab\\)\\1"])
        .write_stdin("abab\n")
        .assert()
        .success()
        .stdout("abab\n");

    sgrep()
        .args(["-e", "(cat|dog)s"])
        .write_stdin("hotdogs\n")
        .assert()
        .success()
        .stdout("hotdogs\n");

    // The same pattern as BRE matches the literal text with parens.
    sgrep()
        .args(["-b", "(cat|dog)s"])
        .write_stdin("hotdogs\n(cat|dog)s\n")
        .assert()
        .success()
        .stdout("(cat|dog)s\n");
}

#[test]
fn perl_syntax_is_the_default() {
    sgrep()
        .arg("(?<=foo)bar")
        .write_stdin("foobar\nbazbar\n")
        .assert()
        .success()
        .stdout("foobar\n");
}

#[test]
fn files_with_matches_only() {
    let dir = TempDir::new().unwrap();
    let a = write_file(&dir, "a.txt", "has a needle\n");
    let b = write_file(&dir, "b.txt", "nothing here\n");
    sgrep()
        .args(["-l", "needle", &a, &b])
        .assert()
        .success()
        .stdout(format!("{a}\n"));
}

#[test]
fn filenames_prefix_with_multiple_files() {
    let dir = TempDir::new().unwrap();
    let a = write_file(&dir, "a.txt", "match\n");
    let b = write_file(&dir, "b.txt", "match\n");
    sgrep()
        .args(["match", &a, &b])
        .assert()
        .success()
        .stdout(format!("{a}:match\n{b}:match\n"));

    // -h suppresses the names again.
    sgrep()
        .args(["-h", "match", &a, &b])
        .assert()
        .success()
        .stdout("match\nmatch\n");
}

#[test]
fn missing_file_is_an_error() {
    sgrep()
        .args(["a", "/no/such/file/exists"])
        .assert()
        .failure()
        .code(2)
        .stderr(predicate::str::contains("failed to open"));
}

#[test]
fn combined_flags_in_one_argument() {
    sgrep()
        .args(["-in", "ABC"])
        .write_stdin("xx\nabc\n")
        .assert()
        .success()
        .stdout("2:abc\n");
}
