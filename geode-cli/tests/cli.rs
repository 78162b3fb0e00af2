use std::fs;

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::tempdir;

#[test]
fn emits_llvm_ir_to_a_file() {
    let dir = tempdir().expect("tempdir");
    let input_path = dir.path().join("input.g");
    fs::write(&input_path, "func main() int { return 3; }").expect("write input");
    let output_path = dir.path().join("out/prog.ll");

    Command::cargo_bin("geode")
        .expect("binary exists")
        .arg("--input")
        .arg(&input_path)
        .arg("--output")
        .arg(&output_path)
        .assert()
        .success();

    let ir = fs::read_to_string(&output_path).expect("read ir");
    assert!(ir.contains("define i32 @main()"));
    assert!(ir.contains("ret i32 3"));
}

#[test]
fn reads_stdin_and_writes_stdout() {
    Command::cargo_bin("geode")
        .expect("binary exists")
        .arg("--target")
        .arg("aarch64-unknown-linux-gnu")
        .write_stdin("func main() int { return 0; }")
        .assert()
        .success()
        .stdout(predicate::str::contains(
            "target triple = \"aarch64-unknown-linux-gnu\"",
        ));
}

#[test]
fn compiles_a_directory_of_units() {
    let dir = tempdir().expect("tempdir");
    fs::write(dir.path().join("a.g"), "is math\nfunc twice(int x) int = x * 2").expect("write");
    fs::write(dir.path().join("b.g"), "func main() int { return math:twice(4); }")
        .expect("write");

    Command::cargo_bin("geode")
        .expect("binary exists")
        .arg("--input")
        .arg(dir.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("define i32 @_VM4mathN5twiceT3i32(i32 %arg0)"));
}

#[test]
fn reports_errors_with_file_positions() {
    let dir = tempdir().expect("tempdir");
    let input_path = dir.path().join("input.g");
    fs::write(&input_path, "func main() int {\n  return nope(1);\n}").expect("write input");

    Command::cargo_bin("geode")
        .expect("binary exists")
        .arg("--input")
        .arg(&input_path)
        .assert()
        .failure()
        .stderr(predicate::str::contains("input.g:2:"))
        .stderr(predicate::str::contains("error[E0200]: unresolved function `nope`"));
}

#[test]
fn warns_about_missing_returns_unless_strict() {
    let dir = tempdir().expect("tempdir");
    let input_path = dir.path().join("input.g");
    fs::write(&input_path, "func main() int { }").expect("write input");

    Command::cargo_bin("geode")
        .expect("binary exists")
        .arg("--input")
        .arg(&input_path)
        .assert()
        .success()
        .stderr(predicate::str::contains("warning[W0400]"));

    Command::cargo_bin("geode")
        .expect("binary exists")
        .arg("--input")
        .arg(&input_path)
        .arg("--strict-returns")
        .assert()
        .failure()
        .stderr(predicate::str::contains("error[E0300]"));
}

#[test]
fn emits_ast_and_tokens() {
    Command::cargo_bin("geode")
        .expect("binary exists")
        .arg("--emit")
        .arg("ast")
        .arg("--package")
        .arg("demo")
        .write_stdin("func main() int = 1 + 2 * 3")
        .assert()
        .success()
        .stdout(predicate::str::contains("(package demo)"))
        .stdout(predicate::str::contains("(+ 1 (* 2 3))"));

    Command::cargo_bin("geode")
        .expect("binary exists")
        .arg("--emit")
        .arg("tokens")
        .write_stdin("func")
        .assert()
        .success()
        .stdout(predicate::str::contains("1:1 Func \"func\""));
}

#[test]
fn missing_input_is_reported() {
    let dir = tempdir().expect("tempdir");
    Command::cargo_bin("geode")
        .expect("binary exists")
        .arg("--input")
        .arg(dir.path().join("missing"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("no geode sources were found"));
}
