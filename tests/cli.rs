//! End-to-end runs of the `spy` binary.

use assert_cmd::Command;
use indoc::indoc;
use pretty_assertions::assert_eq;

fn spy() -> Command {
    Command::cargo_bin("spy").unwrap()
}

fn stdout_of(args: &[&str], input: &str) -> String {
    let output = spy().args(args).write_stdin(input).output().unwrap();
    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));
    String::from_utf8(output.stdout).unwrap()
}

fn stderr_of(args: &[&str], input: &str) -> String {
    let output = spy().args(args).write_stdin(input).output().unwrap();
    assert_eq!(output.status.code(), Some(1));
    String::from_utf8(output.stderr).unwrap()
}

#[test]
fn test_complete_run() {
    let out = stdout_of(
        &[
            "-l",
            "spy.many(pipe.split())",
            "-f",
            "len(pipe) > 2",
            "pipe.upper()",
            "list(itertools.islice(spy.collect(), 3))",
            "\" \".join(reversed(pipe))",
        ],
        "this is\na piece of sample input\nused to test a complete run\n",
    );
    assert_eq!(
        out,
        indoc! {"
            SAMPLE PIECE THIS
            TEST USED INPUT
            RUN COMPLETE
        "}
    );
}

#[test]
fn test_whole_input_is_one_string() {
    let out = stdout_of(&["len(pipe.splitlines())"], "a\nb\nc\n");
    assert_eq!(out, "3\n");
}

#[test]
fn test_start_and_end() {
    let out = stdout_of(&["-l", "-s", "1", "-e", "3", "pipe"], "a\nb\nc\nd\ne\n");
    assert_eq!(out, "b\nc\n...\n");
}

#[test]
fn test_prelude() {
    let out = stdout_of(
        &["-l", "--prelude", "seen = 0", "seen += 1; pipe = str(seen) + pipe"],
        "a\nb\n",
    );
    assert_eq!(out, "1a\n2b\n");
}

#[test]
fn test_traceback_names_failing_fragment() {
    let err = stderr_of(&["-l", "pipe", "int(pipe)", "pipe"], "1\nx\n");
    assert_eq!(
        err,
        indoc! {"
            Traceback (most recent call last):
              Fragment 2
                int(pipe)
                input to fragment was 'x'
            ValueError: invalid literal for int() with base 10: 'x'
        "}
    );
}

#[test]
fn test_traceback_hides_decorator_plumbing() {
    let err = stderr_of(&["-l", "-f", "pipe.nope()"], "a\n");
    assert_eq!(
        err,
        indoc! {"
            Traceback (most recent call last):
              Fragment 1
                --filter 'pipe.nope()'
                input to fragment was 'a'
            AttributeError: 'str' object has no attribute 'nope'
        "}
    );
}

#[test]
fn test_traceback_keeps_lambda_frame_under_decorator() {
    let err = stderr_of(&["-l", "-c", "lambda x: int(x) / 0"], "3\n");
    assert_eq!(
        err,
        indoc! {r#"
            Traceback (most recent call last):
              Fragment 1, in decorator spy::decorators::callable
                --callable 'lambda x: int(x) / 0'
                input to fragment was '3'
              File "Fragment 1", line 1, in <lambda>
                lambda x: int(x) / 0
            ZeroDivisionError: division by zero
        "#}
    );
}

#[test]
fn test_streams_are_printed_without_consuming() {
    let out = stdout_of(&["-l", "spy.collect()"], "1\n2\n3\n4\n5\n6\n7\n");
    assert_eq!(out, "<iterator>\n".repeat(7));
}

#[test]
fn test_huge_sequence_operations_raise() {
    let err = stderr_of(&["pipe * 9223372036854775807"], "abc");
    assert!(err.ends_with("OverflowError: repeated sequence is too long\n"));
    let out = stdout_of(&["pipe[1::9223372036854775807]"], "abc");
    assert_eq!(out, "b\n");
}

#[test]
fn test_printed_results_survive_failure() {
    let output = spy()
        .args(["-l", "10 // int(pipe)"])
        .write_stdin("5\n0\n")
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(1));
    assert_eq!(String::from_utf8(output.stdout).unwrap(), "2\n");
    let err = String::from_utf8(output.stderr).unwrap();
    assert!(err.ends_with("ZeroDivisionError: integer division or modulo by zero\n"));
}

#[test]
fn test_syntax_error() {
    let err = stderr_of(&["pipe", "pipe +"], "");
    let lines: Vec<&str> = err.lines().collect();
    assert_eq!(lines[0], "  File \"Fragment 2\", line 1");
    assert_eq!(lines[1], "    pipe +");
    assert_eq!(lines[3], "SyntaxError: unexpected end of fragment");
}

#[test]
fn test_usage_errors() {
    let err = stderr_of(&["-x", "pipe"], "");
    assert_eq!(err, "spy: Unknown option '-x'\n");
    let err = stderr_of(&["pipe", "--accumulate"], "");
    assert_eq!(err, "spy: No value found after --accumulate\n");
}

#[test]
fn test_show_fragments() {
    let out = stdout_of(&["--show-fragments", "-l", "-f", "pipe", "pipe.upper()"], "");
    let expected = [
        "    | <internal> spy::fragments::many",
        "  1 | --filter 'pipe'",
        "  2 | pipe.upper()",
        "  3 | <internal> spy::fragments::limit",
        "  4 | <internal> spy::fragments::print",
    ];
    assert_eq!(out, expected.join("\n") + "\n");
}

#[test]
fn test_raw_traceback() {
    let err = stderr_of(&["--no-exception-handling", "-l", "int(pipe)"], "x\n");
    assert!(err.contains("  <chain>"));
    assert!(err.ends_with("ValueError: invalid literal for int() with base 10: 'x'\n"));
}
