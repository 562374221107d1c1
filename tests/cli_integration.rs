//! Purpose: End-to-end tests for the `marklogic` CLI binary.
//! Exports: None (integration test module).
//! Role: Validate stdout/stderr contracts and exit codes across TCP.
//! Invariants: Uses a loopback canned-response listener per test.
//! Invariants: Child processes are waited on before assertions.

mod support;

use std::io::Write;
use std::process::{Command, Stdio};

use serde_json::json;
use support::{CannedResponse, MockServer};

fn cli(server: &MockServer) -> Command {
    let mut command = Command::new(env!("CARGO_BIN_EXE_marklogic"));
    command
        .arg("--host")
        .arg("127.0.0.1")
        .arg("--port")
        .arg(server.port().to_string());
    command
}

#[test]
fn get_prints_the_document_body() {
    let doc = json!({"title": "Test Document"});
    let server = MockServer::start(vec![CannedResponse::json(200, doc.clone())]);

    let output = cli(&server)
        .args(["get", "/docs/a.json"])
        .output()
        .expect("run cli");

    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));
    let stdout: serde_json::Value =
        serde_json::from_slice(output.stdout.trim_ascii_end()).expect("stdout json");
    assert_eq!(stdout, doc);
}

#[test]
fn put_reads_stdin_and_acknowledges() {
    let server = MockServer::start(vec![CannedResponse::new(201)]);

    let mut child = cli(&server)
        .args(["put", "/docs/a.json", "--collection", "articles"])
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("spawn cli");
    child
        .stdin
        .take()
        .expect("stdin")
        .write_all(b"{\"title\": \"T\"}")
        .expect("write stdin");
    let output = child.wait_with_output().expect("wait");

    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));
    let stdout: serde_json::Value =
        serde_json::from_slice(output.stdout.trim_ascii_end()).expect("stdout json");
    assert_eq!(stdout, json!({"ok": true, "uri": "/docs/a.json"}));

    let request = &server.requests()[0];
    assert_eq!(request.method, "PUT");
    assert_eq!(request.query("collection").as_deref(), Some("articles"));
    let sent: serde_json::Value = serde_json::from_slice(&request.body).expect("sent body");
    assert_eq!(sent, json!({"title": "T"}));
}

#[test]
fn api_failures_emit_json_errors_and_exit_nonzero() {
    let server = MockServer::start(vec![CannedResponse::text(404, "gone")]);

    let output = cli(&server)
        .args(["get", "/docs/missing.json"])
        .output()
        .expect("run cli");

    assert_eq!(output.status.code(), Some(5));
    let stderr: serde_json::Value =
        serde_json::from_slice(output.stderr.trim_ascii_end()).expect("stderr json");
    assert_eq!(stderr["error"]["kind"], "Api");
    assert_eq!(stderr["error"]["status"], 404);
}

#[test]
fn malformed_permission_exits_with_invalid_argument_code() {
    let server = MockServer::start(Vec::new());

    let mut child = cli(&server)
        .args(["put", "/docs/a.json", "--perm", "editor:bogus"])
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("spawn cli");
    child
        .stdin
        .take()
        .expect("stdin")
        .write_all(b"{}")
        .expect("write stdin");
    let output = child.wait_with_output().expect("wait");

    assert_eq!(output.status.code(), Some(2));
    assert!(server.requests().is_empty());
}

#[test]
fn search_passes_params_through() {
    let server = MockServer::start(vec![CannedResponse::json(200, json!({"results": []}))]);

    let output = cli(&server)
        .args(["search", "cat", "--param", "pageLength=5"])
        .output()
        .expect("run cli");

    assert!(output.status.success());
    let request = &server.requests()[0];
    assert_eq!(request.query("q").as_deref(), Some("cat"));
    assert_eq!(request.query("pageLength").as_deref(), Some("5"));
}

#[test]
fn eval_sends_inline_code() {
    let server = MockServer::start(vec![CannedResponse::text(200, "--x\r\n2\r\n--x--")]);

    let output = cli(&server)
        .args(["eval", "-e", "1 + 1", "--var", "n=1"])
        .output()
        .expect("run cli");

    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));
    let request = &server.requests()[0];
    assert_eq!(request.method, "POST");
    let body = String::from_utf8(request.body.clone()).expect("body");
    assert!(body.starts_with("xquery=1+%2B+1"));
    assert!(body.contains("vars=%7B%22n%22%3A1%7D"));
}
