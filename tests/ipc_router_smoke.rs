use std::io::{BufRead, BufReader, Write};
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};

use serde_json::json;

fn spawn_sidecar() -> (Child, ChildStdin, BufReader<ChildStdout>) {
    let exe = env!("CARGO_BIN_EXE_meritd");
    let mut child = Command::new(exe)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn meritd");
    let stdin = child.stdin.take().expect("child stdin");
    let stdout = child.stdout.take().expect("child stdout");
    (child, stdin, BufReader::new(stdout))
}

fn request(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let payload = json!({
        "id": id,
        "method": method,
        "params": params,
    });
    writeln!(stdin, "{}", payload).expect("write request");
    stdin.flush().expect("flush request");

    let mut line = String::new();
    reader.read_line(&mut line).expect("read response line");
    assert!(!line.trim().is_empty(), "empty response for {}", method);
    let value: serde_json::Value = serde_json::from_str(line.trim()).expect("parse response json");
    assert_eq!(value.get("id").and_then(|v| v.as_str()), Some(id));
    value
}

fn error_code(resp: &serde_json::Value) -> &str {
    resp.get("error")
        .and_then(|e| e.get("code"))
        .and_then(|v| v.as_str())
        .unwrap_or("")
}

#[test]
fn router_covers_every_method() {
    let workspace = tempfile::tempdir().expect("temp workspace");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();

    let resp = request(&mut stdin, &mut reader, "1", "health", json!({}));
    assert_eq!(resp.get("ok").and_then(|v| v.as_bool()), Some(true));
    assert!(resp["result"]["workspacePath"].is_null());

    // Engine methods require a workspace.
    let resp = request(&mut stdin, &mut reader, "2", "engine.runBatch", json!({}));
    assert_eq!(error_code(&resp), "no_workspace");

    let resp = request(
        &mut stdin,
        &mut reader,
        "3",
        "workspace.select",
        json!({ "path": workspace.path().to_string_lossy() }),
    );
    assert_eq!(resp.get("ok").and_then(|v| v.as_bool()), Some(true));

    // No current academic year yet: a clean zero-student summary.
    let resp = request(&mut stdin, &mut reader, "4", "engine.runBatch", json!({}));
    assert_eq!(resp.get("ok").and_then(|v| v.as_bool()), Some(true));
    assert_eq!(resp["result"]["students"], json!(0));
    assert_eq!(resp["result"]["awardsGranted"], json!(0));

    let resp = request(
        &mut stdin,
        &mut reader,
        "5",
        "activity.logEvent",
        json!({
            "eventName": "visited_calendar",
            "studentId": "s1",
            "appId": "school-app",
            "academicYear": "y1"
        }),
    );
    assert_eq!(error_code(&resp), "unauthenticated");

    let resp = request(
        &mut stdin,
        &mut reader,
        "6",
        "badges.list",
        json!({ "studentId": "nobody" }),
    );
    assert_eq!(error_code(&resp), "not_found");

    let resp = request(&mut stdin, &mut reader, "7", "no.such.method", json!({}));
    assert_eq!(error_code(&resp), "not_implemented");

    drop(stdin);
    let _ = child.wait();
}
