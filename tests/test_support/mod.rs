#![allow(dead_code)]

use serde_json::json;
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::time::{SystemTime, UNIX_EPOCH};

pub fn temp_dir(prefix: &str) -> PathBuf {
    let p = std::env::temp_dir().join(format!(
        "{}-{}",
        prefix,
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock")
            .as_nanos()
    ));
    std::fs::create_dir_all(&p).expect("create temp dir");
    p
}

pub fn spawn_sidecar() -> (Child, ChildStdin, BufReader<ChildStdout>) {
    let exe = env!("CARGO_BIN_EXE_studyplan-sidecar");
    let mut child = Command::new(exe)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn studyplan-sidecar");
    let stdin = child.stdin.take().expect("child stdin");
    let stdout = child.stdout.take().expect("child stdout");
    (child, stdin, BufReader::new(stdout))
}

pub fn request(
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

pub fn request_ok(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let value = request(stdin, reader, id, method, params);
    assert_eq!(
        value.get("ok").and_then(|v| v.as_bool()),
        Some(true),
        "{} failed: {}",
        method,
        value
    );
    value.get("result").cloned().unwrap_or(serde_json::Value::Null)
}

/// Returns the error code of a failed request.
pub fn request_err(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> String {
    let value = request(stdin, reader, id, method, params);
    assert_eq!(
        value.get("ok").and_then(|v| v.as_bool()),
        Some(false),
        "{} unexpectedly succeeded: {}",
        method,
        value
    );
    value
        .get("error")
        .and_then(|e| e.get("code"))
        .and_then(|v| v.as_str())
        .unwrap_or("unknown")
        .to_string()
}

/// Opens a fresh workspace and imports a grade-8 catalog: Matematik {t1,t2,t3}
/// and Fen Bilimleri {f1}.
pub fn open_seeded_workspace(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    prefix: &str,
) -> PathBuf {
    let workspace = temp_dir(prefix);
    let _ = request_ok(
        stdin,
        reader,
        "ws",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let _ = request_ok(
        stdin,
        reader,
        "seed",
        "catalog.import",
        json!({
            "subjects": [
                { "id": "mat", "name": "Matematik", "code": "MAT", "color": "#1e88e5", "icon": "calculator", "grade": 8 },
                { "id": "fen", "name": "Fen Bilimleri", "code": "FEN", "color": "#43a047", "icon": "flask", "grade": 8 },
                { "id": "mat7", "name": "Matematik", "code": "MAT", "grade": 7 }
            ],
            "topics": [
                { "id": "t1", "subjectId": "mat", "name": "Çarpanlar ve Katlar", "difficultyLevel": 2, "importanceLevel": 3, "lgsFrequency": 2 },
                { "id": "t2", "subjectId": "mat", "name": "Üslü İfadeler", "difficultyLevel": 2, "importanceLevel": 2, "lgsFrequency": 1 },
                { "id": "t3", "subjectId": "mat", "name": "Kareköklü İfadeler", "difficultyLevel": 3, "importanceLevel": 3, "lgsFrequency": 2 },
                { "id": "f1", "subjectId": "fen", "name": "Mevsimler ve İklim", "difficultyLevel": 1, "importanceLevel": 2, "lgsFrequency": 1 },
                { "id": "m7", "subjectId": "mat7", "name": "Tam Sayılar" }
            ]
        }),
    );
    workspace
}

pub fn topic_ids(v: &serde_json::Value) -> Vec<String> {
    v.as_array()
        .map(|arr| {
            arr.iter()
                .filter_map(|t| t.get("id").and_then(|x| x.as_str()).map(str::to_string))
                .collect()
        })
        .unwrap_or_default()
}

/// Topic ids in the bucket for `month` of a `plan` snapshot.
pub fn bucket_ids(plan: &serde_json::Value, month: u64) -> Vec<String> {
    plan.get("months")
        .and_then(|v| v.as_array())
        .and_then(|months| {
            months
                .iter()
                .find(|m| m.get("month").and_then(|x| x.as_u64()) == Some(month))
        })
        .map(|m| topic_ids(&m["topics"]))
        .unwrap_or_default()
}
