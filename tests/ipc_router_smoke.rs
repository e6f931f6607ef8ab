mod test_support;

use serde_json::json;
use std::io::Write;
use test_support::{open_seeded_workspace, request, request_ok, spawn_sidecar};

fn assert_dispatched(value: &serde_json::Value, method: &str) {
    if value.get("ok").and_then(|v| v.as_bool()) == Some(false) {
        let code = value
            .get("error")
            .and_then(|e| e.get("code"))
            .and_then(|v| v.as_str())
            .unwrap_or("unknown");
        assert_ne!(code, "not_implemented", "unexpected unknown method for {}", method);
    }
}

#[test]
fn router_dispatch_smoke_covers_handler_families() {
    let (_child, mut stdin, mut reader) = spawn_sidecar();

    let health = request_ok(&mut stdin, &mut reader, "h0", "health", json!({}));
    assert!(health["workspacePath"].is_null());
    assert_eq!(health["planLoaded"], false);

    let no_ws = request(&mut stdin, &mut reader, "nw", "plan.load", json!({ "userId": "u1", "grade": 8 }));
    assert_eq!(no_ws["error"]["code"], "no_workspace");

    let _ = open_seeded_workspace(&mut stdin, &mut reader, "studyplan-router-smoke");

    let calls = [
        ("catalog.subjects.list", json!({ "grade": 8 })),
        ("catalog.topics.list", json!({ "subjectIds": ["mat"] })),
        ("setup.get", json!({})),
        ("setup.update", json!({ "section": "plan", "patch": { "staleRowCleanup": true } })),
        ("plan.load", json!({ "userId": "u1", "grade": 8, "year": 2026 })),
        ("plan.get", json!({})),
        ("plan.selectSubject", json!({ "subjectId": "fen" })),
        ("plan.move", json!({ "topicId": "f1", "target": "month-9" })),
        ("plan.reload", json!({})),
        ("plan.notices.drain", json!({})),
        ("plan.placements.list", json!({ "userId": "u1", "year": 2026 })),
        ("metrics.recordExam", json!({ "userId": "u1", "topicId": "f1", "accuracy": 90 })),
        ("quiz.status", json!({ "quizId": "none" })),
    ];
    for (i, (method, params)) in calls.iter().enumerate() {
        let value = request(&mut stdin, &mut reader, &format!("c{}", i), method, params.clone());
        assert_dispatched(&value, method);
    }

    let subjects = request_ok(
        &mut stdin,
        &mut reader,
        "s",
        "catalog.subjects.list",
        json!({ "grade": 7 }),
    );
    assert_eq!(subjects["subjects"].as_array().map(|s| s.len()), Some(1));
    let topics = request_ok(
        &mut stdin,
        &mut reader,
        "t",
        "catalog.topics.list",
        json!({ "subjectIds": ["fen", "mat"] }),
    );
    assert_eq!(topics["topics"].as_array().map(|t| t.len()), Some(4));

    let health = request_ok(&mut stdin, &mut reader, "h1", "health", json!({}));
    assert_eq!(health["planLoaded"], true);

    let unknown = request(&mut stdin, &mut reader, "u", "grid.get", json!({}));
    assert_eq!(unknown["error"]["code"], "not_implemented");
}

#[test]
fn malformed_line_gets_anonymous_error_and_loop_continues() {
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    writeln!(stdin, "{{not json").expect("write");
    stdin.flush().expect("flush");

    let mut line = String::new();
    std::io::BufRead::read_line(&mut reader, &mut line).expect("read");
    let value: serde_json::Value = serde_json::from_str(line.trim()).expect("json");
    assert_eq!(value["ok"], false);
    assert_eq!(value["error"]["code"], "bad_json");

    let _ = request_ok(&mut stdin, &mut reader, "after", "health", json!({}));
}

#[test]
fn catalog_import_rejects_orphan_topics() {
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let _ = open_seeded_workspace(&mut stdin, &mut reader, "studyplan-router-orphans");
    let value = request(
        &mut stdin,
        &mut reader,
        "1",
        "catalog.import",
        json!({
            "subjects": [],
            "topics": [{ "id": "x1", "subjectId": "nope", "name": "Yetim" }]
        }),
    );
    assert_eq!(value["ok"], false);
}
