mod test_support;

use serde_json::json;
use test_support::{open_seeded_workspace, request_err, request_ok, spawn_sidecar};

fn questions() -> serde_json::Value {
    json!([
        { "id": "q1", "topicId": "t1", "prompt": "12 ile 18'in EBOB'u?", "choices": ["3", "6", "9", "36"], "answerIndex": 1 },
        { "id": "q2", "topicId": "t1", "prompt": "24'ün asal çarpanları?", "choices": ["2,3", "2,5", "3,5"], "answerIndex": 0 },
        { "id": "q3", "topicId": "t2", "prompt": "2^3 kaçtır?", "choices": ["6", "8"], "answerIndex": 1 }
    ])
}

fn topic_accuracy(plan: &serde_json::Value, topic_id: &str) -> serde_json::Value {
    plan["months"]
        .as_array()
        .expect("months")
        .iter()
        .flat_map(|m| m["topics"].as_array().cloned().unwrap_or_default())
        .find(|t| t["id"].as_str() == Some(topic_id))
        .map(|t| t["testAccuracy"].clone())
        .unwrap_or(serde_json::Value::Null)
}

#[test]
fn completed_quiz_feeds_test_accuracy_into_plan() {
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let _ = open_seeded_workspace(&mut stdin, &mut reader, "studyplan-quiz-complete");
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "plan.load",
        json!({ "userId": "u1", "grade": 8, "year": 2026 }),
    );
    for (id, topic, target) in [("2", "t1", "month-9"), ("3", "t2", "month-11")] {
        let _ = request_ok(
            &mut stdin,
            &mut reader,
            id,
            "plan.move",
            json!({ "topicId": topic, "target": target }),
        );
    }

    let created = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "quiz.create",
        json!({ "userId": "u1", "title": "Ünite 1", "questions": questions() }),
    );
    assert_eq!(created["status"], "notStarted");
    let quiz_id = created["quizId"].as_str().expect("quiz id").to_string();

    let early = request_err(
        &mut stdin,
        &mut reader,
        "5",
        "quiz.answer",
        json!({ "quizId": quiz_id, "questionId": "q1", "choiceIndex": 1, "atMs": 500 }),
    );
    assert_eq!(early, "invalid_transition");

    let started = request_ok(
        &mut stdin,
        &mut reader,
        "6",
        "quiz.start",
        json!({ "quizId": quiz_id, "atMs": 1_000 }),
    );
    assert_eq!(started["status"], "inProgress");
    assert!(started["remainingMs"].is_null());

    let a1 = request_ok(
        &mut stdin,
        &mut reader,
        "7",
        "quiz.answer",
        json!({ "quizId": quiz_id, "questionId": "q1", "choiceIndex": 1, "atMs": 4_000 }),
    );
    assert_eq!(a1["answer"]["correct"], true);
    assert_eq!(a1["answer"]["elapsedMs"], 3_000);
    assert!(a1["placementsUpdated"].is_null());

    let dup = request_err(
        &mut stdin,
        &mut reader,
        "8",
        "quiz.answer",
        json!({ "quizId": quiz_id, "questionId": "q1", "choiceIndex": 0, "atMs": 4_500 }),
    );
    assert_eq!(dup, "already_answered");

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "9",
        "quiz.answer",
        json!({ "quizId": quiz_id, "questionId": "q2", "choiceIndex": 2, "atMs": 6_000 }),
    );
    let last = request_ok(
        &mut stdin,
        &mut reader,
        "10",
        "quiz.answer",
        json!({ "quizId": quiz_id, "questionId": "q3", "choiceIndex": 1, "atMs": 9_000 }),
    );
    assert_eq!(last["status"], "completed");
    assert_eq!(last["finishedAtMs"], 9_000);
    assert_eq!(last["placementsUpdated"], 2);
    assert!(last["recordError"].is_null());
    let summary = &last["summary"];
    assert_eq!(summary["total"], 3);
    assert_eq!(summary["correct"], 2);
    assert_eq!(summary["accuracy"], 66.7);
    assert_eq!(summary["avgSecondsPerAnswer"], 2.7);
    assert_eq!(
        summary["perTopic"],
        json!([
            { "topicId": "t1", "total": 2, "correct": 1, "accuracy": 50.0 },
            { "topicId": "t2", "total": 1, "correct": 1, "accuracy": 100.0 }
        ])
    );

    let plan = request_ok(&mut stdin, &mut reader, "11", "plan.get", json!({}));
    assert_eq!(topic_accuracy(&plan["plan"], "t1"), 50.0);
    assert_eq!(topic_accuracy(&plan["plan"], "t2"), 100.0);

    // Results are stored once; later calls just report the summary.
    let finished = request_ok(
        &mut stdin,
        &mut reader,
        "12",
        "quiz.finish",
        json!({ "quizId": quiz_id, "atMs": 10_000 }),
    );
    assert_eq!(finished["status"], "completed");
    assert!(finished["placementsUpdated"].is_null());
}

#[test]
fn time_limit_completes_quiz_at_deadline() {
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let _ = open_seeded_workspace(&mut stdin, &mut reader, "studyplan-quiz-deadline");
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "plan.load",
        json!({ "userId": "u1", "grade": 8, "year": 2026 }),
    );
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "plan.move",
        json!({ "topicId": "t1", "target": "month-9" }),
    );

    let created = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "quiz.create",
        json!({ "userId": "u1", "questions": questions(), "timeLimitSeconds": 10 }),
    );
    let quiz_id = created["quizId"].as_str().expect("quiz id").to_string();
    assert_eq!(created["title"], "Quiz");

    let started = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "quiz.start",
        json!({ "quizId": quiz_id, "atMs": 0 }),
    );
    assert_eq!(started["remainingMs"], 10_000);

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "quiz.answer",
        json!({ "quizId": quiz_id, "questionId": "q1", "choiceIndex": 1, "atMs": 5_000 }),
    );
    let status = request_ok(
        &mut stdin,
        &mut reader,
        "6",
        "quiz.status",
        json!({ "quizId": quiz_id, "atMs": 7_500 }),
    );
    assert_eq!(status["status"], "inProgress");
    assert_eq!(status["remainingMs"], 2_500);

    let late = request_err(
        &mut stdin,
        &mut reader,
        "7",
        "quiz.answer",
        json!({ "quizId": quiz_id, "questionId": "q2", "choiceIndex": 0, "atMs": 20_000 }),
    );
    assert_eq!(late, "time_expired");

    let status = request_ok(
        &mut stdin,
        &mut reader,
        "8",
        "quiz.status",
        json!({ "quizId": quiz_id, "atMs": 21_000 }),
    );
    assert_eq!(status["status"], "completed");
    assert_eq!(status["finishedAtMs"], 10_000);
    assert_eq!(status["summary"]["answered"], 1);
    assert_eq!(status["summary"]["accuracy"], 33.3);

    let plan = request_ok(&mut stdin, &mut reader, "9", "plan.get", json!({}));
    assert_eq!(topic_accuracy(&plan["plan"], "t1"), 50.0);
}

#[test]
fn invalid_quizzes_are_rejected() {
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let _ = open_seeded_workspace(&mut stdin, &mut reader, "studyplan-quiz-invalid");

    let code = request_err(
        &mut stdin,
        &mut reader,
        "1",
        "quiz.create",
        json!({ "userId": "u1", "questions": [] }),
    );
    assert_eq!(code, "bad_params");

    let code = request_err(
        &mut stdin,
        &mut reader,
        "2",
        "quiz.create",
        json!({
            "userId": "u1",
            "questions": [
                { "id": "q1", "topicId": "t1", "prompt": "?", "choices": ["a"], "answerIndex": 0 }
            ]
        }),
    );
    assert_eq!(code, "bad_params");

    let code = request_err(
        &mut stdin,
        &mut reader,
        "3",
        "quiz.status",
        json!({ "quizId": "missing" }),
    );
    assert_eq!(code, "quiz_not_found");
}

#[test]
fn out_of_range_clock_values_are_rejected() {
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let _ = open_seeded_workspace(&mut stdin, &mut reader, "studyplan-quiz-bounds");

    for (i, limit) in [json!(u64::MAX / 1000), json!(86_401), json!(-5)].into_iter().enumerate() {
        let code = request_err(
            &mut stdin,
            &mut reader,
            &format!("limit-{}", i),
            "quiz.create",
            json!({ "userId": "u1", "questions": questions(), "timeLimitSeconds": limit }),
        );
        assert_eq!(code, "bad_params", "timeLimitSeconds {}", limit);
    }

    let created = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "quiz.create",
        json!({ "userId": "u1", "questions": questions(), "timeLimitSeconds": 86_400 }),
    );
    let quiz_id = created["quizId"].as_str().expect("quiz id").to_string();

    let code = request_err(
        &mut stdin,
        &mut reader,
        "2",
        "quiz.start",
        json!({ "quizId": quiz_id, "atMs": u64::MAX }),
    );
    assert_eq!(code, "bad_params");

    let started = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "quiz.start",
        json!({ "quizId": quiz_id, "atMs": i64::MAX as u64 - 1_000 }),
    );
    assert_eq!(started["status"], "inProgress");
    let answered = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "quiz.answer",
        json!({ "quizId": quiz_id, "questionId": "q1", "choiceIndex": 1, "atMs": i64::MAX as u64 - 500 }),
    );
    assert_eq!(answered["answer"]["elapsedMs"], 500);
    let finished = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "quiz.finish",
        json!({ "quizId": quiz_id, "atMs": i64::MAX as u64 }),
    );
    assert_eq!(finished["status"], "completed");
    assert!(finished["recordError"].is_null());

    let health = request_ok(&mut stdin, &mut reader, "6", "health", json!({}));
    assert_eq!(health["activeQuizzes"], 1);
}
