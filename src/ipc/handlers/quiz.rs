use crate::ipc::error::{err, ok, quiz_err};
use crate::ipc::handlers::setup::load_plan_settings;
use crate::ipc::helpers::{db_conn, event_ms, required_str};
use crate::ipc::types::{AppState, Request};
use crate::plan::PlanSession;
use crate::quiz::{Question, QuizSession, QuizStatus, MAX_TIME_LIMIT_MS};
use crate::store::{MetricKind, PlacementStore, SqliteStore};
use rusqlite::{params, Connection};
use serde_json::json;
use std::collections::HashMap;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Completed quizzes whose results are stored stay queryable until this many
/// newer ones have settled.
const SETTLED_QUIZZES_KEPT: usize = 16;

fn quiz_json(quiz: &QuizSession, now_ms: u64) -> serde_json::Value {
    let summary = (quiz.status() == QuizStatus::Completed).then(|| quiz.summary());
    json!({
        "quizId": quiz.id(),
        "userId": quiz.user_id(),
        "title": quiz.title(),
        "status": quiz.status(),
        "startedAtMs": quiz.started_at_ms(),
        "finishedAtMs": quiz.finished_at_ms(),
        "remainingMs": quiz.remaining_ms(now_ms),
        "answered": quiz.answers().len(),
        "summary": summary,
    })
}

/// Stores a completed quiz and feeds its per-topic accuracy into the user's
/// placements for the plan year. Returns the number of placement rows updated.
fn record_results(
    conn: &Connection,
    plan: Option<&mut PlanSession>,
    quiz: &QuizSession,
) -> anyhow::Result<usize> {
    let summary = quiz.summary();
    let plan = plan.filter(|s| s.user_id() == quiz.user_id());
    let year = match plan.as_ref() {
        Some(session) => session.year(),
        None => load_plan_settings(conn).effective_year(),
    };

    let finished_at_ms = i64::try_from(quiz.finished_at_ms().unwrap_or(0))?;
    let started_at_ms = i64::try_from(quiz.started_at_ms().unwrap_or(0))?;

    // The results row and the metric writes land together or not at all, so
    // a failed attempt can be retried.
    let tx = conn.unchecked_transaction()?;
    tx.execute(
        "INSERT INTO quiz_results(id, user_id, title, total, correct, accuracy, started_at_ms, finished_at_ms, per_topic_json)
         VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?)",
        params![
            quiz.id(),
            quiz.user_id(),
            quiz.title(),
            summary.total as i64,
            summary.correct as i64,
            summary.accuracy,
            started_at_ms,
            finished_at_ms,
            serde_json::to_string(&summary.per_topic)?,
        ],
    )?;
    let mut updated = 0;
    {
        let store = SqliteStore::new(&tx);
        for score in &summary.per_topic {
            updated += store.set_topic_metric(
                quiz.user_id(),
                &score.topic_id,
                year,
                MetricKind::Test,
                score.accuracy,
            )?;
        }
    }
    tx.commit()?;

    if let Some(session) = plan {
        if let Err(e) = session.refresh_metrics(&SqliteStore::new(conn)) {
            warn!(error = %e, "could not refresh plan metrics");
        }
    }
    info!(
        quiz_id = quiz.id(),
        user_id = quiz.user_id(),
        accuracy = summary.accuracy,
        updated,
        "quiz results recorded"
    );
    Ok(updated)
}

enum Settled {
    /// Nothing to store on this call.
    Idle,
    Recorded(usize),
    /// Storing failed; the quiz stays unrecorded and the next call retries.
    Failed(String),
}

/// Persists results the first time a quiz is seen completed.
fn settle(state: &mut AppState, quiz_id: &str) -> Settled {
    let AppState { db, plan, quizzes, .. } = state;
    let (Some(conn), Some(quiz)) = (db.as_ref(), quizzes.get_mut(quiz_id)) else {
        return Settled::Idle;
    };
    if !quiz.needs_recording() {
        return Settled::Idle;
    }
    match record_results(conn, plan.as_mut(), quiz) {
        Ok(n) => {
            quiz.mark_recorded();
            Settled::Recorded(n)
        }
        Err(e) => {
            warn!(quiz_id, error = %e, "failed to record quiz results");
            Settled::Failed(e.to_string())
        }
    }
}

/// Drops the oldest settled quizzes beyond `keep`. Quizzes that are still
/// running, or whose results are not stored yet, are never dropped.
fn prune_settled(quizzes: &mut HashMap<String, QuizSession>, keep: usize) {
    let mut settled: Vec<(u64, String)> = quizzes
        .values()
        .filter(|q| q.status() == QuizStatus::Completed && !q.needs_recording())
        .map(|q| (q.finished_at_ms().unwrap_or(0), q.id().to_string()))
        .collect();
    if settled.len() <= keep {
        return;
    }
    settled.sort();
    let excess = settled.len() - keep;
    for (_, id) in settled.into_iter().take(excess) {
        quizzes.remove(&id);
        debug!(quiz_id = %id, "settled quiz evicted");
    }
}

fn respond(state: &mut AppState, req: &Request, quiz_id: &str, now_ms: u64, extra: serde_json::Value) -> serde_json::Value {
    let settled = settle(state, quiz_id);
    let Some(quiz) = state.quizzes.get(quiz_id) else {
        return err(&req.id, "quiz_not_found", "quiz not found", None);
    };
    let mut body = quiz_json(quiz, now_ms);
    let (updated, record_error) = match settled {
        Settled::Idle => (None, None),
        Settled::Recorded(n) => (Some(n), None),
        Settled::Failed(msg) => (None, Some(msg)),
    };
    body["placementsUpdated"] = json!(updated);
    body["recordError"] = json!(record_error);
    if let (Some(obj), Some(extra_obj)) = (body.as_object_mut(), extra.as_object()) {
        for (k, v) in extra_obj {
            obj.insert(k.clone(), v.clone());
        }
    }
    ok(&req.id, body)
}

fn handle_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    if let Err(e) = db_conn(state, req) {
        return e;
    }
    let user_id = match required_str(req, "userId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let title = req
        .params
        .get("title")
        .and_then(|v| v.as_str())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "Quiz".to_string());
    let questions: Vec<Question> = match req.params.get("questions") {
        Some(v) => match serde_json::from_value(v.clone()) {
            Ok(q) => q,
            Err(e) => return err(&req.id, "bad_params", format!("questions: {}", e), None),
        },
        None => return err(&req.id, "bad_params", "missing questions", None),
    };
    let time_limit_ms = match req.params.get("timeLimitSeconds") {
        None => None,
        Some(v) if v.is_null() => None,
        Some(v) => match v.as_u64().and_then(|s| s.checked_mul(1000)) {
            Some(ms) if ms <= MAX_TIME_LIMIT_MS => Some(ms),
            _ => {
                return err(
                    &req.id,
                    "bad_params",
                    format!("timeLimitSeconds must be an integer in 0..={}", MAX_TIME_LIMIT_MS / 1000),
                    None,
                )
            }
        },
    };

    let quiz_id = Uuid::new_v4().to_string();
    let quiz = match QuizSession::new(quiz_id.clone(), user_id, title, questions, time_limit_ms) {
        Ok(q) => q,
        Err(e) => return quiz_err(&req.id, &e),
    };
    let body = quiz_json(&quiz, 0);
    prune_settled(&mut state.quizzes, SETTLED_QUIZZES_KEPT);
    state.quizzes.insert(quiz_id, quiz);
    ok(&req.id, body)
}

fn handle_start(state: &mut AppState, req: &Request) -> serde_json::Value {
    let quiz_id = match required_str(req, "quizId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let now = match event_ms(req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let Some(quiz) = state.quizzes.get_mut(&quiz_id) else {
        return err(&req.id, "quiz_not_found", "quiz not found", None);
    };
    if let Err(e) = quiz.start(now) {
        return quiz_err(&req.id, &e);
    }
    info!(quiz_id = %quiz_id, "quiz started");
    respond(state, req, &quiz_id, now, json!({}))
}

fn handle_answer(state: &mut AppState, req: &Request) -> serde_json::Value {
    let quiz_id = match required_str(req, "quizId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let question_id = match required_str(req, "questionId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let Some(choice_index) = req
        .params
        .get("choiceIndex")
        .and_then(|v| v.as_u64())
        .and_then(|v| usize::try_from(v).ok())
    else {
        return err(&req.id, "bad_params", "missing choiceIndex", None);
    };
    let now = match event_ms(req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let Some(quiz) = state.quizzes.get_mut(&quiz_id) else {
        return err(&req.id, "quiz_not_found", "quiz not found", None);
    };
    match quiz.answer(&question_id, choice_index, now) {
        Ok(record) => respond(state, req, &quiz_id, now, json!({ "answer": record })),
        Err(e) => {
            // An expired quiz still gets its results stored.
            if let Settled::Failed(msg) = settle(state, &quiz_id) {
                warn!(quiz_id = %quiz_id, error = %msg, "expired quiz left unrecorded");
            }
            quiz_err(&req.id, &e)
        }
    }
}

fn handle_finish(state: &mut AppState, req: &Request) -> serde_json::Value {
    let quiz_id = match required_str(req, "quizId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let now = match event_ms(req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let Some(quiz) = state.quizzes.get_mut(&quiz_id) else {
        return err(&req.id, "quiz_not_found", "quiz not found", None);
    };
    if let Err(e) = quiz.finish(now) {
        return quiz_err(&req.id, &e);
    }
    respond(state, req, &quiz_id, now, json!({}))
}

fn handle_status(state: &mut AppState, req: &Request) -> serde_json::Value {
    let quiz_id = match required_str(req, "quizId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let now = match event_ms(req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let Some(quiz) = state.quizzes.get_mut(&quiz_id) else {
        return err(&req.id, "quiz_not_found", "quiz not found", None);
    };
    quiz.tick(now);
    respond(state, req, &quiz_id, now, json!({}))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "quiz.create" => Some(handle_create(state, req)),
        "quiz.start" => Some(handle_start(state, req)),
        "quiz.answer" => Some(handle_answer(state, req)),
        "quiz.finish" => Some(handle_finish(state, req)),
        "quiz.status" => Some(handle_status(state, req)),
        _ => None,
    }
}
