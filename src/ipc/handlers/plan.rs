use crate::ipc::error::{err, ok, plan_err};
use crate::ipc::handlers::setup::load_plan_settings;
use crate::ipc::helpers::{db_conn, opt_year, required_i64, required_str};
use crate::ipc::types::{AppState, Request};
use crate::plan::{load_plan, MoveOutcome, PlanError, PlanSession};
use crate::store::{PlacementStore, SqliteStore};
use serde_json::json;

fn session_json(session: &PlanSession) -> serde_json::Value {
    json!({
        "userId": session.user_id(),
        "grade": session.grade(),
        "plan": session.state().snapshot(),
        "pendingNotices": session.pending_notices().len(),
    })
}

fn handle_load(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let user_id = match required_str(req, "userId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let grade = match required_i64(req, "grade") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let year = match opt_year(req) {
        Ok(v) => v,
        Err(e) => return e,
    };

    let settings = load_plan_settings(conn);
    let year = year.unwrap_or_else(|| settings.effective_year());
    let store = SqliteStore::new(conn);
    match load_plan(&store, &store, &user_id, grade, year, settings) {
        Ok(session) => {
            let resp = ok(&req.id, session_json(&session));
            state.plan = Some(session);
            resp
        }
        Err(e) => {
            // A failed load never leaves a half-built plan behind.
            state.plan = None;
            plan_err(&req.id, &e)
        }
    }
}

fn handle_get(state: &mut AppState, req: &Request) -> serde_json::Value {
    match state.plan.as_ref() {
        Some(session) => ok(&req.id, session_json(session)),
        None => plan_err(&req.id, &PlanError::NoSession),
    }
}

fn handle_select_subject(state: &mut AppState, req: &Request) -> serde_json::Value {
    let subject_id = match required_str(req, "subjectId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let Some(session) = state.plan.as_mut() else {
        return plan_err(&req.id, &PlanError::NoSession);
    };
    match session.select_subject(&subject_id) {
        Some(unplanned) => ok(
            &req.id,
            json!({ "subjectId": subject_id, "unplannedTopics": unplanned }),
        ),
        None => err(&req.id, "not_found", "subject not found", None),
    }
}

fn handle_move(state: &mut AppState, req: &Request) -> serde_json::Value {
    let AppState { db, plan, .. } = state;
    let Some(conn) = db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let Some(session) = plan.as_mut() else {
        return plan_err(&req.id, &PlanError::NoSession);
    };
    let topic_id = match required_str(req, "topicId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let source = req.params.get("source").and_then(|v| v.as_str());
    let target = req.params.get("target").and_then(|v| v.as_str());

    let store = SqliteStore::new(conn);
    let outcome = session.handle_move_intent(&store, &topic_id, source, target);
    let (applied, container) = match outcome {
        MoveOutcome::Applied(c) => (true, Some(c.id())),
        MoveOutcome::Ignored => (false, None),
    };
    let mut resp = session_json(session);
    resp["applied"] = json!(applied);
    resp["container"] = json!(container);
    ok(&req.id, resp)
}

fn handle_reload(state: &mut AppState, req: &Request) -> serde_json::Value {
    let AppState { db, plan, .. } = state;
    let Some(conn) = db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let Some(session) = plan.as_mut() else {
        return plan_err(&req.id, &PlanError::NoSession);
    };
    let store = SqliteStore::new(conn);
    match session.reload_from_store(&store, &store) {
        Ok(()) => ok(&req.id, session_json(session)),
        Err(e) => plan_err(&req.id, &e),
    }
}

fn handle_notices_drain(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(session) = state.plan.as_mut() else {
        return plan_err(&req.id, &PlanError::NoSession);
    };
    let notices = session.drain_notices();
    ok(&req.id, json!({ "notices": notices }))
}

fn handle_placements_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let user_id = match required_str(req, "userId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let year = match opt_year(req) {
        Ok(Some(v)) => v,
        Ok(None) => load_plan_settings(conn).effective_year(),
        Err(e) => return e,
    };
    match SqliteStore::new(conn).list_placements(&user_id, year) {
        Ok(rows) => ok(&req.id, json!({ "year": year, "placements": rows })),
        Err(e) => err(&req.id, "placements_unavailable", e.to_string(), None),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "plan.load" => Some(handle_load(state, req)),
        "plan.get" => Some(handle_get(state, req)),
        "plan.selectSubject" => Some(handle_select_subject(state, req)),
        "plan.move" => Some(handle_move(state, req)),
        "plan.reload" => Some(handle_reload(state, req)),
        "plan.notices.drain" => Some(handle_notices_drain(state, req)),
        "plan.placements.list" => Some(handle_placements_list(state, req)),
        _ => None,
    }
}
