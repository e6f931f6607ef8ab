use crate::ipc::error::{err, ok};
use crate::ipc::handlers::setup::load_plan_settings;
use crate::ipc::helpers::{opt_year, required_str};
use crate::ipc::types::{AppState, Request};
use crate::plan::validate_accuracy;
use crate::store::{MetricKind, PlacementStore, SqliteStore};
use serde_json::json;
use tracing::{info, warn};

fn handle_record_exam(state: &mut AppState, req: &Request) -> serde_json::Value {
    let AppState { db, plan, .. } = state;
    let Some(conn) = db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let user_id = match required_str(req, "userId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let topic_id = match required_str(req, "topicId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let year = match opt_year(req) {
        Ok(Some(v)) => v,
        Ok(None) => match plan.as_ref().filter(|s| s.user_id() == user_id) {
            Some(session) => session.year(),
            None => load_plan_settings(conn).effective_year(),
        },
        Err(e) => return e,
    };
    let Some(accuracy) = req
        .params
        .get("accuracy")
        .and_then(|v| v.as_f64())
        .and_then(validate_accuracy)
    else {
        return err(&req.id, "bad_params", "accuracy must be a number in 0..=100", None);
    };

    let store = SqliteStore::new(conn);
    let updated = match store.set_topic_metric(&user_id, &topic_id, year, MetricKind::Exam, accuracy) {
        Ok(n) => n,
        Err(e) => return err(&req.id, "db_update_failed", e.to_string(), None),
    };
    info!(%user_id, %topic_id, year, accuracy, updated, "exam accuracy recorded");

    if let Some(session) = plan
        .as_mut()
        .filter(|s| s.user_id() == user_id && s.year() == year)
    {
        if let Err(e) = session.refresh_metrics(&store) {
            warn!(error = %e, "could not refresh plan metrics");
        }
    }
    ok(&req.id, json!({ "updated": updated, "year": year }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "metrics.recordExam" => Some(handle_record_exam(state, req)),
        _ => None,
    }
}
