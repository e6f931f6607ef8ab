use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{db_conn, required_i64};
use crate::ipc::types::{AppState, Request};
use crate::store::{SqliteStore, Subject, Topic, TopicCatalog};
use serde_json::json;
use tracing::info;

fn handle_import(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let subjects: Vec<Subject> = match req.params.get("subjects") {
        None => Vec::new(),
        Some(v) => match serde_json::from_value(v.clone()) {
            Ok(s) => s,
            Err(e) => return err(&req.id, "bad_params", format!("subjects: {}", e), None),
        },
    };
    let topics: Vec<Topic> = match req.params.get("topics") {
        None => Vec::new(),
        Some(v) => match serde_json::from_value(v.clone()) {
            Ok(t) => t,
            Err(e) => return err(&req.id, "bad_params", format!("topics: {}", e), None),
        },
    };
    if subjects.iter().any(|s| s.id.trim().is_empty()) || topics.iter().any(|t| t.id.trim().is_empty()) {
        return err(&req.id, "bad_params", "ids must not be empty", None);
    }

    match SqliteStore::new(conn).import_catalog(&subjects, &topics) {
        Ok((s, t)) => {
            info!(subjects = s, topics = t, "catalog imported");
            ok(&req.id, json!({ "subjects": s, "topics": t }))
        }
        Err(e) => err(&req.id, "db_insert_failed", e.to_string(), None),
    }
}

fn handle_subjects_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let grade = match required_i64(req, "grade") {
        Ok(v) => v,
        Err(e) => return e,
    };
    match SqliteStore::new(conn).list_subjects(grade) {
        Ok(subjects) => ok(&req.id, json!({ "subjects": subjects })),
        Err(e) => err(&req.id, "catalog_unavailable", e.to_string(), None),
    }
}

fn handle_topics_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let Some(raw) = req.params.get("subjectIds").and_then(|v| v.as_array()) else {
        return err(&req.id, "bad_params", "missing subjectIds", None);
    };
    let mut subject_ids = Vec::with_capacity(raw.len());
    for v in raw {
        let Some(s) = v.as_str() else {
            return err(&req.id, "bad_params", "subjectIds must be array of strings", None);
        };
        subject_ids.push(s.to_string());
    }
    match SqliteStore::new(conn).list_topics(&subject_ids) {
        Ok(topics) => ok(&req.id, json!({ "topics": topics })),
        Err(e) => err(&req.id, "catalog_unavailable", e.to_string(), None),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "catalog.import" => Some(handle_import(state, req)),
        "catalog.subjects.list" => Some(handle_subjects_list(state, req)),
        "catalog.topics.list" => Some(handle_topics_list(state, req)),
        _ => None,
    }
}
