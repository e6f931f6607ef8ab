use serde_json::json;

use crate::plan::PlanError;
use crate::quiz::QuizError;

pub fn ok(id: &str, result: serde_json::Value) -> serde_json::Value {
    json!({
        "id": id,
        "ok": true,
        "result": result
    })
}

pub fn err(
    id: &str,
    code: &str,
    message: impl Into<String>,
    details: Option<serde_json::Value>,
) -> serde_json::Value {
    let mut error = json!({
        "code": code,
        "message": message.into(),
    });
    if let Some(d) = details {
        error["details"] = d;
    }
    json!({
        "id": id,
        "ok": false,
        "error": error,
    })
}

pub fn plan_err(id: &str, e: &PlanError) -> serde_json::Value {
    let details = match e {
        PlanError::PersistenceFailure { topic_id, op, .. } => {
            Some(json!({ "topicId": topic_id, "op": op }))
        }
        _ => None,
    };
    err(id, e.code(), e.to_string(), details)
}

pub fn quiz_err(id: &str, e: &QuizError) -> serde_json::Value {
    err(id, e.code(), e.to_string(), None)
}
