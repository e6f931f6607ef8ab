use rusqlite::Connection;
use serde_json::Value as JsonValue;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::ipc::error::err;
use crate::ipc::types::{AppState, Request};

pub fn db_conn<'a>(state: &'a AppState, req: &Request) -> Result<&'a Connection, serde_json::Value> {
    state
        .db
        .as_ref()
        .ok_or_else(|| err(&req.id, "no_workspace", "select a workspace first", None))
}

pub fn required_str(req: &Request, key: &str) -> Result<String, serde_json::Value> {
    req.params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|v| v.trim().to_string())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| err(&req.id, "bad_params", format!("missing {}", key), None))
}

pub fn required_i64(req: &Request, key: &str) -> Result<i64, serde_json::Value> {
    req.params
        .get(key)
        .and_then(|v| v.as_i64())
        .ok_or_else(|| err(&req.id, "bad_params", format!("missing integer {}", key), None))
}

pub fn parse_opt_i64(v: Option<&JsonValue>) -> Result<Option<i64>, &'static str> {
    match v {
        None => Ok(None),
        Some(v) if v.is_null() => Ok(None),
        Some(v) => v.as_i64().map(Some).ok_or("must be integer or null"),
    }
}

pub fn opt_year(req: &Request) -> Result<Option<i32>, serde_json::Value> {
    match parse_opt_i64(req.params.get("year")) {
        Ok(None) => Ok(None),
        Ok(Some(y)) => i32::try_from(y)
            .ok()
            .filter(|y| (1900..=9999).contains(y))
            .map(Some)
            .ok_or_else(|| err(&req.id, "bad_params", "year must be in 1900..=9999", None)),
        Err(m) => Err(err(&req.id, "bad_params", format!("year {}", m), None)),
    }
}

pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Client-supplied event time, falling back to the local clock.
pub fn event_ms(req: &Request) -> Result<u64, serde_json::Value> {
    match req.params.get("atMs") {
        None => Ok(now_ms()),
        Some(v) if v.is_null() => Ok(now_ms()),
        Some(v) => v
            .as_u64()
            .filter(|ms| i64::try_from(*ms).is_ok())
            .ok_or_else(|| err(&req.id, "bad_params", "atMs must be an integer in 0..=i64::MAX", None)),
    }
}
