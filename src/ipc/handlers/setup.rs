use crate::db;
use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use crate::plan::{AcademicCalendar, PlanSettings, RemoveScope};
use serde_json::{json, Map, Value};

#[derive(Clone, Copy)]
enum SetupSection {
    Plan,
}

impl SetupSection {
    fn parse(s: &str) -> Option<Self> {
        match s {
            "plan" => Some(Self::Plan),
            _ => None,
        }
    }

    fn key(self) -> &'static str {
        match self {
            Self::Plan => "setup.plan",
        }
    }
}

fn default_section(section: SetupSection) -> Value {
    match section {
        SetupSection::Plan => json!({
            "academicMonths": [9, 10, 11, 12, 1, 2, 3, 4, 5],
            "planYear": null,
            "staleRowCleanup": true,
            "removeScope": "year"
        }),
    }
}

fn as_object_mut(value: &mut Value) -> Result<&mut Map<String, Value>, String> {
    value
        .as_object_mut()
        .ok_or_else(|| "internal setup object must be a JSON object".to_string())
}

fn parse_bool(v: &Value, key: &str) -> Result<bool, String> {
    v.as_bool()
        .ok_or_else(|| format!("{} must be boolean", key))
}

fn parse_i64_range(v: &Value, key: &str, min: i64, max: i64) -> Result<i64, String> {
    let n = v
        .as_i64()
        .ok_or_else(|| format!("{} must be integer", key))?;
    if !(min..=max).contains(&n) {
        return Err(format!("{} must be in {}..={}", key, min, max));
    }
    Ok(n)
}

fn parse_months(v: &Value, key: &str) -> Result<AcademicCalendar, String> {
    let arr = v
        .as_array()
        .ok_or_else(|| format!("{} must be array of integers", key))?;
    let mut nums = Vec::with_capacity(arr.len());
    for item in arr {
        nums.push(
            item.as_i64()
                .ok_or_else(|| format!("{} must be array of integers", key))?,
        );
    }
    AcademicCalendar::from_numbers(&nums)
}

fn merge_section_patch(
    section: SetupSection,
    current: &mut Value,
    patch: &Map<String, Value>,
) -> Result<(), String> {
    let obj = as_object_mut(current)?;
    for (k, v) in patch {
        match section {
            SetupSection::Plan => match k.as_str() {
                "academicMonths" => {
                    let cal = parse_months(v, k)?;
                    obj.insert(k.clone(), json!(cal.numbers()));
                }
                "planYear" => {
                    if v.is_null() {
                        obj.insert(k.clone(), Value::Null);
                    } else {
                        obj.insert(k.clone(), Value::from(parse_i64_range(v, k, 1900, 9999)?));
                    }
                }
                "staleRowCleanup" => {
                    obj.insert(k.clone(), Value::Bool(parse_bool(v, k)?));
                }
                "removeScope" => {
                    let s = v
                        .as_str()
                        .ok_or_else(|| format!("{} must be string", k))?
                        .trim()
                        .to_ascii_lowercase();
                    if RemoveScope::parse(&s).is_none() {
                        return Err("removeScope must be one of: year, all".into());
                    }
                    obj.insert(k.clone(), Value::String(s));
                }
                _ => return Err(format!("unknown plan field: {}", k)),
            },
        }
    }
    Ok(())
}

fn load_section(conn: &rusqlite::Connection, section: SetupSection) -> anyhow::Result<Value> {
    let mut current = default_section(section);
    if let Some(saved) = db::settings_get_json(conn, section.key())? {
        if let Some(saved_obj) = saved.as_object() {
            // Best-effort apply: malformed historical values should not block loading a plan.
            let _ = merge_section_patch(section, &mut current, saved_obj);
        }
    }
    Ok(current)
}

/// Typed view of the `plan` section; falls back to defaults when unreadable.
pub fn load_plan_settings(conn: &rusqlite::Connection) -> PlanSettings {
    let obj = load_section(conn, SetupSection::Plan).unwrap_or_else(|_| default_section(SetupSection::Plan));
    let defaults = PlanSettings::default();
    let calendar = obj
        .get("academicMonths")
        .and_then(|v| parse_months(v, "academicMonths").ok())
        .unwrap_or(defaults.calendar);
    let plan_year = obj
        .get("planYear")
        .and_then(|v| v.as_i64())
        .and_then(|y| i32::try_from(y).ok());
    let stale_row_cleanup = obj
        .get("staleRowCleanup")
        .and_then(|v| v.as_bool())
        .unwrap_or(defaults.stale_row_cleanup);
    let remove_scope = obj
        .get("removeScope")
        .and_then(|v| v.as_str())
        .and_then(RemoveScope::parse)
        .unwrap_or(defaults.remove_scope);
    PlanSettings {
        calendar,
        plan_year,
        stale_row_cleanup,
        remove_scope,
    }
}

fn handle_setup_get(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let plan = match load_section(conn, SetupSection::Plan) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    ok(&req.id, json!({ "plan": plan }))
}

fn handle_setup_update(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let Some(section_raw) = req.params.get("section").and_then(|v| v.as_str()) else {
        return err(&req.id, "bad_params", "missing section", None);
    };
    let Some(section) = SetupSection::parse(section_raw) else {
        return err(&req.id, "bad_params", "unknown section", None);
    };
    let Some(patch_obj) = req.params.get("patch").and_then(|v| v.as_object()) else {
        return err(&req.id, "bad_params", "patch must be an object", None);
    };

    let mut current = match load_section(conn, section) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    if let Err(msg) = merge_section_patch(section, &mut current, patch_obj) {
        return err(&req.id, "bad_params", msg, None);
    }
    if let Err(e) = db::settings_set_json(conn, section.key(), &current) {
        return err(&req.id, "db_update_failed", e.to_string(), None);
    }
    // Settings take effect on the next plan.load.
    ok(&req.id, json!({ "ok": true, "plan": current }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "setup.get" => Some(handle_setup_get(state, req)),
        "setup.update" => Some(handle_setup_update(state, req)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plan_patch_validates_fields() {
        let mut current = default_section(SetupSection::Plan);
        let bad = json!({ "academicMonths": [9, 9] });
        assert!(merge_section_patch(SetupSection::Plan, &mut current, bad.as_object().expect("obj")).is_err());
        let bad = json!({ "removeScope": "everything" });
        assert!(merge_section_patch(SetupSection::Plan, &mut current, bad.as_object().expect("obj")).is_err());
        let bad = json!({ "colour": "red" });
        assert!(merge_section_patch(SetupSection::Plan, &mut current, bad.as_object().expect("obj")).is_err());

        let good = json!({ "academicMonths": [2, 3], "planYear": 2026, "removeScope": "ALL" });
        merge_section_patch(SetupSection::Plan, &mut current, good.as_object().expect("obj"))
            .expect("merge");
        assert_eq!(current["academicMonths"], json!([2, 3]));
        assert_eq!(current["planYear"], 2026);
        assert_eq!(current["removeScope"], "all");
        assert_eq!(current["staleRowCleanup"], true);
    }
}
