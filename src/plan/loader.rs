use std::collections::HashMap;
use tracing::{debug, info};

use super::engine::PlanSession;
use super::metrics::TopicMetrics;
use super::state::{Month, PlannedTopic, PlanningState};
use super::{PlanError, PlanSettings};
use crate::store::{Placement, PlacementStore, TopicCatalog};

/// Builds a fresh Planning State for `user_id` at `grade`. Any catalog failure
/// aborts the load; no partial state is returned.
pub fn load_plan(
    catalog: &dyn TopicCatalog,
    store: &dyn PlacementStore,
    user_id: &str,
    grade: i64,
    year: i32,
    settings: PlanSettings,
) -> Result<PlanSession, PlanError> {
    let state = build_state(catalog, store, user_id, grade, year, &settings)?;
    Ok(PlanSession::new(user_id.to_string(), grade, settings, state))
}

pub(super) fn build_state(
    catalog: &dyn TopicCatalog,
    store: &dyn PlacementStore,
    user_id: &str,
    grade: i64,
    year: i32,
    settings: &PlanSettings,
) -> Result<PlanningState, PlanError> {
    let subjects = catalog
        .list_subjects(grade)
        .map_err(|e| PlanError::CatalogUnavailable(format!("subjects: {}", e)))?;
    let subject_ids: Vec<String> = subjects.iter().map(|s| s.id.clone()).collect();
    let topics = catalog
        .list_topics(&subject_ids)
        .map_err(|e| PlanError::CatalogUnavailable(format!("topics: {}", e)))?;
    let placements = store
        .list_placements(user_id, year)
        .map_err(|e| PlanError::PlacementsUnavailable(e.to_string()))?;

    let mut state = PlanningState::new(year, settings.calendar.clone(), subjects, topics);
    let winners = latest_row_per_topic(&placements);
    let mut placed = 0usize;
    for (idx, p) in placements.iter().enumerate() {
        if winners.get(p.topic_id.as_str()) != Some(&idx) {
            continue;
        }
        let Some(month) = Month::from_i64(p.planned_month) else {
            debug!(topic_id = %p.topic_id, month = p.planned_month, "skipping placement with invalid month");
            continue;
        };
        let Some(topic) = state.topic(&p.topic_id).cloned() else {
            debug!(topic_id = %p.topic_id, "skipping placement for topic outside catalog");
            continue;
        };
        state.place_loaded(
            month,
            PlannedTopic {
                topic,
                metrics: TopicMetrics::from_placement(p),
            },
        );
        placed += 1;
    }

    let duplicates = placements.len() - winners.len();
    info!(
        user_id,
        grade,
        year,
        subjects = state.subjects().len(),
        topics = state.topics().len(),
        placed,
        duplicates,
        "plan loaded"
    );
    Ok(state)
}

/// A topic may have several rows for one year when an earlier move never
/// cleaned up; the most recently updated row wins.
fn latest_row_per_topic(placements: &[Placement]) -> HashMap<&str, usize> {
    let mut winners: HashMap<&str, usize> = HashMap::new();
    for (idx, p) in placements.iter().enumerate() {
        match winners.get(p.topic_id.as_str()) {
            Some(&cur) if placements[cur].updated_at > p.updated_at => {}
            _ => {
                winners.insert(p.topic_id.as_str(), idx);
            }
        }
    }
    winners
}
