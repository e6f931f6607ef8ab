use serde::Serialize;

use super::state::PlanningState;
use crate::store::Placement;

/// Display-only accuracy overlay. `None` means no data, which is not the same as 0.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TopicMetrics {
    pub test_accuracy: Option<f64>,
    pub exam_accuracy: Option<f64>,
}

impl TopicMetrics {
    pub fn from_placement(p: &Placement) -> Self {
        Self {
            test_accuracy: p.test_accuracy.and_then(validate_accuracy),
            exam_accuracy: p.exam_accuracy.and_then(validate_accuracy),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.test_accuracy.is_none() && self.exam_accuracy.is_none()
    }
}

/// Accepts a percentage in 0..=100; anything else is treated as missing.
pub fn validate_accuracy(v: f64) -> Option<f64> {
    (v.is_finite() && (0.0..=100.0).contains(&v)).then_some(v)
}

/// Overlays metrics from stored rows onto topics already placed in the same
/// month. Never moves, adds or removes a topic.
pub fn merge_placements(state: &mut PlanningState, placements: &[Placement]) -> usize {
    let mut touched = 0;
    for p in placements {
        if p.planned_year != state.year() {
            continue;
        }
        let Some(current) = state.month_of(&p.topic_id) else {
            continue;
        };
        if i64::from(current.number()) != p.planned_month {
            continue;
        }
        if let Some(planned) = state.planned_mut(&p.topic_id) {
            planned.metrics = TopicMetrics::from_placement(p);
            touched += 1;
        }
    }
    touched
}
