//! Yearly topic planning: the in-memory plan projection, the move engine that
//! keeps it in agreement with stored placements, and the metrics overlay.

mod engine;
mod loader;
mod metrics;
mod state;

pub use engine::{MoveOutcome, PersistOp, PlanSession};
pub use loader::load_plan;
pub use metrics::validate_accuracy;
pub use state::{AcademicCalendar, Month};

use chrono::Datelike;

#[derive(Debug, thiserror::Error)]
pub enum PlanError {
    #[error("catalog unavailable: {0}")]
    CatalogUnavailable(String),
    #[error("placements unavailable: {0}")]
    PlacementsUnavailable(String),
    #[error("failed to {op} placement for topic {topic_id}: {message}")]
    PersistenceFailure {
        topic_id: String,
        op: PersistOp,
        message: String,
    },
    #[error("invalid move target: {0}")]
    InvalidMoveTarget(String),
    #[error("unknown topic: {0}")]
    UnknownTopic(String),
    #[error("no plan loaded")]
    NoSession,
}

impl PlanError {
    pub fn code(&self) -> &'static str {
        match self {
            PlanError::CatalogUnavailable(_) => "catalog_unavailable",
            PlanError::PlacementsUnavailable(_) => "placements_unavailable",
            PlanError::PersistenceFailure { .. } => "persistence_failure",
            PlanError::InvalidMoveTarget(_) => "invalid_move_target",
            PlanError::UnknownTopic(_) => "unknown_topic",
            PlanError::NoSession => "no_session",
        }
    }
}

/// How far `removeTopicFromPlan` reaches into stored rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoveScope {
    PlanYear,
    AllYears,
}

impl RemoveScope {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "year" => Some(Self::PlanYear),
            "all" => Some(Self::AllYears),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::PlanYear => "year",
            Self::AllYears => "all",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlanSettings {
    pub calendar: AcademicCalendar,
    pub plan_year: Option<i32>,
    pub stale_row_cleanup: bool,
    pub remove_scope: RemoveScope,
}

impl Default for PlanSettings {
    fn default() -> Self {
        Self {
            calendar: AcademicCalendar::default(),
            plan_year: None,
            stale_row_cleanup: true,
            remove_scope: RemoveScope::PlanYear,
        }
    }
}

impl PlanSettings {
    pub fn effective_year(&self) -> i32 {
        self.plan_year
            .unwrap_or_else(|| chrono::Local::now().year())
    }
}
