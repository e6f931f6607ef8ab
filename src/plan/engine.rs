use serde::Serialize;
use std::fmt;
use tracing::{debug, info, warn};

use super::loader::build_state;
use super::metrics::{merge_placements, TopicMetrics};
use super::state::{Container, Month, PlanChange, PlanningState};
use super::{PlanError, PlanSettings, RemoveScope};
use crate::store::{DeleteScope, Placement, PlacementKey, PlacementStore, TopicCatalog};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum PersistOp {
    Upsert,
    StaleCleanup,
    Delete,
}

impl fmt::Display for PersistOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            PersistOp::Upsert => "upsert",
            PersistOp::StaleCleanup => "clean up stale",
            PersistOp::Delete => "delete",
        })
    }
}

/// Queued report of a store write that failed after the in-memory move was
/// already applied.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Notice {
    pub code: &'static str,
    pub topic_id: String,
    pub target: String,
    pub op: PersistOp,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MoveOutcome {
    Applied(Container),
    /// The gesture did not land on a usable container, or named a topic the
    /// plan does not know. Nothing changed.
    Ignored,
}

/// One user's planning session: the projection plus the adapter that
/// persists each change.
#[derive(Debug)]
pub struct PlanSession {
    user_id: String,
    grade: i64,
    settings: PlanSettings,
    state: PlanningState,
    notices: Vec<Notice>,
}

impl PlanSession {
    pub(super) fn new(user_id: String, grade: i64, settings: PlanSettings, state: PlanningState) -> Self {
        Self {
            user_id,
            grade,
            settings,
            state,
            notices: Vec::new(),
        }
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn grade(&self) -> i64 {
        self.grade
    }

    pub fn year(&self) -> i32 {
        self.state.year()
    }

    pub fn state(&self) -> &PlanningState {
        &self.state
    }

    pub fn select_subject(&mut self, subject_id: &str) -> Option<Vec<&crate::store::Topic>> {
        if !self.state.select_subject(subject_id) {
            return None;
        }
        Some(self.state.unplanned_topics())
    }

    pub fn pending_notices(&self) -> &[Notice] {
        &self.notices
    }

    pub fn drain_notices(&mut self) -> Vec<Notice> {
        std::mem::take(&mut self.notices)
    }

    /// Entry point for any gesture layer. Never fails: cancelled gestures are
    /// dropped and store failures are queued as notices while the optimistic
    /// change stays in place.
    pub fn handle_move_intent(
        &mut self,
        store: &dyn PlacementStore,
        topic_id: &str,
        source: Option<&str>,
        target: Option<&str>,
    ) -> MoveOutcome {
        let Some(container) = Container::parse(target, self.state.calendar()) else {
            debug!(topic_id, source, drop_target = target, "move intent dropped outside any container");
            return MoveOutcome::Ignored;
        };
        let result = match container {
            Container::Month(month) => self.move_topic_to_month(store, topic_id, month),
            Container::Unplanned => self.remove_topic_from_plan(store, topic_id),
        };
        match result {
            Ok(()) => MoveOutcome::Applied(container),
            Err(PlanError::PersistenceFailure { topic_id, op, message }) => {
                warn!(
                    %topic_id,
                    %op,
                    %message,
                    container = %container.id(),
                    "placement write failed; plan kept optimistic state"
                );
                self.notices.push(Notice {
                    code: "persistence_failure",
                    topic_id,
                    target: container.id(),
                    op,
                    message,
                });
                MoveOutcome::Applied(container)
            }
            Err(e) => {
                debug!(topic_id, error = %e, "move intent ignored");
                MoveOutcome::Ignored
            }
        }
    }

    /// Moves a topic into `month` and persists it. The in-memory change is
    /// applied before the store call and is not reverted if that call fails.
    pub fn move_topic_to_month(
        &mut self,
        store: &dyn PlacementStore,
        topic_id: &str,
        month: Month,
    ) -> Result<(), PlanError> {
        if !self.state.calendar().contains(month) {
            return Err(PlanError::InvalidMoveTarget(month.container_id()));
        }
        if self.state.topic(topic_id).is_none() {
            return Err(PlanError::UnknownTopic(topic_id.to_string()));
        }

        let previous = self.state.apply(&PlanChange::Assign {
            topic_id: topic_id.to_string(),
            month,
        });
        info!(
            topic_id,
            from = previous.map(|m| m.number()),
            to = month.number(),
            "topic moved to month"
        );

        let key = PlacementKey {
            user_id: self.user_id.clone(),
            topic_id: topic_id.to_string(),
            month,
            year: self.state.year(),
        };
        let row = store
            .upsert_placement(&key)
            .map_err(|e| persistence_failure(topic_id, PersistOp::Upsert, e))?;
        self.absorb_row_metrics(&row);

        if self.settings.stale_row_cleanup {
            let removed = store
                .delete_placements(
                    &self.user_id,
                    topic_id,
                    DeleteScope::YearExcept {
                        year: self.state.year(),
                        keep: month,
                    },
                )
                .map_err(|e| persistence_failure(topic_id, PersistOp::StaleCleanup, e))?;
            if removed > 0 {
                debug!(topic_id, removed, "removed stale placement rows");
            }
        }
        Ok(())
    }

    /// Returns a topic to its subject's unplanned pool and deletes its stored
    /// rows. Safe to repeat.
    pub fn remove_topic_from_plan(
        &mut self,
        store: &dyn PlacementStore,
        topic_id: &str,
    ) -> Result<(), PlanError> {
        if self.state.topic(topic_id).is_none() {
            return Err(PlanError::UnknownTopic(topic_id.to_string()));
        }
        let previous = self.state.apply(&PlanChange::Unassign {
            topic_id: topic_id.to_string(),
        });
        if let Some(month) = previous {
            info!(topic_id, from = month.number(), "topic returned to unplanned");
        }

        let scope = match self.settings.remove_scope {
            RemoveScope::PlanYear => DeleteScope::Year(self.state.year()),
            RemoveScope::AllYears => DeleteScope::AllYears,
        };
        let removed = store
            .delete_placements(&self.user_id, topic_id, scope)
            .map_err(|e| persistence_failure(topic_id, PersistOp::Delete, e))?;
        debug!(
            topic_id,
            removed,
            scope = self.settings.remove_scope.as_str(),
            "placement rows deleted"
        );
        Ok(())
    }

    /// Rebuilds the projection from the store, discarding optimistic state.
    /// The selected subject survives when it still exists.
    pub fn reload_from_store(
        &mut self,
        catalog: &dyn TopicCatalog,
        store: &dyn PlacementStore,
    ) -> Result<(), PlanError> {
        let selected = self.state.selected_subject().map(str::to_string);
        let mut state = build_state(
            catalog,
            store,
            &self.user_id,
            self.grade,
            self.state.year(),
            &self.settings,
        )?;
        state.restore_selection(selected.as_deref());
        self.state = state;
        Ok(())
    }

    /// Re-reads stored metrics for the plan year and overlays them.
    pub fn refresh_metrics(&mut self, store: &dyn PlacementStore) -> Result<usize, PlanError> {
        let rows = store
            .list_placements(&self.user_id, self.state.year())
            .map_err(|e| PlanError::PlacementsUnavailable(e.to_string()))?;
        Ok(merge_placements(&mut self.state, &rows))
    }

    fn absorb_row_metrics(&mut self, row: &Placement) {
        let incoming = TopicMetrics::from_placement(row);
        if incoming.is_empty() {
            return;
        }
        if let Some(planned) = self.state.planned_mut(&row.topic_id) {
            planned.metrics = incoming;
        }
    }
}

fn persistence_failure(topic_id: &str, op: PersistOp, e: crate::store::StoreError) -> PlanError {
    PlanError::PersistenceFailure {
        topic_id: topic_id.to_string(),
        op,
        message: e.to_string(),
    }
}
