use serde::{Serialize, Serializer};
use std::collections::{BTreeMap, HashSet};
use std::fmt;

use super::metrics::TopicMetrics;
use crate::store::{Subject, Topic};

pub const UNPLANNED_CONTAINER: &str = "unplanned";
const MONTH_CONTAINER_PREFIX: &str = "month-";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Month(u8);

impl Month {
    pub fn new(n: u8) -> Option<Self> {
        (1..=12).contains(&n).then_some(Self(n))
    }

    pub fn from_i64(n: i64) -> Option<Self> {
        u8::try_from(n).ok().and_then(Self::new)
    }

    pub fn number(self) -> u8 {
        self.0
    }

    pub fn all() -> impl Iterator<Item = Month> {
        (1..=12).map(Month)
    }

    pub fn container_id(self) -> String {
        format!("{}{}", MONTH_CONTAINER_PREFIX, self.0)
    }
}

impl fmt::Display for Month {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Serialize for Month {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(self.0)
    }
}

/// The months a topic may be moved into, in display order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AcademicCalendar {
    months: Vec<Month>,
}

impl Default for AcademicCalendar {
    fn default() -> Self {
        Self {
            months: [9, 10, 11, 12, 1, 2, 3, 4, 5]
                .into_iter()
                .map(Month)
                .collect(),
        }
    }
}

impl AcademicCalendar {
    pub fn from_numbers(values: &[i64]) -> Result<Self, String> {
        if values.is_empty() {
            return Err("academicMonths must not be empty".to_string());
        }
        let mut months = Vec::with_capacity(values.len());
        for v in values {
            let m = Month::from_i64(*v)
                .ok_or_else(|| format!("academicMonths entry {} must be in 1..=12", v))?;
            if months.contains(&m) {
                return Err(format!("academicMonths entry {} is duplicated", v));
            }
            months.push(m);
        }
        Ok(Self { months })
    }

    pub fn months(&self) -> &[Month] {
        &self.months
    }

    pub fn contains(&self, month: Month) -> bool {
        self.months.contains(&month)
    }

    pub fn numbers(&self) -> Vec<u8> {
        self.months.iter().map(|m| m.number()).collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Container {
    Month(Month),
    Unplanned,
}

impl Container {
    /// Resolves a drop-target id. `None` means the gesture landed nowhere usable.
    pub fn parse(target: Option<&str>, calendar: &AcademicCalendar) -> Option<Self> {
        let raw = target?.trim();
        if raw == UNPLANNED_CONTAINER {
            return Some(Container::Unplanned);
        }
        let digits = raw.strip_prefix(MONTH_CONTAINER_PREFIX)?;
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        let month = digits.parse::<u8>().ok().and_then(Month::new)?;
        calendar.contains(month).then_some(Container::Month(month))
    }

    pub fn id(self) -> String {
        match self {
            Container::Month(m) => m.container_id(),
            Container::Unplanned => UNPLANNED_CONTAINER.to_string(),
        }
    }
}

/// A topic as shown inside a month bucket, with its display-only metrics.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlannedTopic {
    #[serde(flatten)]
    pub topic: Topic,
    #[serde(flatten)]
    pub metrics: TopicMetrics,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlanChange {
    Assign { topic_id: String, month: Month },
    Unassign { topic_id: String },
}

#[derive(Debug, Clone)]
pub struct PlanningState {
    year: i32,
    calendar: AcademicCalendar,
    subjects: Vec<Subject>,
    topics: Vec<Topic>,
    monthly_plan: BTreeMap<Month, Vec<PlannedTopic>>,
    selected_subject: Option<String>,
}

impl PlanningState {
    pub fn new(year: i32, calendar: AcademicCalendar, subjects: Vec<Subject>, topics: Vec<Topic>) -> Self {
        Self {
            year,
            calendar,
            subjects,
            topics,
            monthly_plan: Month::all().map(|m| (m, Vec::new())).collect(),
            selected_subject: None,
        }
    }

    pub fn year(&self) -> i32 {
        self.year
    }

    pub fn calendar(&self) -> &AcademicCalendar {
        &self.calendar
    }

    pub fn subjects(&self) -> &[Subject] {
        &self.subjects
    }

    pub fn topics(&self) -> &[Topic] {
        &self.topics
    }

    pub fn topic(&self, topic_id: &str) -> Option<&Topic> {
        self.topics.iter().find(|t| t.id == topic_id)
    }

    pub fn bucket(&self, month: Month) -> &[PlannedTopic] {
        self.monthly_plan
            .get(&month)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn month_of(&self, topic_id: &str) -> Option<Month> {
        self.monthly_plan
            .iter()
            .find(|(_, bucket)| bucket.iter().any(|p| p.topic.id == topic_id))
            .map(|(m, _)| *m)
    }

    pub fn selected_subject(&self) -> Option<&str> {
        self.selected_subject.as_deref()
    }

    /// Returns false, leaving the selection untouched, when the subject is not in the catalog.
    pub fn select_subject(&mut self, subject_id: &str) -> bool {
        if !self.subjects.iter().any(|s| s.id == subject_id) {
            return false;
        }
        self.selected_subject = Some(subject_id.to_string());
        true
    }

    pub fn placed_topic_ids(&self) -> HashSet<&str> {
        self.monthly_plan
            .values()
            .flatten()
            .map(|p| p.topic.id.as_str())
            .collect()
    }

    pub fn unplanned_for(&self, subject_id: &str) -> Vec<&Topic> {
        let placed = self.placed_topic_ids();
        self.topics
            .iter()
            .filter(|t| t.subject_id == subject_id)
            .filter(|t| !placed.contains(t.id.as_str()))
            .collect()
    }

    /// Unplanned pool of the selected subject; empty until a subject is selected.
    pub fn unplanned_topics(&self) -> Vec<&Topic> {
        match self.selected_subject.as_deref() {
            Some(subject_id) => self.unplanned_for(subject_id),
            None => Vec::new(),
        }
    }

    /// Applies a placement change in memory and returns the month the topic
    /// occupied before. The scan covers every bucket, so a topic that somehow
    /// sits in several buckets ends up in at most one.
    pub fn apply(&mut self, change: &PlanChange) -> Option<Month> {
        match change {
            PlanChange::Assign { topic_id, month } => {
                let previous = self.month_of(topic_id);
                let already_sole = previous == Some(*month)
                    && self
                        .monthly_plan
                        .iter()
                        .filter(|(m, _)| *m != month)
                        .all(|(_, bucket)| bucket.iter().all(|p| &p.topic.id != topic_id));
                if already_sole {
                    return previous;
                }
                let carried = self.take_from_buckets(topic_id);
                let planned = match carried {
                    Some(p) => p,
                    None => match self.topic(topic_id) {
                        Some(topic) => PlannedTopic {
                            topic: topic.clone(),
                            metrics: TopicMetrics::default(),
                        },
                        None => return previous,
                    },
                };
                self.monthly_plan.entry(*month).or_default().push(planned);
                previous
            }
            PlanChange::Unassign { topic_id } => {
                let previous = self.month_of(topic_id);
                self.take_from_buckets(topic_id);
                previous
            }
        }
    }

    fn take_from_buckets(&mut self, topic_id: &str) -> Option<PlannedTopic> {
        let mut taken = None;
        for bucket in self.monthly_plan.values_mut() {
            if let Some(pos) = bucket.iter().position(|p| p.topic.id == topic_id) {
                let p = bucket.remove(pos);
                taken.get_or_insert(p);
            }
            bucket.retain(|p| p.topic.id != topic_id);
        }
        taken
    }

    pub(super) fn place_loaded(&mut self, month: Month, planned: PlannedTopic) {
        self.monthly_plan.entry(month).or_default().push(planned);
    }

    pub(super) fn planned_mut(&mut self, topic_id: &str) -> Option<&mut PlannedTopic> {
        self.monthly_plan
            .values_mut()
            .flatten()
            .find(|p| p.topic.id == topic_id)
    }

    pub(super) fn restore_selection(&mut self, subject_id: Option<&str>) {
        if let Some(id) = subject_id {
            self.select_subject(id);
        }
    }

    /// Wire projection: every academic month (empty or not) in calendar order,
    /// followed by any off-calendar month that still holds loaded topics.
    pub fn snapshot(&self) -> serde_json::Value {
        let mut months: Vec<Month> = self.calendar.months().to_vec();
        for (m, bucket) in &self.monthly_plan {
            if !bucket.is_empty() && !months.contains(m) {
                months.push(*m);
            }
        }
        let months_json = months
            .iter()
            .map(|m| {
                serde_json::json!({
                    "month": m,
                    "containerId": m.container_id(),
                    "inCalendar": self.calendar.contains(*m),
                    "topics": self.bucket(*m),
                })
            })
            .collect::<Vec<_>>();
        serde_json::json!({
            "year": self.year,
            "academicMonths": self.calendar.numbers(),
            "subjects": self.subjects,
            "selectedSubjectId": self.selected_subject,
            "months": months_json,
            "unplannedTopics": self.unplanned_topics(),
        })
    }
}
