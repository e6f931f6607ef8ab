//! Timed multiple-choice session: not started, in progress, completed.
//! Times are caller-supplied milliseconds so the machine has no clock of its own.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

/// Longest accepted time limit: one day.
pub const MAX_TIME_LIMIT_MS: u64 = 24 * 60 * 60 * 1000;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum QuizError {
    #[error("quiz must contain at least one question")]
    Empty,
    #[error("invalid question {0}: {1}")]
    InvalidQuestion(String, String),
    #[error("cannot {action} a quiz that is {from}")]
    InvalidTransition { from: QuizStatus, action: &'static str },
    #[error("unknown question: {0}")]
    UnknownQuestion(String),
    #[error("question already answered: {0}")]
    AlreadyAnswered(String),
    #[error("choice {choice} out of range for question {question_id}")]
    InvalidChoice { question_id: String, choice: usize },
    #[error("time limit reached")]
    TimeExpired,
    #[error("time limit must be at most {max_ms} ms")]
    TimeLimitTooLong { max_ms: u64 },
}

impl QuizError {
    pub fn code(&self) -> &'static str {
        match self {
            QuizError::Empty | QuizError::InvalidQuestion(..) | QuizError::TimeLimitTooLong { .. } => {
                "bad_params"
            }
            QuizError::InvalidTransition { .. } => "invalid_transition",
            QuizError::UnknownQuestion(_) => "unknown_question",
            QuizError::AlreadyAnswered(_) => "already_answered",
            QuizError::InvalidChoice { .. } => "invalid_choice",
            QuizError::TimeExpired => "time_expired",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum QuizStatus {
    NotStarted,
    InProgress,
    Completed,
}

impl std::fmt::Display for QuizStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            QuizStatus::NotStarted => "not started",
            QuizStatus::InProgress => "in progress",
            QuizStatus::Completed => "completed",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Question {
    pub id: String,
    pub topic_id: String,
    pub prompt: String,
    pub choices: Vec<String>,
    pub answer_index: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnswerRecord {
    pub question_id: String,
    pub choice_index: usize,
    pub correct: bool,
    pub elapsed_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TopicScore {
    pub topic_id: String,
    pub total: usize,
    pub correct: usize,
    pub accuracy: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuizSummary {
    pub total: usize,
    pub answered: usize,
    pub correct: usize,
    pub accuracy: f64,
    pub avg_seconds_per_answer: Option<f64>,
    pub per_topic: Vec<TopicScore>,
}

fn round_1(x: f64) -> f64 {
    (x * 10.0).round() / 10.0
}

fn percent(correct: usize, total: usize) -> f64 {
    if total == 0 {
        return 0.0;
    }
    round_1(100.0 * correct as f64 / total as f64)
}

#[derive(Debug, Clone)]
pub struct QuizSession {
    id: String,
    user_id: String,
    title: String,
    questions: Vec<Question>,
    time_limit_ms: Option<u64>,
    status: QuizStatus,
    started_at_ms: Option<u64>,
    finished_at_ms: Option<u64>,
    last_event_ms: u64,
    answers: Vec<AnswerRecord>,
    recorded: bool,
}

impl QuizSession {
    pub fn new(
        id: String,
        user_id: String,
        title: String,
        questions: Vec<Question>,
        time_limit_ms: Option<u64>,
    ) -> Result<Self, QuizError> {
        if questions.is_empty() {
            return Err(QuizError::Empty);
        }
        if time_limit_ms.is_some_and(|v| v > MAX_TIME_LIMIT_MS) {
            return Err(QuizError::TimeLimitTooLong {
                max_ms: MAX_TIME_LIMIT_MS,
            });
        }
        let mut seen = HashSet::new();
        for q in &questions {
            if !seen.insert(q.id.as_str()) {
                return Err(QuizError::InvalidQuestion(q.id.clone(), "duplicate id".into()));
            }
            if q.choices.len() < 2 {
                return Err(QuizError::InvalidQuestion(
                    q.id.clone(),
                    "needs at least two choices".into(),
                ));
            }
            if q.answer_index >= q.choices.len() {
                return Err(QuizError::InvalidQuestion(
                    q.id.clone(),
                    "answerIndex out of range".into(),
                ));
            }
        }
        Ok(Self {
            id,
            user_id,
            title,
            questions,
            time_limit_ms: time_limit_ms.filter(|v| *v > 0),
            status: QuizStatus::NotStarted,
            started_at_ms: None,
            finished_at_ms: None,
            last_event_ms: 0,
            answers: Vec::new(),
            recorded: false,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn status(&self) -> QuizStatus {
        self.status
    }

    pub fn started_at_ms(&self) -> Option<u64> {
        self.started_at_ms
    }

    pub fn finished_at_ms(&self) -> Option<u64> {
        self.finished_at_ms
    }

    pub fn answers(&self) -> &[AnswerRecord] {
        &self.answers
    }

    /// `None` when there is no limit, or when the deadline lies past the
    /// end of the clock.
    fn deadline(&self) -> Option<u64> {
        self.started_at_ms?.checked_add(self.time_limit_ms?)
    }

    pub fn remaining_ms(&self, now_ms: u64) -> Option<u64> {
        match self.status {
            QuizStatus::InProgress => self.deadline().map(|d| d.saturating_sub(now_ms)),
            _ => None,
        }
    }

    pub fn start(&mut self, now_ms: u64) -> Result<(), QuizError> {
        if self.status != QuizStatus::NotStarted {
            return Err(QuizError::InvalidTransition {
                from: self.status,
                action: "start",
            });
        }
        self.status = QuizStatus::InProgress;
        self.started_at_ms = Some(now_ms);
        self.last_event_ms = now_ms;
        Ok(())
    }

    /// Completes the session at its deadline if `now_ms` is past it.
    /// Returns true when this call expired the session.
    pub fn tick(&mut self, now_ms: u64) -> bool {
        if self.status != QuizStatus::InProgress {
            return false;
        }
        match self.deadline() {
            Some(deadline) if now_ms > deadline => {
                self.complete(deadline);
                true
            }
            _ => false,
        }
    }

    /// Records one answer. Elapsed time runs from the previous answer, or
    /// from the start for the first one. Answering the last open question
    /// completes the session.
    pub fn answer(
        &mut self,
        question_id: &str,
        choice_index: usize,
        now_ms: u64,
    ) -> Result<AnswerRecord, QuizError> {
        if self.tick(now_ms) {
            return Err(QuizError::TimeExpired);
        }
        if self.status != QuizStatus::InProgress {
            return Err(QuizError::InvalidTransition {
                from: self.status,
                action: "answer",
            });
        }
        let question = self
            .questions
            .iter()
            .find(|q| q.id == question_id)
            .ok_or_else(|| QuizError::UnknownQuestion(question_id.to_string()))?;
        if self.answers.iter().any(|a| a.question_id == question_id) {
            return Err(QuizError::AlreadyAnswered(question_id.to_string()));
        }
        if choice_index >= question.choices.len() {
            return Err(QuizError::InvalidChoice {
                question_id: question_id.to_string(),
                choice: choice_index,
            });
        }
        let record = AnswerRecord {
            question_id: question.id.clone(),
            choice_index,
            correct: choice_index == question.answer_index,
            elapsed_ms: now_ms.saturating_sub(self.last_event_ms),
        };
        self.last_event_ms = now_ms.max(self.last_event_ms);
        self.answers.push(record.clone());
        if self.answers.len() == self.questions.len() {
            self.complete(now_ms);
        }
        Ok(record)
    }

    pub fn finish(&mut self, now_ms: u64) -> Result<QuizSummary, QuizError> {
        self.tick(now_ms);
        match self.status {
            QuizStatus::InProgress => {
                self.complete(now_ms);
                Ok(self.summary())
            }
            QuizStatus::Completed => Ok(self.summary()),
            QuizStatus::NotStarted => Err(QuizError::InvalidTransition {
                from: self.status,
                action: "finish",
            }),
        }
    }

    fn complete(&mut self, at_ms: u64) {
        self.status = QuizStatus::Completed;
        self.finished_at_ms = Some(at_ms);
    }

    /// Unanswered questions count against accuracy.
    pub fn summary(&self) -> QuizSummary {
        let mut by_topic: BTreeMap<&str, (usize, usize)> = BTreeMap::new();
        let mut correct = 0;
        for q in &self.questions {
            let hit = self
                .answers
                .iter()
                .any(|a| a.question_id == q.id && a.correct);
            let entry = by_topic.entry(q.topic_id.as_str()).or_insert((0, 0));
            entry.0 += 1;
            if hit {
                entry.1 += 1;
                correct += 1;
            }
        }
        let answered = self.answers.len();
        let avg_seconds_per_answer = (answered > 0).then(|| {
            let total_ms: u64 = self.answers.iter().map(|a| a.elapsed_ms).sum();
            round_1(total_ms as f64 / answered as f64 / 1000.0)
        });
        QuizSummary {
            total: self.questions.len(),
            answered,
            correct,
            accuracy: percent(correct, self.questions.len()),
            avg_seconds_per_answer,
            per_topic: by_topic
                .into_iter()
                .map(|(topic_id, (total, correct))| TopicScore {
                    topic_id: topic_id.to_string(),
                    total,
                    correct,
                    accuracy: percent(correct, total),
                })
                .collect(),
        }
    }

    /// True once the session is completed and its results have not yet been stored.
    pub fn needs_recording(&self) -> bool {
        self.status == QuizStatus::Completed && !self.recorded
    }

    pub fn mark_recorded(&mut self) {
        self.recorded = true;
    }
}
