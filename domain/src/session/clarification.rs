//! Pending clarification entities
//!
//! When GapCheck finds unresolved CRITICAL information gaps, the session
//! suspends with a [`PendingClarification`]. Answers arrive externally and
//! are matched to questions by question text; the clarification clears only
//! once every question has an answer.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Answers shorter than this are treated as effectively unanswered for
/// synthesis purposes and trip limited-context mode.
pub const MIN_USEFUL_ANSWER_LEN: usize = 10;

/// Priority of an information gap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum GapPriority {
    Optional,
    Important,
    Critical,
}

impl GapPriority {
    pub fn is_critical(&self) -> bool {
        matches!(self, GapPriority::Critical)
    }
}

/// One question the engine needs answered before it can proceed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClarificationQuestion {
    pub question: String,
    pub reason: String,
    pub priority: GapPriority,
}

impl ClarificationQuestion {
    pub fn new(
        question: impl Into<String>,
        reason: impl Into<String>,
        priority: GapPriority,
    ) -> Self {
        Self {
            question: question.into(),
            reason: reason.into(),
            priority,
        }
    }
}

/// The set of open questions blocking a suspended session.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PendingClarification {
    pub questions: Vec<ClarificationQuestion>,
    /// Answers received so far, keyed by question text.
    pub answers: BTreeMap<String, String>,
}

impl PendingClarification {
    pub fn new(questions: Vec<ClarificationQuestion>) -> Self {
        Self {
            questions,
            answers: BTreeMap::new(),
        }
    }

    /// Record externally submitted answers. Unknown question texts are
    /// ignored rather than rejected, so callers can resubmit freely.
    pub fn submit_answers(&mut self, answers: BTreeMap<String, String>) {
        for (question, answer) in answers {
            if self.questions.iter().any(|q| q.question == question) {
                self.answers.insert(question, answer);
            }
        }
    }

    /// Set difference between asked and answered, by question text.
    pub fn unanswered(&self) -> Vec<ClarificationQuestion> {
        self.questions
            .iter()
            .filter(|q| !self.answers.contains_key(&q.question))
            .cloned()
            .collect()
    }

    pub fn is_resolved(&self) -> bool {
        self.unanswered().is_empty()
    }

    /// All Q&A pairs received so far, for context injection. Keyed off the
    /// answer map so pairs survive the question list being narrowed to the
    /// unanswered subset on re-suspension.
    pub fn qa_pairs(&self) -> Vec<(String, String)> {
        self.answers
            .iter()
            .map(|(q, a)| (q.clone(), a.clone()))
            .collect()
    }

    /// True when any received answer is empty or suspiciously short.
    pub fn has_degraded_answer(&self) -> bool {
        self.answers
            .values()
            .any(|a| a.trim().len() < MIN_USEFUL_ANSWER_LEN)
    }
}
