//! Problem and sub-problem entities

use serde::{Deserialize, Serialize};

/// The problem a session deliberates on (Entity).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Problem {
    pub title: String,
    pub description: String,
    /// Free-text context assembled during ContextCollection. Append-only.
    pub context: String,
    /// Ordered decomposition. Ids are unique and immutable once assigned.
    pub sub_problems: Vec<SubProblem>,
}

impl Problem {
    pub fn new(title: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            description: description.into(),
            context: String::new(),
            sub_problems: Vec::new(),
        }
    }

    /// Append a block to the problem context. There is deliberately no
    /// setter: context may grow but never be rewritten.
    pub fn append_context(&mut self, block: &str) {
        if block.is_empty() {
            return;
        }
        if !self.context.is_empty() {
            self.context.push_str("\n\n");
        }
        self.context.push_str(block);
    }

    pub fn sub_problem(&self, index: usize) -> Option<&SubProblem> {
        self.sub_problems.get(index)
    }
}

/// An independently deliberated unit of the problem (Entity).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubProblem {
    /// Unique, immutable once assigned.
    pub id: String,
    pub goal: String,
    /// Append-only, like the parent problem's context.
    context: String,
    /// Difficulty estimate on a 1-10 scale.
    pub complexity_score: u8,
    /// Ids of sub-problems whose results this one depends on.
    pub depends_on: Vec<String>,
}

impl SubProblem {
    pub fn new(id: impl Into<String>, goal: impl Into<String>, complexity_score: u8) -> Self {
        Self {
            id: id.into(),
            goal: goal.into(),
            context: String::new(),
            complexity_score: complexity_score.clamp(1, 10),
            depends_on: Vec::new(),
        }
    }

    pub fn with_dependencies(mut self, depends_on: Vec<String>) -> Self {
        self.depends_on = depends_on;
        self
    }

    pub fn context(&self) -> &str {
        &self.context
    }

    pub fn append_context(&mut self, block: &str) {
        if block.is_empty() {
            return;
        }
        if !self.context.is_empty() {
            self.context.push_str("\n\n");
        }
        self.context.push_str(block);
    }
}
