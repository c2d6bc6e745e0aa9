//! Context store port
//!
//! Read-only from the engine's perspective: saved business context, a
//! personalization profile, and explicitly referenced prior artifacts.

use crate::ports::state_store::StoreError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Saved per-user context.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SavedContext {
    pub business_context: Option<String>,
    /// Cognitive/personalization profile text.
    pub personalization: Option<String>,
}

/// Category of a referenced prior artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    Meeting,
    Action,
    Dataset,
}

impl ArtifactKind {
    pub const ALL: [ArtifactKind; 3] =
        [ArtifactKind::Meeting, ArtifactKind::Action, ArtifactKind::Dataset];

    pub fn as_str(&self) -> &'static str {
        match self {
            ArtifactKind::Meeting => "meeting",
            ArtifactKind::Action => "action",
            ArtifactKind::Dataset => "dataset",
        }
    }
}

/// One referenced prior-session artifact.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Artifact {
    pub kind: ArtifactKind,
    pub title: String,
    pub content: String,
}

/// Loads saved user/business context and referenced artifacts.
#[async_trait]
pub trait ContextStore: Send + Sync {
    async fn load_saved(&self, owner: &str) -> Result<SavedContext, StoreError>;

    /// Artifacts the user explicitly referenced for this problem.
    /// The engine caps the count per [`ArtifactKind`].
    async fn referenced_artifacts(&self, owner: &str) -> Result<Vec<Artifact>, StoreError>;
}
