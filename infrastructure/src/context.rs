//! Local file system context store
//!
//! Saved context lives under a root directory, one subdirectory per owner:
//!
//! - `<root>/<owner>/business_context.md` - standing business context
//! - `<root>/<owner>/personalization.md` - personalization profile
//! - `<root>/<owner>/artifacts/<kind>/*.md` - referenced artifacts, where
//!   `<kind>` is one of `meeting`, `action`, `dataset` and the file stem is
//!   the artifact title
//!
//! Missing files and directories are not errors; they read back as absent.

use async_trait::async_trait;
use conclave_application::ports::context_store::{
    Artifact, ArtifactKind, ContextStore, SavedContext,
};
use conclave_application::ports::state_store::StoreError;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

pub struct FileContextStore {
    root: PathBuf,
}

impl FileContextStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn owner_dir(&self, owner: &str) -> PathBuf {
        self.root.join(owner)
    }

    fn read_optional(path: &Path) -> Option<String> {
        match fs::read_to_string(path) {
            Ok(text) if !text.trim().is_empty() => Some(text),
            Ok(_) => None,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
            Err(e) => {
                warn!("Could not read context file {}: {}", path.display(), e);
                None
            }
        }
    }
}

#[async_trait]
impl ContextStore for FileContextStore {
    async fn load_saved(&self, owner: &str) -> Result<SavedContext, StoreError> {
        let dir = self.owner_dir(owner);
        let saved = SavedContext {
            business_context: Self::read_optional(&dir.join("business_context.md")),
            personalization: Self::read_optional(&dir.join("personalization.md")),
        };
        debug!(
            "Loaded saved context for {}: business={}, personalization={}",
            owner,
            saved.business_context.is_some(),
            saved.personalization.is_some()
        );
        Ok(saved)
    }

    async fn referenced_artifacts(&self, owner: &str) -> Result<Vec<Artifact>, StoreError> {
        let mut artifacts = Vec::new();
        for kind in ArtifactKind::ALL {
            let dir = self.owner_dir(owner).join("artifacts").join(kind.as_str());
            let entries = match fs::read_dir(&dir) {
                Ok(entries) => entries,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => {
                    warn!("Could not list artifacts in {}: {}", dir.display(), e);
                    continue;
                }
            };
            let mut paths: Vec<PathBuf> = entries
                .filter_map(|e| e.ok())
                .map(|e| e.path())
                .filter(|p| p.extension().is_some_and(|ext| ext == "md"))
                .collect();
            // Stable order so caps cut deterministically.
            paths.sort();
            for path in paths {
                let Some(content) = Self::read_optional(&path) else {
                    continue;
                };
                let title = path
                    .file_stem()
                    .map(|s| s.to_string_lossy().into_owned())
                    .unwrap_or_default();
                artifacts.push(Artifact {
                    kind,
                    title,
                    content,
                });
            }
        }
        Ok(artifacts)
    }
}
