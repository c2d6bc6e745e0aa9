//! Persona store port

use crate::ports::state_store::StoreError;
use async_trait::async_trait;
use conclave_domain::PersonaProfile;

/// Resolves an expert code to its profile.
#[async_trait]
pub trait PersonaStore: Send + Sync {
    /// Look up one persona by code. `None` when the code is unknown.
    async fn resolve(&self, code: &str) -> Result<Option<PersonaProfile>, StoreError>;

    /// All available persona codes, in catalog order.
    async fn available_codes(&self) -> Result<Vec<String>, StoreError>;
}
