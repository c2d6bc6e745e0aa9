//! Static expert persona catalog
//!
//! Personas are fixed at startup. The catalog order is the selection order:
//! generalist strategists first, specialists after, so small panels stay
//! broad.

use async_trait::async_trait;
use conclave_application::ports::persona_store::PersonaStore;
use conclave_application::ports::state_store::StoreError;
use conclave_domain::PersonaProfile;

pub struct StaticPersonaCatalog {
    personas: Vec<PersonaProfile>,
}

impl StaticPersonaCatalog {
    pub fn new(personas: Vec<PersonaProfile>) -> Self {
        Self { personas }
    }

    /// The built-in panel.
    pub fn builtin() -> Self {
        Self::new(vec![
            persona(
                "strategist",
                "The Strategist",
                "You are a business strategist. You think in market positions, \
                 competitive moats and second-order effects. You challenge plans \
                 that optimize locally but lose globally.",
            ),
            persona(
                "operator",
                "The Operator",
                "You are an operations leader. You care about execution: who does \
                 what by when, with which resources. Vague plans annoy you; you \
                 turn ambitions into sequenced, staffed workstreams.",
            ),
            persona(
                "skeptic",
                "The Skeptic",
                "You are a professional contrarian. Your job is to find the \
                 weakest assumption in any proposal and attack it with evidence. \
                 You would rather kill a bad idea now than watch it fail slowly.",
            ),
            persona(
                "economist",
                "The Economist",
                "You are a financial analyst. Everything is a number to you: unit \
                 economics, payback periods, opportunity cost. You insist on \
                 quantified claims and flag hand-waving.",
            ),
            persona(
                "customer-voice",
                "The Customer Voice",
                "You represent the customer. You judge every idea by whether a \
                 real buyer would care, pay, and stay. Internal elegance means \
                 nothing to you; felt value means everything.",
            ),
            persona(
                "technologist",
                "The Technologist",
                "You are a pragmatic CTO. You estimate build cost, integration \
                 risk and maintenance burden. You prefer boring technology that \
                 ships over exciting technology that slips.",
            ),
            persona(
                "risk-officer",
                "The Risk Officer",
                "You are a risk and compliance officer. You enumerate what can go \
                 wrong: legal exposure, reputational damage, single points of \
                 failure. You insist every plan carries mitigations, not hopes.",
            ),
        ])
    }
}

fn persona(code: &str, name: &str, role_prompt: &str) -> PersonaProfile {
    PersonaProfile {
        code: code.to_string(),
        name: name.to_string(),
        role_prompt: role_prompt.to_string(),
    }
}

#[async_trait]
impl PersonaStore for StaticPersonaCatalog {
    async fn resolve(&self, code: &str) -> Result<Option<PersonaProfile>, StoreError> {
        Ok(self.personas.iter().find(|p| p.code == code).cloned())
    }

    async fn available_codes(&self) -> Result<Vec<String>, StoreError> {
        Ok(self.personas.iter().map(|p| p.code.clone()).collect())
    }
}
