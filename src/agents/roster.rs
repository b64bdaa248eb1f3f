use std::sync::Arc;

use crate::llm_client::SharedLlmClient;

use super::specialists::{Cardiologist, Gastroenterologist, Internist, Neurologist, Psychiatrist};
use super::traits::SpecialistHandle;

/// The fixed five-specialty roster, in presentation order. Order here defines
/// the order of Opinions in every TeamSummary, not priority.
pub fn default_roster(llm_client: SharedLlmClient) -> Vec<SpecialistHandle> {
    vec![
        Arc::new(Internist::new(llm_client.clone())),
        Arc::new(Neurologist::new(llm_client.clone())),
        Arc::new(Cardiologist::new(llm_client.clone())),
        Arc::new(Gastroenterologist::new(llm_client.clone())),
        Arc::new(Psychiatrist::new(llm_client)),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::SpecialtyRole;
    use crate::llm_client::EchoLlmClient;

    #[test]
    fn roster_order_is_fixed() {
        let roster = default_roster(EchoLlmClient::shared());
        let roles: Vec<SpecialtyRole> = roster.iter().map(|s| s.role()).collect();

        assert_eq!(
            roles,
            vec![
                SpecialtyRole::Internist,
                SpecialtyRole::Neurologist,
                SpecialtyRole::Cardiologist,
                SpecialtyRole::Gastroenterologist,
                SpecialtyRole::Psychiatrist,
            ]
        );
    }
}
