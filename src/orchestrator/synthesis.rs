use tracing::{instrument, warn};

use crate::agents::{Case, Opinion};
use crate::llm_client::SharedLlmClient;

use super::summary::SpecialistFailure;

/// Produces the consolidated team overview. Moderated mode asks a moderator
/// model to reconcile the findings; template mode concatenates them
/// deterministically. Either way the overview draws only on the collected
/// Opinions and names every specialist that failed to respond.
pub struct Synthesizer {
    moderator: Option<SharedLlmClient>,
}

impl Synthesizer {
    const DIRECTIVE: &'static str = "You are the moderator of a multidisciplinary medical team. Reconcile the specialist findings below into one consolidated overview: note where specialties agree, surface conflicts explicitly, and close with the team's suggested next steps. Use only the findings provided. End with a line listing the specialists that did not contribute, or 'All consulted specialists contributed.' if none failed.";

    pub fn template() -> Self {
        Self { moderator: None }
    }

    pub fn moderated(client: SharedLlmClient) -> Self {
        Self {
            moderator: Some(client),
        }
    }

    /// A moderator failure never fails the consultation; the deterministic
    /// template stands in.
    #[instrument(skip_all, fields(opinions = opinions.len(), failures = failures.len()))]
    pub async fn synthesize(
        &self,
        case: &Case,
        opinions: &[Opinion],
        failures: &[SpecialistFailure],
    ) -> String {
        if let Some(moderator) = &self.moderator {
            let prompt = Self::moderator_prompt(case, opinions, failures);
            match moderator.complete(&prompt).await {
                Ok(output) if !output.trim().is_empty() => return output.trim().to_string(),
                Ok(_) => warn!("moderator returned empty output; using template overview"),
                Err(err) => warn!(?err, "moderator synthesis failed; using template overview"),
            }
        }

        render_template_overview(opinions, failures)
    }

    fn moderator_prompt(
        case: &Case,
        opinions: &[Opinion],
        failures: &[SpecialistFailure],
    ) -> String {
        let mut prompt = format!(
            "{directive}\n\nPatient case:\n{description}\n\nSpecialist findings:\n",
            directive = Self::DIRECTIVE,
            description = case.description.trim()
        );

        for opinion in opinions {
            prompt.push_str(&format!(
                "\n--- {} ---\n{}\n",
                opinion.role,
                opinion.assessment.trim()
            ));
        }

        if failures.is_empty() {
            prompt.push_str("\nAll consulted specialists responded.\n");
        } else {
            prompt.push_str("\nSpecialists that did not respond:\n");
            for failure in failures {
                prompt.push_str(&format!("- {}: {}\n", failure.role, failure.reason));
            }
        }

        prompt
    }
}

/// Deterministic fallback: each finding under its role heading, then the
/// non-responders. Never invents content for a failed specialist.
pub(crate) fn render_template_overview(
    opinions: &[Opinion],
    failures: &[SpecialistFailure],
) -> String {
    let mut overview = String::new();

    for opinion in opinions {
        overview.push_str(&format!("## {}\n{}\n\n", opinion.role, opinion.assessment.trim()));
    }

    if failures.is_empty() {
        overview.push_str("All consulted specialists contributed.\n");
    } else {
        overview.push_str("Specialists without an opinion:\n");
        for failure in failures {
            overview.push_str(&format!("- {}: {}\n", failure.role, failure.reason));
        }
    }

    overview
}
