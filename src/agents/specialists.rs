use async_trait::async_trait;
use tracing::instrument;

use crate::llm_client::SharedLlmClient;

use super::traits::{AssessmentError, Case, Opinion, SpecialistBehavior, SpecialtyRole};

fn format_prompt(directive: &str, body_hint: &str, case: &Case) -> String {
    let mut prompt = String::from(directive.trim());

    if let Some(id) = case.id.as_deref().filter(|id| !id.trim().is_empty()) {
        prompt.push_str("\n\nCase identifier: ");
        prompt.push_str(id.trim());
    }

    prompt.push_str("\n\nPatient case:\n");
    prompt.push_str(case.description.trim());
    prompt.push_str("\n\nRespond with ");
    prompt.push_str(body_hint.trim());
    prompt.push('.');

    prompt
}

/// Lenient extraction of the structured sections the body hints ask for. A
/// free-text body with no recognized sections is still a well-formed Opinion;
/// only an empty output is malformed.
fn parse_opinion(role: SpecialtyRole, raw: &str) -> Result<Opinion, AssessmentError> {
    let text = raw.trim();
    if text.is_empty() {
        return Err(AssessmentError::MalformedResponse(
            "empty model output".to_string(),
        ));
    }

    let mut confidence = None;
    let mut differential = Vec::new();
    let mut in_differential = false;

    for line in text.lines() {
        let trimmed = line.trim();
        let lower = trimmed.to_lowercase();

        if let Some(rest) = lower.strip_prefix("confidence:") {
            if let Ok(value) = rest.trim().parse::<f32>() {
                confidence = Some(value.clamp(0.0, 1.0));
            }
            continue;
        }

        if trimmed.starts_with('#') {
            in_differential = lower.contains("differential");
            continue;
        }

        if in_differential {
            if let Some(item) = trimmed
                .strip_prefix("- ")
                .or_else(|| trimmed.strip_prefix("* "))
            {
                let item = item.trim();
                if !item.is_empty() {
                    differential.push(item.to_string());
                }
            }
        }
    }

    Ok(Opinion {
        role,
        assessment: text.to_string(),
        confidence,
        differential,
    })
}

pub struct Internist {
    llm_client: SharedLlmClient,
}

impl Internist {
    const DIRECTIVE: &'static str = "You are the consulting internist on a multidisciplinary team. Review the full history, reconcile comorbidities and medications, and flag systemic findings the narrower specialties may miss.";
    const BODY_HINT: &'static str = "## Assessment, ## Differential (bulleted), ## Recommendations, and a final line Confidence: <0-1>";

    pub fn new(llm_client: SharedLlmClient) -> Self {
        Self { llm_client }
    }
}

#[async_trait]
impl SpecialistBehavior for Internist {
    fn role(&self) -> SpecialtyRole {
        SpecialtyRole::Internist
    }

    #[instrument(skip_all, fields(role = "internist"))]
    async fn assess(&self, case: &Case) -> Result<Opinion, AssessmentError> {
        let prompt = format_prompt(Self::DIRECTIVE, Self::BODY_HINT, case);
        let raw = self
            .llm_client
            .complete(&prompt)
            .await
            .map_err(|err| AssessmentError::InvocationFailure(err.to_string()))?;
        parse_opinion(self.role(), &raw)
    }
}

pub struct Neurologist {
    llm_client: SharedLlmClient,
}

impl Neurologist {
    const DIRECTIVE: &'static str = "You are the consulting neurologist on a multidisciplinary team. Localize any deficits, separate central from peripheral causes, and state which findings require urgent imaging.";
    const BODY_HINT: &'static str = "## Assessment (localize first), ## Differential (bulleted), ## Workup, and a final line Confidence: <0-1>";

    pub fn new(llm_client: SharedLlmClient) -> Self {
        Self { llm_client }
    }
}

#[async_trait]
impl SpecialistBehavior for Neurologist {
    fn role(&self) -> SpecialtyRole {
        SpecialtyRole::Neurologist
    }

    #[instrument(skip_all, fields(role = "neurologist"))]
    async fn assess(&self, case: &Case) -> Result<Opinion, AssessmentError> {
        let prompt = format_prompt(Self::DIRECTIVE, Self::BODY_HINT, case);
        let raw = self
            .llm_client
            .complete(&prompt)
            .await
            .map_err(|err| AssessmentError::InvocationFailure(err.to_string()))?;
        parse_opinion(self.role(), &raw)
    }
}

pub struct Cardiologist {
    llm_client: SharedLlmClient,
}

impl Cardiologist {
    const DIRECTIVE: &'static str = "You are the consulting cardiologist on a multidisciplinary team. Weigh ischemic, structural, and arrhythmic explanations, and be explicit about risk stratification.";
    const BODY_HINT: &'static str = "## Assessment, ## Differential (bulleted, most dangerous first), ## Risk stratification, and a final line Confidence: <0-1>";

    pub fn new(llm_client: SharedLlmClient) -> Self {
        Self { llm_client }
    }
}

#[async_trait]
impl SpecialistBehavior for Cardiologist {
    fn role(&self) -> SpecialtyRole {
        SpecialtyRole::Cardiologist
    }

    #[instrument(skip_all, fields(role = "cardiologist"))]
    async fn assess(&self, case: &Case) -> Result<Opinion, AssessmentError> {
        let prompt = format_prompt(Self::DIRECTIVE, Self::BODY_HINT, case);
        let raw = self
            .llm_client
            .complete(&prompt)
            .await
            .map_err(|err| AssessmentError::InvocationFailure(err.to_string()))?;
        parse_opinion(self.role(), &raw)
    }
}

pub struct Gastroenterologist {
    llm_client: SharedLlmClient,
}

impl Gastroenterologist {
    const DIRECTIVE: &'static str = "You are the consulting gastroenterologist on a multidisciplinary team. Relate symptoms to the GI tract and hepatobiliary system, and call out alarm features that change the workup.";
    const BODY_HINT: &'static str = "## Assessment, ## Differential (bulleted), ## Alarm features, and a final line Confidence: <0-1>";

    pub fn new(llm_client: SharedLlmClient) -> Self {
        Self { llm_client }
    }
}

#[async_trait]
impl SpecialistBehavior for Gastroenterologist {
    fn role(&self) -> SpecialtyRole {
        SpecialtyRole::Gastroenterologist
    }

    #[instrument(skip_all, fields(role = "gastroenterologist"))]
    async fn assess(&self, case: &Case) -> Result<Opinion, AssessmentError> {
        let prompt = format_prompt(Self::DIRECTIVE, Self::BODY_HINT, case);
        let raw = self
            .llm_client
            .complete(&prompt)
            .await
            .map_err(|err| AssessmentError::InvocationFailure(err.to_string()))?;
        parse_opinion(self.role(), &raw)
    }
}

pub struct Psychiatrist {
    llm_client: SharedLlmClient,
}

impl Psychiatrist {
    const DIRECTIVE: &'static str = "You are the consulting psychiatrist on a multidisciplinary team. Screen for mood, anxiety, somatic, and substance-related contributions without dismissing organic causes the other specialties are pursuing.";
    const BODY_HINT: &'static str = "## Assessment, ## Differential (bulleted), ## Screening recommendations, and a final line Confidence: <0-1>";

    pub fn new(llm_client: SharedLlmClient) -> Self {
        Self { llm_client }
    }
}

#[async_trait]
impl SpecialistBehavior for Psychiatrist {
    fn role(&self) -> SpecialtyRole {
        SpecialtyRole::Psychiatrist
    }

    #[instrument(skip_all, fields(role = "psychiatrist"))]
    async fn assess(&self, case: &Case) -> Result<Opinion, AssessmentError> {
        let prompt = format_prompt(Self::DIRECTIVE, Self::BODY_HINT, case);
        let raw = self
            .llm_client
            .complete(&prompt)
            .await
            .map_err(|err| AssessmentError::InvocationFailure(err.to_string()))?;
        parse_opinion(self.role(), &raw)
    }
}
