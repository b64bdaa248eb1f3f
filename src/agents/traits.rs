use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Patient scenario submitted for consultation. Immutable once dispatched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Case {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub description: String,
}

impl Case {
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            id: None,
            description: description.into(),
        }
    }

    pub fn with_id(id: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            id: Some(id.into()),
            description: description.into(),
        }
    }

    /// Blank cases are rejected by the team before any specialist is dispatched.
    pub fn is_blank(&self) -> bool {
        self.description.trim().is_empty()
    }
}

/// The five roster specialties, in presentation order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SpecialtyRole {
    Internist,
    Neurologist,
    Cardiologist,
    Gastroenterologist,
    Psychiatrist,
}

impl fmt::Display for SpecialtyRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            SpecialtyRole::Internist => "Internist",
            SpecialtyRole::Neurologist => "Neurologist",
            SpecialtyRole::Cardiologist => "Cardiologist",
            SpecialtyRole::Gastroenterologist => "Gastroenterologist",
            SpecialtyRole::Psychiatrist => "Psychiatrist",
        };

        write!(f, "{}", label)
    }
}

/// One specialist's output for one case.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Opinion {
    pub role: SpecialtyRole,
    pub assessment: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f32>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub differential: Vec<String>,
}

/// Why a specialist produced no usable Opinion. A partial or corrupt result is
/// never surfaced as success; it becomes one of these.
#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssessmentError {
    #[error("specialist did not respond within {secs}s")]
    InvocationTimeout { secs: u64 },
    #[error("reasoning backend call failed: {0}")]
    InvocationFailure(String),
    #[error("reasoning backend returned an unusable response: {0}")]
    MalformedResponse(String),
}

/// Uniform contract over the five domain-framed specialists. Implementations
/// hold no per-case state, so one handle may serve concurrent consultations.
#[async_trait]
pub trait SpecialistBehavior: Send + Sync {
    fn role(&self) -> SpecialtyRole;

    async fn assess(&self, case: &Case) -> Result<Opinion, AssessmentError>;
}

pub type SpecialistHandle = Arc<dyn SpecialistBehavior>;
