use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::agents::{AssessmentError, Case, Opinion, SpecialtyRole};

/// One roster member that produced no usable Opinion, with the typed reason.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpecialistFailure {
    pub role: SpecialtyRole,
    pub reason: AssessmentError,
}

/// Aggregated consultation result. Every roster role lands in exactly one of
/// `opinions` or `failures`; opinions keep roster order, never completion
/// order. Data only — built once by the team, owned by the caller after.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TeamSummary {
    pub case: Case,
    pub opinions: Vec<Opinion>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub failures: Vec<SpecialistFailure>,
    pub overview: String,
}

impl TeamSummary {
    /// Number of roster roles accounted for, across successes and failures.
    #[allow(dead_code)]
    pub fn roles_covered(&self) -> usize {
        self.opinions.len() + self.failures.len()
    }

    #[allow(dead_code)]
    pub fn opinion_for(&self, role: SpecialtyRole) -> Option<&Opinion> {
        self.opinions.iter().find(|opinion| opinion.role == role)
    }

    #[allow(dead_code)]
    pub fn is_partial(&self) -> bool {
        !self.failures.is_empty()
    }
}

/// Export-side wrapper around a finished consultation, the unit the catalog
/// exporter reads and writes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaseRecord {
    pub summary: TeamSummary,
    pub created_at: DateTime<Utc>,
}

impl CaseRecord {
    pub fn new(summary: TeamSummary) -> Self {
        Self {
            summary,
            created_at: Utc::now(),
        }
    }

    pub fn case(&self) -> &Case {
        &self.summary.case
    }

    /// Filename stem for the exported record: the case id when present,
    /// otherwise a timestamp-derived one so id-less records stay addressable.
    pub fn file_stem(&self) -> String {
        match self.case().id.as_deref().map(str::trim) {
            Some(id) if !id.is_empty() => id
                .chars()
                .map(|c| {
                    if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                        c
                    } else {
                        '-'
                    }
                })
                .collect(),
            _ => format!("case-{}", self.created_at.format("%Y%m%d%H%M%S%3f")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_summary() -> TeamSummary {
        TeamSummary {
            case: Case::with_id("mdt-001", "71-year-old with falls and confusion."),
            opinions: vec![
                Opinion {
                    role: SpecialtyRole::Internist,
                    assessment: "Polypharmacy review indicated.".to_string(),
                    confidence: Some(0.7),
                    differential: vec!["Orthostatic hypotension".to_string()],
                },
                Opinion {
                    role: SpecialtyRole::Neurologist,
                    assessment: "Consider normal pressure hydrocephalus.".to_string(),
                    confidence: None,
                    differential: Vec::new(),
                },
            ],
            failures: vec![SpecialistFailure {
                role: SpecialtyRole::Cardiologist,
                reason: AssessmentError::InvocationTimeout { secs: 60 },
            }],
            overview: "Two specialties responded; cardiology did not.".to_string(),
        }
    }

    #[test]
    fn summary_round_trips_through_json_without_field_loss() {
        let summary = sample_summary();
        let json = serde_json::to_string_pretty(&summary).expect("serialize");
        let back: TeamSummary = serde_json::from_str(&json).expect("deserialize");

        assert_eq!(back, summary);
        assert_eq!(back.case.id.as_deref(), Some("mdt-001"));
        assert_eq!(back.opinions.len(), 2);
        assert_eq!(back.failures.len(), 1);
    }

    #[test]
    fn roles_never_repeat_across_opinions_and_failures() {
        let summary = sample_summary();
        let mut seen = std::collections::HashSet::new();

        for opinion in &summary.opinions {
            assert!(seen.insert(opinion.role), "duplicate role in opinions");
        }
        for failure in &summary.failures {
            assert!(seen.insert(failure.role), "role in both opinions and failures");
        }
        assert_eq!(seen.len(), summary.roles_covered());
    }

    #[test]
    fn opinion_lookup_by_role() {
        let summary = sample_summary();
        assert!(summary.opinion_for(SpecialtyRole::Internist).is_some());
        assert!(summary.opinion_for(SpecialtyRole::Psychiatrist).is_none());
        assert!(summary.is_partial());
    }

    #[test]
    fn record_stem_prefers_sanitized_case_id() {
        let record = CaseRecord::new(sample_summary());
        assert_eq!(record.file_stem(), "mdt-001");

        let mut odd = sample_summary();
        odd.case.id = Some("ward 3/bed 12".to_string());
        assert_eq!(CaseRecord::new(odd).file_stem(), "ward-3-bed-12");
    }

    #[test]
    fn record_stem_falls_back_to_timestamp() {
        let mut summary = sample_summary();
        summary.case.id = None;
        let record = CaseRecord::new(summary);
        assert!(record.file_stem().starts_with("case-"));
    }
}
