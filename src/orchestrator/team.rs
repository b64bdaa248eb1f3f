use std::env;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::task::JoinSet;
use tokio::time::timeout;
use tracing::{info, instrument, warn};

use crate::agents::{AssessmentError, Case, Opinion, SpecialistHandle, SpecialtyRole};
use crate::llm_client::SharedLlmClient;

use super::summary::{SpecialistFailure, TeamSummary};
use super::synthesis::Synthesizer;

/// The only errors `consult` returns. Per-specialist failures never surface
/// here; they land in the TeamSummary's failure set.
#[derive(Debug, Error)]
pub enum ConsultError {
    #[error("case description is empty; nothing to dispatch")]
    InvalidCase,
    #[error("all {count} specialists failed to produce an opinion", count = .0.len())]
    ConsultationFailed(Vec<SpecialistFailure>),
}

#[derive(Debug, Clone)]
pub struct TeamConfig {
    /// Time box applied to each specialist invocation individually.
    pub specialist_timeout: Duration,
    /// Optional bound on the whole consultation. When it expires, still-
    /// pending specialists are recorded as timed out and the consult
    /// proceeds with whatever was collected.
    pub consult_deadline: Option<Duration>,
}

impl Default for TeamConfig {
    fn default() -> Self {
        Self {
            specialist_timeout: Duration::from_secs(60),
            consult_deadline: None,
        }
    }
}

impl TeamConfig {
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(raw) = env::var("MEDAURA_SPECIALIST_TIMEOUT_SECS") {
            match raw.parse::<u64>() {
                Ok(secs) if secs > 0 => config.specialist_timeout = Duration::from_secs(secs),
                _ => warn!(%raw, "ignoring invalid MEDAURA_SPECIALIST_TIMEOUT_SECS"),
            }
        }

        if let Ok(raw) = env::var("MEDAURA_CONSULT_DEADLINE_SECS") {
            match raw.parse::<u64>() {
                Ok(secs) if secs > 0 => config.consult_deadline = Some(Duration::from_secs(secs)),
                _ => warn!(%raw, "ignoring invalid MEDAURA_CONSULT_DEADLINE_SECS"),
            }
        }

        config
    }
}

/// Coordinator for one consultation roster. Owns its specialists; the roster
/// is read-only during consults, so one team serves concurrent `consult`
/// calls for different cases.
pub struct MultidisciplinaryTeam {
    roster: Vec<SpecialistHandle>,
    synthesizer: Synthesizer,
    config: TeamConfig,
}

impl MultidisciplinaryTeam {
    pub fn new(roster: Vec<SpecialistHandle>) -> Self {
        Self {
            roster,
            synthesizer: Synthesizer::template(),
            config: TeamConfig::default(),
        }
    }

    pub fn with_moderator(mut self, client: SharedLlmClient) -> Self {
        self.synthesizer = Synthesizer::moderated(client);
        self
    }

    pub fn with_config(mut self, config: TeamConfig) -> Self {
        self.config = config;
        self
    }

    /// Dispatch the case to every roster member concurrently, wait for all of
    /// them, then synthesize. Returns a TeamSummary whenever at least one
    /// specialist produced an Opinion.
    #[instrument(skip_all, fields(case_id = case.id.as_deref().unwrap_or("unlabeled"), roster = self.roster.len()))]
    pub async fn consult(&self, case: &Case) -> Result<TeamSummary, ConsultError> {
        if case.is_blank() {
            return Err(ConsultError::InvalidCase);
        }

        let mut opinions = Vec::new();
        let mut failures = Vec::new();

        for (role, outcome) in self.dispatch_all(case).await {
            match outcome {
                Ok(opinion) => opinions.push(opinion),
                Err(reason) => {
                    warn!(%role, %reason, "specialist produced no opinion");
                    failures.push(SpecialistFailure { role, reason });
                }
            }
        }

        if opinions.is_empty() {
            return Err(ConsultError::ConsultationFailed(failures));
        }

        let overview = self.synthesizer.synthesize(case, &opinions, &failures).await;

        info!(
            opinions = opinions.len(),
            failures = failures.len(),
            "consultation complete"
        );

        Ok(TeamSummary {
            case: case.clone(),
            opinions,
            failures,
            overview,
        })
    }

    /// Fan-out over the roster. Each task is tagged with its roster index at
    /// spawn time and results are bucketed by that index, so completion order
    /// never leaks into the output. One specialist timing out or failing
    /// neither blocks nor cancels its siblings.
    async fn dispatch_all(
        &self,
        case: &Case,
    ) -> Vec<(SpecialtyRole, Result<Opinion, AssessmentError>)> {
        let per_specialist = self.config.specialist_timeout;
        let mut join_set = JoinSet::new();

        for (index, specialist) in self.roster.iter().enumerate() {
            let specialist = Arc::clone(specialist);
            let case = case.clone();

            join_set.spawn(async move {
                let outcome = match timeout(per_specialist, specialist.assess(&case)).await {
                    Ok(result) => result,
                    Err(_) => Err(AssessmentError::InvocationTimeout {
                        secs: per_specialist.as_secs(),
                    }),
                };
                (index, outcome)
            });
        }

        let mut slots: Vec<Option<Result<Opinion, AssessmentError>>> =
            (0..self.roster.len()).map(|_| None).collect();
        let mut deadline_hit = false;
        let deadline_secs = self.config.consult_deadline.map(|limit| limit.as_secs());

        match self.config.consult_deadline {
            Some(limit) => {
                let deadline = tokio::time::Instant::now() + limit;
                loop {
                    match tokio::time::timeout_at(deadline, join_set.join_next()).await {
                        Ok(Some(Ok((index, outcome)))) => slots[index] = Some(outcome),
                        Ok(Some(Err(err))) => warn!(?err, "specialist task aborted"),
                        Ok(None) => break,
                        Err(_) => {
                            warn!(
                                limit_secs = limit.as_secs(),
                                "consultation deadline reached; pending specialists recorded as timed out"
                            );
                            deadline_hit = true;
                            join_set.abort_all();
                            break;
                        }
                    }
                }
            }
            None => {
                while let Some(joined) = join_set.join_next().await {
                    match joined {
                        Ok((index, outcome)) => slots[index] = Some(outcome),
                        Err(err) => warn!(?err, "specialist task aborted"),
                    }
                }
            }
        }

        let mut outcomes = Vec::with_capacity(self.roster.len());
        for (index, specialist) in self.roster.iter().enumerate() {
            let outcome = match slots[index].take() {
                Some(outcome) => outcome,
                None if deadline_hit => Err(AssessmentError::InvocationTimeout {
                    secs: deadline_secs.unwrap_or_else(|| per_specialist.as_secs()),
                }),
                None => Err(AssessmentError::InvocationFailure(
                    "specialist task did not complete".to_string(),
                )),
            };
            outcomes.push((specialist.role(), outcome));
        }

        outcomes
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use async_trait::async_trait;

    use super::*;
    use crate::agents::SpecialistBehavior;

    struct ScriptedSpecialist {
        role: SpecialtyRole,
        delay: Duration,
        outcome: Result<String, AssessmentError>,
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl SpecialistBehavior for ScriptedSpecialist {
        fn role(&self) -> SpecialtyRole {
            self.role
        }

        async fn assess(&self, _case: &Case) -> Result<Opinion, AssessmentError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            match &self.outcome {
                Ok(text) => Ok(Opinion {
                    role: self.role,
                    assessment: text.clone(),
                    confidence: None,
                    differential: Vec::new(),
                }),
                Err(err) => Err(err.clone()),
            }
        }
    }

    fn scripted(
        role: SpecialtyRole,
        delay: Duration,
        outcome: Result<String, AssessmentError>,
        calls: &Arc<AtomicUsize>,
    ) -> SpecialistHandle {
        Arc::new(ScriptedSpecialist {
            role,
            delay,
            outcome,
            calls: Arc::clone(calls),
        })
    }

    fn healthy(role: SpecialtyRole, calls: &Arc<AtomicUsize>) -> SpecialistHandle {
        scripted(
            role,
            Duration::ZERO,
            Ok(format!("{role} finding")),
            calls,
        )
    }

    const FULL_ROSTER: [SpecialtyRole; 5] = [
        SpecialtyRole::Internist,
        SpecialtyRole::Neurologist,
        SpecialtyRole::Cardiologist,
        SpecialtyRole::Gastroenterologist,
        SpecialtyRole::Psychiatrist,
    ];

    fn sample_case() -> Case {
        Case::with_id("mdt-42", "58-year-old with exertional chest tightness.")
    }

    #[tokio::test]
    async fn healthy_roster_produces_one_opinion_per_role() {
        let calls = Arc::new(AtomicUsize::new(0));
        let roster = FULL_ROSTER.iter().map(|&r| healthy(r, &calls)).collect();
        let team = MultidisciplinaryTeam::new(roster);

        let summary = team.consult(&sample_case()).await.expect("consult");

        assert_eq!(summary.opinions.len(), 5);
        assert!(summary.failures.is_empty());
        assert_eq!(summary.roles_covered(), 5);
        assert_eq!(calls.load(Ordering::SeqCst), 5);
    }

    #[tokio::test]
    async fn single_failure_is_recorded_without_aborting_siblings() {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut roster: Vec<SpecialistHandle> =
            FULL_ROSTER.iter().map(|&r| healthy(r, &calls)).collect();
        roster[2] = scripted(
            SpecialtyRole::Cardiologist,
            Duration::ZERO,
            Err(AssessmentError::InvocationFailure("backend 502".to_string())),
            &calls,
        );
        let team = MultidisciplinaryTeam::new(roster);

        let summary = team.consult(&sample_case()).await.expect("consult");

        assert_eq!(summary.opinions.len(), 4);
        assert_eq!(summary.failures.len(), 1);
        assert_eq!(summary.failures[0].role, SpecialtyRole::Cardiologist);
        assert!(summary.opinion_for(SpecialtyRole::Cardiologist).is_none());
    }

    #[tokio::test]
    async fn consultation_fails_only_when_every_specialist_fails() {
        let calls = Arc::new(AtomicUsize::new(0));
        let roster = FULL_ROSTER
            .iter()
            .map(|&r| {
                scripted(
                    r,
                    Duration::ZERO,
                    Err(AssessmentError::MalformedResponse("garbage".to_string())),
                    &calls,
                )
            })
            .collect();
        let team = MultidisciplinaryTeam::new(roster);

        let err = team.consult(&sample_case()).await.expect_err("must fail");
        match err {
            ConsultError::ConsultationFailed(failures) => {
                assert_eq!(failures.len(), 5);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn opinions_keep_roster_order_when_completion_order_inverts() {
        let calls = Arc::new(AtomicUsize::new(0));
        // First roster member answers last, last answers first.
        let delays = [5, 4, 3, 2, 0];
        let roster = FULL_ROSTER
            .iter()
            .zip(delays)
            .map(|(&role, secs)| {
                scripted(
                    role,
                    Duration::from_secs(secs),
                    Ok(format!("{role} finding")),
                    &calls,
                )
            })
            .collect();
        let team = MultidisciplinaryTeam::new(roster);

        let summary = team.consult(&sample_case()).await.expect("consult");

        let roles: Vec<SpecialtyRole> = summary.opinions.iter().map(|o| o.role).collect();
        assert_eq!(roles, FULL_ROSTER.to_vec());
    }

    #[tokio::test]
    async fn blank_case_is_rejected_before_any_dispatch() {
        let calls = Arc::new(AtomicUsize::new(0));
        let roster = FULL_ROSTER.iter().map(|&r| healthy(r, &calls)).collect();
        let team = MultidisciplinaryTeam::new(roster);

        let err = team
            .consult(&Case::new("   \n"))
            .await
            .expect_err("must reject");

        assert!(matches!(err, ConsultError::InvalidCase));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_specialist_times_out_without_cancelling_siblings() {
        let calls = Arc::new(AtomicUsize::new(0));
        let roster = vec![
            healthy(SpecialtyRole::Internist, &calls),
            scripted(
                SpecialtyRole::Cardiologist,
                Duration::from_secs(600),
                Ok("too late".to_string()),
                &calls,
            ),
        ];
        let team = MultidisciplinaryTeam::new(roster).with_config(TeamConfig {
            specialist_timeout: Duration::from_secs(60),
            consult_deadline: None,
        });

        let summary = team.consult(&sample_case()).await.expect("consult");

        assert_eq!(summary.opinions.len(), 1);
        assert_eq!(summary.opinions[0].role, SpecialtyRole::Internist);
        assert_eq!(
            summary.failures,
            vec![SpecialistFailure {
                role: SpecialtyRole::Cardiologist,
                reason: AssessmentError::InvocationTimeout { secs: 60 },
            }]
        );
        // Template overview carries the surviving finding and names the
        // non-responder without inventing cardiology content.
        assert!(summary.overview.contains("## Internist"));
        assert!(summary.overview.contains("Cardiologist: specialist did not respond"));
        assert!(!summary.overview.contains("## Cardiologist"));
    }

    #[tokio::test(start_paused = true)]
    async fn dispatch_is_concurrent_across_the_roster() {
        let calls = Arc::new(AtomicUsize::new(0));
        let roster = FULL_ROSTER
            .iter()
            .map(|&role| {
                scripted(
                    role,
                    Duration::from_secs(10),
                    Ok(format!("{role} finding")),
                    &calls,
                )
            })
            .collect();
        let team = MultidisciplinaryTeam::new(roster);

        let started = tokio::time::Instant::now();
        let summary = team.consult(&sample_case()).await.expect("consult");
        let elapsed = started.elapsed();

        assert_eq!(summary.opinions.len(), 5);
        // Serial dispatch would take 50s of virtual time; concurrent takes ~10s.
        assert!(elapsed < Duration::from_secs(20), "elapsed {elapsed:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn consult_deadline_marks_pending_specialists_timed_out() {
        let calls = Arc::new(AtomicUsize::new(0));
        let roster = vec![
            healthy(SpecialtyRole::Internist, &calls),
            scripted(
                SpecialtyRole::Neurologist,
                Duration::from_secs(3600),
                Ok("never arrives".to_string()),
                &calls,
            ),
        ];
        let team = MultidisciplinaryTeam::new(roster).with_config(TeamConfig {
            specialist_timeout: Duration::from_secs(7200),
            consult_deadline: Some(Duration::from_secs(30)),
        });

        let summary = team.consult(&sample_case()).await.expect("consult");

        assert_eq!(summary.opinions.len(), 1);
        assert_eq!(
            summary.failures,
            vec![SpecialistFailure {
                role: SpecialtyRole::Neurologist,
                reason: AssessmentError::InvocationTimeout { secs: 30 },
            }]
        );
    }

    #[tokio::test]
    async fn one_team_serves_concurrent_consults() {
        let calls = Arc::new(AtomicUsize::new(0));
        let roster: Vec<SpecialistHandle> =
            FULL_ROSTER.iter().map(|&r| healthy(r, &calls)).collect();
        let team = MultidisciplinaryTeam::new(roster);

        let first = Case::with_id("a", "first case");
        let second = Case::with_id("b", "second case");
        let (left, right) = tokio::join!(team.consult(&first), team.consult(&second));

        assert_eq!(left.expect("first").case.id.as_deref(), Some("a"));
        assert_eq!(right.expect("second").case.id.as_deref(), Some("b"));
        assert_eq!(calls.load(Ordering::SeqCst), 10);
    }
}
