//! Enriched lead reads
//!
//! Every lead leaving the engine is wrapped in a [`LeadView`]: recency
//! metrics, the derived submission window and sprint phase, and builder
//! details joined from the alumni registry. None of this is persisted.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sprint_common::{recency, AlumniProfile, Lead, SprintPolicy};

/// Where a lead sits in the sprint state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SprintPhase {
    NotLaunched,
    /// Active with open slots
    Open,
    /// Active, every slot taken, still inside the submission window
    Full,
    /// Submission window closed, waiting for reviews or votes
    Evaluating,
    Awarded,
    Terminated,
}

impl SprintPhase {
    pub fn of(lead: &Lead, now: DateTime<Utc>, policy: &SprintPolicy) -> Self {
        if lead.has_winner() {
            SprintPhase::Awarded
        } else if !lead.sprint_active {
            if lead.status == crate::STATUS_TERMINATED {
                SprintPhase::Terminated
            } else {
                SprintPhase::NotLaunched
            }
        } else if lead.submission_window_closed(now, policy) {
            SprintPhase::Evaluating
        } else if lead.slots_remaining() == 0 {
            SprintPhase::Full
        } else {
            SprintPhase::Open
        }
    }
}

/// Builder participation joined with their registry profile
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BuilderDetail {
    pub user_id: String,
    pub name: Option<String>,
    pub specialty: Option<String>,
    pub quality_rating: Option<f64>,
    pub checkpoints_completed: u32,
    pub is_finalist: bool,
    pub flagged: bool,
}

/// A lead as returned by every engine operation
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LeadView {
    #[serde(flatten)]
    pub lead: Lead,

    pub weighted_issues: f64,

    pub recency_score: f64,

    #[serde(rename = "submissionWindowOpen")]
    pub submission_window_open: bool,

    #[serde(rename = "sprintPhase")]
    pub sprint_phase: SprintPhase,

    #[serde(rename = "builderDetails")]
    pub builder_details: Vec<BuilderDetail>,
}

impl LeadView {
    /// Enrich a lead. `profiles` is looked up by builder id; absent
    /// profiles leave the detail fields empty.
    pub fn build(
        lead: Lead,
        profiles: &[AlumniProfile],
        now: DateTime<Utc>,
        policy: &SprintPolicy,
    ) -> Self {
        let metrics = recency::weigh(lead.recency_data.as_ref());

        let builder_details = lead
            .active_builders
            .iter()
            .map(|builder| {
                let profile = profiles.iter().find(|p| p.id == builder.user_id);
                BuilderDetail {
                    user_id: builder.user_id.clone(),
                    name: profile.map(|p| p.name.clone()),
                    specialty: profile.map(|p| p.specialty.clone()),
                    quality_rating: profile.map(|p| p.quality_rating),
                    checkpoints_completed: builder.checkpoints_completed,
                    is_finalist: builder.is_finalist(policy.total_milestones),
                    flagged: builder.flagged_expires_at.is_some_and(|until| until > now),
                }
            })
            .collect();

        Self {
            weighted_issues: metrics.weighted_issues,
            recency_score: metrics.recency_score,
            submission_window_open: lead.submission_window_open(now, policy),
            sprint_phase: SprintPhase::of(&lead, now, policy),
            builder_details,
            lead,
        }
    }
}
