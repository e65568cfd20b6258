//! Data models for leads, sprints, alumni and peer voting

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::policy::SprintPolicy;
use crate::recency::{self, RecencyData};

/// Where a lead's business is located
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Location {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub neighborhood: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub borough: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub zip: Option<String>,
}

/// Grouped customer complaints for one category
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComplaintCluster {
    pub category: String,

    #[serde(default)]
    pub total_count: u32,

    #[serde(default)]
    pub recent_count: u32,

    #[serde(default)]
    pub sample_quotes: Vec<String>,
}

/// Verification state of a single milestone
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckpointState {
    #[default]
    Pending,
    Submitted,
    #[serde(alias = "approved")]
    Verified,
    Rejected,
}

/// Latest submission for one milestone
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckpointStatus {
    pub status: CheckpointState,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proof_link: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub submitted_at: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reviewed_at: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

/// Scout's assessment of a builder's work
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoutReview {
    pub quality_score: u8,
    pub scout_review_score: u8,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub review_notes: Option<String>,

    pub reviewed_at: DateTime<Utc>,
}

/// One builder's participation in a sprint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActiveBuilder {
    pub user_id: String,
    pub joined_at: DateTime<Utc>,

    /// Highest verified milestone; never decreases
    #[serde(default)]
    pub checkpoints_completed: u32,

    #[serde(default)]
    pub selected_deliverables: Vec<String>,

    /// Every proof link ever submitted, without duplicates
    #[serde(default)]
    pub proof_links: Vec<String>,

    #[serde(default)]
    pub checkpoint_statuses: BTreeMap<u32, CheckpointStatus>,

    #[serde(rename = "last_checkpoint_update", default)]
    pub last_checkpoint_update: Option<DateTime<Utc>>,

    #[serde(rename = "last_nudged_at", default)]
    pub last_nudged_at: Option<DateTime<Utc>>,

    #[serde(rename = "flagged_at", default)]
    pub flagged_at: Option<DateTime<Utc>>,

    #[serde(rename = "flagged_expires_at", default)]
    pub flagged_expires_at: Option<DateTime<Utc>>,

    /// When this builder reached full completion
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,

    #[serde(default)]
    pub scout_review: Option<ScoutReview>,
}

impl ActiveBuilder {
    pub fn new(user_id: String, selected_deliverables: Vec<String>, joined_at: DateTime<Utc>) -> Self {
        Self {
            user_id,
            joined_at,
            checkpoints_completed: 0,
            selected_deliverables,
            proof_links: Vec::new(),
            checkpoint_statuses: BTreeMap::new(),
            last_checkpoint_update: None,
            last_nudged_at: None,
            flagged_at: None,
            flagged_expires_at: None,
            completed_at: None,
            scout_review: None,
        }
    }

    pub fn is_finalist(&self, total_milestones: u32) -> bool {
        self.checkpoints_completed >= total_milestones
    }

    /// Most recently submitted proof link
    pub fn latest_proof_link(&self) -> Option<&str> {
        self.proof_links.last().map(String::as_str)
    }

    /// Last sign of life used by stall detection
    pub fn last_activity(&self) -> DateTime<Utc> {
        self.last_checkpoint_update.unwrap_or(self.joined_at)
    }
}

/// Administrative action recorded in a lead's audit log
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    Pause,
    Resume,
    ExtendDeadline,
    EvictBuilder,
    TerminateSprint,
    NudgeBuilder,
    FlagBuilder,
}

/// Immutable audit log entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditEntry {
    pub timestamp: DateTime<Utc>,
    pub actor: String,
    pub action: AuditAction,
    pub details: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_user_id: Option<String>,
}

/// A sourced business opportunity and its sprint state
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Lead {
    pub id: String,

    #[serde(rename = "business_name", alias = "businessName")]
    pub business_name: String,

    pub location: Location,

    #[serde(rename = "friction_type", alias = "frictionType")]
    pub friction_type: Option<String>,

    #[serde(rename = "complaint_clusters", alias = "complaintClusters")]
    pub complaint_clusters: Vec<ComplaintCluster>,

    #[serde(
        rename = "recency_data",
        alias = "recencyData",
        deserialize_with = "recency::deserialize_lenient"
    )]
    pub recency_data: Option<RecencyData>,

    /// Free-form lifecycle label (qualified, briefed, matched, awarded, terminated)
    pub status: String,

    pub sprint_active: bool,
    pub max_slots: u8,
    pub sprint_duration: u8,
    pub sprint_started_at: Option<DateTime<Utc>>,
    pub is_paused: bool,
    pub sprint_deadline: Option<DateTime<Utc>>,

    /// Bumped on every launch; scopes build ids to one sprint
    pub sprint_round: u32,

    /// Set once, by the first builder to complete every milestone
    pub first_completion_at: Option<DateTime<Utc>>,

    pub winner_user_id: Option<String>,

    #[serde(rename = "voting_open")]
    pub voting_open: bool,

    pub winner_average_score: Option<f64>,

    pub active_builders: Vec<ActiveBuilder>,

    pub audit_log: Vec<AuditEntry>,

    /// Incremented on every write; used for optimistic concurrency
    pub version: u64,

    pub created_at: Option<DateTime<Utc>>,
}

impl Lead {
    pub fn new(id: String, business_name: String) -> Self {
        Self {
            id,
            business_name,
            status: "qualified".to_string(),
            ..Default::default()
        }
    }

    pub fn builder(&self, user_id: &str) -> Option<&ActiveBuilder> {
        self.active_builders.iter().find(|b| b.user_id == user_id)
    }

    pub fn builder_mut(&mut self, user_id: &str) -> Option<&mut ActiveBuilder> {
        self.active_builders.iter_mut().find(|b| b.user_id == user_id)
    }

    /// Builders who completed every milestone, in join order
    pub fn finalists(&self, total_milestones: u32) -> impl Iterator<Item = &ActiveBuilder> {
        self.active_builders
            .iter()
            .filter(move |b| b.is_finalist(total_milestones))
    }

    /// True while the first completion is at most one window old
    pub fn submission_window_open(&self, now: DateTime<Utc>, policy: &SprintPolicy) -> bool {
        self.first_completion_at
            .is_some_and(|first| now - first <= policy.submission_window)
    }

    /// True once a first completion exists and its window has elapsed
    pub fn submission_window_closed(&self, now: DateTime<Utc>, policy: &SprintPolicy) -> bool {
        self.first_completion_at
            .is_some_and(|first| now - first > policy.submission_window)
    }

    pub fn has_winner(&self) -> bool {
        self.winner_user_id.is_some()
    }

    pub fn slots_remaining(&self) -> usize {
        (self.max_slots as usize).saturating_sub(self.active_builders.len())
    }
}

/// Builder directory entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlumniProfile {
    pub id: String,
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,

    #[serde(default)]
    pub specialty: String,

    #[serde(default)]
    pub quality_rating: f64,

    #[serde(default)]
    pub current_build_count: u32,

    /// Lead ids of sprints this builder won
    #[serde(default)]
    pub completed_builds: Vec<String>,
}

/// A finalist's submission surfaced for peer voting
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Build {
    pub id: String,
    pub lead_id: String,
    pub builder_id: String,
    pub builder_name: String,
    pub business_name: String,
    pub deployed_url: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Build {
    /// Build ids are derived from the lead, its sprint round and the builder
    pub fn id_for(lead_id: &str, round: u32, builder_id: &str) -> String {
        format!("{}--{}--{}", lead_id, round, builder_id)
    }
}

/// One peer vote on a build
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vote {
    pub id: String,
    pub build_id: String,
    pub voter_id: String,
    pub score: u8,
    pub created_at: DateTime<Utc>,
}
