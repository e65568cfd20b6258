//! Sprint timing and scoring policy
//!
//! The constants below mirror the published Rules of Engagement. They are
//! collected in [`SprintPolicy`] so deployments can tune them without
//! touching the state machine.

use chrono::Duration;
use serde::{Deserialize, Serialize};

pub const TOTAL_MILESTONES: u32 = 4;
pub const SUBMISSION_WINDOW_HOURS: i64 = 48;
pub const STALL_THRESHOLD_HOURS: i64 = 72;
pub const FLAG_WINDOW_HOURS: i64 = 5;
pub const MAX_CONCURRENT_BUILDS: u32 = 3;
pub const MIN_VOTES_TO_CLOSE: usize = 10;

pub const PACE_FLOOR: f64 = 4.0;
pub const PACE_DECAY_PER_HOUR: f64 = 2.0;
pub const PACE_WEIGHT: f64 = 0.30;
pub const QUALITY_WEIGHT: f64 = 0.50;
pub const SCOUT_REVIEW_WEIGHT: f64 = 0.20;

pub const MIN_SLOTS: u8 = 1;
pub const MAX_SLOTS: u8 = 4;
pub const MIN_DURATION_WEEKS: u8 = 2;
pub const MAX_DURATION_WEEKS: u8 = 4;
pub const MIN_VOTE_SCORE: u8 = 1;
pub const MAX_VOTE_SCORE: u8 = 5;
pub const MAX_REVIEW_SCORE: u8 = 100;
pub const MAX_EXTENSION_DAYS: u32 = 28;

/// Deliverable recorded when a builder commits to the whole project
pub const FULL_PROJECT: &str = "full_project";

/// Hosts accepted for checkpoint proof links (exact host or any subdomain)
pub const ALLOWED_PROOF_HOSTS: [&str; 2] = ["github.com", "vercel.app"];

/// What to do with builders who complete after the submission window closed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LateCompletionPolicy {
    /// Late finalists compete; the pace score already penalises them
    #[default]
    Include,
    /// Late finalists are dropped from the finalist pool at scoring time
    Exclude,
}

/// Tunable sprint policy
#[derive(Debug, Clone)]
pub struct SprintPolicy {
    pub total_milestones: u32,
    pub submission_window: Duration,
    pub stall_threshold: Duration,
    pub flag_window: Duration,
    pub max_concurrent_builds: u32,
    pub min_votes_to_close: usize,
    pub pace_floor: f64,
    pub pace_decay_per_hour: f64,
    pub pace_weight: f64,
    pub quality_weight: f64,
    pub scout_review_weight: f64,
    /// Treat a checkpoint submission as verified immediately
    pub auto_verify_checkpoints: bool,
    pub late_completions: LateCompletionPolicy,
}

impl Default for SprintPolicy {
    fn default() -> Self {
        Self {
            total_milestones: TOTAL_MILESTONES,
            submission_window: Duration::hours(SUBMISSION_WINDOW_HOURS),
            stall_threshold: Duration::hours(STALL_THRESHOLD_HOURS),
            flag_window: Duration::hours(FLAG_WINDOW_HOURS),
            max_concurrent_builds: MAX_CONCURRENT_BUILDS,
            min_votes_to_close: MIN_VOTES_TO_CLOSE,
            pace_floor: PACE_FLOOR,
            pace_decay_per_hour: PACE_DECAY_PER_HOUR,
            pace_weight: PACE_WEIGHT,
            quality_weight: QUALITY_WEIGHT,
            scout_review_weight: SCOUT_REVIEW_WEIGHT,
            auto_verify_checkpoints: false,
            late_completions: LateCompletionPolicy::Include,
        }
    }
}

impl SprintPolicy {
    /// Pace score from the gap (in hours) to the first completion
    pub fn pace_score(&self, hours_difference: f64) -> f64 {
        (100.0 - self.pace_decay_per_hour * hours_difference.abs()).max(self.pace_floor)
    }

    /// Weighted total of the three score components
    pub fn total_score(&self, pace: f64, quality: f64, scout_review: f64) -> f64 {
        pace * self.pace_weight + quality * self.quality_weight + scout_review * self.scout_review_weight
    }
}

/// Check a proof link against the host allow-list.
pub fn is_allowed_proof_link(link: &str) -> bool {
    let Some(rest) = link.strip_prefix("https://") else {
        return false;
    };
    if link.chars().any(char::is_whitespace) {
        return false;
    }

    let host = rest.split(['/', '?', '#']).next().unwrap_or_default();
    if host.is_empty() || host.contains('@') || host.contains(':') {
        return false;
    }

    let host = host.to_ascii_lowercase();
    ALLOWED_PROOF_HOSTS.iter().any(|allowed| {
        host == *allowed
            || host
                .strip_suffix(allowed)
                .is_some_and(|prefix| prefix.ends_with('.') && prefix.len() > 1)
    })
}
