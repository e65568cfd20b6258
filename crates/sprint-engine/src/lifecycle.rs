//! Sprint launch, builder participation and checkpoint flow
//!
//! Checkpoints follow a submit → verify model: a builder submits proof for a
//! milestone, a scout approves or rejects it, and only approval advances
//! `checkpointsCompleted`. With `auto_verify_checkpoints` set, a submission
//! is approved on the spot.

use chrono::{DateTime, Duration, Utc};
use sprint_common::policy::{
    is_allowed_proof_link, ALLOWED_PROOF_HOSTS, FULL_PROJECT, MAX_DURATION_WEEKS,
    MAX_REVIEW_SCORE, MAX_SLOTS, MIN_DURATION_WEEKS, MIN_SLOTS,
};
use sprint_common::{
    ActiveBuilder, CheckpointState, CheckpointStatus, Error, Lead, Result, ScoutReview,
    SprintPolicy,
};
use tracing::{debug, info, warn};

use crate::engine::SprintEngine;
use crate::view::LeadView;

/// Reject operations that need a running, unpaused sprint
pub(crate) fn ensure_accepting_work(lead: &Lead) -> Result<()> {
    if !lead.sprint_active {
        return Err(Error::conflict(format!("No active sprint on lead {}", lead.id)));
    }
    if lead.is_paused {
        return Err(Error::conflict(format!("Sprint on lead {} is paused", lead.id)));
    }
    Ok(())
}

fn validate_milestone(milestone_id: u32, policy: &SprintPolicy) -> Result<()> {
    if milestone_id == 0 || milestone_id > policy.total_milestones {
        return Err(Error::validation(format!(
            "milestoneId must be between 1 and {}",
            policy.total_milestones
        )));
    }
    Ok(())
}

fn builder_index(lead: &Lead, user_id: &str) -> Result<usize> {
    lead.active_builders
        .iter()
        .position(|b| b.user_id == user_id)
        .ok_or_else(|| {
            Error::not_found(format!(
                "Builder {} is not part of the sprint on lead {}",
                user_id, lead.id
            ))
        })
}

/// Approve a milestone for one builder.
///
/// `checkpointsCompleted` only moves forward. The first builder on the lead
/// to finish every milestone stamps `firstCompletionAt`; later finishers
/// leave it untouched.
pub(crate) fn advance_checkpoint(
    lead: &mut Lead,
    index: usize,
    milestone_id: u32,
    now: DateTime<Utc>,
    policy: &SprintPolicy,
) {
    let builder = &mut lead.active_builders[index];
    builder.checkpoints_completed = builder.checkpoints_completed.max(milestone_id);
    builder.last_checkpoint_update = Some(now);

    if builder.is_finalist(policy.total_milestones) && builder.completed_at.is_none() {
        builder.completed_at = Some(now);
        let user_id = builder.user_id.clone();

        if lead.first_completion_at.is_none() {
            lead.first_completion_at = Some(now);
            info!(
                "First completion on lead {} by {}; submission window open",
                lead.id, user_id
            );
        }
    }
}

impl SprintEngine {
    /// Launch a sprint on a lead
    pub async fn launch_sprint(
        &self,
        lead_id: &str,
        max_slots: u8,
        duration_weeks: u8,
    ) -> Result<LeadView> {
        if !(MIN_SLOTS..=MAX_SLOTS).contains(&max_slots) {
            return Err(Error::validation(format!(
                "maxSlots must be between {} and {}",
                MIN_SLOTS, MAX_SLOTS
            )));
        }
        if !(MIN_DURATION_WEEKS..=MAX_DURATION_WEEKS).contains(&duration_weeks) {
            return Err(Error::validation(format!(
                "sprintDuration must be between {} and {} weeks",
                MIN_DURATION_WEEKS, MAX_DURATION_WEEKS
            )));
        }

        let _guard = self.locks.lock(lead_id).await;
        let mut lead = self.load(lead_id).await?;

        if lead.sprint_active {
            return Err(Error::conflict(format!(
                "Sprint already active on lead {}",
                lead_id
            )));
        }
        if lead.has_winner() {
            return Err(Error::conflict(format!(
                "Lead {} has already been awarded",
                lead_id
            )));
        }

        let now = self.now();
        lead.sprint_active = true;
        lead.max_slots = max_slots;
        lead.sprint_duration = duration_weeks;
        lead.sprint_started_at = Some(now);
        lead.sprint_round += 1;
        lead.sprint_deadline = Some(now + Duration::weeks(duration_weeks as i64));
        lead.is_paused = false;
        lead.first_completion_at = None;
        lead.voting_open = false;
        lead.winner_average_score = None;
        lead.active_builders.clear();
        lead.status = crate::STATUS_SPRINT_ACTIVE.to_string();

        let lead = self.commit(lead).await?;
        info!(
            "Launched sprint on lead {} ({} slots, {} weeks)",
            lead_id, max_slots, duration_weeks
        );
        self.view(lead).await
    }

    /// Join a builder to a lead's sprint.
    ///
    /// A builder may be active on at most one lead system-wide. The claim on
    /// the global builder index is taken before the lead write and rolled
    /// back if that write fails.
    pub async fn join_sprint(
        &self,
        lead_id: &str,
        user_id: &str,
        selected_deliverables: Option<Vec<String>>,
    ) -> Result<LeadView> {
        if user_id.trim().is_empty() {
            return Err(Error::validation("userId is required"));
        }
        let deliverables = match selected_deliverables {
            Some(list) if !list.is_empty() => list,
            _ => vec![FULL_PROJECT.to_string()],
        };

        let _join_guard = self.join_lock.lock().await;
        let _guard = self.locks.lock(lead_id).await;
        let mut lead = self.load(lead_id).await?;
        ensure_accepting_work(&lead)?;

        let profile = self.load_alumni(user_id).await?;
        if profile.current_build_count >= self.policy.max_concurrent_builds {
            return Err(Error::CapacityExceeded(format!(
                "Builder {} already has {} concurrent builds (max {})",
                user_id, profile.current_build_count, self.policy.max_concurrent_builds
            )));
        }

        let active_elsewhere = self
            .store
            .active_lead_for(user_id)
            .await?
            .filter(|other| other != lead_id);
        if let Some(other) = active_elsewhere {
            return Err(Error::conflict(format!(
                "Builder {} is already active on lead {}",
                user_id, other
            )));
        }

        if lead.active_builders.len() >= lead.max_slots as usize {
            return Err(Error::CapacityExceeded(format!(
                "All {} sprint slots on lead {} are taken",
                lead.max_slots, lead_id
            )));
        }
        if lead.builder(user_id).is_some() {
            return Err(Error::conflict(format!(
                "Builder {} already joined lead {}",
                user_id, lead_id
            )));
        }

        if !self.store.claim_builder(user_id, lead_id).await? {
            return Err(Error::conflict(format!(
                "Builder {} is already active on another lead",
                user_id
            )));
        }

        let now = self.now();
        lead.active_builders
            .push(ActiveBuilder::new(user_id.to_string(), deliverables, now));

        let lead = match self.commit(lead).await {
            Ok(lead) => lead,
            Err(e) => {
                self.store.release_builder(user_id, lead_id).await?;
                return Err(e);
            }
        };
        // The join is already stored; a stale counter is only logged
        if let Err(e) = self.store.adjust_build_count(user_id, 1).await {
            warn!(
                "Builder {} joined lead {} but the build count was not updated: {:#}",
                user_id, lead_id, e
            );
        }

        info!(
            "Builder {} joined lead {} ({}/{} slots)",
            user_id,
            lead_id,
            lead.active_builders.len(),
            lead.max_slots
        );
        self.view(lead).await
    }

    /// Submit proof for a milestone.
    ///
    /// Safe to retry: the proof link is stored once no matter how often it
    /// is submitted, and resending the proof of an already verified
    /// milestone returns the lead unchanged.
    pub async fn submit_checkpoint(
        &self,
        lead_id: &str,
        user_id: &str,
        milestone_id: u32,
        proof_link: &str,
    ) -> Result<LeadView> {
        validate_milestone(milestone_id, &self.policy)?;
        let proof_link = proof_link.trim();
        if !is_allowed_proof_link(proof_link) {
            return Err(Error::validation(format!(
                "proofLink must be an https URL on one of: {}",
                ALLOWED_PROOF_HOSTS.join(", ")
            )));
        }

        let _guard = self.locks.lock(lead_id).await;
        let mut lead = self.load(lead_id).await?;
        ensure_accepting_work(&lead)?;
        let index = builder_index(&lead, user_id)?;
        let now = self.now();

        let verified_proof = lead.active_builders[index]
            .checkpoint_statuses
            .get(&milestone_id)
            .filter(|s| s.status == CheckpointState::Verified)
            .map(|s| s.proof_link.as_deref() == Some(proof_link));
        if let Some(same_proof) = verified_proof {
            if same_proof {
                debug!(
                    "Milestone {} for builder {} on lead {} already verified with this proof",
                    milestone_id, user_id, lead_id
                );
                return self.view(lead).await;
            }
            return Err(Error::conflict(format!(
                "Milestone {} for builder {} is already verified",
                milestone_id, user_id
            )));
        }

        let builder = &mut lead.active_builders[index];
        builder.checkpoint_statuses.insert(
            milestone_id,
            CheckpointStatus {
                status: CheckpointState::Submitted,
                proof_link: Some(proof_link.to_string()),
                submitted_at: Some(now),
                reviewed_at: None,
                notes: None,
            },
        );
        if !builder.proof_links.iter().any(|l| l == proof_link) {
            builder.proof_links.push(proof_link.to_string());
        }
        builder.last_checkpoint_update = Some(now);

        if self.policy.auto_verify_checkpoints {
            if let Some(status) = builder.checkpoint_statuses.get_mut(&milestone_id) {
                status.status = CheckpointState::Verified;
                status.reviewed_at = Some(now);
            }
            advance_checkpoint(&mut lead, index, milestone_id, now, &self.policy);
        }

        if lead.submission_window_closed(now, &self.policy) {
            debug!(
                "Checkpoint {} from {} on lead {} arrived after the submission window",
                milestone_id, user_id, lead_id
            );
        }

        let lead = self.commit(lead).await?;
        info!(
            "Checkpoint {} submitted by {} on lead {}",
            milestone_id, user_id, lead_id
        );
        self.view(lead).await
    }

    /// Scout verification of a submitted milestone.
    ///
    /// Re-approving an already verified milestone is a no-op.
    pub async fn verify_checkpoint(
        &self,
        lead_id: &str,
        user_id: &str,
        milestone_id: u32,
        approved: bool,
        notes: Option<String>,
    ) -> Result<LeadView> {
        validate_milestone(milestone_id, &self.policy)?;

        let _guard = self.locks.lock(lead_id).await;
        let mut lead = self.load(lead_id).await?;
        if lead.has_winner() {
            return Err(Error::conflict(format!(
                "Lead {} has already been awarded",
                lead_id
            )));
        }
        let index = builder_index(&lead, user_id)?;
        let now = self.now();

        let current = lead.active_builders[index]
            .checkpoint_statuses
            .get(&milestone_id)
            .map(|s| s.status);
        match current {
            Some(CheckpointState::Submitted) => {}
            Some(CheckpointState::Verified) if approved => return self.view(lead).await,
            _ => {
                return Err(Error::precondition(format!(
                    "Milestone {} for builder {} has no pending submission",
                    milestone_id, user_id
                )))
            }
        }

        if let Some(status) = lead.active_builders[index]
            .checkpoint_statuses
            .get_mut(&milestone_id)
        {
            status.status = if approved {
                CheckpointState::Verified
            } else {
                CheckpointState::Rejected
            };
            status.reviewed_at = Some(now);
            status.notes = notes;
        }

        if approved {
            advance_checkpoint(&mut lead, index, milestone_id, now, &self.policy);
        }

        let lead = self.commit(lead).await?;
        if approved {
            info!("Milestone {} verified for {} on lead {}", milestone_id, user_id, lead_id);
        } else {
            warn!("Milestone {} rejected for {} on lead {}", milestone_id, user_id, lead_id);
        }
        self.view(lead).await
    }

    /// Store a scout review for a builder.
    ///
    /// After the review is recorded the winner post-condition is checked: if
    /// every finalist is now reviewed, the submission window has closed and
    /// no winner exists, the winner is selected in the same write.
    pub async fn submit_scout_review(
        &self,
        lead_id: &str,
        user_id: &str,
        quality_score: u32,
        scout_review_score: Option<u32>,
        review_notes: Option<String>,
    ) -> Result<LeadView> {
        let max = MAX_REVIEW_SCORE as u32;
        if quality_score > max {
            return Err(Error::validation(format!("qualityScore must be between 0 and {}", max)));
        }
        if scout_review_score.is_some_and(|s| s > max) {
            return Err(Error::validation(format!(
                "scoutReviewScore must be between 0 and {}",
                max
            )));
        }
        let quality = quality_score as u8;
        let secondary = scout_review_score.map(|s| s as u8).unwrap_or(quality);

        let _guard = self.locks.lock(lead_id).await;
        let mut lead = self.load(lead_id).await?;
        let index = builder_index(&lead, user_id)?;
        let now = self.now();

        lead.active_builders[index].scout_review = Some(ScoutReview {
            quality_score: quality,
            scout_review_score: secondary,
            review_notes,
            reviewed_at: now,
        });
        info!(
            "Scout review stored for {} on lead {} (quality {}, review {})",
            user_id, lead_id, quality, secondary
        );

        let awarded = if lead.has_winner() {
            None
        } else {
            self.select_winner(&lead, now).ok()
        };
        if let Some(decision) = &awarded {
            decision.apply(&mut lead);
        }

        let lead = self.commit(lead).await?;
        if let Some(decision) = awarded {
            info!(
                "All finalists reviewed on lead {}; winner {} selected automatically",
                lead_id, decision.winner_user_id
            );
            self.finish_award(&lead).await?;
        }
        self.view(lead).await
    }
}
