//! Scout interventions on a running sprint
//!
//! Every intervention appends one audit entry to the lead. Entries are never
//! edited or removed.

use chrono::Duration;
use sprint_common::policy::MAX_EXTENSION_DAYS;
use sprint_common::{AuditAction, Error, Lead, Result};
use tracing::{info, warn};

use crate::engine::{AuditContext, SprintEngine};
use crate::view::LeadView;

fn ensure_active(lead: &Lead) -> Result<()> {
    if !lead.sprint_active {
        return Err(Error::conflict(format!("No active sprint on lead {}", lead.id)));
    }
    Ok(())
}

fn ensure_builder(lead: &Lead, user_id: &str) -> Result<()> {
    if lead.builder(user_id).is_none() {
        return Err(Error::not_found(format!(
            "Builder {} is not part of the sprint on lead {}",
            user_id, lead.id
        )));
    }
    Ok(())
}

impl SprintEngine {
    pub async fn pause_sprint(&self, lead_id: &str, ctx: AuditContext) -> Result<LeadView> {
        self.set_paused(lead_id, true, ctx).await
    }

    pub async fn resume_sprint(&self, lead_id: &str, ctx: AuditContext) -> Result<LeadView> {
        self.set_paused(lead_id, false, ctx).await
    }

    /// Pausing only flips the flag; deadlines and windows keep running.
    async fn set_paused(&self, lead_id: &str, paused: bool, ctx: AuditContext) -> Result<LeadView> {
        let _guard = self.locks.lock(lead_id).await;
        let mut lead = self.load(lead_id).await?;
        ensure_active(&lead)?;

        if lead.is_paused == paused {
            return Err(Error::conflict(format!(
                "Sprint on lead {} is already {}",
                lead_id,
                if paused { "paused" } else { "running" }
            )));
        }

        let now = self.now();
        lead.is_paused = paused;
        let (action, details) = if paused {
            (AuditAction::Pause, "Sprint paused".to_string())
        } else {
            (AuditAction::Resume, "Sprint resumed".to_string())
        };
        lead.audit_log.push(ctx.entry(action, details, None, now));

        let lead = self.commit(lead).await?;
        info!("Sprint on lead {} paused={} by {}", lead_id, paused, ctx.actor);
        self.view(lead).await
    }

    /// Push the sprint deadline back by `days`
    pub async fn extend_deadline(&self, lead_id: &str, days: u32, ctx: AuditContext) -> Result<LeadView> {
        if days == 0 || days > MAX_EXTENSION_DAYS {
            return Err(Error::validation(format!(
                "days must be between 1 and {}",
                MAX_EXTENSION_DAYS
            )));
        }

        let _guard = self.locks.lock(lead_id).await;
        let mut lead = self.load(lead_id).await?;
        ensure_active(&lead)?;

        let now = self.now();
        let current = lead.sprint_deadline.unwrap_or_else(|| {
            lead.sprint_started_at.unwrap_or(now) + Duration::weeks(lead.sprint_duration as i64)
        });
        let extended = current + Duration::days(days as i64);
        lead.sprint_deadline = Some(extended);

        let details = format!(
            "Deadline extended by {} days to {}",
            days,
            extended.format("%Y-%m-%d %H:%M UTC")
        );
        lead.audit_log
            .push(ctx.entry(AuditAction::ExtendDeadline, details, None, now));

        let lead = self.commit(lead).await?;
        info!("Extended deadline on lead {} by {} days", lead_id, days);
        self.view(lead).await
    }

    /// Remove one builder from the sprint, freeing their slot
    pub async fn evict_builder(&self, lead_id: &str, user_id: &str, ctx: AuditContext) -> Result<LeadView> {
        let _guard = self.locks.lock(lead_id).await;
        let mut lead = self.load(lead_id).await?;
        ensure_active(&lead)?;
        ensure_builder(&lead, user_id)?;

        let now = self.now();
        lead.active_builders.retain(|b| b.user_id != user_id);
        lead.audit_log.push(ctx.entry(
            AuditAction::EvictBuilder,
            format!("Builder {} evicted from sprint", user_id),
            Some(user_id),
            now,
        ));

        let lead = self.commit(lead).await?;
        self.release_builders(lead_id, [user_id]).await?;

        warn!("Builder {} evicted from lead {} by {}", user_id, lead_id, ctx.actor);
        self.view(lead).await
    }

    /// End the sprint without a winner
    pub async fn terminate_sprint(&self, lead_id: &str, ctx: AuditContext) -> Result<LeadView> {
        let _guard = self.locks.lock(lead_id).await;
        let mut lead = self.load(lead_id).await?;
        ensure_active(&lead)?;

        let now = self.now();
        let removed: Vec<String> = lead
            .active_builders
            .drain(..)
            .map(|b| b.user_id)
            .collect();
        lead.sprint_active = false;
        lead.is_paused = false;
        lead.voting_open = false;
        lead.winner_user_id = None;
        lead.status = crate::STATUS_TERMINATED.to_string();
        lead.audit_log.push(ctx.entry(
            AuditAction::TerminateSprint,
            format!("Sprint terminated; {} builders removed", removed.len()),
            None,
            now,
        ));

        let lead = self.commit(lead).await?;
        self.release_builders(lead_id, removed.iter().map(String::as_str))
            .await?;

        warn!("Sprint on lead {} terminated by {}", lead_id, ctx.actor);
        self.view(lead).await
    }

    /// Record that an out-of-band reminder was sent to a builder
    pub async fn nudge_builder(&self, lead_id: &str, user_id: &str, ctx: AuditContext) -> Result<LeadView> {
        let _guard = self.locks.lock(lead_id).await;
        let mut lead = self.load(lead_id).await?;
        ensure_active(&lead)?;
        ensure_builder(&lead, user_id)?;

        let now = self.now();
        if let Some(builder) = lead.builder_mut(user_id) {
            builder.last_nudged_at = Some(now);
        }
        lead.audit_log.push(ctx.entry(
            AuditAction::NudgeBuilder,
            format!("Nudge sent to {}", user_id),
            Some(user_id),
            now,
        ));

        let lead = self.commit(lead).await?;
        info!("Builder {} nudged on lead {}", user_id, lead_id);
        self.view(lead).await
    }

    /// Open a warning window after which the builder should be evicted if
    /// nothing is submitted. Eviction itself stays a scout decision.
    pub async fn flag_builder(&self, lead_id: &str, user_id: &str, ctx: AuditContext) -> Result<LeadView> {
        let _guard = self.locks.lock(lead_id).await;
        let mut lead = self.load(lead_id).await?;
        ensure_active(&lead)?;
        ensure_builder(&lead, user_id)?;

        let now = self.now();
        let expires = now + self.policy.flag_window;
        if let Some(builder) = lead.builder_mut(user_id) {
            builder.flagged_at = Some(now);
            builder.flagged_expires_at = Some(expires);
        }
        lead.audit_log.push(ctx.entry(
            AuditAction::FlagBuilder,
            format!(
                "Builder {} flagged; submit by {} or face eviction",
                user_id,
                expires.format("%Y-%m-%d %H:%M UTC")
            ),
            Some(user_id),
            now,
        ));

        let lead = self.commit(lead).await?;
        warn!("Builder {} flagged on lead {}", user_id, lead_id);
        self.view(lead).await
    }
}
