//! Stall detection and nudge dispatch
//!
//! Both run on demand. Detection never mutates a lead; dispatch sends one
//! notification per stalled builder without holding any lead lock and
//! records a nudge only for deliveries that succeeded.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sprint_common::{Lead, Result, SprintPolicy};
use tracing::{info, warn};

use crate::engine::{AuditContext, SprintEngine};
use crate::notifier::LeadSummary;

/// A builder who has gone quiet
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StalledBuilder {
    pub lead_id: String,
    pub business_name: String,
    pub user_id: String,
    pub checkpoints_completed: u32,
    pub last_activity: DateTime<Utc>,
    pub hours_since_update: i64,
    pub sprint_deadline: Option<DateTime<Utc>>,
}

/// Result of one nudge attempt
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NudgeReport {
    pub lead_id: String,
    pub user_id: String,
    pub delivered: bool,
}

/// Find stalled builders across leads.
///
/// Stalled: no checkpoint activity for the stall threshold, not finished,
/// and not nudged within the same threshold. Paused or finished sprints are
/// skipped.
pub fn find_stalled(leads: &[Lead], now: DateTime<Utc>, policy: &SprintPolicy) -> Vec<StalledBuilder> {
    leads
        .iter()
        .filter(|lead| lead.sprint_active && !lead.is_paused && !lead.has_winner())
        .flat_map(|lead| {
            lead.active_builders
                .iter()
                .filter(move |b| {
                    let quiet = now - b.last_activity() >= policy.stall_threshold;
                    let unfinished = b.checkpoints_completed < policy.total_milestones;
                    let recently_nudged = b
                        .last_nudged_at
                        .is_some_and(|at| now - at < policy.stall_threshold);
                    quiet && unfinished && !recently_nudged
                })
                .map(move |b| StalledBuilder {
                    lead_id: lead.id.clone(),
                    business_name: lead.business_name.clone(),
                    user_id: b.user_id.clone(),
                    checkpoints_completed: b.checkpoints_completed,
                    last_activity: b.last_activity(),
                    hours_since_update: (now - b.last_activity()).num_hours(),
                    sprint_deadline: lead.sprint_deadline,
                })
        })
        .collect()
}

impl SprintEngine {
    /// Sweep every lead for stalled builders
    pub async fn detect_stalled(&self) -> Result<Vec<StalledBuilder>> {
        let leads = self.store.list_leads().await?;
        Ok(find_stalled(&leads, self.now(), &self.policy))
    }

    /// Notify every stalled builder and record a nudge for each delivery
    pub async fn dispatch_nudges(&self) -> Result<Vec<NudgeReport>> {
        let stalled = self.detect_stalled().await?;
        let mut reports = Vec::with_capacity(stalled.len());

        for entry in stalled {
            let Some(profile) = self.store.get_alumni(&entry.user_id).await? else {
                warn!("Stalled builder {} has no alumni profile", entry.user_id);
                reports.push(NudgeReport {
                    lead_id: entry.lead_id,
                    user_id: entry.user_id,
                    delivered: false,
                });
                continue;
            };

            let summary = LeadSummary {
                lead_id: entry.lead_id.clone(),
                business_name: entry.business_name.clone(),
                checkpoints_completed: entry.checkpoints_completed,
                total_milestones: self.policy.total_milestones,
                hours_since_update: entry.hours_since_update,
                sprint_deadline: entry.sprint_deadline,
            };

            let delivered = match tokio::time::timeout(
                self.notify_timeout,
                self.notifier.notify(&profile, &summary),
            )
            .await
            {
                Ok(delivered) => delivered,
                Err(_) => {
                    warn!("Nudge to {} timed out", entry.user_id);
                    false
                }
            };

            if delivered {
                let ctx = AuditContext::new(
                    "nudge-dispatcher",
                    Some(format!("No checkpoint activity for {}h", entry.hours_since_update)),
                );
                // The builder may have been evicted while we were sending
                if let Err(e) = self.nudge_builder(&entry.lead_id, &entry.user_id, ctx).await {
                    warn!("Could not record nudge for {}: {}", entry.user_id, e);
                }
            }

            reports.push(NudgeReport {
                lead_id: entry.lead_id,
                user_id: entry.user_id,
                delivered,
            });
        }

        info!(
            "Nudge dispatch finished: {} of {} delivered",
            reports.iter().filter(|r| r.delivered).count(),
            reports.len()
        );
        Ok(reports)
    }
}
