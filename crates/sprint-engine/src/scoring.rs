//! Winner selection for the scout-review path
//!
//! Each finalist is scored on pace, quality and scout review. Pace measures
//! how close the builder's inferred completion (join time plus one day per
//! completed checkpoint) sits to the lead's first completion. The highest
//! total wins; on a tie the builder who joined first wins.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use sprint_common::{ActiveBuilder, Error, Lead, LateCompletionPolicy, Result};
use tracing::info;

use crate::engine::SprintEngine;
use crate::view::LeadView;

/// Score breakdown for one finalist
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FinalistScore {
    pub user_id: String,
    pub pace_score: f64,
    pub quality_score: f64,
    pub scout_review_score: f64,
    pub total_score: f64,
}

/// Outcome of winner selection, applied to the lead in one write
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct WinnerDecision {
    pub winner_user_id: String,
    pub average_score: Option<f64>,
    pub scores: Vec<FinalistScore>,
}

impl WinnerDecision {
    pub(crate) fn apply(&self, lead: &mut Lead) {
        lead.winner_user_id = Some(self.winner_user_id.clone());
        lead.winner_average_score = self.average_score;
        lead.status = crate::STATUS_AWARDED.to_string();
        lead.sprint_active = false;
        lead.voting_open = false;
    }
}

/// Result of an explicit winner calculation
#[derive(Debug, Clone, Serialize)]
pub struct WinnerResult {
    pub lead: LeadView,
    pub scores: Vec<FinalistScore>,
}

/// Index of the strictly highest score; the first one wins ties
pub(crate) fn pick_highest<T>(items: &[T], score: impl Fn(&T) -> f64) -> Option<usize> {
    let mut best: Option<(usize, f64)> = None;
    for (index, item) in items.iter().enumerate() {
        let value = score(item);
        if best.map_or(true, |(_, top)| value > top) {
            best = Some((index, value));
        }
    }
    best.map(|(index, _)| index)
}

fn hours_between(a: DateTime<Utc>, b: DateTime<Utc>) -> f64 {
    (a - b).num_seconds() as f64 / 3600.0
}

impl SprintEngine {
    /// Finalists eligible for scoring under the late-completion policy
    pub(crate) fn scoring_pool<'a>(&self, lead: &'a Lead) -> Vec<&'a ActiveBuilder> {
        let total = self.policy.total_milestones;
        let cutoff = lead
            .first_completion_at
            .map(|first| first + self.policy.submission_window);

        lead.finalists(total)
            .filter(|b| match (self.policy.late_completions, cutoff, b.completed_at) {
                (LateCompletionPolicy::Exclude, Some(cutoff), Some(done)) => done <= cutoff,
                _ => true,
            })
            .collect()
    }

    pub(crate) fn score_finalist(&self, builder: &ActiveBuilder, first: DateTime<Utc>) -> FinalistScore {
        let inferred = builder.joined_at + Duration::days(builder.checkpoints_completed as i64);
        let pace = self.policy.pace_score(hours_between(inferred, first));

        let (quality, scout_review) = match &builder.scout_review {
            Some(review) => (
                review.quality_score as f64,
                review.scout_review_score as f64,
            ),
            None => (0.0, 0.0),
        };

        FinalistScore {
            user_id: builder.user_id.clone(),
            pace_score: pace,
            quality_score: quality,
            scout_review_score: scout_review,
            total_score: self.policy.total_score(pace, quality, scout_review),
        }
    }

    /// Check the winner preconditions and score every finalist.
    ///
    /// Pure: the lead is not modified. Both the explicit calculation and the
    /// post-review check go through here.
    pub(crate) fn select_winner(&self, lead: &Lead, now: DateTime<Utc>) -> Result<WinnerDecision> {
        if lead.has_winner() {
            return Err(Error::conflict(format!(
                "Winner already decided for lead {}",
                lead.id
            )));
        }

        let Some(first) = lead.first_completion_at else {
            return Err(Error::precondition(format!(
                "No builder has completed every milestone on lead {}",
                lead.id
            )));
        };
        if !lead.submission_window_closed(now, &self.policy) {
            return Err(Error::precondition(format!(
                "Submission window on lead {} is still open",
                lead.id
            )));
        }

        let finalists = self.scoring_pool(lead);
        if finalists.is_empty() {
            return Err(Error::precondition(format!(
                "Lead {} has no eligible finalists",
                lead.id
            )));
        }

        let unreviewed: Vec<&str> = finalists
            .iter()
            .filter(|b| b.scout_review.is_none())
            .map(|b| b.user_id.as_str())
            .collect();
        if !unreviewed.is_empty() {
            return Err(Error::precondition(format!(
                "Finalists awaiting scout review: {}",
                unreviewed.join(", ")
            )));
        }

        let scores: Vec<FinalistScore> = finalists
            .iter()
            .map(|b| self.score_finalist(b, first))
            .collect();
        let winner = pick_highest(&scores, |s| s.total_score)
            .map(|i| scores[i].user_id.clone())
            .ok_or_else(|| Error::precondition("No finalist could be scored"))?;

        Ok(WinnerDecision {
            winner_user_id: winner,
            average_score: None,
            scores,
        })
    }

    /// Bookkeeping once an award is stored: free every builder and credit
    /// the winner.
    pub(crate) async fn finish_award(&self, lead: &Lead) -> Result<()> {
        let user_ids: Vec<&str> = lead
            .active_builders
            .iter()
            .map(|b| b.user_id.as_str())
            .collect();
        self.release_builders(&lead.id, user_ids).await?;
        if let Some(winner) = &lead.winner_user_id {
            self.store.record_completed_build(winner, &lead.id).await?;
        }
        Ok(())
    }

    /// Select the winner of a sprint via the scout-review path
    pub async fn calculate_winner(&self, lead_id: &str) -> Result<WinnerResult> {
        let _guard = self.locks.lock(lead_id).await;
        let mut lead = self.load(lead_id).await?;
        let now = self.now();

        let decision = self.select_winner(&lead, now)?;
        decision.apply(&mut lead);

        let lead = self.commit(lead).await?;
        self.finish_award(&lead).await?;

        info!(
            "Winner for lead {}: {} ({} finalists scored)",
            lead_id,
            decision.winner_user_id,
            decision.scores.len()
        );

        Ok(WinnerResult {
            lead: self.view(lead).await?,
            scores: decision.scores,
        })
    }
}
