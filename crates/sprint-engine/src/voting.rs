//! Peer-voting winner path
//!
//! Once at least two builders have finished every milestone, a lead can be
//! put to a peer vote. Each finalist gets an immutable [`Build`]; voters
//! score builds 1-5, one vote per voter per build with no revisions. Closing
//! needs a minimum number of votes across the lead and awards the build with
//! the best mean score.
//!
//! Only builds of the current sprint round whose builder is still a finalist
//! take part. Builds of evicted builders or of an earlier sprint stay stored
//! but are neither votable nor counted.

use serde::Serialize;
use sprint_common::policy::{MAX_VOTE_SCORE, MIN_VOTE_SCORE};
use sprint_common::{Build, Error, Lead, Result, Vote};
use tracing::info;

use crate::engine::SprintEngine;
use crate::scoring::{pick_highest, WinnerDecision};
use crate::view::LeadView;

/// Vote tally for one build, computed on read
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BuildTally {
    #[serde(flatten)]
    pub build: Build,

    pub vote_count: usize,

    /// Mean score rounded to two decimals; 0 when there are no votes
    pub average_score: f64,

    #[serde(skip)]
    raw_average: f64,

    /// Present only when the read was made on behalf of a voter
    #[serde(rename = "hasVoted", skip_serializing_if = "Option::is_none")]
    pub has_voted: Option<bool>,
}

/// Voting state of one lead
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VotingState {
    pub lead_id: String,
    pub business_name: String,
    pub voting_open: bool,
    pub winner_user_id: Option<String>,
    pub winner_average_score: Option<f64>,
    pub total_votes: usize,
    pub builds: Vec<BuildTally>,
}

/// Result of closing a vote
#[derive(Debug, Clone, Serialize)]
pub struct VotingOutcome {
    pub lead: LeadView,
    pub voting: VotingState,
}

pub(crate) fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

fn mean_score(votes: &[Vote]) -> Option<f64> {
    if votes.is_empty() {
        return None;
    }
    let sum: u32 = votes.iter().map(|v| v.score as u32).sum();
    Some(sum as f64 / votes.len() as f64)
}

/// True when the build belongs to the lead's current round and its builder
/// is still a finalist there
fn in_running(lead: &Lead, build: &Build, total_milestones: u32) -> bool {
    build.id == Build::id_for(&lead.id, lead.sprint_round, &build.builder_id)
        && lead
            .builder(&build.builder_id)
            .is_some_and(|b| b.is_finalist(total_milestones))
}

impl SprintEngine {
    /// Open peer voting on a lead.
    ///
    /// Idempotent: calling again while voting is open only materializes
    /// builds for finalists that appeared since.
    pub async fn open_voting(&self, lead_id: &str) -> Result<VotingState> {
        let _guard = self.locks.lock(lead_id).await;
        let lead = self.load(lead_id).await?;

        if lead.has_winner() {
            return Err(Error::conflict(format!(
                "Winner already decided for lead {}",
                lead_id
            )));
        }

        let finalists: Vec<_> = lead.finalists(self.policy.total_milestones).collect();
        if finalists.len() < 2 {
            return Err(Error::precondition(format!(
                "Voting needs at least 2 finalists; lead {} has {}",
                lead_id,
                finalists.len()
            )));
        }

        let now = self.now();
        for finalist in finalists {
            let builder_name = self
                .store
                .get_alumni(&finalist.user_id)
                .await?
                .map(|p| p.name)
                .unwrap_or_else(|| finalist.user_id.clone());

            let build = Build {
                id: Build::id_for(&lead.id, lead.sprint_round, &finalist.user_id),
                lead_id: lead.id.clone(),
                builder_id: finalist.user_id.clone(),
                builder_name,
                business_name: lead.business_name.clone(),
                deployed_url: finalist.latest_proof_link().map(str::to_string),
                created_at: now,
            };
            if self.store.put_build(&build).await? {
                info!("Build {} entered voting on lead {}", build.id, lead_id);
            }
        }

        let lead = if lead.voting_open {
            lead
        } else {
            let mut lead = lead;
            lead.voting_open = true;
            let lead = self.commit(lead).await?;
            info!("Voting opened on lead {}", lead_id);
            lead
        };

        self.tally(&lead, None).await
    }

    /// Cast one vote. First vote is final.
    pub async fn cast_vote(&self, build_id: &str, voter_id: &str, score: u32) -> Result<Vote> {
        if !(MIN_VOTE_SCORE as u32..=MAX_VOTE_SCORE as u32).contains(&score) {
            return Err(Error::validation(format!(
                "score must be between {} and {}",
                MIN_VOTE_SCORE, MAX_VOTE_SCORE
            )));
        }
        if voter_id.trim().is_empty() {
            return Err(Error::validation("voter_id is required"));
        }

        let build = self
            .store
            .get_build(build_id)
            .await?
            .ok_or_else(|| Error::not_found(format!("Build not found: {}", build_id)))?;

        // Held so a vote cannot land while the same lead is being closed
        let _guard = self.locks.lock(&build.lead_id).await;
        let lead = self.load(&build.lead_id).await?;

        if lead.has_winner() {
            return Err(Error::conflict(format!(
                "Winner already decided for lead {}",
                lead.id
            )));
        }
        if !lead.voting_open {
            return Err(Error::precondition(format!(
                "Voting is not open for lead {}",
                lead.id
            )));
        }
        if !in_running(&lead, &build, self.policy.total_milestones) {
            return Err(Error::conflict(format!(
                "Build {} is no longer in the running on lead {}",
                build.id, lead.id
            )));
        }

        let vote = Vote {
            id: uuid::Uuid::new_v4().to_string(),
            build_id: build.id.clone(),
            voter_id: voter_id.to_string(),
            score: score as u8,
            created_at: self.now(),
        };
        if !self.store.insert_vote(&vote).await? {
            return Err(Error::conflict(format!(
                "Voter {} already voted on build {}",
                voter_id, build_id
            )));
        }

        info!("Vote recorded on build {} (score {})", build_id, score);
        Ok(vote)
    }

    /// Close voting and award the build with the best mean score
    pub async fn close_voting(&self, lead_id: &str) -> Result<VotingOutcome> {
        let _guard = self.locks.lock(lead_id).await;
        let mut lead = self.load(lead_id).await?;

        if lead.has_winner() {
            return Err(Error::conflict(format!(
                "Winner already decided for lead {}",
                lead_id
            )));
        }
        if !lead.voting_open {
            return Err(Error::precondition(format!(
                "Voting is not open for lead {}",
                lead_id
            )));
        }

        let state = self.tally(&lead, None).await?;
        if state.total_votes < self.policy.min_votes_to_close {
            return Err(Error::precondition(format!(
                "Voting on lead {} has {} votes; {} needed to close",
                lead_id, state.total_votes, self.policy.min_votes_to_close
            )));
        }

        let voted: Vec<&BuildTally> = state.builds.iter().filter(|t| t.vote_count > 0).collect();
        let winner = pick_highest(&voted, |t| t.raw_average)
            .map(|i| voted[i])
            .ok_or_else(|| Error::precondition("No build received votes"))?;

        let decision = WinnerDecision {
            winner_user_id: winner.build.builder_id.clone(),
            average_score: Some(round2(winner.raw_average)),
            scores: Vec::new(),
        };
        decision.apply(&mut lead);

        let lead = self.commit(lead).await?;
        self.finish_award(&lead).await?;

        info!(
            "Voting closed on lead {}; winner {} with average {:?}",
            lead_id, decision.winner_user_id, decision.average_score
        );

        let voting = self.tally(&lead, None).await?;
        Ok(VotingOutcome {
            lead: self.view(lead).await?,
            voting,
        })
    }

    /// Current voting state of a lead
    pub async fn voting_state(&self, lead_id: &str, voter_id: Option<&str>) -> Result<VotingState> {
        let lead = self.load(lead_id).await?;
        self.tally(&lead, voter_id).await
    }

    /// Voting state of every lead with voting open
    pub async fn open_voting_states(&self, voter_id: Option<&str>) -> Result<Vec<VotingState>> {
        let leads = self.store.list_leads().await?;
        let mut states = Vec::new();
        for lead in leads.iter().filter(|l| l.voting_open) {
            states.push(self.tally(lead, voter_id).await?);
        }
        Ok(states)
    }

    /// Count votes per eligible build without touching stored records
    async fn tally(&self, lead: &Lead, voter_id: Option<&str>) -> Result<VotingState> {
        let builds = self.store.builds_for_lead(&lead.id).await?;

        let mut tallies = Vec::with_capacity(builds.len());
        let mut total_votes = 0;
        for build in builds
            .into_iter()
            .filter(|b| in_running(lead, b, self.policy.total_milestones))
        {
            let votes = self.store.votes_for_build(&build.id).await?;
            total_votes += votes.len();
            let raw_average = mean_score(&votes).unwrap_or(0.0);
            tallies.push(BuildTally {
                vote_count: votes.len(),
                average_score: round2(raw_average),
                raw_average,
                has_voted: voter_id.map(|voter| votes.iter().any(|v| v.voter_id == voter)),
                build,
            });
        }

        Ok(VotingState {
            lead_id: lead.id.clone(),
            business_name: lead.business_name.clone(),
            voting_open: lead.voting_open,
            winner_user_id: lead.winner_user_id.clone(),
            winner_average_score: lead.winner_average_score,
            total_votes,
            builds: tallies,
        })
    }
}
