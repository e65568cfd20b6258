//! Integration tests for the sprint engine
//!
//! Every test runs against the in-memory store with a manually driven clock.

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use sprint_common::{
    AlumniProfile, AuditAction, Build, CheckpointState, Error, LateCompletionPolicy, Lead,
    SprintPolicy,
};
use sprint_engine::store::{AlumniStore, LeadStore, VoteStore};
use sprint_engine::{
    AuditContext, Clock, LeadSummary, ManualClock, MemoryStore, Notifier, SprintEngine,
    SprintPhase,
};
use std::sync::{Arc, Mutex};

const GITHUB: &str = "https://github.com/builder/project";

fn start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 6, 2, 9, 0, 0).unwrap()
}

struct Harness {
    engine: SprintEngine,
    store: Arc<MemoryStore>,
    clock: Arc<ManualClock>,
}

fn harness_with(policy: SprintPolicy) -> Harness {
    let store = Arc::new(MemoryStore::new());
    let clock = Arc::new(ManualClock::new(start()));
    let engine = SprintEngine::new(store.clone())
        .with_clock(clock.clone())
        .with_policy(policy);
    Harness {
        engine,
        store,
        clock,
    }
}

fn harness() -> Harness {
    harness_with(SprintPolicy::default())
}

fn auto_verify() -> SprintPolicy {
    SprintPolicy {
        auto_verify_checkpoints: true,
        ..SprintPolicy::default()
    }
}

fn profile(id: &str) -> AlumniProfile {
    AlumniProfile {
        id: id.to_string(),
        name: format!("Builder {}", id),
        email: Some(format!("{}@example.com", id)),
        specialty: "web".to_string(),
        quality_rating: 4.0,
        current_build_count: 0,
        completed_builds: vec![],
    }
}

impl Harness {
    async fn alumni(&self, ids: &[&str]) {
        for id in ids {
            self.engine.register_alumni(profile(id)).await.unwrap();
        }
    }

    async fn lead_with_sprint(&self, id: &str, slots: u8) {
        self.engine
            .create_lead(Lead::new(id.to_string(), format!("Business {}", id)))
            .await
            .unwrap();
        self.engine.launch_sprint(id, slots, 2).await.unwrap();
    }

    /// Submit and verify milestones 1 through `upto`
    async fn complete(&self, lead_id: &str, user_id: &str, upto: u32) {
        for milestone in 1..=upto {
            self.engine
                .submit_checkpoint(lead_id, user_id, milestone, GITHUB)
                .await
                .unwrap();
            if !self.engine.policy().auto_verify_checkpoints {
                self.engine
                    .verify_checkpoint(lead_id, user_id, milestone, true, None)
                    .await
                    .unwrap();
            }
        }
    }

    async fn build_count(&self, id: &str) -> u32 {
        self.engine.get_alumni(id).await.unwrap().current_build_count
    }
}

#[tokio::test]
async fn test_join_respects_slots() {
    let h = harness();
    h.alumni(&["a", "b", "c"]).await;
    h.lead_with_sprint("lead-1", 2).await;

    let view = h.engine.join_sprint("lead-1", "a", None).await.unwrap();
    assert_eq!(view.lead.active_builders.len(), 1);
    assert_eq!(view.lead.active_builders[0].selected_deliverables, vec!["full_project"]);

    let view = h
        .engine
        .join_sprint("lead-1", "b", Some(vec!["landing_page".into()]))
        .await
        .unwrap();
    assert_eq!(view.lead.active_builders.len(), 2);
    assert_eq!(view.sprint_phase, SprintPhase::Full);

    let err = h.engine.join_sprint("lead-1", "c", None).await.unwrap_err();
    assert!(matches!(err, Error::CapacityExceeded(_)));

    assert_eq!(h.build_count("a").await, 1);
    assert_eq!(h.build_count("c").await, 0);
}

#[tokio::test]
async fn test_join_errors() {
    let h = harness();
    h.alumni(&["a"]).await;
    h.lead_with_sprint("lead-1", 3).await;
    h.lead_with_sprint("lead-2", 3).await;

    let err = h.engine.join_sprint("missing", "a", None).await.unwrap_err();
    assert!(matches!(err, Error::NotFound(_)));

    let err = h.engine.join_sprint("lead-1", "ghost", None).await.unwrap_err();
    assert!(matches!(err, Error::NotFound(_)));

    h.engine.join_sprint("lead-1", "a", None).await.unwrap();

    let err = h.engine.join_sprint("lead-1", "a", None).await.unwrap_err();
    assert!(matches!(err, Error::ConflictingState(_)));

    let err = h.engine.join_sprint("lead-2", "a", None).await.unwrap_err();
    assert!(matches!(err, Error::ConflictingState(_)));
}

#[tokio::test]
async fn test_join_rejects_builder_at_capacity() {
    let h = harness();
    h.alumni(&["busy"]).await;
    h.store.adjust_build_count("busy", 3).await.unwrap();
    h.lead_with_sprint("lead-1", 2).await;

    let err = h.engine.join_sprint("lead-1", "busy", None).await.unwrap_err();
    assert!(matches!(err, Error::CapacityExceeded(_)));
}

/// Memory store whose build counter always fails
struct CounterDownStore(MemoryStore);

#[async_trait]
impl LeadStore for CounterDownStore {
    async fn get_lead(&self, lead_id: &str) -> anyhow::Result<Option<Lead>> {
        self.0.get_lead(lead_id).await
    }
    async fn list_leads(&self) -> anyhow::Result<Vec<Lead>> {
        self.0.list_leads().await
    }
    async fn insert_lead(&self, lead: &Lead) -> anyhow::Result<bool> {
        self.0.insert_lead(lead).await
    }
    async fn put_lead(&self, lead: &Lead, expected_version: u64) -> anyhow::Result<bool> {
        self.0.put_lead(lead, expected_version).await
    }
    async fn claim_builder(&self, user_id: &str, lead_id: &str) -> anyhow::Result<bool> {
        self.0.claim_builder(user_id, lead_id).await
    }
    async fn release_builder(&self, user_id: &str, lead_id: &str) -> anyhow::Result<()> {
        self.0.release_builder(user_id, lead_id).await
    }
    async fn active_lead_for(&self, user_id: &str) -> anyhow::Result<Option<String>> {
        self.0.active_lead_for(user_id).await
    }
}

#[async_trait]
impl AlumniStore for CounterDownStore {
    async fn get_alumni(&self, alumni_id: &str) -> anyhow::Result<Option<AlumniProfile>> {
        self.0.get_alumni(alumni_id).await
    }
    async fn list_alumni(&self, specialty: Option<&str>) -> anyhow::Result<Vec<AlumniProfile>> {
        self.0.list_alumni(specialty).await
    }
    async fn upsert_alumni(&self, profile: &AlumniProfile) -> anyhow::Result<()> {
        self.0.upsert_alumni(profile).await
    }
    async fn adjust_build_count(&self, alumni_id: &str, _delta: i64) -> anyhow::Result<()> {
        Err(anyhow::anyhow!("counter unavailable for {}", alumni_id))
    }
    async fn record_completed_build(&self, alumni_id: &str, lead_id: &str) -> anyhow::Result<()> {
        self.0.record_completed_build(alumni_id, lead_id).await
    }
}

#[async_trait]
impl VoteStore for CounterDownStore {
    async fn put_build(&self, build: &Build) -> anyhow::Result<bool> {
        self.0.put_build(build).await
    }
    async fn get_build(&self, build_id: &str) -> anyhow::Result<Option<Build>> {
        self.0.get_build(build_id).await
    }
    async fn builds_for_lead(&self, lead_id: &str) -> anyhow::Result<Vec<Build>> {
        self.0.builds_for_lead(lead_id).await
    }
    async fn insert_vote(&self, vote: &sprint_common::Vote) -> anyhow::Result<bool> {
        self.0.insert_vote(vote).await
    }
    async fn votes_for_build(&self, build_id: &str) -> anyhow::Result<Vec<sprint_common::Vote>> {
        self.0.votes_for_build(build_id).await
    }
}

#[tokio::test]
async fn test_join_survives_build_count_failure() {
    let engine = SprintEngine::new(Arc::new(CounterDownStore(MemoryStore::new())))
        .with_clock(Arc::new(ManualClock::new(start())));
    engine.register_alumni(profile("a")).await.unwrap();
    engine
        .create_lead(Lead::new("lead-1".into(), "Bakery".into()))
        .await
        .unwrap();
    engine.launch_sprint("lead-1", 2, 2).await.unwrap();

    let view = engine.join_sprint("lead-1", "a", None).await.unwrap();
    assert!(view.lead.builder("a").is_some());

    let stored = engine.get_lead("lead-1").await.unwrap();
    assert!(stored.lead.builder("a").is_some());

    // The builder stays claimed by the lead they joined
    let err = engine.join_sprint("lead-1", "a", None).await.unwrap_err();
    assert!(matches!(err, Error::ConflictingState(_)));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_concurrent_joins_to_two_leads() {
    let h = Arc::new(harness());
    h.alumni(&["a"]).await;
    h.lead_with_sprint("lead-1", 2).await;
    h.lead_with_sprint("lead-2", 2).await;

    let first = {
        let h = h.clone();
        tokio::spawn(async move { h.engine.join_sprint("lead-1", "a", None).await })
    };
    let second = {
        let h = h.clone();
        tokio::spawn(async move { h.engine.join_sprint("lead-2", "a", None).await })
    };

    let results = [first.await.unwrap(), second.await.unwrap()];
    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    assert!(results
        .iter()
        .filter_map(|r| r.as_ref().err())
        .all(|e| matches!(e, Error::ConflictingState(_))));

    let mut memberships = 0;
    for lead_id in ["lead-1", "lead-2"] {
        let view = h.engine.get_lead(lead_id).await.unwrap();
        memberships += view.lead.active_builders.len();
    }
    assert_eq!(memberships, 1);
    assert_eq!(h.build_count("a").await, 1);
}

#[tokio::test]
async fn test_proof_link_allow_list() {
    let h = harness();
    h.alumni(&["a"]).await;
    h.lead_with_sprint("lead-1", 2).await;
    h.engine.join_sprint("lead-1", "a", None).await.unwrap();

    let err = h
        .engine
        .submit_checkpoint("lead-1", "a", 1, "https://evil.com/x")
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Validation(_)));

    let view = h
        .engine
        .submit_checkpoint("lead-1", "a", 1, "https://github.com/x/y")
        .await
        .unwrap();
    let builder = view.lead.builder("a").unwrap();
    assert_eq!(builder.proof_links, vec!["https://github.com/x/y"]);
    assert_eq!(builder.checkpoint_statuses[&1].status, CheckpointState::Submitted);
    assert_eq!(builder.checkpoints_completed, 0);
}

#[tokio::test]
async fn test_resubmitting_proof_is_idempotent() {
    let h = harness();
    h.alumni(&["a"]).await;
    h.lead_with_sprint("lead-1", 2).await;
    h.engine.join_sprint("lead-1", "a", None).await.unwrap();

    for _ in 0..3 {
        h.engine
            .submit_checkpoint("lead-1", "a", 1, GITHUB)
            .await
            .unwrap();
    }
    let view = h.engine.get_lead("lead-1").await.unwrap();
    assert_eq!(view.lead.builder("a").unwrap().proof_links.len(), 1);
}

#[tokio::test]
async fn test_checkpoints_never_decrease() {
    let h = harness();
    h.alumni(&["a"]).await;
    h.lead_with_sprint("lead-1", 2).await;
    h.engine.join_sprint("lead-1", "a", None).await.unwrap();

    h.engine.submit_checkpoint("lead-1", "a", 3, GITHUB).await.unwrap();
    let view = h
        .engine
        .verify_checkpoint("lead-1", "a", 3, true, None)
        .await
        .unwrap();
    assert_eq!(view.lead.builder("a").unwrap().checkpoints_completed, 3);

    h.engine.submit_checkpoint("lead-1", "a", 1, GITHUB).await.unwrap();
    let view = h
        .engine
        .verify_checkpoint("lead-1", "a", 1, true, None)
        .await
        .unwrap();
    assert_eq!(view.lead.builder("a").unwrap().checkpoints_completed, 3);

    h.engine.submit_checkpoint("lead-1", "a", 4, GITHUB).await.unwrap();
    let view = h
        .engine
        .verify_checkpoint("lead-1", "a", 4, false, Some("Broken deploy".into()))
        .await
        .unwrap();
    let builder = view.lead.builder("a").unwrap();
    assert_eq!(builder.checkpoints_completed, 3);
    assert_eq!(builder.checkpoint_statuses[&4].status, CheckpointState::Rejected);

    // Rejected milestones must be resubmitted before another verdict
    let err = h
        .engine
        .verify_checkpoint("lead-1", "a", 4, true, None)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::PreconditionFailed(_)));
}

#[tokio::test]
async fn test_first_completion_is_set_once_and_window_expires() {
    let h = harness();
    h.alumni(&["a", "b"]).await;
    h.lead_with_sprint("lead-1", 2).await;
    h.engine.join_sprint("lead-1", "a", None).await.unwrap();
    h.engine.join_sprint("lead-1", "b", None).await.unwrap();

    h.clock.advance(Duration::days(3));
    h.complete("lead-1", "a", 4).await;
    let first = h.clock.now();

    let view = h.engine.get_lead("lead-1").await.unwrap();
    assert_eq!(view.lead.first_completion_at, Some(first));
    assert!(view.submission_window_open);

    h.clock.advance(Duration::hours(10));
    h.complete("lead-1", "b", 4).await;
    let view = h.engine.get_lead("lead-1").await.unwrap();
    assert_eq!(view.lead.first_completion_at, Some(first));

    h.clock.set(first + Duration::hours(48));
    assert!(h.engine.get_lead("lead-1").await.unwrap().submission_window_open);

    h.clock.set(first + Duration::hours(48) + Duration::seconds(1));
    let view = h.engine.get_lead("lead-1").await.unwrap();
    assert!(!view.submission_window_open);
    assert_eq!(view.sprint_phase, SprintPhase::Evaluating);
}

#[tokio::test]
async fn test_auto_verify_advances_on_submit() {
    let h = harness_with(auto_verify());
    h.alumni(&["a"]).await;
    h.lead_with_sprint("lead-1", 1).await;
    h.engine.join_sprint("lead-1", "a", None).await.unwrap();

    let view = h
        .engine
        .submit_checkpoint("lead-1", "a", 4, GITHUB)
        .await
        .unwrap();
    let builder = view.lead.builder("a").unwrap();
    assert_eq!(builder.checkpoints_completed, 4);
    assert_eq!(builder.checkpoint_statuses[&4].status, CheckpointState::Verified);
    assert!(view.lead.first_completion_at.is_some());
    assert!(view.submission_window_open);

    // A retried submission after the first one was applied changes nothing
    let retry = h
        .engine
        .submit_checkpoint("lead-1", "a", 4, GITHUB)
        .await
        .unwrap();
    let builder = retry.lead.builder("a").unwrap();
    assert_eq!(builder.checkpoints_completed, 4);
    assert_eq!(builder.proof_links, vec![GITHUB.to_string()]);
    assert_eq!(retry.lead.version, view.lead.version);

    // A different proof for a verified milestone is still refused
    let err = h
        .engine
        .submit_checkpoint("lead-1", "a", 4, "https://bakery.vercel.app")
        .await
        .unwrap_err();
    assert!(matches!(err, Error::ConflictingState(_)));
}

/// Two finalists: "a" joins 2.5h before "b", both finish at the moment "b"
/// would have finished at one milestone a day. "a" ends up with pace 95,
/// "b" with pace 100.
async fn scored_finalists(h: &Harness) {
    h.alumni(&["a", "b"]).await;
    h.lead_with_sprint("lead-1", 2).await;

    h.engine.join_sprint("lead-1", "a", None).await.unwrap();
    h.clock.advance(Duration::minutes(150));
    h.engine.join_sprint("lead-1", "b", None).await.unwrap();

    h.clock.advance(Duration::days(4));
    h.complete("lead-1", "a", 4).await;
    h.complete("lead-1", "b", 4).await;
}

#[tokio::test]
async fn test_calculate_winner_scores() {
    let h = harness();
    scored_finalists(&h).await;

    h.engine
        .submit_scout_review("lead-1", "a", 90, Some(80), None)
        .await
        .unwrap();
    h.engine
        .submit_scout_review("lead-1", "b", 70, Some(90), None)
        .await
        .unwrap();

    let err = h.engine.calculate_winner("lead-1").await.unwrap_err();
    assert!(matches!(err, Error::PreconditionFailed(_)));

    h.clock.advance(Duration::hours(49));
    let result = h.engine.calculate_winner("lead-1").await.unwrap();

    let a = result.scores.iter().find(|s| s.user_id == "a").unwrap();
    let b = result.scores.iter().find(|s| s.user_id == "b").unwrap();
    assert!((a.pace_score - 95.0).abs() < 1e-9);
    assert!((b.pace_score - 100.0).abs() < 1e-9);
    assert!((a.total_score - 89.5).abs() < 1e-9);
    assert!((b.total_score - 83.0).abs() < 1e-9);

    let lead = &result.lead.lead;
    assert_eq!(lead.winner_user_id.as_deref(), Some("a"));
    assert_eq!(lead.status, "awarded");
    assert!(!lead.sprint_active);
    assert_eq!(result.lead.sprint_phase, SprintPhase::Awarded);

    let err = h.engine.calculate_winner("lead-1").await.unwrap_err();
    assert!(matches!(err, Error::ConflictingState(_)));

    let winner = h.engine.get_alumni("a").await.unwrap();
    assert_eq!(winner.current_build_count, 0);
    assert_eq!(winner.completed_builds, vec!["lead-1"]);
    assert_eq!(h.build_count("b").await, 0);
    assert_eq!(h.store.active_lead_for("a").await.unwrap(), None);
}

#[tokio::test]
async fn test_last_review_awards_automatically() {
    let h = harness();
    scored_finalists(&h).await;
    h.clock.advance(Duration::hours(49));

    let view = h
        .engine
        .submit_scout_review("lead-1", "b", 70, Some(90), None)
        .await
        .unwrap();
    assert!(view.lead.winner_user_id.is_none());

    let view = h
        .engine
        .submit_scout_review("lead-1", "a", 90, None, Some("Clean build".into()))
        .await
        .unwrap();
    // Without a secondary score the quality score is reused: 28.5 + 45 + 18
    assert_eq!(view.lead.winner_user_id.as_deref(), Some("a"));
    assert_eq!(
        view.lead.builder("a").unwrap().scout_review.as_ref().unwrap().scout_review_score,
        90
    );
}

#[tokio::test]
async fn test_late_finalists_can_be_excluded() {
    let policy = SprintPolicy {
        late_completions: LateCompletionPolicy::Exclude,
        ..SprintPolicy::default()
    };
    let h = harness_with(policy);
    h.alumni(&["a", "b"]).await;
    h.lead_with_sprint("lead-1", 2).await;
    h.engine.join_sprint("lead-1", "a", None).await.unwrap();
    h.engine.join_sprint("lead-1", "b", None).await.unwrap();

    h.complete("lead-1", "a", 4).await;
    h.engine
        .submit_scout_review("lead-1", "a", 50, None, None)
        .await
        .unwrap();

    h.clock.advance(Duration::hours(60));
    h.complete("lead-1", "b", 4).await;

    let result = h.engine.calculate_winner("lead-1").await.unwrap();
    assert_eq!(result.scores.len(), 1);
    assert_eq!(result.lead.lead.winner_user_id.as_deref(), Some("a"));
}

async fn voting_lead(h: &Harness) -> (String, String) {
    h.alumni(&["a", "b"]).await;
    h.lead_with_sprint("lead-1", 2).await;
    h.engine.join_sprint("lead-1", "a", None).await.unwrap();
    h.engine.join_sprint("lead-1", "b", None).await.unwrap();
    h.complete("lead-1", "a", 4).await;
    h.complete("lead-1", "b", 4).await;
    (Build::id_for("lead-1", 1, "a"), Build::id_for("lead-1", 1, "b"))
}

#[tokio::test]
async fn test_voting_needs_two_finalists() {
    let h = harness_with(auto_verify());
    h.alumni(&["a", "b"]).await;
    h.lead_with_sprint("lead-1", 2).await;
    h.engine.join_sprint("lead-1", "a", None).await.unwrap();
    h.complete("lead-1", "a", 4).await;

    let err = h.engine.open_voting("lead-1").await.unwrap_err();
    assert!(matches!(err, Error::PreconditionFailed(_)));
}

#[tokio::test]
async fn test_voting_threshold_and_winner() {
    let h = harness_with(auto_verify());
    let (build_a, build_b) = voting_lead(&h).await;

    let state = h.engine.open_voting("lead-1").await.unwrap();
    assert_eq!(state.builds.len(), 2);
    assert_eq!(state.builds[0].build.deployed_url.as_deref(), Some(GITHUB));

    // Opening again changes nothing
    let state = h.engine.open_voting("lead-1").await.unwrap();
    assert_eq!(state.builds.len(), 2);

    for (voter, score) in ["v1", "v2", "v3", "v4", "v5"].iter().zip([5, 5, 4, 4, 5]) {
        h.engine.cast_vote(&build_a, voter, score).await.unwrap();
    }
    for (voter, score) in ["v1", "v2", "v3", "v4"].iter().zip([3, 3, 4, 2]) {
        h.engine.cast_vote(&build_b, voter, score).await.unwrap();
    }

    let err = h.engine.close_voting("lead-1").await.unwrap_err();
    assert!(matches!(err, Error::PreconditionFailed(_)));

    h.engine.cast_vote(&build_b, "v5", 3).await.unwrap();

    let state = h.engine.voting_state("lead-1", Some("v5")).await.unwrap();
    assert_eq!(state.total_votes, 10);
    assert!(state.builds.iter().all(|b| b.has_voted == Some(true)));
    let state = h.engine.voting_state("lead-1", Some("v9")).await.unwrap();
    assert!(state.builds.iter().all(|b| b.has_voted == Some(false)));

    let outcome = h.engine.close_voting("lead-1").await.unwrap();
    let lead = &outcome.lead.lead;
    assert_eq!(lead.winner_user_id.as_deref(), Some("a"));
    assert_eq!(lead.winner_average_score, Some(4.6));
    assert_eq!(lead.status, "awarded");
    assert!(!lead.voting_open);

    let err = h.engine.cast_vote(&build_a, "v6", 5).await.unwrap_err();
    assert!(matches!(err, Error::ConflictingState(_)));
    assert_eq!(h.engine.get_alumni("a").await.unwrap().completed_builds, vec!["lead-1"]);
}

#[tokio::test]
async fn test_vote_rules() {
    let h = harness_with(auto_verify());
    let (build_a, _) = voting_lead(&h).await;

    // Builds only exist once voting has been opened
    let err = h.engine.cast_vote(&build_a, "v1", 4).await.unwrap_err();
    assert!(matches!(err, Error::NotFound(_)));

    let stray = Build {
        id: build_a.clone(),
        lead_id: "lead-1".into(),
        builder_id: "a".into(),
        builder_name: "Builder a".into(),
        business_name: "Business lead-1".into(),
        deployed_url: None,
        created_at: start(),
    };
    h.store.put_build(&stray).await.unwrap();
    let err = h.engine.cast_vote(&build_a, "v1", 4).await.unwrap_err();
    assert!(matches!(err, Error::PreconditionFailed(_)));

    h.engine.open_voting("lead-1").await.unwrap();

    let err = h.engine.cast_vote(&build_a, "v1", 6).await.unwrap_err();
    assert!(matches!(err, Error::Validation(_)));
    let err = h.engine.cast_vote(&build_a, "v1", 0).await.unwrap_err();
    assert!(matches!(err, Error::Validation(_)));
    let err = h.engine.cast_vote("nope", "v1", 3).await.unwrap_err();
    assert!(matches!(err, Error::NotFound(_)));

    h.engine.cast_vote(&build_a, "v1", 4).await.unwrap();
    let err = h.engine.cast_vote(&build_a, "v1", 2).await.unwrap_err();
    assert!(matches!(err, Error::ConflictingState(_)));

    let open = h.engine.open_voting_states(Some("v1")).await.unwrap();
    assert_eq!(open.len(), 1);
    assert_eq!(open[0].builds[0].vote_count, 1);
    assert_eq!(open[0].builds[0].average_score, 4.0);
}

#[tokio::test]
async fn test_evicted_finalist_cannot_win_by_vote() {
    let h = harness_with(auto_verify());
    h.alumni(&["a", "b", "c"]).await;
    h.lead_with_sprint("lead-1", 3).await;
    for user in ["a", "b", "c"] {
        h.engine.join_sprint("lead-1", user, None).await.unwrap();
        h.complete("lead-1", user, 4).await;
    }
    let build_a = Build::id_for("lead-1", 1, "a");
    let build_b = Build::id_for("lead-1", 1, "b");
    let build_c = Build::id_for("lead-1", 1, "c");

    let state = h.engine.open_voting("lead-1").await.unwrap();
    assert_eq!(state.builds.len(), 3);
    for n in 0..10 {
        h.engine
            .cast_vote(&build_c, &format!("v{}", n), 5)
            .await
            .unwrap();
    }

    h.engine
        .evict_builder("lead-1", "c", AuditContext::scout())
        .await
        .unwrap();

    let err = h.engine.cast_vote(&build_c, "v10", 5).await.unwrap_err();
    assert!(matches!(err, Error::ConflictingState(_)));

    let state = h.engine.voting_state("lead-1", None).await.unwrap();
    assert_eq!(state.builds.len(), 2);
    assert_eq!(state.total_votes, 0);
    assert!(state.builds.iter().all(|t| t.build.builder_id != "c"));

    // The evicted build's votes do not count toward the threshold either
    let err = h.engine.close_voting("lead-1").await.unwrap_err();
    assert!(matches!(err, Error::PreconditionFailed(_)));

    for n in 0..5 {
        let voter = format!("v{}", n);
        h.engine.cast_vote(&build_a, &voter, 3).await.unwrap();
        h.engine.cast_vote(&build_b, &voter, 4).await.unwrap();
    }

    let outcome = h.engine.close_voting("lead-1").await.unwrap();
    assert_eq!(outcome.lead.lead.winner_user_id.as_deref(), Some("b"));
    assert_eq!(outcome.voting.total_votes, 10);
    assert!(h.engine.get_alumni("c").await.unwrap().completed_builds.is_empty());
}

#[tokio::test]
async fn test_votes_from_a_terminated_sprint_do_not_carry_over() {
    let h = harness_with(auto_verify());
    let (old_a, _) = voting_lead(&h).await;

    h.engine.open_voting("lead-1").await.unwrap();
    for n in 0..5 {
        h.engine
            .cast_vote(&old_a, &format!("v{}", n), 5)
            .await
            .unwrap();
    }

    h.engine
        .terminate_sprint("lead-1", AuditContext::scout())
        .await
        .unwrap();
    let state = h.engine.voting_state("lead-1", None).await.unwrap();
    assert!(state.builds.is_empty());

    let view = h.engine.launch_sprint("lead-1", 2, 2).await.unwrap();
    assert_eq!(view.lead.sprint_round, 2);
    for user in ["a", "b"] {
        h.engine.join_sprint("lead-1", user, None).await.unwrap();
        h.complete("lead-1", user, 4).await;
    }

    let state = h.engine.open_voting("lead-1").await.unwrap();
    assert_eq!(state.builds.len(), 2);
    assert_eq!(state.total_votes, 0);
    assert_eq!(state.builds[0].build.id, Build::id_for("lead-1", 2, "a"));

    let err = h.engine.cast_vote(&old_a, "v9", 5).await.unwrap_err();
    assert!(matches!(err, Error::ConflictingState(_)));
}

#[tokio::test]
async fn test_admin_actions_are_audited() {
    let h = harness();
    h.alumni(&["a", "b", "c"]).await;
    h.lead_with_sprint("lead-1", 3).await;
    h.engine.join_sprint("lead-1", "a", None).await.unwrap();
    h.engine.join_sprint("lead-1", "b", None).await.unwrap();

    let view = h
        .engine
        .pause_sprint("lead-1", AuditContext::new("scout-ana", Some("Client call".into())))
        .await
        .unwrap();
    assert!(view.lead.is_paused);

    let err = h.engine.join_sprint("lead-1", "c", None).await.unwrap_err();
    assert!(matches!(err, Error::ConflictingState(_)));
    let err = h
        .engine
        .submit_checkpoint("lead-1", "a", 1, GITHUB)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::ConflictingState(_)));
    let err = h
        .engine
        .pause_sprint("lead-1", AuditContext::scout())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::ConflictingState(_)));

    h.engine
        .resume_sprint("lead-1", AuditContext::scout())
        .await
        .unwrap();

    let before = h.engine.get_lead("lead-1").await.unwrap().lead.sprint_deadline.unwrap();
    let view = h
        .engine
        .extend_deadline("lead-1", 7, AuditContext::scout())
        .await
        .unwrap();
    assert_eq!(view.lead.sprint_deadline, Some(before + Duration::days(7)));

    let err = h
        .engine
        .extend_deadline("lead-1", 0, AuditContext::scout())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Validation(_)));

    h.engine
        .nudge_builder("lead-1", "a", AuditContext::scout())
        .await
        .unwrap();
    let view = h
        .engine
        .flag_builder("lead-1", "a", AuditContext::scout())
        .await
        .unwrap();
    let a = view.lead.builder("a").unwrap();
    assert_eq!(a.last_nudged_at, Some(h.clock.now()));
    assert_eq!(a.flagged_expires_at, Some(h.clock.now() + Duration::hours(5)));
    assert!(view.builder_details.iter().any(|d| d.user_id == "a" && d.flagged));

    let view = h
        .engine
        .evict_builder("lead-1", "b", AuditContext::new("scout", Some("No show".into())))
        .await
        .unwrap();
    assert!(view.lead.builder("b").is_none());
    assert_eq!(h.build_count("b").await, 0);

    let actions: Vec<AuditAction> = view.lead.audit_log.iter().map(|e| e.action).collect();
    assert_eq!(
        actions,
        vec![
            AuditAction::Pause,
            AuditAction::Resume,
            AuditAction::ExtendDeadline,
            AuditAction::NudgeBuilder,
            AuditAction::FlagBuilder,
            AuditAction::EvictBuilder,
        ]
    );
    assert_eq!(view.lead.audit_log[0].actor, "scout-ana");
    assert_eq!(view.lead.audit_log[0].reason.as_deref(), Some("Client call"));
    assert_eq!(view.lead.audit_log[5].target_user_id.as_deref(), Some("b"));

    // The freed slot and builder can be used again
    h.engine.join_sprint("lead-1", "c", None).await.unwrap();
}

#[tokio::test]
async fn test_terminate_frees_builders() {
    let h = harness();
    h.alumni(&["a", "b"]).await;
    h.lead_with_sprint("lead-1", 2).await;
    h.lead_with_sprint("lead-2", 2).await;
    h.engine.join_sprint("lead-1", "a", None).await.unwrap();
    h.engine.join_sprint("lead-1", "b", None).await.unwrap();

    let view = h
        .engine
        .terminate_sprint("lead-1", AuditContext::scout())
        .await
        .unwrap();
    assert!(!view.lead.sprint_active);
    assert!(view.lead.active_builders.is_empty());
    assert!(view.lead.winner_user_id.is_none());
    assert_eq!(view.lead.status, "terminated");
    assert_eq!(view.sprint_phase, SprintPhase::Terminated);
    assert_eq!(view.lead.audit_log.len(), 1);

    assert_eq!(h.build_count("a").await, 0);
    h.engine.join_sprint("lead-2", "a", None).await.unwrap();

    let err = h
        .engine
        .terminate_sprint("lead-1", AuditContext::scout())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::ConflictingState(_)));
}

#[derive(Default)]
struct RecordingNotifier {
    sent: Mutex<Vec<(String, String)>>,
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, recipient: &AlumniProfile, lead: &LeadSummary) -> bool {
        self.sent
            .lock()
            .unwrap()
            .push((recipient.id.clone(), lead.lead_id.clone()));
        true
    }
}

#[tokio::test]
async fn test_stall_detection_and_nudges() {
    let notifier = Arc::new(RecordingNotifier::default());
    let store = Arc::new(MemoryStore::new());
    let clock = Arc::new(ManualClock::new(start()));
    let h = Harness {
        engine: SprintEngine::new(store.clone())
            .with_clock(clock.clone())
            .with_notifier(notifier.clone()),
        store,
        clock,
    };

    h.alumni(&["a", "b"]).await;
    h.lead_with_sprint("lead-1", 2).await;
    h.engine.join_sprint("lead-1", "a", None).await.unwrap();
    h.engine.join_sprint("lead-1", "b", None).await.unwrap();

    h.clock.advance(Duration::hours(71));
    assert!(h.engine.detect_stalled().await.unwrap().is_empty());

    h.complete("lead-1", "b", 1).await;
    h.clock.advance(Duration::hours(1));

    let stalled = h.engine.detect_stalled().await.unwrap();
    assert_eq!(stalled.len(), 1);
    assert_eq!(stalled[0].user_id, "a");
    assert_eq!(stalled[0].hours_since_update, 72);

    let reports = h.engine.dispatch_nudges().await.unwrap();
    assert_eq!(reports.len(), 1);
    assert!(reports[0].delivered);
    assert_eq!(
        notifier.sent.lock().unwrap().clone(),
        vec![("a".to_string(), "lead-1".to_string())]
    );

    let view = h.engine.get_lead("lead-1").await.unwrap();
    let entry = view.lead.audit_log.last().unwrap();
    assert_eq!(entry.action, AuditAction::NudgeBuilder);
    assert_eq!(entry.actor, "nudge-dispatcher");

    // Nudged recently, so not reported again until the threshold passes
    assert!(h.engine.detect_stalled().await.unwrap().is_empty());
    h.clock.advance(Duration::hours(72));
    let stalled = h.engine.detect_stalled().await.unwrap();
    let ids: Vec<&str> = stalled.iter().map(|s| s.user_id.as_str()).collect();
    assert_eq!(ids, vec!["a", "b"]);

    h.engine
        .pause_sprint("lead-1", AuditContext::scout())
        .await
        .unwrap();
    assert!(h.engine.detect_stalled().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_lead_and_alumni_registry() {
    let h = harness();
    let view = h
        .engine
        .create_lead(Lead::new(String::new(), "Bodega".into()))
        .await
        .unwrap();
    assert!(!view.lead.id.is_empty());
    assert_eq!(view.lead.status, "qualified");
    assert_eq!(view.sprint_phase, SprintPhase::NotLaunched);

    let err = h
        .engine
        .create_lead(Lead::new(view.lead.id.clone(), "Bodega".into()))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::ConflictingState(_)));

    let err = h
        .engine
        .create_lead(Lead::new("x".into(), "  ".into()))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Validation(_)));

    assert_eq!(h.engine.list_leads().await.unwrap().len(), 1);

    h.alumni(&["a"]).await;
    let mut mobile = profile("m");
    mobile.specialty = "mobile".into();
    h.engine.register_alumni(mobile).await.unwrap();

    assert_eq!(h.engine.list_alumni(Some("MOBILE")).await.unwrap().len(), 1);
    assert_eq!(h.engine.list_alumni(None).await.unwrap().len(), 2);

    let err = h.engine.get_alumni("nobody").await.unwrap_err();
    assert!(matches!(err, Error::NotFound(_)));

    let err = h.engine.launch_sprint(&view.lead.id, 5, 2).await.unwrap_err();
    assert!(matches!(err, Error::Validation(_)));
    h.engine.launch_sprint(&view.lead.id, 2, 2).await.unwrap();
    let err = h.engine.launch_sprint(&view.lead.id, 2, 2).await.unwrap_err();
    assert!(matches!(err, Error::ConflictingState(_)));
}
